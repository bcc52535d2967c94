use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::with_transaction;
use crate::entities::{invoice, invoice_line_item, payment_transaction, InvoiceStatus};
use crate::errors::ServiceError;

#[derive(Debug, Clone)]
pub struct InvoiceDetails {
    pub invoice: invoice::Model,
    pub line_items: Vec<invoice_line_item::Model>,
}

#[derive(Clone)]
pub struct InvoiceService {
    db: Arc<DatabaseConnection>,
}

impl InvoiceService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Owners see their own invoices; admins see all.
    #[instrument(skip(self))]
    pub async fn get_invoice(
        &self,
        invoice_id: Uuid,
        requester_id: Uuid,
        is_admin: bool,
    ) -> Result<InvoiceDetails, ServiceError> {
        let invoice = self.find(invoice_id).await?;
        if !is_admin && invoice.user_id != requester_id {
            return Err(ServiceError::Forbidden("Access denied".to_string()));
        }
        self.with_lines(invoice).await
    }

    #[instrument(skip(self))]
    pub async fn list_invoices_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<InvoiceDetails>, ServiceError> {
        let invoices = invoice::Entity::find()
            .filter(invoice::Column::UserId.eq(user_id))
            .order_by_desc(invoice::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let mut details = Vec::with_capacity(invoices.len());
        for invoice in invoices {
            details.push(self.with_lines(invoice).await?);
        }
        Ok(details)
    }

    #[instrument(skip(self))]
    pub async fn list_all_invoices(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<InvoiceDetails>, u64), ServiceError> {
        let paginator = invoice::Entity::find()
            .order_by_desc(invoice::Column::CreatedAt)
            .paginate(&*self.db, limit.max(1));
        let total = paginator.num_items().await?;
        let invoices = paginator.fetch_page(page.saturating_sub(1)).await?;

        let mut details = Vec::with_capacity(invoices.len());
        for invoice in invoices {
            details.push(self.with_lines(invoice).await?);
        }
        Ok((details, total))
    }

    /// Setting `paid` stamps `paid_at`.
    #[instrument(skip(self))]
    pub async fn update_invoice_status(
        &self,
        invoice_id: Uuid,
        status: InvoiceStatus,
    ) -> Result<invoice::Model, ServiceError> {
        let existing = self.find(invoice_id).await?;
        let now = Utc::now();

        let mut active: invoice::ActiveModel = existing.into();
        active.status = Set(status);
        if status == InvoiceStatus::Paid {
            active.paid_at = Set(Some(now));
        }
        active.updated_at = Set(now);
        let updated = active.update(&*self.db).await?;
        info!(invoice_number = %updated.invoice_number, %status, "invoice status updated");
        Ok(updated)
    }

    /// Admin purge. Payment transactions keep their row but lose the link.
    #[instrument(skip(self))]
    pub async fn delete_invoice(&self, invoice_id: Uuid) -> Result<(), ServiceError> {
        with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                let invoice = invoice::Entity::find_by_id(invoice_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound("Invoice not found".to_string()))?;

                payment_transaction::Entity::update_many()
                    .col_expr(
                        payment_transaction::Column::InvoiceId,
                        Expr::value(Option::<Uuid>::None),
                    )
                    .filter(payment_transaction::Column::InvoiceId.eq(invoice_id))
                    .exec(txn)
                    .await?;
                invoice_line_item::Entity::delete_many()
                    .filter(invoice_line_item::Column::InvoiceId.eq(invoice_id))
                    .exec(txn)
                    .await?;
                invoice.delete(txn).await?;
                Ok::<_, ServiceError>(())
            })
        })
        .await?;

        info!(%invoice_id, "invoice deleted");
        Ok(())
    }

    async fn find(&self, invoice_id: Uuid) -> Result<invoice::Model, ServiceError> {
        invoice::Entity::find_by_id(invoice_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Invoice not found".to_string()))
    }

    async fn with_lines(&self, invoice: invoice::Model) -> Result<InvoiceDetails, ServiceError> {
        let line_items = invoice
            .find_related(invoice_line_item::Entity)
            .all(&*self.db)
            .await?;
        Ok(InvoiceDetails {
            invoice,
            line_items,
        })
    }
}
