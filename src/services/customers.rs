use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, SqlErr, TransactionTrait,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::UserProfile;
use crate::entities::gateway_customer;
use crate::errors::ServiceError;
use crate::gateway::{CreateCustomerRequest, GatewayCustomer, PaymentGateway};

/// Who the gateway customer is being resolved for, as asserted by the
/// identity provider.
#[derive(Debug, Clone, Default)]
pub struct CustomerIdentity {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub profile: Option<UserProfile>,
}

/// Maps local users onto gateway customers, creating them lazily.
#[derive(Clone)]
pub struct CustomerService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
}

impl CustomerService {
    pub fn new(db: Arc<DatabaseConnection>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { db, gateway }
    }

    /// Resolves outside of any surrounding transaction.
    pub async fn resolve(&self, identity: &CustomerIdentity) -> Result<String, ServiceError> {
        self.get_or_create_customer(&*self.db, identity).await
    }

    /// Returns the existing mapping or creates one. The insert runs in a
    /// nested transaction so that losing a race on the unique `user_id`
    /// index leaves the caller's transaction usable; the winner's row is
    /// then re-read and returned.
    #[instrument(skip(self, conn, identity), fields(user_id = %identity.user_id))]
    pub async fn get_or_create_customer<C>(
        &self,
        conn: &C,
        identity: &CustomerIdentity,
    ) -> Result<String, ServiceError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        if let Some(existing) = find_mapping(conn, identity.user_id).await? {
            return Ok(existing.gateway_customer_id);
        }

        let email = identity.email.clone().ok_or_else(|| {
            ServiceError::ValidationError(
                "User email is required for gateway customer creation".to_string(),
            )
        })?;
        let phone = identity.profile.as_ref().and_then(|p| p.phone.clone());

        let created = self
            .gateway
            .create_customer(CreateCustomerRequest {
                name: display_name(&email, identity.profile.as_ref()),
                email: email.clone(),
                phone: phone.clone(),
                metadata: HashMap::from([("user_id".to_string(), identity.user_id.to_string())]),
            })
            .await?;

        let now = Utc::now();
        let mapping = gateway_customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(identity.user_id),
            gateway_customer_id: Set(created.id.clone()),
            email: Set(Some(email)),
            phone: Set(phone),
            default_payment_method_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let savepoint = conn.begin().await?;
        match mapping.insert(&savepoint).await {
            Ok(row) => {
                savepoint.commit().await?;
                info!(gateway_customer_id = %row.gateway_customer_id, "gateway customer mapped");
                Ok(row.gateway_customer_id)
            }
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                savepoint.rollback().await?;
                let winner = find_mapping(conn, identity.user_id).await?.ok_or_else(|| {
                    ServiceError::InternalError(
                        "gateway customer mapping vanished after conflict".to_string(),
                    )
                })?;
                warn!(
                    orphaned = %created.id,
                    kept = %winner.gateway_customer_id,
                    "concurrent gateway customer creation, keeping existing mapping"
                );
                Ok(winner.gateway_customer_id)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// The gateway's record for the caller, creating the customer on first use.
    #[instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub async fn customer_profile(
        &self,
        identity: &CustomerIdentity,
    ) -> Result<GatewayCustomer, ServiceError> {
        let customer_id = self.resolve(identity).await?;
        self.gateway.retrieve_customer(&customer_id).await
    }

    pub async fn get_customer_id(&self, user_id: Uuid) -> Result<Option<String>, ServiceError> {
        Ok(find_mapping(&*self.db, user_id)
            .await?
            .map(|m| m.gateway_customer_id))
    }
}

async fn find_mapping<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<Option<gateway_customer::Model>, ServiceError> {
    Ok(gateway_customer::Entity::find()
        .filter(gateway_customer::Column::UserId.eq(user_id))
        .one(conn)
        .await?)
}

/// Full name, else "first last", else the local part of the email.
pub fn display_name(email: &str, profile: Option<&UserProfile>) -> String {
    let non_empty = |s: &Option<String>| {
        s.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    if let Some(profile) = profile {
        if let Some(full) = non_empty(&profile.full_name) {
            return full;
        }
        if let (Some(first), Some(last)) =
            (non_empty(&profile.first_name), non_empty(&profile.last_name))
        {
            return format!("{} {}", first, last);
        }
    }
    email.split('@').next().unwrap_or(email).to_string()
}
