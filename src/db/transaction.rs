/*!
 * Unit-of-work helper.
 *
 * Every multi-entity write (checkout, cancellation, reconciliation) runs through
 * `with_transaction` so that commit and rollback are decided in one place.
 */

use metrics::counter;
use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr, TransactionError, TransactionTrait};
use std::future::Future;
use std::pin::Pin;
use tracing::debug;

/// Type alias for boxed future used in transactions
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Execute a function within a database transaction
///
/// The transaction commits when the closure returns `Ok` and rolls back
/// otherwise. The closure's own error is returned unchanged, so callers keep
/// their typed domain errors.
///
/// # Example
///
/// ```rust,ignore
/// use crate::db::with_transaction;
///
/// let order = with_transaction(&db, |txn| {
///     Box::pin(async move {
///         let order = order.insert(txn).await?;
///         OrderItem::insert_many(items).exec(txn).await?;
///         Ok::<_, ServiceError>(order)
///     })
/// })
/// .await?;
/// ```
pub async fn with_transaction<F, T, E>(db: &DatabaseConnection, f: F) -> Result<T, E>
where
    F: for<'c> FnOnce(&'c DatabaseTransaction) -> BoxFuture<'c, Result<T, E>> + Send,
    T: Send,
    E: From<DbErr> + std::error::Error + Send,
{
    let result = db.transaction(f).await;

    match &result {
        Ok(_) => {
            counter!("storefront_db.transaction.committed", 1);
        }
        Err(err) => {
            counter!("storefront_db.transaction.rolled_back", 1);
            debug!(error = %err, "transaction rolled back");
        }
    }

    result.map_err(|e| match e {
        TransactionError::Connection(db_err) => E::from(db_err),
        TransactionError::Transaction(err) => err,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ServiceError;
    use sea_orm::{ConnectOptions, ConnectionTrait, Database, DbBackend, Statement};

    async fn scratch_db() -> DatabaseConnection {
        let mut opt = ConnectOptions::new("sqlite::memory:".to_string());
        opt.max_connections(1).min_connections(1);
        let db = Database::connect(opt).await.unwrap();
        db.execute(Statement::from_string(
            DbBackend::Sqlite,
            "CREATE TABLE scratch (id INTEGER PRIMARY KEY, label TEXT NOT NULL)".to_string(),
        ))
        .await
        .unwrap();
        db
    }

    async fn row_count(db: &DatabaseConnection) -> i64 {
        let row = db
            .query_one(Statement::from_string(
                DbBackend::Sqlite,
                "SELECT COUNT(*) AS n FROM scratch".to_string(),
            ))
            .await
            .unwrap()
            .unwrap();
        row.try_get::<i64>("", "n").unwrap()
    }

    fn insert(label: &str) -> Statement {
        Statement::from_sql_and_values(
            DbBackend::Sqlite,
            "INSERT INTO scratch (label) VALUES (?)",
            [label.into()],
        )
    }

    #[tokio::test]
    async fn commits_on_success() {
        let db = scratch_db().await;

        let value = with_transaction(&db, |txn| {
            Box::pin(async move {
                txn.execute(insert("kept")).await?;
                Ok::<_, ServiceError>(42)
            })
        })
        .await
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(row_count(&db).await, 1);
    }

    #[tokio::test]
    async fn rolls_back_and_preserves_typed_error() {
        let db = scratch_db().await;

        let err = with_transaction(&db, |txn| {
            Box::pin(async move {
                txn.execute(insert("discarded")).await?;
                Err::<(), _>(ServiceError::CartEmpty)
            })
        })
        .await
        .unwrap_err();

        assert!(matches!(err, ServiceError::CartEmpty));
        assert_eq!(row_count(&db).await, 0);
    }
}
