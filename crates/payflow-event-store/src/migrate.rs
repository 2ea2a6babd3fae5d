//! Schema migrations shared by the API and consumer binaries.

use std::time::Duration;

use sqlx::PgPool;

use payflow_core::error::DomainError;

/// Embedded migrations for the event store and the payment read model.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

/// Runs the embedded migrations, retrying while the database comes up.
///
/// Containerized deployments routinely start the services before Postgres
/// accepts connections, so transient failures are retried with a flat delay
/// up to `max_attempts`.
///
/// # Errors
///
/// Returns the final migration error once the attempts are exhausted.
pub async fn run_with_retry(pool: &PgPool, max_attempts: u32) -> Result<(), DomainError> {
    let mut attempt = 1;
    loop {
        match MIGRATOR.run(pool).await {
            Ok(()) => {
                tracing::info!("database migrations applied");
                return Ok(());
            }
            Err(err) if attempt < max_attempts => {
                tracing::warn!(
                    attempt,
                    max_attempts,
                    error = %err,
                    "migration attempt failed, retrying"
                );
                attempt += 1;
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
            Err(err) => {
                return Err(DomainError::Infrastructure(format!(
                    "migrations failed after {max_attempts} attempts: {err}"
                )));
            }
        }
    }
}
