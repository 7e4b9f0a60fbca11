pub mod pool;

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;

const MAX_RETRIES: u32 = 3;

/// Postgres serialization failures and deadlocks are retryable; everything
/// else is not.
fn is_transient(err: &Error) -> bool {
    if let Error::Database(sqlx::Error::Database(db_err)) = err {
        matches!(db_err.code().as_deref(), Some("40001") | Some("40P01"))
    } else {
        false
    }
}

/// Runs `op` up to three times with exponential backoff on deadlock or
/// serialization failure. Exhausted retries surface as `Transient` (503).
pub async fn with_retry<T, F, Fut>(mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(val) => return Ok(val),
            Err(err) if is_transient(&err) => {
                attempt += 1;
                if attempt >= MAX_RETRIES {
                    return Err(Error::Transient(err.to_string()));
                }
                let backoff = Duration::from_millis(50 * 2u64.pow(attempt));
                tracing::warn!(attempt, error = %err, "retrying transient database failure");
                tokio::time::sleep(backoff).await;
            }
            Err(err) => return Err(err),
        }
    }
}
