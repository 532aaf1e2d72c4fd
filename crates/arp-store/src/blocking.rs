//! Store work from async code
//!
//! `update` may sleep while another process holds a lease. From inside the
//! runtime that work goes to the blocking pool instead.

use crate::error::StoreError;

/// Run `f` on tokio's blocking pool
///
/// # Errors
/// Returns `f`'s error, or `StoreError::Task` if `f` panicked or was cancelled
pub async fn blocking<R, E, F>(f: F) -> Result<R, E>
where
    F: FnOnce() -> Result<R, E> + Send + 'static,
    R: Send + 'static,
    E: From<StoreError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) => Err(StoreError::Task(e.to_string()).into()),
    }
}
