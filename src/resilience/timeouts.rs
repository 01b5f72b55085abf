//! Per-unit deadline enforcement.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::driver::NativeError;

/// A dispatch unit did not finish within its deadline.
#[derive(Debug, Error)]
#[error("operation did not complete within {0:?}")]
pub struct UnitTimeout(pub Duration);

/// Run `operation`, failing with [`UnitTimeout`] once `limit` elapses.
///
/// Without a limit the operation runs to completion.
pub async fn run_bounded<T, F>(limit: Option<Duration>, operation: F) -> Result<T, NativeError>
where
    F: Future<Output = Result<T, NativeError>>,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, operation).await {
            Ok(result) => result,
            Err(_) => Err(Box::new(UnitTimeout(limit))),
        },
        None => operation.await,
    }
}
