//! Degrade-to-default combinators.
//!
//! Every dependency boundary in the pipeline (search, triangulation, role
//! calls, correction, audit, cache, report assembly) goes through one of
//! these helpers: the failure is logged once at `warn` and replaced with a
//! named default, never propagated.

use std::fmt::Display;
use std::future::Future;
use tracing::warn;

/// Await `fut`; on error, log it under `stage` and return `fallback`.
pub async fn degrade<T, E, F>(stage: &str, fallback: T, fut: F) -> T
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    match fut.await {
        Ok(value) => value,
        Err(e) => {
            warn!(stage, error = %e, "Degraded to default");
            fallback
        }
    }
}

/// Like [`degrade`], building the fallback lazily.
pub async fn degrade_with<T, E, F, D>(stage: &str, fut: F, fallback: D) -> T
where
    F: Future<Output = Result<T, E>>,
    E: Display,
    D: FnOnce() -> T,
{
    match fut.await {
        Ok(value) => value,
        Err(e) => {
            warn!(stage, error = %e, "Degraded to default");
            fallback()
        }
    }
}

/// Synchronous variant that turns a failure into `None`.
pub fn degrade_opt<T, E: Display>(stage: &str, result: Result<T, E>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(stage, error = %e, "Degraded to absent");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_degrade_passes_success_through() {
        let value = degrade("search", 0, async { Ok::<_, String>(7) }).await;
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_degrade_returns_fallback_on_error() {
        let value = degrade("search", 0, async { Err::<i32, _>("boom") }).await;
        assert_eq!(value, 0);
    }

    #[tokio::test]
    async fn test_degrade_with_is_lazy() {
        let mut called = false;
        let value = degrade_with("audit", async { Ok::<_, String>(1) }, || {
            called = true;
            2
        })
        .await;
        assert_eq!(value, 1);
        assert!(!called);
    }

    #[test]
    fn test_degrade_opt() {
        assert_eq!(degrade_opt("x", Ok::<_, String>(3)), Some(3));
        assert_eq!(degrade_opt::<i32, _>("x", Err("nope")), None);
    }
}
