//! The bounded worker-pool fan-out every I/O-bound batch operation uses:
//! TMDb detail fetch, IMDb-ID resolution, RSS match (§5 — worker pools are
//! bounded, default cap 5).

use futures::stream::{self, StreamExt};
use std::future::Future;

pub const DEFAULT_WORKER_CAP: usize = 5;

/// Runs `f` over every item in `items` with at most `worker_cap` futures
/// in flight at once, returning results in the original order.
pub async fn fan_out<T, F, Fut, R>(items: Vec<T>, worker_cap: usize, f: F) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    stream::iter(items)
        .map(f)
        .buffered(worker_cap.max(1))
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fan_out_preserves_order() {
        let items = vec![1, 2, 3, 4, 5];
        let results = fan_out(items, 2, |n| async move { n * 10 }).await;
        assert_eq!(results, vec![10, 20, 30, 40, 50]);
    }
}
