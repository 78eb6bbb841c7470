//! Fallible transforms over finite sequences of async work.

use futures::future::try_join_all;
use std::future::Future;

/// Runs `func` over each element in order, fully awaiting one invocation
/// before starting the next. Results are collected in input order; the first
/// failure stops further invocations and is propagated (results collected so
/// far are discarded).
pub async fn async_transform<I, F, Fut, U, E>(inputs: I, mut func: F) -> Result<Vec<U>, E>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<U, E>>,
{
    let iter = inputs.into_iter();
    let mut results = Vec::with_capacity(iter.size_hint().0);
    for input in iter {
        results.push(func(input).await?);
    }
    Ok(results)
}

/// Starts `func` for every element immediately and awaits them all. On
/// success, results are in input order; on failure, one of the errors is
/// propagated.
pub async fn parallel_transform<I, F, Fut, U, E>(inputs: I, func: F) -> Result<Vec<U>, E>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<U, E>>,
{
    try_join_all(inputs.into_iter().map(func)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_async_transform_preserves_order() {
        let results = async_transform(1..=5, |n| async move { Ok::<_, ()>(n * 10) })
            .await
            .unwrap();
        assert_eq!(results, vec![10, 20, 30, 40, 50]);
    }

    #[tokio::test]
    async fn test_async_transform_is_sequential() {
        // Each invocation observes that no other invocation is running.
        let active = Arc::new(AtomicUsize::new(0));
        async_transform(0..8, |_| {
            let active = Arc::clone(&active);
            async move {
                assert_eq!(active.fetch_add(1, Ordering::SeqCst), 0);
                tokio::time::sleep(Duration::from_millis(1)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, ()>(())
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_async_transform_stops_at_first_error() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let result = async_transform(0..10, |n| {
            let invocations = Arc::clone(&invocations);
            async move {
                invocations.fetch_add(1, Ordering::SeqCst);
                if n == 3 {
                    Err("boom")
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Err("boom"));
        // Elements after the failing one were never invoked.
        assert_eq!(invocations.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_parallel_transform_preserves_order() {
        // Later elements finish first; output order must still match input.
        let results = parallel_transform(0..5u64, |n| async move {
            tokio::time::sleep(Duration::from_millis(50 - n * 10)).await;
            Ok::<_, ()>(n)
        })
        .await
        .unwrap();
        assert_eq!(results, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_parallel_transform_runs_concurrently() {
        // With 4 concurrent 20ms sleeps, the whole batch finishes well under
        // the 80ms a sequential run would need.
        let start = tokio::time::Instant::now();
        parallel_transform(0..4, |_| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, ()>(())
        })
        .await
        .unwrap();
        assert!(start.elapsed() < Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_parallel_transform_propagates_failure() {
        let result = parallel_transform(0..4, |n| async move {
            if n % 2 == 1 {
                Err(n)
            } else {
                Ok(n)
            }
        })
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_owned_range_outlives_invocations() {
        // Owned collection moved into the transform.
        let words: Vec<String> = vec!["a".into(), "b".into()];
        let results = async_transform(words, |w| async move { Ok::<_, ()>(w.len()) })
            .await
            .unwrap();
        assert_eq!(results, vec![1, 1]);
    }
}
