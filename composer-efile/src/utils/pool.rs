//! Chunked worker pools
//!
//! Items are split into `ceil(len / workers)`-sized chunks; each chunk is one
//! unit of work and owns its items. Every chunk runs to completion before the
//! outcome is decided: failures and panics are collected and the first one is
//! returned as [`Error::BatchFailure`].

use composer_common::{Error, Result};
use rayon::prelude::*;
use std::any::Any;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio::task::JoinSet;

/// Chunk size that spreads `len` items over `workers` chunks
pub fn chunk_size(len: usize, workers: usize) -> usize {
    len.div_ceil(workers.max(1))
}

/// Split items into consecutive chunks, preserving order within each chunk
pub fn split_to_chunks<T>(items: Vec<T>, chunk_size: usize) -> Vec<Vec<T>> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::with_capacity(items.len().div_ceil(chunk_size));
    let mut iter = items.into_iter().peekable();
    while iter.peek().is_some() {
        chunks.push(iter.by_ref().take(chunk_size).collect());
    }
    chunks
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn first_failure(stage: &str, outcomes: Vec<Result<()>>) -> Result<()> {
    let mut failures = outcomes.into_iter().filter_map(|outcome| outcome.err());
    let Some(first) = failures.next() else {
        return Ok(());
    };
    let others = failures.count();
    tracing::error!(
        stage,
        failed_chunks = others + 1,
        error = %first,
        "Worker pool finished with failures"
    );
    Err(Error::batch_failure(stage, first))
}

/// Run `func` over chunks of `items` on a dedicated rayon pool of `workers`
/// threads. For CPU-bound and blocking work.
pub async fn run_on_cpu_pool<T, F>(stage: &str, items: Vec<T>, workers: usize, func: F) -> Result<()>
where
    T: Send + 'static,
    F: Fn(Vec<T>) -> Result<()> + Send + Sync + 'static,
{
    if items.is_empty() {
        return Ok(());
    }

    let workers = workers.max(1);
    let size = chunk_size(items.len(), workers);
    let chunks = split_to_chunks(items, size);
    tracing::debug!(stage, chunks = chunks.len(), chunk_size = size, workers, "Dispatching CPU pool");

    let thread_prefix = stage.to_string();
    // Rayon work stays off the async runtime threads
    let outcomes = tokio::task::spawn_blocking(move || -> Result<Vec<Result<()>>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(move |i| format!("{}-{}", thread_prefix, i))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build worker pool: {}", e)))?;

        Ok(pool.install(|| {
            chunks
                .into_par_iter()
                .map(|chunk| {
                    catch_unwind(AssertUnwindSafe(|| func(chunk))).unwrap_or_else(|payload| {
                        Err(Error::Internal(format!(
                            "worker panicked: {}",
                            panic_message(payload.as_ref())
                        )))
                    })
                })
                .collect()
        }))
    })
    .await
    .map_err(|e| Error::batch_failure(stage, Error::Internal(format!("worker pool task failed: {}", e))))??;

    first_failure(stage, outcomes)
}

/// Run `func` over chunks of `items` as concurrent tokio tasks.
/// For I/O-bound work; each chunk may add its own inner concurrency.
pub async fn run_on_task_pool<T, F, Fut>(
    stage: &str,
    items: Vec<T>,
    workers: usize,
    func: F,
) -> Result<()>
where
    T: Send + 'static,
    F: Fn(Vec<T>) -> Fut,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    if items.is_empty() {
        return Ok(());
    }

    let size = chunk_size(items.len(), workers);
    let chunks = split_to_chunks(items, size);
    tracing::debug!(stage, chunks = chunks.len(), chunk_size = size, "Dispatching task pool");

    let mut set = JoinSet::new();
    for chunk in chunks {
        set.spawn(func(chunk));
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = set.join_next().await {
        outcomes.push(match joined {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => Err(Error::Internal(format!(
                "worker panicked: {}",
                panic_message(e.into_panic().as_ref())
            ))),
            Err(e) => Err(Error::Internal(format!("worker task failed: {}", e))),
        });
    }

    first_failure(stage, outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_chunk_size_rounds_up() {
        assert_eq!(chunk_size(10, 4), 3);
        assert_eq!(chunk_size(8, 4), 2);
        assert_eq!(chunk_size(3, 8), 1);
        assert_eq!(chunk_size(5, 0), 5);
    }

    #[test]
    fn test_split_preserves_order() {
        let chunks = split_to_chunks((0..7).collect::<Vec<_>>(), 3);
        assert_eq!(chunks, vec![vec![0, 1, 2], vec![3, 4, 5], vec![6]]);
    }

    #[tokio::test]
    async fn test_cpu_pool_visits_every_item() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        run_on_cpu_pool("count", (0..25).collect(), 4, move |chunk: Vec<i32>| {
            counter.fetch_add(chunk.len(), Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 25);
    }

    #[tokio::test]
    async fn test_cpu_pool_finishes_siblings_before_failing() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let result = run_on_cpu_pool("convert", (0..8).collect(), 4, move |chunk: Vec<i32>| {
            if chunk.contains(&0) {
                panic!("boom");
            }
            counter.fetch_add(chunk.len(), Ordering::SeqCst);
            Ok(())
        })
        .await;

        match result {
            Err(Error::BatchFailure { stage, source }) => {
                assert_eq!(stage, "convert");
                assert!(source.to_string().contains("boom"));
            }
            other => panic!("expected BatchFailure, got {:?}", other),
        }
        assert_eq!(seen.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_task_pool_reports_first_error() {
        let seen = Arc::new(AtomicUsize::new(0));
        let result = run_on_task_pool("fetch", (0..6).collect(), 3, |chunk: Vec<i32>| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(chunk.len(), Ordering::SeqCst);
                if chunk.contains(&5) {
                    Err(Error::Internal("unreachable host".to_string()))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(matches!(result, Err(Error::BatchFailure { .. })));
        assert_eq!(seen.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_empty_input_is_noop() {
        run_on_task_pool("fetch", Vec::<i32>::new(), 3, |_| async { Ok(()) })
            .await
            .unwrap();
        run_on_cpu_pool("compose", Vec::<i32>::new(), 3, |_| Ok(()))
            .await
            .unwrap();
    }
}
