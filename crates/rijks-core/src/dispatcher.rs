//! Bounded-concurrency dispatcher (spec.md §4.8/§3.9).
//!
//! A semaphore caps in-flight tasks; a single `mpsc` channel carries
//! completed results, in completion order, to whichever writer loop the
//! caller runs. A failed task is counted, not fatal — its input row simply
//! doesn't get its "done" flag set, leaving it for the next `--resume` run.

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tracing::{info, warn};

/// Outcome of one dispatched task.
pub enum TaskOutcome<T> {
    Ok(T),
    Failed,
}

/// Run `items` through `task` with at most `parallelism` concurrent, streaming
/// completions into `on_result` as they land (not in submission order).
/// Returns (ok_count, failed_count).
pub async fn run<I, T, F, Fut, W>(
    items: Vec<I>,
    parallelism: usize,
    progress_every: usize,
    task: F,
    mut on_result: W,
) -> (usize, usize)
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Option<T>> + Send,
    W: FnMut(T),
{
    let total = items.len();
    let semaphore = Arc::new(Semaphore::new(parallelism.max(1)));
    let task = Arc::new(task);
    let (tx, mut rx) = mpsc::channel::<TaskOutcome<T>>(parallelism.max(1) * 2);

    let dispatch = {
        let semaphore = Arc::clone(&semaphore);
        let task = Arc::clone(&task);
        let tx = tx.clone();
        async move {
            let mut handles = Vec::with_capacity(total);
            for item in items {
                let permit = Arc::clone(&semaphore).acquire_owned().await.unwrap();
                let task = Arc::clone(&task);
                let tx = tx.clone();
                handles.push(tokio::spawn(async move {
                    let _permit = permit;
                    let outcome = match task(item).await {
                        Some(v) => TaskOutcome::Ok(v),
                        None => TaskOutcome::Failed,
                    };
                    let _ = tx.send(outcome).await;
                }));
            }
            for h in handles {
                let _ = h.await;
            }
        }
    };
    drop(tx);

    let collect = async {
        let mut ok = 0usize;
        let mut failed = 0usize;
        let mut completed = 0usize;
        while let Some(outcome) = rx.recv().await {
            completed += 1;
            match outcome {
                TaskOutcome::Ok(v) => {
                    ok += 1;
                    on_result(v);
                }
                TaskOutcome::Failed => {
                    failed += 1;
                    warn!(completed, total, "task failed, leaving for resume");
                }
            }
            if progress_every > 0 && completed % progress_every == 0 {
                info!(completed, total, ok, failed, "dispatcher progress");
            }
        }
        (ok, failed)
    };

    let (_, result) = tokio::join!(dispatch, collect);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn runs_all_tasks_and_counts_failures() {
        let items: Vec<i32> = (0..20).collect();
        let collected = Arc::new(std::sync::Mutex::new(Vec::new()));
        let collected_clone = Arc::clone(&collected);

        let (ok, failed) = run(
            items,
            4,
            0,
            |i| async move {
                if i % 5 == 0 {
                    None
                } else {
                    Some(i * 2)
                }
            },
            move |v| collected_clone.lock().unwrap().push(v),
        )
        .await;

        assert_eq!(ok, 16);
        assert_eq!(failed, 4);
        assert_eq!(collected.lock().unwrap().len(), 16);
    }

    #[tokio::test]
    async fn respects_bounded_parallelism() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let items: Vec<i32> = (0..30).collect();

        let in_flight_c = Arc::clone(&in_flight);
        let max_seen_c = Arc::clone(&max_seen);
        let (ok, failed) = run(
            items,
            3,
            0,
            move |i| {
                let in_flight = Arc::clone(&in_flight_c);
                let max_seen = Arc::clone(&max_seen_c);
                async move {
                    let cur = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(cur, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Some(i)
                }
            },
            |_| {},
        )
        .await;

        assert_eq!(ok, 30);
        assert_eq!(failed, 0);
        assert!(max_seen.load(Ordering::SeqCst) <= 3);
    }
}
