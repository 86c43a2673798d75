//! Generic task queue / worker pool: a direct structural translation of the
//! source tool's `process_tasks` from `multiprocessing.Queue`s to
//! `tokio::sync::mpsc` channels and spawned tasks, since the workload here is
//! I/O-bound rather than CPU-bound.

use std::collections::HashSet;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

/// Runs `worker` over `seed_tasks` with `worker_count` concurrent tokio
/// tasks, returning once the transitive closure of follow-ups is drained.
/// `pre_done` seeds the `seen` set without ever being dequeued itself —
/// used by Phase 5 to skip objects that are already packed.
///
/// Each spawned task builds its own session via `new_session` before it
/// starts dequeuing, and keeps that session to itself for the task's whole
/// lifetime — no two concurrently running tasks ever share the same session
/// value, so one task's session rebuild (e.g. after a 403) never disturbs
/// another's in-flight request.
///
/// Returns the full `seen` set on completion (every task ever observed,
/// including `pre_done`), which callers can use for diagnostics.
pub async fn run_pool<T, Ctx, S, N, F, Fut>(
    seed_tasks: Vec<T>,
    pre_done: HashSet<T>,
    worker_count: usize,
    ctx: Arc<Ctx>,
    new_session: N,
    worker: F,
) -> HashSet<T>
where
    T: Eq + Hash + Clone + Send + Sync + 'static,
    Ctx: Send + Sync + 'static,
    S: Send + 'static,
    N: Fn() -> S + Send + Sync + 'static,
    F: Fn(T, Arc<Ctx>, S) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = (Vec<T>, S)> + Send + 'static,
{
    let mut seen: HashSet<T> = pre_done;

    if seed_tasks.is_empty() {
        return seen;
    }

    let (pending_tx, pending_rx) = mpsc::unbounded_channel::<Option<T>>();
    let (results_tx, mut results_rx) = mpsc::unbounded_channel::<Vec<T>>();

    let pending_rx = Arc::new(tokio::sync::Mutex::new(pending_rx));
    let new_session = Arc::new(new_session);
    let mut handles = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let pending_rx = Arc::clone(&pending_rx);
        let results_tx = results_tx.clone();
        let ctx = Arc::clone(&ctx);
        let worker = worker.clone();
        let new_session = Arc::clone(&new_session);
        handles.push(tokio::spawn(async move {
            let mut session = new_session();
            loop {
                let task = {
                    let mut rx = pending_rx.lock().await;
                    rx.recv().await
                };
                match task {
                    None | Some(None) => return,
                    Some(Some(task)) => {
                        let (follow_ups, next_session) =
                            worker(task, Arc::clone(&ctx), session).await;
                        session = next_session;
                        if results_tx.send(follow_ups).is_err() {
                            return;
                        }
                    }
                }
            }
        }));
    }
    drop(results_tx);

    let mut num_outstanding = 0usize;
    for task in seed_tasks {
        if seen.insert(task.clone()) {
            num_outstanding += 1;
            let _ = pending_tx.send(Some(task));
        }
    }

    while num_outstanding > 0 {
        let Some(follow_ups) = results_rx.recv().await else {
            break;
        };
        num_outstanding -= 1;
        for task in follow_ups {
            if seen.insert(task.clone()) {
                num_outstanding += 1;
                let _ = pending_tx.send(Some(task));
            }
        }
    }

    for _ in 0..worker_count {
        let _ = pending_tx.send(None);
    }
    drop(pending_tx);

    for handle in handles {
        let _ = handle.await;
    }

    debug!("pool drained: {} tasks seen total", seen.len());
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    #[tokio::test]
    async fn closure_is_exhausted_exactly_once() {
        // A chain 0 -> 1 -> 2 -> 3 (no branching); each task is its own
        // follow-up chain element. Every value must be visited exactly once.
        let ctx = Arc::new(Counter(AtomicUsize::new(0)));
        let seen = run_pool(
            vec![0u32],
            HashSet::new(),
            4,
            ctx.clone(),
            || (),
            |task, ctx, session| async move {
                ctx.0.fetch_add(1, Ordering::SeqCst);
                if task < 3 {
                    (vec![task + 1], session)
                } else {
                    (vec![], session)
                }
            },
        )
        .await;

        assert_eq!(seen, HashSet::from([0, 1, 2, 3]));
        assert_eq!(ctx.0.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn pre_done_tasks_are_never_dequeued() {
        let ctx = Arc::new(());
        let executed = Arc::new(std::sync::Mutex::new(Vec::new()));
        let executed_clone = executed.clone();
        let seen = run_pool(
            vec![1u32, 2, 3],
            HashSet::from([2u32]),
            2,
            ctx,
            || (),
            move |task, _ctx, session| {
                let executed = executed_clone.clone();
                async move {
                    executed.lock().unwrap().push(task);
                    (vec![], session)
                }
            },
        )
        .await;

        assert_eq!(seen, HashSet::from([1, 2, 3]));
        let ran = executed.lock().unwrap();
        assert!(ran.contains(&1));
        assert!(ran.contains(&3));
        assert!(!ran.contains(&2));
    }
}
