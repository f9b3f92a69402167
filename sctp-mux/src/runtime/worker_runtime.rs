//! Runtime helper for spawning decoder source loops.

use std::future::Future;
use std::io;
use std::thread;
use tokio::runtime::Builder;
use tokio::sync::oneshot;
use tracing::error;

/// Runs `run_loop` on a dedicated thread with its own current-thread tokio
/// runtime.
///
/// The returned receiver completes once the loop has returned. The runtime
/// is built and dropped on the worker thread, never inside the caller's
/// async context.
pub(crate) fn spawn_worker_loop<F, Fut>(
    thread_name: String,
    run_loop: F,
) -> io::Result<oneshot::Receiver<()>>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + 'static,
{
    let (done_tx, done_rx) = oneshot::channel();

    thread::Builder::new()
        .name(thread_name.clone())
        .spawn(move || {
            match Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime.block_on(run_loop()),
                Err(err) => error!("{thread_name}: unable to create worker runtime: {err}"),
            }
            let _ = done_tx.send(());
        })?;

    Ok(done_rx)
}

#[cfg(test)]
mod tests {
    use super::spawn_worker_loop;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn completion_is_signalled_after_loop_returns() {
        let ran = Arc::new(AtomicBool::new(false));
        let done = {
            let ran = ran.clone();
            spawn_worker_loop("worker-test".to_string(), move || async move {
                tokio::task::yield_now().await;
                ran.store(true, Ordering::SeqCst);
            })
            .expect("spawn worker")
        };

        done.await.expect("loop finished");
        assert!(ran.load(Ordering::SeqCst));
    }
}
