//! Sweep Timer Task
//!
//! One-shot timers that hand a region's expiration sweep to a blocking thread.
//!
//! Timers run on a dedicated process-wide tokio runtime so that regions work
//! the same whether or not the caller is itself inside an async context.

use std::io;
use std::sync::OnceLock;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{CacheError, Result};

static SWEEP_RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Starts the sweep runtime with the given configuration.
///
/// Calling this is optional: the runtime is otherwise built from
/// [`Config::from_env`] the first time a region arms a timer. If that lazy
/// start fails, the region logs the error and leaves its sweep unscheduled
/// until a later add retries, so calling this at startup is the way to
/// surface the failure. Once a runtime is running, later calls are no-ops.
///
/// # Errors
/// Returns [`CacheError::Runtime`] if the runtime's threads cannot be spawned.
pub fn install_sweeper(config: &Config) -> Result<()> {
    if SWEEP_RUNTIME.get().is_some() {
        debug!("Sweep runtime already installed");
        return Ok(());
    }

    get_or_start(&SWEEP_RUNTIME, || build_runtime(config))?;
    info!(
        "Sweep runtime started with {} worker(s), {} blocking thread(s)",
        config.sweep_worker_threads, config.sweep_blocking_threads
    );
    Ok(())
}

fn build_runtime(config: &Config) -> io::Result<Runtime> {
    Builder::new_multi_thread()
        .worker_threads(config.sweep_worker_threads.max(1))
        .max_blocking_threads(config.sweep_blocking_threads.max(1))
        .thread_name("region-sweep")
        .enable_time()
        .build()
}

/// Returns the runtime held in `cell`, building it with `build` if empty.
///
/// A failed build leaves `cell` empty so a later call can try again.
fn get_or_start<F>(cell: &'static OnceLock<Runtime>, build: F) -> Result<&'static Runtime>
where
    F: FnOnce() -> io::Result<Runtime>,
{
    if let Some(runtime) = cell.get() {
        return Ok(runtime);
    }

    let runtime = build()?;
    if let Err(runtime) = cell.set(runtime) {
        // Lost the race against another starter.
        runtime.shutdown_background();
    }
    cell.get().ok_or_else(|| {
        CacheError::Runtime(io::Error::new(
            io::ErrorKind::Other,
            "sweep runtime unavailable",
        ))
    })
}

fn runtime() -> Result<&'static Runtime> {
    get_or_start(&SWEEP_RUNTIME, || {
        let config = Config::from_env();
        info!(
            "Starting sweep runtime lazily with {} worker(s)",
            config.sweep_worker_threads
        );
        build_runtime(&config)
    })
}

/// Arms a one-shot timer that runs `sweep` after `delay`.
///
/// The sweep runs on the runtime's blocking pool rather than inside the timer
/// task, so a slow sweep never holds up other timers. Aborting the returned
/// handle before the delay elapses cancels the sweep; a sweep that has
/// already been handed off is not affected by the abort.
///
/// # Errors
/// Returns [`CacheError::Runtime`] if the sweep runtime cannot be started.
pub(crate) fn schedule_sweep<F>(delay: Duration, sweep: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    Ok(runtime()?.spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = tokio::task::spawn_blocking(sweep);
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread::sleep;

    #[test]
    fn test_scheduled_sweep_fires() {
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();

        let _handle = schedule_sweep(Duration::from_millis(20), move || {
            f.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        sleep(Duration::from_millis(300));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_aborted_sweep_does_not_fire() {
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();

        let handle = schedule_sweep(Duration::from_millis(100), move || {
            f.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        handle.abort();

        sleep(Duration::from_millis(300));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(handle.is_finished(), "Timer should be finished after abort");
    }

    #[test]
    fn test_install_sweeper_is_idempotent() {
        let config = Config::default();
        assert!(install_sweeper(&config).is_ok());
        assert!(install_sweeper(&config).is_ok());
    }

    #[test]
    fn test_failed_start_returns_error_and_allows_retry() {
        static CELL: OnceLock<Runtime> = OnceLock::new();

        let result = get_or_start(&CELL, || {
            Err(io::Error::new(io::ErrorKind::Other, "no threads left"))
        });
        assert!(matches!(result, Err(CacheError::Runtime(_))));
        assert!(CELL.get().is_none(), "Failed start must leave the slot empty");

        let retried = get_or_start(&CELL, || {
            Builder::new_current_thread().enable_time().build()
        });
        assert!(retried.is_ok());
        assert!(CELL.get().is_some());
    }
}
