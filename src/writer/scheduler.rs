use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{Sender, TrySendError, bounded};

use crate::core::lock::wait_until;

/// Runs flushes on one dedicated thread.
///
/// A request is accepted only while no flush is in flight; otherwise it is
/// coalesced into the running one and the data stays buffered for the next.
pub struct FlushScheduler {
    signal: Option<Sender<()>>,
    in_flight: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    timeout: Duration,
    poll: Duration,
}

impl FlushScheduler {
    pub fn start<F>(job: F, timeout: Duration, poll: Duration) -> std::io::Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        // capacity 1: at most one pending signal
        let (tx, rx) = bounded::<()>(1);
        let in_flight = Arc::new(AtomicBool::new(false));
        let flag = in_flight.clone();

        let worker = std::thread::Builder::new()
            .name("flush-worker".into())
            .spawn(move || {
                while rx.recv().is_ok() {
                    job();
                    flag.store(false, Ordering::SeqCst);
                }
            })?;

        Ok(Self {
            signal: Some(tx),
            in_flight,
            worker: Some(worker),
            timeout,
            poll,
        })
    }

    /// Returns false when the request was coalesced or the worker is gone.
    pub fn request(&self) -> bool {
        let Some(signal) = &self.signal else {
            return false;
        };
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        match signal.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) | Err(TrySendError::Disconnected(())) => {
                self.in_flight.store(false, Ordering::SeqCst);
                false
            }
        }
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Runs one final flush and stops the worker.
    ///
    /// Waits at most the configured timeout overall. A worker that does not
    /// finish in time is detached and left to complete on its own. Returns
    /// whether the worker stopped in time.
    pub fn shutdown(&mut self) -> bool {
        let Some(worker) = self.worker.take() else {
            return true;
        };
        let deadline = Instant::now() + self.timeout;
        let remaining = || deadline.saturating_duration_since(Instant::now());

        if wait_until(remaining(), self.poll, || !self.in_flight()) {
            if !self.request() {
                log::warn!("[flush_worker] final flush could not be scheduled");
            }
        } else {
            log::warn!("[flush_worker] flush still running, skipping final flush");
        }

        // worker drains the pending signal, then sees the closed channel
        self.signal.take();

        if wait_until(remaining(), self.poll, || worker.is_finished()) {
            if worker.join().is_err() {
                log::error!("[flush_worker] worker panicked");
            }
            true
        } else {
            log::warn!(
                "[flush_worker] worker did not stop within {:?}, abandoning it",
                self.timeout
            );
            false
        }
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn coalesces_while_in_flight() {
        let runs = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(AtomicBool::new(false));
        let (r, g) = (runs.clone(), release.clone());

        let mut scheduler = FlushScheduler::start(
            move || {
                while !g.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(1));
                }
                r.fetch_add(1, Ordering::SeqCst);
            },
            Duration::from_secs(5),
            Duration::from_millis(2),
        )
        .unwrap();

        assert!(scheduler.request());
        assert!(!scheduler.request());
        assert!(!scheduler.request());
        release.store(true, Ordering::SeqCst);

        assert!(wait_until(Duration::from_secs(5), Duration::from_millis(1), || {
            !scheduler.in_flight()
        }));
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        assert!(scheduler.shutdown());
        // final flush on shutdown
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(!scheduler.request());
    }

    #[test]
    fn stuck_worker_is_abandoned() {
        let release = Arc::new(AtomicBool::new(false));
        let g = release.clone();
        let mut scheduler = FlushScheduler::start(
            move || {
                while !g.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(1));
                }
            },
            Duration::from_millis(50),
            Duration::from_millis(5),
        )
        .unwrap();

        assert!(scheduler.request());
        assert!(!scheduler.shutdown());
        release.store(true, Ordering::SeqCst);
    }
}
