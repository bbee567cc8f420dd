use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

fn log_poisoned(lock_type: &str, context: &str) {
    log::error!("{} lock poisoned in {}", lock_type, context);
}

/// Locks `mutex`, recovering the guard if a previous holder panicked.
pub fn lock_mutex<'a, T>(mutex: &'a Mutex<T>, context: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log_poisoned("Mutex", context);
            poisoned.into_inner()
        }
    }
}

/// Polls `done` every `poll` until it returns true or `timeout` elapses.
///
/// Returns whether the condition was met.
pub fn wait_until<F>(timeout: Duration, poll: Duration, mut done: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    loop {
        if done() {
            return true;
        }
        if start.elapsed() >= timeout {
            return false;
        }
        std::thread::sleep(poll);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn poisoned_mutex_is_recovered() {
        let mutex = Arc::new(Mutex::new(7));
        let m = mutex.clone();
        let _ = std::thread::spawn(move || {
            let _guard = m.lock().unwrap();
            panic!("poison");
        })
        .join();

        assert!(mutex.is_poisoned());
        assert_eq!(*lock_mutex(&mutex, "test"), 7);
    }

    #[test]
    fn wait_until_times_out() {
        let met = wait_until(Duration::from_millis(20), Duration::from_millis(5), || false);
        assert!(!met);
    }

    #[test]
    fn wait_until_sees_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let f = flag.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            f.store(true, Ordering::SeqCst);
        });

        assert!(wait_until(Duration::from_secs(2), Duration::from_millis(2), || {
            flag.load(Ordering::SeqCst)
        }));
    }
}
