use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Shutdown and restart requests for the background workers.
///
/// Unlike `thread::sleep()`, waits on this signal return early as soon as either
/// request is raised.
pub struct WorkerSignal {
    shutdown: AtomicBool,
    restart: AtomicBool,
    condvar: Condvar,
    mutex: Mutex<()>,
}

impl WorkerSignal {
    /// Create a new signal with no request pending.
    pub fn new() -> Self {
        Self {
            shutdown: AtomicBool::new(false),
            restart: AtomicBool::new(false),
            condvar: Condvar::new(),
            mutex: Mutex::new(()),
        }
    }

    /// Request shutdown, waking all waiting threads.
    pub fn trigger(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.condvar.notify_all();
    }

    /// Check if shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Ask the session worker to drop the current session and start over.
    pub fn request_restart(&self) {
        self.restart.store(true, Ordering::SeqCst);
        self.condvar.notify_all();
    }

    /// Consume a pending restart request.
    pub fn take_restart(&self) -> bool {
        self.restart.swap(false, Ordering::SeqCst)
    }

    fn interrupted(&self) -> bool {
        self.is_shutdown() || self.restart.load(Ordering::SeqCst)
    }

    /// Wait for the specified duration or until a request is raised.
    ///
    /// Returns `true` if the wait was interrupted, `false` if it completed normally.
    pub fn wait(&self, duration: Duration) -> bool {
        if self.interrupted() {
            return true;
        }

        let guard = match self.mutex.lock() {
            Ok(guard) => guard,
            // Mutex poisoned, treat as shutdown
            Err(_) => return true,
        };
        let result = self
            .condvar
            .wait_timeout_while(guard, duration, |_| !self.interrupted());

        match result {
            Ok((_, timeout_result)) => !timeout_result.timed_out(),
            Err(_) => true,
        }
    }
}

impl Default for WorkerSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_initial_state() {
        let signal = WorkerSignal::new();
        assert!(!signal.is_shutdown());
        assert!(!signal.take_restart());
    }

    #[test]
    fn test_wait_timeout() {
        let signal = WorkerSignal::new();
        let start = Instant::now();
        let interrupted = signal.wait(Duration::from_millis(50));
        let elapsed = start.elapsed();

        assert!(!interrupted);
        assert!(elapsed >= Duration::from_millis(50));
    }

    #[test]
    fn test_wait_interrupted_by_shutdown() {
        let signal = Arc::new(WorkerSignal::new());
        let signal_clone = Arc::clone(&signal);

        let handle = thread::spawn(move || {
            let start = Instant::now();
            let interrupted = signal_clone.wait(Duration::from_secs(10));
            (interrupted, start.elapsed())
        });

        thread::sleep(Duration::from_millis(50));
        signal.trigger();

        let (interrupted, elapsed) = handle.join().unwrap();
        assert!(interrupted);
        assert!(elapsed < Duration::from_secs(1));
    }

    #[test]
    fn test_restart_interrupts_once() {
        let signal = WorkerSignal::new();
        signal.request_restart();
        assert!(signal.wait(Duration::from_secs(10)));
        assert!(signal.take_restart());
        assert!(!signal.take_restart());
        assert!(!signal.wait(Duration::from_millis(10)));
        assert!(!signal.is_shutdown());
    }
}
