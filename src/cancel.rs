use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex,
    },
    time::Duration,
};

/// Cooperative cancellation flag, shared by a pull and its fetcher.
///
/// Cancelling the token does not interrupt anything by itself. Long
/// operations are expected to check [`is_cancelled`][Self::is_cancelled]
/// often, and stop as soon as possible.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<Inner>);

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    lock: Mutex<()>,
    notifier: Condvar,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the operation, and wake up any thread waiting in
    /// [`wait_timeout`][Self::wait_timeout].
    pub fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::SeqCst);

        let _lock = self.0.lock.lock().unwrap();
        self.0.notifier.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::SeqCst)
    }

    /// Block until the token is cancelled, or `timeout` expires.
    ///
    /// Returns `true` if the token is cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let lock = self.0.lock.lock().unwrap();
        let _ = self
            .0
            .notifier
            .wait_timeout_while(lock, timeout, |_| !self.is_cancelled())
            .unwrap();

        self.is_cancelled()
    }
}

#[test]
fn cancel_wakes_up_waiting_threads() {
    use std::time::Instant;

    let token = CancelToken::new();
    assert!(!token.wait_timeout(Duration::from_millis(1)));

    let waiter = {
        let token = token.clone();
        std::thread::spawn(move || {
            let start = Instant::now();
            let cancelled = token.wait_timeout(Duration::from_secs(30));
            (cancelled, start.elapsed())
        })
    };

    std::thread::sleep(Duration::from_millis(20));
    token.cancel();

    let (cancelled, elapsed) = waiter.join().unwrap();
    assert!(cancelled);
    assert!(elapsed < Duration::from_secs(30));
    assert!(token.is_cancelled());
}
