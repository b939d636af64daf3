//! Turn termination signals into cancellation of a [`CancelToken`].
//!
//! There are two independent mechanisms:
//!
//! * [`cancel_on_signals`] runs an operation while a listener thread
//!   watches for `SIGINT`, `SIGQUIT` and `SIGTERM`. The first signal
//!   cancels the token, and the operation is expected to stop and clean
//!   up by itself.
//!
//! * [`InterruptCleanup`] is the last resort. If the token is cancelled
//!   and the operation does not finish before a grace period, it removes
//!   the registered files and terminates the process.

use std::{
    io,
    path::PathBuf,
    sync::mpsc::{self, Receiver, RecvTimeoutError},
    thread,
    time::Duration,
};

use signal_hook::{
    consts::{SIGINT, SIGQUIT, SIGTERM},
    iterator::Signals,
};

use crate::{CancelToken, EventHandler};

/// Signals handled while a pull is running.
const SIGNALS: [i32; 3] = [SIGINT, SIGQUIT, SIGTERM];

/// How often the cleanup watcher checks its state.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default time for an operation to finish after its token is cancelled.
const DEFAULT_GRACE: Duration = Duration::from_secs(5);

/// Signals registered for a single operation.
///
/// While a registration is alive, the handled signals don't terminate the
/// process. They are delivered to the listener of [`cancel_on_signals`].
pub struct Registration {
    signals: Signals,
}

impl Registration {
    pub fn install() -> io::Result<Self> {
        Ok(Registration {
            signals: Signals::new(SIGNALS)?,
        })
    }
}

/// Run `operation`, and cancel `token` if a termination signal is
/// received before it returns.
///
/// The listener thread is stopped when `operation` returns, and the
/// signals are unregistered with `registration`.
pub fn cancel_on_signals<R>(
    mut registration: Registration,
    token: &CancelToken,
    event_handler: &dyn EventHandler,
    operation: impl FnOnce() -> R,
) -> R {
    let handle = registration.signals.handle();
    let signals = &mut registration.signals;

    thread::scope(|scope| {
        scope.spawn(move || {
            if signals.forever().next().is_some() {
                event_handler.signal_received();
                token.cancel();
            }
        });

        let result = operation();
        handle.close();
        result
    })
}

/// Remove files and terminate the process if an operation does not
/// finish after its token is cancelled.
pub struct InterruptCleanup<'a> {
    files: Vec<PathBuf>,
    grace: Duration,
    on_expire: Box<dyn FnOnce() + Send + 'a>,
}

impl<'a> InterruptCleanup<'a> {
    /// Register `files` to be removed.
    ///
    /// By default, the process exits with status `1` after removing them.
    pub fn new<I>(files: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<PathBuf>,
    {
        InterruptCleanup {
            files: files.into_iter().map(Into::into).collect(),
            grace: DEFAULT_GRACE,
            on_expire: Box::new(|| std::process::exit(1)),
        }
    }

    /// Time to wait for the operation after the token is cancelled.
    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Replace the action executed after the files are removed.
    pub fn on_expire(mut self, action: impl FnOnce() + Send + 'a) -> Self {
        self.on_expire = Box::new(action);
        self
    }

    /// Run `operation` while watching `token`.
    pub fn watch<R>(
        self,
        token: &CancelToken,
        event_handler: &dyn EventHandler,
        operation: impl FnOnce() -> R,
    ) -> R {
        let (done, done_rx) = mpsc::channel::<()>();

        thread::scope(|scope| {
            scope.spawn(move || self.run(token, event_handler, done_rx));

            let result = operation();
            drop(done);
            result
        })
    }

    fn run(self, token: &CancelToken, event_handler: &dyn EventHandler, done: Receiver<()>) {
        loop {
            if token.wait_timeout(POLL_INTERVAL) {
                break;
            }

            match done.try_recv() {
                Err(mpsc::TryRecvError::Empty) => (),
                _ => return,
            }
        }

        // Give the operation the chance to clean up by itself.
        match done.recv_timeout(self.grace) {
            Err(RecvTimeoutError::Timeout) => (),
            _ => return,
        }

        for file in &self.files {
            let result = match std::fs::remove_file(file) {
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                r => r,
            };

            event_handler.interrupt_cleanup(file, &result);
        }

        (self.on_expire)();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::NoEventHandler;

    #[test]
    fn cleanup_after_grace_period() {
        let target = tempfile::tempdir().unwrap();
        let file = target.path().join("partial");
        std::fs::write(&file, b"x").unwrap();

        let token = CancelToken::new();
        let expired = AtomicBool::new(false);

        InterruptCleanup::new([&file])
            .grace(Duration::from_millis(10))
            .on_expire(|| expired.store(true, Ordering::SeqCst))
            .watch(&token, &NoEventHandler, || {
                token.cancel();

                // Ignore the cancellation until the watcher gives up.
                while !expired.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(5));
                }
            });

        assert!(!file.exists());
    }

    #[test]
    fn no_cleanup_if_operation_finishes() {
        let target = tempfile::tempdir().unwrap();
        let file = target.path().join("partial");
        std::fs::write(&file, b"x").unwrap();

        let token = CancelToken::new();
        let expired = AtomicBool::new(false);

        let result = InterruptCleanup::new([&file])
            .grace(Duration::from_secs(30))
            .on_expire(|| expired.store(true, Ordering::SeqCst))
            .watch(&token, &NoEventHandler, || {
                token.cancel();
                42
            });

        assert_eq!(result, 42);
        assert!(!expired.load(Ordering::SeqCst));
        assert!(file.exists());
    }

    #[test]
    fn listener_stops_with_operation() {
        let token = CancelToken::new();
        let registration = Registration::install().unwrap();

        let value = cancel_on_signals(registration, &token, &NoEventHandler, || "done");

        assert_eq!(value, "done");
        assert!(!token.is_cancelled());

        // Signals are delivered to all registrations, so this runs after
        // the first listener is stopped.
        let token = CancelToken::new();
        let registration = Registration::install().unwrap();

        let cancelled = cancel_on_signals(registration, &token, &NoEventHandler, || {
            signal_hook::low_level::raise(SIGQUIT).unwrap();
            token.wait_timeout(Duration::from_secs(30))
        });

        assert!(cancelled);
    }
}
