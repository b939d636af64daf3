use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use image_pull::{
    FetchContext, FetchError, Fetcher, PullRequest, Reference, VerificationResult, Verifier,
    VerifyError,
};

type Action = Box<dyn Fn(&Path) -> Result<(), FetchError> + Send + Sync>;

/// What a [`ScriptedFetcher`] does when it is invoked.
pub enum Script {
    /// Write the data to the target.
    Write(&'static [u8]),

    /// Write the data to the target, and then fail.
    FailAfter(&'static [u8]),

    /// Write the data, and then wait until the pull is cancelled.
    WaitForCancel(&'static [u8]),

    /// Run a function with the target path.
    Run(Action),
}

/// State shared between a [`ScriptedFetcher`] and the test.
#[derive(Clone, Default)]
pub struct Probe {
    calls: Arc<AtomicUsize>,
    last_target: Arc<Mutex<Option<PathBuf>>>,
}

impl Probe {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Path given to the last fetch.
    pub fn last_target(&self) -> Option<PathBuf> {
        self.last_target.lock().unwrap().clone()
    }

    /// Wait until a fetch has written its target.
    pub fn wait_for_target(&self) -> PathBuf {
        let deadline = Instant::now() + Duration::from_secs(30);

        loop {
            if let Some(target) = self.last_target() {
                if target.exists() {
                    return target;
                }
            }

            assert!(Instant::now() < deadline, "fetch not started");
            thread::sleep(Duration::from_millis(5));
        }
    }
}

/// Fetcher with a predefined behaviour, to test the pull pipeline
/// without a server.
pub struct ScriptedFetcher {
    script: Script,
    probe: Probe,
    verification: Option<Result<VerificationResult, &'static str>>,
}

impl ScriptedFetcher {
    pub fn new(script: Script) -> Self {
        ScriptedFetcher {
            script,
            probe: Probe::default(),
            verification: None,
        }
    }

    /// Attach a verifier that returns `result`.
    pub fn verify_with(mut self, result: Result<VerificationResult, &'static str>) -> Self {
        self.verification = Some(result);
        self
    }

    pub fn probe(&self) -> Probe {
        self.probe.clone()
    }
}

fn write_file(target: &Path, data: &[u8]) -> Result<(), FetchError> {
    let mut file = fs::File::options()
        .write(true)
        .create_new(true)
        .open(target)
        .map_err(|e| FetchError::Io(e, target.into()))?;

    file.write_all(data)
        .map_err(|e| FetchError::Io(e, target.into()))
}

impl Fetcher for ScriptedFetcher {
    fn fetch(
        &self,
        ctx: &FetchContext<'_>,
        target: &Path,
        _: &Reference<'_>,
        _: &PullRequest,
    ) -> Result<(), FetchError> {
        self.probe.calls.fetch_add(1, Ordering::SeqCst);

        // The file must not exist when the fetcher starts.
        assert!(!target.exists(), "{target:?} exists");

        let result = match &self.script {
            Script::Write(data) => write_file(target, data),

            Script::FailAfter(data) => {
                write_file(target, data)?;
                Err(FetchError::Backend("connection reset by peer".into()))
            }

            Script::WaitForCancel(data) => {
                write_file(target, data)?;
                *self.probe.last_target.lock().unwrap() = Some(target.to_owned());

                while !ctx.cancel.wait_timeout(Duration::from_millis(10)) {}
                Err(FetchError::Interrupted)
            }

            Script::Run(action) => action(target),
        };

        *self.probe.last_target.lock().unwrap() = Some(target.to_owned());
        result
    }

    fn verifier(&self) -> Option<&dyn Verifier> {
        self.verification.as_ref().map(|_| self as &dyn Verifier)
    }
}

impl Verifier for ScriptedFetcher {
    fn verify(&self, _: &FetchContext<'_>, path: &Path) -> Result<VerificationResult, VerifyError> {
        assert!(path.exists(), "{path:?} missing before verification");

        match self.verification {
            Some(Ok(result)) => Ok(result),
            Some(Err(message)) => Err(VerifyError::new(message)),
            None => unreachable!(),
        }
    }
}
