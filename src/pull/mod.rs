mod destination;
mod pipeline;
mod request;

use std::{io, path::PathBuf, time::Duration};

use crate::{
    reference::ParseError,
    signals::{cancel_on_signals, Registration},
    CacheError, CacheHandle, CancelToken, EventHandler, FetchContext, FetchError, Fetcher,
    FetcherRegistry, Reference, RemoteError, TransportKind, VerificationResult,
};

use pipeline::Pipeline;

pub use destination::resolve as resolve_destination;
pub use pipeline::Stage;
pub use request::{host_arch, Credentials, PullRequest};

#[derive(thiserror::Error, Debug)]
pub enum PullError {
    #[error("Invalid reference: {0}")]
    MalformedReference(#[from] ParseError),

    #[error("Unsupported transport type: {0}")]
    UnsupportedTransport(String),

    #[error("Image file already exists: {0:?}; will not overwrite.")]
    DestinationExists(PathBuf),

    #[error("I/O error in {1}: {0}")]
    Io(io::Error, PathBuf),

    #[error("Unable to move {from:?} to {to:?}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    #[error("Failed to get {transport} image: {source}")]
    Fetch {
        transport: TransportKind,
        #[source]
        source: FetchError,
    },

    #[error("Operation interrupted.")]
    Interrupted,

    #[error("Cannot create cache handle: {0}")]
    CacheInit(#[from] CacheError),

    #[error("Cannot load remote configuration: {0}")]
    ConfigLoad(#[from] RemoteError),
}

/// Category of a [`PullError`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedReference,
    UnsupportedTransport,
    DestinationExists,
    IoError,
    FetchError,

    /// Verification errors are only reported as events, and never end a
    /// pull.
    VerificationError,

    CacheInitError,
    ConfigLoadError,
    Cancelled,
}

impl PullError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PullError::MalformedReference(_) => ErrorKind::MalformedReference,
            PullError::UnsupportedTransport(_) => ErrorKind::UnsupportedTransport,
            PullError::DestinationExists(_) => ErrorKind::DestinationExists,
            PullError::Io(..) | PullError::Rename { .. } => ErrorKind::IoError,
            PullError::Fetch { .. } => ErrorKind::FetchError,
            PullError::Interrupted => ErrorKind::Cancelled,
            PullError::CacheInit(_) => ErrorKind::CacheInitError,
            PullError::ConfigLoad(_) => ErrorKind::ConfigLoadError,
        }
    }
}

/// Result of a pull.
#[derive(Debug)]
pub struct PullOutcome {
    pub success: bool,

    /// Path of the image. Only set if the pull succeeded.
    pub final_path: Option<PathBuf>,

    pub error: Option<PullError>,

    /// Stage where the pull failed.
    pub failed_stage: Option<Stage>,

    /// Signature status, for library images with a verifier.
    pub verification: Option<VerificationResult>,
}

impl PullOutcome {
    fn failed(error: PullError, stage: Stage) -> Self {
        PullOutcome {
            success: false,
            final_path: None,
            error: Some(error),
            failed_stage: Some(stage),
            verification: None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(PullError::kind)
    }
}

/// Pull images using the fetchers in a [`FetcherRegistry`].
///
/// # Examples
///
/// ```no_run
/// # use image_pull::*;
/// let mut fetchers = FetcherRegistry::new();
/// fetchers.register(TransportKind::Https, HttpFetcher::new());
///
/// let puller = Puller::new(fetchers, CacheHandle::disabled(), TracingEventHandler::new());
///
/// let request = PullRequest::new("https://example.com/alpine.sif").output_dir("images");
/// let outcome = puller.pull(&request);
///
/// if outcome.success {
///     println!("Image in {:?}", outcome.final_path);
/// }
/// ```
pub struct Puller<E> {
    fetchers: FetcherRegistry,
    cache: CacheHandle,
    event_handler: E,
    interrupt_grace: Option<Duration>,
}

impl<E: EventHandler> Puller<E> {
    pub fn new(fetchers: FetcherRegistry, cache: CacheHandle, event_handler: E) -> Self {
        Puller {
            fetchers,
            cache,
            event_handler,
            interrupt_grace: None,
        }
    }

    /// Remove the temporary file and terminate the process if a fetcher
    /// does not stop within `grace` after the pull is cancelled.
    pub fn interrupt_cleanup(mut self, grace: Duration) -> Self {
        self.interrupt_grace = Some(grace);
        self
    }

    pub fn event_handler(&self) -> &E {
        &self.event_handler
    }

    /// Run a pull, cancelling it if the process receives `SIGINT`,
    /// `SIGQUIT` or `SIGTERM`.
    ///
    /// If the signal handlers can't be installed, the pull runs without
    /// them.
    pub fn pull(&self, request: &PullRequest) -> PullOutcome {
        let token = CancelToken::new();

        match Registration::install() {
            Ok(registration) => {
                cancel_on_signals(registration, &token, &self.event_handler, || {
                    self.pull_with_token(request, &token)
                })
            }

            Err(e) => {
                self.event_handler.signals_unavailable(&e);
                self.pull_with_token(request, &token)
            }
        }
    }

    /// Run a pull that stops when `token` is cancelled.
    pub fn pull_with_token(&self, request: &PullRequest, token: &CancelToken) -> PullOutcome {
        let (reference, destination, fetcher) = match self.prepare(request) {
            Ok(prepared) => prepared,
            Err(e) => return self.report(e, Stage::Init),
        };

        let ctx = FetchContext {
            cancel: token,
            cache: &self.cache,
            event_handler: &self.event_handler,
        };

        let mut pipeline = Pipeline::new(
            &destination,
            request.is_overwrite(),
            &ctx,
            self.interrupt_grace,
        );

        match pipeline.run(fetcher, &reference, request) {
            Ok(verification) => PullOutcome {
                success: true,
                final_path: Some(destination),
                error: None,
                failed_stage: None,
                verification,
            },

            Err(e) => {
                let stage = pipeline.failed_at().unwrap_or(Stage::Init);
                self.report(e, stage)
            }
        }
    }

    /// Resolve the transport, the destination, and the fetcher.
    ///
    /// Unsupported transports are rejected before anything else.
    fn prepare<'r>(
        &self,
        request: &'r PullRequest,
    ) -> Result<(Reference<'r>, PathBuf, &dyn Fetcher), PullError> {
        let reference = Reference::try_from(request.reference())?;

        if reference.transport == TransportKind::Unsupported {
            let scheme = reference.scheme.unwrap_or(reference.source);
            return Err(PullError::UnsupportedTransport(scheme.to_owned()));
        }

        let destination = destination::resolve(request)?;
        let fetcher = self.fetchers.lookup(reference.transport)?;

        Ok((reference, destination, fetcher))
    }

    fn report(&self, error: PullError, stage: Stage) -> PullOutcome {
        self.event_handler.stage_failed(stage, &error);
        PullOutcome::failed(error, stage)
    }
}
