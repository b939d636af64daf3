mod cache;
mod cancel;
mod event_handler;
mod fetcher;
mod fs;
mod pull;
mod remote;
mod signals;

pub mod reference;

pub use cache::{CacheConfig, CacheError, CacheHandle};
pub use cancel::CancelToken;
pub use event_handler::{EventHandler, NoEventHandler, TracingEventHandler};
pub use fetcher::{
    FetchContext, FetchError, Fetcher, FetcherRegistry, HttpFetcher, LibraryClient,
    LibraryEndpoints, VerificationResult, Verifier, VerifyError, DEFAULT_KEY_SERVER_URL,
    DEFAULT_LIBRARY_URL,
};
pub use pull::{
    host_arch, resolve_destination, Credentials, ErrorKind, PullError, PullOutcome, PullRequest,
    Puller, Stage,
};
pub use reference::{ParseError, Reference, TransportKind};
pub use remote::{resolve_library_endpoints, Endpoint, RemoteConfig, RemoteError};
pub use signals::{cancel_on_signals, InterruptCleanup, Registration};
