mod http;
mod library;
#[cfg(test)]
mod tests;

use std::{collections::HashMap, error::Error, io, path::Path, path::PathBuf};

use crate::{
    CacheHandle, CancelToken, EventHandler, PullError, PullRequest, Reference, TransportKind,
};

pub use http::HttpFetcher;
pub use library::{
    LibraryClient, LibraryEndpoints, DEFAULT_KEY_SERVER_URL, DEFAULT_LIBRARY_URL,
};

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] Box<ureq::Error>),

    #[error("I/O error in {1}: {0}")]
    Io(io::Error, PathBuf),

    #[error("Operation interrupted.")]
    Interrupted,

    /// Error from a fetcher outside of this crate.
    #[error("{0}")]
    Backend(Box<dyn Error + Send + Sync>),
}

impl From<ureq::Error> for FetchError {
    fn from(value: ureq::Error) -> Self {
        FetchError::HttpRequest(Box::new(value))
    }
}

macro_rules! try_io {
    ($path:expr, $e:expr $(,)?) => {
        $e.map_err(|e| FetchError::Io(io::Error::from(e), $path.into()))?
    };
}

// Make visible to mods.
use try_io;

/// Error from a [`Verifier`].
///
/// Verification errors never abort a pull.
#[derive(thiserror::Error, Debug)]
#[error("{0}")]
pub struct VerifyError(Box<dyn Error + Send + Sync>);

impl VerifyError {
    pub fn new(cause: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        VerifyError(cause.into())
    }
}

/// Signature status of a downloaded image.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VerificationResult {
    /// The image has no signatures.
    Unsigned,

    /// The image is signed, but the key is not in the local keyring.
    SignedRemoteKeyUnknown,

    /// The image is signed with a key in the local keyring.
    SignedLocallyTrusted,

    /// The signatures don't match the image.
    VerificationFailed,
}

/// Everything a fetcher may need during a download, apart from the
/// request itself.
pub struct FetchContext<'a> {
    /// Cancelled when the pull has to stop.
    pub cancel: &'a CancelToken,

    /// Local image cache.
    pub cache: &'a CacheHandle,

    pub event_handler: &'a dyn EventHandler,
}

impl FetchContext<'_> {
    /// Return [`FetchError::Interrupted`] if the pull was cancelled.
    pub fn check_cancelled(&self) -> Result<(), FetchError> {
        match self.cancel.is_cancelled() {
            true => Err(FetchError::Interrupted),
            false => Ok(()),
        }
    }
}

/// Backend to retrieve images for a transport.
pub trait Fetcher: Send + Sync {
    /// Download the image in `reference` to `target`.
    ///
    /// `target` does not exist when this method is called, and the
    /// fetcher must create it. If the pull is cancelled, the fetcher
    /// should return [`FetchError::Interrupted`] as soon as possible.
    fn fetch(
        &self,
        ctx: &FetchContext<'_>,
        target: &Path,
        reference: &Reference<'_>,
        request: &PullRequest,
    ) -> Result<(), FetchError>;

    /// Signature checks for the images downloaded by this fetcher.
    ///
    /// Only used for library images.
    fn verifier(&self) -> Option<&dyn Verifier> {
        None
    }
}

/// Check the signatures of a downloaded image.
pub trait Verifier: Send + Sync {
    fn verify(&self, ctx: &FetchContext<'_>, path: &Path)
        -> Result<VerificationResult, VerifyError>;
}

/// Fetchers available for each transport.
#[derive(Default)]
pub struct FetcherRegistry {
    fetchers: HashMap<TransportKind, Box<dyn Fetcher>>,
}

impl FetcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `fetcher` to download images for `kind`.
    ///
    /// A fetcher for [`TransportKind::Library`] is also used for references
    /// with no scheme. Fetchers for [`TransportKind::Unsupported`] are
    /// never returned by [`lookup`][Self::lookup].
    pub fn register(&mut self, kind: TransportKind, fetcher: impl Fetcher + 'static) -> &mut Self {
        self.fetchers.insert(registry_key(kind), Box::new(fetcher));
        self
    }

    /// Return the fetcher for `kind`.
    pub fn lookup(&self, kind: TransportKind) -> Result<&dyn Fetcher, PullError> {
        if kind == TransportKind::Unsupported {
            return Err(PullError::UnsupportedTransport(kind.to_string()));
        }

        self.fetchers
            .get(&registry_key(kind))
            .map(|f| &**f)
            .ok_or_else(|| PullError::UnsupportedTransport(kind.to_string()))
    }
}

fn registry_key(kind: TransportKind) -> TransportKind {
    match kind {
        TransportKind::LibraryDefault => TransportKind::Library,
        k => k,
    }
}
