use std::{fmt::Display, io, path::Path};

use crate::{PullError, Reference, RemoteError, Stage, VerificationResult, VerifyError};

/// Handler to receive notifications for events during a pull.
///
/// All methods are optional.
#[expect(unused_variables)]
pub trait EventHandler: Send + Sync {
    /// HTTP request to a remote.
    fn registry_request(&self, url: &str) {}

    /// Some data (in `bytes`) has been received.
    ///
    /// This method is invoked very frequently.
    fn download_progress_bytes(&self, bytes: usize) {}

    /// The fetcher for `reference` is about to write to `temp_path`.
    fn fetch_start(&self, reference: &Reference, temp_path: &Path) {}

    /// The temporary file was removed after the pull.
    fn temp_file_removed(&self, path: &Path) {}

    /// The temporary file did not exist when the pull finished. This is
    /// the normal case after a successful rename.
    fn temp_file_missing(&self, path: &Path) {}

    /// The temporary file could not be removed.
    fn temp_file_not_removed(&self, path: &Path, cause: &io::Error) {}

    /// The destination exists, and it will be replaced.
    fn overwrite(&self, path: &Path) {}

    /// Result of the signature check of a library image.
    fn verification(&self, destination: &Path, result: VerificationResult) {}

    /// The signature of a library image could not be checked. The image
    /// is published anyway.
    fn verification_error(&self, destination: &Path, cause: &VerifyError) {}

    /// The downloaded file is going to be moved to its destination.
    fn rename(&self, from: &Path, to: &Path) {}

    /// The image is available in `destination`.
    fn finished(&self, destination: &Path) {}

    /// The pull failed during `stage`.
    fn stage_failed(&self, stage: Stage, cause: &PullError) {}

    /// There is no default remote endpoint, so the library and key
    /// server URLs from the command line are used.
    fn no_default_remote(&self, library_url: &str, key_server_url: &str) {}

    /// The default remote endpoint does not provide a key server.
    fn keystore_fallback(&self, cause: &RemoteError, key_server_url: &str) {}

    /// The remote configuration in the default location was ignored.
    fn remote_config_ignored(&self, path: &Path, cause: &RemoteError) {}

    /// Signal handlers could not be installed. The pull runs without them.
    fn signals_unavailable(&self, cause: &io::Error) {}

    /// A termination signal was received, and the pull is cancelled.
    fn signal_received(&self) {}

    /// `path` is removed because the pull did not finish after a
    /// termination signal.
    fn interrupt_cleanup(&self, path: &Path, result: &io::Result<()>) {}
}

/// [`EventHandler`] instance to ignore all events.
pub struct NoEventHandler;

impl EventHandler for NoEventHandler {}

/// [`EventHandler`] that sends every event to [`tracing`].
#[derive(Default)]
pub struct TracingEventHandler {
    allow_unsigned: bool,
}

impl TracingEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Don't warn about unsigned images, or images signed with an
    /// unknown key.
    pub fn allow_unsigned(mut self, allow: bool) -> Self {
        self.allow_unsigned = allow;
        self
    }

    fn unsigned_warning(&self, message: impl Display) {
        if self.allow_unsigned {
            tracing::debug!("{message}");
        } else {
            tracing::warn!("{message}");
        }
    }
}

impl EventHandler for TracingEventHandler {
    fn registry_request(&self, url: &str) {
        tracing::debug!("GET {url}");
    }

    fn fetch_start(&self, reference: &Reference, temp_path: &Path) {
        tracing::debug!(
            "Downloading {} image {reference} to temporary location {}",
            reference.transport,
            temp_path.display()
        );
    }

    fn temp_file_removed(&self, path: &Path) {
        tracing::debug!("Removed temporary file {:?}", path);
    }

    fn temp_file_missing(&self, path: &Path) {
        tracing::debug!("Temporary file {:?} not found", path);
    }

    fn temp_file_not_removed(&self, path: &Path, cause: &io::Error) {
        tracing::debug!("Cannot remove temporary file {:?}: {cause}", path);
    }

    fn overwrite(&self, path: &Path) {
        tracing::debug!("Overwriting existing file: {}", path.display());
    }

    fn verification(&self, destination: &Path, result: VerificationResult) {
        match result {
            VerificationResult::Unsigned => {
                self.unsigned_warning("Container is not signed, skipping container verification")
            }

            VerificationResult::SignedRemoteKeyUnknown => self.unsigned_warning(format_args!(
                "Signing key is not available locally; verify {} to show who signed it",
                destination.display()
            )),

            VerificationResult::SignedLocallyTrusted => {
                tracing::info!("Container is trusted by a local key")
            }

            VerificationResult::VerificationFailed => {
                tracing::warn!("Signature verification failed for {}", destination.display())
            }
        }
    }

    fn verification_error(&self, destination: &Path, cause: &VerifyError) {
        tracing::warn!("Cannot verify container {}: {cause}", destination.display());
    }

    fn rename(&self, from: &Path, to: &Path) {
        tracing::debug!(
            "Renaming temporary file {} to {}",
            from.display(),
            to.display()
        );
    }

    fn finished(&self, destination: &Path) {
        tracing::info!("Download complete: {}", destination.display());
    }

    fn stage_failed(&self, stage: Stage, cause: &PullError) {
        tracing::error!("{stage}: {cause}");
    }

    fn no_default_remote(&self, library_url: &str, key_server_url: &str) {
        tracing::warn!("No default remote in use, falling back to: {library_url}");
        tracing::debug!("Using default key server url: {key_server_url}");
    }

    fn keystore_fallback(&self, cause: &RemoteError, key_server_url: &str) {
        tracing::warn!("Unable to get key server URI: {cause}, defaulting to {key_server_url}");
    }

    fn remote_config_ignored(&self, path: &Path, cause: &RemoteError) {
        tracing::warn!("Ignoring remote configuration {}: {cause}", path.display());
    }

    fn signals_unavailable(&self, cause: &io::Error) {
        tracing::warn!("Cannot install signal handlers: {cause}");
    }

    fn signal_received(&self) {
        tracing::debug!("Got cancellation signal, propagating cancellation.");
    }

    fn interrupt_cleanup(&self, path: &Path, result: &io::Result<()>) {
        match result {
            Ok(()) => tracing::debug!(
                "Removed {:?} because of receiving termination signal",
                path
            ),

            Err(e) => tracing::error!("Unable to remove {}: {e}", path.display()),
        }
    }
}
