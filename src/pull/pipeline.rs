//! Download an image to a temporary file, and move it to its destination
//! when it is complete.

use std::{
    ffi::{OsStr, OsString},
    fmt, io,
    path::{Path, PathBuf},
    time::Duration,
};

use super::PullError;
use crate::{
    fs::Directory, signals::InterruptCleanup, EventHandler, FetchContext, FetchError, Fetcher,
    PullRequest, Reference, VerificationResult,
};

/// States of a pull.
///
/// A pull goes through them in the same order they are declared. The
/// `Verifying` state is only used for library images.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stage {
    Init,
    TempCreated,
    Fetching,
    Verifying,
    Publishing,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Init => "preparation",
            Stage::TempCreated => "temporary file",
            Stage::Fetching => "download",
            Stage::Verifying => "verification",
            Stage::Publishing => "rename",
            Stage::Done => "done",
            Stage::Failed => "failed",
        })
    }
}

/// Temporary file owned by a single pull.
///
/// It is removed when dropped. After a successful rename the file does
/// not exist anymore, and only an event is emitted.
struct TempArtifact<'a> {
    directory: &'a Directory,
    name: OsString,
    path: PathBuf,
    event_handler: &'a dyn EventHandler,
}

impl<'a> TempArtifact<'a> {
    /// Reserve a unique name in `directory`. The file does not exist when
    /// this function returns.
    fn reserve(
        directory: &'a Directory,
        base_name: &OsStr,
        event_handler: &'a dyn EventHandler,
    ) -> io::Result<Self> {
        let name = directory.reserve_temp(base_name)?;
        let path = directory.path().join(&name);

        Ok(TempArtifact {
            directory,
            name,
            path,
            event_handler,
        })
    }
}

impl Drop for TempArtifact<'_> {
    fn drop(&mut self) {
        match self.directory.remove(&self.name) {
            Ok(true) => self.event_handler.temp_file_removed(&self.path),
            Ok(false) => self.event_handler.temp_file_missing(&self.path),
            Err(e) => self.event_handler.temp_file_not_removed(&self.path, &e),
        }
    }
}

/// Single execution of the download protocol for a destination.
pub(crate) struct Pipeline<'a> {
    destination: &'a Path,
    overwrite: bool,
    ctx: &'a FetchContext<'a>,
    interrupt_grace: Option<Duration>,
    stage: Stage,
    failed_at: Option<Stage>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        destination: &'a Path,
        overwrite: bool,
        ctx: &'a FetchContext<'a>,
        interrupt_grace: Option<Duration>,
    ) -> Self {
        Pipeline {
            destination,
            overwrite,
            ctx,
            interrupt_grace,
            stage: Stage::Init,
            failed_at: None,
        }
    }

    /// Stage where the pipeline failed, if it failed.
    pub fn failed_at(&self) -> Option<Stage> {
        self.failed_at
    }

    /// Download the image with `fetcher`, and move it to the destination.
    ///
    /// The temporary file is removed before this function returns, in
    /// every case.
    pub fn run(
        &mut self,
        fetcher: &dyn Fetcher,
        reference: &Reference<'_>,
        request: &PullRequest,
    ) -> Result<Option<VerificationResult>, PullError> {
        match self.execute(fetcher, reference, request) {
            Ok(verification) => {
                self.stage = Stage::Done;
                Ok(verification)
            }

            Err(e) => {
                self.failed_at = Some(self.stage);
                self.stage = Stage::Failed;
                Err(e)
            }
        }
    }

    fn execute(
        &mut self,
        fetcher: &dyn Fetcher,
        reference: &Reference<'_>,
        request: &PullRequest,
    ) -> Result<Option<VerificationResult>, PullError> {
        let ctx = self.ctx;
        let destination = self.destination;

        if path_exists(destination) {
            if !self.overwrite {
                return Err(PullError::DestinationExists(destination.to_owned()));
            }

            ctx.event_handler.overwrite(destination);
        }

        let file_name = destination.file_name().ok_or_else(|| {
            PullError::Io(io::ErrorKind::InvalidInput.into(), destination.to_owned())
        })?;

        let parent = destination.parent().unwrap_or(Path::new(""));
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| PullError::Io(e, parent.to_owned()))?;
        }

        let directory = Directory::new(parent).map_err(|e| PullError::Io(e, parent.to_owned()))?;

        let temp = TempArtifact::reserve(&directory, file_name, ctx.event_handler)
            .map_err(|e| PullError::Io(e, directory.path().to_owned()))?;

        self.stage = Stage::TempCreated;

        // From here, `temp` is dropped on any error, so the file is
        // removed before the error is reported.

        self.stage = Stage::Fetching;
        ctx.event_handler.fetch_start(reference, &temp.path);

        let fetch = || fetcher.fetch(ctx, &temp.path, reference, request);

        let result = match self.interrupt_grace {
            Some(grace) => InterruptCleanup::new([&temp.path])
                .grace(grace)
                .watch(ctx.cancel, ctx.event_handler, fetch),

            None => fetch(),
        };

        match result {
            Ok(()) => (),
            Err(FetchError::Interrupted) => return Err(PullError::Interrupted),
            Err(source) => {
                return Err(PullError::Fetch {
                    transport: reference.transport,
                    source,
                })
            }
        }

        if ctx.cancel.is_cancelled() {
            return Err(PullError::Interrupted);
        }

        let mut verification = None;

        if let (true, Some(verifier)) = (reference.transport.is_library(), fetcher.verifier()) {
            self.stage = Stage::Verifying;

            match verifier.verify(ctx, &temp.path) {
                Ok(result) => {
                    ctx.event_handler.verification(destination, result);
                    verification = Some(result);
                }

                Err(e) => ctx.event_handler.verification_error(destination, &e),
            }

            if ctx.cancel.is_cancelled() {
                return Err(PullError::Interrupted);
            }
        }

        self.stage = Stage::Publishing;

        // Check again. The destination may have been created by another
        // process during the download.
        if !self.overwrite && directory.exists(file_name) {
            return Err(PullError::DestinationExists(destination.to_owned()));
        }

        ctx.event_handler.rename(&temp.path, destination);

        directory
            .rename(&temp.name, file_name)
            .map_err(|source| PullError::Rename {
                from: temp.path.clone(),
                to: destination.to_owned(),
                source,
            })?;

        drop(temp);

        ctx.event_handler.finished(destination);

        Ok(verification)
    }
}

/// Return `true` unless the path is known to be missing.
///
/// `ENOTDIR` means that a parent is not a directory. That is reported
/// later, when the directory is created.
fn path_exists(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(_) => true,
        Err(e) => e.kind() != io::ErrorKind::NotFound && e.raw_os_error() != Some(libc::ENOTDIR),
    }
}
