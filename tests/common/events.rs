use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use image_pull::{
    ErrorKind, EventHandler, PullError, Reference, Stage, VerificationResult, VerifyError,
};

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    FetchStart(PathBuf),
    Overwrite(PathBuf),
    Verification(VerificationResult),
    VerificationError,
    TempRemoved(PathBuf),
    TempMissing(PathBuf),
    Rename(PathBuf, PathBuf),
    Finished(PathBuf),
    StageFailed(Stage, ErrorKind),
    SignalReceived,
}

/// [`EventHandler`] that keeps every event it receives.
#[derive(Default)]
pub struct Recorder(Mutex<Vec<Event>>);

impl Recorder {
    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn has(&self, event: &Event) -> bool {
        self.0.lock().unwrap().contains(event)
    }

    /// Return `true` if a temporary file was reserved.
    pub fn fetch_started(&self) -> bool {
        self.0
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, Event::FetchStart(_)))
    }

    fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }
}

impl EventHandler for Recorder {
    fn fetch_start(&self, _: &Reference, temp_path: &Path) {
        self.push(Event::FetchStart(temp_path.to_owned()));
    }

    fn temp_file_removed(&self, path: &Path) {
        self.push(Event::TempRemoved(path.to_owned()));
    }

    fn temp_file_missing(&self, path: &Path) {
        self.push(Event::TempMissing(path.to_owned()));
    }

    fn overwrite(&self, path: &Path) {
        self.push(Event::Overwrite(path.to_owned()));
    }

    fn verification(&self, _: &Path, result: VerificationResult) {
        self.push(Event::Verification(result));
    }

    fn verification_error(&self, _: &Path, _: &VerifyError) {
        self.push(Event::VerificationError);
    }

    fn rename(&self, from: &Path, to: &Path) {
        self.push(Event::Rename(from.to_owned(), to.to_owned()));
    }

    fn finished(&self, destination: &Path) {
        self.push(Event::Finished(destination.to_owned()));
    }

    fn stage_failed(&self, stage: Stage, cause: &PullError) {
        self.push(Event::StageFailed(stage, cause.kind()));
    }

    fn signal_received(&self) {
        self.push(Event::SignalReceived);
    }
}
