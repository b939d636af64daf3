#![allow(dead_code)]

pub mod events;
pub mod fetchers;
pub mod server;

use std::path::Path;

use image_pull::{CacheHandle, Fetcher, FetcherRegistry, Puller, TransportKind};

use events::Recorder;

/// Puller with a single fetcher, registered for `kind`.
pub fn puller(kind: TransportKind, fetcher: impl Fetcher + 'static) -> Puller<Recorder> {
    let mut fetchers = FetcherRegistry::new();
    fetchers.register(kind, fetcher);
    Puller::new(fetchers, CacheHandle::disabled(), Recorder::default())
}

/// Sorted names of the files in `dir`.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();

    names.sort();
    names
}
