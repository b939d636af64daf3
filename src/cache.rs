use std::{
    io,
    path::{Path, PathBuf},
};

/// Directory name for the cache, under the user cache directory.
const CACHE_NAME: &str = "image-pull";

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("Failed to create an image cache handle: no cache directory available.")]
    NoRoot,

    #[error("Failed to create an image cache handle in {1}: {0}")]
    Io(io::Error, PathBuf),
}

/// Settings to build a [`CacheHandle`].
#[derive(Clone, Debug, Default)]
pub struct CacheConfig {
    /// Don't read nor write any cached data.
    pub disable: bool,

    /// Root directory for the cache. If `None`, it uses
    /// [`default_root`][CacheConfig::default_root].
    pub root: Option<PathBuf>,
}

impl CacheConfig {
    /// Cache directory for the current user, like `~/.cache/image-pull`.
    pub fn default_root() -> Option<PathBuf> {
        directories_next::BaseDirs::new().map(|dirs| dirs.cache_dir().join(CACHE_NAME))
    }
}

/// Handle to the local image cache.
///
/// It is opaque to the pull pipeline, and passed to every fetcher.
#[derive(Clone, Debug)]
pub struct CacheHandle {
    root: Option<PathBuf>,
}

impl CacheHandle {
    /// Create a handle for `config`.
    ///
    /// The root directory is created if it does not exist.
    pub fn new(config: &CacheConfig) -> Result<Self, CacheError> {
        if config.disable {
            return Ok(Self::disabled());
        }

        let root = match &config.root {
            Some(root) => root.clone(),
            None => CacheConfig::default_root().ok_or(CacheError::NoRoot)?,
        };

        std::fs::create_dir_all(&root).map_err(|e| CacheError::Io(e, root.clone()))?;

        Ok(CacheHandle { root: Some(root) })
    }

    pub fn disabled() -> Self {
        CacheHandle { root: None }
    }

    pub fn is_disabled(&self) -> bool {
        self.root.is_none()
    }

    /// Root directory for cached data, or `None` if the cache is disabled.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }
}

#[test]
fn create_cache_root() {
    let target = tempfile::tempdir().unwrap();
    let root = target.path().join("a/b");

    let config = CacheConfig {
        disable: false,
        root: Some(root.clone()),
    };

    let cache = CacheHandle::new(&config).unwrap();
    assert_eq!(cache.root(), Some(root.as_path()));
    assert!(root.is_dir());
}

#[test]
fn disabled_cache_creates_nothing() {
    let target = tempfile::tempdir().unwrap();
    let root = target.path().join("cache");

    let config = CacheConfig {
        disable: true,
        root: Some(root.clone()),
    };

    let cache = CacheHandle::new(&config).unwrap();
    assert!(cache.is_disabled());
    assert!(!root.exists());
}

#[test]
fn fail_if_root_is_a_file() {
    let target = tempfile::tempdir().unwrap();
    let root = target.path().join("file");
    std::fs::write(&root, b"").unwrap();

    let config = CacheConfig {
        disable: false,
        root: Some(root),
    };

    assert!(matches!(
        CacheHandle::new(&config),
        Err(CacheError::Io(..))
    ));
}
