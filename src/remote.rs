//! Remote endpoints configuration.
//!
//! The configuration is a JSON file like this:
//!
//! ```json
//! {
//!   "active": "cloud",
//!   "remotes": {
//!     "cloud": {
//!       "token": "…",
//!       "services": {
//!         "library": "https://library.example.com",
//!         "keystore": "https://keys.example.com"
//!       }
//!     }
//!   }
//! }
//! ```

use std::{
    collections::BTreeMap,
    io,
    path::{Path, PathBuf},
};

use crate::{EventHandler, LibraryEndpoints};

/// Name of the configuration file, in the user configuration directory.
const CONFIG_FILE: &str = "remote.json";

#[derive(thiserror::Error, Debug)]
pub enum RemoteError {
    #[error("I/O error in {1}: {0}")]
    Io(io::Error, PathBuf),

    #[error("Invalid JSON in {1}: {0}")]
    Json(serde_json::Error, PathBuf),

    #[error("No default remote in use.")]
    NoDefault,

    #[error("Remote {0:?} is not defined.")]
    UnknownRemote(String),

    #[error("Service {0:?} is not available.")]
    MissingService(String),
}

/// List of remote endpoints, and which one is used by default.
#[derive(serde::Deserialize, Clone, Debug, Default)]
pub struct RemoteConfig {
    #[serde(default)]
    active: Option<String>,

    #[serde(default)]
    remotes: BTreeMap<String, Endpoint>,
}

/// A remote endpoint, with its authentication token and the URIs of
/// its services.
#[derive(serde::Deserialize, Clone, Debug, Default)]
pub struct Endpoint {
    #[serde(default)]
    token: Option<String>,

    #[serde(default)]
    services: BTreeMap<String, String>,
}

impl RemoteConfig {
    /// Path of the configuration file for the current user.
    pub fn default_path() -> Option<PathBuf> {
        directories_next::ProjectDirs::from("", "", "image-pull")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Read the configuration from `path`.
    pub fn load(path: &Path) -> Result<Self, RemoteError> {
        let data = std::fs::read(path).map_err(|e| RemoteError::Io(e, path.to_owned()))?;
        serde_json::from_slice(&data).map_err(|e| RemoteError::Json(e, path.to_owned()))
    }

    /// Read the configuration requested by the user.
    ///
    /// If `explicit` is `None`, it reads the file in
    /// [`default_path`][Self::default_path]. Any error with the default
    /// file is reported to `event_handler`, and an empty configuration
    /// is returned.
    pub fn load_or_default(
        explicit: Option<&Path>,
        event_handler: &dyn EventHandler,
    ) -> Result<Self, RemoteError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        let Some(path) = Self::default_path() else {
            return Ok(Self::default());
        };

        match Self::load(&path) {
            Ok(config) => Ok(config),

            Err(RemoteError::Io(e, _)) if e.kind() == io::ErrorKind::NotFound => {
                Ok(Self::default())
            }

            Err(e) => {
                event_handler.remote_config_ignored(&path, &e);
                Ok(Self::default())
            }
        }
    }

    /// Return the endpoint in use.
    pub fn default_endpoint(&self) -> Result<&Endpoint, RemoteError> {
        let name = self.active.as_deref().ok_or(RemoteError::NoDefault)?;
        self.remotes
            .get(name)
            .ok_or_else(|| RemoteError::UnknownRemote(name.to_owned()))
    }
}

impl Endpoint {
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Return the URI of the service `name`, like `library` or `keystore`.
    pub fn service_uri(&self, name: &str) -> Result<&str, RemoteError> {
        self.services
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| RemoteError::MissingService(name.to_owned()))
    }
}

/// Compute the URLs for the library client.
///
/// The default endpoint in `config` takes precedence over `defaults`,
/// with two exceptions:
///
/// * If `library_flag_set` is `true`, the library URL from `defaults` is
///   kept.
/// * If the endpoint has no `keystore` service, the key server URL from
///   `defaults` is kept.
///
/// Not having a default endpoint is not an error.
pub fn resolve_library_endpoints(
    config: &RemoteConfig,
    defaults: LibraryEndpoints,
    library_flag_set: bool,
    event_handler: &dyn EventHandler,
) -> Result<LibraryEndpoints, RemoteError> {
    let endpoint = match config.default_endpoint() {
        Ok(endpoint) => endpoint,

        Err(RemoteError::NoDefault) => {
            event_handler.no_default_remote(&defaults.library_url, &defaults.key_server_url);
            return Ok(defaults);
        }

        Err(e) => return Err(e),
    };

    let mut endpoints = defaults;
    endpoints.auth_token = endpoint.token.clone();

    if !library_flag_set {
        endpoints.library_url = endpoint.service_uri("library")?.to_owned();
    }

    match endpoint.service_uri("keystore") {
        Ok(uri) => endpoints.key_server_url = uri.to_owned(),
        Err(e) => event_handler.keystore_fallback(&e, &endpoints.key_server_url),
    }

    Ok(endpoints)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::NoEventHandler;

    const CONFIG: &str = r#"
        {
          "active": "cloud",
          "remotes": {
            "cloud": {
              "token": "T0",
              "services": {
                "library": "https://library.example.com",
                "keystore": "https://keys.example.com"
              }
            },
            "partial": {
              "services": { "library": "https://lib.partial.example.com" }
            }
          }
        }
    "#;

    fn defaults() -> LibraryEndpoints {
        LibraryEndpoints {
            library_url: "https://flag.example.com".into(),
            key_server_url: "https://keys.flag.example.com".into(),
            auth_token: Some("flag-token".into()),
        }
    }

    fn config(active: Option<&str>) -> RemoteConfig {
        let mut config: RemoteConfig = serde_json::from_str(CONFIG).unwrap();
        config.active = active.map(str::to_owned);
        config
    }

    #[derive(Default)]
    struct Warnings(Mutex<Vec<String>>);

    impl EventHandler for Warnings {
        fn no_default_remote(&self, library_url: &str, _: &str) {
            self.0.lock().unwrap().push(format!("no-default {library_url}"));
        }

        fn keystore_fallback(&self, _: &RemoteError, key_server_url: &str) {
            self.0.lock().unwrap().push(format!("keystore {key_server_url}"));
        }
    }

    #[test]
    fn endpoint_overrides_defaults() {
        let endpoints =
            resolve_library_endpoints(&config(Some("cloud")), defaults(), false, &NoEventHandler)
                .unwrap();

        assert_eq!(endpoints.library_url, "https://library.example.com");
        assert_eq!(endpoints.key_server_url, "https://keys.example.com");
        assert_eq!(endpoints.auth_token.as_deref(), Some("T0"));
    }

    #[test]
    fn library_flag_takes_precedence() {
        let endpoints =
            resolve_library_endpoints(&config(Some("cloud")), defaults(), true, &NoEventHandler)
                .unwrap();

        assert_eq!(endpoints.library_url, "https://flag.example.com");
        assert_eq!(endpoints.key_server_url, "https://keys.example.com");
    }

    #[test]
    fn missing_default_falls_back_with_warning() {
        let warnings = Warnings::default();
        let endpoints =
            resolve_library_endpoints(&config(None), defaults(), false, &warnings).unwrap();

        assert_eq!(endpoints, defaults());
        assert_eq!(
            *warnings.0.lock().unwrap(),
            ["no-default https://flag.example.com"]
        );
    }

    #[test]
    fn missing_keystore_keeps_default() {
        let warnings = Warnings::default();
        let endpoints =
            resolve_library_endpoints(&config(Some("partial")), defaults(), false, &warnings)
                .unwrap();

        assert_eq!(endpoints.library_url, "https://lib.partial.example.com");
        assert_eq!(endpoints.key_server_url, "https://keys.flag.example.com");
        assert_eq!(endpoints.auth_token, None);
        assert_eq!(
            *warnings.0.lock().unwrap(),
            ["keystore https://keys.flag.example.com"]
        );
    }

    #[test]
    fn unknown_active_remote() {
        let result =
            resolve_library_endpoints(&config(Some("nope")), defaults(), false, &NoEventHandler);

        assert!(matches!(result, Err(RemoteError::UnknownRemote(n)) if n == "nope"));
    }

    #[test]
    fn explicit_config_must_be_readable() {
        let target = tempfile::tempdir().unwrap();
        let missing = target.path().join("remote.json");

        assert!(matches!(
            RemoteConfig::load_or_default(Some(&missing), &NoEventHandler),
            Err(RemoteError::Io(..))
        ));

        std::fs::write(&missing, "{ not json").unwrap();
        assert!(matches!(
            RemoteConfig::load(&missing),
            Err(RemoteError::Json(..))
        ));

        std::fs::write(&missing, CONFIG).unwrap();
        let config = RemoteConfig::load_or_default(Some(&missing), &NoEventHandler).unwrap();
        assert_eq!(
            config.default_endpoint().unwrap().service_uri("library").unwrap(),
            "https://library.example.com"
        );
    }
}
