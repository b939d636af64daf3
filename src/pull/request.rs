use std::{
    fmt,
    path::{Path, PathBuf},
};

/// Username and password for an OCI registry.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<hidden>")
            .finish()
    }
}

/// Name of the architecture of this host, as used by container
/// registries (`amd64`, `arm64`, …).
pub fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        "powerpc64" => "ppc64",
        "loongarch64" => "loong64",
        arch => arch,
    }
}

/// Parameters of a single pull.
///
/// A request is built once, and it is not modified after it is given
/// to a [`Puller`][crate::Puller].
///
/// # Examples
///
/// ```
/// # use image_pull::*;
/// let request = PullRequest::new("library://alpine:3.9")
///     .output_dir("images")
///     .overwrite(true)
///     .arch("arm64");
///
/// assert_eq!(request.reference(), "library://alpine:3.9");
/// assert_eq!(request.get_arch(), "arm64");
/// ```
#[derive(Clone, Debug)]
pub struct PullRequest {
    reference: String,
    explicit_name: Option<String>,
    name_argument: Option<String>,
    output_dir: Option<PathBuf>,
    overwrite: bool,
    arch: String,
    credentials: Option<Credentials>,
    no_https: bool,
    tmp_dir: Option<PathBuf>,
}

impl PullRequest {
    pub fn new(reference: impl Into<String>) -> Self {
        PullRequest {
            reference: reference.into(),
            explicit_name: None,
            name_argument: None,
            output_dir: None,
            overwrite: false,
            arch: host_arch().to_owned(),
            credentials: None,
            no_https: false,
            tmp_dir: None,
        }
    }

    /// Name for the downloaded file. It has the highest precedence.
    pub fn explicit_name(mut self, name: impl Into<String>) -> Self {
        self.explicit_name = Some(name.into());
        self
    }

    /// Name given as a positional argument. It is used when there is
    /// no [`explicit_name`][Self::explicit_name].
    pub fn name_argument(mut self, name: impl Into<String>) -> Self {
        self.name_argument = Some(name.into());
        self
    }

    /// Directory to write the downloaded file.
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Replace the destination file if it exists.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// CPU architecture to download.
    pub fn arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = arch.into();
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Use plain HTTP for registries.
    pub fn no_https(mut self, no_https: bool) -> Self {
        self.no_https = no_https;
        self
    }

    /// Directory for temporary data used by fetchers.
    pub fn tmp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tmp_dir = Some(dir.into());
        self
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn get_explicit_name(&self) -> Option<&str> {
        self.explicit_name.as_deref()
    }

    pub fn get_name_argument(&self) -> Option<&str> {
        self.name_argument.as_deref()
    }

    pub fn get_output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    pub fn is_overwrite(&self) -> bool {
        self.overwrite
    }

    pub fn get_arch(&self) -> &str {
        &self.arch
    }

    pub fn get_credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn is_no_https(&self) -> bool {
        self.no_https
    }

    pub fn get_tmp_dir(&self) -> Option<&Path> {
        self.tmp_dir.as_deref()
    }
}
