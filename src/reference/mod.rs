mod parser;

use std::fmt;

/// Errors from [`Reference::try_from`].
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("Empty reference.")]
    Empty,

    #[error("Missing scheme before `://` in {0:?}.")]
    MissingScheme(String),

    #[error("Missing image after the scheme in {0:?}.")]
    MissingRemainder(String),

    #[error("Can't derive an image name from {0:?}.")]
    MissingName(String),
}

/// Transports accepted by the OCI registry backend.
const OCI_TRANSPORTS: &[&str] = &[
    "docker",
    "docker-archive",
    "docker-daemon",
    "oci",
    "oci-archive",
];

/// Protocol used to retrieve an image.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Reference without a scheme, like `alpine:3.9`. It is pulled from
    /// the library.
    LibraryDefault,

    /// `library://`
    Library,

    /// `shub://`
    Hub,

    /// `oras://`
    Oras,

    /// `http://`
    Http,

    /// `https://`
    Https,

    /// Any scheme accepted by [`is_oci_transport`], like `docker://`.
    OciRegistry,

    /// Scheme with no known backend.
    Unsupported,
}

impl TransportKind {
    fn from_scheme(scheme: &str) -> Self {
        match scheme {
            "library" => TransportKind::Library,
            "shub" => TransportKind::Hub,
            "oras" => TransportKind::Oras,
            "http" => TransportKind::Http,
            "https" => TransportKind::Https,
            s if is_oci_transport(s) => TransportKind::OciRegistry,
            _ => TransportKind::Unsupported,
        }
    }

    /// Return `true` if the image is pulled from the library.
    pub fn is_library(self) -> bool {
        matches!(self, TransportKind::LibraryDefault | TransportKind::Library)
    }

    /// Return `true` for plain `http://` and `https://` downloads.
    pub fn is_http(self) -> bool {
        matches!(self, TransportKind::Http | TransportKind::Https)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransportKind::LibraryDefault | TransportKind::Library => "library",
            TransportKind::Hub => "shub",
            TransportKind::Oras => "oras",
            TransportKind::Http => "http",
            TransportKind::Https => "https",
            TransportKind::OciRegistry => "oci",
            TransportKind::Unsupported => "unsupported",
        })
    }
}

/// Return `true` if `scheme` is handled by the OCI registry backend.
pub fn is_oci_transport(scheme: &str) -> bool {
    OCI_TRANSPORTS.contains(&scheme)
}

/// Reference to an image, split in its transport and the remainder
/// after the scheme.
///
/// A scheme is recognized only when the first `:` is followed by `//`.
/// Any other reference is a bare library name, and the remainder is
/// the whole input.
///
/// # Examples
///
/// ```
/// # use image_pull::*;
/// let reference = Reference::try_from("docker://alpine:3.9").unwrap();
/// assert_eq!(reference.transport, TransportKind::OciRegistry);
/// assert_eq!(reference.scheme, Some("docker"));
/// assert_eq!(reference.remainder, "alpine:3.9");
/// ```
///
/// ```
/// # use image_pull::*;
/// let reference = Reference::try_from("alpine:3.9").unwrap();
/// assert_eq!(reference.transport, TransportKind::LibraryDefault);
/// assert_eq!(reference.remainder, "alpine:3.9");
/// ```
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Reference<'a> {
    /// Full reference, as given by the caller.
    pub source: &'a str,

    /// Transport selected by the scheme.
    pub transport: TransportKind,

    /// Scheme token, without `://`. `None` for bare names.
    pub scheme: Option<&'a str>,

    /// Part of the reference after the scheme. Never empty.
    pub remainder: &'a str,
}

impl<'a> TryFrom<&'a str> for Reference<'a> {
    type Error = ParseError;

    fn try_from(reference: &'a str) -> Result<Self, Self::Error> {
        parser::parse(reference)
    }
}

impl fmt::Display for Reference<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source)
    }
}
