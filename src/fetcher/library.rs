use std::path::Path;

use super::{
    http::{agent, save_body, USER_AGENT},
    FetchContext, FetchError, Fetcher, Verifier,
};
use crate::{PullRequest, Reference};

pub const DEFAULT_LIBRARY_URL: &str = "https://library.sylabs.io";

pub const DEFAULT_KEY_SERVER_URL: &str = "https://keys.sylabs.io";

const DEFAULT_TAG: &str = "latest";

/// URLs and credentials to access a library.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LibraryEndpoints {
    /// Base URL of the library API.
    pub library_url: String,

    /// Base URL of the key server used to check signatures.
    ///
    /// The client does not use it. It is for the [`Verifier`] attached
    /// with [`LibraryClient::with_verifier`].
    pub key_server_url: String,

    pub auth_token: Option<String>,
}

impl Default for LibraryEndpoints {
    fn default() -> Self {
        LibraryEndpoints {
            library_url: DEFAULT_LIBRARY_URL.to_owned(),
            key_server_url: DEFAULT_KEY_SERVER_URL.to_owned(),
            auth_token: None,
        }
    }
}

/// Download images from a library, using its `v1/imagefile` API.
///
/// Signatures are checked only if a [`Verifier`] is attached with
/// [`with_verifier`][Self::with_verifier].
pub struct LibraryClient {
    agent: ureq::Agent,
    endpoints: LibraryEndpoints,
    verifier: Option<Box<dyn Verifier>>,
}

impl LibraryClient {
    pub fn new(endpoints: LibraryEndpoints) -> Self {
        LibraryClient {
            agent: agent(),
            endpoints,
            verifier: None,
        }
    }

    pub fn with_verifier(mut self, verifier: impl Verifier + 'static) -> Self {
        self.verifier = Some(Box::new(verifier));
        self
    }

    pub fn endpoints(&self) -> &LibraryEndpoints {
        &self.endpoints
    }

    /// URL to download the image in `remainder`, like `user/collection/image:tag`.
    ///
    /// The tag defaults to `latest`.
    fn image_url(&self, remainder: &str) -> String {
        let path = remainder.trim_start_matches('/');
        let base = self.endpoints.library_url.trim_end_matches('/');

        let name = path.rsplit('/').next().unwrap_or(path);
        if name.contains(':') {
            format!("{base}/v1/imagefile/{path}")
        } else {
            format!("{base}/v1/imagefile/{path}:{DEFAULT_TAG}")
        }
    }
}

impl Fetcher for LibraryClient {
    fn fetch(
        &self,
        ctx: &FetchContext<'_>,
        target: &Path,
        reference: &Reference<'_>,
        request: &PullRequest,
    ) -> Result<(), FetchError> {
        ctx.check_cancelled()?;

        let url = self.image_url(reference.remainder);
        ctx.event_handler.registry_request(&url);

        let mut http_request = self
            .agent
            .get(&url)
            .set("User-Agent", USER_AGENT)
            .query("arch", request.get_arch());

        if let Some(token) = &self.endpoints.auth_token {
            http_request = http_request.set("Authorization", &format!("Bearer {token}"));
        }

        let response = http_request.call()?;

        save_body(ctx, response.into_reader(), target)
    }

    fn verifier(&self) -> Option<&dyn Verifier> {
        self.verifier.as_deref()
    }
}

#[test]
fn image_urls() {
    let client = LibraryClient::new(LibraryEndpoints {
        library_url: "https://lib.example.com/".into(),
        ..Default::default()
    });

    assert_eq!(
        client.image_url("alpine"),
        "https://lib.example.com/v1/imagefile/alpine:latest"
    );

    assert_eq!(
        client.image_url("/user/col/alpine:3.9"),
        "https://lib.example.com/v1/imagefile/user/col/alpine:3.9"
    );

    assert_eq!(
        client.image_url("user/col/alpine"),
        "https://lib.example.com/v1/imagefile/user/col/alpine:latest"
    );
}

#[test]
fn download_with_token() {
    use tiny_http::Response;

    let server_port = super::tests::http_server(|req| {
        let base_url = url::Url::parse("http://0").ok();
        let url_parser = url::Url::options().base_url(base_url.as_ref());
        let req_url = url_parser.parse(req.url()).unwrap();

        let authorization = req
            .headers()
            .iter()
            .find(|h| h.field.equiv("authorization"))
            .map(|h| h.value.to_string());

        let arch = req_url
            .query_pairs()
            .find(|(k, _)| k == "arch")
            .map(|(_, v)| v.into_owned());

        let response = match (req_url.path(), authorization.as_deref(), arch.as_deref()) {
            ("/v1/imagefile/foo/bar:latest", Some("Bearer T0"), Some("arm64")) => {
                Response::from_string("LIBRARY IMAGE")
            }

            _ => Response::from_string("Not Found").with_status_code(404),
        };

        req.respond(response).expect("Send response");
    });

    let client = LibraryClient::new(LibraryEndpoints {
        library_url: format!("http://127.0.0.1:{server_port}"),
        auth_token: Some("T0".into()),
        ..Default::default()
    });

    let target = tempfile::tempdir().unwrap();
    let path = target.path().join("bar");

    let reference = Reference::try_from("library://foo/bar").unwrap();
    let request = PullRequest::new("library://foo/bar").arch("arm64");

    super::tests::with_context(|ctx| {
        client
            .fetch(ctx, &path, &reference, &request)
            .expect("fetch");
    });

    assert_eq!(std::fs::read(&path).unwrap(), b"LIBRARY IMAGE");
    assert!(client.verifier().is_none());
}
