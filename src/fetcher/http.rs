use std::{
    fs::File,
    io::{self, BufWriter, Read, Write},
    path::Path,
    time::Duration,
};

use super::{try_io, FetchContext, FetchError, Fetcher};
use crate::{PullRequest, Reference};

pub(super) const USER_AGENT: &str =
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum time to wait for a single read from the server.
const READ_TIMEOUT: Duration = Duration::from_secs(60);

const BUFFER_SIZE: usize = 8 * 1024;

/// Download images from `http://` and `https://` URLs.
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        HttpFetcher { agent: agent() }
    }
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(
        &self,
        ctx: &FetchContext<'_>,
        target: &Path,
        reference: &Reference<'_>,
        _request: &PullRequest,
    ) -> Result<(), FetchError> {
        ctx.check_cancelled()?;

        ctx.event_handler.registry_request(reference.source);

        let response = self
            .agent
            .get(reference.source)
            .set("User-Agent", USER_AGENT)
            .call()?;

        save_body(ctx, response.into_reader(), target)
    }
}

pub(super) fn agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(CONNECT_TIMEOUT)
        .timeout_read(READ_TIMEOUT)
        .build()
}

/// Write the data from `input` to a new file in `target`.
///
/// The token in `ctx` is checked before every chunk.
pub(super) fn save_body(
    ctx: &FetchContext<'_>,
    mut input: impl Read,
    target: &Path,
) -> Result<(), FetchError> {
    let file = try_io!(
        target,
        File::options().write(true).create_new(true).open(target)
    );

    let mut data = [0u8; BUFFER_SIZE];
    let mut output = BufWriter::new(file);

    loop {
        ctx.check_cancelled()?;

        let n = try_io!(target, input.read(&mut data[..]));

        if n == 0 {
            try_io!(target, output.flush());
            return Ok(());
        }

        ctx.event_handler.download_progress_bytes(n);

        try_io!(target, output.write_all(&data[..n]));
    }
}

#[test]
fn download_file() {
    use tiny_http::Response;

    let server_port = super::tests::http_server(|req| {
        let response = match req.url() {
            "/images/alpine.sif" => Response::from_string("SIF DATA"),
            _ => Response::from_string("Not Found").with_status_code(404),
        };

        req.respond(response).expect("Send response");
    });

    let target = tempfile::tempdir().unwrap();
    let path = target.path().join("alpine.sif");

    let source = format!("http://127.0.0.1:{server_port}/images/alpine.sif");
    let reference = Reference::try_from(source.as_str()).unwrap();
    let request = PullRequest::new(source.as_str());

    super::tests::with_context(|ctx| {
        HttpFetcher::new()
            .fetch(ctx, &path, &reference, &request)
            .expect("fetch");
    });

    assert_eq!(std::fs::read(&path).unwrap(), b"SIF DATA");
}

#[test]
fn missing_file() {
    use tiny_http::Response;

    let server_port = super::tests::http_server(|req| {
        let response = Response::from_string("Not Found").with_status_code(404);
        req.respond(response).expect("Send response");
    });

    let target = tempfile::tempdir().unwrap();
    let path = target.path().join("a.sif");

    let source = format!("http://127.0.0.1:{server_port}/a.sif");
    let reference = Reference::try_from(source.as_str()).unwrap();
    let request = PullRequest::new(source.as_str());

    let result = super::tests::with_context(|ctx| {
        HttpFetcher::new().fetch(ctx, &path, &reference, &request)
    });

    assert!(matches!(result, Err(FetchError::HttpRequest(_))));
    assert!(!path.exists());
}

#[test]
fn stop_when_cancelled() {
    struct Endless;

    impl Read for Endless {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            buf.fill(b'x');
            Ok(buf.len())
        }
    }

    let target = tempfile::tempdir().unwrap();
    let path = target.path().join("endless");

    let result = super::tests::with_context(|ctx| {
        let counter = CancelAfter {
            reader: Endless,
            remaining: 4 * BUFFER_SIZE,
            ctx,
        };

        save_body(ctx, counter, &path)
    });

    assert!(matches!(result, Err(FetchError::Interrupted)));

    /// Cancel the pull after reading some bytes.
    struct CancelAfter<'a, R> {
        reader: R,
        remaining: usize,
        ctx: &'a FetchContext<'a>,
    }

    impl<R: Read> Read for CancelAfter<'_, R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.reader.read(buf)?;
            self.remaining = self.remaining.saturating_sub(n);
            if self.remaining == 0 {
                self.ctx.cancel.cancel();
            }
            Ok(n)
        }
    }
}
