use std::{path::Path, time::Duration};

use tiny_http::{Request, Server};

use super::*;
use crate::NoEventHandler;

/// Start a HTTP server in a random port, and send every request to
/// `handler`.
///
/// Returns the port number of the server.
pub(super) fn http_server(handler: impl Fn(Request) + Send + 'static) -> u16 {
    let server = Server::http("127.1:0").expect("start HTTP server");
    let port = server.server_addr().to_ip().unwrap().port();

    std::thread::spawn(move || {
        while let Ok(Some(request)) = server.recv_timeout(Duration::from_secs(30)) {
            handler(request);
        }
    });

    port
}

/// Run `f` with a context that is not cancelled, and with no cache.
pub(super) fn with_context<R>(f: impl FnOnce(&FetchContext<'_>) -> R) -> R {
    let cancel = CancelToken::new();
    let cache = CacheHandle::disabled();

    f(&FetchContext {
        cancel: &cancel,
        cache: &cache,
        event_handler: &NoEventHandler,
    })
}

struct Named(&'static str);

impl Fetcher for Named {
    fn fetch(
        &self,
        _: &FetchContext<'_>,
        target: &Path,
        _: &Reference<'_>,
        _: &PullRequest,
    ) -> Result<(), FetchError> {
        std::fs::write(target, self.0).map_err(|e| FetchError::Io(e, target.into()))
    }
}

fn fetch_with(fetcher: &dyn Fetcher, reference: &str) -> String {
    let target = tempfile::tempdir().unwrap();
    let path = target.path().join("out");

    let reference = Reference::try_from(reference).unwrap();
    let request = PullRequest::new(reference.source);

    with_context(|ctx| fetcher.fetch(ctx, &path, &reference, &request)).unwrap();
    std::fs::read_to_string(&path).unwrap()
}

#[test]
fn lookup_registered_fetchers() {
    let mut registry = FetcherRegistry::new();
    registry
        .register(TransportKind::Library, Named("library"))
        .register(TransportKind::Https, Named("https"));

    let library = registry.lookup(TransportKind::Library).unwrap();
    assert_eq!(fetch_with(library, "library://foo"), "library");

    // Bare names use the library fetcher.
    let bare = registry.lookup(TransportKind::LibraryDefault).unwrap();
    assert_eq!(fetch_with(bare, "foo"), "library");

    let https = registry.lookup(TransportKind::Https).unwrap();
    assert_eq!(fetch_with(https, "https://example.com/a"), "https");
}

#[test]
fn lookup_missing_fetchers() {
    let mut registry = FetcherRegistry::new();
    registry.register(TransportKind::Unsupported, Named("never"));

    for kind in [
        TransportKind::Unsupported,
        TransportKind::Hub,
        TransportKind::OciRegistry,
        TransportKind::Http,
    ] {
        assert!(matches!(
            registry.lookup(kind),
            Err(PullError::UnsupportedTransport(_))
        ));
    }
}

#[test]
fn cancelled_context() {
    let cancel = CancelToken::new();
    let cache = CacheHandle::disabled();
    let ctx = FetchContext {
        cancel: &cancel,
        cache: &cache,
        event_handler: &NoEventHandler,
    };

    assert!(ctx.check_cancelled().is_ok());

    cancel.cancel();
    assert!(matches!(ctx.check_cancelled(), Err(FetchError::Interrupted)));
}
