use std::{path::PathBuf, process::ExitCode, time::Duration};

use clap::{builder::FalseyValueParser, Parser};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use image_pull::{
    resolve_library_endpoints, CacheConfig, CacheHandle, Credentials, FetcherRegistry,
    HttpFetcher, LibraryClient, LibraryEndpoints, ParseError, PullError, PullRequest, Puller,
    Reference, RemoteConfig, TracingEventHandler, TransportKind, DEFAULT_KEY_SERVER_URL,
    DEFAULT_LIBRARY_URL,
};

/// Time for a fetcher to stop after a termination signal, before its
/// temporary file is removed and the process exits.
const INTERRUPT_GRACE: Duration = Duration::from_secs(5);

/// Download an image from a library, a registry, or a URL.
///
/// The image is written to a temporary file, and it is moved to its
/// destination only when the download is complete.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Architecture to pull from the library.
    #[arg(long, env = "PULL_ARCH")]
    arch: Option<String>,

    /// URI of the library to pull from.
    #[arg(long, env = "LIBRARY")]
    library: Option<String>,

    /// Name of the image file.
    #[arg(long, env = "PULL_NAME", hide = true)]
    name: Option<String>,

    /// Directory to write the image file. `PULLFOLDER` is also accepted.
    #[arg(long, env = "PULLDIR")]
    dir: Option<PathBuf>,

    /// Don't use the image cache.
    ///
    /// Boolean variables are false only with an empty value, or with a
    /// value like `0`, `no` or `false`.
    #[arg(long, env = "DISABLE_CACHE", value_parser = FalseyValueParser::new())]
    disable_cache: bool,

    /// Don't warn about unsigned images. Deprecated.
    #[arg(short = 'U', long, env = "ALLOW_UNSIGNED", value_parser = FalseyValueParser::new())]
    allow_unsigned: bool,

    #[arg(
        long,
        env = "ALLOW_UNAUTHENTICATED",
        value_parser = FalseyValueParser::new(),
        hide = true
    )]
    allow_unauthenticated: bool,

    /// Overwrite the image file if it exists.
    #[arg(short = 'F', long, env = "FORCE", value_parser = FalseyValueParser::new())]
    force: bool,

    /// Use plain HTTP for registries.
    #[arg(long, env = "NOHTTPS", value_parser = FalseyValueParser::new())]
    nohttps: bool,

    /// Directory for temporary data.
    #[arg(long, env = "TMPDIR")]
    tmpdir: Option<PathBuf>,

    /// Username for the OCI registry.
    #[arg(long, env = "DOCKER_USERNAME")]
    docker_username: Option<String>,

    /// Password for the OCI registry.
    #[arg(long, env = "DOCKER_PASSWORD", hide_env_values = true)]
    docker_password: Option<String>,

    /// Remote endpoints configuration. The file must be readable.
    #[arg(long, env = "REMOTE_CONFIG")]
    remote_config: Option<PathBuf>,

    /// Root directory of the image cache.
    #[arg(long, env = "CACHEDIR")]
    cache_dir: Option<PathBuf>,

    /// URI of the key server.
    #[arg(long, env = "KEYSERVER", default_value = DEFAULT_KEY_SERVER_URL)]
    keyserver: String,

    /// Print debug messages.
    #[arg(short, long)]
    verbose: bool,

    /// Optional image file name, followed by the image reference.
    #[arg(required = true, num_args = 1..=2, value_names = ["NAME", "REFERENCE"])]
    images: Vec<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .with_target(false)
        .with_ansi(false)
        .compact()
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Failed to set tracing subscriber");
        return ExitCode::FAILURE;
    }

    match pull(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

impl Args {
    /// Split the positional arguments in the optional name and the
    /// reference.
    fn images(&self) -> Result<(Option<&str>, &str), ParseError> {
        match self.images.as_slice() {
            [name, reference] => Ok((Some(name.as_str()), reference.as_str())),
            [reference] => Ok((None, reference.as_str())),
            _ => Err(ParseError::Empty),
        }
    }

    /// Output directory from `--dir`, `PULLDIR`, or the legacy
    /// `PULLFOLDER` variable.
    fn output_dir(&self) -> Option<PathBuf> {
        self.dir
            .clone()
            .or_else(|| std::env::var_os("PULLFOLDER").map(PathBuf::from))
    }

    fn request(&self) -> Result<PullRequest, ParseError> {
        let (name_argument, reference) = self.images()?;

        let mut request = PullRequest::new(reference)
            .overwrite(self.force)
            .no_https(self.nohttps);

        if let Some(arch) = &self.arch {
            request = request.arch(arch);
        }

        if let Some(name) = &self.name {
            request = request.explicit_name(name);
        }

        if let Some(name) = name_argument {
            request = request.name_argument(name);
        }

        if let Some(dir) = self.output_dir() {
            request = request.output_dir(dir);
        }

        if let Some(dir) = &self.tmpdir {
            request = request.tmp_dir(dir);
        }

        if let Some(username) = &self.docker_username {
            request = request.credentials(Credentials {
                username: username.clone(),
                password: self.docker_password.clone().unwrap_or_default(),
            });
        }

        Ok(request)
    }

    /// Fetchers for the transports supported by the binary.
    ///
    /// The remote configuration is loaded only to pull from a library.
    fn fetchers(&self, events: &TracingEventHandler) -> Result<FetcherRegistry, PullError> {
        let mut fetchers = FetcherRegistry::new();
        fetchers
            .register(TransportKind::Http, HttpFetcher::new())
            .register(TransportKind::Https, HttpFetcher::new());

        let (_, reference) = self.images()?;

        let is_library = Reference::try_from(reference)
            .map(|r| r.transport.is_library())
            .unwrap_or(false);

        if !is_library {
            return Ok(fetchers);
        }

        let config = RemoteConfig::load_or_default(self.remote_config.as_deref(), events)?;

        let defaults = LibraryEndpoints {
            library_url: self
                .library
                .clone()
                .unwrap_or_else(|| DEFAULT_LIBRARY_URL.to_owned()),
            key_server_url: self.keyserver.clone(),
            auth_token: None,
        };

        let endpoints =
            resolve_library_endpoints(&config, defaults, self.library.is_some(), events)?;

        tracing::debug!(
            "No verifier attached, key server {} is not used",
            endpoints.key_server_url
        );

        fetchers.register(TransportKind::Library, LibraryClient::new(endpoints));
        Ok(fetchers)
    }
}

/// Run a single pull.
///
/// Only setup errors are returned. A failed pull is reported through the
/// event handler.
fn pull(args: Args) -> Result<(), PullError> {
    let allow_unsigned = args.allow_unsigned || args.allow_unauthenticated;
    if allow_unsigned {
        tracing::warn!("--allow-unsigned is deprecated, and it only hides warnings");
    }

    let events = TracingEventHandler::new().allow_unsigned(allow_unsigned);

    let request = args.request()?;

    let cache = CacheHandle::new(&CacheConfig {
        disable: args.disable_cache,
        root: args.cache_dir.clone(),
    })?;

    let fetchers = args.fetchers(&events)?;

    let outcome = Puller::new(fetchers, cache, events)
        .interrupt_cleanup(INTERRUPT_GRACE)
        .pull(&request);

    if let Some(stage) = outcome.failed_stage {
        tracing::debug!("Pull failed during {stage}");
    }

    Ok(())
}
