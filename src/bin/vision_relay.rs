use argh::FromArgs;
use std::{path::PathBuf, sync::Arc};
use vision_relay::{AppState, GradioClient, RelayConfig, router};

// defaults for the server
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_STATIC_DIR: &str = "static";
const DEFAULT_BODY_LIMIT_MB: usize = 50;

#[derive(FromArgs)]
/// Vision relay forwards uploads to a hosted segmentation model.
struct RelayArgs {
    /// the host to run the server on
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to run the server on
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// base URL of the remote endpoint (default: $HF_SPACE_URL)
    #[argh(option)]
    space_url: Option<String>,

    /// access token for private endpoints (default: $HF_TOKEN)
    #[argh(option)]
    token: Option<String>,

    /// directory for staged uploads (default: the OS temp dir)
    #[argh(option)]
    temp_dir: Option<PathBuf>,

    /// directory holding the browser front-end
    #[argh(option, default = "PathBuf::from(DEFAULT_STATIC_DIR)")]
    static_dir: PathBuf,

    /// maximum upload size in megabytes
    #[argh(option, default = "DEFAULT_BODY_LIMIT_MB")]
    body_limit_mb: usize,

    /// allow cross-origin requests
    #[argh(switch)]
    cors: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: RelayArgs = argh::from_env();

    let mut config = RelayConfig::from_env()
        .with_body_limit(args.body_limit_mb * 1024 * 1024)
        .with_permissive_cors(args.cors);
    if let Some(space_url) = args.space_url {
        config = config.with_space_url(space_url);
    }
    if args.token.is_some() {
        config = config.with_token(args.token);
    }
    if let Some(dir) = args.temp_dir {
        config = config.with_temp_dir(dir);
    }
    if args.static_dir.is_dir() {
        config = config.with_static_dir(Some(args.static_dir));
    } else {
        log::warn!(
            "Static directory {} not found, serving the API only",
            args.static_dir.display()
        );
    }

    if config.token.is_none() {
        log::warn!("No access token configured, private endpoints will refuse requests");
    }

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    let backend = Arc::new(GradioClient::new(&config)?);
    log::info!("Remote endpoint: {}", config.space_url);
    log::info!("Staging uploads in {}", config.temp_dir.display());

    let app = router(AppState::new(config, backend));

    log::info!("Starting the relay");
    log::info!("Listening on: {}", addr);
    log::info!("Press Ctrl+C to stop the server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
