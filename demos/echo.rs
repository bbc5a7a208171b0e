//! Echo host: answers every request with its method, path and body.
//!
//! ```text
//! cargo run --example echo -- --config echo.toml
//! curl -d hello http://localhost:5000/anything
//! ```

use std::path::PathBuf;

use clap::Parser;
use http::header::{HeaderValue, CONTENT_TYPE};

use listener_server::config::{load_config, ServerConfig};
use listener_server::lifecycle::shutdown_signal;
use listener_server::observability::logging;
use listener_server::{BoxError, FnApplication, HostBuilder, HttpContext};

#[derive(Parser)]
#[command(name = "echo")]
#[command(about = "Echo host running on the listener-backed server", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured urls.
    #[arg(short, long)]
    url: Vec<String>,
}

async fn echo(ctx: HttpContext) -> Result<(), BoxError> {
    let request = ctx.request();
    let body = request.body.bytes().await?;

    let response = ctx.response();
    response.with_headers(|headers| {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    })?;
    response.write(format!("{} {}{}\n", request.method, request.path_base, request.path).as_bytes())?;
    response.write(&body)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    logging::init(&config.logging)?;

    tracing::info!(
        urls = ?config.urls,
        workers = ?config.workers,
        request_queue_capacity = config.request_queue_capacity,
        "Configuration loaded"
    );

    let mut builder = HostBuilder::new().with_config(config);
    if !cli.url.is_empty() {
        builder = builder.urls(cli.url);
    }
    let host = builder.use_http_listener().build()?;

    host.run(FnApplication::new(echo), shutdown_signal()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
