// AppHost CLI: starts a local node and serves flat calls as JSON lines on stdin/stdout.

mod serve;

use std::path::PathBuf;

use anyhow::Context;
use apphost_core::{AppHostAdapter, Keypair};
use apphost_net::{config, TcpStack};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "apphost", version, about = "Drive a peer-to-peer node through flat JSON calls")]
struct Cli {
    /// Config file (default: ~/.config/apphost/config.toml, then /etc/apphost/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the embedded JS client and exit.
    #[arg(long)]
    client_js: bool,
}

/// Logs go to stderr; stdout is reserved for responses.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.client_js {
        print!("{}", apphost_core::client_js());
        return Ok(());
    }

    init_tracing();

    let cfg = match &cli.config {
        Some(path) => config::load_from(path)?,
        None => config::load(),
    };
    let stack = TcpStack::start(&cfg, Keypair::generate()).context("failed to start node")?;
    let adapter = AppHostAdapter::new(stack);

    let stdin = std::io::stdin();
    serve::serve(&adapter, stdin.lock(), std::io::stdout()).context("serving stdin")?;
    Ok(())
}
