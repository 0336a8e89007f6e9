//! CBDC peer binary
//!
//! Reads one JSON proposal per line on stdin and writes one JSON response per
//! line on stdout. Logs go to stderr.

use anyhow::Context;
use cbdc_ledger::{Config, Error, Peer, Proposal, Response};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting CBDC peer");

    // Load configuration
    let config = Config::from_env().context("failed to load configuration")?;
    tracing::info!(data_dir = %config.data_dir.display(), "Configuration loaded");

    // Open world state
    let peer = Peer::open(config).context("failed to open peer")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read proposal")?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                None
            }
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Proposal>(&line) {
            Ok(proposal) => peer.submit(proposal).await,
            Err(e) => Response::failure(
                String::new(),
                &Error::validation(format!("malformed proposal: {}", e)),
            ),
        };

        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }

    tracing::debug!(metrics = %peer.metrics().render(), "Final metrics");
    peer.shutdown().await?;

    tracing::info!("Shutting down CBDC peer");
    Ok(())
}
