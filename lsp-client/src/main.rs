use anyhow::{Context, Result};
use clap::Parser;
use lsp_client::{init_tracing, LanguageClient, Settings};
use lsp_client_protocol::CapabilitySet;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tower_lsp::jsonrpc::Request;
use tracing::{info, warn};

/// Answer server-initiated requests read from stdin, one JSON-RPC message
/// per line, writing responses to stdout
#[derive(Parser)]
#[command(name = "lsp-client", version)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    /// Documents to open before reading requests
    #[arg(long = "open")]
    open: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(&cli.settings.log_filter, cli.settings.log_file.as_deref())?;

    info!("Starting LSP client in {}", cli.settings.workspace.display());

    let client = LanguageClient::from_settings(&cli.settings, CapabilitySet::workspace_edits())?;
    for path in &cli.open {
        client
            .open_document(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                warn!("Skipping malformed message: {}", e);
                continue;
            }
        };

        if let Some(response) = client.handle_server_request(request).await {
            let mut encoded = serde_json::to_vec(&response)?;
            encoded.push(b'\n');
            stdout.write_all(&encoded).await?;
            stdout.flush().await?;
        }
    }

    info!("Input closed, shutting down");
    Ok(())
}
