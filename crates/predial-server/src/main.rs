mod catalog;
mod config;
mod correlate;
mod document;
mod error;
mod export;
mod model;
mod profile;
mod prompt;
mod response;
mod selection;
mod server;
#[cfg(test)]
mod testing;
mod workflow;

use std::sync::Arc;

use rmcp::{ServiceExt, transport::stdio};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use catalog::Catalog;
use config::Config;
use correlate::Correlator;
use export::ReportSink;
use predial_common::openai::{OpenAiClient, OpenAiClientConfig};
use predial_common::text_service::GenerativeText;
use profile::ProfileStore;
use server::PredialServer;
use workflow::{Context, Workflows};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries MCP JSON-RPC, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting gestor-predial MCP server");

    let config = Config::from_env()?;
    info!(
        catalog = config.catalog_path.is_some(),
        profile = config.profile_path.is_some(),
        report_dir = config.report_dir.is_some(),
        "configuration loaded"
    );

    let catalog = Arc::new(Catalog::load(config.catalog_path.as_deref())?);
    let correlator = Arc::new(Correlator::new(catalog.all_pathologies()));

    let ai_config = OpenAiClientConfig::from_env();
    let ai = GenerativeText::new(OpenAiClient::new(ai_config)?);
    if ai.is_configured() {
        info!("AI text service configured");
    } else {
        warn!("OPENAI_MODEL not set, AI workflows will report the service as unconfigured");
    }

    let profiles = ProfileStore::load(config.profile_path.as_deref())?;
    let sink = ReportSink::new(config.report_dir.clone());
    if sink.is_enabled() {
        info!("exported reports will also be saved to disk");
    }

    let ctx = Context {
        ai: Arc::new(ai),
        catalog: Arc::clone(&catalog),
        correlator,
    };
    let server = PredialServer::new(catalog, Workflows::new(ctx), profiles, sink);

    if let Ok(addr) = std::env::var("MCP_TCP_LISTEN_ADDR") {
        let listener = TcpListener::bind(&addr).await?;
        info!(listen_addr = %addr, "MCP server ready, serving on TCP");
        loop {
            let (stream, peer) = listener.accept().await?;
            let server = server.clone();
            tokio::spawn(async move {
                info!(peer = %peer, "MCP client connected");
                let service = server.serve(stream).await.inspect_err(|e| {
                    tracing::error!(error = %e, "MCP server error");
                })?;
                service.waiting().await?;
                info!(peer = %peer, "MCP client disconnected");
                Ok::<(), anyhow::Error>(())
            });
        }
    } else {
        info!("MCP server ready, serving on stdio");
        let service = server.serve(stdio()).await.inspect_err(|e| {
            tracing::error!(error = %e, "MCP server error");
        })?;
        service.waiting().await?;
        info!("MCP server shut down");
    }
    Ok(())
}
