use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use visabuddy_lib::config::{self, Settings};
use visabuddy_lib::core_state::CoreState;
use visabuddy_lib::pipeline::rag::validator::{OverallStatus, RagValidator};
use visabuddy_lib::pipeline::rag::RagService;

#[derive(Parser)]
#[command(name = "visabuddy")]
#[command(about = "VisaBuddy AI service: chat, checklists, document checks and approval estimates")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Bind address (overrides HOST)
        #[arg(long)]
        host: Option<IpAddr>,

        /// Port (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Index the knowledge base and check retrieval quality
    Ingest {
        /// Knowledge-base file
        #[arg(long, env = "KB_PATH")]
        kb_path: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    visabuddy_lib::init_tracing();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Serve { host, port } => serve(settings, host, port),
        Commands::Ingest { kb_path } => ingest(settings, kb_path),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn serve(mut settings: Settings, host: Option<IpAddr>, port: Option<u16>) -> Result<ExitCode, String> {
    if let Some(host) = host {
        settings.host = host;
    }
    if let Some(port) = port {
        settings.port = port;
    }
    let addr = SocketAddr::new(settings.host, settings.port);
    tracing::info!("{} v{} starting", config::APP_NAME, config::APP_VERSION);

    // Blocking HTTP clients must be built outside the runtime.
    let core = Arc::new(CoreState::from_settings(settings).map_err(|e| e.to_string())?);

    let runtime = tokio::runtime::Runtime::new().map_err(|e| format!("Cannot start runtime: {e}"))?;
    let served = runtime.block_on(run_server(Arc::clone(&core), addr));
    // Tasks still holding state go down with the runtime, before `core`.
    runtime.shutdown_timeout(Duration::from_secs(5));
    served.map(|()| ExitCode::SUCCESS)
}

async fn run_server(core: Arc<CoreState>, addr: SocketAddr) -> Result<(), String> {
    let rag_core = Arc::clone(&core);
    tokio::task::spawn_blocking(move || {
        if rag_core.rag().initialize() {
            tracing::info!("RAG service initialized");
        } else {
            tracing::warn!("RAG initialization failed, serving without knowledge-base context");
        }
    });

    let mut server = visabuddy_lib::api::start_api_server(core, addr).await?;
    tracing::info!(addr = %server.session.server_addr, "Listening");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for Ctrl-C: {e}");
    }
    server.shutdown();
    server.stopped().await;
    Ok(())
}

fn ingest(mut settings: Settings, kb_path: Option<PathBuf>) -> Result<ExitCode, String> {
    if let Some(path) = kb_path {
        settings.kb_path = path;
    }
    tracing::info!(kb = %settings.kb_path.display(), "Ingesting knowledge base");

    let rag = RagService::from_settings(&settings);
    if !rag.initialize() {
        tracing::error!("RAG initialization failed");
        return Ok(ExitCode::FAILURE);
    }

    let status = serde_json::to_string_pretty(&rag.status()).map_err(|e| e.to_string())?;
    println!("{status}");

    let report = RagValidator::new(&rag).validate();
    let rendered = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
    println!("{rendered}");

    match report.overall_status {
        OverallStatus::Passed => tracing::info!("Retrieval validation PASSED"),
        OverallStatus::NeedsImprovement => tracing::warn!("Retrieval validation NEEDS_IMPROVEMENT"),
    }
    Ok(ExitCode::SUCCESS)
}
