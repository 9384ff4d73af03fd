/// Loudness Equalizer Server - batch loudness equalization over HTTP
use axum::Router;
use clap::{Parser, Subcommand};
use loudeq_loudness::{
    BatchEqualizer, BatchJob, CancellationToken, FileOutcome, LoudnessTool, NormalizationTarget,
};
use loudeq_server::{
    api,
    config::{ServerConfig, ServerSettings},
    services::JobStore,
    state::AppState,
};
use http::{header, HeaderValue};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "loudeq-server")]
#[command(about = "Loudness equalization server and batch tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Equalize local files into an output directory
    Equalize {
        /// Input audio files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Directory for the equalized copies
        #[arg(short, long)]
        output_dir: PathBuf,
        /// Integrated loudness target in LUFS
        #[arg(short, long, allow_hyphen_values = true)]
        target: Option<f64>,
        /// Files processed concurrently
        #[arg(short, long)]
        workers: Option<usize>,
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Report whether ffmpeg can be run
    Check {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "loudeq_server=info,loudeq_loudness=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => {
            serve(config).await?;
        }
        Commands::Equalize {
            inputs,
            output_dir,
            target,
            workers,
            config,
        } => {
            equalize(inputs, output_dir, target, workers, config).await?;
        }
        Commands::Check { config } => {
            check(config).await?;
        }
    }

    Ok(())
}

async fn serve(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    // Load configuration
    let config = ServerConfig::load(config_path.as_deref())?;
    config.validate()?;

    tracing::info!("Starting Loudness Equalizer server");
    tracing::info!("Host: {}", config.server.host);
    tracing::info!("Port: {}", config.server.port);

    // Initialize job storage
    let job_store = JobStore::new(config.storage.data_dir.clone(), config.storage.max_jobs);
    job_store.initialize().await?;
    tracing::info!("Job storage initialized at {:?}", config.storage.data_dir);

    // Initialize equalizer
    let tool = Arc::new(config.equalizer.tool());
    if tool.is_available().await {
        tracing::info!("Using ffmpeg at {:?}", tool.ffmpeg_path());
    } else {
        tracing::warn!(
            "ffmpeg not found at {:?}; equalization requests will fail until it is installed",
            tool.ffmpeg_path()
        );
    }
    let equalizer = Arc::new(BatchEqualizer::new(
        tool,
        config.equalizer.equalizer_config(),
    ));
    tracing::info!(
        "Equalizer ready: target {} LUFS, {} workers",
        config.equalizer.target_lufs,
        config.equalizer.workers
    );

    // Build application state
    let app_state = AppState::new(
        equalizer,
        Arc::new(job_store),
        Arc::new(config.equalizer.clone()),
    );

    // Build router
    let app = create_router(app_state, &config.server)?;

    // Create server address
    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    tracing::info!("Server listening on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn create_router(app_state: AppState, settings: &ServerSettings) -> anyhow::Result<Router> {
    Ok(api::router(app_state, settings.max_upload_bytes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(cors_layer(&settings.cors_origins)?))
}

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([header::CONTENT_DISPOSITION]);

    if origins.iter().any(|origin| origin == "*") {
        return Ok(cors.allow_origin(Any));
    }

    let origins = origins
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(cors.allow_origin(origins))
}

async fn equalize(
    inputs: Vec<PathBuf>,
    output_dir: PathBuf,
    target: Option<f64>,
    workers: Option<usize>,
    config_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut config = ServerConfig::load(config_path.as_deref())?;
    if let Some(workers) = workers {
        config.equalizer.workers = workers;
    }
    config.validate()?;

    let equalizer = BatchEqualizer::new(
        Arc::new(config.equalizer.tool()),
        config.equalizer.equalizer_config(),
    );

    let total = inputs.len();
    let mut job = BatchJob::new(inputs, output_dir);
    if let Some(lufs) = target {
        let target = NormalizationTarget::with_integrated_lufs(lufs);
        anyhow::ensure!(target.is_valid(), "target {} LUFS is out of range", lufs);
        job = job.with_target(target);
    }

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted; finishing files already in progress");
                cancel.cancel();
            }
        })
    };

    let result = equalizer.run(&job, &cancel).await;
    interrupt.abort();
    let result = result?;

    for report in &result.reports {
        match &report.outcome {
            FileOutcome::Succeeded { output, measured } => {
                println!("ok       {} -> {}", report.file_name, output.display());
                println!("         {}", measured);
            }
            FileOutcome::Failed { message, .. } => {
                println!("failed   {}: {}", report.file_name, message);
            }
            FileOutcome::Cancelled => {
                println!("skipped  {} (cancelled)", report.file_name);
            }
        }
    }
    println!(
        "Processed {} of {} files",
        result.processed_count(),
        total
    );

    Ok(())
}

async fn check(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = ServerConfig::load(config_path.as_deref())?;
    let tool = config.equalizer.tool();

    if tool.is_available().await {
        println!("ffmpeg: available ({})", tool.ffmpeg_path().display());
        Ok(())
    } else {
        anyhow::bail!(
            "ffmpeg is not available at {}",
            tool.ffmpeg_path().display()
        )
    }
}
