use clap::Parser;
use correlate_core::db::{self, PgConnector};
use correlate_core::CorrelateConfig;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "correlate.toml")]
    config: String,

    /// Probe every configured instance and exit.
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match CorrelateConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging; RUST_LOG wins over the configured level
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level)),
        )
        .init();

    if args.health {
        let mut healthy = true;
        for instance in &config.instances {
            match db::health_check(&PgConnector, instance, &config.store).await {
                Ok(v) => println!("✅ {} ({}:{}) connected: {}", instance.name, instance.host, instance.port, v),
                Err(e) => {
                    println!("❌ {} ({}:{}) connection failed: {}", instance.name, instance.host, instance.port, e);
                    healthy = false;
                }
            }
        }
        if !healthy {
            std::process::exit(1);
        }
        println!("✅ Correlate store health check passed");
        return Ok(());
    }

    let (tx, rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    tracing::info!(
        instances = config.instances.len(),
        overflow_probability = config.routing.overflow_probability,
        "Starting correlate server"
    );
    correlate_server::http::start_http_server(config, rx).await?;

    Ok(())
}
