use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use scenelink::args::CommonArgs;
use scenelink::config::Config;
use scenelink::logging::{self, LogConfig, LogFormat};
use scenelink::{BridgeContext, analysis, run_bridge};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

// ── CLI ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(
    name = "scenelink",
    version,
    about = "Relay game scenes to a vision model and send back actions"
)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the relay (default when no subcommand is given)
    Run(RunArgs),
    /// Load and validate the configuration, then print it
    Check {
        /// Output JSON instead of TOML
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Default, clap::Args)]
struct RunArgs {
    /// Verbose logging
    #[arg(long, short)]
    verbose: bool,

    /// Log line layout (overrides SCENELINK_LOG_FORMAT)
    #[arg(long, value_enum, value_name = "FORMAT")]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.common.config_path())?;
    cli.common.apply_overrides(&mut config);

    let args = match cli.command {
        Some(Commands::Run(args)) => args,
        Some(Commands::Check { json }) => {
            config.validate()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print!("{}", toml::to_string_pretty(&config)?);
            }
            return Ok(());
        }
        None => RunArgs::default(),
    };

    let mut log_config = LogConfig::from_env().with_format(args.log_format);
    if args.verbose {
        log_config = log_config.verbose();
    }
    logging::init(log_config);

    let analyzer = analysis::from_config(&config.analysis)?;
    info!(analyzer = analyzer.name(), "Scene analyzer ready");

    let ctx = Arc::new(BridgeContext::new(config, analyzer));
    let cancel = CancellationToken::new();

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupt received, shutting down"),
            Err(err) => error!("Failed to listen for interrupt: {}", err),
        }
        shutdown.cancel();
    });

    run_bridge(ctx, cancel).await?;
    info!("Relay stopped");
    Ok(())
}
