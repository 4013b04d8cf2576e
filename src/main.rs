//! EMRYS - terminal client for AI personas
//!
#![doc = "EMRYS - terminal client for AI personas"]
#![doc = "Main entry point for the EMRYS application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use emrys::cli::{Cli, Commands};
use emrys::commands::{self, Runtime};
use emrys::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);

    // Load configuration
    let config_path = match cli.config.as_deref() {
        Some(path) => path.into(),
        None => Config::default_path(),
    };
    tracing::debug!("Loading configuration from {}", config_path.display());
    let config = Config::load(&config_path.to_string_lossy(), &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Auth { key, clear } => {
            tracing::info!("Starting credential setup");
            commands::auth::run_auth(&config, key, clear).await?;
            Ok(())
        }
        command => {
            let runtime = Runtime::from_config(&config)?;
            run(command, &config, &runtime).await
        }
    }
}

async fn run(command: Commands, config: &Config, runtime: &Runtime) -> Result<()> {
    match command {
        Commands::Chat { persona } => {
            tracing::info!("Starting direct chat with persona {}", persona);
            commands::chat::run_chat(config, runtime, &persona).await
        }
        Commands::Hub { hub } => {
            tracing::info!("Starting hub chat in {}", hub);
            commands::hub::run_hub(config, runtime, &hub).await
        }
        Commands::Personas { command } => commands::personas::run_personas(runtime, command).await,
        Commands::Hubs { command } => commands::hubs::run_hubs(runtime, command).await,
        Commands::Synthesize {
            name,
            context,
            save,
        } => {
            commands::synthesize::run_synthesize(runtime, &name, context.as_deref(), save).await
        }
        Commands::Feed { reflect } => commands::feed::run_feed(runtime, reflect).await,
        Commands::Auth { key, clear } => commands::auth::run_auth(config, key, clear).await,
    }
}

/// Initialize tracing subscriber with environment filter
///
/// Logs go to stderr so they do not interleave with chat output on stdout.
/// `EMRYS_LOG_FORMAT=json` switches to JSON lines.
fn init_tracing(verbose: bool) {
    let default = if verbose { "emrys=debug" } else { "emrys=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let json = std::env::var("EMRYS_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .init();
}
