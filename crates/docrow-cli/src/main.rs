//! Docrow CLI - schema and document migrations from the command line.

use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docrow_cli::{create_formatter, open_store, Action, Args, CliConfig, Formatter};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docrow=info,docrow_cli=info,docrow_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Args::parse().into_config();
    let formatter = create_formatter(config.format);

    if let Err(e) = run(config, formatter.as_ref()).await {
        eprintln!("{}", formatter.format_error(&e.to_string()));
        std::process::exit(1);
    }
}

async fn run(config: CliConfig, formatter: &dyn Formatter) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        database = %config.database.display(),
        schema = %config.schema.display(),
        "docrow starting"
    );

    let store = open_store(&config)?;

    match config.action {
        Action::Plan => {
            let outcome = store.plan()?;
            println!("{}", formatter.format_outcome(&outcome));
        }
        Action::Migrate { .. } => {
            let outcome = store.initialize()?;
            println!("{}", formatter.format_outcome(&outcome));
        }
        Action::RunMigrations { once: true, .. } => {
            let report = store.run_background_migrations()?;
            println!("{}", formatter.format_report(&report));
        }
        Action::RunMigrations { once: false, .. } => {
            let background = store.start_background_migrations()?;

            // Run until ctrl+c, or until the loop stops on its own error.
            let mut poll = tokio::time::interval(Duration::from_millis(500));
            loop {
                tokio::select! {
                    signal = tokio::signal::ctrl_c() => {
                        if let Err(e) = signal {
                            tracing::error!(error = %e, "failed to listen for ctrl+c");
                        }
                        tracing::info!("received shutdown signal");
                        break;
                    }
                    _ = poll.tick() => {
                        if !background.is_running() {
                            break;
                        }
                    }
                }
            }

            background.stop()?;
            let stats = store.stats();
            tracing::info!(
                migrated = stats.migrated,
                reprojected = stats.reprojected,
                skipped = stats.skipped,
                "background migrations finished"
            );
        }
    }

    Ok(())
}
