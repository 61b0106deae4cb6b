//! Firewatch CLI - queue wildfire reports while offline
//!
//! Every mutation lands in the durable local queue first and is delivered to
//! the backend when it is reachable.

mod cli;
mod commands;
mod error;


use clap::Parser;
use firewatch_core::config::ClientConfig;

use crate::cli::{Cli, Commands, QueueCommands};
use crate::commands::common::{resolve_data_dir, CommandContext};
use crate::commands::completions::run_completions;
use crate::commands::enqueue::{
    report_operations, run_enqueue, sync_operation, update_operation, upload_operation,
    ReportArgs,
};
use crate::commands::queue::{
    run_cleanup, run_clear, run_drain, run_list, run_remove, run_retry, run_status,
};
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("firewatch_core=warn")),
        )
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let ctx = CommandContext {
        data_dir: resolve_data_dir(cli.data_dir)?,
        store: cli.store,
        config: ClientConfig::from_env()?,
    };
    tracing::debug!(data_dir = %ctx.data_dir.display(), config = ?ctx.config, "Resolved CLI context");

    match cli.command {
        Commands::Report {
            description,
            lat,
            lon,
            severity,
            fire_type,
            image,
            no_drain,
        } => {
            let operations = report_operations(ReportArgs {
                description: &description,
                latitude: lat,
                longitude: lon,
                severity: severity.map(Into::into),
                fire_type,
                image: image.as_deref(),
            })?;
            run_enqueue(&ctx, operations, no_drain).await?;
        }
        Commands::Update {
            report_id,
            status,
            description,
            severity,
            no_drain,
        } => {
            let operation = update_operation(
                &report_id,
                status.map(Into::into),
                description,
                severity.map(Into::into),
            )?;
            run_enqueue(&ctx, vec![operation], no_drain).await?;
        }
        Commands::Upload {
            path,
            content_type,
            report_id,
            no_drain,
        } => {
            let operation = upload_operation(&path, content_type, report_id)?;
            run_enqueue(&ctx, vec![operation], no_drain).await?;
        }
        Commands::Sync {
            scope,
            since,
            no_drain,
        } => {
            let operation = sync_operation(&scope, since)?;
            run_enqueue(&ctx, vec![operation], no_drain).await?;
        }
        Commands::Queue { command } => match command {
            QueueCommands::Status { json } => run_status(&ctx, json).await?,
            QueueCommands::List { status, json } => {
                run_list(&ctx, status.map(Into::into), json).await?;
            }
            QueueCommands::Drain => run_drain(&ctx).await?,
            QueueCommands::Retry => run_retry(&ctx).await?,
            QueueCommands::Clear { all } => run_clear(&ctx, all).await?,
            QueueCommands::Cleanup => run_cleanup(&ctx).await?,
            QueueCommands::Remove { id } => run_remove(&ctx, &id).await?,
        },
        Commands::Watch { interval_secs } => run_watch(&ctx, interval_secs).await?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}
