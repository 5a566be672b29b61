//! conveyor - cloud-to-cloud bulk transfer coordinator entry point.

use anyhow::Result;
use clap::Parser;
use conveyor::cli::{Cli, CredentialsCommand, ParallelCommand};
use conveyor::classify::Ruleset;
use conveyor::config::Config;
use conveyor::coordinator::job::JobOptions;
use conveyor::coordinator::Coordinator;
use conveyor::credential::{import, CredentialPool, SecretBlob};
use conveyor::model::Provider;
use conveyor::mover::{Mover, MoverClient};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default_with_env(),
    };

    conveyor::logging::init(&config.log.level)?;

    let mover: Arc<dyn Mover> = Arc::new(MoverClient::new(
        config.mover.url.clone(),
        config.mover.control_timeout_secs,
        config.mover.poll_interval_ms,
    ));
    let pool = CredentialPool::new(config.coordinator.pacific_reset_offset_hours);

    if let Some(dir) = &config.credentials.import_dir {
        match import::import_folder(&pool, dir).await {
            Ok(count) => tracing::info!(count, "imported credentials on startup"),
            Err(e) => tracing::warn!(error = %e, "startup credential import failed"),
        }
    }

    let shutdown = CancellationToken::new();
    let _reset_ticker = pool.spawn_reset_ticker(shutdown.clone());

    let coordinator = Coordinator::spawn_with_options(
        mover,
        pool.clone(),
        Ruleset::Default,
        config.coordinator.max_retries,
        config.coordinator.worker_death_requeue,
    );

    let code = match cli.command {
        conveyor::cli::Command::Credentials(cmd) => run_credentials(&pool, cmd).await?,
        conveyor::cli::Command::Parallel(cmd) => run_parallel(&coordinator, &config, cmd).await?,
    };

    Ok(code)
}

async fn run_credentials(pool: &CredentialPool, cmd: CredentialsCommand) -> Result<ExitCode> {
    match cmd {
        CredentialsCommand::Import { path } => match import::import_folder(pool, &path).await {
            Ok(count) => {
                println!("imported {count} credentials");
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                eprintln!("{e}");
                Ok(ExitCode::FAILURE)
            }
        },
        CredentialsCommand::Add { provider, file, name, daily_limit_bytes } => {
            let provider: Provider = provider.parse().unwrap_or(Provider::Unknown);
            let bytes = tokio::fs::read(&file).await?;
            let limit = daily_limit_bytes.map(conveyor::model::Quota::Limited).unwrap_or(conveyor::model::Quota::Unlimited);
            let id = pool.add(provider, SecretBlob(bytes), name, limit).await;
            println!("added credential {id}");
            Ok(ExitCode::SUCCESS)
        }
        CredentialsCommand::Status => {
            for snap in pool.status().await {
                println!(
                    "{}\t{}\t{}\tused={}\tremaining={:?}\tutil={:.1}%",
                    snap.id, snap.provider, snap.display_name, snap.bytes_used_today, snap.remaining, snap.utilisation_percent
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        CredentialsCommand::Quota { provider } => {
            let provider: Provider = provider.map(|p| p.parse().unwrap_or(Provider::Unknown)).unwrap_or(Provider::Unknown);
            let remaining = pool.total_remaining(&provider).await;
            println!("{provider}: {remaining:?}");
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_parallel(coordinator: &Coordinator, config: &Config, cmd: ParallelCommand) -> Result<ExitCode> {
    match cmd {
        ParallelCommand::Start { src, dst, workers, dry_run, largest_first, enumerate_first } => {
            let options = JobOptions {
                workers,
                dry_run,
                largest_first: largest_first.unwrap_or(config.coordinator.largest_first),
                enumerate_first: enumerate_first.unwrap_or(config.coordinator.enumerate_first),
            };
            match coordinator.start(src, dst, options).await {
                Ok(job_id) => {
                    println!("started job {job_id}");
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    eprintln!("{e}");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        ParallelCommand::Status => {
            let snap = coordinator.status().await;
            println!(
                "{}: {}/{} files, {} of {} transferred ({:.1}%), {} active workers, {}, elapsed {}",
                snap.status,
                snap.completed,
                snap.total_files,
                conveyor::format::format_bytes(snap.transferred_bytes),
                conveyor::format::format_bytes(snap.total_bytes),
                snap.progress_percent,
                snap.active_workers,
                conveyor::format::format_speed(snap.throughput_mb_s * 1e6),
                conveyor::format::format_duration(snap.elapsed_seconds),
            );
            println!("{}", serde_json::to_string_pretty(&snap)?);
            Ok(ExitCode::SUCCESS)
        }
        ParallelCommand::Pause => exit_for(coordinator.pause().await),
        ParallelCommand::Resume => exit_for(coordinator.resume().await),
        ParallelCommand::Abort => exit_for(coordinator.abort().await),
    }
}

fn exit_for(result: Result<(), conveyor::error::CoordinatorError>) -> Result<ExitCode> {
    match result {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            eprintln!("{e}");
            Ok(ExitCode::FAILURE)
        }
    }
}
