mod cli;

use crate::cli::{Command, CLI};
use anyhow::Context;
use clap::Parser;
use snip_core::{ShortCode, ShortenRequest};
use snip_generator::HashGenerator;
use snip_shortener::{ServiceSettings, Shortener, ShortenerService};
use snip_storage::{open_repository, StorageConfig};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = CLI::parse();

    let storage = StorageConfig {
        database_dsn: config.database_dsn,
        file_path: config.file_storage,
    };

    info!(
        storage_backend = %storage.kind(),
        url_length = config.url_length,
        timeout_secs = config.timeout_secs,
        max_attempts = config.max_attempts,
        "starting snip"
    );

    let repository = open_repository(&storage)
        .await
        .context("failed to open storage backend")?;

    let settings = ServiceSettings::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .max_attempts(config.max_attempts)
        .build();
    let generator = HashGenerator::builder().length(config.url_length).build();
    let service = ShortenerService::with_settings(repository.clone(), generator, settings);

    let render = |code: &ShortCode| match config.base_url.as_deref() {
        Some(base_url) => code.to_url(base_url),
        None => code.to_string(),
    };

    let outcome: anyhow::Result<Vec<String>> = match config.command {
        Command::Shorten { urls, owner } => {
            let requests: Vec<ShortenRequest> = urls
                .iter()
                .map(|url| ShortenRequest::new(url.as_str(), owner.as_deref()))
                .collect();
            service
                .shorten_batch(&requests)
                .await
                .map(|codes| codes.iter().map(render).collect())
                .context("failed to shorten")
        }
        Command::Resolve { code } => service
            .resolve(&code)
            .await
            .map(|long_url| vec![long_url])
            .with_context(|| format!("failed to resolve {code}")),
        Command::List { owner } => service
            .list_by_owner(&owner)
            .await
            .map(|mappings| {
                mappings
                    .iter()
                    .map(|m| {
                        format!(
                            "{}\t{}\t{}",
                            render(&m.code),
                            m.record.long_url,
                            m.record.created_at
                        )
                    })
                    .collect()
            })
            .with_context(|| format!("failed to list urls for {owner}")),
        Command::Ping => service
            .ping()
            .await
            .map(|()| vec!["ok".to_string()])
            .context("storage backend is not reachable"),
    };

    if let Err(e) = repository.close().await {
        warn!(error = %e, "failed to close storage backend");
    }

    for line in outcome? {
        println!("{line}");
    }
    Ok(())
}
