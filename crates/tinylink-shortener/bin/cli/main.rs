mod cli;

use crate::cli::{Cli, Command};
use anyhow::Context as _;
use clap::Parser;
use tinylink_core::{Context, Link, ShortCode, Shortener, UserId};
use tinylink_shortener::LinkService;
use tinylink_storage::Backend;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse();
    init_tracing(config.log_json);

    let storage = config.storage_config();
    let backend = Backend::open(&storage)
        .await
        .context("failed to open storage backend")?;
    info!(backend = %backend.kind(), timeout_secs = config.timeout, "tinylink ready");

    let service = LinkService::with_settings(backend, config.service_settings());
    let ctx = Context::background().with_timeout(config.timeout());

    match config.command {
        Command::Shorten { user, urls } => {
            let registration = service.register(&ctx, urls, &UserId::new(user)).await?;
            if registration.is_existing() {
                info!("some urls were already shortened");
            }
            print_links(registration.links(), &config.base_url)?;
        }
        Command::Resolve { code } => {
            let code = ShortCode::new(code)?;
            let link = service.get_short(&ctx, &code).await?;
            print_links(std::slice::from_ref(&link), &config.base_url)?;
        }
        Command::List { user } => {
            let links = service.list_by_owner(&ctx, &UserId::new(user)).await?;
            print_links(&links, &config.base_url)?;
        }
        Command::Delete { user, codes } => {
            let codes = codes
                .into_iter()
                .map(ShortCode::new)
                .collect::<Result<Vec<_>, _>>()?;
            let changed = service
                .spawn_mark_as_deleted(UserId::new(user), codes)
                .wait()
                .await?;
            println!("{changed}");
        }
        Command::Health => {
            service.health_check(&ctx).await?;
            println!("ok");
        }
        Command::Stats => {
            let stats = service.stats(&ctx).await?;
            println!("{}", serde_json::to_string(&stats)?);
        }
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// One JSON object per line, with the full short URL added.
fn print_links(links: &[Link], base_url: &str) -> anyhow::Result<()> {
    for link in links {
        let mut value = serde_json::to_value(link)?;
        value["short_url"] = serde_json::Value::String(link.short_code.to_url(base_url));
        println!("{value}");
    }
    Ok(())
}
