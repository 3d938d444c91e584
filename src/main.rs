use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gleaner::app::AppContext;
use gleaner::cli::{commands, Cli, Commands};
use gleaner::config::Config;
use gleaner::orchestrator::SearchOptions;
use gleaner::scraper::InspectOptions;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "gleaner=debug"
    } else {
        "gleaner=info"
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match &cli.command {
        Commands::Search { headed: true, .. } | Commands::Inspect { headed: true, .. } => {
            config.session.headless = false;
        }
        Commands::FetchText {
            workers: Some(workers),
            ..
        } => {
            config.fetcher.workers = *workers;
        }
        _ => {}
    }

    let ctx = AppContext::new(config)?;

    match cli.command {
        Commands::Sites => {
            commands::list_sites(&ctx)?;
        }
        Commands::Search {
            site,
            keyword,
            max_pages,
            overwrite,
            ..
        } => {
            let options = SearchOptions {
                max_pages,
                overwrite,
            };
            commands::search(&ctx, &site, &keyword, options).await?;
        }
        Commands::Inspect {
            site,
            keyword,
            sample,
            shuffle,
            seed,
            screenshots,
            revisit,
            ..
        } => {
            let options = InspectOptions {
                sample_size: sample,
                shuffle,
                capture_artifacts: screenshots,
                revisit,
                seed,
            };
            commands::inspect(&ctx, &site, &keyword, options).await?;
        }
        Commands::FetchText {
            site,
            keyword,
            refresh,
            ..
        } => {
            commands::fetch_text(&ctx, &site, &keyword, refresh).await?;
        }
        Commands::Score {
            site,
            keyword,
            command,
        } => {
            commands::score(&ctx, &site, &keyword, &command).await?;
        }
        Commands::Show {
            site,
            keyword,
            pages,
        } => {
            commands::show(&ctx, &site, &keyword, pages)?;
        }
    }

    Ok(())
}
