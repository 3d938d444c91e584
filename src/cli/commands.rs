use serde_json::Value;

use crate::app::{AppContext, Result};
use crate::domain::Fields;
use crate::orchestrator::SearchOptions;
use crate::scoring::CommandScorer;
use crate::scraper::{InspectOptions, RunSummary, SkipReason};
use crate::store::CacheKind;

pub fn list_sites(ctx: &AppContext) -> Result<()> {
    let registry = ctx.orchestrator.registry();

    if registry.is_empty() {
        println!("No sites configured");
        return Ok(());
    }

    for adapter in registry.iter() {
        println!("{}\n  {}", adapter.name(), adapter.base_url());
    }

    Ok(())
}

pub async fn search(
    ctx: &AppContext,
    site: &str,
    keyword: &str,
    options: SearchOptions,
) -> Result<()> {
    let mut stream = ctx.orchestrator.search(site, keyword, options)?;

    while let Some(batch) = stream.next().await {
        println!("  page {}: {} links", batch.page_index, batch.links.len());
    }

    let summary = stream.finish().await?;
    let reason = summary
        .stop_reason
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "stopped early".to_string());
    println!(
        "Search complete: {} pages read ({}), {} links cached",
        summary.emitted, reason, summary.cache_size
    );
    Ok(())
}

pub async fn inspect(
    ctx: &AppContext,
    site: &str,
    keyword: &str,
    options: InspectOptions,
) -> Result<()> {
    let mut stream = ctx.orchestrator.inspect_pages(site, keyword, options)?;

    while let Some(record) = stream.next().await {
        println!(
            "  + {} ({})",
            record.display_name(),
            record.category.as_deref().unwrap_or_default()
        );
    }

    let summary = stream.finish().await?;
    print_skips(&summary);
    println!(
        "Inspection complete: {} records, {} skipped, {} dead links removed, {} pages cached",
        summary.emitted,
        summary.skipped.len(),
        summary.evicted.len(),
        summary.cache_size
    );
    Ok(())
}

pub async fn fetch_text(ctx: &AppContext, site: &str, keyword: &str, refresh: bool) -> Result<()> {
    let summary = ctx
        .orchestrator
        .fetch_plaintext(site, keyword, refresh)
        .await?;

    print_skips(&summary);
    println!(
        "Fetch complete: {} pages fetched, {} errors",
        summary.emitted,
        summary.skipped.len()
    );
    Ok(())
}

pub async fn score(ctx: &AppContext, site: &str, keyword: &str, command: &str) -> Result<()> {
    let scorer = CommandScorer::parse(command)?;
    let table = ctx.orchestrator.score(site, keyword, &scorer).await?;

    for (url, columns) in &table {
        println!("{}\n  {}", url, format_fields(columns));
    }
    println!("{} records scored", table.len());
    Ok(())
}

pub fn show(ctx: &AppContext, site: &str, keyword: &str, pages: bool) -> Result<()> {
    let kind = if pages {
        CacheKind::Pages
    } else {
        CacheKind::Links
    };
    let cache = ctx.orchestrator.cache(kind, site, keyword)?;
    let path = ctx.orchestrator.store().cache_path(kind, cache.site(), keyword);

    if cache.is_empty() {
        println!("No {} cached for '{}' ({})", kind, keyword, path.display());
        return Ok(());
    }

    for (url, fields) in cache.records() {
        let label = ["name", "title"]
            .iter()
            .find_map(|key| fields.get(*key).and_then(Value::as_str))
            .unwrap_or("(untitled)");
        println!("{}\n  {}", label, url);
    }
    println!("{} {} in {}", cache.len(), kind, path.display());
    Ok(())
}

fn print_skips(summary: &RunSummary) {
    let mut resumed = 0;
    for item in &summary.skipped {
        if item.reason == SkipReason::AlreadyInspected {
            resumed += 1;
        } else {
            eprintln!("  ! {}: {}", item.url, item.reason);
        }
    }
    if resumed > 0 {
        println!("  {} links already inspected in an earlier run", resumed);
    }
}

fn format_fields(fields: &Fields) -> String {
    fields
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join(" ")
}
