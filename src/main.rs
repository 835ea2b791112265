mod cli;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands, LayoutArgs, PaginateArgs, RangeArgs, ReadArgs, ValidateArgs};
use scripture_pager::services::source::is_url;
use scripture_pager::{
    open_backend, Backend, ChapterDirectory, FilePositionStore, InMemoryCorpus, Navigation, Page,
    PageBuilder, PagerConfig, PagerError, PaginationController, ReaderSession, Result, VerseCache,
    WeightMetric,
};
use std::sync::Arc;
use tracing::{error, info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let result = match &cli.command {
        Commands::Paginate(args) => handle_paginate_command(args).await,
        Commands::Read(args) => handle_read_command(args).await,
        Commands::Range(args) => handle_range_command(args).await,
        Commands::Validate(args) => handle_validate_command(args).await,
    };

    if let Err(e) = result {
        error!("Operation failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn pager_config(layout: &LayoutArgs, prefetch: bool) -> PagerConfig {
    PagerConfig {
        base_capacity: layout.capacity,
        weight_metric: layout.metric,
        prefetch,
        ..PagerConfig::default()
    }
}

async fn build_controller(backend: &Backend, config: PagerConfig) -> Result<PaginationController> {
    let cache = Arc::new(VerseCache::new(backend.verses.clone()));
    PaginationController::new(cache, backend.directory.as_ref(), config).await
}

fn print_page(page: &Page, metric: WeightMetric) {
    let (first, last) = match (page.verses.first(), page.verses.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return,
    };

    let header = page
        .chapter_header
        .as_ref()
        .map(|h| format!(" [{}]", h.name))
        .unwrap_or_default();
    println!(
        "  Page {}: {}:{}-{}:{} ({} verses, weight {}){}",
        page.number,
        first.chapter,
        first.number,
        last.chapter,
        last.number,
        page.verses.len(),
        page.weight(metric),
        header
    );
}

async fn handle_paginate_command(args: &PaginateArgs) -> Result<()> {
    info!("Paginating chapter {} of {}", args.chapter, args.source);

    let backend = open_backend(&args.source).await?;
    let config = pager_config(&args.layout, false);
    let capacity = config.capacity_for_scale(args.scale);
    let controller = build_controller(&backend, config).await?;

    controller.set_capacity(capacity).await?;
    controller.jump_to_chapter(args.chapter).await?;

    let pages = controller.pages().unwrap_or_default();
    let name = controller
        .chapter(args.chapter)
        .map(|c| c.name_primary.clone())
        .unwrap_or_default();

    println!(
        "\n=== Chapter {} {} at capacity {} ===",
        args.chapter, name, capacity
    );
    println!("Total pages: {}", pages.len());
    for page in pages.iter() {
        print_page(page, args.layout.metric);
    }

    if let Some(json_path) = &args.json_output {
        let json_content = serde_json::to_string_pretty(pages.as_slice())?;
        tokio::fs::write(json_path, json_content).await?;
        info!("Pages written to: {}", json_path.display());
    }

    Ok(())
}

async fn handle_read_command(args: &ReadArgs) -> Result<()> {
    let backend = open_backend(&args.source).await?;
    let config = pager_config(&args.layout, !args.no_prefetch);
    let controller = build_controller(&backend, config).await?;
    let store = Arc::new(FilePositionStore::new(&args.state));

    let session = ReaderSession::open(Arc::new(controller), store)
        .await
        .context("Failed to restore reading session")?;

    if let Some(theme) = args.theme {
        session.set_theme(theme).await;
    }

    if let Some(scale) = args.scale {
        session.set_font_scale(scale).await?;
    }

    let navigation = if args.next {
        Some(session.next_page().await?)
    } else if args.previous {
        Some(session.previous_page().await?)
    } else if let Some(page) = args.page {
        Some(session.go_to_page(page).await?)
    } else if let Some(index) = args.global_page {
        Some(session.go_to_global_page(index).await?)
    } else if let Some(chapter) = args.chapter {
        Some(session.jump_to_chapter(chapter).await?)
    } else if let Some(verse) = args.verse {
        Some(session.jump_to_verse(verse).await?)
    } else {
        None
    };

    if navigation == Some(Navigation::Unchanged) {
        info!("Already at the edge of the corpus");
    }

    let controller = session.controller();
    let (position, page) = match (session.position(), controller.current_page()) {
        (Some(position), Some(page)) => (position, page),
        _ => {
            return Err(PagerError::invalid_target("no page is open"));
        }
    };

    let overall = controller
        .page_index()
        .map(|index| format!(", page {} overall", index))
        .unwrap_or_default();
    println!(
        "\n=== Chapter {} page {}/{}{} (scale {:.2}, {:?} theme) ===",
        position.chapter,
        position.page,
        controller.total_pages().unwrap_or(0),
        overall,
        session.font_scale(),
        session.theme()
    );
    if let Some(header) = &page.chapter_header {
        println!("# {}", header.name);
    }
    for verse in &page.verses {
        println!("{:>4}  {}", verse.number, verse.text_primary);
        if let Some(secondary) = &verse.text_secondary {
            println!("      {}", secondary);
        }
    }

    Ok(())
}

async fn handle_range_command(args: &RangeArgs) -> Result<()> {
    info!("Paginating verses {}..={}", args.start, args.end);

    let backend = open_backend(&args.source).await?;
    let chapters = backend
        .directory
        .list_chapters()
        .await
        .map_err(|e| PagerError::fetch("chapter directory", e))?;
    let cache = VerseCache::new(backend.verses.clone());

    let verses = cache.fetch_range(args.start, args.end).await?;
    let pages = PageBuilder::new(args.layout.capacity, args.layout.metric)
        .with_directory(&chapters)
        .build_range(&verses, args.start, args.end)?;

    println!(
        "\n=== Verses {}..={} at capacity {} ===",
        args.start, args.end, args.layout.capacity
    );
    println!("Total pages: {}", pages.len());
    for page in &pages {
        print_page(page, args.layout.metric);
    }

    Ok(())
}

async fn handle_validate_command(args: &ValidateArgs) -> Result<()> {
    info!("Validating {} sources", args.sources.len());

    let mut valid_sources = Vec::new();
    let mut invalid_sources = Vec::new();

    for source in &args.sources {
        let outcome = if is_url(source) {
            match open_backend(source).await {
                Ok(backend) => backend.directory.list_chapters().await.map(|c| c.len()),
                Err(e) => Err(e),
            }
        } else {
            match InMemoryCorpus::load(source).await {
                Ok(corpus) => corpus.validate().map(|_| corpus.chapters.len()),
                Err(e) => Err(e),
            }
        };

        match outcome {
            Ok(chapters) => {
                info!("✓ Valid: {} ({} chapters)", source, chapters);
                valid_sources.push(source);
            }
            Err(e) => {
                error!("✗ Invalid: {} - {}", source, e);
                invalid_sources.push((source, e.to_string()));
            }
        }
    }

    println!("\n=== Validation Summary ===");
    println!("Valid sources: {}/{}", valid_sources.len(), args.sources.len());

    if !invalid_sources.is_empty() {
        println!("Invalid sources:");
        let invalid_count = invalid_sources.len();
        for (source, error) in invalid_sources {
            println!("  - {}: {}", source, error);
        }
        return Err(PagerError::corrupt(format!(
            "{} sources failed validation",
            invalid_count
        )));
    }

    println!("All sources are valid!");
    Ok(())
}
