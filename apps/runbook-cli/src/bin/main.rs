use std::env;
use std::fs;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use runbook_core::config::{resolve_with_base, Config};
use runbook_core::source::DirectorySource;
use runbook_core::types::{SearchFilters, SearchRequest};
use runbook_hybrid::{evaluate, parse_cases, Engine};

const USAGE: &str = "Usage: runbook-search <query> [docs_dir] [--top-k N] [--source-type docs|issues] [--project NAME] [--no-scores] [--health]\n       runbook-search --eval <dataset.json> [docs_dir] [--top-k N]";

struct Args {
    query: String,
    docs_dir: Option<String>,
    top_k: Option<usize>,
    source_types: Vec<String>,
    projects: Vec<String>,
    include_scores: bool,
    health: bool,
    eval: Option<String>,
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut parsed = Args {
        query: String::new(),
        docs_dir: None,
        top_k: None,
        source_types: Vec::new(),
        projects: Vec::new(),
        include_scores: true,
        health: false,
        eval: None,
    };
    let mut positional = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--top-k" | "-k" => {
                let value = args.get(i + 1).ok_or_else(|| anyhow::anyhow!("--top-k requires a number"))?;
                parsed.top_k = Some(value.parse().map_err(|_| anyhow::anyhow!("--top-k requires a number"))?);
                i += 1;
            }
            "--source-type" => {
                let value = args.get(i + 1).ok_or_else(|| anyhow::anyhow!("--source-type requires a value"))?;
                parsed.source_types.push(value.clone());
                i += 1;
            }
            "--project" => {
                let value = args.get(i + 1).ok_or_else(|| anyhow::anyhow!("--project requires a value"))?;
                parsed.projects.push(value.clone());
                i += 1;
            }
            "--eval" => {
                let value = args.get(i + 1).ok_or_else(|| anyhow::anyhow!("--eval requires a dataset path"))?;
                parsed.eval = Some(value.clone());
                i += 1;
            }
            "--no-scores" => parsed.include_scores = false,
            "--health" => parsed.health = true,
            "--help" | "-h" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other if other.starts_with('-') => anyhow::bail!("unknown flag {other}\n{USAGE}"),
            other => positional.push(other.to_string()),
        }
        i += 1;
    }
    let mut positional = positional.into_iter();
    if parsed.eval.is_none() {
        parsed.query = positional.next().ok_or_else(|| anyhow::anyhow!("{USAGE}"))?;
    }
    parsed.docs_dir = positional.next();
    Ok(parsed)
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{spinner} {msg} [{elapsed}]").unwrap_or_else(|_| ProgressStyle::default_spinner()));
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args()?;
    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {e}");
        e
    })?;
    let settings = config.settings()?;

    let cwd = env::current_dir()?;
    let docs_dir = resolve_with_base(&cwd, args.docs_dir.as_deref().unwrap_or(&settings.data.docs_dir));
    let mut source = DirectorySource::new(&docs_dir, settings.data.project.clone(), settings.data.source_type)
        .with_excludes(&settings.data.exclude_patterns)?;
    if let Some(base) = &settings.data.base_url {
        source = source.with_base_url(base.clone());
    }

    let engine = Engine::new(settings)?;
    let pb = spinner(&format!("Indexing {}", docs_dir.display()));
    let report = engine.ingest_source(&source, false).await;
    pb.finish_and_clear();
    let report = report?;
    eprintln!(
        "Indexed {} documents ({} chunks) from {}",
        report.stats.processed,
        report.stats.chunks_written,
        docs_dir.display()
    );

    if let Some(path) = &args.eval {
        let cases = parse_cases(&fs::read_to_string(path)?)?;
        let report = evaluate(&engine, &cases, args.top_k.unwrap_or(10)).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        engine.shutdown();
        return Ok(());
    }

    let mut filters = SearchFilters::default();
    if !args.source_types.is_empty() {
        filters = filters.source_types(args.source_types);
    }
    if !args.projects.is_empty() {
        filters = filters.projects(args.projects);
    }
    let mut request = SearchRequest::new(args.query).with_filters(filters).include_scores(args.include_scores);
    if let Some(top_k) = args.top_k {
        request = request.with_top_k(top_k);
    }

    let response = engine.search(request).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    if args.health {
        println!("{}", serde_json::to_string_pretty(&engine.health())?);
    }
    engine.shutdown();
    Ok(())
}
