//! Command line interface for scribe.

mod engine;
mod progress_bar;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use scribe_config::Config;
use scribe_index::{
    CorpusKind, CorpusStatus, ProgressSink, SearchFilter, SearchMode, SearchResult, SyncReport,
    TracingSink,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use engine::Engine;
use progress_bar::BarSink;

#[derive(Parser, Debug)]
#[command(name = "scribe", version, about = "Incremental indexing and search for docs and code")]
struct Cli {
    /// Extra config file, layered over ~/.config/scribe/config.toml and ./scribe.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bring the indexes in line with the files on disk
    Sync(SyncArgs),
    /// Query an index
    Search(SearchArgs),
    /// Show what the manifest knows about each corpus
    Status(StatusArgs),
}

#[derive(Args, Debug)]
struct SyncArgs {
    /// Only the documentation corpus
    #[arg(long, conflicts_with = "code")]
    docs: bool,

    /// Only the code corpus
    #[arg(long)]
    code: bool,

    /// Drop the collection and re-embed everything
    #[arg(long)]
    force: bool,

    /// No progress bar
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Args, Debug)]
struct SearchArgs {
    query: String,

    #[arg(long, value_enum, default_value_t = CorpusArg::Docs)]
    corpus: CorpusArg,

    #[arg(long, value_enum, default_value_t = ModeArg::Semantic)]
    mode: ModeArg,

    /// Defaults to [search].default_limit
    #[arg(short, long)]
    limit: Option<usize>,

    /// Only chunks in this language (code corpus)
    #[arg(long)]
    language: Option<String>,

    /// Only paths starting with this prefix
    #[arg(long)]
    path_prefix: Option<String>,

    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct StatusArgs {
    #[arg(long)]
    json: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum CorpusArg {
    Docs,
    Code,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ModeArg {
    Semantic,
    Exact,
    Hybrid,
}

impl From<ModeArg> for SearchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Semantic => SearchMode::Semantic,
            ModeArg::Exact => SearchMode::Exact,
            ModeArg::Hybrid => SearchMode::Hybrid,
        }
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load(cli.config.as_deref())?;
    debug!("Loaded configuration");

    match cli.command {
        Command::Sync(args) => sync(config, args).await,
        Command::Search(args) => search(config, args).await,
        Command::Status(args) => status(&config, args),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "scribe=debug" } else { "scribe=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .init();
}

/// Cancel `token` on SIGINT or SIGTERM.
fn cancel_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        warn!("Interrupted, finishing the current file");
        token.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            debug!("SIGTERM handler unavailable: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn progress_sink(quiet: bool) -> Arc<dyn ProgressSink> {
    if quiet {
        Arc::new(BarSink::hidden())
    } else if std::io::stderr().is_terminal() {
        Arc::new(BarSink::new())
    } else {
        Arc::new(TracingSink)
    }
}

async fn sync(config: Config, args: SyncArgs) -> Result<()> {
    engine::ensure_state_dir(&config)?;
    let engine = Engine::new(config)?;
    let cancel = CancellationToken::new();
    cancel_on_signal(cancel.clone());

    let mut reports: Vec<SyncReport> = Vec::new();

    if !args.code {
        let mut docs = engine.docs(progress_sink(args.quiet))?;
        if args.force {
            docs.reset().await?;
        }
        reports.push(docs.sync(&cancel).await?);
    }

    if !args.docs && !cancel.is_cancelled() {
        let mut code = engine.code(progress_sink(args.quiet))?;
        if args.force {
            code.reset().await?;
        }
        reports.push(code.sync(&cancel).await?);
    }

    for report in &reports {
        println!("{}", report.summary());
    }

    let failed: usize = reports.iter().map(|r| r.failed).sum();
    if failed > 0 {
        warn!("{} file(s) failed and will be retried on the next sync", failed);
    }
    if cancel.is_cancelled() {
        anyhow::bail!("sync interrupted; progress so far was saved");
    }
    Ok(())
}

async fn search(config: Config, args: SearchArgs) -> Result<()> {
    let limit = args.limit.unwrap_or(config.search.default_limit);
    let mode = SearchMode::from(args.mode);

    let mut filter = SearchFilter::new();
    if let Some(prefix) = args.path_prefix {
        filter = filter.with_path_prefix(prefix);
    }
    if let Some(language) = args.language {
        filter = filter.with_language(language);
    }
    let filter = (!filter.is_empty()).then_some(filter);

    let engine = match mode {
        SearchMode::Exact => Engine::for_exact_search(config)?,
        _ => Engine::new(config)?,
    };
    let sink = progress_sink(true);
    let results = match args.corpus {
        CorpusArg::Docs => {
            engine
                .docs(sink)?
                .search(mode, &args.query, limit, filter.as_ref())
                .await?
        }
        CorpusArg::Code => {
            engine
                .code(sink)?
                .search(mode, &args.query, limit, filter.as_ref())
                .await?
        }
    };

    info!(mode = mode.as_str(), results = results.len(), "Search complete");
    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_results(&results);
    }
    Ok(())
}

fn print_results(results: &[SearchResult]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }
    for (i, result) in results.iter().enumerate() {
        let lines = match (result.start_line, result.end_line) {
            (Some(start), Some(end)) if start != end => format!(":{start}-{end}"),
            (Some(start), _) => format!(":{start}"),
            _ => String::new(),
        };
        println!(
            "{}. {}{}  [{}]  score {:.3}",
            i + 1,
            result.path,
            lines,
            result.section,
            result.score
        );
        for line in result.content.lines().take(3) {
            println!("     {line}");
        }
    }
}

#[derive(Serialize)]
struct StatusReport {
    manifest: PathBuf,
    corpora: Vec<CorpusStatus>,
}

fn status(config: &Config, args: StatusArgs) -> Result<()> {
    let store = engine::manifest_store(config);
    let corpora = [
        (CorpusKind::Docs, &config.docs.collection),
        (CorpusKind::Code, &config.code.collection),
    ]
    .into_iter()
    .map(|(kind, collection)| {
        let manifest = store.load_corpus(kind);
        CorpusStatus {
            corpus: kind,
            collection: collection.clone(),
            files: manifest.len(),
            chunks: manifest.total_chunks(),
            last_embedded: manifest.entries().values().map(|e| e.embedded_at).max(),
        }
    })
    .collect();

    let report = StatusReport {
        manifest: store.path().to_path_buf(),
        corpora,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Manifest: {}", report.manifest.display());
    for corpus in &report.corpora {
        let last = corpus
            .last_embedded
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "  {:<5} {:>6} files {:>8} chunks  collection {}  last embedded {}",
            corpus.corpus.to_string(),
            corpus.files,
            corpus.chunks,
            corpus.collection,
            last
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sync_flags() {
        let cli = Cli::try_parse_from(["scribe", "sync", "--docs", "--force"]).unwrap();
        match cli.command {
            Command::Sync(args) => {
                assert!(args.docs && args.force && !args.code);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_docs_and_code_conflict() {
        assert!(Cli::try_parse_from(["scribe", "sync", "--docs", "--code"]).is_err());
    }

    #[test]
    fn test_parse_search() {
        let cli = Cli::try_parse_from([
            "scribe",
            "search",
            "auth flow",
            "--corpus",
            "code",
            "--mode",
            "hybrid",
            "--limit",
            "5",
            "--language",
            "rust",
        ])
        .unwrap();
        match cli.command {
            Command::Search(args) => {
                assert_eq!(args.query, "auth flow");
                assert_eq!(args.corpus, CorpusArg::Code);
                assert_eq!(SearchMode::from(args.mode), SearchMode::Hybrid);
                assert_eq!(args.limit, Some(5));
                assert_eq!(args.language.as_deref(), Some("rust"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["scribe", "status", "--config", "alt.toml", "-v"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("alt.toml")));
        assert!(cli.verbose);
    }
}
