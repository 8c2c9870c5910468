//! Deepcite CLI - command-line interface for the research pipeline
//!
//! Runs research sessions, batches of queries, and manages run history and
//! configuration.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use deepcite_core::{
    init_logging, log_operation_error, log_operation_start, log_operation_success,
    process_concurrently, DeepciteConfig, LogFormat, LoggingConfig, ResearchDepth,
};
use deepcite_providers::{SiumaiCompletion, TavilySearch};
use deepcite_research::{
    AuditLog, FileResearchHistoryStorage, PipelineFailure, PipelineRun, ResearchEngine,
    ResearchHistoryFilters, ResearchHistoryRecord, ResearchHistoryStorage, ResearchRequest,
    ResearchStatus,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "deepcite")]
#[command(about = "Iterative web research that produces cited, fact-checked reports")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Research a question and print the final report
    Research {
        /// Research question
        query: String,

        /// Research iterations (defaults to research.default_iterations)
        #[arg(short, long)]
        iterations: Option<usize>,

        /// Research depth: overview, detailed or deep-dive
        #[arg(short, long)]
        depth: Option<ResearchDepth>,

        /// Write the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the audit log after the run
        #[arg(long)]
        show_log: bool,
    },

    /// Research every query in a file, one per line
    Batch {
        /// File with one query per line; blank lines and lines starting with # are skipped
        file: PathBuf,

        /// Sessions running at the same time
        #[arg(long, default_value = "2")]
        concurrency: usize,

        /// Research iterations per query
        #[arg(short, long)]
        iterations: Option<usize>,

        /// Research depth: overview, detailed or deep-dive
        #[arg(short, long)]
        depth: Option<ResearchDepth>,

        /// Directory receiving one report per completed session
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Browse past research sessions
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Manage configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Initialize default configuration
        #[arg(long)]
        init: bool,

        /// Validate current configuration
        #[arg(long)]
        validate: bool,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List sessions, newest first
    List {
        #[arg(short, long, default_value = "1")]
        page: usize,
    },
    /// Show one session with its audit log and report
    Show { session_id: String },
    /// Delete a session
    Delete { session_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut logging_config = LoggingConfig::default();
    if cli.verbose {
        logging_config.level = "debug".to_string();
        logging_config.filter_directives.clear();
        logging_config.enable_performance_monitoring = true;
    }
    if cli.json_logs {
        logging_config.format = LogFormat::Json;
    }
    init_logging(&logging_config).map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    info!("Starting deepcite CLI v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Research {
            query,
            iterations,
            depth,
            output,
            show_log,
        } => {
            let config = load_config(cli.config.as_ref())?;
            handle_research(query, iterations, depth, output, show_log, &config).await?;
        }
        Commands::Batch {
            file,
            concurrency,
            iterations,
            depth,
            output_dir,
        } => {
            let config = load_config(cli.config.as_ref())?;
            handle_batch(file, concurrency, iterations, depth, output_dir, &config).await?;
        }
        Commands::History { action } => {
            let config = load_config(cli.config.as_ref())?;
            handle_history(action, &config).await?;
        }
        Commands::Config {
            show,
            init,
            validate,
        } => {
            handle_config(show, init, validate, cli.config.as_ref())?;
        }
    }

    Ok(())
}

fn load_config(config_path: Option<&PathBuf>) -> Result<DeepciteConfig> {
    let mut config = if let Some(path) = config_path {
        info!("Loading configuration from {:?}", path);
        DeepciteConfig::from_file(path)?
    } else {
        let default_paths = [
            Some(default_config_path()?),
            dirs::home_dir().map(|d| d.join(".deepcite").join("config.toml")),
            Some(PathBuf::from("deepcite.toml")),
        ];

        match default_paths.iter().flatten().find(|path| path.exists()) {
            Some(path) => {
                info!("Loading configuration from {:?}", path);
                DeepciteConfig::from_file(path)?
            }
            None => {
                info!("No configuration file found, using defaults");
                DeepciteConfig::default()
            }
        }
    };

    config.apply_env_overrides();
    Ok(config)
}

/// Default configuration file path
fn default_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|d| d.join(".config")))
        .ok_or_else(|| anyhow!("Could not determine a configuration directory"))?;
    Ok(config_dir.join("deepcite").join("config.toml"))
}

/// Expand a leading `~` to the home directory
fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

fn history_storage(config: &DeepciteConfig) -> Result<FileResearchHistoryStorage> {
    let dir = expand_home(&config.storage.history_dir);
    FileResearchHistoryStorage::new(&dir)
        .with_context(|| format!("Failed to open history directory {}", dir.display()))
}

async fn build_engine(config: &DeepciteConfig) -> Result<ResearchEngine> {
    config.validate()?;

    if config.search.provider != "tavily" {
        bail!(
            "Unsupported search provider: {} (only tavily is available)",
            config.search.provider
        );
    }

    let completion = SiumaiCompletion::new(config.llm.clone(), config.retry.clone())
        .await
        .context("Failed to create completion client")?;
    let search = TavilySearch::from_config(&config.search, config.retry.clone())
        .context("Failed to create search client")?;

    Ok(ResearchEngine::new(config, Arc::new(completion), Arc::new(search)))
}

/// Cancel `token` on the first Ctrl-C
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n⏹️ Cancelling research, partial results will be saved...");
            token.cancel();
        }
    });
}

fn build_request(
    query: String,
    iterations: Option<usize>,
    depth: Option<ResearchDepth>,
) -> ResearchRequest {
    let mut request = ResearchRequest::new(query);
    request.iterations = iterations;
    request.depth = depth;
    request
}

fn record_for(outcome: &Result<PipelineRun, PipelineFailure>) -> ResearchHistoryRecord {
    match outcome {
        Ok(run) => ResearchHistoryRecord::from_run(run, ResearchStatus::Completed),
        Err(failure) => ResearchHistoryRecord::from_failure(failure),
    }
}

fn print_audit(audit: &AuditLog) {
    println!("\n📋 Audit log:");
    for entry in audit {
        println!(
            "[{}] {}",
            entry.timestamp.format("%H:%M:%S"),
            entry.render()
        );
    }
}

async fn handle_research(
    query: String,
    iterations: Option<usize>,
    depth: Option<ResearchDepth>,
    output: Option<PathBuf>,
    show_log: bool,
    config: &DeepciteConfig,
) -> Result<()> {
    log_operation_start!("research", query = %query);

    let engine = build_engine(config).await?;
    let storage = history_storage(config)?;

    let token = CancellationToken::new();
    cancel_on_ctrl_c(token.clone());

    let outcome = engine
        .run_with_cancellation(build_request(query, iterations, depth), token)
        .await;

    let record = record_for(&outcome);
    if let Err(e) = storage.save_record(&record).await {
        warn!("Failed to save research history: {}", e);
    }

    match outcome {
        Ok(run) => {
            if show_log {
                print_audit(&run.audit);
            }

            let report = run.state.professional_report.as_deref().unwrap_or_default();
            match output {
                Some(path) => {
                    tokio::fs::write(&path, report)
                        .await
                        .with_context(|| format!("Failed to write report to {}", path.display()))?;
                    println!("✅ Report written to {}", path.display());
                }
                None => println!("{}", report),
            }

            println!(
                "\n📚 {} sources over {} iterations (session {})",
                run.state.research_data.len(),
                run.state.current_iteration,
                run.session_id
            );
            log_operation_success!("research", session_id = %run.session_id);
            Ok(())
        }
        Err(failure) => {
            if show_log {
                print_audit(&failure.run.audit);
            }
            log_operation_error!("research", failure.error, session_id = %failure.run.session_id);

            if failure.is_cancelled() {
                println!(
                    "⏹️ Research cancelled after the {} stage; partial state saved as {}",
                    failure.run.stage, failure.run.session_id
                );
                return Ok(());
            }

            let session_id = failure.run.session_id.clone();
            Err(anyhow::Error::new(failure.error)
                .context(format!("Research session {} did not complete", session_id)))
        }
    }
}

async fn handle_batch(
    file: PathBuf,
    concurrency: usize,
    iterations: Option<usize>,
    depth: Option<ResearchDepth>,
    output_dir: Option<PathBuf>,
    config: &DeepciteConfig,
) -> Result<()> {
    let content = tokio::fs::read_to_string(&file)
        .await
        .with_context(|| format!("Failed to read query file {}", file.display()))?;
    let queries: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect();

    if queries.is_empty() {
        bail!("No queries found in {}", file.display());
    }

    log_operation_start!("batch", queries = queries.len(), concurrency = concurrency);

    if let Some(dir) = &output_dir {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    }

    let engine = Arc::new(build_engine(config).await?);
    let storage = history_storage(config)?;
    let token = CancellationToken::new();
    cancel_on_ctrl_c(token.clone());

    let results = process_concurrently(queries.clone(), concurrency, move |query| {
        let engine = Arc::clone(&engine);
        let storage = storage.clone();
        let token = token.child_token();
        let output_dir = output_dir.clone();

        async move {
            let outcome = engine
                .run_with_cancellation(build_request(query, iterations, depth), token)
                .await;

            let record = record_for(&outcome);
            if let Err(e) = storage.save_record(&record).await {
                warn!("Failed to save research history: {}", e);
            }

            if let (Ok(run), Some(dir)) = (&outcome, &output_dir) {
                let path = dir.join(format!("{}.md", run.session_id));
                let report = run.state.professional_report.as_deref().unwrap_or_default();
                if let Err(e) = tokio::fs::write(&path, report).await {
                    warn!("Failed to write report {}: {}", path.display(), e);
                }
            }

            Ok(record)
        }
    })
    .await;

    let mut completed = 0;
    println!("\n📋 Batch results:");
    for (query, result) in queries.iter().zip(results) {
        match result {
            Ok(record) => {
                let icon = match record.status {
                    ResearchStatus::Completed => {
                        completed += 1;
                        "✅"
                    }
                    ResearchStatus::Cancelled => "⏹️",
                    ResearchStatus::Failed(_) => "❌",
                };
                println!(
                    "{} {} [{}] {} ({} sources)",
                    icon, record.session_id, record.status, query, record.metadata.total_sources
                );
            }
            Err(e) => println!("❌ {}: {}", query, e),
        }
    }

    println!("\n{}/{} sessions completed", completed, queries.len());
    log_operation_success!("batch", completed = completed);
    Ok(())
}

async fn handle_history(action: HistoryAction, config: &DeepciteConfig) -> Result<()> {
    let storage = history_storage(config)?;

    match action {
        HistoryAction::List { page } => {
            let filters = ResearchHistoryFilters::page(page.max(1), config.ui.page_size);
            let records = storage.list_records(&filters).await?;

            if records.is_empty() {
                println!("No research sessions found on page {}", page.max(1));
                return Ok(());
            }

            println!("📚 Research sessions (page {}):", page.max(1));
            for record in records {
                println!(
                    "{}  {}  {:<9}  {:>3} sources  {}",
                    record.session_id,
                    record.created_at.format("%Y-%m-%d %H:%M"),
                    record.status.to_string(),
                    record.metadata.total_sources,
                    record.original_query
                );
            }
        }
        HistoryAction::Show { session_id } => {
            let record = storage
                .load_record(&session_id)
                .await?
                .ok_or_else(|| anyhow!("Research session not found: {}", session_id))?;

            println!("🔎 Session {}", record.session_id);
            println!("Query: {}", record.original_query);
            if record.final_query != record.original_query {
                println!("Final query: {}", record.final_query);
            }
            match &record.status {
                ResearchStatus::Failed(message) => println!("Status: failed ({})", message),
                status => println!("Status: {}", status),
            }
            println!(
                "Depth: {}, iterations: {}, sources: {}",
                record.metadata.depth,
                record.metadata.total_iterations,
                record.metadata.total_sources
            );

            print_audit(&record.audit);

            if let Some(report) = record
                .state
                .professional_report
                .as_deref()
                .or(record.state.answer.as_deref())
            {
                println!("\n{}", report);
            }
        }
        HistoryAction::Delete { session_id } => {
            if storage.delete_record(&session_id).await? {
                println!("🗑️ Deleted research session {}", session_id);
            } else {
                bail!("Research session not found: {}", session_id);
            }
        }
    }

    Ok(())
}

fn handle_config(
    show: bool,
    init: bool,
    validate: bool,
    config_path: Option<&PathBuf>,
) -> Result<()> {
    if init {
        let path = match config_path {
            Some(path) => path.clone(),
            None => default_config_path()?,
        };
        init_config(&path)?;
    }

    if show {
        let mut config = load_config(config_path)?;
        // Never echo secrets
        for key in [&mut config.llm.api_key, &mut config.search.api_key] {
            if key.is_some() {
                *key = Some("********".to_string());
            }
        }
        println!("📋 Current configuration:");
        println!("{}", toml::to_string_pretty(&config)?);
    }

    if validate {
        let config = load_config(config_path)?;
        match config.validate() {
            Ok(()) => println!("✅ Configuration is valid"),
            Err(e) => {
                println!("❌ Configuration validation failed: {}", e);
                return Err(e.into());
            }
        }
        if config.llm.api_key.is_none() && config.llm.provider != "ollama" {
            println!("⚠️ No API key configured for provider {}", config.llm.provider);
        }
        if config.search.api_key.is_none() {
            println!("⚠️ No Tavily API key configured (set TAVILY_API_KEY)");
        }
    }

    if !(show || init || validate) {
        println!("Nothing to do. Use --init, --show or --validate.");
    }

    Ok(())
}

fn init_config(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("Configuration already exists at {}", path.display());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    DeepciteConfig::default().save_to_file(path)?;
    println!("✅ Configuration initialized at: {}", path.display());
    println!("📝 Add your API keys to the file or set them in the environment.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_research_options() {
        let cli = Cli::try_parse_from([
            "deepcite",
            "research",
            "history of RSA encryption",
            "--iterations",
            "3",
            "--depth",
            "deep-dive",
            "--show-log",
        ])
        .unwrap();

        match cli.command {
            Commands::Research {
                query,
                iterations,
                depth,
                output,
                show_log,
            } => {
                assert_eq!(query, "history of RSA encryption");
                assert_eq!(iterations, Some(3));
                assert_eq!(depth, Some(ResearchDepth::DeepDive));
                assert!(output.is_none());
                assert!(show_log);
            }
            _ => panic!("Expected research command"),
        }
    }

    #[test]
    fn cli_rejects_unknown_depth() {
        assert!(Cli::try_parse_from(["deepcite", "research", "q", "--depth", "shallow"]).is_err());
    }

    #[test]
    fn history_page_defaults_to_one() {
        let cli = Cli::try_parse_from(["deepcite", "history", "list"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::History {
                action: HistoryAction::List { page: 1 }
            }
        ));
    }

    #[test]
    fn expands_home_prefix() {
        let expanded = expand_home("~/.deepcite/history");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join(".deepcite/history"));
        }
        assert_eq!(expand_home("/tmp/history"), PathBuf::from("/tmp/history"));
    }

    #[test]
    fn requests_carry_overrides() {
        let request = build_request("q".to_string(), Some(2), Some(ResearchDepth::Overview));
        assert_eq!(request.iterations, Some(2));
        assert_eq!(request.depth, Some(ResearchDepth::Overview));

        let request = build_request("q".to_string(), None, None);
        assert!(request.iterations.is_none());
    }
}
