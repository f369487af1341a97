use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::num::NonZeroUsize;
use std::path::Path;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use strand::checkpoint::{self, CheckpointManager};
use strand::config;
use strand::graph::{MemoryGraph, Neo4jConfig, Neo4jGraph};
use strand::models::Credentials;
use strand::parser::ExtractorConfig;
use strand::pipeline::{self, IngestOptions, IngestSummary};
use strand::server::ServerGuard;
use strand::store::MappingStore;
use strand::{account, explore};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "strand")]
#[command(about = "Load the Wikipedia link graph into a graph database")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream a compressed dump and ingest its article link graph
    Ingest(IngestArgs),
    /// Show one ingested article and its outbound links
    Show(ShowArgs),
}

#[derive(Args)]
struct IngestArgs {
    /// Path to the Wikipedia dump file (.xml.bz2)
    archive: String,

    /// SQLite database holding the article name mapping
    #[arg(long, env = "STRAND_DATABASE", default_value = config::DEFAULT_DATABASE_PATH)]
    database: String,

    /// Neo4j Bolt URI
    #[arg(long, default_value = config::DEFAULT_BOLT_URI)]
    bolt_uri: String,

    /// Graph store user, ignored when --account-command is given
    #[arg(long, env = "NEO4J_USER", default_value = config::DEFAULT_USER)]
    user: String,

    /// Graph store password, ignored when --account-command is given
    #[arg(long, env = "NEO4J_PASSWORD", default_value = "", hide_env_values = true)]
    password: String,

    /// Command that creates an account and prints "Account ID:" / "Account secret:" lines
    #[arg(long)]
    account_command: Option<String>,

    /// Command that runs the graph store server for the length of the ingest
    #[arg(long)]
    server_command: Option<String>,

    /// Links per resolve + commit chunk
    #[arg(long, default_value_t = config::LINK_CHUNK_SIZE)]
    chunk_size: NonZeroUsize,

    /// Maximum new articles created per graph store transaction
    #[arg(long, default_value_t = config::ARTICLE_BATCH_SIZE)]
    article_batch_size: NonZeroUsize,

    /// Compressed bytes decompressed per read
    #[arg(long, default_value_t = config::BYTE_STREAMER_BUFFER_SIZE)]
    buffer_size: usize,

    /// Title prefix of pages to skip (repeatable; replaces the default list)
    #[arg(long = "skip-prefix")]
    skip_prefixes: Vec<String>,

    /// Seconds before a graph store request is abandoned
    #[arg(long, default_value_t = config::REQUEST_TIMEOUT_SECS)]
    request_timeout_secs: u64,

    /// Resume from last checkpoint if available
    #[arg(long)]
    resume: bool,

    /// Dry run - parse and resolve against in-memory stores only
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct ShowArgs {
    /// Article name
    name: String,

    /// SQLite database holding the article name mapping
    #[arg(long, env = "STRAND_DATABASE", default_value = config::DEFAULT_DATABASE_PATH)]
    database: String,

    /// Neo4j Bolt URI
    #[arg(long, default_value = config::DEFAULT_BOLT_URI)]
    bolt_uri: String,

    /// Maximum outbound links to list
    #[arg(long, default_value_t = config::SHOW_EDGE_LIMIT)]
    limit: usize,

    /// Print as JSON
    #[arg(long)]
    json: bool,
}

fn split_command(command: Option<&str>) -> Vec<String> {
    command
        .map(|c| c.split_whitespace().map(String::from).collect())
        .unwrap_or_default()
}

fn neo4j_config(uri: &str, credentials: Credentials, request_timeout_secs: u64) -> Neo4jConfig {
    Neo4jConfig {
        uri: uri.to_string(),
        credentials,
        request_timeout: Duration::from_secs(request_timeout_secs),
        max_retries: config::CONNECT_MAX_RETRIES,
        retry_delay: Duration::from_secs(config::CONNECT_RETRY_DELAY_SECS),
    }
}

fn print_summary(summary: &IngestSummary, duration: Duration, dry_run: bool) {
    let stats = &summary.stats;
    println!();
    println!("=== Summary ===");
    if dry_run {
        println!("(dry run, nothing was persisted)");
    }
    println!("Total time:         {:.2}s", duration.as_secs_f64());
    println!();
    println!("Pages read:         {}", summary.pages_seen);
    println!("Pages skipped:      {}", summary.pages_skipped);
    println!("Chunks committed:   {}", stats.chunks());
    println!("Chunks replayed:    {}", summary.chunks_replayed);
    println!("Links extracted:    {}", stats.links_extracted());
    println!("Links created:      {}", stats.links_created());
    println!("Links skipped:      {}", stats.links_skipped());
    println!("Articles created:   {}", stats.articles_created());
    println!("Articles recovered: {}", stats.articles_recovered());
}

async fn run_ingest(args: IngestArgs) -> Result<()> {
    if !Path::new(&args.archive).is_file() {
        bail!("Archive not found: {}", args.archive);
    }

    let extractor = if args.skip_prefixes.is_empty() {
        ExtractorConfig::default()
    } else {
        ExtractorConfig::default().with_blacklist(args.skip_prefixes.clone())
    };

    let options = IngestOptions {
        input: args.archive.clone(),
        chunk_size: args.chunk_size,
        article_batch_size: args.article_batch_size,
        buffer_size: args.buffer_size,
        extractor,
        show_progress: true,
    };

    let start = Instant::now();

    if args.dry_run {
        info!("Dry run: using in-memory graph and mapping stores");
        let store = MappingStore::open_in_memory()?;
        store.apply_schema()?;
        let graph = MemoryGraph::new();
        let summary = pipeline::run_ingest(&graph, &store, &options, None, None).await?;
        print_summary(&summary, start.elapsed(), true);
        return Ok(());
    }

    let store = MappingStore::open(&args.database)?;
    info!(database = %args.database, "Applying schema");
    store.apply_schema()?;

    let credentials = match args.account_command.as_deref() {
        Some(command) => account::create_account(&split_command(Some(command))).await?,
        None => Credentials {
            id: args.user.clone(),
            secret: args.password.clone(),
        },
    };
    store.set_account_credentials(&credentials)?;
    let credentials = store
        .get_account_credentials()?
        .context("Account credentials missing after being stored")?;

    let chunk_size = args.chunk_size.get();
    let checkpoint = if args.resume {
        match checkpoint::load_if_valid(
            &args.archive,
            &args.database,
            chunk_size,
            store.article_count()?,
        )? {
            Some(cp) => {
                info!(
                    chunks = cp.chunks_committed,
                    links = cp.stats.links_created,
                    "Resuming from checkpoint"
                );
                Some(cp)
            }
            None => {
                info!("No valid checkpoint found, starting fresh");
                None
            }
        }
    } else {
        None
    };
    let checkpoint_mgr = CheckpointManager::new(
        &args.archive,
        &args.database,
        chunk_size,
        config::CHECKPOINT_INTERVAL,
    )?;

    let mut server = ServerGuard::start(&split_command(args.server_command.as_deref()))?;
    let neo4j = neo4j_config(&args.bolt_uri, credentials, args.request_timeout_secs);

    let result = async {
        let graph = Neo4jGraph::connect(&neo4j, &mut server).await?;
        pipeline::run_ingest(
            &graph,
            &store,
            &options,
            checkpoint.as_ref(),
            Some(&checkpoint_mgr),
        )
        .await
    }
    .await;

    if let Err(e) = server.stop().await {
        warn!(error = %e, "Failed to stop graph store server");
    }

    let summary = result?;
    print_summary(&summary, start.elapsed(), false);
    Ok(())
}

async fn run_show(args: ShowArgs) -> Result<()> {
    if !Path::new(&args.database).is_file() {
        bail!("Database not found: {}", args.database);
    }
    let store = MappingStore::open(&args.database)?;
    let credentials = store
        .get_account_credentials()?
        .context("No account credentials stored; run `strand ingest` first")?;

    let mut server = ServerGuard::unmanaged();
    let neo4j = neo4j_config(&args.bolt_uri, credentials, config::REQUEST_TIMEOUT_SECS);
    let graph = Neo4jGraph::connect(&neo4j, &mut server).await?;

    let view = explore::article_view(&graph, &store, &args.name, args.limit)
        .await?
        .with_context(|| format!("Article not found: {}", args.name))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print!("{}", explore::render_text(&view));
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let result = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("strand-worker")
        .enable_io()
        .enable_time()
        .build()
        .context("Failed to build async runtime")
        .and_then(|rt| {
            rt.block_on(async {
                let run = async {
                    match cli.command {
                        Commands::Ingest(args) => run_ingest(args).await,
                        Commands::Show(args) => run_show(args).await,
                    }
                };
                tokio::select! {
                    result = run => result,
                    _ = tokio::signal::ctrl_c() => Err(anyhow!("Interrupted")),
                }
            })
        });

    match result {
        Ok(()) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
