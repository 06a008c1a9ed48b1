//! vdb-docs CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vdb_docs::{
    commands::{
        cmd_crawl, cmd_fetch, cmd_index, cmd_init, cmd_inspect, cmd_qc, cmd_reset, cmd_search,
        http_page_source, print_crawl_report, print_document, print_index_report, print_init,
        print_inspect, print_qc_report, print_reset, print_search_results, CrawlOptions,
        InitOptions, QcOptions,
    },
    config::Config,
    embed::create_embedder,
    error::{Error, Result},
    mcp::McpServer,
    progress::{hide_progress, LogWriterFactory},
    search::{SearchFacade, SearchScope},
    store::open_store,
};

#[derive(Parser)]
#[command(name = "vdb-docs")]
#[command(version, about = "Vector database documentation crawler, indexer and MCP search server", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = "VDB_DOCS_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration with the built-in product catalog
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Delete all indexed records and recreate both collections
    Reset {
        /// Skip confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Deep-crawl product documentation and store the raw pages
    Crawl {
        /// Only crawl these products (repeatable)
        #[arg(short, long = "product")]
        products: Vec<String>,

        /// Ignore cached responses (entries are refreshed)
        #[arg(long)]
        refresh: bool,
    },

    /// Classify raw pages, re-crawl bad ones and write the cleaned corpus
    Qc {
        /// Only check these products (repeatable)
        #[arg(short, long = "product")]
        products: Vec<String>,

        /// Re-crawl rounds per bad page (default: recrawl.max_retries)
        #[arg(long)]
        max_retries: Option<u32>,
    },

    /// Chunk, embed and upsert the cleaned corpora
    Index {
        /// Only index these products (repeatable)
        #[arg(short, long = "product")]
        products: Vec<String>,
    },

    /// Show backend status and per-product counts
    Inspect,

    /// Hybrid search over the index
    Search {
        /// The search query
        query: String,

        /// Restrict to one product
        #[arg(short, long)]
        product: Option<String>,

        /// Maximum number of results
        #[arg(short, long, allow_negative_numbers = true)]
        limit: Option<i64>,

        /// Search whole documents instead of chunks
        #[arg(long)]
        documents: bool,
    },

    /// Print a stored page by URL, vdb-doc:// or <product>-doc:// URI
    Fetch {
        uri: String,
    },

    /// Start MCP server on stdio
    Serve,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn init_logging(cli: &Cli) {
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // stdout carries the protocol while serving
    let serving = matches!(cli.command, Commands::Serve);
    if serving || cli.json {
        hide_progress();
    }

    let registry = tracing_subscriber::registry().with(filter);
    match (cli.log_json, serving) {
        (true, true) => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        (true, false) => registry
            .with(fmt::layer().json().with_writer(LogWriterFactory))
            .init(),
        (false, true) => registry
            .with(fmt::layer().with_ansi(false).with_writer(std::io::stderr))
            .init(),
        (false, false) => registry
            .with(fmt::layer().with_writer(LogWriterFactory))
            .init(),
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    match cli.command {
        Commands::Init { force } => {
            let outcome = cmd_init(InitOptions {
                config_path: resolve_config_path(cli.config.as_deref()),
                force,
            })?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_init(&outcome);
            }
            return Ok(());
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "vdb-docs", &mut std::io::stdout());
            return Ok(());
        }
        _ => {}
    }

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Reset { yes } => {
            if !yes {
                eprintln!("⚠️  This will delete ALL indexed data!");
                eprintln!("Run with --yes to confirm.");
                std::process::exit(1);
            }
            let store = open_store(&config)?;
            let stats = cmd_reset(store.as_ref()).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_reset(&stats);
            }
        }

        Commands::Crawl { products, refresh } => {
            let source = http_page_source(&config)?;
            let options = CrawlOptions {
                products,
                bypass_cache: refresh,
            };
            let report = cmd_crawl(&config, source, options).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_crawl_report(&report);
            }
            report.ensure_complete()?;
        }

        Commands::Qc {
            products,
            max_retries,
        } => {
            let source = http_page_source(&config)?;
            let options = QcOptions {
                products,
                max_retries,
            };
            let report = cmd_qc(&config, source, options).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_qc_report(&report);
            }
            report.ensure_complete()?;
        }

        Commands::Index { products } => {
            let store = open_store(&config)?;
            let embedder = create_embedder(&config.embedding)?;
            let report = cmd_index(&config, store, embedder, &products).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_index_report(&report);
            }
            report.ensure_complete()?;
        }

        Commands::Inspect => {
            let store = open_store(&config)?;
            let report = cmd_inspect(&config, store.as_ref()).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_inspect(&report);
            }
        }

        Commands::Search {
            query,
            product,
            limit,
            documents,
        } => {
            let facade = open_facade(&config)?;
            let scope = if documents {
                SearchScope::Documents
            } else {
                SearchScope::Chunks
            };
            let output = cmd_search(&facade, &query, product.as_deref(), limit, scope).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print_search_results(&output);
            }
        }

        Commands::Fetch { uri } => {
            let facade = open_facade(&config)?;
            let document = cmd_fetch(&facade, &uri).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&document)?);
            } else {
                print_document(&document);
            }
        }

        Commands::Serve => {
            let server = McpServer::new(open_facade(&config)?);
            server
                .run()
                .await
                .map_err(|e| Error::McpProtocol(e.to_string()))?;
        }
    }

    Ok(())
}

fn open_facade(config: &Config) -> Result<SearchFacade> {
    Ok(SearchFacade::new(
        open_store(config)?,
        create_embedder(&config.embedding)?,
        config.catalog()?,
        config.search.clone(),
    ))
}

/// A `.toml` path is used as is; anything else is treated as a directory
fn resolve_config_path(path: Option<&std::path::Path>) -> PathBuf {
    match path {
        Some(p) if p.extension().is_some_and(|e| e == "toml") => p.to_path_buf(),
        Some(p) => p.join("config.toml"),
        None => Config::default_config_path(),
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config_path = resolve_config_path(path);

    if !config_path.exists() {
        eprintln!(
            "Config file not found: {}\nRun 'vdb-docs init' first.",
            config_path.display()
        );
        std::process::exit(1);
    }

    Config::load(&config_path)
}
