//! adrunner - resolve video ad tags from the command line
//!
//! Tags are resolved against a JSON catalog that maps each tag to the
//! document it serves, so chains can be inspected without a network.
//!
//! ## Commands
//!
//! - `resolve`: follow wrappers from a tag and print the chain
//! - `candidates`: print the head of every chain `request_next_ad` yields

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use adrunner_core::fakes::MemoryDocumentLoader;
use adrunner_core::metrics::METRICS;
use adrunner_core::{AdKind, AdRunError, Chain, ChainResolver, ErrorCode, ResolveOptions};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, Level};

#[derive(Parser)]
#[command(name = "adrunner")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Resolve VAST ad chains against a document catalog", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a tag down to an inline ad and print the chain as JSON
    Resolve {
        /// Ad tag to resolve
        tag: String,

        #[command(flatten)]
        source: SourceArgs,

        /// Print only the head link
        #[arg(long)]
        head_only: bool,
    },

    /// Resolve a tag, then list every candidate `request_next_ad` offers
    Candidates {
        /// Ad tag to resolve
        tag: String,

        #[command(flatten)]
        source: SourceArgs,

        /// Stop after this many candidates
        #[arg(long, default_value = "20")]
        max: usize,
    },
}

#[derive(Args)]
struct SourceArgs {
    /// JSON object mapping tags to the documents they serve
    #[arg(short, long, env = "ADRUNNER_CATALOG")]
    catalog: PathBuf,

    /// JSON file with resolve options; flags below override it
    #[arg(long)]
    options: Option<PathBuf>,

    /// Maximum wrapper hops
    #[arg(long)]
    wrapper_limit: Option<usize>,

    /// Overall resolution budget in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Reject documents returning more than one ad (error 203)
    #[arg(long)]
    no_multiple_ads: bool,

    /// Prefer buffet ads before advancing the pod
    #[arg(long)]
    use_ad_buffet: bool,

    /// Do not fall back to arbitrary ads once the pod is exhausted
    #[arg(long)]
    no_fallback: bool,
}

/// One line of `candidates` output.
#[derive(Debug, Serialize)]
struct HeadSummary {
    index: usize,
    depth: usize,
    requested_tag: String,
    ad_id: Option<String>,
    kind: Option<AdKind>,
    sequence: Option<u32>,
    error_code: Option<ErrorCode>,
    error: Option<String>,
}

impl HeadSummary {
    fn of(index: usize, chain: &Chain) -> Option<Self> {
        let head = chain.head()?;
        Some(Self {
            index,
            depth: chain.len(),
            requested_tag: head.requested_tag.clone(),
            ad_id: head.ad.as_ref().map(|ad| {
                ad.entry()
                    .id
                    .clone()
                    .unwrap_or_else(|| ad.id().short().to_string())
            }),
            kind: head.ad.as_ref().map(|ad| ad.kind()),
            sequence: head.ad.as_ref().and_then(|ad| ad.sequence()),
            error_code: head.error_code,
            error: head.error.as_ref().map(|e| e.message.clone()),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    adrunner_core::init_tracing(cli.json, level);

    let result = match cli.command {
        Commands::Resolve {
            tag,
            source,
            head_only,
        } => cmd_resolve(&tag, &source, head_only).await,
        Commands::Candidates { tag, source, max } => cmd_candidates(&tag, &source, max).await,
    };
    METRICS.flush();
    result
}

/// Resolve `tag` and print the chain (or its head) as pretty JSON.
async fn cmd_resolve(tag: &str, source: &SourceArgs, head_only: bool) -> Result<()> {
    let (resolver, options) = setup(source)?;
    let chain = resolver.resolve_chain(tag, &options, Chain::new()).await;

    let rendered = if head_only {
        serde_json::to_string_pretty(&chain.head())?
    } else {
        serde_json::to_string_pretty(&chain)?
    };
    println!("{}", rendered);
    Ok(())
}

/// Print the head of the initial chain and of every follow-up candidate,
/// one JSON object per line.
async fn cmd_candidates(tag: &str, source: &SourceArgs, max: usize) -> Result<()> {
    let (resolver, options) = setup(source)?;
    for summary in list_candidates(&resolver, tag, &options, max).await? {
        println!("{}", serde_json::to_string(&summary)?);
    }
    Ok(())
}

async fn list_candidates(
    resolver: &ChainResolver,
    tag: &str,
    options: &ResolveOptions,
    max: usize,
) -> Result<Vec<HeadSummary>> {
    let mut chain = resolver.resolve_chain(tag, options, Chain::new()).await;
    let mut summaries = Vec::new();

    while let Some(summary) = HeadSummary::of(summaries.len(), &chain) {
        summaries.push(summary);
        if summaries.len() >= max {
            break;
        }

        match resolver.request_next_ad(&chain, options).await {
            Ok(next) => chain = next,
            Err(AdRunError::NoNextAd) => {
                debug!(event = "cli.candidates_exhausted", count = summaries.len());
                break;
            }
            Err(err) => return Err(err).context("Failed to request the next ad"),
        }
    }
    Ok(summaries)
}

fn setup(source: &SourceArgs) -> Result<(ChainResolver, ResolveOptions)> {
    let catalog = load_catalog(&source.catalog)?;
    let loader = MemoryDocumentLoader::from_catalog(&catalog);
    let options = resolve_options(source)?;
    Ok((ChainResolver::new(Arc::new(loader)), options))
}

fn load_catalog(path: &Path) -> Result<HashMap<String, Value>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalog {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Catalog {} is not a JSON object of documents", path.display()))
}

fn resolve_options(source: &SourceArgs) -> Result<ResolveOptions> {
    let mut options = match &source.options {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read options {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Invalid resolve options in {}", path.display()))?
        }
        None => ResolveOptions::default(),
    };

    if source.wrapper_limit.is_some() {
        options.wrapper_limit = source.wrapper_limit;
    }
    if source.timeout_ms.is_some() {
        options.timeout_ms = source.timeout_ms;
    }
    if source.no_multiple_ads {
        options.allow_multiple_ads = false;
    }
    if source.use_ad_buffet {
        options.use_ad_buffet = true;
    }
    if source.no_fallback {
        options.fallback_on_no_ad = false;
    }
    Ok(options)
}
