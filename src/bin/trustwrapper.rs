//! `trustwrapper` CLI: thin reference front-end over the library. Exit
//! codes: 0 ok, 2 configuration error, 3 deadline exceeded, 4 verification
//! error, 5 audit degraded.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use trustwrapper::attestation::scheme_from_name;
use trustwrapper::audit::{AuditLog, SqliteSink};
use trustwrapper::cache::FingerprintCache;
use trustwrapper::config::PolicyConfig;
use trustwrapper::engine::VerificationEngine;
use trustwrapper::oracle::OracleConsensus;
use trustwrapper::wrapper::{CallerMeta, VerifyOptions, Wrapper};
use trustwrapper::{AgentHandle, Decision};

#[derive(Parser)]
#[command(name = "trustwrapper")]
#[command(about = "Local-first verification layer for AI agent decisions", long_about = None)]
struct Cli {
    /// Path to the policy config TOML; falls back to TRUSTWRAPPER_CONFIG, then built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the sqlite audit database; defaults to an in-process, ephemeral in-memory store.
    #[arg(long)]
    audit_db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a single Decision read from a JSON file.
    Verify {
        #[arg(long = "in")]
        input: PathBuf,
    },
    /// Verify every Decision JSON file in a directory.
    VerifyBatch {
        #[arg(long = "in")]
        input_dir: PathBuf,
    },
    /// Print the current oracle consensus snapshot for every tracked symbol.
    OracleStatus,
    /// List audit records whose wall_time falls within [from, to] (RFC3339).
    AuditRange {
        #[arg(long)]
        from: DateTime<Utc>,
        #[arg(long)]
        to: DateTime<Utc>,
    },
}

fn init_tracing() {
    let filter = std::env::var("TRUSTWRAPPER_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();
}

fn load_policy(cli_path: &Option<PathBuf>) -> Result<PolicyConfig> {
    let path = cli_path
        .clone()
        .or_else(|| std::env::var("TRUSTWRAPPER_CONFIG").ok().map(PathBuf::from));
    match path {
        Some(p) => PolicyConfig::load(&p).with_context(|| format!("loading policy config from {p:?}")),
        None => PolicyConfig::validate(Default::default()).context("validating built-in default policy"),
    }
}

fn build_wrapper(cli: &Cli) -> Result<(Wrapper, PolicyConfig)> {
    let policy = load_policy(&cli.config)?;
    let oracle = Arc::new(OracleConsensus::new(&policy));
    let engine = Arc::new(VerificationEngine::with_built_in_knowledge_base());
    let scheme_name = std::env::var("TRUSTWRAPPER_ZK_SCHEME").unwrap_or_default();
    let scheme = scheme_from_name(&scheme_name).context("selecting zk scheme")?;
    let cache = Arc::new(FingerprintCache::new(policy.raw.cache_bytes_budget / 4096 + 1));
    let sink: Arc<dyn trustwrapper::AuditSink> = match &cli.audit_db {
        Some(path) => Arc::new(SqliteSink::open(path).context("opening audit db")?),
        None => Arc::new(SqliteSink::open_in_memory().context("opening in-memory audit db")?),
    };
    let audit = Arc::new(AuditLog::new(sink, 1024, policy.audit_backpressure_timeout()));
    let wrapper = Wrapper::new(policy.clone(), oracle, engine, scheme, cache, audit);
    Ok((wrapper, policy))
}

fn read_decision(path: &PathBuf) -> Result<Decision> {
    let contents = std::fs::read_to_string(path).with_context(|| format!("reading {path:?}"))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing decision JSON in {path:?}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let exit_code = match run(&cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            4
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: &Cli) -> Result<i32> {
    match &cli.command {
        Commands::Verify { input } => {
            let (wrapper, policy) = build_wrapper(cli)?;
            let decision = read_decision(input)?;
            let options = VerifyOptions::new(Instant::now() + policy.total_deadline());
            let caller = CallerMeta::new(AgentHandle("trustwrapper-cli".to_string()));
            match wrapper.verify(decision, caller, options).await {
                Ok(outcome) => {
                    println!("{}", serde_json::to_string_pretty(&outcome.verdict)?);
                    Ok(exit_for_verdict(&outcome.verdict, wrapper.audit().is_degraded()))
                }
                Err(e) => Ok(exit_for_error(&e)),
            }
        }
        Commands::VerifyBatch { input_dir } => {
            let (wrapper, policy) = build_wrapper(cli)?;
            let mut decisions = Vec::new();
            for entry in std::fs::read_dir(input_dir).with_context(|| format!("reading {input_dir:?}"))? {
                let entry = entry?;
                if entry.path().extension().and_then(|e| e.to_str()) == Some("json") {
                    let decision = read_decision(&entry.path())?;
                    decisions.push((decision, CallerMeta::new(AgentHandle("trustwrapper-cli".to_string()))));
                }
            }
            let options = VerifyOptions::new(Instant::now() + policy.total_deadline());
            let results = wrapper.verify_batch(decisions, options).await;
            let mut worst_exit = 0;
            for result in &results {
                match result {
                    Ok(outcome) => {
                        println!("{}", serde_json::to_string(&outcome.verdict)?);
                        worst_exit = worst_exit.max(exit_for_verdict(&outcome.verdict, wrapper.audit().is_degraded()));
                    }
                    Err(e) => {
                        eprintln!("verification error: {e}");
                        worst_exit = worst_exit.max(exit_for_error(e));
                    }
                }
            }
            Ok(worst_exit)
        }
        Commands::OracleStatus => {
            let (wrapper, _policy) = build_wrapper(cli)?;
            let snapshots = wrapper.oracle().symbol_snapshots();
            if snapshots.is_empty() {
                println!("no symbols tracked yet");
            }
            for (symbol, consensus) in snapshots {
                println!(
                    "{symbol}: price={:.4} sources={} manipulation_score={:.3} stale={}",
                    consensus.consensus_price, consensus.contributing_sources_count, consensus.manipulation_score, consensus.stale
                );
            }
            Ok(0)
        }
        Commands::AuditRange { from, to } => {
            let (wrapper, _policy) = build_wrapper(cli)?;
            let records = wrapper
                .audit()
                .range(from.timestamp(), to.timestamp())
                .context("querying audit range")?;
            for record in &records {
                println!("{}", serde_json::to_string(record)?);
            }
            Ok(0)
        }
    }
}

fn exit_for_verdict(verdict: &trustwrapper::Verdict, audit_degraded: bool) -> i32 {
    if audit_degraded {
        5
    } else if verdict.deadline_hit {
        3
    } else {
        0
    }
}

fn exit_for_error(e: &trustwrapper::VerifyError) -> i32 {
    use trustwrapper::VerifyError::*;
    match e {
        ConfigInvalid(_) => 2,
        DeadlineTooTight { .. } => 3,
        AuditDegraded(_) => 5,
        _ => 4,
    }
}
