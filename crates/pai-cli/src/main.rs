//! pai-deps CLI - dependency and contract registry for personal infrastructure

use clap::Parser;
use pai_core::{DepsEngine, Envelope, EngineConfig, OverallStatus, VerifyOptions};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "pai-deps")]
#[command(about = "Track what your tools provide, depend on, and still honor")]
struct Cli {
    /// Emit machine-readable JSON envelopes instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Register a tool from its manifest (file or directory)
    Register { path: PathBuf },
    /// Remove a tool and everything cascading from it
    Unregister {
        id: String,
        /// Remove even when other tools still depend on it
        #[arg(long)]
        force: bool,
    },
    /// List registered tools
    List {
        /// Include synthesized stub entries
        #[arg(long)]
        stubs: bool,
    },
    /// Show one tool: edges, contracts, last verification
    Show { id: String },
    /// Discover manifests under roots and register what changed
    Sync {
        roots: Vec<PathBuf>,
        /// Re-register unchanged manifests too
        #[arg(long)]
        force: bool,
    },
    /// Verify a tool's contracts (or every tool with --all)
    Verify {
        id: Option<String>,
        #[arg(long)]
        all: bool,
        /// Presence checks only; skip command execution
        #[arg(long)]
        quick: bool,
    },
    /// Check declared schemas for drift against recorded hashes
    Drift {
        id: Option<String>,
        /// Accept current hashes as the new baseline
        #[arg(long)]
        update: bool,
    },
    /// Blast radius of a tool: affected set and risk score
    Impact {
        id: String,
        #[arg(long)]
        max_depth: Option<usize>,
    },
    /// Tools transitively affected by changed files
    Affected { files: Vec<PathBuf> },
    /// Recorded dependency cycles
    Cycles {
        /// Include cycles already marked resolved
        #[arg(long)]
        all: bool,
    },
    /// Registry counts
    Stats,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            if cli.json {
                print_envelope(&Envelope::err(&e));
            } else {
                eprintln!("error: {e}");
            }
            // Caller mistakes and runtime failures both map to 2; only
            // failed checks use 1.
            ExitCode::from(2)
        }
    }
}

fn run(cli: &Cli) -> pai_core::Result<ExitCode> {
    let mut engine = DepsEngine::new(EngineConfig::default())?;
    let json = cli.json;

    match &cli.command {
        Commands::Register { path } => {
            let outcome = engine.register(path)?;
            if json {
                print_envelope(&Envelope::ok_with_warnings(&outcome, outcome.warnings.clone()));
            } else {
                println!(
                    "{} {} ({} edges, {} contracts)",
                    match outcome.action {
                        pai_core::RegisterAction::Registered => "registered",
                        pai_core::RegisterAction::Updated => "updated",
                    },
                    outcome.tool.id,
                    outcome.edge_count,
                    outcome.contract_count
                );
                for warning in &outcome.warnings {
                    println!("  warning: {warning}");
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Unregister { id, force } => {
            let outcome = engine.unregister(id, *force)?;
            if json {
                print_envelope(&Envelope::ok(&outcome));
            } else {
                println!("unregistered {}", outcome.tool_id);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::List { stubs } => {
            let tools = engine.list(None, *stubs)?;
            if json {
                print_envelope(&Envelope::ok(&tools));
            } else {
                for tool in &tools {
                    println!(
                        "{}  {}  {}",
                        tool.id,
                        tool.kind,
                        if tool.is_stub {
                            "(stub)"
                        } else {
                            tool.filesystem_path.as_str()
                        }
                    );
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Show { id } => {
            let details = engine.show(id)?;
            if json {
                print_envelope(&Envelope::ok(&details));
            } else {
                println!("{} ({})", details.tool.id, details.tool.kind);
                println!("  path: {}", details.tool.filesystem_path);
                println!("  depends on: {}", details.providers.join(", "));
                println!("  depended on by: {}", details.consumers.join(", "));
                println!("  contracts: {}", details.contracts.len());
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Sync { roots, force } => {
            let summary = engine.sync(roots, *force)?;
            if json {
                print_envelope(&Envelope::ok(&summary));
            } else {
                println!(
                    "sync: {} new, {} updated, {} unchanged, {} errors",
                    summary.report.new_count,
                    summary.report.updated_count,
                    summary.report.unchanged_count,
                    summary.report.error_count
                );
                for warning in summary
                    .discovery_warnings
                    .iter()
                    .chain(summary.cycle_warnings.iter())
                {
                    println!("  warning: {warning}");
                }
            }
            Ok(if summary.report.error_count > 0 {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            })
        }
        Commands::Verify { id, all, quick } => {
            let mut opts: VerifyOptions = engine.verify_options();
            opts.quick = *quick || opts.quick;
            let (failed, value) = if *all || id.is_none() {
                let summary = engine.verify_all(&opts)?;
                let failed = summary
                    .reports
                    .iter()
                    .any(|r| r.overall_status == OverallStatus::Fail);
                (failed, serde_json::to_value(&summary).unwrap_or_default())
            } else {
                let report = engine.verify(id.as_deref().unwrap_or_default(), &opts)?;
                let failed = report.overall_status == OverallStatus::Fail;
                (failed, serde_json::to_value(&report).unwrap_or_default())
            };
            if json {
                print_envelope(&Envelope::ok(&value));
            } else {
                println!("verification {}", if failed { "FAILED" } else { "passed" });
            }
            Ok(if failed { ExitCode::from(1) } else { ExitCode::SUCCESS })
        }
        Commands::Drift { id, update } => {
            let summary = engine.drift_check(id.as_deref(), *update)?;
            let drifted = summary
                .items
                .iter()
                .any(|item| item.outcome.state == pai_core::DriftState::Drift);
            if json {
                print_envelope(&Envelope::ok_with_warnings(&summary, summary.warnings.clone()));
            } else {
                for item in &summary.items {
                    println!(
                        "{}/{}: {:?}",
                        item.tool_id, item.outcome.contract_name, item.outcome.state
                    );
                }
            }
            Ok(if drifted && !update {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            })
        }
        Commands::Impact { id, max_depth } => {
            let radius = engine.impact(id, *max_depth)?;
            if json {
                print_envelope(&Envelope::ok(&radius));
            } else {
                println!(
                    "{}: {} affected, risk {:.2} ({:?})",
                    radius.tool_id, radius.affected_count, radius.risk_score, radius.risk_level
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Affected { files } => {
            let result = engine.affected_by_files(files)?;
            if json {
                print_envelope(&Envelope::ok(&result));
            } else {
                for affected in &result.affected {
                    println!("{} (depth {})", affected.tool_id, affected.depth);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Cycles { all } => {
            let records = engine.cycle_records(!all)?;
            if json {
                print_envelope(&Envelope::ok(&records));
            } else {
                for record in &records {
                    println!(
                        "#{} {} {}",
                        record.id,
                        record.cycle.join(" -> "),
                        if record.resolved { "(resolved)" } else { "" }
                    );
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Stats => {
            let stats = engine.stats()?;
            if json {
                print_envelope(&Envelope::ok(&stats));
            } else {
                println!(
                    "{} tools ({} stubs), {} edges, {} contracts, {} unresolved cycles",
                    stats.tool_count,
                    stats.stub_count,
                    stats.edge_count,
                    stats.contract_count,
                    stats.unresolved_cycle_count
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_envelope(envelope: &Envelope) {
    println!(
        "{}",
        serde_json::to_string_pretty(envelope).unwrap_or_else(|_| "{}".to_string())
    );
}
