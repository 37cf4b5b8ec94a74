//! panelguard - security state for a server administration panel
//!
//! Command-line front end over the library: every subcommand opens the
//! security store, performs one operation and prints the result. The HTTP
//! dashboard calls the same library operations.
//!
//! # Usage
//!
//! ```bash
//! panelguard summary                       # Score, counts, trend, top offenders
//! panelguard add-rule 203.0.113.9 --reason "SSH brute force"
//! panelguard toggle --wait                 # Flip enforcement, wait for ufw
//! panelguard audit --limit 20
//! panelguard tail auth                     # Stream auth.log every 2s (Ctrl-C stops)
//! panelguard reconcile --watch             # Keep ufw in line with the desired state
//! ```

use clap::{Parser, Subcommand};
use panelguard::audit::DEFAULT_ACTOR;
use panelguard::config::{self, AppConfig};
use panelguard::core::control::{FirewallControl, Reconciled};
use panelguard::core::enforcement::UfwEnforcer;
use panelguard::core::firewall::{NewRule, RuleAction};
use panelguard::core::store::{Commit, SecurityStore};
use panelguard::core::{summary, timefmt};
use panelguard::stream::{self, DEFAULT_RECENT_LINES, LogReader, LogSource, SystemLogReader};
use panelguard::utils::{self, truncate_string};
use panelguard::{Error, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;

shadow_rs::shadow!(build);

#[derive(Parser)]
#[command(name = "panelguard")]
#[command(about = "Firewall rules, audit trail and log streaming for a server panel", long_about = None)]
#[command(version, long_version = build::CLAP_LONG_VERSION)]
struct Cli {
    /// Directory holding security.json (overrides the config file)
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Config file to use instead of the XDG default
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the security summary
    Summary {
        #[arg(long)]
        json: bool,
    },
    /// List firewall rules, newest first
    Rules {
        #[arg(long)]
        json: bool,
    },
    /// Record an allow/block rule for a source address
    AddRule {
        /// IPv4/IPv6 address or CIDR block
        ip: String,
        #[arg(short, long, default_value = "Blocked")]
        action: RuleAction,
        #[arg(short, long, default_value = "")]
        reason: String,
        #[arg(short, long, default_value = "")]
        target: String,
        #[arg(long, default_value = DEFAULT_ACTOR)]
        actor: String,
    },
    /// Show the enforcement config and whether the OS firewall matches it
    Config,
    /// Flip the enforcement state
    Toggle {
        /// Fail unless the OS firewall confirms the new state
        #[arg(short, long)]
        wait: bool,
        #[arg(long, default_value = DEFAULT_ACTOR)]
        actor: String,
    },
    /// Show the audit log, newest first
    Audit {
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Score the current config and record the scan
    Scan {
        #[arg(long, default_value = DEFAULT_ACTOR)]
        actor: String,
    },
    /// Record an administrative action in the audit log
    Record {
        action: String,
        target: String,
        #[arg(long, default_value = DEFAULT_ACTOR)]
        actor: String,
    },
    /// Manage the configured port list
    Port {
        #[command(subcommand)]
        command: PortCommand,
        #[arg(long, global = true, default_value = DEFAULT_ACTOR)]
        actor: String,
    },
    /// Stream recent lines of a log source (syslog, auth, app, docker)
    Tail {
        source: LogSource,
        /// Print one batch and exit
        #[arg(long)]
        once: bool,
        /// Lines for --once
        #[arg(short = 'n', long, default_value_t = DEFAULT_RECENT_LINES)]
        lines: usize,
    },
    /// Apply the desired enforcement state if the OS firewall differs
    Reconcile {
        /// Keep reconciling on an interval until Ctrl-C
        #[arg(long)]
        watch: bool,
    },
}

#[derive(Subcommand)]
enum PortCommand {
    /// Add a port or range (e.g. 3306, 8000-9000)
    Add { port: String },
    /// Remove a port or range
    Remove { port: String },
}

fn main() -> ExitCode {
    let _ = utils::ensure_dirs();
    init_logging();
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Logs go to `panelguard.log` in the state dir so stdout stays clean
fn init_logging() {
    let file = utils::get_state_dir().and_then(|dir| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(utils::LOG_FILE_NAME))
            .ok()
    });

    if let Some(file) = file {
        tracing_subscriber::fmt()
            .with_writer(file)
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    }
}

/// Broadcasts shutdown on Ctrl-C
fn shutdown_on_ctrl_c() -> broadcast::Receiver<()> {
    let (tx, rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(());
        }
    });
    rx
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => config::load_config_from(path).await,
        None => config::load_config().await,
    };

    // Log tailing never touches the store
    if let Commands::Tail {
        source,
        once,
        lines,
    } = cli.command
    {
        return tail(&config, source, once, lines).await;
    }

    let data_dir = cli
        .data_dir
        .or_else(|| config.data_dir.clone())
        .or_else(utils::get_data_dir)
        .ok_or_else(|| Error::Internal("No data directory available; pass --data-dir".to_string()))?;
    let store = Arc::new(SecurityStore::open_in(&data_dir).await?);

    let mut enforcer = UfwEnforcer::new(config.enforcement_program.clone());
    if !config.elevate_enforcement {
        enforcer = enforcer.without_elevation();
    }
    let control = FirewallControl::new(Arc::clone(&store), enforcer);

    match cli.command {
        Commands::Summary { json } => {
            let summary = summary::collect(&store, &config.summary_options()).await;
            if json {
                print_json(&summary)?;
            } else {
                print_summary(&summary);
            }
        }
        Commands::Rules { json } => {
            let state = store.read().await;
            if json {
                print_json(&state.firewall_rules)?;
            } else {
                let now = chrono::Utc::now();
                for rule in &state.firewall_rules {
                    println!(
                        "{:>5}  {:<8} {:<20} {:<16} {:<30} {}",
                        rule.id,
                        rule.action,
                        rule.source_ip,
                        truncate_string(&rule.target, 16),
                        truncate_string(&rule.reason, 30),
                        rule.time_ago(now)
                    );
                }
            }
        }
        Commands::AddRule {
            ip,
            action,
            reason,
            target,
            actor,
        } => {
            let draft = NewRule::new(ip, action).reason(reason).target(target);
            let rule = lenient(control.add_rule(&actor, draft).await?);
            println!("✓ Rule {} added: {} {}", rule.id, rule.action, rule.source_ip);
        }
        Commands::Config => {
            let state = store.read().await;
            let status = state.enforcement_status();
            println!("Enabled: {}", state.config.enabled);
            println!("Ports:   {}", state.config.ports.join(", "));
            match status.applied {
                Some(applied) if status.in_sync => println!("OS firewall: {applied} (in sync)"),
                Some(applied) => println!("OS firewall: {applied} (OUT OF SYNC)"),
                None => println!("OS firewall: never applied"),
            }
        }
        Commands::Toggle { wait, actor } => {
            let toggled = lenient(control.toggle(&actor).await);
            println!("Firewall enforcement: {}", on_off(toggled.enabled));

            // Dropping the runtime would kill the command mid-run, so always let it finish
            match toggled.apply.wait().await {
                Ok(applied) => println!("✓ OS firewall {}", on_off(applied)),
                Err(e) if wait => return Err(e),
                Err(e) => {
                    println!("✗ OS firewall not updated yet: {e}");
                    println!("  Run `panelguard reconcile` to retry.");
                }
            }
        }
        Commands::Audit { limit, json } => {
            let state = store.read().await;
            let entries: Vec<_> = state.audit_log.iter().take(limit).collect();
            if json {
                print_json(&entries)?;
            } else {
                let now = chrono::Utc::now();
                for entry in entries {
                    println!(
                        "{:<14} {:<12} {:<20} {}",
                        timefmt::humanize(entry.observed_at, now),
                        truncate_string(&entry.actor, 12),
                        entry.action,
                        entry.target
                    );
                }
            }
        }
        Commands::Scan { actor } => {
            let report = lenient(control.run_scan(&actor).await);
            println!("Security score: {}/100", report.score);
            if report.findings.is_empty() {
                println!("✓ No findings");
            }
            for finding in &report.findings {
                println!("  - {} (-{})", finding.describe(), finding.penalty());
            }
        }
        Commands::Record {
            action,
            target,
            actor,
        } => {
            let entry = lenient(control.record(&actor, &action, &target).await);
            println!("✓ Recorded audit entry {}", entry.id);
        }
        Commands::Port { command, actor } => {
            let config = match command {
                PortCommand::Add { port } => control.add_port(&actor, &port).await?,
                PortCommand::Remove { port } => control.remove_port(&actor, &port).await?,
            };
            println!("Ports: {}", lenient(config).ports.join(", "));
        }
        Commands::Reconcile { watch } => {
            if watch {
                let shutdown = shutdown_on_ctrl_c();
                control
                    .run_reconciler(config.reconcile_interval(), shutdown)
                    .await;
            } else {
                match control.reconcile_once().await {
                    Reconciled::InSync => println!("✓ OS firewall already in sync"),
                    Reconciled::Applied(state) => println!("✓ OS firewall {}", on_off(state)),
                    Reconciled::Failed => {
                        return Err(Error::Internal(
                            "Enforcement failed; see the log for details".to_string(),
                        ));
                    }
                }
            }
        }
        // Handled before the store is opened
        Commands::Tail { .. } => {}
    }

    Ok(())
}

async fn tail(config: &AppConfig, source: LogSource, once: bool, lines: usize) -> Result<()> {
    let reader = Arc::new(SystemLogReader::new(config.log_paths()));

    if once {
        for line in reader.recent_lines(source, lines).await {
            println!("{line}");
        }
        return Ok(());
    }

    let shutdown = shutdown_on_ctrl_c();
    let mut tail = stream::spawn_tail(reader, source, config.stream_settings(), shutdown);
    while let Some(batch) = tail.batches.recv().await {
        for line in batch.lines {
            println!("{line}");
        }
    }

    tail.task
        .await
        .map_err(|e| Error::Internal(format!("Log stream task failed: {e}")))?;
    Ok(())
}

/// Takes the in-memory result and warns if it did not reach the disk
fn lenient<T>(commit: Commit<T>) -> T {
    if let Some(e) = commit.persist_error() {
        warn!("{e}");
        eprintln!("Warning: change applied but not saved: {e}");
    }
    commit.into_value()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_summary(summary: &summary::SecuritySummary) {
    println!("Security score:      {}/100", summary.score);
    println!("Blocked (24h):       {}", summary.attacks_blocked_24h);
    println!("Firewall rules:      {}", summary.firewall_rules);
    println!("Blocked IPs:         {}", summary.blocked_ips);
    println!("fail2ban:            {}", summary.fail2ban);

    let enforcement = &summary.enforcement;
    if enforcement.in_sync {
        println!("Enforcement:         {}", on_off(enforcement.desired));
    } else {
        println!(
            "Enforcement:         {} (OS firewall: {})",
            on_off(enforcement.desired),
            enforcement.applied.map_or("unknown", on_off)
        );
    }

    println!();
    println!("Attack trend:");
    for bucket in &summary.attack_trend {
        println!("  {}  {:>4}", bucket.hour, bucket.count);
    }

    if !summary.top_attacking_ips.is_empty() {
        println!();
        println!("Top attacking IPs:");
        for ip in &summary.top_attacking_ips {
            println!("  {:<40} {:>4}", ip.ip, ip.count);
        }
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "enabled" } else { "disabled" }
}
