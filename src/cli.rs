use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use env_logger::{Env, Target};
use log::{info, warn};
use std::path::{Path, PathBuf};

use crate::config::{self, AppConfig};
use crate::importer::{ImportResult, ImportSettings, Importer, TransitionOutcome};
use crate::ledger::{self, CsvTable};
use crate::providers::jira::JiraProvider;
use crate::providers::IssueTracker;
use crate::query;

const DEFAULT_FIELDS_OUTPUT: &str = "jira_fields.csv";
const DEFAULT_EXPORT_OUTPUT: &str = "my_issues.csv";

/// Bulk-create and reconcile Jira issues from a CSV file
#[derive(Parser, Debug)]
#[command(name = "jira-import", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Config file (defaults to ~/.jira-import/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Also write log lines to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an issue for every row without a Created Issue ID
    Import {
        /// Input CSV
        csv: PathBuf,
        /// Ledger of created issues (defaults to tracker.csv next to the input)
        #[arg(long)]
        tracker: Option<PathBuf>,
        /// Where to write the CSV with filled-in keys (defaults to the input)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Transition created issues to their closing status and set a resolution
        #[arg(long)]
        close: bool,
        /// Field value for every created issue, highest precedence (repeatable)
        #[arg(long = "set", value_name = "FIELD=VALUE", value_parser = parse_assignment)]
        set: Vec<(String, String)>,
    },
    /// Re-apply row fields to issues created by an earlier run
    Update {
        csv: PathBuf,
    },
    /// Move already created issues to their closing status
    Transition {
        csv: PathBuf,
        /// Target status for every issue instead of the per-type default
        #[arg(long)]
        status: Option<String>,
        /// Write a per-issue result CSV
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Export the Jira field catalogue to CSV
    Fields {
        #[arg(long, default_value = DEFAULT_FIELDS_OUTPUT)]
        output: PathBuf,
    },
    /// Export issues assigned to or reported by you, in the import CSV layout
    Export {
        #[arg(long, default_value = DEFAULT_EXPORT_OUTPUT)]
        output: PathBuf,
        /// Search with this JQL instead
        #[arg(long)]
        jql: Option<String>,
    },
    /// Show an issue's status and the transitions available from it
    Transitions {
        key: String,
    },
}

/// Parse `--set NAME=VALUE`. The value may itself contain `=`.
pub fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    let Some((name, value)) = raw.split_once('=') else {
        return Err(format!("expected FIELD=VALUE, got '{raw}'"));
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing field name in '{raw}'"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// `RUST_LOG` wins; otherwise info, or debug with `-v`.
pub fn init_logging(verbose: u8, log_file: Option<&Path>) -> Result<()> {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or(level));
    builder.format(|buf, record| {
        use std::io::Write;
        writeln!(
            buf,
            "{} [{}] {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.args()
        )
    });
    if let Some(path) = log_file {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create log file {}", path.display()))?;
        builder.target(Target::Pipe(Box::new(file)));
    }
    builder.try_init()?;
    Ok(())
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = config::load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Import {
            csv,
            tracker,
            output,
            close,
            set,
        } => handle_import(&config, &csv, tracker, output, close, &set).await,
        Command::Update { csv } => handle_update(&config, &csv).await,
        Command::Transition {
            csv,
            status,
            report,
        } => handle_transition(&config, &csv, status, report).await,
        Command::Fields { output } => handle_fields(&config, &output).await,
        Command::Export { output, jql } => handle_export(&config, &output, jql).await,
        Command::Transitions { key } => {
            let listing = query::list_transitions(&provider(&config)?, &key).await?;
            for line in listing.lines() {
                println!("{line}");
            }
            Ok(())
        }
    }
}

fn provider(config: &AppConfig) -> Result<JiraProvider> {
    let creds = config.jira.credentials()?;
    Ok(JiraProvider::new(creds.base_url, creds.email, creds.api_token))
}

async fn handle_import(
    config: &AppConfig,
    csv: &Path,
    tracker: Option<PathBuf>,
    output: Option<PathBuf>,
    close: bool,
    set: &[(String, String)],
) -> Result<()> {
    let mut table = ledger::read_table(csv)?;
    let jira = provider(config)?;
    let settings = ImportSettings::from_config(config, set);
    let plan = close.then(|| config.transition.clone());

    let result = Importer::new(&jira, &settings)
        .import(&mut table.rows, plan.as_ref())
        .await;

    let output = output.unwrap_or_else(|| csv.to_path_buf());
    let tracker = tracker.unwrap_or_else(|| ledger::default_ledger_path(csv));
    let appended = record_import(&table, &result, &output, &tracker)?;

    print_import_summary(&result, appended, &tracker);
    if !result.failed.is_empty() {
        bail!("{} row(s) failed", result.failed.len());
    }
    Ok(())
}

/// Persist created keys: the ledger first, then the rewritten CSV. Both writes are
/// attempted, so a failed rewrite still leaves every new key in the ledger.
fn record_import(
    table: &CsvTable,
    result: &ImportResult,
    output: &Path,
    tracker: &Path,
) -> Result<usize> {
    let appended = ledger::append(tracker, &result.new_ledger_rows(&table.rows));
    let written = if result.created.is_empty() {
        Ok(())
    } else {
        table.write(output)
    };

    match (appended, written) {
        (Ok(appended), Ok(())) => {
            if !result.created.is_empty() {
                info!("Wrote {} with issue keys", output.display());
            }
            Ok(appended)
        }
        (Ok(_), Err(e)) => Err(e.context(format!(
            "Issue keys were recorded in {} but {} was not updated",
            tracker.display(),
            output.display()
        ))),
        (Err(e), Ok(())) => Err(e.context(format!(
            "{} has the issue keys but the ledger {} was not updated",
            output.display(),
            tracker.display()
        ))),
        (Err(ledger_err), Err(output_err)) => bail!(
            "Created issue keys were not saved. Ledger {}: {ledger_err:#}. Output {}: {output_err:#}",
            tracker.display(),
            output.display()
        ),
    }
}

fn print_import_summary(result: &ImportResult, appended: usize, tracker: &Path) {
    for created in &result.created {
        let fields: Vec<&str> = created.fields.iter().map(|f| f.name).collect();
        let mut line = format!("  created {}  {}", created.key, created.summary);
        if !fields.is_empty() {
            line.push_str(&format!("  [{}]", fields.join(", ")));
        }
        if created.worklog {
            line.push_str("  +worklog");
        }
        if let Some(status) = created.closure.as_ref().and_then(|c| c.status.as_deref()) {
            line.push_str(&format!("  -> {status}"));
        }
        println!("{line}");
    }
    for skipped in &result.skipped {
        info!("Skipped row {} '{}': {}", skipped.index + 1, skipped.summary, skipped.reason);
    }
    for failed in &result.failed {
        println!("  FAILED row {}  {}: {}", failed.index + 1, failed.summary, failed.error);
    }
    println!(
        "Created {}, skipped {}, failed {}. {} new row(s) in {}",
        result.created.len(),
        result.skipped.len(),
        result.failed.len(),
        appended,
        tracker.display()
    );
}

async fn handle_update(config: &AppConfig, csv: &Path) -> Result<()> {
    let rows = ledger::read_rows(csv)?;
    let jira = provider(config)?;
    let settings = ImportSettings::from_config(config, &[]);

    let result = Importer::new(&jira, &settings).update_existing(&rows).await;

    for updated in &result.updated {
        let fields: Vec<&str> = updated.fields.iter().map(|f| f.name).collect();
        println!("  row {}  {}  [{}]", updated.index + 1, updated.key, fields.join(", "));
    }
    println!(
        "Updated {} issue(s), skipped {} row(s) without a key",
        result.updated.len(),
        result.skipped.len()
    );
    Ok(())
}

async fn handle_transition(
    config: &AppConfig,
    csv: &Path,
    status: Option<String>,
    report: Option<PathBuf>,
) -> Result<()> {
    let rows = ledger::read_rows(csv)?;
    let jira = provider(config)?;
    let settings = ImportSettings::from_config(config, &[]);
    let plan = config.transition.clone().with_force_status(status);

    let entries = Importer::new(&jira, &settings)
        .transition_existing(&rows, &plan)
        .await;
    if entries.is_empty() {
        warn!("No rows with a Created Issue ID in {}", csv.display());
    }

    let (mut moved, mut already, mut failed) = (0, 0, 0);
    for entry in &entries {
        match entry.outcome {
            TransitionOutcome::Transitioned { .. } => moved += 1,
            TransitionOutcome::AlreadyInStatus => already += 1,
            TransitionOutcome::Failed(_) => failed += 1,
        }
    }
    println!("Transitioned {moved}, already in status {already}, failed {failed}");

    if let Some(path) = report {
        let report_rows: Vec<_> = entries.iter().map(|e| e.report_row()).collect();
        ledger::write_records(&path, &report_rows)?;
        println!("Report written to {}", path.display());
    }
    Ok(())
}

async fn handle_fields(config: &AppConfig, output: &Path) -> Result<()> {
    let jira = provider(config)?;
    let mut fields = jira.list_fields().await?;
    fields.sort_by(|a, b| (!a.custom, &a.name).cmp(&(!b.custom, &b.name)));
    ledger::write_records(output, &fields)?;
    println!("Exported {} field(s) to {}", fields.len(), output.display());
    Ok(())
}

async fn handle_export(config: &AppConfig, output: &Path, jql: Option<String>) -> Result<()> {
    let jira = provider(config)?;
    let jql = jql.as_deref().unwrap_or(query::MY_ISSUES_JQL);
    let rows = query::export_rows(&jira, jql, &config.fields).await?;
    if rows.is_empty() {
        println!("No issues matched {jql}");
        return Ok(());
    }
    ledger::write_records(output, &rows)?;
    println!("Exported {} issue(s) to {}", rows.len(), output.display());
    Ok(())
}
