//! ecoscan-admin: maintenance commands for the SQLite action ledger.
//!
//! None of these are routed over HTTP.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use ecoscan::config::AppConfig;
use ecoscan::ledger::{ActionLedger, SqliteStore};
use ecoscan::logging::init_tracing;
use ecoscan::sanitizer::RecordSanitizer;

#[derive(Debug, Parser)]
#[command(
    name = "ecoscan-admin",
    version,
    about = "Maintenance commands for the eco-scan action ledger"
)]
struct Cli {
    /// Ledger database file. Defaults to $ECOSCAN_DB_PATH, then data/ecoscan.db.
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,
    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Repair legacy rows whose numeric columns hold lists instead of numbers.
    Sanitize,
    /// Delete every ledger record. Ids are not reused afterwards.
    Wipe {
        /// Required; there is no undo.
        #[arg(long)]
        yes: bool,
    },
    /// Show a user's actions, newest first.
    History {
        user_id: String,
    },
}

fn main() {
    let _ = dotenvy::dotenv();
    init_tracing();
    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("ecoscan-admin: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let db = match &cli.db {
        Some(p) => p.clone(),
        None => AppConfig::from_env()?.db_path,
    };
    let store = Arc::new(
        SqliteStore::open(&db).with_context(|| format!("opening ledger at {}", db.display()))?,
    );

    match &cli.command {
        Command::Sanitize => {
            let report = RecordSanitizer::new(store).run()?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "scanned": report.scanned,
                        "repaired": report.repaired,
                        "skipped": report.skipped,
                    })
                );
            } else {
                println!(
                    "scanned {} records, repaired {}, skipped {} undecodable",
                    report.scanned, report.repaired, report.skipped
                );
            }
        }
        Command::Wipe { yes } => {
            if !yes {
                bail!("refusing to wipe {} without --yes", db.display());
            }
            let removed = ActionLedger::new(store).wipe()?;
            println!("removed {removed} records");
        }
        Command::History { user_id } => {
            let actions = ActionLedger::new(store).history(user_id)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&actions)?);
            } else if actions.is_empty() {
                println!("no actions for {user_id}");
            } else {
                for a in &actions {
                    println!(
                        "#{:<6} {}  {:<18} eco={:<3} points={:<3} conf={:.2} via {}",
                        a.id,
                        a.created_at_iso(),
                        a.category.as_str(),
                        a.eco_score,
                        a.points,
                        a.confidence,
                        a.source_tag
                    );
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_subcommands() {
        Cli::command().debug_assert();
        let cli = Cli::try_parse_from(["ecoscan-admin", "--db", "x.db", "wipe", "--yes"]).unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("x.db")));
        assert!(matches!(cli.command, Command::Wipe { yes: true }));

        let cli = Cli::try_parse_from(["ecoscan-admin", "history", "ana", "--json"]).unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Command::History { ref user_id } if user_id == "ana"));
    }

    #[test]
    fn wipe_without_yes_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli {
            db: Some(dir.path().join("l.db")),
            json: false,
            command: Command::Wipe { yes: false },
        };
        assert!(run(&cli).is_err());
    }
}
