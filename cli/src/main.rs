use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use ascend_kernel::{Level, MigrateError, Migrator, ScriptSet, SqliteConfig, SqliteStore};

/// Ascend migration CLI
#[derive(Parser, Debug)]
#[command(name = "ascend")]
#[command(about = "Apply versioned migration scripts to a SQLite database", long_about = None)]
struct Cli {
    /// Path to the SQLite database file (":memory:" for a throwaway database)
    #[arg(long, global = true, default_value = "ascend.db")]
    database: String,

    /// Name of the bookkeeping table
    #[arg(long, global = true, default_value = ascend_kernel::adapters::sqlite::DEFAULT_TABLE)]
    table: String,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending scripts up to a level (all of them by default)
    Ensure {
        /// Path to the migration scripts JSON
        #[arg(long)]
        scripts: PathBuf,

        #[arg(long)]
        target: Option<Level>,
    },

    /// Fail unless the database is already at the required level
    Check {
        /// Path to the migration scripts JSON
        #[arg(long)]
        scripts: PathBuf,

        #[arg(long)]
        target: Option<Level>,
    },

    /// Show recorded and pending levels
    Status {
        /// Path to the migration scripts JSON
        #[arg(long)]
        scripts: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

/// Wrapper for JSON output
#[derive(Debug, Serialize)]
struct LevelOutput {
    level: Level,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let Cli {
        database,
        table,
        command,
        ..
    } = cli;

    match command {
        Command::Ensure { scripts, target } => {
            let mut migrator = migrator(&database, &table, &scripts)?;
            let level = migrator.ensure(target)?;
            println!("{}", serde_json::to_string(&LevelOutput { level })?);
            Ok(ExitCode::SUCCESS)
        }

        Command::Check { scripts, target } => {
            let mut migrator = migrator(&database, &table, &scripts)?;
            match migrator.check(target) {
                Ok(level) => {
                    println!("{}", serde_json::to_string(&LevelOutput { level })?);
                    Ok(ExitCode::SUCCESS)
                }
                Err(MigrateError::Behind { current, required }) => {
                    eprintln!("database is at level {current}, level {required} is required");
                    Ok(ExitCode::from(2))
                }
                Err(err) => Err(err.into()),
            }
        }

        Command::Status { scripts, json } => {
            let mut migrator = migrator(&database, &table, &scripts)?;
            let status = migrator.status()?;

            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("current: {}", status.current);
                println!("latest:  {}", status.latest);
                if status.is_up_to_date() {
                    println!("up to date");
                } else {
                    let pending: Vec<String> =
                        status.pending.iter().map(Level::to_string).collect();
                    println!("pending: {}", pending.join(", "));
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

// ----------------------------
// Build migrator from arguments
// ----------------------------
fn migrator(database: &str, table: &str, scripts: &Path) -> Result<Migrator<SqliteStore>> {
    let scripts = ScriptSet::from_json_file(scripts)
        .with_context(|| format!("loading scripts from {}", scripts.display()))?;

    let config = if database == ":memory:" {
        SqliteConfig::default()
    } else {
        SqliteConfig::file(database)
    }
    .with_table(table);

    tracing::debug!(database, table, scripts = scripts.len(), "sqlite store configured");
    let store = SqliteStore::new(config)?;
    Ok(Migrator::with_script_set(store, scripts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ensure_with_target() {
        let cli = Cli::try_parse_from([
            "ascend",
            "--database",
            "app.db",
            "ensure",
            "--scripts",
            "scripts.json",
            "--target",
            "3",
        ])
        .unwrap();

        assert_eq!(cli.database, "app.db");
        assert_eq!(cli.table, "migrations");
        assert!(matches!(cli.command, Command::Ensure { target: Some(3), .. }));
    }

    #[test]
    fn target_is_optional() {
        let cli = Cli::try_parse_from(["ascend", "check", "--scripts", "scripts.json"]).unwrap();
        assert!(matches!(cli.command, Command::Check { target: None, .. }));
    }

    #[test]
    fn missing_scripts_file_is_reported() {
        let err = migrator(":memory:", "migrations", Path::new("/nonexistent/scripts.json"))
            .unwrap_err();
        assert!(err.to_string().contains("loading scripts"));
    }

    const SCRIPTS: &str = r#"[
        { "level": 1, "up": "create table t (a int)" },
        { "level": 2, "up": ["insert into t values (2)", "insert into t values (3)"] }
    ]"#;

    fn scripts_file(dir: &tempfile::TempDir) -> String {
        let path = dir.path().join("scripts.json");
        std::fs::write(&path, SCRIPTS).unwrap();
        path.display().to_string()
    }

    fn run_args(args: &[&str]) -> ExitCode {
        let mut argv = vec!["ascend"];
        argv.extend_from_slice(args);
        run(Cli::try_parse_from(argv).unwrap()).unwrap()
    }

    #[test]
    fn ensure_runs_against_memory_database() {
        let dir = tempfile::tempdir().unwrap();
        let scripts = scripts_file(&dir);

        let code = run_args(&["--database", ":memory:", "ensure", "--scripts", &scripts]);

        assert_eq!(code, ExitCode::SUCCESS);
    }

    #[test]
    fn check_behind_exits_with_two() {
        let dir = tempfile::tempdir().unwrap();
        let scripts = scripts_file(&dir);

        let code = run_args(&["--database", ":memory:", "check", "--scripts", &scripts]);

        assert_eq!(code, ExitCode::from(2));
    }

    #[test]
    fn check_passes_after_ensure_on_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let scripts = scripts_file(&dir);
        let database = dir.path().join("app.db").display().to_string();

        let ensure = run_args(&["--database", &database, "ensure", "--scripts", &scripts]);
        let check = run_args(&["--database", &database, "check", "--scripts", &scripts]);
        let status = run_args(&["--database", &database, "status", "--scripts", &scripts, "--json"]);

        assert_eq!(ensure, ExitCode::SUCCESS);
        assert_eq!(check, ExitCode::SUCCESS);
        assert_eq!(status, ExitCode::SUCCESS);
    }

    #[test]
    fn check_honours_target() {
        let dir = tempfile::tempdir().unwrap();
        let scripts = scripts_file(&dir);
        let database = dir.path().join("app.db").display().to_string();

        run_args(&["--database", &database, "ensure", "--scripts", &scripts, "--target", "1"]);

        let at_one = run_args(&["--database", &database, "check", "--scripts", &scripts, "--target", "1"]);
        let at_two = run_args(&["--database", &database, "check", "--scripts", &scripts, "--target", "2"]);

        assert_eq!(at_one, ExitCode::SUCCESS);
        assert_eq!(at_two, ExitCode::from(2));
    }
}
