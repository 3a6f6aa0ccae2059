use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tally_core::TallyConfig;
use tally_credentials::{CredentialManager, IntuitOAuthClient, SqliteTokenStore};
use tally_reports::{LogMailer, QboClient, ReportMailer, ResendMailer};
use tally_scheduler::{JobStore, Runner, SqliteJobStore};
use tracing::info;

mod app;
mod http;

#[derive(Parser)]
#[command(name = "tally", version, about = "Daily QuickBooks balance-sheet emails")]
struct Cli {
    /// Config file. Defaults to $TALLY_CONFIG, then ~/.tally/tally.toml.
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log report emails instead of sending them.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the OAuth setup and job configuration server.
    Serve,
    /// Run every job that is due now, print the run report as JSON, and exit.
    RunDue,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "tally_gateway=info,tally_scheduler=info,tally_credentials=info,tally_reports=info,tower_http=debug"
                    .into()
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    // load config: --config > TALLY_CONFIG env > ~/.tally/tally.toml
    let config_path = cli.config.or_else(|| std::env::var("TALLY_CONFIG").ok());
    let config = load_config(config_path.as_deref())?;

    let services = Services::build(&config, cli.dry_run)?;

    match cli.command {
        Command::RunDue => {
            let report = services.runner.run_due(chrono::Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Serve => serve(config, services).await,
    }
}

async fn serve(config: TallyConfig, services: Services) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    let state = Arc::new(app::AppState::new(
        config,
        services.credentials,
        services.jobs,
        services.runner,
    ));
    let router = app::build_router(state);

    info!("Tally setup server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

/// Stores and collaborators shared by both entry points.
struct Services {
    credentials: Arc<CredentialManager>,
    jobs: Arc<dyn JobStore>,
    runner: Runner,
}

impl Services {
    fn build(config: &TallyConfig, dry_run: bool) -> anyhow::Result<Self> {
        // single SQLite file; each store gets its own connection
        let db_path = &config.database.path;
        ensure_parent_dir(db_path);
        info!(path = %db_path, "opening SQLite database");
        let db = rusqlite::Connection::open(db_path)?;
        db.execute_batch("PRAGMA journal_mode=WAL;")?;
        tally_credentials::db::init_db(&db)?;
        tally_scheduler::db::init_db(&db)?;
        info!("database migrations complete");

        let tokens = Arc::new(SqliteTokenStore::new(rusqlite::Connection::open(db_path)?)?);
        let jobs: Arc<dyn JobStore> =
            Arc::new(SqliteJobStore::new(rusqlite::Connection::open(db_path)?)?);

        let oauth = IntuitOAuthClient::from_config(&config.intuit)
            .context("set intuit.client_id and intuit.client_secret in tally.toml")?;
        let credentials = Arc::new(
            CredentialManager::new(tokens, Arc::new(oauth)).with_refresh_margin(
                chrono::Duration::seconds(config.scheduler.refresh_margin_secs.min(86_400) as i64),
            ),
        );

        let reports = Arc::new(QboClient::from_config(&config.intuit));
        info!(base_url = %config.intuit.api_base_url(), "QuickBooks report API");

        let mailer: Arc<dyn ReportMailer> = if dry_run {
            info!("dry run: report emails will be logged, not sent");
            Arc::new(LogMailer)
        } else {
            Arc::new(
                ResendMailer::from_config(&config.mail)
                    .context("set mail.resend_api_key or pass --dry-run")?,
            )
        };

        let runner = Runner::new(jobs.clone(), credentials.clone(), reports, mailer)
            .with_subject_prefix(config.mail.subject_prefix.clone());

        Ok(Self {
            credentials,
            jobs,
            runner,
        })
    }
}

/// A missing file yields defaults; a file that exists but does not parse is
/// an error, so `run-due` never runs against the wrong database.
fn load_config(path: Option<&str>) -> anyhow::Result<TallyConfig> {
    TallyConfig::load(path).context("loading tally config")
}

/// Ensure the parent directory for a file path exists.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let config = load_config(Some("/nonexistent/tally.toml")).unwrap();
        assert_eq!(config.gateway.port, tally_core::config::DEFAULT_PORT);
    }

    #[test]
    fn malformed_config_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[database\npath = ").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("loading tally config"));
    }
}
