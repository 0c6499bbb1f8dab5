use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use casb_risk_sync::command::CommandRunner;
use casb_risk_sync::command::process::ProcessRunner;
use casb_risk_sync::config::{Settings, resolve_config_path};
use casb_risk_sync::directory::{Directory, TerminalPrompter, ensure_logged_in};
use casb_risk_sync::driver::Driver;
use casb_risk_sync::logging;
use casb_risk_sync::report::casb::CasbFetcher;
use casb_risk_sync::watch::ConfigWatcher;

#[derive(Parser, Debug)]
#[command(name = "casb-risk-sync")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the risk score exporter and group manager until interrupted
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Config file (default: ~/azure_casb.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Match CASB login names to directory users by mail nickname
    #[arg(short = 'm', long)]
    mail_nickname: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    // A missing .env is normal.
    dotenvy::dotenv().ok();

    let result = match cli.command {
        Command::Run(args) => run(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "fatal");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let path = resolve_config_path(args.config)?;
    let settings =
        Settings::load(&path).with_context(|| format!("loading config {}", path.display()))?;

    let log_format = logging::init(settings.log_json);
    info!(config = %path.display(), version = env!("CARGO_PKG_VERSION"), "starting casb-risk-sync");

    let watcher = match ConfigWatcher::spawn(&path, log_format) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!(error = %e, "config hot reload disabled");
            None
        }
    };

    let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner);
    let directory = Directory::new(
        runner.clone(),
        args.mail_nickname || settings.sync.mail_nickname,
    );
    ensure_logged_in(&directory, &settings.admin, &mut TerminalPrompter)
        .await
        .context("directory login failed")?;

    let fetcher = CasbFetcher::new(
        &settings.casb.report_url,
        &settings.casb.username,
        settings.casb.password,
    );
    let mut driver =
        Driver::new(Box::new(fetcher), runner, settings.sync).force_nickname(args.mail_nickname);
    if let Some(watcher) = watcher {
        driver = driver.with_reload(path, watcher);
    }

    tokio::select! {
        () = driver.run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("cannot listen for interrupt")?;
            println!();
            info!("interrupted, stopping");
        }
    }
    Ok(())
}
