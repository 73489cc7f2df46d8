use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{ArgAction, Parser, Subcommand};
use sso_session::{FailureHook, SsoSession};

mod commands;
mod config;
mod logging;

#[derive(Parser)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(name = "sso-cli")]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override `api_url`
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Override `sso_url`
    #[arg(long, global = true)]
    sso_url: Option<String>,

    /// Keep tokens in memory only
    #[arg(long, global = true)]
    in_memory: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    Login(commands::LoginArgs),
    /// Revoke the refresh token and forget stored credentials
    Logout,
    /// Print the logged-in user and their roles
    Whoami,
    Get(commands::GetArgs),
    Register(commands::RegisterArgs),
}

impl Cli {
    fn overrides(&self) -> config::Overrides {
        config::Overrides {
            api_url: self.api_url.clone(),
            sso_url: self.sso_url.clone(),
            in_memory: self.in_memory,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let overrides = cli.overrides();
    if cli.print_config {
        let config = config::resolve(cli.config.as_deref(), &overrides)?;
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let config = config::load(cli.config.as_deref(), &overrides)?;
    tracing::debug!(api_url = %config.api_url, sso_url = %config.sso_url, "configuration loaded");

    let Some(command) = cli.command else {
        bail!("no command given; see --help");
    };

    let on_failure: FailureHook = Arc::new(|| {
        eprintln!("session expired, please log in again");
    });
    let session = SsoSession::from_config(&config, Some(on_failure))
        .context("failed to initialize session")?;

    match command {
        Commands::Login(login) => login.run(&session).await,
        Commands::Logout => {
            commands::logout(&session).await;
            Ok(())
        }
        Commands::Whoami => commands::whoami(&session),
        Commands::Get(get) => get.run(&session).await,
        Commands::Register(register) => register.run(&session).await,
    }
}
