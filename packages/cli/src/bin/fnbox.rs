use clap::Parser;
use colored::*;
use fnbox_api::{build_store, AppState};
use fnbox_cli::cli::{Cli, Commands};
use fnbox_cli::{commands, init_tracing, run_server};
use fnbox_config::GatewayConfig;
use std::process;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    match handle_command(cli.command).await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            process::exit(1);
        }
    }
}

/// Returns `false` when the command ran but the invocation failed
async fn handle_command(command: Commands) -> anyhow::Result<bool> {
    let mut config = GatewayConfig::from_env()?;

    match command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            run_server(config).await?;
        }
        Commands::Invoke { key } => {
            let state = AppState::from_config(config).await;
            let report = commands::invoke(&state, &key).await?;
            return Ok(report.result.outcome.is_success());
        }
        Commands::Upload { path, key } => {
            let state = store_only(config).await;
            commands::upload(&state, &path, key).await?;
        }
        Commands::List => {
            let state = store_only(config).await;
            commands::list(&state).await?;
        }
        Commands::Sweep => commands::sweep(&config).await?,
    }
    Ok(true)
}

/// State without a sandbox runner, for commands that only touch the store
async fn store_only(config: GatewayConfig) -> AppState {
    let store = build_store(&config.store).await;
    AppState::new(config, store, None)
}
