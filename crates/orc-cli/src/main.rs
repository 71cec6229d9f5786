mod cli;
mod commands;
mod config;
mod error;

use clap::Parser;
use cli::{Cli, Commands};
use commands::CommandHandler;
use error::CliError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let telemetry_config =
        orc_telemetry::TelemetryConfig { json_logs: cli.json_logs, ..orc_telemetry::TelemetryConfig::from_env() };
    orc_telemetry::init_logging(&telemetry_config)?;

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let app_config = config::load(cli.config)?;
    let handler = CommandHandler::new(&app_config)?;

    match cli.command {
        Commands::Deploy { deployment_id, image, domain, port, replicas } => {
            handler.deploy_image(deployment_id, image, domain, port, replicas).await
        }
        Commands::DeployCompose { deployment_id, compose_file, domain } => {
            handler.deploy_compose(deployment_id, compose_file, domain).await
        }
        Commands::Start { deployment_id } => handler.start(&deployment_id).await,
        Commands::Stop { deployment_id } => handler.stop(&deployment_id).await,
        Commands::Delete { deployment_id } => handler.delete(&deployment_id).await,
        Commands::Restart { deployment_id } => handler.restart(&deployment_id).await,
        Commands::Scale { deployment_id, replicas } => handler.scale(&deployment_id, replicas).await,
        Commands::StopCompose { deployment_id } => handler.stop_compose(&deployment_id).await,
        Commands::RemoveCompose { deployment_id } => handler.remove_compose(&deployment_id).await,
        Commands::Logs { deployment_id, tail } => handler.logs(&deployment_id, tail).await,
        Commands::Vm(vm_command) => handler.vm(vm_command).await,
    }
}
