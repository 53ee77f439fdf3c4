use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use wminfo_lib::cli::{Cli, Commands};
use wminfo_lib::{config, logging, render};
use wminfo_vsphere::{CancelSignal, InventoryConfig, InventoryService, VsphereClient};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = config::load(&cli)?;
    logging::init(config.debug);
    log::debug!("{config:?}");

    let (handle, cancel) = CancelSignal::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, abandoning the report");
            handle.cancel();
        }
    });

    let endpoint = config.endpoint()?;
    let timeout = Duration::from_secs(config.timeout_secs);
    let client = cancel
        .guard("Connect", VsphereClient::connect(endpoint, timeout))
        .await
        .context("Error connecting to the service")?;
    log::info!("Connected as {}", client.user().unwrap_or("<anonymous>"));

    let service = InventoryService::from_config(client, &config).with_cancel(cancel.clone());
    let outcome = dispatch(&service, &cli.command, &config, &cancel).await;

    let mut client = service.into_session();
    client.logout().await;
    outcome
}

async fn dispatch(
    service: &InventoryService<VsphereClient>,
    command: &Commands,
    config: &InventoryConfig,
    cancel: &CancelSignal,
) -> Result<()> {
    let text = match command {
        Commands::Info { pattern } => render::info(&service.info(pattern.as_deref()).await?),
        Commands::Ds { pattern } => render::datastores(&service.datastores(pattern.as_deref()).await?),
        Commands::Net { pattern } => render::networks(&service.networks(pattern.as_deref()).await?),
        Commands::Vms { pattern } => render::vms(&service.vms(pattern.as_deref()).await?),
        Commands::Show { selector } => {
            let report = service.show(Some(selector.as_str())).await?;
            print!("{}", render::detail(&report, config.console_wait_secs));

            let wait = config.console_wait_secs;
            if wait > 0 && report.details.iter().any(|d| d.console.is_ok()) {
                println!("Waiting for {wait} seconds, then exit");
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(wait)) => {}
                    _ = cancel.cancelled() => {}
                }
            }
            return Ok(());
        }
    };
    print!("{text}");
    Ok(())
}
