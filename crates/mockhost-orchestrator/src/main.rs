use mockhost_client::{HttpHealthProbe, HttpImportClientFactory};
use mockhost_orchestrator::{
    OrchestratorConfig, PollingResourceNotifier, ProvisioningOrchestrator, TopologyFile,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(
            EnvFilter::try_from_env("MOCKHOST_LOG")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("mockhost_orchestrator=info,info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = OrchestratorConfig::from_env()?;
    info!(
        topology = %config.topology_path.display(),
        mode = ?config.mode,
        app_root = %config.app_root.display(),
        "Starting mockhost provisioning"
    );

    let topology = TopologyFile::load(&config.topology_path)?.into_topology(&config.app_root)?;

    let probe = Arc::new(HttpHealthProbe::new(
        config.health_path.clone(),
        config.request_timeout,
    )?);
    let notifier = Arc::new(PollingResourceNotifier::from_topology(
        &topology,
        probe,
        config.health_poll_interval,
    ));
    let clients = Arc::new(HttpImportClientFactory::new(config.request_timeout));
    let orchestrator = ProvisioningOrchestrator::new(config.mode, notifier, clients)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupt received, cancelling provisioning");
                    cancel.cancel();
                }
                Err(e) => warn!(error = %e, "Failed to listen for interrupt signal"),
            }
        });
    }

    let report = orchestrator.run(&topology, cancel).await;
    for (instance, outcome) in &report.outcomes {
        if outcome.is_failure() {
            error!(instance = %instance, outcome = %outcome, "Instance not provisioned");
        } else {
            info!(instance = %instance, outcome = %outcome, "Instance finished");
        }
    }

    match orchestrator.observability().render_metrics() {
        Ok(metrics) => debug!(metrics = %metrics, "Provisioning metrics"),
        Err(e) => warn!(error = %e, "Failed to render metrics"),
    }
    orchestrator.shutdown();

    if report.has_failures() {
        return Err(format!(
            "{} of {} instances failed to provision",
            report.outcomes.values().filter(|o| o.is_failure()).count(),
            report.outcomes.len()
        )
        .into());
    }
    Ok(())
}
