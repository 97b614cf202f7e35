use gridsql::config::ServerConfig;
use gridsql::network::Server;
use gridsql::operation::IdleReaper;
use gridsql::service::{QueryService, SimpleCompiler};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = ServerConfig::from_env();
    info!(
        host = %config.host,
        port = config.port,
        idle_timeout_ms = config.service.idle_operation_timeout_ms,
        long_poll_ms = config.service.long_poll_timeout_ms,
        workers = config.service.worker_pool_size,
        "starting gridsql server"
    );

    let service = Arc::new(QueryService::new(
        config.service.clone(),
        Arc::new(SimpleCompiler::new()),
    ));

    let _reaper = IdleReaper::spawn(
        Arc::clone(service.registry()),
        Duration::from_millis(config.service.reaper_period_ms),
    );

    let server = Server::new(Arc::clone(&service));
    server.start(&config.bind_addr()).await?;
    Ok(())
}
