use anyhow::Result;
use users_api_server::config::ServerConfig;
use users_api_server::server::{init_tracing, run_server};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::from_env()?;
    init_tracing(&config);
    run_server(config, None).await
}
