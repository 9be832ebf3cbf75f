use node_fog::client::{ClientConfig, FogClient};
use node_fog::transport::HttpTransport;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ClientConfig::from_args(std::env::args().skip(1))?;
    let flow = FogClient::load_flow(&config.file)?;

    tracing::info!("Submitting {} to {}", config.file.display(), config.entry);

    let mut client = FogClient::new(
        Arc::new(HttpTransport::new()),
        config.entry.clone(),
        config.poll_period,
    );
    let results = client.run(flow).await?;

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
