use clap::Parser;
use docserve::config::{Args, Config};
use docserve::server::Server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let args = Args::parse();
    let cfg = Config::from_args(&args)?;
    let server = Server::bind(&cfg).await?;

    server
        .run_until(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Shutdown signal received"),
                Err(e) => {
                    tracing::error!(error = %e, "Unable to listen for shutdown signal");
                    std::future::pending::<()>().await;
                }
            }
        })
        .await?;

    Ok(())
}
