use campaign_ocr::config::{Args, Config};
use campaign_ocr::Extractor;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing; stdout carries the JSON result
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from(args);

    tracing::info!("Starting campaign-ocr v{}", env!("CARGO_PKG_VERSION"));

    let options = config.extract_options()?;
    let extractor = Extractor::from_config(&config)?;

    let bytes = tokio::fs::read(&config.image).await.map_err(|e| {
        anyhow::anyhow!("Failed to read {}: {}", config.image.display(), e)
    })?;
    tracing::info!(
        "Read {} ({} bytes)",
        config.image.display(),
        bytes.len()
    );

    let result = extractor.extract(&bytes, &options).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
