use std::sync::Arc;

use argh::FromArgs;
use miette::{IntoDiagnostic, WrapErr};
use tracing::info;

use vkcraft::database::SqlStore;
use vkcraft::{Config, Vkcraft};

/// VK bot that hands out one-time Minecraft rewards.
#[derive(Debug, FromArgs)]
struct Opts {
    /// path to config file
    #[argh(option, default = "String::from(\"config.toml\")")]
    config_path: String,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    // Parse command-line arguments
    let opts: Opts = argh::from_env();

    let config = Config::load(&opts.config_path)
        .into_diagnostic()
        .wrap_err_with(|| format!("could not load config file {}", opts.config_path))?;

    config.validate()?;

    vkcraft::tracing::try_init(&config.tracing)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "{} starting",
        env!("CARGO_PKG_NAME")
    );

    let store = SqlStore::connect(&config.database, config.sql.clone())?;
    let bot = Vkcraft::new(config, Arc::new(store))?;

    tokio::select! {
        result = bot.run() => result.wrap_err("bot stopped")?,
        _ = tokio::signal::ctrl_c() => info!("interrupted, shutting down"),
    }

    Ok(())
}
