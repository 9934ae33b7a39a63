//! Funkbruecke Server – Einstiegspunkt

use anyhow::{Context, Result};
use funkbruecke_server::{config::ServerConfig, logging, Server};

/// Umgebungsvariable mit dem Pfad der Konfigurationsdatei
const CONFIG_VARIABLE: &str = "FUNKBRUECKE_CONFIG";

#[tokio::main]
async fn main() -> Result<()> {
    let config_pfad = std::env::var(CONFIG_VARIABLE).unwrap_or_else(|_| "config.toml".into());
    let config = ServerConfig::laden(&config_pfad)
        .with_context(|| format!("Konfiguration {config_pfad} nicht nutzbar"))?;

    logging::initialisieren(&config.logging);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        codec = ?config.audio.codec,
        "Funkbruecke Server wird initialisiert"
    );

    Server::neu(config)?.starten().await
}
