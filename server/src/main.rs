//! Rundfunk Server – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den Server.

use anyhow::Result;
use rundfunk_observability::logging_initialisieren;
use rundfunk_server::{config::ServerConfig, Server};

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("RUNDFUNK_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let datei_vorhanden = std::path::Path::new(&config_pfad).exists();

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let config = ServerConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format)?;
    if !datei_vorhanden {
        tracing::warn!(pfad = %config_pfad, "Keine Konfigurationsdatei, Standardwerte aktiv");
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "Rundfunk Server wird initialisiert"
    );

    let server = Server::neu(config)?;
    server.starten().await?;

    Ok(())
}
