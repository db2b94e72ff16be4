//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `RF_LOG_LEVEL`: Filter-Direktive (z.B. `info` oder `rundfunk_channels=debug`),
//!   Standard: Wert aus der Konfiguration
//! - `RF_LOG_FORMAT`: Format (text/json), Standard: Wert aus der Konfiguration
//!
//! Umgebungsvariablen haben Vorrang vor der Konfigurationsdatei.

use tracing_subscriber::{fmt, EnvFilter};

pub const ENV_LOG_LEVEL: &str = "RF_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "RF_LOG_FORMAT";

/// Ausgabeformat der Log-Zeilen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// Parst `text` oder `json`; alles andere ist `None`
    pub fn parsen(format: &str) -> Option<Self> {
        match format {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// `true` wenn `self` nur als Ersatz fuer einen unbekannten Wert dient
    fn ist_ersatz_fuer(self, angefordert: &str) -> bool {
        self == LogFormat::Text && angefordert != "text"
    }
}

/// Initialisiert das Logging-System.
///
/// Liest `RF_LOG_LEVEL` und `RF_LOG_FORMAT` aus der Umgebung und faellt
/// auf `level` / `format` zurueck. Ungueltige Werte werden durch `info`
/// bzw. `text` ersetzt. Schlaegt fehl wenn bereits ein globaler
/// Subscriber gesetzt ist.
pub fn logging_initialisieren(level: &str, format: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env(ENV_LOG_LEVEL)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format_wert = env_oder(ENV_LOG_FORMAT, format);
    let log_format = LogFormat::parsen(&format_wert).unwrap_or(LogFormat::Text);

    let ergebnis = match log_format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init(),
        LogFormat::Text => fmt().with_env_filter(filter).with_target(true).try_init(),
    };
    ergebnis.map_err(|e| anyhow::anyhow!("Logging bereits initialisiert: {e}"))?;

    if log_format.ist_ersatz_fuer(&format_wert) {
        tracing::warn!(format = %format_wert, "Unbekanntes Log-Format, verwende text");
    }
    Ok(())
}

/// Liest eine Umgebungsvariable, mit Fallback
fn env_oder(name: &str, fallback: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| fallback.to_string())
}

/// Prueft ob `level` eine gueltige Filter-Direktive ist
/// (z.B. `info` oder `rundfunk_channels=debug,warn`)
pub fn log_filter_gueltig(level: &str) -> bool {
    !level.trim().is_empty() && EnvFilter::try_new(level).is_ok()
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    LogFormat::parsen(format).is_some()
}
