//! Fehlertypen fuer Rundfunk
//!
//! Zentraler Fehler-Enum fuer die prozessuebergreifenden Bausteine (Relay,
//! Serialisierung, Konfiguration). Die Kanal-Engine definiert ihre eigenen,
//! clientsichtbaren Fehler.

use thiserror::Error;

/// Globaler Result-Alias fuer Rundfunk
pub type Result<T> = std::result::Result<T, RundfunkError>;

/// Alle moeglichen Fehler ausserhalb der Kanal-Engine
#[derive(Debug, Error)]
pub enum RundfunkError {
    // --- Relay ---
    #[error("Relay-Fehler: {0}")]
    Relay(String),

    // --- Serialisierung ---
    #[error("Serialisierung fehlgeschlagen: {0}")]
    Serialisierung(#[from] serde_json::Error),

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),
}

impl RundfunkError {
    /// Erstellt einen Relay-Fehler
    pub fn relay(msg: impl Into<String>) -> Self {
        Self::Relay(msg.into())
    }
}
