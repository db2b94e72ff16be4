//! Gemeinsame Identifikationstypen fuer Rundfunk
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! Verbindungs- und Prozess-IDs zur Compilezeit auszuschliessen.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Eindeutige ID einer Client-Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerbindungsId(pub Uuid);

impl VerbindungsId {
    /// Erstellt eine neue zufaellige VerbindungsId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for VerbindungsId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for VerbindungsId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "verbindung:{}", self.0)
    }
}

/// Eindeutige ID eines Server-Prozesses im Cluster
///
/// Wird einmal beim Start erzeugt und in jeden Relay-Umschlag geschrieben,
/// damit ein Prozess sein eigenes Echo erkennt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProzessId(pub Uuid);

impl ProzessId {
    /// Erstellt eine neue zufaellige ProzessId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProzessId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ProzessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "prozess:{}", self.0)
    }
}
