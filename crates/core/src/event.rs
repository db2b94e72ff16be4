//! Publish-Pakete und Relay-Vertrag
//!
//! Definiert was ueber das clusterweite Relay fliesst und die Schnittstelle,
//! ueber die Kanaele ein Relay-Topic beobachten und beschicken.
//! Die In-Prozess-Implementierung lebt in der Kanal-Engine; bei
//! Multi-Instance-Betrieb kann sie durch NATS oder PG NOTIFY ersetzt werden.

use crate::types::{ProzessId, VerbindungsId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Ein veroeffentlichtes Ereignis
///
/// `origin` heisst: nicht an die Verbindung zurueckliefern, die das
/// Publish ausgeloest hat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishPaket {
    /// Ereignisname
    pub event: String,
    /// Optionale Nutzdaten
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Verbindung die nichts zugestellt bekommen soll
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<VerbindungsId>,
}

impl PublishPaket {
    /// Erstellt ein neues Publish-Paket
    pub fn neu(
        event: impl Into<String>,
        data: Option<serde_json::Value>,
        origin: Option<VerbindungsId>,
    ) -> Self {
        Self {
            event: event.into(),
            data,
            origin,
        }
    }

    /// Prueft ob dieses Paket an die gegebene Verbindung zugestellt werden darf
    pub fn zustellen_an(&self, verbindung: &VerbindungsId) -> bool {
        self.origin.as_ref() != Some(verbindung)
    }
}

/// Was tatsaechlich ueber das Relay gesendet wird
///
/// Die Prozess-ID erlaubt jedem Prozess, sein eigenes Echo von einem
/// echten entfernten Publish zu unterscheiden.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayUmschlag {
    pub origin_prozess: ProzessId,
    pub paket: PublishPaket,
}

impl RelayUmschlag {
    pub fn neu(origin_prozess: ProzessId, paket: PublishPaket) -> Self {
        Self {
            origin_prozess,
            paket,
        }
    }

    /// Gibt true zurueck wenn der Umschlag vom gegebenen Prozess stammt
    pub fn ist_echo_von(&self, prozess: &ProzessId) -> bool {
        &self.origin_prozess == prozess
    }
}

/// Rueckruf fuer eingehende Umschlaege eines beobachteten Topics
pub type RelayRueckruf = Arc<dyn Fn(RelayUmschlag) + Send + Sync>;

/// Clusterweites Pub/Sub nach String-Topic
///
/// Ein Publish erreicht jeden Prozess (auch den eigenen), der das Topic
/// gerade beobachtet. Pro Prozess und Topic gibt es hoechstens eine
/// Beobachtung; erneutes `beobachten` ersetzt den Rueckruf.
pub trait Relay: Send + Sync + 'static {
    /// Beginnt das Topic zu beobachten
    fn beobachten(&self, topic: &str, rueckruf: RelayRueckruf) -> crate::Result<()>;

    /// Sendet einen Umschlag an alle Beobachter des Topics im Cluster
    fn veroeffentlichen(&self, topic: &str, umschlag: &RelayUmschlag) -> crate::Result<()>;

    /// Beendet die Beobachtung und gibt die Relay-seitige Ressource frei
    fn freigeben(&self, topic: &str);
}
