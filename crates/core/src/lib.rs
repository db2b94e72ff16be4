//! rundfunk-core – Gemeinsame Typen, Relay-Vertrag und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Rundfunk-Crates gemeinsam genutzt werden: Identifikationstypen,
//! das Publish-Paket samt Relay-Umschlag und den Vertrag des clusterweiten
//! Relays.

pub mod error;
pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{Result, RundfunkError};
pub use event::{PublishPaket, Relay, RelayRueckruf, RelayUmschlag};
pub use types::{ProzessId, VerbindungsId};
