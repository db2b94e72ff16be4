//! rundfunk-channels – Kanal-Abonnements und Fan-out
//!
//! Dieser Crate implementiert die Kanal-Engine von Rundfunk: Clients
//! abonnieren benannte Kanaele (optional mit Mitglied bei Kanal-Familien),
//! der Server veroeffentlicht Ereignisse, und jede abonnierte Verbindung im
//! Cluster bekommt sie genau einmal.
//!
//! ## Architektur
//!
//! ```text
//! TCP Listener (KanalServer)
//!     |
//!     v
//! ClientSitzung (pro Verbindung ein Task, haelt eine Verbindung)
//!     |
//!     v
//! NachrichtenDispatcher
//!     |
//!     v
//! KanalRegistry  (Identifier x API-Level -> Instanz)
//!     |
//!     +-- Kanal          ein Topic, eine Abonnenten-Menge
//!     +-- KanalFamilie   ein Topic pro Mitglied
//!            |
//!            v
//!         Relay (clusterweites Pub/Sub, mit Echo-Unterdrueckung)
//! ```
//!
//! Veroeffentlichen stellt zuerst synchron an lokale Abonnenten zu und
//! schickt dann einen Umschlag mit der eigenen Prozess-ID ueber das Relay.
//! Andere Prozesse stellen ihn an ihre Abonnenten zu, der eigene verwirft
//! sein Echo.

pub mod access;
pub mod channel;
pub mod connection;
pub mod container;
pub mod dispatcher;
pub mod error;
pub mod family;
pub mod hooks;
pub mod registry;
pub mod relay;
pub mod session;
pub mod tcp;
pub mod topic;

mod timer;

// Bequeme Re-Exporte
pub use access::{
    zugriff_fn, GecachterMitgliedsPruefer, Gesperrt, JedesMitglied, KanalInfo, MitgliedsPruefer,
    Offen, ZeichenMitgliedsPruefer, ZugriffsPruefer,
};
pub use channel::{Kanal, KanalKontext, KanalOptionen};
pub use connection::Verbindung;
pub use container::{FamilienContainer, KanalContainer};
pub use dispatcher::NachrichtenDispatcher;
pub use error::{KanalFehler, KanalResult};
pub use family::{FamilienOptionen, KanalFamilie};
pub use hooks::{Ausloeser, KanalHooks};
pub use registry::{KanalInstanz, KanalRegistry};
pub use relay::{LokalerRelay, RelayHub};
pub use session::ClientSitzung;
pub use tcp::KanalServer;
