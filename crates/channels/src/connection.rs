//! Verbindung – Kanal-Sicht auf eine einzelne Client-Verbindung
//!
//! Die `Verbindung` ist das Bindeglied zwischen Transport und Kanal-Engine.
//! Der Transport liest ausgehende Nachrichten aus der Send-Queue und meldet
//! eingehende Kanal-Aktionen sowie das Verbindungsende. Die Kanaele
//! installieren pro Abonnement genau zwei Handler:
//!
//! - einen Aktions-Handler auf dem Topic (Abmelden durch den Client)
//! - einen Trenn-Handler (Aufraeumen beim Verbindungsende)
//!
//! Beide Handler und der Eintrag in der Kanal-Liste der Verbindung werden
//! immer gemeinsam eingetragen und gemeinsam entfernt.

use parking_lot::Mutex;
use rundfunk_core::{PublishPaket, VerbindungsId};
use rundfunk_protocol::{KickOutFrame, PublishFrame, ServerNachricht};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::KanalResult;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Groesse der Send-Queue pro Verbindung
pub const SEND_QUEUE_GROESSE: usize = 64;

/// Handler fuer Kanal-Aktionen (Argument: Aktions-Tag)
pub type AktionsHandler = Arc<dyn Fn(&str) -> KanalResult<()> + Send + Sync>;

/// Handler der beim Verbindungsende aufgerufen wird
pub type TrennHandler = Arc<dyn Fn() + Send + Sync>;

// ---------------------------------------------------------------------------
// Verbindung
// ---------------------------------------------------------------------------

/// Eine verbundene Client-Verbindung aus Sicht der Kanaele
pub struct Verbindung {
    id: VerbindungsId,
    /// API-Level des Clients (fuer die Kanal-Aufloesung)
    api_level: Option<u32>,
    tx: mpsc::Sender<ServerNachricht>,
    inner: Mutex<VerbindungInner>,
}

#[derive(Default)]
struct VerbindungInner {
    /// Topic -> Aktions-Handler
    aktions_handler: HashMap<String, AktionsHandler>,
    /// Topic -> Trenn-Handler
    trenn_handler: HashMap<String, TrennHandler>,
    /// Topics aller Kanaele in denen diese Verbindung ist
    kanaele: Vec<String>,
    getrennt: bool,
}

impl Verbindung {
    /// Erstellt eine neue Verbindung und gibt ihre Empfangs-Queue zurueck
    ///
    /// Der Transport liest aus dieser Queue und schreibt auf den Socket.
    pub fn neu(api_level: Option<u32>) -> (Arc<Self>, mpsc::Receiver<ServerNachricht>) {
        let (tx, rx) = mpsc::channel(SEND_QUEUE_GROESSE);
        let verbindung = Arc::new(Self {
            id: VerbindungsId::new(),
            api_level,
            tx,
            inner: Mutex::new(VerbindungInner::default()),
        });
        (verbindung, rx)
    }

    pub fn id(&self) -> VerbindungsId {
        self.id
    }

    pub fn api_level(&self) -> Option<u32> {
        self.api_level
    }

    /// Sendet eine Nachricht nicht-blockierend an den Client
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist.
    pub fn senden(&self, nachricht: ServerNachricht) -> bool {
        match self.tx.try_send(nachricht) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(verbindung = %self.id, "Send-Queue voll – Nachricht verworfen");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(verbindung = %self.id, "Send-Queue geschlossen (Client getrennt)");
                false
            }
        }
    }

    /// Stellt ein Publish-Paket als Frame zu, ausser die Verbindung ist der Ursprung
    pub fn publish_zustellen(
        &self,
        topic: &str,
        mitglied: Option<&str>,
        paket: &PublishPaket,
    ) -> bool {
        if !paket.zustellen_an(&self.id) {
            return false;
        }
        self.senden(ServerNachricht::Publish(PublishFrame {
            topic: topic.to_string(),
            member: mitglied.map(str::to_string),
            event: paket.event.clone(),
            data: paket.data.clone(),
        }))
    }

    /// Sendet einen Rauswurf-Frame
    pub fn rauswurf_senden(
        &self,
        topic: &str,
        mitglied: Option<&str>,
        code: Option<u32>,
        data: Option<serde_json::Value>,
    ) -> bool {
        self.senden(ServerNachricht::KickOut(KickOutFrame {
            topic: topic.to_string(),
            member: mitglied.map(str::to_string),
            code,
            data,
        }))
    }

    // -----------------------------------------------------------------------
    // Abonnement-Buchhaltung (nur von Kanaelen aufgerufen)
    // -----------------------------------------------------------------------

    /// Traegt beide Handler und das Topic in die Kanal-Liste ein
    ///
    /// Gibt `false` zurueck wenn die Verbindung bereits getrennt ist; dann
    /// wird nichts eingetragen.
    pub(crate) fn abonnement_eintragen(
        &self,
        topic: &str,
        aktion: AktionsHandler,
        trennung: TrennHandler,
    ) -> bool {
        let mut inner = self.inner.lock();
        if inner.getrennt {
            return false;
        }
        inner.aktions_handler.insert(topic.to_string(), aktion);
        inner.trenn_handler.insert(topic.to_string(), trennung);
        if !inner.kanaele.iter().any(|t| t == topic) {
            inner.kanaele.push(topic.to_string());
        }
        true
    }

    /// Entfernt beide Handler und das Topic aus der Kanal-Liste
    pub(crate) fn abonnement_austragen(&self, topic: &str) -> bool {
        let mut inner = self.inner.lock();
        let aktion = inner.aktions_handler.remove(topic).is_some();
        let trennung = inner.trenn_handler.remove(topic).is_some();
        inner.kanaele.retain(|t| t != topic);
        aktion || trennung
    }

    // -----------------------------------------------------------------------
    // Transport-Seite
    // -----------------------------------------------------------------------

    /// Verarbeitet eine Kanal-Aktion des Clients
    ///
    /// Aktionen auf Topics ohne Abonnement werden ignoriert.
    pub fn aktion_verarbeiten(&self, topic: &str, aktion: &str) -> KanalResult<()> {
        let handler = self.inner.lock().aktions_handler.get(topic).cloned();
        match handler {
            Some(handler) => handler(aktion),
            None => {
                tracing::debug!(verbindung = %self.id, topic, aktion, "Aktion ohne Abonnement ignoriert");
                Ok(())
            }
        }
    }

    /// Meldet das Verbindungsende und ruft alle Trenn-Handler auf
    ///
    /// Mehrfache Aufrufe sind harmlos.
    pub fn trennen(&self) {
        let handler: Vec<TrennHandler> = {
            let mut inner = self.inner.lock();
            if inner.getrennt {
                return;
            }
            inner.getrennt = true;
            inner.trenn_handler.drain().map(|(_, h)| h).collect()
        };

        tracing::debug!(verbindung = %self.id, abonnements = handler.len(), "Verbindung getrennt – Abonnements werden aufgeraeumt");
        for h in handler {
            h();
        }
    }

    pub fn ist_getrennt(&self) -> bool {
        self.inner.lock().getrennt
    }

    /// Topics aller Kanaele in denen diese Verbindung gerade ist
    pub fn kanaele(&self) -> Vec<String> {
        self.inner.lock().kanaele.clone()
    }

    /// Anzahl installierter (Aktions-, Trenn-)Handler
    pub fn handler_anzahl(&self) -> (usize, usize) {
        let inner = self.inner.lock();
        (inner.aktions_handler.len(), inner.trenn_handler.len())
    }
}

impl std::fmt::Debug for Verbindung {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verbindung")
            .field("id", &self.id)
            .field("api_level", &self.api_level)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
