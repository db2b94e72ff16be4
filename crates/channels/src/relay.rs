//! In-Prozess-Relay
//!
//! Der `RelayHub` spielt das clusterweite Pub/Sub nach. Jeder Prozess (bzw.
//! jede Registry in Tests) bekommt einen eigenen `LokalerRelay`-Knoten.
//! Ein Publish erreicht jeden Knoten, der das Topic gerade beobachtet, auch
//! den veroeffentlichenden selbst.
//!
//! Umschlaege werden wie auf einem echten Bus als JSON serialisiert und pro
//! Empfaenger neu dekodiert. Rueckrufe laufen synchron, aber nie waehrend
//! ein Lock des Hubs gehalten wird.

use dashmap::DashMap;
use rundfunk_core::{Relay, RelayRueckruf, RelayUmschlag, RundfunkError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Gemeinsamer Bus aller Knoten
///
/// Clone teilt den inneren Zustand.
#[derive(Clone, Default)]
pub struct RelayHub {
    inner: Arc<RelayHubInner>,
}

#[derive(Default)]
struct RelayHubInner {
    /// Topic -> (Knoten-ID -> Rueckruf)
    beobachter: DashMap<String, HashMap<u64, RelayRueckruf>>,
    naechster_knoten: AtomicU64,
    /// Simuliert einen nicht erreichbaren Bus
    unterbrochen: AtomicBool,
}

impl RelayHub {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Erstellt einen neuen Knoten (einen "Prozess") am Hub
    pub fn knoten(&self) -> LokalerRelay {
        let knoten_id = self.inner.naechster_knoten.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(knoten_id, "Relay-Knoten angelegt");
        LokalerRelay {
            hub: self.clone(),
            knoten_id,
        }
    }

    /// Unterbricht den Bus: `beobachten` und `veroeffentlichen` schlagen
    /// fehl bis `fortsetzen` aufgerufen wird
    pub fn unterbrechen(&self) {
        self.inner.unterbrochen.store(true, Ordering::SeqCst);
        tracing::warn!("Relay-Hub unterbrochen");
    }

    pub fn fortsetzen(&self) {
        self.inner.unterbrochen.store(false, Ordering::SeqCst);
        tracing::info!("Relay-Hub wieder erreichbar");
    }

    fn erreichbar(&self) -> rundfunk_core::Result<()> {
        if self.inner.unterbrochen.load(Ordering::SeqCst) {
            return Err(RundfunkError::relay("Hub nicht erreichbar"));
        }
        Ok(())
    }

    /// Ob irgendein Knoten das Topic beobachtet
    pub fn ist_beobachtet(&self, topic: &str) -> bool {
        self.inner
            .beobachter
            .get(topic)
            .is_some_and(|knoten| !knoten.is_empty())
    }

    /// Anzahl Knoten die das Topic beobachten
    pub fn beobachter_anzahl(&self, topic: &str) -> usize {
        self.inner.beobachter.get(topic).map_or(0, |k| k.len())
    }

    /// Alle beobachteten Topics (sortiert)
    pub fn beobachtete_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .inner
            .beobachter
            .iter()
            .filter(|e| !e.value().is_empty())
            .map(|e| e.key().clone())
            .collect();
        topics.sort();
        topics
    }
}

impl std::fmt::Debug for RelayHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayHub")
            .field("topics", &self.inner.beobachter.len())
            .finish()
    }
}

/// Ein Knoten am `RelayHub`
#[derive(Debug)]
pub struct LokalerRelay {
    hub: RelayHub,
    knoten_id: u64,
}

impl LokalerRelay {
    pub fn knoten_id(&self) -> u64 {
        self.knoten_id
    }
}

impl Relay for LokalerRelay {
    fn beobachten(&self, topic: &str, rueckruf: RelayRueckruf) -> rundfunk_core::Result<()> {
        self.hub.erreichbar()?;
        self.hub
            .inner
            .beobachter
            .entry(topic.to_string())
            .or_default()
            .insert(self.knoten_id, rueckruf);
        tracing::trace!(knoten_id = self.knoten_id, topic, "Relay-Topic beobachtet");
        Ok(())
    }

    fn veroeffentlichen(&self, topic: &str, umschlag: &RelayUmschlag) -> rundfunk_core::Result<()> {
        self.hub.erreichbar()?;
        let bytes = serde_json::to_vec(umschlag)?;
        let rueckrufe: Vec<RelayRueckruf> = self
            .hub
            .inner
            .beobachter
            .get(topic)
            .map(|knoten| knoten.values().cloned().collect())
            .unwrap_or_default();

        tracing::trace!(knoten_id = self.knoten_id, topic, empfaenger = rueckrufe.len(), "Relay-Publish");
        for rueckruf in rueckrufe {
            let kopie: RelayUmschlag = serde_json::from_slice(&bytes)?;
            rueckruf(kopie);
        }
        Ok(())
    }

    fn freigeben(&self, topic: &str) {
        if let Some(mut knoten) = self.hub.inner.beobachter.get_mut(topic) {
            knoten.remove(&self.knoten_id);
        }
        self.hub
            .inner
            .beobachter
            .remove_if(topic, |_, knoten| knoten.is_empty());
        tracing::trace!(knoten_id = self.knoten_id, topic, "Relay-Topic freigegeben");
    }
}

impl Drop for LokalerRelay {
    fn drop(&mut self) {
        let id = self.knoten_id;
        self.hub.inner.beobachter.retain(|_, knoten| {
            knoten.remove(&id);
            !knoten.is_empty()
        });
    }
}
