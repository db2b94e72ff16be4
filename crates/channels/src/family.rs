//! Kanal-Familie – viele Topics, unterschieden durch ein Mitglied
//!
//! Jedes Mitglied (z.B. ein Chatraum) hat eine eigene Abonnenten-Menge und
//! eine eigene, entprellte Relay-Registrierung. Zusaetzlich fuehrt die
//! Familie einen Rueckwaerts-Index Verbindung -> Mitglieder, ueber den die
//! maximale Mitgliederzahl pro Verbindung durchgesetzt wird.
//!
//! Invariante: `verbindungen[c]` enthaelt genau die Mitglieder `m`, fuer die
//! `mitglieder[m][c]` existiert. Beide Indizes werden nur gemeinsam unter
//! demselben Lock veraendert.

use parking_lot::Mutex;
use rundfunk_core::{PublishPaket, RelayRueckruf, RelayUmschlag, VerbindungsId};
use rundfunk_protocol::AKTION_ABMELDEN;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::access::{KanalInfo, MitgliedsPruefer, Offen, ZeichenMitgliedsPruefer, ZugriffsPruefer};
use crate::channel::KanalKontext;
use crate::connection::{AktionsHandler, TrennHandler, Verbindung};
use crate::error::{KanalFehler, KanalResult};
use crate::hooks::{Ausloeser, KanalHooks};
use crate::timer::AbmeldeTimer;
use crate::topic;

/// Standardwert fuer die maximale Anzahl Mitglieder pro Verbindung
pub const STANDARD_MAX_MITGLIEDER: usize = 20;

/// Optionen fuer eine Kanal-Familie
#[derive(Clone)]
pub struct FamilienOptionen {
    pub identifier: String,
    pub api_level: Option<u32>,
    pub zugriff: Arc<dyn ZugriffsPruefer>,
    pub mitglieds_pruefer: Arc<dyn MitgliedsPruefer>,
    pub hooks: KanalHooks,
    pub max_mitglieder_pro_verbindung: usize,
}

impl FamilienOptionen {
    pub fn neu(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            api_level: None,
            zugriff: Arc::new(Offen),
            mitglieds_pruefer: Arc::new(ZeichenMitgliedsPruefer::default()),
            hooks: KanalHooks::default(),
            max_mitglieder_pro_verbindung: STANDARD_MAX_MITGLIEDER,
        }
    }

    pub fn mit_api_level(mut self, api_level: u32) -> Self {
        self.api_level = Some(api_level);
        self
    }

    pub fn mit_zugriff(mut self, zugriff: Arc<dyn ZugriffsPruefer>) -> Self {
        self.zugriff = zugriff;
        self
    }

    pub fn mit_mitglieds_pruefer(mut self, pruefer: Arc<dyn MitgliedsPruefer>) -> Self {
        self.mitglieds_pruefer = pruefer;
        self
    }

    pub fn mit_hooks(mut self, hooks: KanalHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn mit_max_mitgliedern(mut self, max: usize) -> Self {
        self.max_mitglieder_pro_verbindung = max;
        self
    }
}

// ---------------------------------------------------------------------------
// KanalFamilie
// ---------------------------------------------------------------------------

/// Eine Familie von Kanaelen mit gemeinsamem Identifier
///
/// Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct KanalFamilie {
    inner: Arc<FamilieInner>,
}

struct FamilieInner {
    identifier: String,
    api_level: Option<u32>,
    praefix: String,
    kontext: KanalKontext,
    zugriff: Arc<dyn ZugriffsPruefer>,
    mitglieds_pruefer: Arc<dyn MitgliedsPruefer>,
    hooks: KanalHooks,
    max_mitglieder: usize,
    zustand: Mutex<FamilienZustand>,
}

#[derive(Default)]
struct FamilienZustand {
    /// Mitglied -> Abonnenten
    mitglieder: HashMap<String, HashMap<VerbindungsId, Arc<Verbindung>>>,
    /// Verbindung -> abonnierte Mitglieder
    verbindungen: HashMap<VerbindungsId, HashSet<String>>,
    /// Mitglieder deren Topic beim Relay beobachtet wird
    registriert: HashSet<String>,
    /// Ausstehende Abmelde-Timer pro Mitglied
    timer: HashMap<String, AbmeldeTimer>,
}

impl KanalFamilie {
    pub fn neu(optionen: FamilienOptionen, kontext: KanalKontext) -> Self {
        let praefix = topic::familien_praefix(&optionen.identifier, optionen.api_level);
        Self {
            inner: Arc::new(FamilieInner {
                identifier: optionen.identifier,
                api_level: optionen.api_level,
                praefix,
                kontext,
                zugriff: optionen.zugriff,
                mitglieds_pruefer: optionen.mitglieds_pruefer,
                hooks: optionen.hooks,
                max_mitglieder: optionen.max_mitglieder_pro_verbindung,
                zustand: Mutex::new(FamilienZustand::default()),
            }),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.inner.identifier
    }

    pub fn api_level(&self) -> Option<u32> {
        self.inner.api_level
    }

    /// Gemeinsamer Praefix aller Mitglieder-Topics, z.B. `#room.`
    pub fn topic_praefix(&self) -> &str {
        &self.inner.praefix
    }

    pub fn mitglied_topic(&self, mitglied: &str) -> String {
        self.inner.mitglied_topic(mitglied)
    }

    pub fn max_mitglieder_pro_verbindung(&self) -> usize {
        self.inner.max_mitglieder
    }

    /// Abonniert ein Mitglied der Familie und gibt dessen Topic zurueck
    ///
    /// Reihenfolge: Mitglied vorhanden, schon abonniert, Mitgliedspruefung,
    /// Zugriffspruefung, Mitglieder-Limit. Fehler veraendern nichts.
    pub async fn abonnieren(
        &self,
        verbindung: &Arc<Verbindung>,
        mitglied: Option<&str>,
    ) -> KanalResult<String> {
        let Some(mitglied) = mitglied else {
            return Err(KanalFehler::MitgliedFehlt(self.inner.identifier.clone()));
        };
        let topic = self.inner.mitglied_topic(mitglied);
        if self.ist_abonniert(mitglied, &verbindung.id()) {
            return Ok(topic);
        }

        if let Err(grund) = self.inner.mitglieds_pruefer.pruefen(mitglied).await {
            tracing::debug!(familie = %self.inner.identifier, mitglied, %grund, "Mitglied abgelehnt");
            return Err(KanalFehler::UngueltigesMitglied {
                mitglied: mitglied.to_string(),
                grund,
            });
        }

        let info = self.inner.info(mitglied);
        let erlaubt = match self.inner.zugriff.pruefen(verbindung, &info).await {
            Ok(erlaubt) => erlaubt,
            Err(e) => {
                tracing::warn!(topic = %topic, verbindung = %verbindung.id(), fehler = %e, "Zugriffspruefung fehlgeschlagen");
                false
            }
        };
        if !erlaubt {
            tracing::debug!(topic = %topic, verbindung = %verbindung.id(), "Zugriff verweigert");
            return Err(KanalFehler::ZugriffVerweigert(topic));
        }

        if self.inner.mitglied_hinzufuegen(verbindung, mitglied)? {
            self.inner.hooks.abonnement(&topic, verbindung, &info);
        }
        Ok(topic)
    }

    /// Veroeffentlicht ein Ereignis an alle Abonnenten eines Mitglieds
    pub fn veroeffentlichen(
        &self,
        mitglied: &str,
        event: impl Into<String>,
        data: Option<serde_json::Value>,
        origin: Option<VerbindungsId>,
    ) -> usize {
        let topic = self.inner.mitglied_topic(mitglied);
        let paket = PublishPaket::neu(event, data, origin);
        let zugestellt = self.inner.lokal_zustellen(mitglied, &paket);

        let umschlag = RelayUmschlag::neu(self.inner.kontext.prozess, paket);
        if let Err(e) = self.inner.kontext.relay.veroeffentlichen(&topic, &umschlag) {
            tracing::warn!(topic = %topic, fehler = %e, "Relay-Publish fehlgeschlagen");
        }

        self.inner
            .hooks
            .publish(&topic, &self.inner.info(mitglied), &umschlag.paket);
        zugestellt
    }

    /// Wirft eine Verbindung aus einem Mitglied
    pub fn rauswerfen(
        &self,
        mitglied: &str,
        verbindung: &VerbindungsId,
        code: Option<u32>,
        data: Option<serde_json::Value>,
    ) -> bool {
        self.inner
            .mitglied_entfernen(mitglied, verbindung, Ausloeser::Rauswurf, Some((code, data)))
    }

    /// Wirft alle Abonnenten eines Mitglieds raus
    pub fn schliessen(
        &self,
        mitglied: &str,
        code: Option<u32>,
        data: Option<serde_json::Value>,
    ) -> usize {
        let ids: Vec<VerbindungsId> = self
            .inner
            .zustand
            .lock()
            .mitglieder
            .get(mitglied)
            .map(|abonnenten| abonnenten.keys().copied().collect())
            .unwrap_or_default();
        ids.iter()
            .filter(|id| self.rauswerfen(mitglied, id, code, data.clone()))
            .count()
    }

    /// Alle Mitglieder die eine Verbindung abonniert hat (sortiert)
    pub fn abonnierte_mitglieder(&self, verbindung: &VerbindungsId) -> Vec<String> {
        let mut mitglieder: Vec<String> = self
            .inner
            .zustand
            .lock()
            .verbindungen
            .get(verbindung)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default();
        mitglieder.sort();
        mitglieder
    }

    /// Prueft den Zugriff fuer jedes Mitglied der Verbindung erneut
    ///
    /// Gibt die Anzahl der Rauswuerfe zurueck.
    pub async fn zugriff_neu_pruefen(&self, verbindung: &Arc<Verbindung>) -> usize {
        let mut rauswuerfe = 0;
        for mitglied in self.abonnierte_mitglieder(&verbindung.id()) {
            let erlaubt = self
                .inner
                .zugriff
                .pruefen(verbindung, &self.inner.info(&mitglied))
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(familie = %self.inner.identifier, mitglied = %mitglied, verbindung = %verbindung.id(), fehler = %e, "Zugriffspruefung fehlgeschlagen");
                    false
                });
            if !erlaubt && self.rauswerfen(&mitglied, &verbindung.id(), None, None) {
                rauswuerfe += 1;
            }
        }
        rauswuerfe
    }

    // -----------------------------------------------------------------------
    // Introspektion
    // -----------------------------------------------------------------------

    pub fn ist_abonniert(&self, mitglied: &str, verbindung: &VerbindungsId) -> bool {
        self.inner
            .zustand
            .lock()
            .mitglieder
            .get(mitglied)
            .is_some_and(|abonnenten| abonnenten.contains_key(verbindung))
    }

    pub fn mitglied_abonnenten_anzahl(&self, mitglied: &str) -> usize {
        self.inner
            .zustand
            .lock()
            .mitglieder
            .get(mitglied)
            .map_or(0, HashMap::len)
    }

    pub fn ist_mitglied_registriert(&self, mitglied: &str) -> bool {
        self.inner.zustand.lock().registriert.contains(mitglied)
    }

    /// Alle beim Relay registrierten Mitglieder (sortiert)
    pub fn registrierte_mitglieder(&self) -> Vec<String> {
        let mut mitglieder: Vec<String> =
            self.inner.zustand.lock().registriert.iter().cloned().collect();
        mitglieder.sort();
        mitglieder
    }

    pub fn abmeldung_ausstehend(&self, mitglied: &str) -> bool {
        self.inner
            .zustand
            .lock()
            .timer
            .get(mitglied)
            .is_some_and(AbmeldeTimer::ist_aktiv)
    }
}

impl std::fmt::Debug for KanalFamilie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KanalFamilie")
            .field("praefix", &self.inner.praefix)
            .field("max_mitglieder", &self.inner.max_mitglieder)
            .finish()
    }
}

impl FamilieInner {
    fn mitglied_topic(&self, mitglied: &str) -> String {
        topic::mitglied_topic(&self.praefix, mitglied)
    }

    fn info(&self, mitglied: &str) -> KanalInfo {
        KanalInfo {
            identifier: self.identifier.clone(),
            api_level: self.api_level,
            mitglied: Some(mitglied.to_string()),
        }
    }

    fn mitglied_hinzufuegen(
        self: &Arc<Self>,
        verbindung: &Arc<Verbindung>,
        mitglied: &str,
    ) -> KanalResult<bool> {
        let id = verbindung.id();
        let mut zustand = self.zustand.lock();
        if zustand
            .mitglieder
            .get(mitglied)
            .is_some_and(|abonnenten| abonnenten.contains_key(&id))
        {
            return Ok(false);
        }
        if zustand.verbindungen.get(&id).map_or(0, HashSet::len) >= self.max_mitglieder {
            return Err(KanalFehler::MaxMitgliederErreicht {
                max: self.max_mitglieder,
            });
        }

        let topic = self.mitglied_topic(mitglied);
        let aktion: AktionsHandler = {
            let familie = Arc::downgrade(self);
            let topic = topic.clone();
            let mitglied = mitglied.to_string();
            Arc::new(move |aktion: &str| {
                if aktion != AKTION_ABMELDEN {
                    return Err(KanalFehler::UnbekannteAktion {
                        topic: topic.clone(),
                        aktion: aktion.to_string(),
                    });
                }
                if let Some(familie) = familie.upgrade() {
                    familie.mitglied_entfernen(&mitglied, &id, Ausloeser::Abmeldung, None);
                }
                Ok(())
            })
        };
        let trennung: TrennHandler = {
            let familie = Arc::downgrade(self);
            let mitglied = mitglied.to_string();
            Arc::new(move || {
                if let Some(familie) = familie.upgrade() {
                    familie.mitglied_entfernen(&mitglied, &id, Ausloeser::Trennung, None);
                }
            })
        };
        if !verbindung.abonnement_eintragen(&topic, aktion, trennung) {
            return Err(KanalFehler::VerbindungGetrennt);
        }

        zustand
            .mitglieder
            .entry(mitglied.to_string())
            .or_default()
            .insert(id, Arc::clone(verbindung));
        zustand
            .verbindungen
            .entry(id)
            .or_default()
            .insert(mitglied.to_string());

        if zustand.registriert.contains(mitglied) {
            zustand.timer.remove(mitglied);
        } else {
            self.registrieren(&mut zustand, mitglied);
        }

        tracing::debug!(topic = %topic, verbindung = %id, "Mitglied abonniert");
        Ok(true)
    }

    fn mitglied_entfernen(
        self: &Arc<Self>,
        mitglied: &str,
        id: &VerbindungsId,
        ausloeser: Ausloeser,
        rauswurf: Option<(Option<u32>, Option<serde_json::Value>)>,
    ) -> bool {
        let topic = self.mitglied_topic(mitglied);
        let verbindung = {
            let mut zustand = self.zustand.lock();
            let Some(abonnenten) = zustand.mitglieder.get_mut(mitglied) else {
                return false;
            };
            let Some(verbindung) = abonnenten.remove(id) else {
                return false;
            };
            let leer = abonnenten.is_empty();
            if leer {
                zustand.mitglieder.remove(mitglied);
            }
            if let Some(mitglieder) = zustand.verbindungen.get_mut(id) {
                mitglieder.remove(mitglied);
                if mitglieder.is_empty() {
                    zustand.verbindungen.remove(id);
                }
            }

            if let Some((code, data)) = rauswurf {
                verbindung.rauswurf_senden(&topic, Some(mitglied), code, data);
            }
            verbindung.abonnement_austragen(&topic);
            if leer {
                self.abmeldung_planen(&mut zustand, mitglied);
            }
            verbindung
        };

        tracing::debug!(topic = %topic, verbindung = %id, %ausloeser, "Verbindung aus Mitglied entfernt");
        self.hooks
            .abmeldung(&topic, &verbindung, &self.info(mitglied), ausloeser);
        true
    }

    fn registrieren(self: &Arc<Self>, zustand: &mut FamilienZustand, mitglied: &str) {
        let topic = self.mitglied_topic(mitglied);
        let familie = Arc::downgrade(self);
        let eigener_prozess = self.kontext.prozess;
        let m = mitglied.to_string();
        let rueckruf: RelayRueckruf = Arc::new(move |umschlag: RelayUmschlag| {
            if umschlag.ist_echo_von(&eigener_prozess) {
                return;
            }
            if let Some(familie) = familie.upgrade() {
                familie.lokal_zustellen(&m, &umschlag.paket);
            }
        });

        if let Err(e) = self.kontext.relay.beobachten(&topic, rueckruf) {
            tracing::error!(topic = %topic, fehler = %e, "Relay-Beobachtung fehlgeschlagen");
            return;
        }
        zustand.registriert.insert(mitglied.to_string());
        tracing::debug!(topic = %topic, "Mitglied beim Relay registriert");
    }

    fn abmelden(&self, zustand: &mut FamilienZustand, mitglied: &str) {
        let topic = self.mitglied_topic(mitglied);
        self.kontext.relay.freigeben(&topic);
        zustand.registriert.remove(mitglied);
        tracing::debug!(topic = %topic, "Mitglied beim Relay abgemeldet");
    }

    fn abmeldung_planen(self: &Arc<Self>, zustand: &mut FamilienZustand, mitglied: &str) {
        let familie = Arc::downgrade(self);
        let m = mitglied.to_string();
        let geplant = zustand
            .timer
            .entry(mitglied.to_string())
            .or_default()
            .planen(self.kontext.entprellung, move |generation| {
                if let Some(familie) = familie.upgrade() {
                    familie.timer_abgelaufen(&m, generation);
                }
            });
        if !geplant {
            zustand.timer.remove(mitglied);
            self.abmelden(zustand, mitglied);
        }
    }

    fn timer_abgelaufen(&self, mitglied: &str, generation: u64) {
        let mut zustand = self.zustand.lock();
        let Some(timer) = zustand.timer.get_mut(mitglied) else {
            return;
        };
        if !timer.abgelaufen(generation) {
            return;
        }
        zustand.timer.remove(mitglied);
        if zustand.mitglieder.contains_key(mitglied) {
            return;
        }
        if zustand.registriert.contains(mitglied) {
            self.abmelden(&mut zustand, mitglied);
        }
    }

    fn lokal_zustellen(&self, mitglied: &str, paket: &PublishPaket) -> usize {
        let empfaenger: Vec<Arc<Verbindung>> = self
            .zustand
            .lock()
            .mitglieder
            .get(mitglied)
            .map(|abonnenten| abonnenten.values().cloned().collect())
            .unwrap_or_default();
        if empfaenger.is_empty() {
            return 0;
        }
        let topic = self.mitglied_topic(mitglied);
        empfaenger
            .iter()
            .filter(|v| v.publish_zustellen(&topic, Some(mitglied), paket))
            .count()
    }
}

impl Drop for FamilieInner {
    fn drop(&mut self) {
        for mitglied in self.zustand.get_mut().registriert.drain() {
            self.kontext
                .relay
                .freigeben(&topic::mitglied_topic(&self.praefix, &mitglied));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
