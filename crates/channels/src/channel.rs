//! Kanal – ein einzelnes Fan-out-Topic ohne Mitglied
//!
//! Ein Kanal haelt die lokalen Abonnenten und ist beim Relay registriert,
//! solange er Abonnenten hat. Nach dem letzten Abonnenten laeuft ein
//! Entprell-Timer; erst wenn der ohne neuen Abonnenten ablaeuft, wird die
//! Relay-Beobachtung freigegeben.
//!
//! ## Locking
//! Pro Kanal gibt es genau ein `parking_lot::Mutex`. Es wird nie ueber ein
//! `.await` und nie waehrend eines Hooks gehalten. Reihenfolge immer
//! Kanal -> Verbindung.

use parking_lot::Mutex;
use rundfunk_core::{ProzessId, PublishPaket, Relay, RelayRueckruf, RelayUmschlag, VerbindungsId};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::access::{KanalInfo, Offen, ZugriffsPruefer};
use crate::connection::{AktionsHandler, TrennHandler, Verbindung};
use crate::error::{KanalFehler, KanalResult};
use crate::hooks::{Ausloeser, KanalHooks};
use crate::timer::AbmeldeTimer;
use crate::topic;
use rundfunk_protocol::AKTION_ABMELDEN;

// ---------------------------------------------------------------------------
// Gemeinsamer Kontext
// ---------------------------------------------------------------------------

/// Standard-Wartezeit bevor ein leerer Kanal beim Relay abgemeldet wird
pub const STANDARD_ENTPRELLUNG: Duration = Duration::from_secs(5);

/// Was alle Kanaele eines Prozesses teilen
#[derive(Clone)]
pub struct KanalKontext {
    /// Identitaet dieses Prozesses im Cluster (fuer die Echo-Unterdrueckung)
    pub prozess: ProzessId,
    pub relay: Arc<dyn Relay>,
    /// Wartezeit zwischen letztem Abonnenten und Relay-Abmeldung
    pub entprellung: Duration,
}

impl KanalKontext {
    pub fn neu(prozess: ProzessId, relay: Arc<dyn Relay>) -> Self {
        Self {
            prozess,
            relay,
            entprellung: STANDARD_ENTPRELLUNG,
        }
    }

    pub fn mit_entprellung(mut self, entprellung: Duration) -> Self {
        self.entprellung = entprellung;
        self
    }
}

/// Optionen fuer einen einfachen Kanal
#[derive(Clone)]
pub struct KanalOptionen {
    pub identifier: String,
    pub api_level: Option<u32>,
    pub zugriff: Arc<dyn ZugriffsPruefer>,
    pub hooks: KanalHooks,
}

impl KanalOptionen {
    /// Offener Kanal ohne API-Level und ohne Hooks
    pub fn neu(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            api_level: None,
            zugriff: Arc::new(Offen),
            hooks: KanalHooks::default(),
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

    pub fn mit_hooks(mut self, hooks: KanalHooks) -> Self {
        self.hooks = hooks;
        self
    }
}

// ---------------------------------------------------------------------------
// Kanal
// ---------------------------------------------------------------------------

/// Ein einfacher Kanal (ein Topic, eine Abonnenten-Menge)
///
/// Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct Kanal {
    inner: Arc<KanalInner>,
}

struct KanalInner {
    identifier: String,
    api_level: Option<u32>,
    topic: String,
    kontext: KanalKontext,
    zugriff: Arc<dyn ZugriffsPruefer>,
    hooks: KanalHooks,
    zustand: Mutex<KanalZustand>,
}

#[derive(Default)]
struct KanalZustand {
    abonnenten: HashMap<VerbindungsId, Arc<Verbindung>>,
    registriert: bool,
    timer: AbmeldeTimer,
}

impl Kanal {
    pub fn neu(optionen: KanalOptionen, kontext: KanalKontext) -> Self {
        let topic = topic::kanal_topic(&optionen.identifier, optionen.api_level);
        Self {
            inner: Arc::new(KanalInner {
                identifier: optionen.identifier,
                api_level: optionen.api_level,
                topic,
                kontext,
                zugriff: optionen.zugriff,
                hooks: optionen.hooks,
                zustand: Mutex::new(KanalZustand::default()),
            }),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.inner.identifier
    }

    pub fn api_level(&self) -> Option<u32> {
        self.inner.api_level
    }

    pub fn topic(&self) -> &str {
        &self.inner.topic
    }

    pub fn info(&self) -> KanalInfo {
        self.inner.info()
    }

    /// Abonniert den Kanal und gibt das Topic zurueck
    ///
    /// Ist die Verbindung schon Abonnent, wird ohne Zugriffspruefung das
    /// Topic zurueckgegeben. Schlaegt etwas fehl, bleibt der Zustand
    /// unveraendert.
    pub async fn abonnieren(
        &self,
        verbindung: &Arc<Verbindung>,
        mitglied: Option<&str>,
    ) -> KanalResult<String> {
        if mitglied.is_some() {
            return Err(KanalFehler::UnnoetigesMitglied(self.inner.identifier.clone()));
        }
        if self.ist_abonniert(&verbindung.id()) {
            return Ok(self.inner.topic.clone());
        }

        let info = self.inner.info();
        let erlaubt = match self.inner.zugriff.pruefen(verbindung, &info).await {
            Ok(erlaubt) => erlaubt,
            Err(e) => {
                tracing::warn!(topic = %self.inner.topic, verbindung = %verbindung.id(), fehler = %e, "Zugriffspruefung fehlgeschlagen");
                false
            }
        };
        if !erlaubt {
            tracing::debug!(topic = %self.inner.topic, verbindung = %verbindung.id(), "Zugriff verweigert");
            return Err(KanalFehler::ZugriffVerweigert(self.inner.topic.clone()));
        }

        // Nach dem await erneut pruefen; ein paralleles Abonnement kann
        // inzwischen eingetragen sein
        if self.inner.verbindung_hinzufuegen(verbindung)? {
            self.inner.hooks.abonnement(&self.inner.topic, verbindung, &info);
        }
        Ok(self.inner.topic.clone())
    }

    /// Veroeffentlicht ein Ereignis lokal und ueber das Relay
    ///
    /// Lokale Abonnenten sind zugestellt bevor die Funktion zurueckkehrt.
    /// Gibt die Anzahl lokal zugestellter Frames zurueck.
    pub fn veroeffentlichen(
        &self,
        event: impl Into<String>,
        data: Option<serde_json::Value>,
        origin: Option<VerbindungsId>,
    ) -> usize {
        let paket = PublishPaket::neu(event, data, origin);
        let zugestellt = self.inner.lokal_zustellen(&paket);

        let umschlag = RelayUmschlag::neu(self.inner.kontext.prozess, paket);
        if let Err(e) = self
            .inner
            .kontext
            .relay
            .veroeffentlichen(&self.inner.topic, &umschlag)
        {
            tracing::warn!(topic = %self.inner.topic, fehler = %e, "Relay-Publish fehlgeschlagen");
        }

        self.inner
            .hooks
            .publish(&self.inner.topic, &self.inner.info(), &umschlag.paket);
        zugestellt
    }

    /// Wirft eine Verbindung aus dem Kanal
    ///
    /// Gibt `false` zurueck wenn die Verbindung kein Abonnent war.
    pub fn rauswerfen(
        &self,
        verbindung: &VerbindungsId,
        code: Option<u32>,
        data: Option<serde_json::Value>,
    ) -> bool {
        self.inner
            .verbindung_entfernen(verbindung, Ausloeser::Rauswurf, Some((code, data)))
    }

    /// Wirft alle Abonnenten raus und gibt ihre Anzahl zurueck
    pub fn schliessen(&self, code: Option<u32>, data: Option<serde_json::Value>) -> usize {
        let ids: Vec<VerbindungsId> = self.inner.zustand.lock().abonnenten.keys().copied().collect();
        ids.iter()
            .filter(|id| self.rauswerfen(id, code, data.clone()))
            .count()
    }

    /// Prueft den Zugriff einer Verbindung erneut und wirft sie bei Ablehnung raus
    ///
    /// Gibt `true` zurueck wenn die Verbindung rausgeworfen wurde.
    pub async fn zugriff_neu_pruefen(&self, verbindung: &Arc<Verbindung>) -> bool {
        if !self.ist_abonniert(&verbindung.id()) {
            return false;
        }
        let erlaubt = self
            .inner
            .zugriff
            .pruefen(verbindung, &self.inner.info())
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(topic = %self.inner.topic, verbindung = %verbindung.id(), fehler = %e, "Zugriffspruefung fehlgeschlagen");
                false
            });
        !erlaubt && self.rauswerfen(&verbindung.id(), None, None)
    }

    // -----------------------------------------------------------------------
    // Introspektion
    // -----------------------------------------------------------------------

    pub fn abonnenten_anzahl(&self) -> usize {
        self.inner.zustand.lock().abonnenten.len()
    }

    pub fn ist_abonniert(&self, verbindung: &VerbindungsId) -> bool {
        self.inner.zustand.lock().abonnenten.contains_key(verbindung)
    }

    /// Ob das Topic gerade beim Relay beobachtet wird
    pub fn ist_registriert(&self) -> bool {
        self.inner.zustand.lock().registriert
    }

    /// Ob ein Entprell-Timer auf die Relay-Abmeldung wartet
    pub fn abmeldung_ausstehend(&self) -> bool {
        self.inner.zustand.lock().timer.ist_aktiv()
    }
}

impl std::fmt::Debug for Kanal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kanal")
            .field("topic", &self.inner.topic)
            .finish()
    }
}

impl KanalInner {
    fn info(&self) -> KanalInfo {
        KanalInfo {
            identifier: self.identifier.clone(),
            api_level: self.api_level,
            mitglied: None,
        }
    }

    /// Traegt die Verbindung ein; `Ok(false)` wenn sie schon Abonnent ist
    fn verbindung_hinzufuegen(self: &Arc<Self>, verbindung: &Arc<Verbindung>) -> KanalResult<bool> {
        let id = verbindung.id();
        let mut zustand = self.zustand.lock();
        if zustand.abonnenten.contains_key(&id) {
            return Ok(false);
        }

        let aktion: AktionsHandler = {
            let kanal = Arc::downgrade(self);
            let topic = self.topic.clone();
            Arc::new(move |aktion: &str| {
                if aktion != AKTION_ABMELDEN {
                    return Err(KanalFehler::UnbekannteAktion {
                        topic: topic.clone(),
                        aktion: aktion.to_string(),
                    });
                }
                if let Some(kanal) = kanal.upgrade() {
                    kanal.verbindung_entfernen(&id, Ausloeser::Abmeldung, None);
                }
                Ok(())
            })
        };
        let trennung: TrennHandler = {
            let kanal = Arc::downgrade(self);
            Arc::new(move || {
                if let Some(kanal) = kanal.upgrade() {
                    kanal.verbindung_entfernen(&id, Ausloeser::Trennung, None);
                }
            })
        };
        if !verbindung.abonnement_eintragen(&self.topic, aktion, trennung) {
            return Err(KanalFehler::VerbindungGetrennt);
        }

        zustand.abonnenten.insert(id, Arc::clone(verbindung));
        if zustand.registriert {
            zustand.timer.abbrechen();
        } else {
            self.registrieren(&mut zustand);
        }

        tracing::debug!(topic = %self.topic, verbindung = %id, abonnenten = zustand.abonnenten.len(), "Kanal abonniert");
        Ok(true)
    }

    /// Entfernt eine Verbindung auf einem der drei Wege
    ///
    /// Bei einem Rauswurf wird vorher der Rauswurf-Frame gesendet.
    fn verbindung_entfernen(
        self: &Arc<Self>,
        id: &VerbindungsId,
        ausloeser: Ausloeser,
        rauswurf: Option<(Option<u32>, Option<serde_json::Value>)>,
    ) -> bool {
        let verbindung = {
            let mut zustand = self.zustand.lock();
            let Some(verbindung) = zustand.abonnenten.remove(id) else {
                return false;
            };
            if let Some((code, data)) = rauswurf {
                verbindung.rauswurf_senden(&self.topic, None, code, data);
            }
            verbindung.abonnement_austragen(&self.topic);
            if zustand.abonnenten.is_empty() {
                self.abmeldung_planen(&mut zustand);
            }
            verbindung
        };

        tracing::debug!(topic = %self.topic, verbindung = %id, %ausloeser, "Verbindung aus Kanal entfernt");
        self.hooks
            .abmeldung(&self.topic, &verbindung, &self.info(), ausloeser);
        true
    }

    fn registrieren(self: &Arc<Self>, zustand: &mut KanalZustand) {
        let kanal = Arc::downgrade(self);
        let eigener_prozess = self.kontext.prozess;
        let rueckruf: RelayRueckruf = Arc::new(move |umschlag: RelayUmschlag| {
            if umschlag.ist_echo_von(&eigener_prozess) {
                return;
            }
            if let Some(kanal) = Weak::upgrade(&kanal) {
                kanal.lokal_zustellen(&umschlag.paket);
            }
        });

        // Bei einem Fehler bleibt der Kanal unregistriert; das naechste
        // Abonnement versucht es erneut
        if let Err(e) = self.kontext.relay.beobachten(&self.topic, rueckruf) {
            tracing::error!(topic = %self.topic, fehler = %e, "Relay-Beobachtung fehlgeschlagen");
            return;
        }
        zustand.registriert = true;
        tracing::debug!(topic = %self.topic, "Kanal beim Relay registriert");
    }

    fn abmelden(&self, zustand: &mut KanalZustand) {
        self.kontext.relay.freigeben(&self.topic);
        zustand.registriert = false;
        tracing::debug!(topic = %self.topic, "Kanal beim Relay abgemeldet");
    }

    fn abmeldung_planen(self: &Arc<Self>, zustand: &mut KanalZustand) {
        let kanal = Arc::downgrade(self);
        let geplant = zustand.timer.planen(self.kontext.entprellung, move |generation| {
            if let Some(kanal) = kanal.upgrade() {
                kanal.timer_abgelaufen(generation);
            }
        });
        if !geplant {
            self.abmelden(zustand);
        }
    }

    fn timer_abgelaufen(&self, generation: u64) {
        let mut zustand = self.zustand.lock();
        if !zustand.timer.abgelaufen(generation) || !zustand.abonnenten.is_empty() {
            return;
        }
        if zustand.registriert {
            self.abmelden(&mut zustand);
        }
    }

    fn lokal_zustellen(&self, paket: &PublishPaket) -> usize {
        let empfaenger: Vec<Arc<Verbindung>> =
            self.zustand.lock().abonnenten.values().cloned().collect();
        empfaenger
            .iter()
            .filter(|v| v.publish_zustellen(&self.topic, None, paket))
            .count()
    }
}

impl Drop for KanalInner {
    fn drop(&mut self) {
        if self.zustand.get_mut().registriert {
            self.kontext.relay.freigeben(&self.topic);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{zugriff_fn, Gesperrt};
    use crate::relay::RelayHub;
    use rundfunk_protocol::ServerNachricht;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn kanal(optionen: KanalOptionen) -> (Kanal, RelayHub) {
        let hub = RelayHub::neu();
        let kontext = KanalKontext::neu(ProzessId::new(), Arc::new(hub.knoten()));
        (Kanal::neu(optionen, kontext), hub)
    }

    #[tokio::test]
    async fn abonnieren_registriert_beim_relay() {
        let (kanal, hub) = kanal(KanalOptionen::neu("chat"));
        let (c1, _rx) = Verbindung::neu(None);

        let topic = kanal.abonnieren(&c1, None).await.unwrap();
        assert_eq!(topic, "#chat");
        assert!(kanal.ist_abonniert(&c1.id()));
        assert!(kanal.ist_registriert());
        assert!(hub.ist_beobachtet("#chat"));
        assert_eq!(c1.kanaele(), vec!["#chat".to_string()]);
        assert_eq!(c1.handler_anzahl(), (1, 1));
    }

    /// Erlaubt alles, aber erst nach einer kurzen Pause
    struct LangsamerPruefer;

    #[async_trait::async_trait]
    impl ZugriffsPruefer for LangsamerPruefer {
        async fn pruefen(&self, _: &Verbindung, _: &KanalInfo) -> anyhow::Result<bool> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(true)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn gleichzeitiges_abonnieren_traegt_einmal_ein() {
        let abonnements = Arc::new(AtomicUsize::new(0));
        let a = Arc::clone(&abonnements);
        let hooks = KanalHooks::neu().bei_abonnement(move |_, _| {
            a.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let (kanal, _hub) = kanal(
            KanalOptionen::neu("chat")
                .mit_zugriff(Arc::new(LangsamerPruefer))
                .mit_hooks(hooks),
        );
        let (c1, _rx) = Verbindung::neu(None);

        let (t1, t2) = tokio::join!(kanal.abonnieren(&c1, None), kanal.abonnieren(&c1, None));
        assert_eq!(t1.unwrap(), "#chat");
        assert_eq!(t2.unwrap(), "#chat");
        assert_eq!(kanal.abonnenten_anzahl(), 1);
        assert_eq!(c1.handler_anzahl(), (1, 1));
        assert_eq!(c1.kanaele(), vec!["#chat".to_string()]);
        assert_eq!(abonnements.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fehlgeschlagene_registrierung_wird_wiederholt() {
        let (kanal, hub) = kanal(KanalOptionen::neu("chat"));
        let (c1, _rx1) = Verbindung::neu(None);
        let (c2, _rx2) = Verbindung::neu(None);

        hub.unterbrechen();
        assert_eq!(kanal.abonnieren(&c1, None).await.unwrap(), "#chat");
        assert!(!kanal.ist_registriert());
        assert!(!hub.ist_beobachtet("#chat"));

        hub.fortsetzen();
        kanal.abonnieren(&c2, None).await.unwrap();
        assert!(kanal.ist_registriert());
        assert!(hub.ist_beobachtet("#chat"));
        assert_eq!(kanal.abonnenten_anzahl(), 2);
    }

    #[tokio::test]
    async fn mitglied_auf_einfachem_kanal() {
        let (kanal, _hub) = kanal(KanalOptionen::neu("chat"));
        let (c1, _rx) = Verbindung::neu(None);
        let e = kanal.abonnieren(&c1, Some("x")).await.unwrap_err();
        assert_eq!(e.name(), "UnnecessaryMember");
        assert_eq!(kanal.abonnenten_anzahl(), 0);
        assert!(!kanal.ist_registriert());
    }

    #[tokio::test]
    async fn zugriff_verweigert_aendert_nichts() {
        let (kanal, hub) = kanal(KanalOptionen::neu("chat").mit_zugriff(Arc::new(Gesperrt)));
        let (c1, _rx) = Verbindung::neu(None);
        let e = kanal.abonnieren(&c1, None).await.unwrap_err();
        assert_eq!(e.name(), "AccessDenied");
        assert_eq!(kanal.abonnenten_anzahl(), 0);
        assert!(!hub.ist_beobachtet("#chat"));
        assert_eq!(c1.handler_anzahl(), (0, 0));
    }

    #[tokio::test]
    async fn doppeltes_abonnieren_prueft_nur_einmal() {
        let pruefungen = Arc::new(AtomicUsize::new(0));
        let p = Arc::clone(&pruefungen);
        let zugriff = zugriff_fn(move |_, _| {
            p.fetch_add(1, Ordering::SeqCst);
            true
        });
        let (kanal, _hub) = kanal(KanalOptionen::neu("chat").mit_zugriff(zugriff));
        let (c1, _rx) = Verbindung::neu(None);

        let t1 = kanal.abonnieren(&c1, None).await.unwrap();
        let t2 = kanal.abonnieren(&c1, None).await.unwrap();
        assert_eq!(t1, t2);
        assert_eq!(kanal.abonnenten_anzahl(), 1);
        assert_eq!(pruefungen.load(Ordering::SeqCst), 1);
        assert_eq!(c1.handler_anzahl(), (1, 1));
    }

    #[tokio::test]
    async fn unbekannte_aktion() {
        let (kanal, _hub) = kanal(KanalOptionen::neu("chat"));
        let (c1, _rx) = Verbindung::neu(None);
        kanal.abonnieren(&c1, None).await.unwrap();

        let e = c1.aktion_verarbeiten("#chat", "explode").unwrap_err();
        assert_eq!(e.name(), "UnknownAction");
        assert!(kanal.ist_abonniert(&c1.id()));

        c1.aktion_verarbeiten("#chat", AKTION_ABMELDEN).unwrap();
        assert!(!kanal.ist_abonniert(&c1.id()));
        assert_eq!(c1.handler_anzahl(), (0, 0));
        assert!(c1.kanaele().is_empty());
    }

    #[tokio::test]
    async fn rauswurf_sendet_frame_und_entfernt() {
        let ausloeser = Arc::new(Mutex::new(None));
        let a = Arc::clone(&ausloeser);
        let hooks = KanalHooks::neu().bei_abmeldung(move |_, _, grund| {
            *a.lock() = Some(grund);
            Ok(())
        });
        let (kanal, _hub) = kanal(KanalOptionen::neu("chat").mit_hooks(hooks));
        let (c1, mut rx) = Verbindung::neu(None);
        kanal.abonnieren(&c1, None).await.unwrap();

        assert!(kanal.rauswerfen(&c1.id(), Some(4001), None));
        assert!(!kanal.rauswerfen(&c1.id(), Some(4001), None));

        match rx.try_recv().unwrap() {
            ServerNachricht::KickOut(frame) => {
                assert_eq!(frame.topic, "#chat");
                assert_eq!(frame.code, Some(4001));
                assert_eq!(frame.member, None);
            }
            andere => panic!("Rauswurf erwartet, bekam {andere:?}"),
        }
        assert_eq!(*ausloeser.lock(), Some(Ausloeser::Rauswurf));
        assert_eq!(c1.handler_anzahl(), (0, 0));
    }

    #[tokio::test]
    async fn publish_laesst_origin_aus() {
        let (kanal, _hub) = kanal(KanalOptionen::neu("chat"));
        let (c1, mut rx1) = Verbindung::neu(None);
        let (c2, mut rx2) = Verbindung::neu(None);
        kanal.abonnieren(&c1, None).await.unwrap();
        kanal.abonnieren(&c2, None).await.unwrap();

        let data = serde_json::json!({"text": "hallo"});
        assert_eq!(kanal.veroeffentlichen("neu", Some(data.clone()), None), 2);
        for rx in [&mut rx1, &mut rx2] {
            match rx.try_recv().unwrap() {
                ServerNachricht::Publish(frame) => {
                    assert_eq!(frame.event, "neu");
                    assert_eq!(frame.data, Some(data.clone()));
                }
                andere => panic!("Publish erwartet, bekam {andere:?}"),
            }
        }

        assert_eq!(kanal.veroeffentlichen("neu", None, Some(c1.id())), 1);
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn eigenes_echo_wird_nicht_doppelt_zugestellt() {
        let (kanal, _hub) = kanal(KanalOptionen::neu("chat"));
        let (c1, mut rx) = Verbindung::neu(None);
        kanal.abonnieren(&c1, None).await.unwrap();

        kanal.veroeffentlichen("neu", None, None);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err(), "Relay-Echo darf nicht zugestellt werden");
    }

    #[tokio::test]
    async fn fehlerhafte_hooks_brechen_nichts_ab() {
        let hooks = KanalHooks::neu()
            .bei_abonnement(|_, _| anyhow::bail!("kaputt"))
            .bei_publish(|_, _| panic!("kaputt"));
        let (kanal, _hub) = kanal(KanalOptionen::neu("chat").mit_hooks(hooks));
        let (c1, mut rx) = Verbindung::neu(None);

        kanal.abonnieren(&c1, None).await.unwrap();
        assert_eq!(kanal.veroeffentlichen("neu", None, None), 1);
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn schliessen_wirft_alle_raus() {
        let (kanal, _hub) = kanal(KanalOptionen::neu("chat"));
        let (c1, _rx1) = Verbindung::neu(None);
        let (c2, _rx2) = Verbindung::neu(None);
        kanal.abonnieren(&c1, None).await.unwrap();
        kanal.abonnieren(&c2, None).await.unwrap();

        assert_eq!(kanal.schliessen(None, None), 2);
        assert_eq!(kanal.abonnenten_anzahl(), 0);
        assert!(kanal.abmeldung_ausstehend());
    }

    #[tokio::test]
    async fn zugriff_neu_pruefen_wirft_raus() {
        let erlaubt = Arc::new(AtomicBool::new(true));
        let e = Arc::clone(&erlaubt);
        let zugriff = zugriff_fn(move |_, _| e.load(Ordering::SeqCst));
        let (kanal, _hub) = kanal(KanalOptionen::neu("chat").mit_zugriff(zugriff));
        let (c1, _rx) = Verbindung::neu(None);
        kanal.abonnieren(&c1, None).await.unwrap();

        assert!(!kanal.zugriff_neu_pruefen(&c1).await);
        erlaubt.store(false, Ordering::SeqCst);
        assert!(kanal.zugriff_neu_pruefen(&c1).await);
        assert!(!kanal.ist_abonniert(&c1.id()));
    }

    #[tokio::test]
    async fn getrennte_verbindung_kann_nicht_abonnieren() {
        let (kanal, _hub) = kanal(KanalOptionen::neu("chat"));
        let (c1, _rx) = Verbindung::neu(None);
        c1.trennen();
        let e = kanal.abonnieren(&c1, None).await.unwrap_err();
        assert_eq!(e, KanalFehler::VerbindungGetrennt);
        assert!(!kanal.ist_registriert());
    }

    #[tokio::test(start_paused = true)]
    async fn entprellte_abmeldung() {
        let (kanal, hub) = kanal(KanalOptionen::neu("chat"));
        let (c1, _rx) = Verbindung::neu(None);
        kanal.abonnieren(&c1, None).await.unwrap();

        c1.aktion_verarbeiten("#chat", AKTION_ABMELDEN).unwrap();
        assert!(kanal.ist_registriert());
        assert!(kanal.abmeldung_ausstehend());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!kanal.ist_registriert());
        assert!(!hub.ist_beobachtet("#chat"));
    }

    #[test]
    fn ohne_runtime_sofort_abmelden() {
        let hub = RelayHub::neu();
        let kontext = KanalKontext::neu(ProzessId::new(), Arc::new(hub.knoten()));
        let kanal = Kanal::neu(KanalOptionen::neu("chat"), kontext);
        let (c1, _rx) = Verbindung::neu(None);

        assert!(kanal.inner.verbindung_hinzufuegen(&c1).unwrap());
        assert!(kanal.ist_registriert());
        c1.trennen();
        assert!(!kanal.ist_registriert());
        assert!(!hub.ist_beobachtet("#chat"));
    }
}
