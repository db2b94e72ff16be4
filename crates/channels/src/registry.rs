//! Kanal-Registry – besitzt alle Kanaele und Familien eines Prozesses
//!
//! Instanzen werden einmal beim Start angelegt und sind dann ueber
//! (Identifier, API-Level) erreichbar. Ein Identifier gehoert entweder zu
//! einfachen Kanaelen oder zu Familien, nie zu beiden.
//!
//! ## API-Level-Aufloesung
//! - Client ohne Level: die Instanz ohne Level
//! - Client mit Level `L`: die Instanz mit dem hoechsten Level `<= L`,
//!   sonst die Instanz ohne Level
//! - sonst `UnknownChannel`

use dashmap::DashMap;
use rundfunk_core::{ProzessId, RundfunkError};
use rundfunk_protocol::AbonnementAnfrage;
use std::sync::Arc;

use crate::channel::{Kanal, KanalKontext, KanalOptionen};
use crate::connection::Verbindung;
use crate::container::{FamilienContainer, KanalContainer};
use crate::error::{KanalFehler, KanalResult};
use crate::family::{FamilienOptionen, KanalFamilie};
use crate::topic;

/// Eine aufgeloeste Kanal-Instanz
#[derive(Debug, Clone)]
pub enum KanalInstanz {
    Kanal(Kanal),
    Familie(KanalFamilie),
}

impl KanalInstanz {
    pub fn identifier(&self) -> &str {
        match self {
            Self::Kanal(k) => k.identifier(),
            Self::Familie(f) => f.identifier(),
        }
    }

    pub fn api_level(&self) -> Option<u32> {
        match self {
            Self::Kanal(k) => k.api_level(),
            Self::Familie(f) => f.api_level(),
        }
    }

    pub async fn abonnieren(
        &self,
        verbindung: &Arc<Verbindung>,
        mitglied: Option<&str>,
    ) -> KanalResult<String> {
        match self {
            Self::Kanal(k) => k.abonnieren(verbindung, mitglied).await,
            Self::Familie(f) => f.abonnieren(verbindung, mitglied).await,
        }
    }
}

/// Registry aller Kanal-Instanzen
///
/// Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct KanalRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    kontext: KanalKontext,
    /// Identifier -> Varianten, aufsteigend nach API-Level (ohne Level zuerst)
    kanaele: DashMap<String, Vec<Kanal>>,
    familien: DashMap<String, Vec<KanalFamilie>>,
}

impl KanalRegistry {
    pub fn neu(kontext: KanalKontext) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                kontext,
                kanaele: DashMap::new(),
                familien: DashMap::new(),
            }),
        }
    }

    pub fn kontext(&self) -> &KanalKontext {
        &self.inner.kontext
    }

    pub fn prozess_id(&self) -> ProzessId {
        self.inner.kontext.prozess
    }

    // -----------------------------------------------------------------------
    // Anlegen
    // -----------------------------------------------------------------------

    /// Legt einen einfachen Kanal an
    ///
    /// Schlaegt fehl wenn der Identifier ungueltig oder schon eine Familie
    /// ist, oder die Kombination aus Identifier und API-Level schon existiert.
    pub fn kanal_anlegen(&self, optionen: KanalOptionen) -> rundfunk_core::Result<Kanal> {
        identifier_pruefen(&optionen.identifier)?;
        if self.inner.familien.contains_key(&optionen.identifier) {
            return Err(RundfunkError::Konfiguration(format!(
                "'{}' ist bereits eine Kanal-Familie",
                optionen.identifier
            )));
        }

        let mut varianten = self
            .inner
            .kanaele
            .entry(optionen.identifier.clone())
            .or_default();
        if varianten.iter().any(|k| k.api_level() == optionen.api_level) {
            return Err(doppelt(&optionen.identifier, optionen.api_level));
        }

        let kanal = Kanal::neu(optionen, self.inner.kontext.clone());
        varianten.push(kanal.clone());
        varianten.sort_by_key(Kanal::api_level);
        tracing::info!(topic = kanal.topic(), "Kanal angelegt");
        Ok(kanal)
    }

    /// Legt eine Kanal-Familie an
    pub fn familie_anlegen(&self, optionen: FamilienOptionen) -> rundfunk_core::Result<KanalFamilie> {
        identifier_pruefen(&optionen.identifier)?;
        if self.inner.kanaele.contains_key(&optionen.identifier) {
            return Err(RundfunkError::Konfiguration(format!(
                "'{}' ist bereits ein einfacher Kanal",
                optionen.identifier
            )));
        }

        let mut varianten = self
            .inner
            .familien
            .entry(optionen.identifier.clone())
            .or_default();
        if varianten.iter().any(|f| f.api_level() == optionen.api_level) {
            return Err(doppelt(&optionen.identifier, optionen.api_level));
        }

        let familie = KanalFamilie::neu(optionen, self.inner.kontext.clone());
        varianten.push(familie.clone());
        varianten.sort_by_key(KanalFamilie::api_level);
        tracing::info!(
            praefix = familie.topic_praefix(),
            max_mitglieder = familie.max_mitglieder_pro_verbindung(),
            "Kanal-Familie angelegt"
        );
        Ok(familie)
    }

    // -----------------------------------------------------------------------
    // Nachschlagen
    // -----------------------------------------------------------------------

    /// Kanal mit genau diesem API-Level
    pub fn kanal(&self, identifier: &str, api_level: Option<u32>) -> Option<Kanal> {
        self.inner
            .kanaele
            .get(identifier)?
            .iter()
            .find(|k| k.api_level() == api_level)
            .cloned()
    }

    /// Familie mit genau diesem API-Level
    pub fn familie(&self, identifier: &str, api_level: Option<u32>) -> Option<KanalFamilie> {
        self.inner
            .familien
            .get(identifier)?
            .iter()
            .find(|f| f.api_level() == api_level)
            .cloned()
    }

    pub fn kanal_container(&self, identifier: &str) -> Option<KanalContainer> {
        self.inner
            .kanaele
            .get(identifier)
            .map(|varianten| KanalContainer::neu(varianten.clone()))
    }

    pub fn familien_container(&self, identifier: &str) -> Option<FamilienContainer> {
        self.inner
            .familien
            .get(identifier)
            .map(|varianten| FamilienContainer::neu(varianten.clone()))
    }

    /// Alle Identifier (sortiert)
    pub fn identifiers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .inner
            .kanaele
            .iter()
            .map(|e| e.key().clone())
            .chain(self.inner.familien.iter().map(|e| e.key().clone()))
            .collect();
        ids.sort();
        ids
    }

    /// Loest Identifier und Client-API-Level zu einer Instanz auf
    pub fn aufloesen(&self, identifier: &str, client_level: Option<u32>) -> Option<KanalInstanz> {
        if let Some(varianten) = self.inner.kanaele.get(identifier) {
            let kanal = level_waehlen(varianten.as_slice(), client_level, Kanal::api_level).cloned();
            return kanal.map(KanalInstanz::Kanal);
        }
        let varianten = self.inner.familien.get(identifier)?;
        let familie =
            level_waehlen(varianten.as_slice(), client_level, KanalFamilie::api_level).cloned();
        familie.map(KanalInstanz::Familie)
    }

    // -----------------------------------------------------------------------
    // Client-Operationen
    // -----------------------------------------------------------------------

    /// Bearbeitet eine Abonnement-Anfrage
    ///
    /// Das API-Level der Anfrage hat Vorrang vor dem der Verbindung.
    pub async fn abonnieren(
        &self,
        verbindung: &Arc<Verbindung>,
        anfrage: &AbonnementAnfrage,
    ) -> KanalResult<String> {
        let level = anfrage.api_level.or(verbindung.api_level());
        let Some(instanz) = self.aufloesen(&anfrage.channel, level) else {
            tracing::debug!(kanal = %anfrage.channel, api_level = ?level, "Unbekannter Kanal");
            return Err(KanalFehler::UnbekannterKanal(anfrage.channel.clone()));
        };
        instanz.abonnieren(verbindung, anfrage.member.as_deref()).await
    }

    /// Prueft alle Abonnements einer Verbindung erneut
    ///
    /// Gibt die Anzahl der Rauswuerfe zurueck.
    pub async fn zugriff_neu_pruefen(&self, verbindung: &Arc<Verbindung>) -> usize {
        // Instanzen vorher kopieren, kein DashMap-Guard ueber ein await
        let kanaele: Vec<Kanal> = self
            .inner
            .kanaele
            .iter()
            .flat_map(|e| e.value().clone())
            .collect();
        let familien: Vec<KanalFamilie> = self
            .inner
            .familien
            .iter()
            .flat_map(|e| e.value().clone())
            .collect();

        let mut rauswuerfe = 0;
        for kanal in kanaele {
            if kanal.zugriff_neu_pruefen(verbindung).await {
                rauswuerfe += 1;
            }
        }
        for familie in familien {
            rauswuerfe += familie.zugriff_neu_pruefen(verbindung).await;
        }
        if rauswuerfe > 0 {
            tracing::info!(verbindung = %verbindung.id(), rauswuerfe, "Abonnements nach Zugriffspruefung entfernt");
        }
        rauswuerfe
    }
}

impl std::fmt::Debug for KanalRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KanalRegistry")
            .field("prozess", &self.inner.kontext.prozess)
            .field("kanaele", &self.inner.kanaele.len())
            .field("familien", &self.inner.familien.len())
            .finish()
    }
}

fn identifier_pruefen(identifier: &str) -> rundfunk_core::Result<()> {
    if topic::identifier_gueltig(identifier) {
        return Ok(());
    }
    Err(RundfunkError::Konfiguration(format!(
        "Ungueltiger Kanal-Identifier '{identifier}' (leer oder enthaelt '#', '@', '.')"
    )))
}

fn doppelt(identifier: &str, api_level: Option<u32>) -> RundfunkError {
    RundfunkError::Konfiguration(format!(
        "Kanal '{identifier}' mit API-Level {api_level:?} existiert bereits"
    ))
}

/// Waehlt die passende Variante; `varianten` ist aufsteigend sortiert
fn level_waehlen<T>(
    varianten: &[T],
    client_level: Option<u32>,
    level: impl Fn(&T) -> Option<u32>,
) -> Option<&T> {
    let ohne_level = varianten.iter().find(|v| level(*v).is_none());
    let Some(client_level) = client_level else {
        return ohne_level;
    };
    varianten
        .iter()
        .rev()
        .find(|v| level(*v).is_some_and(|l| l <= client_level))
        .or(ohne_level)
}
