//! Zugriffs- und Mitgliedspruefung
//!
//! Die Engine entscheidet nicht selbst ob eine Verbindung abonnieren darf.
//! Sie fragt pro Kanal einen `ZugriffsPruefer` (ja/nein) und bei
//! Kanal-Familien zusaetzlich einen `MitgliedsPruefer`, ob ein String ein
//! gueltiges Mitglied ist. Beide duerfen asynchron sein.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use crate::connection::Verbindung;

/// Maximale Anzahl gecachter Mitgliedspruefungen pro Familie
pub const MITGLIEDER_CACHE_GROESSE: usize = 4096;

/// Was ein Zugriffspruefer ueber den angefragten Kanal erfaehrt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KanalInfo {
    pub identifier: String,
    pub api_level: Option<u32>,
    /// Nur bei Kanal-Familien gesetzt
    pub mitglied: Option<String>,
}

// ---------------------------------------------------------------------------
// Zugriffspruefung
// ---------------------------------------------------------------------------

/// Entscheidet ob eine Verbindung einen Kanal abonnieren darf
///
/// Ein `Err` wird wie eine Ablehnung behandelt. Die Engine setzt kein
/// Timeout; eine haengende Pruefung haengt das Abonnement.
#[async_trait]
pub trait ZugriffsPruefer: Send + Sync + 'static {
    async fn pruefen(&self, verbindung: &Verbindung, info: &KanalInfo) -> anyhow::Result<bool>;
}

/// Erlaubt jedes Abonnement
#[derive(Debug, Clone, Copy, Default)]
pub struct Offen;

#[async_trait]
impl ZugriffsPruefer for Offen {
    async fn pruefen(&self, _verbindung: &Verbindung, _info: &KanalInfo) -> anyhow::Result<bool> {
        Ok(true)
    }
}

/// Lehnt jedes Abonnement ab
#[derive(Debug, Clone, Copy, Default)]
pub struct Gesperrt;

#[async_trait]
impl ZugriffsPruefer for Gesperrt {
    async fn pruefen(&self, _verbindung: &Verbindung, _info: &KanalInfo) -> anyhow::Result<bool> {
        Ok(false)
    }
}

/// Synchrone Closure als Zugriffspruefer
pub struct ZugriffFn<F>(pub F);

#[async_trait]
impl<F> ZugriffsPruefer for ZugriffFn<F>
where
    F: Fn(&Verbindung, &KanalInfo) -> bool + Send + Sync + 'static,
{
    async fn pruefen(&self, verbindung: &Verbindung, info: &KanalInfo) -> anyhow::Result<bool> {
        Ok((self.0)(verbindung, info))
    }
}

/// Verpackt eine synchrone Closure als geteilten Zugriffspruefer
pub fn zugriff_fn<F>(f: F) -> Arc<dyn ZugriffsPruefer>
where
    F: Fn(&Verbindung, &KanalInfo) -> bool + Send + Sync + 'static,
{
    Arc::new(ZugriffFn(f))
}

// ---------------------------------------------------------------------------
// Mitgliedspruefung
// ---------------------------------------------------------------------------

/// Entscheidet ob ein String ein gueltiges Mitglied einer Familie ist
///
/// `Err` enthaelt den Grund der Ablehnung.
#[async_trait]
pub trait MitgliedsPruefer: Send + Sync + 'static {
    async fn pruefen(&self, mitglied: &str) -> Result<(), String>;
}

/// Akzeptiert jedes nicht-leere Mitglied
#[derive(Debug, Clone, Copy, Default)]
pub struct JedesMitglied;

#[async_trait]
impl MitgliedsPruefer for JedesMitglied {
    async fn pruefen(&self, mitglied: &str) -> Result<(), String> {
        if mitglied.is_empty() {
            return Err("Mitglied ist leer".into());
        }
        Ok(())
    }
}

/// Nicht-leer, begrenzte Laenge, nur ASCII-Alphanumerik, `-` und `_`
#[derive(Debug, Clone, Copy)]
pub struct ZeichenMitgliedsPruefer {
    pub max_laenge: usize,
}

impl Default for ZeichenMitgliedsPruefer {
    fn default() -> Self {
        Self { max_laenge: 64 }
    }
}

#[async_trait]
impl MitgliedsPruefer for ZeichenMitgliedsPruefer {
    async fn pruefen(&self, mitglied: &str) -> Result<(), String> {
        if mitglied.is_empty() {
            return Err("Mitglied ist leer".into());
        }
        if mitglied.len() > self.max_laenge {
            return Err(format!("laenger als {} Zeichen", self.max_laenge));
        }
        if let Some(c) = mitglied
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(format!("unerlaubtes Zeichen '{c}'"));
        }
        Ok(())
    }
}

/// Merkt sich Ergebnisse eines anderen Mitgliedspruefers
///
/// Ist der Cache voll, wird er komplett geleert.
pub struct GecachterMitgliedsPruefer {
    pruefer: Arc<dyn MitgliedsPruefer>,
    cache: DashMap<String, Result<(), String>>,
    kapazitaet: usize,
}

impl GecachterMitgliedsPruefer {
    pub fn neu(pruefer: Arc<dyn MitgliedsPruefer>) -> Self {
        Self::mit_kapazitaet(pruefer, MITGLIEDER_CACHE_GROESSE)
    }

    pub fn mit_kapazitaet(pruefer: Arc<dyn MitgliedsPruefer>, kapazitaet: usize) -> Self {
        Self {
            pruefer,
            cache: DashMap::new(),
            kapazitaet,
        }
    }

    pub fn cache_groesse(&self) -> usize {
        self.cache.len()
    }
}

#[async_trait]
impl MitgliedsPruefer for GecachterMitgliedsPruefer {
    async fn pruefen(&self, mitglied: &str) -> Result<(), String> {
        if let Some(ergebnis) = self.cache.get(mitglied).map(|e| e.value().clone()) {
            return ergebnis;
        }

        let ergebnis = self.pruefer.pruefen(mitglied).await;
        if self.cache.len() >= self.kapazitaet {
            self.cache.clear();
        }
        self.cache.insert(mitglied.to_string(), ergebnis.clone());
        ergebnis
    }
}
