//! Container – Fan-out ueber alle API-Level eines Kanals
//!
//! Ein logischer Kanal kann fuer mehrere API-Level existieren (`#chat`,
//! `#chat@2`, ...). Container wenden Publish, Rauswurf und Schliessen auf
//! jede dieser Instanzen an. Sie halten keinen eigenen Zustand.

use rundfunk_core::VerbindungsId;

use crate::channel::Kanal;
use crate::family::KanalFamilie;

/// Alle API-Level-Varianten eines einfachen Kanals
#[derive(Debug, Clone, Default)]
pub struct KanalContainer {
    kanaele: Vec<Kanal>,
}

impl KanalContainer {
    pub fn neu(kanaele: Vec<Kanal>) -> Self {
        Self { kanaele }
    }

    pub fn kanaele(&self) -> &[Kanal] {
        &self.kanaele
    }

    pub fn ist_leer(&self) -> bool {
        self.kanaele.is_empty()
    }

    /// Veroeffentlicht in jeder Variante; gibt die Summe lokaler Zustellungen zurueck
    pub fn veroeffentlichen(
        &self,
        event: &str,
        data: Option<serde_json::Value>,
        origin: Option<VerbindungsId>,
    ) -> usize {
        self.kanaele
            .iter()
            .map(|k| k.veroeffentlichen(event, data.clone(), origin))
            .sum()
    }

    /// Wirft die Verbindung aus jeder Variante; gibt die Anzahl Rauswuerfe zurueck
    pub fn rauswerfen(
        &self,
        verbindung: &VerbindungsId,
        code: Option<u32>,
        data: Option<serde_json::Value>,
    ) -> usize {
        self.kanaele
            .iter()
            .filter(|k| k.rauswerfen(verbindung, code, data.clone()))
            .count()
    }

    pub fn schliessen(&self, code: Option<u32>, data: Option<serde_json::Value>) -> usize {
        self.kanaele
            .iter()
            .map(|k| k.schliessen(code, data.clone()))
            .sum()
    }
}

/// Alle API-Level-Varianten einer Kanal-Familie
#[derive(Debug, Clone, Default)]
pub struct FamilienContainer {
    familien: Vec<KanalFamilie>,
}

impl FamilienContainer {
    pub fn neu(familien: Vec<KanalFamilie>) -> Self {
        Self { familien }
    }

    pub fn familien(&self) -> &[KanalFamilie] {
        &self.familien
    }

    pub fn ist_leer(&self) -> bool {
        self.familien.is_empty()
    }

    pub fn veroeffentlichen(
        &self,
        mitglied: &str,
        event: &str,
        data: Option<serde_json::Value>,
        origin: Option<VerbindungsId>,
    ) -> usize {
        self.familien
            .iter()
            .map(|f| f.veroeffentlichen(mitglied, event, data.clone(), origin))
            .sum()
    }

    pub fn rauswerfen(
        &self,
        mitglied: &str,
        verbindung: &VerbindungsId,
        code: Option<u32>,
        data: Option<serde_json::Value>,
    ) -> usize {
        self.familien
            .iter()
            .filter(|f| f.rauswerfen(mitglied, verbindung, code, data.clone()))
            .count()
    }

    pub fn schliessen(
        &self,
        mitglied: &str,
        code: Option<u32>,
        data: Option<serde_json::Value>,
    ) -> usize {
        self.familien
            .iter()
            .map(|f| f.schliessen(mitglied, code, data.clone()))
            .sum()
    }
}
