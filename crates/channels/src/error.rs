//! Fehlertypen fuer die Kanal-Engine
//!
//! Alle Varianten sind clientsichtbar und tragen einen stabilen Namen
//! (`name()`), der unveraendert ueber das Wire-Protokoll geht. Keiner dieser
//! Fehler veraendert den Zustand eines Kanals.

use thiserror::Error;

/// Clientsichtbare Fehler beim Abonnieren und bei Kanal-Aktionen
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KanalFehler {
    /// Zugriffspruefer hat abgelehnt (oder ist fehlgeschlagen)
    #[error("Zugriff verweigert: {0}")]
    ZugriffVerweigert(String),

    /// Einfacher Kanal hat ein Mitglied erhalten
    #[error("Kanal '{0}' erwartet kein Mitglied")]
    UnnoetigesMitglied(String),

    /// Kanal-Familie ohne Mitglied abonniert
    #[error("Kanal-Familie '{0}' erfordert ein Mitglied")]
    MitgliedFehlt(String),

    /// Unbekanntes Aktions-Tag auf einem Kanal-Topic
    #[error("Unbekannte Aktion '{aktion}' auf '{topic}'")]
    UnbekannteAktion { topic: String, aktion: String },

    /// Mitgliedspruefung ist fehlgeschlagen
    #[error("Ungueltiges Mitglied '{mitglied}': {grund}")]
    UngueltigesMitglied { mitglied: String, grund: String },

    /// Verbindung hat bereits die maximale Anzahl Mitglieder dieser Familie
    #[error("Maximale Anzahl Mitglieder pro Verbindung erreicht ({max})")]
    MaxMitgliederErreicht { max: usize },

    /// Identifier laesst sich keinem Kanal zuordnen
    #[error("Unbekannter Kanal: {0}")]
    UnbekannterKanal(String),

    /// Verbindung wurde waehrend des Abonnierens getrennt
    #[error("Verbindung getrennt")]
    VerbindungGetrennt,
}

impl KanalFehler {
    /// Stabiler Fehlername fuer das Wire-Protokoll
    pub fn name(&self) -> &'static str {
        match self {
            Self::ZugriffVerweigert(_) => "AccessDenied",
            Self::UnnoetigesMitglied(_) => "UnnecessaryMember",
            Self::MitgliedFehlt(_) => "MemberMissing",
            Self::UnbekannteAktion { .. } => "UnknownAction",
            Self::UngueltigesMitglied { .. } => "InvalidMember",
            Self::MaxMitgliederErreicht { .. } => "MaxMembersReached",
            Self::UnbekannterKanal(_) => "UnknownChannel",
            Self::VerbindungGetrennt => "Disconnected",
        }
    }
}

/// Result-Typ fuer die Kanal-Engine
pub type KanalResult<T> = Result<T, KanalFehler>;
