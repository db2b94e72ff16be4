//! Control-Protokoll (TCP/TLS)
//!
//! Definiert alle Nachrichten die zwischen Client und Server ausgetauscht
//! werden: Kanal-Abonnements, Kanal-Aktionen und die vom Server
//! ausgelieferten Publish- und Rauswurf-Frames.
//!
//! ## Design
//! - Request/Response Pattern fuer Abonnements: `request_id: u32`
//! - JSON-Serialisierung via serde
//! - Tagged Enums fuer typsichere Nachrichtentypen

use serde::{Deserialize, Serialize};

/// Aktions-Tag mit dem ein Client einen Kanal verlaesst
pub const AKTION_ABMELDEN: &str = "unsubscribe";

// ---------------------------------------------------------------------------
// Client -> Server
// ---------------------------------------------------------------------------

/// Abonnement-Anfrage eines Clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbonnementAnfrage {
    /// Vom Client vergebene ID, wird in der Antwort gespiegelt
    pub request_id: u32,
    /// Kanal-Identifier (ohne Topic-Praefix)
    pub channel: String,
    /// Mitglied bei Kanal-Familien
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<String>,
    /// API-Level des Clients; ohne Angabe gilt das Level der Verbindung
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_level: Option<u32>,
}

impl AbonnementAnfrage {
    pub fn neu(request_id: u32, channel: impl Into<String>, member: Option<&str>) -> Self {
        Self {
            request_id,
            channel: channel.into(),
            member: member.map(str::to_string),
            api_level: None,
        }
    }
}

/// Aktion auf dem Topic-Ereignis eines abonnierten Kanals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KanalAktion {
    /// Vollstaendiges Topic (inklusive Mitglied bei Familien)
    pub topic: String,
    /// Aktions-Tag, aktuell nur `unsubscribe`
    pub action: String,
}

impl KanalAktion {
    /// Erstellt eine Abmelde-Aktion fuer das gegebene Topic
    pub fn abmelden(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            action: AKTION_ABMELDEN.to_string(),
        }
    }
}

/// Alle Nachrichten die ein Client senden kann
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientNachricht {
    Subscribe(AbonnementAnfrage),
    ChannelAction(KanalAktion),
    Ping { timestamp_ms: u64 },
}

// ---------------------------------------------------------------------------
// Server -> Client
// ---------------------------------------------------------------------------

/// Ausgeliefertes Ereignis eines Kanals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishFrame {
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<String>,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Server-initiierter Rauswurf aus einem Kanal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KickOutFrame {
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Fehler-Antwort mit stabilem Namen
///
/// `name` ist einer von `AccessDenied`, `UnnecessaryMember`, `MemberMissing`,
/// `UnknownAction`, `InvalidMember`, `MaxMembersReached`, `UnknownChannel`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FehlerAntwort {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u32>,
    pub name: String,
    pub message: String,
}

/// Alle Nachrichten die der Server senden kann
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerNachricht {
    Subscribed { request_id: u32, topic: String },
    Error(FehlerAntwort),
    Publish(PublishFrame),
    KickOut(KickOutFrame),
    Pong {
        echo_timestamp_ms: u64,
        server_timestamp_ms: u64,
    },
}

impl ServerNachricht {
    /// Erstellt eine Fehler-Antwort
    pub fn fehler(
        request_id: Option<u32>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Error(FehlerAntwort {
            request_id,
            name: name.into(),
            message: message.into(),
        })
    }

    /// Gibt das Topic zurueck, falls die Nachricht einem Kanal zugeordnet ist
    pub fn topic(&self) -> Option<&str> {
        match self {
            Self::Subscribed { topic, .. } => Some(topic),
            Self::Publish(f) => Some(&f.topic),
            Self::KickOut(f) => Some(&f.topic),
            Self::Error(_) | Self::Pong { .. } => None,
        }
    }
}
