//! Nachrichten-Dispatcher – routet Client-Frames an Registry und Verbindung
//!
//! - `subscribe`       -> `KanalRegistry::abonnieren` -> `subscribed` oder `error`
//! - `channel_action`  -> `Verbindung::aktion_verarbeiten` -> nichts oder `error`
//! - `ping`            -> `pong`

use rundfunk_protocol::{ClientNachricht, ServerNachricht};
use std::sync::Arc;

use crate::connection::Verbindung;
use crate::error::KanalFehler;
use crate::registry::KanalRegistry;

/// Zentraler Dispatcher fuer eingehende Client-Frames
#[derive(Clone, Debug)]
pub struct NachrichtenDispatcher {
    registry: KanalRegistry,
}

impl NachrichtenDispatcher {
    pub fn neu(registry: KanalRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &KanalRegistry {
        &self.registry
    }

    /// Verarbeitet einen Frame und gibt die Antwort zurueck
    ///
    /// Gibt `None` zurueck wenn keine Antwort gesendet werden soll.
    pub async fn dispatch(
        &self,
        nachricht: ClientNachricht,
        verbindung: &Arc<Verbindung>,
    ) -> Option<ServerNachricht> {
        match nachricht {
            ClientNachricht::Subscribe(anfrage) => {
                let request_id = anfrage.request_id;
                match self.registry.abonnieren(verbindung, &anfrage).await {
                    Ok(topic) => Some(ServerNachricht::Subscribed { request_id, topic }),
                    Err(e) => {
                        tracing::debug!(
                            verbindung = %verbindung.id(),
                            kanal = %anfrage.channel,
                            fehler = %e,
                            "Abonnement abgelehnt"
                        );
                        Some(fehler_antwort(Some(request_id), &e))
                    }
                }
            }

            ClientNachricht::ChannelAction(aktion) => verbindung
                .aktion_verarbeiten(&aktion.topic, &aktion.action)
                .err()
                .map(|e| fehler_antwort(None, &e)),

            ClientNachricht::Ping { timestamp_ms } => {
                let server_ts = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis() as u64;
                Some(ServerNachricht::Pong {
                    echo_timestamp_ms: timestamp_ms,
                    server_timestamp_ms: server_ts,
                })
            }
        }
    }
}

fn fehler_antwort(request_id: Option<u32>, fehler: &KanalFehler) -> ServerNachricht {
    ServerNachricht::fehler(request_id, fehler.name(), fehler.to_string())
}
