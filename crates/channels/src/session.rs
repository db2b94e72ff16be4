//! Client-Sitzung – verarbeitet eine einzelne TCP-Verbindung
//!
//! Jede TCP-Verbindung bekommt eine `ClientSitzung` in einem eigenen
//! tokio-Task. Die Sitzung
//!
//! - liest Frames via `ServerCodec` und gibt sie an den Dispatcher,
//! - schreibt die Send-Queue der `Verbindung` (Publish, Rauswurf) auf den Socket,
//! - meldet am Ende `Verbindung::trennen`, womit alle Abonnements aufgeraeumt werden.

use futures_util::{SinkExt, StreamExt};
use rundfunk_protocol::wire::ServerCodec;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::connection::Verbindung;
use crate::dispatcher::NachrichtenDispatcher;

/// Verarbeitet eine einzelne TCP-Verbindung
pub struct ClientSitzung {
    dispatcher: NachrichtenDispatcher,
    peer_addr: SocketAddr,
    max_frame_groesse: usize,
}

impl ClientSitzung {
    pub fn neu(
        dispatcher: NachrichtenDispatcher,
        peer_addr: SocketAddr,
        max_frame_groesse: usize,
    ) -> Self {
        Self {
            dispatcher,
            peer_addr,
            max_frame_groesse,
        }
    }

    /// Laeuft bis der Client trennt, ein Fehler auftritt oder Shutdown kommt
    pub async fn verarbeiten(
        self,
        stream: TcpStream,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) {
        let peer_addr = self.peer_addr;
        let (verbindung, mut ausgang) = Verbindung::neu(None);
        let mut framed = Framed::new(stream, ServerCodec::with_max_size(self.max_frame_groesse));

        tracing::info!(peer = %peer_addr, verbindung = %verbindung.id(), "Neue Verbindung");

        loop {
            tokio::select! {
                frame = framed.next() => {
                    match frame {
                        Some(Ok(nachricht)) => {
                            tracing::trace!(peer = %peer_addr, ?nachricht, "Nachricht empfangen");
                            if let Some(antwort) = self.dispatcher.dispatch(nachricht, &verbindung).await {
                                if let Err(e) = framed.send(antwort).await {
                                    tracing::warn!(peer = %peer_addr, fehler = %e, "Senden fehlgeschlagen");
                                    break;
                                }
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(peer = %peer_addr, fehler = %e, "Frame-Lesefehler");
                            break;
                        }
                        None => {
                            tracing::info!(peer = %peer_addr, "Verbindung vom Client getrennt");
                            break;
                        }
                    }
                }

                // Publish- und Rauswurf-Frames aus der Send-Queue
                Some(ausgehend) = ausgang.recv() => {
                    if let Err(e) = framed.send(ausgehend).await {
                        tracing::warn!(peer = %peer_addr, fehler = %e, "Kanal-Frame konnte nicht gesendet werden");
                        break;
                    }
                }

                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(peer = %peer_addr, "Shutdown-Signal – Verbindung wird getrennt");
                        break;
                    }
                }
            }
        }

        verbindung.trennen();
        tracing::info!(peer = %peer_addr, verbindung = %verbindung.id(), "Verbindungs-Task beendet");
    }
}
