//! TCP-Listener – Bindet Socket, akzeptiert Verbindungen
//!
//! Der `KanalServer` bindet einen TCP-Socket und startet fuer jede
//! eingehende Verbindung einen eigenen tokio-Task mit einer `ClientSitzung`.
//! Die Kanal-Engine ist `Send + Sync`, die Tasks laufen daher auf dem
//! normalen Multi-Thread-Runtime.

use rundfunk_protocol::wire::DEFAULT_MAX_FRAME_SIZE;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::dispatcher::NachrichtenDispatcher;
use crate::session::ClientSitzung;

/// Standardwert fuer gleichzeitige Verbindungen
pub const STANDARD_MAX_VERBINDUNGEN: usize = 1024;

/// TCP-Server fuer Kanal-Clients
pub struct KanalServer {
    dispatcher: NachrichtenDispatcher,
    bind_addr: SocketAddr,
    max_verbindungen: usize,
    max_frame_groesse: usize,
    aktive: Arc<AtomicUsize>,
}

impl KanalServer {
    pub fn neu(dispatcher: NachrichtenDispatcher, bind_addr: SocketAddr) -> Self {
        Self {
            dispatcher,
            bind_addr,
            max_verbindungen: STANDARD_MAX_VERBINDUNGEN,
            max_frame_groesse: DEFAULT_MAX_FRAME_SIZE,
            aktive: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn mit_max_verbindungen(mut self, max: usize) -> Self {
        self.max_verbindungen = max;
        self
    }

    pub fn mit_max_frame_groesse(mut self, max: usize) -> Self {
        self.max_frame_groesse = max;
        self
    }

    /// Gibt die Bind-Adresse zurueck
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    /// Zaehler der gerade offenen Verbindungen
    pub fn aktive_verbindungen(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.aktive)
    }

    /// Bindet den Socket und akzeptiert Verbindungen
    ///
    /// Laeuft bis `shutdown_rx` ein `true`-Signal empfaengt.
    pub async fn starten(
        self,
        shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        self.bedienen(listener, shutdown_rx).await
    }

    /// Accept-Loop auf einem bereits gebundenen Listener
    pub async fn bedienen(
        self,
        listener: TcpListener,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) -> std::io::Result<()> {
        let lokale_addr = listener.local_addr()?;
        tracing::info!(adresse = %lokale_addr, "TCP Kanal-Server gestartet");

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            if self.aktive.load(Ordering::SeqCst) >= self.max_verbindungen {
                                tracing::warn!(
                                    peer = %peer_addr,
                                    max = self.max_verbindungen,
                                    "Server voll – Verbindung abgelehnt"
                                );
                                drop(stream);
                                continue;
                            }

                            tracing::debug!(peer = %peer_addr, "Verbindung akzeptiert");
                            let sitzung = ClientSitzung::neu(
                                self.dispatcher.clone(),
                                peer_addr,
                                self.max_frame_groesse,
                            );
                            let aktive = Arc::clone(&self.aktive);
                            let shutdown_rx_clone = shutdown_rx.clone();
                            aktive.fetch_add(1, Ordering::SeqCst);

                            tokio::spawn(async move {
                                sitzung.verarbeiten(stream, shutdown_rx_clone).await;
                                aktive.fetch_sub(1, Ordering::SeqCst);
                            });
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        }
                    }
                }

                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Kanal-Server: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        tracing::info!("TCP Kanal-Server gestoppt");
        Ok(())
    }
}
