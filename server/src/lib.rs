//! rundfunk-server – Bibliotheks-Root
//!
//! Baut aus der Konfiguration die Kanal-Registry auf und startet den
//! TCP-Transport. Oeffentlich, damit Integrationstests den Server ohne
//! Binary starten koennen.

pub mod config;

use anyhow::Result;
use config::{KanalDefinition, ServerConfig, Zugriff};
use rundfunk_channels::{
    FamilienOptionen, Gesperrt, KanalKontext, KanalOptionen, KanalRegistry, KanalServer,
    NachrichtenDispatcher, Offen, RelayHub, ZeichenMitgliedsPruefer, ZugriffsPruefer,
};
use rundfunk_core::ProzessId;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
    registry: KanalRegistry,
}

impl Server {
    /// Erstellt einen neuen Server und legt alle konfigurierten Kanaele an
    ///
    /// Ein einzelner Prozess nutzt einen lokalen Relay-Hub; bei mehreren
    /// Instanzen wird hier ein netzwerkfaehiges `Relay` eingesetzt.
    pub fn neu(config: ServerConfig) -> Result<Self> {
        let relay_hub = RelayHub::neu();
        let kontext = KanalKontext::neu(ProzessId::new(), Arc::new(relay_hub.knoten()))
            .mit_entprellung(config.kanaele.entprellung());
        let registry = KanalRegistry::neu(kontext);

        for def in &config.kanaele.definition {
            kanal_anlegen(&registry, def)?;
        }

        Ok(Self { config, registry })
    }

    pub fn registry(&self) -> &KanalRegistry {
        &self.registry
    }

    fn kanal_server(&self) -> Result<KanalServer> {
        let dispatcher = NachrichtenDispatcher::neu(self.registry.clone());
        Ok(KanalServer::neu(dispatcher, self.config.tcp_socket_adresse()?)
            .mit_max_verbindungen(self.config.server.max_verbindungen)
            .mit_max_frame_groesse(self.config.netzwerk.max_frame_groesse))
    }

    /// Bedient einen bereits gebundenen Listener bis `shutdown_rx` feuert
    pub async fn bedienen(
        &self,
        listener: TcpListener,
        shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) -> Result<()> {
        self.kanal_server()?.bedienen(listener, shutdown_rx).await?;
        Ok(())
    }

    /// Startet den TCP-Transport und laeuft bis zum Shutdown-Signal (Ctrl-C)
    pub async fn starten(self) -> Result<()> {
        tracing::info!(
            server_name = %self.config.server.name,
            tcp = %self.config.tcp_bind_adresse(),
            kanaele = ?self.registry.identifiers(),
            prozess = %self.registry.prozess_id(),
            "Server startet"
        );

        let kanal_server = self.kanal_server()?;
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let mut server_task = tokio::spawn(kanal_server.starten(shutdown_rx));

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
                let _ = shutdown_tx.send(true);
                server_task.await??;
            }
            ergebnis = &mut server_task => {
                // Listener ist von selbst beendet, z.B. weil der Port belegt war
                ergebnis??;
            }
        }

        Ok(())
    }
}

/// Legt einen Kanal oder eine Kanal-Familie aus einer Definition an
fn kanal_anlegen(registry: &KanalRegistry, def: &KanalDefinition) -> Result<()> {
    let zugriff: Arc<dyn ZugriffsPruefer> = match def.zugriff {
        Zugriff::Offen => Arc::new(Offen),
        Zugriff::Gesperrt => Arc::new(Gesperrt),
    };

    if def.familie {
        let mut optionen = FamilienOptionen::neu(def.identifier.clone())
            .mit_zugriff(zugriff)
            .mit_max_mitgliedern(def.max_mitglieder_pro_verbindung)
            .mit_mitglieds_pruefer(Arc::new(ZeichenMitgliedsPruefer {
                max_laenge: def.mitglied_max_laenge,
            }));
        if let Some(level) = def.api_level {
            optionen = optionen.mit_api_level(level);
        }
        registry.familie_anlegen(optionen)?;
    } else {
        let mut optionen = KanalOptionen::neu(def.identifier.clone()).mit_zugriff(zugriff);
        if let Some(level) = def.api_level {
            optionen = optionen.mit_api_level(level);
        }
        registry.kanal_anlegen(optionen)?;
    }

    tracing::debug!(
        identifier = %def.identifier,
        api_level = ?def.api_level,
        familie = def.familie,
        "Kanal aus Konfiguration angelegt"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(toml: &str) -> ServerConfig {
        ServerConfig::aus_toml(toml).unwrap()
    }

    #[test]
    fn kanaele_aus_konfiguration_angelegt() {
        let server = Server::neu(config(
            r#"
            [[kanaele.definition]]
            identifier = "chat"

            [[kanaele.definition]]
            identifier = "chat"
            api_level = 2

            [[kanaele.definition]]
            identifier = "room"
            familie = true
            max_mitglieder_pro_verbindung = 3
            "#,
        ))
        .unwrap();

        let registry = server.registry();
        assert_eq!(registry.identifiers(), vec!["chat".to_string(), "room".to_string()]);
        assert!(registry.kanal("chat", None).is_some());
        assert!(registry.kanal("chat", Some(2)).is_some());
        let raum = registry.familie("room", None).unwrap();
        assert_eq!(raum.max_mitglieder_pro_verbindung(), 3);
    }

    #[test]
    fn doppelte_definition_ist_fehler() {
        let ergebnis = Server::neu(config(
            r#"
            [[kanaele.definition]]
            identifier = "chat"

            [[kanaele.definition]]
            identifier = "chat"
            "#,
        ));
        assert!(ergebnis.is_err());
    }

    #[test]
    fn kanal_und_familie_mit_gleichem_namen_ist_fehler() {
        let ergebnis = Server::neu(config(
            r#"
            [[kanaele.definition]]
            identifier = "chat"

            [[kanaele.definition]]
            identifier = "chat"
            familie = true
            api_level = 2
            "#,
        ));
        assert!(ergebnis.is_err());
    }

    #[tokio::test]
    async fn gesperrter_kanal_verweigert_abonnement() {
        let server = Server::neu(config(
            r#"
            [[kanaele.definition]]
            identifier = "intern"
            zugriff = "gesperrt"
            "#,
        ))
        .unwrap();

        let (verbindung, _rx) = rundfunk_channels::Verbindung::neu(None);
        let anfrage = rundfunk_protocol::AbonnementAnfrage::neu(1, "intern", None);
        let e = server
            .registry()
            .abonnieren(&verbindung, &anfrage)
            .await
            .unwrap_err();
        assert_eq!(e.name(), "AccessDenied");
    }

    #[tokio::test]
    async fn mitglied_laenge_aus_konfiguration() {
        let server = Server::neu(config(
            r#"
            [[kanaele.definition]]
            identifier = "room"
            familie = true
            mitglied_max_laenge = 3
            "#,
        ))
        .unwrap();

        let (verbindung, _rx) = rundfunk_channels::Verbindung::neu(None);
        let registry = server.registry();
        let ok = rundfunk_protocol::AbonnementAnfrage::neu(1, "room", Some("abc"));
        let zu_lang = rundfunk_protocol::AbonnementAnfrage::neu(2, "room", Some("abcd"));
        assert!(registry.abonnieren(&verbindung, &ok).await.is_ok());
        assert_eq!(
            registry
                .abonnieren(&verbindung, &zu_lang)
                .await
                .unwrap_err()
                .name(),
            "InvalidMember"
        );
    }
}
