//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Kanal-Definitionen und Entprellung
    pub kanaele: KanalEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    /// Maximale Anzahl gleichzeitiger Verbindungen
    pub max_verbindungen: usize,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Rundfunk Server".into(),
            max_verbindungen: rundfunk_channels::tcp::STANDARD_MAX_VERBINDUNGEN,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer den TCP-Listener
    pub bind_adresse: String,
    /// Port fuer den TCP-Listener
    pub tcp_port: u16,
    /// Maximale Frame-Groesse in Bytes
    pub max_frame_groesse: usize,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            tcp_port: 9700,
            max_frame_groesse: rundfunk_protocol::wire::DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Kanal-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KanalEinstellungen {
    /// Wartezeit zwischen "letzter Abonnent weg" und Relay-Abmeldung
    pub entprellung_ms: u64,
    /// Beim Start angelegte Kanaele und Kanal-Familien
    pub definition: Vec<KanalDefinition>,
}

impl Default for KanalEinstellungen {
    fn default() -> Self {
        Self {
            entprellung_ms: 5000,
            definition: Vec::new(),
        }
    }
}

impl KanalEinstellungen {
    pub fn entprellung(&self) -> Duration {
        Duration::from_millis(self.entprellung_ms)
    }
}

/// Zugriffsrichtlinie eines konfigurierten Kanals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zugriff {
    /// Jede Verbindung darf abonnieren
    #[default]
    Offen,
    /// Niemand darf abonnieren
    Gesperrt,
}

/// Ein Eintrag `[[kanaele.definition]]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KanalDefinition {
    pub identifier: String,
    pub api_level: Option<u32>,
    /// `true` legt eine Kanal-Familie an
    pub familie: bool,
    /// Nur fuer Familien
    pub max_mitglieder_pro_verbindung: usize,
    pub zugriff: Zugriff,
    /// Nur fuer Familien
    pub mitglied_max_laenge: usize,
}

impl Default for KanalDefinition {
    fn default() -> Self {
        Self {
            identifier: String::new(),
            api_level: None,
            familie: false,
            max_mitglieder_pro_verbindung: rundfunk_channels::family::STANDARD_MAX_MITGLIEDER,
            zugriff: Zugriff::Offen,
            mitglied_max_laenge: 64,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level bzw. Filter-Direktive
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => Self::aus_toml(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}")),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Parst und prueft eine Konfiguration aus einem TOML-String
    pub fn aus_toml(inhalt: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(inhalt)?;
        config.pruefen()?;
        Ok(config)
    }

    /// Prueft Werte die serde allein nicht abfangen kann
    pub fn pruefen(&self) -> anyhow::Result<()> {
        for def in &self.kanaele.definition {
            if def.identifier.is_empty() {
                anyhow::bail!("Kanal-Definition ohne identifier");
            }
            if !rundfunk_channels::topic::identifier_gueltig(&def.identifier) {
                anyhow::bail!(
                    "Kanal-Definition '{}': identifier darf kein '#', '@' oder '.' enthalten",
                    def.identifier
                );
            }
            if def.familie && def.max_mitglieder_pro_verbindung == 0 {
                anyhow::bail!(
                    "Kanal-Familie '{}': max_mitglieder_pro_verbindung muss > 0 sein",
                    def.identifier
                );
            }
        }
        if !rundfunk_observability::log_filter_gueltig(&self.logging.level) {
            anyhow::bail!("Ungueltiger Log-Level '{}'", self.logging.level);
        }
        if !rundfunk_observability::log_format_gueltig(&self.logging.format) {
            anyhow::bail!(
                "Ungueltiges Log-Format '{}' (erlaubt: text, json)",
                self.logging.format
            );
        }
        Ok(())
    }

    /// Gibt die vollstaendige Bind-Adresse fuer TCP zurueck
    pub fn tcp_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.tcp_port)
    }

    /// Parst die TCP-Bind-Adresse
    pub fn tcp_socket_adresse(&self) -> anyhow::Result<SocketAddr> {
        let adresse = self.tcp_bind_adresse();
        adresse
            .parse()
            .map_err(|e| anyhow::anyhow!("Ungueltige Bind-Adresse '{adresse}': {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.server.max_verbindungen, 1024);
        assert_eq!(cfg.netzwerk.tcp_port, 9700);
        assert_eq!(cfg.kanaele.entprellung(), Duration::from_secs(5));
        assert!(cfg.kanaele.definition.is_empty());
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.pruefen().is_ok());
    }

    #[test]
    fn bind_adressen() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.tcp_bind_adresse(), "0.0.0.0:9700");
        assert_eq!(
            cfg.tcp_socket_adresse().unwrap(),
            "0.0.0.0:9700".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn ungueltige_bind_adresse() {
        let mut cfg = ServerConfig::default();
        cfg.netzwerk.bind_adresse = "kein host".into();
        assert!(cfg.tcp_socket_adresse().is_err());
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [server]
            name = "Mein Server"
            max_verbindungen = 100

            [netzwerk]
            tcp_port = 10000

            [kanaele]
            entprellung_ms = 250

            [[kanaele.definition]]
            identifier = "chat"

            [[kanaele.definition]]
            identifier = "chat"
            api_level = 2

            [[kanaele.definition]]
            identifier = "room"
            familie = true
            max_mitglieder_pro_verbindung = 1
            zugriff = "gesperrt"
        "#;
        let cfg = ServerConfig::aus_toml(toml).unwrap();
        assert_eq!(cfg.server.name, "Mein Server");
        assert_eq!(cfg.server.max_verbindungen, 100);
        assert_eq!(cfg.netzwerk.tcp_port, 10000);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.netzwerk.bind_adresse, "0.0.0.0");
        assert_eq!(cfg.kanaele.entprellung(), Duration::from_millis(250));

        let defs = &cfg.kanaele.definition;
        assert_eq!(defs.len(), 3);
        assert!(!defs[0].familie);
        assert_eq!(defs[0].api_level, None);
        assert_eq!(defs[0].zugriff, Zugriff::Offen);
        assert_eq!(defs[0].max_mitglieder_pro_verbindung, 20);
        assert_eq!(defs[1].api_level, Some(2));
        assert!(defs[2].familie);
        assert_eq!(defs[2].max_mitglieder_pro_verbindung, 1);
        assert_eq!(defs[2].zugriff, Zugriff::Gesperrt);
        assert_eq!(defs[2].mitglied_max_laenge, 64);
    }

    #[test]
    fn unbekannte_zugriffsrichtlinie_ist_fehler() {
        let toml = r#"
            [[kanaele.definition]]
            identifier = "chat"
            zugriff = "vielleicht"
        "#;
        assert!(ServerConfig::aus_toml(toml).is_err());
    }

    #[test]
    fn definition_ohne_identifier_ist_fehler() {
        let toml = r#"
            [[kanaele.definition]]
            familie = true
        "#;
        let e = ServerConfig::aus_toml(toml).unwrap_err();
        assert!(e.to_string().contains("identifier"));
    }

    #[test]
    fn identifier_mit_topic_trenner_ist_fehler() {
        for id in ["room.a", "chat@2", "#chat"] {
            let toml = format!("[[kanaele.definition]]\nidentifier = \"{id}\"\n");
            let e = ServerConfig::aus_toml(&toml).unwrap_err();
            assert!(e.to_string().contains(id), "{e}");
        }
    }

    #[test]
    fn logging_einstellungen_werden_geprueft() {
        let ok = ServerConfig::aus_toml("[logging]\nlevel = \"rundfunk_channels=debug,info\"\nformat = \"json\"\n");
        assert!(ok.is_ok());
        assert!(ServerConfig::aus_toml("[logging]\nformat = \"xml\"\n").is_err());
        assert!(ServerConfig::aus_toml("[logging]\nlevel = \"\"\n").is_err());
    }

    #[test]
    fn familie_mit_null_mitgliedern_ist_fehler() {
        let toml = r#"
            [[kanaele.definition]]
            identifier = "room"
            familie = true
            max_mitglieder_pro_verbindung = 0
        "#;
        assert!(ServerConfig::aus_toml(toml).is_err());
    }

    #[test]
    fn fehlende_datei_liefert_standardwerte() {
        let cfg = ServerConfig::laden("/nicht/vorhanden/rundfunk.toml").unwrap();
        assert_eq!(cfg.netzwerk.tcp_port, 9700);
    }
}
