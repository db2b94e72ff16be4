//! Topic-Namen fuer Kanaele und Kanal-Familien
//!
//! Ein Topic ist gleichzeitig das Relay-Topic und der Ereignisname auf der
//! Verbindung, ueber den der Client Aktionen (Abmelden) schickt.
//!
//! ```text
//! #chat            Kanal "chat" ohne API-Level
//! #chat@2          Kanal "chat" fuer API-Level 2
//! #room.r1         Mitglied "r1" der Familie "room"
//! #room@2.r1       Mitglied "r1" der Familie "room" fuer API-Level 2
//! ```

/// Praefix aller Kanal-Topics
pub const KANAL_START: &str = "#";

/// Trenner zwischen Identifier und API-Level
pub const API_LEVEL_TRENNER: char = '@';

/// Trenner zwischen Familien-Topic und Mitglied
pub const MITGLIED_TRENNER: char = '.';

/// Ob ein Identifier eindeutig in ein Topic abgebildet werden kann
///
/// Leere Identifier und solche mit `#`, `@` oder `.` wuerden mit den
/// Topics anderer Kanaele oder Familien-Mitglieder zusammenfallen.
pub fn identifier_gueltig(identifier: &str) -> bool {
    !identifier.is_empty()
        && !identifier
            .chars()
            .any(|c| KANAL_START.contains(c) || c == API_LEVEL_TRENNER || c == MITGLIED_TRENNER)
}

/// Topic eines Kanals (oder einer Familie ohne Mitglied)
pub fn kanal_topic(identifier: &str, api_level: Option<u32>) -> String {
    match api_level {
        Some(level) => format!("{KANAL_START}{identifier}{API_LEVEL_TRENNER}{level}"),
        None => format!("{KANAL_START}{identifier}"),
    }
}

/// Praefix aller Mitglieder-Topics einer Familie
pub fn familien_praefix(identifier: &str, api_level: Option<u32>) -> String {
    let mut praefix = kanal_topic(identifier, api_level);
    praefix.push(MITGLIED_TRENNER);
    praefix
}

/// Topic eines einzelnen Familien-Mitglieds
pub fn mitglied_topic(praefix: &str, mitglied: &str) -> String {
    format!("{praefix}{mitglied}")
}
