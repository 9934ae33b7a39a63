//! Gemeinsame Identifikationstypen fuer Funkbruecke
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! Server-, Kanal- und Benutzer-IDs zur Compilezeit auszuschliessen.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Eindeutige Server-ID (eine Gemeinschaft mit eigenen Voice-Kanaelen)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerId(pub Uuid);

impl ServerId {
    /// Erstellt eine neue zufaellige ServerId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ServerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ServerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "server:{}", self.0)
    }
}

/// Eindeutige Kanal-ID (Text- oder Voice-Kanal)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub Uuid);

impl ChannelId {
    /// Erstellt eine neue zufaellige ChannelId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "channel:{}", self.0)
    }
}

/// Eindeutige Benutzer-ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Erstellt eine neue zufaellige UserId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "user:{}", self.0)
    }
}

/// Kennung eines Sprecher-Streams innerhalb eines Voice-Kanals (SSRC)
///
/// Wird vom Voice-Transport vergeben und ist nur innerhalb einer
/// Verbindung eindeutig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SprecherId(pub u32);

impl std::fmt::Display for SprecherId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ssrc:{}", self.0)
    }
}

/// Identitaet eines Benutzers (z.B. des Hosts einer Station)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Benutzer {
    pub id: UserId,
    pub name: String,
}

impl Benutzer {
    pub fn neu(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_id_eindeutig() {
        let a = ServerId::new();
        let b = ServerId::new();
        assert_ne!(a, b, "Zwei neue ServerIds muessen verschieden sein");
    }

    #[test]
    fn server_id_display() {
        let id = ServerId(Uuid::nil());
        assert!(id.to_string().starts_with("server:"));
    }

    #[test]
    fn sprecher_id_display() {
        assert_eq!(SprecherId(42).to_string(), "ssrc:42");
    }

    #[test]
    fn ids_sind_serde_kompatibel() {
        let kanal = ChannelId::new();
        let json = serde_json::to_string(&kanal).unwrap();
        let kanal2: ChannelId = serde_json::from_str(&json).unwrap();
        assert_eq!(kanal, kanal2);

        let host = Benutzer::neu(UserId::new(), "moderator");
        let json = serde_json::to_string(&host).unwrap();
        let host2: Benutzer = serde_json::from_str(&json).unwrap();
        assert_eq!(host, host2);
    }
}
