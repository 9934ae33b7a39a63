//! funkbruecke-core – Gemeinsame Typen, Fehler und Ereignisse
//!
//! Dieses Crate stellt die Bausteine bereit, die Audio-, Radio- und
//! Server-Crate gemeinsam nutzen.

pub mod error;
pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{FunkError, Result, RollenKonflikt, TransportError};
pub use event::RadioEreignis;
pub use types::{Benutzer, ChannelId, ServerId, SprecherId, UserId};
