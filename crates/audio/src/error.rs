//! Fehlertypen fuer Audio-Format und Codecs

use funkbruecke_core::FunkError;
use thiserror::Error;

/// Alle moeglichen Fehler beim Dekodieren und Enkodieren
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Ungueltiger Paket-Header: {0}")]
    UngueltigerHeader(String),

    #[error("Codec-Fehler: {0}")]
    CodecFehler(String),

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),
}

pub type AudioResult<T> = Result<T, AudioError>;

impl AudioError {
    /// Ordnet den Fehler als Dekodierfehler der Pipeline ein
    pub fn als_dekodierung(self) -> FunkError {
        FunkError::Dekodierung(self.to_string())
    }

    /// Ordnet den Fehler als Enkodierfehler der Pipeline ein
    pub fn als_enkodierung(self) -> FunkError {
        FunkError::Enkodierung(self.to_string())
    }
}
