//! Fehlertypen fuer Funkbruecke
//!
//! Sitzungsfehler (Rollenkonflikt, nicht gefunden, Transport) werden
//! synchron an den Aufrufer zurueckgegeben. Pipeline-Fehler (Dekodierung,
//! Enkodierung, Zustellung) werden lokal geloggt und isoliert behandelt.

use thiserror::Error;

/// Globaler Result-Alias fuer Funkbruecke
pub type Result<T> = std::result::Result<T, FunkError>;

/// Art des Rollenkonflikts eines Servers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollenKonflikt {
    /// Der Server sendet bereits eine eigene Station
    HostBelegt,
    /// Der Server hoert bereits bei einer Station mit
    HoererBelegt,
}

impl std::fmt::Display for RollenKonflikt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HostBelegt => write!(f, "Server sendet bereits eine Station"),
            Self::HoererBelegt => write!(f, "Server hoert bereits bei einer Station mit"),
        }
    }
}

/// Fehler des Voice-Transports
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Beitritt zum Voice-Kanal fehlgeschlagen: {0}")]
    Beitritt(String),

    #[error("Voice-Verbindung nicht bereit nach {0} ms")]
    NichtBereit(u64),

    #[error("Voice-Verbindung geschlossen")]
    Geschlossen,

    #[error("Senden fehlgeschlagen: {0}")]
    Senden(String),
}

/// Alle moeglichen Fehler im Funkbruecke-System
#[derive(Debug, Error)]
pub enum FunkError {
    // --- Sitzungsaufbau ---
    #[error("Rollenkonflikt: {0}")]
    RollenKonflikt(RollenKonflikt),

    #[error("Keine eindeutige Station gefunden: {0}")]
    NichtGefunden(String),

    #[error("Station ist nicht live: {0}")]
    NichtLive(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    // --- Audio-Pipeline ---
    #[error("Dekodierung fehlgeschlagen: {0}")]
    Dekodierung(String),

    #[error("Enkodierung fehlgeschlagen: {0}")]
    Enkodierung(String),

    #[error("Zustellung ueberschritt Zeitlimit")]
    ZustellungsTimeout,

    #[error("Zustellung fehlgeschlagen: {0}")]
    Zustellung(String),

    // --- Eingaben ---
    #[error("Ungueltige Lautstaerke: {0}% (erlaubt 0–200%)")]
    UngueltigeLautstaerke(f32),

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),
}

impl FunkError {
    /// Gibt true zurueck wenn es sich um einen Rollenkonflikt handelt
    pub fn ist_rollen_konflikt(&self) -> bool {
        matches!(self, Self::RollenKonflikt(_))
    }

    /// Gibt true zurueck wenn der Fehler nur einen Ausgang betrifft
    /// und die Pipeline weiterlaufen soll
    pub fn ist_pipeline_fehler(&self) -> bool {
        matches!(
            self,
            Self::Dekodierung(_) | Self::Enkodierung(_) | Self::ZustellungsTimeout | Self::Zustellung(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = FunkError::RollenKonflikt(RollenKonflikt::HostBelegt);
        assert_eq!(
            e.to_string(),
            "Rollenkonflikt: Server sendet bereits eine Station"
        );
    }

    #[test]
    fn transport_fehler_konvertierung() {
        let e: FunkError = TransportError::NichtBereit(500).into();
        assert!(matches!(e, FunkError::Transport(TransportError::NichtBereit(500))));
        assert!(e.to_string().contains("500 ms"));
    }

    #[test]
    fn fehler_klassifizierung() {
        assert!(FunkError::RollenKonflikt(RollenKonflikt::HoererBelegt).ist_rollen_konflikt());
        assert!(!FunkError::ZustellungsTimeout.ist_rollen_konflikt());
        assert!(FunkError::ZustellungsTimeout.ist_pipeline_fehler());
        assert!(!FunkError::NichtGefunden("jazz".into()).ist_pipeline_fehler());
    }
}
