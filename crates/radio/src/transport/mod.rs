//! Voice-Transport – Vertrag zur Kanal-Anbindung
//!
//! Beitritt, Bereitschaft, Senden und Empfangen kodierter Frames werden
//! vom Transport erledigt; Stationen und Hoerer sehen nur diese Traits.
//!
//! - [`VoiceTransport`] – tritt einem Voice-Kanal bei
//! - [`VoiceVerbindung`] – eine bestehende Verbindung (Handle)
//! - [`speicher`] – In-Memory-Implementierung fuer Loopback und Tests

pub mod speicher;

use async_trait::async_trait;
use bytes::Bytes;
use funkbruecke_core::{ChannelId, ServerId, SprecherId, TransportError, UserId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Rolle der Verbindung im Kanal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeitrittsModus {
    /// Verbindung empfaengt die Audio-Streams der Sprecher
    pub empfangen: bool,
    /// Verbindung sendet Audio in den Kanal
    pub senden: bool,
}

impl BeitrittsModus {
    /// Station: nur empfangen
    pub const EMPFANGEN: Self = Self {
        empfangen: true,
        senden: false,
    };
    /// Hoerer: nur senden
    pub const SENDEN: Self = Self {
        empfangen: false,
        senden: true,
    };
}

/// Eingehender kodierter Frame eines Sprechers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EingehenderFrame {
    pub sprecher: SprecherId,
    pub daten: Bytes,
}

impl EingehenderFrame {
    pub fn neu(sprecher: SprecherId, daten: impl Into<Bytes>) -> Self {
        Self {
            sprecher,
            daten: daten.into(),
        }
    }
}

/// Zuordnung Benutzer <-> Sprecher-Stream (Speaking-Update)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SprecherUpdate {
    pub benutzer: UserId,
    pub sprecher: SprecherId,
    pub spricht: bool,
}

/// Callback fuer Speaking-Updates
pub type SprecherCallback = Box<dyn Fn(SprecherUpdate) + Send + Sync>;

/// Tritt Voice-Kanaelen bei
#[async_trait]
pub trait VoiceTransport: Send + Sync + 'static {
    async fn beitreten(
        &self,
        server: ServerId,
        kanal: ChannelId,
        modus: BeitrittsModus,
    ) -> Result<Arc<dyn VoiceVerbindung>, TransportError>;
}

/// Handle auf eine bestehende Voice-Verbindung
#[async_trait]
pub trait VoiceVerbindung: Send + Sync + 'static {
    /// Meldet ob die Verbindung Audio senden/empfangen kann
    fn ist_bereit(&self) -> bool;

    /// Uebergibt einen kodierten Frame an den Sendepfad
    ///
    /// Darf blockieren, solange der Transport den Frame nicht abnimmt.
    async fn frame_senden(&self, daten: Bytes) -> Result<(), TransportError>;

    /// Uebernimmt den Strom eingehender Frames (nur einmal moeglich)
    ///
    /// Endet der Strom, ist die Verbindung abgebrochen.
    fn eingehend_uebernehmen(&self) -> Option<mpsc::Receiver<EingehenderFrame>>;

    /// Registriert einen Callback fuer Speaking-Updates
    fn bei_sprecher_update(&self, callback: SprecherCallback);

    /// Schliesst die Verbindung (Sendeseite)
    async fn schliessen(&self);

    /// Verlaesst den Kanal
    async fn trennen(&self);
}

/// Wartet mit kurzem Polling bis die Verbindung bereit ist
pub async fn bereitschaft_abwarten(
    verbindung: &dyn VoiceVerbindung,
    poll: Duration,
    limit: Duration,
) -> Result<(), TransportError> {
    let start = Instant::now();
    while !verbindung.ist_bereit() {
        if start.elapsed() >= limit {
            return Err(TransportError::NichtBereit(limit.as_millis() as u64));
        }
        tokio::time::sleep(poll).await;
    }
    Ok(())
}
