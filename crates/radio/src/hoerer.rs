//! Hoerer – Relay des Stationsstroms in einen fremden Voice-Kanal
//!
//! Ein Hoerer ist eine Ausgabe des Mixers. Jeder Frame muss innerhalb des
//! Zustell-Zeitlimits vom Transport abgenommen werden; sonst (oder nach
//! einem Stopp) wird die Verbindung geschlossen und der Hoerer meldet sich
//! bei seiner Station ab. Der Abbau passiert genau einmal.

use crate::config::RadioConfig;
use crate::mixer::MixerAusgabe;
use crate::signal::Stoppsignal;
use crate::station::{Station, StationInner};
use crate::transport::{bereitschaft_abwarten, BeitrittsModus, VoiceTransport, VoiceVerbindung};
use async_trait::async_trait;
use bytes::Bytes;
use funkbruecke_core::{ChannelId, FunkError, Result, ServerId, TransportError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

pub struct Hoerer {
    server_id: ServerId,
    text_kanal: ChannelId,
    station_name: String,
    /// Rueckverweis ohne Besitz (Station besitzt ihre Hoerer)
    station: Weak<StationInner>,
    verbindung: Mutex<Option<Arc<dyn VoiceVerbindung>>>,
    stop: Stoppsignal,
    abgebaut: AtomicBool,
    zustell_timeout: Duration,
}

impl Hoerer {
    /// Tritt dem Voice-Kanal des Abonnenten bei und wartet auf Bereitschaft
    ///
    /// Scheitert die Bereitschaft, wird die Verbindung wieder geschlossen.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn starten(
        transport: &dyn VoiceTransport,
        server_id: ServerId,
        voice_kanal: ChannelId,
        text_kanal: ChannelId,
        station: Weak<StationInner>,
        station_name: String,
        config: &RadioConfig,
    ) -> Result<Arc<Self>> {
        let verbindung = transport
            .beitreten(server_id, voice_kanal, BeitrittsModus::SENDEN)
            .await?;

        if let Err(e) = bereitschaft_abwarten(
            verbindung.as_ref(),
            config.bereitschaft_poll(),
            config.bereitschaft_timeout(),
        )
        .await
        {
            tracing::warn!(
                station = %station_name,
                server = %server_id,
                fehler = %e,
                "Hoerer-Verbindung nicht bereit – wird geschlossen"
            );
            verbindung.schliessen().await;
            return Err(e.into());
        }

        tracing::info!(station = %station_name, server = %server_id, "Hoerer verbunden");

        Ok(Arc::new(Self {
            server_id,
            text_kanal,
            station_name,
            station,
            verbindung: Mutex::new(Some(verbindung)),
            stop: Stoppsignal::neu(),
            abgebaut: AtomicBool::new(false),
            zustell_timeout: config.zustell_timeout(),
        }))
    }

    pub fn server_id(&self) -> ServerId {
        self.server_id
    }

    pub fn text_kanal(&self) -> ChannelId {
        self.text_kanal
    }

    pub fn station_name(&self) -> &str {
        &self.station_name
    }

    /// Loest das Stoppsignal aus; idempotent
    ///
    /// Eine haengende Zustellung wird dadurch abgebrochen.
    pub fn stoppen(&self) {
        self.stop.ausloesen();
    }

    pub fn ist_gestoppt(&self) -> bool {
        self.stop.ist_ausgeloest()
    }

    /// Stoppt den Hoerer und baut ihn sofort ab
    pub async fn beenden(&self) {
        self.stoppen();
        self.abbauen().await;
    }

    /// Schliesst die Verbindung und meldet den Hoerer bei der Station ab
    async fn abbauen(&self) {
        if self.abgebaut.swap(true, Ordering::SeqCst) {
            return;
        }
        // Weitere haengende Zustellungen sofort beenden
        self.stop.ausloesen();

        let verbindung = self.verbindung.lock().take();
        if let Some(verbindung) = verbindung {
            verbindung.schliessen().await;
        }

        if let Some(inner) = self.station.upgrade() {
            Station::aus_inner(inner).hoerer_entfernen(self);
        }

        tracing::info!(station = %self.station_name, server = %self.server_id, "Hoerer getrennt");
    }
}

#[async_trait]
impl MixerAusgabe for Hoerer {
    async fn opus_schreiben(&self, frame: Bytes) -> Result<()> {
        let verbindung = match self.verbindung.lock().clone() {
            Some(v) => v,
            None => return Err(FunkError::Zustellung(TransportError::Geschlossen.to_string())),
        };

        let fehler = tokio::select! {
            biased;
            _ = self.stop.abwarten() => FunkError::Zustellung("Hoerer gestoppt".into()),
            gesendet = verbindung.frame_senden(frame) => match gesendet {
                Ok(()) => return Ok(()),
                Err(e) => FunkError::Zustellung(e.to_string()),
            },
            _ = tokio::time::sleep(self.zustell_timeout) => FunkError::ZustellungsTimeout,
        };

        tracing::warn!(
            station = %self.station_name,
            server = %self.server_id,
            fehler = %fehler,
            "Zustellung an Hoerer fehlgeschlagen – Hoerer wird entfernt"
        );
        self.abbauen().await;
        Err(fehler)
    }
}

impl std::fmt::Debug for Hoerer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hoerer")
            .field("server_id", &self.server_id)
            .field("text_kanal", &self.text_kanal)
            .field("station", &self.station_name)
            .field("gestoppt", &self.ist_gestoppt())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::speicher::SpeicherTransport;

    async fn hoerer_ohne_station(
        transport: &SpeicherTransport,
        server: ServerId,
    ) -> Result<Arc<Hoerer>> {
        Hoerer::starten(
            transport,
            server,
            ChannelId::new(),
            ChannelId::new(),
            Weak::new(),
            "jazz".into(),
            &RadioConfig::default(),
        )
        .await
    }

    #[tokio::test]
    async fn frame_wird_zugestellt() {
        let transport = SpeicherTransport::neu();
        let server = ServerId::new();
        let hoerer = hoerer_ohne_station(&transport, server).await.unwrap();

        hoerer.opus_schreiben(Bytes::from_static(b"abc")).await.unwrap();

        let verbindung = transport.verbindung(server).unwrap();
        assert_eq!(verbindung.modus, BeitrittsModus::SENDEN);
        assert_eq!(verbindung.gesendet(), vec![Bytes::from_static(b"abc")]);
    }

    #[tokio::test(start_paused = true)]
    async fn haengender_transport_fuehrt_zu_timeout() {
        let transport = SpeicherTransport::neu();
        transport.senden_blockieren(true);
        let server = ServerId::new();
        let hoerer = hoerer_ohne_station(&transport, server).await.unwrap();

        let result = hoerer.opus_schreiben(Bytes::from_static(b"x")).await;
        assert!(matches!(result, Err(FunkError::ZustellungsTimeout)));
        assert!(transport.verbindung(server).unwrap().ist_geschlossen());

        // Nach dem Abbau gibt es keine Verbindung mehr
        let erneut = hoerer.opus_schreiben(Bytes::from_static(b"y")).await;
        assert!(matches!(erneut, Err(FunkError::Zustellung(_))));
    }

    #[tokio::test]
    async fn stopp_bricht_zustellung_ab() {
        let transport = SpeicherTransport::neu();
        transport.senden_blockieren(true);
        let server = ServerId::new();
        let hoerer = hoerer_ohne_station(&transport, server).await.unwrap();

        let h = Arc::clone(&hoerer);
        let zustellung = tokio::spawn(async move { h.opus_schreiben(Bytes::from_static(b"x")).await });
        tokio::task::yield_now().await;

        hoerer.stoppen();
        hoerer.stoppen();
        let result = tokio::time::timeout(Duration::from_millis(500), zustellung)
            .await
            .expect("Stopp muss die Zustellung beenden")
            .unwrap();
        assert!(matches!(result, Err(FunkError::Zustellung(_))));
        assert!(transport.verbindung(server).unwrap().ist_geschlossen());
    }

    #[tokio::test(start_paused = true)]
    async fn nie_bereit_schliesst_verbindung() {
        let transport = SpeicherTransport::neu();
        transport.bereitschaft_verzoegern(None);
        let server = ServerId::new();

        let result = hoerer_ohne_station(&transport, server).await;
        assert!(matches!(
            result,
            Err(FunkError::Transport(TransportError::NichtBereit(_)))
        ));
        assert!(transport.verbindung(server).unwrap().ist_geschlossen());
    }

    #[tokio::test]
    async fn beenden_ist_idempotent() {
        let transport = SpeicherTransport::neu();
        let server = ServerId::new();
        let hoerer = hoerer_ohne_station(&transport, server).await.unwrap();

        hoerer.beenden().await;
        hoerer.beenden().await;
        assert!(hoerer.ist_gestoppt());
        assert!(transport.verbindung(server).unwrap().ist_geschlossen());
    }
}
