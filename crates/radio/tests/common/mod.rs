//! Gemeinsame Helfer fuer die Radio-Integrationstests

#![allow(dead_code)]

use funkbruecke_audio::{PcmCodec, FENSTER_LAENGE};
use funkbruecke_core::{Benutzer, ChannelId, ServerId, SprecherId, UserId};
use funkbruecke_radio::{
    EingehenderFrame, RadioConfig, Registry, SpeicherTransport, Station, StationsAnfrage,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Kurze Zeitlimits, damit Tests schnell durchlaufen
pub fn test_config() -> RadioConfig {
    RadioConfig {
        zustell_timeout_ms: 200,
        bereitschaft_timeout_ms: 500,
        ..RadioConfig::default()
    }
}

pub fn umgebung() -> (Registry, SpeicherTransport) {
    let transport = SpeicherTransport::neu();
    let registry = Registry::neu(
        Arc::new(transport.clone()),
        Arc::new(PcmCodec),
        test_config(),
    )
    .expect("Registry konnte nicht erstellt werden");
    (registry, transport)
}

pub fn anfrage(name: &str, server: ServerId) -> StationsAnfrage {
    StationsAnfrage {
        name: name.into(),
        beschreibung: format!("Sendung {name}"),
        server_id: server,
        server_name: format!("{name}-server"),
        text_kanal: ChannelId::new(),
        voice_kanal: ChannelId::new(),
        host: Benutzer::neu(UserId::new(), "moderator"),
    }
}

pub async fn station(registry: &Registry, name: &str) -> Station {
    registry
        .station_starten(anfrage(name, ServerId::new()))
        .await
        .expect("Station konnte nicht starten")
}

/// Ein volles Misch-Fenster mit konstantem Wert (PCM-kodiert)
pub fn fenster(sprecher: u32, wert: i16) -> EingehenderFrame {
    EingehenderFrame::neu(
        SprecherId(sprecher),
        PcmCodec::packen(&vec![wert; FENSTER_LAENGE]),
    )
}

/// Speist `anzahl` Fenster eines Sprechers in die Station ein
pub fn einspeisen(transport: &SpeicherTransport, station: &Station, sprecher: u32, wert: i16, anzahl: usize) {
    let verbindung = transport
        .verbindung(station.server_id())
        .expect("Station hat keine Verbindung");
    for _ in 0..anzahl {
        assert!(verbindung.frame_einspeisen(fenster(sprecher, wert)));
    }
}

/// Pollt bis die Bedingung gilt oder das Limit erreicht ist
pub async fn warten_bis(mut bedingung: impl FnMut() -> bool, limit: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < limit {
        if bedingung() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    bedingung()
}

/// Dekodiert alle an einen Server gesendeten Frames
pub fn empfangen(transport: &SpeicherTransport, server: ServerId) -> Vec<Vec<i16>> {
    transport
        .verbindung(server)
        .map(|v| {
            v.gesendet()
                .iter()
                .filter_map(|f| PcmCodec::entpacken(f).ok())
                .collect()
        })
        .unwrap_or_default()
}
