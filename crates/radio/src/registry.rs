//! Registry – prozessweites Stationsverzeichnis
//!
//! Einzige Quelle fuer die Rollen-Exklusivitaet: jeder Server ist zu jedem
//! Zeitpunkt hoechstens Host einer Station ODER Hoerer bei genau einer.
//! Alle Aenderungen laufen unter einem RwLock; Suchen und Aufzaehlen
//! nehmen nur den Lese-Lock und geben ihn vor Aufrufen an Stationen frei.
//!
//! Lock-Reihenfolge bei stationsuebergreifenden Operationen:
//! Registry -> Station -> Mixer, jeweils erst nach Freigabe des vorherigen.

use crate::config::RadioConfig;
use crate::hoerer::Hoerer;
use crate::station::Station;
use crate::transport::VoiceTransport;
use funkbruecke_audio::CodecFabrik;
use funkbruecke_core::{
    Benutzer, ChannelId, FunkError, RadioEreignis, Result, RollenKonflikt, ServerId,
};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Parameter zum Starten einer Station
#[derive(Debug, Clone)]
pub struct StationsAnfrage {
    pub name: String,
    pub beschreibung: String,
    /// Host-Server
    pub server_id: ServerId,
    pub server_name: String,
    /// Kanal fuer Benachrichtigungen
    pub text_kanal: ChannelId,
    /// Voice-Kanal, dessen Sprecher gesendet werden
    pub voice_kanal: ChannelId,
    pub host: Benutzer,
}

/// Rolle eines Servers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rolle {
    Host(Station),
    Hoerer(Station),
}

impl Rolle {
    pub fn station(&self) -> &Station {
        match self {
            Self::Host(s) | Self::Hoerer(s) => s,
        }
    }

    fn fuer(server: ServerId, station: Station) -> Self {
        if station.server_id() == server {
            Self::Host(station)
        } else {
            Self::Hoerer(station)
        }
    }

    fn konflikt(&self) -> FunkError {
        match self {
            Self::Host(_) => FunkError::RollenKonflikt(RollenKonflikt::HostBelegt),
            Self::Hoerer(_) => FunkError::RollenKonflikt(RollenKonflikt::HoererBelegt),
        }
    }
}

/// Eine Zeile der Statusuebersicht
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StationsUebersicht {
    pub name: String,
    pub hoerer_anzahl: usize,
}

#[derive(Default)]
struct RegistryZustand {
    /// Server -> Station, bei der er Host oder Hoerer ist
    rollen: HashMap<ServerId, Station>,
    /// Stationen in Startreihenfolge
    stationen: Vec<Station>,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Handle auf die Registry, `Clone` teilt den Zustand
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

pub(crate) struct RegistryInner {
    zustand: RwLock<RegistryZustand>,
    transport: Arc<dyn VoiceTransport>,
    codec: Arc<dyn CodecFabrik>,
    config: RadioConfig,
    ereignisse: broadcast::Sender<RadioEreignis>,
}

impl Registry {
    /// Erstellt eine leere Registry
    pub fn neu(
        transport: Arc<dyn VoiceTransport>,
        codec: Arc<dyn CodecFabrik>,
        config: RadioConfig,
    ) -> Result<Self> {
        config.validieren()?;
        let (ereignisse, _) = broadcast::channel(config.ereignis_kapazitaet);
        Ok(Self {
            inner: Arc::new(RegistryInner {
                zustand: RwLock::new(RegistryZustand::default()),
                transport,
                codec,
                config,
                ereignisse,
            }),
        })
    }

    pub(crate) fn aus_inner(inner: Arc<RegistryInner>) -> Self {
        Self { inner }
    }

    // -----------------------------------------------------------------------
    // Stationen
    // -----------------------------------------------------------------------

    /// Startet eine Station fuer den Host-Server der Anfrage
    ///
    /// Die Station wird vor dem Beitritt registriert; scheitert der
    /// Beitritt, bleibt kein Eintrag zurueck.
    pub async fn station_starten(&self, anfrage: StationsAnfrage) -> Result<Station> {
        let station = Station::neu(
            &anfrage,
            Arc::downgrade(&self.inner),
            Arc::clone(&self.inner.transport),
            Arc::clone(&self.inner.codec),
            self.inner.config.clone(),
        )?;

        {
            let mut zustand = self.inner.zustand.write();
            if let Some(vorhanden) = zustand.rollen.get(&anfrage.server_id) {
                let rolle = Rolle::fuer(anfrage.server_id, vorhanden.clone());
                tracing::debug!(server = %anfrage.server_id, ?rolle, "Station abgelehnt: Rollenkonflikt");
                return Err(rolle.konflikt());
            }
            zustand.rollen.insert(anfrage.server_id, station.clone());
            zustand.stationen.push(station.clone());
        }

        if let Err(e) = station.starten(anfrage.voice_kanal).await {
            self.station_entfernen(&station);
            tracing::warn!(
                station = %anfrage.name,
                server = %anfrage.server_id,
                fehler = %e,
                "Station konnte nicht starten – Registrierung zurueckgenommen"
            );
            return Err(e);
        }

        // Ein Stopp direkt nach dem Start meldet `StationBeendet` selbst
        if !station.ist_live() {
            return Err(FunkError::NichtLive(anfrage.name));
        }

        self.ereignis_senden(RadioEreignis::StationGestartet {
            station: anfrage.name.clone(),
            server_id: anfrage.server_id,
            text_kanal: anfrage.text_kanal,
        });
        Ok(station)
    }

    /// Sucht eine Live-Station nach Namen
    ///
    /// Ein exakter Treffer (ohne Gross-/Kleinschreibung) gewinnt sofort,
    /// sonst nur ein eindeutiger Teilstring-Treffer.
    pub fn station_finden(&self, name: &str) -> Option<Station> {
        let stationen: Vec<Station> = self
            .stationen()
            .into_iter()
            .filter(|s| s.ist_live())
            .collect();

        let gesucht = name.to_lowercase();
        if let Some(exakt) = stationen.iter().find(|s| s.name().to_lowercase() == gesucht) {
            return Some(exakt.clone());
        }

        let mut treffer = stationen
            .into_iter()
            .filter(|s| s.name().to_lowercase().contains(&gesucht));
        match (treffer.next(), treffer.next()) {
            (Some(station), None) => Some(station),
            _ => None,
        }
    }

    /// Wie [`Registry::station_finden`], aber mit `NichtGefunden` als Fehler
    pub fn station_suchen(&self, name: &str) -> Result<Station> {
        self.station_finden(name).ok_or_else(|| {
            tracing::debug!(anfrage = name, "Keine eindeutige Station");
            FunkError::NichtGefunden(name.to_string())
        })
    }

    /// Schaltet einen Server bei einer Station ein
    pub async fn einschalten(
        &self,
        station: &Station,
        abonnent: ServerId,
        voice_kanal: ChannelId,
        text_kanal: ChannelId,
    ) -> Result<Arc<Hoerer>> {
        station.einschalten(abonnent, voice_kanal, text_kanal).await
    }

    /// Live-Stationen mit Hoereranzahl, in Startreihenfolge
    pub fn aufzaehlen(&self) -> Vec<StationsUebersicht> {
        self.stationen()
            .into_iter()
            .filter(|s| s.ist_live())
            .map(|s| StationsUebersicht {
                name: s.name().to_string(),
                hoerer_anzahl: s.hoerer_anzahl(),
            })
            .collect()
    }

    /// Alle registrierten Stationen (auch startende)
    pub fn stationen(&self) -> Vec<Station> {
        self.inner.zustand.read().stationen.clone()
    }

    /// Stoppt alle Stationen und wartet bis jede `Gestoppt` erreicht hat
    pub async fn alle_stoppen(&self) {
        let stationen = self.stationen();
        tracing::info!(anzahl = stationen.len(), "Stoppe alle Stationen");

        for station in &stationen {
            station.stoppen();
        }
        for station in &stationen {
            station.gestoppt_abwarten().await;
        }
    }

    // -----------------------------------------------------------------------
    // Rollen
    // -----------------------------------------------------------------------

    pub fn rolle_abfragen(&self, server: ServerId) -> Option<Rolle> {
        let station = self.inner.zustand.read().rollen.get(&server).cloned();
        station.map(|s| Rolle::fuer(server, s))
    }

    /// Entfernt die Rolle eines Servers ohne Bedingung; idempotent
    pub fn rolle_entfernen(&self, server: ServerId) -> Option<Rolle> {
        let station = self.inner.zustand.write().rollen.remove(&server);
        station.map(|s| Rolle::fuer(server, s))
    }

    pub fn rollen_anzahl(&self) -> usize {
        self.inner.zustand.read().rollen.len()
    }

    /// Anzahl der Eintraege (Rollen und Stationsliste), die auf `station` zeigen
    pub fn verweise_auf(&self, station: &Station) -> usize {
        let zustand = self.inner.zustand.read();
        zustand.rollen.values().filter(|s| s.ptr_eq(station)).count()
            + zustand.stationen.iter().filter(|s| s.ptr_eq(station)).count()
    }

    /// Reserviert die Hoerer-Rolle fuer einen Server
    pub(crate) fn rolle_reservieren(&self, server: ServerId, station: &Station) -> Result<()> {
        let mut zustand = self.inner.zustand.write();
        if let Some(vorhanden) = zustand.rollen.get(&server) {
            let rolle = Rolle::fuer(server, vorhanden.clone());
            tracing::debug!(server = %server, ?rolle, "Einschalten abgelehnt: Rollenkonflikt");
            return Err(rolle.konflikt());
        }
        zustand.rollen.insert(server, station.clone());
        Ok(())
    }

    /// Gibt die Rolle frei, falls sie noch auf `station` zeigt
    pub(crate) fn rolle_freigeben(&self, server: ServerId, station: &Station) -> bool {
        let mut zustand = self.inner.zustand.write();
        match zustand.rollen.get(&server) {
            Some(s) if s.ptr_eq(station) => {
                zustand.rollen.remove(&server);
                true
            }
            _ => false,
        }
    }

    /// Entfernt eine Station und alle Rollen, die noch auf sie zeigen
    pub(crate) fn station_entfernen(&self, station: &Station) {
        let mut zustand = self.inner.zustand.write();
        zustand.stationen.retain(|s| !s.ptr_eq(station));
        zustand.rollen.retain(|_, s| !s.ptr_eq(station));
    }

    // -----------------------------------------------------------------------
    // Ereignisse
    // -----------------------------------------------------------------------

    pub fn ereignisse_abonnieren(&self) -> broadcast::Receiver<RadioEreignis> {
        self.inner.ereignisse.subscribe()
    }

    /// Veroeffentlicht ein Ereignis; ohne Abonnenten wird es verworfen
    pub(crate) fn ereignis_senden(&self, ereignis: RadioEreignis) {
        tracing::debug!(?ereignis, "Radio-Ereignis");
        let _ = self.inner.ereignisse.send(ereignis);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::speicher::SpeicherTransport;
    use funkbruecke_audio::PcmCodec;
    use funkbruecke_core::UserId;

    fn registry() -> (Registry, SpeicherTransport) {
        let transport = SpeicherTransport::neu();
        let registry = Registry::neu(
            Arc::new(transport.clone()),
            Arc::new(PcmCodec),
            RadioConfig::default(),
        )
        .unwrap();
        (registry, transport)
    }

    fn anfrage(name: &str, server: ServerId) -> StationsAnfrage {
        StationsAnfrage {
            name: name.into(),
            beschreibung: String::new(),
            server_id: server,
            server_name: format!("{name}-server"),
            text_kanal: ChannelId::new(),
            voice_kanal: ChannelId::new(),
            host: Benutzer::neu(UserId::new(), "host"),
        }
    }

    #[test]
    fn ungueltige_config_wird_abgelehnt() {
        let config = RadioConfig {
            tick_intervall_ms: 0,
            ..RadioConfig::default()
        };
        let result = Registry::neu(
            Arc::new(SpeicherTransport::neu()),
            Arc::new(PcmCodec),
            config,
        );
        assert!(matches!(result, Err(FunkError::Konfiguration(_))));
    }

    #[tokio::test]
    async fn zweite_station_desselben_servers_ist_konflikt() {
        let (registry, _) = registry();
        let server = ServerId::new();

        let station = registry.station_starten(anfrage("jazz", server)).await.unwrap();
        assert!(station.ist_live());
        assert!(matches!(registry.rolle_abfragen(server), Some(Rolle::Host(_))));

        let result = registry.station_starten(anfrage("rock", server)).await;
        assert!(matches!(
            result,
            Err(FunkError::RollenKonflikt(RollenKonflikt::HostBelegt))
        ));
        assert_eq!(registry.stationen().len(), 1);
    }

    #[tokio::test]
    async fn hoerer_kann_keine_station_starten() {
        let (registry, _) = registry();
        let station = registry
            .station_starten(anfrage("jazz", ServerId::new()))
            .await
            .unwrap();
        let abonnent = ServerId::new();
        registry
            .einschalten(&station, abonnent, ChannelId::new(), ChannelId::new())
            .await
            .unwrap();

        assert!(matches!(registry.rolle_abfragen(abonnent), Some(Rolle::Hoerer(_))));
        let result = registry.station_starten(anfrage("rock", abonnent)).await;
        assert!(matches!(
            result,
            Err(FunkError::RollenKonflikt(RollenKonflikt::HoererBelegt))
        ));
    }

    #[tokio::test]
    async fn rolle_entfernen_ist_idempotent() {
        let (registry, _) = registry();
        let server = ServerId::new();
        registry.station_starten(anfrage("jazz", server)).await.unwrap();

        assert!(matches!(registry.rolle_entfernen(server), Some(Rolle::Host(_))));
        assert!(registry.rolle_entfernen(server).is_none());
        assert_eq!(registry.rollen_anzahl(), 0);
    }

    #[tokio::test]
    async fn fehlgeschlagener_start_hinterlaesst_nichts() {
        let (registry, transport) = registry();
        let server = ServerId::new();
        let anfrage = anfrage("jazz", server);
        transport.beitritt_verweigern(anfrage.voice_kanal);

        let result = registry.station_starten(anfrage).await;
        assert!(matches!(result, Err(FunkError::Transport(_))));
        assert!(registry.rolle_abfragen(server).is_none());
        assert!(registry.stationen().is_empty());

        // Server ist danach wieder frei
        registry.station_starten(self::anfrage("jazz", server)).await.unwrap();
    }

    #[tokio::test]
    async fn suchen_liefert_nicht_gefunden() {
        let (registry, _) = registry();
        registry
            .station_starten(anfrage("jazz", ServerId::new()))
            .await
            .unwrap();

        assert!(registry.station_suchen("JAZZ").is_ok());
        assert!(matches!(
            registry.station_suchen("polka"),
            Err(FunkError::NichtGefunden(_))
        ));
    }

    #[tokio::test]
    async fn ereignisse_werden_veroeffentlicht() {
        let (registry, _) = registry();
        let mut ereignisse = registry.ereignisse_abonnieren();
        let server = ServerId::new();

        let station = registry.station_starten(anfrage("jazz", server)).await.unwrap();
        assert!(matches!(
            ereignisse.recv().await.unwrap(),
            RadioEreignis::StationGestartet { server_id, .. } if server_id == server
        ));

        station.stoppen();
        station.gestoppt_abwarten().await;
        assert!(matches!(
            ereignisse.recv().await.unwrap(),
            RadioEreignis::StationBeendet { .. }
        ));
    }
}
