//! Station – Lebenszyklus einer Sendung
//!
//! ```text
//!   Startet ──(Beitritt + Bereitschaft + Loops laufen)──> Live
//!      │                                                   │
//!      │ Beitritt scheitert                                │ stoppen() / Transport bricht ab
//!      v                                                   v
//!   Gestoppt <────────(Hoerer abgebaut, abgemeldet)───── Stoppt
//! ```
//!
//! Pro Station laufen zwei Tasks: die Empfangs-Loop (eingehende Frames an
//! den Mixer) und die Tick-Schleife des Mixers. Der Abbau laeuft immer in
//! der Empfangs-Loop, egal ob `stoppen()` aufgerufen wurde oder der
//! Eingangsstrom des Transports endet.

use crate::config::RadioConfig;
use crate::hoerer::Hoerer;
use crate::mixer::{prozent_zu_faktor, Mixer, MixerAusgabe};
use crate::registry::{Registry, RegistryInner, StationsAnfrage};
use crate::signal::Stoppsignal;
use crate::transport::{
    bereitschaft_abwarten, BeitrittsModus, EingehenderFrame, SprecherUpdate, VoiceTransport,
    VoiceVerbindung,
};
use chrono::{DateTime, Utc};
use funkbruecke_audio::CodecFabrik;
use funkbruecke_core::{
    Benutzer, ChannelId, FunkError, RadioEreignis, Result, ServerId, SprecherId, TransportError,
    UserId,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

// ---------------------------------------------------------------------------
// Zustand und Metadaten
// ---------------------------------------------------------------------------

/// Lebenszyklus-Zustand einer Station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StationZustand {
    Startet,
    Live,
    Stoppt,
    /// Endzustand
    Gestoppt,
}

/// Momentaufnahme der Stationsdaten
///
/// `Station::meta()` liefert eine unabhaengige Kopie; spaetere
/// Aenderungen an der Station sind darin nicht sichtbar.
#[derive(Debug, Clone)]
pub struct StationMeta {
    pub name: String,
    pub beschreibung: String,
    pub server_id: ServerId,
    pub server_name: String,
    pub host: Benutzer,
    pub text_kanal: ChannelId,
    pub hoerer: Vec<Arc<Hoerer>>,
    pub gestartet_am: DateTime<Utc>,
}

#[derive(Default)]
struct SprecherZuordnung {
    /// Benutzer -> Sprecher-Stream laut Speaking-Update
    sprecher: HashMap<UserId, SprecherId>,
    /// Lautstaerke-Faktoren fuer Benutzer ohne bekannten Stream
    ausstehend: HashMap<UserId, f32>,
}

// ---------------------------------------------------------------------------
// Station
// ---------------------------------------------------------------------------

/// Handle auf eine Station, `Clone` teilt den Zustand
#[derive(Clone)]
pub struct Station {
    inner: Arc<StationInner>,
}

pub(crate) struct StationInner {
    name: String,
    server_id: ServerId,
    text_kanal: ChannelId,
    meta: RwLock<StationMeta>,
    mixer: Mixer,
    verbindung: Mutex<Option<Arc<dyn VoiceVerbindung>>>,
    stop: Stoppsignal,
    zustand: watch::Sender<StationZustand>,
    zuordnung: Mutex<SprecherZuordnung>,
    registry: Weak<RegistryInner>,
    transport: Arc<dyn VoiceTransport>,
    config: RadioConfig,
}

impl Station {
    /// Legt eine Station im Zustand `Startet` an (noch ohne Verbindung)
    pub(crate) fn neu(
        anfrage: &StationsAnfrage,
        registry: Weak<RegistryInner>,
        transport: Arc<dyn VoiceTransport>,
        codec: Arc<dyn CodecFabrik>,
        config: RadioConfig,
    ) -> Result<Self> {
        let mixer = Mixer::neu(anfrage.name.clone(), codec, &config)?;
        let (zustand, _) = watch::channel(StationZustand::Startet);

        let meta = StationMeta {
            name: anfrage.name.clone(),
            beschreibung: anfrage.beschreibung.clone(),
            server_id: anfrage.server_id,
            server_name: anfrage.server_name.clone(),
            host: anfrage.host.clone(),
            text_kanal: anfrage.text_kanal,
            hoerer: Vec::new(),
            gestartet_am: Utc::now(),
        };

        Ok(Self {
            inner: Arc::new(StationInner {
                name: anfrage.name.clone(),
                server_id: anfrage.server_id,
                text_kanal: anfrage.text_kanal,
                meta: RwLock::new(meta),
                mixer,
                verbindung: Mutex::new(None),
                stop: Stoppsignal::neu(),
                zustand,
                zuordnung: Mutex::new(SprecherZuordnung::default()),
                registry,
                transport,
                config,
            }),
        })
    }

    pub(crate) fn aus_inner(inner: Arc<StationInner>) -> Self {
        Self { inner }
    }

    fn registry(&self) -> Option<Registry> {
        self.inner.registry.upgrade().map(Registry::aus_inner)
    }

    // -----------------------------------------------------------------------
    // Lebenszyklus
    // -----------------------------------------------------------------------

    /// Tritt dem Voice-Kanal als Empfaenger bei und startet beide Loops
    ///
    /// Erst wenn Empfangs-Loop und Mixer laufen, wechselt die Station auf
    /// `Live`. Bei einem Fehler endet sie direkt in `Gestoppt`. Wurde sie
    /// waehrend des Starts gestoppt, gibt es `NichtLive` und die Loops bauen
    /// sie wieder ab.
    pub(crate) async fn starten(&self, voice_kanal: ChannelId) -> Result<()> {
        let verbindung = match self
            .inner
            .transport
            .beitreten(self.inner.server_id, voice_kanal, BeitrittsModus::EMPFANGEN)
            .await
        {
            Ok(v) => v,
            Err(e) => {
                self.inner.zustand.send_replace(StationZustand::Gestoppt);
                return Err(e.into());
            }
        };

        let schwach = Arc::downgrade(&self.inner);
        verbindung.bei_sprecher_update(Box::new(move |update| {
            if let Some(inner) = schwach.upgrade() {
                Station::aus_inner(inner).sprecher_update(update);
            }
        }));

        let empfang = match self.verbindung_vorbereiten(verbindung.as_ref()).await {
            Ok(rx) => rx,
            Err(e) => {
                verbindung.trennen().await;
                self.inner.zustand.send_replace(StationZustand::Gestoppt);
                return Err(e.into());
            }
        };
        *self.inner.verbindung.lock() = Some(verbindung);

        let mixer = self.inner.mixer.clone();
        tokio::spawn(async move { mixer.laufen().await });

        let station = self.clone();
        tokio::spawn(async move { station.empfangs_loop(empfang).await });

        let stop = &self.inner.stop;
        let live = self.inner.zustand.send_if_modified(|zustand| {
            if *zustand == StationZustand::Startet && !stop.ist_ausgeloest() {
                *zustand = StationZustand::Live;
                true
            } else {
                false
            }
        });
        if !live {
            tracing::info!(station = %self.inner.name, "Station waehrend des Starts gestoppt");
            return Err(FunkError::NichtLive(self.inner.name.clone()));
        }

        tracing::info!(
            station = %self.inner.name,
            server = %self.inner.server_id,
            kanal = %voice_kanal,
            "Station ist live"
        );
        Ok(())
    }

    async fn verbindung_vorbereiten(
        &self,
        verbindung: &dyn VoiceVerbindung,
    ) -> std::result::Result<mpsc::Receiver<EingehenderFrame>, TransportError> {
        bereitschaft_abwarten(
            verbindung,
            self.inner.config.bereitschaft_poll(),
            self.inner.config.bereitschaft_timeout(),
        )
        .await?;
        verbindung
            .eingehend_uebernehmen()
            .ok_or(TransportError::Geschlossen)
    }

    async fn empfangs_loop(self, mut empfang: mpsc::Receiver<EingehenderFrame>) {
        loop {
            tokio::select! {
                biased;
                _ = self.inner.stop.abwarten() => break,
                frame = empfang.recv() => match frame {
                    Some(frame) => self.inner.mixer.einreihen(frame),
                    None => {
                        tracing::warn!(
                            station = %self.inner.name,
                            "Eingangsstrom beendet – Station wird gestoppt"
                        );
                        break;
                    }
                },
            }
        }

        self.herunterfahren().await;
    }

    /// Abbau in fester Reihenfolge; laeuft genau einmal (Empfangs-Loop)
    async fn herunterfahren(&self) {
        self.inner.stop.ausloesen();
        self.inner.zustand.send_replace(StationZustand::Stoppt);

        self.inner.mixer.stoppen();

        let verbindung = self.inner.verbindung.lock().take();
        if let Some(verbindung) = verbindung {
            verbindung.trennen().await;
        }

        let hoerer = std::mem::take(&mut self.inner.meta.write().hoerer);
        let anzahl = hoerer.len();
        let mut abbau = JoinSet::new();
        for h in hoerer {
            abbau.spawn(async move { h.beenden().await });
        }
        while let Some(ergebnis) = abbau.join_next().await {
            if let Err(e) = ergebnis {
                tracing::error!(station = %self.inner.name, fehler = %e, "Hoerer-Abbau abgebrochen");
            }
        }

        if let Some(registry) = self.registry() {
            registry.station_entfernen(self);
            registry.ereignis_senden(RadioEreignis::StationBeendet {
                station: self.inner.name.clone(),
                server_id: self.inner.server_id,
                text_kanal: self.inner.text_kanal,
            });
        }

        self.inner.zustand.send_replace(StationZustand::Gestoppt);
        tracing::info!(station = %self.inner.name, hoerer = anzahl, "Station gestoppt");
    }

    /// Stoppt die Station; idempotent
    ///
    /// Der eigentliche Abbau laeuft asynchron in der Empfangs-Loop, siehe
    /// [`Station::gestoppt_abwarten`].
    pub fn stoppen(&self) {
        if self.inner.stop.ausloesen() {
            tracing::debug!(station = %self.inner.name, "Stopp angefordert");
        }
    }

    /// Wartet bis die Station `Gestoppt` erreicht hat
    pub async fn gestoppt_abwarten(&self) {
        let mut rx = self.inner.zustand.subscribe();
        let _ = rx.wait_for(|z| *z == StationZustand::Gestoppt).await;
    }

    pub fn zustand(&self) -> StationZustand {
        *self.inner.zustand.borrow()
    }

    pub fn ist_live(&self) -> bool {
        self.zustand() == StationZustand::Live
    }

    // -----------------------------------------------------------------------
    // Zugriff
    // -----------------------------------------------------------------------

    pub fn meta(&self) -> StationMeta {
        self.inner.meta.read().clone()
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn server_id(&self) -> ServerId {
        self.inner.server_id
    }

    pub fn text_kanal(&self) -> ChannelId {
        self.inner.text_kanal
    }

    pub fn mixer(&self) -> &Mixer {
        &self.inner.mixer
    }

    pub fn hoerer_anzahl(&self) -> usize {
        self.inner.meta.read().hoerer.len()
    }

    pub fn ptr_eq(&self, other: &Station) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // -----------------------------------------------------------------------
    // Hoerer
    // -----------------------------------------------------------------------

    /// Schaltet einen Server als Hoerer ein
    ///
    /// Die Rolle wird vor dem Beitritt reserviert und bei einem Fehler
    /// wieder freigegeben.
    pub async fn einschalten(
        &self,
        abonnent: ServerId,
        voice_kanal: ChannelId,
        text_kanal: ChannelId,
    ) -> Result<Arc<Hoerer>> {
        if !self.ist_live() {
            return Err(FunkError::NichtLive(self.inner.name.clone()));
        }

        let registry = self
            .registry()
            .ok_or_else(|| FunkError::NichtLive(self.inner.name.clone()))?;
        registry.rolle_reservieren(abonnent, self)?;

        let hoerer = match Hoerer::starten(
            self.inner.transport.as_ref(),
            abonnent,
            voice_kanal,
            text_kanal,
            Arc::downgrade(&self.inner),
            self.inner.name.clone(),
            &self.inner.config,
        )
        .await
        {
            Ok(h) => h,
            Err(e) => {
                registry.rolle_freigeben(abonnent, self);
                tracing::warn!(
                    station = %self.inner.name,
                    server = %abonnent,
                    fehler = %e,
                    "Einschalten fehlgeschlagen – Rolle freigegeben"
                );
                return Err(e);
            }
        };

        let aufgenommen = {
            let mut meta = self.inner.meta.write();
            // Zustand unter dem Meta-Lock pruefen: der Abbau setzt `Stoppt`
            // bevor er die Hoerer-Liste uebernimmt. Ausnahme von der
            // Lock-Reihenfolge: Zustand und Mixer-Ausgaben werden hier unter
            // dem Meta-Lock genommen, beide sind Blatt-Locks.
            if self.ist_live() {
                meta.hoerer.push(Arc::clone(&hoerer));
                self.inner
                    .mixer
                    .ausgabe_hinzufuegen(Arc::clone(&hoerer) as Arc<dyn MixerAusgabe>);
                true
            } else {
                false
            }
        };

        if !aufgenommen {
            hoerer.beenden().await;
            return Err(FunkError::NichtLive(self.inner.name.clone()));
        }

        registry.ereignis_senden(RadioEreignis::HoererVerbunden {
            station: self.inner.name.clone(),
            server_id: abonnent,
            text_kanal,
        });
        Ok(hoerer)
    }

    /// Entfernt den Hoerer eines Servers und schliesst seine Verbindung
    pub async fn hoerer_entfernen_nach_id(&self, server: ServerId) -> bool {
        let hoerer = self
            .inner
            .meta
            .read()
            .hoerer
            .iter()
            .find(|h| h.server_id() == server)
            .cloned();

        match hoerer {
            Some(h) => {
                h.beenden().await;
                true
            }
            None => false,
        }
    }

    /// Entfernt einen Hoerer aus Mixer, Hoerer-Liste und Registry
    ///
    /// Idempotent; wird vom Hoerer selbst bei seinem Abbau aufgerufen.
    pub fn hoerer_entfernen(&self, hoerer: &Hoerer) {
        self.inner.mixer.ausgabe_entfernen(hoerer);

        self.inner
            .meta
            .write()
            .hoerer
            .retain(|h| !std::ptr::eq(Arc::as_ptr(h), hoerer));

        if let Some(registry) = self.registry() {
            if registry.rolle_freigeben(hoerer.server_id(), self) {
                registry.ereignis_senden(RadioEreignis::HoererGetrennt {
                    station: self.inner.name.clone(),
                    server_id: hoerer.server_id(),
                    text_kanal: hoerer.text_kanal(),
                });
            }
        }
    }

    // -----------------------------------------------------------------------
    // Sprecher und Lautstaerke
    // -----------------------------------------------------------------------

    /// Verarbeitet ein Speaking-Update (Benutzer <-> Stream)
    pub(crate) fn sprecher_update(&self, update: SprecherUpdate) {
        let (alt, ausstehend) = {
            let mut zuordnung = self.inner.zuordnung.lock();
            let alt = zuordnung.sprecher.insert(update.benutzer, update.sprecher);
            (alt, zuordnung.ausstehend.remove(&update.benutzer))
        };

        // Neuer Stream desselben Benutzers (z.B. nach erneutem Beitritt)
        if let Some(alt) = alt.filter(|alt| *alt != update.sprecher) {
            self.inner.mixer.verstaerkung_uebertragen(alt, update.sprecher);
        }

        if let Some(faktor) = ausstehend {
            if let Err(e) = self.inner.mixer.lautstaerke_setzen(update.sprecher, faktor) {
                tracing::warn!(station = %self.inner.name, fehler = %e, "Ausstehende Lautstaerke verworfen");
            }
        }
    }

    /// Setzt die Lautstaerke eines Benutzers in Prozent (0–200)
    ///
    /// Gibt `true` zurueck wenn sie sofort gilt, `false` wenn sie beim
    /// ersten Speaking-Update des Benutzers angewendet wird.
    pub fn lautstaerke_fuer_benutzer(&self, benutzer: UserId, prozent: f32) -> Result<bool> {
        let faktor = prozent_zu_faktor(prozent)?;

        let sprecher = {
            let mut zuordnung = self.inner.zuordnung.lock();
            match zuordnung.sprecher.get(&benutzer).copied() {
                Some(sprecher) => Some(sprecher),
                None => {
                    zuordnung.ausstehend.insert(benutzer, faktor);
                    None
                }
            }
        };

        match sprecher {
            Some(sprecher) => {
                self.inner.mixer.lautstaerke_setzen(sprecher, faktor)?;
                Ok(true)
            }
            None => {
                tracing::debug!(
                    station = %self.inner.name,
                    benutzer = %benutzer,
                    prozent,
                    "Lautstaerke vorgemerkt"
                );
                Ok(false)
            }
        }
    }
}

impl PartialEq for Station {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Station {}

impl std::fmt::Debug for Station {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Station")
            .field("name", &self.inner.name)
            .field("server_id", &self.inner.server_id)
            .field("zustand", &self.zustand())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::speicher::SpeicherTransport;
    use funkbruecke_audio::PcmCodec;

    fn anfrage(name: &str) -> StationsAnfrage {
        StationsAnfrage {
            name: name.into(),
            beschreibung: "Testsendung".into(),
            server_id: ServerId::new(),
            server_name: "Testserver".into(),
            text_kanal: ChannelId::new(),
            voice_kanal: ChannelId::new(),
            host: Benutzer::neu(UserId::new(), "host"),
        }
    }

    fn lose_station(name: &str) -> Station {
        Station::neu(
            &anfrage(name),
            Weak::new(),
            Arc::new(SpeicherTransport::neu()),
            Arc::new(PcmCodec),
            RadioConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn neue_station_startet() {
        let station = lose_station("jazz");
        assert_eq!(station.zustand(), StationZustand::Startet);
        assert_eq!(station.name(), "jazz");
        assert_eq!(station.hoerer_anzahl(), 0);
        assert_eq!(station, station.clone());
    }

    #[test]
    fn meta_ist_unabhaengige_kopie() {
        let station = lose_station("jazz");
        let mut kopie = station.meta();
        kopie.name = "anders".into();
        kopie.beschreibung.push_str(" geaendert");
        assert_eq!(station.meta().name, "jazz");
        assert_eq!(station.meta().beschreibung, "Testsendung");
    }

    #[test]
    fn lautstaerke_wird_vorgemerkt_und_spaeter_angewendet() {
        let station = lose_station("jazz");
        let benutzer = UserId::new();

        assert!(!station.lautstaerke_fuer_benutzer(benutzer, 150.0).unwrap());
        assert_eq!(station.mixer().lautstaerke(SprecherId(42)), 1.0);

        station.sprecher_update(SprecherUpdate {
            benutzer,
            sprecher: SprecherId(42),
            spricht: true,
        });
        assert_eq!(station.mixer().lautstaerke(SprecherId(42)), 1.5);

        // Zuordnung bekannt: sofort wirksam
        assert!(station.lautstaerke_fuer_benutzer(benutzer, 20.0).unwrap());
        assert_eq!(station.mixer().lautstaerke(SprecherId(42)), 0.2);
    }

    #[test]
    fn neuer_stream_uebernimmt_lautstaerke() {
        let station = lose_station("jazz");
        let benutzer = UserId::new();
        let update = |sprecher| SprecherUpdate {
            benutzer,
            sprecher: SprecherId(sprecher),
            spricht: true,
        };

        station.sprecher_update(update(7));
        station.lautstaerke_fuer_benutzer(benutzer, 60.0).unwrap();
        station.sprecher_update(update(7));
        assert_eq!(station.mixer().lautstaerke(SprecherId(7)), 0.6);

        station.sprecher_update(update(8));
        assert_eq!(station.mixer().lautstaerke(SprecherId(8)), 0.6);
        assert_eq!(station.mixer().lautstaerke(SprecherId(7)), 1.0, "Alter Stream vergessen");
    }

    #[tokio::test]
    async fn stopp_waehrend_des_starts_ist_nicht_live() {
        let transport = SpeicherTransport::neu();
        transport.bereitschaft_verzoegern(Some(std::time::Duration::from_millis(100)));
        let station = Station::neu(
            &anfrage("jazz"),
            Weak::new(),
            Arc::new(transport),
            Arc::new(PcmCodec),
            RadioConfig::default(),
        )
        .unwrap();

        let s = station.clone();
        let start = tokio::spawn(async move { s.starten(ChannelId::new()).await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        station.stoppen();

        let result = start.await.unwrap();
        assert!(matches!(result, Err(FunkError::NichtLive(_))));
        tokio::time::timeout(std::time::Duration::from_secs(2), station.gestoppt_abwarten())
            .await
            .expect("Loops muessen die Station abbauen");
        assert!(!station.ist_live());
    }

    #[test]
    fn lautstaerke_ausserhalb_des_bereichs() {
        let station = lose_station("jazz");
        let result = station.lautstaerke_fuer_benutzer(UserId::new(), 250.0);
        assert!(matches!(result, Err(FunkError::UngueltigeLautstaerke(_))));
    }

    #[tokio::test]
    async fn einschalten_vor_live_wird_abgelehnt() {
        let station = lose_station("jazz");
        let result = station
            .einschalten(ServerId::new(), ChannelId::new(), ChannelId::new())
            .await;
        assert!(matches!(result, Err(FunkError::NichtLive(_))));
    }

    #[tokio::test]
    async fn stoppen_ist_idempotent() {
        let station = lose_station("jazz");
        station.starten(ChannelId::new()).await.unwrap();
        assert!(station.ist_live());

        station.stoppen();
        station.stoppen();
        tokio::time::timeout(std::time::Duration::from_secs(2), station.gestoppt_abwarten())
            .await
            .expect("Station muss stoppen");
        assert_eq!(station.zustand(), StationZustand::Gestoppt);
        station.stoppen();
    }
}
