//! Mixer – Echtzeit-Mischpfad einer Station
//!
//! Alle 20 ms (auch wenn niemand spricht):
//!
//! ```text
//! Sprecher-Puffer (je ein Fenster, falls voll)
//!     |
//!     v
//! Σ sample * verstaerkung   (saettigender i32-Akkumulator)
//!     |
//!     v
//! Saettigung auf [-32767, 32767]
//!     |
//!     v
//! Encoder (einmal pro Tick)
//!     |
//!     +--> Ausgabe 1 (eigener Task)
//!     +--> Ausgabe 2 (eigener Task)
//!     +--> ...
//! ```
//!
//! ## Locks
//! - `sprecher`: Decoder-Map und Verstaerkungen (Empfangsseite + Tick)
//! - `ausgaben`: registrierte Ausgaben (Hoerer an-/abmelden, Verteilung)
//!
//! Eine Ausgabe, die einen Fehler meldet, wird entfernt; die Zustellung an
//! alle anderen Ausgaben laeuft unabhaengig davon weiter.
//!
//! Decoder verstummter Sprecher werden nach `sprecher_leerlauf_ms` wieder
//! freigegeben; ihre Lautstaerke-Einstellung bleibt erhalten.

use crate::config::RadioConfig;
use crate::dekoder::SprecherDecoder;
use crate::signal::Stoppsignal;
use crate::transport::EingehenderFrame;
use async_trait::async_trait;
use bytes::Bytes;
use funkbruecke_audio::{CodecFabrik, FrameEncoder, FENSTER_LAENGE};
use funkbruecke_core::{FunkError, Result, SprecherId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Maximaler Betrag eines gemischten Samples
const SAMPLE_GRENZE: i32 = 0x7fff;

/// Neutrale Verstaerkung fuer Sprecher ohne Einstellung
const NEUTRALE_VERSTAERKUNG: f32 = 1.0;

/// Hoechste einstellbare Lautstaerke in Prozent
pub const MAX_LAUTSTAERKE_PROZENT: f32 = 200.0;

// ---------------------------------------------------------------------------
// MixerAusgabe
// ---------------------------------------------------------------------------

/// Empfaenger des gemischten, kodierten Streams
///
/// Wird einmal pro Tick mit dem naechsten Frame aufgerufen. Gibt die
/// Ausgabe einen Fehler zurueck, entfernt der Mixer sie.
#[async_trait]
pub trait MixerAusgabe: Send + Sync + 'static {
    async fn opus_schreiben(&self, frame: Bytes) -> Result<()>;
}

/// Identitaet einer Ausgabe (Datenzeiger, ohne vtable)
fn ausgabe_zeiger(ausgabe: &dyn MixerAusgabe) -> *const () {
    ausgabe as *const dyn MixerAusgabe as *const ()
}

// ---------------------------------------------------------------------------
// Mischen
// ---------------------------------------------------------------------------

/// Rechnet eine Lautstaerke in Prozent (0–200) in einen Faktor um
pub fn prozent_zu_faktor(prozent: f32) -> Result<f32> {
    if !prozent.is_finite() || !(0.0..=MAX_LAUTSTAERKE_PROZENT).contains(&prozent) {
        return Err(FunkError::UngueltigeLautstaerke(prozent));
    }
    Ok(prozent / 100.0)
}

/// Addiert ein Sprecher-Fenster mit Verstaerkung in den Akkumulator
///
/// Jeder Summand wird fuer sich gerundet; die Integer-Summe ist damit
/// unabhaengig von der Reihenfolge der Sprecher, solange sie nicht an die
/// i32-Grenzen stoesst. Dort saettigt sie.
fn akkumulieren(summe: &mut [i32], fenster: &[i16], faktor: f32) {
    for (acc, &sample) in summe.iter_mut().zip(fenster) {
        // `as` saettigt bei f32 -> i32
        let summand = (sample as f32 * faktor).round() as i32;
        *acc = acc.saturating_add(summand);
    }
}

/// Saettigt den Akkumulator auf den symmetrischen i16-Bereich
fn saettigen(summe: &[i32], ausgabe: &mut [i16]) {
    for (ziel, &wert) in ausgabe.iter_mut().zip(summe) {
        *ziel = wert.clamp(-SAMPLE_GRENZE, SAMPLE_GRENZE) as i16;
    }
}

/// Mischt mehrere Fenster mit ihren Verstaerkungen zu einem Fenster
pub fn mischen<'a>(beitraege: impl IntoIterator<Item = (&'a [i16], f32)>, ausgabe: &mut [i16]) {
    let mut summe = vec![0i32; ausgabe.len()];
    for (fenster, faktor) in beitraege {
        akkumulieren(&mut summe, fenster, faktor);
    }
    saettigen(&summe, ausgabe);
}

// ---------------------------------------------------------------------------
// Mixer
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SprecherZustand {
    decoder: HashMap<SprecherId, Arc<Mutex<SprecherDecoder>>>,
    verstaerkungen: HashMap<SprecherId, f32>,
}

/// Mixer einer Station, `Clone` teilt den Zustand
#[derive(Clone)]
pub struct Mixer {
    inner: Arc<MixerInner>,
}

struct MixerInner {
    /// Stationsname (nur fuer Logs)
    station: String,
    codec: Arc<dyn CodecFabrik>,
    /// Nur der Tick kodiert
    encoder: Mutex<Box<dyn FrameEncoder>>,
    sprecher: Mutex<SprecherZustand>,
    ausgaben: Mutex<Vec<Arc<dyn MixerAusgabe>>>,
    max_puffer_samples: usize,
    /// Leere Ticks bis ein Sprecher-Decoder freigegeben wird
    leerlauf_ticks: u32,
    tick_intervall: Duration,
    stop: Stoppsignal,
}

impl Mixer {
    /// Erstellt einen Mixer; der Encoder wird sofort angelegt
    pub fn neu(
        station: impl Into<String>,
        codec: Arc<dyn CodecFabrik>,
        config: &RadioConfig,
    ) -> Result<Self> {
        let encoder = codec.encoder().map_err(|e| e.als_enkodierung())?;
        Ok(Self {
            inner: Arc::new(MixerInner {
                station: station.into(),
                codec,
                encoder: Mutex::new(encoder),
                sprecher: Mutex::new(SprecherZustand::default()),
                ausgaben: Mutex::new(Vec::new()),
                max_puffer_samples: config.max_puffer_samples(),
                leerlauf_ticks: config.sprecher_leerlauf_ticks(),
                tick_intervall: config.tick_intervall(),
                stop: Stoppsignal::neu(),
            }),
        })
    }

    /// Leitet einen eingehenden Frame an den Decoder seines Sprechers
    ///
    /// Der Decoder wird beim ersten Frame eines Sprechers angelegt.
    /// Dekodierfehler werden geloggt, der Frame verworfen.
    pub fn einreihen(&self, frame: EingehenderFrame) {
        let decoder = {
            let mut zustand = self.inner.sprecher.lock();
            match zustand.decoder.get(&frame.sprecher) {
                Some(decoder) => Arc::clone(decoder),
                None => {
                    let decoder = match self.inner.codec.decoder() {
                        Ok(d) => d,
                        Err(e) => {
                            tracing::warn!(
                                station = %self.inner.station,
                                sprecher = %frame.sprecher,
                                fehler = %e,
                                "Decoder konnte nicht erstellt werden – Frame verworfen"
                            );
                            return;
                        }
                    };
                    let neu = Arc::new(Mutex::new(SprecherDecoder::neu(
                        frame.sprecher,
                        decoder,
                        self.inner.max_puffer_samples,
                    )));
                    zustand.decoder.insert(frame.sprecher, Arc::clone(&neu));
                    tracing::debug!(
                        station = %self.inner.station,
                        sprecher = %frame.sprecher,
                        "Neuer Sprecher-Stream"
                    );
                    neu
                }
            }
        };

        // Dekodieren ausserhalb des Map-Locks
        if let Err(e) = decoder.lock().paket_verarbeiten(&frame.daten) {
            tracing::warn!(
                station = %self.inner.station,
                sprecher = %frame.sprecher,
                bytes = frame.daten.len(),
                fehler = %e,
                "Voice-Paket verworfen"
            );
        };
    }

    /// Setzt den Verstaerkungsfaktor eines Sprechers (1.0 = neutral, max 2.0)
    ///
    /// Wirkt ab dem naechsten Tick, auch fuer Sprecher die noch nie
    /// gesprochen haben.
    pub fn lautstaerke_setzen(&self, sprecher: SprecherId, faktor: f32) -> Result<()> {
        prozent_zu_faktor(faktor * 100.0)?;
        self.inner
            .sprecher
            .lock()
            .verstaerkungen
            .insert(sprecher, faktor);
        tracing::debug!(station = %self.inner.station, sprecher = %sprecher, faktor, "Lautstaerke gesetzt");
        Ok(())
    }

    /// Setzt die Lautstaerke eines Sprechers in Prozent (0–200)
    pub fn lautstaerke_prozent_setzen(&self, sprecher: SprecherId, prozent: f32) -> Result<()> {
        self.lautstaerke_setzen(sprecher, prozent_zu_faktor(prozent)?)
    }

    /// Verschiebt die Lautstaerke von einem alten auf einen neuen Stream
    pub fn verstaerkung_uebertragen(&self, alt: SprecherId, neu: SprecherId) {
        let mut zustand = self.inner.sprecher.lock();
        if let Some(faktor) = zustand.verstaerkungen.remove(&alt) {
            zustand.verstaerkungen.insert(neu, faktor);
        }
    }

    /// Aktueller Verstaerkungsfaktor eines Sprechers
    pub fn lautstaerke(&self, sprecher: SprecherId) -> f32 {
        self.inner
            .sprecher
            .lock()
            .verstaerkungen
            .get(&sprecher)
            .copied()
            .unwrap_or(NEUTRALE_VERSTAERKUNG)
    }

    /// Anzahl der gepufferten Samples eines Sprechers (None = unbekannt)
    pub fn gepuffert(&self, sprecher: SprecherId) -> Option<usize> {
        let decoder = self.inner.sprecher.lock().decoder.get(&sprecher).cloned();
        decoder.map(|d| d.lock().gepuffert())
    }

    pub fn ausgabe_hinzufuegen(&self, ausgabe: Arc<dyn MixerAusgabe>) {
        self.inner.ausgaben.lock().push(ausgabe);
    }

    /// Entfernt eine Ausgabe; idempotent
    pub fn ausgabe_entfernen(&self, ausgabe: &dyn MixerAusgabe) -> bool {
        let ziel = ausgabe_zeiger(ausgabe);
        let mut ausgaben = self.inner.ausgaben.lock();
        let vorher = ausgaben.len();
        ausgaben.retain(|a| ausgabe_zeiger(a.as_ref()) != ziel);
        ausgaben.len() != vorher
    }

    pub fn ausgaben_anzahl(&self) -> usize {
        self.inner.ausgaben.lock().len()
    }

    pub fn enthaelt_ausgabe(&self, ausgabe: &dyn MixerAusgabe) -> bool {
        let ziel = ausgabe_zeiger(ausgabe);
        self.inner
            .ausgaben
            .lock()
            .iter()
            .any(|a| ausgabe_zeiger(a.as_ref()) == ziel)
    }

    /// Ein Misch-Zyklus: Puffer leeren, mischen, kodieren, verteilen
    ///
    /// Gibt die Handles der Zustell-Tasks zurueck. Die Tick-Schleife
    /// wartet nicht darauf.
    pub fn tick(&self) -> Vec<JoinHandle<()>> {
        let beitraege = self.fenster_sammeln();

        let mut pcm = vec![0i16; FENSTER_LAENGE];
        mischen(
            beitraege.iter().map(|(fenster, faktor)| (fenster.as_slice(), *faktor)),
            &mut pcm,
        );

        let frame = match self.inner.encoder.lock().encode(&pcm) {
            Ok(frame) => Bytes::from(frame),
            Err(e) => {
                tracing::warn!(
                    station = %self.inner.station,
                    fehler = %e,
                    "Enkodierung fehlgeschlagen – Tick uebersprungen"
                );
                return Vec::new();
            }
        };

        self.verteilen(frame)
    }

    /// Entnimmt jedem Sprecher hoechstens ein Fenster
    ///
    /// Decoder, deren Puffer laenger als die Leerlaufgrenze leer war, werden
    /// dabei freigegeben. Ein Decoder, den `einreihen` gerade haelt, bleibt.
    fn fenster_sammeln(&self) -> Vec<(Vec<i16>, f32)> {
        let mut zustand = self.inner.sprecher.lock();
        let SprecherZustand {
            decoder,
            verstaerkungen,
        } = &mut *zustand;
        let mut beitraege = Vec::with_capacity(decoder.len());

        decoder.retain(|sprecher, eintrag| {
            let mut fenster = vec![0i16; FENSTER_LAENGE];
            let mut sd = eintrag.lock();
            if sd.fenster_entnehmen(&mut fenster) {
                let faktor = verstaerkungen
                    .get(sprecher)
                    .copied()
                    .unwrap_or(NEUTRALE_VERSTAERKUNG);
                beitraege.push((fenster, faktor));
                return true;
            }
            if sd.leere_ticks() >= self.inner.leerlauf_ticks && Arc::strong_count(eintrag) == 1 {
                tracing::debug!(
                    station = %self.inner.station,
                    sprecher = %sd.sprecher(),
                    verworfen = sd.verworfen(),
                    "Sprecher verstummt – Decoder freigegeben"
                );
                return false;
            }
            true
        });

        beitraege
    }

    /// Stellt einen Frame nebenlaeufig an alle Ausgaben zu
    fn verteilen(&self, frame: Bytes) -> Vec<JoinHandle<()>> {
        let ausgaben: Vec<Arc<dyn MixerAusgabe>> = self.inner.ausgaben.lock().clone();

        ausgaben
            .into_iter()
            .map(|ausgabe| {
                let mixer = self.clone();
                let frame = frame.clone();
                tokio::spawn(async move {
                    if let Err(e) = ausgabe.opus_schreiben(frame).await {
                        mixer.ausgabe_entfernen(ausgabe.as_ref());
                        if e.ist_pipeline_fehler() {
                            tracing::debug!(
                                station = %mixer.inner.station,
                                fehler = %e,
                                "Ausgabe nach Zustellfehler entfernt"
                            );
                        } else {
                            tracing::warn!(
                                station = %mixer.inner.station,
                                fehler = %e,
                                "Ausgabe nach unerwartetem Fehler entfernt"
                            );
                        }
                    }
                })
            })
            .collect()
    }

    /// Tick-Schleife; laeuft bis `stoppen()` aufgerufen wird
    ///
    /// Verpasste Ticks werden uebersprungen, Ticks ueberlappen nie.
    pub async fn laufen(&self) {
        let mut intervall = tokio::time::interval(self.inner.tick_intervall);
        intervall.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(station = %self.inner.station, "Mixer laeuft");

        loop {
            tokio::select! {
                biased;
                _ = self.inner.stop.abwarten() => break,
                _ = intervall.tick() => {
                    let start = Instant::now();
                    // Zustellung laeuft in eigenen Tasks weiter
                    drop(self.tick());
                    let dauer = start.elapsed();
                    if dauer > self.inner.tick_intervall {
                        tracing::warn!(
                            station = %self.inner.station,
                            dauer_ms = dauer.as_millis() as u64,
                            "Tick langsamer als Intervall – naechste Ticks werden uebersprungen"
                        );
                    }
                }
            }
        }

        tracing::info!(station = %self.inner.station, "Mixer gestoppt");
    }

    /// Beendet die Tick-Schleife; idempotent
    pub fn stoppen(&self) {
        self.inner.stop.ausloesen();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
