//! Radio-Konfiguration
//!
//! Zeitkonstanten des Mischpfads und Grenzen der Dekodier-Puffer.
//! Wird als `[radio]`-Abschnitt aus der Server-Konfiguration geladen;
//! alle Felder haben Standardwerte.

use funkbruecke_audio::format::{samples_fuer_ms, FENSTER_LAENGE};
use funkbruecke_core::{FunkError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Konfiguration fuer Stationen, Mixer und Hoerer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// Abstand der Misch-Ticks in Millisekunden
    pub tick_intervall_ms: u64,
    /// Zeitlimit fuer die Zustellung eines Frames an einen Hoerer
    pub zustell_timeout_ms: u64,
    /// Polling-Intervall beim Warten auf Transport-Bereitschaft
    pub bereitschaft_poll_ms: u64,
    /// Maximale Wartezeit auf Transport-Bereitschaft
    pub bereitschaft_timeout_ms: u64,
    /// Obergrenze eines Sprecher-Puffers in Millisekunden Audio
    pub max_puffer_ms: u64,
    /// Kapazitaet des Ereignis-Broadcasts
    pub ereignis_kapazitaet: usize,
    /// Nach so langer Stille wird der Decoder eines Sprechers verworfen
    pub sprecher_leerlauf_ms: u64,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            tick_intervall_ms: 20,
            zustell_timeout_ms: 1000,
            bereitschaft_poll_ms: 10,
            bereitschaft_timeout_ms: 10_000,
            max_puffer_ms: 1000,
            ereignis_kapazitaet: 256,
            sprecher_leerlauf_ms: 5000,
        }
    }
}

impl RadioConfig {
    /// Prueft die Werte auf Plausibilitaet
    pub fn validieren(&self) -> Result<()> {
        if self.tick_intervall_ms == 0 {
            return Err(FunkError::Konfiguration(
                "tick_intervall_ms muss groesser 0 sein".into(),
            ));
        }
        if self.bereitschaft_poll_ms == 0 {
            return Err(FunkError::Konfiguration(
                "bereitschaft_poll_ms muss groesser 0 sein".into(),
            ));
        }
        if self.max_puffer_samples() < FENSTER_LAENGE {
            return Err(FunkError::Konfiguration(format!(
                "max_puffer_ms={} ist kleiner als ein Misch-Fenster",
                self.max_puffer_ms
            )));
        }
        if self.ereignis_kapazitaet == 0 {
            return Err(FunkError::Konfiguration(
                "ereignis_kapazitaet muss groesser 0 sein".into(),
            ));
        }
        if self.sprecher_leerlauf_ms < self.tick_intervall_ms {
            return Err(FunkError::Konfiguration(format!(
                "sprecher_leerlauf_ms={} ist kuerzer als ein Tick",
                self.sprecher_leerlauf_ms
            )));
        }
        Ok(())
    }

    pub fn tick_intervall(&self) -> Duration {
        Duration::from_millis(self.tick_intervall_ms)
    }

    pub fn zustell_timeout(&self) -> Duration {
        Duration::from_millis(self.zustell_timeout_ms)
    }

    pub fn bereitschaft_poll(&self) -> Duration {
        Duration::from_millis(self.bereitschaft_poll_ms)
    }

    pub fn bereitschaft_timeout(&self) -> Duration {
        Duration::from_millis(self.bereitschaft_timeout_ms)
    }

    /// Obergrenze eines Sprecher-Puffers in interleaved Samples
    pub fn max_puffer_samples(&self) -> usize {
        samples_fuer_ms(self.max_puffer_ms)
    }

    /// Anzahl leerer Ticks, nach denen ein Sprecher-Decoder verworfen wird
    pub fn sprecher_leerlauf_ticks(&self) -> u32 {
        let ticks = self.sprecher_leerlauf_ms / self.tick_intervall_ms.max(1);
        ticks.clamp(1, u32::MAX as u64) as u32
    }
}
