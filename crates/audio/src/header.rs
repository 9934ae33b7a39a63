//! Opus-Paket-Header (TOC-Byte, RFC 6716 Abschnitt 3.1)
//!
//! Liefert aus dem ersten Byte eines Opus-Pakets die Frame-Dauer und
//! die Anzahl der Frames, damit der Decoder seinen Ausgabepuffer exakt
//! dimensionieren kann.
//!
//! ```text
//!  0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+
//! | config  |s| c |
//! +-+-+-+-+-+-+-+-+
//! ```
//!
//! - `config`: Modus (SILK/Hybrid/CELT), Bandbreite und Frame-Dauer
//! - `s`: Stereo-Flag
//! - `c`: Frame-Anzahl-Code (0 = 1 Frame, 1/2 = 2 Frames, 3 = beliebig)

use crate::error::{AudioError, AudioResult};
use crate::format::ABTASTRATE;

/// Maximale Dauer eines Opus-Pakets in Mikrosekunden
const MAX_PAKET_DAUER_US: u32 = 120_000;

/// Dekodierter TOC-Header eines Opus-Pakets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpusHeader {
    /// Konfigurationsnummer 0..=31
    pub config: u8,
    /// Stereo-Flag aus dem TOC-Byte
    pub stereo: bool,
    /// Dauer eines einzelnen Frames in Mikrosekunden
    pub frame_dauer_us: u32,
    /// Anzahl der Frames im Paket
    pub anzahl_frames: u8,
}

impl OpusHeader {
    /// Dekodiert den Header aus einem Opus-Paket
    ///
    /// # Fehler
    /// - Leeres Paket
    /// - Code-3-Paket ohne Frame-Anzahl-Byte oder mit 0 Frames
    /// - Gesamtdauer ueber 120 ms
    pub fn parse(paket: &[u8]) -> AudioResult<Self> {
        let toc = *paket
            .first()
            .ok_or_else(|| AudioError::UngueltigerHeader("Leeres Opus-Paket".into()))?;

        let config = toc >> 3;
        let stereo = toc & 0x04 != 0;
        let frame_dauer_us = frame_dauer_us(config);

        let anzahl_frames = match toc & 0x03 {
            0 => 1,
            1 | 2 => 2,
            _ => {
                let zaehler = paket.get(1).ok_or_else(|| {
                    AudioError::UngueltigerHeader("Code-3-Paket ohne Frame-Anzahl".into())
                })?;
                let anzahl = zaehler & 0x3F;
                if anzahl == 0 {
                    return Err(AudioError::UngueltigerHeader(
                        "Code-3-Paket mit 0 Frames".into(),
                    ));
                }
                anzahl
            }
        };

        let header = Self {
            config,
            stereo,
            frame_dauer_us,
            anzahl_frames,
        };

        if header.dauer_us() > MAX_PAKET_DAUER_US {
            return Err(AudioError::UngueltigerHeader(format!(
                "Paketdauer {} us ueberschreitet {} us",
                header.dauer_us(),
                MAX_PAKET_DAUER_US
            )));
        }

        Ok(header)
    }

    /// Gesamtdauer aller Frames in Mikrosekunden
    pub fn dauer_us(&self) -> u32 {
        self.frame_dauer_us * self.anzahl_frames as u32
    }

    /// Samples pro Kanal, die das Paket bei 48 kHz ergibt
    pub fn samples_pro_kanal(&self) -> usize {
        (self.dauer_us() as u64 * ABTASTRATE as u64 / 1_000_000) as usize
    }
}

/// Frame-Dauer nach Konfigurationsnummer (RFC 6716 Tabelle 2)
fn frame_dauer_us(config: u8) -> u32 {
    match config {
        // SILK-only: 10, 20, 40, 60 ms
        0..=11 => [10_000, 20_000, 40_000, 60_000][(config % 4) as usize],
        // Hybrid: 10, 20 ms
        12..=15 => [10_000, 20_000][(config % 2) as usize],
        // CELT-only: 2.5, 5, 10, 20 ms
        _ => [2_500, 5_000, 10_000, 20_000][(config % 4) as usize],
    }
}
