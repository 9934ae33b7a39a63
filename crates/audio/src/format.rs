//! Mischformat
//!
//! Alle Stationen mischen in einem festen Format: 48 kHz, Stereo,
//! interleaved i16, ein Fenster pro 20 ms Tick.

/// Abtastrate des Mischpfads in Hz
pub const ABTASTRATE: u32 = 48_000;

/// Kanalanzahl (Stereo, interleaved L/R)
pub const KANAELE: usize = 2;

/// Dauer eines Misch-Fensters in Millisekunden
pub const FENSTER_MS: u64 = 20;

/// Samples pro Kanal in einem Fenster (20 ms bei 48 kHz)
pub const SAMPLES_PRO_KANAL: usize = (ABTASTRATE as usize / 1000) * FENSTER_MS as usize;

/// Interleaved Samples pro Fenster (960 * 2)
pub const FENSTER_LAENGE: usize = SAMPLES_PRO_KANAL * KANAELE;

/// Minimaler gueltiger Opus-Stille-Frame (CELT FB 20 ms, ein Frame)
pub const STILLE_FRAME: [u8; 3] = [0xF8, 0xFF, 0xFE];

/// Anzahl interleaved Samples fuer eine Dauer in Millisekunden
pub fn samples_fuer_ms(ms: u64) -> usize {
    (ABTASTRATE as usize / 1000) * ms as usize * KANAELE
}
