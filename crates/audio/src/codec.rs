//! Codec-Traits und Implementierungen
//!
//! Der Mischpfad arbeitet ausschliesslich mit interleaved i16-PCM
//! (48 kHz Stereo). Ein `CodecFabrik` erzeugt pro Sprecher einen
//! zustandsbehafteten Decoder und pro Station einen Encoder.
//!
//! - [`OpusCodec`]: audiopus, Standard fuer echte Voice-Verbindungen
//! - [`PcmCodec`]: rohe little-endian i16-Samples, fuer Loopback und Tests

use audiopus::{
    coder::{Decoder, Encoder},
    Application, Bitrate, Channels, SampleRate,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AudioError, AudioResult};
use crate::format::{FENSTER_LAENGE, KANAELE};
use crate::header::OpusHeader;

/// Maximale Groesse eines Opus-Pakets in Bytes
const MAX_PAKET_BYTES: usize = 4000;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Zustandsbehafteter Decoder fuer genau einen Sprecher-Stream
pub trait FrameDecoder: Send {
    /// Dekodiert ein Paket zu interleaved i16-PCM
    fn decode(&mut self, paket: &[u8]) -> AudioResult<Vec<i16>>;
}

/// Encoder fuer den gemischten Stream einer Station
pub trait FrameEncoder: Send {
    /// Kodiert ein volles Misch-Fenster
    fn encode(&mut self, pcm: &[i16]) -> AudioResult<Vec<u8>>;
}

/// Erzeugt Decoder und Encoder eines Codecs
pub trait CodecFabrik: Send + Sync {
    fn decoder(&self) -> AudioResult<Box<dyn FrameDecoder>>;
    fn encoder(&self) -> AudioResult<Box<dyn FrameEncoder>>;
}

// ---------------------------------------------------------------------------
// Opus
// ---------------------------------------------------------------------------

/// Opus-Anwendungsprofil
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpusAnwendung {
    Voip,
    /// Musik und gemischte Inhalte (Standard fuer Stationen)
    #[default]
    Audio,
    LowDelay,
}

/// Encoder-Einstellungen fuer den Stationsstream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpusEinstellungen {
    /// Anwendungsprofil des Encoders
    pub anwendung: OpusAnwendung,
    /// Ziel-Bitrate in kbit/s (None = Opus-Automatik)
    pub bitrate_kbps: Option<u32>,
}

impl Default for OpusEinstellungen {
    fn default() -> Self {
        Self {
            anwendung: OpusAnwendung::Audio,
            bitrate_kbps: None,
        }
    }
}

/// Opus-Encoder: kodiert 20 ms Stereo-PCM zu Opus-Bytes
pub struct OpusEncoder {
    encoder: Encoder,
}

impl OpusEncoder {
    /// Erstellt einen neuen Encoder (48 kHz Stereo)
    pub fn new(einstellungen: &OpusEinstellungen) -> AudioResult<Self> {
        let anwendung = match einstellungen.anwendung {
            OpusAnwendung::Voip => Application::Voip,
            OpusAnwendung::Audio => Application::Audio,
            OpusAnwendung::LowDelay => Application::LowDelay,
        };

        let mut encoder = Encoder::new(SampleRate::Hz48000, Channels::Stereo, anwendung)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

        if let Some(kbps) = einstellungen.bitrate_kbps {
            if !(6..=510).contains(&kbps) {
                return Err(AudioError::Konfiguration(format!(
                    "Bitrate {kbps} kbit/s ausserhalb 6–510"
                )));
            }
            encoder
                .set_bitrate(Bitrate::BitsPerSecond(kbps as i32 * 1000))
                .map_err(|e| AudioError::CodecFehler(e.to_string()))?;
        }

        debug!(
            anwendung = ?einstellungen.anwendung,
            bitrate_kbps = ?einstellungen.bitrate_kbps,
            "OpusEncoder erstellt"
        );

        Ok(Self { encoder })
    }
}

impl FrameEncoder for OpusEncoder {
    fn encode(&mut self, pcm: &[i16]) -> AudioResult<Vec<u8>> {
        if pcm.len() != FENSTER_LAENGE {
            return Err(AudioError::Konfiguration(format!(
                "PCM-Frame muss {} Samples lang sein, war {}",
                FENSTER_LAENGE,
                pcm.len()
            )));
        }

        let mut output = vec![0u8; MAX_PAKET_BYTES];
        let written = self
            .encoder
            .encode(pcm, &mut output)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

        output.truncate(written);
        Ok(output)
    }
}

/// Opus-Decoder: dekodiert ein Paket eines Sprechers zu Stereo-PCM
pub struct OpusDecoder {
    decoder: Decoder,
}

impl OpusDecoder {
    /// Erstellt einen neuen Decoder (48 kHz Stereo)
    pub fn new() -> AudioResult<Self> {
        let decoder = Decoder::new(SampleRate::Hz48000, Channels::Stereo)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;
        Ok(Self { decoder })
    }
}

impl FrameDecoder for OpusDecoder {
    fn decode(&mut self, paket: &[u8]) -> AudioResult<Vec<i16>> {
        // Der Header bestimmt die erwartete Sample-Anzahl
        let header = OpusHeader::parse(paket)?;
        let mut output = vec![0i16; header.samples_pro_kanal() * KANAELE];

        let decoded = self
            .decoder
            .decode(Some(paket), &mut output, false)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

        output.truncate(decoded * KANAELE);
        Ok(output)
    }
}

/// Fabrik fuer Opus-Decoder und -Encoder
#[derive(Debug, Clone, Default)]
pub struct OpusCodec {
    einstellungen: OpusEinstellungen,
}

impl OpusCodec {
    pub fn new(einstellungen: OpusEinstellungen) -> Self {
        Self { einstellungen }
    }
}

impl CodecFabrik for OpusCodec {
    fn decoder(&self) -> AudioResult<Box<dyn FrameDecoder>> {
        Ok(Box::new(OpusDecoder::new()?))
    }

    fn encoder(&self) -> AudioResult<Box<dyn FrameEncoder>> {
        Ok(Box::new(OpusEncoder::new(&self.einstellungen)?))
    }
}

// ---------------------------------------------------------------------------
// Roh-PCM
// ---------------------------------------------------------------------------

/// Roh-PCM-Codec: Pakete sind little-endian i16-Samples ohne Header
///
/// Verlustfrei und deterministisch, daher fuer Loopback-Betrieb und
/// Tests des Mischpfads geeignet.
#[derive(Debug, Clone, Copy, Default)]
pub struct PcmCodec;

impl PcmCodec {
    /// Packt Samples in ein Roh-PCM-Paket
    pub fn packen(pcm: &[i16]) -> Vec<u8> {
        pcm.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    /// Entpackt ein Roh-PCM-Paket
    pub fn entpacken(paket: &[u8]) -> AudioResult<Vec<i16>> {
        if paket.is_empty() || paket.len() % 2 != 0 {
            return Err(AudioError::UngueltigerHeader(format!(
                "Roh-PCM-Paket mit ungerader oder leerer Laenge: {}",
                paket.len()
            )));
        }
        Ok(paket
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect())
    }
}

impl FrameDecoder for PcmCodec {
    fn decode(&mut self, paket: &[u8]) -> AudioResult<Vec<i16>> {
        Self::entpacken(paket)
    }
}

impl FrameEncoder for PcmCodec {
    fn encode(&mut self, pcm: &[i16]) -> AudioResult<Vec<u8>> {
        Ok(Self::packen(pcm))
    }
}

impl CodecFabrik for PcmCodec {
    fn decoder(&self) -> AudioResult<Box<dyn FrameDecoder>> {
        Ok(Box::new(PcmCodec))
    }

    fn encoder(&self) -> AudioResult<Box<dyn FrameEncoder>> {
        Ok(Box::new(PcmCodec))
    }
}
