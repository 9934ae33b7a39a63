//! funkbruecke-audio – Audio-Format und Codecs
//!
//! - Feste Mischformat-Konstanten (48 kHz, Stereo, 20 ms Fenster)
//! - Opus-TOC-Header-Parser (Frame-Dauer und Sample-Anzahl eines Pakets)
//! - Codec-Traits mit Opus- (audiopus) und Roh-PCM-Implementierung

pub mod codec;
pub mod error;
pub mod format;
pub mod header;

// Bequeme Re-Exporte der wichtigsten Typen
pub use codec::{
    CodecFabrik, FrameDecoder, FrameEncoder, OpusAnwendung, OpusCodec, OpusDecoder,
    OpusEinstellungen, OpusEncoder, PcmCodec,
};
pub use error::{AudioError, AudioResult};
pub use format::{ABTASTRATE, FENSTER_LAENGE, KANAELE, SAMPLES_PRO_KANAL, STILLE_FRAME};
pub use header::OpusHeader;
