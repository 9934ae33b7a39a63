//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use funkbruecke_audio::{CodecFabrik, OpusCodec, OpusEinstellungen, PcmCodec};
use funkbruecke_radio::RadioConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct ServerConfig {
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Stationen, Mixer und Hoerer
    pub radio: RadioConfig,
    /// Codec-Auswahl
    pub audio: AudioEinstellungen,
    /// Periodische Statusausgabe
    pub status: StatusEinstellungen,
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Codec fuer Dekodieren und Enkodieren der Voice-Frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecArt {
    #[default]
    Opus,
    /// Rohes PCM (Loopback ohne Kompression)
    Pcm,
}

/// Audio-Einstellungen
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioEinstellungen {
    pub codec: CodecArt,
    pub opus: OpusEinstellungen,
}

impl AudioEinstellungen {
    /// Erstellt die Codec-Fabrik fuer alle Stationen
    pub fn codec_erstellen(&self) -> Arc<dyn CodecFabrik> {
        match self.codec {
            CodecArt::Opus => Arc::new(OpusCodec::new(self.opus.clone())),
            CodecArt::Pcm => Arc::new(PcmCodec),
        }
    }
}

/// Einstellungen der periodischen Stationsuebersicht im Log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusEinstellungen {
    /// Intervall in Sekunden (0 = deaktiviert)
    pub intervall_s: u64,
}

impl Default for StatusEinstellungen {
    fn default() -> Self {
        Self { intervall_s: 60 }
    }
}

impl StatusEinstellungen {
    pub fn intervall(&self) -> Option<Duration> {
        (self.intervall_s > 0).then(|| Duration::from_secs(self.intervall_s))
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei
    /// Falls die Datei nicht existiert, werden Standardwerte verwendet
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                config
                    .radio
                    .validieren()
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }
}
