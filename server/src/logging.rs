//! Logging-Setup fuer den Server

use crate::config::LoggingEinstellungen;
use tracing_subscriber::{fmt, EnvFilter};

/// Ausgabeformat der Logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn aus_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// `RUST_LOG` hat Vorrang vor dem konfigurierten Level
pub fn filter_erstellen(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialisiert tracing-subscriber; unbekannte Formate fallen auf Text zurueck
pub fn initialisieren(einstellungen: &LoggingEinstellungen) {
    let format = LogFormat::aus_name(&einstellungen.format);
    let filter = filter_erstellen(&einstellungen.level);

    match format.unwrap_or(LogFormat::Text) {
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        LogFormat::Text => {
            fmt().with_env_filter(filter).with_target(true).init();
        }
    }

    if format.is_none() {
        tracing::warn!(format = %einstellungen.format, "Unbekanntes Log-Format – Text wird verwendet");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formate_werden_erkannt() {
        assert_eq!(LogFormat::aus_name("json"), Some(LogFormat::Json));
        assert_eq!(LogFormat::aus_name("Text"), Some(LogFormat::Text));
        assert_eq!(LogFormat::aus_name("xml"), None);
    }
}
