//! funkbruecke-server – Bibliotheks-Root
//!
//! Baut die Registry aus der Konfiguration auf und haelt sie bis zum
//! Shutdown-Signal am Leben. Die Befehlsschicht (Chat-Kommandos) setzt auf
//! [`Server::registry`] auf.

pub mod config;
pub mod logging;

use anyhow::Result;
use config::ServerConfig;
use funkbruecke_radio::{Registry, SpeicherTransport};
use std::sync::Arc;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
    registry: Registry,
}

impl Server {
    /// Erstellt einen Server mit In-Memory-Transport (Loopback-Betrieb)
    pub fn neu(config: ServerConfig) -> Result<Self> {
        let registry = Registry::neu(
            Arc::new(SpeicherTransport::neu()),
            config.audio.codec_erstellen(),
            config.radio.clone(),
        )?;
        Ok(Self { config, registry })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Laeuft bis zum Shutdown-Signal und stoppt dann alle Stationen
    ///
    /// Reihenfolge:
    /// 1. Ereignis-Log starten
    /// 2. Periodische Stationsuebersicht starten (falls konfiguriert)
    /// 3. Auf Ctrl-C warten
    /// 4. Alle Stationen stoppen und auf deren Abbau warten
    pub async fn starten(self) -> Result<()> {
        tracing::info!(
            codec = ?self.config.audio.codec,
            tick_ms = self.config.radio.tick_intervall_ms,
            zustell_timeout_ms = self.config.radio.zustell_timeout_ms,
            "Server startet"
        );

        let mut ereignisse = self.registry.ereignisse_abonnieren();
        let ereignis_log = tokio::spawn(async move {
            use tokio::sync::broadcast::error::RecvError;
            loop {
                match ereignisse.recv().await {
                    Ok(ereignis) => tracing::info!(?ereignis, "Radio-Ereignis"),
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!(verpasst = n, "Ereignis-Log kommt nicht hinterher")
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let status = self.config.status.intervall().map(|intervall| {
            let registry = self.registry.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(intervall);
                loop {
                    ticker.tick().await;
                    let stationen = registry.aufzaehlen();
                    tracing::info!(anzahl = stationen.len(), "Stationsuebersicht");
                    for s in stationen {
                        tracing::info!(station = %s.name, hoerer = s.hoerer_anzahl, "Station live");
                    }
                }
            })
        });

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown-Signal empfangen, Stationen werden beendet");

        self.registry.alle_stoppen().await;

        if let Some(status) = status {
            status.abort();
        }
        ereignis_log.abort();

        tracing::info!("Server beendet");
        Ok(())
    }
}
