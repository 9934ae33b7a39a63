//! funkbruecke-radio – Stationen, Mischpfad und Relay
//!
//! Ein Server stellt einen Voice-Kanal als Station bereit; beliebig viele
//! andere Server schalten sich ein und bekommen den gemischten Stream in
//! einen eigenen Voice-Kanal weitergeleitet.
//!
//! ## Module
//! - [`registry`] – Prozessweites Verzeichnis, eine Rolle pro Server
//! - [`station`] – Lebenszyklus einer Sendung, Empfangs-Loop
//! - [`mixer`] – 20-ms-Tick: Puffer leeren, mischen, kodieren, verteilen
//! - [`dekoder`] – Dekodier-Puffer pro Sprecher-Stream
//! - [`hoerer`] – Relay in den Voice-Kanal eines Abonnenten
//! - [`transport`] – Vertrag zum Voice-Transport plus In-Memory-Transport
//! - [`signal`] – Einmaliges, idempotentes Stoppsignal
//! - [`config`] – Zeitkonstanten und Puffergrenzen

pub mod config;
pub mod dekoder;
pub mod hoerer;
pub mod mixer;
pub mod registry;
pub mod signal;
pub mod station;
pub mod transport;

pub use config::RadioConfig;
pub use hoerer::Hoerer;
pub use mixer::{Mixer, MixerAusgabe};
pub use registry::{Registry, Rolle, StationsAnfrage, StationsUebersicht};
pub use station::{Station, StationMeta, StationZustand};
pub use transport::{
    speicher::SpeicherTransport, BeitrittsModus, EingehenderFrame, SprecherUpdate,
    VoiceTransport, VoiceVerbindung,
};
