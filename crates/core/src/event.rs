//! Radio-Ereignisse
//!
//! Die Registry veroeffentlicht Lebenszyklus-Ereignisse ueber einen
//! tokio-Broadcast-Kanal. Die Befehlsschicht kann sie in den jeweiligen
//! Benachrichtigungs-Kanal (`text_kanal`) posten.

use crate::types::{ChannelId, ServerId};
use serde::{Deserialize, Serialize};

/// Alle Lebenszyklus-Ereignisse von Stationen und Hoerern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadioEreignis {
    /// Eine Station ist live gegangen
    StationGestartet {
        station: String,
        server_id: ServerId,
        text_kanal: ChannelId,
    },
    /// Eine Station wurde beendet (explizit oder durch Transportfehler)
    StationBeendet {
        station: String,
        server_id: ServerId,
        text_kanal: ChannelId,
    },
    /// Ein Server hat sich in eine Station eingeschaltet
    HoererVerbunden {
        station: String,
        server_id: ServerId,
        text_kanal: ChannelId,
    },
    /// Ein Hoerer wurde entfernt (Stopp, Zeitlimit oder Stationsende)
    HoererGetrennt {
        station: String,
        server_id: ServerId,
        text_kanal: ChannelId,
    },
}

impl RadioEreignis {
    /// Kanal, in den eine Benachrichtigung zu diesem Ereignis gehoert
    pub fn text_kanal(&self) -> ChannelId {
        match self {
            Self::StationGestartet { text_kanal, .. }
            | Self::StationBeendet { text_kanal, .. }
            | Self::HoererVerbunden { text_kanal, .. }
            | Self::HoererGetrennt { text_kanal, .. } => *text_kanal,
        }
    }
}
