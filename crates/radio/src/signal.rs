//! Einmaliges Stoppsignal
//!
//! Ein `Stoppsignal` wechselt genau einmal von "laufend" nach "gestoppt".
//! Beliebig viele Tasks koennen darauf warten; weitere Ausloesungen sind
//! wirkungslos. Basiert auf `tokio::sync::watch`, damit auch ein spaet
//! startender Wartender den bereits gesetzten Zustand sieht.

use tokio::sync::watch;

#[derive(Debug)]
pub struct Stoppsignal {
    tx: watch::Sender<bool>,
}

impl Stoppsignal {
    pub fn neu() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Loest das Signal aus
    ///
    /// Gibt nur beim ersten Aufruf `true` zurueck.
    pub fn ausloesen(&self) -> bool {
        self.tx.send_if_modified(|gestoppt| {
            if *gestoppt {
                false
            } else {
                *gestoppt = true;
                true
            }
        })
    }

    pub fn ist_ausgeloest(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wartet bis das Signal ausgeloest wurde (sofort, falls bereits gesetzt)
    pub async fn abwarten(&self) {
        let mut rx = self.tx.subscribe();
        // Der Sender lebt solange `self` lebt, daher kein Fehlerfall
        let _ = rx.wait_for(|gestoppt| *gestoppt).await;
    }
}

impl Default for Stoppsignal {
    fn default() -> Self {
        Self::neu()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn nur_erste_ausloesung_zaehlt() {
        let signal = Stoppsignal::neu();
        assert!(!signal.ist_ausgeloest());
        assert!(signal.ausloesen());
        assert!(!signal.ausloesen(), "Zweite Ausloesung darf nichts bewirken");
        assert!(signal.ist_ausgeloest());
    }

    #[tokio::test]
    async fn spaeter_wartender_sieht_signal() {
        let signal = Stoppsignal::neu();
        signal.ausloesen();
        tokio::time::timeout(Duration::from_millis(100), signal.abwarten())
            .await
            .expect("Bereits gesetztes Signal muss sofort zurueckkehren");
    }

    #[tokio::test]
    async fn mehrere_wartende_werden_geweckt() {
        let signal = Arc::new(Stoppsignal::neu());
        let mut tasks = Vec::new();
        for _ in 0..4 {
            let s = Arc::clone(&signal);
            tasks.push(tokio::spawn(async move { s.abwarten().await }));
        }

        tokio::task::yield_now().await;
        signal.ausloesen();

        for t in tasks {
            tokio::time::timeout(Duration::from_millis(500), t)
                .await
                .expect("Wartender wurde nicht geweckt")
                .unwrap();
        }
    }
}
