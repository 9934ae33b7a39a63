//! In-Memory Voice-Transport
//!
//! Simuliert Voice-Verbindungen innerhalb des Prozesses: Frames koennen
//! eingespeist werden, gesendete Frames werden aufgezeichnet. Zusaetzlich
//! lassen sich Fehlerfaelle ausloesen (Beitritt scheitert, Senden haengt,
//! Bereitschaft verzoegert, Verbindung bricht ab).
//!
//! Wird vom Server im Loopback-Betrieb und von den Tests verwendet.

use super::{
    BeitrittsModus, EingehenderFrame, SprecherCallback, SprecherUpdate, VoiceTransport,
    VoiceVerbindung,
};
use async_trait::async_trait;
use bytes::Bytes;
use funkbruecke_core::{ChannelId, ServerId, TransportError};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Kapazitaet des Eingangsstroms pro Verbindung (Frames)
const EINGANG_KAPAZITAET: usize = 256;

// ---------------------------------------------------------------------------
// SpeicherTransport
// ---------------------------------------------------------------------------

/// In-Memory-Transport, `Clone` teilt den Zustand
#[derive(Clone, Default)]
pub struct SpeicherTransport {
    inner: Arc<SpeicherInner>,
}

struct SpeicherInner {
    verbindungen: Mutex<Vec<Arc<SpeicherVerbindung>>>,
    /// Beitritte zu diesen Kanaelen schlagen fehl
    fehlerhafte_kanaele: Mutex<HashSet<ChannelId>>,
    /// Bereitschaft nach Beitritt (None = nie bereit)
    bereitschaft: Mutex<Option<Duration>>,
    /// Neue Verbindungen blockieren beim Senden
    senden_blockiert: AtomicBool,
}

impl Default for SpeicherInner {
    fn default() -> Self {
        Self {
            verbindungen: Mutex::new(Vec::new()),
            fehlerhafte_kanaele: Mutex::new(HashSet::new()),
            bereitschaft: Mutex::new(Some(Duration::ZERO)),
            senden_blockiert: AtomicBool::new(false),
        }
    }
}

impl SpeicherTransport {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Laesst alle kuenftigen Beitritte zu `kanal` scheitern
    pub fn beitritt_verweigern(&self, kanal: ChannelId) {
        self.inner.fehlerhafte_kanaele.lock().insert(kanal);
    }

    /// Setzt die Bereitschaftsverzoegerung neuer Verbindungen (None = nie bereit)
    pub fn bereitschaft_verzoegern(&self, verzoegerung: Option<Duration>) {
        *self.inner.bereitschaft.lock() = verzoegerung;
    }

    /// Neue Verbindungen nehmen gesendete Frames nie ab
    pub fn senden_blockieren(&self, blockiert: bool) {
        self.inner.senden_blockiert.store(blockiert, Ordering::SeqCst);
    }

    /// Juengste Verbindung eines Servers
    pub fn verbindung(&self, server: ServerId) -> Option<Arc<SpeicherVerbindung>> {
        self.inner
            .verbindungen
            .lock()
            .iter()
            .rev()
            .find(|v| v.server == server)
            .cloned()
    }

    /// Alle jemals aufgebauten Verbindungen
    pub fn verbindungen(&self) -> Vec<Arc<SpeicherVerbindung>> {
        self.inner.verbindungen.lock().clone()
    }
}

#[async_trait]
impl VoiceTransport for SpeicherTransport {
    async fn beitreten(
        &self,
        server: ServerId,
        kanal: ChannelId,
        modus: BeitrittsModus,
    ) -> Result<Arc<dyn VoiceVerbindung>, TransportError> {
        if self.inner.fehlerhafte_kanaele.lock().contains(&kanal) {
            tracing::debug!(server = %server, kanal = %kanal, "Beitritt verweigert (simuliert)");
            return Err(TransportError::Beitritt(format!("Kanal {kanal} nicht erreichbar")));
        }

        let bereit_ab = (*self.inner.bereitschaft.lock()).map(|d| Instant::now() + d);
        let verbindung = Arc::new(SpeicherVerbindung::neu(
            server,
            kanal,
            modus,
            bereit_ab,
            self.inner.senden_blockiert.load(Ordering::SeqCst),
        ));
        self.inner.verbindungen.lock().push(Arc::clone(&verbindung));

        tracing::debug!(server = %server, kanal = %kanal, ?modus, "Speicher-Verbindung aufgebaut");
        Ok(verbindung)
    }
}

// ---------------------------------------------------------------------------
// SpeicherVerbindung
// ---------------------------------------------------------------------------

/// Eine simulierte Voice-Verbindung
pub struct SpeicherVerbindung {
    pub server: ServerId,
    pub kanal: ChannelId,
    pub modus: BeitrittsModus,
    bereit_ab: Option<Instant>,
    eingang_tx: Mutex<Option<mpsc::Sender<EingehenderFrame>>>,
    eingang_rx: Mutex<Option<mpsc::Receiver<EingehenderFrame>>>,
    gesendet: Mutex<Vec<Bytes>>,
    senden_blockiert: AtomicBool,
    geschlossen: AtomicBool,
    getrennt: AtomicBool,
    callbacks: Mutex<Vec<SprecherCallback>>,
}

impl SpeicherVerbindung {
    fn neu(
        server: ServerId,
        kanal: ChannelId,
        modus: BeitrittsModus,
        bereit_ab: Option<Instant>,
        senden_blockiert: bool,
    ) -> Self {
        let (tx, rx) = mpsc::channel(EINGANG_KAPAZITAET);
        Self {
            server,
            kanal,
            modus,
            bereit_ab,
            eingang_tx: Mutex::new(Some(tx)),
            eingang_rx: Mutex::new(Some(rx)),
            gesendet: Mutex::new(Vec::new()),
            senden_blockiert: AtomicBool::new(senden_blockiert),
            geschlossen: AtomicBool::new(false),
            getrennt: AtomicBool::new(false),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    /// Speist einen Frame eines Sprechers ein
    ///
    /// Gibt `false` zurueck wenn der Eingang voll oder abgebrochen ist.
    pub fn frame_einspeisen(&self, frame: EingehenderFrame) -> bool {
        match self.eingang_tx.lock().as_ref() {
            Some(tx) => tx.try_send(frame).is_ok(),
            None => false,
        }
    }

    /// Meldet ein Speaking-Update an alle registrierten Callbacks
    pub fn sprecher_melden(&self, update: SprecherUpdate) {
        for callback in self.callbacks.lock().iter() {
            callback(update);
        }
    }

    /// Simuliert einen Verbindungsabbruch: der Eingangsstrom endet
    pub fn abbrechen(&self) {
        self.eingang_tx.lock().take();
    }

    /// Schaltet das Blockieren des Sendepfads um
    pub fn senden_blockieren(&self, blockiert: bool) {
        self.senden_blockiert.store(blockiert, Ordering::SeqCst);
    }

    /// Bisher gesendete Frames
    pub fn gesendet(&self) -> Vec<Bytes> {
        self.gesendet.lock().clone()
    }

    pub fn ist_geschlossen(&self) -> bool {
        self.geschlossen.load(Ordering::SeqCst)
    }

    pub fn ist_getrennt(&self) -> bool {
        self.getrennt.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceVerbindung for SpeicherVerbindung {
    fn ist_bereit(&self) -> bool {
        match self.bereit_ab {
            Some(ab) => Instant::now() >= ab,
            None => false,
        }
    }

    async fn frame_senden(&self, daten: Bytes) -> Result<(), TransportError> {
        if self.geschlossen.load(Ordering::SeqCst) || self.getrennt.load(Ordering::SeqCst) {
            return Err(TransportError::Geschlossen);
        }
        if self.senden_blockiert.load(Ordering::SeqCst) {
            // Transport nimmt nichts mehr ab
            std::future::pending::<()>().await;
        }
        self.gesendet.lock().push(daten);
        Ok(())
    }

    fn eingehend_uebernehmen(&self) -> Option<mpsc::Receiver<EingehenderFrame>> {
        self.eingang_rx.lock().take()
    }

    fn bei_sprecher_update(&self, callback: SprecherCallback) {
        self.callbacks.lock().push(callback);
    }

    async fn schliessen(&self) {
        self.geschlossen.store(true, Ordering::SeqCst);
        self.eingang_tx.lock().take();
    }

    async fn trennen(&self) {
        self.getrennt.store(true, Ordering::SeqCst);
        self.eingang_tx.lock().take();
    }
}
