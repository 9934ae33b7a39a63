//! Dekodier-Puffer pro Sprecher-Stream
//!
//! Jeder aktive Sprecher bekommt einen eigenen, zustandsbehafteten Decoder
//! und einen PCM-Puffer. Die Empfangsseite haengt dekodierte Samples an,
//! der Mixer-Tick entnimmt pro Tick hoechstens ein volles Fenster.
//!
//! Der Puffer ist begrenzt: laeuft er ueber (Ticks fallen zurueck), werden
//! die aeltesten Samples verworfen.
//!
//! Ticks ohne Daten werden gezaehlt, damit der Mixer verstummte Sprecher
//! wieder freigeben kann.

use funkbruecke_audio::FrameDecoder;
use funkbruecke_core::{Result, SprecherId};
use std::collections::VecDeque;

pub struct SprecherDecoder {
    sprecher: SprecherId,
    decoder: Box<dyn FrameDecoder>,
    /// Interleaved Stereo-PCM, aeltestes Sample vorne
    puffer: VecDeque<i16>,
    max_samples: usize,
    verworfen: u64,
    /// Aufeinanderfolgende Ticks mit leerem Puffer
    leere_ticks: u32,
}

impl SprecherDecoder {
    /// Erstellt einen Puffer mit Obergrenze `max_samples` (interleaved)
    pub fn neu(sprecher: SprecherId, decoder: Box<dyn FrameDecoder>, max_samples: usize) -> Self {
        // Obergrenze auf Stereo-Paare ausrichten
        let max_samples = max_samples - max_samples % 2;
        Self {
            sprecher,
            decoder,
            puffer: VecDeque::with_capacity(max_samples.min(1 << 16)),
            max_samples,
            verworfen: 0,
            leere_ticks: 0,
        }
    }

    /// Dekodiert ein Paket und haengt die Samples an den Puffer an
    ///
    /// Bei Fehlern bleibt der Puffer unveraendert. Gibt die Anzahl der
    /// angehaengten Samples zurueck.
    pub fn paket_verarbeiten(&mut self, paket: &[u8]) -> Result<usize> {
        let pcm = self
            .decoder
            .decode(paket)
            .map_err(|e| e.als_dekodierung())?;

        self.puffer.extend(pcm.iter().copied());

        if self.puffer.len() > self.max_samples {
            let ueberschuss = self.puffer.len() - self.max_samples;
            self.puffer.drain(..ueberschuss);
            self.verworfen += ueberschuss as u64;
            tracing::warn!(
                sprecher = %self.sprecher,
                verworfen = ueberschuss,
                gesamt_verworfen = self.verworfen,
                "Sprecher-Puffer voll – aelteste Samples verworfen"
            );
        }

        Ok(pcm.len())
    }

    /// Entnimmt genau ein Fenster, falls vollstaendig vorhanden
    ///
    /// Ein unvollstaendiger Rest bleibt fuer den naechsten Tick erhalten.
    pub fn fenster_entnehmen(&mut self, fenster: &mut [i16]) -> bool {
        if self.puffer.len() < fenster.len() {
            if self.puffer.is_empty() {
                self.leere_ticks = self.leere_ticks.saturating_add(1);
            }
            return false;
        }
        self.leere_ticks = 0;
        let laenge = fenster.len();
        for (ziel, sample) in fenster.iter_mut().zip(self.puffer.drain(..laenge)) {
            *ziel = sample;
        }
        true
    }

    pub fn sprecher(&self) -> SprecherId {
        self.sprecher
    }

    /// Anzahl gepufferter interleaved Samples
    pub fn gepuffert(&self) -> usize {
        self.puffer.len()
    }

    /// Anzahl bisher wegen Ueberlauf verworfener Samples
    pub fn verworfen(&self) -> u64 {
        self.verworfen
    }

    /// Wie viele Ticks in Folge der Puffer leer war
    pub fn leere_ticks(&self) -> u32 {
        self.leere_ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use funkbruecke_audio::{FrameDecoder, OpusDecoder, PcmCodec, FENSTER_LAENGE, STILLE_FRAME};
    use funkbruecke_core::FunkError;

    fn pcm_decoder(max: usize) -> SprecherDecoder {
        SprecherDecoder::neu(SprecherId(1), Box::new(PcmCodec), max)
    }

    #[test]
    fn stille_frame_fuellt_genau_ein_fenster() {
        let decoder: Box<dyn FrameDecoder> = Box::new(OpusDecoder::new().unwrap());
        let mut sd = SprecherDecoder::neu(SprecherId(1), decoder, 96_000);
        let angehaengt = sd.paket_verarbeiten(&STILLE_FRAME).unwrap();
        assert_eq!(angehaengt, 960 * 2);
        assert_eq!(sd.gepuffert(), 960 * 2);
    }

    #[test]
    fn teilfenster_bleibt_erhalten() {
        let mut sd = pcm_decoder(96_000);
        sd.paket_verarbeiten(&PcmCodec::packen(&vec![5i16; 1000])).unwrap();

        let mut fenster = vec![0i16; FENSTER_LAENGE];
        assert!(!sd.fenster_entnehmen(&mut fenster), "Kein volles Fenster");
        assert_eq!(sd.gepuffert(), 1000);

        sd.paket_verarbeiten(&PcmCodec::packen(&vec![6i16; 1000])).unwrap();
        assert!(sd.fenster_entnehmen(&mut fenster));
        assert_eq!(fenster[0], 5);
        assert_eq!(fenster[999], 5);
        assert_eq!(fenster[1000], 6);
        assert_eq!(sd.gepuffert(), 80);
    }

    #[test]
    fn kaputtes_paket_laesst_puffer_unveraendert() {
        let mut sd = pcm_decoder(96_000);
        sd.paket_verarbeiten(&PcmCodec::packen(&[1, 2])).unwrap();
        let result = sd.paket_verarbeiten(&[0xAA]);
        assert!(matches!(result, Err(FunkError::Dekodierung(_))));
        assert_eq!(sd.gepuffert(), 2);
    }

    #[test]
    fn ueberlauf_verwirft_aelteste_samples() {
        let mut sd = pcm_decoder(FENSTER_LAENGE);
        sd.paket_verarbeiten(&PcmCodec::packen(&vec![1i16; FENSTER_LAENGE])).unwrap();
        sd.paket_verarbeiten(&PcmCodec::packen(&vec![2i16; 100])).unwrap();

        assert_eq!(sd.gepuffert(), FENSTER_LAENGE);
        assert_eq!(sd.verworfen(), 100);

        let mut fenster = vec![0i16; FENSTER_LAENGE];
        assert!(sd.fenster_entnehmen(&mut fenster));
        assert_eq!(fenster[0], 1);
        assert_eq!(fenster[FENSTER_LAENGE - 1], 2, "Neueste Samples liegen hinten");
    }

    #[test]
    fn leere_ticks_zaehlen_nur_bei_leerem_puffer() {
        let mut sd = pcm_decoder(96_000);
        let mut fenster = vec![0i16; FENSTER_LAENGE];

        assert!(!sd.fenster_entnehmen(&mut fenster));
        assert!(!sd.fenster_entnehmen(&mut fenster));
        assert_eq!(sd.leere_ticks(), 2);

        // Ein Teilfenster ist keine Stille
        sd.paket_verarbeiten(&PcmCodec::packen(&[1, 2])).unwrap();
        assert!(!sd.fenster_entnehmen(&mut fenster));
        assert_eq!(sd.leere_ticks(), 2);

        sd.paket_verarbeiten(&PcmCodec::packen(&vec![3i16; FENSTER_LAENGE])).unwrap();
        assert!(sd.fenster_entnehmen(&mut fenster));
        assert_eq!(sd.leere_ticks(), 0);
        assert_eq!(sd.sprecher(), SprecherId(1));
    }
}
