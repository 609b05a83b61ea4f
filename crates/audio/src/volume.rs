//! Wiedergabe-Lautstaerke
//!
//! Ein gemeinsamer Verstaerkungsfaktor (0.0..=1.0) fuer die Ausgabe der
//! Gegenstelle. Kurzzeitiges Absenken ("mute"-Ereignis) und Ausblenden
//! ("abort") laufen als eigene Tasks und stellen danach 1.0 wieder her.
//!
//! Jede Aenderung erhoeht eine Generation; ein spaeter gestarteter
//! Vorgang macht die Wiederherstellung eines frueheren wirkungslos.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

/// Schritte beim Ausblenden
pub const FADE_STEPS: u32 = 10;

#[derive(Debug)]
struct Inner {
    gain_bits: AtomicU32,
    generation: AtomicU64,
}

/// Geteilter Lautstaerke-Regler
#[derive(Debug, Clone)]
pub struct VolumeControl {
    inner: Arc<Inner>,
}

impl VolumeControl {
    /// Erstellt einen Regler mit voller Lautstaerke
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                gain_bits: AtomicU32::new(1.0f32.to_bits()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Setzt die Lautstaerke und verwirft laufende Wiederherstellungen
    pub fn set(&self, gain: f32) {
        self.neue_generation();
        self.speichern(gain);
    }

    /// Aktuelle Lautstaerke
    pub fn get(&self) -> f32 {
        f32::from_bits(self.inner.gain_bits.load(Ordering::Acquire))
    }

    /// Skaliert einen Sample-Buffer mit der aktuellen Lautstaerke
    pub fn apply(&self, samples: &mut [f32]) {
        let gain = self.get();
        if (gain - 1.0).abs() < f32::EPSILON {
            return;
        }
        for s in samples.iter_mut() {
            *s *= gain;
        }
    }

    /// Senkt auf `level` ab und stellt nach `dauer` wieder 1.0 her
    pub fn duck(&self, level: f32, dauer: Duration) -> JoinHandle<()> {
        let generation = self.neue_generation();
        self.speichern(level);
        debug!(level, dauer_ms = dauer.as_millis() as u64, "Lautstaerke abgesenkt");

        let regler = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(dauer).await;
            regler.wiederherstellen(generation);
        })
    }

    /// Blendet in `FADE_STEPS` Schritten ueber `dauer` auf 0 aus
    ///
    /// Mit `wiederherstellen_nach` wird, gemessen ab Beginn des Ausblendens,
    /// wieder auf 1.0 gesetzt.
    pub fn fade_out(&self, dauer: Duration, wiederherstellen_nach: Option<Duration>) -> JoinHandle<()> {
        let generation = self.neue_generation();
        let start = self.get();
        let schritt = dauer / FADE_STEPS;
        debug!(dauer_ms = dauer.as_millis() as u64, "Ausblenden gestartet");

        let regler = self.clone();
        tokio::spawn(async move {
            let beginn = tokio::time::Instant::now();
            for i in 1..=FADE_STEPS {
                tokio::time::sleep(schritt).await;
                if regler.inner.generation.load(Ordering::Acquire) != generation {
                    return;
                }
                let rest = 1.0 - i as f32 / FADE_STEPS as f32;
                regler.speichern(start * rest);
            }

            if let Some(nach) = wiederherstellen_nach {
                tokio::time::sleep_until(beginn + nach).await;
                regler.wiederherstellen(generation);
            }
        })
    }

    fn speichern(&self, gain: f32) {
        let gain = gain.clamp(0.0, 1.0);
        self.inner.gain_bits.store(gain.to_bits(), Ordering::Release);
    }

    fn neue_generation(&self) -> u64 {
        self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn wiederherstellen(&self, generation: u64) {
        if self.inner.generation.load(Ordering::Acquire) == generation {
            self.speichern(1.0);
            debug!("Lautstaerke wiederhergestellt");
        }
    }
}

impl Default for VolumeControl {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_ist_voll() {
        let v = VolumeControl::new();
        assert_eq!(v.get(), 1.0);
    }

    #[test]
    fn clamp_bereich() {
        let v = VolumeControl::new();
        v.set(5.0);
        assert_eq!(v.get(), 1.0);
        v.set(-1.0);
        assert_eq!(v.get(), 0.0);
    }

    #[test]
    fn apply_skaliert() {
        let v = VolumeControl::new();
        v.set(0.5);
        let mut samples = vec![1.0f32, -0.5];
        v.apply(&mut samples);
        assert_eq!(samples, vec![0.5, -0.25]);
    }

    #[tokio::test(start_paused = true)]
    async fn duck_wird_wiederhergestellt() {
        let v = VolumeControl::new();
        let handle = v.duck(0.2, Duration::from_millis(1500));
        assert!((v.get() - 0.2).abs() < f32::EPSILON);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!((v.get() - 0.2).abs() < f32::EPSILON);

        handle.await.unwrap();
        assert_eq!(v.get(), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn spaeteres_duck_gewinnt() {
        let v = VolumeControl::new();
        let erstes = v.duck(0.2, Duration::from_millis(1500));
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let zweites = v.duck(0.2, Duration::from_millis(1500));

        // Erste Wiederherstellung laeuft ins Leere
        erstes.await.unwrap();
        assert!((v.get() - 0.2).abs() < f32::EPSILON);

        zweites.await.unwrap();
        assert_eq!(v.get(), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn fade_out_endet_bei_null() {
        let v = VolumeControl::new();
        v.fade_out(Duration::from_millis(800), None).await.unwrap();
        assert_eq!(v.get(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn fade_out_faellt_monoton() {
        let v = VolumeControl::new();
        let handle = v.fade_out(Duration::from_millis(800), Some(Duration::from_millis(1000)));

        let mut letzter = v.get();
        for _ in 0..10 {
            tokio::time::sleep(Duration::from_millis(80)).await;
            let jetzt = v.get();
            assert!(jetzt <= letzter);
            letzter = jetzt;
        }

        handle.await.unwrap();
        assert_eq!(v.get(), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn set_bricht_fade_ab() {
        let v = VolumeControl::new();
        let handle = v.fade_out(Duration::from_millis(800), Some(Duration::from_millis(1000)));
        tokio::time::sleep(Duration::from_millis(200)).await;
        v.set(0.7);
        handle.await.unwrap();
        assert!((v.get() - 0.7).abs() < f32::EPSILON);
    }
}
