//! Entprellte Relay-Abmeldung
//!
//! Nach dem letzten lokalen Abonnenten bleibt ein Topic noch eine Weile beim
//! Relay registriert. Pro Topic gibt es hoechstens einen ausstehenden Timer;
//! ein neuer Abonnent bricht ihn ab, ein erneutes Planen ersetzt ihn.
//!
//! Die Generation schuetzt vor einem Timer, der schon aufgewacht ist, aber
//! das Kanal-Lock erst nach einem neuen Abonnenten bekommt. Generationen
//! sind prozessweit eindeutig, damit auch ein neu angelegter Timer nie die
//! Generation eines alten wiederverwendet.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::AbortHandle;

static NAECHSTE_GENERATION: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Default)]
pub(crate) struct AbmeldeTimer {
    handle: Option<AbortHandle>,
    generation: u64,
}

impl AbmeldeTimer {
    /// Plant `ablauf` nach `verzoegerung` und ersetzt einen ausstehenden Timer
    ///
    /// `ablauf` bekommt die Generation dieses Timers. Gibt `false` zurueck
    /// wenn keine Tokio-Runtime laeuft; dann wurde nichts geplant.
    pub(crate) fn planen<F>(&mut self, verzoegerung: Duration, ablauf: F) -> bool
    where
        F: FnOnce(u64) + Send + 'static,
    {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return false;
        };

        self.abbrechen();
        let generation = self.generation;
        let task = runtime.spawn(async move {
            tokio::time::sleep(verzoegerung).await;
            ablauf(generation);
        });
        self.handle = Some(task.abort_handle());
        true
    }

    /// Bricht einen ausstehenden Timer ab
    pub(crate) fn abbrechen(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.generation = NAECHSTE_GENERATION.fetch_add(1, Ordering::Relaxed);
    }

    /// Prueft ob ein abgelaufener Timer noch der aktuelle ist und verbraucht ihn
    pub(crate) fn abgelaufen(&mut self, generation: u64) -> bool {
        if self.handle.is_none() || generation != self.generation {
            return false;
        }
        self.handle = None;
        true
    }

    pub(crate) fn ist_aktiv(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for AbmeldeTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn timer_feuert_nach_verzoegerung() {
        let mut timer = AbmeldeTimer::default();
        let gefeuert = Arc::new(AtomicUsize::new(0));
        let g = Arc::clone(&gefeuert);

        assert!(timer.planen(Duration::from_secs(5), move |_| {
            g.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(timer.ist_aktiv());

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(gefeuert.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(gefeuert.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn neu_planen_ersetzt_alten_timer() {
        let mut timer = AbmeldeTimer::default();
        let gefeuert = Arc::new(AtomicUsize::new(0));

        let g = Arc::clone(&gefeuert);
        timer.planen(Duration::from_secs(5), move |_| {
            g.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_secs(3)).await;

        let g = Arc::clone(&gefeuert);
        timer.planen(Duration::from_secs(5), move |_| {
            g.fetch_add(10, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(gefeuert.load(Ordering::SeqCst), 0, "erster Timer ist abgebrochen");

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(gefeuert.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn veraltete_generation_wird_verworfen() {
        let mut timer = AbmeldeTimer::default();
        let generation = Arc::new(AtomicU64::new(u64::MAX));
        let g = Arc::clone(&generation);
        timer.planen(Duration::from_secs(1), move |gen| {
            g.store(gen, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_secs(2)).await;

        let gefeuert = generation.load(Ordering::SeqCst);
        timer.abbrechen();
        assert!(!timer.abgelaufen(gefeuert));
    }

    #[tokio::test(start_paused = true)]
    async fn aktuelle_generation_wird_genau_einmal_verbraucht() {
        let mut timer = AbmeldeTimer::default();
        let generation = Arc::new(AtomicU64::new(u64::MAX));
        let g = Arc::clone(&generation);
        timer.planen(Duration::from_secs(1), move |gen| {
            g.store(gen, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_secs(2)).await;

        let gefeuert = generation.load(Ordering::SeqCst);
        assert!(timer.abgelaufen(gefeuert));
        assert!(!timer.abgelaufen(gefeuert));
        assert!(!timer.ist_aktiv());
    }

    #[test]
    fn ohne_runtime_wird_nichts_geplant() {
        let mut timer = AbmeldeTimer::default();
        assert!(!timer.planen(Duration::from_secs(1), |_| {}));
        assert!(!timer.ist_aktiv());
    }
}
