//! Benutzer-Hooks eines Kanals
//!
//! Hooks werden beim Anlegen eines Kanals injiziert. Fehler und Panics in
//! einem Hook werden mit Kanal und Hook-Name geloggt und verschluckt; sie
//! brechen nie das Abonnieren, Abmelden oder Veroeffentlichen ab.

use rundfunk_core::PublishPaket;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::access::KanalInfo;
use crate::connection::Verbindung;

/// Warum eine Verbindung einen Kanal verlassen hat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ausloeser {
    /// Client hat die Abmelde-Aktion geschickt
    Abmeldung,
    /// Server hat die Verbindung rausgeworfen
    Rauswurf,
    /// Verbindung wurde getrennt
    Trennung,
}

impl std::fmt::Display for Ausloeser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Abmeldung => write!(f, "abmeldung"),
            Self::Rauswurf => write!(f, "rauswurf"),
            Self::Trennung => write!(f, "trennung"),
        }
    }
}

pub type AbonnementHook = Arc<dyn Fn(&Verbindung, &KanalInfo) -> anyhow::Result<()> + Send + Sync>;
pub type AbmeldeHook =
    Arc<dyn Fn(&Verbindung, &KanalInfo, Ausloeser) -> anyhow::Result<()> + Send + Sync>;
pub type PublishHook = Arc<dyn Fn(&KanalInfo, &PublishPaket) -> anyhow::Result<()> + Send + Sync>;

/// Optionale Hooks eines Kanals oder einer Kanal-Familie
#[derive(Clone, Default)]
pub struct KanalHooks {
    bei_abonnement: Option<AbonnementHook>,
    bei_abmeldung: Option<AbmeldeHook>,
    bei_publish: Option<PublishHook>,
}

impl KanalHooks {
    pub fn neu() -> Self {
        Self::default()
    }

    pub fn bei_abonnement<F>(mut self, f: F) -> Self
    where
        F: Fn(&Verbindung, &KanalInfo) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.bei_abonnement = Some(Arc::new(f));
        self
    }

    pub fn bei_abmeldung<F>(mut self, f: F) -> Self
    where
        F: Fn(&Verbindung, &KanalInfo, Ausloeser) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.bei_abmeldung = Some(Arc::new(f));
        self
    }

    pub fn bei_publish<F>(mut self, f: F) -> Self
    where
        F: Fn(&KanalInfo, &PublishPaket) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.bei_publish = Some(Arc::new(f));
        self
    }

    pub(crate) fn abonnement(&self, topic: &str, verbindung: &Verbindung, info: &KanalInfo) {
        if let Some(hook) = &self.bei_abonnement {
            sicher_aufrufen(topic, "on_subscription", || hook(verbindung, info));
        }
    }

    pub(crate) fn abmeldung(
        &self,
        topic: &str,
        verbindung: &Verbindung,
        info: &KanalInfo,
        ausloeser: Ausloeser,
    ) {
        if let Some(hook) = &self.bei_abmeldung {
            sicher_aufrufen(topic, "on_unsubscription", || hook(verbindung, info, ausloeser));
        }
    }

    pub(crate) fn publish(&self, topic: &str, info: &KanalInfo, paket: &PublishPaket) {
        if let Some(hook) = &self.bei_publish {
            sicher_aufrufen(topic, "on_publish", || hook(info, paket));
        }
    }
}

/// Ruft einen Hook auf; Fehler und Panics werden nur geloggt
fn sicher_aufrufen<F>(topic: &str, hook: &'static str, f: F)
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::error!(topic, hook, fehler = %e, "Fehler im Kanal-Hook");
        }
        Err(_) => {
            tracing::error!(topic, hook, "Panic im Kanal-Hook");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn info() -> KanalInfo {
        KanalInfo {
            identifier: "chat".into(),
            api_level: None,
            mitglied: None,
        }
    }

    #[test]
    fn fehler_im_hook_wird_verschluckt() {
        let hooks = KanalHooks::neu().bei_publish(|_, _| anyhow::bail!("kaputt"));
        hooks.publish("#chat", &info(), &PublishPaket::neu("e", None, None));
    }

    #[test]
    fn panic_im_hook_wird_verschluckt() {
        let (verbindung, _rx) = Verbindung::neu(None);
        let hooks = KanalHooks::neu().bei_abonnement(|_, _| panic!("hook explodiert"));
        hooks.abonnement("#chat", &verbindung, &info());
    }

    #[test]
    fn ausloeser_wird_durchgereicht() {
        let (verbindung, _rx) = Verbindung::neu(None);
        let rauswuerfe = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&rauswuerfe);
        let hooks = KanalHooks::neu().bei_abmeldung(move |_, _, ausloeser| {
            if ausloeser == Ausloeser::Rauswurf {
                r.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        });

        hooks.abmeldung("#chat", &verbindung, &info(), Ausloeser::Rauswurf);
        hooks.abmeldung("#chat", &verbindung, &info(), Ausloeser::Trennung);
        assert_eq!(rauswuerfe.load(Ordering::SeqCst), 1);
    }
}
