//! Integration-Tests fuer einfache Kanaele (Abonnieren, Entprellung, Fan-out)

use rundfunk_channels::{
    zugriff_fn, KanalKontext, KanalOptionen, KanalRegistry, RelayHub, Verbindung,
};
use rundfunk_core::ProzessId;
use rundfunk_protocol::{AbonnementAnfrage, ServerNachricht, AKTION_ABMELDEN};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn registry(hub: &RelayHub) -> KanalRegistry {
    let kontext = KanalKontext::neu(ProzessId::new(), Arc::new(hub.knoten()))
        .mit_entprellung(Duration::from_secs(5));
    KanalRegistry::neu(kontext)
}

fn publish_events(rx: &mut mpsc::Receiver<ServerNachricht>) -> Vec<String> {
    let mut events = Vec::new();
    while let Ok(nachricht) = rx.try_recv() {
        if let ServerNachricht::Publish(frame) = nachricht {
            events.push(frame.event);
        }
    }
    events
}

#[tokio::test]
async fn abonnieren_traegt_genau_einmal_ein_und_registriert() {
    let hub = RelayHub::neu();
    let registry = registry(&hub);
    let pruefungen = Arc::new(AtomicUsize::new(0));
    let p = Arc::clone(&pruefungen);
    let kanal = registry
        .kanal_anlegen(KanalOptionen::neu("chat").mit_zugriff(zugriff_fn(move |_, _| {
            p.fetch_add(1, Ordering::SeqCst);
            true
        })))
        .unwrap();

    let (c1, _rx) = Verbindung::neu(None);
    let anfrage = AbonnementAnfrage::neu(1, "chat", None);
    let t1 = registry.abonnieren(&c1, &anfrage).await.unwrap();
    let t2 = registry.abonnieren(&c1, &anfrage).await.unwrap();

    assert_eq!(t1, "#chat");
    assert_eq!(t1, t2);
    assert_eq!(kanal.abonnenten_anzahl(), 1);
    assert_eq!(pruefungen.load(Ordering::SeqCst), 1);
    assert!(kanal.ist_registriert());
    assert!(hub.ist_beobachtet("#chat"));
    assert_eq!(c1.handler_anzahl(), (1, 1));
}

#[tokio::test(start_paused = true)]
async fn entprellung_haelt_registrierung_bis_ablauf() {
    let hub = RelayHub::neu();
    let registry = registry(&hub);
    let kanal = registry.kanal_anlegen(KanalOptionen::neu("chat")).unwrap();
    let (c1, _rx) = Verbindung::neu(None);
    registry
        .abonnieren(&c1, &AbonnementAnfrage::neu(1, "chat", None))
        .await
        .unwrap();

    c1.aktion_verarbeiten("#chat", AKTION_ABMELDEN).unwrap();
    assert_eq!(kanal.abonnenten_anzahl(), 0);
    assert!(kanal.ist_registriert());

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(kanal.ist_registriert(), "noch innerhalb der Wartezeit");

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!kanal.ist_registriert());
    assert!(!kanal.abmeldung_ausstehend());
    assert!(!hub.ist_beobachtet("#chat"));
}

#[tokio::test(start_paused = true)]
async fn neuer_abonnent_bricht_abmeldung_ab() {
    let hub = RelayHub::neu();
    let registry = registry(&hub);
    let kanal = registry.kanal_anlegen(KanalOptionen::neu("chat")).unwrap();
    let anfrage = AbonnementAnfrage::neu(1, "chat", None);

    let (c1, _rx1) = Verbindung::neu(None);
    registry.abonnieren(&c1, &anfrage).await.unwrap();
    c1.trennen();
    assert!(kanal.abmeldung_ausstehend());

    tokio::time::sleep(Duration::from_secs(3)).await;
    let (c2, _rx2) = Verbindung::neu(None);
    registry.abonnieren(&c2, &anfrage).await.unwrap();
    assert!(!kanal.abmeldung_ausstehend());

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(kanal.ist_registriert());
    assert!(hub.ist_beobachtet("#chat"));
}

#[tokio::test(start_paused = true)]
async fn erneutes_leeren_startet_timer_neu() {
    let hub = RelayHub::neu();
    let registry = registry(&hub);
    let kanal = registry.kanal_anlegen(KanalOptionen::neu("chat")).unwrap();
    let anfrage = AbonnementAnfrage::neu(1, "chat", None);

    let (c1, _rx1) = Verbindung::neu(None);
    registry.abonnieren(&c1, &anfrage).await.unwrap();
    c1.trennen();

    tokio::time::sleep(Duration::from_secs(3)).await;
    let (c2, _rx2) = Verbindung::neu(None);
    registry.abonnieren(&c2, &anfrage).await.unwrap();
    c2.trennen();

    // Erster Timer waere jetzt abgelaufen, der zweite laeuft noch
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(kanal.ist_registriert());

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!kanal.ist_registriert());
}

#[tokio::test]
async fn publish_erreicht_alle_ausser_origin() {
    let hub = RelayHub::neu();
    let registry = registry(&hub);
    let kanal = registry.kanal_anlegen(KanalOptionen::neu("chat")).unwrap();
    let anfrage = AbonnementAnfrage::neu(1, "chat", None);

    let (c1, mut rx1) = Verbindung::neu(None);
    let (c2, mut rx2) = Verbindung::neu(None);
    registry.abonnieren(&c1, &anfrage).await.unwrap();
    registry.abonnieren(&c2, &anfrage).await.unwrap();

    kanal.veroeffentlichen("an_alle", Some(serde_json::json!({"n": 1})), None);
    kanal.veroeffentlichen("ohne_c1", None, Some(c1.id()));

    assert_eq!(publish_events(&mut rx1), vec!["an_alle".to_string()]);
    assert_eq!(
        publish_events(&mut rx2),
        vec!["an_alle".to_string(), "ohne_c1".to_string()]
    );
}

#[tokio::test]
async fn container_veroeffentlicht_in_allen_api_leveln() {
    let hub = RelayHub::neu();
    let registry = registry(&hub);
    registry.kanal_anlegen(KanalOptionen::neu("chat")).unwrap();
    registry
        .kanal_anlegen(KanalOptionen::neu("chat").mit_api_level(2))
        .unwrap();

    let (alt, mut rx_alt) = Verbindung::neu(Some(1));
    let (neu, mut rx_neu) = Verbindung::neu(Some(2));
    let anfrage = AbonnementAnfrage::neu(1, "chat", None);
    assert_eq!(registry.abonnieren(&alt, &anfrage).await.unwrap(), "#chat");
    assert_eq!(registry.abonnieren(&neu, &anfrage).await.unwrap(), "#chat@2");

    let container = registry.kanal_container("chat").unwrap();
    assert_eq!(container.veroeffentlichen("neu", None, None), 2);
    assert_eq!(publish_events(&mut rx_alt), vec!["neu".to_string()]);
    assert_eq!(publish_events(&mut rx_neu), vec!["neu".to_string()]);
}
