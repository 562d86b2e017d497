use chrono::TimeZone;
use revpipe_bus::{InMemoryTransport, MessageKind};
use revpipe_core::{NewReview, Sentiment, SourceKind};

use super::*;
use crate::memory::{MemoryStore, StoreOp};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 28, 12, 0, 0).unwrap()
}

fn new_review(i: i64) -> NewReview {
    let at = now() - chrono::Duration::minutes(500 - i);
    NewReview {
        location_id: Some(1),
        location_name: "Zamalek Branch".to_string(),
        company_id: 9,
        source: SourceKind::Talabat,
        rating: 4,
        feedback: format!("review {i}"),
        reviewer_name: Some("Mona".to_string()),
        published_at: at,
        review_date: at.date_naive(),
        scraped_at: at,
        sentiment: Some(Sentiment::Positive),
    }
}

async fn seeded(count: i64) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let reviews: Vec<NewReview> = (0..count).map(new_review).collect();
    store
        .insert_reviews(&TenantContext::system(), &reviews)
        .await
        .unwrap();
    store
}

fn dispatcher(store: &Arc<MemoryStore>, transport: &Arc<InMemoryTransport>) -> Dispatcher {
    Dispatcher::new(
        store.clone(),
        transport.clone(),
        RoutingKeys::new("revpipe"),
        100,
    )
}

fn processed(store: &MemoryStore) -> usize {
    store.reviews().iter().filter(|r| r.is_processed).count()
}

#[tokio::test]
async fn full_batch_is_trimmed_and_polls_again_soon() {
    let store = seeded(101).await;
    let transport = Arc::new(InMemoryTransport::new());

    let outcome = dispatcher(&store, &transport).cycle(now()).await;

    assert_eq!(
        outcome,
        CycleOutcome::Dispatched {
            count: 100,
            more: true
        }
    );
    assert_eq!(outcome.next_delay(), Duration::from_secs(30));
    assert_eq!(transport.published().len(), 100);
    assert_eq!(transport.publish_calls(), 1);
    assert_eq!(processed(&store), 100);

    // The newest review is the one left behind.
    let left: Vec<_> = store.reviews().into_iter().filter(|r| !r.is_processed).collect();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].feedback, "review 100");
}

#[tokio::test]
async fn partial_batch_waits_ten_minutes() {
    let store = seeded(5).await;
    let transport = Arc::new(InMemoryTransport::new());

    let outcome = dispatcher(&store, &transport).cycle(now()).await;

    assert_eq!(
        outcome,
        CycleOutcome::Dispatched {
            count: 5,
            more: false
        }
    );
    assert_eq!(outcome.next_delay(), Duration::from_secs(600));
    assert_eq!(processed(&store), 5);
}

#[tokio::test]
async fn empty_store_publishes_nothing() {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(InMemoryTransport::new());

    let outcome = dispatcher(&store, &transport).cycle(now()).await;

    assert_eq!(
        outcome,
        CycleOutcome::Dispatched {
            count: 0,
            more: false
        }
    );
    assert_eq!(outcome.next_delay(), Duration::from_secs(600));
    assert_eq!(transport.publish_calls(), 0);
}

#[tokio::test]
async fn publish_failure_marks_nothing() {
    let store = seeded(5).await;
    let transport = Arc::new(InMemoryTransport::new());
    transport.fail_publishes(true);

    let outcome = dispatcher(&store, &transport).cycle(now()).await;

    assert_eq!(outcome, CycleOutcome::Failed);
    assert_eq!(outcome.next_delay(), Duration::from_secs(5));
    assert_eq!(processed(&store), 0);

    // The same reviews go out on the next successful cycle.
    transport.fail_publishes(false);
    let retry = dispatcher(&store, &transport).cycle(now()).await;
    assert_eq!(
        retry,
        CycleOutcome::Dispatched {
            count: 5,
            more: false
        }
    );
    assert_eq!(processed(&store), 5);
}

#[tokio::test]
async fn store_failure_is_a_failed_cycle() {
    let store = seeded(3).await;
    store.fail_on(StoreOp::FetchUnprocessed, true);
    let transport = Arc::new(InMemoryTransport::new());

    let outcome = dispatcher(&store, &transport).cycle(now()).await;

    assert_eq!(outcome, CycleOutcome::Failed);
    assert_eq!(transport.publish_calls(), 0);
}

#[tokio::test]
async fn held_guard_reports_busy() {
    let store = seeded(3).await;
    let transport = Arc::new(InMemoryTransport::new());
    let guard = Arc::new(Semaphore::new(1));
    let dispatcher = Dispatcher::with_guard(
        store.clone(),
        transport.clone(),
        RoutingKeys::new("revpipe"),
        100,
        Arc::clone(&guard),
    );

    let permit = guard.try_acquire().unwrap();
    let outcome = dispatcher.cycle(now()).await;
    assert_eq!(outcome, CycleOutcome::Busy);
    assert_eq!(outcome.next_delay(), Duration::from_secs(5));
    assert_eq!(transport.publish_calls(), 0);

    drop(permit);
    assert!(matches!(
        dispatcher.cycle(now()).await,
        CycleOutcome::Dispatched { count: 3, .. }
    ));
}

#[tokio::test]
async fn messages_carry_routing_keys_and_company() {
    let store = seeded(1).await;
    let transport = Arc::new(InMemoryTransport::new());

    dispatcher(&store, &transport).cycle(now()).await;

    let published = transport.published();
    let envelope = &published[0];
    assert_eq!(envelope.message_type, MessageKind::Review);
    assert_eq!(envelope.routing_key, "revpipe.review.published");
    assert_eq!(envelope.company_id(), Some(9));

    let message = envelope.decode::<ReviewMessage>().unwrap();
    assert_eq!(message.ack_routing_key, "revpipe.review.ack");
    assert_eq!(message.location_name, "Zamalek Branch");
    assert_eq!(message.rating, 4);
    assert_eq!(message.message_created_at, now());
}

#[tokio::test]
async fn run_stops_on_shutdown() {
    let store = seeded(2).await;
    let transport = Arc::new(InMemoryTransport::new());
    let dispatcher = Arc::new(dispatcher(&store, &transport));
    let (tx, rx) = watch::channel(false);

    let handle = tokio::spawn({
        let dispatcher = Arc::clone(&dispatcher);
        async move { dispatcher.run(rx).await }
    });

    // Wait for the first cycle, which then sleeps for the idle delay.
    for _ in 0..100 {
        if processed(&store) == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(processed(&store), 2);

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop did not stop")
        .unwrap();
}
