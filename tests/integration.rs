//! Integration tests for the shelter board.

use async_trait::async_trait;
use parking_lot::Mutex;
use shelter_board::{
    AccessConfig, AccessPolicy, ApiMirror, AvailabilityStatus, BoardConfig, BoardError,
    BoardEvent, MemoryOverrideStore, OverrideStore, Result, Shelter, ShelterBoard, ShelterList,
    ShelterOverride, ShelterUpdatePayload, StaticDirectory, VolunteerAccessRegistry,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct RecordingMirror {
    published: Mutex<Vec<ShelterUpdatePayload>>,
}

#[async_trait]
impl ApiMirror for RecordingMirror {
    async fn publish(&self, payload: &ShelterUpdatePayload) -> Result<()> {
        self.published.lock().push(payload.clone());
        Ok(())
    }
}

fn seed_shelters() -> Vec<Shelter> {
    shelter_board::shelters_from_listing(&json!([
        {
            "id": "beacon-haven",
            "name": "Beacon Haven",
            "distanceMiles": 0.2,
            "latitude": 41.8805,
            "longitude": -87.6292,
            "full_address": "123 Hope St, Chicago, IL",
            "bedsAvailable": 5,
            "status": "open",
            "meals": "Dinner served until 8 PM. Breakfast at 7 AM.",
            "services": ["Showers", "Casework", "Day storage"],
            "urgentNeeds": ["Blankets", "Socks"],
            "lastUpdated": "2024-01-15T12:00:00Z"
        },
        {
            "id": "ashland-shelter",
            "name": "Ashland Overnight Center",
            "distanceMiles": 0.9,
            "latitude": 41.8851,
            "longitude": -87.6278,
            "full_address": "456 Ashland Ave, Chicago, IL",
            "bedsAvailable": 2,
            "status": "limited",
            "meals": "Sandwiches and coffee available until supplies run out.",
            "services": ["Nurse visit 6-9 PM", "Charging station"],
            "urgentNeeds": ["Gloves", "Hygiene kits"],
            "lastUpdated": "2024-01-15T12:00:00Z"
        },
        {
            "id": "harbor-shelter",
            "name": "Harbor Light Shelter",
            "distanceMiles": 1.4,
            "latitude": 41.8781,
            "longitude": -87.6359,
            "full_address": "789 Harbor Ave, Chicago, IL",
            "bedsAvailable": 0,
            "status": "full",
            "meals": "Meal service ends at 9 PM.",
            "services": ["Laundry tokens tomorrow 10 AM"],
            "urgentNeeds": ["Reusable water bottles"],
            "lastUpdated": "2024-01-15T12:00:00Z"
        }
    ]))
}

struct Fixture {
    board: ShelterBoard,
    overrides: MemoryOverrideStore,
    directory: Arc<StaticDirectory>,
    mirror: Arc<RecordingMirror>,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn fixture() -> Fixture {
    init_tracing();
    let overrides = MemoryOverrideStore::new();
    let directory = Arc::new(StaticDirectory::new(seed_shelters()));
    let mirror = Arc::new(RecordingMirror::default());
    let board = ShelterBoard::new(
        BoardConfig::default(),
        Arc::new(overrides.clone()),
        directory.clone(),
        Some(mirror.clone()),
    )
    .unwrap();

    Fixture {
        board,
        overrides,
        directory,
        mirror,
    }
}

fn recorder() -> (Arc<Mutex<Vec<ShelterList>>>, impl Fn(ShelterList) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |list| sink.lock().push(list))
}

fn ids(list: &[Shelter]) -> Vec<&str> {
    list.iter().map(|s| s.id.as_str()).collect()
}

// --- Loading ---

#[tokio::test]
async fn test_load_starts_empty() {
    let f = fixture();
    assert!(f.board.load().is_empty());
}

#[tokio::test]
async fn test_reload_merges_stored_overrides() {
    let f = fixture();
    f.overrides.put(
        "ashland-shelter",
        ShelterOverride {
            beds_available: Some(7),
            status: Some(AvailabilityStatus::Open),
            ..Default::default()
        },
    );

    let list = f.board.reload().await.unwrap();

    assert_eq!(ids(&list), vec!["beacon-haven", "ashland-shelter", "harbor-shelter"]);
    assert_eq!(list[1].availability.beds_available, 7);
    assert_eq!(list[1].availability.status, AvailabilityStatus::Open);
    assert_eq!(list[1].availability.meals, "Sandwiches and coffee available until supplies run out.");
    assert_eq!(list[0].availability.beds_available, 5);
    assert_eq!(f.board.load(), list);
}

#[tokio::test]
async fn test_search_replaces_working_set_and_watches() {
    let f = fixture();
    f.board.reload().await.unwrap();
    let _live = f.board.subscribe(|_| {});
    assert_eq!(f.board.subscriptions().watched_ids().len(), 3);

    f.directory.insert_search(
        "Evanston",
        "IL",
        shelter_board::shelters_from_listing(&json!([{ "name": "Lake Shelter", "full_address": "1 Lake St" }])),
    );
    let list = f.board.search("Evanston", "IL").await.unwrap();

    assert_eq!(ids(&list), vec!["lake-shelter-1-lake-st"]);
    assert_eq!(f.board.subscriptions().watched_ids(), vec!["lake-shelter-1-lake-st"]);
    assert_eq!(f.overrides.total_watches(), 1);
}

#[tokio::test]
async fn test_blank_search_leaves_working_set() {
    let f = fixture();
    f.board.reload().await.unwrap();

    let list = f.board.search("", "IL").await.unwrap();
    assert!(list.is_empty());
    assert_eq!(f.board.load().len(), 3);
}

// --- Updates ---

#[tokio::test]
async fn test_beds_update_scenario() {
    let f = fixture();
    f.board.reload().await.unwrap();
    let before = f.board.get("beacon-haven").unwrap();

    let updated = f
        .board
        .publish_update(ShelterUpdatePayload::beds(
            "beacon-haven",
            Some(0),
            Some(AvailabilityStatus::Full),
        ))
        .unwrap();

    assert_eq!(updated.availability.beds_available, 0);
    assert_eq!(updated.availability.status, AvailabilityStatus::Full);
    assert!(updated.availability.last_updated > before.availability.last_updated);
    assert_eq!(updated.availability.meals, before.availability.meals);
    assert_eq!(updated.availability.services, before.availability.services);
    assert_eq!(updated.location, before.location);
}

#[tokio::test]
async fn test_partial_beds_update_scenario() {
    let f = fixture();
    f.board.reload().await.unwrap();

    let updated = f
        .board
        .publish_update(ShelterUpdatePayload::beds("beacon-haven", Some(2), None))
        .unwrap();

    assert_eq!(updated.availability.beds_available, 2);
    assert_eq!(updated.availability.status, AvailabilityStatus::Open);
}

#[tokio::test]
async fn test_update_visible_before_sync_completes() {
    let f = fixture();
    f.board.reload().await.unwrap();

    f.board
        .publish_update(ShelterUpdatePayload::meals("harbor-shelter", "Soup at 6 PM"));

    // Read-after-write holds before the outbound phase has run
    assert_eq!(f.board.get("harbor-shelter").unwrap().availability.meals, "Soup at 6 PM");

    f.board.flush().await.unwrap();
    let stored = f.overrides.peek("harbor-shelter").unwrap();
    assert_eq!(stored.meals.as_deref(), Some("Soup at 6 PM"));
    assert!(stored.beds_available.is_none());
    assert!(stored.last_updated.is_some());
}

#[tokio::test]
async fn test_successive_updates_accumulate_remotely() {
    let f = fixture();
    f.board.reload().await.unwrap();

    f.board
        .publish_update(ShelterUpdatePayload::beds("ashland-shelter", Some(0), Some(AvailabilityStatus::Full)));
    f.board.publish_update(ShelterUpdatePayload::urgent_needs(
        "ashland-shelter",
        vec!["Towels".into()],
    ));
    f.board.flush().await.unwrap();

    let stored = f.overrides.peek("ashland-shelter").unwrap();
    assert_eq!(stored.beds_available, Some(0));
    assert_eq!(stored.urgent_needs, Some(vec!["Towels".to_string()]));

    // A fresh replace reproduces the same effective record from the store
    let local = f.board.get("ashland-shelter").unwrap();
    f.board.reload().await.unwrap();
    assert_eq!(f.board.get("ashland-shelter").unwrap(), local);
}

#[tokio::test]
async fn test_queued_write_survives_remote_edit_of_other_field() {
    let f = fixture();
    f.board.reload().await.unwrap();
    let (seen, callback) = recorder();
    let _live = f.board.subscribe(callback);

    f.board.publish_update(ShelterUpdatePayload::beds(
        "beacon-haven",
        Some(0),
        Some(AvailabilityStatus::Full),
    ));
    assert_eq!(f.board.pending_writes(), 1);

    // Another writer touches the meal note while our beds write is queued
    f.overrides
        .set("beacon-haven", ShelterOverride { meals: Some("Soup".into()), ..Default::default() })
        .await
        .unwrap();

    let current = f.board.get("beacon-haven").unwrap();
    assert_eq!(current.availability.beds_available, 0);
    assert_eq!(current.availability.status, AvailabilityStatus::Full);
    assert_eq!(current.availability.meals, "Soup");

    f.board.flush().await.unwrap();
    assert_eq!(f.board.pending_writes(), 0);
    let current = f.board.get("beacon-haven").unwrap();
    assert_eq!(current.availability.beds_available, 0);
    assert_eq!(current.availability.meals, "Soup");

    let beds: Vec<u32> = seen.lock().iter().map(|l| l[0].availability.beds_available).collect();
    assert!(beds.iter().all(|b| *b == 0), "beds went back: {:?}", beds);
}

#[tokio::test]
async fn test_rapid_updates_do_not_flip_back() {
    let f = fixture();
    f.board.reload().await.unwrap();
    let (seen, callback) = recorder();
    let _live = f.board.subscribe(callback);

    f.board.publish_update(ShelterUpdatePayload::beds("beacon-haven", Some(4), None));
    f.board.publish_update(ShelterUpdatePayload::beds("beacon-haven", Some(1), None));
    f.board.flush().await.unwrap();

    // Two optimistic deliveries, then one echo per persisted write
    let beds: Vec<u32> = seen.lock().iter().map(|l| l[0].availability.beds_available).collect();
    assert_eq!(beds, vec![4, 1, 1, 1]);
    assert_eq!(f.board.get("beacon-haven").unwrap().availability.beds_available, 1);
}

#[tokio::test]
async fn test_mirror_receives_payload() {
    let f = fixture();
    f.board.reload().await.unwrap();

    let payload = ShelterUpdatePayload::services("beacon-haven", vec!["Showers".into()])
        .with_note("Casework paused this week");
    f.board.publish_update(payload.clone());
    f.board.flush().await.unwrap();

    assert_eq!(*f.mirror.published.lock(), vec![payload]);
    assert_eq!(f.board.sync_stats().mirrored, 1);
}

// --- Live Subscription ---

#[tokio::test]
async fn test_remote_change_notifies_full_list() {
    let f = fixture();
    f.board.reload().await.unwrap();
    let (seen, callback) = recorder();
    let _live = f.board.subscribe(callback);

    f.overrides.put(
        "harbor-shelter",
        ShelterOverride {
            beds_available: Some(4),
            status: Some(AvailabilityStatus::Open),
            ..Default::default()
        },
    );

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    let list = &seen[0];
    assert_eq!(ids(list), vec!["beacon-haven", "ashland-shelter", "harbor-shelter"]);
    assert_eq!(list[2].availability.beds_available, 4);
    assert_eq!(list[0], f.board.get("beacon-haven").unwrap());
}

#[tokio::test]
async fn test_local_update_echo_is_idempotent() {
    let f = fixture();
    f.board.reload().await.unwrap();
    let (seen, callback) = recorder();
    let _live = f.board.subscribe(callback);

    f.board
        .publish_update(ShelterUpdatePayload::beds("beacon-haven", Some(1), Some(AvailabilityStatus::Limited)));
    f.board.flush().await.unwrap();

    let seen = seen.lock();
    // Optimistic delivery, then the watch echo of the persisted override
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], seen[1]);
    assert_eq!(seen[1][0].availability.beds_available, 1);
}

#[tokio::test]
async fn test_unsubscribe_stops_notifications() {
    let f = fixture();
    f.board.reload().await.unwrap();
    let (seen, callback) = recorder();
    let _live = f.board.subscribe(callback);

    assert!(f.board.unsubscribe());
    f.overrides.put("beacon-haven", ShelterOverride { beds_available: Some(0), ..Default::default() });

    assert!(seen.lock().is_empty());
    assert_eq!(f.overrides.total_watches(), 0);
}

#[tokio::test]
async fn test_dropping_subscription_detaches() {
    let f = fixture();
    f.board.reload().await.unwrap();
    let (seen, callback) = recorder();

    let live = f.board.subscribe(callback);
    drop(live);

    assert!(!f.board.subscriptions().is_attached());
    f.overrides.put("beacon-haven", ShelterOverride { beds_available: Some(0), ..Default::default() });
    assert!(seen.lock().is_empty());
}

#[tokio::test]
async fn test_empty_replace_scenario() {
    let f = fixture();
    f.board.reload().await.unwrap();
    let (seen, callback) = recorder();
    let _live = f.board.subscribe(callback);

    f.board.replace(Vec::new()).await;
    assert!(f.board.load().is_empty());
    let delivered = seen.lock().len();

    f.overrides.put("beacon-haven", ShelterOverride { beds_available: Some(9), ..Default::default() });

    assert_eq!(seen.lock().len(), delivered);
    assert_eq!(f.overrides.total_watches(), 0);
    assert!(f.board.subscriptions().is_attached());
}

#[tokio::test]
async fn test_subscribe_before_load_then_replace_attaches() {
    let f = fixture();
    let (seen, callback) = recorder();
    let _live = f.board.subscribe(callback);
    assert!(f.board.subscriptions().watched_ids().is_empty());

    f.board.reload().await.unwrap();
    assert_eq!(f.overrides.total_watches(), 3);
    assert_eq!(seen.lock().len(), 1);

    f.overrides.put("ashland-shelter", ShelterOverride { meals: Some("Closed".into()), ..Default::default() });
    assert_eq!(seen.lock().len(), 2);
}

#[tokio::test]
async fn test_clear_drops_watches() {
    let f = fixture();
    f.board.reload().await.unwrap();
    let _live = f.board.subscribe(|_| {});

    f.board.clear();
    assert!(f.board.load().is_empty());
    assert_eq!(f.overrides.total_watches(), 0);
}

#[tokio::test]
async fn test_channel_subscriber() {
    let f = fixture();
    f.board.reload().await.unwrap();
    let events = f.board.subscribe_channel();

    f.overrides.put("beacon-haven", ShelterOverride { status: Some(AvailabilityStatus::Full), ..Default::default() });

    match events.recv_timeout(Duration::from_millis(100)).unwrap() {
        BoardEvent::Shelters(list) => assert_eq!(list[0].availability.status, AvailabilityStatus::Full),
        other => panic!("Expected Shelters event, got {:?}", other),
    }
}

// --- Authorization ---

#[tokio::test]
async fn test_publish_authorized() {
    let f = fixture();
    f.board.reload().await.unwrap();
    let policy = AccessPolicy::new(Arc::new(VolunteerAccessRegistry::new()), &AccessConfig::default());
    policy
        .assign("founder@sheltersync.app", "vol@example.org", ["beacon-haven"])
        .unwrap();

    let ok = f
        .board
        .publish_authorized(&policy, "Vol@Example.org", ShelterUpdatePayload::beds("beacon-haven", Some(3), None))
        .unwrap();
    assert_eq!(ok.unwrap().availability.beds_available, 3);

    let denied = f.board.publish_authorized(
        &policy,
        "vol@example.org",
        ShelterUpdatePayload::beds("harbor-shelter", Some(3), None),
    );
    assert!(matches!(denied, Err(BoardError::Unauthorized { .. })));
    assert_eq!(f.board.get("harbor-shelter").unwrap().availability.beds_available, 0);
}
