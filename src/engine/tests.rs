use super::*;
use crate::store::MemoryStore;

use chrono::NaiveDate;
use tokio_test::{assert_err, assert_ok};

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn range(start: &str, end: &str) -> DateRange {
    DateRange::new(d(start), d(end))
}

fn setup() -> (Arc<MemoryStore>, Engine) {
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::new(store.clone(), Arc::new(NotifyHub::new()));
    (store, engine)
}

async fn seed(
    store: &MemoryStore,
    tool: ToolId,
    start: &str,
    end: &str,
    quantity: u32,
    status: ReservationStatus,
) -> ReservationId {
    store
        .seed_reservation(tool, 1, range(start, end), quantity, status)
        .await
        .unwrap()
}

fn booking(tool_id: ToolId, start: &str, end: &str, quantity: u32) -> NewReservation {
    NewReservation {
        tool_id,
        user_id: 7,
        range: range(start, end),
        quantity,
    }
}

// ── Availability ─────────────────────────────────────────

#[tokio::test]
async fn engine_exact_match_then_next_day() {
    let (store, engine) = setup();
    let tool = store.create_tool(Some("pressure washer".into()), 1);
    seed(&store, tool, "2025-12-20", "2025-12-21", 1, ReservationStatus::Active).await;

    let same = engine
        .check_availability(tool, d("2025-12-20"), d("2025-12-21"), 1)
        .await
        .unwrap();
    assert_eq!(same.available_quantity, 0);
    assert!(!same.can_satisfy);

    let after = engine
        .check_availability(tool, d("2025-12-22"), d("2025-12-23"), 1)
        .await
        .unwrap();
    assert_eq!(after.available_quantity, 1);
    assert!(after.can_satisfy);
}

#[tokio::test]
async fn engine_current_availability_delivered_past_end() {
    let (store, engine) = setup();
    let tool = store.create_tool(None, 2);
    seed(&store, tool, "2025-12-10", "2025-12-12", 1, ReservationStatus::Delivered).await;

    let r = engine
        .check_current_availability(tool, d("2025-12-24"))
        .await
        .unwrap();
    assert_eq!(r.total_stock, 2);
    assert_eq!(r.reserved_quantity, 1);
    assert_eq!(r.available_quantity, 1);
}

#[tokio::test]
async fn engine_current_availability_sweeps_first() {
    let (store, engine) = setup();
    let tool = store.create_tool(None, 1);
    // Active but never picked up or returned; its dates are over.
    let id = seed(&store, tool, "2025-12-01", "2025-12-03", 1, ReservationStatus::Active).await;

    let r = engine
        .check_current_availability(tool, d("2025-12-10"))
        .await
        .unwrap();
    assert_eq!(r.reserved_quantity, 1);
    assert!(!r.can_satisfy);
    assert_eq!(
        engine.get_reservation(id).await.unwrap().status,
        ReservationStatus::Overdue
    );
}

#[tokio::test]
async fn engine_current_availability_future_date_writes_nothing() {
    let (store, engine) = setup();
    let tool = store.create_tool(None, 1);
    let start = today() + chrono::Duration::days(30);
    let booked = DateRange::new(start, start + chrono::Duration::days(1));
    let id = store
        .seed_reservation(tool, 1, booked, 1, ReservationStatus::Active)
        .await
        .unwrap();

    let later = start + chrono::Duration::days(30);
    let r = assert_ok!(engine.check_current_availability(tool, later).await);
    assert_eq!(r.available_quantity, 1);
    assert_eq!(
        engine.get_reservation(id).await.unwrap().status,
        ReservationStatus::Active
    );

    let after = later + chrono::Duration::days(365);
    let r = assert_ok!(engine.check_availability(tool, after, after, 1).await);
    assert_eq!(r.available_quantity, 1);
}

#[tokio::test]
async fn engine_disjoint_range_sees_full_stock() {
    let (store, engine) = setup();
    let tool = store.create_tool(None, 4);
    seed(&store, tool, "2025-03-01", "2025-03-02", 2, ReservationStatus::Active).await;
    seed(&store, tool, "2025-03-05", "2025-03-06", 2, ReservationStatus::Active).await;

    let r = engine
        .check_availability(tool, d("2025-04-01"), d("2025-04-05"), 4)
        .await
        .unwrap();
    assert_eq!(r.available_quantity, 4);
    assert!(r.can_satisfy);
}

#[tokio::test]
async fn engine_over_commitment_reported_not_thrown() {
    let (store, engine) = setup();
    let tool = store.create_tool(None, 1);
    seed(&store, tool, "2025-06-01", "2025-06-03", 1, ReservationStatus::Active).await;
    seed(&store, tool, "2025-06-02", "2025-06-04", 1, ReservationStatus::Active).await;

    let r = engine
        .check_availability(tool, d("2025-06-02"), d("2025-06-02"), 1)
        .await
        .unwrap();
    assert_eq!(r.reserved_quantity, 2);
    assert_eq!(r.available_quantity, 0);
    assert!(r.over_committed);
}

#[tokio::test]
async fn engine_reversed_range_rejected() {
    let (store, engine) = setup();
    let tool = store.create_tool(None, 1);
    let result = engine
        .check_availability(tool, d("2025-06-05"), d("2025-06-01"), 1)
        .await;
    assert!(matches!(result, Err(EngineError::InvalidInput(_))));
}

#[tokio::test]
async fn engine_unknown_tool_not_found() {
    let (_store, engine) = setup();
    let result = engine
        .check_availability(99, d("2025-06-01"), d("2025-06-01"), 1)
        .await;
    assert!(matches!(result, Err(EngineError::NotFound(EntityRef::Tool(99)))));
    let current = engine.check_current_availability(99, d("2025-06-01")).await;
    assert!(matches!(current, Err(EngineError::NotFound(EntityRef::Tool(99)))));
}

// ── Transitions ──────────────────────────────────────────

#[tokio::test]
async fn engine_full_rental_lifecycle() {
    let (store, engine) = setup();
    let tool = store.create_tool(None, 1);
    let created = engine.book(booking(tool, "2025-05-01", "2025-05-03", 1)).await.unwrap();
    assert_eq!(created.status, ReservationStatus::Active);

    let delivered = engine.transition(created.id, Action::Deliver).await.unwrap();
    assert_eq!(delivered.status, ReservationStatus::Delivered);

    let returned = engine.transition(created.id, Action::Return).await.unwrap();
    assert_eq!(returned.status, ReservationStatus::Returned);

    // Returned units are free again.
    let r = engine
        .check_availability(tool, d("2025-05-02"), d("2025-05-02"), 1)
        .await
        .unwrap();
    assert!(r.can_satisfy);
}

#[tokio::test]
async fn engine_invalid_transition_leaves_status() {
    let (store, engine) = setup();
    let tool = store.create_tool(None, 1);
    let id = seed(&store, tool, "2025-05-01", "2025-05-03", 1, ReservationStatus::Cancelled).await;

    let result = engine.transition(id, Action::Deliver).await;
    match result {
        Err(EngineError::InvalidTransition { id: rid, from, action }) => {
            assert_eq!(rid, id);
            assert_eq!(from, ReservationStatus::Cancelled);
            assert_eq!(action, Action::Deliver);
        }
        other => panic!("expected InvalidTransition, got {other:?}"),
    }
    assert_eq!(
        engine.get_reservation(id).await.unwrap().status,
        ReservationStatus::Cancelled
    );
}

#[tokio::test]
async fn engine_cancel_after_return_rejected() {
    let (store, engine) = setup();
    let tool = store.create_tool(None, 1);
    let id = seed(&store, tool, "2025-05-01", "2025-05-03", 1, ReservationStatus::Returned).await;
    assert_err!(engine.transition(id, Action::Cancel).await);
    assert_eq!(
        engine.get_reservation(id).await.unwrap().status,
        ReservationStatus::Returned
    );
}

#[tokio::test]
async fn engine_transition_unknown_reservation() {
    let (_store, engine) = setup();
    let result = engine.transition(404, Action::Cancel).await;
    assert!(matches!(
        result,
        Err(EngineError::NotFound(EntityRef::Reservation(404)))
    ));
}

#[tokio::test]
async fn engine_archive_then_restore_roundtrips_status() {
    let (store, engine) = setup();
    let tool = store.create_tool(None, 1);
    for status in [
        ReservationStatus::Active,
        ReservationStatus::Delivered,
        ReservationStatus::Overdue,
    ] {
        let id = seed(&store, tool, "2025-05-01", "2025-05-03", 1, status).await;

        let archived = engine.transition(id, Action::Archive).await.unwrap();
        assert_eq!(archived.status, ReservationStatus::Archived);
        assert_eq!(archived.previous_status, Some(status));

        let restored = engine.transition(id, Action::Restore).await.unwrap();
        assert_eq!(restored.status, status);
        assert_eq!(restored.previous_status, None);
    }
}

#[tokio::test]
async fn engine_archived_never_occupies() {
    let (store, engine) = setup();
    let tool = store.create_tool(None, 1);
    let id = seed(&store, tool, "2025-05-01", "2025-05-03", 1, ReservationStatus::Delivered).await;
    engine.transition(id, Action::Archive).await.unwrap();

    let r = engine
        .check_current_availability(tool, d("2025-05-02"))
        .await
        .unwrap();
    assert_eq!(r.reserved_quantity, 0);
    assert_eq!(r.available_quantity, 1);
}

#[tokio::test]
async fn engine_restore_without_archive_rejected() {
    let (store, engine) = setup();
    let tool = store.create_tool(None, 1);
    let id = seed(&store, tool, "2025-05-01", "2025-05-03", 1, ReservationStatus::Active).await;
    let result = engine.transition(id, Action::Restore).await;
    assert!(matches!(result, Err(EngineError::InvalidTransition { .. })));
}

#[tokio::test]
async fn engine_transition_publishes_event() {
    let (store, engine) = setup();
    let tool = store.create_tool(None, 1);
    let id = seed(&store, tool, "2025-05-01", "2025-05-03", 1, ReservationStatus::Active).await;
    let mut rx = engine.notify.subscribe(tool);

    engine.transition(id, Action::Deliver).await.unwrap();
    let event = rx.recv().await.unwrap();
    assert_eq!(
        event,
        Event::StatusChanged {
            id,
            tool_id: tool,
            from: ReservationStatus::Active,
            to: ReservationStatus::Delivered,
        }
    );
}

// ── Overdue sweep ────────────────────────────────────────

#[tokio::test]
async fn engine_sweep_marks_only_late_active_and_delivered() {
    let (store, engine) = setup();
    let tool = store.create_tool(None, 10);
    let late_active = seed(&store, tool, "2025-01-01", "2025-01-05", 1, ReservationStatus::Active).await;
    let late_delivered =
        seed(&store, tool, "2025-01-01", "2025-01-05", 1, ReservationStatus::Delivered).await;
    let ends_today = seed(&store, tool, "2025-01-06", "2025-01-06", 1, ReservationStatus::Active).await;
    let returned = seed(&store, tool, "2025-01-01", "2025-01-02", 1, ReservationStatus::Returned).await;

    let n = engine.sweep_overdue(d("2025-01-06")).await.unwrap();
    assert_eq!(n, 2);

    let status = |id| {
        let engine = &engine;
        async move { engine.get_reservation(id).await.unwrap().status }
    };
    assert_eq!(status(late_active).await, ReservationStatus::Overdue);
    assert_eq!(status(late_delivered).await, ReservationStatus::Overdue);
    assert_eq!(status(ends_today).await, ReservationStatus::Active);
    assert_eq!(status(returned).await, ReservationStatus::Returned);
}

#[tokio::test]
async fn engine_sweep_is_idempotent() {
    let (store, engine) = setup();
    let tool = store.create_tool(None, 3);
    seed(&store, tool, "2025-01-01", "2025-01-02", 1, ReservationStatus::Active).await;
    seed(&store, tool, "2025-01-01", "2025-01-03", 1, ReservationStatus::Delivered).await;

    let first = engine.sweep_overdue(d("2025-02-01")).await.unwrap();
    let snapshot = store.list_reservations_for_tool(tool).await.unwrap();
    let second = engine.sweep_overdue(d("2025-02-01")).await.unwrap();

    assert_eq!(first, 2);
    assert_eq!(second, 0);
    assert_eq!(store.list_reservations_for_tool(tool).await.unwrap(), snapshot);
}

#[tokio::test]
async fn engine_overdue_can_be_returned() {
    let (store, engine) = setup();
    let tool = store.create_tool(None, 1);
    let id = seed(&store, tool, "2025-01-01", "2025-01-02", 1, ReservationStatus::Delivered).await;
    engine.sweep_overdue(d("2025-01-10")).await.unwrap();

    let returned = engine.transition(id, Action::Return).await.unwrap();
    assert_eq!(returned.status, ReservationStatus::Returned);
}

// ── Booking ──────────────────────────────────────────────

#[tokio::test]
async fn engine_book_refuses_when_full() {
    let (store, engine) = setup();
    let tool = store.create_tool(None, 2);
    assert_ok!(engine.book(booking(tool, "2025-07-01", "2025-07-04", 2)).await);

    let result = engine.book(booking(tool, "2025-07-04", "2025-07-06", 1)).await;
    assert!(matches!(
        result,
        Err(EngineError::InsufficientStock { available: 0, requested: 1, .. })
    ));
    // Starting the day after is fine.
    assert_ok!(engine.book(booking(tool, "2025-07-05", "2025-07-06", 2)).await);
}

#[tokio::test]
async fn engine_book_validates_input() {
    let (store, engine) = setup();
    let tool = store.create_tool(None, 2);
    let zero = engine.book(booking(tool, "2025-07-01", "2025-07-01", 0)).await;
    assert!(matches!(zero, Err(EngineError::InvalidInput(_))));

    let missing = engine.book(booking(tool + 1, "2025-07-01", "2025-07-01", 1)).await;
    assert!(matches!(missing, Err(EngineError::NotFound(EntityRef::Tool(_)))));
}

#[tokio::test]
async fn engine_concurrent_bookings_never_overrun_stock() {
    let (store, engine) = setup();
    let tool = store.create_tool(None, 3);
    let engine = Arc::new(engine);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.book(booking(tool, "2025-08-01", "2025-08-02", 1)).await
        }));
    }
    let mut ok = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => ok += 1,
            Err(EngineError::InsufficientStock { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(ok, 3);
    let audit = engine
        .audit_tool(tool, d("2025-08-01"), d("2025-08-31"))
        .await
        .unwrap();
    assert!(audit.is_empty());
}

#[tokio::test]
async fn engine_book_publishes_created_event() {
    let (store, engine) = setup();
    let tool = store.create_tool(None, 1);
    let mut rx = engine.notify.subscribe(tool);
    let created = engine.book(booking(tool, "2025-07-01", "2025-07-02", 1)).await.unwrap();
    match rx.recv().await.unwrap() {
        Event::ReservationCreated { id, quantity, .. } => {
            assert_eq!(id, created.id);
            assert_eq!(quantity, 1);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

// ── Purge ────────────────────────────────────────────────

#[tokio::test]
async fn engine_purge_only_archived_or_cancelled() {
    let (store, engine) = setup();
    let tool = store.create_tool(None, 1);
    let cancelled = seed(&store, tool, "2025-01-01", "2025-01-02", 1, ReservationStatus::Cancelled).await;
    let active = seed(&store, tool, "2025-01-01", "2025-01-02", 1, ReservationStatus::Active).await;
    let returned = seed(&store, tool, "2025-01-01", "2025-01-02", 1, ReservationStatus::Returned).await;

    assert_ok!(engine.purge(cancelled).await);
    assert!(matches!(
        engine.get_reservation(cancelled).await,
        Err(EngineError::NotFound(_))
    ));

    let result = engine.purge(active).await;
    assert!(matches!(
        result,
        Err(EngineError::NotPurgeable { status: ReservationStatus::Active, .. })
    ));
    assert!(matches!(
        engine.purge(returned).await,
        Err(EngineError::NotPurgeable { .. })
    ));

    engine.transition(active, Action::Archive).await.unwrap();
    assert_ok!(engine.purge(active).await);
    assert_eq!(store.list_reservations_for_tool(tool).await.unwrap().len(), 1);
}

#[tokio::test]
async fn engine_returned_rental_archived_then_purged() {
    let (store, engine) = setup();
    let tool = store.create_tool(None, 1);
    let created = engine
        .book(booking(tool, "2025-06-01", "2025-06-03", 1))
        .await
        .unwrap();
    engine.transition(created.id, Action::Deliver).await.unwrap();
    engine.transition(created.id, Action::Return).await.unwrap();

    let archived = engine.transition(created.id, Action::Archive).await.unwrap();
    assert_eq!(archived.previous_status, Some(ReservationStatus::Returned));

    assert_ok!(engine.purge(created.id).await);
    assert!(store.list_reservations_for_tool(tool).await.unwrap().is_empty());
}

#[tokio::test]
async fn engine_purge_unknown_reservation() {
    let (_store, engine) = setup();
    assert!(matches!(
        engine.purge(12).await,
        Err(EngineError::NotFound(EntityRef::Reservation(12)))
    ));
}

// ── Audit ────────────────────────────────────────────────

#[tokio::test]
async fn engine_audit_reports_double_booking() {
    let (store, engine) = setup();
    let tool = store.create_tool(None, 1);
    seed(&store, tool, "2025-09-01", "2025-09-05", 1, ReservationStatus::Active).await;
    seed(&store, tool, "2025-09-03", "2025-09-04", 1, ReservationStatus::Active).await;

    let found = engine
        .audit_tool(tool, d("2025-09-01"), d("2025-09-30"))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].range, range("2025-09-03", "2025-09-04"));
    assert_eq!(found[0].peak_reserved, 2);
}

// ── Store failures ───────────────────────────────────────

#[tokio::test]
async fn engine_closed_store_is_retryable() {
    let store = Arc::new(crate::store::SqliteStore::in_memory().await.unwrap());
    let engine = Engine::new(store.clone(), Arc::new(NotifyHub::new()));
    let tool = store.create_tool(Some("drill"), 1).await.unwrap();

    store.pool().close().await;

    let err = assert_err!(
        engine
            .check_availability(tool, d("2025-07-01"), d("2025-07-02"), 1)
            .await
    );
    assert!(matches!(err, EngineError::StoreUnavailable(_)), "{err}");
    assert!(err.is_retryable());
}
