use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::engine::{EngineError, EntityRef};
use crate::model::*;

use super::{AvailabilityGate, StatusUpdate, Store};

/// One tool and its reservations, sorted by start date.
#[derive(Debug, Clone)]
pub struct ToolState {
    pub tool: Tool,
    pub reservations: Vec<Reservation>,
}

impl ToolState {
    pub fn new(tool: Tool) -> Self {
        Self {
            tool,
            reservations: Vec::new(),
        }
    }

    /// Insert maintaining sort order by `range.start`.
    pub fn insert_reservation(&mut self, r: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&r.range.start, |x| x.range.start)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, r);
    }

    pub fn remove_reservation(&mut self, id: ReservationId) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == id)?;
        Some(self.reservations.remove(pos))
    }

    pub fn reservation_mut(&mut self, id: ReservationId) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    /// Reservations starting on or before `date`. Anything later cannot
    /// occupy a range that ends on `date`.
    pub fn starting_by(&self, date: NaiveDate) -> &[Reservation] {
        let bound = self.reservations.partition_point(|r| r.range.start <= date);
        &self.reservations[..bound]
    }
}

pub type SharedToolState = Arc<RwLock<ToolState>>;

/// Process-local store. Each tool sits behind its own lock; holding the
/// write guard serializes check-then-insert for that tool.
pub struct MemoryStore {
    tools: DashMap<ToolId, SharedToolState>,
    reservation_to_tool: DashMap<ReservationId, ToolId>,
    next_tool_id: AtomicI64,
    next_reservation_id: AtomicI64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tools: DashMap::new(),
            reservation_to_tool: DashMap::new(),
            next_tool_id: AtomicI64::new(1),
            next_reservation_id: AtomicI64::new(1),
        }
    }

    pub fn create_tool(&self, name: Option<String>, stock: u32) -> ToolId {
        let id = self.next_tool_id.fetch_add(1, Ordering::Relaxed);
        let tool = Tool { id, name, stock };
        self.tools.insert(id, Arc::new(RwLock::new(ToolState::new(tool))));
        id
    }

    /// Load a reservation as-is, bypassing availability checks. For seeding
    /// historical or already inconsistent data.
    pub async fn seed_reservation(
        &self,
        tool_id: ToolId,
        user_id: UserId,
        range: DateRange,
        quantity: u32,
        status: ReservationStatus,
    ) -> Result<ReservationId, EngineError> {
        let state = self.tool_state(tool_id)?;
        let mut guard = state.write().await;
        let id = self.next_reservation_id.fetch_add(1, Ordering::Relaxed);
        guard.insert_reservation(Reservation {
            id,
            tool_id,
            user_id,
            range,
            quantity,
            status,
            previous_status: None,
            created_at: Utc::now(),
        });
        self.reservation_to_tool.insert(id, tool_id);
        Ok(id)
    }

    fn tool_state(&self, tool_id: ToolId) -> Result<SharedToolState, EngineError> {
        self.tools
            .get(&tool_id)
            .map(|e| e.value().clone())
            .ok_or(EngineError::NotFound(EntityRef::Tool(tool_id)))
    }

    fn owning_tool(&self, id: ReservationId) -> Result<SharedToolState, EngineError> {
        let tool_id = self
            .reservation_to_tool
            .get(&id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(EntityRef::Reservation(id)))?;
        self.tool_state(tool_id)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_tool_stock(&self, tool_id: ToolId) -> Result<u32, EngineError> {
        let state = self.tool_state(tool_id)?;
        let guard = state.read().await;
        Ok(guard.tool.stock)
    }

    async fn list_reservations_for_tool(
        &self,
        tool_id: ToolId,
    ) -> Result<Vec<Reservation>, EngineError> {
        let state = self.tool_state(tool_id)?;
        let guard = state.read().await;
        Ok(guard.reservations.clone())
    }

    async fn get_reservation(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        let state = self.owning_tool(id)?;
        let guard = state.read().await;
        guard
            .reservations
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(EngineError::NotFound(EntityRef::Reservation(id)))
    }

    async fn update_reservation_status(
        &self,
        id: ReservationId,
        expected: ReservationStatus,
        status: ReservationStatus,
        previous_status: Option<ReservationStatus>,
    ) -> Result<StatusUpdate, EngineError> {
        let state = self.owning_tool(id)?;
        let mut guard = state.write().await;
        let r = guard
            .reservation_mut(id)
            .ok_or(EngineError::NotFound(EntityRef::Reservation(id)))?;
        if r.status != expected {
            return Ok(StatusUpdate::Stale { current: r.status });
        }
        r.status = status;
        r.previous_status = previous_status;
        Ok(StatusUpdate::Applied(r.clone()))
    }

    async fn list_sweep_candidates(
        &self,
        reference_date: NaiveDate,
    ) -> Result<Vec<Reservation>, EngineError> {
        let states: Vec<SharedToolState> = self.tools.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::new();
        for state in states {
            let guard = state.read().await;
            out.extend(
                guard
                    .reservations
                    .iter()
                    .filter(|r| r.status.is_sweepable() && r.range.end < reference_date)
                    .cloned(),
            );
        }
        out.sort_by_key(|r| r.id);
        Ok(out)
    }

    async fn insert_reservation_checked(
        &self,
        new: NewReservation,
        gate: AvailabilityGate<'_>,
    ) -> Result<Reservation, EngineError> {
        let state = self.tool_state(new.tool_id)?;
        let mut guard = state.write().await;

        gate(guard.tool.stock, guard.starting_by(new.range.end))?;

        let id = self.next_reservation_id.fetch_add(1, Ordering::Relaxed);
        let reservation = Reservation {
            id,
            tool_id: new.tool_id,
            user_id: new.user_id,
            range: new.range,
            quantity: new.quantity,
            status: ReservationStatus::Active,
            previous_status: None,
            created_at: Utc::now(),
        };
        guard.insert_reservation(reservation.clone());
        self.reservation_to_tool.insert(id, new.tool_id);
        Ok(reservation)
    }

    async fn delete_reservation(
        &self,
        id: ReservationId,
        expected: ReservationStatus,
    ) -> Result<bool, EngineError> {
        let state = self.owning_tool(id)?;
        let mut guard = state.write().await;
        let current = guard
            .reservations
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.status)
            .ok_or(EngineError::NotFound(EntityRef::Reservation(id)))?;
        if current != expected {
            return Ok(false);
        }
        guard.remove_reservation(id);
        self.reservation_to_tool.remove(&id);
        Ok(true)
    }
}
