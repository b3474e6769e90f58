use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, Sqlite, Transaction};
use tokio::sync::Mutex;
use tracing::debug;

use crate::engine::{EngineError, EntityRef};
use crate::model::*;

use super::{AvailabilityGate, SCHEMA, StatusUpdate, Store};

const RESERVATION_COLUMNS: &str = "id, tool_id, user_id, start_date, end_date, quantity, \
                                   status, previous_status, created_at";

#[derive(Debug, FromRow)]
struct ReservationRow {
    id: i64,
    tool_id: i64,
    user_id: i64,
    start_date: NaiveDate,
    end_date: NaiveDate,
    quantity: Option<i64>,
    status: String,
    previous_status: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = EngineError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let corrupt = |msg: String| EngineError::CorruptRecord(format!("reservation {id}: {msg}"));
        let status = ReservationStatus::from_str(&row.status).map_err(|e| corrupt(e.to_string()))?;
        let previous_status = row
            .previous_status
            .as_deref()
            .map(ReservationStatus::from_str)
            .transpose()
            .map_err(|e| corrupt(e.to_string()))?;
        let range = DateRange::checked(row.start_date, row.end_date)
            .ok_or_else(|| corrupt("start date after end date".into()))?;
        let quantity = match row.quantity {
            None => DEFAULT_QUANTITY,
            Some(q) => u32::try_from(q)
                .ok()
                .filter(|q| *q > 0)
                .ok_or_else(|| corrupt(format!("quantity {q} is not positive")))?,
        };
        Ok(Reservation {
            id,
            tool_id: row.tool_id,
            user_id: row.user_id,
            range,
            quantity,
            status,
            previous_status,
            created_at: row.created_at,
        })
    }
}

fn stock_from_column(tool_id: ToolId, stock: i64) -> Result<u32, EngineError> {
    u32::try_from(stock)
        .map_err(|_| EngineError::CorruptRecord(format!("tool {tool_id}: stock {stock} out of range")))
}

/// SQLite-backed store.
///
/// Writes go through `write_lock` and run inside a transaction, so a
/// read-check-write sequence cannot interleave with another writer from this
/// process. Cross-process writers are serialized by SQLite's own locking and
/// surface as `StoreUnavailable` when the busy timeout expires.
pub struct SqliteStore {
    pool: SqlitePool,
    write_lock: Mutex<()>,
}

impl SqliteStore {
    /// Open (or create) the database at `url` and apply the schema.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, EngineError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    /// Private in-memory database on a single pinned connection.
    pub async fn in_memory() -> Result<Self, EngineError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, EngineError> {
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        Ok(Self {
            pool,
            write_lock: Mutex::new(()),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn create_tool(&self, name: Option<&str>, stock: u32) -> Result<ToolId, EngineError> {
        let _w = self.write_lock.lock().await;
        let result = sqlx::query("INSERT INTO tools (name, stock) VALUES (?, ?)")
            .bind(name)
            .bind(i64::from(stock))
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Insert a reservation without any availability check.
    pub async fn seed_reservation(
        &self,
        tool_id: ToolId,
        user_id: UserId,
        range: DateRange,
        quantity: u32,
        status: ReservationStatus,
    ) -> Result<ReservationId, EngineError> {
        let _w = self.write_lock.lock().await;
        let result = sqlx::query(
            "INSERT INTO reservations (tool_id, user_id, start_date, end_date, quantity, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(tool_id)
        .bind(user_id)
        .bind(range.start)
        .bind(range.end)
        .bind(i64::from(quantity))
        .bind(status.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn fetch_reservation(
        tx: &mut Transaction<'_, Sqlite>,
        id: ReservationId,
    ) -> Result<Reservation, EngineError> {
        let sql = format!("SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = ?");
        let row: Option<ReservationRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;
        row.ok_or(EngineError::NotFound(EntityRef::Reservation(id)))?
            .try_into()
    }

    async fn fetch_status(
        tx: &mut Transaction<'_, Sqlite>,
        id: ReservationId,
    ) -> Result<Option<ReservationStatus>, EngineError> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM reservations WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;
        status
            .map(|s| {
                ReservationStatus::from_str(&s)
                    .map_err(|e| EngineError::CorruptRecord(format!("reservation {id}: {e}")))
            })
            .transpose()
    }
}

fn collect_rows(rows: Vec<ReservationRow>) -> Result<Vec<Reservation>, EngineError> {
    rows.into_iter().map(Reservation::try_from).collect()
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_tool_stock(&self, tool_id: ToolId) -> Result<u32, EngineError> {
        let stock: Option<i64> = sqlx::query_scalar("SELECT stock FROM tools WHERE id = ?")
            .bind(tool_id)
            .fetch_optional(&self.pool)
            .await?;
        let stock = stock.ok_or(EngineError::NotFound(EntityRef::Tool(tool_id)))?;
        stock_from_column(tool_id, stock)
    }

    async fn list_reservations_for_tool(
        &self,
        tool_id: ToolId,
    ) -> Result<Vec<Reservation>, EngineError> {
        let sql = format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE tool_id = ? ORDER BY start_date, id"
        );
        let rows: Vec<ReservationRow> = sqlx::query_as(&sql)
            .bind(tool_id)
            .fetch_all(&self.pool)
            .await?;
        collect_rows(rows)
    }

    async fn get_reservation(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        let sql = format!("SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = ?");
        let row: Option<ReservationRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.ok_or(EngineError::NotFound(EntityRef::Reservation(id)))?
            .try_into()
    }

    async fn update_reservation_status(
        &self,
        id: ReservationId,
        expected: ReservationStatus,
        status: ReservationStatus,
        previous_status: Option<ReservationStatus>,
    ) -> Result<StatusUpdate, EngineError> {
        let _w = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE reservations SET status = ?, previous_status = ? WHERE id = ? AND status = ?",
        )
        .bind(status.as_str())
        .bind(previous_status.map(|s| s.as_str()))
        .bind(id)
        .bind(expected.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let current = Self::fetch_status(&mut tx, id)
                .await?
                .ok_or(EngineError::NotFound(EntityRef::Reservation(id)))?;
            tx.rollback().await?;
            debug!("reservation {id}: expected {expected}, found {current}");
            return Ok(StatusUpdate::Stale { current });
        }

        let updated = Self::fetch_reservation(&mut tx, id).await?;
        tx.commit().await?;
        Ok(StatusUpdate::Applied(updated))
    }

    async fn list_sweep_candidates(
        &self,
        reference_date: NaiveDate,
    ) -> Result<Vec<Reservation>, EngineError> {
        let sql = format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations
             WHERE status IN ('active', 'delivered') AND end_date < ?
             ORDER BY id"
        );
        let rows: Vec<ReservationRow> = sqlx::query_as(&sql)
            .bind(reference_date)
            .fetch_all(&self.pool)
            .await?;
        collect_rows(rows)
    }

    async fn insert_reservation_checked(
        &self,
        new: NewReservation,
        gate: AvailabilityGate<'_>,
    ) -> Result<Reservation, EngineError> {
        let _w = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let stock: Option<i64> = sqlx::query_scalar("SELECT stock FROM tools WHERE id = ?")
            .bind(new.tool_id)
            .fetch_optional(&mut *tx)
            .await?;
        let stock = stock.ok_or(EngineError::NotFound(EntityRef::Tool(new.tool_id)))?;
        let stock = stock_from_column(new.tool_id, stock)?;

        let sql = format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations
             WHERE tool_id = ? AND start_date <= ?
             ORDER BY start_date, id"
        );
        let rows: Vec<ReservationRow> = sqlx::query_as(&sql)
            .bind(new.tool_id)
            .bind(new.range.end)
            .fetch_all(&mut *tx)
            .await?;
        let existing = collect_rows(rows)?;

        // Dropping `tx` on error rolls back.
        gate(stock, &existing)?;

        let result = sqlx::query(
            "INSERT INTO reservations (tool_id, user_id, start_date, end_date, quantity, status, created_at)
             VALUES (?, ?, ?, ?, ?, 'active', ?)",
        )
        .bind(new.tool_id)
        .bind(new.user_id)
        .bind(new.range.start)
        .bind(new.range.end)
        .bind(i64::from(new.quantity))
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        let created = Self::fetch_reservation(&mut tx, result.last_insert_rowid()).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn delete_reservation(
        &self,
        id: ReservationId,
        expected: ReservationStatus,
    ) -> Result<bool, EngineError> {
        let _w = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM reservations WHERE id = ? AND status = ?")
            .bind(id)
            .bind(expected.as_str())
            .execute(&mut *tx)
            .await;
        let deleted = match deleted {
            Ok(result) => result.rows_affected() > 0,
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                return Err(EngineError::HasDependents(id));
            }
            Err(e) => return Err(e.into()),
        };

        if !deleted && Self::fetch_status(&mut tx, id).await?.is_none() {
            return Err(EngineError::NotFound(EntityRef::Reservation(id)));
        }
        tx.commit().await?;
        Ok(deleted)
    }
}
