//! SQLite-backed persistence gateway.
//!
//! Catalog, reservation and order rows keep the aggregate state as a JSON
//! document next to the columns the engine queries on (`sku`, `code`,
//! `status`, `expires_at_ms`, ...). Ledger entries are plain columns and are
//! never updated or deleted.
//!
//! ## Error mapping
//!
//! | SQLite condition | StoreError |
//! |------------------|------------|
//! | `SQLITE_BUSY` / `SQLITE_LOCKED` (5, 6, 261, 262, 517) | `Conflict` |
//! | unique violation on `stock_entries` (sequence race) | `Conflict` |
//! | unique violation on `sku` / `code` | `Duplicate` |
//! | revision or version mismatch | `Conflict` |
//! | pool closed, I/O, anything else | `Backend` |

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::instrument;

use wms_catalog::{Product, ProductId, Warehouse, WarehouseId};
use wms_core::{AggregateId, AggregateRoot, DomainError, ExpectedVersion};
use wms_ledger::{EntryId, EntryKind, StockEntry, StockKey};
use wms_orders::{Order, OrderId};
use wms_reservations::{Reservation, ReservationId};

use super::r#trait::{StockPosition, StockWrite, StoreError, WarehouseStore};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS products (
        id       TEXT PRIMARY KEY,
        sku      TEXT NOT NULL UNIQUE,
        version  INTEGER NOT NULL,
        state    TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS warehouses (
        id       TEXT PRIMARY KEY,
        code     TEXT NOT NULL UNIQUE,
        version  INTEGER NOT NULL,
        state    TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS stock_positions (
        product_id     TEXT NOT NULL,
        warehouse_id   TEXT NOT NULL,
        on_hand        INTEGER NOT NULL,
        last_sequence  INTEGER NOT NULL,
        revision       INTEGER NOT NULL,
        PRIMARY KEY (product_id, warehouse_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS stock_entries (
        entry_id        TEXT PRIMARY KEY,
        product_id      TEXT NOT NULL,
        warehouse_id    TEXT NOT NULL,
        sequence        INTEGER NOT NULL CHECK (sequence > 0),
        delta           INTEGER NOT NULL CHECK (delta <> 0),
        kind            TEXT NOT NULL,
        recorded_at     TEXT NOT NULL,
        reason          TEXT NULL,
        reservation_id  TEXT NULL,
        UNIQUE (product_id, warehouse_id, sequence)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS reservations (
        id             TEXT PRIMARY KEY,
        product_id     TEXT NOT NULL,
        warehouse_id   TEXT NOT NULL,
        status         TEXT NOT NULL,
        expires_at_ms  INTEGER NOT NULL,
        version        INTEGER NOT NULL,
        state          TEXT NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS reservations_active_by_key
        ON reservations (product_id, warehouse_id, status)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS reservations_by_expiry
        ON reservations (status, expires_at_ms)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS orders (
        id            TEXT PRIMARY KEY,
        status        TEXT NOT NULL,
        placed_at_ms  INTEGER NOT NULL,
        version       INTEGER NOT NULL,
        state         TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS order_lines (
        order_id      TEXT NOT NULL REFERENCES orders (id),
        line_no       INTEGER NOT NULL,
        product_id    TEXT NOT NULL,
        warehouse_id  TEXT NOT NULL,
        quantity      INTEGER NOT NULL CHECK (quantity > 0),
        PRIMARY KEY (order_id, line_no)
    )
    "#,
];

/// SQLite persistence gateway over a sqlx connection pool.
#[derive(Debug, Clone)]
pub struct SqliteWarehouseStore {
    pool: SqlitePool,
}

impl SqliteWarehouseStore {
    /// Open (creating if missing) the database at `url` and ensure the schema.
    ///
    /// `sqlite::memory:` databases live inside a single connection, so the pool
    /// is pinned to one connection that is never recycled.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| map_sqlx_error("parse_url", e))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Wrap an existing pool (schema is created if missing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("migrate", e))?;
        }
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl WarehouseStore for SqliteWarehouseStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ping", e))?;
        Ok(())
    }

    #[instrument(skip(self, product), fields(product_id = %product.id_typed()), err)]
    async fn save_product(
        &self,
        product: &Product,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let id = product.id_typed().to_string();
        let state = serde_json::to_string(product)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let current = row_version(&mut tx, "products", &id).await?;
        check_version(&format!("product {id}"), expected, current)?;

        sqlx::query(
            r#"
            INSERT INTO products (id, sku, version, state)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (id) DO UPDATE SET
                sku = excluded.sku,
                version = excluded.version,
                state = excluded.state
            "#,
        )
        .bind(&id)
        .bind(product.sku())
        .bind(to_i64("version", product.version())?)
        .bind(&state)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Duplicate(format!("sku {} already exists", product.sku()))
            } else {
                map_sqlx_error("save_product", e)
            }
        })?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn load_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query("SELECT state FROM products WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_product", e))?;
        row.map(|r| decode_state(&r)).transpose()
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query("SELECT state FROM products ORDER BY sku")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_products", e))?;
        rows.iter().map(decode_state).collect()
    }

    #[instrument(skip(self, warehouse), fields(warehouse_id = %warehouse.id_typed()), err)]
    async fn save_warehouse(
        &self,
        warehouse: &Warehouse,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let id = warehouse.id_typed().to_string();
        let state = serde_json::to_string(warehouse)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let current = row_version(&mut tx, "warehouses", &id).await?;
        check_version(&format!("warehouse {id}"), expected, current)?;

        sqlx::query(
            r#"
            INSERT INTO warehouses (id, code, version, state)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (id) DO UPDATE SET
                code = excluded.code,
                version = excluded.version,
                state = excluded.state
            "#,
        )
        .bind(&id)
        .bind(warehouse.code())
        .bind(to_i64("version", warehouse.version())?)
        .bind(&state)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Duplicate(format!("warehouse code {} already exists", warehouse.code()))
            } else {
                map_sqlx_error("save_warehouse", e)
            }
        })?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn load_warehouse(&self, id: WarehouseId) -> Result<Option<Warehouse>, StoreError> {
        let row = sqlx::query("SELECT state FROM warehouses WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_warehouse", e))?;
        row.map(|r| decode_state(&r)).transpose()
    }

    async fn list_warehouses(&self) -> Result<Vec<Warehouse>, StoreError> {
        let rows = sqlx::query("SELECT state FROM warehouses ORDER BY code")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_warehouses", e))?;
        rows.iter().map(decode_state).collect()
    }

    async fn stock_position(&self, key: StockKey) -> Result<StockPosition, StoreError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;
        fetch_position(&mut conn, key).await
    }

    async fn list_stock_positions(&self) -> Result<Vec<StockPosition>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, warehouse_id, on_hand, last_sequence, revision
            FROM stock_positions
            ORDER BY product_id, warehouse_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_stock_positions", e))?;

        rows.iter()
            .map(|row| {
                let key = StockKey::new(
                    parse_column(row, "product_id")?,
                    parse_column(row, "warehouse_id")?,
                );
                position_from_row(key, row)
            })
            .collect()
    }

    async fn load_entries(&self, key: StockKey) -> Result<Vec<StockEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT entry_id, sequence, delta, kind, recorded_at, reason, reservation_id
            FROM stock_entries
            WHERE product_id = ?1 AND warehouse_id = ?2
            ORDER BY sequence ASC
            "#,
        )
        .bind(key.product_id.to_string())
        .bind(key.warehouse_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_entries", e))?;

        rows.iter().map(|row| entry_from_row(key, row)).collect()
    }

    #[instrument(
        skip(self, write),
        fields(
            key = %write.key,
            expected_revision = write.expected_revision,
            has_entry = write.entry.is_some(),
            has_reservation = write.reservation.is_some()
        ),
        err
    )]
    async fn apply_stock_write(&self, write: StockWrite) -> Result<StockPosition, StoreError> {
        write.validate()?;
        let key = write.key;
        let product_id = key.product_id.to_string();
        let warehouse_id = key.warehouse_id.to_string();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut position = fetch_position(&mut tx, key).await?;
        if position.revision != write.expected_revision {
            return Err(StoreError::Conflict(format!(
                "{key}: expected revision {}, found {}",
                write.expected_revision, position.revision
            )));
        }

        if let Some(entry) = &write.entry {
            if entry.sequence != position.last_sequence + 1 {
                return Err(StoreError::Conflict(format!(
                    "{key}: sequence {} does not follow {}",
                    entry.sequence, position.last_sequence
                )));
            }

            sqlx::query(
                r#"
                INSERT INTO stock_entries (
                    entry_id, product_id, warehouse_id, sequence, delta,
                    kind, recorded_at, reason, reservation_id
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(entry.entry_id.to_string())
            .bind(&product_id)
            .bind(&warehouse_id)
            .bind(to_i64("sequence", entry.sequence)?)
            .bind(entry.delta)
            .bind(entry.kind.as_str())
            .bind(entry.recorded_at)
            .bind(entry.reason.as_deref())
            .bind(entry.reservation_id.map(|id| id.to_string()))
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Conflict(format!(
                        "{key}: sequence {} already recorded",
                        entry.sequence
                    ))
                } else {
                    map_sqlx_error("insert_entry", e)
                }
            })?;

            position.on_hand += entry.delta;
            position.last_sequence = entry.sequence;
        }

        if let Some(r) = &write.reservation {
            let reservation = &r.reservation;
            let id = reservation.id_typed().to_string();
            let current = row_version(&mut tx, "reservations", &id).await?;
            check_version(&format!("reservation {id}"), r.expected, current)?;

            sqlx::query(
                r#"
                INSERT INTO reservations (
                    id, product_id, warehouse_id, status, expires_at_ms, version, state
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT (id) DO UPDATE SET
                    status = excluded.status,
                    expires_at_ms = excluded.expires_at_ms,
                    version = excluded.version,
                    state = excluded.state
                "#,
            )
            .bind(&id)
            .bind(&product_id)
            .bind(&warehouse_id)
            .bind(reservation.status().as_str())
            .bind(reservation.expires_at().timestamp_millis())
            .bind(to_i64("version", reservation.version())?)
            .bind(serde_json::to_string(reservation)?)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("upsert_reservation", e))?;
        }

        position.revision += 1;
        let updated = sqlx::query(
            r#"
            INSERT INTO stock_positions (
                product_id, warehouse_id, on_hand, last_sequence, revision
            )
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (product_id, warehouse_id) DO UPDATE SET
                on_hand = excluded.on_hand,
                last_sequence = excluded.last_sequence,
                revision = excluded.revision
            WHERE stock_positions.revision = ?6
            "#,
        )
        .bind(&product_id)
        .bind(&warehouse_id)
        .bind(position.on_hand)
        .bind(to_i64("last_sequence", position.last_sequence)?)
        .bind(to_i64("revision", position.revision)?)
        .bind(to_i64("revision", write.expected_revision)?)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_position", e))?;

        if updated.rows_affected() != 1 {
            return Err(StoreError::Conflict(format!(
                "{key}: revision moved during write"
            )));
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(position)
    }

    async fn load_reservation(
        &self,
        id: ReservationId,
    ) -> Result<Option<Reservation>, StoreError> {
        let row = sqlx::query("SELECT state FROM reservations WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_reservation", e))?;
        row.map(|r| decode_state(&r)).transpose()
    }

    async fn active_reservations(&self, key: StockKey) -> Result<Vec<Reservation>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT state FROM reservations
            WHERE product_id = ?1 AND warehouse_id = ?2 AND status = 'active'
            "#,
        )
        .bind(key.product_id.to_string())
        .bind(key.warehouse_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("active_reservations", e))?;

        let mut active = rows
            .iter()
            .map(decode_state::<Reservation>)
            .collect::<Result<Vec<_>, _>>()?;
        active.sort_by_key(|r| r.created_at());
        Ok(active)
    }

    async fn due_reservations(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reservation>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT state FROM reservations
            WHERE status = 'active' AND expires_at_ms <= ?1
            ORDER BY expires_at_ms ASC
            LIMIT ?2
            "#,
        )
        .bind(now.timestamp_millis())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("due_reservations", e))?;

        // Millisecond truncation can admit a hold that is due a few microseconds later.
        Ok(rows
            .iter()
            .map(decode_state::<Reservation>)
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|r| r.is_due_at(now))
            .collect())
    }

    #[instrument(skip(self, order), fields(order_id = %order.id_typed()), err)]
    async fn save_order(&self, order: &Order, expected: ExpectedVersion) -> Result<(), StoreError> {
        let id = order.id_typed().to_string();
        let state = serde_json::to_string(order)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let current = row_version(&mut tx, "orders", &id).await?;
        check_version(&format!("order {id}"), expected, current)?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, status, placed_at_ms, version, state)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (id) DO UPDATE SET
                status = excluded.status,
                version = excluded.version,
                state = excluded.state
            "#,
        )
        .bind(&id)
        .bind(order.status().as_str())
        .bind(order.placed_at().timestamp_millis())
        .bind(to_i64("version", order.version())?)
        .bind(&state)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("save_order", e))?;

        if current == 0 {
            for line in order.lines() {
                sqlx::query(
                    r#"
                    INSERT INTO order_lines (order_id, line_no, product_id, warehouse_id, quantity)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    "#,
                )
                .bind(&id)
                .bind(i64::from(line.line_no))
                .bind(line.product_id.to_string())
                .bind(line.warehouse_id.to_string())
                .bind(line.quantity)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("insert_order_line", e))?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn load_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query("SELECT state FROM orders WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_order", e))?;
        row.map(|r| decode_state(&r)).transpose()
    }

    async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query("SELECT state FROM orders ORDER BY placed_at_ms ASC, id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_orders", e))?;
        rows.iter().map(decode_state).collect()
    }
}

fn check_version(what: &str, expected: ExpectedVersion, actual: u64) -> Result<(), StoreError> {
    if expected.matches(actual) {
        Ok(())
    } else {
        Err(StoreError::Conflict(format!(
            "{what}: expected {expected:?}, found {actual}"
        )))
    }
}

/// Stored version of a JSON-state row (0 when the row does not exist).
async fn row_version(
    conn: &mut SqliteConnection,
    table: &'static str,
    id: &str,
) -> Result<u64, StoreError> {
    let row = sqlx::query(&format!("SELECT version FROM {table} WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("row_version", e))?;

    match row {
        Some(row) => {
            let version: i64 = row
                .try_get("version")
                .map_err(|e| map_sqlx_error("row_version", e))?;
            from_i64("version", version)
        }
        None => Ok(0),
    }
}

async fn fetch_position(
    conn: &mut SqliteConnection,
    key: StockKey,
) -> Result<StockPosition, StoreError> {
    let row = sqlx::query(
        r#"
        SELECT on_hand, last_sequence, revision
        FROM stock_positions
        WHERE product_id = ?1 AND warehouse_id = ?2
        "#,
    )
    .bind(key.product_id.to_string())
    .bind(key.warehouse_id.to_string())
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("fetch_position", e))?;

    match row {
        Some(row) => position_from_row(key, &row),
        None => Ok(StockPosition::empty(key)),
    }
}

fn position_from_row(key: StockKey, row: &SqliteRow) -> Result<StockPosition, StoreError> {
    let on_hand: i64 = row
        .try_get("on_hand")
        .map_err(|e| map_sqlx_error("decode_position", e))?;
    let last_sequence: i64 = row
        .try_get("last_sequence")
        .map_err(|e| map_sqlx_error("decode_position", e))?;
    let revision: i64 = row
        .try_get("revision")
        .map_err(|e| map_sqlx_error("decode_position", e))?;

    Ok(StockPosition {
        key,
        on_hand,
        last_sequence: from_i64("last_sequence", last_sequence)?,
        revision: from_i64("revision", revision)?,
    })
}

fn entry_from_row(key: StockKey, row: &SqliteRow) -> Result<StockEntry, StoreError> {
    let sequence: i64 = row
        .try_get("sequence")
        .map_err(|e| map_sqlx_error("decode_entry", e))?;
    let kind: String = row
        .try_get("kind")
        .map_err(|e| map_sqlx_error("decode_entry", e))?;
    let reservation_id: Option<String> = row
        .try_get("reservation_id")
        .map_err(|e| map_sqlx_error("decode_entry", e))?;

    Ok(StockEntry {
        entry_id: EntryId::new(parse_column(row, "entry_id")?),
        key,
        delta: row
            .try_get("delta")
            .map_err(|e| map_sqlx_error("decode_entry", e))?,
        kind: kind.parse::<EntryKind>().map_err(domain_to_serialization)?,
        sequence: from_i64("sequence", sequence)?,
        recorded_at: row
            .try_get("recorded_at")
            .map_err(|e| map_sqlx_error("decode_entry", e))?,
        reason: row
            .try_get("reason")
            .map_err(|e| map_sqlx_error("decode_entry", e))?,
        reservation_id: reservation_id
            .as_deref()
            .map(AggregateId::from_str)
            .transpose()
            .map_err(domain_to_serialization)?,
    })
}

fn decode_state<T: serde::de::DeserializeOwned>(row: &SqliteRow) -> Result<T, StoreError> {
    let state: String = row
        .try_get("state")
        .map_err(|e| map_sqlx_error("decode_state", e))?;
    Ok(serde_json::from_str(&state)?)
}

fn parse_column<T>(row: &SqliteRow, column: &str) -> Result<T, StoreError>
where
    T: FromStr<Err = DomainError>,
{
    let raw: String = row
        .try_get(column)
        .map_err(|e| map_sqlx_error("decode_column", e))?;
    raw.parse().map_err(domain_to_serialization)
}

fn domain_to_serialization(err: DomainError) -> StoreError {
    StoreError::Serialization(err.to_string())
}

fn to_i64(column: &str, value: u64) -> Result<i64, StoreError> {
    i64::try_from(value)
        .map_err(|_| StoreError::Serialization(format!("{column} out of range: {value}")))
}

fn from_i64(column: &str, value: i64) -> Result<u64, StoreError> {
    u64::try_from(value)
        .map_err(|_| StoreError::Serialization(format!("negative {column}: {value}")))
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // SQLITE_BUSY, SQLITE_LOCKED and their extended codes
                Some("5" | "6" | "261" | "262" | "517") => StoreError::Conflict(msg),
                _ if db_err.is_unique_violation() => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Conflict(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Serialization(format!("decode failed in {operation}: {err}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}
