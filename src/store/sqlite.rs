// 💾 SQLite store
//
// Schema: sites, locations, products, rfids (tag bindings), rfid_tx (scans)
// and events (audit trail). rfid_tx is keyed by PRIMARY KEY (tag_id, epc,
// scan_date) so a duplicate insert fails with a constraint violation, even
// when two writers race past the existence check.
//
// Dates are stored as zero-padded TEXT so that string order is time order.
// RSSI is stored as decimal TEXT and averaged as REAL.

use super::{ReferenceData, ReferenceWriter, StoreResult, TransactionStore};
use crate::error::StoreError;
use crate::model::{
    BindingKey, LatestEpc, LatestScanFilter, Location, Product, RfidBinding, RfidTx, ScanWindow,
    SearchCriteria, Site, TopEpc, TransactionView, TxKey,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{ffi, params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};

const STORAGE_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const ENTITY_RFID_TX: &str = "rfid_tx";
const ACTOR: &str = "rfid_ledger";

/// Joined view columns, shared by every narrow query
const VIEW_SELECT: &str = "SELECT t.tag_id, t.epc, t.scan_date, r.ref_code, t.location_id,
        l.location_name, s.site_name, t.rssi
     FROM rfid_tx t
     JOIN locations l ON l.location_id = t.location_id
     JOIN sites s ON s.site_id = l.site_id
     LEFT JOIN rfids r ON r.tag_id = t.tag_id AND r.epc = t.epc";

const VIEW_ORDER: &str = "ORDER BY t.scan_date, t.tag_id, t.epc";

// ============================================================================
// AUDIT EVENTS
// ============================================================================

/// One change to a scan transaction, appended after the write succeeds
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(event_type: &str, entity_id: &str, data: serde_json::Value) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: ENTITY_RFID_TX.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: ACTOR.to_string(),
        }
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS sites (
            site_id INTEGER PRIMARY KEY,
            site_name TEXT UNIQUE NOT NULL
        );

        CREATE TABLE IF NOT EXISTS locations (
            location_id INTEGER PRIMARY KEY,
            location_name TEXT NOT NULL,
            site_id INTEGER NOT NULL REFERENCES sites(site_id),
            UNIQUE (location_name, site_id)
        );

        CREATE TABLE IF NOT EXISTS products (
            ref_code INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS rfids (
            tag_id TEXT NOT NULL,
            epc TEXT NOT NULL,
            ref_code INTEGER NOT NULL,
            PRIMARY KEY (tag_id, epc)
        );

        CREATE TABLE IF NOT EXISTS rfid_tx (
            tag_id TEXT NOT NULL,
            epc TEXT NOT NULL,
            scan_date TEXT NOT NULL,
            location_id INTEGER NOT NULL REFERENCES locations(location_id),
            rssi TEXT NOT NULL,
            PRIMARY KEY (tag_id, epc, scan_date)
        );

        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_rfid_tx_epc ON rfid_tx(epc);
        CREATE INDEX IF NOT EXISTS idx_rfid_tx_scan_date ON rfid_tx(scan_date);
        CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id);",
    )?;
    Ok(())
}

// ============================================================================
// ROW DECODING
// ============================================================================

fn to_storage(date: &NaiveDateTime) -> String {
    date.format(STORAGE_DATE_FORMAT).to_string()
}

fn date_column(row: &Row, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&raw, STORAGE_DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn decimal_column(row: &Row, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn view_from_row(row: &Row) -> rusqlite::Result<TransactionView> {
    Ok(TransactionView {
        tag_id: row.get(0)?,
        epc: row.get(1)?,
        scan_date: date_column(row, 2)?,
        ref_code: row.get(3)?,
        location_id: row.get(4)?,
        location_name: row.get(5)?,
        site_name: row.get(6)?,
        rssi: decimal_column(row, 7)?,
    })
}

/// Uniqueness failures become `Duplicate`, foreign-key failures
/// `MissingReference`. Everything else passes through.
fn write_error(err: rusqlite::Error, what: impl FnOnce() -> String) -> StoreError {
    let extended_code = match &err {
        rusqlite::Error::SqliteFailure(e, _) => Some(e.extended_code),
        _ => None,
    };
    match extended_code {
        Some(ffi::SQLITE_CONSTRAINT_PRIMARYKEY) | Some(ffi::SQLITE_CONSTRAINT_UNIQUE) => {
            StoreError::Duplicate(what())
        }
        Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => StoreError::MissingReference(what()),
        _ => err.into(),
    }
}

fn insert_result(result: rusqlite::Result<usize>, what: impl FnOnce() -> String) -> StoreResult<()> {
    result.map(|_| ()).map_err(|err| write_error(err, what))
}

// ============================================================================
// STORE
// ============================================================================

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a file database in WAL mode
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        setup_database(&conn)?;
        debug!(path = %path.display(), journal_mode = %mode, "Opened ledger database");
        Ok(SqliteStore { conn })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(SqliteStore { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Audit trail for one transaction key, newest first
    pub fn events_for_transaction(&self, key: &TxKey) -> StoreResult<Vec<Event>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
             FROM events
             WHERE entity_type = ?1 AND entity_id = ?2
             ORDER BY id DESC",
        )?;

        let events = stmt
            .query_map(params![ENTITY_RFID_TX, key.to_string()], |row| {
                let timestamp: String = row.get(1)?;
                let data: String = row.get(5)?;

                Ok(Event {
                    event_id: row.get(0)?,
                    timestamp: DateTime::parse_from_rfc3339(&timestamp)
                        .map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e))
                        })?
                        .with_timezone(&Utc),
                    event_type: row.get(2)?,
                    entity_type: row.get(3)?,
                    entity_id: row.get(4)?,
                    data: serde_json::from_str(&data).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e))
                    })?,
                    actor: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(events)
    }

    fn insert_event(&self, event: &Event) -> StoreResult<()> {
        let data = serde_json::to_string(&event.data)?;
        self.conn.execute(
            "INSERT INTO events (
                event_id, timestamp, event_type, entity_type, entity_id, data, actor
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.event_id,
                event.timestamp.to_rfc3339(),
                event.event_type,
                event.entity_type,
                event.entity_id,
                data,
                event.actor,
            ],
        )?;
        Ok(())
    }

    /// The audit trail never fails the write it describes
    fn record(&self, event_type: &str, tx_key: &TxKey, data: serde_json::Value) {
        let event = Event::new(event_type, &tx_key.to_string(), data);
        if let Err(err) = self.insert_event(&event) {
            warn!(key = %tx_key, error = %err, "Failed to record {} event", event_type);
        }
    }

    fn views(
        &self,
        filter: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> StoreResult<Vec<TransactionView>> {
        let sql = format!("{} {} {}", VIEW_SELECT, filter, VIEW_ORDER);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(args, view_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn exists(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> StoreResult<bool> {
        let found: bool = self.conn.query_row(sql, args, |row| row.get(0))?;
        Ok(found)
    }
}

impl ReferenceWriter for SqliteStore {
    fn insert_site(&self, site: &Site) -> StoreResult<()> {
        let result = self.conn.execute(
            "INSERT INTO sites (site_id, site_name) VALUES (?1, ?2)",
            params![site.site_id, site.site_name],
        );
        insert_result(result, || format!("site {}", site.site_id))
    }

    fn insert_location(&self, location: &Location) -> StoreResult<()> {
        let result = self.conn.execute(
            "INSERT INTO locations (location_id, location_name, site_id) VALUES (?1, ?2, ?3)",
            params![location.location_id, location.location_name, location.site_id],
        );
        insert_result(result, || format!("location {}", location.location_id))
    }

    fn insert_product(&self, product: &Product) -> StoreResult<()> {
        let result = self.conn.execute(
            "INSERT INTO products (ref_code, name) VALUES (?1, ?2)",
            params![product.ref_code, product.name],
        );
        insert_result(result, || format!("product {}", product.ref_code))
    }

    fn insert_binding(&self, binding: &RfidBinding) -> StoreResult<()> {
        let result = self.conn.execute(
            "INSERT INTO rfids (tag_id, epc, ref_code) VALUES (?1, ?2, ?3)",
            params![binding.key.tag_id, binding.key.epc, binding.ref_code],
        );
        insert_result(result, || {
            format!("rfid {}/{}", binding.key.tag_id, binding.key.epc)
        })
    }
}

impl ReferenceData for SqliteStore {
    fn site_exists(&self, site_name: &str) -> StoreResult<bool> {
        self.exists(
            "SELECT EXISTS (SELECT 1 FROM sites WHERE site_name = ?1)",
            &[&site_name],
        )
    }

    fn find_site_by_name(&self, site_name: &str) -> StoreResult<Option<Site>> {
        let site = self
            .conn
            .query_row(
                "SELECT site_id, site_name FROM sites WHERE site_name = ?1",
                params![site_name],
                |row| {
                    Ok(Site {
                        site_id: row.get(0)?,
                        site_name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(site)
    }

    fn find_site_by_id(&self, site_id: i64) -> StoreResult<Option<Site>> {
        let site = self
            .conn
            .query_row(
                "SELECT site_id, site_name FROM sites WHERE site_id = ?1",
                params![site_id],
                |row| {
                    Ok(Site {
                        site_id: row.get(0)?,
                        site_name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(site)
    }

    fn location_exists(&self, location_name: &str) -> StoreResult<bool> {
        self.exists(
            "SELECT EXISTS (SELECT 1 FROM locations WHERE location_name = ?1)",
            &[&location_name],
        )
    }

    fn find_location_matching_site(
        &self,
        location_name: &str,
        site_name: &str,
    ) -> StoreResult<Option<Location>> {
        let location = self
            .conn
            .query_row(
                "SELECT l.location_id, l.location_name, l.site_id
                 FROM locations l
                 JOIN sites s ON s.site_id = l.site_id
                 WHERE l.location_name = ?1 AND s.site_name = ?2",
                params![location_name, site_name],
                |row| {
                    Ok(Location {
                        location_id: row.get(0)?,
                        location_name: row.get(1)?,
                        site_id: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(location)
    }

    fn find_location_by_id(&self, location_id: i64) -> StoreResult<Option<Location>> {
        let location = self
            .conn
            .query_row(
                "SELECT location_id, location_name, site_id FROM locations WHERE location_id = ?1",
                params![location_id],
                |row| {
                    Ok(Location {
                        location_id: row.get(0)?,
                        location_name: row.get(1)?,
                        site_id: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(location)
    }

    fn binding_exists(&self, key: &BindingKey) -> StoreResult<bool> {
        self.exists(
            "SELECT EXISTS (SELECT 1 FROM rfids WHERE tag_id = ?1 AND epc = ?2)",
            &[&key.tag_id, &key.epc],
        )
    }

    fn ref_code_matches(&self, key: &BindingKey, ref_code: i64) -> StoreResult<bool> {
        self.exists(
            "SELECT EXISTS (SELECT 1 FROM rfids WHERE tag_id = ?1 AND epc = ?2 AND ref_code = ?3)",
            &[&key.tag_id, &key.epc, &ref_code],
        )
    }
}

impl TransactionStore for SqliteStore {
    fn find_by_key(&self, key: &TxKey) -> StoreResult<Option<RfidTx>> {
        let tx = self
            .conn
            .query_row(
                "SELECT tag_id, epc, scan_date, location_id, rssi
                 FROM rfid_tx
                 WHERE tag_id = ?1 AND epc = ?2 AND scan_date = ?3",
                params![key.tag_id, key.epc, to_storage(&key.scan_date)],
                |row| {
                    Ok(RfidTx {
                        key: TxKey::new(
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            date_column(row, 2)?,
                        ),
                        location_id: row.get(3)?,
                        rssi: decimal_column(row, 4)?,
                    })
                },
            )
            .optional()?;
        Ok(tx)
    }

    fn exists_by_key(&self, key: &TxKey) -> StoreResult<bool> {
        self.exists(
            "SELECT EXISTS (SELECT 1 FROM rfid_tx WHERE tag_id = ?1 AND epc = ?2 AND scan_date = ?3)",
            &[&key.tag_id, &key.epc, &to_storage(&key.scan_date)],
        )
    }

    fn insert(&self, tx: &RfidTx) -> StoreResult<()> {
        let result = self.conn.execute(
            "INSERT INTO rfid_tx (tag_id, epc, scan_date, location_id, rssi)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                tx.key.tag_id,
                tx.key.epc,
                to_storage(&tx.key.scan_date),
                tx.location_id,
                tx.rssi.to_string(),
            ],
        );
        insert_result(result, || tx.key.to_string())?;

        self.record(
            "transaction_added",
            &tx.key,
            serde_json::json!({
                "location_id": tx.location_id,
                "rssi": tx.rssi.to_string(),
            }),
        );
        Ok(())
    }

    fn update(&self, tx: &RfidTx) -> StoreResult<()> {
        let changed = self.conn.execute(
            "UPDATE rfid_tx SET location_id = ?4, rssi = ?5
             WHERE tag_id = ?1 AND epc = ?2 AND scan_date = ?3",
            params![
                tx.key.tag_id,
                tx.key.epc,
                to_storage(&tx.key.scan_date),
                tx.location_id,
                tx.rssi.to_string(),
            ],
        )
        .map_err(|err| write_error(err, || tx.key.to_string()))?;
        if changed == 0 {
            return Err(StoreError::NotFound(tx.key.to_string()));
        }

        self.record(
            "transaction_updated",
            &tx.key,
            serde_json::json!({
                "location_id": tx.location_id,
                "rssi": tx.rssi.to_string(),
            }),
        );
        Ok(())
    }

    fn delete_by_key(&self, key: &TxKey) -> StoreResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM rfid_tx WHERE tag_id = ?1 AND epc = ?2 AND scan_date = ?3",
            params![key.tag_id, key.epc, to_storage(&key.scan_date)],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(key.to_string()));
        }

        self.record("transaction_deleted", key, serde_json::json!({}));
        Ok(())
    }

    fn latest_per_epc(&self, filter: &LatestScanFilter) -> StoreResult<Vec<LatestEpc>> {
        let mut stmt = self.conn.prepare(
            "WITH scoped AS (
                SELECT t.epc, t.tag_id, t.scan_date, t.rssi, s.site_name, l.location_name
                FROM rfid_tx t
                JOIN locations l ON l.location_id = t.location_id
                JOIN sites s ON s.site_id = l.site_id
                WHERE t.scan_date BETWEEN ?1 AND ?2
                  AND (?3 IS NULL OR t.epc = ?3)
                  AND (?4 IS NULL OR s.site_name = ?4)
            ),
            ranked AS (
                SELECT epc,
                       site_name || ' ' || location_name AS location,
                       ROW_NUMBER() OVER (
                           PARTITION BY epc ORDER BY scan_date DESC, tag_id ASC
                       ) AS rn,
                       COUNT(*) OVER (PARTITION BY epc) AS tx_count,
                       AVG(CAST(rssi AS REAL)) OVER (PARTITION BY epc) AS avg_rssi
                FROM scoped
            )
            SELECT epc, tx_count, avg_rssi, location
            FROM ranked
            WHERE rn = 1
            ORDER BY epc",
        )?;

        let latest = stmt
            .query_map(
                params![
                    to_storage(&filter.window.start),
                    to_storage(&filter.window.end),
                    filter.epc,
                    filter.site_name,
                ],
                |row| {
                    Ok(LatestEpc {
                        epc: row.get(0)?,
                        transaction_count: row.get(1)?,
                        average_rssi: row.get(2)?,
                        most_recent_location: row.get(3)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(latest)
    }

    fn top_reads(&self, limit: usize, window: &ScanWindow) -> StoreResult<Vec<TopEpc>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(
            "SELECT t.epc, COUNT(*) AS read_count
             FROM rfid_tx t
             JOIN locations l ON l.location_id = t.location_id
             JOIN sites s ON s.site_id = l.site_id
             WHERE t.scan_date BETWEEN ?1 AND ?2
             GROUP BY t.epc
             ORDER BY read_count DESC, t.epc ASC
             LIMIT ?3",
        )?;

        let top = stmt
            .query_map(
                params![to_storage(&window.start), to_storage(&window.end), limit],
                |row| {
                    Ok(TopEpc {
                        epc: row.get(0)?,
                        read_count: row.get(1)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(top)
    }

    fn find_by_criteria(&self, criteria: &SearchCriteria) -> StoreResult<Vec<TransactionView>> {
        let start = criteria.start.as_ref().map(to_storage);
        let end = criteria.end.as_ref().map(to_storage);
        self.views(
            "WHERE (?1 IS NULL OR t.epc = ?1)
               AND (?2 IS NULL OR t.tag_id = ?2)
               AND (?3 IS NULL OR t.scan_date >= ?3)
               AND (?4 IS NULL OR t.scan_date <= ?4)",
            &[&criteria.epc, &criteria.tag_id, &start, &end],
        )
    }

    fn find_by_epc(&self, epc: &str) -> StoreResult<Vec<TransactionView>> {
        self.views("WHERE t.epc = ?1", &[&epc])
    }

    fn find_by_tag_id(&self, tag_id: &str) -> StoreResult<Vec<TransactionView>> {
        self.views("WHERE t.tag_id = ?1", &[&tag_id])
    }

    fn find_by_epc_and_tag_id(&self, epc: &str, tag_id: &str) -> StoreResult<Vec<TransactionView>> {
        self.views("WHERE t.epc = ?1 AND t.tag_id = ?2", &[&epc, &tag_id])
    }

    fn find_by_scan_date_between(&self, window: &ScanWindow) -> StoreResult<Vec<TransactionView>> {
        self.views(
            "WHERE t.scan_date BETWEEN ?1 AND ?2",
            &[&to_storage(&window.start), &to_storage(&window.end)],
        )
    }
}
