// =============================================================================
// Candle Store — SQLite-backed candle table + alert dedupe table
// =============================================================================
//
// Two tables, both owned exclusively by this module:
//
//   candles(symbol, interval, open_time, open, high, low, close, volume,
//           rsi, local_time)               PK (symbol, interval, open_time)
//   alerts(symbol, interval, open_time, alert_type)
//                                          PK (all four columns)
//
// Candle writes are last-write-wins upserts: re-ingesting a key overwrites
// every value column with the new record's values, nulls included.  That is
// what a late-arriving update to a still-open candle needs — merging on
// non-null would resurrect stale OHLCV.
//
// Alert rows carry no value columns; a row's existence means "this candle
// already triggered this alert type".  INSERT OR IGNORE makes recording
// idempotent.
//
// WAL journal mode lets readers proceed during a writer's batch; each batch
// is one transaction and one durability point.
// =============================================================================

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;

/// Default number of records per batch transaction.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// One canonical candle row.  Value fields are nullable: an absent price or
/// indicator is `None`, never coerced to 0 — zero is a legitimate value and
/// must stay distinguishable from "missing".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleRecord {
    pub symbol: String,
    pub interval: String,
    /// Bucket start, epoch milliseconds UTC.
    pub open_time: i64,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
    pub rsi: Option<f64>,
    /// Display-only local wall-clock rendering of `open_time`.
    pub local_time: Option<String>,
}

const UPSERT_SQL: &str = "INSERT INTO candles \
     (symbol, interval, open_time, open, high, low, close, volume, rsi, local_time) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
     ON CONFLICT(symbol, interval, open_time) DO UPDATE SET \
     open = excluded.open, high = excluded.high, low = excluded.low, \
     close = excluded.close, volume = excluded.volume, rsi = excluded.rsi, \
     local_time = excluded.local_time";

const SELECT_COLUMNS: &str =
    "symbol, interval, open_time, open, high, low, close, volume, rsi, local_time";

/// SQLite-backed store for candles and sent-alert markers.
pub struct CandleStore {
    conn: Connection,
}

impl CandleStore {
    /// Open (or create) the store at `path`, apply pragmas, and ensure the
    /// schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init()?;
        info!("candle store opened (WAL mode)");
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<()> {
        // WAL + NORMAL: concurrent readers during a writer's batch, fsync at
        // checkpoint rather than every commit.
        let _mode: String = self
            .conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        self.conn.execute_batch("PRAGMA synchronous=NORMAL;")?;

        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS candles (
                symbol     TEXT NOT NULL,
                interval   TEXT NOT NULL,
                open_time  INTEGER NOT NULL,
                open       REAL,
                high       REAL,
                low        REAL,
                close      REAL,
                volume     REAL,
                rsi        REAL,
                local_time TEXT,
                PRIMARY KEY(symbol, interval, open_time)
            );
            CREATE TABLE IF NOT EXISTS alerts (
                symbol     TEXT,
                interval   TEXT,
                open_time  INTEGER,
                alert_type TEXT,
                PRIMARY KEY(symbol, interval, open_time, alert_type)
            );",
        )?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Candle writes
    // -------------------------------------------------------------------------

    /// Upsert a single record.  Durable before returning.  Returns the number
    /// of rows written (always 1 on success).
    pub fn upsert(&mut self, record: &CandleRecord) -> Result<usize> {
        self.upsert_batch(std::slice::from_ref(record), DEFAULT_BATCH_SIZE)
    }

    /// Upsert a sequence of records in fixed-size batches; each batch is a
    /// single transaction.  Semantics are identical to serial upserts — the
    /// batching only bounds write amplification, it adds no cross-record
    /// atomicity beyond the batch boundary.
    ///
    /// Write errors propagate; nothing is silently dropped.
    pub fn upsert_batch(&mut self, records: &[CandleRecord], batch_size: usize) -> Result<usize> {
        let batch_size = batch_size.max(1);
        let mut written = 0usize;

        for chunk in records.chunks(batch_size) {
            let tx = self.conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(UPSERT_SQL)?;
                for record in chunk {
                    stmt.execute(params![
                        record.symbol,
                        record.interval,
                        record.open_time,
                        record.open,
                        record.high,
                        record.low,
                        record.close,
                        record.volume,
                        record.rsi,
                        record.local_time,
                    ])?;
                    written += 1;
                }
            }
            tx.commit()?;
            debug!(batch = chunk.len(), total = written, "candle batch committed");
        }

        Ok(written)
    }

    // -------------------------------------------------------------------------
    // Candle reads
    // -------------------------------------------------------------------------

    /// Maximum stored open_time for a key, or 0 — the "never fetched"
    /// sentinel — when the key has no rows.
    pub fn latest_open_time(&self, symbol: &str, interval: &str) -> Result<i64> {
        let max: Option<i64> = self.conn.query_row(
            "SELECT MAX(open_time) FROM candles WHERE symbol = ?1 AND interval = ?2",
            params![symbol, interval],
            |row| row.get(0),
        )?;
        Ok(max.unwrap_or(0))
    }

    /// Range query over one key, inclusive on both bounds, ascending by
    /// open_time.  An absent bound is unbounded on that side.
    pub fn query(
        &self,
        symbol: &str,
        interval: &str,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Vec<CandleRecord>> {
        let mut sql = format!(
            "SELECT {SELECT_COLUMNS} FROM candles WHERE symbol = ?1 AND interval = ?2"
        );
        let mut bound: Vec<i64> = Vec::new();
        if let Some(start) = start {
            sql.push_str(&format!(" AND open_time >= ?{}", bound.len() + 3));
            bound.push(start);
        }
        if let Some(end) = end {
            sql.push_str(&format!(" AND open_time <= ?{}", bound.len() + 3));
            bound.push(end);
        }
        sql.push_str(" ORDER BY open_time ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = match bound.len() {
            0 => stmt.query_map(params![symbol, interval], row_to_record)?,
            1 => stmt.query_map(params![symbol, interval, bound[0]], row_to_record)?,
            _ => stmt.query_map(params![symbol, interval, bound[0], bound[1]], row_to_record)?,
        };
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// The latest-closed alert candidate for a key: the row with the maximum
    /// open_time strictly below the key's global maximum.  The most recent
    /// row is assumed possibly still open and is never returned.
    pub fn second_latest(&self, symbol: &str, interval: &str) -> Result<Option<CandleRecord>> {
        let record = self
            .conn
            .query_row(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM candles \
                     WHERE symbol = ?1 AND interval = ?2 \
                     ORDER BY open_time DESC LIMIT 1 OFFSET 1"
                ),
                params![symbol, interval],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// The most recent `limit` non-null closes strictly before
    /// `before_open_time`, oldest first.  Used to seed indicator warm-up for
    /// an incremental batch.
    pub fn recent_closes_before(
        &self,
        symbol: &str,
        interval: &str,
        before_open_time: i64,
        limit: usize,
    ) -> Result<Vec<f64>> {
        let mut stmt = self.conn.prepare(
            "SELECT close FROM candles \
             WHERE symbol = ?1 AND interval = ?2 AND open_time < ?3 AND close IS NOT NULL \
             ORDER BY open_time DESC LIMIT ?4",
        )?;
        let mut closes = stmt
            .query_map(
                params![symbol, interval, before_open_time, limit as i64],
                |row| row.get::<_, f64>(0),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        closes.reverse();
        Ok(closes)
    }

    // -------------------------------------------------------------------------
    // Alert dedupe
    // -------------------------------------------------------------------------

    /// Whether a notification for this exact candle + alert type was already
    /// recorded.
    pub fn alert_already_sent(
        &self,
        symbol: &str,
        interval: &str,
        open_time: i64,
        alert_type: &str,
    ) -> Result<bool> {
        let hit: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM alerts \
                 WHERE symbol = ?1 AND interval = ?2 AND open_time = ?3 AND alert_type = ?4",
                params![symbol, interval, open_time, alert_type],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hit.is_some())
    }

    /// Record that a notification was sent.  Insert-or-ignore: calling twice
    /// with the same key is a no-op, never an error.
    pub fn record_alert_sent(
        &self,
        symbol: &str,
        interval: &str,
        open_time: i64,
        alert_type: &str,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO alerts (symbol, interval, open_time, alert_type) \
             VALUES (?1, ?2, ?3, ?4)",
            params![symbol, interval, open_time, alert_type],
        )?;
        Ok(())
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<CandleRecord> {
    Ok(CandleRecord {
        symbol: row.get(0)?,
        interval: row.get(1)?,
        open_time: row.get(2)?,
        open: row.get(3)?,
        high: row.get(4)?,
        low: row.get(5)?,
        close: row.get(6)?,
        volume: row.get(7)?,
        rsi: row.get(8)?,
        local_time: row.get(9)?,
    })
}
