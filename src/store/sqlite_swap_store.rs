use super::models::{
    FailureEntry, FailureRecord, HistoryEntry, StyleUsage, SwapRecord, UsageStatistics,
};
use super::schema::SWAP_VERSIONED_SCHEMAS;
use super::{ResultSink, SwapHistory};
use crate::sqlite_persistence::open_versioned;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

#[derive(Clone)]
pub struct SqliteSwapStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSwapStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        info!("Opening swap database at {:?}", path);

        let mut conn = Connection::open(path).context("Failed to open swap database")?;
        open_versioned(&mut conn, SWAP_VERSIONED_SCHEMAS)
            .with_context(|| format!("Failed to prepare swap database at {:?}", path))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    fn parse_datetime(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    /// Stores one successful swap and bumps every usage counter it touches.
    /// Returns the id of the new history entry.
    pub fn record(&self, record: &SwapRecord) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = Self::format_datetime(&record.completed_at);
        let meta = &record.metadata;

        let mut conn = self.lock();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO swap_results (id, user_id, user_name, style_id, style_name,
                customer_image, style_image, result_image, job_id, processing_time, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                id,
                meta.user_id,
                meta.user_name,
                meta.style_id,
                meta.style_name,
                record.source_image,
                record.target_image,
                record.output_url,
                record.job_id,
                record.elapsed.as_secs_f64(),
                created_at,
            ],
        )?;

        if !meta.style_id.is_empty() {
            tx.execute(
                "INSERT INTO style_usage (style_id, style_name, ai_usage_count, last_used_at)
                 VALUES (?1, ?2, 1, ?3)
                 ON CONFLICT(style_id) DO UPDATE SET
                    ai_usage_count = ai_usage_count + 1,
                    style_name = excluded.style_name,
                    last_used_at = excluded.last_used_at",
                params![meta.style_id, meta.style_name, created_at],
            )?;
        }

        tx.execute(
            "INSERT INTO daily_usage (day, swap_count) VALUES (?1, 1)
             ON CONFLICT(day) DO UPDATE SET swap_count = swap_count + 1",
            params![record.day_key()],
        )?;

        tx.execute(
            "INSERT INTO usage_totals (id, total_swaps, last_used_at) VALUES (1, 1, ?1)
             ON CONFLICT(id) DO UPDATE SET
                total_swaps = total_swaps + 1,
                last_used_at = excluded.last_used_at",
            params![created_at],
        )?;

        tx.commit()?;
        debug!("Stored swap result {} for user {}", id, meta.user_id);
        Ok(id)
    }

    /// Stores one failed swap. Usage counters are left untouched.
    pub fn log_failure(&self, record: &FailureRecord) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let meta = &record.metadata;

        self.lock().execute(
            "INSERT INTO error_logs (id, error_kind, message, job_id, user_id, style_id,
                customer_image, style_image, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                record.error_kind,
                record.message,
                record.job_id,
                meta.user_id,
                meta.style_id,
                record.source_image,
                record.target_image,
                Self::format_datetime(&record.failed_at),
            ],
        )?;
        debug!(
            "Stored {} failure {} for user {}",
            record.error_kind, id, meta.user_id
        );
        Ok(id)
    }

    /// Most recent failed swaps, newest first.
    pub fn get_recent_failures(&self, limit: usize) -> Result<Vec<FailureEntry>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, error_kind, message, job_id, user_id, style_id,
                    customer_image, style_image, created_at
             FROM error_logs
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?1",
        )?;
        let entries = stmt
            .query_map(params![limit as i64], |row| {
                let created_at: String = row.get("created_at")?;
                Ok(FailureEntry {
                    id: row.get("id")?,
                    error_kind: row.get("error_kind")?,
                    message: row.get("message")?,
                    job_id: row.get("job_id")?,
                    user_id: row.get("user_id")?,
                    style_id: row.get("style_id")?,
                    customer_image: row.get("customer_image")?,
                    style_image: row.get("style_image")?,
                    created_at: Self::parse_datetime(&created_at),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn row_to_history_entry(row: &rusqlite::Row) -> rusqlite::Result<HistoryEntry> {
        let created_at: String = row.get("created_at")?;
        Ok(HistoryEntry {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            user_name: row.get("user_name")?,
            style_id: row.get("style_id")?,
            style_name: row.get("style_name")?,
            customer_image: row.get("customer_image")?,
            style_image: row.get("style_image")?,
            result_image: row.get("result_image")?,
            processing_time: row.get("processing_time")?,
            created_at: Self::parse_datetime(&created_at),
        })
    }
}

impl SwapHistory for SqliteSwapStore {
    fn get_user_history(&self, user_id: &str, limit: usize) -> Result<Vec<HistoryEntry>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, user_name, style_id, style_name, customer_image,
                    style_image, result_image, processing_time, created_at
             FROM swap_results
             WHERE user_id = ?1
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2",
        )?;
        let entries = stmt
            .query_map(params![user_id, limit as i64], Self::row_to_history_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn get_statistics(&self) -> Result<UsageStatistics> {
        let conn = self.lock();

        let totals: Option<(i64, Option<String>)> = conn
            .query_row(
                "SELECT total_swaps, last_used_at FROM usage_totals WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (total_swaps, last_used_at) = totals.unwrap_or((0, None));
        let failed_swaps: i64 =
            conn.query_row("SELECT COUNT(*) FROM error_logs", [], |row| row.get(0))?;

        let mut daily_stmt = conn.prepare("SELECT day, swap_count FROM daily_usage")?;
        let daily = daily_stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<rusqlite::Result<_>>()?;

        let mut styles_stmt = conn.prepare(
            "SELECT style_id, style_name, ai_usage_count, last_used_at
             FROM style_usage
             ORDER BY ai_usage_count DESC, style_id",
        )?;
        let styles = styles_stmt
            .query_map([], |row| {
                let last_used_at: String = row.get(3)?;
                Ok(StyleUsage {
                    style_id: row.get(0)?,
                    style_name: row.get(1)?,
                    ai_usage_count: row.get::<_, i64>(2)? as u64,
                    last_used_at: Self::parse_datetime(&last_used_at),
                })
            })?
            .collect::<rusqlite::Result<_>>()?;

        Ok(UsageStatistics {
            total_swaps: total_swaps as u64,
            failed_swaps: failed_swaps as u64,
            last_used_at: last_used_at.as_deref().map(Self::parse_datetime),
            daily,
            styles,
        })
    }

    fn ping(&self) -> bool {
        self.lock()
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }
}

#[async_trait]
impl ResultSink for SqliteSwapStore {
    async fn record_success(&self, record: SwapRecord) -> Result<()> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.record(&record))
            .await
            .context("Swap store task panicked")??;
        Ok(())
    }

    async fn record_failure(&self, record: FailureRecord) -> Result<()> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.log_failure(&record))
            .await
            .context("Swap store task panicked")??;
        Ok(())
    }
}
