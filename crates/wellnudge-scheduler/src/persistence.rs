//! SQLite-backed persistence for events, rules, recommendations and metrics,
//! plus the collaborator feeds (punches, calendar, weather, steps, profiles).
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings so that string
//! comparison matches time order. Events also carry their local business day.

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use wellnudge_core::config::DatabaseConfig;
use wellnudge_core::error::{Result, WellnudgeError};
use wellnudge_core::time::local_date;
use wellnudge_core::traits::*;
use wellnudge_core::types::*;

pub struct WellnudgeDb {
    conn: Mutex<Connection>,
    offset: FixedOffset,
}

fn db_err(ctx: &'static str) -> impl Fn(rusqlite::Error) -> WellnudgeError {
    move |e| WellnudgeError::Database(format!("{ctx}: {e}"))
}

fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| WellnudgeError::Database(format!("bad timestamp '{s}': {e}")))
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| WellnudgeError::Database(format!("bad date '{s}': {e}")))
}

impl WellnudgeDb {
    /// Open or create the database file. Days are local to `offset`.
    pub fn open(path: &Path, offset: FixedOffset) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err("DB open"))?;
        Self::from_connection(conn, offset)
    }

    /// Open the database named in config; `~` and env vars in the path are expanded.
    pub fn open_configured(config: &DatabaseConfig, offset: FixedOffset) -> Result<Self> {
        let expanded = shellexpand::full(&config.path)
            .map_err(|e| WellnudgeError::Config(format!("bad database path '{}': {e}", config.path)))?;
        let path = PathBuf::from(expanded.as_ref());
        tracing::info!("🗄️ Opening database at {}", path.display());
        Self::open(&path, offset)
    }

    pub fn open_in_memory(offset: FixedOffset) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err("DB open"))?;
        Self::from_connection(conn, offset)
    }

    fn from_connection(conn: Connection, offset: FixedOffset) -> Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
            offset,
        };
        db.migrate()?;
        Ok(db)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| WellnudgeError::Database("connection lock poisoned".into()))
    }

    /// Create tables.
    fn migrate(&self) -> Result<()> {
        self.lock()?
            .execute_batch(
                "
            -- Raw telemetry
            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                local_date TEXT NOT NULL,
                event_type TEXT NOT NULL,        -- WORK, BREAK, WATER, POSTURE, ENVIRONMENT
                source TEXT NOT NULL DEFAULT 'desktop',
                data TEXT NOT NULL DEFAULT '{}', -- JSON payload
                processed INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_events_user_day ON events(user_id, local_date);

            -- Reminder rules (condition/template validated on load)
            CREATE TABLE IF NOT EXISTS rules (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                condition TEXT NOT NULL,         -- JSON: {type, metric, op, value}
                slot_template TEXT NOT NULL,     -- JSON: {type, reason, action}
                is_active INTEGER NOT NULL DEFAULT 1,
                priority INTEGER NOT NULL DEFAULT 0,
                cooldown_minutes INTEGER NOT NULL DEFAULT 30
            );

            CREATE TABLE IF NOT EXISTS recommendations (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                rule_id TEXT,
                content TEXT NOT NULL,
                slots TEXT NOT NULL DEFAULT '[]',
                context TEXT NOT NULL DEFAULT '{}',
                status TEXT NOT NULL DEFAULT 'created',  -- created, sent, failed
                sent_at TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_recs_user_rule ON recommendations(user_id, rule_id, created_at);

            CREATE TABLE IF NOT EXISTS daily_metrics (
                user_id TEXT NOT NULL,
                date TEXT NOT NULL,
                data TEXT NOT NULL,              -- JSON DailyMetrics
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, date)
            );

            -- Archive of what the jobs observed
            CREATE TABLE IF NOT EXISTS attendance_records (
                user_id TEXT NOT NULL,
                date TEXT NOT NULL,
                check_time TEXT NOT NULL,
                check_type TEXT NOT NULL,        -- OnDuty, OffDuty
                UNIQUE (user_id, check_time, check_type)
            );
            CREATE TABLE IF NOT EXISTS busy_intervals (
                user_id TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                UNIQUE (user_id, start_time, end_time)
            );

            -- Collaborator feeds, filled by external sync
            CREATE TABLE IF NOT EXISTS punch_feed (
                user_id TEXT NOT NULL,
                date TEXT NOT NULL,
                check_time TEXT NOT NULL,
                check_type TEXT NOT NULL,
                UNIQUE (user_id, check_time, check_type)
            );
            CREATE TABLE IF NOT EXISTS freebusy_feed (
                user_id TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                UNIQUE (user_id, start_time, end_time)
            );
            CREATE TABLE IF NOT EXISTS weather_reports (
                city TEXT NOT NULL,
                condition TEXT NOT NULL,
                temperature REAL,
                humidity REAL,
                observed_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS step_records (
                user_id TEXT NOT NULL,
                date TEXT NOT NULL,
                steps INTEGER NOT NULL,
                PRIMARY KEY (user_id, date)
            );
            CREATE TABLE IF NOT EXISTS user_profiles (
                user_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                extension TEXT NOT NULL DEFAULT 'null',
                preferences TEXT NOT NULL DEFAULT '{}'
            );
         ",
            )
            .map_err(db_err("Migration"))
    }

    // ─── Writers ──────────────────────────────────────────────

    /// Store an event. Duplicate ids are ignored.
    pub fn insert_event(&self, event: &Event) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT OR IGNORE INTO events
                 (id, user_id, timestamp, local_date, event_type, source, data, processed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    event.id,
                    event.user_id,
                    ts(event.timestamp),
                    local_date(event.timestamp, self.offset).to_string(),
                    event.event_type.as_str(),
                    event.source,
                    event.data.to_string(),
                    event.processed as i32,
                ],
            )
            .map_err(db_err("Insert event"))?;
        Ok(())
    }

    pub fn upsert_rule(&self, rule: &RawRule) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT OR REPLACE INTO rules
                 (id, name, condition, slot_template, is_active, priority, cooldown_minutes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    rule.id,
                    rule.name,
                    rule.condition.to_string(),
                    rule.slot_template.to_string(),
                    rule.is_active as i32,
                    rule.priority,
                    rule.cooldown_minutes,
                ],
            )
            .map_err(db_err("Save rule"))?;
        Ok(())
    }

    pub fn upsert_profile(&self, profile: &UserProfile) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT OR REPLACE INTO user_profiles (user_id, name, title, extension, preferences)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    profile.user_id,
                    profile.name,
                    profile.title,
                    profile.extension.to_string(),
                    serde_json::to_string(&profile.preferences)?,
                ],
            )
            .map_err(db_err("Save profile"))?;
        Ok(())
    }

    pub fn add_punch(&self, record: &AttendanceRecord) -> Result<()> {
        let conn = self.lock()?;
        insert_punch(&conn, "punch_feed", record)
    }

    pub fn add_busy(&self, interval: &BusyInterval) -> Result<()> {
        let conn = self.lock()?;
        insert_busy(&conn, "freebusy_feed", interval)
    }

    pub fn record_weather(&self, report: &WeatherReport, observed_at: DateTime<Utc>) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO weather_reports (city, condition, temperature, humidity, observed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    report.city,
                    report.condition,
                    report.temperature,
                    report.humidity,
                    ts(observed_at),
                ],
            )
            .map_err(db_err("Save weather"))?;
        Ok(())
    }

    pub fn record_steps(&self, record: &StepRecord) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT OR REPLACE INTO step_records (user_id, date, steps) VALUES (?1, ?2, ?3)",
                params![record.user_id, record.date.to_string(), record.steps as i64],
            )
            .map_err(db_err("Save steps"))?;
        Ok(())
    }

    // ─── Readers ──────────────────────────────────────────────

    fn query_events(&self, user_id: &str, date: NaiveDate, only_pending: bool) -> Result<Vec<Event>> {
        let sql = if only_pending {
            "SELECT id, user_id, timestamp, event_type, source, data, processed FROM events
             WHERE user_id = ?1 AND local_date = ?2 AND processed = 0 ORDER BY timestamp"
        } else {
            "SELECT id, user_id, timestamp, event_type, source, data, processed FROM events
             WHERE user_id = ?1 AND local_date = ?2 ORDER BY timestamp"
        };
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql).map_err(db_err("Query events"))?;
        let rows = stmt
            .query_map(params![user_id, date.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, i32>(6)? != 0,
                ))
            })
            .map_err(db_err("Query events"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Read events"))?;

        let mut events = Vec::with_capacity(rows.len());
        for (id, user_id, timestamp, kind, source, data, processed) in rows {
            let Some(event_type) = EventType::parse(&kind) else {
                tracing::warn!("⚠️ Skipping event {id} with unknown type '{kind}'");
                continue;
            };
            events.push(Event {
                id,
                user_id,
                timestamp: parse_ts(&timestamp)?,
                event_type,
                source,
                data: serde_json::from_str(&data).unwrap_or(Value::Null),
                processed,
            });
        }
        Ok(events)
    }

    /// Every recommendation of a user, newest first.
    pub fn recommendations_for(&self, user_id: &str) -> Result<Vec<Recommendation>> {
        self.query_recommendations(
            "SELECT id, user_id, rule_id, content, slots, context, status, sent_at, created_at
             FROM recommendations WHERE user_id = ?1 ORDER BY created_at DESC",
            params![user_id],
        )
    }

    fn query_recommendations(
        &self,
        sql: &str,
        args: impl rusqlite::Params,
    ) -> Result<Vec<Recommendation>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql).map_err(db_err("Query recommendations"))?;
        let rows = stmt
            .query_map(args, |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, String>(8)?,
                ))
            })
            .map_err(db_err("Query recommendations"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Read recommendations"))?;

        rows.into_iter()
            .map(|(id, user_id, rule_id, content, slots, context, status, sent_at, created_at)| {
                Ok(Recommendation {
                    id,
                    user_id,
                    rule_id,
                    content,
                    slots: serde_json::from_str(&slots).unwrap_or_default(),
                    context: serde_json::from_str(&context).unwrap_or(Value::Null),
                    status: RecommendationStatus::parse(&status),
                    sent_at: sent_at.as_deref().map(parse_ts).transpose()?,
                    created_at: parse_ts(&created_at)?,
                })
            })
            .collect()
    }

    pub fn archived_attendance(&self, user_id: &str) -> Result<Vec<AttendanceRecord>> {
        let conn = self.lock()?;
        select_punches(&conn, "attendance_records", user_id, None)
    }

    pub fn archived_busy(&self, user_id: &str) -> Result<Vec<BusyInterval>> {
        let conn = self.lock()?;
        select_busy(&conn, "busy_intervals", user_id, None)
    }
}

fn insert_punch(conn: &Connection, table: &str, r: &AttendanceRecord) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT OR IGNORE INTO {table} (user_id, date, check_time, check_type)
             VALUES (?1, ?2, ?3, ?4)"
        ),
        params![r.user_id, r.date.to_string(), ts(r.check_time), r.check_type.as_str()],
    )
    .map_err(db_err("Save attendance"))?;
    Ok(())
}

fn insert_busy(conn: &Connection, table: &str, b: &BusyInterval) -> Result<()> {
    conn.execute(
        &format!("INSERT OR IGNORE INTO {table} (user_id, start_time, end_time) VALUES (?1, ?2, ?3)"),
        params![b.user_id, ts(b.start), ts(b.end)],
    )
    .map_err(db_err("Save busy interval"))?;
    Ok(())
}

fn select_punches(
    conn: &Connection,
    table: &str,
    user_id: &str,
    date: Option<NaiveDate>,
) -> Result<Vec<AttendanceRecord>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT user_id, date, check_time, check_type FROM {table}
             WHERE user_id = ?1 AND (?2 IS NULL OR date = ?2) ORDER BY check_time"
        ))
        .map_err(db_err("Query attendance"))?;
    let rows = stmt
        .query_map(params![user_id, date.map(|d| d.to_string())], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })
        .map_err(db_err("Query attendance"))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(db_err("Read attendance"))?;

    let mut out = Vec::with_capacity(rows.len());
    for (user_id, date, check_time, kind) in rows {
        let Some(check_type) = CheckType::parse(&kind) else {
            tracing::warn!("⚠️ Skipping punch with unknown check type '{kind}'");
            continue;
        };
        out.push(AttendanceRecord {
            user_id,
            date: parse_date(&date)?,
            check_time: parse_ts(&check_time)?,
            check_type,
        });
    }
    Ok(out)
}

fn select_busy(
    conn: &Connection,
    table: &str,
    user_id: &str,
    range: Option<(DateTime<Utc>, DateTime<Utc>)>,
) -> Result<Vec<BusyInterval>> {
    let (start, end) = match range {
        Some((s, e)) => (Some(ts(s)), Some(ts(e))),
        None => (None, None),
    };
    let mut stmt = conn
        .prepare(&format!(
            "SELECT user_id, start_time, end_time FROM {table}
             WHERE user_id = ?1 AND (?3 IS NULL OR start_time < ?3) AND (?2 IS NULL OR end_time > ?2)
             ORDER BY start_time"
        ))
        .map_err(db_err("Query busy intervals"))?;
    let rows = stmt
        .query_map(params![user_id, start, end], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })
        .map_err(db_err("Query busy intervals"))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(db_err("Read busy intervals"))?;

    rows.into_iter()
        .map(|(user_id, s, e)| {
            Ok(BusyInterval {
                user_id,
                start: parse_ts(&s)?,
                end: parse_ts(&e)?,
            })
        })
        .collect()
}

// ─── Repository traits ─────────────────────────────────────────

#[async_trait]
impl EventSource for WellnudgeDb {
    async fn list_unprocessed(&self, user_id: &str, date: NaiveDate) -> Result<Vec<Event>> {
        self.query_events(user_id, date, true)
    }

    async fn list_for_day(&self, user_id: &str, date: NaiveDate) -> Result<Vec<Event>> {
        self.query_events(user_id, date, false)
    }

    async fn users_with_pending(&self, date: NaiveDate) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT DISTINCT user_id FROM events
                 WHERE local_date = ?1 AND processed = 0 ORDER BY user_id",
            )
            .map_err(db_err("Query pending users"))?;
        let users = stmt
            .query_map(params![date.to_string()], |row| row.get::<_, String>(0))
            .map_err(db_err("Query pending users"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Read pending users"))?;
        Ok(users)
    }

    async fn mark_processed(&self, event_ids: &[String]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err("Begin"))?;
        {
            let mut stmt = tx
                .prepare("UPDATE events SET processed = 1 WHERE id = ?1")
                .map_err(db_err("Mark processed"))?;
            for id in event_ids {
                stmt.execute(params![id]).map_err(db_err("Mark processed"))?;
            }
        }
        tx.commit().map_err(db_err("Commit"))
    }
}

#[async_trait]
impl RuleRepository for WellnudgeDb {
    /// Active rules, highest priority first. Invalid rules are skipped.
    async fn list_active(&self) -> Result<Vec<Rule>> {
        let raws = {
            let conn = self.lock()?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, name, condition, slot_template, is_active, priority, cooldown_minutes
                     FROM rules WHERE is_active = 1 ORDER BY priority DESC, id",
                )
                .map_err(db_err("Query rules"))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i32>(4)? != 0,
                        row.get::<_, i32>(5)?,
                        row.get::<_, u32>(6)?,
                    ))
                })
                .map_err(db_err("Query rules"))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_err("Read rules"))?;
            rows
        };

        let mut rules = Vec::with_capacity(raws.len());
        for (id, name, condition, template, is_active, priority, cooldown_minutes) in raws {
            let raw = RawRule {
                id,
                name,
                condition: serde_json::from_str(&condition).unwrap_or(Value::Null),
                slot_template: serde_json::from_str(&template).unwrap_or(Value::Null),
                is_active,
                priority,
                cooldown_minutes,
            };
            match Rule::from_raw(raw) {
                Ok(rule) => rules.push(rule),
                Err(e) => tracing::warn!("⚠️ Skipping rule: {e}"),
            }
        }
        Ok(rules)
    }
}

#[async_trait]
impl RecommendationRepository for WellnudgeDb {
    async fn create(&self, data: NewRecommendation) -> Result<Recommendation> {
        let rec = Recommendation {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: data.user_id,
            rule_id: data.rule_id,
            content: data.content,
            slots: data.slots,
            context: data.context,
            status: RecommendationStatus::Created,
            sent_at: None,
            created_at: Utc::now(),
        };
        self.lock()?
            .execute(
                "INSERT INTO recommendations
                 (id, user_id, rule_id, content, slots, context, status, sent_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8)",
                params![
                    rec.id,
                    rec.user_id,
                    rec.rule_id,
                    rec.content,
                    serde_json::to_string(&rec.slots)?,
                    rec.context.to_string(),
                    rec.status.as_str(),
                    ts(rec.created_at),
                ],
            )
            .map_err(db_err("Save recommendation"))?;
        Ok(rec)
    }

    async fn recent_by_rule(
        &self,
        user_id: &str,
        rule_id: &str,
        window: Duration,
    ) -> Result<Vec<Recommendation>> {
        let since = ts(Utc::now() - window);
        self.query_recommendations(
            "SELECT id, user_id, rule_id, content, slots, context, status, sent_at, created_at
             FROM recommendations
             WHERE user_id = ?1 AND rule_id = ?2 AND created_at > ?3
             ORDER BY created_at DESC",
            params![user_id, rule_id, since],
        )
    }

    async fn update_status(
        &self,
        id: &str,
        status: RecommendationStatus,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        // sent and failed are terminal
        let changed = self
            .lock()?
            .execute(
                "UPDATE recommendations SET status = ?2, sent_at = ?3 WHERE id = ?1 AND status = ?4",
                params![
                    id,
                    status.as_str(),
                    sent_at.map(ts),
                    RecommendationStatus::Created.as_str()
                ],
            )
            .map_err(db_err("Update recommendation"))?;
        if changed == 0 {
            return Err(WellnudgeError::Database(format!(
                "recommendation {id} not found or already final"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MetricsRepository for WellnudgeDb {
    async fn upsert(&self, metrics: &DailyMetrics) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO daily_metrics (user_id, date, data, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, date) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
                params![
                    metrics.user_id,
                    metrics.date.to_string(),
                    serde_json::to_string(metrics)?,
                    ts(Utc::now()),
                ],
            )
            .map_err(db_err("Save metrics"))?;
        Ok(())
    }

    async fn get(&self, user_id: &str, date: NaiveDate) -> Result<Option<DailyMetrics>> {
        let data: Option<String> = self
            .lock()?
            .query_row(
                "SELECT data FROM daily_metrics WHERE user_id = ?1 AND date = ?2",
                params![user_id, date.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err("Query metrics"))?;
        data.map(|d| serde_json::from_str(&d).map_err(WellnudgeError::from))
            .transpose()
    }
}

#[async_trait]
impl ActivityArchive for WellnudgeDb {
    async fn save_attendance(&self, records: &[AttendanceRecord]) -> Result<()> {
        let conn = self.lock()?;
        for r in records {
            insert_punch(&conn, "attendance_records", r)?;
        }
        Ok(())
    }

    async fn save_busy_intervals(&self, intervals: &[BusyInterval]) -> Result<()> {
        let conn = self.lock()?;
        for b in intervals {
            insert_busy(&conn, "busy_intervals", b)?;
        }
        Ok(())
    }
}

// ─── Lookup traits (collaborator feeds) ────────────────────────

#[async_trait]
impl AttendanceLookup for WellnudgeDb {
    async fn records(&self, user_id: &str, date: NaiveDate) -> Result<Vec<AttendanceRecord>> {
        let conn = self.lock()?;
        select_punches(&conn, "punch_feed", user_id, Some(date))
    }
}

#[async_trait]
impl FreeBusyLookup for WellnudgeDb {
    async fn busy_between(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>> {
        let conn = self.lock()?;
        select_busy(&conn, "freebusy_feed", user_id, Some((start, end)))
    }
}

#[async_trait]
impl WeatherLookup for WellnudgeDb {
    async fn current(&self, city: &str) -> Result<Option<WeatherReport>> {
        self.lock()?
            .query_row(
                "SELECT city, condition, temperature, humidity FROM weather_reports
                 WHERE city = ?1 ORDER BY observed_at DESC LIMIT 1",
                params![city],
                |row| {
                    Ok(WeatherReport {
                        city: row.get(0)?,
                        condition: row.get(1)?,
                        temperature: row.get(2)?,
                        humidity: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(db_err("Query weather"))
    }
}

#[async_trait]
impl StepsLookup for WellnudgeDb {
    async fn steps(&self, user_id: &str, date: NaiveDate) -> Result<Option<StepRecord>> {
        self.lock()?
            .query_row(
                "SELECT steps FROM step_records WHERE user_id = ?1 AND date = ?2",
                params![user_id, date.to_string()],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .map_err(db_err("Query steps"))
            .map(|steps| {
                steps.map(|s| StepRecord {
                    user_id: user_id.to_string(),
                    date,
                    steps: s.max(0) as u64,
                })
            })
    }
}

#[async_trait]
impl ProfileLookup for WellnudgeDb {
    async fn profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let row = self
            .lock()?
            .query_row(
                "SELECT user_id, name, title, extension, preferences FROM user_profiles WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(db_err("Query profile"))?;
        Ok(row.map(|(user_id, name, title, extension, preferences)| UserProfile {
            user_id,
            name,
            title,
            extension: serde_json::from_str(&extension).unwrap_or(Value::Null),
            preferences: serde_json::from_str(&preferences).unwrap_or_default(),
        }))
    }
}
