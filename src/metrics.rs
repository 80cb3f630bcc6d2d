//! Training metrics: per-step scalars and per-episode summaries.
//!
//! Sinks never fail the training loop; write errors are logged and dropped.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{Connection, params};

use crate::episode::EpisodeSummary;
use crate::error::Result;

pub trait MetricsSink {
    /// One named number at a training step.
    fn scalar(&mut self, step: u64, name: &str, value: f32);

    /// One finished episode.
    fn episode(&mut self, summary: &EpisodeSummary);
}

/// `SCALAR step=<n> name=<k> value=<v>` lines, easy to grep.
pub fn scalar_line(step: u64, name: &str, value: f32) -> String {
    format!("SCALAR step={step} name={name} value={value:.6}")
}

/// Writes through the `log` facade.
#[derive(Debug, Default)]
pub struct LogSink;

impl MetricsSink for LogSink {
    fn scalar(&mut self, step: u64, name: &str, value: f32) {
        log::debug!("{}", scalar_line(step, name, value));
    }

    fn episode(&mut self, s: &EpisodeSummary) {
        log::info!(
            "episode {} reason={} total={:.3} steps={} epsilon={:.3} plateau_reset={} | {}",
            s.index,
            s.reason,
            s.total,
            s.steps,
            s.epsilon,
            s.plateau_reset,
            s.breakdown_line()
        );
    }
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn scalar(&mut self, _step: u64, _name: &str, _value: f32) {}
    fn episode(&mut self, _summary: &EpisodeSummary) {}
}

/// Forwards every record to each inner sink.
#[derive(Default)]
pub struct FanOut {
    sinks: Vec<Box<dyn MetricsSink>>,
}

impl FanOut {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Box<dyn MetricsSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl MetricsSink for FanOut {
    fn scalar(&mut self, step: u64, name: &str, value: f32) {
        for s in &mut self.sinks {
            s.scalar(step, name, value);
        }
    }

    fn episode(&mut self, summary: &EpisodeSummary) {
        for s in &mut self.sinks {
            s.episode(summary);
        }
    }
}

#[derive(Debug, Default)]
pub struct Recorded {
    pub scalars: Vec<(u64, String, f32)>,
    pub episodes: Vec<EpisodeSummary>,
}

/// Keeps everything in memory. Clones share the same storage, so a caller
/// can hand one clone to the scheduler and read through the other.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    inner: Arc<Mutex<Recorded>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn episodes(&self) -> Vec<EpisodeSummary> {
        self.inner.lock().map(|r| r.episodes.clone()).unwrap_or_default()
    }

    /// Values recorded under `name`, in order.
    pub fn scalars(&self, name: &str) -> Vec<(u64, f32)> {
        self.inner
            .lock()
            .map(|r| {
                r.scalars
                    .iter()
                    .filter(|(_, n, _)| n == name)
                    .map(|(s, _, v)| (*s, *v))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl MetricsSink for MemorySink {
    fn scalar(&mut self, step: u64, name: &str, value: f32) {
        if let Ok(mut r) = self.inner.lock() {
            r.scalars.push((step, name.to_string(), value));
        }
    }

    fn episode(&mut self, summary: &EpisodeSummary) {
        if let Ok(mut r) = self.inner.lock() {
            r.episodes.push(summary.clone());
        }
    }
}

/// SQLite run log: an `episodes` table and a `scalars` table.
pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let sink = Self { conn: Connection::open(path)? };
        sink.init_schema()?;
        Ok(sink)
    }

    pub fn memory() -> Result<Self> {
        let sink = Self { conn: Connection::open_in_memory()? };
        sink.init_schema()?;
        Ok(sink)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS episodes (
                idx INTEGER PRIMARY KEY,
                recorded_at TEXT NOT NULL,
                total REAL NOT NULL,
                steps INTEGER NOT NULL,
                epsilon REAL NOT NULL,
                reason TEXT NOT NULL,
                plateau_reset INTEGER NOT NULL,
                breakdown TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS scalars (
                id INTEGER PRIMARY KEY,
                step INTEGER NOT NULL,
                name TEXT NOT NULL,
                value REAL NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_scalars_name ON scalars(name, step);
            "#,
        )?;
        Ok(())
    }

    fn insert_episode(&self, s: &EpisodeSummary) -> Result<()> {
        let breakdown = serde_json::to_string(&s.breakdown)?;
        self.conn.execute(
            r#"INSERT OR REPLACE INTO episodes
               (idx, recorded_at, total, steps, epsilon, reason, plateau_reset, breakdown)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                s.index as i64,
                Utc::now().to_rfc3339(),
                s.total,
                s.steps as i64,
                s.epsilon as f64,
                s.reason.as_str(),
                s.plateau_reset,
                breakdown,
            ],
        )?;
        Ok(())
    }

    pub fn episode_count(&self) -> Result<u64> {
        let n: i64 = self.conn.query_row("SELECT COUNT(*) FROM episodes", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// Most recent value logged under `name`.
    pub fn last_scalar(&self, name: &str) -> Result<Option<f64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM scalars WHERE name = ?1 ORDER BY step DESC, id DESC LIMIT 1")?;
        let mut rows = stmt.query(params![name])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }
}

impl MetricsSink for SqliteSink {
    fn scalar(&mut self, step: u64, name: &str, value: f32) {
        let res = self.conn.execute(
            "INSERT INTO scalars (step, name, value) VALUES (?1, ?2, ?3)",
            params![step as i64, name, value as f64],
        );
        if let Err(e) = res {
            log::warn!("metrics: dropping scalar {name}: {e}");
        }
    }

    fn episode(&mut self, summary: &EpisodeSummary) {
        if let Err(e) = self.insert_episode(summary) {
            log::warn!("metrics: dropping episode {}: {e}", summary.index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::episode::{EndReason, EpisodeStats};

    fn summary(index: u64) -> EpisodeSummary {
        EpisodeSummary::new(index, &EpisodeStats::default(), 0.3, EndReason::TimeUp)
    }

    #[test]
    fn scalar_line_format() {
        assert_eq!(scalar_line(12, "loss", 0.5), "SCALAR step=12 name=loss value=0.500000");
    }

    #[test]
    fn memory_sink_clones_share_storage() {
        let reader = MemorySink::new();
        let mut writer = reader.clone();
        writer.scalar(1, "loss", 2.0);
        writer.scalar(2, "epsilon", 0.9);
        writer.scalar(3, "loss", 1.0);
        writer.episode(&summary(0));
        assert_eq!(reader.scalars("loss"), vec![(1, 2.0), (3, 1.0)]);
        assert_eq!(reader.episodes().len(), 1);
    }

    #[test]
    fn fan_out_reaches_every_sink() {
        let a = MemorySink::new();
        let b = MemorySink::new();
        let mut fan = FanOut::new().with(Box::new(a.clone())).with(Box::new(NoopSink)).with(Box::new(b.clone()));
        fan.scalar(4, "loss", 0.5);
        fan.episode(&summary(1));
        assert_eq!(a.scalars("loss"), b.scalars("loss"));
        assert_eq!(b.episodes().len(), 1);
    }

    #[test]
    fn sqlite_sink_in_memory() {
        let mut sink = SqliteSink::memory().unwrap();
        sink.episode(&summary(0));
        sink.episode(&summary(1));
        sink.scalar(5, "loss", 0.25);
        sink.scalar(9, "loss", 0.125);
        assert_eq!(sink.episode_count().unwrap(), 2);
        assert_eq!(sink.last_scalar("loss").unwrap(), Some(0.125));
        assert_eq!(sink.last_scalar("grad_norm").unwrap(), None);
    }

    #[test]
    fn sqlite_sink_persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.sqlite");
        {
            let mut sink = SqliteSink::open(&path).unwrap();
            sink.episode(&summary(3));
        }
        let sink = SqliteSink::open(&path).unwrap();
        assert_eq!(sink.episode_count().unwrap(), 1);
    }
}
