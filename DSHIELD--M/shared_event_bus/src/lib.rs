#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Milestone events emitted by the planner crates, with an in-memory bus for tests
//! and embedding and a JSON-lines file sink for runs.

use std::{
    collections::VecDeque,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::broadcast};
use uuid::Uuid;

/// One milestone, serialized as a single JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique id of the event.
    pub id: Uuid,
    /// Telemetry module that emitted it (`planit`, `obs_planner`).
    pub source: String,
    /// Dotted milestone name, e.g. `planit.solve.finished`.
    pub event_type: String,
    /// Emission time.
    pub timestamp: DateTime<Utc>,
    /// Milestone payload.
    #[serde(default)]
    pub payload: Value,
}

impl EventRecord {
    /// Stamps a new event with a fresh id and the current time.
    #[must_use]
    pub fn new(source: impl Into<String>, event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Whether the event name lies under `prefix` (`planit.` matches every engine event).
    #[must_use]
    pub fn is_under(&self, prefix: &str) -> bool {
        self.event_type.starts_with(prefix)
    }
}

/// Sink for milestones.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Delivers one event.
    async fn publish(&self, event: EventRecord) -> Result<()>;
}

/// Source of live milestones.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Receiver for every event published after the call.
    async fn subscribe(&self) -> Result<broadcast::Receiver<EventRecord>>;
}

/// Broadcast bus that also keeps the most recent events for inspection.
#[derive(Debug, Clone)]
pub struct MemoryEventBus {
    live: broadcast::Sender<EventRecord>,
    recent: Arc<Mutex<VecDeque<EventRecord>>>,
    keep: usize,
}

impl MemoryEventBus {
    /// Keeps at most `keep` events (at least one).
    #[must_use]
    pub fn new(keep: usize) -> Self {
        let keep = keep.max(1);
        Self {
            live: broadcast::channel(keep).0,
            recent: Arc::new(Mutex::new(VecDeque::with_capacity(keep))),
            keep,
        }
    }

    /// Retained events, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<EventRecord> {
        self.recent.lock().iter().cloned().collect()
    }

    /// Retained events named exactly `event_type`, oldest first.
    #[must_use]
    pub fn events_of(&self, event_type: &str) -> Vec<EventRecord> {
        self.recent
            .lock()
            .iter()
            .filter(|event| event.event_type == event_type)
            .cloned()
            .collect()
    }

    fn retain(&self, event: EventRecord) {
        let mut recent = self.recent.lock();
        while recent.len() >= self.keep {
            recent.pop_front();
        }
        recent.push_back(event);
    }
}

#[async_trait]
impl EventPublisher for MemoryEventBus {
    async fn publish(&self, event: EventRecord) -> Result<()> {
        self.retain(event.clone());
        // Sending only fails without receivers.
        let _ = self.live.send(event);
        Ok(())
    }
}

#[async_trait]
impl EventSubscriber for MemoryEventBus {
    async fn subscribe(&self) -> Result<broadcast::Receiver<EventRecord>> {
        Ok(self.live.subscribe())
    }
}

/// Appends events to a JSON-lines file.
#[derive(Debug, Clone)]
pub struct FileEventPublisher {
    path: PathBuf,
}

impl FileEventPublisher {
    /// Targets `path`, creating its parent directory.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating event log directory {}", parent.display()))?;
        }
        Ok(Self { path })
    }

    /// Event log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EventPublisher for FileEventPublisher {
    async fn publish(&self, event: EventRecord) -> Result<()> {
        let mut line = serde_json::to_vec(&event)?;
        line.push(b'\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("opening event log {}", self.path.display()))?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Reads back an event log written by [`FileEventPublisher`]; blank lines are skipped.
pub fn read_event_log(path: impl AsRef<Path>) -> Result<Vec<EventRecord>> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading event log {}", path.display()))?;
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("{}:{}: malformed event", path.display(), index + 1))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;
    use tokio::runtime::Runtime;

    use super::*;

    fn finished() -> EventRecord {
        EventRecord::new("planit", "planit.solve.finished", json!({"expansions": 2}))
    }

    #[test]
    fn subscribers_see_published_events() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let bus = MemoryEventBus::new(16);
            let mut rx = bus.subscribe().await.unwrap();
            bus.publish(finished()).await.unwrap();
            let event = rx.recv().await.unwrap();
            assert_eq!(event.event_type, "planit.solve.finished");
            assert!(event.is_under("planit."));
            assert!(!event.is_under("obs_planner."));
        });
    }

    #[test]
    fn bus_keeps_only_recent_events() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let bus = MemoryEventBus::new(2);
            for n in 0..3 {
                let anomaly =
                    EventRecord::new("obs_planner", "obs_planner.reward.anomaly", json!({ "n": n }));
                bus.publish(anomaly).await.unwrap();
            }
            bus.publish(finished()).await.unwrap();
            let kept = bus.snapshot();
            assert_eq!(kept.len(), 2);
            assert_eq!(kept[0].payload["n"], 2);
            assert_eq!(bus.events_of("planit.solve.finished").len(), 1);
        });
    }

    #[test]
    fn event_log_round_trips_through_file() {
        let rt = Runtime::new().unwrap();
        let dir = tempdir().unwrap();
        let publisher = FileEventPublisher::new(dir.path().join("logs/events.log")).unwrap();
        let first = finished();
        rt.block_on(async {
            publisher.publish(first.clone()).await.unwrap();
            publisher.publish(finished()).await.unwrap();
        });
        let events = read_event_log(publisher.path()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], first);
    }

    #[test]
    fn malformed_event_line_names_its_position() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.log");
        fs::write(&path, "\nnot json\n").unwrap();
        let err = read_event_log(&path).unwrap_err();
        assert!(format!("{err:#}").contains(":2: malformed event"));
    }
}
