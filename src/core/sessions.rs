use crate::core::models::{ActiveSession, ActiveSessions};
use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const REGISTRY_FILE: &str = "sessions.json";
const UNKNOWN_MODEL: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub label: String,
    pub session_id: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct RawRegistryEntry {
    #[serde(rename = "sessionId", default)]
    session_id: Option<serde_json::Value>,
    #[serde(rename = "updatedAt", default)]
    updated_at: Option<serde_json::Value>,
}

/// `updatedAt` shows up both as epoch milliseconds and as an RFC 3339 string.
fn parse_updated_at(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::Number(n) => {
            let millis = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            Utc.timestamp_millis_opt(millis).single()
        }
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

/// Snapshot reader for the runtime's `sessions.json` registry.
pub struct SessionRegistry {
    path: PathBuf,
}

impl SessionRegistry {
    pub fn in_dir(sessions_dir: &Path) -> Self {
        Self {
            path: sessions_dir.join(REGISTRY_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn parse(content: &str) -> Result<Vec<SessionRecord>> {
        let raw: BTreeMap<String, serde_json::Value> =
            serde_json::from_str(content).context("Session registry is not a JSON object")?;

        let mut records = Vec::new();
        for (label, value) in raw {
            let Ok(entry) = serde_json::from_value::<RawRegistryEntry>(value) else {
                tracing::debug!(%label, "Skipping non-object registry entry");
                continue;
            };

            let Some(session_id) = entry
                .session_id
                .as_ref()
                .and_then(|v| v.as_str())
                .filter(|id| !id.is_empty())
            else {
                continue;
            };

            let Some(updated_at) = entry.updated_at.as_ref().and_then(parse_updated_at) else {
                tracing::debug!(%label, "Skipping registry entry without a valid updatedAt");
                continue;
            };

            records.push(SessionRecord {
                label,
                session_id: session_id.to_string(),
                updated_at,
            });
        }

        records.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        Ok(records)
    }

    /// Missing or unreadable registries read as empty.
    pub fn load(&self) -> Vec<SessionRecord> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(path = ?self.path, error = %e, "Failed to read session registry");
                return Vec::new();
            }
        };

        match Self::parse(&content) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(path = ?self.path, error = %e, "Failed to parse session registry");
                Vec::new()
            }
        }
    }

    pub fn active_sessions(&self, now: DateTime<Utc>, max_concurrent: usize) -> ActiveSessions {
        summarize(&self.load(), now, max_concurrent)
    }
}

pub fn summarize(records: &[SessionRecord], now: DateTime<Utc>, max_concurrent: usize) -> ActiveSessions {
    let sessions: Vec<ActiveSession> = records
        .iter()
        .map(|record| ActiveSession {
            id: record.session_id.clone(),
            model: UNKNOWN_MODEL.to_string(),
            start_time: record.updated_at,
            last_activity: record.updated_at,
            is_active: true,
            duration: (now - record.updated_at).num_seconds(),
        })
        .collect();

    let count = sessions.len();
    let percentage_utilized = if max_concurrent > 0 {
        count as f64 / max_concurrent as f64 * 100.0
    } else {
        0.0
    };

    ActiveSessions {
        count,
        sessions,
        max_concurrent,
        percentage_utilized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGISTRY: &str = r#"{
        "agent:main:main": {"sessionId": "aaa", "updatedAt": 1768750200000},
        "agent:main:cron": {"sessionId": "bbb", "updatedAt": "2026-01-18T15:40:00Z"},
        "agent:main:stale": {"updatedAt": 1768750200000},
        "agent:main:empty": {"sessionId": "", "updatedAt": 1768750200000},
        "agent:main:nodate": {"sessionId": "ccc"},
        "agent:main:garbage": 17
    }"#;

    #[test]
    fn test_parse_registry() {
        let records = SessionRegistry::parse(REGISTRY).unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.session_id.as_str()).collect();
        assert_eq!(ids, vec!["bbb", "aaa"]);
        assert_eq!(
            records[1].updated_at,
            Utc.with_ymd_and_hms(2026, 1, 18, 15, 30, 0).unwrap()
        );
        assert_eq!(records[1].label, "agent:main:main");
    }

    #[test]
    fn test_parse_rejects_non_object() {
        assert!(SessionRegistry::parse("[1, 2]").is_err());
        assert!(SessionRegistry::parse("{").is_err());
    }

    #[test]
    fn test_summarize() {
        let records = SessionRegistry::parse(REGISTRY).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 18, 15, 45, 0).unwrap();
        let summary = summarize(&records, now, 4);

        assert_eq!(summary.count, 2);
        assert_eq!(summary.max_concurrent, 4);
        assert_eq!(summary.percentage_utilized, 50.0);
        assert_eq!(summary.sessions[0].duration, 300);
        assert_eq!(summary.sessions[1].duration, 900);
        assert!(summary.sessions.iter().all(|s| s.is_active && s.model == "unknown"));
    }

    #[test]
    fn test_missing_registry_reads_empty() {
        let temp = tempfile::tempdir().expect("temp dir");
        let registry = SessionRegistry::in_dir(temp.path());
        assert!(registry.load().is_empty());

        let summary = registry.active_sessions(Utc::now(), 4);
        assert_eq!(summary.count, 0);
        assert_eq!(summary.percentage_utilized, 0.0);
    }

    #[test]
    fn test_load_from_dir() {
        let temp = tempfile::tempdir().expect("temp dir");
        std::fs::write(temp.path().join(REGISTRY_FILE), REGISTRY).unwrap();

        let registry = SessionRegistry::in_dir(temp.path());
        assert_eq!(registry.path(), temp.path().join("sessions.json"));
        assert_eq!(registry.load().len(), 2);
    }
}
