use crate::db;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_LOG_FILTER: &str = "info";
pub const DEFAULT_DUE_DAY: u32 = 15;

/// Process-level settings read from the environment at start-up.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub log_filter: String,
    pub log_json: bool,
    pub workspace: Option<PathBuf>,
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        Self {
            log_filter: env::var("CAMPUSD_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string()),
            log_json: env_bool("CAMPUSD_LOG_JSON", false),
            workspace: env::var("CAMPUSD_WORKSPACE")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        }
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| parse_bool(&v))
        .unwrap_or(default)
}

fn parse_bool(v: &str) -> Option<bool> {
    match v {
        "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
        _ => None,
    }
}

/// Per-school calendar and billing rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolPolicy {
    /// Days of week (Sunday = 0) that are always non-teaching.
    pub weekly_off_days: Vec<u32>,
    pub due_day_of_month: u32,
    /// When false, holiday auto-marking leaves already-marked students alone.
    pub holiday_overwrites_marked: bool,
}

impl Default for SchoolPolicy {
    fn default() -> Self {
        Self {
            weekly_off_days: vec![0],
            due_day_of_month: DEFAULT_DUE_DAY,
            holiday_overwrites_marked: false,
        }
    }
}

impl SchoolPolicy {
    pub fn is_weekly_off(&self, dow: u32) -> bool {
        self.weekly_off_days.contains(&dow)
    }

    /// Applies a camelCase patch field by field, rejecting unknown or out-of-range values.
    pub fn merge_patch(&mut self, patch: &Map<String, Value>) -> Result<(), String> {
        for (k, v) in patch {
            match k.as_str() {
                "weeklyOffDays" => {
                    let Some(arr) = v.as_array() else {
                        return Err("weeklyOffDays must be an array".to_string());
                    };
                    let mut days = Vec::with_capacity(arr.len());
                    for d in arr {
                        match d.as_u64() {
                            Some(n) if n <= 6 => days.push(n as u32),
                            _ => return Err("weeklyOffDays entries must be 0..6".to_string()),
                        }
                    }
                    days.sort_unstable();
                    days.dedup();
                    self.weekly_off_days = days;
                }
                "dueDayOfMonth" => match v.as_u64() {
                    Some(n) if (1..=31).contains(&n) => self.due_day_of_month = n as u32,
                    _ => return Err("dueDayOfMonth must be 1..31".to_string()),
                },
                "holidayOverwritesMarked" => {
                    let Some(b) = v.as_bool() else {
                        return Err("holidayOverwritesMarked must be a boolean".to_string());
                    };
                    self.holiday_overwrites_marked = b;
                }
                _ => return Err(format!("unknown policy field: {}", k)),
            }
        }
        Ok(())
    }
}

fn policy_key(school_id: &str) -> String {
    format!("policy.{}", school_id)
}

pub fn load_school_policy(conn: &Connection, school_id: &str) -> anyhow::Result<SchoolPolicy> {
    let mut policy = SchoolPolicy::default();
    if let Some(saved) = db::settings_get_json(conn, &policy_key(school_id))? {
        if let Some(obj) = saved.as_object() {
            // Malformed historical values fall back to defaults field by field.
            for (key, value) in obj {
                let mut one = Map::new();
                one.insert(key.clone(), value.clone());
                if let Err(msg) = policy.merge_patch(&one) {
                    tracing::warn!(school_id, field = %key, error = %msg, "ignoring invalid stored policy field");
                }
            }
        }
    }
    Ok(policy)
}

pub fn save_school_policy(conn: &Connection, school_id: &str, policy: &SchoolPolicy) -> anyhow::Result<()> {
    db::settings_set_json(conn, &policy_key(school_id), &serde_json::to_value(policy)?)
}
