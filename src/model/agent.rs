use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AgentId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Pending,
    Active,
    Inactive,
    Error,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Gpu,
    Cpu,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDevice {
    pub agent_device_id: i64,
    pub index: i32,
    pub name: String,
    pub device_type: DeviceType,
    pub enabled: bool,
}

/// One day's availability window in the per-agent weekly schedule (§4.10).
/// `start`/`end` are UTC times; `end < start` denotes an overnight window
/// that crosses midnight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DaySchedule {
    pub day_of_week: u8, // 0 = Sunday .. 6 = Saturday
    pub start: Option<NaiveTime>,
    pub end: Option<NaiveTime>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub status: AgentStatus,
    pub owner_id: Option<UserId>,
    pub is_enabled: bool,
    pub extra_parameters: String,
    pub consecutive_failures: u32,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub api_key_hash: String,
    pub scheduling_enabled: bool,
    pub devices: Vec<AgentDevice>,
    pub schedule: Vec<DaySchedule>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn heartbeat_is_fresh(&self, now: DateTime<Utc>, heartbeat_interval_secs: i64) -> bool {
        match self.last_heartbeat {
            Some(hb) => (now - hb).num_seconds() < 2 * heartbeat_interval_secs,
            None => false,
        }
    }
}
