//! Wire messages exchanged over the agent command plane. Every frame is a
//! JSON object `{type, timestamp, payload}`; `CommandPlaneMessage` models
//! that envelope with serde's internally-tagged representation so
//! (de)serialization matches the wire shape exactly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum CommandPlaneMessage {
    // Inbound (agent -> server)
    Heartbeat(HeartbeatPayload),
    HardwareInfo(HardwareInfoPayload),
    DeviceUpdate(Vec<DeviceUpdateEntry>),
    JobProgress(JobProgressPayload),
    BenchmarkResult(BenchmarkResultPayload),
    TaskStatus(TaskStatusPayload),
    HashcatOutput(HashcatOutputPayload),

    // Outbound (server -> agent)
    TaskAssignment(TaskAssignmentPayload),
    BenchmarkRequest(BenchmarkRequestPayload),
    JobStop(JobStopPayload),
    ConfigUpdate(ConfigUpdatePayload),
    FileSyncRequest(FileSyncRequestPayload),
    ForceCleanup(ForceCleanupPayload),

    // Keepalive, both directions.
    Ping(PingPongPayload),
    Pong(PingPongPayload),
}

impl CommandPlaneMessage {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Heartbeat(_) => "heartbeat",
            Self::HardwareInfo(_) => "hardware_info",
            Self::DeviceUpdate(_) => "device_update",
            Self::JobProgress(_) => "job_progress",
            Self::BenchmarkResult(_) => "benchmark_result",
            Self::TaskStatus(_) => "task_status",
            Self::HashcatOutput(_) => "hashcat_output",
            Self::TaskAssignment(_) => "task_assignment",
            Self::BenchmarkRequest(_) => "benchmark_request",
            Self::JobStop(_) => "job_stop",
            Self::ConfigUpdate(_) => "config_update",
            Self::FileSyncRequest(_) => "file_sync_request",
            Self::ForceCleanup(_) => "force_cleanup",
            Self::Ping(_) => "ping",
            Self::Pong(_) => "pong",
        }
    }
}

/// Envelope as it appears on the wire: `type`/`payload` plus a timestamp
/// that isn't part of the Rust-side enum discriminant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub message: CommandPlaneMessage,
}

impl Envelope {
    pub fn new(message: CommandPlaneMessage) -> Self {
        Self {
            timestamp: Utc::now(),
            message,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeartbeatPayload {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareInfoPayload {
    pub cpus: Vec<serde_json::Value>,
    pub gpus: Vec<serde_json::Value>,
    pub network_interfaces: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceUpdateEntry {
    pub device_id: Uuid,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgressPayload {
    pub task_id: Uuid,
    pub keyspace_processed: i64,
    pub progress_percent: f64,
    pub speed: f64,
    pub crack_count: u32,
    pub new_cracks: Vec<CrackedHash>,
    pub checkpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrackedHash {
    pub hash_value: String,
    pub password: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResultPayload {
    pub request_id: Uuid,
    pub task_id: Option<Uuid>,
    pub total_speed: f64,
    pub device_speeds: Vec<f64>,
    pub success: bool,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportedTaskStatus {
    Accepted,
    Rejected,
    Started,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusPayload {
    pub task_id: Uuid,
    pub status: ReportedTaskStatus,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashcatOutputPayload {
    pub task_id: Uuid,
    pub line: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAssignmentPayload {
    pub task_id: Uuid,
    pub job_execution_id: Uuid,
    pub hashlist_id: Uuid,
    pub hashlist_path: String,
    pub attack_mode: i16,
    pub hash_type: i32,
    pub keyspace_start: i64,
    pub keyspace_end: i64,
    pub wordlist_paths: Vec<String>,
    pub rule_paths: Vec<String>,
    pub rule_chunk_path: Option<String>,
    pub mask: Option<String>,
    pub binary_path: String,
    pub chunk_duration: i64,
    pub report_interval: i64,
    pub output_format: String,
    pub extra_parameters: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkRequestPayload {
    #[serde(flatten)]
    pub assignment: TaskAssignmentPayload,
    pub request_id: Uuid,
    pub test_duration: i64,
    pub timeout_duration: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStopPayload {
    pub task_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigUpdatePayload {
    pub heartbeat_interval_secs: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncFileType {
    Binary,
    Wordlist,
    Rule,
    Hashlist,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSyncRequestPayload {
    pub file_types: Vec<SyncFileType>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForceCleanupPayload {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PingPongPayload {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_round_trips_with_type_discriminator() {
        let envelope = Envelope::new(CommandPlaneMessage::Heartbeat(HeartbeatPayload {}));
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["type"], "heartbeat");

        let parsed: Envelope = serde_json::from_value(json).unwrap();
        assert!(matches!(parsed.message, CommandPlaneMessage::Heartbeat(_)));
    }

    #[test]
    fn task_assignment_keeps_required_fields() {
        let task_id = Uuid::new_v4();
        let assignment = TaskAssignmentPayload {
            task_id,
            job_execution_id: Uuid::new_v4(),
            hashlist_id: Uuid::new_v4(),
            hashlist_path: "/data/hashlists/1.txt".into(),
            attack_mode: 0,
            hash_type: 0,
            keyspace_start: 0,
            keyspace_end: 1_000_000,
            wordlist_paths: vec!["/data/wordlists/rockyou.txt".into()],
            rule_paths: vec![],
            rule_chunk_path: None,
            mask: None,
            binary_path: "/opt/hashcat/hashcat".into(),
            chunk_duration: 600,
            report_interval: 5,
            output_format: "json".into(),
            extra_parameters: None,
        };
        let envelope = Envelope::new(CommandPlaneMessage::TaskAssignment(assignment));
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["payload"]["task_id"], task_id.to_string());
        assert_eq!(json["type"], "task_assignment");
    }
}
