//! The command/group/project data model driving [`crate::executor`], and
//! its JSON persistence format.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::frame::CanFlags;
use crate::helpers::{bytes_to_hex_string, hex_string_to_bytes};

/// Which kind of action a [`Command`] performs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CommandType {
    /// Sends a raw CAN frame.
    CanFrame,
    /// Sends a UDS request.
    UdsCommand,
    /// Sleeps for a fixed duration.
    Wait,
    /// A no-op annotation.
    Comment,
    /// A user script. Execution is always a no-op; see [`crate::executor`].
    Script,
}

/// How often a [`Command`] is dispatched once started.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SendMode {
    /// Dispatched exactly once.
    Single,
    /// Re-dispatched every `period` until the executor stops.
    Periodic,
    /// Dispatched only when its payload differs from the last dispatch.
    OnChange,
}

/// A [`Command`]'s last known execution outcome.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CommandStatus {
    /// Not yet executed.
    Pending,
    /// A periodic command's background dispatch loop is active.
    Running,
    /// The most recent dispatch succeeded.
    Success,
    /// The most recent dispatch failed.
    Failed,
    /// A periodic command's background dispatch loop was stopped.
    Stopped,
}

impl Default for CommandStatus {
    fn default() -> Self {
        Self::Pending
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], s: S) -> Result<S::Ok, S::Error> {
        super::bytes_to_hex_string(data).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        super::hex_string_to_bytes(&s).map_err(serde::de::Error::custom)
    }
}

/// A raw CAN frame to transmit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanFrameCommand {
    /// Arbitration id.
    pub arbitration_id: u32,
    /// Payload bytes, persisted as an uppercase hex string.
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    /// 29-bit rather than 11-bit arbitration.
    pub is_extended_id: bool,
    /// CAN-FD framing.
    pub is_fd: bool,
    /// FD bit-rate switch.
    pub bitrate_switch: bool,
    /// Error state indicator.
    pub error_state_indicator: bool,
    /// Declared DLC; informational only, the frame's real DLC is derived
    /// from `data.len()` when the command is dispatched.
    pub dlc: u8,
    /// Free-text annotation.
    #[serde(default)]
    pub comment: String,
}

impl CanFrameCommand {
    /// The [`CanFlags`] this command's boolean fields describe.
    pub fn flags(&self) -> CanFlags {
        let mut flags = CanFlags::empty();
        flags.set(CanFlags::EXTENDED_ID, self.is_extended_id);
        flags.set(CanFlags::FD, self.is_fd);
        flags.set(CanFlags::BITRATE_SWITCH, self.bitrate_switch);
        flags.set(CanFlags::ERROR_STATE_INDICATOR, self.error_state_indicator);
        flags
    }
}

/// A UDS request to send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UdsCommandSpec {
    /// Service id byte.
    pub service_id: u8,
    /// Request payload, persisted as an uppercase hex string.
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    /// Sub-function byte, when this service carries one.
    pub subfunction: Option<u8>,
    /// Milliseconds to wait for a response.
    pub timeout: u32,
    /// Whether a response is expected.
    pub expect_response: bool,
    /// Free-text annotation.
    #[serde(default)]
    pub comment: String,
}

/// Sleeps the executor's dispatch loop for a fixed duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitCommand {
    /// Sleep duration in milliseconds.
    pub duration: u32,
    /// Free-text annotation.
    #[serde(default)]
    pub comment: String,
}

/// A no-op annotation, carried through execution for documentation only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentCommand {
    /// The comment text.
    #[serde(default)]
    pub comment: String,
}

/// A user script. Scripts are never executed; see [`crate::executor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptCommand {
    /// The script source, opaque to this crate.
    #[serde(default)]
    pub script_code: String,
    /// Free-text annotation.
    #[serde(default)]
    pub comment: String,
}

/// One step in a [`CommandGroup`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Stable identifier, unique within its group.
    pub id: String,
    /// Display name.
    pub name: String,
    /// What kind of action this command performs.
    pub command_type: CommandType,
    /// How often it is dispatched.
    #[serde(default = "default_send_mode")]
    pub send_mode: SendMode,
    /// Period in milliseconds, used only when `send_mode` is `Periodic`.
    #[serde(default = "default_period")]
    pub period: u32,
    /// Whether this command is dispatched at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Last known execution outcome.
    #[serde(default)]
    pub status: CommandStatus,
    /// Unix milliseconds of the last dispatch, or 0 if never dispatched.
    #[serde(default)]
    pub last_executed: u64,
    /// Total dispatch attempts.
    #[serde(default)]
    pub execution_count: u64,
    /// Dispatch attempts that succeeded.
    #[serde(default)]
    pub success_count: u64,
    /// Dispatch attempts that failed.
    #[serde(default)]
    pub fail_count: u64,

    /// Payload when `command_type` is [`CommandType::CanFrame`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_frame: Option<CanFrameCommand>,
    /// Payload when `command_type` is [`CommandType::UdsCommand`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uds_command: Option<UdsCommandSpec>,
    /// Payload when `command_type` is [`CommandType::Wait`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_command: Option<WaitCommand>,
    /// Payload when `command_type` is [`CommandType::Comment`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_command: Option<CommentCommand>,
    /// Payload when `command_type` is [`CommandType::Script`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_command: Option<ScriptCommand>,
}

fn default_send_mode() -> SendMode {
    SendMode::Single
}

fn default_period() -> u32 {
    1000
}

fn default_true() -> bool {
    true
}

/// An ordered (or unordered, per `run_in_sequence`) set of [`Command`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandGroup {
    /// Stable identifier, unique within its project.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Whether this group runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// The group's commands, in declaration order.
    #[serde(default)]
    pub commands: Vec<Command>,
    /// How many times to run the group's command list. `0` means forever.
    #[serde(default = "default_repeat_count")]
    pub repeat_count: u32,
    /// Milliseconds to wait between repetitions.
    #[serde(default = "default_period")]
    pub repeat_interval: u32,
    /// Whether commands run one after another (true) or are all considered
    /// eligible to start concurrently (false). This crate always runs a
    /// group's commands in sequence; see `Non-goals` in [`crate::executor`].
    #[serde(default = "default_true")]
    pub run_in_sequence: bool,
}

fn default_repeat_count() -> u32 {
    1
}

impl CommandGroup {
    /// Finds a command by id.
    pub fn get_command(&self, command_id: &str) -> Option<&Command> {
        self.commands.iter().find(|c| c.id == command_id)
    }

    /// Finds and removes a command by id, returning whether it was present.
    pub fn remove_command(&mut self, command_id: &str) -> bool {
        let len = self.commands.len();
        self.commands.retain(|c| c.id != command_id);
        self.commands.len() != len
    }
}

fn now_unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A full command project: metadata plus an ordered list of groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandProject {
    /// Stable identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Schema/content version, opaque to this crate.
    #[serde(default = "default_version")]
    pub version: String,
    /// Unix milliseconds this project was created.
    pub created_at: u64,
    /// Unix milliseconds this project was last modified.
    pub updated_at: u64,
    /// The project's command groups, in declaration order.
    #[serde(default)]
    pub groups: Vec<CommandGroup>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl CommandProject {
    /// Builds a new, empty project, stamping `created_at`/`updated_at` to
    /// the current wall-clock time.
    pub fn new(id: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = now_unix_millis();
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            version: default_version(),
            created_at: now,
            updated_at: now,
            groups: Vec::new(),
        }
    }

    /// Finds a group by id.
    pub fn get_group(&self, group_id: &str) -> Option<&CommandGroup> {
        self.groups.iter().find(|g| g.id == group_id)
    }

    /// Finds a group by id, mutably.
    pub fn get_group_mut(&mut self, group_id: &str) -> Option<&mut CommandGroup> {
        self.groups.iter_mut().find(|g| g.id == group_id)
    }

    /// Appends a group and refreshes `updated_at`.
    pub fn add_group(&mut self, group: CommandGroup) {
        self.groups.push(group);
        self.updated_at = now_unix_millis();
    }

    /// Removes a group by id, refreshing `updated_at` on success.
    pub fn remove_group(&mut self, group_id: &str) -> bool {
        let len = self.groups.len();
        self.groups.retain(|g| g.id != group_id);
        let removed = self.groups.len() != len;
        if removed {
            self.updated_at = now_unix_millis();
        }
        removed
    }

    /// Parses a project from its persisted JSON representation.
    pub fn from_json(data: &str) -> serde_json::Result<Self> {
        serde_json::from_str(data)
    }

    /// Serializes this project to its persisted JSON representation,
    /// pretty-printed the way a hand-edited project file would be.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_project() -> CommandProject {
        let mut project = CommandProject::new("proj1", "Sample", "a sample project");
        let mut group = CommandGroup {
            id: "group1".into(),
            name: "ECU Identification".into(),
            description: "Read ECU identification information".into(),
            enabled: true,
            commands: Vec::new(),
            repeat_count: 1,
            repeat_interval: 1000,
            run_in_sequence: true,
        };
        group.commands.push(Command {
            id: "cmd1".into(),
            name: "Read VIN".into(),
            command_type: CommandType::UdsCommand,
            send_mode: SendMode::Single,
            period: 1000,
            enabled: true,
            status: CommandStatus::Pending,
            last_executed: 0,
            execution_count: 0,
            success_count: 0,
            fail_count: 0,
            can_frame: None,
            uds_command: Some(UdsCommandSpec {
                service_id: 0x22,
                data: vec![0xF1, 0x81],
                subfunction: None,
                timeout: 2000,
                expect_response: true,
                comment: "Read Vehicle Identification Number".into(),
            }),
            wait_command: None,
            comment_command: None,
            script_command: None,
        });
        project.add_group(group);
        project
    }

    #[test]
    fn round_trips_through_json() {
        let project = sample_project();
        let json = project.to_json().unwrap();
        let reloaded = CommandProject::from_json(&json).unwrap();
        assert_eq!(project, reloaded);
    }

    #[test]
    fn hex_data_field_is_uppercase_and_spaced() {
        let project = sample_project();
        let json = project.to_json().unwrap();
        assert!(json.contains("\"data\": \"F1 81\""));
    }

    #[test]
    fn command_type_serializes_to_snake_case() {
        let project = sample_project();
        let json = project.to_json().unwrap();
        assert!(json.contains("\"command_type\": \"uds_command\""));
    }

    #[test]
    fn command_type_display_matches_serde_token() {
        assert_eq!(CommandType::CanFrame.to_string(), "can_frame");
        assert_eq!(SendMode::OnChange.to_string(), "on_change");
        assert_eq!(CommandStatus::Failed.to_string(), "failed");
    }
}
