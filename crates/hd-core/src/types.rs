use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::Ref;

// ---------------------------------------------------------------------------
// RoleKind
// ---------------------------------------------------------------------------

/// The closed set of agent roles, without their warband / name payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    Warchief,
    Shaman,
    Witness,
    Forge,
    Raider,
    Crew,
}

impl RoleKind {
    pub const ALL: [RoleKind; 6] = [
        RoleKind::Warchief,
        RoleKind::Shaman,
        RoleKind::Witness,
        RoleKind::Forge,
        RoleKind::Raider,
        RoleKind::Crew,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleKind::Warchief => "warchief",
            RoleKind::Shaman => "shaman",
            RoleKind::Witness => "witness",
            RoleKind::Forge => "forge",
            RoleKind::Raider => "raider",
            RoleKind::Crew => "crew",
        }
    }

    /// One of each per encampment.
    pub fn is_workspace_level(&self) -> bool {
        matches!(self, RoleKind::Warchief | RoleKind::Shaman)
    }

    pub fn needs_rig(&self) -> bool {
        !self.is_workspace_level()
    }

    pub fn needs_name(&self) -> bool {
        matches!(self, RoleKind::Raider | RoleKind::Crew)
    }

    pub fn describe(&self) -> &'static str {
        match self {
            RoleKind::Warchief => "encampment coordinator; dispatches work across warbands",
            RoleKind::Shaman => "encampment daemon beacon; keeps the fleet awake",
            RoleKind::Witness => "warband supervisor; reconciles state and cleans up orphans",
            RoleKind::Forge => "warband merge processor; lands merge requests",
            RoleKind::Raider => "ephemeral per-task worker in an isolated worktree",
            RoleKind::Crew => "persistent user-managed worker in an isolated worktree",
        }
    }
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleKind {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warchief" => Ok(RoleKind::Warchief),
            "shaman" => Ok(RoleKind::Shaman),
            "witness" => Ok(RoleKind::Witness),
            "forge" => Ok(RoleKind::Forge),
            "raider" | "raiders" => Ok(RoleKind::Raider),
            "crew" | "clan" => Ok(RoleKind::Crew),
            other => Err(IdentityError::UnknownRole(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("unknown role: {0:?}")]
    UnknownRole(String),
    #[error("malformed agent identity: {0:?}")]
    Malformed(String),
    #[error("role {role} requires {missing}")]
    Missing { role: RoleKind, missing: String },
}

/// A fully bound agent role.
///
/// The string identity (`<rig>/raiders/<name>` etc.) is only produced at the
/// CLI edge and in persisted ids; everything else matches on this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Role {
    Warchief,
    Shaman,
    Witness { rig: String },
    Forge { rig: String },
    Raider { rig: String, name: String },
    Crew { rig: String, name: String },
}

impl Role {
    pub fn kind(&self) -> RoleKind {
        match self {
            Role::Warchief => RoleKind::Warchief,
            Role::Shaman => RoleKind::Shaman,
            Role::Witness { .. } => RoleKind::Witness,
            Role::Forge { .. } => RoleKind::Forge,
            Role::Raider { .. } => RoleKind::Raider,
            Role::Crew { .. } => RoleKind::Crew,
        }
    }

    pub fn rig(&self) -> Option<&str> {
        match self {
            Role::Warchief | Role::Shaman => None,
            Role::Witness { rig } | Role::Forge { rig } => Some(rig),
            Role::Raider { rig, .. } | Role::Crew { rig, .. } => Some(rig),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Role::Raider { name, .. } | Role::Crew { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Build a role from a kind plus optional components.
    ///
    /// Returns the list of missing component names when the kind needs a
    /// warband or a name that was not supplied.
    pub fn from_parts(
        kind: RoleKind,
        rig: Option<&str>,
        name: Option<&str>,
    ) -> Result<Role, Vec<&'static str>> {
        let rig = rig.filter(|r| !r.is_empty());
        let name = name.filter(|n| !n.is_empty());
        let mut missing = Vec::new();
        if kind.needs_rig() && rig.is_none() {
            missing.push("warband");
        }
        if kind.needs_name() && name.is_none() {
            missing.push("name");
        }
        if !missing.is_empty() {
            return Err(missing);
        }
        let rig = rig.unwrap_or_default().to_string();
        let name = name.unwrap_or_default().to_string();
        Ok(match kind {
            RoleKind::Warchief => Role::Warchief,
            RoleKind::Shaman => Role::Shaman,
            RoleKind::Witness => Role::Witness { rig },
            RoleKind::Forge => Role::Forge { rig },
            RoleKind::Raider => Role::Raider { rig, name },
            RoleKind::Crew => Role::Crew { rig, name },
        })
    }

    /// The agent identity address (`warchief/`, `<rig>/raiders/<name>`, ...).
    pub fn identity(&self) -> String {
        match self {
            Role::Warchief => "warchief/".to_string(),
            Role::Shaman => "shaman/".to_string(),
            Role::Witness { rig } => format!("{rig}/witness"),
            Role::Forge { rig } => format!("{rig}/forge"),
            Role::Raider { rig, name } => format!("{rig}/raiders/{name}"),
            Role::Crew { rig, name } => format!("{rig}/clan/{name}"),
        }
    }

    /// Parse an identity address back into a role.
    pub fn from_identity(identity: &str) -> Result<Role, IdentityError> {
        let trimmed = identity.trim().trim_end_matches('/');
        let parts: Vec<&str> = trimmed.split('/').collect();
        let malformed = || IdentityError::Malformed(identity.to_string());
        match parts.as_slice() {
            ["warchief"] => Ok(Role::Warchief),
            ["shaman"] => Ok(Role::Shaman),
            [rig, "witness"] if valid_component(rig) => Ok(Role::Witness {
                rig: rig.to_string(),
            }),
            [rig, "forge"] if valid_component(rig) => Ok(Role::Forge {
                rig: rig.to_string(),
            }),
            [rig, "raiders", name] if valid_component(rig) && valid_component(name) => {
                Ok(Role::Raider {
                    rig: rig.to_string(),
                    name: name.to_string(),
                })
            }
            [rig, "clan", name] if valid_component(rig) && valid_component(name) => {
                Ok(Role::Crew {
                    rig: rig.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(malformed()),
        }
    }
}

fn valid_component(s: &str) -> bool {
    !s.is_empty() && !s.contains(char::is_whitespace)
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identity())
    }
}

// ---------------------------------------------------------------------------
// WorkStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    Open,
    InProgress,
    Hooked,
    Pinned,
    Blocked,
    Deferred,
    Closed,
    Tombstone,
}

impl WorkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkStatus::Open => "open",
            WorkStatus::InProgress => "in_progress",
            WorkStatus::Hooked => "hooked",
            WorkStatus::Pinned => "pinned",
            WorkStatus::Blocked => "blocked",
            WorkStatus::Deferred => "deferred",
            WorkStatus::Closed => "closed",
            WorkStatus::Tombstone => "tombstone",
        }
    }

    /// Closed and tombstoned items count as complete for raids.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkStatus::Closed | WorkStatus::Tombstone)
    }

    /// Returns `true` when a transition from `self` to `target` is valid.
    ///
    /// Charge, unsling and done consult this before touching an item.
    pub fn can_transition_to(&self, target: &WorkStatus) -> bool {
        if self == target {
            return true;
        }
        match (self, target) {
            (from, WorkStatus::Closed | WorkStatus::Tombstone) => !from.is_terminal(),
            (WorkStatus::Closed, WorkStatus::Open) => true,
            (from, WorkStatus::Open) => !from.is_terminal(),
            // Pinned items are never hooked; a forced charge may take over live work.
            (from, WorkStatus::Hooked) => !from.is_terminal() && *from != WorkStatus::Pinned,
            (WorkStatus::Hooked, WorkStatus::InProgress | WorkStatus::Deferred) => true,
            (WorkStatus::InProgress, WorkStatus::Deferred) => true,
            (WorkStatus::Open, _) => true,
            _ => false,
        }
    }

    /// One-character glyph used by progress displays.
    pub fn symbol(&self) -> &'static str {
        match self {
            WorkStatus::Closed => "✓",
            WorkStatus::Tombstone => "✗",
            WorkStatus::Hooked | WorkStatus::InProgress => "▶",
            WorkStatus::Blocked => "⊘",
            WorkStatus::Pinned => "📌",
            WorkStatus::Deferred => "…",
            WorkStatus::Open => "○",
        }
    }
}

impl fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "open" => Ok(WorkStatus::Open),
            "in_progress" => Ok(WorkStatus::InProgress),
            "hooked" => Ok(WorkStatus::Hooked),
            "pinned" => Ok(WorkStatus::Pinned),
            "blocked" => Ok(WorkStatus::Blocked),
            "deferred" => Ok(WorkStatus::Deferred),
            "closed" => Ok(WorkStatus::Closed),
            "tombstone" => Ok(WorkStatus::Tombstone),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// ItemType
// ---------------------------------------------------------------------------

/// Work-item type. Unknown ledger types are preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ItemType {
    #[default]
    Task,
    Bug,
    Feature,
    Epic,
    Event,
    Agent,
    Role,
    Raid,
    MergeRequest,
    Message,
    Gate,
    Other(String),
}

impl ItemType {
    pub fn as_str(&self) -> &str {
        match self {
            ItemType::Task => "task",
            ItemType::Bug => "bug",
            ItemType::Feature => "feature",
            ItemType::Epic => "epic",
            ItemType::Event => "event",
            ItemType::Agent => "agent",
            ItemType::Role => "role",
            ItemType::Raid => "raid",
            ItemType::MergeRequest => "merge-request",
            ItemType::Message => "message",
            ItemType::Gate => "gate",
            ItemType::Other(s) => s,
        }
    }
}

impl From<String> for ItemType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "task" => ItemType::Task,
            "bug" => ItemType::Bug,
            "feature" => ItemType::Feature,
            "epic" => ItemType::Epic,
            "event" => ItemType::Event,
            "agent" => ItemType::Agent,
            "role" => ItemType::Role,
            "raid" => ItemType::Raid,
            "merge-request" | "merge_request" => ItemType::MergeRequest,
            "message" => ItemType::Message,
            "gate" => ItemType::Gate,
            _ => ItemType::Other(s),
        }
    }
}

impl From<ItemType> for String {
    fn from(t: ItemType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Dependencies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyKind {
    /// Blocking edge; the dependent is not ready until the target closes.
    #[serde(alias = "depends_on", alias = "depends-on")]
    Blocks,
    /// Non-blocking edge used by raids.
    Tracks,
    ParentChild,
    Related,
    WaitsFor,
}

impl DependencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyKind::Blocks => "blocks",
            DependencyKind::Tracks => "tracks",
            DependencyKind::ParentChild => "parent-child",
            DependencyKind::Related => "related",
            DependencyKind::WaitsFor => "waits-for",
        }
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self, DependencyKind::Blocks | DependencyKind::WaitsFor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Raw target; may be an `external:<prefix>:<id>` reference.
    #[serde(alias = "id")]
    pub depends_on_id: String,
    #[serde(rename = "type", alias = "dep_type")]
    pub kind: DependencyKind,
}

impl Dependency {
    pub fn target(&self) -> Ref {
        Ref::parse(&self.depends_on_id)
    }
}

// ---------------------------------------------------------------------------
// WorkItem
// ---------------------------------------------------------------------------

fn default_priority() -> u8 {
    2
}

/// A unit of work as reported by the ledger's `--json` output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: WorkStatus,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(rename = "issue_type", alias = "type", default)]
    pub item_type: ItemType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub ephemeral: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<String>,
}

impl WorkItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>, item_type: ItemType) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            status: WorkStatus::Open,
            priority: default_priority(),
            item_type,
            assignee: None,
            parent: None,
            labels: Vec::new(),
            dependencies: Vec::new(),
            ephemeral: false,
            created_at: Some(now),
            updated_at: Some(now),
            closed_at: None,
            close_reason: None,
        }
    }

    /// Value of the first `key: value` line in the description.
    pub fn description_field(&self, key: &str) -> Option<String> {
        description_field(&self.description, key)
    }

    /// Value of the first `<prefix>:<value>` label.
    pub fn label_value(&self, prefix: &str) -> Option<&str> {
        self.labels
            .iter()
            .find_map(|l| l.strip_prefix(prefix).and_then(|r| r.strip_prefix(':')))
    }

    /// Targets of all `tracks` edges.
    pub fn tracked(&self) -> Vec<Ref> {
        self.dependencies
            .iter()
            .filter(|d| d.kind == DependencyKind::Tracks)
            .map(Dependency::target)
            .collect()
    }

    pub fn tracks(&self, target: &str) -> bool {
        let wanted = Ref::parse(target);
        self.dependencies
            .iter()
            .any(|d| d.kind == DependencyKind::Tracks && d.target().id() == wanted.id())
    }
}

/// Parse a `key: value` line out of a free-form description.
///
/// Keys are matched case-insensitively; `null` and empty values yield `None`.
pub fn description_field(description: &str, key: &str) -> Option<String> {
    description.lines().find_map(|line| {
        let (k, v) = line.split_once(':')?;
        if !k.trim().eq_ignore_ascii_case(key) {
            return None;
        }
        let v = v.trim();
        if v.is_empty() || v == "null" {
            None
        } else {
            Some(v.to_string())
        }
    })
}

// ---------------------------------------------------------------------------
// Agent-record enums
// ---------------------------------------------------------------------------

/// Agent state. Only `Stuck` and `AwaitingGate` are ever stored; the others
/// are inferred from the live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentState {
    Idle,
    Working,
    Done,
    Stuck,
    AwaitingGate,
}

impl AgentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Idle => "idle",
            AgentState::Working => "working",
            AgentState::Done => "done",
            AgentState::Stuck => "stuck",
            AgentState::AwaitingGate => "awaiting-gate",
        }
    }

    pub fn is_observable(&self) -> bool {
        matches!(self, AgentState::Idle | AgentState::Working | AgentState::Done)
    }

    pub fn glyph(&self) -> &'static str {
        match self {
            AgentState::Idle => "*",
            AgentState::Working => "@",
            AgentState::Done => "✓",
            AgentState::Stuck => "!",
            AgentState::AwaitingGate => "⏸",
        }
    }
}

impl FromStr for AgentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "idle" => Ok(AgentState::Idle),
            "working" => Ok(AgentState::Working),
            "done" => Ok(AgentState::Done),
            "stuck" => Ok(AgentState::Stuck),
            "awaiting-gate" => Ok(AgentState::AwaitingGate),
            other => Err(format!("unknown agent state: {other}")),
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Self-reported worktree state at `done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupStatus {
    Clean,
    Uncommitted,
    Unpushed,
    Stash,
    Unknown,
}

impl CleanupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupStatus::Clean => "clean",
            CleanupStatus::Uncommitted => "uncommitted",
            CleanupStatus::Unpushed => "unpushed",
            CleanupStatus::Stash => "stash",
            CleanupStatus::Unknown => "unknown",
        }
    }

    /// Whether the worktree can be destroyed without losing work.
    pub fn is_safe_to_nuke(&self) -> bool {
        matches!(self, CleanupStatus::Clean)
    }
}

impl FromStr for CleanupStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clean" => Ok(CleanupStatus::Clean),
            "uncommitted" => Ok(CleanupStatus::Uncommitted),
            "unpushed" => Ok(CleanupStatus::Unpushed),
            "stash" => Ok(CleanupStatus::Stash),
            "unknown" => Ok(CleanupStatus::Unknown),
            other => Err(format!("unknown cleanup status: {other}")),
        }
    }
}

impl fmt::Display for CleanupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Verbose,
    #[default]
    Normal,
    Muted,
}

impl NotificationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationLevel::Verbose => "verbose",
            NotificationLevel::Normal => "normal",
            NotificationLevel::Muted => "muted",
        }
    }
}

impl FromStr for NotificationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "verbose" => Ok(NotificationLevel::Verbose),
            "normal" => Ok(NotificationLevel::Normal),
            "muted" => Ok(NotificationLevel::Muted),
            other => Err(format!("unknown notification level: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
