//! Encampment (workspace root) and warband registry.
//!
//! An encampment is identified by `warchief/encampment.json`. Warbands are
//! registered in `warchief/warbands.json`; each owns a ledger under
//! `<rig>/.relics` and a canonical clone under `<rig>/warchief/warband`.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Role;

/// Relative path of the marker file that identifies an encampment.
pub const WORKSPACE_MARKER: &str = "warchief/encampment.json";
/// Ledger directory name, both at HQ and inside each warband.
pub const LEDGER_DIR: &str = ".relics";
/// Identifier prefix of the HQ ledger.
pub const HQ_PREFIX: &str = "hq";
/// Directory name of a worktree inside an agent home.
pub const WORKTREE_DIR: &str = "warband";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("not inside an encampment (searched up from {0}); run `hd install` first")]
    NotFound(PathBuf),

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("unknown warband: {0} (see `hd rig add`)")]
    UnknownWarband(String),

    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WorkspaceError>;

// ---------------------------------------------------------------------------
// Persisted formats
// ---------------------------------------------------------------------------

/// `warchief/encampment.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncampmentFile {
    #[serde(rename = "type")]
    pub kind: String,
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub public_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl EncampmentFile {
    pub fn new(name: impl Into<String>, owner: Option<String>) -> Self {
        let name = name.into();
        Self {
            kind: "encampment".to_string(),
            version: 1,
            public_name: Some(name.clone()),
            name,
            owner,
            created_at: Utc::now(),
        }
    }
}

/// One entry of `warchief/warbands.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarbandEntry {
    pub path: PathBuf,
    /// Identifier prefix without the trailing hyphen (`gt`).
    pub prefix: String,
    #[serde(default = "default_branch")]
    pub default_branch: String,
    #[serde(default)]
    pub git_url: Option<String>,
    #[serde(default)]
    pub added_at: Option<DateTime<Utc>>,
}

fn default_branch() -> String {
    "main".to_string()
}

/// `warchief/warbands.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarbandsFile {
    pub version: u32,
    #[serde(default)]
    pub rigs: BTreeMap<String, WarbandEntry>,
}

impl Default for WarbandsFile {
    fn default() -> Self {
        Self {
            version: 1,
            rigs: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

/// The resolved encampment: root path plus its registries.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
    pub encampment: EncampmentFile,
    pub warbands: WarbandsFile,
}

impl Workspace {
    /// Walk up from `start` until a directory containing the marker is found.
    pub fn find_root(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .find(|dir| dir.join(WORKSPACE_MARKER).is_file())
            .map(Path::to_path_buf)
    }

    /// Locate and load the encampment enclosing `start`.
    pub fn discover(start: &Path) -> Result<Self> {
        let root =
            Self::find_root(start).ok_or_else(|| WorkspaceError::NotFound(start.to_path_buf()))?;
        Self::load(&root)
    }

    pub fn load(root: &Path) -> Result<Self> {
        let marker = root.join(WORKSPACE_MARKER);
        if !marker.is_file() {
            return Err(WorkspaceError::NotFound(root.to_path_buf()));
        }
        let encampment: EncampmentFile = read_json(&marker)?;
        let warbands_path = root.join("warchief").join("warbands.json");
        let warbands = if warbands_path.is_file() {
            read_json(&warbands_path)?
        } else {
            WarbandsFile::default()
        };
        Ok(Self {
            root: root.to_path_buf(),
            encampment,
            warbands,
        })
    }

    pub fn name(&self) -> &str {
        &self.encampment.name
    }

    pub fn warband(&self, name: &str) -> Result<&WarbandEntry> {
        self.warbands
            .rigs
            .get(name)
            .ok_or_else(|| WorkspaceError::UnknownWarband(name.to_string()))
    }

    pub fn warband_names(&self) -> Vec<String> {
        self.warbands.rigs.keys().cloned().collect()
    }

    pub fn is_warband(&self, name: &str) -> bool {
        self.warbands.rigs.contains_key(name)
    }

    pub fn rig_prefix(&self, rig: &str) -> Result<&str> {
        Ok(self.warband(rig)?.prefix.as_str())
    }

    /// The identifier prefix that owns records and sessions for `role`.
    pub fn prefix_for(&self, role: &Role) -> Result<&str> {
        match role.rig() {
            None => Ok(HQ_PREFIX),
            Some(rig) => self.rig_prefix(rig),
        }
    }

    // --- paths -------------------------------------------------------------

    pub fn ledger_dir(&self) -> PathBuf {
        self.root.join(LEDGER_DIR)
    }

    pub fn routes_path(&self) -> PathBuf {
        self.ledger_dir().join("routes")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn event_log_path(&self) -> PathBuf {
        self.logs_dir().join("encampment.log")
    }

    pub fn drums_dir(&self) -> PathBuf {
        self.root.join("drums")
    }

    pub fn rig_dir(&self, rig: &str) -> PathBuf {
        self.root.join(rig)
    }

    /// `<rig>/warchief/warband`: the canonical clone worktrees branch from.
    pub fn canonical_clone(&self, rig: &str) -> PathBuf {
        self.rig_dir(rig).join("warchief").join(WORKTREE_DIR)
    }

    pub fn raiders_dir(&self, rig: &str) -> PathBuf {
        self.rig_dir(rig).join("raiders")
    }

    pub fn clan_dir(&self, rig: &str) -> PathBuf {
        self.rig_dir(rig).join("clan")
    }

    /// Home directory of an agent (where its session starts).
    pub fn role_home(&self, role: &Role) -> PathBuf {
        match role {
            Role::Warchief => self.root.join("warchief"),
            Role::Shaman => self.root.join("shaman"),
            Role::Witness { rig } => self.rig_dir(rig).join("witness"),
            Role::Forge { rig } => self.rig_dir(rig).join("forge").join(WORKTREE_DIR),
            Role::Raider { rig, name } => self.raiders_dir(rig).join(name).join(WORKTREE_DIR),
            Role::Crew { rig, name } => self.clan_dir(rig).join(name).join(WORKTREE_DIR),
        }
    }

    /// Directory that is removed when an agent's worktree is destroyed.
    pub fn agent_dir(&self, role: &Role) -> Option<PathBuf> {
        match role {
            Role::Raider { rig, name } => Some(self.raiders_dir(rig).join(name)),
            Role::Crew { rig, name } => Some(self.clan_dir(rig).join(name)),
            _ => None,
        }
    }

    // --- mutation ----------------------------------------------------------

    /// Register a warband and persist `warbands.json`.
    pub fn register_warband(&mut self, name: &str, entry: WarbandEntry) -> Result<()> {
        validate_warband_name(name)?;
        if self.warbands.rigs.contains_key(name) {
            return Err(WorkspaceError::AlreadyExists(format!("warband {name}")));
        }
        if self
            .warbands
            .rigs
            .values()
            .any(|w| w.prefix == entry.prefix)
            || entry.prefix == HQ_PREFIX
        {
            return Err(WorkspaceError::AlreadyExists(format!(
                "prefix {}",
                entry.prefix
            )));
        }
        self.warbands.rigs.insert(name.to_string(), entry);
        self.save_warbands()
    }

    pub fn save_warbands(&self) -> Result<()> {
        let path = self.root.join("warchief").join("warbands.json");
        write_json_atomic(&path, &self.warbands)
    }

    /// Lay out a fresh encampment at `root`.
    ///
    /// Creates the registry files, agent homes, ledger and log directories.
    /// Ledger initialisation and agent records are the caller's job.
    pub fn init_layout(root: &Path, name: &str, owner: Option<String>) -> Result<Self> {
        if root.join(WORKSPACE_MARKER).exists() {
            return Err(WorkspaceError::AlreadyExists(root.display().to_string()));
        }
        std::fs::create_dir_all(root.join("warchief").join(".claude"))?;
        std::fs::create_dir_all(root.join("shaman").join(".claude"))?;
        std::fs::create_dir_all(root.join(LEDGER_DIR))?;
        std::fs::create_dir_all(root.join("logs"))?;
        std::fs::create_dir_all(root.join("drums"))?;

        let encampment = EncampmentFile::new(name, owner);
        write_json_atomic(&root.join(WORKSPACE_MARKER), &encampment)?;
        write_json_atomic(
            &root.join("warchief").join("warbands.json"),
            &WarbandsFile::default(),
        )?;
        std::fs::write(
            root.join("warchief").join("CLAUDE.md"),
            warchief_context(name),
        )?;
        let settings = agent_settings();
        write_json_atomic(
            &root.join("warchief").join(".claude").join("settings.json"),
            &settings,
        )?;
        write_json_atomic(
            &root.join("shaman").join(".claude").join("settings.json"),
            &settings,
        )?;

        tracing::info!(root = %root.display(), name, "encampment laid out");
        Self::load(root)
    }
}

/// Warband names become path components and session-name segments, so they
/// are restricted to `[a-z0-9_]+`.
pub fn validate_warband_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| WorkspaceError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    if name.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(invalid("only lowercase letters, digits and '_' are allowed"));
    }
    if matches!(name, "warchief" | "shaman" | "logs" | "drums") {
        return Err(invalid("reserved by the encampment layout"));
    }
    Ok(())
}

fn warchief_context(name: &str) -> String {
    format!(
        "# {name} encampment\n\n\
         You are the Warchief. Dispatch work with `hd charge <item> <warband>`,\n\
         track batches with `hd raid`, and read your drums with `hd drums inbox`.\n"
    )
}

fn agent_settings() -> serde_json::Value {
    serde_json::json!({
        "hooks": {
            "SessionStart": [
                { "hooks": [ { "type": "command", "command": "hd role show" } ] }
            ],
            "UserPromptSubmit": [
                { "hooks": [ { "type": "command", "command": "hd drums inbox --unread --quiet" } ] }
            ]
        }
    })
}

// ---------------------------------------------------------------------------
// File helpers
// ---------------------------------------------------------------------------

pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| WorkspaceError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value).map_err(|e| WorkspaceError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    write_atomic(path, &json)?;
    Ok(())
}

/// Write to a sibling temp file, then rename into place.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = parent.join(format!(
        ".{file_name}.{}.tmp",
        crate::ids::short_token(8)
    ));
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true) // O_CREAT | O_EXCL
            .open(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path).inspect_err(|_| {
        let _ = std::fs::remove_file(&tmp);
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
