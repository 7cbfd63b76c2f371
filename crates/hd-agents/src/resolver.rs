//! Role resolution: environment first, then the working directory.
//!
//! Path rules, relative to the encampment root (first match wins):
//!
//! | Path                           | Role                 |
//! |--------------------------------|----------------------|
//! | `warchief/...`                 | Warchief             |
//! | `shaman/...`                   | Shaman               |
//! | `<rig>/warchief/...`           | Warchief             |
//! | `<rig>/witness/...`            | Witness of `<rig>`   |
//! | `<rig>/forge/...`              | Forge of `<rig>`     |
//! | `<rig>/raiders/<name>/...`     | Raider `<name>`      |
//! | `<rig>/clan/<name>/...`        | Crew `<name>`        |
//! | `<rig>/...`                    | unknown              |

use std::fmt;
use std::path::{Component, Path, PathBuf};

use hd_core::config::RuntimeConfig;
use hd_core::types::{Role, RoleKind};
use hd_core::workspace::{Workspace, WorkspaceError, WORKSPACE_MARKER};

use crate::context::Env;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("not inside an encampment (searched up from {0}); run `hd install` or set HD_WORKSPACE_ROOT")]
    NotInWorkspace(PathBuf),

    #[error("cannot tell which agent {path:?} belongs to; set HD_ROLE or pass --role")]
    AmbiguousPath { path: String },

    #[error("role {role} needs a {}; set {} or run from the agent's directory", .missing.join(" and a "), env_hint(.missing))]
    MissingComponent {
        role: RoleKind,
        missing: Vec<&'static str>,
    },

    #[error("invalid HD_ROLE {0:?}")]
    InvalidRole(String),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}

fn env_hint(missing: &[&'static str]) -> String {
    missing
        .iter()
        .map(|m| match *m {
            "warband" => "HD_WARBAND",
            _ => "HD_RAIDER/HD_CLAN",
        })
        .collect::<Vec<_>>()
        .join(" and ")
}

/// Where the resolved role came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleSource {
    Env,
    Cwd,
    EnvCwd,
    Flag,
}

impl RoleSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleSource::Env => "env",
            RoleSource::Cwd => "cwd",
            RoleSource::EnvCwd => "env+cwd",
            RoleSource::Flag => "flag",
        }
    }
}

impl fmt::Display for RoleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleInfo {
    pub role: Role,
    pub workspace_root: PathBuf,
    pub work_dir: PathBuf,
    pub source: RoleSource,
    /// The role the working directory implies, when it disagrees with
    /// the resolved one.
    pub mismatch: Option<Role>,
}

impl RoleInfo {
    pub fn rig(&self) -> Option<&str> {
        self.role.rig()
    }

    pub fn name(&self) -> Option<&str> {
        self.role.name()
    }

    pub fn identity(&self) -> String {
        self.role.identity()
    }
}

/// Explicit `--role/--rig/--name` flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub role: Option<RoleKind>,
    pub rig: Option<String>,
    pub name: Option<String>,
}

/// What the working directory says about the role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathRole {
    Known(Role),
    /// Under a warband but without a role segment.
    InWarband(String),
    /// At the root or outside every warband.
    Unscoped,
}

impl PathRole {
    fn rig(&self) -> Option<&str> {
        match self {
            PathRole::Known(r) => r.rig(),
            PathRole::InWarband(rig) => Some(rig),
            PathRole::Unscoped => None,
        }
    }
}

/// Find the encampment root for `cwd`, falling back to
/// `HD_WORKSPACE_ROOT` (the working directory may have been deleted).
pub fn locate_root(cwd: &Path, env: &Env) -> Result<PathBuf, ResolveError> {
    if let Some(root) = Workspace::find_root(cwd) {
        return Ok(root);
    }
    if let Some(root) = env.get("HD_WORKSPACE_ROOT") {
        let root = PathBuf::from(root);
        if root.join(WORKSPACE_MARKER).is_file() {
            return Ok(root);
        }
    }
    Err(ResolveError::NotInWorkspace(cwd.to_path_buf()))
}

fn relative_parts(root: &Path, cwd: &Path) -> Option<Vec<String>> {
    let rel = cwd.strip_prefix(root).ok().map(Path::to_path_buf).or_else(|| {
        let root = root.canonicalize().ok()?;
        let cwd = cwd.canonicalize().ok()?;
        cwd.strip_prefix(&root).ok().map(Path::to_path_buf)
    })?;
    Some(
        rel.components()
            .filter_map(|c| match c {
                Component::Normal(s) => s.to_str().map(str::to_string),
                _ => None,
            })
            .collect(),
    )
}

pub fn detect_path_role(ws: &Workspace, cwd: &Path) -> PathRole {
    let Some(parts) = relative_parts(&ws.root, cwd) else {
        return PathRole::Unscoped;
    };
    let parts = parts.iter().map(String::as_str).collect::<Vec<_>>();
    match parts.as_slice() {
        ["warchief", ..] => PathRole::Known(Role::Warchief),
        ["shaman", ..] => PathRole::Known(Role::Shaman),
        [rig, rest @ ..] if ws.is_warband(rig) => {
            let rig = rig.to_string();
            match rest {
                ["warchief", ..] => PathRole::Known(Role::Warchief),
                ["witness", ..] => PathRole::Known(Role::Witness { rig }),
                ["forge", ..] => PathRole::Known(Role::Forge { rig }),
                ["raiders", name, ..] => PathRole::Known(Role::Raider {
                    rig,
                    name: name.to_string(),
                }),
                ["clan", name, ..] => PathRole::Known(Role::Crew {
                    rig,
                    name: name.to_string(),
                }),
                _ => PathRole::InWarband(rig),
            }
        }
        _ => PathRole::Unscoped,
    }
}

fn env_name(env: &Env, kind: RoleKind) -> Option<String> {
    let value = match kind {
        RoleKind::Raider => env.get("HD_RAIDER"),
        RoleKind::Crew => env.get("HD_CLAN").or_else(|| env.get("HD_CREW")),
        _ => None,
    };
    value.map(str::to_string)
}

/// Resolve the acting role. Flags beat `HD_ROLE`, which beats the path;
/// missing pieces are filled from the path and a disagreement is
/// reported in [`RoleInfo::mismatch`].
pub fn resolve(ws: &Workspace, cwd: &Path, env: &Env, overrides: &Overrides) -> Result<RoleInfo, ResolveError> {
    let path_role = detect_path_role(ws, cwd);

    let (kind, mut rig, mut name, mut source) = if let Some(kind) = overrides.role {
        let rig = overrides
            .rig
            .clone()
            .or_else(|| env.get("HD_WARBAND").map(str::to_string));
        let name = overrides.name.clone().or_else(|| env_name(env, kind));
        (kind, rig, name, RoleSource::Flag)
    } else if let Some(raw) = env.get("HD_ROLE") {
        let kind = raw
            .parse::<RoleKind>()
            .map_err(|_| ResolveError::InvalidRole(raw.to_string()))?;
        let rig = env.get("HD_WARBAND").map(str::to_string);
        (kind, rig, env_name(env, kind), RoleSource::Env)
    } else {
        return match path_role {
            PathRole::Known(role) => {
                if let Some(rig) = role.rig() {
                    ws.warband(rig)?;
                }
                Ok(RoleInfo {
                    role,
                    workspace_root: ws.root.clone(),
                    work_dir: cwd.to_path_buf(),
                    source: RoleSource::Cwd,
                    mismatch: None,
                })
            }
            _ => Err(ResolveError::AmbiguousPath {
                path: relative_parts(&ws.root, cwd)
                    .map(|p| p.join("/"))
                    .unwrap_or_else(|| cwd.display().to_string()),
            }),
        };
    };

    let mut filled = false;
    if kind.needs_rig() && rig.is_none() {
        if let Some(r) = path_role.rig() {
            rig = Some(r.to_string());
            filled = true;
        }
    }
    if kind.needs_name() && name.is_none() {
        if let PathRole::Known(p) = &path_role {
            if p.kind() == kind {
                name = p.name().map(str::to_string);
                filled = name.is_some();
            }
        }
    }
    if filled && source == RoleSource::Env {
        source = RoleSource::EnvCwd;
    }

    let role = Role::from_parts(kind, rig.as_deref(), name.as_deref())
        .map_err(|missing| ResolveError::MissingComponent { role: kind, missing })?;
    if let Some(rig) = role.rig() {
        ws.warband(rig)?;
    }

    let mismatch = match path_role {
        PathRole::Known(p) if p != role => Some(p),
        _ => None,
    };
    if let Some(m) = &mismatch {
        tracing::debug!(resolved = %role, cwd_role = %m, "role/cwd mismatch");
    }

    Ok(RoleInfo {
        role,
        workspace_root: ws.root.clone(),
        work_dir: cwd.to_path_buf(),
        source,
        mismatch,
    })
}

/// Where the role's session starts.
pub fn home_dir(ws: &Workspace, role: &Role) -> PathBuf {
    ws.role_home(role)
}

/// Environment exported for the role.
pub fn env_for(ws: &Workspace, role: &Role, runtime: &RuntimeConfig) -> Vec<(String, String)> {
    hd_session::bridge::startup_env(role, &ws.root, runtime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hd_core::workspace::WarbandEntry;

    fn workspace() -> (tempfile::TempDir, Workspace) {
        let dir = tempfile::tempdir().unwrap();
        let mut ws = Workspace::init_layout(dir.path(), "camp", None).unwrap();
        for (rig, prefix) in [("horde", "gt"), ("relics", "bd")] {
            ws.register_warband(
                rig,
                WarbandEntry {
                    path: PathBuf::from(rig),
                    prefix: prefix.into(),
                    default_branch: "main".into(),
                    git_url: None,
                    added_at: None,
                },
            )
            .unwrap();
        }
        (dir, ws)
    }

    #[test]
    fn path_rules() {
        let (_d, ws) = workspace();
        let r = &ws.root;
        assert_eq!(detect_path_role(&ws, &r.join("warchief")), PathRole::Known(Role::Warchief));
        assert_eq!(
            detect_path_role(&ws, &r.join("horde/warchief/warband/src")),
            PathRole::Known(Role::Warchief)
        );
        assert_eq!(
            detect_path_role(&ws, &r.join("horde/forge/warband")),
            PathRole::Known(Role::Forge { rig: "horde".into() })
        );
        assert_eq!(
            detect_path_role(&ws, &r.join("relics/raiders/nux/warband/lib")),
            PathRole::Known(Role::Raider { rig: "relics".into(), name: "nux".into() })
        );
        assert_eq!(
            detect_path_role(&ws, &r.join("horde/clan/max/warband")),
            PathRole::Known(Role::Crew { rig: "horde".into(), name: "max".into() })
        );
        assert_eq!(detect_path_role(&ws, &r.join("horde/docs")), PathRole::InWarband("horde".into()));
        assert_eq!(detect_path_role(&ws, &r.join("elsewhere")), PathRole::Unscoped);
    }

    #[test]
    fn env_wins_and_reports_mismatch() {
        let (_d, ws) = workspace();
        let cwd = ws.root.join("horde/warchief/warband");
        let env = Env::from_pairs([("HD_ROLE", "shaman")]);
        let info = resolve(&ws, &cwd, &env, &Overrides::default()).unwrap();
        assert_eq!(info.role, Role::Shaman);
        assert_eq!(info.source, RoleSource::Env);
        assert_eq!(info.mismatch, Some(Role::Warchief));
    }

    #[test]
    fn env_gaps_are_filled_from_path() {
        let (_d, ws) = workspace();
        let cwd = ws.root.join("horde/raiders/nux/warband");
        let env = Env::from_pairs([("HD_ROLE", "raider")]);
        let info = resolve(&ws, &cwd, &env, &Overrides::default()).unwrap();
        assert_eq!(info.role, Role::Raider { rig: "horde".into(), name: "nux".into() });
        assert_eq!(info.source, RoleSource::EnvCwd);
        assert_eq!(info.mismatch, None);
    }

    #[test]
    fn crew_accepts_either_variable() {
        let (_d, ws) = workspace();
        for var in ["HD_CLAN", "HD_CREW"] {
            let env = Env::from_pairs([("HD_ROLE", "crew"), ("HD_WARBAND", "horde"), (var, "max")]);
            let info = resolve(&ws, &ws.root, &env, &Overrides::default()).unwrap();
            assert_eq!(info.role, Role::Crew { rig: "horde".into(), name: "max".into() });
            assert_eq!(info.source, RoleSource::Env);
        }
    }

    #[test]
    fn missing_pieces_are_named() {
        let (_d, ws) = workspace();
        let env = Env::from_pairs([("HD_ROLE", "raider")]);
        match resolve(&ws, &ws.root, &env, &Overrides::default()) {
            Err(ResolveError::MissingComponent { role, missing }) => {
                assert_eq!(role, RoleKind::Raider);
                assert_eq!(missing, vec!["warband", "name"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn cwd_only_and_ambiguous_paths() {
        let (_d, ws) = workspace();
        let env = Env::default();
        let info = resolve(&ws, &ws.root.join("horde/witness"), &env, &Overrides::default()).unwrap();
        assert_eq!(info.source, RoleSource::Cwd);
        assert!(matches!(
            resolve(&ws, &ws.root.join("horde/notes"), &env, &Overrides::default()),
            Err(ResolveError::AmbiguousPath { .. })
        ));
    }

    #[test]
    fn flags_override_everything() {
        let (_d, ws) = workspace();
        let env = Env::from_pairs([("HD_ROLE", "shaman")]);
        let flags = Overrides {
            role: Some(RoleKind::Forge),
            rig: Some("relics".into()),
            name: None,
        };
        let info = resolve(&ws, &ws.root.join("warchief"), &env, &flags).unwrap();
        assert_eq!(info.role, Role::Forge { rig: "relics".into() });
        assert_eq!(info.source, RoleSource::Flag);
        assert_eq!(info.mismatch, Some(Role::Warchief));
    }

    #[test]
    fn unregistered_warband_is_rejected() {
        let (_d, ws) = workspace();
        let env = Env::from_pairs([("HD_ROLE", "witness"), ("HD_WARBAND", "ghosts")]);
        assert!(matches!(
            resolve(&ws, &ws.root, &env, &Overrides::default()),
            Err(ResolveError::Workspace(WorkspaceError::UnknownWarband(_)))
        ));
    }

    #[test]
    fn workspace_root_falls_back_to_env() {
        let (_d, ws) = workspace();
        let gone = PathBuf::from("/nonexistent/hd/raiders/x");
        let env = Env::from_pairs([("HD_WORKSPACE_ROOT", ws.root.to_string_lossy().to_string())]);
        assert_eq!(locate_root(&gone, &env).unwrap(), ws.root);
        assert!(matches!(
            locate_root(&gone, &Env::default()),
            Err(ResolveError::NotInWorkspace(_))
        ));
    }
}
