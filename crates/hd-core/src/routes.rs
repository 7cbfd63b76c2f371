//! Prefix → ledger routing table (`<root>/.relics/routes`, JSONL).

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::ids::Ref;
use crate::workspace::LEDGER_DIR;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Id prefix including the trailing hyphen (`gt-`, `hq-cv-`).
    pub prefix: String,
    /// Directory relative to the encampment root; `.` is HQ.
    pub path: String,
}

impl Route {
    pub fn new(prefix: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            path: path.into(),
        }
    }

    /// Directory whose `.relics/` holds this route's ledger.
    pub fn ledger_root(&self, workspace_root: &Path) -> PathBuf {
        if self.path == "." || self.path.is_empty() {
            workspace_root.to_path_buf()
        } else {
            workspace_root.join(&self.path)
        }
    }

    pub fn ledger_dir(&self, workspace_root: &Path) -> PathBuf {
        self.ledger_root(workspace_root).join(LEDGER_DIR)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("no route for {0:?}; is the warband registered? (see `hd rig add`)")]
    UnknownPrefix(String),

    #[error("corrupt routes file {path} at line {line}: {message}")]
    CorruptRoutes {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("route prefix {0:?} already exists")]
    Duplicate(String),

    #[error("invalid route prefix {0:?}: must end with '-'")]
    InvalidPrefix(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// In-memory view of the routes file, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    path: PathBuf,
    routes: Vec<Route>,
}

impl RouteTable {
    /// Load the table. A missing file is an empty table.
    pub fn load(path: &Path) -> Result<Self, RouteError> {
        let mut routes = Vec::new();
        match std::fs::read_to_string(path) {
            Ok(text) => {
                for (idx, line) in text.lines().enumerate() {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    let route: Route =
                        serde_json::from_str(line).map_err(|e| RouteError::CorruptRoutes {
                            path: path.to_path_buf(),
                            line: idx + 1,
                            message: e.to_string(),
                        })?;
                    routes.push(route);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(Self {
            path: path.to_path_buf(),
            routes,
        })
    }

    pub fn from_routes(routes: Vec<Route>) -> Self {
        Self {
            path: PathBuf::new(),
            routes,
        }
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Longest matching prefix wins; among equal lengths the earliest entry.
    pub fn resolve(&self, id: &str) -> Result<&Route, RouteError> {
        let mut best: Option<&Route> = None;
        for route in &self.routes {
            if !id.starts_with(&route.prefix) {
                continue;
            }
            if best.is_none_or(|b| route.prefix.len() > b.prefix.len()) {
                best = Some(route);
            }
        }
        best.ok_or_else(|| RouteError::UnknownPrefix(id.to_string()))
    }

    /// Route for a reference. External refs route by their declared prefix
    /// first, falling back to the id itself.
    pub fn resolve_ref(&self, r: &Ref) -> Result<&Route, RouteError> {
        match r {
            Ref::Local(id) => self.resolve(id),
            Ref::External { prefix, id } => self
                .routes
                .iter()
                .find(|route| &route.prefix == prefix)
                .map_or_else(|| self.resolve(id), Ok),
        }
    }

    /// Append a route, persisting it as one JSON line.
    pub fn append(&mut self, route: Route) -> Result<(), RouteError> {
        if !route.prefix.ends_with('-') || route.prefix.len() < 2 {
            return Err(RouteError::InvalidPrefix(route.prefix));
        }
        if self.routes.iter().any(|r| r.prefix == route.prefix) {
            return Err(RouteError::Duplicate(route.prefix));
        }
        let mut line = serde_json::to_string(&route).map_err(std::io::Error::other)?;
        line.push('\n');
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        tracing::debug!(prefix = %route.prefix, path = %route.path, "route appended");
        self.routes.push(route);
        Ok(())
    }
}
