//! Encampment and warband setup.

use std::path::Path;

use chrono::Utc;
use hd_core::ledger::{LedgerFactory, Ledgers};
use hd_core::routes::{Route, RouteTable};
use hd_core::types::Role;
use hd_core::workspace::{validate_warband_name, WarbandEntry, Workspace, HQ_PREFIX, WORKTREE_DIR};

use crate::context::HordeContext;
use crate::error::{HordeError, Result};
use crate::records::RecordStore;

pub struct Installed {
    pub ws: Workspace,
    pub ledgers: Ledgers,
}

/// Lay out a new encampment at `root`, initialise the HQ ledger and its
/// route, and create the Warchief and Shaman records.
pub fn install(
    root: &Path,
    name: &str,
    owner: Option<String>,
    factory: LedgerFactory,
    parallelism: usize,
) -> Result<Installed> {
    std::fs::create_dir_all(root)?;
    let ws = Workspace::init_layout(root, name, owner)?;
    let routes = RouteTable::load(&ws.routes_path())?;
    let ledgers = Ledgers::new(root, routes, factory, parallelism);
    ledgers.hq().init(HQ_PREFIX)?;
    ledgers.append_route(Route::new(format!("{HQ_PREFIX}-"), "."))?;

    let records = RecordStore::new(&ws, &ledgers);
    for role in [Role::Warchief, Role::Shaman] {
        records.ensure(&role)?;
    }
    tracing::info!(root = %root.display(), name, "encampment installed");
    Ok(Installed { ws, ledgers })
}

/// Identifier prefix derived from a warband name: the initials of its
/// `_`-separated words, or its first two characters.
pub fn derive_prefix(name: &str) -> String {
    let words = name.split('_').filter(|w| !w.is_empty()).collect::<Vec<_>>();
    let prefix = if words.len() > 1 {
        words.iter().filter_map(|w| w.chars().next()).collect::<String>()
    } else {
        name.chars().filter(char::is_ascii_alphanumeric).take(2).collect()
    };
    prefix.to_ascii_lowercase()
}

fn validate_prefix(prefix: &str) -> Result<()> {
    let ok = !prefix.is_empty()
        && prefix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if !ok {
        return Err(HordeError::preflight(
            format!("invalid prefix {prefix:?}"),
            "use lowercase letters and digits, e.g. --prefix gt",
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RigOptions {
    pub prefix: Option<String>,
    pub branch: Option<String>,
}

/// Register a warband: clone it, initialise its ledger and route, and
/// create its Witness and Forge records.
pub fn rig_add(ctx: &mut HordeContext, name: &str, url: &str, opts: &RigOptions) -> Result<WarbandEntry> {
    validate_warband_name(name)?;
    if ctx.ws.is_warband(name) {
        return Err(HordeError::preflight(
            format!("warband {name} already exists"),
            "pick another name",
        ));
    }
    let prefix = opts.prefix.clone().unwrap_or_else(|| derive_prefix(name));
    validate_prefix(&prefix)?;
    if prefix == HQ_PREFIX || ctx.ws.warbands.rigs.values().any(|w| w.prefix == prefix) {
        return Err(HordeError::preflight(
            format!("prefix {prefix} is already taken"),
            "choose one with --prefix",
        ));
    }

    let canonical = ctx.ws.canonical_clone(name);
    if let Some(parent) = canonical.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let git = ctx.git();
    git.clone_repo(url, &canonical)?;
    let default_branch = opts
        .branch
        .clone()
        .or_else(|| git.remote_default_branch(&canonical))
        .unwrap_or_else(|| "main".to_string());

    let rig_dir = ctx.ws.rig_dir(name);
    for dir in [
        ctx.ws.raiders_dir(name),
        ctx.ws.clan_dir(name),
        rig_dir.join("witness"),
        rig_dir.join("forge").join(WORKTREE_DIR),
    ] {
        std::fs::create_dir_all(dir)?;
    }

    let entry = WarbandEntry {
        path: name.into(),
        prefix: prefix.clone(),
        default_branch,
        git_url: Some(url.to_string()),
        added_at: Some(Utc::now()),
    };
    ctx.ws.register_warband(name, entry.clone())?;
    ctx.ledgers.at(&rig_dir).init(&prefix)?;
    ctx.ledgers.append_route(Route::new(format!("{prefix}-"), name))?;

    let records = ctx.records();
    for role in [
        Role::Witness { rig: name.to_string() },
        Role::Forge { rig: name.to_string() },
    ] {
        records.ensure(&role)?;
    }
    tracing::info!(warband = name, %prefix, branch = %entry.default_branch, "warband added");
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_from_names() {
        assert_eq!(derive_prefix("horde"), "ho");
        assert_eq!(derive_prefix("gas_town"), "gt");
        assert_eq!(derive_prefix("x"), "x");
    }

    #[test]
    fn prefixes_are_validated() {
        assert!(validate_prefix("gt").is_ok());
        assert!(validate_prefix("g-t").is_err());
        assert!(validate_prefix("").is_err());
    }
}
