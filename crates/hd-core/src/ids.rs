//! Identifier helpers: cross-ledger references, prefixes, agent-record ids.

use std::fmt;

use uuid::Uuid;

use crate::types::Role;

/// Wire marker for references that live in another ledger.
pub const EXTERNAL_MARKER: &str = "external:";

/// A work-item reference as it appears on a dependency edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ref {
    Local(String),
    External { prefix: String, id: String },
}

impl Ref {
    /// Parse a raw edge target. Anything that is not a well-formed
    /// `external:<prefix>:<id>` is treated as local.
    pub fn parse(raw: &str) -> Ref {
        let raw = raw.trim();
        if let Some(rest) = raw.strip_prefix(EXTERNAL_MARKER) {
            if let Some((prefix, id)) = rest.split_once(':') {
                if !prefix.is_empty() && !id.is_empty() {
                    return Ref::External {
                        prefix: prefix.to_string(),
                        id: id.to_string(),
                    };
                }
            }
        }
        Ref::Local(raw.to_string())
    }

    /// Encode `id` as a reference from a ledger whose own prefix is
    /// `home_prefix`. Ids from other ledgers become `external:` refs.
    pub fn for_target(id: &str, home_prefix: &str) -> Ref {
        match id_prefix(id) {
            Some(p) if p != home_prefix => Ref::External {
                prefix: p.to_string(),
                id: id.to_string(),
            },
            _ => Ref::Local(id.to_string()),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Ref::Local(id) => id,
            Ref::External { id, .. } => id,
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, Ref::External { .. })
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ref::Local(id) => f.write_str(id),
            Ref::External { prefix, id } => write!(f, "{EXTERNAL_MARKER}{prefix}:{id}"),
        }
    }
}

/// The leading `<alnum>-` segment of an id, hyphen included (`gt-abc` → `gt-`).
pub fn id_prefix(id: &str) -> Option<&str> {
    let idx = id.find('-')?;
    let head = &id[..idx];
    if head.is_empty() || !head.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(&id[..=idx])
}

/// Canonical agent-record id: `<prefix>-<warband?>-<role>-<name?>`.
///
/// `hq_prefix` is used for workspace-level roles, `rig_prefix` for the rest.
/// Both are given without a trailing hyphen.
pub fn agent_record_id(role: &Role, hq_prefix: &str, rig_prefix: &str) -> String {
    match role {
        Role::Warchief => format!("{hq_prefix}-warchief"),
        Role::Shaman => format!("{hq_prefix}-shaman"),
        Role::Witness { rig } => format!("{rig_prefix}-{rig}-witness"),
        Role::Forge { rig } => format!("{rig_prefix}-{rig}-forge"),
        Role::Raider { rig, name } => format!("{rig_prefix}-{rig}-raider-{name}"),
        Role::Crew { rig, name } => format!("{rig_prefix}-{rig}-crew-{name}"),
    }
}

/// For a step id of the form `<base>.<n>` (n a positive integer) return
/// the parent totem id.
pub fn totem_of_step(id: &str) -> Option<&str> {
    let (base, n) = id.rsplit_once('.')?;
    if base.is_empty() || n.is_empty() || !n.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    match n.parse::<u64>() {
        Ok(v) if v > 0 => Some(base),
        _ => None,
    }
}

/// Short lowercase base36 token derived from a fresh UUID.
pub fn short_token(len: usize) -> String {
    let mut n = Uuid::new_v4().as_u128();
    let mut out = String::with_capacity(len);
    for _ in 0..len {
        let d = (n % 36) as u32;
        n /= 36;
        out.push(std::char::from_digit(d, 36).unwrap_or('0'));
    }
    out
}

/// Lowercase base36 rendering used for branch timestamps.
pub fn base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(std::char::from_digit((n % 36) as u32, 36).unwrap_or('0'));
        n /= 36;
    }
    digits.iter().rev().collect()
}
