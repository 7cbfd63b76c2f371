//! Identity ↔ session-name mapping.
//!
//! | Role     | Session name                 |
//! |----------|------------------------------|
//! | Warchief | `<hq>-warchief`              |
//! | Shaman   | `<hq>-shaman`                |
//! | Witness  | `<prefix>-<rig>-witness`     |
//! | Forge    | `<prefix>-<rig>-forge`       |
//! | Raider   | `<prefix>-<rig>-<name>`      |
//! | Crew     | `<prefix>-<rig>-clan-<name>` |
//!
//! Warband names carry no hyphens and raider names avoid the service words,
//! which keeps the mapping injective.

use hd_core::types::Role;
use hd_core::workspace::{Workspace, WorkspaceError, HQ_PREFIX};

/// Names a raider may not take: they would shadow service sessions or
/// directories.
pub const RESERVED_RAIDER_NAMES: &[&str] = &[
    "witness", "forge", "warchief", "shaman", "clan", "raiders", "refinery",
];

pub fn format_session_name(role: &Role, hq_prefix: &str, rig_prefix: &str) -> String {
    match role {
        Role::Warchief => format!("{hq_prefix}-warchief"),
        Role::Shaman => format!("{hq_prefix}-shaman"),
        Role::Witness { rig } => format!("{rig_prefix}-{rig}-witness"),
        Role::Forge { rig } => format!("{rig_prefix}-{rig}-forge"),
        Role::Raider { rig, name } => format!("{rig_prefix}-{rig}-{name}"),
        Role::Crew { rig, name } => format!("{rig_prefix}-{rig}-clan-{name}"),
    }
}

/// Session name for `role` in this encampment.
pub fn session_name(ws: &Workspace, role: &Role) -> Result<String, WorkspaceError> {
    let rig_prefix = match role.rig() {
        Some(rig) => ws.rig_prefix(rig)?,
        None => HQ_PREFIX,
    };
    Ok(format_session_name(role, HQ_PREFIX, rig_prefix))
}

/// Inverse of [`format_session_name`] given the known `(rig, prefix)` pairs.
pub fn parse_session_name(name: &str, hq_prefix: &str, rigs: &[(String, String)]) -> Option<Role> {
    if let Some(rest) = name.strip_prefix(hq_prefix).and_then(|r| r.strip_prefix('-')) {
        match rest {
            "warchief" => return Some(Role::Warchief),
            "shaman" => return Some(Role::Shaman),
            _ => {}
        }
    }
    for (rig, prefix) in rigs {
        let head = format!("{prefix}-{rig}-");
        let Some(rest) = name.strip_prefix(&head) else {
            continue;
        };
        let role = match rest {
            "" => continue,
            "witness" => Role::Witness { rig: rig.clone() },
            "forge" => Role::Forge { rig: rig.clone() },
            _ => match rest.strip_prefix("clan-") {
                Some(crew) if !crew.is_empty() => Role::Crew {
                    rig: rig.clone(),
                    name: crew.to_string(),
                },
                Some(_) => continue,
                None => Role::Raider {
                    rig: rig.clone(),
                    name: rest.to_string(),
                },
            },
        };
        return Some(role);
    }
    None
}

/// Parse a session name using the encampment's warband registry.
pub fn parse_in_workspace(ws: &Workspace, name: &str) -> Option<Role> {
    let rigs = ws
        .warbands
        .rigs
        .iter()
        .map(|(rig, w)| (rig.clone(), w.prefix.clone()))
        .collect::<Vec<_>>();
    parse_session_name(name, HQ_PREFIX, &rigs)
}

/// Raider and crew names: `[a-z0-9_-]+`, not reserved, not `clan-*`.
pub fn validate_agent_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name must not be empty".into());
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
    {
        return Err(format!(
            "invalid name {name:?}: only lowercase letters, digits, '_' and '-' are allowed"
        ));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(format!("invalid name {name:?}: must not start or end with '-'"));
    }
    if RESERVED_RAIDER_NAMES.contains(&name) {
        return Err(format!("{name:?} is a reserved name"));
    }
    if name.starts_with("clan-") {
        return Err(format!("{name:?} would collide with crew session names"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn rigs() -> Vec<(String, String)> {
        vec![
            ("horde".to_string(), "gt".to_string()),
            ("relics".to_string(), "bd".to_string()),
        ]
    }

    fn sample_roles() -> Vec<Role> {
        let mut roles = vec![Role::Warchief, Role::Shaman];
        for rig in ["horde", "relics"] {
            roles.push(Role::Witness { rig: rig.into() });
            roles.push(Role::Forge { rig: rig.into() });
            for name in ["nux", "toast", "slit-2", "max"] {
                roles.push(Role::Raider {
                    rig: rig.into(),
                    name: name.into(),
                });
                roles.push(Role::Crew {
                    rig: rig.into(),
                    name: name.into(),
                });
            }
        }
        roles
    }

    fn prefix_of(rig: Option<&str>) -> &'static str {
        match rig {
            Some("horde") => "gt",
            Some("relics") => "bd",
            _ => "hq",
        }
    }

    #[test]
    fn table_matches_layout() {
        let raider = Role::Raider {
            rig: "horde".into(),
            name: "nux".into(),
        };
        assert_eq!(format_session_name(&raider, "hq", "gt"), "gt-horde-nux");
        assert_eq!(
            format_session_name(
                &Role::Crew {
                    rig: "horde".into(),
                    name: "max".into()
                },
                "hq",
                "gt"
            ),
            "gt-horde-clan-max"
        );
        assert_eq!(format_session_name(&Role::Warchief, "hq", "gt"), "hq-warchief");
    }

    #[test]
    fn session_names_are_injective() {
        let mut seen = HashSet::new();
        for role in sample_roles() {
            let name = format_session_name(&role, "hq", prefix_of(role.rig()));
            assert!(seen.insert(name.clone()), "duplicate session name {name}");
        }
    }

    #[test]
    fn parse_inverts_format() {
        for role in sample_roles() {
            let name = format_session_name(&role, "hq", prefix_of(role.rig()));
            assert_eq!(parse_session_name(&name, "hq", &rigs()), Some(role));
        }
        assert_eq!(parse_session_name("gt-other-nux", "hq", &rigs()), None);
        assert_eq!(parse_session_name("gt-horde-", "hq", &rigs()), None);
        assert_eq!(parse_session_name("random", "hq", &rigs()), None);
    }

    #[test]
    fn reserved_names_are_rejected() {
        assert!(validate_agent_name("nux").is_ok());
        assert!(validate_agent_name("slit-2").is_ok());
        for bad in ["witness", "forge", "clan", "clan-max", "", "Nux", "-x", "a b"] {
            assert!(validate_agent_name(bad).is_err(), "{bad:?} accepted");
        }
    }
}
