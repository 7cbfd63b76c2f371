//! Status-bar colours so operators can tell sessions apart at a glance.

use hd_core::types::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    pub name: &'static str,
    pub bg: &'static str,
    pub fg: &'static str,
}

impl Theme {
    pub fn status_style(&self) -> String {
        format!("bg={},fg={}", self.bg, self.fg)
    }
}

pub const PALETTE: &[Theme] = &[
    Theme { name: "rust", bg: "#8b3a1a", fg: "#f5e6d3" },
    Theme { name: "chrome", bg: "#4a4f57", fg: "#e8e8e8" },
    Theme { name: "sand", bg: "#c2a878", fg: "#1e1a14" },
    Theme { name: "oil", bg: "#1f2a30", fg: "#c8d3d9" },
    Theme { name: "flame", bg: "#b8461b", fg: "#fff4e0" },
    Theme { name: "sage", bg: "#55624d", fg: "#eef2e8" },
    Theme { name: "dust", bg: "#7a6a58", fg: "#f2ede6" },
    Theme { name: "storm", bg: "#3c3f63", fg: "#e4e6ff" },
];

pub const WARCHIEF_THEME: Theme = Theme { name: "warchief", bg: "#5c0a0a", fg: "#ffd700" };
pub const SHAMAN_THEME: Theme = Theme { name: "shaman", bg: "#2d1b4e", fg: "#d8c8ff" };

pub fn by_name(name: &str) -> Option<Theme> {
    PALETTE
        .iter()
        .chain([&WARCHIEF_THEME, &SHAMAN_THEME])
        .find(|t| t.name == name)
        .copied()
}

/// FNV-1a; stable across releases unlike `DefaultHasher`.
fn stable_hash(s: &str) -> u64 {
    s.bytes().fold(0xcbf29ce484222325, |h, b| {
        (h ^ b as u64).wrapping_mul(0x100000001b3)
    })
}

/// Theme for a role. `configured` is `session.theme`: `auto` picks per
/// warband, any palette name forces that theme for warband sessions.
pub fn for_role(role: &Role, configured: &str) -> Theme {
    match role {
        Role::Warchief => WARCHIEF_THEME,
        Role::Shaman => SHAMAN_THEME,
        _ => {
            if let Some(t) = by_name(configured) {
                return t;
            }
            let rig = role.rig().unwrap_or_default();
            PALETTE[(stable_hash(rig) % PALETTE.len() as u64) as usize]
        }
    }
}

/// Left status text: `[<identity>]`.
pub fn status_left(role: &Role) -> String {
    format!("[{}] ", role.identity())
}
