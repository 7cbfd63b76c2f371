//! Themed raider names.

use hd_session::naming::validate_agent_name;

const WASTELAND: &[&str] = &[
    "nux", "slit", "ace", "toast", "capable", "dag", "cheedo", "angharad", "rictus", "morsov",
    "keeper", "valkyrie", "furiosa", "scrotus", "corpus", "glory", "miss_giddy", "organic",
    "bullet", "ripper",
];

const MINERALS: &[&str] = &[
    "basalt", "cobalt", "flint", "garnet", "jasper", "obsidian", "onyx", "pyrite", "quartz",
    "shale", "slate", "topaz",
];

/// Names for a theme. Unknown themes fall back to `wasteland`.
pub fn theme_names(theme: &str) -> &'static [&'static str] {
    match theme {
        "minerals" => MINERALS,
        _ => WASTELAND,
    }
}

/// First free name of the theme; once exhausted, `<first>-<n>`.
pub fn allocate(theme: &str, taken: &[String]) -> Result<String, String> {
    let names = theme_names(theme);
    let free = |n: &str| !taken.iter().any(|t| t == n);
    if let Some(name) = names.iter().copied().find(|n| free(n)) {
        validate_agent_name(name)?;
        return Ok(name.to_string());
    }
    let base = names.first().copied().unwrap_or("raider");
    let name = (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|n| free(n))
        .unwrap_or_else(|| format!("{base}-x"));
    validate_agent_name(&name)?;
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_taken_names() {
        let taken = vec!["nux".to_string(), "slit".to_string()];
        assert_eq!(allocate("wasteland", &taken).unwrap(), "ace");
    }

    #[test]
    fn exhausted_theme_gets_numbered() {
        let mut taken = theme_names("minerals")
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>();
        assert_eq!(allocate("minerals", &taken).unwrap(), "basalt-2");
        taken.push("basalt-2".into());
        assert_eq!(allocate("minerals", &taken).unwrap(), "basalt-3");
    }

    #[test]
    fn every_theme_name_is_valid() {
        for theme in ["wasteland", "minerals"] {
            for name in theme_names(theme) {
                assert!(validate_agent_name(name).is_ok(), "{name}");
            }
        }
    }
}
