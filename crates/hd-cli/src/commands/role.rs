use hd_agents::resolver::{self, Overrides, PathRole};
use hd_core::types::{Role, RoleKind};
use hd_session::bridge::shell_quote;

use super::Invocation;

pub fn home(inv: &Invocation, identity: Option<&str>, overrides: &Overrides) -> anyhow::Result<()> {
    let ctx = inv.context()?;
    let role = match identity {
        Some(id) => Role::from_identity(id)?,
        None => ctx.whoami(overrides)?.role,
    };
    println!("{}", resolver::home_dir(&ctx.ws, &role).display());
    Ok(())
}

/// `eval "$(hd role env)"`
pub fn env(inv: &Invocation, overrides: &Overrides) -> anyhow::Result<()> {
    let ctx = inv.context()?;
    let role = ctx.whoami(overrides)?.role;
    for (key, value) in resolver::env_for(&ctx.ws, &role, &ctx.config.runtime) {
        println!("export {key}={}", shell_quote(&value));
    }
    Ok(())
}

pub fn detect(inv: &Invocation) -> anyhow::Result<()> {
    let ctx = inv.context()?;
    match resolver::detect_path_role(&ctx.ws, &ctx.cwd) {
        PathRole::Known(role) => println!("{role}"),
        PathRole::InWarband(rig) => println!("unknown (inside warband {rig})"),
        PathRole::Unscoped => println!("unknown"),
    }
    Ok(())
}

pub fn show(inv: &Invocation, overrides: &Overrides) -> anyhow::Result<()> {
    let ctx = inv.context()?;
    let info = ctx.whoami(overrides)?;
    println!("{}", info.role);
    println!("{}", "-".repeat(40));
    println!("  kind: {}", info.role.kind());
    println!("  source: {}", info.source);
    println!("  encampment: {}", info.workspace_root.display());
    println!("  home: {}", ctx.ws.role_home(&info.role).display());
    println!("  session: {}", ctx.session_name(&info.role)?);
    if let Some(other) = &info.mismatch {
        eprintln!("warning: the working directory belongs to {other}");
    }
    Ok(())
}

pub fn list() -> anyhow::Result<()> {
    for kind in RoleKind::ALL {
        println!("{:<10} {}", kind.as_str(), kind.describe());
    }
    Ok(())
}
