use hd_agents::raiders;

use super::{format_age, yes_no, Invocation};

pub fn list(inv: &Invocation, rig: Option<&str>) -> anyhow::Result<()> {
    let ctx = inv.context()?;
    let raiders = raiders::list(&ctx, rig)?;
    if raiders.is_empty() {
        println!("No raiders.");
        return Ok(());
    }
    println!("{:<28} {:<8} {:<14} BRANCH", "RAIDER", "RUNNING", "HOOK");
    println!("{}", "-".repeat(72));
    for r in raiders {
        println!(
            "{:<28} {:<8} {:<14} {}",
            r.role.identity(),
            yes_no(r.running),
            r.hook.as_deref().unwrap_or("-"),
            r.branch.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

pub fn add(inv: &Invocation, rig: &str, name: Option<&str>) -> anyhow::Result<()> {
    let ctx = inv.context()?;
    let (role, wt) = raiders::add(&ctx, rig, name)?;
    println!("Raider {role} ready");
    println!("  worktree: {}", wt.path.display());
    println!("  branch: {} (from {})", wt.branch, wt.base_branch);
    Ok(())
}

pub fn remove(inv: &Invocation, rig: &str, name: &str, force: bool) -> anyhow::Result<()> {
    let ctx = inv.context()?;
    raiders::remove(&ctx, rig, name, force)?;
    println!("Raider {rig}/{name} removed");
    Ok(())
}

pub fn nuke(inv: &Invocation, rig: &str, name: &str, force: bool) -> anyhow::Result<()> {
    let ctx = inv.context()?;
    let out = raiders::nuke(&ctx, rig, name, force)?;
    println!("Raider {rig}/{name} nuked");
    if out.session_killed {
        println!("  session killed");
    }
    if let Some(branch) = &out.branch_deleted {
        println!("  branch deleted: {branch}");
    }
    if let Some(item) = &out.released {
        println!("  released: {item}");
    }
    if out.record_deleted {
        println!("  record deleted");
    }
    Ok(())
}

pub fn check_recovery(inv: &Invocation, rig: &str, name: &str) -> anyhow::Result<()> {
    let ctx = inv.context()?;
    let recovery = raiders::check_recovery(&ctx, rig, name)?;
    if recovery.is_safe() {
        println!("{}: safe to nuke", recovery.role);
        return Ok(());
    }
    println!("{}: needs recovery", recovery.role);
    for reason in recovery.reasons() {
        println!("  - {reason}");
    }
    anyhow::bail!("{} has work that would be lost", recovery.role)
}

pub fn git_state(inv: &Invocation, rig: &str, name: &str) -> anyhow::Result<()> {
    let ctx = inv.context()?;
    let st = raiders::git_state(&ctx, rig, name)?;
    println!("Branch: {} (base {})", st.branch, st.base);
    println!("{}", "-".repeat(40));
    println!("  ahead/behind: {}/{}", st.ahead, st.behind);
    println!("  stashes: {}", st.stashes);
    println!("  last commit: {}", st.last_commit.as_deref().unwrap_or("-"));
    println!("  cleanup: {}", st.cleanup);
    if !st.modified.is_empty() {
        println!("  modified:");
        for file in &st.modified {
            println!("    {file}");
        }
    }
    Ok(())
}

pub fn stale(inv: &Invocation, rig: Option<&str>) -> anyhow::Result<()> {
    let ctx = inv.context()?;
    let stale = raiders::stale(&ctx, rig)?;
    if stale.is_empty() {
        println!("No stale raiders.");
        return Ok(());
    }
    for s in stale {
        println!("{:<28} idle {}", s.role.identity(), format_age(s.age));
    }
    Ok(())
}

pub fn gc(inv: &Invocation, rig: &str, dry_run: bool) -> anyhow::Result<()> {
    let ctx = inv.context()?;
    let branches = raiders::gc(&ctx, rig, dry_run)?;
    let verb = if dry_run { "would delete" } else { "deleted" };
    if branches.is_empty() {
        println!("No orphaned raider branches in {rig}.");
    }
    for branch in branches {
        println!("{verb} {branch}");
    }
    Ok(())
}
