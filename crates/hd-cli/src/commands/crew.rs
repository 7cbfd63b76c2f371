use hd_agents::crew;

use super::{describe_start, yes_no, Invocation};

pub fn add(inv: &Invocation, rig: &str, name: &str) -> anyhow::Result<()> {
    let ctx = inv.context()?;
    let (role, wt) = crew::add(&ctx, rig, name)?;
    println!("Crew member {role} ready");
    println!("  worktree: {}", wt.path.display());
    println!("  branch: {}", wt.branch);
    Ok(())
}

pub async fn start(inv: &Invocation, rig: &str, name: &str) -> anyhow::Result<()> {
    let ctx = inv.context()?;
    let (session, outcome) = crew::start(&ctx, rig, name).await?;
    println!("{session}: {}", describe_start(&outcome));
    Ok(())
}

pub fn stop(inv: &Invocation, rig: &str, name: &str) -> anyhow::Result<()> {
    let ctx = inv.context()?;
    if crew::stop(&ctx, rig, name)? {
        println!("Stopped {rig}/{name}");
    } else {
        println!("{rig}/{name} was not running");
    }
    Ok(())
}

pub async fn at(inv: &Invocation, rig: &str, name: &str) -> anyhow::Result<()> {
    let ctx = inv.context()?;
    let session = crew::at(&ctx, rig, name).await?;
    tracing::debug!(%session, "detached");
    Ok(())
}

pub async fn restart(inv: &Invocation, rig: &str, name: &str) -> anyhow::Result<()> {
    let ctx = inv.context()?;
    let (session, outcome) = crew::restart(&ctx, rig, name).await?;
    println!("{session}: {}", describe_start(&outcome));
    Ok(())
}

pub fn list(inv: &Invocation, rig: Option<&str>) -> anyhow::Result<()> {
    let ctx = inv.context()?;
    let members = crew::list(&ctx, rig)?;
    if members.is_empty() {
        println!("No crew.");
        return Ok(());
    }
    println!("{:<28} {:<8} {:<14} BRANCH", "CREW", "RUNNING", "HOOK");
    println!("{}", "-".repeat(72));
    for m in members {
        println!(
            "{:<28} {:<8} {:<14} {}",
            m.role.identity(),
            yes_no(m.running),
            m.hook.as_deref().unwrap_or("-"),
            m.branch.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

pub fn remove(inv: &Invocation, rig: &str, name: &str, force: bool) -> anyhow::Result<()> {
    let ctx = inv.context()?;
    crew::remove(&ctx, rig, name, force)?;
    println!("Crew member {rig}/{name} removed");
    Ok(())
}

pub fn refresh(inv: &Invocation, rig: &str, name: &str, note: Option<&str>) -> anyhow::Result<()> {
    let ctx = inv.context()?;
    crew::refresh(&ctx, rig, name, note)?;
    println!("Refreshed {rig}/{name}; handoff left in its inbox");
    Ok(())
}

pub fn rename(inv: &Invocation, rig: &str, from: &str, to: &str) -> anyhow::Result<()> {
    let ctx = inv.context()?;
    let role = crew::rename(&ctx, rig, from, to)?;
    println!("Renamed {rig}/{from} to {role}");
    Ok(())
}

pub fn pristine(inv: &Invocation, rig: &str, name: &str) -> anyhow::Result<()> {
    let ctx = inv.context()?;
    crew::pristine(&ctx, rig, name)?;
    println!("{rig}/{name} is up to date");
    Ok(())
}

pub fn status(inv: &Invocation, rig: &str, name: &str) -> anyhow::Result<()> {
    let ctx = inv.context()?;
    let st = crew::status(&ctx, rig, name)?;
    println!("{}", st.info.role);
    println!("{}", "-".repeat(40));
    println!("  session: {} ({})", st.session, if st.info.running { "running" } else { "stopped" });
    println!("  path: {}", st.info.path.display());
    println!("  branch: {}", st.info.branch.as_deref().unwrap_or("-"));
    println!("  hook: {}", st.info.hook.as_deref().unwrap_or("-"));
    println!("  worktree: {}", st.cleanup);
    println!("  last commit: {}", st.last_commit.as_deref().unwrap_or("-"));
    println!("  unread drums: {}", st.unread);
    Ok(())
}
