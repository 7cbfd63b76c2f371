use hd_agents::done::{self, DoneOptions};
use hd_agents::hook::{self, ChargeOptions};
use hd_core::types::Role;

use super::{describe_start, Invocation};

pub async fn charge(inv: &Invocation, item: &str, target: Option<&str>, opts: &ChargeOptions) -> anyhow::Result<()> {
    let ctx = inv.ledger_context().await?;
    let target = hook::parse_target(&ctx.ws, target)?;
    let out = hook::charge(&ctx, item, target, opts).await?;

    if out.unchanged {
        println!("{} is already on {}'s hook", out.item_id, out.role);
        return Ok(());
    }
    println!("Charged {} to {}", out.item_id, out.role);
    if out.spawned {
        println!("  spawned: {}", out.role);
    }
    match (&out.started, out.nudged) {
        (Some(started), _) => println!("  session: {} ({})", out.session, describe_start(started)),
        (None, true) => println!("  session: {} (nudged)", out.session),
        (None, false) => println!("  session: not started"),
    }
    Ok(())
}

pub async fn unsling(inv: &Invocation, item: Option<&str>, target: Option<&str>, force: bool) -> anyhow::Result<()> {
    let ctx = inv.ledger_context().await?;
    let role = target.map(Role::from_identity).transpose()?;
    let out = hook::unsling(&ctx, item, role, force)?;
    println!("Released {} from {}", out.item_id, out.role);
    if out.reverted {
        println!("  {} is open again", out.item_id);
    }
    Ok(())
}

pub async fn done(inv: &Invocation, opts: &DoneOptions) -> anyhow::Result<()> {
    let ctx = inv.ledger_context().await?;
    let out = done::done(&ctx, opts)?;
    for warning in &out.warnings {
        eprintln!("warning: {warning}");
    }

    println!("Done: {}", opts.exit);
    println!("  branch: {}", out.branch);
    if let Some(issue) = &out.issue {
        println!("  issue: {issue}");
    }
    if let Some(mr) = &out.mr_id {
        let note = if out.mr_reused { " (existing)" } else { "" };
        println!("  merge request: {mr}{note}");
    }
    if let Some(status) = out.cleanup_status {
        println!("  worktree: {status}");
    }
    if out.nuked {
        println!("  raider worktree removed");
    }
    Ok(())
}
