use hd_agents::callback;

use super::Invocation;

/// tmux `pane-died` hook target. Quiet unless something goes wrong.
pub fn pane_died(inv: &Invocation, session: &str, code: i32) -> anyhow::Result<()> {
    let ctx = inv.context()?;
    let out = callback::pane_died(&ctx, session, code)?;
    tracing::debug!(agent = %out.role, event = %out.event, restarted = out.restarted, "pane-died handled");
    Ok(())
}
