use std::path::{Path, PathBuf};

use hd_agents::resolver::Overrides;
use hd_agents::HordeContext;
use hd_core::checkpoint::Checkpoint;

use super::Invocation;

/// Fill in what git and the agent record already know.
fn capture(ctx: &HordeContext, worktree: &Path, cp: &mut Checkpoint) {
    let git = ctx.git();
    cp.branch = git.current_branch(worktree).ok();
    cp.last_commit = git.last_commit(worktree).ok().map(|c| c.trim().to_string());
    cp.modified_files = git.modified_files(worktree).unwrap_or_default();
    cp.session_id = ctx.env.get("HD_SESSION_ID").map(str::to_string);
    if let Ok(info) = ctx.whoami(&Overrides::default()) {
        cp.hooked_bead = ctx.records().hook_of(&info.role).ok().flatten();
    }
}

/// The caller's worktree, or the working directory for roles without one.
fn worktree(ctx: &HordeContext) -> anyhow::Result<PathBuf> {
    let info = ctx.whoami(&Overrides::default())?;
    let home = ctx.ws.role_home(&info.role);
    Ok(if home.is_dir() { home } else { info.work_dir })
}

pub fn write(
    inv: &Invocation,
    notes: Option<String>,
    molecule: Option<String>,
    step: Option<String>,
    step_title: Option<String>,
) -> anyhow::Result<()> {
    let ctx = inv.context()?;
    let dir = worktree(&ctx)?;
    let mut cp = Checkpoint {
        molecule_id: molecule,
        current_step: step,
        step_title,
        notes,
        ..Checkpoint::new()
    };
    capture(&ctx, &dir, &mut cp);
    let path = cp.write(&dir)?;
    println!("Checkpoint written to {}", path.display());
    println!("  {}", cp.summary());
    Ok(())
}

pub fn read(inv: &Invocation) -> anyhow::Result<()> {
    let ctx = inv.context()?;
    let dir = worktree(&ctx)?;
    let Some(cp) = Checkpoint::read(&dir)? else {
        println!("No checkpoint in {}", dir.display());
        return Ok(());
    };
    println!("{}", cp.summary());
    if cp.is_stale(ctx.config.checkpoint.max_age_hours) {
        println!("  (stale: older than {}h)", ctx.config.checkpoint.max_age_hours);
    }
    if let Some(molecule) = &cp.molecule_id {
        println!("  molecule: {molecule}");
    }
    if let Some(commit) = &cp.last_commit {
        println!("  last commit: {commit}");
    }
    for file in &cp.modified_files {
        println!("  modified: {file}");
    }
    if let Some(notes) = &cp.notes {
        println!();
        println!("{notes}");
    }
    Ok(())
}

pub fn clear(inv: &Invocation) -> anyhow::Result<()> {
    let ctx = inv.context()?;
    let dir = worktree(&ctx)?;
    if Checkpoint::clear(&dir)? {
        println!("Checkpoint cleared");
    } else {
        println!("No checkpoint to clear");
    }
    Ok(())
}
