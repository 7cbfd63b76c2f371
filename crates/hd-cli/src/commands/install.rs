use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use hd_agents::install::{self, RigOptions};
use hd_core::ledger::rl_factory;
use hd_core::runner::{CommandRunner, SystemRunner};
use hd_core::version;

use super::Invocation;

async fn require_ledger(inv: &Invocation) -> anyhow::Result<()> {
    let cfg = &inv.config.ledger;
    let required = cfg.min_version()?;
    let found = version::detect(&cfg.binary, Duration::from_secs(cfg.version_timeout_secs))
        .await
        .map_err(|e| anyhow::anyhow!("{} is not usable: {e}", cfg.binary))?;
    if found < required {
        anyhow::bail!(
            "{} {found} is too old (need {required})\n  hint: upgrade the ledger tool",
            cfg.binary
        );
    }
    Ok(())
}

pub async fn install(inv: &Invocation, path: &Path, name: Option<String>, owner: Option<String>) -> anyhow::Result<()> {
    require_ledger(inv).await?;
    let root = if path.is_absolute() {
        path.to_path_buf()
    } else {
        inv.cwd.join(path)
    };
    let name = match name {
        Some(name) => name,
        None => root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow::anyhow!("cannot derive a name from {}; pass --name", root.display()))?,
    };

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
    let factory = rl_factory(&inv.config.ledger.binary, runner);
    let installed = install::install(&root, &name, owner, factory, inv.config.ledger.parallelism)?;

    println!("Encampment {} installed at {}", installed.ws.name(), root.display());
    println!("  next: hd rig add <name> <git-url>");
    Ok(())
}

pub async fn rig_add(
    inv: &Invocation,
    name: &str,
    url: &str,
    prefix: Option<String>,
    branch: Option<String>,
) -> anyhow::Result<()> {
    let mut ctx = inv.ledger_context().await?;
    let entry = install::rig_add(&mut ctx, name, url, &RigOptions { prefix, branch })?;
    println!("Warband {name} added");
    println!("  prefix: {}-", entry.prefix);
    println!("  branch: {}", entry.default_branch);
    Ok(())
}

pub fn rig_list(inv: &Invocation) -> anyhow::Result<()> {
    let ctx = inv.context()?;
    let rigs = &ctx.ws.warbands.rigs;
    if rigs.is_empty() {
        println!("No warbands. Add one with `hd rig add <name> <git-url>`.");
        return Ok(());
    }
    println!("{:<20} {:<8} {:<12} URL", "WARBAND", "PREFIX", "BRANCH");
    println!("{}", "-".repeat(64));
    for (name, entry) in rigs {
        println!(
            "{:<20} {:<8} {:<12} {}",
            name,
            format!("{}-", entry.prefix),
            entry.default_branch,
            entry.git_url.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
