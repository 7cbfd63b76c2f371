use hd_agents::raid::{self, NewRaid, RaidStatus};

use super::{format_age, Invocation};

fn print_status(st: &RaidStatus) {
    println!("{} {} [{}] {}", st.raid.id, st.raid.title, st.raid.status, st.progress());
    println!("{}", "-".repeat(60));
    for item in &st.items {
        let worker = match (&item.worker, item.idle) {
            (Some(w), Some(idle)) => format!("  {w} (idle {})", format_age(idle)),
            (Some(w), None) => format!("  {w}"),
            _ => String::new(),
        };
        println!("  {} {:<14} {}{worker}", item.symbol(), item.id, item.title);
    }
}

pub async fn create(inv: &Invocation, spec: &NewRaid) -> anyhow::Result<()> {
    let ctx = inv.ledger_context().await?;
    let created = raid::create(&ctx, spec).await?;
    println!("Raid {} created: {}", created.id, created.title);
    println!("  tracking: {}", spec.items.join(", "));
    Ok(())
}

pub async fn add(inv: &Invocation, raid_id: &str, items: &[String]) -> anyhow::Result<()> {
    let ctx = inv.ledger_context().await?;
    let out = raid::add(&ctx, raid_id, items)?;
    if out.reopened {
        println!("Raid {raid_id} reopened");
    }
    if out.added.is_empty() {
        println!("Nothing new to track");
    } else {
        println!("Now tracking: {}", out.added.join(", "));
    }
    Ok(())
}

pub async fn close(inv: &Invocation, raid_id: &str, reason: Option<&str>, notify: Option<&str>) -> anyhow::Result<()> {
    let ctx = inv.ledger_context().await?;
    if raid::close(&ctx, raid_id, reason, notify)? {
        println!("Raid {raid_id} closed");
    } else {
        println!("Raid {raid_id} was already closed");
    }
    Ok(())
}

pub async fn status(inv: &Invocation, raid_id: &str) -> anyhow::Result<()> {
    let ctx = inv.ledger_context().await?;
    let st = raid::status(&ctx, raid_id).await?;
    print_status(&st);
    Ok(())
}

pub async fn list(inv: &Invocation, include_closed: bool) -> anyhow::Result<()> {
    let ctx = inv.ledger_context().await?;
    let raids = raid::list(&ctx, include_closed).await?;
    if raids.is_empty() {
        println!("No raids.");
        return Ok(());
    }
    println!("{:<16} {:<8} {:<8} TITLE", "RAID", "STATUS", "DONE");
    println!("{}", "-".repeat(64));
    for st in raids {
        println!(
            "{:<16} {:<8} {:<8} {}",
            st.raid.id,
            st.raid.status.to_string(),
            st.progress(),
            st.raid.title
        );
    }
    Ok(())
}

pub async fn check(inv: &Invocation) -> anyhow::Result<()> {
    let ctx = inv.ledger_context().await?;
    let landed = raid::check(&ctx).await?;
    if landed.is_empty() {
        println!("No raids landed.");
    }
    for l in landed {
        println!("Raid {} landed", l.raid_id);
        if !l.notified.is_empty() {
            println!("  notified: {}", l.notified.join(", "));
        }
    }
    Ok(())
}

pub async fn stranded(inv: &Invocation) -> anyhow::Result<()> {
    let ctx = inv.ledger_context().await?;
    let stranded = raid::stranded(&ctx).await?;
    if stranded.is_empty() {
        println!("No stranded raids.");
    }
    for s in stranded {
        println!("{} {}", s.raid.id, s.raid.title);
        for item in s.ready {
            println!("  ready: {} {}", item.id, item.title);
        }
    }
    Ok(())
}
