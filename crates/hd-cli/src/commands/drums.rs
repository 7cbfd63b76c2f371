use hd_agents::HordeContext;
use hd_core::drums::Message;

use super::Invocation;

fn own_address(ctx: &HordeContext, address: Option<&str>) -> String {
    address.map_or_else(|| ctx.actor(), str::to_string)
}

pub fn send(inv: &Invocation, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
    let ctx = inv.context()?;
    let msg = Message::new(to, &ctx.actor(), subject, body);
    let id = ctx.drums.send(&msg)?;
    println!("Sent {id} to {to}");
    Ok(())
}

pub fn inbox(inv: &Invocation, address: Option<&str>, unread_only: bool, quiet: bool) -> anyhow::Result<()> {
    let ctx = inv.context()?;
    let address = own_address(&ctx, address);
    if quiet {
        let unread = ctx.drums.unread_count(&address)?;
        if unread > 0 {
            println!("You have {unread} unread drum(s). Run `hd drums inbox`.");
        }
        return Ok(());
    }

    let messages = ctx.drums.inbox(&address, unread_only)?;
    if messages.is_empty() {
        println!("No drums for {address}.");
        return Ok(());
    }
    println!("Inbox: {address}");
    println!("{}", "-".repeat(60));
    for m in messages {
        let marker = if m.read { " " } else { "*" };
        println!(
            "{marker} {} {} {:<24} {}",
            m.id,
            m.created_at.format("%Y-%m-%d %H:%M"),
            m.from,
            m.subject
        );
    }
    Ok(())
}

pub fn read(inv: &Invocation, id: &str, address: Option<&str>) -> anyhow::Result<()> {
    let ctx = inv.context()?;
    let address = own_address(&ctx, address);
    let m = ctx.drums.read(&address, id)?;
    println!("From: {}", m.from);
    println!("To: {}", m.to);
    println!("Date: {}", m.created_at.to_rfc3339());
    println!("Subject: {}", m.subject);
    if !m.body.is_empty() {
        println!();
        println!("{}", m.body);
    }
    Ok(())
}
