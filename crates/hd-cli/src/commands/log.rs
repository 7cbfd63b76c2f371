use chrono::{DateTime, Utc};
use hd_core::events::{Event, EventKind, EventQuery};
use hd_core::watch::LogWatcher;

use super::Invocation;

/// Parse `--since`/`--until`: an RFC 3339 timestamp, or an age such as
/// `90s`, `15m`, `2h`, `3d` counted back from `now`.
pub fn parse_time(raw: &str, now: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    let bad = || anyhow::anyhow!("invalid time {raw:?}: use RFC 3339 or an age like 30m, 2h, 1d");
    let unit = raw.chars().last().ok_or_else(bad)?;
    let amount: i64 = raw[..raw.len() - unit.len_utf8()].parse().map_err(|_| bad())?;
    let age = match unit {
        's' => chrono::Duration::seconds(amount),
        'm' => chrono::Duration::minutes(amount),
        'h' => chrono::Duration::hours(amount),
        'd' => chrono::Duration::days(amount),
        _ => return Err(bad()),
    };
    Ok(now - age)
}

pub fn query_from(
    kinds: Vec<EventKind>,
    actor: Option<String>,
    since: Option<&str>,
    until: Option<&str>,
    limit: Option<usize>,
) -> anyhow::Result<EventQuery> {
    let now = Utc::now();
    Ok(EventQuery {
        kinds,
        actor_prefix: actor,
        since: since.map(|s| parse_time(s, now)).transpose()?,
        until: until.map(|s| parse_time(s, now)).transpose()?,
        limit,
    })
}

fn render(event: &Event) -> String {
    format!(
        "{} {:<16} {:<28} {}",
        event.timestamp.format("%Y-%m-%d %H:%M:%S"),
        event.kind,
        event.actor,
        event.detail
    )
}

pub fn show(inv: &Invocation, query: &EventQuery) -> anyhow::Result<()> {
    let ctx = inv.context()?;
    for event in ctx.events.query(query)? {
        println!("{}", render(&event));
    }
    Ok(())
}

/// Print the matching backlog, then new events until interrupted.
pub async fn follow(inv: &Invocation, query: &EventQuery) -> anyhow::Result<()> {
    let ctx = inv.context()?;
    let mut follower = ctx.events.follower();
    let mut watcher = LogWatcher::new(ctx.events.path())?;
    for event in ctx.events.query(query)? {
        println!("{}", render(&event));
    }

    let live = EventQuery {
        limit: None,
        ..query.clone()
    };
    let print_new = |follower: &mut hd_core::events::EventFollower| -> anyhow::Result<()> {
        for event in follower.poll()?.into_iter().filter(|e| live.matches(e)) {
            println!("{}", render(&event));
        }
        Ok(())
    };
    // Lines written before the watcher was armed.
    print_new(&mut follower)?;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = watcher.changed() => {
                if changed.is_none() {
                    tracing::warn!("log watcher stopped");
                    break;
                }
                print_new(&mut follower)?;
            }
        }
    }
    Ok(())
}

/// Append an event by hand; used by patrol scripts.
pub fn emit(inv: &Invocation, kind: EventKind, detail: &str) -> anyhow::Result<()> {
    let ctx = inv.context()?;
    ctx.events.append(&Event::new(kind, ctx.actor(), detail))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ages_count_back_from_now() {
        let now = Utc::now();
        assert_eq!(parse_time("15m", now).expect("age"), now - chrono::Duration::minutes(15));
        assert_eq!(parse_time("2d", now).expect("age"), now - chrono::Duration::days(2));
    }

    #[test]
    fn timestamps_are_taken_as_given() {
        let now = Utc::now();
        let t = parse_time("2026-01-02T03:04:05Z", now).expect("rfc3339");
        assert_eq!(t.to_rfc3339(), "2026-01-02T03:04:05+00:00");
    }

    #[test]
    fn junk_is_refused() {
        let now = Utc::now();
        for raw in ["", "m", "10w", "yesterday"] {
            assert!(parse_time(raw, now).is_err(), "{raw}");
        }
    }

    #[test]
    fn queries_carry_every_filter() {
        let q = query_from(vec![EventKind::Crash], Some("horde/".into()), Some("1h"), None, Some(3)).expect("query");
        assert_eq!(q.kinds, vec![EventKind::Crash]);
        assert_eq!(q.actor_prefix.as_deref(), Some("horde/"));
        assert!(q.since.is_some());
        assert!(q.until.is_none());
        assert_eq!(q.limit, Some(3));
    }

    #[test]
    fn rendered_lines_lead_with_the_time() {
        let e = Event::new(EventKind::Spawn, "horde/raiders/nux", "gt-horde-nux");
        let line = render(&e);
        assert!(line.contains("spawn"));
        assert!(line.ends_with("gt-horde-nux"));
    }
}
