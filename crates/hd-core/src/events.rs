//! Append-only lifecycle log (`<root>/logs/encampment.log`).
//!
//! One event per line: `<rfc3339 timestamp> <kind> <actor> <detail>`.

use std::fmt;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Spawn,
    Wake,
    Nudge,
    Handoff,
    Done,
    Crash,
    Kill,
    Callback,
    PatrolStarted,
    RaiderChecked,
    RaiderNudged,
    EscalationSent,
    PatrolComplete,
}

impl EventKind {
    pub const ALL: [EventKind; 13] = [
        EventKind::Spawn,
        EventKind::Wake,
        EventKind::Nudge,
        EventKind::Handoff,
        EventKind::Done,
        EventKind::Crash,
        EventKind::Kill,
        EventKind::Callback,
        EventKind::PatrolStarted,
        EventKind::RaiderChecked,
        EventKind::RaiderNudged,
        EventKind::EscalationSent,
        EventKind::PatrolComplete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Spawn => "spawn",
            EventKind::Wake => "wake",
            EventKind::Nudge => "nudge",
            EventKind::Handoff => "handoff",
            EventKind::Done => "done",
            EventKind::Crash => "crash",
            EventKind::Kill => "kill",
            EventKind::Callback => "callback",
            EventKind::PatrolStarted => "patrol_started",
            EventKind::RaiderChecked => "raider_checked",
            EventKind::RaiderNudged => "raider_nudged",
            EventKind::EscalationSent => "escalation_sent",
            EventKind::PatrolComplete => "patrol_complete",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        EventKind::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| format!("unknown event kind: {s}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub actor: String,
    pub detail: String,
}

impl Event {
    pub fn new(kind: EventKind, actor: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            actor: actor.into(),
            detail: detail.into(),
        }
    }

    /// Render as one log line (without the trailing newline).
    pub fn to_line(&self) -> String {
        let actor = if self.actor.trim().is_empty() {
            "-".to_string()
        } else {
            self.actor.split_whitespace().collect::<Vec<_>>().join("_")
        };
        let detail = self.detail.split_whitespace().collect::<Vec<_>>().join(" ");
        let ts = self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
        if detail.is_empty() {
            format!("{ts} {} {actor}", self.kind)
        } else {
            format!("{ts} {} {actor} {detail}", self.kind)
        }
    }

    pub fn parse_line(line: &str) -> Option<Self> {
        let mut parts = line.trim_end().splitn(4, ' ');
        let timestamp = DateTime::parse_from_rfc3339(parts.next()?).ok()?.with_timezone(&Utc);
        let kind = parts.next()?.parse().ok()?;
        let actor = parts.next()?.to_string();
        let detail = parts.next().unwrap_or_default().to_string();
        Some(Self {
            timestamp,
            kind,
            actor,
            detail,
        })
    }
}

/// Filter for [`EventLog::query`]. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub kinds: Vec<EventKind>,
    pub actor_prefix: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// Keep only the last `n` matches.
    pub limit: Option<usize>,
}

impl EventQuery {
    pub fn matches(&self, event: &Event) -> bool {
        (self.kinds.is_empty() || self.kinds.contains(&event.kind))
            && self
                .actor_prefix
                .as_deref()
                .is_none_or(|p| event.actor.starts_with(p))
            && self.since.is_none_or(|t| event.timestamp >= t)
            && self.until.is_none_or(|t| event.timestamp <= t)
    }
}

#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event as a single write.
    pub fn append(&self, event: &Event) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut line = event.to_line();
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }

    /// Convenience for best-effort callers: failures are logged, not returned.
    pub fn emit(&self, kind: EventKind, actor: &str, detail: &str) {
        if let Err(e) = self.append(&Event::new(kind, actor, detail)) {
            tracing::warn!(kind = %kind, actor, error = %e, "failed to append lifecycle event");
        }
    }

    pub fn read_all(&self) -> std::io::Result<Vec<Event>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        Ok(parse_lines(&text))
    }

    pub fn query(&self, query: &EventQuery) -> std::io::Result<Vec<Event>> {
        let mut events: Vec<Event> = self
            .read_all()?
            .into_iter()
            .filter(|e| query.matches(e))
            .collect();
        if let Some(n) = query.limit {
            let skip = events.len().saturating_sub(n);
            events.drain(..skip);
        }
        Ok(events)
    }

    /// Tail reader starting at the current end of the log.
    pub fn follower(&self) -> EventFollower {
        let offset = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        EventFollower {
            path: self.path.clone(),
            offset,
            pending: String::new(),
        }
    }
}

fn parse_lines(text: &str) -> Vec<Event> {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| {
            let parsed = Event::parse_line(l);
            if parsed.is_none() {
                tracing::debug!(line = l, "skipping malformed lifecycle line");
            }
            parsed
        })
        .collect()
}

/// Polls the log for lines appended since the last poll.
#[derive(Debug)]
pub struct EventFollower {
    path: PathBuf,
    offset: u64,
    pending: String,
}

impl EventFollower {
    pub fn poll(&mut self) -> std::io::Result<Vec<Event>> {
        let mut file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let len = file.metadata()?.len();
        if len < self.offset {
            // Truncated or rotated; start over.
            self.offset = 0;
            self.pending.clear();
        }
        file.seek(SeekFrom::Start(self.offset))?;
        let mut buf = String::new();
        let read = file.read_to_string(&mut buf)?;
        self.offset += read as u64;
        self.pending.push_str(&buf);

        // Only hand out complete lines.
        let Some(cut) = self.pending.rfind('\n') else {
            return Ok(Vec::new());
        };
        let complete: String = self.pending.drain(..=cut).collect();
        Ok(parse_lines(&complete))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn line_roundtrip() {
        let e = Event::new(EventKind::RaiderChecked, "horde/witness", "nux idle 12m");
        let line = e.to_line();
        let back = Event::parse_line(&line).unwrap();
        assert_eq!(back.kind, EventKind::RaiderChecked);
        assert_eq!(back.actor, "horde/witness");
        assert_eq!(back.detail, "nux idle 12m");
        assert_eq!(back.timestamp.timestamp_millis(), e.timestamp.timestamp_millis());
    }

    #[test]
    fn multiline_detail_is_flattened() {
        let e = Event::new(EventKind::Crash, "", "exit 1\npanic at foo");
        let line = e.to_line();
        assert!(!line.contains('\n'));
        assert_eq!(Event::parse_line(&line).unwrap().actor, "-");
    }

    #[test]
    fn all_thirteen_kinds_parse() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
        assert!("reboot".parse::<EventKind>().is_err());
    }

    #[test]
    fn query_filters_kind_actor_and_window() {
        let tmp = tempfile::tempdir().unwrap();
        let log = EventLog::new(tmp.path().join("logs/encampment.log"));
        let mut old = Event::new(EventKind::Spawn, "horde/raiders/nux", "gt-abc");
        old.timestamp = Utc::now() - Duration::hours(3);
        log.append(&old).unwrap();
        log.append(&Event::new(EventKind::Done, "horde/raiders/nux", "COMPLETED")).unwrap();
        log.append(&Event::new(EventKind::Spawn, "relics/raiders/toast", "bd-1")).unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(log.path())
            .unwrap()
            .write_all(b"garbage line\n")
            .unwrap();

        assert_eq!(log.read_all().unwrap().len(), 3);
        let spawns = log
            .query(&EventQuery {
                kinds: vec![EventKind::Spawn],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(spawns.len(), 2);
        let horde = log
            .query(&EventQuery {
                actor_prefix: Some("horde/".into()),
                since: Some(Utc::now() - Duration::hours(1)),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(horde.len(), 1);
        assert_eq!(horde[0].kind, EventKind::Done);
        let last = log
            .query(&EventQuery {
                limit: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(last[0].actor, "relics/raiders/toast");
    }

    #[test]
    fn follower_sees_only_new_complete_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let log = EventLog::new(tmp.path().join("encampment.log"));
        log.emit(EventKind::Wake, "shaman", "boot");
        let mut follower = log.follower();
        assert!(follower.poll().unwrap().is_empty());

        log.emit(EventKind::Nudge, "warchief", "horde/raiders/nux");
        let partial = Event::new(EventKind::Kill, "horde/raiders/nux", "").to_line();
        std::fs::OpenOptions::new()
            .append(true)
            .open(log.path())
            .unwrap()
            .write_all(partial.as_bytes())
            .unwrap();
        let seen = follower.poll().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, EventKind::Nudge);

        std::fs::OpenOptions::new()
            .append(true)
            .open(log.path())
            .unwrap()
            .write_all(b"\n")
            .unwrap();
        assert_eq!(follower.poll().unwrap()[0].kind, EventKind::Kill);
    }
}
