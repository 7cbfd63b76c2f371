//! The startup beacon: a single line handed to the runtime as its first
//! prompt so it can discover who it is and why it was started.
//!
//! ```text
//! hd-beacon recipient=horde/raiders/nux sender=human topic=assigned hook=gt-abc
//! ```

use std::fmt;

const TAG: &str = "hd-beacon";

pub const TOPIC_START: &str = "start";
pub const TOPIC_RESTART: &str = "restart";
pub const TOPIC_ASSIGNED: &str = "assigned";
pub const TOPIC_REFRESH: &str = "refresh";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Beacon {
    pub recipient: String,
    pub sender: String,
    pub topic: String,
    /// Work item on the recipient's hook at start, if any.
    pub hook: Option<String>,
}

impl Beacon {
    pub fn new(recipient: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            sender: "human".into(),
            topic: topic.into(),
            hook: None,
        }
    }

    pub fn with_hook(mut self, hook: impl Into<String>) -> Self {
        self.hook = Some(hook.into());
        self
    }

    /// Same recipient and hook, different topic.
    pub fn retopic(&self, topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            ..self.clone()
        }
    }

    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        if words.next()? != TAG {
            return None;
        }
        let (mut recipient, mut sender, mut topic, mut hook) = (None, None, None, None);
        for word in words {
            let (key, value) = word.split_once('=')?;
            match key {
                "recipient" => recipient = Some(value.to_string()),
                "sender" => sender = Some(value.to_string()),
                "topic" => topic = Some(value.to_string()),
                "hook" => hook = Some(value.to_string()),
                // Unknown keys from newer writers are ignored.
                _ => {}
            }
        }
        Some(Self {
            recipient: recipient?,
            sender: sender?,
            topic: topic?,
            hook,
        })
    }
}

/// Values are single words; interior whitespace becomes `_`.
fn word(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join("_")
}

impl fmt::Display for Beacon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{TAG} recipient={} sender={} topic={}",
            word(&self.recipient),
            word(&self.sender),
            word(&self.topic)
        )?;
        if let Some(hook) = &self.hook {
            write!(f, " hook={}", word(hook))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_one_line() {
        let b = Beacon::new("horde/raiders/nux", TOPIC_ASSIGNED).with_hook("gt-abc");
        assert_eq!(
            b.to_string(),
            "hd-beacon recipient=horde/raiders/nux sender=human topic=assigned hook=gt-abc"
        );
        assert!(!b.to_string().contains('\n'));
    }

    #[test]
    fn parse_reads_rendered_form() {
        let b = Beacon::new("warchief/", TOPIC_START);
        assert_eq!(Beacon::parse(&b.to_string()), Some(b.clone()));
        let r = b.retopic(TOPIC_RESTART);
        assert_eq!(Beacon::parse(&r.to_string()).unwrap().topic, "restart");
    }

    #[test]
    fn parse_rejects_foreign_lines() {
        assert_eq!(Beacon::parse("hello world"), None);
        assert_eq!(Beacon::parse("hd-beacon recipient=x"), None);
        assert_eq!(Beacon::parse("hd-beacon recipient=x sender=human topic"), None);
    }

    #[test]
    fn whitespace_in_values_is_flattened() {
        let b = Beacon::new("horde/clan/max", "needs review");
        assert!(b.to_string().ends_with("topic=needs_review"));
    }
}
