//! Conversation transcript
//!
//! Ordered log of the messages exchanged in this session. The snapshot of
//! this log is what gets sent back to the conversation service each turn.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Who authored a transcript entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    User,
    Assistant,
    /// Only present in histories returned by the service
    System,
    /// Only present in histories returned by the service
    Tool,
    /// Any other role the service uses, kept verbatim
    Other(String),
}

impl From<String> for Role {
    fn from(role: String) -> Self {
        match role.as_str() {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "system" => Role::System,
            "tool" => Role::Tool,
            _ => Role::Other(role),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Other(role) => role,
            known => known.to_string(),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
            Role::Tool => write!(f, "tool"),
            Role::Other(role) => write!(f, "{}", role),
        }
    }
}

/// How the message body travelled on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum BodyForm {
    #[default]
    Text,
    Content,
    /// `"content": null`, as on assistant tool-call messages
    NullContent,
    /// No string body; anything else stays in `extra`
    Absent,
}

/// A single transcript entry
///
/// Entries that came from the service keep every field they arrived with,
/// so a replaced history goes back out exactly as received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireEntry", into = "WireEntry")]
pub struct Entry {
    pub role: Role,
    pub text: String,
    form: BodyForm,
    /// Fields not interpreted here (`tool_calls`, `tool_call_id`, `name`, ...)
    extra: Map<String, Value>,
}

impl Entry {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            form: BodyForm::Text,
            extra: Map::new(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }
}

#[derive(Serialize, Deserialize)]
struct WireEntry {
    role: Role,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl From<WireEntry> for Entry {
    fn from(wire: WireEntry) -> Self {
        let mut extra = wire.fields;
        let (text, form) = match extra.remove("text") {
            Some(Value::String(text)) => (text, BodyForm::Text),
            Some(Value::Null) => (String::new(), BodyForm::Text),
            Some(other) => {
                extra.insert("text".to_string(), other);
                (String::new(), BodyForm::Absent)
            }
            None => match extra.remove("content") {
                Some(Value::String(text)) => (text, BodyForm::Content),
                Some(Value::Null) => (String::new(), BodyForm::NullContent),
                Some(other) => {
                    extra.insert("content".to_string(), other);
                    (String::new(), BodyForm::Absent)
                }
                None => (String::new(), BodyForm::Absent),
            },
        };

        Self {
            role: wire.role,
            text,
            form,
            extra,
        }
    }
}

impl From<Entry> for WireEntry {
    fn from(entry: Entry) -> Self {
        let mut fields = entry.extra;
        let body = match entry.form {
            BodyForm::Text => Some(("text", Value::String(entry.text))),
            BodyForm::Content => Some(("content", Value::String(entry.text))),
            BodyForm::NullContent if entry.text.is_empty() => Some(("content", Value::Null)),
            BodyForm::NullContent => Some(("content", Value::String(entry.text))),
            BodyForm::Absent if entry.text.is_empty() => None,
            BodyForm::Absent => Some(("text", Value::String(entry.text))),
        };
        if let Some((key, value)) = body {
            fields.insert(key.to_string(), value);
        }

        Self {
            role: entry.role,
            fields,
        }
    }
}

/// Append-only transcript, replaced wholesale when the service returns
/// an authoritative history
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<Entry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry at the tail
    pub fn append(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    /// Swap the whole sequence
    pub fn replace(&mut self, entries: Vec<Entry>) {
        self.entries = entries;
    }

    /// Current sequence by value, for outbound requests
    pub fn snapshot(&self) -> Vec<Entry> {
        self.entries.clone()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_keeps_order() {
        let mut transcript = Transcript::new();
        transcript.append(Entry::user("one"));
        transcript.append(Entry::assistant("two"));
        transcript.append(Entry::user("three"));

        let texts: Vec<_> = transcript.entries().iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut transcript = Transcript::new();
        transcript.append(Entry::user("hello"));

        let snapshot = transcript.snapshot();
        transcript.append(Entry::assistant("Hi."));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(transcript.len(), 2);
    }

    #[test]
    fn test_replace_swaps_everything() {
        let mut transcript = Transcript::new();
        transcript.append(Entry::user("stale"));
        transcript.replace(vec![Entry::user("a"), Entry::assistant("b")]);

        assert_eq!(transcript.entries(), &[Entry::user("a"), Entry::assistant("b")]);
    }

    #[test]
    fn test_entry_accepts_content_and_null() {
        let json = r#"[
            {"role":"system","content":"You are helpful."},
            {"role":"assistant","content":null},
            {"role":"user","text":"hi"}
        ]"#;
        let entries: Vec<Entry> = serde_json::from_str(json).unwrap();

        assert_eq!(entries[0].role, Role::System);
        assert_eq!(entries[0].text, "You are helpful.");
        assert_eq!(entries[1].text, "");
        assert_eq!(entries[2], Entry::user("hi"));
    }

    #[test]
    fn test_unknown_role_is_kept() {
        let entry: Entry = serde_json::from_str(r#"{"role":"developer","content":"x"}"#).unwrap();
        assert_eq!(entry.role, Role::Other("developer".into()));
        assert_eq!(entry.text, "x");

        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"role":"developer","content":"x"}"#);
    }

    #[test]
    fn test_service_history_goes_back_unchanged() {
        let history = serde_json::json!([
            {"role": "user", "content": "run it"},
            {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "run_automation", "arguments": "{}"}
                }]
            },
            {"role": "tool", "tool_call_id": "call_1", "name": "run_automation", "content": "{\"ok\":true}"}
        ]);

        let entries: Vec<Entry> = serde_json::from_value(history.clone()).unwrap();
        assert_eq!(entries[1].text, "");
        assert_eq!(entries[2].role, Role::Tool);
        assert_eq!(entries[2].text, r#"{"ok":true}"#);

        assert_eq!(serde_json::to_value(&entries).unwrap(), history);
    }

    #[test]
    fn test_entry_serializes_as_text() {
        let json = serde_json::to_string(&Entry::assistant("Hi.")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","text":"Hi."}"#);
    }
}
