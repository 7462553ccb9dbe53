// snapshot.rs: SnapshotProducer, the inspectable view of live request state.
//
// Each refresh rebuilds the entry list in a fixed order:
//   1. built-in `request` / `response` entries (when initialized)
//   2. every ambient context variable present at that instant
//   3. one entry per watched name, resolved against live state
//
// A watched name that cannot be resolved yields an unset entry. The policy may
// simply not have reached the assertion that defines it yet.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::context::{EnforcementContext, MessageState, VariableValue};

pub const REQUEST: &str = "request";
pub const RESPONSE: &str = "response";

const UNSET_TYPE: &str = "unset";

/// One row of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableEntry {
    pub name: String,
    /// Stringified value; `None` when the variable is unset.
    pub value: Option<String>,
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<VariableEntry>,
    /// Added through a watch request rather than built in.
    pub user_added: bool,
}

impl VariableEntry {
    /// Placeholder for a watched name that has no value (yet).
    pub fn unset(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            data_type: UNSET_TYPE.to_string(),
            children: Vec::new(),
            user_added: true,
        }
    }

    pub fn from_value(name: impl Into<String>, value: &VariableValue, user_added: bool) -> Self {
        let name = name.into();
        match value {
            VariableValue::Message(message) => Self::from_message(name, message, user_added),
            VariableValue::List(items) => Self {
                value: Some(format!("{} items", items.len())),
                data_type: value.type_name().to_string(),
                children: items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| Self::from_value(index.to_string(), item, user_added))
                    .collect(),
                name,
                user_added,
            },
            scalar => Self::scalar(name, scalar_text(scalar), scalar.type_name(), user_added),
        }
    }

    /// Expand a message into its fixed sub-fields.
    pub fn from_message(name: impl Into<String>, message: &MessageState, user_added: bool) -> Self {
        let mut children = vec![
            match &message.content_type {
                Some(content_type) => {
                    Self::scalar("contentType", content_type.clone(), "string", user_added)
                }
                None => Self {
                    user_added,
                    ..Self::unset("contentType")
                },
            },
            Self::scalar("size", message.body.len().to_string(), "integer", user_added),
            Self::scalar("mainpart", message.body.clone(), "string", user_added),
        ];
        if !message.headers.is_empty() {
            children.push(Self {
                name: "headers".to_string(),
                value: Some(format!("{} items", message.headers.len())),
                data_type: "list".to_string(),
                children: message
                    .headers
                    .iter()
                    .map(|(header, value)| Self::scalar(header.clone(), value.clone(), "string", user_added))
                    .collect(),
                user_added,
            });
        }
        if let Some(status) = message.status {
            children.push(Self::scalar("status", status.to_string(), "integer", user_added));
        }

        Self {
            name: name.into(),
            value: Some(
                message
                    .content_type
                    .clone()
                    .unwrap_or_else(|| "message".to_string()),
            ),
            data_type: "message".to_string(),
            children,
            user_added,
        }
    }

    fn scalar(name: impl Into<String>, value: String, data_type: &str, user_added: bool) -> Self {
        Self {
            name: name.into(),
            value: Some(value),
            data_type: data_type.to_string(),
            children: Vec::new(),
            user_added,
        }
    }

    pub fn is_unset(&self) -> bool {
        self.value.is_none() && self.data_type == UNSET_TYPE
    }

    pub fn child(&self, name: &str) -> Option<&VariableEntry> {
        self.children.iter().find(|c| c.name == name)
    }

    fn descend(self, segments: &str) -> Option<VariableEntry> {
        let mut current = self;
        for segment in segments.split('.') {
            let index = current.children.iter().position(|c| c.name == segment)?;
            current = current.children.swap_remove(index);
        }
        Some(current)
    }

    fn mark_user_added(&mut self) {
        self.user_added = true;
        for child in &mut self.children {
            child.mark_user_added();
        }
    }
}

fn scalar_text(value: &VariableValue) -> String {
    match value {
        VariableValue::Text(s) => s.clone(),
        VariableValue::Integer(i) => i.to_string(),
        VariableValue::Decimal(d) => d.to_string(),
        VariableValue::Boolean(b) => b.to_string(),
        VariableValue::Timestamp(t) => t.to_rfc3339(),
        VariableValue::Bytes(bytes) => bytes.iter().map(|b| format!("{:02x}", b)).collect(),
        // Composites are expanded by the caller.
        VariableValue::List(_) | VariableValue::Message(_) => String::new(),
    }
}

/// Builds and holds the current snapshot of a debug session.
#[derive(Debug, Clone, Default)]
pub struct SnapshotProducer {
    entries: Vec<VariableEntry>,
}

impl SnapshotProducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[VariableEntry] {
        &self.entries
    }

    /// Entry with the given name. Watched rows shadow ambient ones.
    pub fn get(&self, name: &str) -> Option<&VariableEntry> {
        self.entries.iter().rev().find(|e| e.name == name)
    }

    /// Replace the snapshot with the live state of `ctx`.
    pub fn update(&mut self, ctx: &dyn EnforcementContext, watched: &BTreeSet<String>) {
        let mut entries = Vec::new();

        if let Some(request) = ctx.request() {
            entries.push(VariableEntry::from_message(REQUEST, request, false));
        }
        if let Some(response) = ctx.response() {
            entries.push(VariableEntry::from_message(RESPONSE, response, false));
        }

        for (name, value) in ctx.variables() {
            entries.push(VariableEntry::from_value(name, value, false));
        }

        for name in watched {
            let entry = resolve(ctx, name).unwrap_or_else(|| VariableEntry::unset(name.as_str()));
            entries.push(entry);
        }

        self.entries = entries;
    }

    /// Clear everything except placeholders for the watched names.
    pub fn reset(&mut self, watched: &BTreeSet<String>) {
        self.entries = watched
            .iter()
            .map(|name| VariableEntry::unset(name.as_str()))
            .collect();
    }

    /// Add a placeholder row for a newly watched name until the next refresh.
    pub fn add_watched(&mut self, name: &str) {
        if !self.entries.iter().any(|e| e.user_added && e.name == name) {
            self.entries.push(VariableEntry::unset(name));
        }
    }

    pub fn remove_watched(&mut self, name: &str) {
        self.entries.retain(|e| !(e.user_added && e.name == name));
    }
}

/// Resolve a watched name: an exact variable first, then a dotted path into a
/// variable or built-in message (`request.contentType`, `items.0`).
fn resolve(ctx: &dyn EnforcementContext, name: &str) -> Option<VariableEntry> {
    if let Some(value) = ctx.variable(name) {
        return Some(VariableEntry::from_value(name, value, true));
    }

    // Longest variable prefix wins, since variable names may contain dots.
    for (split, _) in name.rmatch_indices('.') {
        let (base, rest) = (&name[..split], &name[split + 1..]);
        let root = match base {
            REQUEST => ctx.request().map(|m| VariableEntry::from_message(base, m, true)),
            RESPONSE => ctx.response().map(|m| VariableEntry::from_message(base, m, true)),
            _ => ctx
                .variable(base)
                .map(|v| VariableEntry::from_value(base, v, true)),
        };
        if let Some(mut entry) = root.and_then(|root| root.descend(rest)) {
            entry.name = name.to_string();
            entry.mark_user_added();
            return Some(entry);
        }
    }

    None
}
