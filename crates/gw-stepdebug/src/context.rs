// context.rs: The contract between the policy execution engine and the debugger.
//
// The execution engine owns one enforcement context per in-flight request and
// passes it to the pipeline hooks. The debugger only needs to read live state
// (request, response, context variables) and to remember which debug task, if
// any, has attached itself to the request.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::path::AssertionPath;
use crate::session::TaskId;

/// Ordinal of a policy's root composite assertion.
pub const ROOT_ORDINAL: u32 = 1;

/// Describes the assertion about to be executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionInfo {
    /// Structural position, used to match breakpoints and step targets.
    pub path: AssertionPath,
    /// 1-based position of the assertion within its policy.
    pub ordinal: u32,
    /// Human-readable assertion name (e.g. "Set Context Variable").
    pub name: String,
}

impl AssertionInfo {
    pub fn new(path: impl Into<AssertionPath>, ordinal: u32, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ordinal,
            name: name.into(),
        }
    }

    /// The root composite runs before any work has happened and can never pause.
    pub fn is_policy_root(&self) -> bool {
        self.ordinal == ROOT_ORDINAL
    }
}

/// A request or response message as seen by the debugger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageState {
    pub content_type: Option<String>,
    pub body: String,
    pub headers: Vec<(String, String)>,
    /// HTTP status, set on responses once routing has produced one.
    pub status: Option<u16>,
}

impl MessageState {
    pub fn new(content_type: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            content_type: Some(content_type.into()),
            body: body.into(),
            headers: Vec::new(),
            status: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

/// A context variable value.
#[derive(Debug, Clone, PartialEq)]
pub enum VariableValue {
    Text(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Bytes(Vec<u8>),
    List(Vec<VariableValue>),
    Message(Box<MessageState>),
}

impl VariableValue {
    /// Runtime type tag shown next to the value.
    pub fn type_name(&self) -> &'static str {
        match self {
            VariableValue::Text(_) => "string",
            VariableValue::Integer(_) => "integer",
            VariableValue::Decimal(_) => "decimal",
            VariableValue::Boolean(_) => "boolean",
            VariableValue::Timestamp(_) => "date",
            VariableValue::Bytes(_) => "bytes",
            VariableValue::List(_) => "list",
            VariableValue::Message(_) => "message",
        }
    }
}

impl From<&str> for VariableValue {
    fn from(value: &str) -> Self {
        VariableValue::Text(value.to_string())
    }
}

impl From<String> for VariableValue {
    fn from(value: String) -> Self {
        VariableValue::Text(value)
    }
}

impl From<i64> for VariableValue {
    fn from(value: i64) -> Self {
        VariableValue::Integer(value)
    }
}

impl From<bool> for VariableValue {
    fn from(value: bool) -> Self {
        VariableValue::Boolean(value)
    }
}

impl From<MessageState> for VariableValue {
    fn from(value: MessageState) -> Self {
        VariableValue::Message(Box::new(value))
    }
}

/// Live state of one request, implemented by the execution engine.
pub trait EnforcementContext {
    /// The request message, once initialized.
    fn request(&self) -> Option<&MessageState>;

    /// The response message, once initialized.
    fn response(&self) -> Option<&MessageState>;

    /// Every context variable present right now.
    fn variables(&self) -> Box<dyn Iterator<Item = (&str, &VariableValue)> + '_>;

    /// Look up a single context variable.
    fn variable(&self, name: &str) -> Option<&VariableValue>;

    /// The debug task attached to this request, if any.
    fn debug_task(&self) -> Option<TaskId>;

    /// Attach (or detach, with `None`) a debug task.
    fn set_debug_task(&mut self, task_id: Option<TaskId>);
}

/// Plain in-memory enforcement context.
///
/// Engines that keep their own request state implement [`EnforcementContext`]
/// directly; this one is enough for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub request: Option<MessageState>,
    pub response: Option<MessageState>,
    variables: BTreeMap<String, VariableValue>,
    debug_task: Option<TaskId>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request(mut self, request: MessageState) -> Self {
        self.request = Some(request);
        self
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<VariableValue>) {
        self.variables.insert(name.into(), value.into());
    }

    pub fn remove_variable(&mut self, name: &str) -> Option<VariableValue> {
        self.variables.remove(name)
    }
}

impl EnforcementContext for RequestContext {
    fn request(&self) -> Option<&MessageState> {
        self.request.as_ref()
    }

    fn response(&self) -> Option<&MessageState> {
        self.response.as_ref()
    }

    fn variables(&self) -> Box<dyn Iterator<Item = (&str, &VariableValue)> + '_> {
        Box::new(self.variables.iter().map(|(k, v)| (k.as_str(), v)))
    }

    fn variable(&self, name: &str) -> Option<&VariableValue> {
        self.variables.get(name)
    }

    fn debug_task(&self) -> Option<TaskId> {
        self.debug_task
    }

    fn set_debug_task(&mut self, task_id: Option<TaskId>) {
        self.debug_task = task_id;
    }
}
