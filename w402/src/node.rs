//! Host abstraction that nodes execute against.
//!
//! The workflow host resolves parameters, stores credentials, iterates the
//! input items, routes webhooks and owns the continue-on-fail policy. Nodes
//! see all of that through [`NodeContext`]. [`StaticContext`] is an
//! in-memory host used by the runner binary and by tests.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::NodeError;

/// Body of a webhook reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyBody {
    /// JSON body.
    Json(Value),
    /// Plain text body.
    Text(String),
    /// No body.
    Empty,
}

/// HTTP reply a node asks the host to send back on the triggering webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookReply {
    /// Status code.
    pub status: u16,
    /// Headers as `(lower-cased name, value)`.
    pub headers: Vec<(String, String)>,
    /// Body.
    pub body: ReplyBody,
}

impl WebhookReply {
    /// First header value with the given name, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Capabilities the host grants a node during one execution.
pub trait NodeContext: Send + Sync {
    /// Input items, in the order supplied.
    fn items(&self) -> &[Value];

    /// Resolved value of a parameter for the given item.
    fn parameter(&self, name: &str, item: usize) -> Option<Value>;

    /// A stored credential, as a JSON object.
    fn credential(&self, name: &str) -> Option<Value>;

    /// Whether a failing item becomes an error item instead of aborting.
    fn continue_on_fail(&self) -> bool;

    /// Fires when the execution is cancelled.
    fn cancellation(&self) -> CancellationToken;

    /// Sends the reply for the triggering webhook.
    fn respond(&self, reply: WebhookReply);
}

/// Typed parameter and credential access on top of [`NodeContext`].
pub trait Parameters {
    /// A string parameter that must be present and non-empty.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the parameter is missing or blank.
    fn required_str(&self, name: &str, item: usize) -> Result<String, NodeError>;

    /// A string parameter, or `default` when missing.
    fn str_or(&self, name: &str, item: usize, default: &str) -> String;

    /// A boolean parameter, or `default` when missing or not a boolean.
    fn bool_or(&self, name: &str, item: usize, default: bool) -> bool;

    /// An unsigned integer parameter given as a number or numeric string.
    fn u64_or(&self, name: &str, item: usize, default: u64) -> u64;

    /// A string field of a stored credential.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the credential or field is missing.
    fn credential_str(&self, credential: &str, field: &str) -> Result<String, NodeError>;
}

impl<C: NodeContext + ?Sized> Parameters for C {
    fn required_str(&self, name: &str, item: usize) -> Result<String, NodeError> {
        match self.parameter(name, item) {
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(s),
            Some(Value::Number(n)) => Ok(n.to_string()),
            _ => Err(NodeError::validation(format!("Parameter '{name}' is required"))),
        }
    }

    fn str_or(&self, name: &str, item: usize, default: &str) -> String {
        match self.parameter(name, item) {
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => default.to_owned(),
        }
    }

    fn bool_or(&self, name: &str, item: usize, default: bool) -> bool {
        self.parameter(name, item)
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }

    fn u64_or(&self, name: &str, item: usize, default: u64) -> u64 {
        match self.parameter(name, item) {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(default),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    fn credential_str(&self, credential: &str, field: &str) -> Result<String, NodeError> {
        self.credential(credential)
            .and_then(|c| c.get(field).and_then(Value::as_str).map(str::to_owned))
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                NodeError::validation(format!("Credential '{credential}' has no '{field}'"))
            })
    }
}

/// A workflow step.
///
/// `execute` returns one list of items per output. Most nodes have a single
/// output; the payment-gated endpoint has two.
#[async_trait::async_trait]
pub trait Node: Send + Sync {
    /// Stable node type name.
    fn name(&self) -> &'static str;

    /// Runs the node over every input item.
    async fn execute(&self, ctx: &dyn NodeContext) -> Result<Vec<Vec<Value>>, NodeError>;
}

/// Runs `f` for every input item, in order, one at a time.
///
/// A failed item is recorded as `{"error": message}` when the host allows
/// continue-on-fail; otherwise the first failure aborts the batch, tagged
/// with the item index. Cancellation always aborts.
///
/// # Errors
///
/// Returns the first item failure when continue-on-fail is off, or a
/// network error once the execution is cancelled.
pub async fn run_items<'a, F, Fut>(ctx: &'a dyn NodeContext, mut f: F) -> Result<Vec<Value>, NodeError>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<Value, NodeError>> + 'a,
{
    let cancel = ctx.cancellation();
    let mut out = Vec::with_capacity(ctx.items().len());
    for index in 0..ctx.items().len() {
        if cancel.is_cancelled() {
            return Err(NodeError::network("Execution cancelled").at_item(index));
        }
        match f(index).await {
            Ok(value) => out.push(value),
            Err(err) if ctx.continue_on_fail() => {
                #[cfg(feature = "telemetry")]
                tracing::warn!(item = index, kind = %err.kind, error = %err, "item failed, continuing");
                out.push(err.to_item());
            }
            Err(err) => return Err(err.at_item(index)),
        }
    }
    Ok(out)
}

/// In-memory host.
///
/// Parameters are static per execution, optionally overridden per item.
#[derive(Debug, Default)]
pub struct StaticContext {
    items: Vec<Value>,
    parameters: HashMap<String, Value>,
    item_parameters: HashMap<(usize, String), Value>,
    credentials: HashMap<String, Value>,
    continue_on_fail: bool,
    cancel: CancellationToken,
    reply: Mutex<Option<WebhookReply>>,
}

impl StaticContext {
    /// Host with the given input items.
    #[must_use]
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            items,
            ..Self::default()
        }
    }

    /// Host with a single empty input item.
    #[must_use]
    pub fn single() -> Self {
        Self::new(vec![Value::Object(serde_json::Map::new())])
    }

    /// Sets a parameter for every item.
    #[must_use]
    pub fn with_parameter(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.to_owned(), value.into());
        self
    }

    /// Sets every key of a JSON object as a parameter.
    #[must_use]
    pub fn with_parameters(mut self, parameters: &Value) -> Self {
        if let Some(map) = parameters.as_object() {
            for (name, value) in map {
                self.parameters.insert(name.clone(), value.clone());
            }
        }
        self
    }

    /// Overrides a parameter for one item.
    #[must_use]
    pub fn with_item_parameter(mut self, item: usize, name: &str, value: impl Into<Value>) -> Self {
        self.item_parameters.insert((item, name.to_owned()), value.into());
        self
    }

    /// Stores a credential.
    #[must_use]
    pub fn with_credential(mut self, name: &str, value: Value) -> Self {
        self.credentials.insert(name.to_owned(), value);
        self
    }

    /// Sets the continue-on-fail policy.
    #[must_use]
    pub const fn with_continue_on_fail(mut self, continue_on_fail: bool) -> Self {
        self.continue_on_fail = continue_on_fail;
        self
    }

    /// Uses an externally owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Takes the reply sent by the last responding node.
    pub fn take_reply(&self) -> Option<WebhookReply> {
        self.reply.lock().ok().and_then(|mut slot| slot.take())
    }
}

impl NodeContext for StaticContext {
    fn items(&self) -> &[Value] {
        &self.items
    }

    fn parameter(&self, name: &str, item: usize) -> Option<Value> {
        self.item_parameters
            .get(&(item, name.to_owned()))
            .or_else(|| self.parameters.get(name))
            .cloned()
    }

    fn credential(&self, name: &str) -> Option<Value> {
        self.credentials.get(name).cloned()
    }

    fn continue_on_fail(&self) -> bool {
        self.continue_on_fail
    }

    fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn respond(&self, reply: WebhookReply) {
        if let Ok(mut slot) = self.reply.lock() {
            *slot = Some(reply);
        }
    }
}
