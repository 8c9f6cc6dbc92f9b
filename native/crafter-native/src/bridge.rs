//! Bridge Module for Crafter
//!
//! The bridge is the operation table exported by the compiled business-logic
//! module. The engine only looks operations up by name and calls them; it never
//! changes the table once attached.
//!
//! Operations come in two flavours:
//! - `Sync` returns its value immediately
//! - `Async` returns a pending value the engine awaits on the host's local executor

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{FutureExt, LocalBoxFuture};
use serde_json::Value;

use crate::error::CrafterError;

pub type SyncHandler = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;
pub type AsyncHandler =
    Arc<dyn Fn(Vec<Value>) -> LocalBoxFuture<'static, Result<Value, String>> + Send + Sync>;

/// Value an async operation settles to later.
pub type PendingValue = LocalBoxFuture<'static, Result<Value, String>>;

#[derive(Clone)]
pub enum Operation {
    Sync(SyncHandler),
    Async(AsyncHandler),
}

pub enum Invocation {
    Ready(Value),
    Pending(PendingValue),
}

impl Invocation {
    /// View the result as a pending value; a ready value settles on first poll.
    pub fn into_pending(self) -> PendingValue {
        match self {
            Invocation::Ready(value) => futures::future::ready(Ok(value)).boxed_local(),
            Invocation::Pending(pending) => pending,
        }
    }
}

impl Operation {
    pub fn is_async(&self) -> bool {
        matches!(self, Operation::Async(_))
    }

    /// Call the operation. Failures of a sync operation surface here; failures of
    /// an async operation surface when its pending value settles.
    pub fn invoke(&self, name: &str, args: Vec<Value>) -> Result<Invocation, CrafterError> {
        match self {
            Operation::Sync(handler) => {
                handler(&args)
                    .map(Invocation::Ready)
                    .map_err(|message| CrafterError::OperationInvocation {
                        operation: name.to_string(),
                        message,
                    })
            }
            Operation::Async(handler) => Ok(Invocation::Pending(handler(args))),
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Sync(_) => write!(f, "Operation::Sync"),
            Operation::Async(_) => write!(f, "Operation::Async"),
        }
    }
}

#[derive(Clone, Default)]
pub struct Bridge {
    operations: HashMap<String, Operation>,
}

impl Bridge {
    pub fn new() -> Self {
        Bridge::default()
    }

    /// Register a synchronous operation.
    pub fn handle_fn<F>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.register(name, Operation::Sync(Arc::new(handler)));
        self
    }

    /// Register an operation returning a pending value.
    pub fn handle_async<F, Fut>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + 'static,
    {
        let handler: AsyncHandler = Arc::new(move |args| handler(args).boxed_local());
        self.register(name, Operation::Async(handler));
        self
    }

    pub fn register(&mut self, name: &str, operation: Operation) {
        if self.operations.insert(name.to_string(), operation).is_some() {
            tracing::debug!(operation = name, "replaced bridge operation");
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Operation> {
        self.operations.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    /// Operation names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.operations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Stable description of the table, used to invalidate rendered output when
    /// the exported operations change.
    pub fn signature(&self) -> String {
        self.names()
            .into_iter()
            .map(|name| match &self.operations[name] {
                Operation::Sync(_) => format!("{}()", name),
                Operation::Async(_) => format!("{}().await", name),
            })
            .collect::<Vec<_>>()
            .join(";")
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("operations", &self.names())
            .finish()
    }
}

/// String form of a bridge value as written into the document.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
