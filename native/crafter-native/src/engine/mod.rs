//! # Crafter Engine
//!
//! Wires binding elements to bridge operations.
//!
//! ## Lifecycle
//!
//! `Uninitialized → Ready`. A bridge is attached exactly once; every public entry
//! point checks readiness first and fails with `BridgeNotReady` before that.
//! Nothing is queued while uninitialized.
//!
//! ## Invariants
//!
//! 1. **Processed marker**: the processed attribute on an element is the only
//!    idempotency guard. An element carrying it is never invoked again.
//! 2. **Mark before re-index**: a completed binding writes its result and sets the
//!    marker before the document is indexed again, so every completion strictly
//!    shrinks the unprocessed set.
//! 3. **Containment**: a failure of one binding is logged and reported, it never
//!    stops the rest of the scan. Only `BridgeNotReady` escapes `scan`/`dispatch`.
//! 4. **No cross-binding ordering**: pending bindings settle in whatever order the
//!    bridge resolves them; each re-indexes on its own.

mod dispatch;
mod indexer;

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;

use futures::executor::LocalSpawner;
use futures::task::LocalSpawnExt;
use serde_json::Value;

use crate::bridge::{Bridge, Invocation};
use crate::dom::{Document, Element};
use crate::error::CrafterError;
use crate::options::CrafterOptions;

pub use indexer::{BindingFailure, ScanReport};

/// Result of handing one element to the dispatcher.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Result written and element marked processed.
    Completed,
    /// Awaiting a pending value; completes on settlement.
    Pending,
    /// Event listener registered.
    Armed,
    /// Already processed, in flight, armed, or not a binding.
    Skipped,
    /// The binding failed; already logged.
    Failed(CrafterError),
}

enum Lifecycle {
    Uninitialized,
    Ready(Arc<Bridge>),
}

struct Inner {
    document: Document,
    options: CrafterOptions,
    spawner: LocalSpawner,
    lifecycle: RefCell<Lifecycle>,
    /// Async bindings between invocation and settlement.
    in_flight: RefCell<HashSet<Element>>,
}

/// The binding engine for one document. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Crafter {
    inner: Rc<Inner>,
}

impl Crafter {
    /// Create an engine over `document`. Pending values run on `spawner`, which
    /// stands in for the host event loop.
    pub fn new(document: Document, options: CrafterOptions, spawner: LocalSpawner) -> Self {
        Crafter {
            inner: Rc::new(Inner {
                document,
                options,
                spawner,
                lifecycle: RefCell::new(Lifecycle::Uninitialized),
                in_flight: RefCell::new(HashSet::new()),
            }),
        }
    }

    pub fn document(&self) -> &Document {
        &self.inner.document
    }

    pub fn options(&self) -> &CrafterOptions {
        &self.inner.options
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.inner.lifecycle.borrow(), Lifecycle::Ready(_))
    }

    /// Attach the bridge and call its init operation, if it exports one.
    pub fn attach(&self, bridge: Arc<Bridge>) -> Result<(), CrafterError> {
        {
            let mut lifecycle = self.inner.lifecycle.borrow_mut();
            if let Lifecycle::Ready(_) = *lifecycle {
                return Err(CrafterError::AlreadyAttached);
            }
            *lifecycle = Lifecycle::Ready(bridge);
        }
        tracing::info!("crafter: bridge attached");

        let init = self.inner.options.init_operation.clone();
        if !self.bridge()?.contains(&init) {
            return Ok(());
        }
        match self.call(&init, Vec::new())? {
            Invocation::Ready(_) => {}
            Invocation::Pending(pending) => {
                let operation = init.clone();
                let task = async move {
                    if let Err(message) = pending.await {
                        tracing::error!(operation = %operation, error = %message, "init operation failed");
                    }
                };
                self.inner
                    .spawner
                    .spawn_local(task)
                    .map_err(|e| CrafterError::Schedule {
                        operation: init,
                        message: e.to_string(),
                    })?;
            }
        }
        Ok(())
    }

    /// Call a bridge operation directly.
    pub fn call(&self, name: &str, args: Vec<Value>) -> Result<Invocation, CrafterError> {
        let bridge = self.bridge().map_err(|e| {
            tracing::error!(operation = name, "bridge not ready");
            e
        })?;
        let operation = bridge.lookup(name).ok_or_else(|| {
            tracing::error!(operation = name, "operation not found on the bridge");
            CrafterError::OperationNotFound {
                operation: name.to_string(),
            }
        })?;
        operation.invoke(name, args).map_err(|e| {
            tracing::error!(operation = name, error = %e, "error calling bridge operation");
            e
        })
    }

    /// Index the document for the first time.
    pub fn start(&self) -> Result<ScanReport, CrafterError> {
        self.scan()
    }

    /// Dispatch a single element, then re-index if it completed.
    pub fn dispatch(&self, element: &Element) -> Result<DispatchOutcome, CrafterError> {
        let bridge = self.bridge()?;
        let outcome = match crate::binding::extract(element, &self.inner.options) {
            None => DispatchOutcome::Skipped,
            Some(descriptor) => match self.dispatch_descriptor(&descriptor, &bridge) {
                Ok(outcome) => outcome,
                Err(error) => {
                    tracing::warn!(element = ?element, error = %error, "binding failed");
                    DispatchOutcome::Failed(error)
                }
            },
        };
        if let DispatchOutcome::Completed = outcome {
            self.scan()?;
        }
        Ok(outcome)
    }

    /// Number of async bindings awaiting settlement.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.borrow().len()
    }

    fn bridge(&self) -> Result<Arc<Bridge>, CrafterError> {
        match &*self.inner.lifecycle.borrow() {
            Lifecycle::Ready(bridge) => Ok(Arc::clone(bridge)),
            Lifecycle::Uninitialized => Err(CrafterError::BridgeNotReady),
        }
    }

    fn is_in_flight(&self, element: &Element) -> bool {
        self.inner.in_flight.borrow().contains(element)
    }
}
