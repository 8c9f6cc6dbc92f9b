//! Dispatcher: runs one binding against the bridge.

use std::rc::Rc;
use std::sync::Arc;

use futures::task::LocalSpawnExt;
use serde_json::Value;

use super::{Crafter, DispatchOutcome};
use crate::binding::{self, BindingDescriptor, Trigger};
use crate::bridge::{Bridge, Invocation, PendingValue};
use crate::dom::{Element, EventCallback};
use crate::error::CrafterError;
use crate::resolve::{self, TargetWriter};

/// Key under which trigger listeners are registered, so re-indexing an armed
/// element does not stack a second listener.
const LISTENER_KEY: &str = "crafter";

impl Crafter {
    pub(super) fn dispatch_descriptor(
        &self,
        descriptor: &BindingDescriptor,
        bridge: &Arc<Bridge>,
    ) -> Result<DispatchOutcome, CrafterError> {
        if descriptor.processed || self.is_in_flight(&descriptor.element) {
            return Ok(DispatchOutcome::Skipped);
        }
        match &descriptor.trigger {
            Trigger::Immediate => self.run_binding(descriptor, bridge),
            Trigger::Event(event) => Ok(if self.arm(descriptor, event, bridge)? {
                DispatchOutcome::Armed
            } else {
                DispatchOutcome::Skipped
            }),
        }
    }

    /// Lookup, resolve inputs, build the writer, invoke, then complete now or
    /// once the pending value settles.
    fn run_binding(
        &self,
        descriptor: &BindingDescriptor,
        bridge: &Arc<Bridge>,
    ) -> Result<DispatchOutcome, CrafterError> {
        let name = descriptor.operation.as_str();
        let operation = bridge
            .lookup(name)
            .ok_or_else(|| CrafterError::OperationNotFound {
                operation: name.to_string(),
            })?;

        let document = &self.inner.document;
        let args: Vec<Value> = resolve::read_addresses(document, &descriptor.inputs)?
            .into_iter()
            .map(Value::String)
            .collect();

        let writer = match &descriptor.target {
            Some(raw) => resolve::make_writer(document, raw, &descriptor.element)?,
            None => TargetWriter::noop(),
        };

        tracing::debug!(operation = name, element = ?descriptor.element, args = args.len(), "invoking binding");
        let invocation = operation.invoke(name, args).map_err(|e| {
            tracing::error!(operation = name, error = %e, "error calling bridge operation");
            e
        })?;

        match invocation {
            Invocation::Ready(value) if !descriptor.is_async => {
                self.complete(&descriptor.element, &writer, &value);
                Ok(DispatchOutcome::Completed)
            }
            invocation => {
                if !descriptor.is_async {
                    tracing::debug!(
                        operation = name,
                        "operation returned a pending value, awaiting it"
                    );
                }
                self.await_settlement(descriptor, writer, invocation.into_pending())?;
                Ok(DispatchOutcome::Pending)
            }
        }
    }

    /// Write the result and set the processed marker.
    fn complete(&self, element: &Element, writer: &TargetWriter, value: &Value) {
        writer.write(&self.inner.document, value);
        element.set_attribute(&self.inner.options.processed_attribute, "true");
    }

    fn await_settlement(
        &self,
        descriptor: &BindingDescriptor,
        writer: TargetWriter,
        pending: PendingValue,
    ) -> Result<(), CrafterError> {
        let weak = Rc::downgrade(&self.inner);
        let element = descriptor.element.clone();
        let operation = descriptor.operation.clone();

        let task = {
            let element = element.clone();
            let operation = operation.clone();
            async move {
                let settled = pending.await;
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let crafter = Crafter { inner };
                crafter.inner.in_flight.borrow_mut().remove(&element);

                match settled {
                    Ok(value) => {
                        crafter.complete(&element, &writer, &value);
                        tracing::debug!(operation = %operation, "pending binding settled");
                        if let Err(error) = crafter.scan() {
                            tracing::error!(error = %error, "re-index after settlement failed");
                        }
                    }
                    Err(message) => {
                        let error = CrafterError::OperationInvocation {
                            operation: operation.clone(),
                            message,
                        };
                        tracing::error!(element = ?element, error = %error, "pending binding rejected");
                    }
                }
            }
        };

        self.inner.in_flight.borrow_mut().insert(element.clone());
        self.inner.spawner.spawn_local(task).map_err(|e| {
            self.inner.in_flight.borrow_mut().remove(&element);
            CrafterError::Schedule {
                operation,
                message: e.to_string(),
            }
        })
    }

    /// Register the trigger listener for an event binding. Returns whether a new
    /// listener was added.
    fn arm(
        &self,
        descriptor: &BindingDescriptor,
        event: &str,
        bridge: &Arc<Bridge>,
    ) -> Result<bool, CrafterError> {
        if !bridge.contains(&descriptor.operation) {
            return Err(CrafterError::OperationNotFound {
                operation: descriptor.operation.clone(),
            });
        }

        let weak = Rc::downgrade(&self.inner);
        let callback: EventCallback = Rc::new(move |element: &Element, event: &str| {
            if let Some(inner) = weak.upgrade() {
                Crafter { inner }.on_trigger(element, event);
            }
        });

        let added = self
            .inner
            .document
            .add_event_listener(&descriptor.element, event, LISTENER_KEY, callback);
        if added {
            tracing::debug!(operation = %descriptor.operation, event, "armed trigger binding");
        }
        Ok(added)
    }

    /// Listener body. Failures stay inside this invocation.
    fn on_trigger(&self, element: &Element, event: &str) {
        let outcome = self.bridge().and_then(|bridge| {
            match binding::extract(element, &self.inner.options) {
                Some(descriptor) if !descriptor.processed && !self.is_in_flight(element) => {
                    self.run_binding(&descriptor, &bridge)
                }
                _ => Ok(DispatchOutcome::Skipped),
            }
        });

        match outcome {
            Ok(DispatchOutcome::Completed) => {
                if let Err(error) = self.scan() {
                    tracing::error!(error = %error, "re-index after trigger failed");
                }
            }
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(element = ?element, event, error = %error, "trigger binding failed");
            }
        }
    }
}
