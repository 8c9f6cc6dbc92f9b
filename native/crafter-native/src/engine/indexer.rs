//! Indexer: finds unprocessed bindings and feeds them to the dispatcher.
//!
//! Re-indexing is an explicit work queue rather than recursion. After every
//! completed binding the queue is rebuilt from the live document, which picks up
//! elements injected by the write and drops elements the write removed.

use std::collections::{HashSet, VecDeque};

use super::{Crafter, DispatchOutcome};
use crate::binding;
use crate::dom::Element;
use crate::error::CrafterError;

#[derive(Debug)]
pub struct BindingFailure {
    pub element: Element,
    pub error: CrafterError,
}

/// What one call to [`Crafter::scan`] did. Bindings settling later are not
/// counted here; they re-index on their own.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub completed: usize,
    pub pending: usize,
    pub armed: usize,
    /// Number of times the candidate queue was built.
    pub passes: usize,
    pub failures: Vec<BindingFailure>,
}

impl ScanReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl Crafter {
    /// Dispatch every unprocessed binding in document order, re-indexing after
    /// each completion until no candidate is left.
    pub fn scan(&self) -> Result<ScanReport, CrafterError> {
        let bridge = self.bridge()?;
        let mut report = ScanReport::default();
        // Failed bindings stay unprocessed; they are retried by the next scan, not
        // by every re-index of this one.
        let mut failed: HashSet<Element> = HashSet::new();

        let mut queue = self.candidates(&failed);
        report.passes = 1;

        while let Some(element) = queue.pop_front() {
            let Some(descriptor) = binding::extract(&element, &self.inner.options) else {
                continue;
            };

            match self.dispatch_descriptor(&descriptor, &bridge) {
                Ok(DispatchOutcome::Completed) => {
                    report.completed += 1;
                    report.passes += 1;
                    queue = self.candidates(&failed);
                }
                Ok(DispatchOutcome::Pending) => report.pending += 1,
                Ok(DispatchOutcome::Armed) => report.armed += 1,
                Ok(DispatchOutcome::Skipped) => {}
                Ok(DispatchOutcome::Failed(error)) | Err(error) => {
                    tracing::warn!(
                        element = ?element,
                        operation = %descriptor.operation,
                        error = %error,
                        "binding failed"
                    );
                    failed.insert(element.clone());
                    report.failures.push(BindingFailure { element, error });
                }
            }
        }

        tracing::debug!(
            completed = report.completed,
            pending = report.pending,
            armed = report.armed,
            failed = report.failures.len(),
            "scan finished"
        );
        Ok(report)
    }

    /// Unprocessed binding elements in document order.
    fn candidates(&self, failed: &HashSet<Element>) -> VecDeque<Element> {
        let options = &self.inner.options;
        self.inner
            .document
            .elements_with_attribute(&options.name_attribute)
            .into_iter()
            .filter(|element| binding::operation_name(element, options).is_some())
            .filter(|element| !binding::is_processed(element, options))
            .filter(|element| !self.is_in_flight(element) && !failed.contains(element))
            .collect()
    }
}
