//! Layout policy enforcement for processed messages.
//!
//! Binds configured Layout policies to SOAP operations, builds the assertion
//! catalog for each message, runs the validator and applies the configured
//! fail action.

use crate::config::{FailAction, LayoutValidatorConfig};
use crate::error::LayoutError;
use crate::policy::{AssertionInfoMap, LayoutAssertion};
use crate::results::SecurityResults;
use crate::validator::{LayoutPolicyValidator, LayoutReport};
use glob::Pattern;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// What to do with a message after layout validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
}

/// Result of enforcing Layout policy on one message.
#[derive(Debug, Clone)]
pub struct EnforcementOutcome {
    pub decision: Decision,
    /// Assertion catalog after validation
    pub catalog: AssertionInfoMap,
    pub report: LayoutReport,
}

impl EnforcementOutcome {
    pub fn is_rejected(&self) -> bool {
        self.decision == Decision::Reject
    }
}

/// Counters for messages seen by an enforcer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnforcerStats {
    pub messages_processed: u64,
    pub messages_rejected: u64,
}

/// A policy binding with compiled operation patterns.
struct CompiledBinding {
    patterns: Vec<Pattern>,
    assertion: LayoutAssertion,
}

impl CompiledBinding {
    fn matches(&self, operation: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(operation))
    }
}

/// Enforces configured Layout policies.
pub struct LayoutEnforcer {
    config: LayoutValidatorConfig,
    bindings: Vec<CompiledBinding>,
    validator: LayoutPolicyValidator,
    messages_processed: AtomicU64,
    messages_rejected: AtomicU64,
}

impl LayoutEnforcer {
    /// Create an enforcer, compiling every operation pattern.
    pub fn new(config: LayoutValidatorConfig) -> Result<Self, LayoutError> {
        let bindings = config
            .policies
            .iter()
            .enumerate()
            .map(|(index, binding)| {
                if binding.operations.is_empty() {
                    return Err(LayoutError::Config(format!(
                        "policy {} does not list any operations",
                        index
                    )));
                }
                let patterns = binding
                    .operations
                    .iter()
                    .map(|pattern| {
                        Pattern::new(pattern).map_err(|source| LayoutError::InvalidPattern {
                            pattern: pattern.clone(),
                            source,
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(CompiledBinding {
                    patterns,
                    assertion: LayoutAssertion::new(binding.namespace, binding.layout),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            config,
            bindings,
            validator: LayoutPolicyValidator::new(),
            messages_processed: AtomicU64::new(0),
            messages_rejected: AtomicU64::new(0),
        })
    }

    /// Build the assertion catalog declared for `operation`.
    ///
    /// Messages with no known operation only pick up bindings whose patterns
    /// match the empty name, such as `*`.
    pub fn catalog_for(&self, operation: Option<&str>) -> AssertionInfoMap {
        let operation = operation.unwrap_or("");
        let mut catalog = AssertionInfoMap::new();
        for binding in self.bindings.iter().filter(|b| b.matches(operation)) {
            catalog.insert_layout(binding.assertion.clone());
        }
        catalog
    }

    /// Validate the security header layout of one message.
    pub fn enforce(
        &self,
        message_id: &str,
        operation: Option<&str>,
        results: &SecurityResults,
    ) -> EnforcementOutcome {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);

        debug!(
            message_id = %message_id,
            operation = ?operation,
            results = results.results.len(),
            signed_results = results.signed_results.len(),
            "Validating security header layout"
        );

        let mut catalog = self.catalog_for(operation);
        if catalog.is_empty() {
            debug!(
                message_id = %message_id,
                operation = ?operation,
                "No Layout policy bound to operation"
            );
        }

        let report = self.validator.validate_with_report(&mut catalog, results);

        let decision = if report.passed() {
            debug!(
                message_id = %message_id,
                assertions = report.assertions_checked,
                "Security header layout satisfies policy"
            );
            Decision::Accept
        } else {
            warn!(
                message_id = %message_id,
                operation = ?operation,
                failure_count = report.failures.len(),
                "Layout policy violations detected"
            );

            for failure in &report.failures {
                debug!(
                    message_id = %message_id,
                    assertion = %failure.assertion,
                    layout = ?failure.layout_type,
                    code = %failure.violation.code.as_str(),
                    message = %failure.violation.message,
                    "Violation"
                );
            }

            match self.config.settings.fail_action {
                FailAction::Block => {
                    self.messages_rejected.fetch_add(1, Ordering::Relaxed);
                    Decision::Reject
                }
                FailAction::Allow => {
                    info!(
                        message_id = %message_id,
                        "Layout violations detected but accepting message (fail_action=allow)"
                    );
                    Decision::Accept
                }
            }
        };

        EnforcementOutcome {
            decision,
            catalog,
            report,
        }
    }

    pub fn stats(&self) -> EnforcerStats {
        EnforcerStats {
            messages_processed: self.messages_processed.load(Ordering::Relaxed),
            messages_rejected: self.messages_rejected.load(Ordering::Relaxed),
        }
    }
}
