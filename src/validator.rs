//! WS-Security Layout policy validation.
//!
//! Checks the physical placement of processed security operations against
//! the Layout rule declared by policy. All checks read the
//! [`ProcessedResults`] reverse-order convention: index `0` is the bottom of
//! the security header, the last index the top.

use crate::error::{Violation, ViolationCode, LAYOUT_MISMATCH_REASON};
use crate::policy::{AssertionCatalog, LayoutType, QName, LAYOUT_LN};
use crate::results::{
    ActionKind, Certificate, ProcessedResults, PublicKey, SecurityAction, SecurityResults,
    SignatureAction,
};

/// Which end of the security header a timestamp must occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampPosition {
    First,
    Last,
}

/// A Layout assertion that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutFailure {
    /// Name of the failed Layout assertion
    pub assertion: QName,
    /// Declared layout
    pub layout_type: Option<LayoutType>,
    /// Rule that was broken
    pub violation: Violation,
}

/// Outcome of validating every Layout assertion in a catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutReport {
    /// Number of Layout assertions evaluated
    pub assertions_checked: usize,
    /// Assertions that failed
    pub failures: Vec<LayoutFailure>,
}

impl LayoutReport {
    /// Whether every Layout assertion passed.
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    /// Violations of the failed assertions, in catalog order.
    pub fn violations(&self) -> impl Iterator<Item = &Violation> {
        self.failures.iter().map(|failure| &failure.violation)
    }
}

/// Validates Layout assertions against processed security results.
///
/// Stateless; one instance can serve concurrent messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayoutPolicyValidator;

impl LayoutPolicyValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate every Layout assertion in `catalog`.
    ///
    /// Returns `true` iff all Layout assertions passed. Each Layout assertion
    /// is marked asserted, its nested layout policy is asserted regardless of
    /// the outcome, and failing assertions are marked not asserted.
    pub fn validate(&self, catalog: &mut dyn AssertionCatalog, results: &SecurityResults) -> bool {
        self.validate_with_report(catalog, results).passed()
    }

    /// Like [`validate`](Self::validate), but reports which rule each failed
    /// assertion broke.
    pub fn validate_with_report(
        &self,
        catalog: &mut dyn AssertionCatalog,
        results: &SecurityResults,
    ) -> LayoutReport {
        let mut report = LayoutReport::default();
        let mut nested_policies = Vec::new();

        for info in catalog.assertions_by_local_name(LAYOUT_LN) {
            let Some(layout) = info.layout_assertion().cloned() else {
                continue;
            };

            info.set_asserted(true);
            report.assertions_checked += 1;
            if let Some(nested) = layout.nested_policy_name() {
                nested_policies.push(nested);
            }

            if let Err(violation) = check_layout(layout.layout_type, results) {
                info.set_not_asserted(LAYOUT_MISMATCH_REASON);
                report.failures.push(LayoutFailure {
                    assertion: info.name().clone(),
                    layout_type: layout.layout_type,
                    violation,
                });
            }
        }

        for name in &nested_policies {
            catalog.assert_policy(name);
        }

        report
    }
}

/// Check `results` against a declared layout.
///
/// An undeclared layout behaves as [`LayoutType::Lax`].
pub fn check_layout(layout_type: Option<LayoutType>, results: &SecurityResults) -> Result<(), Violation> {
    match layout_type {
        Some(LayoutType::LaxTsFirst) => {
            check_timestamp_position(&results.results, TimestampPosition::First)
        }
        Some(LayoutType::LaxTsLast) => {
            check_timestamp_position(&results.results, TimestampPosition::Last)
        }
        Some(LayoutType::Strict) => {
            check_strict_signature_placement(&results.results, &results.signed_results)?;
            check_strict_token_placement(&results.results)?;
            check_endorsement_placement(&results.signed_results)
        }
        Some(LayoutType::Lax) | None => Ok(()),
    }
}

/// Check that a timestamp is the first or last security-header element.
pub fn check_timestamp_position(
    results: &ProcessedResults,
    position: TimestampPosition,
) -> Result<(), Violation> {
    let (candidate, code, place) = match position {
        TimestampPosition::First => (results.top_of_header(), ViolationCode::TimestampNotFirst, "first"),
        TimestampPosition::Last => (results.bottom_of_header(), ViolationCode::TimestampNotLast, "last"),
    };

    match candidate {
        None => Err(Violation::new(
            ViolationCode::NoSecurityResults,
            "No security operations were processed",
        )),
        Some(op) if op.kind() == ActionKind::Timestamp => Ok(()),
        Some(op) => Err(Violation::at(
            code,
            format!(
                "Timestamp must be the {} security header element, found {}",
                place,
                op.kind()
            ),
            op.id,
        )),
    }
}

/// Check that every header token covered by a signature precedes it.
///
/// Scans bottom-up from the signature's point of view: reaching a covered
/// token before reaching the signature means the token sits below it in the
/// header. Once the signature's own header element is reached the reference
/// is settled.
pub fn check_strict_signature_placement(
    results: &ProcessedResults,
    signed_results: &ProcessedResults,
) -> Result<(), Violation> {
    for signed in signed_results {
        if signed.kind() == ActionKind::SignedSamlToken {
            continue;
        }
        let Some(refs) = signed.data_refs() else {
            continue;
        };

        for reference in refs.iter().filter(|r| r.is_security_header_child()) {
            let mut token_found = false;
            for op in results {
                if op.token_element == Some(reference.protected_element) {
                    token_found = true;
                }
                if op.id != signed.id {
                    continue;
                }
                if token_found {
                    return Err(Violation::at(
                        ViolationCode::SignedTokenAfterSignature,
                        format!(
                            "Signed header token {} appears after signature {}",
                            reference.protected_element, signed.id
                        ),
                        signed.id,
                    ));
                }
                if op.token_element.is_some() {
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Check that the token each signature was produced with precedes it.
///
/// Tokens that cannot be found in the header (e.g. referenced externally)
/// are not a violation.
pub fn check_strict_token_placement(results: &ProcessedResults) -> Result<(), Violation> {
    for (index, op) in results.bottom_up().enumerate() {
        let SecurityAction::Sign(signature) = &op.action else {
            continue;
        };

        if let Some(token_index) = find_corresponding_token_index(signature, results) {
            if token_index < index {
                let token_id = results.get(token_index).map(|token| token.id);
                return Err(Violation::at(
                    ViolationCode::SigningTokenAfterSignature,
                    format!(
                        "Signing token {} appears after signature {}",
                        token_id.map(|id| id.to_string()).unwrap_or_default(),
                        op.id
                    ),
                    op.id,
                ));
            }
        }
    }

    Ok(())
}

/// Index of the token carrying the certificate or public key `signature`
/// was verified with.
pub fn find_corresponding_token_index(
    signature: &SignatureAction,
    results: &ProcessedResults,
) -> Option<usize> {
    let cert = signature.certificate.as_ref();
    let public_key = signature.public_key.as_ref();

    results
        .bottom_up()
        .position(|candidate| is_signing_token(&candidate.action, cert, public_key))
}

fn is_signing_token(
    candidate: &SecurityAction,
    cert: Option<&Certificate>,
    public_key: Option<&PublicKey>,
) -> bool {
    match candidate {
        SecurityAction::Sign(_) => false,
        SecurityAction::BinarySecurityToken(token) if token.is_certificate() => {
            same_key(token.certificate.as_ref(), cert)
        }
        SecurityAction::SamlToken(saml) => {
            // Assertions without holder-of-key info cannot have signed anything.
            saml.assertion
                .subject_key_info
                .as_ref()
                .is_some_and(|key_info| {
                    same_key(key_info.certs.first(), cert)
                        || same_key(key_info.public_key.as_ref(), public_key)
                })
        }
        SecurityAction::BinarySecurityToken(token) => {
            same_key(token.public_key.as_ref(), public_key)
        }
        SecurityAction::KeyValueToken { public_key: found } => same_key(Some(found), public_key),
        SecurityAction::Timestamp
        | SecurityAction::EncryptedKey
        | SecurityAction::Encrypt
        | SecurityAction::UsernameToken => false,
    }
}

fn same_key<T: PartialEq>(found: Option<&T>, expected: Option<&T>) -> bool {
    matches!((found, expected), (Some(found), Some(expected)) if found == expected)
}

/// Check that every endorsed signature precedes its endorsing signature.
pub fn check_endorsement_placement(signed_results: &ProcessedResults) -> Result<(), Violation> {
    for signed in signed_results {
        let Some(refs) = signed.data_refs() else {
            continue;
        };

        for reference in refs.iter().filter(|r| r.covers_signature()) {
            let mut endorsing_found = false;
            for op in signed_results {
                if op.id == signed.id {
                    endorsing_found = true;
                }
                if op.token_element == Some(reference.protected_element) {
                    if endorsing_found {
                        break;
                    }
                    return Err(Violation::at(
                        ViolationCode::EndorsedSignatureAfterEndorsing,
                        format!(
                            "Endorsed signature {} appears after endorsing signature {}",
                            op.id, signed.id
                        ),
                        signed.id,
                    ));
                }
            }
        }
    }

    Ok(())
}
