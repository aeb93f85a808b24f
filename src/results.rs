//! Processed WS-Security results.
//!
//! The security processing engine reports one [`ProcessedOperation`] per
//! security-header child it handled (timestamp read, token validated,
//! signature verified, key decrypted). Results are reported the way a
//! streaming processor unwinds them, in reverse document order:
//!
//! - index `0` is the **last processed** operation, i.e. the **bottom** of
//!   the security header;
//! - the final index is the **first processed** operation, i.e. the **top**
//!   of the security header.
//!
//! [`ProcessedResults`] wraps a list in that order and every layout check
//! works against it. Documents written by hand (see [`ResultsDocument`]) list
//! operations top to bottom and are reversed once at ingestion.

use crate::error::LayoutError;
use crate::policy::{QName, DSIG_NS};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Local name of the XML Signature element.
pub const SIGNATURE_LN: &str = "Signature";

/// Number of path segments in the xpath of a direct child of the security
/// header: `/Envelope/Header/Security/Child`, counting the leading root.
const SECURITY_HEADER_CHILD_SEGMENTS: usize = 5;

/// Stable handle of an XML element, assigned when the message is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub u64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "element#{}", self.0)
    }
}

/// Stable handle of a processed operation.
///
/// The same operation shows up in both the processed and the signed result
/// lists; two entries are the same operation iff their ids are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub u64);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Encoded identity of an X.509 certificate (e.g. its DER fingerprint).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Certificate(String);

impl Certificate {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }
}

/// Encoded identity of a raw public key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicKey(String);

impl PublicKey {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }
}

/// One element covered by a signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedReference {
    /// Location of the covered element
    #[serde(default)]
    pub xpath: Option<String>,
    /// The covered element
    pub protected_element: ElementId,
    /// Qualified name of the covered element
    #[serde(default)]
    pub covered_name: Option<QName>,
}

impl SignedReference {
    /// Create a reference to `protected_element` with no location or name.
    pub fn new(protected_element: ElementId) -> Self {
        Self {
            xpath: None,
            protected_element,
            covered_name: None,
        }
    }

    pub fn with_xpath(mut self, xpath: impl Into<String>) -> Self {
        self.xpath = Some(xpath.into());
        self
    }

    pub fn with_name(mut self, name: QName) -> Self {
        self.covered_name = Some(name);
        self
    }

    /// Whether the covered element is a direct child of the security header.
    ///
    /// Segments are counted the way `/`-splitting counts them: the empty
    /// root segment is kept, trailing empty segments are dropped.
    pub fn is_security_header_child(&self) -> bool {
        self.xpath
            .as_deref()
            .is_some_and(|xpath| path_segment_count(xpath) == SECURITY_HEADER_CHILD_SEGMENTS)
    }

    /// Whether the covered element is itself an XML Signature.
    pub fn covers_signature(&self) -> bool {
        self.covered_name
            .as_ref()
            .is_some_and(|name| name.namespace() == DSIG_NS && name.local_part() == SIGNATURE_LN)
    }
}

fn path_segment_count(xpath: &str) -> usize {
    xpath.split('/').rev().skip_while(|s| s.is_empty()).count()
}

/// A verified signature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignatureAction {
    /// Certificate the signature was verified with
    pub certificate: Option<Certificate>,
    /// Public key the signature was verified with
    pub public_key: Option<PublicKey>,
    /// Elements covered by the signature; `None` means no coverage info
    pub data_refs: Option<Vec<SignedReference>>,
}

/// Subject confirmation key material of a SAML assertion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubjectKeyInfo {
    pub certs: Vec<Certificate>,
    pub public_key: Option<PublicKey>,
}

/// A SAML assertion found in the security header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamlAssertion {
    /// Assertion ID attribute
    pub id: Option<String>,
    /// Holder-of-key subject key info (if any)
    pub subject_key_info: Option<SubjectKeyInfo>,
}

/// A processed SAML token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamlTokenAction {
    /// Whether the assertion carried an enveloped signature
    pub signed: bool,
    pub assertion: SamlAssertion,
    /// Elements covered by the assertion's signature
    pub data_refs: Option<Vec<SignedReference>>,
}

/// Value type of a BinarySecurityToken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryTokenKind {
    /// Single X.509 v3 certificate
    #[default]
    X509,
    /// X.509 PKIPath certificate chain
    PkiPath,
    /// Any other binary token (Kerberos, custom)
    Other,
}

/// A processed BinarySecurityToken.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinaryToken {
    pub kind: BinaryTokenKind,
    pub certificate: Option<Certificate>,
    pub public_key: Option<PublicKey>,
}

impl BinaryToken {
    /// Whether the token is certificate shaped (single certificate or chain).
    pub fn is_certificate(&self) -> bool {
        matches!(self.kind, BinaryTokenKind::X509 | BinaryTokenKind::PkiPath)
    }
}

/// What the security engine did with one security-header child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SecurityAction {
    Timestamp,
    Sign(SignatureAction),
    SamlToken(SamlTokenAction),
    BinarySecurityToken(BinaryToken),
    KeyValueToken { public_key: PublicKey },
    EncryptedKey,
    Encrypt,
    UsernameToken,
}

/// Flat classification of a [`SecurityAction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Timestamp,
    Sign,
    SignedSamlToken,
    UnsignedSamlToken,
    BinarySecurityToken,
    KeyValueToken,
    EncryptedKey,
    Encrypt,
    UsernameToken,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timestamp => "timestamp",
            Self::Sign => "sign",
            Self::SignedSamlToken => "signed_saml_token",
            Self::UnsignedSamlToken => "unsigned_saml_token",
            Self::BinarySecurityToken => "binary_security_token",
            Self::KeyValueToken => "key_value_token",
            Self::EncryptedKey => "encrypted_key",
            Self::Encrypt => "encrypt",
            Self::UsernameToken => "username_token",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SecurityAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Timestamp => ActionKind::Timestamp,
            Self::Sign(_) => ActionKind::Sign,
            Self::SamlToken(saml) if saml.signed => ActionKind::SignedSamlToken,
            Self::SamlToken(_) => ActionKind::UnsignedSamlToken,
            Self::BinarySecurityToken(_) => ActionKind::BinarySecurityToken,
            Self::KeyValueToken { .. } => ActionKind::KeyValueToken,
            Self::EncryptedKey => ActionKind::EncryptedKey,
            Self::Encrypt => ActionKind::Encrypt,
            Self::UsernameToken => ActionKind::UsernameToken,
        }
    }

    /// Elements covered by this operation's signature, if it has one.
    pub fn data_refs(&self) -> Option<&[SignedReference]> {
        match self {
            Self::Sign(sig) => sig.data_refs.as_deref(),
            Self::SamlToken(saml) => saml.data_refs.as_deref(),
            _ => None,
        }
    }
}

/// One processed security-header child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedOperation {
    pub id: OperationId,
    /// Security-header element this operation was produced from
    #[serde(default)]
    pub token_element: Option<ElementId>,
    #[serde(flatten)]
    pub action: SecurityAction,
}

impl ProcessedOperation {
    pub fn new(id: u64, action: SecurityAction) -> Self {
        Self {
            id: OperationId(id),
            token_element: None,
            action,
        }
    }

    pub fn with_element(mut self, element: u64) -> Self {
        self.token_element = Some(ElementId(element));
        self
    }

    pub fn kind(&self) -> ActionKind {
        self.action.kind()
    }

    pub fn data_refs(&self) -> Option<&[SignedReference]> {
        self.action.data_refs()
    }
}

/// Processed operations in reverse document order.
///
/// Index `0` is the bottom of the security header (last processed); the last
/// index is the top (first processed).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessedResults(Vec<ProcessedOperation>);

impl ProcessedResults {
    /// Wrap operations already in engine order (bottom of header first).
    pub fn new(operations: Vec<ProcessedOperation>) -> Self {
        Self(operations)
    }

    /// Wrap operations listed top of header first.
    pub fn from_header_order(mut operations: Vec<ProcessedOperation>) -> Self {
        operations.reverse();
        Self(operations)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ProcessedOperation> {
        self.0.get(index)
    }

    /// The first operation processed, i.e. the top of the security header.
    pub fn top_of_header(&self) -> Option<&ProcessedOperation> {
        self.0.last()
    }

    /// The last operation processed, i.e. the bottom of the security header.
    pub fn bottom_of_header(&self) -> Option<&ProcessedOperation> {
        self.0.first()
    }

    /// Iterate from the bottom of the header towards the top (index order).
    pub fn bottom_up(&self) -> std::slice::Iter<'_, ProcessedOperation> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a ProcessedResults {
    type Item = &'a ProcessedOperation;
    type IntoIter = std::slice::Iter<'a, ProcessedOperation>;

    fn into_iter(self) -> Self::IntoIter {
        self.bottom_up()
    }
}

/// The two result lists the security engine produces for one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityResults {
    /// Every processed operation
    pub results: ProcessedResults,
    /// Operations whose signatures were verified, independently ordered
    pub signed_results: ProcessedResults,
}

impl SecurityResults {
    pub fn new(results: ProcessedResults, signed_results: ProcessedResults) -> Self {
        Self {
            results,
            signed_results,
        }
    }
}

/// Hand-written form of [`SecurityResults`].
///
/// Both lists are written top of header first, including `signed_results`,
/// which names operations from `results` by id. Each list is reversed once
/// into engine order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultsDocument {
    /// Message identifier used in logs
    pub message_id: Option<String>,
    /// SOAP operation the message invoked
    pub operation: Option<String>,
    pub results: Vec<ProcessedOperation>,
    pub signed_results: Vec<OperationId>,
}

impl ResultsDocument {
    /// Parse a results document from YAML.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, LayoutError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Resolve signed ids and convert both lists to engine order.
    pub fn into_security_results(self) -> Result<SecurityResults, LayoutError> {
        let mut seen = HashSet::new();
        for op in &self.results {
            if !seen.insert(op.id) {
                return Err(LayoutError::DuplicateOperation(op.id));
            }
        }

        let by_id: HashMap<OperationId, &ProcessedOperation> =
            self.results.iter().map(|op| (op.id, op)).collect();

        let mut signed_seen = HashSet::new();
        let signed = self
            .signed_results
            .iter()
            .map(|id| {
                if !signed_seen.insert(*id) {
                    return Err(LayoutError::DuplicateOperation(*id));
                }
                by_id
                    .get(id)
                    .map(|op| (*op).clone())
                    .ok_or(LayoutError::UnknownOperation(*id))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SecurityResults::new(
            ProcessedResults::from_header_order(self.results),
            ProcessedResults::from_header_order(signed),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
message_id: msg-1
operation: GetUser
results:
  - id: 1
    token_element: 10
    action: timestamp
  - id: 2
    token_element: 11
    action: binary_security_token
    kind: x509
    certificate: "CN=alice"
  - id: 3
    token_element: 12
    action: sign
    certificate: "CN=alice"
    data_refs:
      - xpath: /soap:Envelope/soap:Header/wsse:Security/wsu:Timestamp
        protected_element: 10
signed_results: [3]
"#;

    #[test]
    fn test_header_child_xpath() {
        let header = SignedReference::new(ElementId(1))
            .with_xpath("/soap:Envelope/soap:Header/wsse:Security/wsu:Timestamp");
        assert!(header.is_security_header_child());

        let trailing = SignedReference::new(ElementId(1))
            .with_xpath("/soap:Envelope/soap:Header/wsse:Security/wsu:Timestamp/");
        assert!(trailing.is_security_header_child());

        let body = SignedReference::new(ElementId(2)).with_xpath("/soap:Envelope/soap:Body");
        assert!(!body.is_security_header_child());

        let nested = SignedReference::new(ElementId(3))
            .with_xpath("/soap:Envelope/soap:Header/wsse:Security/saml:Assertion/saml:Subject");
        assert!(!nested.is_security_header_child());

        assert!(!SignedReference::new(ElementId(4)).is_security_header_child());
    }

    #[test]
    fn test_covers_signature() {
        let sig = SignedReference::new(ElementId(1)).with_name(QName::new(DSIG_NS, SIGNATURE_LN));
        assert!(sig.covers_signature());

        let other = SignedReference::new(ElementId(1)).with_name(QName::new("urn:other", SIGNATURE_LN));
        assert!(!other.covers_signature());
        assert!(!SignedReference::new(ElementId(1)).covers_signature());
    }

    #[test]
    fn test_action_kind() {
        let signed = SecurityAction::SamlToken(SamlTokenAction {
            signed: true,
            ..Default::default()
        });
        assert_eq!(signed.kind(), ActionKind::SignedSamlToken);
        assert_eq!(
            SecurityAction::SamlToken(SamlTokenAction::default()).kind(),
            ActionKind::UnsignedSamlToken
        );
        assert!(SecurityAction::Timestamp.data_refs().is_none());
    }

    #[test]
    fn test_header_order_is_reversed() {
        let results = ProcessedResults::from_header_order(vec![
            ProcessedOperation::new(1, SecurityAction::Timestamp),
            ProcessedOperation::new(2, SecurityAction::Sign(SignatureAction::default())),
        ]);
        assert_eq!(results.top_of_header().map(|op| op.id), Some(OperationId(1)));
        assert_eq!(results.bottom_of_header().map(|op| op.id), Some(OperationId(2)));
        assert_eq!(results.get(1).map(|op| op.id), Some(OperationId(1)));
    }

    #[test]
    fn test_results_document() {
        let doc = ResultsDocument::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(doc.operation.as_deref(), Some("GetUser"));

        let results = doc.into_security_results().unwrap();
        assert_eq!(results.results.len(), 3);
        assert_eq!(results.results.bottom_of_header().map(|op| op.kind()), Some(ActionKind::Sign));
        assert_eq!(results.results.top_of_header().map(|op| op.kind()), Some(ActionKind::Timestamp));

        let signed = results.signed_results.get(0).unwrap();
        assert_eq!(signed.id, OperationId(3));
        let refs = signed.data_refs().unwrap();
        assert_eq!(refs[0].protected_element, ElementId(10));
        assert!(refs[0].is_security_header_child());
    }

    #[test]
    fn test_results_document_unknown_signed_id() {
        let doc = ResultsDocument {
            results: vec![ProcessedOperation::new(1, SecurityAction::Timestamp)],
            signed_results: vec![OperationId(9)],
            ..Default::default()
        };
        let err = doc.into_security_results().unwrap_err();
        assert!(matches!(err, LayoutError::UnknownOperation(OperationId(9))));
    }

    #[test]
    fn test_results_document_duplicate_id() {
        let doc = ResultsDocument {
            results: vec![
                ProcessedOperation::new(1, SecurityAction::Timestamp),
                ProcessedOperation::new(1, SecurityAction::UsernameToken),
            ],
            ..Default::default()
        };
        let err = doc.into_security_results().unwrap_err();
        assert!(matches!(err, LayoutError::DuplicateOperation(OperationId(1))));
    }

    #[test]
    fn test_results_document_duplicate_signed_id() {
        let doc = ResultsDocument {
            results: vec![ProcessedOperation::new(1, SecurityAction::Timestamp)],
            signed_results: vec![OperationId(1), OperationId(1)],
            ..Default::default()
        };
        let err = doc.into_security_results().unwrap_err();
        assert!(matches!(err, LayoutError::DuplicateOperation(OperationId(1))));
    }

    #[test]
    fn test_signed_results_follow_header_order() {
        // Endorsing signature 4 sits below the signature 3 it endorses.
        let yaml = r#"
results:
  - id: 1
    token_element: 10
    action: timestamp
  - id: 3
    token_element: 12
    action: sign
    data_refs:
      - xpath: /soap:Envelope/soap:Header/wsse:Security/wsu:Timestamp
        protected_element: 10
  - id: 4
    token_element: 13
    action: sign
    data_refs:
      - xpath: /soap:Envelope/soap:Header/wsse:Security/ds:Signature
        protected_element: 12
        covered_name: "{http://www.w3.org/2000/09/xmldsig#}Signature"
signed_results: [3, 4]
"#;
        let results = ResultsDocument::from_yaml_str(yaml)
            .unwrap()
            .into_security_results()
            .unwrap();

        let signed: Vec<_> = results.signed_results.bottom_up().map(|op| op.id).collect();
        assert_eq!(signed, vec![OperationId(4), OperationId(3)]);
        assert!(crate::validator::check_layout(Some(crate::policy::LayoutType::Strict), &results).is_ok());
    }
}
