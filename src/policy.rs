//! WS-SecurityPolicy assertion catalog.
//!
//! The policy engine hands the validator a catalog of the assertions declared
//! by the effective policy alternative. The validator reads the declared
//! Layout rule from each Layout assertion and writes the outcome back by
//! marking assertions asserted or not asserted.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// XML Signature namespace.
pub const DSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
/// WS-SecurityPolicy 1.1 namespace.
pub const SP11_NS: &str = "http://schemas.xmlsoap.org/ws/2005/07/securitypolicy";
/// WS-SecurityPolicy 1.2 namespace.
pub const SP12_NS: &str = "http://docs.oasis-open.org/ws-sx/ws-securitypolicy/200702";
/// WS-SecurityPolicy 1.3 namespace.
pub const SP13_NS: &str = "http://docs.oasis-open.org/ws-sx/ws-securitypolicy/200802";

/// Local name of the Layout assertion.
pub const LAYOUT_LN: &str = "Layout";

/// An XML qualified name, written as `{namespace}local` in text form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QName {
    namespace: String,
    local_part: String,
}

impl QName {
    pub fn new(namespace: impl Into<String>, local_part: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local_part: local_part.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn local_part(&self) -> &str {
        &self.local_part
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.local_part)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local_part)
        }
    }
}

impl FromStr for QName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix('{') {
            Some(rest) => {
                let (namespace, local) = rest
                    .split_once('}')
                    .ok_or_else(|| format!("Unterminated namespace in qualified name '{}'", s))?;
                if local.is_empty() {
                    return Err(format!("Missing local part in qualified name '{}'", s));
                }
                Ok(Self::new(namespace, local))
            }
            None if s.is_empty() => Err("Empty qualified name".to_string()),
            None => Ok(Self::new("", s)),
        }
    }
}

impl TryFrom<String> for QName {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<QName> for String {
    fn from(name: QName) -> Self {
        name.to_string()
    }
}

/// WS-SecurityPolicy versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityPolicyVersion {
    Sp11,
    #[default]
    Sp12,
    Sp13,
}

impl SecurityPolicyVersion {
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Sp11 => SP11_NS,
            Self::Sp12 => SP12_NS,
            Self::Sp13 => SP13_NS,
        }
    }
}

/// Declared security-header layout rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayoutType {
    /// No ordering constraint
    Lax,
    /// Timestamp must be the first header element
    LaxTsFirst,
    /// Timestamp must be the last header element
    LaxTsLast,
    /// Tokens before their signatures, no out of order header tokens
    Strict,
}

impl LayoutType {
    /// Local name of the nested policy assertion for this layout.
    pub fn local_name(&self) -> &'static str {
        match self {
            Self::Lax => "Lax",
            Self::LaxTsFirst => "LaxTsFirst",
            Self::LaxTsLast => "LaxTsLast",
            Self::Strict => "Strict",
        }
    }
}

/// A Layout assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutAssertion {
    /// Namespace the assertion was declared in
    pub namespace: String,
    /// Declared layout; `None` places no constraint
    pub layout_type: Option<LayoutType>,
}

impl LayoutAssertion {
    pub fn new(version: SecurityPolicyVersion, layout_type: Option<LayoutType>) -> Self {
        Self {
            namespace: version.namespace().to_string(),
            layout_type,
        }
    }

    pub fn name(&self) -> QName {
        QName::new(self.namespace.clone(), LAYOUT_LN)
    }

    /// Name of the nested layout policy, if a layout is declared.
    pub fn nested_policy_name(&self) -> Option<QName> {
        self.layout_type
            .map(|layout| QName::new(self.namespace.clone(), layout.local_name()))
    }
}

/// Assertion payloads the catalog can carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyAssertion {
    Layout(LayoutAssertion),
    /// Assertion with no payload of interest (e.g. a nested layout policy)
    Marker,
}

/// Tracking record for one declared assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionInfo {
    name: QName,
    assertion: PolicyAssertion,
    asserted: bool,
    error_message: Option<String>,
}

impl AssertionInfo {
    pub fn new(name: QName, assertion: PolicyAssertion) -> Self {
        Self {
            name,
            assertion,
            asserted: false,
            error_message: None,
        }
    }

    pub fn layout(assertion: LayoutAssertion) -> Self {
        Self::new(assertion.name(), PolicyAssertion::Layout(assertion))
    }

    pub fn marker(name: QName) -> Self {
        Self::new(name, PolicyAssertion::Marker)
    }

    pub fn name(&self) -> &QName {
        &self.name
    }

    /// The declared Layout assertion, if this record holds one.
    pub fn layout_assertion(&self) -> Option<&LayoutAssertion> {
        match &self.assertion {
            PolicyAssertion::Layout(layout) => Some(layout),
            PolicyAssertion::Marker => None,
        }
    }

    pub fn is_asserted(&self) -> bool {
        self.asserted
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn set_asserted(&mut self, asserted: bool) {
        self.asserted = asserted;
        if asserted {
            self.error_message = None;
        }
    }

    pub fn set_not_asserted(&mut self, reason: impl Into<String>) {
        self.asserted = false;
        self.error_message = Some(reason.into());
    }
}

/// Catalog of declared assertions for one message exchange.
pub trait AssertionCatalog {
    /// All assertions whose local name is `local_name`, in any namespace.
    fn assertions_by_local_name(&mut self, local_name: &str) -> Vec<&mut AssertionInfo>;

    /// Mark every assertion named `name` as asserted.
    fn assert_policy(&mut self, name: &QName);
}

/// In-memory [`AssertionCatalog`] keyed by assertion name.
#[derive(Debug, Clone, Default)]
pub struct AssertionInfoMap {
    assertions: HashMap<QName, Vec<AssertionInfo>>,
}

impl AssertionInfoMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a declared assertion.
    pub fn insert(&mut self, info: AssertionInfo) {
        self.assertions
            .entry(info.name().clone())
            .or_default()
            .push(info);
    }

    /// Register a Layout assertion together with its nested layout policy.
    pub fn insert_layout(&mut self, assertion: LayoutAssertion) {
        if let Some(nested) = assertion.nested_policy_name() {
            if !self.assertions.contains_key(&nested) {
                self.insert(AssertionInfo::marker(nested));
            }
        }
        self.insert(AssertionInfo::layout(assertion));
    }

    pub fn get(&self, name: &QName) -> &[AssertionInfo] {
        self.assertions.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = &AssertionInfo> {
        self.assertions.values().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.assertions.is_empty()
    }

    /// Whether every registered assertion has been asserted.
    pub fn all_asserted(&self) -> bool {
        self.iter().all(AssertionInfo::is_asserted)
    }
}

impl AssertionCatalog for AssertionInfoMap {
    fn assertions_by_local_name(&mut self, local_name: &str) -> Vec<&mut AssertionInfo> {
        self.assertions
            .iter_mut()
            .filter(|(name, _)| name.local_part() == local_name)
            .flat_map(|(_, infos)| infos.iter_mut())
            .collect()
    }

    fn assert_policy(&mut self, name: &QName) {
        if let Some(infos) = self.assertions.get_mut(name) {
            for info in infos {
                info.set_asserted(true);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qname_text_form() {
        let name: QName = "{http://www.w3.org/2000/09/xmldsig#}Signature".parse().unwrap();
        assert_eq!(name.namespace(), DSIG_NS);
        assert_eq!(name.local_part(), "Signature");
        assert_eq!(name.to_string(), "{http://www.w3.org/2000/09/xmldsig#}Signature");

        let bare: QName = "Timestamp".parse().unwrap();
        assert_eq!(bare.namespace(), "");
        assert_eq!(bare.to_string(), "Timestamp");

        assert!("{urn:x".parse::<QName>().is_err());
        assert!("{urn:x}".parse::<QName>().is_err());
        assert!("".parse::<QName>().is_err());
    }

    #[test]
    fn test_qname_yaml() {
        let name: QName = serde_yaml::from_str("\"{urn:a}B\"").unwrap();
        assert_eq!(name, QName::new("urn:a", "B"));
    }

    #[test]
    fn test_nested_policy_name() {
        let layout = LayoutAssertion::new(SecurityPolicyVersion::Sp12, Some(LayoutType::LaxTsFirst));
        assert_eq!(layout.name(), QName::new(SP12_NS, LAYOUT_LN));
        assert_eq!(layout.nested_policy_name(), Some(QName::new(SP12_NS, "LaxTsFirst")));

        let undeclared = LayoutAssertion::new(SecurityPolicyVersion::Sp11, None);
        assert!(undeclared.nested_policy_name().is_none());
    }

    #[test]
    fn test_lookup_by_local_name_across_namespaces() {
        let mut map = AssertionInfoMap::new();
        map.insert_layout(LayoutAssertion::new(SecurityPolicyVersion::Sp11, Some(LayoutType::Strict)));
        map.insert_layout(LayoutAssertion::new(SecurityPolicyVersion::Sp12, Some(LayoutType::Lax)));
        map.insert(AssertionInfo::marker(QName::new(SP12_NS, "IncludeTimestamp")));

        assert_eq!(map.assertions_by_local_name(LAYOUT_LN).len(), 2);
        assert_eq!(map.assertions_by_local_name("Strict").len(), 1);
        assert!(map.assertions_by_local_name("Unknown").is_empty());
    }

    #[test]
    fn test_assert_and_reject() {
        let mut map = AssertionInfoMap::new();
        map.insert_layout(LayoutAssertion::new(SecurityPolicyVersion::Sp12, Some(LayoutType::Strict)));
        assert!(!map.all_asserted());

        map.assert_policy(&QName::new(SP12_NS, "Strict"));
        assert!(map.get(&QName::new(SP12_NS, "Strict"))[0].is_asserted());

        for info in map.assertions_by_local_name(LAYOUT_LN) {
            info.set_not_asserted("bad layout");
        }
        let layout = &map.get(&QName::new(SP12_NS, LAYOUT_LN))[0];
        assert!(!layout.is_asserted());
        assert_eq!(layout.error_message(), Some("bad layout"));
        assert!(layout.layout_assertion().is_some());
    }
}
