//! WS-Security Layout policy validator for Zentinel
//!
//! Checks the physical placement of security-header children against the
//! Layout assertion declared by WS-SecurityPolicy, using the ordered results
//! the security processing engine produced for an inbound SOAP message.
//!
//! # Features
//!
//! - Timestamp placement (`LaxTsFirst`, `LaxTsLast`)
//! - Strict layout: covered header tokens, signing tokens (X.509, PKIPath,
//!   SAML holder-of-key, raw keys) and endorsing signatures in header order
//! - Policy assertion catalog with asserted / not asserted tracking
//! - Operation-bound policy configuration (YAML, glob patterns)
//!
//! # Example
//!
//! ```ignore
//! use zentinel_wss_layout::{LayoutEnforcer, LayoutValidatorConfig};
//!
//! let enforcer = LayoutEnforcer::new(config)?;
//! let outcome = enforcer.enforce("msg-1", Some("GetUser"), &results);
//! if outcome.is_rejected() {
//!     // reply with a SOAP fault
//! }
//! ```

pub mod config;
pub mod enforcer;
pub mod error;
pub mod policy;
pub mod results;
pub mod validator;

pub use config::LayoutValidatorConfig;
pub use enforcer::{Decision, EnforcementOutcome, LayoutEnforcer};
pub use error::{LayoutError, Violation, ViolationCode};
pub use policy::{AssertionCatalog, AssertionInfoMap, LayoutType};
pub use results::{ProcessedResults, ResultsDocument, SecurityResults};
pub use validator::LayoutPolicyValidator;
