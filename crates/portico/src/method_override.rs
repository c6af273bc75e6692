//! Method-override shim for verb-restricted upstream transports.
//!
//! The internal upstream cannot receive DELETE, PATCH, or PUT directly.
//! For those verbs the shim rewrites the outbound method to POST and
//! sets `x-http-method-override` to the original verb so the upstream
//! application layer can recover intent.

use std::collections::HashSet;

use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::Method;

use crate::error::{GatewayError, GatewayResult};

/// Marker header carrying the original verb.
pub static OVERRIDE_HEADER: HeaderName = HeaderName::from_static("x-http-method-override");

/// Default set of verbs that trigger the shim.
pub const DEFAULT_OVERRIDE_VERBS: &[&str] = &["DELETE", "PATCH", "PUT"];

/// The method-override shim.
#[derive(Debug, Clone)]
pub struct MethodOverride {
    verbs: HashSet<Method>,
}

impl MethodOverride {
    /// Build a shim from configured verb names.
    pub fn new(verbs: &[String]) -> GatewayResult<Self> {
        let verbs = verbs
            .iter()
            .map(|v| {
                Method::from_bytes(v.to_ascii_uppercase().as_bytes())
                    .map_err(|_| GatewayError::config(format!("invalid override verb: {v}")))
            })
            .collect::<GatewayResult<HashSet<Method>>>()?;

        Ok(Self { verbs })
    }

    /// Whether a verb triggers the shim.
    pub fn applies_to(&self, method: &Method) -> bool {
        self.verbs.contains(method)
    }

    /// Apply the shim to an outbound method and header set.
    ///
    /// The verb rewrite is unconditional for the configured set: a
    /// client-supplied marker header never keeps a restricted verb on
    /// the wire. The marker itself is only derived when absent, and
    /// applying twice is a no-op because POST is outside the verb set.
    pub fn apply(&self, method: &mut Method, headers: &mut HeaderMap) {
        if !self.verbs.contains(method) {
            return;
        }

        if !headers.contains_key(&OVERRIDE_HEADER) {
            if let Ok(value) = HeaderValue::from_str(method.as_str()) {
                headers.insert(OVERRIDE_HEADER.clone(), value);
            }
        }

        *method = Method::POST;
    }
}

impl Default for MethodOverride {
    fn default() -> Self {
        let verbs = DEFAULT_OVERRIDE_VERBS
            .iter()
            .map(|v| Method::from_bytes(v.as_bytes()).expect("default verbs are valid"))
            .collect();
        Self { verbs }
    }
}
