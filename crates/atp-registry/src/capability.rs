//! Adapter capability records (spec §4.3 "Registration").
//!
//! An adapter advertises via a CAPABILITY frame or static config; the
//! registry validates the schema and stores an [`AdapterCapability`].
//! Re-advertisement is idempotent — advertising the same content again is a
//! no-op, and a material change bumps `version`.

use std::collections::BTreeSet;

use crate::errors::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct AdapterCapability {
    pub adapter_id: String,
    pub version: u32,
    pub models: Vec<String>,
    pub max_tokens: u64,
    pub supported_languages: BTreeSet<String>,
    pub feature_bits: BTreeSet<String>,
    pub cost_per_input_token_micros: f64,
    pub cost_per_output_token_micros: f64,
    pub cost_per_request_micros: f64,
}

impl AdapterCapability {
    pub fn validate(&self) -> Result<()> {
        if self.adapter_id.is_empty() {
            return Err(Error::InvalidCapability {
                adapter_id: self.adapter_id.clone(),
                reason: "adapter_id must not be empty".into(),
            });
        }
        if self.models.is_empty() {
            return Err(Error::InvalidCapability {
                adapter_id: self.adapter_id.clone(),
                reason: "must advertise at least one model".into(),
            });
        }
        if self.max_tokens == 0 {
            return Err(Error::InvalidCapability {
                adapter_id: self.adapter_id.clone(),
                reason: "max_tokens must be positive".into(),
            });
        }
        Ok(())
    }

    /// Whether this capability is a *material* change relative to `other`
    /// (anything beyond floating-point cost jitter), i.e. one that should
    /// bump `version` rather than be treated as a duplicate re-advertisement.
    pub fn materially_differs_from(&self, other: &AdapterCapability) -> bool {
        self.models != other.models
            || self.max_tokens != other.max_tokens
            || self.supported_languages != other.supported_languages
            || self.feature_bits != other.feature_bits
    }
}

/// What a candidate request needs an adapter to support, used by
/// `AdapterRegistry::list_compatible` (spec §4.3 "Queries").
#[derive(Debug, Clone, Default)]
pub struct CapabilityRequest {
    pub required_languages: BTreeSet<String>,
    pub required_features: BTreeSet<String>,
    pub min_max_tokens: u64,
}

impl AdapterCapability {
    pub fn satisfies(&self, request: &CapabilityRequest) -> bool {
        self.max_tokens >= request.min_max_tokens
            && request.required_languages.is_subset(&self.supported_languages)
            && request.required_features.is_subset(&self.feature_bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cap() -> AdapterCapability {
        AdapterCapability {
            adapter_id: "adapter-a".into(),
            version: 1,
            models: vec!["model-x".into()],
            max_tokens: 8192,
            supported_languages: ["en", "fr"].iter().map(|s| s.to_string()).collect(),
            feature_bits: ["streaming"].iter().map(|s| s.to_string()).collect(),
            cost_per_input_token_micros: 1.0,
            cost_per_output_token_micros: 2.0,
            cost_per_request_micros: 0.0,
        }
    }

    #[test]
    fn rejects_empty_adapter_id() {
        let mut c = cap();
        c.adapter_id.clear();
        assert!(c.validate().is_err());
    }

    #[test]
    fn satisfies_checks_language_and_feature_subsets() {
        let c = cap();
        let mut req = CapabilityRequest::default();
        req.required_languages.insert("en".into());
        req.required_features.insert("streaming".into());
        req.min_max_tokens = 4096;
        assert!(c.satisfies(&req));

        req.required_languages.insert("de".into());
        assert!(!c.satisfies(&req));
    }

    #[test]
    fn material_change_detection_ignores_cost_jitter() {
        let a = cap();
        let mut b = cap();
        b.cost_per_input_token_micros = 1.0001;
        assert!(!a.materially_differs_from(&b));
        b.max_tokens = 4096;
        assert!(a.materially_differs_from(&b));
    }
}
