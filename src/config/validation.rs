//! Configuration validation.
//!
//! Serde handles syntax; this module checks values that parse but cannot
//! work: missing chains, duplicate chain ids, zero intervals, malformed URLs.
//! Every problem is reported, not just the first.

use std::collections::HashSet;

use crate::config::schema::SchedulerConfig;

/// One semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a parsed configuration, returning all errors found.
pub fn validate_config(config: &SchedulerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.chains.is_empty() {
        errors.push(ValidationError::new("chains", "at least one chain is required"));
    }

    let mut seen = HashSet::new();
    for (i, chain) in config.chains.iter().enumerate() {
        let field = |name: &str| format!("chains[{i}].{name}");

        if !seen.insert(chain.chain_id) {
            errors.push(ValidationError::new(
                field("chain_id"),
                format!("duplicate chain id {}", chain.chain_id),
            ));
        }
        if url::Url::parse(&chain.rpc_url).is_err() {
            errors.push(ValidationError::new(
                field("rpc_url"),
                format!("invalid URL '{}'", chain.rpc_url),
            ));
        }
        if chain.poll_interval_ms == 0 {
            errors.push(ValidationError::new(field("poll_interval_ms"), "must be > 0"));
        }
        if chain.rpc_timeout_secs == 0 {
            errors.push(ValidationError::new(field("rpc_timeout_secs"), "must be > 0"));
        }
        if let Some(oracle) = &chain.gas_oracle_url {
            if url::Url::parse(oracle).is_err() {
                errors.push(ValidationError::new(
                    field("gas_oracle_url"),
                    format!("invalid URL '{oracle}'"),
                ));
            }
        }
    }

    if config.executor.confirmations == 0 {
        errors.push(ValidationError::new("executor.confirmations", "must be > 0"));
    }

    if config.storage.path.trim().is_empty() {
        errors.push(ValidationError::new("storage.path", "must not be empty"));
    }
    if config.storage.flush_interval_ms == 0 {
        errors.push(ValidationError::new("storage.flush_interval_ms", "must be > 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
