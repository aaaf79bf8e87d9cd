//! Engine configuration.
//!
//! Every setting has a default; `from_env` overrides them from `PRAXIS_*`
//! variables. Unparseable values are logged and replaced by the default, as
//! are day counts above [`MAX_DUE_DAYS`].

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use praxis_billing::MAX_DUE_DAYS;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub invoice_prefix: String,
    pub proposal_prefix: String,
    pub sequence_min_digits: usize,
    pub default_payment_terms_days: u32,
    pub default_currency: String,
    pub proposal_validity_days: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            invoice_prefix: "INV".to_string(),
            proposal_prefix: "PROP".to_string(),
            sequence_min_digits: 4,
            default_payment_terms_days: 30,
            default_currency: "USD".to_string(),
            proposal_validity_days: 30,
        }
    }
}

impl WorkflowConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            invoice_prefix: text(&lookup, "PRAXIS_INVOICE_PREFIX", defaults.invoice_prefix),
            proposal_prefix: text(&lookup, "PRAXIS_PROPOSAL_PREFIX", defaults.proposal_prefix),
            sequence_min_digits: parsed(
                &lookup,
                "PRAXIS_SEQUENCE_MIN_DIGITS",
                defaults.sequence_min_digits,
            ),
            default_payment_terms_days: days(
                &lookup,
                "PRAXIS_DEFAULT_PAYMENT_TERMS_DAYS",
                defaults.default_payment_terms_days,
            ),
            default_currency: text(&lookup, "PRAXIS_DEFAULT_CURRENCY", defaults.default_currency),
            proposal_validity_days: days(
                &lookup,
                "PRAXIS_PROPOSAL_VALIDITY_DAYS",
                defaults.proposal_validity_days,
            ),
        }
    }
}

fn text(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: String) -> String {
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => value.trim().to_string(),
        Some(_) => {
            warn!(key, default = %default, "empty configuration value, using default");
            default
        }
        None => default,
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + core::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            warn!(key, value = %raw, default = %default, "invalid configuration value, using default");
            default
        }
    }
}

fn days(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u32) -> u32 {
    let value = parsed(lookup, key, default);
    if value > MAX_DUE_DAYS {
        warn!(key, value, max = MAX_DUE_DAYS, default, "day count out of range, using default");
        return default;
    }
    value
}
