use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SfqError};

/// How the registry treats two candidates under one name that accept a common arity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Reject the later registration with `DuplicateRegistration`.
    #[default]
    Reject,
    /// Keep both; resolution picks the earliest registered candidate.
    FirstMatch,
}

impl FromStr for OverlapPolicy {
    type Err = SfqError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "first_match" | "first-match" => Ok(Self::FirstMatch),
            other => Err(SfqError::InvalidConfig(format!(
                "unknown overlap policy '{other}', expected reject|first_match"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub overlap_policy: OverlapPolicy,
    /// Lowercase names on registration and lookup.
    pub case_insensitive_names: bool,
    /// Highest arity probed when checking two candidates for overlap.
    pub max_probe_arity: usize,
    /// Wrap registered UDFs so every call is counted and timed.
    pub record_call_metrics: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            overlap_policy: OverlapPolicy::Reject,
            case_insensitive_names: true,
            max_probe_arity: 64,
            record_call_metrics: false,
        }
    }
}

impl RegistryConfig {
    /// Defaults overlaid with `SFQ_UDF_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values returned by `lookup` for the `SFQ_UDF_*` keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(raw) = lookup("SFQ_UDF_OVERLAP_POLICY") {
            cfg.overlap_policy = raw.parse()?;
        }
        if let Some(raw) = lookup("SFQ_UDF_CASE_INSENSITIVE") {
            cfg.case_insensitive_names = parse_bool("SFQ_UDF_CASE_INSENSITIVE", &raw)?;
        }
        if let Some(raw) = lookup("SFQ_UDF_MAX_PROBE_ARITY") {
            cfg.max_probe_arity = raw.trim().parse::<usize>().map_err(|e| {
                SfqError::InvalidConfig(format!("SFQ_UDF_MAX_PROBE_ARITY='{raw}': {e}"))
            })?;
        }
        if let Some(raw) = lookup("SFQ_UDF_CALL_METRICS") {
            cfg.record_call_metrics = parse_bool("SFQ_UDF_CALL_METRICS", &raw)?;
        }
        Ok(cfg)
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SfqError::InvalidConfig(format!(
            "{key}='{raw}' is not a boolean"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_reject_overlaps() {
        let cfg = RegistryConfig::default();
        assert_eq!(cfg.overlap_policy, OverlapPolicy::Reject);
        assert!(cfg.case_insensitive_names);
        assert_eq!(cfg.max_probe_arity, 64);
        assert!(!cfg.record_call_metrics);
    }

    #[test]
    fn env_overlay_parses_every_key() {
        let cfg = RegistryConfig::from_lookup(lookup_from(&[
            ("SFQ_UDF_OVERLAP_POLICY", "first_match"),
            ("SFQ_UDF_CASE_INSENSITIVE", "off"),
            ("SFQ_UDF_MAX_PROBE_ARITY", "16"),
            ("SFQ_UDF_CALL_METRICS", "1"),
        ]))
        .expect("config");
        assert_eq!(cfg.overlap_policy, OverlapPolicy::FirstMatch);
        assert!(!cfg.case_insensitive_names);
        assert_eq!(cfg.max_probe_arity, 16);
        assert!(cfg.record_call_metrics);
    }

    #[test]
    fn env_overlay_rejects_bad_values() {
        let err = RegistryConfig::from_lookup(lookup_from(&[("SFQ_UDF_OVERLAP_POLICY", "last")]))
            .expect_err("bad policy");
        assert!(matches!(err, SfqError::InvalidConfig(_)));
        let err = RegistryConfig::from_lookup(lookup_from(&[("SFQ_UDF_CALL_METRICS", "maybe")]))
            .expect_err("bad bool");
        assert!(err.to_string().contains("SFQ_UDF_CALL_METRICS"));
    }

    #[test]
    fn deserializes_partial_json() {
        let cfg: RegistryConfig =
            serde_json::from_str(r#"{"overlap_policy":"first_match"}"#).expect("json");
        assert_eq!(cfg.overlap_policy, OverlapPolicy::FirstMatch);
        assert_eq!(cfg.max_probe_arity, 64);
    }
}
