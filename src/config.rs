//! Policy & configuration (C6).
//!
//! Loaded once at startup from a TOML document; thresholds, tier/feature
//! flags, and the error taxonomy's knobs all live here. Hot-reload is
//! supported by the wrapper via `arc_swap::ArcSwap<PolicyConfig>` — readers
//! always see a fully-validated config, never a partial one.

use crate::error::VerifyError;
use crate::types::RiskFactors;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Community,
    Professional,
    Enterprise,
}

impl Tier {
    pub fn allows_batch_zk_proofs(self) -> bool {
        matches!(self, Tier::Professional | Tier::Enterprise)
    }

    pub fn allows_compliance_reporting(self) -> bool {
        matches!(self, Tier::Enterprise)
    }
}

fn default_min_sources() -> u32 {
    3
}
fn default_sample_window() -> usize {
    32
}
fn default_max_sample_age_secs() -> u64 {
    60
}
fn default_outlier_threshold() -> f64 {
    0.02
}
fn default_manipulation_alert_threshold() -> f64 {
    0.8
}
fn default_max_market_staleness_secs() -> u64 {
    30
}
fn default_cache_ttl_secs() -> u64 {
    30
}
fn default_cache_bytes_budget() -> usize {
    64 * 1024 * 1024
}
fn default_approve_floor() -> f64 {
    80.0
}
fn default_reject_ceiling() -> f64 {
    50.0
}
fn default_per_detector_deadline_ms() -> u64 {
    150
}
fn default_prove_deadline_ms() -> u64 {
    500
}
fn default_total_deadline_ms() -> u64 {
    1_000
}
fn default_audit_backpressure_timeout_ms() -> u64 {
    250
}
fn default_min_latency_budget_ms() -> u64 {
    10
}
fn default_tier() -> Tier {
    Tier::Community
}
fn default_policy_version() -> u32 {
    1
}
fn default_vol_reference() -> f64 {
    1.0
}
fn default_max_position_frac() -> f64 {
    0.2
}
fn default_portfolio_value() -> f64 {
    100_000.0
}
fn default_alpha_beta_gamma() -> (f64, f64, f64) {
    (0.6, 0.3, 0.1)
}
fn default_early_block() -> bool {
    true
}
fn default_volatility_threshold() -> f64 {
    0.6
}
fn default_liquidity_threshold() -> f64 {
    0.5
}
fn default_oversize_threshold() -> f64 {
    0.5
}
fn default_manipulation_factor_threshold() -> f64 {
    0.5
}
fn default_risk_level_low() -> f64 {
    85.0
}
fn default_risk_level_medium() -> f64 {
    70.0
}
fn default_risk_level_high() -> f64 {
    50.0
}
fn default_blacklisted_assets() -> Vec<String> {
    Vec::new()
}
fn default_allowed_venues() -> Vec<String> {
    Vec::new()
}

fn default_trust_weights() -> HashMap<String, f64> {
    let mut m = HashMap::new();
    m.insert("volatility".to_string(), 0.3);
    m.insert("liquidity".to_string(), 0.25);
    m.insert("oversize".to_string(), 0.25);
    m.insert("manipulation".to_string(), 0.2);
    m
}

fn default_hard_block_set() -> Vec<String> {
    vec![
        "hallucination_detected".to_string(),
        "policy_breach".to_string(),
        "consensus_break".to_string(),
    ]
}

/// Declarative configuration document (TOML). Unknown keys are errors in
/// strict mode (the default) unless `allow_unknown` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawPolicyConfig {
    #[serde(default)]
    pub allow_unknown: bool,

    #[serde(default = "default_min_sources")]
    pub min_sources: u32,
    #[serde(default = "default_sample_window")]
    pub sample_window: usize,
    #[serde(default = "default_max_sample_age_secs")]
    pub max_sample_age_secs: u64,
    #[serde(default = "default_outlier_threshold")]
    pub outlier_threshold: f64,
    #[serde(default = "default_manipulation_alert_threshold")]
    pub manipulation_alert_threshold: f64,
    #[serde(default = "default_alpha_beta_gamma")]
    pub manipulation_weights: (f64, f64, f64),

    #[serde(default = "default_max_market_staleness_secs")]
    pub max_market_staleness_secs: u64,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_cache_bytes_budget")]
    pub cache_bytes_budget: usize,

    #[serde(default = "default_approve_floor")]
    pub approve_floor: f64,
    #[serde(default = "default_reject_ceiling")]
    pub reject_ceiling: f64,

    #[serde(default = "default_hard_block_set")]
    pub hard_block_set: Vec<String>,
    #[serde(default = "default_trust_weights")]
    pub trust_weights: HashMap<String, f64>,

    #[serde(default = "default_vol_reference")]
    pub vol_reference: f64,
    #[serde(default = "default_max_position_frac")]
    pub max_position_frac: f64,
    #[serde(default = "default_portfolio_value")]
    pub portfolio_value: f64,

    #[serde(default = "default_per_detector_deadline_ms")]
    pub per_detector_deadline_ms: u64,
    #[serde(default = "default_prove_deadline_ms")]
    pub prove_deadline_ms: u64,
    #[serde(default = "default_total_deadline_ms")]
    pub total_deadline_ms: u64,
    #[serde(default = "default_audit_backpressure_timeout_ms")]
    pub audit_backpressure_timeout_ms: u64,
    #[serde(default = "default_min_latency_budget_ms")]
    pub min_latency_budget_ms: u64,
    #[serde(default = "default_early_block")]
    pub early_block: bool,

    #[serde(default = "default_volatility_threshold")]
    pub volatility_threshold: f64,
    #[serde(default = "default_liquidity_threshold")]
    pub liquidity_threshold: f64,
    #[serde(default = "default_oversize_threshold")]
    pub oversize_threshold: f64,
    #[serde(default = "default_manipulation_factor_threshold")]
    pub manipulation_factor_threshold: f64,

    #[serde(default = "default_risk_level_low")]
    pub risk_level_low: f64,
    #[serde(default = "default_risk_level_medium")]
    pub risk_level_medium: f64,
    #[serde(default = "default_risk_level_high")]
    pub risk_level_high: f64,

    #[serde(default = "default_blacklisted_assets")]
    pub blacklisted_assets: Vec<String>,
    #[serde(default = "default_allowed_venues")]
    pub allowed_venues: Vec<String>,

    #[serde(default = "default_tier")]
    pub tier: Tier,
    #[serde(default = "default_policy_version")]
    pub policy_version: u32,
}

impl Default for RawPolicyConfig {
    fn default() -> Self {
        Self {
            allow_unknown: false,
            min_sources: default_min_sources(),
            sample_window: default_sample_window(),
            max_sample_age_secs: default_max_sample_age_secs(),
            outlier_threshold: default_outlier_threshold(),
            manipulation_alert_threshold: default_manipulation_alert_threshold(),
            manipulation_weights: default_alpha_beta_gamma(),
            max_market_staleness_secs: default_max_market_staleness_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_bytes_budget: default_cache_bytes_budget(),
            approve_floor: default_approve_floor(),
            reject_ceiling: default_reject_ceiling(),
            hard_block_set: default_hard_block_set(),
            trust_weights: default_trust_weights(),
            vol_reference: default_vol_reference(),
            max_position_frac: default_max_position_frac(),
            portfolio_value: default_portfolio_value(),
            per_detector_deadline_ms: default_per_detector_deadline_ms(),
            prove_deadline_ms: default_prove_deadline_ms(),
            total_deadline_ms: default_total_deadline_ms(),
            audit_backpressure_timeout_ms: default_audit_backpressure_timeout_ms(),
            min_latency_budget_ms: default_min_latency_budget_ms(),
            early_block: default_early_block(),
            volatility_threshold: default_volatility_threshold(),
            liquidity_threshold: default_liquidity_threshold(),
            oversize_threshold: default_oversize_threshold(),
            manipulation_factor_threshold: default_manipulation_factor_threshold(),
            risk_level_low: default_risk_level_low(),
            risk_level_medium: default_risk_level_medium(),
            risk_level_high: default_risk_level_high(),
            blacklisted_assets: default_blacklisted_assets(),
            allowed_venues: default_allowed_venues(),
            tier: default_tier(),
            policy_version: default_policy_version(),
        }
    }
}

/// Validated, ready-to-use policy. Constructed only via `PolicyConfig::load`
/// or `PolicyConfig::validate`, so every live instance already satisfies its
/// invariants (weights sum to 1, hard_block_set names are recognised).
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    pub raw: RawPolicyConfig,
    pub hard_block_set: RiskFactors,
    pub code_version: u32,
}

/// Derives a stable small integer from the crate version for embedding into
/// attestation commitments, per spec.md §6 ("code_version is part of the
/// commitment to prevent replay across rule changes").
pub fn code_version() -> u32 {
    let v = env!("CARGO_PKG_VERSION");
    let digest = sha2::Sha256::digest_str(v);
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

// Small helper trait so `code_version` reads naturally above without pulling
// in a throwaway `Sha256::new()/update()/finalize()` dance at the call site.
trait DigestStrExt {
    fn digest_str(s: &str) -> [u8; 32];
}
impl DigestStrExt for sha2::Sha256 {
    fn digest_str(s: &str) -> [u8; 32] {
        use sha2::Digest;
        let mut hasher = sha2::Sha256::new();
        hasher.update(s.as_bytes());
        hasher.finalize().into()
    }
}

fn parse_factor_name(name: &str) -> Result<RiskFactors, VerifyError> {
    let flag = match name {
        "high_volatility" => RiskFactors::HIGH_VOLATILITY,
        "thin_liquidity" => RiskFactors::THIN_LIQUIDITY,
        "oversized_position" => RiskFactors::OVERSIZED_POSITION,
        "stale_oracle" => RiskFactors::STALE_ORACLE,
        "consensus_break" => RiskFactors::CONSENSUS_BREAK,
        "policy_breach" => RiskFactors::POLICY_BREACH,
        "hallucination_detected" => RiskFactors::HALLUCINATION_DETECTED,
        "temporal_error" => RiskFactors::TEMPORAL_ERROR,
        "fabricated_citation" => RiskFactors::FABRICATED_CITATION,
        "factual_contradiction" => RiskFactors::FACTUAL_CONTRADICTION,
        "detector_timeout" => RiskFactors::DETECTOR_TIMEOUT,
        other => {
            return Err(VerifyError::ConfigInvalid(format!(
                "unrecognized risk factor in hard_block_set: {other}"
            )))
        }
    };
    Ok(flag)
}

impl PolicyConfig {
    /// Validate a raw, deserialized config and produce the ready-to-use form.
    /// Readers of an already-live `PolicyConfig` never observe a config that
    /// failed this check — hot reload validates the candidate fully before
    /// the atomic swap (see `wrapper::runtime::Wrapper::reload_policy`).
    pub fn validate(raw: RawPolicyConfig) -> Result<Self, VerifyError> {
        let weight_sum: f64 = raw.trust_weights.values().sum();
        if (weight_sum - 1.0).abs() > 1e-6 {
            return Err(VerifyError::ConfigInvalid(format!(
                "trust_weights must sum to 1.0, got {weight_sum}"
            )));
        }
        let (alpha, beta, gamma) = raw.manipulation_weights;
        if (alpha + beta + gamma - 1.0).abs() > 1e-6 {
            return Err(VerifyError::ConfigInvalid(format!(
                "manipulation_weights must sum to 1.0, got {}",
                alpha + beta + gamma
            )));
        }
        if !(0.0..=100.0).contains(&raw.approve_floor) {
            return Err(VerifyError::ConfigInvalid(
                "approve_floor must be in [0,100]".into(),
            ));
        }
        if raw.min_sources == 0 {
            return Err(VerifyError::ConfigInvalid(
                "min_sources must be >= 1".into(),
            ));
        }
        if !(raw.risk_level_low > raw.risk_level_medium && raw.risk_level_medium > raw.risk_level_high)
        {
            return Err(VerifyError::ConfigInvalid(
                "risk_level thresholds must satisfy low > medium > high".into(),
            ));
        }

        let mut hard_block_set = RiskFactors::empty();
        for name in &raw.hard_block_set {
            hard_block_set |= parse_factor_name(name)?;
        }

        Ok(Self {
            raw,
            hard_block_set,
            code_version: code_version(),
        })
    }

    /// Load and validate from a TOML file on disk.
    pub fn load(path: &Path) -> Result<Self, VerifyError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| VerifyError::ConfigInvalid(format!("reading {path:?}: {e}")))?;
        Self::load_str(&contents)
    }

    /// Load and validate from a TOML document already in memory.
    ///
    /// Strict mode (`allow_unknown = false`, the default) rejects unknown
    /// keys by attempting a `deny_unknown_fields` parse first; when that
    /// fails *and* a permissive parse shows `allow_unknown = true` was
    /// requested, falls back to the permissive parse.
    pub fn load_str(contents: &str) -> Result<Self, VerifyError> {
        match toml::from_str::<RawPolicyConfig>(contents) {
            Ok(raw) => Self::validate(raw),
            Err(strict_err) => {
                let permissive: toml::Value = toml::from_str(contents).map_err(|e| {
                    VerifyError::ConfigInvalid(format!("invalid TOML: {e}"))
                })?;
                let allow_unknown = permissive
                    .get("allow_unknown")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                if !allow_unknown {
                    return Err(VerifyError::ConfigInvalid(format!(
                        "unknown configuration key(s): {strict_err}"
                    )));
                }
                let mut raw = RawPolicyConfig::default();
                if let Some(table) = permissive.as_table() {
                    merge_known_fields(&mut raw, table)?;
                }
                raw.allow_unknown = true;
                Self::validate(raw)
            }
        }
    }

    pub fn max_sample_age(&self) -> Duration {
        Duration::from_secs(self.raw.max_sample_age_secs)
    }
    pub fn max_market_staleness(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.raw.max_market_staleness_secs as i64)
    }
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.raw.cache_ttl_secs)
    }
    pub fn per_detector_deadline(&self) -> Duration {
        Duration::from_millis(self.raw.per_detector_deadline_ms)
    }
    pub fn prove_deadline(&self) -> Duration {
        Duration::from_millis(self.raw.prove_deadline_ms)
    }
    pub fn total_deadline(&self) -> Duration {
        Duration::from_millis(self.raw.total_deadline_ms)
    }
    pub fn audit_backpressure_timeout(&self) -> Duration {
        Duration::from_millis(self.raw.audit_backpressure_timeout_ms)
    }
    pub fn min_latency_budget(&self) -> Duration {
        Duration::from_millis(self.raw.min_latency_budget_ms)
    }

    /// Maps a trust score onto a `RiskLevel`. Thresholds are exclusive lower
    /// bounds so a score exactly on a boundary ties toward the higher-risk
    /// side, per spec.md §4.2 step 4.
    pub fn risk_level_for(&self, trust: f64) -> crate::types::RiskLevel {
        use crate::types::RiskLevel;
        if trust > self.raw.risk_level_low {
            RiskLevel::Low
        } else if trust > self.raw.risk_level_medium {
            RiskLevel::Medium
        } else if trust > self.raw.risk_level_high {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }
}

/// Re-deserializes only the fields `RawPolicyConfig` recognises out of an
/// arbitrary TOML table, ignoring the rest — the permissive path used when
/// `allow_unknown = true`.
fn merge_known_fields(
    raw: &mut RawPolicyConfig,
    table: &toml::map::Map<String, toml::Value>,
) -> Result<(), VerifyError> {
    let known = toml::Value::Table(table.clone());
    let trimmed = serde_json::to_value(&known)
        .map_err(|e| VerifyError::ConfigInvalid(format!("re-encoding config: {e}")))?;
    if let serde_json::Value::Object(map) = trimmed {
        let mut filtered = serde_json::Map::new();
        for (k, v) in map {
            if FIELD_NAMES.contains(&k.as_str()) {
                filtered.insert(k, v);
            }
        }
        let merged: RawPolicyConfig = serde_json::from_value(serde_json::Value::Object(filtered))
            .map_err(|e| VerifyError::ConfigInvalid(format!("invalid known fields: {e}")))?;
        *raw = merged;
    }
    Ok(())
}

const FIELD_NAMES: &[&str] = &[
    "allow_unknown",
    "min_sources",
    "sample_window",
    "max_sample_age_secs",
    "outlier_threshold",
    "manipulation_alert_threshold",
    "manipulation_weights",
    "max_market_staleness_secs",
    "cache_ttl_secs",
    "cache_bytes_budget",
    "approve_floor",
    "reject_ceiling",
    "hard_block_set",
    "trust_weights",
    "vol_reference",
    "max_position_frac",
    "portfolio_value",
    "per_detector_deadline_ms",
    "prove_deadline_ms",
    "total_deadline_ms",
    "audit_backpressure_timeout_ms",
    "min_latency_budget_ms",
    "early_block",
    "volatility_threshold",
    "liquidity_threshold",
    "oversize_threshold",
    "manipulation_factor_threshold",
    "risk_level_low",
    "risk_level_medium",
    "risk_level_high",
    "blacklisted_assets",
    "allowed_venues",
    "tier",
    "policy_version",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let cfg = PolicyConfig::validate(RawPolicyConfig::default()).unwrap();
        assert_eq!(cfg.raw.min_sources, 3);
        assert!(cfg.hard_block_set.contains(RiskFactors::POLICY_BREACH));
    }

    #[test]
    fn bad_weights_rejected() {
        let mut raw = RawPolicyConfig::default();
        raw.trust_weights.insert("volatility".into(), 5.0);
        assert!(PolicyConfig::validate(raw).is_err());
    }

    #[test]
    fn unknown_key_rejected_in_strict_mode() {
        let toml_str = r#"
            min_sources = 4
            not_a_real_field = 1
        "#;
        assert!(PolicyConfig::load_str(toml_str).is_err());
    }

    #[test]
    fn unknown_key_allowed_when_opted_in() {
        let toml_str = r#"
            allow_unknown = true
            min_sources = 4
            not_a_real_field = 1
        "#;
        let cfg = PolicyConfig::load_str(toml_str).unwrap();
        assert_eq!(cfg.raw.min_sources, 4);
    }
}
