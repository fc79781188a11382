//! This module contains the computation of dynamic thresholds for invariants
//! derived from attack patterns.
//!
//! The threshold is calibrated from the change rates observed in the
//! pattern's evidence where possible, and from protocol-level defaults where
//! the evidence carries no usable rate.

use std::sync::LazyLock;

use regex::Regex;

use crate::{
    constant::ONE_ETHER_WEI,
    invariant::Config,
    pattern::{ChangePattern, PatternType},
    protocol::ProtocolType,
    utility::{clip, round2},
};

/// Matches multiplier notation such as `14.00x change`.
static MULTIPLIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)x change").expect("Static regex is valid"));

/// Matches signed percentage notation such as `+1400.00%`.
static PERCENTAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[+-](\d+(?:\.\d+)?)%").expect("Static regex is valid"));

/// Matches the post-change value in a line of evidence such as
/// `0xa slot 4: 0 -> 2000000000000000000`.
static AFTER_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"->\s*(\d+)").expect("Static regex is valid"));

/// Extracts the largest change rate mentioned in `evidence`, with percentages
/// converted to rates.
///
/// Returns [`None`] if no line of evidence mentions a finite rate.
#[must_use]
pub fn extract_rate(evidence: &[String]) -> Option<f64> {
    let captured = |regex: &'static Regex, scale: f64| {
        evidence.iter().flat_map(move |line| {
            regex
                .captures_iter(line)
                .filter_map(move |c| c[1].parse::<f64>().ok().map(|r| r / scale))
        })
    };

    captured(&MULTIPLIER, 1.0)
        .chain(captured(&PERCENTAGE, 100.0))
        .filter(|r| r.is_finite())
        .reduce(f64::max)
}

/// Gets the fallback rate for `protocol` when no rate can be extracted.
#[must_use]
pub fn protocol_default(protocol: ProtocolType) -> f64 {
    match protocol {
        ProtocolType::Lending | ProtocolType::Governance => 0.10,
        ProtocolType::Amm | ProtocolType::NftMarketplace => 0.30,
        ProtocolType::Vault => 0.15,
        ProtocolType::Staking | ProtocolType::Unknown => 0.20,
        ProtocolType::Bridge => 0.05,
        ProtocolType::Erc20 => 0.50,
    }
}

/// Gets the factor by which the protocol default is scaled for a pattern of
/// type `pattern`.
#[must_use]
pub fn pattern_adjustment(pattern: PatternType) -> f64 {
    match pattern {
        PatternType::FlashChange | PatternType::ReentrancyBalance => 0.5,
        PatternType::FlashMint => 0.3,
        PatternType::PriceManipulation => 0.7,
        PatternType::RatioBreak => 0.6,
        PatternType::MonotonicIncrease => 0.8,
        PatternType::MassiveTransfer => 0.4,
        _ => 1.0,
    }
}

/// Computes the threshold for an invariant guarding against `pattern` in a
/// protocol of type `protocol`.
#[must_use]
pub fn dynamic_threshold(pattern: &ChangePattern, protocol: ProtocolType, config: &Config) -> f64 {
    let threshold = match extract_rate(&pattern.evidence) {
        Some(rate) => config.threshold_from_rate(rate),
        None => clip(
            protocol_default(protocol) * pattern_adjustment(pattern.pattern_type),
            config.fallback_clip,
        ),
    };
    round2(threshold)
}

/// Computes the largest plausible initial value for a slot that was empty
/// before `pattern`, which is a tenth of the smallest post-change value named
/// in its evidence.
///
/// Falls back to the one-ether detection floor if the evidence names no
/// values.
#[must_use]
pub fn max_initial_value(pattern: &ChangePattern, config: &Config) -> f64 {
    pattern
        .evidence
        .iter()
        .flat_map(|line| AFTER_VALUE.captures_iter(line))
        .filter_map(|c| c[1].parse::<f64>().ok())
        .reduce(f64::min)
        .map_or(ONE_ETHER_WEI as f64, |v| v / config.max_initial_value_divisor)
}

#[cfg(test)]
mod test {
    use crate::{
        invariant::{
            threshold::{dynamic_threshold, extract_rate, max_initial_value},
            Config,
        },
        pattern::{ChangePattern, PatternType, Severity},
        protocol::ProtocolType,
    };

    fn pattern(pattern_type: PatternType, evidence: &[&str]) -> ChangePattern {
        ChangePattern {
            pattern_type,
            confidence: 0.9,
            severity: Severity::Critical,
            description: String::new(),
            evidence: evidence.iter().map(ToString::to_string).collect(),
            contracts: vec!["0xa".into()],
            slots: vec![],
        }
    }

    #[test]
    fn extracts_largest_rate_in_either_notation() {
        let evidence = vec![
            "0xa slot 1: 10 -> 25 (1.50x change, +150.00%)".to_string(),
            "0xa slot 2: 100 -> 350 (+250.00%)".to_string(),
        ];
        assert_eq!(extract_rate(&evidence), Some(2.5));
        assert_eq!(extract_rate(&["unbounded change".to_string()]), None);
    }

    #[test]
    fn extreme_rates_are_scaled_down_and_clipped() {
        let config = Config::default();
        let flash = pattern(PatternType::FlashChange, &["20.0x change"]);
        assert_eq!(dynamic_threshold(&flash, ProtocolType::Amm, &config), 2.0);

        let huge = pattern(PatternType::FlashChange, &["500x change"]);
        assert_eq!(dynamic_threshold(&huge, ProtocolType::Amm, &config), 5.0);

        let mid = pattern(PatternType::FlashChange, &["+150.00%"]);
        assert_eq!(dynamic_threshold(&mid, ProtocolType::Amm, &config), 0.75);

        let low = pattern(PatternType::FlashChange, &["0.02x change"]);
        assert_eq!(dynamic_threshold(&low, ProtocolType::Amm, &config), 0.05);
    }

    #[test]
    fn falls_back_to_protocol_defaults() {
        let config = Config::default();
        let mint = pattern(PatternType::FlashMint, &["unbounded change"]);
        assert_eq!(dynamic_threshold(&mint, ProtocolType::Erc20, &config), 0.15);

        let owner = pattern(PatternType::OwnershipChange, &[]);
        assert_eq!(dynamic_threshold(&owner, ProtocolType::Bridge, &config), 0.05);
    }

    #[test]
    fn max_initial_value_is_a_tenth_of_the_smallest_fill() {
        let config = Config::default();
        let filled = pattern(
            PatternType::ZeroValueChange,
            &["0xa slot 1: 0 -> 5000 (unbounded change)", "0xa slot 2: 0 -> 300 (unbounded change)"],
        );
        assert_eq!(max_initial_value(&filled, &config), 30.0);

        let bare = pattern(PatternType::ZeroValueChange, &[]);
        assert_eq!(max_initial_value(&bare, &config), 1e18);
    }
}
