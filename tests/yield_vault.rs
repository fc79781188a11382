//! This module is an integration test that runs the whole pipeline over a
//! vault whose reserves are inflated fifteen-fold while value drains to an
//! unrelated contract.
#![cfg(test)]

use storage_invariant_engine::{
    diff::relation::RelationType,
    engine,
    invariant::{InvariantCategory, InvariantType},
    pattern::{PatternType, Severity},
    protocol::{ProtocolType, SignalSource},
};

mod common;

const VAULT: &str = "0x2222222222222222222222222222222222222222";
const SINK: &str = "0x3333333333333333333333333333333333333333";

#[test]
fn classifies_from_every_source() -> anyhow::Result<()> {
    let input = common::load_protocol("yield_vault")?;
    let config = engine::Config::default();
    let engine = storage_invariant_engine::new(&input, &config).label().classify();

    let protocol = &engine.state().protocol;
    assert_eq!(protocol.detected_type, ProtocolType::Vault);
    assert!(protocol.sources_used.contains(&SignalSource::Abi));
    assert!(protocol.sources_used.contains(&SignalSource::Events));
    assert!(protocol.sources_used.contains(&SignalSource::Name));
    Ok(())
}

#[test]
fn detects_the_reserve_inflation() -> anyhow::Result<()> {
    let document = common::analyse("yield_vault")?;

    let patterns = document.attack_patterns.as_ref().expect("After-state was provided");
    let flash = patterns
        .iter()
        .find(|p| p.pattern_type == PatternType::FlashChange)
        .expect("Reserve grew fifteen-fold");
    assert_eq!(flash.severity, Severity::Critical);
    assert!(patterns.iter().any(|p| p.pattern_type == PatternType::ReentrancyBalance));
    assert!(patterns.iter().any(|p| p.pattern_type == PatternType::MassiveTransfer));
    Ok(())
}

#[test]
fn relates_the_drained_balance() -> anyhow::Result<()> {
    let input = common::load_protocol("yield_vault")?;
    let config = engine::Config::default();
    let engine = storage_invariant_engine::new(&input, &config).label().classify().diff();

    let diff = engine.state().diff.as_ref().expect("After-state was provided");
    let transfer = diff
        .relations_of(RelationType::BalanceTransfer)
        .next()
        .expect("Balance moved between contracts");
    assert!(transfer.contracts.contains(&VAULT.to_string()));
    assert!(transfer.contracts.contains(&SINK.to_string()));
    Ok(())
}

#[test]
fn synthesizes_vault_invariants() -> anyhow::Result<()> {
    let document = common::analyse("yield_vault")?;
    let find = |name: &str| document.invariants.iter().find(|i| i.name == name);

    let share_price = find("share_price_stability").expect("Vault template applies");
    assert_eq!(share_price.id, "TEMPLATE_share_price_stability_001");
    assert_eq!(share_price.category, InvariantCategory::PriceStability);
    assert_eq!(share_price.contracts, vec![VAULT.to_string()]);

    // The declared owner slot picks up the base token template.
    assert!(find("owner_fixed").is_some());

    let flash = document
        .invariants
        .iter()
        .find(|i| i.attack_pattern == Some(PatternType::FlashChange))
        .expect("Critical pattern yields an invariant");
    assert_eq!(flash.id, "PATTERN_flash_change_001");
    assert_eq!(flash.invariant_type, InvariantType::BoundedValue);
    assert!(flash.threshold >= 0.5 && flash.threshold <= 5.0);

    let conservation = document
        .invariants
        .iter()
        .find(|i| i.id.starts_with("CROSS_balance_conservation_"))
        .expect("Transfer yields a conservation invariant");
    assert_eq!(conservation.category, InvariantCategory::Conservation);
    Ok(())
}

#[test]
fn medium_patterns_stay_below_the_floor() -> anyhow::Result<()> {
    let document = common::analyse("yield_vault")?;

    assert!(document
        .invariants
        .iter()
        .all(|i| i.attack_pattern != Some(PatternType::MassiveTransfer)));
    Ok(())
}
