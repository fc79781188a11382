//! This module contains the static catalogue of invariant templates, keyed by
//! the protocol type they apply to.

use crate::{
    invariant::{InvariantCategory, InvariantType},
    pattern::Severity,
    protocol::ProtocolType,
    semantics::SlotSemanticType,
};

/// A protocol-scoped rule that becomes a concrete invariant for every
/// contract carrying all of its required slots.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InvariantTemplate {
    pub name:           &'static str,
    pub invariant_type: InvariantType,
    pub category:       InvariantCategory,
    pub description:    &'static str,

    /// The formula, with a `{threshold}` placeholder for the threshold.
    pub formula_template: &'static str,

    /// The semantic types that must all be present on one contract for the
    /// template to apply.
    ///
    /// A type listed `n` times needs `n` distinct slots of that type, which
    /// the formula refers to as `<type>0` through `<type>{n-1}`.
    pub required_slots: &'static [SlotSemanticType],

    pub threshold: f64,
    pub severity:  Severity,
}

impl InvariantTemplate {
    /// Gets the formula names of the required slots, in the order of
    /// [`Self::required_slots`], paired with the index of the slot of that
    /// type each one binds to.
    #[must_use]
    pub fn roles(&self) -> Vec<(String, SlotSemanticType, usize)> {
        let slots = self.required_slots;
        slots
            .iter()
            .enumerate()
            .map(|(i, typ)| {
                let nth = slots[..i].iter().filter(|t| *t == typ).count();
                let repeated = slots.iter().filter(|t| *t == typ).count() > 1;
                let name = if repeated {
                    format!("{}{nth}", typ.as_str())
                } else {
                    typ.as_str().to_string()
                };
                (name, *typ, nth)
            })
            .collect()
    }

    /// Renders the formula with `threshold` substituted for the placeholder.
    #[must_use]
    pub fn formula(&self, threshold: f64) -> String {
        self.formula_template.replace("{threshold}", &threshold.to_string())
    }
}

/// Gets the templates registered for `protocol`.
///
/// This does not include the ERC20 base templates unless `protocol` is
/// [`ProtocolType::Erc20`]; see [`templates_for`].
#[must_use]
pub fn protocol_templates(protocol: ProtocolType) -> &'static [InvariantTemplate] {
    match protocol {
        ProtocolType::Vault => VAULT,
        ProtocolType::Amm => AMM,
        ProtocolType::Lending => LENDING,
        ProtocolType::Staking => STAKING,
        ProtocolType::Bridge => BRIDGE,
        ProtocolType::NftMarketplace => NFT_MARKETPLACE,
        ProtocolType::Governance => GOVERNANCE,
        ProtocolType::Erc20 => ERC20,
        ProtocolType::Unknown => &[],
    }
}

/// Gets every template that applies to `protocol`, which is its own
/// templates followed by the ERC20 base templates.
pub fn templates_for(protocol: ProtocolType) -> impl Iterator<Item = &'static InvariantTemplate> {
    let base: &'static [InvariantTemplate] = if protocol == ProtocolType::Erc20 {
        &[]
    } else {
        ERC20
    };
    protocol_templates(protocol).iter().chain(base)
}

const VAULT: &[InvariantTemplate] = &[
    InvariantTemplate {
        name:             "share_price_stability",
        invariant_type:   InvariantType::RatioStability,
        category:         InvariantCategory::PriceStability,
        description:      "The price of a vault share must not move sharply within one transaction",
        formula_template: "abs(reserve / total_supply - before(reserve) / before(total_supply)) <= \
                           {threshold} * before(reserve) / before(total_supply)",
        required_slots:   &[SlotSemanticType::TotalSupply, SlotSemanticType::Reserve],
        threshold:        0.05,
        severity:         Severity::Critical,
    },
    InvariantTemplate {
        name:             "assets_cover_shares",
        invariant_type:   InvariantType::BoundedValue,
        category:         InvariantCategory::Solvency,
        description:      "The assets held by the vault must cover the shares it has issued",
        formula_template: "reserve >= shares * (1 - {threshold})",
        required_slots:   &[SlotSemanticType::Reserve, SlotSemanticType::Shares],
        threshold:        0.01,
        severity:         Severity::Critical,
    },
];

const AMM: &[InvariantTemplate] = &[
    InvariantTemplate {
        name:             "constant_product",
        invariant_type:   InvariantType::BoundedValue,
        category:         InvariantCategory::Solvency,
        description:      "The product of the pool reserves must not fall",
        formula_template: "reserve0 * reserve1 >= before(reserve0) * before(reserve1) * (1 - {threshold})",
        required_slots:   &[SlotSemanticType::Reserve, SlotSemanticType::Reserve],
        threshold:        0.01,
        severity:         Severity::Critical,
    },
    InvariantTemplate {
        name:             "reserve_bounds",
        invariant_type:   InvariantType::BoundedValue,
        category:         InvariantCategory::PriceStability,
        description:      "Pool reserves must not swing sharply within one transaction",
        formula_template: "abs(reserve - before(reserve)) <= {threshold} * before(reserve)",
        required_slots:   &[SlotSemanticType::Reserve, SlotSemanticType::Liquidity],
        threshold:        0.3,
        severity:         Severity::High,
    },
    InvariantTemplate {
        name:             "price_cumulative_monotonic",
        invariant_type:   InvariantType::BoundedGrowth,
        category:         InvariantCategory::PriceStability,
        description:      "Cumulative price accumulators only ever grow",
        formula_template: "price_cumulative >= before(price_cumulative) * (1 - {threshold})",
        required_slots:   &[SlotSemanticType::PriceCumulative],
        threshold:        0.0,
        severity:         Severity::Medium,
    },
];

const LENDING: &[InvariantTemplate] = &[
    InvariantTemplate {
        name:             "collateralization",
        invariant_type:   InvariantType::BoundedValue,
        category:         InvariantCategory::Solvency,
        description:      "Outstanding debt must stay below the collateral that backs it",
        formula_template: "debt <= collateral * {threshold}",
        required_slots:   &[SlotSemanticType::Debt, SlotSemanticType::Collateral],
        threshold:        0.8,
        severity:         Severity::Critical,
    },
    InvariantTemplate {
        name:             "exchange_rate_stability",
        invariant_type:   InvariantType::BoundedValue,
        category:         InvariantCategory::PriceStability,
        description:      "The exchange rate of the market token must not jump",
        formula_template: "abs(exchange_rate - before(exchange_rate)) <= {threshold} * before(exchange_rate)",
        required_slots:   &[SlotSemanticType::ExchangeRate],
        threshold:        0.1,
        severity:         Severity::High,
    },
    InvariantTemplate {
        name:             "interest_rate_bounds",
        invariant_type:   InvariantType::BoundedValue,
        category:         InvariantCategory::StateBounds,
        description:      "The interest rate must stay within its usual range",
        formula_template: "abs(interest_rate - before(interest_rate)) <= {threshold} * before(interest_rate)",
        required_slots:   &[SlotSemanticType::InterestRate],
        threshold:        0.5,
        severity:         Severity::Medium,
    },
];

const STAKING: &[InvariantTemplate] = &[
    InvariantTemplate {
        name:             "reward_bounds",
        invariant_type:   InvariantType::BoundedGrowth,
        category:         InvariantCategory::RateLimit,
        description:      "Rewards paid out in one transaction must be a small share of the stake",
        formula_template: "reward_amount - before(reward_amount) <= {threshold} * total_supply",
        required_slots:   &[SlotSemanticType::RewardAmount, SlotSemanticType::TotalSupply],
        threshold:        0.2,
        severity:         Severity::High,
    },
    InvariantTemplate {
        name:             "stake_conservation",
        invariant_type:   InvariantType::BoundedValue,
        category:         InvariantCategory::Conservation,
        description:      "Staked shares must never exceed the total staked supply",
        formula_template: "shares <= total_supply * (1 + {threshold})",
        required_slots:   &[SlotSemanticType::Shares, SlotSemanticType::TotalSupply],
        threshold:        0.0,
        severity:         Severity::Critical,
    },
];

const BRIDGE: &[InvariantTemplate] = &[
    InvariantTemplate {
        name:             "bridge_backing",
        invariant_type:   InvariantType::BoundedValue,
        category:         InvariantCategory::Solvency,
        description:      "Locked reserves must back every bridged token",
        formula_template: "reserve >= total_supply * (1 - {threshold})",
        required_slots:   &[SlotSemanticType::Reserve, SlotSemanticType::TotalSupply],
        threshold:        0.05,
        severity:         Severity::Critical,
    },
    InvariantTemplate {
        name:             "message_nonce_growth",
        invariant_type:   InvariantType::BoundedGrowth,
        category:         InvariantCategory::RateLimit,
        description:      "Only a few bridge messages can be processed in one transaction",
        formula_template: "0 <= nonce - before(nonce) <= {threshold}",
        required_slots:   &[SlotSemanticType::Nonce],
        threshold:        10.0,
        severity:         Severity::High,
    },
    InvariantTemplate {
        name:             "bridge_admin_fixed",
        invariant_type:   InvariantType::AccessControl,
        category:         InvariantCategory::AccessControl,
        description:      "The bridge administrator must not change",
        formula_template: "abs(admin - before(admin)) <= {threshold}",
        required_slots:   &[SlotSemanticType::Admin],
        threshold:        0.0,
        severity:         Severity::Critical,
    },
];

const NFT_MARKETPLACE: &[InvariantTemplate] = &[
    InvariantTemplate {
        name:             "fee_bounds",
        invariant_type:   InvariantType::BoundedValue,
        category:         InvariantCategory::StateBounds,
        description:      "Marketplace fees must not change sharply",
        formula_template: "abs(fee_amount - before(fee_amount)) <= {threshold} * before(fee_amount)",
        required_slots:   &[SlotSemanticType::FeeAmount],
        threshold:        0.1,
        severity:         Severity::Medium,
    },
    InvariantTemplate {
        name:             "listing_counter_monotonic",
        invariant_type:   InvariantType::BoundedGrowth,
        category:         InvariantCategory::StateBounds,
        description:      "Listing counters only ever grow",
        formula_template: "counter >= before(counter) - {threshold}",
        required_slots:   &[SlotSemanticType::Counter],
        threshold:        0.0,
        severity:         Severity::Medium,
    },
];

const GOVERNANCE: &[InvariantTemplate] = &[
    InvariantTemplate {
        name:             "proposal_threshold_stability",
        invariant_type:   InvariantType::BoundedValue,
        category:         InvariantCategory::AccessControl,
        description:      "The proposal or quorum threshold must not be lowered sharply",
        formula_template: "proposal_threshold >= before(proposal_threshold) * (1 - {threshold})",
        required_slots:   &[SlotSemanticType::Threshold],
        threshold:        0.1,
        severity:         Severity::High,
    },
    InvariantTemplate {
        name:             "proposal_counter_monotonic",
        invariant_type:   InvariantType::BoundedGrowth,
        category:         InvariantCategory::StateBounds,
        description:      "Proposal counters only ever grow",
        formula_template: "counter >= before(counter) - {threshold}",
        required_slots:   &[SlotSemanticType::Counter],
        threshold:        0.0,
        severity:         Severity::Medium,
    },
];

const ERC20: &[InvariantTemplate] = &[
    InvariantTemplate {
        name:             "supply_stability",
        invariant_type:   InvariantType::BoundedValue,
        category:         InvariantCategory::SupplyIntegrity,
        description:      "The total supply must not change sharply within one transaction",
        formula_template: "abs(total_supply - before(total_supply)) <= {threshold} * before(total_supply)",
        required_slots:   &[SlotSemanticType::TotalSupply],
        threshold:        0.1,
        severity:         Severity::High,
    },
    InvariantTemplate {
        name:             "balances_sum_to_supply",
        invariant_type:   InvariantType::BalanceConservation,
        category:         InvariantCategory::Conservation,
        description:      "The sum of all balances must equal the total supply",
        formula_template: "abs(sum(balances) - total_supply) <= {threshold}",
        required_slots:   &[SlotSemanticType::BalanceMapping, SlotSemanticType::TotalSupply],
        threshold:        0.0,
        severity:         Severity::Critical,
    },
    InvariantTemplate {
        name:             "owner_fixed",
        invariant_type:   InvariantType::AccessControl,
        category:         InvariantCategory::AccessControl,
        description:      "The owner of the contract must not change",
        formula_template: "abs(owner - before(owner)) <= {threshold}",
        required_slots:   &[SlotSemanticType::Owner],
        threshold:        0.0,
        severity:         Severity::Critical,
    },
];

#[cfg(test)]
mod test {
    use crate::{
        invariant::templates::{protocol_templates, templates_for},
        protocol::ProtocolType,
    };

    #[test]
    fn every_template_has_required_slots_and_a_placeholder() {
        for protocol in ProtocolType::KNOWN {
            for template in protocol_templates(protocol) {
                assert!(!template.required_slots.is_empty(), "{}", template.name);
                assert!(template.formula_template.contains("{threshold}"), "{}", template.name);
            }
        }
    }

    #[test]
    fn erc20_base_is_appended_once() {
        let vault: Vec<_> = templates_for(ProtocolType::Vault).map(|t| t.name).collect();
        assert_eq!(vault.first(), Some(&"share_price_stability"));
        assert!(vault.contains(&"supply_stability"));

        let erc20 = templates_for(ProtocolType::Erc20)
            .filter(|t| t.name == "supply_stability")
            .count();
        assert_eq!(erc20, 1);
        assert_eq!(templates_for(ProtocolType::Unknown).count(), 3);
    }

    #[test]
    fn access_control_templates_render_a_zero_tolerance() {
        let owner = templates_for(ProtocolType::Unknown)
            .find(|t| t.name == "owner_fixed")
            .expect("Base templates include owner_fixed");
        assert_eq!(owner.formula(owner.threshold), "abs(owner - before(owner)) <= 0");

        let admin = &protocol_templates(ProtocolType::Bridge)[2];
        assert_eq!(admin.formula(admin.threshold), "abs(admin - before(admin)) <= 0");
    }

    #[test]
    fn repeated_slot_types_get_numbered_roles() {
        let product = &protocol_templates(ProtocolType::Amm)[0];
        let roles: Vec<_> = product.roles().into_iter().map(|(n, _, k)| (n, k)).collect();
        assert_eq!(roles, vec![("reserve0".to_string(), 0), ("reserve1".to_string(), 1)]);

        let share_price = &protocol_templates(ProtocolType::Vault)[0];
        let names: Vec<_> = share_price.roles().into_iter().map(|(n, _, _)| n).collect();
        assert_eq!(names, vec!["total_supply", "reserve"]);
    }

    #[test]
    fn formula_substitutes_threshold() {
        let template = &protocol_templates(ProtocolType::Lending)[0];
        assert_eq!(template.formula(0.8), "debt <= collateral * 0.8");
    }
}
