//! This module contains the static signal tables that the protocol scorers
//! match their inputs against.

use std::sync::LazyLock;

use regex::Regex;

use crate::protocol::ProtocolType;

/// The tiered function names that indicate a protocol type.
#[derive(Clone, Copy, Debug)]
pub struct FunctionTiers {
    /// Functions that are central to the protocol type.
    pub core: &'static [&'static str],

    /// Functions commonly found alongside the core ones.
    pub supporting: &'static [&'static str],

    /// Administrative functions typical of the protocol type.
    pub admin: &'static [&'static str],
}

/// A group of event names that together indicate a protocol type.
#[derive(Clone, Copy, Debug)]
pub struct EventGroup {
    pub events: &'static [&'static str],
    pub weight: f64,
}

/// Gets the function tiers for `protocol`.
#[must_use]
pub fn function_tiers(protocol: ProtocolType) -> FunctionTiers {
    match protocol {
        ProtocolType::Vault => FunctionTiers {
            core:       &[
                "deposit",
                "withdraw",
                "redeem",
                "mint",
                "totalAssets",
                "convertToShares",
                "convertToAssets",
                "previewDeposit",
                "previewRedeem",
            ],
            supporting: &[
                "asset",
                "maxDeposit",
                "maxWithdraw",
                "pricePerShare",
                "getPricePerFullShare",
                "earn",
                "harvest",
            ],
            admin:      &["setStrategy", "setController", "setFee", "pause", "unpause"],
        },
        ProtocolType::Amm => FunctionTiers {
            core:       &[
                "swap",
                "addLiquidity",
                "removeLiquidity",
                "getReserves",
                "swapExactTokensForTokens",
                "swapTokensForExactTokens",
                "getAmountOut",
                "getAmountsOut",
                "sync",
                "skim",
            ],
            supporting: &[
                "token0",
                "token1",
                "factory",
                "price0CumulativeLast",
                "price1CumulativeLast",
                "kLast",
                "quote",
            ],
            admin:      &["setFeeTo", "setFeeToSetter"],
        },
        ProtocolType::Lending => FunctionTiers {
            core:       &[
                "borrow",
                "repay",
                "repayBorrow",
                "liquidate",
                "liquidateBorrow",
                "liquidationCall",
                "supply",
                "borrowBalanceCurrent",
                "getAccountLiquidity",
            ],
            supporting: &[
                "exchangeRateCurrent",
                "exchangeRateStored",
                "borrowRatePerBlock",
                "supplyRatePerBlock",
                "totalBorrows",
                "getReserveData",
                "accrueInterest",
                "enterMarkets",
                "flashLoan",
            ],
            admin:      &[
                "setCollateralFactor",
                "setReserveFactor",
                "_setInterestRateModel",
                "setPriceOracle",
            ],
        },
        ProtocolType::Staking => FunctionTiers {
            core:       &["stake", "unstake", "getReward", "claimReward", "earned", "exit"],
            supporting: &[
                "rewardPerToken",
                "rewardRate",
                "totalStaked",
                "lastTimeRewardApplicable",
                "notifyRewardAmount",
                "periodFinish",
            ],
            admin:      &["setRewardsDuration", "recoverERC20"],
        },
        ProtocolType::Bridge => FunctionTiers {
            core:       &[
                "bridge",
                "relay",
                "relayMessage",
                "sendMessage",
                "receiveMessage",
                "processMessage",
                "finalizeDeposit",
                "finalizeWithdrawal",
                "lockTokens",
                "unlockTokens",
            ],
            supporting: &[
                "messageNonce",
                "verifyProof",
                "chainId",
                "destinationChainId",
                "outboundTransfer",
            ],
            admin:      &["setRelayer", "addValidator", "removeValidator", "setThreshold"],
        },
        ProtocolType::NftMarketplace => FunctionTiers {
            core:       &[
                "buy",
                "buyItem",
                "list",
                "createListing",
                "cancelListing",
                "fillOrder",
                "matchOrders",
                "makeOffer",
                "acceptOffer",
            ],
            supporting: &[
                "ownerOf",
                "safeTransferFrom",
                "tokenURI",
                "getApproved",
                "setApprovalForAll",
                "isApprovedForAll",
            ],
            admin:      &["setMarketplaceFee", "setRoyalty"],
        },
        ProtocolType::Governance => FunctionTiers {
            core:       &[
                "propose",
                "castVote",
                "castVoteWithReason",
                "queue",
                "execute",
                "delegate",
            ],
            supporting: &[
                "proposalThreshold",
                "quorum",
                "votingDelay",
                "votingPeriod",
                "getVotes",
                "proposalVotes",
                "state",
            ],
            admin:      &[
                "setVotingDelay",
                "setVotingPeriod",
                "setProposalThreshold",
                "updateQuorumNumerator",
            ],
        },
        ProtocolType::Erc20 => FunctionTiers {
            core:       &[
                "transfer",
                "transferFrom",
                "approve",
                "balanceOf",
                "totalSupply",
                "allowance",
            ],
            supporting: &[
                "name",
                "symbol",
                "decimals",
                "increaseAllowance",
                "decreaseAllowance",
                "permit",
                "nonces",
            ],
            admin:      &["mint", "burn", "pause", "unpause", "transferOwnership"],
        },
        ProtocolType::Unknown => FunctionTiers {
            core:       &[],
            supporting: &[],
            admin:      &[],
        },
    }
}

/// Gets the weighted event groups for `protocol`.
#[must_use]
pub fn event_groups(protocol: ProtocolType) -> &'static [EventGroup] {
    match protocol {
        ProtocolType::Vault => &[
            EventGroup {
                events: &["Deposit", "Withdraw"],
                weight: 0.6,
            },
            EventGroup {
                events: &["StrategyUpdated", "Harvest", "Harvested"],
                weight: 0.4,
            },
        ],
        ProtocolType::Amm => &[
            EventGroup {
                events: &["Swap", "Sync"],
                weight: 0.6,
            },
            EventGroup {
                events: &["Mint", "Burn"],
                weight: 0.4,
            },
        ],
        ProtocolType::Lending => &[
            EventGroup {
                events: &["Borrow", "Repay", "RepayBorrow", "LiquidateBorrow", "LiquidationCall"],
                weight: 0.7,
            },
            EventGroup {
                events: &["Supply", "AccrueInterest", "ReserveDataUpdated"],
                weight: 0.3,
            },
        ],
        ProtocolType::Staking => &[
            EventGroup {
                events: &["Staked", "Withdrawn", "RewardPaid"],
                weight: 0.7,
            },
            EventGroup {
                events: &["RewardAdded", "RewardsDurationUpdated"],
                weight: 0.3,
            },
        ],
        ProtocolType::Bridge => &[
            EventGroup {
                events: &["MessageSent", "MessageReceived", "SentMessage", "RelayedMessage"],
                weight: 0.6,
            },
            EventGroup {
                events: &["DepositInitiated", "WithdrawalFinalized", "TokensLocked", "TokensUnlocked"],
                weight: 0.4,
            },
        ],
        ProtocolType::NftMarketplace => &[
            EventGroup {
                events: &["ItemListed", "ItemSold", "ItemCanceled", "OrderFulfilled", "OrdersMatched"],
                weight: 0.7,
            },
            EventGroup {
                events: &["ApprovalForAll"],
                weight: 0.3,
            },
        ],
        ProtocolType::Governance => &[
            EventGroup {
                events: &["ProposalCreated", "VoteCast", "ProposalExecuted"],
                weight: 0.7,
            },
            EventGroup {
                events: &["ProposalQueued", "ProposalCanceled", "DelegateChanged"],
                weight: 0.3,
            },
        ],
        ProtocolType::Erc20 => &[EventGroup {
            events: &["Transfer", "Approval"],
            weight: 1.0,
        }],
        ProtocolType::Unknown => &[],
    }
}

/// The keyword regexes matched against project names, per protocol type, in
/// the order of [`ProtocolType::KNOWN`].
static NAME_KEYWORDS: LazyLock<Vec<(ProtocolType, Vec<Regex>)>> = LazyLock::new(|| {
    let table: &[(ProtocolType, &[&str])] = &[
        (ProtocolType::Vault, &["vault", "yearn", "4626", "yield", "beefy", "harvest"]),
        (
            ProtocolType::Amm,
            &["swap", "uniswap", "sushi", "pancake", "curve", "balancer", "dex", "amm", "pair"],
        ),
        (
            ProtocolType::Lending,
            &["lend", "compound", "aave", "euler", "cream", "borrow", "loan", r"money.?market"],
        ),
        (ProtocolType::Staking, &["stak", "farm", "reward", "masterchef", "chef"]),
        (
            ProtocolType::Bridge,
            &["bridge", "wormhole", "nomad", "multichain", "anyswap", "ronin", "portal", "layerzero"],
        ),
        (
            ProtocolType::NftMarketplace,
            &["nft", "opensea", "seaport", "marketplace", "looksrare", "blur"],
        ),
        (ProtocolType::Governance, &["gov", "dao", "vote", "voting", "proposal"]),
        (ProtocolType::Erc20, &["token", "erc20", "coin"]),
    ];

    table
        .iter()
        .map(|(protocol, keywords)| {
            let regexes = keywords
                .iter()
                .map(|k| Regex::new(&format!("(?i){k}")).expect("Keywords are statically valid"))
                .collect();
            (*protocol, regexes)
        })
        .collect()
});

/// Counts how many of the keywords for `protocol` occur in `name`.
#[must_use]
pub fn name_keyword_matches(protocol: ProtocolType, name: &str) -> usize {
    NAME_KEYWORDS
        .iter()
        .find(|(p, _)| *p == protocol)
        .map_or(0, |(_, regexes)| regexes.iter().filter(|r| r.is_match(name)).count())
}
