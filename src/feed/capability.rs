//! Withdraw/deposit capability metadata and the policy for undetermined answers.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// What to assume when a capability cannot be determined (timeout, error, no metadata).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CapabilityPolicy {
    /// Treat unknown as allowed.
    #[default]
    FailOpen,
    /// Treat unknown as disallowed.
    FailClosed,
}

impl CapabilityPolicy {
    /// Build from the `FAIL_OPEN_ON_UNKNOWN_CAPABILITY` flag.
    pub fn from_fail_open(fail_open: bool) -> Self {
        if fail_open {
            Self::FailOpen
        } else {
            Self::FailClosed
        }
    }

    /// Collapse a possibly-unknown answer into a decision.
    pub fn resolve(self, answer: Option<bool>) -> bool {
        answer.unwrap_or(matches!(self, Self::FailOpen))
    }
}

/// Asset transfer direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum TransferAction {
    /// Moving the asset off the venue.
    Withdraw,
    /// Moving the asset onto the venue.
    Deposit,
}

/// Per-network transfer flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    /// Withdrawals enabled on this network.
    #[serde(default)]
    pub withdraw_enable: Option<bool>,
    /// Deposits enabled on this network.
    #[serde(default)]
    pub deposit_enable: Option<bool>,
    /// Flat withdrawal fee in the asset itself.
    #[serde(default)]
    pub withdraw_fee: Option<Decimal>,
}

/// Nested venue-native flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilityFlags {
    /// Withdrawals enabled.
    #[serde(default)]
    pub withdraw: Option<bool>,
    /// Deposits enabled.
    #[serde(default)]
    pub deposit: Option<bool>,
}

/// Venue currency metadata for one base asset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrencyDetails {
    /// Top-level withdraw flag.
    #[serde(default)]
    pub withdraw: Option<bool>,
    /// Top-level deposit flag.
    #[serde(default)]
    pub deposit: Option<bool>,
    /// Raw venue flags, consulted when top-level ones are absent.
    #[serde(default)]
    pub info: Option<CapabilityFlags>,
    /// Per-network flags keyed by network name.
    #[serde(default)]
    pub networks: HashMap<String, NetworkInfo>,
}

impl CurrencyDetails {
    /// Whether withdrawals are enabled at the asset level.
    pub fn withdraw_enabled(&self) -> Option<bool> {
        self.enabled(TransferAction::Withdraw)
    }

    /// Whether deposits are enabled at the asset level.
    pub fn deposit_enabled(&self) -> Option<bool> {
        self.enabled(TransferAction::Deposit)
    }

    /// Resolve a capability from the metadata.
    ///
    /// Any network enabling the action wins. Otherwise the top-level flag,
    /// then the nested `info` flag. Networks that all disable the action
    /// count as disabled; no data at all is unknown.
    pub fn enabled(&self, action: TransferAction) -> Option<bool> {
        let network_flag = |n: &NetworkInfo| match action {
            TransferAction::Withdraw => n.withdraw_enable,
            TransferAction::Deposit => n.deposit_enable,
        };

        if self.networks.values().any(|n| network_flag(n) == Some(true)) {
            return Some(true);
        }

        let top_level = match action {
            TransferAction::Withdraw => self.withdraw,
            TransferAction::Deposit => self.deposit,
        };
        if top_level.is_some() {
            return top_level;
        }

        let nested = self.info.as_ref().and_then(|info| match action {
            TransferAction::Withdraw => info.withdraw,
            TransferAction::Deposit => info.deposit,
        });
        if nested.is_some() {
            return nested;
        }

        if self.networks.values().any(|n| network_flag(n).is_some()) {
            return Some(false);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network(withdraw: Option<bool>, deposit: Option<bool>) -> NetworkInfo {
        NetworkInfo {
            withdraw_enable: withdraw,
            deposit_enable: deposit,
            withdraw_fee: None,
        }
    }

    #[test]
    fn policy_resolves_unknown() {
        assert!(CapabilityPolicy::FailOpen.resolve(None));
        assert!(!CapabilityPolicy::FailClosed.resolve(None));
        assert!(!CapabilityPolicy::FailOpen.resolve(Some(false)));
        assert!(CapabilityPolicy::FailClosed.resolve(Some(true)));
        assert_eq!(CapabilityPolicy::from_fail_open(false), CapabilityPolicy::FailClosed);
    }

    #[test]
    fn any_enabled_network_wins() {
        let details = CurrencyDetails {
            withdraw: Some(false),
            networks: HashMap::from([
                ("ERC20".to_string(), network(Some(false), Some(false))),
                ("TRC20".to_string(), network(Some(true), Some(false))),
            ]),
            ..Default::default()
        };

        assert_eq!(details.withdraw_enabled(), Some(true));
        assert_eq!(details.deposit_enabled(), Some(false));
    }

    #[test]
    fn falls_back_to_top_level_then_info() {
        let top = CurrencyDetails {
            deposit: Some(true),
            info: Some(CapabilityFlags {
                withdraw: Some(false),
                deposit: Some(false),
            }),
            ..Default::default()
        };

        assert_eq!(top.deposit_enabled(), Some(true));
        assert_eq!(top.withdraw_enabled(), Some(false));
    }

    #[test]
    fn empty_metadata_is_unknown() {
        let details = CurrencyDetails::default();
        assert_eq!(details.withdraw_enabled(), None);
        assert_eq!(details.deposit_enabled(), None);
    }

    #[test]
    fn deserializes_venue_shape() {
        let json = r#"{
            "info": {"withdraw": true},
            "networks": {"SOL": {"withdrawEnable": false, "depositEnable": true}}
        }"#;
        let details: CurrencyDetails = serde_json::from_str(json).unwrap();

        assert_eq!(details.withdraw_enabled(), Some(true));
        assert_eq!(details.deposit_enabled(), Some(true));
    }
}
