//! Contract modules and the validated address set
//!
//! Every component that needs to know where a contract lives receives the
//! same immutable [`ContractAddressSet`]. It is built once from process
//! configuration and never updated afterwards.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// One of the eight on-chain contract modules
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Module {
    /// Attestation recorder
    Attestor,
    /// Affidavit registry
    AffidavitRegistry,
    /// Custody vault (custody flag + document hashes)
    CustodyVault,
    /// Issuance / quant engine (NAV, notes, redemptions)
    IssuanceEngine,
    /// Insurance binder
    InsuranceBinder,
    /// Liquidity cycle engine
    CycleEngine,
    /// Policy override registry
    PolicyRegistry,
    /// Token mint / burn
    TokenMint,
}

impl Module {
    /// All modules in registry order
    pub const ALL: [Module; 8] = [
        Module::Attestor,
        Module::AffidavitRegistry,
        Module::CustodyVault,
        Module::IssuanceEngine,
        Module::InsuranceBinder,
        Module::CycleEngine,
        Module::PolicyRegistry,
        Module::TokenMint,
    ];

    /// Stable module name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attestor => "attestor",
            Self::AffidavitRegistry => "affidavit-registry",
            Self::CustodyVault => "custody-vault",
            Self::IssuanceEngine => "issuance-engine",
            Self::InsuranceBinder => "insurance-binder",
            Self::CycleEngine => "cycle-engine",
            Self::PolicyRegistry => "policy-registry",
            Self::TokenMint => "token-mint",
        }
    }

    /// Environment variable holding this module's address
    pub fn env_key(&self) -> &'static str {
        match self {
            Self::Attestor => "SE7EN_ATTESTOR_ADDRESS",
            Self::AffidavitRegistry => "SE7EN_AFFIDAVIT_REGISTRY_ADDRESS",
            Self::CustodyVault => "SE7EN_CUSTODY_VAULT_ADDRESS",
            Self::IssuanceEngine => "SE7EN_ISSUANCE_ENGINE_ADDRESS",
            Self::InsuranceBinder => "SE7EN_INSURANCE_BINDER_ADDRESS",
            Self::CycleEngine => "SE7EN_CYCLE_ENGINE_ADDRESS",
            Self::PolicyRegistry => "SE7EN_POLICY_REGISTRY_ADDRESS",
            Self::TokenMint => "SE7EN_TOKEN_MINT_ADDRESS",
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Module {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Module::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s.to_lowercase())
            .ok_or_else(|| format!("unknown module: {}", s))
    }
}

/// Parse a configured contract address.
///
/// Returns `None` unless the value is `0x` followed by exactly 40 hex
/// digits and is not the all-zero sentinel.
pub fn parse_address(raw: &str) -> Option<Address> {
    let raw = raw.trim();
    let digits = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X"))?;
    if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let address = Address::from_str(digits).ok()?;
    if address.is_zero() {
        return None;
    }
    Some(address)
}

/// Immutable mapping from module to its configured contract address
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContractAddressSet {
    configured: BTreeMap<Module, Address>,
    /// Raw values that were present but failed validation
    rejected: BTreeMap<Module, String>,
}

impl ContractAddressSet {
    /// An address set with no configured modules
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from raw per-module values. Absent, blank, malformed and zero
    /// addresses all leave the module unconfigured.
    pub fn from_raw<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Module, Option<S>)>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        for (module, raw) in entries {
            let Some(raw) = raw else { continue };
            let raw = raw.as_ref().trim();
            if raw.is_empty() {
                continue;
            }
            match parse_address(raw) {
                Some(address) => {
                    set.configured.insert(module, address);
                }
                None => {
                    warn!(module = %module, value = raw, "Ignoring invalid contract address");
                    set.rejected.insert(module, raw.to_string());
                }
            }
        }
        set
    }

    /// Read every module address from the process environment
    pub fn from_env() -> Self {
        Self::from_raw(
            Module::ALL
                .iter()
                .map(|m| (*m, std::env::var(m.env_key()).ok())),
        )
    }

    /// Builder used by tests and stub deployments. Zero addresses are ignored.
    pub fn with(mut self, module: Module, address: Address) -> Self {
        if !address.is_zero() {
            self.configured.insert(module, address);
            self.rejected.remove(&module);
        }
        self
    }

    /// Configured address for a module
    pub fn get(&self, module: Module) -> Option<Address> {
        self.configured.get(&module).copied()
    }

    /// Whether the module has a usable address
    pub fn is_configured(&self, module: Module) -> bool {
        self.configured.contains_key(&module)
    }

    /// Configured modules with their addresses, in registry order
    pub fn configured(&self) -> impl Iterator<Item = (Module, Address)> + '_ {
        self.configured.iter().map(|(m, a)| (*m, *a))
    }

    /// Distinct configured addresses
    pub fn addresses(&self) -> Vec<Address> {
        let mut out: Vec<Address> = Vec::with_capacity(self.configured.len());
        for address in self.configured.values() {
            if !out.contains(address) {
                out.push(*address);
            }
        }
        out
    }

    /// Modules without a usable address
    pub fn missing(&self) -> Vec<Module> {
        Module::ALL
            .iter()
            .copied()
            .filter(|m| !self.configured.contains_key(m))
            .collect()
    }

    /// Modules deployed at the given address (usually one)
    pub fn modules_for(&self, address: &Address) -> Vec<Module> {
        self.configured
            .iter()
            .filter(|(_, a)| *a == address)
            .map(|(m, _)| *m)
            .collect()
    }

    /// Raw values rejected during validation
    pub fn rejected(&self) -> &BTreeMap<Module, String> {
        &self.rejected
    }

    /// True when no module is configured
    pub fn is_empty(&self) -> bool {
        self.configured.is_empty()
    }
}
