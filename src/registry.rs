// src/registry.rs
use std::{collections::HashMap, str::FromStr};

use anyhow::{bail, Context};
use ethers::types::Address;

use crate::error::PaymasterError;

/// Paymasters registered per entry point, in configuration order.
///
/// Parsed from `ep=pm1,pm2&ep2=pm3`. Immutable once the server starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryPointRegistry(HashMap<Address, Vec<Address>>);

impl EntryPointRegistry {
    pub fn paymasters(&self, entry_point: &Address) -> Result<&[Address], PaymasterError> {
        self.0
            .get(entry_point)
            .map(Vec::as_slice)
            .ok_or(PaymasterError::UnsupportedEntryPoint(*entry_point))
    }

    pub fn entry_points(&self) -> impl Iterator<Item = &Address> {
        self.0.keys()
    }
}

impl FromStr for EntryPointRegistry {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut registry = HashMap::new();
        for pair in s.split('&').map(str::trim).filter(|pair| !pair.is_empty()) {
            let (entry_point, paymasters) = pair
                .split_once('=')
                .with_context(|| format!("{pair} should be entryPoint=paymaster,..."))?;
            let entry_point: Address = entry_point
                .trim()
                .parse()
                .with_context(|| format!("invalid entry point address {entry_point}"))?;
            let paymasters = paymasters
                .split(',')
                .map(str::trim)
                .filter(|pm| !pm.is_empty())
                .map(|pm| {
                    pm.parse::<Address>()
                        .with_context(|| format!("invalid paymaster address {pm}"))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            if paymasters.is_empty() {
                bail!("entry point {entry_point:?} has no paymasters");
            }
            if registry.insert(entry_point, paymasters).is_some() {
                bail!("entry point {entry_point:?} is configured twice");
            }
        }
        if registry.is_empty() {
            bail!("at least one entry point must be configured");
        }
        Ok(Self(registry))
    }
}
