// src/handlers/mod.rs
//! Sponsorship strategies, selected per request by the context `type`.

use std::{collections::HashMap, fmt, str::FromStr, sync::Arc};

use async_trait::async_trait;
use ethers::types::Address;
#[cfg(test)]
use mockall::automock;

use crate::{
    error::PaymasterError,
    types::{SponsorUserOperationResponse, UserOperation},
};

pub mod context;
pub mod payg;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    /// Pay as you go: the paymaster covers gas in the native token.
    Payg,
}

impl FromStr for StrategyKind {
    type Err = PaymasterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "payg" => Ok(Self::Payg),
            other => Err(PaymasterError::UnsupportedStrategy(other.to_string())),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Payg => write!(f, "payg"),
        }
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Strategy: Send + Sync + 'static {
    /// Produces a signed sponsorship for `op` or fails without a partial result.
    async fn run(
        &self,
        op: &UserOperation,
        entry_point: Address,
        paymaster: Address,
    ) -> Result<SponsorUserOperationResponse, PaymasterError>;
}

/// Strategies available to the dispatcher. Built before the server starts and
/// read-only afterwards.
#[derive(Clone, Default)]
pub struct Strategies {
    handlers: HashMap<StrategyKind, Arc<dyn Strategy>>,
}

impl Strategies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, kind: StrategyKind, strategy: Arc<dyn Strategy>) -> Self {
        self.handlers.insert(kind, strategy);
        self
    }

    pub fn get(&self, kind: StrategyKind) -> Result<Arc<dyn Strategy>, PaymasterError> {
        self.handlers
            .get(&kind)
            .cloned()
            .ok_or_else(|| PaymasterError::UnsupportedStrategy(kind.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_kind_from_str() {
        assert_eq!("payg".parse::<StrategyKind>().unwrap(), StrategyKind::Payg);
        assert_eq!(StrategyKind::Payg.to_string(), "payg");
        assert!(matches!(
            "Payg".parse::<StrategyKind>(),
            Err(PaymasterError::UnsupportedStrategy(t)) if t == "Payg"
        ));
        assert!(matches!(
            "erc20".parse::<StrategyKind>(),
            Err(PaymasterError::UnsupportedStrategy(_))
        ));
    }

    #[test]
    fn test_unregistered_strategy() {
        let strategies = Strategies::new();
        assert!(matches!(
            strategies.get(StrategyKind::Payg),
            Err(PaymasterError::UnsupportedStrategy(_))
        ));

        let strategies = strategies.register(StrategyKind::Payg, Arc::new(MockStrategy::new()));
        assert!(strategies.get(StrategyKind::Payg).is_ok());
    }
}
