// src/signer.rs
use ethers::{
    signers::{LocalWallet, Signer},
    types::{Address, Bytes},
    utils::hash_message,
};
#[cfg(test)]
use mockall::automock;

use crate::error::PaymasterError;

/// Holder of the paymaster's signing key. Shared read-only across requests.
#[cfg_attr(test, automock)]
pub trait PaymasterSigner: Send + Sync + 'static {
    fn address(&self) -> Address;

    /// Signs `message` as an EIP-191 personal message and returns `r ‖ s ‖ v`
    /// with `v` in {27, 28}.
    fn sign_message(&self, message: &[u8]) -> Result<Bytes, PaymasterError>;
}

pub struct LocalSigner {
    wallet: LocalWallet,
}

impl LocalSigner {
    pub fn new(private_key: &str) -> Result<Self, PaymasterError> {
        let wallet = private_key
            .parse::<LocalWallet>()
            .map_err(|e| PaymasterError::Signing(format!("invalid signing key: {e}")))?;
        Ok(Self { wallet })
    }
}

impl PaymasterSigner for LocalSigner {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    fn sign_message(&self, message: &[u8]) -> Result<Bytes, PaymasterError> {
        // keccak256("\x19Ethereum Signed Message:\n" ‖ len(message) ‖ message)
        let digest = hash_message(message);
        // `sign_hash` already yields v = 27/28, the form ecrecover expects.
        let signature = self
            .wallet
            .sign_hash(digest)
            .map_err(|e| PaymasterError::Signing(e.to_string()))?;
        Ok(Bytes::from(signature.to_vec()))
    }
}
