//! The keyring boundary. Storage backends (`file`, `os`) are external
//! collaborators out of scope for the core; only the `test` in-memory backend
//! lives here, for development and tests.

use async_trait::async_trait;
use k256::ecdsa::signature::Signer;
use k256::ecdsa::{Signature as EcdsaSignature, SigningKey, VerifyingKey};

use crate::error::KeyringError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(pub Vec<u8>);

/// Signing-key storage abstraction. The core only ever calls `sign`/`address`/
/// `account_number`; it never touches key material directly.
#[async_trait]
pub trait Keyring: Send + Sync {
    async fn sign(&self, digest: &[u8; 32]) -> Result<Signature, KeyringError>;
    fn address(&self) -> &str;
    fn account_number(&self) -> u64;
}

/// In-memory secp256k1 keyring. Never used for real funds;
/// intended for local development and the integration test suite.
pub struct InMemoryKeyring {
    signing_key: SigningKey,
    address: String,
    account_number: u64,
}

impl InMemoryKeyring {
    pub fn generate(address: impl Into<String>, account_number: u64) -> Self {
        let signing_key = SigningKey::random(&mut rand::thread_rng());
        Self {
            signing_key,
            address: address.into(),
            account_number,
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        *self.signing_key.verifying_key()
    }
}

#[async_trait]
impl Keyring for InMemoryKeyring {
    async fn sign(&self, digest: &[u8; 32]) -> Result<Signature, KeyringError> {
        let signature: EcdsaSignature = self
            .signing_key
            .try_sign(digest)
            .map_err(|err| KeyringError::SigningFailed(err.to_string()))?;
        Ok(Signature(signature.to_der().as_bytes().to_vec()))
    }

    fn address(&self) -> &str {
        &self.address
    }

    fn account_number(&self) -> u64 {
        self.account_number
    }
}
