//! ML-DSA signature verification for contract proofs.
//!
//! Contract participants are identified by their ML-DSA-65 public keys, carried
//! hex-encoded in contracts and configuration. Proofs are signed under a fixed
//! signing context so a proof signature can never be replayed as a signature
//! for another protocol.

use crate::error::{Error, Result};
use saorsa_pqc::api::sig::{ml_dsa_65, MlDsaPublicKey, MlDsaSecretKey, MlDsaSignature, MlDsaVariant};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use tracing::trace;

/// Signing context for domain separation.
pub const SIGNING_CONTEXT: &[u8] = b"tollgate-proof-v1";

/// ML-DSA-65 signature size in bytes.
pub const SIGNATURE_SIZE: usize = 3309;

/// ML-DSA-65 public key size in bytes.
pub const PUBLIC_KEY_SIZE: usize = 1952;

/// Address length in bytes (truncated SHA-256 of the public key).
pub const ADDRESS_SIZE: usize = 20;

/// An ML-DSA-65 public key identifying a provider, client or delegate.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PubKey(Vec<u8>);

impl PubKey {
    /// Wrap raw public key bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the key does not have the ML-DSA-65 size.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PUBLIC_KEY_SIZE {
            return Err(Error::Crypto(format!(
                "Invalid public key size: expected {PUBLIC_KEY_SIZE}, got {}",
                bytes.len()
            )));
        }
        Ok(Self(bytes.to_vec()))
    }

    /// Decode a hex-encoded public key (either case).
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not hex or has the wrong size.
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let bytes = hex::decode(encoded.trim())
            .map_err(|e| Error::Crypto(format!("Invalid public key encoding: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// Raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lower-case hex encoding of the key.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Derive the account address bound to this key.
    #[must_use]
    pub fn address(&self) -> Address {
        let digest = Sha256::digest(&self.0);
        let mut bytes = [0u8; ADDRESS_SIZE];
        bytes.copy_from_slice(&digest[..ADDRESS_SIZE]);
        Address(bytes)
    }
}

impl fmt::Display for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PubKey({})", self.address())
    }
}

impl FromStr for PubKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for PubKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::from_hex(&value)
    }
}

impl From<PubKey> for String {
    fn from(key: PubKey) -> Self {
        key.to_hex()
    }
}

/// Account address derived from a public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address([u8; ADDRESS_SIZE]);

impl Address {
    /// Parse a hex-encoded address.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not 20 bytes of hex.
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let bytes = hex::decode(encoded)
            .map_err(|e| Error::Crypto(format!("Invalid address encoding: {e}")))?;
        let bytes: [u8; ADDRESS_SIZE] = bytes.try_into().map_err(|b: Vec<u8>| {
            Error::Crypto(format!(
                "Invalid address size: expected {ADDRESS_SIZE}, got {}",
                b.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Raw address bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Capability to check that a signature over a message was produced by a key.
pub trait SignatureVerifier: Send + Sync {
    /// Verify `signature` over `message` against `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the signature is malformed or does not verify.
    fn verify(&self, key: &PubKey, message: &[u8], signature: &[u8]) -> Result<()>;
}

/// ML-DSA-65 verifier using [`SIGNING_CONTEXT`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MlDsaVerifier;

impl SignatureVerifier for MlDsaVerifier {
    fn verify(&self, key: &PubKey, message: &[u8], signature: &[u8]) -> Result<()> {
        if signature.len() != SIGNATURE_SIZE {
            return Err(Error::Crypto(format!(
                "Invalid signature size: expected {SIGNATURE_SIZE}, got {}",
                signature.len()
            )));
        }

        let public_key = MlDsaPublicKey::from_bytes(MlDsaVariant::MlDsa65, key.as_bytes())
            .map_err(|e| Error::Crypto(format!("Invalid public key: {e}")))?;
        let sig = MlDsaSignature::from_bytes(MlDsaVariant::MlDsa65, signature)
            .map_err(|e| Error::Crypto(format!("Invalid signature format: {e}")))?;

        let valid = ml_dsa_65()
            .verify_with_context(&public_key, message, &sig, SIGNING_CONTEXT)
            .map_err(|e| Error::Crypto(format!("Signature verification error: {e}")))?;

        if valid {
            trace!("Signature verified for {}", key.address());
            Ok(())
        } else {
            Err(Error::Crypto(
                "Signature verification failed: invalid signature".to_string(),
            ))
        }
    }
}

/// Generate a fresh ML-DSA-65 keypair.
///
/// # Errors
///
/// Returns an error if key generation fails.
pub fn generate_keypair() -> Result<(PubKey, MlDsaSecretKey)> {
    let (public_key, secret_key) = ml_dsa_65()
        .generate_keypair()
        .map_err(|e| Error::Crypto(format!("Key generation failed: {e}")))?;
    let key = PubKey::from_bytes(&public_key.to_bytes())?;
    Ok((key, secret_key))
}

/// Sign `message` under [`SIGNING_CONTEXT`].
///
/// # Errors
///
/// Returns an error if signing fails.
pub fn sign(secret_key: &MlDsaSecretKey, message: &[u8]) -> Result<Vec<u8>> {
    let signature = ml_dsa_65()
        .sign_with_context(secret_key, message, SIGNING_CONTEXT)
        .map_err(|e| Error::Crypto(format!("Signing failed: {e}")))?;
    Ok(signature.to_bytes().to_vec())
}
