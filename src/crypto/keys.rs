use crate::crypto::hash::Hash256;
use crate::crypto::signatures::Signature;
use crate::{LedgerError, Result};
use secp256k1::{Message, PublicKey as Secp256k1PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hex length of an uncompressed SEC1 public key (65 bytes).
pub const ADDRESS_HEX_LEN: usize = 130;
pub const ADDRESS_PREFIX: &str = "04";

/// Wallet address: the uncompressed public key as lowercase hex.
///
/// Only constructible through validation, so an `Address` held anywhere in
/// the ledger is always well formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn parse(s: &str) -> Result<Self> {
        if !is_valid_address(s) {
            return Err(LedgerError::Structural(format!("Invalid address: {}", s)));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn to_public_key(&self) -> Result<Secp256k1PublicKey> {
        let bytes = hex::decode(&self.0)
            .map_err(|e| LedgerError::Crypto(format!("Invalid address encoding: {}", e)))?;
        Secp256k1PublicKey::from_slice(&bytes)
            .map_err(|e| LedgerError::Crypto(format!("Address is not a curve point: {}", e)))
    }
}

impl TryFrom<String> for Address {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self> {
        if !is_valid_address(&value) {
            return Err(LedgerError::Structural(format!("Invalid address: {}", value)));
        }
        Ok(Self(value))
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Exactly 130 lowercase hex characters starting with `04`.
pub fn is_valid_address(address: &str) -> bool {
    address.len() == ADDRESS_HEX_LEN
        && address.starts_with(ADDRESS_PREFIX)
        && address.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// secp256k1 secret key handed to the ledger as an opaque hex string.
#[derive(Clone)]
pub struct PrivateKey {
    key: SecretKey,
}

impl PrivateKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 32 {
            return Err(LedgerError::Crypto("Private key must be 32 bytes".to_string()));
        }

        let key = SecretKey::from_slice(bytes)
            .map_err(|e| LedgerError::Crypto(format!("Invalid private key: {}", e)))?;

        Ok(Self { key })
    }

    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str.trim())
            .map_err(|e| LedgerError::Crypto(format!("Invalid private key encoding: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.key.secret_bytes())
    }

    /// Derives the wallet address (uncompressed public key) for this key.
    pub fn address(&self) -> Address {
        let secp = Secp256k1::signing_only();
        let public_key = Secp256k1PublicKey::from_secret_key(&secp, &self.key);
        Address(hex::encode(public_key.serialize_uncompressed()))
    }

    /// ECDSA signature over a 32-byte digest.
    pub fn sign(&self, message: &Hash256) -> Signature {
        let secp = Secp256k1::signing_only();
        let message = Message::from_digest(*message.as_bytes());
        let signature = secp.sign_ecdsa(&message, &self.key);
        Signature::from_secp256k1(&signature)
    }
}

// Never print secret material.
impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey({})", self.address())
    }
}

/// `publicKeyFromPrivate` of the adapter contract.
pub fn public_key_from_private(private_key: &PrivateKey) -> Address {
    private_key.address()
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub private_key: PrivateKey,
    pub address: Address,
}

impl KeyPair {
    pub fn from_private_key(private_key: PrivateKey) -> Self {
        let address = private_key.address();
        Self { private_key, address }
    }

    pub fn from_hex(hex_str: &str) -> Result<Self> {
        Ok(Self::from_private_key(PrivateKey::from_hex(hex_str)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENERATOR_ADDRESS: &str = "0479be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8";

    fn secret_one() -> String {
        format!("{}01", "00".repeat(31))
    }

    #[test]
    fn test_address_of_secret_one_is_generator() -> Result<()> {
        let key = PrivateKey::from_hex(&secret_one())?;
        let address = public_key_from_private(&key);

        assert_eq!(address.as_str(), GENERATOR_ADDRESS);
        assert_eq!(address.as_str().len(), ADDRESS_HEX_LEN);
        assert!(address.as_str().starts_with(ADDRESS_PREFIX));

        Ok(())
    }

    #[test]
    fn test_address_validation() {
        assert!(is_valid_address(GENERATOR_ADDRESS));
        assert!(!is_valid_address("invalid"));
        assert!(!is_valid_address(&GENERATOR_ADDRESS.to_uppercase()));
        assert!(!is_valid_address(&format!("05{}", &GENERATOR_ADDRESS[2..])));
        assert!(!is_valid_address(&GENERATOR_ADDRESS[..128]));
        assert!(!is_valid_address(&format!("04{}", "g".repeat(128))));
    }

    #[test]
    fn test_address_deserialization_is_validated() {
        let ok: std::result::Result<Address, _> =
            serde_json::from_str(&format!("\"{}\"", GENERATOR_ADDRESS));
        assert!(ok.is_ok());

        let bad: std::result::Result<Address, _> = serde_json::from_str("\"04abc\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_private_key_rejects_garbage() {
        assert!(PrivateKey::from_hex("not hex").is_err());
        assert!(PrivateKey::from_hex("abcd").is_err());
        assert!(PrivateKey::from_hex(&"00".repeat(32)).is_err());
    }

    #[test]
    fn test_private_key_hex_roundtrip() -> Result<()> {
        let key = PrivateKey::from_hex(&secret_one())?;
        assert_eq!(key.to_hex(), secret_one());
        Ok(())
    }
}
