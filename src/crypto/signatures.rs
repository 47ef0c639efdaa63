use crate::crypto::hash::Hash256;
use crate::crypto::keys::Address;
use crate::{LedgerError, Result};
use secp256k1::{ecdsa::Signature as Secp256k1Signature, Message, Secp256k1};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// DER encoded ECDSA signature, hex on the wire. Empty for coinbase inputs
/// and for inputs that have not been signed yet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Signature(Vec<u8>);

impl Signature {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn from_der(der: &[u8]) -> Self {
        Self(der.to_vec())
    }

    pub fn from_secp256k1(signature: &Secp256k1Signature) -> Self {
        Self(signature.serialize_der().to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| LedgerError::Structural(format!("Invalid signature encoding: {}", e)))?;
        Ok(Self(bytes))
    }

    fn to_secp256k1(&self) -> Result<Secp256k1Signature> {
        let mut signature = Secp256k1Signature::from_der(&self.0)
            .map_err(|e| LedgerError::Signature(format!("Invalid DER signature: {}", e)))?;
        // libsecp256k1 only verifies low-S signatures.
        signature.normalize_s();
        Ok(signature)
    }

    /// Verifies this signature over `message` against the public key encoded in `address`.
    pub fn verify(&self, address: &Address, message: &Hash256) -> Result<()> {
        if self.is_empty() {
            return Err(LedgerError::Signature("Missing signature".to_string()));
        }

        let secp = Secp256k1::verification_only();
        let public_key = address.to_public_key()?;
        let message = Message::from_digest(*message.as_bytes());
        let signature = self.to_secp256k1()?;

        secp.verify_ecdsa(&message, &signature, &public_key)
            .map_err(|_| LedgerError::Signature(format!("Signature does not verify for {}", address)))
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Signature::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// `verify(publicKey, message, signature)` of the adapter contract.
pub fn verify(address: &Address, message: &Hash256, signature: &Signature) -> bool {
    signature.verify(address, message).is_ok()
}
