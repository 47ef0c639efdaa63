//! Hashing and signature adapter

pub mod keys;
pub mod signatures;
pub mod hash;

pub use keys::{Address, KeyPair, PrivateKey, public_key_from_private};
pub use signatures::Signature;
pub use hash::Hash256;
