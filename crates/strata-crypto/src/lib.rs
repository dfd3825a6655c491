//! Cryptographic primitives for Strata.
//!
//! Provides domain-separated BLAKE3 hashing, Ed25519 signing/verification,
//! key pairs grouped into lendable [`Rights`], and verification of the
//! hash-linked entry chains kept by every partition.
//!
//! All crypto operations wrap established libraries; there is no custom cryptography.
//! The choice of algorithms is local to this crate; callers only see
//! [`SigningKey`], [`VerifyingKey`], [`Signature`] and [`PublicKeyHash`].

pub mod chain;
pub mod hasher;
pub mod rights;
pub mod signer;

pub use chain::{ChainError, ChainLinked, HashChainVerifier};
pub use hasher::ContentHasher;
pub use rights::{KeyPair, Rights, RightsSet};
pub use signer::{PublicKeyHash, Signature, SignatureError, SigningKey, VerifyingKey};
