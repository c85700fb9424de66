//! Cryptographic primitives: HMAC-SHA256 signing and constant-time checks.

use std::fmt;

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::ack::{FederationAck, UnsignedAck};
use crate::error::CoreError;

type HmacSha256 = Hmac<Sha256>;

/// Length of an HMAC-SHA256 digest in bytes.
pub const SIGNATURE_LEN: usize = 32;

/// The shared federation signing secret.
///
/// Zeroized on drop and redacted in `Debug`. Use [`SharedKey::fingerprint`]
/// to identify a key in logs.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedKey {
    bytes: Vec<u8>,
}

impl SharedKey {
    /// Create from secret bytes. Empty secrets are rejected.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, CoreError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(CoreError::EmptyKey);
        }
        Ok(Self { bytes })
    }

    /// Create from a compile-time string (tests and fixtures).
    ///
    /// An empty string yields a one-byte zero key rather than failing.
    pub fn from_static(secret: &'static str) -> Self {
        let bytes = if secret.is_empty() {
            vec![0u8]
        } else {
            secret.as_bytes().to_vec()
        };
        Self { bytes }
    }

    /// Generate a random 32-byte key.
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Raw secret bytes.
    pub fn expose(&self) -> &[u8] {
        &self.bytes
    }

    /// First 8 bytes of the BLAKE3 hash of the key, hex-encoded.
    pub fn fingerprint(&self) -> String {
        let hash = blake3::hash(&self.bytes);
        hex::encode(&hash.as_bytes()[..8])
    }

    /// HMAC-SHA256 of `message` under this key.
    pub fn mac(&self, message: &[u8]) -> [u8; SIGNATURE_LEN] {
        let mut mac =
            HmacSha256::new_from_slice(&self.bytes).expect("HMAC accepts keys of any length");
        mac.update(message);
        mac.finalize().into_bytes().into()
    }

    /// Hex-encoded HMAC-SHA256 of `message`.
    pub fn sign_hex(&self, message: &[u8]) -> String {
        hex::encode(self.mac(message))
    }

    /// Check a hex signature over `message` in constant time.
    ///
    /// Malformed hex and wrong-length signatures are mismatches.
    pub fn verify_hex(&self, message: &[u8], signature_hex: &str) -> bool {
        let provided = match hex::decode(signature_hex) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        let expected = self.mac(message);
        if provided.len() != expected.len() {
            return false;
        }
        provided.as_slice().ct_eq(expected.as_slice()).into()
    }
}

impl PartialEq for SharedKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes.len() == other.bytes.len()
            && bool::from(self.bytes.as_slice().ct_eq(other.bytes.as_slice()))
    }
}

impl Eq for SharedKey {}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedKey({})", self.fingerprint())
    }
}

/// Sign an ACK: canonicalize, HMAC, attach the hex digest.
pub fn sign_ack(ack: UnsignedAck, key: &SharedKey) -> FederationAck {
    ack.sign(key)
}

/// Constant-time nonce equality.
pub fn compare_nonce(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
