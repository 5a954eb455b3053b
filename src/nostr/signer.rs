//! Signing collaborators.
//!
//! The event layer never does cryptography itself. It hands the canonical
//! bytes of an event to a [`Signer`] and stores whatever hex signature comes
//! back. Two signers are provided:
//!
//! - [`SchnorrSigner`]: BIP-340 Schnorr over `SHA-256(canonical)` on secp256k1
//! - [`HmacTestSigner`]: a NON-SECURE stub (HMAC-SHA256 with a symmetric
//!   secret) for exercising relays that do not check signatures
//!
//! Both implement the same trait, so callers can swap one for the other
//! without touching event code.

use std::sync::LazyLock;

use nostr::secp256k1::{
    rand::rngs::OsRng, schnorr::Signature, Keypair, Message, Secp256k1, SecretKey, XOnlyPublicKey,
};
use ring::hmac;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::nostr::error::{NostrError, Result};

/// Global secp256k1 context.
///
/// Building a context precomputes signing and verification tables, so one
/// shared instance is reused for every operation.
pub static SECP: LazyLock<Secp256k1<nostr::secp256k1::All>> = LazyLock::new(Secp256k1::new);

fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&Sha256::digest(bytes));
    hash
}

/// Produces signatures over canonical event bytes.
pub trait Signer {
    /// Hex-encoded public identifier placed in the event's `pubkey` field.
    fn public_key_hex(&self) -> String;

    /// Signs `canonical` and returns the hex-encoded signature.
    ///
    /// # Errors
    ///
    /// Returns [`NostrError::Signing`] if the signature cannot be produced.
    fn sign(&self, canonical: &[u8]) -> Result<String>;
}

/// A secp256k1 keypair producing BIP-340 Schnorr signatures.
///
/// The secret bytes are zeroized when dropped.
///
/// # Example
///
/// ```
/// use relay_probe::nostr::{SchnorrSigner, Signer};
///
/// let signer = SchnorrSigner::generate();
/// let sig = signer.sign(b"canonical bytes").unwrap();
/// assert_eq!(sig.len(), 128);
/// assert!(SchnorrSigner::verify(&signer.public_key_hex(), b"canonical bytes", &sig).is_ok());
/// ```
#[derive(ZeroizeOnDrop)]
pub struct SchnorrSigner {
    secret_bytes: [u8; 32],

    #[zeroize(skip)]
    pubkey_bytes: [u8; 32],
}

impl SchnorrSigner {
    /// Generates a new random keypair from the OS RNG.
    #[must_use]
    pub fn generate() -> Self {
        let keypair = Keypair::new(&SECP, &mut OsRng);
        let secret_bytes = keypair.secret_key().secret_bytes();
        let (public_key, _parity) = keypair.x_only_public_key();

        Self {
            secret_bytes,
            pubkey_bytes: public_key.serialize(),
        }
    }

    /// Creates a signer from raw secret key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`NostrError::KeyDerivation`] if the bytes are not a valid
    /// secp256k1 secret key.
    pub fn from_bytes(secret_bytes: [u8; 32]) -> Result<Self> {
        let secret_key = SecretKey::from_slice(&secret_bytes)
            .map_err(|e| NostrError::KeyDerivation(e.to_string()))?;
        let keypair = Keypair::from_secret_key(&SECP, &secret_key);
        let (public_key, _parity) = keypair.x_only_public_key();

        Ok(Self {
            secret_bytes,
            pubkey_bytes: public_key.serialize(),
        })
    }

    /// Creates a signer from a 64-character hex secret key.
    ///
    /// # Errors
    ///
    /// Returns an error if the hex is invalid, not 32 bytes, or not a valid key.
    pub fn from_hex(secret_hex: &str) -> Result<Self> {
        let mut decoded = hex::decode(secret_hex.trim())?;
        let bytes: std::result::Result<[u8; 32], _> = decoded.as_slice().try_into();
        decoded.zeroize();
        let mut bytes = bytes
            .map_err(|_| NostrError::KeyDerivation("secret key must be 32 bytes".to_string()))?;
        let signer = Self::from_bytes(bytes);
        bytes.zeroize();
        signer
    }

    /// Verifies a hex Schnorr signature over `SHA-256(canonical)`.
    ///
    /// # Errors
    ///
    /// Returns [`NostrError::InvalidEvent`] for malformed keys or signatures and
    /// [`NostrError::InvalidSignature`] if verification fails.
    pub fn verify(pubkey_hex: &str, canonical: &[u8], sig_hex: &str) -> Result<()> {
        let pubkey_bytes: [u8; 32] = hex::decode(pubkey_hex)?
            .try_into()
            .map_err(|_| NostrError::InvalidEvent("Invalid pubkey length".to_string()))?;
        let pubkey = XOnlyPublicKey::from_slice(&pubkey_bytes)
            .map_err(|e| NostrError::InvalidEvent(format!("Invalid pubkey: {e}")))?;

        let sig_bytes: [u8; 64] = hex::decode(sig_hex)?
            .try_into()
            .map_err(|_| NostrError::InvalidEvent("Invalid signature length".to_string()))?;
        let signature = Signature::from_slice(&sig_bytes)
            .map_err(|e| NostrError::InvalidEvent(format!("Invalid signature: {e}")))?;

        let message = Message::from_digest(sha256(canonical));
        SECP.verify_schnorr(&signature, &message, &pubkey)
            .map_err(|_| NostrError::InvalidSignature)
    }
}

impl Signer for SchnorrSigner {
    fn public_key_hex(&self) -> String {
        hex::encode(self.pubkey_bytes)
    }

    fn sign(&self, canonical: &[u8]) -> Result<String> {
        let mut secret_bytes_copy = self.secret_bytes;

        let result = (|| {
            let secret_key = SecretKey::from_slice(&secret_bytes_copy)
                .map_err(|e| NostrError::Signing(e.to_string()))?;
            let keypair = Keypair::from_secret_key(&SECP, &secret_key);
            let message = Message::from_digest(sha256(canonical));
            let signature = SECP.sign_schnorr(&message, &keypair);
            Ok(hex::encode(signature.serialize()))
        })();

        secret_bytes_copy.zeroize();

        result
    }
}

impl std::fmt::Debug for SchnorrSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchnorrSigner")
            .field("pubkey", &self.public_key_hex())
            .finish()
    }
}

/// NON-SECURE test signer: HMAC-SHA256 with a symmetric secret.
///
/// Its public identifier is just `SHA-256(secret)`, which anyone holding the
/// identifier cannot verify against. Use it only against relays that do not
/// check signatures. It must never stand in for a real identity.
#[derive(ZeroizeOnDrop)]
pub struct HmacTestSigner {
    secret: Vec<u8>,
}

impl HmacTestSigner {
    /// Generates a random 32-byte secret.
    #[must_use]
    pub fn generate() -> Self {
        let secret: [u8; 32] = rand::random();
        Self {
            secret: secret.to_vec(),
        }
    }

    /// Creates a stub signer from a hex secret.
    ///
    /// # Errors
    ///
    /// Returns an error if the hex is invalid or empty.
    pub fn from_hex(secret_hex: &str) -> Result<Self> {
        let secret = hex::decode(secret_hex.trim())?;
        if secret.is_empty() {
            return Err(NostrError::KeyDerivation("secret must not be empty".to_string()));
        }
        Ok(Self { secret })
    }

    /// Checks a signature produced by [`Signer::sign`].
    ///
    /// # Errors
    ///
    /// Returns [`NostrError::InvalidSignature`] on mismatch.
    pub fn verify(&self, canonical: &[u8], sig_hex: &str) -> Result<()> {
        let tag = hex::decode(sig_hex)?;
        let key = hmac::Key::new(hmac::HMAC_SHA256, &self.secret);
        hmac::verify(&key, canonical, &tag).map_err(|_| NostrError::InvalidSignature)
    }
}

/// Derives a stub public identifier from a hex secret: `hex(SHA-256(secret))`.
///
/// Test key material only; this is not a real public key.
///
/// # Errors
///
/// Returns an error if `secret_hex` is not valid hex.
pub fn derive_test_identifier(secret_hex: &str) -> Result<String> {
    let secret = hex::decode(secret_hex.trim())?;
    Ok(hex::encode(Sha256::digest(&secret)))
}

impl Signer for HmacTestSigner {
    fn public_key_hex(&self) -> String {
        hex::encode(Sha256::digest(&self.secret))
    }

    fn sign(&self, canonical: &[u8]) -> Result<String> {
        let key = hmac::Key::new(hmac::HMAC_SHA256, &self.secret);
        Ok(hex::encode(hmac::sign(&key, canonical).as_ref()))
    }
}

impl std::fmt::Debug for HmacTestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacTestSigner")
            .field("pubkey", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

impl<S: Signer + ?Sized> Signer for Box<S> {
    fn public_key_hex(&self) -> String {
        (**self).public_key_hex()
    }

    fn sign(&self, canonical: &[u8]) -> Result<String> {
        (**self).sign(canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schnorr_generate_creates_valid_keypair() {
        let signer = SchnorrSigner::generate();
        let pubkey = signer.public_key_hex();
        assert_eq!(pubkey.len(), 64);
        assert!(pubkey.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn schnorr_generate_creates_unique_keypairs() {
        let a = SchnorrSigner::generate();
        let b = SchnorrSigner::generate();
        assert_ne!(a.public_key_hex(), b.public_key_hex());
    }

    #[test]
    fn schnorr_from_bytes_is_deterministic() {
        let bytes = [0x01u8; 32];
        let a = SchnorrSigner::from_bytes(bytes).unwrap();
        let b = SchnorrSigner::from_bytes(bytes).unwrap();
        assert_eq!(a.public_key_hex(), b.public_key_hex());
    }

    #[test]
    fn schnorr_from_bytes_rejects_zero_key() {
        let result = SchnorrSigner::from_bytes([0u8; 32]);
        assert!(matches!(result, Err(NostrError::KeyDerivation(_))));
    }

    #[test]
    fn schnorr_from_hex_matches_from_bytes() {
        let from_hex = SchnorrSigner::from_hex(&"01".repeat(32)).unwrap();
        let from_bytes = SchnorrSigner::from_bytes([0x01; 32]).unwrap();
        assert_eq!(from_hex.public_key_hex(), from_bytes.public_key_hex());
    }

    #[test]
    fn schnorr_from_hex_rejects_wrong_length() {
        let result = SchnorrSigner::from_hex("0102");
        assert!(matches!(result, Err(NostrError::KeyDerivation(_))));
    }

    #[test]
    fn schnorr_from_hex_rejects_bad_hex() {
        let result = SchnorrSigner::from_hex("zz");
        assert!(matches!(result, Err(NostrError::HexError(_))));
    }

    #[test]
    fn schnorr_signature_verifies() {
        let signer = SchnorrSigner::generate();
        let sig = signer.sign(b"payload").unwrap();
        assert_eq!(sig.len(), 128);
        SchnorrSigner::verify(&signer.public_key_hex(), b"payload", &sig).unwrap();
    }

    #[test]
    fn schnorr_signature_rejects_other_payload() {
        let signer = SchnorrSigner::generate();
        let sig = signer.sign(b"payload").unwrap();
        let result = SchnorrSigner::verify(&signer.public_key_hex(), b"tampered", &sig);
        assert!(matches!(result, Err(NostrError::InvalidSignature)));
    }

    #[test]
    fn schnorr_verify_rejects_short_signature() {
        let signer = SchnorrSigner::generate();
        let result = SchnorrSigner::verify(&signer.public_key_hex(), b"payload", "abcd");
        assert!(matches!(result, Err(NostrError::InvalidEvent(_))));
    }

    #[test]
    fn schnorr_debug_does_not_expose_secret() {
        let signer = SchnorrSigner::from_bytes([0x42; 32]).unwrap();
        let debug = format!("{signer:?}");
        assert!(debug.contains("pubkey"));
        assert!(!debug.contains(&"42".repeat(32)));
    }

    #[test]
    fn hmac_signature_is_deterministic() {
        let signer = HmacTestSigner::from_hex(&"ab".repeat(32)).unwrap();
        let a = signer.sign(b"payload").unwrap();
        let b = signer.sign(b"payload").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        signer.verify(b"payload", &a).unwrap();
    }

    #[test]
    fn hmac_verify_rejects_tampering() {
        let signer = HmacTestSigner::generate();
        let sig = signer.sign(b"payload").unwrap();
        assert!(matches!(
            signer.verify(b"other", &sig),
            Err(NostrError::InvalidSignature)
        ));
    }

    #[test]
    fn hmac_public_key_is_sha256_of_secret() {
        let secret_hex = "00".repeat(32);
        let signer = HmacTestSigner::from_hex(&secret_hex).unwrap();
        assert_eq!(
            signer.public_key_hex(),
            derive_test_identifier(&secret_hex).unwrap()
        );
        assert_eq!(
            signer.public_key_hex(),
            "66687aadf862bd776c8fc18b8e9f8e20089714856ee233b3902a591d0d5f2925"
        );
    }

    #[test]
    fn hmac_rejects_empty_secret() {
        assert!(matches!(
            HmacTestSigner::from_hex(""),
            Err(NostrError::KeyDerivation(_))
        ));
    }

    #[test]
    fn boxed_signer_delegates() {
        let inner = HmacTestSigner::from_hex("0102").unwrap();
        let expected = inner.sign(b"x").unwrap();
        let boxed: Box<dyn Signer> = Box::new(inner);
        assert_eq!(boxed.sign(b"x").unwrap(), expected);
    }
}
