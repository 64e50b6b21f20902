use anyhow::{Context, Result, bail};
use blake3::Hasher;
use ed25519_dalek::{
    PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH, Signature, Signer, SigningKey, Verifier, VerifyingKey,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const HASH_LENGTH: usize = 32;

/// blake3 digest used as content address throughout the ledger.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Hash(pub [u8; HASH_LENGTH]);

impl Hash {
    pub const ZERO: Hash = Hash([0u8; HASH_LENGTH]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_LENGTH]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let raw = hex::decode(s.trim()).context("decoding hash hex")?;
        let arr: [u8; HASH_LENGTH] = raw
            .as_slice()
            .try_into()
            .map_err(|_| anyhow::anyhow!("hash must be {} bytes, got {}", HASH_LENGTH, raw.len()))?;
        Ok(Hash(arr))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", &self.to_hex()[..12])
    }
}

pub fn hash_bytes(bytes: &[u8]) -> Hash {
    let mut h = Hasher::new();
    h.update(bytes);
    Hash(h.finalize().into())
}

/// An address is the owner's ed25519 verifying key, so a signature over a
/// transaction can be checked against `from` without a separate key lookup.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Address(pub [u8; PUBLIC_KEY_LENGTH]);

impl Address {
    pub fn from_public_key(pk: &VerifyingKey) -> Self {
        Address(pk.to_bytes())
    }

    pub fn from_secret_key(sk: &SigningKey) -> Self {
        Self::from_public_key(&sk.verifying_key())
    }

    pub fn verifying_key(&self) -> Result<VerifyingKey, ed25519_dalek::SignatureError> {
        VerifyingKey::from_bytes(&self.0)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let pk = public_key_from_hex(s)?;
        Ok(Self::from_public_key(&pk))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", &self.to_hex()[..12])
    }
}

pub fn generate_keypair() -> (VerifyingKey, SigningKey) {
    let sk = SigningKey::generate(&mut OsRng);
    (sk.verifying_key(), sk)
}

// Same seed always yields the same pair; handy for tests and test mode.
pub fn keypair_from_seed(seed: &[u8]) -> (VerifyingKey, SigningKey) {
    let mut h = Hasher::new();
    h.update(b"kitty-ledger seed");
    h.update(seed);
    let secret: [u8; SECRET_KEY_LENGTH] = h.finalize().into();
    let sk = SigningKey::from_bytes(&secret);
    (sk.verifying_key(), sk)
}

pub fn sign_hash(hash: &Hash, sk: &SigningKey) -> Signature {
    sk.sign(&hash.0)
}

pub fn verify_hash(
    hash: &Hash,
    sig: &Signature,
    pk: &VerifyingKey,
) -> Result<(), ed25519_dalek::SignatureError> {
    pk.verify(&hash.0, sig)
}

pub fn public_key_from_hex(s: &str) -> Result<VerifyingKey> {
    let raw = hex::decode(s.trim()).context("decoding public key hex")?;
    if raw.len() != PUBLIC_KEY_LENGTH {
        bail!("public key must be {} bytes, got {}", PUBLIC_KEY_LENGTH, raw.len());
    }
    let mut arr = [0u8; PUBLIC_KEY_LENGTH];
    arr.copy_from_slice(&raw);
    VerifyingKey::from_bytes(&arr).context("invalid ed25519 public key")
}

pub fn secret_key_from_hex(s: &str) -> Result<SigningKey> {
    let raw = hex::decode(s.trim()).context("decoding secret key hex")?;
    if raw.len() != SECRET_KEY_LENGTH {
        bail!("secret key must be {} bytes, got {}", SECRET_KEY_LENGTH, raw.len());
    }
    let mut arr = [0u8; SECRET_KEY_LENGTH];
    arr.copy_from_slice(&raw);
    Ok(SigningKey::from_bytes(&arr))
}
