//! Hybrid sealing of secret values to a user's RSA key pair.
//!
//! A fresh AES-256-GCM key encrypts the value and is itself wrapped with
//! RSA-OAEP (SHA-256). The sealed field is the standard base64 encoding of
//!
//! ```text
//! 0x01 || u16be(len(wrapped)) || wrapped || nonce(12) || ciphertext+tag
//! ```
//!
//! so it never contains whitespace and travels as a single command token or
//! response field.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rsa::{BigUint, Oaep, RsaPrivateKey, RsaPublicKey};
use russh::keys::ssh_key::Mpint;
use russh::keys::{PrivateKey, PublicKey};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Leading byte of every sealed field.
const FORMAT_VERSION: u8 = 1;

const NONCE_LEN: usize = 12;
const DATA_KEY_LEN: usize = 32;

/// Seal `plaintext` so that only the holder of `key`'s private half can open it.
pub fn seal(key: &RsaPublicKey, plaintext: &[u8]) -> Result<String, CryptoError> {
    let mut data_key = Zeroizing::new([0u8; DATA_KEY_LEN]);
    OsRng.fill_bytes(data_key.as_mut());
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(data_key.as_slice()));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::Seal(e.to_string()))?;
    let wrapped = key
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), data_key.as_slice())
        .map_err(|e| CryptoError::Seal(e.to_string()))?;
    let wrapped_len =
        u16::try_from(wrapped.len()).map_err(|_| CryptoError::Seal("key too large".to_string()))?;

    let mut out = Vec::with_capacity(3 + wrapped.len() + NONCE_LEN + ciphertext.len());
    out.push(FORMAT_VERSION);
    out.extend_from_slice(&wrapped_len.to_be_bytes());
    out.extend_from_slice(&wrapped);
    out.extend_from_slice(nonce.as_slice());
    out.extend_from_slice(&ciphertext);

    Ok(STANDARD.encode(out))
}

/// Open a field produced by [`seal`].
pub fn open(key: &RsaPrivateKey, sealed: &str) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let raw = STANDARD
        .decode(sealed.trim())
        .map_err(|e| CryptoError::Malformed(e.to_string()))?;

    let (&version, rest) = raw
        .split_first()
        .ok_or_else(|| CryptoError::Malformed("empty field".to_string()))?;
    if version != FORMAT_VERSION {
        return Err(CryptoError::Malformed(format!(
            "unknown format version {}",
            version
        )));
    }

    if rest.len() < 2 {
        return Err(CryptoError::Malformed("truncated header".to_string()));
    }
    let wrapped_len = u16::from_be_bytes([rest[0], rest[1]]) as usize;
    let rest = &rest[2..];
    if rest.len() < wrapped_len + NONCE_LEN {
        return Err(CryptoError::Malformed("truncated body".to_string()));
    }
    let (wrapped, rest) = rest.split_at(wrapped_len);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

    let data_key = Zeroizing::new(
        key.decrypt(Oaep::new::<Sha256>(), wrapped)
            .map_err(|e| CryptoError::Decrypt(e.to_string()))?,
    );
    if data_key.len() != DATA_KEY_LEN {
        return Err(CryptoError::Decrypt("unexpected data key length".to_string()));
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&data_key));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::Decrypt("authentication tag mismatch".to_string()))
}

fn uint(value: &Mpint) -> Result<BigUint, CryptoError> {
    value
        .as_positive_bytes()
        .map(BigUint::from_bytes_be)
        .ok_or_else(|| CryptoError::InvalidKey("negative RSA component".to_string()))
}

/// RSA public key behind an SSH public key.
pub fn rsa_public_key(key: &PublicKey) -> Result<RsaPublicKey, CryptoError> {
    let rsa = key
        .key_data()
        .rsa()
        .ok_or_else(|| CryptoError::UnsupportedKey(key.algorithm().to_string()))?;

    RsaPublicKey::new(uint(&rsa.n)?, uint(&rsa.e)?)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

/// RSA private key behind a decrypted SSH private key.
pub fn rsa_private_key(key: &PrivateKey) -> Result<RsaPrivateKey, CryptoError> {
    let keypair = key
        .key_data()
        .rsa()
        .ok_or_else(|| CryptoError::UnsupportedKey(key.algorithm().to_string()))?;

    RsaPrivateKey::from_components(
        uint(&keypair.public.n)?,
        uint(&keypair.public.e)?,
        uint(&keypair.private.d)?,
        vec![uint(&keypair.private.p)?, uint(&keypair.private.q)?],
    )
    .map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

#[cfg(test)]
pub(crate) mod test_keys {
    use rsa::traits::{PrivateKeyParts, PublicKeyParts};
    use rsa::{BigUint, RsaPrivateKey};
    use russh::keys::PrivateKey;
    use russh::keys::ssh_key::Mpint;
    use russh::keys::ssh_key::private::{KeypairData, RsaKeypair};

    use super::OsRng;

    /// Small keys keep the test suite fast; OAEP-SHA256 needs at least 1024 bits
    /// to wrap a 32-byte key.
    pub(crate) fn rsa() -> RsaPrivateKey {
        RsaPrivateKey::new(&mut OsRng, 1024).expect("generate rsa key")
    }

    /// The same kind of key as an SSH private key.
    pub(crate) fn ssh_rsa() -> PrivateKey {
        let key = rsa();
        let mpint = |v: &BigUint| Mpint::from_positive_bytes(&v.to_bytes_be()).expect("mpint");
        let iqmp = key.crt_coefficient().expect("crt coefficient");
        let primes = key.primes();

        let keypair = RsaKeypair {
            public: russh::keys::ssh_key::public::RsaPublicKey {
                e: mpint(key.e()),
                n: mpint(key.n()),
            },
            private: russh::keys::ssh_key::private::RsaPrivateKey {
                d: mpint(key.d()),
                iqmp: mpint(&iqmp),
                p: mpint(&primes[0]),
                q: mpint(&primes[1]),
            },
        };
        PrivateKey::new(KeypairData::Rsa(keypair), "syringe-test").expect("ssh rsa key")
    }
}
