use std::fmt;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::RngCore;

use super::{Token, TokenError};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 24;

/// Asymmetric signing pair plus the symmetric payload secret
#[derive(Clone)]
pub struct SecurityKeys {
    signing: SigningKey,
    verifying: VerifyingKey,
    secret: [u8; KEY_LEN],
}

impl SecurityKeys {
    /// Build from raw buffers: 32-byte Ed25519 seed, 32-byte public key, 32-byte secret
    pub fn from_bytes(private_key: &[u8], public_key: &[u8], secret: &[u8]) -> Result<Self, TokenError> {
        let seed: [u8; KEY_LEN] = private_key
            .try_into()
            .map_err(|_| TokenError::InvalidKey("private key must be 32 bytes"))?;
        let public: [u8; KEY_LEN] = public_key
            .try_into()
            .map_err(|_| TokenError::InvalidKey("public key must be 32 bytes"))?;
        let secret: [u8; KEY_LEN] = secret
            .try_into()
            .map_err(|_| TokenError::InvalidKey("secret must be 32 bytes"))?;

        let signing = SigningKey::from_bytes(&seed);
        let verifying = VerifyingKey::from_bytes(&public)
            .map_err(|_| TokenError::InvalidKey("public key is not a valid Ed25519 point"))?;
        if signing.verifying_key() != verifying {
            return Err(TokenError::InvalidKey("public key does not match private key"));
        }

        Ok(Self {
            signing,
            verifying,
            secret,
        })
    }

    /// Same as `from_bytes`, with each buffer base64 encoded
    pub fn from_base64(private_key: &str, public_key: &str, secret: &str) -> Result<Self, TokenError> {
        let decode = |value: &str, what: &'static str| {
            STANDARD
                .decode(value.trim())
                .map_err(|_| TokenError::InvalidKey(what))
        };
        Self::from_bytes(
            &decode(private_key, "private key is not base64")?,
            &decode(public_key, "public key is not base64")?,
            &decode(secret, "secret is not base64")?,
        )
    }

    /// Fresh random key set
    pub fn generate() -> Self {
        let signing = SigningKey::generate(&mut rand::rngs::OsRng);
        let mut secret = [0u8; KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut secret);
        Self {
            verifying: signing.verifying_key(),
            signing,
            secret,
        }
    }

    /// `(private, public, secret)`, base64 encoded
    pub fn to_base64(&self) -> (String, String, String) {
        (
            STANDARD.encode(self.signing.to_bytes()),
            STANDARD.encode(self.verifying.to_bytes()),
            STANDARD.encode(self.secret),
        )
    }
}

impl fmt::Debug for SecurityKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityKeys")
            .field("verifying", &self.verifying)
            .finish_non_exhaustive()
    }
}

/// Seals tokens for transport and unseals them on the way back in.
///
/// Sealing encrypts then signs; unsealing verifies before it decrypts, so a
/// payload is never decrypted unless its ciphertext carries a good signature.
#[derive(Debug, Clone)]
pub struct TokenSealer {
    keys: SecurityKeys,
}

impl TokenSealer {
    pub fn new(keys: SecurityKeys) -> Self {
        Self { keys }
    }

    fn cipher(&self) -> Result<XChaCha20Poly1305, TokenError> {
        XChaCha20Poly1305::new_from_slice(&self.keys.secret)
            .map_err(|_| TokenError::InvalidKey("secret has the wrong length"))
    }

    /// `base64url(nonce || ciphertext) . base64url(signature)`
    pub fn seal(&self, token: &Token) -> Result<String, TokenError> {
        if let Some(key) = token.reserved_claim() {
            return Err(TokenError::ReservedClaim(key.to_string()));
        }
        let payload = serde_json::to_vec(token).map_err(|e| TokenError::Payload(e.to_string()))?;

        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher()?
            .encrypt(&nonce, payload.as_slice())
            .map_err(|_| TokenError::Encryption)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);

        let signature = self.keys.signing.sign(&sealed);
        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&sealed),
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        ))
    }

    pub fn unseal(&self, sealed: &str) -> Result<Token, TokenError> {
        let (body, signature) = sealed.trim().split_once('.').ok_or(TokenError::Malformed)?;
        let ciphertext = URL_SAFE_NO_PAD.decode(body).map_err(|_| TokenError::Malformed)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Malformed)?;
        let signature = Signature::from_slice(&signature).map_err(|_| TokenError::Malformed)?;

        self.keys
            .verifying
            .verify_strict(&ciphertext, &signature)
            .map_err(|_| TokenError::BadSignature)?;

        if ciphertext.len() <= NONCE_LEN {
            return Err(TokenError::Decryption);
        }
        let (nonce, ciphertext) = ciphertext.split_at(NONCE_LEN);
        let payload = self
            .cipher()?
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| TokenError::Decryption)?;

        let token: Token =
            serde_json::from_slice(&payload).map_err(|e| TokenError::Payload(e.to_string()))?;
        if token.is_expired() {
            return Err(TokenError::Expired);
        }
        Ok(token)
    }
}
