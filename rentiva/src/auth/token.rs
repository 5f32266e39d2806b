//! Symmetric token codec shared by access and session tokens.
//!
//! A token is `base64(nonce || tag || ciphertext)` where the ciphertext is
//! an AES-256-GCM encryption of a JSON claim set. Keys are derived by
//! hashing the configured secret with SHA-256 so secrets of any length
//! normalize to the cipher's key length. The two token families use
//! distinct keys; decoding under the wrong key fails the tag check.

use aes_gcm::{
    AesGcm, KeyInit,
    aead::{Aead, consts::U16, generic_array::GenericArray},
    aes::Aes256,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use serde::{Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};

use super::errors::AuthError;

/// Nonce length in bytes. The wire layout reserves 16 bytes for it.
const NONCE_LEN: usize = 16;

/// GCM authentication tag length in bytes.
const TAG_LEN: usize = 16;

/// AES-256 key length in bytes.
const KEY_LEN: usize = 32;

/// AES-256-GCM parameterized for the 16-byte nonce in the wire layout.
type TokenCipher = AesGcm<Aes256, U16>;

/// Symmetric key for one token family.
#[derive(Clone)]
pub struct TokenKey([u8; KEY_LEN]);

impl TokenKey {
    /// Derive a key from a configured secret string via SHA-256.
    pub fn derive(secret: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        let digest = hasher.finalize();
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&digest);
        Self(key)
    }
}

impl std::fmt::Debug for TokenKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material never reaches logs.
        f.write_str("TokenKey(..)")
    }
}

/// Encrypt a claim set into an opaque token string.
///
/// # Errors
///
/// * `AuthError::TokenEncodingFailed` - Claim serialization or encryption failed
pub fn encode_claims<T: Serialize>(claims: &T, key: &TokenKey) -> Result<String, AuthError> {
    let plaintext = serde_json::to_vec(claims).map_err(|_| AuthError::TokenEncodingFailed)?;

    let cipher = TokenCipher::new(GenericArray::from_slice(&key.0));
    let mut nonce = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce);

    let sealed = cipher
        .encrypt(GenericArray::from_slice(&nonce), plaintext.as_slice())
        .map_err(|_| AuthError::TokenEncodingFailed)?;

    // The cipher appends the tag to the ciphertext; the wire layout is
    // nonce, then tag, then ciphertext.
    let split = sealed.len() - TAG_LEN;
    let mut raw = Vec::with_capacity(NONCE_LEN + sealed.len());
    raw.extend_from_slice(&nonce);
    raw.extend_from_slice(&sealed[split..]);
    raw.extend_from_slice(&sealed[..split]);

    Ok(BASE64.encode(raw))
}

/// Decrypt a token back into its claim set.
///
/// # Errors
///
/// * `AuthError::MalformedToken` - Not valid base64, or too short for nonce + tag
/// * `AuthError::TamperedToken` - Authentication tag check failed; the
///   plaintext is never interpreted in this case
/// * `AuthError::CorruptToken` - Decrypted bytes are not a valid claim set
pub fn decode_claims<T: DeserializeOwned>(token: &str, key: &TokenKey) -> Result<T, AuthError> {
    let raw = BASE64.decode(token).map_err(|_| AuthError::MalformedToken)?;
    if raw.len() < NONCE_LEN + TAG_LEN {
        return Err(AuthError::MalformedToken);
    }

    let (nonce, rest) = raw.split_at(NONCE_LEN);
    let (tag, ciphertext) = rest.split_at(TAG_LEN);

    // Reassemble into the ciphertext-then-tag order the cipher expects.
    let mut sealed = Vec::with_capacity(rest.len());
    sealed.extend_from_slice(ciphertext);
    sealed.extend_from_slice(tag);

    let cipher = TokenCipher::new(GenericArray::from_slice(&key.0));
    let plaintext = cipher
        .decrypt(GenericArray::from_slice(nonce), sealed.as_slice())
        .map_err(|_| AuthError::TamperedToken)?;

    serde_json::from_slice(&plaintext).map_err(|_| AuthError::CorruptToken)
}

/// Cheap structural validity check without decrypting.
///
/// Used to short-circuit obviously broken tokens before the decrypt path.
pub fn structure_check(token: &str) -> bool {
    match BASE64.decode(token) {
        Ok(raw) => raw.len() >= NONCE_LEN + TAG_LEN,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Claims {
        user_id: i64,
        email: String,
    }

    fn sample_claims() -> Claims {
        Claims {
            user_id: 42,
            email: "owner@example.com".to_string(),
        }
    }

    #[test]
    fn encode_decode_round_trip() {
        let key = TokenKey::derive("test-access-token-key");
        let token = encode_claims(&sample_claims(), &key).unwrap();
        let decoded: Claims = decode_claims(&token, &key).unwrap();
        assert_eq!(decoded, sample_claims());
    }

    #[test]
    fn tokens_are_unique_per_encoding() {
        let key = TokenKey::derive("test-key");
        let a = encode_claims(&sample_claims(), &key).unwrap();
        let b = encode_claims(&sample_claims(), &key).unwrap();
        assert_ne!(a, b, "random nonce should make every token distinct");
    }

    #[test]
    fn wrong_key_is_rejected_as_tampered() {
        let key = TokenKey::derive("correct-key");
        let other = TokenKey::derive("other-key");
        let token = encode_claims(&sample_claims(), &key).unwrap();

        let result: Result<Claims, _> = decode_claims(&token, &other);
        assert!(matches!(result.unwrap_err(), AuthError::TamperedToken));
    }

    #[test]
    fn garbage_input_is_malformed() {
        let key = TokenKey::derive("test-key");

        let result: Result<Claims, _> = decode_claims("not base64!!", &key);
        assert!(matches!(result.unwrap_err(), AuthError::MalformedToken));

        // Valid base64 but shorter than nonce + tag.
        let short = BASE64.encode([0u8; 8]);
        let result: Result<Claims, _> = decode_claims(&short, &key);
        assert!(matches!(result.unwrap_err(), AuthError::MalformedToken));
    }

    #[test]
    fn structure_check_matches_decode_preconditions() {
        let key = TokenKey::derive("test-key");
        let token = encode_claims(&sample_claims(), &key).unwrap();

        assert!(structure_check(&token));
        assert!(!structure_check("not base64!!"));
        assert!(!structure_check(&BASE64.encode([0u8; 8])));
    }

    #[test]
    fn decrypted_non_json_is_corrupt() {
        #[derive(Serialize)]
        struct NotClaims(Vec<u8>);

        let key = TokenKey::derive("test-key");
        // A JSON array decodes fine as bytes but is not the expected shape.
        let token = encode_claims(&NotClaims(vec![1, 2, 3]), &key).unwrap();
        let result: Result<Claims, _> = decode_claims(&token, &key);
        assert!(matches!(result.unwrap_err(), AuthError::CorruptToken));
    }

    proptest! {
        /// Flipping any single bit anywhere in the raw token bytes must be
        /// caught by the tag check, never decoded into wrong claims.
        #[test]
        fn any_single_bit_flip_is_detected(position in 0usize..256, bit in 0u8..8) {
            let key = TokenKey::derive("tamper-test-key");
            let token = encode_claims(&sample_claims(), &key).unwrap();

            let mut raw = BASE64.decode(&token).unwrap();
            let idx = position % raw.len();
            raw[idx] ^= 1 << bit;
            let flipped = BASE64.encode(&raw);

            let result: Result<Claims, _> = decode_claims(&flipped, &key);
            prop_assert!(matches!(result.unwrap_err(), AuthError::TamperedToken));
        }
    }
}
