/// Random tokens for sessions and email verification
///
/// Tokens are base62 strings drawn from `rand::thread_rng()`. Only their
/// SHA-256 hex digest is stored, so a leaked `sessions` or `users` table
/// cannot be replayed as cookies or verification links.
///
/// # Example
///
/// ```
/// use ecclesia_shared::auth::token::{generate_session_id, hash_token, is_valid_token};
///
/// let (id, hash) = generate_session_id();
/// assert!(is_valid_token(&id));
/// assert_eq!(hash_token(&id), hash);
/// assert_eq!(hash.len(), 64);
/// ```

use rand::Rng;
use sha2::{Digest, Sha256};

/// Length of a generated token in characters (~238 bits of entropy)
pub const TOKEN_LENGTH: usize = 40;

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Generates a random base62 string
pub fn random_token(length: usize) -> String {
    let mut rng = rand::thread_rng();

    (0..length)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

/// Generates a session id and the hash stored in the `sessions` table
pub fn generate_session_id() -> (String, String) {
    let id = random_token(TOKEN_LENGTH);
    let hash = hash_token(&id);
    (id, hash)
}

/// Generates an email verification token and its stored hash
pub fn generate_verification_token() -> (String, String) {
    let token = random_token(TOKEN_LENGTH);
    let hash = hash_token(&token);
    (token, hash)
}

/// Hex-encoded SHA-256 of a token
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Whether a client-supplied token has the shape of one we issued
///
/// Rejects anything that is not exactly [`TOKEN_LENGTH`] ASCII
/// alphanumerics before it reaches the database.
pub fn is_valid_token(token: &str) -> bool {
    token.len() == TOKEN_LENGTH && token.bytes().all(|b| b.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_random() {
        let (a, ha) = generate_session_id();
        let (b, hb) = generate_session_id();
        assert_ne!(a, b);
        assert_ne!(ha, hb);
        assert_eq!(a.len(), TOKEN_LENGTH);
    }

    #[test]
    fn test_hash_is_deterministic_hex() {
        let hash = hash_token("abc");
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(hash, hash_token("abc"));
    }

    #[test]
    fn test_verification_token_matches_hash() {
        let (token, hash) = generate_verification_token();
        assert!(is_valid_token(&token));
        assert_eq!(hash_token(&token), hash);
    }

    #[test]
    fn test_is_valid_token() {
        assert!(is_valid_token(&"a".repeat(TOKEN_LENGTH)));
        assert!(!is_valid_token("short"));
        assert!(!is_valid_token(&"a".repeat(TOKEN_LENGTH + 1)));

        let mut bad = "a".repeat(TOKEN_LENGTH - 1);
        bad.push('-');
        assert!(!is_valid_token(&bad));
        assert!(!is_valid_token(""));
    }
}
