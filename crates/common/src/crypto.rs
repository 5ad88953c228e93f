//! Password hashing for stored accounts
//!
//! Hashes are `$S$<salt-hex>$<sha256-hex>` where the digest covers the salt
//! bytes followed by the UTF-8 password.

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

const HASH_PREFIX: &str = "$S$";
const SALT_LEN: usize = 8;

/// Hash a plaintext password with a fresh random salt
pub fn hash_password(plain: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    hash_with_salt(plain, &salt)
}

fn hash_with_salt(plain: &str, salt: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(plain.as_bytes());
    format!(
        "{}{}${}",
        HASH_PREFIX,
        hex::encode(salt),
        hex::encode(hasher.finalize())
    )
}

/// Check a plaintext password against a stored hash
pub fn verify_password(plain: &str, stored: &str) -> bool {
    let Some(rest) = stored.strip_prefix(HASH_PREFIX) else {
        return false;
    };
    let Some((salt_hex, _)) = rest.split_once('$') else {
        return false;
    };
    match hex::decode(salt_hex) {
        Ok(salt) => hash_with_salt(plain, &salt) == stored,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("s3cret-pass");
        assert!(hash.starts_with("$S$"));
        assert_ne!(hash, "s3cret-pass");
        assert!(verify_password("s3cret-pass", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn test_salts_differ() {
        assert_ne!(hash_password("same"), hash_password("same"));
    }

    #[test]
    fn test_rejects_malformed_hash() {
        assert!(!verify_password("x", "plaintext"));
        assert!(!verify_password("x", "$S$zz$abcd"));
    }
}
