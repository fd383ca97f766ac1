//! Credential hashing for the validated-create path.
//!
//! Stored form: `blake3$<salt hex>$<digest hex>`.

use rand::RngCore;

const SCHEME: &str = "blake3";
const SALT_LEN: usize = 16;

/// Hash a plaintext secret with a fresh random salt.
pub fn hash_secret(plain: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let digest = digest(&salt, plain);
    format!("{SCHEME}${}${}", hex::encode(salt), digest.to_hex())
}

/// Verify a plaintext secret against a stored hash.
///
/// Returns false for anything not produced by [`hash_secret`].
pub fn verify_secret(plain: &str, stored: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    let (Some(SCHEME), Some(salt_hex), Some(digest_hex)) =
        (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    let Ok(expected) = blake3::Hash::from_hex(digest_hex) else {
        return false;
    };
    // blake3::Hash equality is constant-time.
    digest(&salt, plain) == expected
}

fn digest(salt: &[u8], plain: &str) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(salt);
    hasher.update(plain.as_bytes());
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_then_verify() {
        let stored = hash_secret("hunter2");
        assert!(stored.starts_with("blake3$"));
        assert!(verify_secret("hunter2", &stored));
        assert!(!verify_secret("hunter3", &stored));
    }

    #[test]
    fn test_salts_differ() {
        assert_ne!(hash_secret("same"), hash_secret("same"));
    }

    #[test]
    fn test_foreign_hash_does_not_verify() {
        assert!(!verify_secret("h1", "h1"));
        assert!(!verify_secret("x", "$2b$10$abcdefghijklmnopqrstuv"));
        assert!(!verify_secret("x", "blake3$zz$00"));
    }
}
