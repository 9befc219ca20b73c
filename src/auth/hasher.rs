//! Password hashing.
//!
//! Argon2 with per-password salts. The `test-fast-hasher` feature swaps in a
//! cheap digest so test suites that create many users stay fast; it must
//! never be enabled in a production build.

use anyhow::{anyhow, Result};

#[cfg(not(feature = "test-fast-hasher"))]
mod argon2_hasher {
    use anyhow::{anyhow, Result};
    use argon2::{
        password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
        Argon2,
    };

    pub fn hash(plain: &[u8]) -> Result<String> {
        let argon2 = Argon2::default();
        let salt = SaltString::generate(&mut OsRng);
        let hash_string = argon2
            .hash_password(plain, &salt)
            .map_err(|err| anyhow!("{}", err))?
            .to_string();
        Ok(hash_string)
    }

    pub fn verify(plain: &[u8], target_hash: &str) -> Result<bool> {
        let argon2 = Argon2::default();
        let password_hash = PasswordHash::new(target_hash).map_err(|err| anyhow!("{}", err))?;
        Ok(argon2.verify_password(plain, &password_hash).is_ok())
    }
}

#[cfg(feature = "test-fast-hasher")]
mod fast_hasher {
    use anyhow::Result;
    use sha2::{Digest, Sha256};

    pub fn hash(plain: &[u8]) -> Result<String> {
        let digest = Sha256::digest(plain);
        Ok(format!("fast${:x}", digest))
    }

    pub fn verify(plain: &[u8], target_hash: &str) -> Result<bool> {
        Ok(hash(plain)? == target_hash)
    }
}

pub fn hash_password(plain: &str) -> Result<String> {
    if plain.is_empty() {
        return Err(anyhow!("Refusing to hash an empty password"));
    }
    #[cfg(not(feature = "test-fast-hasher"))]
    return argon2_hasher::hash(plain.as_bytes());
    #[cfg(feature = "test-fast-hasher")]
    return fast_hasher::hash(plain.as_bytes());
}

pub fn verify_password(plain: &str, target_hash: &str) -> Result<bool> {
    #[cfg(not(feature = "test-fast-hasher"))]
    return argon2_hasher::verify(plain.as_bytes(), target_hash);
    #[cfg(feature = "test-fast-hasher")]
    return fast_hasher::verify(plain.as_bytes(), target_hash);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let hash1 = hash_password("123mypw").unwrap();
        let hash2 = hash_password("123mypw").unwrap();

        assert!(verify_password("123mypw", &hash1).unwrap());
        assert!(verify_password("123mypw", &hash2).unwrap());
        assert!(!verify_password("not the pw", &hash1).unwrap());
    }

    #[test]
    fn rejects_empty_password() {
        assert!(hash_password("").is_err());
    }
}
