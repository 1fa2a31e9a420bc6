use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::Argon2;
use rand_core::OsRng;

use crate::domain::Error;

/// Basic password policy: at least six characters, at least one letter and
/// one digit.
pub fn validate_password(password: &str) -> Result<(), Error> {
    let has_letter = password.chars().any(|c| c.is_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !has_letter || !has_digit || password.chars().count() < 6 {
        return Err(Error::InvalidPassword);
    }
    Ok(())
}

/// Hashes the password with a fresh salt. The output is the only form the
/// password takes beyond this call.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use argon2::password_hash::PasswordHash;
    use argon2::PasswordVerifier;

    use super::*;

    #[test]
    fn validate_password_cases() {
        let cases = [
            ("Password1!", None),
            ("P1234", Some(Error::InvalidPassword)),
            ("Password!", Some(Error::InvalidPassword)),
            ("1234567", Some(Error::InvalidPassword)),
            ("abc123", None),
        ];
        for (password, want) in cases {
            assert_eq!(validate_password(password).err(), want, "password: {password}");
        }
    }

    #[test]
    fn hash_is_salted_and_verifiable() {
        let first = hash_password("Password1!").unwrap();
        let second = hash_password("Password1!").unwrap();
        assert_ne!(first, second);

        let parsed = PasswordHash::new(&first).unwrap();
        assert!(Argon2::default()
            .verify_password(b"Password1!", &parsed)
            .is_ok());
        assert!(Argon2::default()
            .verify_password(b"wrong-password", &parsed)
            .is_err());
    }
}
