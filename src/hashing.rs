use argon2::Argon2;
use password_hash::{
    PasswordHasher,
    PasswordVerifier,
    SaltString,
};

use crate::{
    errors::Error,
    secret::{PasswordHash, Secret},
};

/// The number of random bytes in an activation or password-reset hash. The
/// hash is hex-encoded, so each byte becomes two characters: 32 bytes yield
/// a 64-character hash with 256 bits of entropy.
///
/// A hash is sent to the user as part of a link, and stored verbatim as the
/// lookup key for their user record, so its entropy alone must make guessing
/// infeasible for the several days the link stays valid.
pub const SECRET_HASH_BYTES: usize = 32;

/// Checks a password against a stored credential digest, returning `Ok` if
/// the password is correct and `Err` otherwise.
///
/// Also returns an error if the stored digest is missing or invalid.
pub(crate) fn verify_password(stored_hash: &PasswordHash, given_password: &Secret) -> Result<(), Error> {
    let Some(stored_hash) = &stored_hash.0 else {
        return Err(Error::UserHasNoPassword);
    };

    let hash = password_hash::PasswordHash::new(&stored_hash.0)
        .map_err(Error::Hasher)?;

    let algs: &[&dyn PasswordVerifier] = &[&Argon2::default()];
    hash.verify_password(algs, &given_password.0)
        .map_err(|e| match e {
            password_hash::Error::Password => Error::IncorrectPassword,
            e => Error::Hasher(e),
        })
}

/// Computes a credential digest for the given password, which can be stored
/// in the database. A strong password hashing algorithm with a salt is used.
///
/// This function cannot be used to compare a password against a stored
/// digest; instead, use the `verify_password` function.
pub(crate) fn generate_password_hash(new_password: &Secret) -> Result<PasswordHash, Error> {
    let salt = SaltString::generate(rand::thread_rng());

    let hash = Argon2::default()
        .hash_password(new_password.0.as_bytes(), &salt)
        .map_err(Error::Hasher)?;

    Ok(PasswordHash(Some(Secret(hash.to_string()))))
}

/// Generates a new random secret hash for an activation or password-reset
/// link: `length_bytes` bytes from the thread-local CSPRNG, hex-encoded.
///
/// The generator aborts the process if the operating system cannot supply
/// cryptographically secure randomness; it never falls back to a weaker
/// source.
pub(crate) fn random_hex(length_bytes: usize) -> Secret {
    use rand::{thread_rng, Rng};

    let mut bytes = vec![0u8; length_bytes];
    thread_rng().fill(&mut bytes as &mut [u8]);
    Secret(hex::encode(&bytes))
}
