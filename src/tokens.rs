use std::time::Duration;

use crate::{
    app::{App, AppTypes},
    hashing,
    secret::Secret,
    users::UserRecord,
};

/// An activation or password-reset hash together with its issue time. The
/// two are one value by construction: a record either carries both or
/// neither, never one without the other.
pub struct IssuedHash<A: AppTypes> {
    pub secret: Secret,
    pub issued_at: A::DateTime,
}

/// Mints a fresh single-use hash, stamped with the current time.
pub(crate) fn issue<A: App>(app: &A) -> IssuedHash<A> {
    IssuedHash {
        secret: hashing::random_hex(hashing::SECRET_HASH_BYTES),
        issued_at: app.time_now(),
    }
}

/// Looks up the user record whose outstanding hash equals `hash`, treating
/// expired hashes as absent. Unknown, expired, already-consumed and
/// superseded hashes are indistinguishable to the caller; none of them
/// resolve.
///
/// Resolving never consumes the hash. Consumption happens in the conditional
/// update that completes the transition, so a replayed hash simply stops
/// resolving once the first request has won.
pub(crate) async fn resolve<A: App>(
    app: &A,
    hash: &str,
) -> Result<Option<UserRecord<A>>, A::Error> {
    if hash.is_empty() {
        // Failsafe; an empty hash must not match a record whose hash column
        // is null.
        return Ok(None);
    }

    let Some(user) = app.find_user_by_hash(hash).await? else {
        return Ok(None);
    };

    let Some(issued) = &user.hash else {
        return Ok(None);
    };

    let valid_secs = 24 * 60 * 60 * app.hash_expire_after_days();
    let expires = issued.issued_at + Duration::from_secs(valid_secs);

    if app.time_now() >= expires {
        log::debug!("Hash for user '{}' has expired", user.username);
        return Ok(None);
    }

    Ok(Some(user))
}
