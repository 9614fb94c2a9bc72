use actix_web::http::StatusCode;

#[derive(Debug)]
pub enum Error {
    /// Indicates that the user did not provide a correct password when
    /// checking their credentials.
    IncorrectPassword,

    /// Indicates that a password check was attempted against a user account
    /// which has no credential digest. This happens when the account has
    /// never been activated, or a password reset was requested and has not
    /// yet been completed.
    UserHasNoPassword,

    /// Internal error which occurs when hashing or verifying a password.
    /// This could indicate, for example, that a digest stored in the
    /// database is in the wrong format, or uses an unsupported algorithm.
    Hasher(password_hash::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::IncorrectPassword
            | Self::UserHasNoPassword => StatusCode::UNAUTHORIZED,

            Self::Hasher(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub(crate) fn as_app_err<T, E: From<Self>>(self) -> Result<T, E> {
        Err(E::from(self))
    }
}
