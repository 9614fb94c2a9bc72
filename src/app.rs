use crate::{
    errors::Error,
    mail::Mail,
    secret::PasswordHash,
    tokens::IssuedHash,
    users::{InsertOutcome, UserRecord},
    views::Page,
};

pub trait App: AppConfig + AppDb + AppMailer + AppViews + AppTypes + Clone + 'static {
    /// Returns the current time.
    fn time_now(&self) -> Self::DateTime;
}

pub trait AppTypes: Sized {
    /// The type used to represent a date and time in the application.
    type DateTime: Copy + Ord + core::ops::Add<std::time::Duration, Output = Self::DateTime>;

    /// A type representing an application error. This must support conversion
    /// from `onboardlogic::Error`.
    type Error: From<Error> + actix_web::ResponseError;
}

/// This trait defines functions which provide configuration parameters to the
/// onboarding library.
#[allow(unused)]
pub trait AppConfig {
    /// Returns the shared secret which machine callers must present in the
    /// `X-External-User-Secret` header on every API request.
    fn api_secret(&self) -> &str;

    /// Returns the external base URL of this service, without a trailing
    /// slash, e.g. `"https://users.example.org"`. Activation and reset links
    /// sent by email are built from this.
    fn base_url(&self) -> &str;

    /// Returns the realm sent in the `WWW-Authenticate` challenge by the
    /// credential-check endpoint.
    ///
    /// Default is `"external-users"`.
    fn auth_check_realm(&self) -> &str {
        "external-users"
    }

    /// Returns the number of days an activation or password-reset link stays
    /// valid, measured from the moment its hash was issued.
    ///
    /// Default is 5 days.
    fn hash_expire_after_days(&self) -> u64 {
        5
    }

    /// Indicates whether emails should be delivered at all. When `false`,
    /// every send is skipped and logged as a warning instead. This is mainly
    /// useful on test and staging instances.
    ///
    /// Default is `true`.
    fn mail_enabled(&self) -> bool {
        true
    }

    /// Returns the absolute URL of the activation page for the given hash.
    fn activation_url(&self, hash: &str) -> String {
        format!("{}/user/activate/{hash}", self.base_url())
    }

    /// Returns the absolute URL of the password-reset page for the given
    /// hash.
    fn reset_url(&self, hash: &str) -> String {
        format!("{}/user/reset-password/{hash}", self.base_url())
    }
}

/// This trait defines functions which will be used by the onboarding library
/// to store and retrieve external-user records. The backing table owns all
/// durable state; the library only ever touches it through these functions.
///
/// Each function must be atomic on its own. `insert_user` must rely on a
/// unique constraint on the username, and `set_password_clear_hash` must be
/// a conditional (compare-and-swap) update, so that two concurrent requests
/// can never both consume the same one-time hash.
#[trait_variant::make(Send)]
pub trait AppDb: AppTypes {
    /// Gets an external user's record by their username.
    ///
    /// Returns `None` if there is no user with that username.
    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord<Self>>, Self::Error>;

    /// Gets an external user's record by their outstanding activation or
    /// reset hash. The store should keep a unique index on the hash column;
    /// with 256 bits of entropy per hash, a collision between live hashes
    /// is negligible, and the index turns the residual case into an insert
    /// failure rather than an ambiguous lookup.
    ///
    /// Returns `None` if no record carries that hash.
    async fn find_user_by_hash(
        &self,
        hash: &str,
    ) -> Result<Option<UserRecord<Self>>, Self::Error>;

    /// Inserts a new external user record. Must report `UsernameTaken`,
    /// rather than an error, when the store's unique constraint on the
    /// username rejects the insert.
    async fn insert_user(
        &self,
        record: &UserRecord<Self>,
    ) -> Result<InsertOutcome, Self::Error>;

    /// Replaces the user's outstanding hash (if any) with a freshly issued
    /// one. Any link built from the previous hash stops resolving.
    async fn replace_hash(
        &self,
        username: &str,
        issued: &IssuedHash<Self>,
    ) -> Result<(), Self::Error>;

    /// Stores a new credential digest and clears the hash pair, on the
    /// condition that the stored hash still equals `expected_hash`. Returns
    /// `false` without modifying anything if the condition no longer holds,
    /// i.e. the hash was consumed or superseded by a concurrent request.
    async fn set_password_clear_hash(
        &self,
        username: &str,
        expected_hash: &str,
        digest: PasswordHash,
    ) -> Result<bool, Self::Error>;
}

/// This trait defines the function which will be used by the onboarding
/// library to send email to users and their inviters. Delivery is
/// fire-and-forget from the library's perspective: failures are logged and
/// never block a lifecycle transition.
#[trait_variant::make(Send)]
pub trait AppMailer: AppTypes {
    /// Sends the given mail to the given address. `Mail` carries the
    /// subject, template name and template variables; rendering and
    /// transport are the application's concern.
    async fn send_mail(&self, to: &str, mail: &Mail) -> Result<(), Self::Error>;
}

/// This trait defines the function which will be used by the onboarding
/// library to render HTML pages for the user-facing flows. The library
/// decides *which* page to show with *what* data; markup and theming are the
/// application's concern.
pub trait AppViews {
    /// Renders the given page to an HTML body.
    fn render(&self, page: Page<'_>) -> String;
}
