use crate::{
    app::{App, AppTypes},
    errors::Error,
    hashing,
    mail::{self, Mail},
    policy,
    secret::{PasswordHash, Secret},
    tokens::{self, IssuedHash},
};

/// One record per external user. The username is their natural identifier
/// (an email address in practice) and the only key the lifecycle mutates by;
/// the creator fields identify who invited them and are set once, at
/// creation.
pub struct UserRecord<A: AppTypes> {
    pub username: String,

    /// The credential digest, absent until the user completes activation.
    pub password_hash: PasswordHash,

    /// The outstanding activation or reset hash, if a link is live.
    pub hash: Option<IssuedHash<A>>,

    pub creator_user: String,
    pub creator_zone: String,
}

/// The lifecycle state of an external user, derived from which of the
/// password and hash columns are set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserState {
    /// Invited but not yet activated: no password, a live activation link.
    Invited,

    /// Activated: a password, no outstanding link.
    Active,

    /// Activated, with a password reset requested but not completed: the
    /// old password stays valid until the reset link is used.
    ResetPending,
}

impl<A: AppTypes> UserRecord<A> {
    /// Derives the record's lifecycle state. Returns `None` for a record
    /// with neither password nor hash; no transition in this crate produces
    /// that combination, so it can only result from external tampering and
    /// is treated the same as an unknown user.
    pub fn state(&self) -> Option<UserState> {
        match (self.password_hash.exists(), self.hash.is_some()) {
            (false, true) => Some(UserState::Invited),
            (true, false) => Some(UserState::Active),
            (true, true) => Some(UserState::ResetPending),
            (false, false) => None,
        }
    }
}

/// The result of `AppDb::insert_user`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,

    /// The store's unique constraint on the username rejected the insert.
    UsernameTaken,
}

/// The result of `invite`. Both variants are successes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteOutcome {
    Created,

    /// The username already has a record; inviting is idempotent and this
    /// is not an error.
    AlreadyExists,
}

/// The fields of the activation and reset forms. The username is submitted
/// back alongside the passwords as a guard against a form being replayed
/// against a different user's hash.
#[derive(serde::Deserialize)]
pub struct CredentialsForm {
    pub username: String,
    pub password: Secret,
    pub password_again: Secret,
}

/// A user-correctable problem with a submitted activation or reset form.
/// The three classes produce distinct messages; they are never collapsed
/// into a generic failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialsError {
    /// One or more of the form fields was left empty.
    MissingFields,

    /// The password and its confirmation differ.
    PasswordsDoNotMatch,

    /// The password does not meet the complexity requirements; one message
    /// per violated rule.
    Complexity(Vec<String>),
}

impl CredentialsError {
    /// The messages to show on the re-rendered form.
    pub fn messages(&self) -> Vec<String> {
        match self {
            Self::MissingFields => vec!["Please fill in all required fields.".to_string()],
            Self::PasswordsDoNotMatch => vec!["The passwords do not match".to_string()],
            Self::Complexity(errors) => errors.clone(),
        }
    }
}

/// The result of `activate` and `reset_password`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetPasswordOutcome {
    /// The password is stored and the hash is consumed; the user is active.
    Completed {
        username: String,
    },

    /// The hash is unknown, expired, already used, or the submission did
    /// not match the record it resolves to. Deliberately indistinct.
    InvalidHash,

    /// The form needs correcting; the username is echoed back so the form
    /// can be re-rendered with it.
    Refused {
        username: String,
        reason: CredentialsError,
    },
}

/// The result of `forgot_password`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForgotPasswordOutcome {
    /// A fresh reset link has been issued and mailed. Any previously
    /// outstanding link for this user no longer resolves.
    Sent {
        username: String,
    },

    /// No record with that username; only external users can reset their
    /// password here.
    UnknownUser,

    /// The form was submitted without a username.
    MissingUsername,
}

/// Creates a new external user in the invited state, with a live activation
/// link, and mails the link to them and a confirmation to their inviter.
///
/// Inviting an existing username is a no-op and reports `AlreadyExists` as a
/// success; two racing invitations for the same new username are resolved by
/// the store's unique constraint, and the loser also reports
/// `AlreadyExists`. Mail delivery is best-effort and never rolls back the
/// created record.
pub async fn invite<A: App>(
    app: &A,
    username: &str,
    creator_user: &str,
    creator_zone: &str,
) -> Result<InviteOutcome, A::Error> {
    if app.find_user_by_username(username).await?.is_some() {
        // Nothing to do. This occurs, for example, when a user invited from
        // one zone is later invited again from another.
        log::debug!("External user '{username}' already exists");
        return Ok(InviteOutcome::AlreadyExists);
    }

    let issued = tokens::issue(app);
    let hash_url = app.activation_url(issued.secret.expose());

    let record = UserRecord {
        username: username.to_string(),
        password_hash: PasswordHash::NONE,
        hash: Some(issued),
        creator_user: creator_user.to_string(),
        creator_zone: creator_zone.to_string(),
    };

    match app.insert_user(&record).await? {
        InsertOutcome::UsernameTaken => {
            // A concurrent invitation won the insert.
            log::debug!("External user '{username}' was created concurrently");
            return Ok(InviteOutcome::AlreadyExists);
        },
        InsertOutcome::Inserted => {},
    }

    log::info!("Created external user '{username}' on behalf of '{creator_user}'");

    let invitation = Mail::Invitation {
        username: username.to_string(),
        creator: creator_user.to_string(),
        hash_url,
    };
    mail::send_best_effort(app, username, invitation).await;

    let confirmation = Mail::InvitationSent {
        username: username.to_string(),
        creator: creator_user.to_string(),
    };
    mail::send_best_effort(app, creator_user, confirmation).await;

    Ok(InviteOutcome::Created)
}

/// Completes an activation link: validates the submitted form, stores the
/// first credential digest, and consumes the hash, leaving the user active.
///
/// The hash must resolve to a record that is still in the invited state; a
/// link whose account has since been activated reports `InvalidHash`, the
/// same as an unknown or expired one.
pub async fn activate<A: App>(
    app: &A,
    hash: &str,
    form: &CredentialsForm,
) -> Result<SetPasswordOutcome, A::Error> {
    let Some(user) = tokens::resolve(app, hash).await? else {
        return Ok(SetPasswordOutcome::InvalidHash);
    };

    if user.state() != Some(UserState::Invited) {
        // The account behind this link already has a password.
        return Ok(SetPasswordOutcome::InvalidHash);
    }

    let outcome = store_new_password(app, &user, hash, form).await?;

    if matches!(outcome, SetPasswordOutcome::Completed {..}) {
        log::info!("External user '{}' activated their account", user.username);

        let confirmation = Mail::ActivationSuccessful {
            username: user.username.clone(),
        };
        mail::send_best_effort(app, &user.username, confirmation).await;

        let notice = Mail::InvitationAccepted {
            username: user.username.clone(),
            creator: user.creator_user.clone(),
        };
        mail::send_best_effort(app, &user.creator_user, notice).await;
    }

    Ok(outcome)
}

/// Issues a fresh password-reset link for the given username and mails it.
/// Any previously outstanding activation or reset link is superseded and
/// stops resolving.
pub async fn forgot_password<A: App>(
    app: &A,
    username: &str,
) -> Result<ForgotPasswordOutcome, A::Error> {
    if username.is_empty() {
        return Ok(ForgotPasswordOutcome::MissingUsername);
    }

    let Some(user) = app.find_user_by_username(username).await? else {
        log::info!("Password reset requested for unknown username");
        return Ok(ForgotPasswordOutcome::UnknownUser);
    };

    let issued = tokens::issue(app);
    let hash_url = app.reset_url(issued.secret.expose());

    app.replace_hash(&user.username, &issued).await?;

    log::info!("Issued a password reset link for '{}'", user.username);

    let reset = Mail::PasswordReset {
        username: user.username.clone(),
        hash_url,
    };
    mail::send_best_effort(app, &user.username, reset).await;

    Ok(ForgotPasswordOutcome::Sent {username: user.username})
}

/// Completes a reset link: validates the submitted form, stores the new
/// credential digest, and consumes the hash, leaving the user active.
///
/// Unlike `activate`, any record with a live hash is eligible: an invited
/// user who lost their first link and requested another, or an active user
/// resetting a forgotten password.
pub async fn reset_password<A: App>(
    app: &A,
    hash: &str,
    form: &CredentialsForm,
) -> Result<SetPasswordOutcome, A::Error> {
    let Some(user) = tokens::resolve(app, hash).await? else {
        return Ok(SetPasswordOutcome::InvalidHash);
    };

    let outcome = store_new_password(app, &user, hash, form).await?;

    if matches!(outcome, SetPasswordOutcome::Completed {..}) {
        log::info!("External user '{}' reset their password", user.username);
    }

    Ok(outcome)
}

/// Checks a username/password pair against the stored credential digest.
/// Returns `Ok(true)` iff the user exists and the password verifies; an
/// unknown user, a never-activated user and a wrong password are
/// indistinguishable `Ok(false)`.
pub async fn check_auth<A: App>(
    app: &A,
    username: &str,
    password: &Secret,
) -> Result<bool, A::Error> {
    let Some(user) = app.find_user_by_username(username).await? else {
        return Ok(false);
    };

    match hashing::verify_password(&user.password_hash, password) {
        Ok(()) => Ok(true),
        Err(Error::IncorrectPassword | Error::UserHasNoPassword) => Ok(false),
        Err(e) => e.as_app_err(),
    }
}

/// Shared tail of `activate` and `reset_password`: form validation, then the
/// conditional update that stores the digest and consumes the hash in one
/// step. The update is compare-and-swap on the hash value, so of two
/// concurrent submissions of the same link, exactly one completes and the
/// other reports `InvalidHash`.
async fn store_new_password<A: App>(
    app: &A,
    user: &UserRecord<A>,
    hash: &str,
    form: &CredentialsForm,
) -> Result<SetPasswordOutcome, A::Error> {
    let refused = |reason| Ok(SetPasswordOutcome::Refused {
        username: user.username.clone(),
        reason,
    });

    if form.username.is_empty() || form.password.is_empty() || form.password_again.is_empty() {
        return refused(CredentialsError::MissingFields);
    }

    if form.username != user.username {
        // A submission for a different username than the record the hash
        // resolves to has been tampered with; it gets no detail.
        log::info!("Mismatched username in submission for '{}'", user.username);
        return Ok(SetPasswordOutcome::InvalidHash);
    }

    if form.password.expose() != form.password_again.expose() {
        return refused(CredentialsError::PasswordsDoNotMatch);
    }

    let complexity_errors = policy::check_password_complexity(form.password.expose());
    if !complexity_errors.is_empty() {
        return refused(CredentialsError::Complexity(complexity_errors));
    }

    let digest = hashing::generate_password_hash(&form.password)?;

    if !app.set_password_clear_hash(&user.username, hash, digest).await? {
        // The hash was consumed or superseded between resolving and
        // updating.
        return Ok(SetPasswordOutcome::InvalidHash);
    }

    Ok(SetPasswordOutcome::Completed {username: user.username.clone()})
}

#[cfg(test)]
mod test {
    use crate::app::AppDb;
    use crate::secret::Secret;
    use crate::test_app::TestApp;

    use super::{
        activate, check_auth, forgot_password, invite, reset_password,
        CredentialsError, CredentialsForm, ForgotPasswordOutcome, InviteOutcome,
        SetPasswordOutcome,
    };

    const USERNAME: &str = "piet@example.org";
    const CREATOR: &str = "researcher@example.org";
    const ZONE: &str = "mainZone";
    const STRONG_PASSWORD: &str = "Ab3$efghij";

    fn form(username: &str, password: &str, password_again: &str) -> CredentialsForm {
        CredentialsForm {
            username: username.to_string(),
            password: Secret::from(password.to_string()),
            password_again: Secret::from(password_again.to_string()),
        }
    }

    async fn invited_hash(app: &TestApp) -> String {
        invite(app, USERNAME, CREATOR, ZONE).await.unwrap();
        app.stored_hash(USERNAME).expect("invited user should have a hash")
    }

    async fn activated_user(app: &TestApp) -> String {
        let hash = invited_hash(app).await;
        let outcome = activate(app, &hash, &form(USERNAME, STRONG_PASSWORD, STRONG_PASSWORD))
            .await
            .unwrap();
        assert!(matches!(outcome, SetPasswordOutcome::Completed {..}));
        USERNAME.to_string()
    }

    #[actix_web::test]
    async fn test_invite_creates_invited_user() {
        let app = TestApp::new();

        let outcome = invite(&app, USERNAME, CREATOR, ZONE).await.unwrap();

        assert_eq!(InviteOutcome::Created, outcome);
        let stored = app.stored(USERNAME).unwrap();
        assert!(stored.password.is_none());
        let (hash, _) = stored.hash.unwrap();
        assert_eq!(64, hash.len());
        assert_eq!(
            vec![
                (USERNAME.to_string(), "invitation"),
                (CREATOR.to_string(), "invitation-sent"),
            ],
            app.outbox(),
        );
    }

    #[actix_web::test]
    async fn test_invite_is_idempotent() {
        let app = TestApp::new();
        let hash = invited_hash(&app).await;

        let outcome = invite(&app, USERNAME, "someone-else@example.org", "otherZone")
            .await
            .unwrap();

        assert_eq!(InviteOutcome::AlreadyExists, outcome);
        let stored = app.stored(USERNAME).unwrap();
        assert_eq!(Some(hash), stored.hash.map(|(h, _)| h), "Hash should be untouched");
        assert_eq!(CREATOR, stored.creator_user, "Creator should be untouched");
        assert_eq!(2, app.outbox().len(), "No mail for an existing user");
    }

    #[actix_web::test]
    async fn test_activate_transitions_to_active() {
        let app = TestApp::new();
        let hash = invited_hash(&app).await;

        let outcome = activate(&app, &hash, &form(USERNAME, STRONG_PASSWORD, STRONG_PASSWORD))
            .await
            .unwrap();

        assert_eq!(
            SetPasswordOutcome::Completed {username: USERNAME.to_string()},
            outcome,
        );
        let stored = app.stored(USERNAME).unwrap();
        assert!(stored.password.is_some());
        assert!(stored.hash.is_none(), "Hash pair should be cleared");
        assert!(check_auth(&app, USERNAME, &Secret::from(STRONG_PASSWORD.to_string()))
            .await
            .unwrap());

        let templates: Vec<&str> = app.outbox().iter().map(|(_, t)| *t).collect();
        assert_eq!(
            vec!["invitation", "invitation-sent", "activation-successful", "invitation-accepted"],
            templates,
        );
    }

    #[actix_web::test]
    async fn test_activation_hash_is_single_use() {
        let app = TestApp::new();
        let hash = invited_hash(&app).await;
        activate(&app, &hash, &form(USERNAME, STRONG_PASSWORD, STRONG_PASSWORD))
            .await
            .unwrap();

        let replay = activate(&app, &hash, &form(USERNAME, STRONG_PASSWORD, STRONG_PASSWORD))
            .await
            .unwrap();

        assert_eq!(SetPasswordOutcome::InvalidHash, replay);
    }

    #[actix_web::test]
    async fn test_activate_unknown_hash() {
        let app = TestApp::new();
        invited_hash(&app).await;

        let outcome = activate(
            &app,
            &"0".repeat(64),
            &form(USERNAME, STRONG_PASSWORD, STRONG_PASSWORD),
        )
        .await
        .unwrap();

        assert_eq!(SetPasswordOutcome::InvalidHash, outcome);
    }

    #[actix_web::test]
    async fn test_activate_rejects_reset_hash() {
        // A link that resolves to an already-activated account cannot be
        // used for activation, even though the hash itself is live.
        let app = TestApp::new();
        activated_user(&app).await;
        forgot_password(&app, USERNAME).await.unwrap();
        let reset_hash = app.stored_hash(USERNAME).unwrap();

        let outcome = activate(
            &app,
            &reset_hash,
            &form(USERNAME, "New1$password", "New1$password"),
        )
        .await
        .unwrap();

        assert_eq!(SetPasswordOutcome::InvalidHash, outcome);
    }

    #[actix_web::test]
    async fn test_activate_expired_hash() {
        let app = TestApp::new();
        let hash = invited_hash(&app).await;

        app.advance_days(4);
        let outcome = activate(&app, &hash, &form(USERNAME, STRONG_PASSWORD, STRONG_PASSWORD))
            .await
            .unwrap();
        assert!(
            matches!(outcome, SetPasswordOutcome::Completed {..}),
            "Four days in, the link should still work",
        );

        let app = TestApp::new();
        let hash = invited_hash(&app).await;

        app.advance_days(5);
        let outcome = activate(&app, &hash, &form(USERNAME, STRONG_PASSWORD, STRONG_PASSWORD))
            .await
            .unwrap();
        assert_eq!(SetPasswordOutcome::InvalidHash, outcome);
    }

    #[actix_web::test]
    async fn test_activate_distinct_validation_messages() {
        let app = TestApp::new();
        let hash = invited_hash(&app).await;

        let outcome = activate(&app, &hash, &form(USERNAME, "", ""))
            .await
            .unwrap();
        let SetPasswordOutcome::Refused {username, reason} = outcome else {
            panic!("Empty password should be refused");
        };
        assert_eq!(USERNAME, username);
        assert_eq!(CredentialsError::MissingFields, reason);
        assert_eq!(vec!["Please fill in all required fields.".to_string()], reason.messages());

        let outcome = activate(&app, &hash, &form(USERNAME, STRONG_PASSWORD, "Different1$"))
            .await
            .unwrap();
        let SetPasswordOutcome::Refused {reason, ..} = outcome else {
            panic!("Mismatched passwords should be refused");
        };
        assert_eq!(CredentialsError::PasswordsDoNotMatch, reason);
        assert_eq!(vec!["The passwords do not match".to_string()], reason.messages());

        let outcome = activate(&app, &hash, &form(USERNAME, "abcdefghij", "abcdefghij"))
            .await
            .unwrap();
        let SetPasswordOutcome::Refused {reason, ..} = outcome else {
            panic!("Weak password should be refused");
        };
        assert!(matches!(reason, CredentialsError::Complexity(_)));

        // All refusals leave the record untouched.
        let stored = app.stored(USERNAME).unwrap();
        assert!(stored.password.is_none() && stored.hash.is_some());
    }

    #[actix_web::test]
    async fn test_activate_rejects_mismatched_username() {
        let app = TestApp::new();
        let hash = invited_hash(&app).await;

        let outcome = activate(
            &app,
            &hash,
            &form("other@example.org", STRONG_PASSWORD, STRONG_PASSWORD),
        )
        .await
        .unwrap();

        assert_eq!(SetPasswordOutcome::InvalidHash, outcome);
        let stored = app.stored(USERNAME).unwrap();
        assert!(stored.password.is_none(), "Record should be untouched");
    }

    #[actix_web::test]
    async fn test_forgot_password_supersedes_previous_link() {
        let app = TestApp::new();
        activated_user(&app).await;

        forgot_password(&app, USERNAME).await.unwrap();
        let first_hash = app.stored_hash(USERNAME).unwrap();
        forgot_password(&app, USERNAME).await.unwrap();
        let second_hash = app.stored_hash(USERNAME).unwrap();

        assert_ne!(first_hash, second_hash);

        let stale = reset_password(
            &app,
            &first_hash,
            &form(USERNAME, "New1$password", "New1$password"),
        )
        .await
        .unwrap();
        assert_eq!(SetPasswordOutcome::InvalidHash, stale);

        let fresh = reset_password(
            &app,
            &second_hash,
            &form(USERNAME, "New1$password", "New1$password"),
        )
        .await
        .unwrap();
        assert!(matches!(fresh, SetPasswordOutcome::Completed {..}));
    }

    #[actix_web::test]
    async fn test_forgot_password_unknown_and_missing_username() {
        let app = TestApp::new();

        let outcome = forgot_password(&app, "nobody@example.org").await.unwrap();
        assert_eq!(ForgotPasswordOutcome::UnknownUser, outcome);

        let outcome = forgot_password(&app, "").await.unwrap();
        assert_eq!(ForgotPasswordOutcome::MissingUsername, outcome);
    }

    #[actix_web::test]
    async fn test_reset_password_replaces_credential() {
        let app = TestApp::new();
        activated_user(&app).await;
        forgot_password(&app, USERNAME).await.unwrap();
        let hash = app.stored_hash(USERNAME).unwrap();

        let outcome = reset_password(
            &app,
            &hash,
            &form(USERNAME, "New1$password", "New1$password"),
        )
        .await
        .unwrap();

        assert_eq!(
            SetPasswordOutcome::Completed {username: USERNAME.to_string()},
            outcome,
        );
        assert!(
            !check_auth(&app, USERNAME, &Secret::from(STRONG_PASSWORD.to_string()))
                .await
                .unwrap(),
            "The old password should no longer verify",
        );
        assert!(
            check_auth(&app, USERNAME, &Secret::from("New1$password".to_string()))
                .await
                .unwrap(),
        );
    }

    #[actix_web::test]
    async fn test_reset_password_works_for_invited_user() {
        // An invited user who lost their activation link can request a
        // reset link and complete it instead.
        let app = TestApp::new();
        invited_hash(&app).await;
        forgot_password(&app, USERNAME).await.unwrap();
        let hash = app.stored_hash(USERNAME).unwrap();

        let outcome = reset_password(&app, &hash, &form(USERNAME, STRONG_PASSWORD, STRONG_PASSWORD))
            .await
            .unwrap();

        assert!(matches!(outcome, SetPasswordOutcome::Completed {..}));
    }

    #[actix_web::test]
    async fn test_concurrent_submissions_consume_hash_once() {
        // Both requests resolve the same hash; the conditional update lets
        // exactly one of them through.
        let app = TestApp::new();
        let hash = invited_hash(&app).await;

        let digest = crate::hashing::generate_password_hash(
            &Secret::from(STRONG_PASSWORD.to_string()),
        )
        .unwrap();
        assert!(app.set_password_clear_hash(USERNAME, &hash, digest).await.unwrap());

        let digest = crate::hashing::generate_password_hash(
            &Secret::from("Other1$pass".to_string()),
        )
        .unwrap();
        assert!(
            !app.set_password_clear_hash(USERNAME, &hash, digest).await.unwrap(),
            "The second update should observe the hash already cleared",
        );
    }

    #[actix_web::test]
    async fn test_check_auth_is_indistinct() {
        let app = TestApp::new();
        invited_hash(&app).await;

        let password = Secret::from(STRONG_PASSWORD.to_string());
        assert!(!check_auth(&app, "nobody@example.org", &password).await.unwrap());
        assert!(
            !check_auth(&app, USERNAME, &password).await.unwrap(),
            "A never-activated user has no password to verify against",
        );
    }

    #[actix_web::test]
    async fn test_mail_failure_does_not_roll_back() {
        let app = TestApp::with_refused_mail();

        let outcome = invite(&app, USERNAME, CREATOR, ZONE).await.unwrap();

        assert_eq!(InviteOutcome::Created, outcome);
        assert!(app.stored(USERNAME).is_some(), "Record outlives the failed mail");
    }

    #[actix_web::test]
    async fn test_mail_can_be_disabled() {
        let app = TestApp::with_mail_disabled();

        invite(&app, USERNAME, CREATOR, ZONE).await.unwrap();

        assert!(app.outbox().is_empty());
    }
}
