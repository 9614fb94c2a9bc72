//! An in-memory application used by the lifecycle and route tests: a
//! `HashMap` standing in for the users table, an outbox standing in for the
//! mailer, and a clock the tests can advance.

use std::{
    collections::HashMap,
    future::{ready, Ready},
    sync::{Arc, Mutex},
    time::{Duration, SystemTime},
};

use actix_web::{
    dev::Payload,
    http::StatusCode,
    FromRequest,
    HttpRequest,
};

use crate::{
    app::{App, AppConfig, AppDb, AppMailer, AppTypes, AppViews},
    errors::Error,
    mail::Mail,
    secret::{PasswordHash, Secret},
    tokens::IssuedHash,
    users::{InsertOutcome, UserRecord},
    views::Page,
};

#[derive(Debug)]
pub(crate) enum TestError {
    Onboarding(Error),
    MailRefused,
}

impl From<Error> for TestError {
    fn from(e: Error) -> Self {
        Self::Onboarding(e)
    }
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onboarding(e) => write!(f, "{e:?}"),
            Self::MailRefused => f.write_str("the test mailer refused to send"),
        }
    }
}

impl actix_web::ResponseError for TestError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Onboarding(e) => e.status_code(),
            Self::MailRefused => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// What the in-memory users table stores per row.
#[derive(Debug, Clone)]
pub(crate) struct StoredUser {
    pub password: Option<String>,
    pub hash: Option<(String, SystemTime)>,
    pub creator_user: String,
    pub creator_zone: String,
}

#[derive(Clone)]
pub(crate) struct TestApp {
    inner: Arc<Inner>,
}

struct Inner {
    users: Mutex<HashMap<String, StoredUser>>,
    outbox: Mutex<Vec<(String, &'static str)>>,
    clock: Mutex<SystemTime>,
    mail_enabled: bool,
    refuse_mail: bool,
}

impl TestApp {
    pub const API_SECRET: &'static str = "test-api-secret";

    pub fn new() -> Self {
        Self::build(true, false)
    }

    pub fn with_mail_disabled() -> Self {
        Self::build(false, false)
    }

    pub fn with_refused_mail() -> Self {
        Self::build(true, true)
    }

    fn build(mail_enabled: bool, refuse_mail: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                users: Mutex::new(HashMap::new()),
                outbox: Mutex::new(Vec::new()),
                clock: Mutex::new(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)),
                mail_enabled,
                refuse_mail,
            }),
        }
    }

    pub fn stored(&self, username: &str) -> Option<StoredUser> {
        self.inner.users.lock().unwrap()
            .get(username)
            .cloned()
    }

    pub fn stored_hash(&self, username: &str) -> Option<String> {
        self.stored(username)?
            .hash
            .map(|(hash, _)| hash)
    }

    /// Every `(recipient, template)` pair handed to the mailer, in order.
    pub fn outbox(&self) -> Vec<(String, &'static str)> {
        self.inner.outbox.lock().unwrap().clone()
    }

    pub fn advance_days(&self, days: u64) {
        let mut clock = self.inner.clock.lock().unwrap();
        *clock = *clock + Duration::from_secs(days * 24 * 60 * 60);
    }

    fn record(username: &str, stored: &StoredUser) -> UserRecord<Self> {
        UserRecord {
            username: username.to_string(),
            password_hash: PasswordHash::from(stored.password.clone()),
            hash: stored.hash.as_ref().map(|(hash, issued_at)| IssuedHash {
                secret: Secret::from(hash.clone()),
                issued_at: *issued_at,
            }),
            creator_user: stored.creator_user.clone(),
            creator_zone: stored.creator_zone.clone(),
        }
    }
}

impl AppTypes for TestApp {
    type DateTime = SystemTime;
    type Error = TestError;
}

impl App for TestApp {
    fn time_now(&self) -> SystemTime {
        *self.inner.clock.lock().unwrap()
    }
}

impl AppConfig for TestApp {
    fn api_secret(&self) -> &str {
        Self::API_SECRET
    }

    fn base_url(&self) -> &str {
        "https://users.test"
    }

    fn mail_enabled(&self) -> bool {
        self.inner.mail_enabled
    }
}

impl AppDb for TestApp {
    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord<Self>>, TestError> {
        let users = self.inner.users.lock().unwrap();
        Ok(users.get(username).map(|stored| Self::record(username, stored)))
    }

    async fn find_user_by_hash(
        &self,
        hash: &str,
    ) -> Result<Option<UserRecord<Self>>, TestError> {
        let users = self.inner.users.lock().unwrap();
        let found = users.iter().find(|(_, stored)| {
            matches!(&stored.hash, Some((stored_hash, _)) if stored_hash == hash)
        });
        Ok(found.map(|(username, stored)| Self::record(username, stored)))
    }

    async fn insert_user(
        &self,
        record: &UserRecord<Self>,
    ) -> Result<InsertOutcome, TestError> {
        let mut users = self.inner.users.lock().unwrap();
        if users.contains_key(&record.username) {
            return Ok(InsertOutcome::UsernameTaken);
        }

        users.insert(record.username.clone(), StoredUser {
            password: record.password_hash.expose().map(str::to_string),
            hash: record.hash.as_ref().map(|issued| {
                (issued.secret.expose().to_string(), issued.issued_at)
            }),
            creator_user: record.creator_user.clone(),
            creator_zone: record.creator_zone.clone(),
        });
        Ok(InsertOutcome::Inserted)
    }

    async fn replace_hash(
        &self,
        username: &str,
        issued: &IssuedHash<Self>,
    ) -> Result<(), TestError> {
        let mut users = self.inner.users.lock().unwrap();
        if let Some(stored) = users.get_mut(username) {
            stored.hash = Some((issued.secret.expose().to_string(), issued.issued_at));
        }
        Ok(())
    }

    async fn set_password_clear_hash(
        &self,
        username: &str,
        expected_hash: &str,
        digest: PasswordHash,
    ) -> Result<bool, TestError> {
        let mut users = self.inner.users.lock().unwrap();
        let Some(stored) = users.get_mut(username) else {
            return Ok(false);
        };

        let matches = matches!(&stored.hash, Some((hash, _)) if hash == expected_hash);
        if !matches {
            return Ok(false);
        }

        stored.password = digest.expose().map(str::to_string);
        stored.hash = None;
        Ok(true)
    }
}

impl AppMailer for TestApp {
    async fn send_mail(&self, to: &str, mail: &Mail) -> Result<(), TestError> {
        if self.inner.refuse_mail {
            return Err(TestError::MailRefused);
        }

        self.inner.outbox.lock().unwrap()
            .push((to.to_string(), mail.template()));
        Ok(())
    }
}

impl AppViews for TestApp {
    /// Renders a page as a recognisable marker plus its data, so route tests
    /// can assert on which page was shown with what.
    fn render(&self, page: Page<'_>) -> String {
        let mut body = format!("[{}]", page.template());

        match &page {
            Page::ActivateForm {username, errors}
            | Page::ResetPasswordForm {username, errors} => {
                body.push_str(&format!(" user={username} errors={}", errors.join("|")));
            },
            Page::ActivationSuccessful {username}
            | Page::ResetPasswordSuccessful {username} => {
                body.push_str(&format!(" user={username}"));
            },
            Page::ForgotPasswordForm {errors} => {
                body.push_str(&format!(" errors={}", errors.join("|")));
            },
            _ => {},
        }

        body
    }
}

impl FromRequest for TestApp {
    type Error = TestError;
    type Future = Ready<Result<Self, TestError>>;

    fn from_request(request: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let app = request
            .app_data::<TestApp>()
            .cloned()
            .expect("TestApp should be registered as app data");
        ready(Ok(app))
    }
}
