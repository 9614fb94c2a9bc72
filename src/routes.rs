use actix_web::{
    dev::HttpServiceFactory,
    http::{header, StatusCode},
    middleware::from_fn,
    web,
    FromRequest,
    HttpRequest,
    HttpResponse,
    HttpResponseBuilder,
};
use base64::{engine::general_purpose::STANDARD, Engine};

use crate::{
    app::{App, AppTypes},
    middleware::middleware,
    secret::Secret,
    tokens,
    users::{
        self,
        CredentialsForm,
        ForgotPasswordOutcome,
        InviteOutcome,
        SetPasswordOutcome,
        UserState,
    },
    views::Page,
};

/// The JSON body of `POST /api/user/add`.
#[derive(Debug, serde::Deserialize)]
pub struct AddUserRequest {
    pub username: String,
    pub creator_user: String,
    pub creator_zone: String,
}

/// The body of the forgot-password form.
#[derive(Debug, serde::Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub username: String,
}

/// Builds the full HTTP surface of the onboarding service, ready to be
/// mounted on an `actix_web::App`:
///
/// - `POST /api/user/add` and `POST /api/user/auth-check`, gated by the
///   shared-secret middleware;
/// - the activation, forgot-password and reset-password pages;
/// - a themed 404 for everything else.
///
/// The application type must be extractable from a request, typically by
/// cloning it out of app data.
pub fn service<A>() -> impl HttpServiceFactory
where
    A: App + FromRequest<Error = <A as AppTypes>::Error>,
{
    web::scope("")
        .wrap(from_fn(middleware::<A, _>))
        .service(web::resource("/api/user/add")
            .route(web::post().to(api_user_add::<A>))
            .default_service(web::to(method_not_allowed)))
        .service(web::resource("/api/user/auth-check")
            .route(web::post().to(api_auth_check::<A>))
            .default_service(web::to(method_not_allowed)))
        .service(web::resource("/user/activate/{hash}")
            .route(web::get().to(activate_form::<A>))
            .route(web::post().to(activate_submit::<A>)))
        .service(web::resource("/user/forgot-password")
            .route(web::get().to(forgot_password_form::<A>))
            .route(web::post().to(forgot_password_submit::<A>)))
        .service(web::resource("/user/reset-password/{hash}")
            .route(web::get().to(reset_password_form::<A>))
            .route(web::post().to(reset_password_submit::<A>)))
        .default_service(web::to(not_found::<A>))
}

async fn api_user_add<A: App>(
    app: A,
    body: web::Json<AddUserRequest>,
) -> Result<HttpResponse, A::Error> {
    let outcome = users::invite(
        &app,
        &body.username,
        &body.creator_user,
        &body.creator_zone,
    ).await?;

    let response = match outcome {
        InviteOutcome::Created => {
            HttpResponse::Created().json(status_message("ok", "User created."))
        },
        InviteOutcome::AlreadyExists => {
            HttpResponse::Ok().json(status_message("ok", "User already exists."))
        },
    };
    Ok(response)
}

async fn api_auth_check<A: App>(
    app: A,
    request: HttpRequest,
) -> Result<HttpResponse, A::Error> {
    let authenticated = match basic_credentials(&request) {
        Some((username, password)) => users::check_auth(&app, &username, &password).await?,
        None => false,
    };

    let response = if authenticated {
        HttpResponse::Ok()
            .content_type(header::ContentType::plaintext())
            .body("Authenticated")
    } else {
        let challenge = format!("Basic realm=\"{}\"", app.auth_check_realm());
        HttpResponse::Unauthorized()
            .insert_header((header::WWW_AUTHENTICATE, challenge))
            .json(status_message("error", "Incorrect credentials."))
    };
    Ok(response)
}

async fn activate_form<A: App>(
    app: A,
    path: web::Path<String>,
) -> Result<HttpResponse, A::Error> {
    let hash = path.into_inner();

    let response = match tokens::resolve(&app, &hash).await? {
        Some(user) if user.state() == Some(UserState::Invited) => {
            let page = Page::ActivateForm {
                username: &user.username,
                errors: vec![],
            };
            html(StatusCode::OK, app.render(page))
        },
        _ => html(StatusCode::NOT_FOUND, app.render(Page::ActivationLinkExpired)),
    };
    Ok(response)
}

async fn activate_submit<A: App>(
    app: A,
    path: web::Path<String>,
    form: web::Form<CredentialsForm>,
) -> Result<HttpResponse, A::Error> {
    let hash = path.into_inner();

    let response = match users::activate(&app, &hash, &form).await? {
        SetPasswordOutcome::Completed {username} => {
            html(StatusCode::OK, app.render(Page::ActivationSuccessful {
                username: &username,
            }))
        },
        SetPasswordOutcome::InvalidHash => {
            html(StatusCode::NOT_FOUND, app.render(Page::ActivationLinkExpired))
        },
        SetPasswordOutcome::Refused {username, reason} => {
            html(StatusCode::UNPROCESSABLE_ENTITY, app.render(Page::ActivateForm {
                username: &username,
                errors: reason.messages(),
            }))
        },
    };
    Ok(response)
}

async fn forgot_password_form<A: App>(app: A) -> Result<HttpResponse, A::Error> {
    Ok(html(StatusCode::OK, app.render(Page::ForgotPasswordForm {errors: vec![]})))
}

async fn forgot_password_submit<A: App>(
    app: A,
    form: web::Form<ForgotPasswordRequest>,
) -> Result<HttpResponse, A::Error> {
    let response = match users::forgot_password(&app, &form.username).await? {
        ForgotPasswordOutcome::Sent {..} => {
            html(StatusCode::OK, app.render(Page::ForgotPasswordSent))
        },
        ForgotPasswordOutcome::MissingUsername => {
            html(StatusCode::OK, app.render(Page::ForgotPasswordForm {
                errors: vec!["Please enter your user name (email address)".to_string()],
            }))
        },
        ForgotPasswordOutcome::UnknownUser => {
            html(StatusCode::NOT_FOUND, app.render(Page::ForgotPasswordForm {
                errors: vec![
                    "User name not found. Only external users can reset their password."
                        .to_string(),
                ],
            }))
        },
    };
    Ok(response)
}

async fn reset_password_form<A: App>(
    app: A,
    path: web::Path<String>,
) -> Result<HttpResponse, A::Error> {
    let hash = path.into_inner();

    // Any record with a live hash may reset: an invited user who lost their
    // activation link, or an active user who forgot their password.
    let response = match tokens::resolve(&app, &hash).await? {
        Some(user) => {
            let page = Page::ResetPasswordForm {
                username: &user.username,
                errors: vec![],
            };
            html(StatusCode::OK, app.render(page))
        },
        None => html(StatusCode::NOT_FOUND, app.render(Page::ResetLinkExpired)),
    };
    Ok(response)
}

async fn reset_password_submit<A: App>(
    app: A,
    path: web::Path<String>,
    form: web::Form<CredentialsForm>,
) -> Result<HttpResponse, A::Error> {
    let hash = path.into_inner();

    let response = match users::reset_password(&app, &hash, &form).await? {
        SetPasswordOutcome::Completed {username} => {
            html(StatusCode::OK, app.render(Page::ResetPasswordSuccessful {
                username: &username,
            }))
        },
        SetPasswordOutcome::InvalidHash => {
            html(StatusCode::NOT_FOUND, app.render(Page::ResetLinkExpired))
        },
        SetPasswordOutcome::Refused {username, reason} => {
            html(StatusCode::UNPROCESSABLE_ENTITY, app.render(Page::ResetPasswordForm {
                username: &username,
                errors: reason.messages(),
            }))
        },
    };
    Ok(response)
}

async fn not_found<A: App>(app: A) -> Result<HttpResponse, A::Error> {
    Ok(html(StatusCode::NOT_FOUND, app.render(Page::NotFound)))
}

async fn method_not_allowed() -> HttpResponse {
    HttpResponse::MethodNotAllowed().finish()
}

fn html(status: StatusCode, body: String) -> HttpResponse {
    HttpResponseBuilder::new(status)
        .content_type(header::ContentType::html())
        .body(body)
}

fn status_message(status: &str, message: &str) -> serde_json::Value {
    serde_json::json!({
        "status": status,
        "message": message,
    })
}

/// Parses the username and password out of an HTTP Basic authorization
/// header. Some clients append a stray newline or NUL byte to the password;
/// those are stripped before verification.
fn basic_credentials(request: &HttpRequest) -> Option<(String, Secret)> {
    let value = request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    let encoded = value.strip_prefix("Basic ")?;

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;

    let (username, password) = decoded.split_once(':')?;
    let password = password.trim_end_matches(['\n', '\r', '\0']);

    Some((username.to_string(), Secret::from(password.to_string())))
}
