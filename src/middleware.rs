use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{ServiceRequest, ServiceResponse},
    middleware::Next,
    Error,
    FromRequest,
    HttpResponse,
};

use crate::app::{App, AppTypes};

/// The header in which machine callers present the shared API secret.
pub const SECRET_HEADER: &str = "x-external-user-secret";

/// Authorization gate for the machine-callable API. Every request to a path
/// under `/api/` must carry the shared secret from `AppConfig::api_secret()`
/// in the `X-External-User-Secret` header; requests without a matching
/// secret are rejected with a 403 before any handler runs. The comparison is
/// constant-time.
///
/// The user-facing pages are not gated; they pass through untouched.
///
/// Use with `actix_web::middleware::from_fn`, as `routes::service` does.
pub async fn middleware<A, B>(
    mut request: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<BoxBody>, Error>
where
    A: App + FromRequest<Error = <A as AppTypes>::Error>,
    B: MessageBody + 'static,
{
    if request.path().starts_with("/api/") {
        let app = request.extract::<A>()
            .await?;

        if !secret_matches(&request, app.api_secret()) {
            log::info!("Rejected API request without a matching shared secret");

            let response = HttpResponse::Forbidden().json(serde_json::json!({
                "status": "error",
                "message": "Secret header not present or does not match.",
            }));
            return Ok(request.into_response(response));
        }
    }

    let response = next.call(request)
        .await?;

    Ok(response.map_into_boxed_body())
}

fn secret_matches(request: &ServiceRequest, expected: &str) -> bool {
    let provided = request
        .headers()
        .get(SECRET_HEADER)
        .and_then(|value| value.to_str().ok());

    match provided {
        Some(provided) => {
            constant_time_eq::constant_time_eq(provided.as_bytes(), expected.as_bytes())
        },
        None => false,
    }
}
