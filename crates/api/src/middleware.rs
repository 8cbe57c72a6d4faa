use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use stockledger_core::{CompanyId, UserId};

use crate::app::errors::json_error;
use crate::context::{ActorContext, CompanyContext};

pub const COMPANY_HEADER: &str = "x-company-id";
pub const ACTOR_HEADER: &str = "x-actor-id";

/// Resolve request context from headers.
///
/// `X-Company-Id` is required. `X-Actor-Id` is optional here; write handlers
/// demand it through [`require_actor`].
pub async fn request_context(mut req: Request, next: Next) -> Result<Response, Response> {
    let company_id: CompanyId = header_id(req.headers(), COMPANY_HEADER)?.ok_or_else(|| {
        json_error(
            StatusCode::BAD_REQUEST,
            "missing_company",
            format!("{COMPANY_HEADER} header is required"),
        )
    })?;
    let actor_id: Option<UserId> = header_id(req.headers(), ACTOR_HEADER)?;

    req.extensions_mut().insert(CompanyContext::new(company_id));
    if let Some(actor_id) = actor_id {
        req.extensions_mut().insert(ActorContext::new(actor_id));
    }

    Ok(next.run(req).await)
}

pub fn require_actor(actor: Option<ActorContext>) -> Result<ActorContext, Response> {
    actor.ok_or_else(|| {
        json_error(
            StatusCode::BAD_REQUEST,
            "missing_actor",
            format!("{ACTOR_HEADER} header is required for writes"),
        )
    })
}

fn header_id<T: core::str::FromStr>(headers: &HeaderMap, name: &'static str) -> Result<Option<T>, Response> {
    let Some(value) = headers.get(name) else {
        return Ok(None);
    };
    let invalid = || json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("{name} must be a UUID"));

    let value = value.to_str().map_err(|_| invalid())?.trim();
    value.parse::<T>().map(Some).map_err(|_| invalid())
}
