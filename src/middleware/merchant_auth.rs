use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::db::{queries, AppState};
use crate::error::AppError;
use crate::models::Project;
use crate::util::extract_bearer_token;

/// Authenticated tenant for the current request.
#[derive(Clone)]
pub struct MerchantContext {
    pub project: Project,
}

/// Bearer-key authentication for merchant routes.
///
/// Resolves the key hash to an active project and stores it as a request
/// extension. Revoked keys and inactive projects are indistinguishable from
/// unknown keys to the caller.
pub async fn merchant_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let api_key = extract_bearer_token(request.headers()).ok_or(AppError::Unauthorized)?;

    let conn = state.db.get()?;
    let project = queries::get_project_by_api_key(&conn, api_key)?.ok_or(AppError::Unauthorized)?;
    drop(conn);

    request.extensions_mut().insert(MerchantContext { project });

    Ok(next.run(request).await)
}
