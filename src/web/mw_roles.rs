// src/web/mw_roles.rs
use crate::{error::AppError, models::permissions::Capabilities, web::mw_auth::CurrentUser};
use axum::{
    extract::{Extension, Request},
    middleware::Next,
    response::Response,
};

// Deve ser executado *depois* de `require_auth`
async fn require_capability(
    needed: Capabilities,
    user: &CurrentUser,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if user.caps.contains(needed) {
        Ok(next.run(request).await)
    } else {
        tracing::warn!(
            "Roles MW: acesso negado a '{}' (falta {}).",
            user.username,
            needed.label()
        );
        Err(AppError::Unauthorized)
    }
}

pub async fn require_usuarios(
    Extension(user): Extension<CurrentUser>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    require_capability(Capabilities::USUARIOS, &user, request, next).await
}

pub async fn require_alumnos(
    Extension(user): Extension<CurrentUser>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    require_capability(Capabilities::ALUMNOS, &user, request, next).await
}

pub async fn require_checador(
    Extension(user): Extension<CurrentUser>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    require_capability(Capabilities::CHECADOR, &user, request, next).await
}

pub async fn require_reportes(
    Extension(user): Extension<CurrentUser>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    require_capability(Capabilities::REPORTES, &user, request, next).await
}
