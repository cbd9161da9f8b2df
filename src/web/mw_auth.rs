// src/web/mw_auth.rs
use crate::{
    error::{AppError, AppResult},
    models::permissions::Capabilities,
    services::user_service,
    state::AppState,
    templates::Nav,
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

/// Chave da sessão onde fica o id do utilizador autenticado.
pub const SESSION_USER_KEY: &str = "user_id";

/// Utilizador autenticado do pedido atual, posto nas extensões por `require_auth`.
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub caps: Capabilities,
}

impl CurrentUser {
    pub fn nav(&self) -> Nav {
        Nav::new(&self.username, self.caps)
    }
}

pub async fn session_user_id(session: &Session) -> AppResult<Option<i64>> {
    session
        .get::<i64>(SESSION_USER_KEY)
        .await
        .map_err(|e| AppError::SessionError(format!("Erro ao verificar sessão: {}", e)))
}

// Middleware que verifica se o utilizador está logado e ativo
pub async fn require_auth(
    State(state): State<AppState>,
    session: Session,
    mut request: Request,
    next: Next,
) -> AppResult<Response> {
    let Some(user_id) = session_user_id(&session).await? else {
        tracing::debug!("Autenticação MW: sem user_id. Redirecionando para /login");
        return Ok(Redirect::to("/login").into_response());
    };

    // Um utilizador apagado ou desativado perde a sessão de imediato
    let user = match user_service::find_user_by_id(&state.db_pool, user_id).await? {
        Some(user) if user.is_active => user,
        _ => {
            tracing::warn!("Autenticação MW: utilizador {} já não é válido.", user_id);
            session
                .flush()
                .await
                .map_err(|e| AppError::SessionError(format!("Falha ao limpar sessão: {}", e)))?;
            return Ok(Redirect::to("/login").into_response());
        }
    };

    let caps = user_service::get_user_capabilities(&state.db_pool, user.id).await?;
    tracing::debug!("Autenticação MW: '{}' autenticado ({:?}).", user.username, caps);

    request.extensions_mut().insert(CurrentUser {
        id: user.id,
        username: user.username,
        caps,
    });

    Ok(next.run(request).await)
}
