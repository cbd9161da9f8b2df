// src/web/auth_handlers.rs
use crate::{
    error::{AppError, AppResult},
    models::user::LoginForm,
    services::auth_service,
    state::AppState,
    templates::{render, LoginPage, MenuPage},
    web::{
        mw_auth::{session_user_id, CurrentUser, SESSION_USER_KEY},
        ListParams,
    },
};
use axum::{
    extract::{Extension, Form, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

// GET /login
pub async fn show_login_form(session: Session) -> AppResult<Response> {
    if session_user_id(&session).await?.is_some() {
        tracing::debug!("GET /login: utilizador já autenticado, redirecionando para /menu");
        return Ok(Redirect::to("/menu").into_response());
    }

    Ok(render(&LoginPage { username: String::new(), error: None })?.into_response())
}

// POST /login
pub async fn handle_login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> AppResult<Response> {
    tracing::info!("Tentativa de login para: {}", form.username);

    let user = match auth_service::authenticate(&state.db_pool, &form).await {
        Ok(user) => user,
        Err(err @ (AppError::Validation(_) | AppError::InvalidCredentials)) => {
            tracing::warn!("Login recusado para '{}': {}", form.username, err);
            let page = LoginPage {
                username: form.username.trim().to_string(),
                error: Some(err.user_message()),
            };
            return Ok(render(&page)?.into_response());
        }
        Err(err) => return Err(err),
    };

    session
        .cycle_id()
        .await
        .map_err(|e| AppError::SessionError(format!("Falha ao rodar ID: {}", e)))?;
    session
        .insert(SESSION_USER_KEY, user.id)
        .await
        .map_err(|e| AppError::SessionError(format!("Falha ao inserir na sessão: {}", e)))?;

    tracing::info!("✅ Login bem-sucedido para: {}", user.username);
    let welcome = auth_service::welcome_message(&user);
    Ok(Redirect::to(&format!("/menu?success={}", urlencoding::encode(&welcome))).into_response())
}

// GET /logout
pub async fn handle_logout(session: Session) -> AppResult<Redirect> {
    let user_id = session_user_id(&session).await.ok().flatten();

    session
        .delete()
        .await
        .map_err(|e| AppError::SessionError(format!("Falha ao apagar sessão: {}", e)))?;

    match user_id {
        Some(id) => tracing::info!("🚪 Utilizador {} desligado.", id),
        None => tracing::info!("🚪 Sessão anónima desligada."),
    }
    Ok(Redirect::to("/login"))
}

// GET /menu
pub async fn show_menu(
    Extension(user): Extension<CurrentUser>,
    Query(params): Query<ListParams>,
) -> AppResult<impl IntoResponse> {
    render(&MenuPage {
        nav: user.nav(),
        success_message: params.success,
        error_message: params.error,
    })
}
