// src/web/user_handlers.rs
use crate::{
    error::{AppError, AppResult},
    models::user::UserInput,
    services::{export_service, user_service},
    state::AppState,
    templates::{render, RoleOption, UserRow, UsuarioFormPage, UsuariosPage},
    web::{csv_attachment, mw_auth::CurrentUser, redirect_on_error, redirect_success, ListParams},
};
use axum::{
    extract::{Extension, Form, Path, Query, State},
    response::{IntoResponse, Response},
};
use chrono::Local;

const LIST_PATH: &str = "/usuarios";

// Os checkboxes de roles repetem a chave `roles`; o formulário chega como pares
fn parse_user_form(pairs: Vec<(String, String)>) -> UserInput {
    let mut input = UserInput::default();
    let mut email = String::new();
    for (key, value) in pairs {
        match key.as_str() {
            "username" => input.username = value,
            "email" => email = value,
            "password" => input.password = value,
            "is_active" => input.is_active = true,
            "roles" => input.roles.push(value),
            _ => {}
        }
    }
    input.email = Some(email);
    input
}

async fn role_options(state: &AppState, selected: &[String]) -> AppResult<Vec<RoleOption>> {
    let roles = user_service::get_roles(&state.db_pool).await?;
    Ok(roles
        .into_iter()
        .map(|name| RoleOption {
            checked: selected.iter().any(|s| s.eq_ignore_ascii_case(&name)),
            name,
        })
        .collect())
}

// Volta a mostrar o formulário com o que foi escrito e a mensagem de erro
async fn form_with_error(
    state: &AppState,
    user: &CurrentUser,
    editing: Option<i64>,
    input: &UserInput,
    err: AppError,
) -> AppResult<Response> {
    let AppError::Validation(message) = err else {
        return Err(err);
    };
    tracing::warn!("Formulário de utilizador recusado: {}", message);

    let (title, action) = match editing {
        Some(id) => ("Editar usuario".to_string(), format!("{}/{}/editar", LIST_PATH, id)),
        None => ("Nuevo usuario".to_string(), format!("{}/nuevo", LIST_PATH)),
    };
    let page = UsuarioFormPage {
        nav: user.nav(),
        title,
        action,
        editing: editing.is_some(),
        username: input.username.clone(),
        email: input.email.clone().unwrap_or_default(),
        is_active: input.is_active,
        roles: role_options(state, &input.roles).await?,
        error_message: Some(message),
    };
    Ok(render(&page)?.into_response())
}

// GET /usuarios
pub async fn list_users(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(params): Query<ListParams>,
) -> AppResult<impl IntoResponse> {
    let users = user_service::find_all_users(&state.db_pool, params.search()).await?;
    render(&UsuariosPage {
        nav: user.nav(),
        users: users.iter().map(UserRow::from).collect(),
        search: params.search().unwrap_or_default().to_string(),
        success_message: params.success,
        error_message: params.error,
    })
}

// GET /usuarios/nuevo
pub async fn show_new_user(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<impl IntoResponse> {
    render(&UsuarioFormPage {
        nav: user.nav(),
        title: "Nuevo usuario".to_string(),
        action: format!("{}/nuevo", LIST_PATH),
        editing: false,
        username: String::new(),
        email: String::new(),
        is_active: true,
        roles: role_options(&state, &[]).await?,
        error_message: None,
    })
}

// POST /usuarios/nuevo
pub async fn handle_create_user(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> AppResult<Response> {
    let input = parse_user_form(pairs);
    match user_service::create_user(&state.db_pool, &input).await {
        Ok(id) => {
            tracing::info!("Utilizador {} criado por '{}'.", id, user.username);
            Ok(redirect_success(LIST_PATH, "Usuario creado.").into_response())
        }
        Err(err) => form_with_error(&state, &user, None, &input, err).await,
    }
}

// GET /usuarios/{id}/editar
pub async fn show_edit_user(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let target = user_service::find_user_by_id(&state.db_pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Usuario no encontrado.".to_string()))?;
    let roles = user_service::get_user_roles(&state.db_pool, id).await?;

    render(&UsuarioFormPage {
        nav: user.nav(),
        title: "Editar usuario".to_string(),
        action: format!("{}/{}/editar", LIST_PATH, id),
        editing: true,
        username: target.username,
        email: target.email.unwrap_or_default(),
        is_active: target.is_active,
        roles: role_options(&state, &roles).await?,
        error_message: None,
    })
}

// POST /usuarios/{id}/editar
pub async fn handle_edit_user(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> AppResult<Response> {
    let input = parse_user_form(pairs);
    match user_service::update_user(&state.db_pool, id, &input).await {
        Ok(()) => Ok(redirect_success(LIST_PATH, "Usuario actualizado.").into_response()),
        Err(AppError::NotFound(msg)) => Ok(redirect_on_error(LIST_PATH, AppError::NotFound(msg))),
        Err(err) => form_with_error(&state, &user, Some(id), &input, err).await,
    }
}

// POST /usuarios/{id}/eliminar
pub async fn handle_delete_user(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Response {
    if id == user.id {
        return redirect_on_error(
            LIST_PATH,
            AppError::Validation("No puedes eliminar tu propio usuario.".to_string()),
        );
    }
    match user_service::delete_user(&state.db_pool, id).await {
        Ok(()) => redirect_success(LIST_PATH, "Usuario eliminado.").into_response(),
        Err(err) => redirect_on_error(LIST_PATH, err),
    }
}

// GET /usuarios/exportar
pub async fn export_users(State(state): State<AppState>, Query(params): Query<ListParams>) -> Response {
    let result = async {
        let users = user_service::find_all_users(&state.db_pool, params.search()).await?;
        export_service::export_users(&users, Local::now().naive_local())
    }
    .await;

    match result {
        Ok(export) => csv_attachment(export),
        Err(err) => redirect_on_error(LIST_PATH, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn repeated_role_checkboxes_are_collected() {
        let input = parse_user_form(pairs(&[
            ("username", "marta"),
            ("email", ""),
            ("password", "secreta"),
            ("is_active", "on"),
            ("roles", "Alumnos"),
            ("roles", "Reportes"),
        ]));
        assert_eq!(input.username, "marta");
        assert!(input.is_active);
        assert_eq!(input.roles, vec!["Alumnos".to_string(), "Reportes".to_string()]);
    }

    #[test]
    fn unchecked_active_box_means_inactive() {
        let input = parse_user_form(pairs(&[("username", "pedro"), ("roles", "Checador")]));
        assert!(!input.is_active);
        assert!(input.password.is_empty());
    }
}
