// src/services/auth_service.rs
use crate::{
    error::{AppError, AppResult},
    models::user::{LoginForm, User},
    services::user_service,
};
use sqlx::SqlitePool;

// Custo do bcrypt; nos testes usa-se o mínimo para não os arrastar
#[cfg(not(test))]
const HASH_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const HASH_COST: u32 = 4;

/// Verifica se a senha fornecida corresponde ao hash guardado.
pub async fn verify_password(password: &str, stored_hash: &str) -> AppResult<bool> {
    let password = password.to_string();
    let stored_hash = stored_hash.to_string();
    tokio::task::spawn_blocking(move || {
        tracing::debug!("Verificando hash bcrypt...");
        bcrypt::verify(&password, &stored_hash)
    })
    .await
    .map_err(|e| {
        tracing::error!("Erro na task spawn_blocking (verify_password): {:?}", e);
        AppError::InternalServerError
    })?
    .map_err(|e| {
        tracing::error!("Erro bcrypt ao verificar senha: {:?}", e);
        AppError::PasswordHashingError
    })
}

/// Gera um hash bcrypt para uma senha.
pub async fn hash_password(password: &str) -> AppResult<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || {
        tracing::debug!("Gerando hash bcrypt...");
        bcrypt::hash(&password, HASH_COST)
    })
    .await
    .map_err(|e| {
        tracing::error!("Erro na task spawn_blocking (hash_password): {:?}", e);
        AppError::InternalServerError
    })?
    .map_err(|e| {
        tracing::error!("Erro bcrypt ao gerar hash: {:?}", e);
        AppError::PasswordHashingError
    })
}

/// Valida as credenciais do formulário de login.
///
/// Campos vazios dão erro de validação; utilizador inexistente, inativo ou
/// password errada dão todos o mesmo `InvalidCredentials`.
pub async fn authenticate(db_pool: &SqlitePool, form: &LoginForm) -> AppResult<User> {
    let username = form.username.trim();
    if username.is_empty() || form.password.is_empty() {
        return Err(AppError::Validation("Ingresa usuario y contraseña.".to_string()));
    }

    let user = match user_service::find_user_by_username(db_pool, username).await? {
        Some(user) if user.is_active => user,
        Some(_) => {
            tracing::warn!("Login recusado: utilizador '{}' inativo.", username);
            return Err(AppError::InvalidCredentials);
        }
        None => {
            tracing::warn!("Login recusado: utilizador '{}' não existe.", username);
            return Err(AppError::InvalidCredentials);
        }
    };

    if !verify_password(&form.password, &user.password_hash).await? {
        tracing::warn!("Senha incorreta para '{}'.", username);
        return Err(AppError::InvalidCredentials);
    }

    tracing::info!("✅ Login bem-sucedido para: {}", user.username);
    Ok(user)
}

pub fn welcome_message(user: &User) -> String {
    format!("Bienvenido, {}.", user.username)
}
