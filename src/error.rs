// src/error.rs
use crate::fingerprint::DeviceError;
use axum::{http::StatusCode, response::Html, response::IntoResponse};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Erro na base de dados: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Erro de migração da base de dados: {0}")]
    SqlxMigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("Configuração inválida: {0}")]
    Config(String),

    #[error("Erro ao processar password")]
    PasswordHashingError,

    #[error("Credenciais inválidas")]
    InvalidCredentials,

    #[error("Erro na sessão: {0}")]
    SessionError(String),

    // (a) Entrada malformada: a mensagem já vem pronta para o utilizador
    #[error("{0}")]
    Validation(String),

    // (b) Registo inexistente
    #[error("{0}")]
    NotFound(String),

    // (c) Falhas do leitor de impressões digitais
    #[error("Erro do leitor: {0}")]
    Device(#[from] DeviceError),

    #[error("Erro ao exportar: {0}")]
    Export(String),

    #[error("Erro interno inesperado")]
    InternalServerError,

    #[error("Não autorizado")]
    Unauthorized,
}

impl AppError {
    /// Erros transitórios do SQLite que vale a pena repetir em caminhos de leitura.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::SqlxError(sqlx::Error::PoolTimedOut) | AppError::SqlxError(sqlx::Error::Io(_)) => true,
            AppError::SqlxError(sqlx::Error::Database(db_err)) => {
                // SQLITE_BUSY (5) e SQLITE_LOCKED (6), incluindo códigos estendidos
                db_err.code().is_some_and(|c| {
                    c.parse::<i64>().is_ok_and(|code| matches!(code & 0xff, 5 | 6))
                })
            }
            _ => false,
        }
    }

    /// Mensagem apresentável ao utilizador (sem detalhes internos).
    pub fn user_message(&self) -> String {
        self.status_and_message().1
    }

    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            AppError::SqlxError(_) | AppError::SqlxMigrateError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error al acceder a los datos.".to_string(),
            ),
            AppError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error de configuración.".to_string(),
            ),
            AppError::PasswordHashingError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error al procesar las credenciales.".to_string(),
            ),
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "Usuario no encontrado o inactivo.".to_string(),
            ),
            AppError::SessionError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error en la gestión de la sesión.".to_string(),
            ),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Device(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
            AppError::Export(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "No se pudo generar el archivo.".to_string(),
            ),
            AppError::Unauthorized => (
                StatusCode::FORBIDDEN,
                "No tienes permiso para acceder a esta sección.".to_string(),
            ),
            AppError::InternalServerError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Ocurrió un error inesperado.".to_string(),
            ),
        }
    }
}

// Como converter AppError numa resposta HTTP
impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        // Loga o erro detalhado no servidor
        match &self {
            AppError::Validation(_) | AppError::NotFound(_) => {
                tracing::warn!("Pedido rejeitado: {}", self)
            }
            _ => tracing::error!("Erro processado: {:?}", self),
        }

        let (status, user_message) = self.status_and_message();

        (status, Html(format!(r#"
            <!DOCTYPE html><html><head><title>Error</title><style>body{{font-family:sans-serif;}}</style></head>
            <body><h1>Error {status_code}</h1><p>{message}</p><a href="javascript:history.back()">Volver</a></body></html>
         "#, status_code = status.as_u16(), message = html_escape(&user_message)))).into_response()
    }
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// Tipo Result padrão para a aplicação
pub type AppResult<T = ()> = Result<T, AppError>;
