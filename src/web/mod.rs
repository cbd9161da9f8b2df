// src/web/mod.rs
pub mod alumno_handlers;
pub mod auth_handlers;
pub mod checador_handlers;
pub mod mw_auth;
pub mod mw_roles;
pub mod reporte_handlers;
pub mod routes;
pub mod user_handlers;

use crate::{error::AppError, services::export_service::CsvExport};
use axum::{
    http::header,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;

/// Parâmetros comuns das páginas de listagem (pesquisa + feedback do PRG).
#[derive(Deserialize, Debug, Default)]
pub struct ListParams {
    pub q: Option<String>,
    pub success: Option<String>,
    pub error: Option<String>,
}

impl ListParams {
    pub fn search(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

fn with_feedback(path: &str, key: &str, message: &str) -> Redirect {
    let sep = if path.contains('?') { '&' } else { '?' };
    Redirect::to(&format!("{}{}{}={}", path, sep, key, urlencoding::encode(message)))
}

pub fn redirect_success(path: &str, message: &str) -> Redirect {
    with_feedback(path, "success", message)
}

pub fn redirect_error(path: &str, message: &str) -> Redirect {
    with_feedback(path, "error", message)
}

/// Erros de validação e de registo inexistente voltam à página como `?error=`;
/// os restantes seguem para a página de erro.
pub fn redirect_on_error(path: &str, err: AppError) -> Response {
    match err {
        AppError::Validation(_) | AppError::NotFound(_) | AppError::Device(_) => {
            tracing::warn!("Operação recusada: {}", err);
            redirect_error(path, &err.user_message()).into_response()
        }
        other => other.into_response(),
    }
}

/// Ficheiro CSV como anexo.
pub fn csv_attachment(export: CsvExport) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", export.file_name),
            ),
        ],
        export.content,
    )
        .into_response()
}
