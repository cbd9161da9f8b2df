// src/web/reporte_handlers.rs
use crate::{
    error::{AppError, AppResult},
    models::attendance::ReportFilter,
    services::{attendance_service, export_service},
    state::AppState,
    templates::{render, ReportRow, ReportesPage},
    web::{csv_attachment, mw_auth::CurrentUser, redirect_on_error},
};
use axum::{
    extract::{Extension, Query, State},
    response::{IntoResponse, Response},
};
use chrono::{Local, NaiveDate};
use serde::Deserialize;

const REPORT_PATH: &str = "/reportes";

/// Filtros do relatório tal como chegam na query (`desde`, `hasta`, `q`).
#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct ReportParams {
    desde: String,
    hasta: String,
    q: String,
    error: Option<String>,
}

fn parse_date(raw: &str, label: &str) -> AppResult<Option<NaiveDate>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| AppError::Validation(format!("Fecha {} inválida: {}", label, raw)))
}

impl ReportParams {
    fn to_filter(&self) -> AppResult<ReportFilter> {
        let start = parse_date(&self.desde, "inicial")?;
        let end = parse_date(&self.hasta, "final")?;
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(AppError::Validation(
                    "La fecha inicial no puede ser posterior a la final.".to_string(),
                ));
            }
        }
        let search = self.q.trim();
        Ok(ReportFilter {
            start,
            end,
            search: (!search.is_empty()).then(|| search.to_string()),
        })
    }

    fn query_string(&self) -> String {
        format!(
            "desde={}&hasta={}&q={}",
            urlencoding::encode(self.desde.trim()),
            urlencoding::encode(self.hasta.trim()),
            urlencoding::encode(self.q.trim())
        )
    }
}

// GET /reportes
pub async fn reportes_page(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(params): Query<ReportParams>,
) -> AppResult<impl IntoResponse> {
    // Filtro inválido: mostra a página vazia com o aviso
    let (rows, error_message) = match params.to_filter() {
        Ok(filter) => {
            let items = attendance_service::get_attendance_records(&state.db_pool, &filter).await?;
            (items.iter().map(ReportRow::from).collect(), None)
        }
        Err(err) => (Vec::new(), Some(err.user_message())),
    };
    let error_message = error_message.or_else(|| params.error.clone());

    render(&ReportesPage {
        nav: user.nav(),
        rows,
        desde: params.desde.trim().to_string(),
        hasta: params.hasta.trim().to_string(),
        search: params.q.trim().to_string(),
        export_query: params.query_string(),
        error_message,
    })
}

// GET /reportes/exportar
pub async fn export_report(State(state): State<AppState>, Query(params): Query<ReportParams>) -> Response {
    let result = async {
        let filter = params.to_filter()?;
        let items = attendance_service::get_attendance_records(&state.db_pool, &filter).await?;
        export_service::export_report(&items, Local::now().naive_local())
    }
    .await;

    match result {
        Ok(export) => csv_attachment(export),
        Err(err) => redirect_on_error(&format!("{}?{}", REPORT_PATH, params.query_string()), err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(desde: &str, hasta: &str, q: &str) -> ReportParams {
        ReportParams { desde: desde.into(), hasta: hasta.into(), q: q.into(), error: None }
    }

    #[test]
    fn blank_fields_mean_no_filter() {
        let filter = params(" ", "", "  ").to_filter().unwrap();
        assert_eq!(filter.start, None);
        assert_eq!(filter.end, None);
        assert_eq!(filter.search, None);
    }

    #[test]
    fn dates_are_parsed_and_ordered() {
        let filter = params("2026-03-01", "2026-03-02", "dual").to_filter().unwrap();
        assert_eq!(filter.start, NaiveDate::from_ymd_opt(2026, 3, 1));
        assert_eq!(filter.search.as_deref(), Some("dual"));

        assert!(matches!(params("2026-03-05", "2026-03-01", "").to_filter(), Err(AppError::Validation(_))));
        assert!(matches!(params("05/03/2026", "", "").to_filter(), Err(AppError::Validation(_))));
    }
}
