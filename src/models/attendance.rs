// src/models/attendance.rs
use crate::models::alumno::AlumnoSummary;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use sqlx::FromRow;

/// Evento de assistência. Só é criado e lido, nunca alterado.
#[derive(Debug, Clone, FromRow)]
pub struct AttendanceRecord {
    pub id: i64,
    pub alumno_id: i64,
    pub record_type: String,
    pub timestamp: NaiveDateTime,
}

// Linha do relatório: registo + dados do aluno
#[derive(Debug, Clone, FromRow)]
pub struct ReportItem {
    pub timestamp: NaiveDateTime,
    pub record_type: String,
    pub matricula: i64,
    pub profile: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl ReportItem {
    pub fn timestamp_label(&self) -> String {
        self.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// Filtros do relatório. `end` inclui o dia inteiro.
#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub search: Option<String>,
}

/// Sinal sonoro que a página do checador toca com o resultado.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackCue {
    Success,
    Failure,
}

/// Resultado de um registo de assistência (manual ou por huella).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckInResult {
    pub success: bool,
    pub message: String,
    pub alumno: Option<AlumnoSummary>,
    pub record_id: Option<i64>,
    pub timestamp: Option<String>,
    pub score: Option<i32>,
    pub cue: FeedbackCue,
}

impl CheckInResult {
    pub fn failure(message: impl Into<String>) -> Self {
        CheckInResult {
            success: false,
            message: message.into(),
            alumno: None,
            record_id: None,
            timestamp: None,
            score: None,
            cue: FeedbackCue::Failure,
        }
    }
}
