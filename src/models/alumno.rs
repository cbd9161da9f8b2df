// src/models/alumno.rs
use crate::{
    error::{AppError, AppResult},
    fingerprint::FingerprintCandidate,
};
use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::FromRow;

// Linha da tabela 'alumnos'
#[derive(Debug, Clone, FromRow)]
pub struct Alumno {
    pub id: i64,
    pub matricula: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub profile: Option<String>,
    pub fingerprint: Option<Vec<u8>>,
    pub photo: Option<Vec<u8>>,
    pub registration_date: NaiveDateTime,
    pub is_active: bool,
}

impl Alumno {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn has_fingerprint(&self) -> bool {
        self.fingerprint.as_ref().is_some_and(|t| !t.is_empty())
    }

    pub fn has_photo(&self) -> bool {
        self.photo.as_ref().is_some_and(|p| !p.is_empty())
    }

    pub fn summary(&self) -> AlumnoSummary {
        AlumnoSummary {
            id: self.id,
            matricula: self.matricula,
            name: self.full_name(),
            profile: self.profile.clone().unwrap_or_default(),
            has_photo: self.has_photo(),
        }
    }
}

impl FingerprintCandidate for Alumno {
    fn fingerprint(&self) -> Option<&[u8]> {
        self.fingerprint.as_deref()
    }

    fn is_active(&self) -> bool {
        self.is_active
    }
}

/// O que o checador mostra de um aluno identificado (sem blobs).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlumnoSummary {
    pub id: i64,
    pub matricula: i64,
    pub name: String,
    pub profile: String,
    pub has_photo: bool,
}

/// Dados do formulário de aluno, ainda por validar.
#[derive(Debug, Clone, Default)]
pub struct AlumnoInput {
    pub matricula: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub profile: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct Profile {
    pub id: i64,
    pub profile_name: String,
    pub is_active: bool,
}

/// Interpreta a matrícula digitada: inteiro positivo.
pub fn parse_matricula(raw: &str) -> AppResult<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AppError::Validation("Ingresa la matrícula.".to_string()));
    }
    match raw.parse::<i64>() {
        Ok(m) if m > 0 => Ok(m),
        _ => Err(AppError::Validation("La matrícula debe ser un número entero positivo.".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matricula_must_be_a_positive_integer() {
        assert_eq!(parse_matricula(" 1042 ").unwrap(), 1042);
        assert!(matches!(parse_matricula(""), Err(AppError::Validation(_))));
        assert!(matches!(parse_matricula("abc"), Err(AppError::Validation(_))));
        assert!(matches!(parse_matricula("0"), Err(AppError::Validation(_))));
        assert!(matches!(parse_matricula("-7"), Err(AppError::Validation(_))));
    }
}
