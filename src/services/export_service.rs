// src/services/export_service.rs
use crate::{
    error::{AppError, AppResult},
    models::{alumno::Alumno, attendance::ReportItem, user::UserWithRoles},
};
use chrono::NaiveDateTime;

const REPORT_HEADER: [&str; 8] = ["FechaHora", "Tipo", "Matricula", "Perfil", "Nombre", "Apellidos", "Telefono", "Email"];
const ALUMNOS_HEADER: [&str; 7] = ["Matricula", "Perfil", "Nombre", "Apellidos", "Email", "Telefono", "Direccion"];
const USERS_HEADER: [&str; 5] = ["Usuario", "Email", "Activo", "Roles", "FechaRegistro"];

/// Ficheiro CSV pronto a descarregar.
#[derive(Debug)]
pub struct CsvExport {
    pub file_name: String,
    pub content: Vec<u8>,
}

fn file_name(kind: &str, now: NaiveDateTime) -> String {
    format!("{}_{}.csv", kind, now.format("%Y%m%d_%H%M"))
}

fn write_csv<const N: usize>(header: [&str; N], rows: Vec<[String; N]>) -> AppResult<Vec<u8>> {
    if rows.is_empty() {
        return Err(AppError::Validation("No hay datos para exportar.".to_string()));
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(header)
        .map_err(|e| AppError::Export(e.to_string()))?;
    for row in rows {
        writer
            .write_record(&row)
            .map_err(|e| AppError::Export(e.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|e| AppError::Export(e.to_string()))
}

pub fn export_report(items: &[ReportItem], now: NaiveDateTime) -> AppResult<CsvExport> {
    let rows = items
        .iter()
        .map(|r| {
            [
                r.timestamp_label(),
                r.record_type.clone(),
                r.matricula.to_string(),
                r.profile.clone().unwrap_or_default(),
                r.first_name.clone(),
                r.last_name.clone(),
                r.phone.clone().unwrap_or_default(),
                r.email.clone().unwrap_or_default(),
            ]
        })
        .collect();

    let content = write_csv(REPORT_HEADER, rows)?;
    tracing::info!("📤 Relatório exportado ({} linhas).", items.len());
    Ok(CsvExport { file_name: file_name("reporte", now), content })
}

pub fn export_alumnos(alumnos: &[Alumno], now: NaiveDateTime) -> AppResult<CsvExport> {
    let rows = alumnos
        .iter()
        .map(|a| {
            [
                a.matricula.to_string(),
                a.profile.clone().unwrap_or_default(),
                a.first_name.clone(),
                a.last_name.clone(),
                a.email.clone().unwrap_or_default(),
                a.phone.clone().unwrap_or_default(),
                a.address.clone().unwrap_or_default(),
            ]
        })
        .collect();

    let content = write_csv(ALUMNOS_HEADER, rows)?;
    Ok(CsvExport { file_name: file_name("alumnos", now), content })
}

pub fn export_users(users: &[UserWithRoles], now: NaiveDateTime) -> AppResult<CsvExport> {
    let rows = users
        .iter()
        .map(|u| {
            [
                u.user.username.clone(),
                u.user.email.clone().unwrap_or_default(),
                if u.user.is_active { "Sí" } else { "No" }.to_string(),
                u.roles_label(),
                u.user.registration_date.format("%Y-%m-%d %H:%M").to_string(),
            ]
        })
        .collect();

    let content = write_csv(USERS_HEADER, rows)?;
    Ok(CsvExport { file_name: file_name("usuarios", now), content })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::User;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    fn item(first_name: &str, email: Option<&str>) -> ReportItem {
        ReportItem {
            timestamp: at(8, 5),
            record_type: "Checador".into(),
            matricula: 1001,
            profile: Some("Dual".into()),
            first_name: first_name.into(),
            last_name: "Pérez".into(),
            phone: None,
            email: email.map(str::to_string),
        }
    }

    #[test]
    fn report_has_header_and_one_line_per_record() {
        let export = export_report(&[item("Lucía", Some("l@x.mx")), item("Mario", None)], at(17, 45)).unwrap();
        assert_eq!(export.file_name, "reporte_20260302_1745.csv");

        let text = String::from_utf8(export.content).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "FechaHora,Tipo,Matricula,Perfil,Nombre,Apellidos,Telefono,Email");
        assert_eq!(lines[1], "2026-03-02 08:05:00,Checador,1001,Dual,Lucía,Pérez,,l@x.mx");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn fields_with_separators_are_quoted() {
        let export = export_report(&[item("Ana, \"la\" jefa", None)], at(9, 0)).unwrap();
        let text = String::from_utf8(export.content).unwrap();
        assert!(text.contains("\"Ana, \"\"la\"\" jefa\""));
    }

    #[test]
    fn empty_view_is_refused() {
        let err = export_report(&[], at(9, 0)).unwrap_err();
        assert_eq!(err.to_string(), "No hay datos para exportar.");
        assert!(export_alumnos(&[], at(9, 0)).is_err());
    }

    #[test]
    fn users_list_roles_and_status() {
        let users = vec![UserWithRoles {
            user: User {
                id: 1,
                username: "admin".into(),
                email: None,
                password_hash: "x".into(),
                registration_date: at(7, 30),
                is_active: true,
            },
            roles: vec!["Usuarios".into(), "Reportes".into()],
        }];
        let export = export_users(&users, at(10, 0)).unwrap();
        assert_eq!(export.file_name, "usuarios_20260302_1000.csv");
        let text = String::from_utf8(export.content).unwrap();
        assert_eq!(text.lines().nth(1), Some("admin,,Sí,\"Usuarios, Reportes\",2026-03-02 07:30"));
    }
}
