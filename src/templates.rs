// src/templates.rs
use crate::{
    error::{AppError, AppResult},
    models::{
        alumno::Alumno,
        attendance::{AttendanceRecord, ReportItem},
        permissions::Capabilities,
        user::UserWithRoles,
    },
};
use askama::Template; // Trait necessário para Askama
use axum::response::Html;

/// Renderiza um template e converte falhas em erro interno.
pub fn render<T: Template>(template: &T) -> AppResult<Html<String>> {
    template.render().map(Html).map_err(|e| {
        tracing::error!("Falha ao renderizar template: {}", e);
        AppError::InternalServerError
    })
}

/// Barra de navegação: utilizador atual e secções visíveis.
#[derive(Clone, Debug)]
pub struct Nav {
    pub username: String,
    pub usuarios: bool,
    pub alumnos: bool,
    pub checador: bool,
    pub reportes: bool,
}

impl Nav {
    pub fn new(username: &str, caps: Capabilities) -> Self {
        Nav {
            username: username.to_string(),
            usuarios: caps.contains(Capabilities::USUARIOS),
            alumnos: caps.contains(Capabilities::ALUMNOS),
            checador: caps.contains(Capabilities::CHECADOR),
            reportes: caps.contains(Capabilities::REPORTES),
        }
    }
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginPage {
    pub username: String,
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "menu.html")]
pub struct MenuPage {
    pub nav: Nav,
    pub success_message: Option<String>,
    pub error_message: Option<String>,
}

// --- Utilizadores ---

#[derive(Clone, Debug)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub active: bool,
    pub roles: String,
    pub registered: String,
}

impl From<&UserWithRoles> for UserRow {
    fn from(u: &UserWithRoles) -> Self {
        UserRow {
            id: u.user.id,
            username: u.user.username.clone(),
            email: u.user.email.clone().unwrap_or_default(),
            active: u.user.is_active,
            roles: u.roles_label(),
            registered: u.user.registration_date.format("%Y-%m-%d").to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "usuarios.html")]
pub struct UsuariosPage {
    pub nav: Nav,
    pub users: Vec<UserRow>,
    pub search: String,
    pub success_message: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Clone, Debug)]
pub struct RoleOption {
    pub name: String,
    pub checked: bool,
}

#[derive(Template)]
#[template(path = "usuario_form.html")]
pub struct UsuarioFormPage {
    pub nav: Nav,
    pub title: String,
    pub action: String,
    pub editing: bool,
    pub username: String,
    pub email: String,
    pub is_active: bool,
    pub roles: Vec<RoleOption>,
    pub error_message: Option<String>,
}

// --- Alunos ---

#[derive(Clone, Debug)]
pub struct AlumnoRow {
    pub id: i64,
    pub matricula: i64,
    pub first_name: String,
    pub last_name: String,
    pub profile: String,
    pub email: String,
    pub phone: String,
    pub active: bool,
    pub has_fingerprint: bool,
    pub has_photo: bool,
}

impl From<&Alumno> for AlumnoRow {
    fn from(a: &Alumno) -> Self {
        AlumnoRow {
            id: a.id,
            matricula: a.matricula,
            first_name: a.first_name.clone(),
            last_name: a.last_name.clone(),
            profile: a.profile.clone().unwrap_or_default(),
            email: a.email.clone().unwrap_or_default(),
            phone: a.phone.clone().unwrap_or_default(),
            active: a.is_active,
            has_fingerprint: a.has_fingerprint(),
            has_photo: a.has_photo(),
        }
    }
}

#[derive(Template)]
#[template(path = "alumnos.html")]
pub struct AlumnosPage {
    pub nav: Nav,
    pub alumnos: Vec<AlumnoRow>,
    pub search: String,
    pub success_message: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ProfileOption {
    pub name: String,
    pub selected: bool,
}

#[derive(Clone, Debug)]
pub struct HistoryRow {
    pub timestamp: String,
    pub record_type: String,
}

impl From<&AttendanceRecord> for HistoryRow {
    fn from(r: &AttendanceRecord) -> Self {
        HistoryRow {
            timestamp: r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            record_type: r.record_type.clone(),
        }
    }
}

#[derive(Template)]
#[template(path = "alumno_form.html")]
pub struct AlumnoFormPage {
    pub nav: Nav,
    pub title: String,
    pub action: String,
    pub editing: bool,
    pub id: i64,
    pub matricula: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub profiles: Vec<ProfileOption>,
    pub is_active: bool,
    pub has_fingerprint: bool,
    pub has_photo: bool,
    pub simulator: bool,
    pub history: Vec<HistoryRow>,
    pub success_message: Option<String>,
    pub error_message: Option<String>,
}

// --- Checador ---

#[derive(Template)]
#[template(path = "checador.html")]
pub struct ChecadorPage {
    pub nav: Nav,
    pub simulator: bool,
    pub record_type: String,
}

// --- Relatórios ---

#[derive(Clone, Debug)]
pub struct ReportRow {
    pub timestamp: String,
    pub record_type: String,
    pub matricula: i64,
    pub profile: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: String,
}

impl From<&ReportItem> for ReportRow {
    fn from(r: &ReportItem) -> Self {
        ReportRow {
            timestamp: r.timestamp_label(),
            record_type: r.record_type.clone(),
            matricula: r.matricula,
            profile: r.profile.clone().unwrap_or_default(),
            first_name: r.first_name.clone(),
            last_name: r.last_name.clone(),
            phone: r.phone.clone().unwrap_or_default(),
            email: r.email.clone().unwrap_or_default(),
        }
    }
}

#[derive(Template)]
#[template(path = "reportes.html")]
pub struct ReportesPage {
    pub nav: Nav,
    pub rows: Vec<ReportRow>,
    pub desde: String,
    pub hasta: String,
    pub search: String,
    pub export_query: String,
    pub error_message: Option<String>,
}
