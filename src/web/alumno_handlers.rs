// src/web/alumno_handlers.rs
use crate::{
    error::{AppError, AppResult},
    fingerprint::{simulated::sample_for, EnrollOutcome, ENROLL_SAMPLES},
    models::alumno::{Alumno, AlumnoInput},
    services::{alumno_service, attendance_service, export_service},
    state::AppState,
    templates::{render, AlumnoFormPage, AlumnoRow, AlumnosPage, HistoryRow, ProfileOption},
    web::{csv_attachment, mw_auth::CurrentUser, redirect_on_error, redirect_success, ListParams},
};
use axum::{
    extract::{Extension, Form, Multipart, Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use chrono::Local;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

const LIST_PATH: &str = "/alumnos";
const HISTORY_LIMIT: i64 = 20;

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct AlumnoForm {
    matricula: String,
    first_name: String,
    last_name: String,
    email: String,
    phone: String,
    address: String,
    profile: String,
    // Checkbox: só vem no pedido quando está marcado
    is_active: Option<String>,
}

impl From<AlumnoForm> for AlumnoInput {
    fn from(form: AlumnoForm) -> Self {
        AlumnoInput {
            matricula: form.matricula,
            first_name: form.first_name,
            last_name: form.last_name,
            email: form.email,
            phone: form.phone,
            address: form.address,
            profile: form.profile,
            is_active: form.is_active.is_some(),
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct EnrollForm {
    simular: Option<String>,
}

fn edit_path(id: i64) -> String {
    format!("{}/{}/editar", LIST_PATH, id)
}

async fn load_alumno(state: &AppState, id: i64) -> AppResult<Alumno> {
    alumno_service::find_alumno_by_id(&state.db_pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Alumno no encontrado.".to_string()))
}

struct FormView {
    editing: Option<Alumno>,
    input: AlumnoInput,
    success_message: Option<String>,
    error_message: Option<String>,
}

async fn render_form(state: &AppState, user: &CurrentUser, view: FormView) -> AppResult<Response> {
    let profiles = alumno_service::get_profiles(&state.db_pool).await?;
    let profiles = profiles
        .into_iter()
        .map(|p| ProfileOption {
            selected: p.profile_name == view.input.profile,
            name: p.profile_name,
        })
        .collect();

    let (title, action, id, has_fingerprint, has_photo, history) = match &view.editing {
        Some(alumno) => {
            let history = attendance_service::get_alumno_history(&state.db_pool, alumno.id, HISTORY_LIMIT).await?;
            (
                format!("Editar alumno: {}", alumno.full_name()),
                edit_path(alumno.id),
                alumno.id,
                alumno.has_fingerprint(),
                alumno.has_photo(),
                history.iter().map(HistoryRow::from).collect(),
            )
        }
        None => ("Nuevo alumno".to_string(), format!("{}/nuevo", LIST_PATH), 0, false, false, Vec::new()),
    };

    let page = AlumnoFormPage {
        nav: user.nav(),
        title,
        action,
        editing: view.editing.is_some(),
        id,
        matricula: view.input.matricula,
        first_name: view.input.first_name,
        last_name: view.input.last_name,
        email: view.input.email,
        phone: view.input.phone,
        address: view.input.address,
        profiles,
        is_active: view.input.is_active,
        has_fingerprint,
        has_photo,
        simulator: state.simulator.is_some(),
        history,
        success_message: view.success_message,
        error_message: view.error_message,
    };
    Ok(render(&page)?.into_response())
}

fn input_from(alumno: &Alumno) -> AlumnoInput {
    AlumnoInput {
        matricula: alumno.matricula.to_string(),
        first_name: alumno.first_name.clone(),
        last_name: alumno.last_name.clone(),
        email: alumno.email.clone().unwrap_or_default(),
        phone: alumno.phone.clone().unwrap_or_default(),
        address: alumno.address.clone().unwrap_or_default(),
        profile: alumno.profile.clone().unwrap_or_default(),
        is_active: alumno.is_active,
    }
}

// GET /alumnos
pub async fn list_alumnos(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(params): Query<ListParams>,
) -> AppResult<impl IntoResponse> {
    let alumnos = alumno_service::find_all_alumnos(&state.db_pool, params.search()).await?;
    render(&AlumnosPage {
        nav: user.nav(),
        alumnos: alumnos.iter().map(AlumnoRow::from).collect(),
        search: params.search().unwrap_or_default().to_string(),
        success_message: params.success,
        error_message: params.error,
    })
}

// GET /alumnos/nuevo
pub async fn show_new_alumno(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Response> {
    let input = AlumnoInput { is_active: true, ..Default::default() };
    render_form(&state, &user, FormView { editing: None, input, success_message: None, error_message: None }).await
}

// POST /alumnos/nuevo
pub async fn handle_create_alumno(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Form(form): Form<AlumnoForm>,
) -> AppResult<Response> {
    let input = AlumnoInput::from(form);
    match alumno_service::create_alumno(&state.db_pool, &input).await {
        // Segue para a edição, onde se regista a huella e a foto
        Ok(id) => Ok(redirect_success(&edit_path(id), "Alumno registrado.").into_response()),
        Err(AppError::Validation(message)) => {
            render_form(&state, &user, FormView { editing: None, input, success_message: None, error_message: Some(message) })
                .await
        }
        Err(err) => Err(err),
    }
}

// GET /alumnos/{id}/editar
pub async fn show_edit_alumno(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Query(params): Query<ListParams>,
) -> AppResult<Response> {
    let alumno = load_alumno(&state, id).await?;
    let input = input_from(&alumno);
    let view = FormView {
        editing: Some(alumno),
        input,
        success_message: params.success,
        error_message: params.error,
    };
    render_form(&state, &user, view).await
}

// POST /alumnos/{id}/editar
pub async fn handle_edit_alumno(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Form(form): Form<AlumnoForm>,
) -> AppResult<Response> {
    let input = AlumnoInput::from(form);
    match alumno_service::update_alumno(&state.db_pool, id, &input).await {
        Ok(()) => Ok(redirect_success(LIST_PATH, "Alumno actualizado.").into_response()),
        Err(AppError::Validation(message)) => {
            let alumno = load_alumno(&state, id).await?;
            let view = FormView { editing: Some(alumno), input, success_message: None, error_message: Some(message) };
            render_form(&state, &user, view).await
        }
        Err(err) => Ok(redirect_on_error(LIST_PATH, err)),
    }
}

// POST /alumnos/{id}/eliminar
pub async fn handle_delete_alumno(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match alumno_service::delete_alumno(&state.db_pool, id).await {
        Ok(()) => redirect_success(LIST_PATH, "Alumno eliminado.").into_response(),
        Err(err) => redirect_on_error(LIST_PATH, err),
    }
}

// GET /alumnos/exportar
pub async fn export_alumnos(State(state): State<AppState>, Query(params): Query<ListParams>) -> Response {
    let result = async {
        let alumnos = alumno_service::find_all_alumnos(&state.db_pool, params.search()).await?;
        export_service::export_alumnos(&alumnos, Local::now().naive_local())
    }
    .await;

    match result {
        Ok(export) => csv_attachment(export),
        Err(err) => redirect_on_error(LIST_PATH, err),
    }
}

// --- Huella ---

// POST /alumnos/{id}/huella
pub async fn handle_enroll_fingerprint(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Form(form): Form<EnrollForm>,
) -> Response {
    let back = edit_path(id);
    match enroll(&state, id, form.simular.is_some()).await {
        Ok(outcome) if outcome.is_success() => redirect_success(&back, &outcome.message()).into_response(),
        Ok(outcome) => redirect_on_error(&back, AppError::Validation(outcome.message())),
        Err(err) => redirect_on_error(&back, err),
    }
}

async fn enroll(state: &AppState, id: i64, simulate: bool) -> AppResult<EnrollOutcome> {
    let alumno = load_alumno(state, id).await?;

    if simulate {
        if let Some(reader) = &state.simulator {
            let sample = sample_for(alumno.matricula);
            for _ in 0..ENROLL_SAMPLES {
                reader.place_finger(sample.clone());
            }
        }
    }

    // Se o pedido for abandonado, a espera pelo dedo termina também
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let device = state.device.clone();
    let timeout = state.config.fingerprint.capture_timeout;
    tracing::info!("🖐️ Registo de huella para aluno {} iniciado.", id);
    let outcome = tokio::task::spawn_blocking(move || {
        device.enroll_template(timeout, &cancel, |step, total, message| {
            tracing::debug!("Registo de huella [{}/{}]: {}", step, total, message);
        })
    })
    .await
    .map_err(|e| {
        tracing::error!("Task de registo de huella falhou: {}", e);
        AppError::InternalServerError
    })??;

    if let Some(template) = outcome.template() {
        alumno_service::set_fingerprint(&state.db_pool, id, Some(template)).await?;
    }
    Ok(outcome)
}

// POST /alumnos/{id}/huella/eliminar
pub async fn handle_remove_fingerprint(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    let back = edit_path(id);
    match alumno_service::set_fingerprint(&state.db_pool, id, None).await {
        Ok(()) => redirect_success(&back, "Huella eliminada.").into_response(),
        Err(err) => redirect_on_error(&back, err),
    }
}

// POST /alumnos/lector/probar
pub async fn handle_test_reader(State(state): State<AppState>) -> Response {
    let device = state.device.clone();
    let result = tokio::task::spawn_blocking(move || {
        let ready = device.ensure_ready()?;
        let attempt = device.capture_once()?;
        Ok::<_, AppError>(format!("{} {}", ready, attempt.message()))
    })
    .await;

    match result {
        Ok(Ok(message)) => redirect_success(LIST_PATH, &message).into_response(),
        Ok(Err(err)) => redirect_on_error(LIST_PATH, err),
        Err(e) => {
            tracing::error!("Task de teste do leitor falhou: {}", e);
            AppError::InternalServerError.into_response()
        }
    }
}

// --- Foto ---

/// Tipo MIME pela assinatura dos primeiros bytes.
fn image_mime(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if bytes.starts_with(b"GIF8") {
        "image/gif"
    } else if bytes.starts_with(b"BM") {
        "image/bmp"
    } else {
        "application/octet-stream"
    }
}

async fn read_photo(mut multipart: Multipart) -> AppResult<Vec<u8>> {
    let invalid = |msg: &str| AppError::Validation(msg.to_string());

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| invalid("No se pudo leer el archivo enviado."))?
    {
        if field.name() != Some("foto") {
            continue;
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|_| invalid("No se pudo leer el archivo enviado."))?;
        if bytes.is_empty() {
            return Err(invalid("Selecciona una imagen."));
        }
        if image_mime(&bytes) == "application/octet-stream" {
            return Err(invalid("El archivo no es una imagen válida (PNG, JPG, GIF o BMP)."));
        }
        return Ok(bytes.to_vec());
    }
    Err(invalid("Selecciona una imagen."))
}

// POST /alumnos/{id}/foto
pub async fn handle_upload_photo(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Response {
    let back = edit_path(id);
    let result = async {
        let photo = read_photo(multipart).await?;
        alumno_service::set_photo(&state.db_pool, id, Some(&photo)).await
    }
    .await;

    match result {
        Ok(()) => redirect_success(&back, "Foto actualizada.").into_response(),
        Err(err) => redirect_on_error(&back, err),
    }
}

// GET /alumnos/{id}/foto
pub async fn serve_photo(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Response> {
    let photo = load_alumno(&state, id)
        .await?
        .photo
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::NotFound("El alumno no tiene foto.".to_string()))?;

    Ok(([(header::CONTENT_TYPE, image_mime(&photo))], photo).into_response())
}

// POST /alumnos/{id}/foto/eliminar
pub async fn handle_remove_photo(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    let back = edit_path(id);
    match alumno_service::set_photo(&state.db_pool, id, None).await {
        Ok(()) => redirect_success(&back, "Foto eliminada.").into_response(),
        Err(err) => redirect_on_error(&back, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_type_comes_from_the_file_signature() {
        assert_eq!(image_mime(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A]), "image/png");
        assert_eq!(image_mime(&[0xFF, 0xD8, 0xFF, 0xE0]), "image/jpeg");
        assert_eq!(image_mime(b"GIF89a"), "image/gif");
        assert_eq!(image_mime(b"%PDF-1.7"), "application/octet-stream");
    }

    #[test]
    fn missing_active_box_means_inactive() {
        let form = AlumnoForm { matricula: "1001".into(), ..Default::default() };
        assert!(!AlumnoInput::from(form).is_active);
    }
}
