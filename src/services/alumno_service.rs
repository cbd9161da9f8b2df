// src/services/alumno_service.rs
use crate::{
    db::with_read_retry,
    error::{AppError, AppResult},
    models::alumno::{parse_matricula, Alumno, AlumnoInput, Profile},
    services::search::{filter_by, SearchText},
};
use chrono::Local;
use sqlx::SqlitePool;

const ALUMNO_COLUMNS: &str = "id, matricula, first_name, last_name, email, phone, address, profile, \
     fingerprint, photo, registration_date, is_active";

// Campos já validados, prontos a gravar
struct ValidAlumno {
    matricula: i64,
    first_name: String,
    last_name: String,
    email: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    profile: String,
    is_active: bool,
}

fn optional(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Lista os alunos; `search` procura (sem distinguir maiúsculas) na matrícula,
/// perfil, nome, apelidos, email, telefone e morada.
pub async fn find_all_alumnos(db_pool: &SqlitePool, search: Option<&str>) -> AppResult<Vec<Alumno>> {
    let search = SearchText::parse(search);
    tracing::debug!("Buscando alunos (filtro: {:?})...", search);

    let sql = format!(
        "SELECT {} FROM alumnos ORDER BY last_name ASC, first_name ASC",
        ALUMNO_COLUMNS
    );
    let alumnos = sqlx::query_as::<_, Alumno>(&sql).fetch_all(db_pool).await?;

    Ok(filter_by(alumnos, search.as_ref(), |search, a| {
        let matricula = a.matricula.to_string();
        search.matches([
            Some(matricula.as_str()),
            a.profile.as_deref(),
            Some(a.first_name.as_str()),
            Some(a.last_name.as_str()),
            a.email.as_deref(),
            a.phone.as_deref(),
            a.address.as_deref(),
        ])
    }))
}

pub async fn find_alumno_by_id(db_pool: &SqlitePool, id: i64) -> AppResult<Option<Alumno>> {
    let sql = format!("SELECT {} FROM alumnos WHERE id = ?1", ALUMNO_COLUMNS);
    let alumno = sqlx::query_as::<_, Alumno>(&sql)
        .bind(id)
        .fetch_optional(db_pool)
        .await?;
    Ok(alumno)
}

pub async fn find_alumno_by_matricula(db_pool: &SqlitePool, matricula: i64) -> AppResult<Option<Alumno>> {
    let sql = format!(
        "SELECT {} FROM alumnos WHERE matricula = ?1 ORDER BY id ASC LIMIT 1",
        ALUMNO_COLUMNS
    );
    let alumno = sqlx::query_as::<_, Alumno>(&sql)
        .bind(matricula)
        .fetch_optional(db_pool)
        .await?;
    Ok(alumno)
}

/// A matrícula já está usada por outro aluno (ignorando `ignore_id`)?
pub async fn exists_matricula(db_pool: &SqlitePool, matricula: i64, ignore_id: Option<i64>) -> AppResult<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM alumnos WHERE matricula = ?1 AND (?2 IS NULL OR id <> ?2)",
    )
    .bind(matricula)
    .bind(ignore_id)
    .fetch_one(db_pool)
    .await?;
    Ok(count > 0)
}

/// Perfis ativos, por nome.
pub async fn get_profiles(db_pool: &SqlitePool) -> AppResult<Vec<Profile>> {
    let profiles = sqlx::query_as::<_, Profile>(
        "SELECT id, profile_name, is_active FROM profiles WHERE is_active = 1 ORDER BY profile_name ASC",
    )
    .fetch_all(db_pool)
    .await?;
    Ok(profiles)
}

async fn validate(db_pool: &SqlitePool, input: &AlumnoInput, ignore_id: Option<i64>) -> AppResult<ValidAlumno> {
    let matricula = parse_matricula(&input.matricula)?;

    let first_name = input.first_name.trim();
    let last_name = input.last_name.trim();
    if first_name.is_empty() || last_name.is_empty() {
        return Err(AppError::Validation("Nombre y apellidos son obligatorios.".to_string()));
    }

    let profile = input.profile.trim();
    let profiles = get_profiles(db_pool).await?;
    if !profiles.iter().any(|p| p.profile_name == profile) {
        return Err(AppError::Validation("Selecciona un perfil válido.".to_string()));
    }

    if exists_matricula(db_pool, matricula, ignore_id).await? {
        return Err(AppError::Validation(format!("La matrícula {} ya está registrada.", matricula)));
    }

    Ok(ValidAlumno {
        matricula,
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        email: optional(&input.email),
        phone: optional(&input.phone),
        address: optional(&input.address),
        profile: profile.to_string(),
        is_active: input.is_active,
    })
}

pub async fn create_alumno(db_pool: &SqlitePool, input: &AlumnoInput) -> AppResult<i64> {
    let alumno = validate(db_pool, input, None).await?;

    let id = sqlx::query(
        r#"
        INSERT INTO alumnos
            (matricula, first_name, last_name, email, phone, address, profile, registration_date, is_active)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(alumno.matricula)
    .bind(&alumno.first_name)
    .bind(&alumno.last_name)
    .bind(&alumno.email)
    .bind(&alumno.phone)
    .bind(&alumno.address)
    .bind(&alumno.profile)
    .bind(Local::now().naive_local())
    .bind(alumno.is_active)
    .execute(db_pool)
    .await?
    .last_insert_rowid();

    tracing::info!("✅ Aluno {} criado (matrícula {}).", id, alumno.matricula);
    Ok(id)
}

pub async fn update_alumno(db_pool: &SqlitePool, id: i64, input: &AlumnoInput) -> AppResult<()> {
    if find_alumno_by_id(db_pool, id).await?.is_none() {
        return Err(AppError::NotFound("Alumno no encontrado.".to_string()));
    }
    let alumno = validate(db_pool, input, Some(id)).await?;

    sqlx::query(
        r#"
        UPDATE alumnos
        SET matricula = ?1, first_name = ?2, last_name = ?3, email = ?4,
            phone = ?5, address = ?6, profile = ?7, is_active = ?8
        WHERE id = ?9
        "#,
    )
    .bind(alumno.matricula)
    .bind(&alumno.first_name)
    .bind(&alumno.last_name)
    .bind(&alumno.email)
    .bind(&alumno.phone)
    .bind(&alumno.address)
    .bind(&alumno.profile)
    .bind(alumno.is_active)
    .bind(id)
    .execute(db_pool)
    .await?;

    tracing::info!("✅ Aluno {} atualizado.", id);
    Ok(())
}

/// Apaga um aluno sem histórico. Com registos de assistência é recusado.
pub async fn delete_alumno(db_pool: &SqlitePool, id: i64) -> AppResult<()> {
    let records: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attendance_records WHERE alumno_id = ?1")
        .bind(id)
        .fetch_one(db_pool)
        .await?;
    if records > 0 {
        tracing::warn!("Aluno {} tem {} registos; não será apagado.", id, records);
        return Err(AppError::Validation(
            "El alumno tiene registros de asistencia. Desactívalo en lugar de eliminarlo.".to_string(),
        ));
    }

    let rows = sqlx::query("DELETE FROM alumnos WHERE id = ?1")
        .bind(id)
        .execute(db_pool)
        .await?
        .rows_affected();
    if rows == 0 {
        return Err(AppError::NotFound("Alumno no encontrado.".to_string()));
    }
    tracing::info!("🗑️ Aluno {} apagado.", id);
    Ok(())
}

/// Grava (ou limpa, com `None`) a plantilla de huella do aluno.
pub async fn set_fingerprint(db_pool: &SqlitePool, id: i64, template: Option<&[u8]>) -> AppResult<()> {
    let rows = sqlx::query("UPDATE alumnos SET fingerprint = ?1 WHERE id = ?2")
        .bind(template)
        .bind(id)
        .execute(db_pool)
        .await?
        .rows_affected();
    if rows == 0 {
        return Err(AppError::NotFound("Alumno no encontrado.".to_string()));
    }
    tracing::info!("🖐️ Huella do aluno {} {}.", id, if template.is_some() { "gravada" } else { "removida" });
    Ok(())
}

pub async fn set_photo(db_pool: &SqlitePool, id: i64, photo: Option<&[u8]>) -> AppResult<()> {
    let rows = sqlx::query("UPDATE alumnos SET photo = ?1 WHERE id = ?2")
        .bind(photo)
        .bind(id)
        .execute(db_pool)
        .await?
        .rows_affected();
    if rows == 0 {
        return Err(AppError::NotFound("Alumno no encontrado.".to_string()));
    }
    Ok(())
}

/// Alunos com plantilla, lidos de novo a cada chamada (sem cache).
pub async fn roster_snapshot(db_pool: &SqlitePool) -> AppResult<Vec<Alumno>> {
    let sql = format!(
        "SELECT {} FROM alumnos WHERE fingerprint IS NOT NULL AND length(fingerprint) > 0 ORDER BY id ASC",
        ALUMNO_COLUMNS
    );
    let sql = sql.as_str();
    with_read_retry("roster", || async move {
        sqlx::query_as::<_, Alumno>(sql)
            .fetch_all(db_pool)
            .await
            .map_err(AppError::from)
    })
    .await
}

#[cfg(test)]
pub(crate) fn sample_input(matricula: &str, first_name: &str) -> AlumnoInput {
    AlumnoInput {
        matricula: matricula.to_string(),
        first_name: first_name.to_string(),
        last_name: "Pérez".to_string(),
        email: String::new(),
        phone: "555-0101".to_string(),
        address: String::new(),
        profile: "Licenciatura".to_string(),
        is_active: true,
    }
}
