// src/services/attendance_service.rs
use crate::{
    db::with_read_retry,
    error::{AppError, AppResult},
    models::attendance::{AttendanceRecord, CheckInResult, FeedbackCue, ReportFilter, ReportItem},
    services::{
        alumno_service,
        search::{filter_by, SearchText},
    },
};
use chrono::{Days, Local, NaiveDateTime, NaiveTime};
use sqlx::SqlitePool;

/// Acrescenta um registo com a hora atual. Devolve o id e a hora atribuída.
pub async fn add_attendance_record(
    db_pool: &SqlitePool,
    alumno_id: i64,
    record_type: &str,
) -> AppResult<(i64, NaiveDateTime)> {
    let timestamp = Local::now().naive_local();

    let id = sqlx::query("INSERT INTO attendance_records (alumno_id, type, timestamp) VALUES (?1, ?2, ?3)")
        .bind(alumno_id)
        .bind(record_type)
        .bind(timestamp)
        .execute(db_pool)
        .await?
        .last_insert_rowid();

    tracing::info!("📝 Registo {} ({}) para aluno {}.", id, record_type, alumno_id);
    Ok((id, timestamp))
}

/// Últimos registos de um aluno, do mais recente para o mais antigo.
pub async fn get_alumno_history(db_pool: &SqlitePool, alumno_id: i64, limit: i64) -> AppResult<Vec<AttendanceRecord>> {
    let records = sqlx::query_as::<_, AttendanceRecord>(
        r#"
        SELECT id, alumno_id, type AS record_type, timestamp
        FROM attendance_records
        WHERE alumno_id = ?1
        ORDER BY timestamp DESC, id DESC
        LIMIT ?2
        "#,
    )
    .bind(alumno_id)
    .bind(limit)
    .fetch_all(db_pool)
    .await?;
    Ok(records)
}

/// Relatório filtrado por intervalo de datas e texto livre, mais recente primeiro.
pub async fn get_attendance_records(db_pool: &SqlitePool, filter: &ReportFilter) -> AppResult<Vec<ReportItem>> {
    let from: Option<NaiveDateTime> = filter.start.map(|d| d.and_time(NaiveTime::MIN));
    // Fim inclusivo: tudo antes da meia-noite do dia seguinte
    let until: Option<NaiveDateTime> = filter
        .end
        .and_then(|d| d.checked_add_days(Days::new(1)))
        .map(|d| d.and_time(NaiveTime::MIN));
    let search = SearchText::parse(filter.search.as_deref());

    tracing::debug!("Relatório: desde {:?} até {:?}, filtro {:?}", from, until, search);

    let sql = r#"
        SELECT r.timestamp, r.type AS record_type, a.matricula, a.profile,
               a.first_name, a.last_name, a.phone, a.email
        FROM attendance_records r
        JOIN alumnos a ON a.id = r.alumno_id
        WHERE (?1 IS NULL OR r.timestamp >= ?1)
          AND (?2 IS NULL OR r.timestamp < ?2)
        ORDER BY r.timestamp DESC, r.id DESC
    "#;

    let items = with_read_retry("relatório", || async move {
        sqlx::query_as::<_, ReportItem>(sql)
            .bind(from)
            .bind(until)
            .fetch_all(db_pool)
            .await
            .map_err(AppError::from)
    })
    .await?;

    Ok(filter_by(items, search.as_ref(), |search, item| {
        let matricula = item.matricula.to_string();
        search.matches([
            Some(item.first_name.as_str()),
            Some(item.last_name.as_str()),
            item.email.as_deref(),
            item.phone.as_deref(),
            item.profile.as_deref(),
            Some(matricula.as_str()),
        ])
    }))
}

/// Passo comum a entrada manual e identificação por huella: valida o aluno e
/// acrescenta o registo. Nunca escreve nada se o aluno não existir ou estiver inativo.
pub async fn record_check_in(
    db_pool: &SqlitePool,
    matricula: i64,
    record_type: &str,
    score: Option<i32>,
) -> AppResult<CheckInResult> {
    let alumno = match alumno_service::find_alumno_by_matricula(db_pool, matricula).await? {
        Some(alumno) if alumno.is_active => alumno,
        Some(alumno) => {
            tracing::warn!("Check-in recusado: aluno {} inativo.", alumno.id);
            return Ok(CheckInResult::failure(format!(
                "{} está inactivo. No se registró asistencia.",
                alumno.full_name()
            )));
        }
        None => {
            tracing::warn!("Check-in recusado: matrícula {} não encontrada.", matricula);
            return Ok(CheckInResult::failure(format!("Matrícula {} no encontrada.", matricula)));
        }
    };

    let (record_id, timestamp) = add_attendance_record(db_pool, alumno.id, record_type).await?;

    Ok(CheckInResult {
        success: true,
        message: format!("Asistencia registrada: {}.", alumno.full_name()),
        alumno: Some(alumno.summary()),
        record_id: Some(record_id),
        timestamp: Some(timestamp.format("%Y-%m-%d %H:%M:%S").to_string()),
        score,
        cue: FeedbackCue::Success,
    })
}
