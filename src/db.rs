// src/db.rs
use crate::{
    error::AppResult,
    models::{permissions::DEFINED_ROLES, user::UserInput},
    services::user_service,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::future::Future;
use std::str::FromStr;
use std::time::Duration; // Usar std::time::Duration aqui

/// Perfis de aluno semeados no arranque.
pub const SEED_PROFILES: &[&str] = &[
    "Servicio Social",
    "Residencia",
    "Dual",
    "Estancia",
    "Educación Media Superior",
    "Licenciatura",
    "Maestria",
    "Invitado",
    "Doctorado",
];

const READ_ATTEMPTS: u32 = 3;
const READ_BACKOFF: Duration = Duration::from_millis(50);

pub async fn create_db_pool(database_url: &str) -> AppResult<SqlitePool> {
    tracing::info!("Ligando à base de dados: {}", database_url);

    // Opções de conexão (criar se não existir, timeout, chaves estrangeiras)
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    tracing::info!("Executando migrações da base de dados...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Migrações concluídas.");

    Ok(pool)
}

/// Garante colunas e tabelas opcionais, sementes e o utilizador inicial.
/// Pode correr em cada arranque.
pub async fn ensure_schema(pool: &SqlitePool, admin_initial_password: &str) -> AppResult<()> {
    heal_columns(pool).await?;
    seed_catalogs(pool).await?;
    bootstrap_admin(pool, admin_initial_password).await?;
    Ok(())
}

// Bases antigas podem não ter a foto, o perfil ou a tabela de perfis
async fn heal_columns(pool: &SqlitePool) -> AppResult<()> {
    let columns: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info('alumnos')")
        .fetch_all(pool)
        .await?;

    let has = |name: &str| columns.iter().any(|c| c.eq_ignore_ascii_case(name));

    if !has("photo") {
        tracing::info!("🩹 Adicionando coluna alumnos.photo");
        sqlx::query("ALTER TABLE alumnos ADD COLUMN photo BLOB")
            .execute(pool)
            .await?;
    }
    if !has("profile") {
        tracing::info!("🩹 Adicionando coluna alumnos.profile");
        sqlx::query("ALTER TABLE alumnos ADD COLUMN profile TEXT")
            .execute(pool)
            .await?;
    }

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS profiles (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            profile_name TEXT    NOT NULL UNIQUE,
            is_active    INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Semeia perfis e roles (upsert: não duplica nem reativa).
pub async fn seed_catalogs(pool: &SqlitePool) -> AppResult<()> {
    let mut tx = pool.begin().await?;

    for profile in SEED_PROFILES {
        sqlx::query("INSERT OR IGNORE INTO profiles (profile_name, is_active) VALUES (?1, 1)")
            .bind(*profile)
            .execute(&mut *tx)
            .await?;
    }

    for role in DEFINED_ROLES {
        sqlx::query("INSERT OR IGNORE INTO roles (role_name) VALUES (?1)")
            .bind(*role)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    tracing::debug!("Perfis e roles semeados.");
    Ok(())
}

// Só quando ainda não existe nenhum utilizador
async fn bootstrap_admin(pool: &SqlitePool, password: &str) -> AppResult<()> {
    let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    if users > 0 {
        return Ok(());
    }

    let input = UserInput {
        username: "admin".to_string(),
        email: None,
        password: password.to_string(),
        is_active: true,
        roles: DEFINED_ROLES.iter().map(|r| r.to_string()).collect(),
    };
    user_service::create_user(pool, &input).await?;
    tracing::warn!("👤 Utilizador inicial 'admin' criado. Altere a password depois do primeiro login.");
    Ok(())
}

/// Repete uma leitura enquanto falhar com um erro transitório do SQLite.
/// Escritas nunca devem passar por aqui.
pub async fn with_read_retry<T, F, Fut>(label: &str, mut op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_transient() && attempt < READ_ATTEMPTS => {
                tracing::warn!("Leitura '{}' falhou (tentativa {}): {}. Repetindo...", label, attempt, e);
                tokio::time::sleep(READ_BACKOFF * attempt).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Pool em memória com as migrações e os catálogos aplicados.
#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("pool em memória");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrações");
    seed_catalogs(&pool).await.expect("sementes");
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let pool = test_pool().await;
        seed_catalogs(&pool).await.unwrap();
        seed_catalogs(&pool).await.unwrap();

        let profiles: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM profiles")
            .fetch_one(&pool)
            .await
            .unwrap();
        let roles: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM roles")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(profiles, SEED_PROFILES.len() as i64);
        assert_eq!(roles, DEFINED_ROLES.len() as i64);
    }

    #[tokio::test]
    async fn schema_heals_missing_columns_and_profiles_table() {
        let pool = test_pool().await;
        sqlx::query("ALTER TABLE alumnos DROP COLUMN photo").execute(&pool).await.unwrap();
        sqlx::query("DROP TABLE profiles").execute(&pool).await.unwrap();

        heal_columns(&pool).await.unwrap();
        seed_catalogs(&pool).await.unwrap();
        heal_columns(&pool).await.unwrap();

        let columns: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info('alumnos')")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert!(columns.iter().any(|c| c == "photo"));
        assert!(columns.iter().any(|c| c == "profile"));

        let profiles: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM profiles")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(profiles, SEED_PROFILES.len() as i64);
    }

    #[tokio::test]
    async fn admin_is_bootstrapped_only_once() {
        let pool = test_pool().await;
        ensure_schema(&pool, "secreto").await.unwrap();
        ensure_schema(&pool, "outro").await.unwrap();

        let users = user_service::find_all_users(&pool, None).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].user.username, "admin");
        assert_eq!(users[0].roles.len(), DEFINED_ROLES.len());
    }

    #[tokio::test]
    async fn read_retry_recovers_from_transient_failures() {
        let calls = AtomicU32::new(0);
        let value = with_read_retry("teste", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(AppError::SqlxError(sqlx::Error::PoolTimedOut))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn read_retry_gives_up_after_three_attempts() {
        let calls = AtomicU32::new(0);
        let result: AppResult<()> = with_read_retry("teste", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::SqlxError(sqlx::Error::PoolTimedOut)) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn read_retry_does_not_repeat_permanent_errors() {
        let calls = AtomicU32::new(0);
        let result: AppResult<()> = with_read_retry("teste", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::NotFound("x".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
