// src/services/user_service.rs
use crate::{
    error::{AppError, AppResult},
    models::{
        permissions::Capabilities,
        user::{User, UserInput, UserWithRoles},
    },
    services::search::{filter_by, SearchText},
};
use chrono::Local;
use sqlx::{SqliteConnection, SqlitePool};

const USER_COLUMNS: &str = "id, username, email, password_hash, registration_date, is_active";

/// Todas as roles conhecidas, pela ordem de criação.
pub async fn get_roles(db_pool: &SqlitePool) -> AppResult<Vec<String>> {
    let roles = sqlx::query_scalar("SELECT role_name FROM roles ORDER BY id ASC")
        .fetch_all(db_pool)
        .await?;
    Ok(roles)
}

/// Busca as roles de um utilizador específico.
pub async fn get_user_roles(db_pool: &SqlitePool, user_id: i64) -> AppResult<Vec<String>> {
    tracing::debug!("Buscando roles para user ID: {}", user_id);
    let roles: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT r.role_name
        FROM user_roles ur
        JOIN roles r ON r.id = ur.role_id
        WHERE ur.user_id = ?1
        ORDER BY r.id ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(db_pool)
    .await?;

    tracing::debug!("Roles encontradas para {}: {:?}", user_id, roles);
    Ok(roles)
}

pub async fn get_user_capabilities(db_pool: &SqlitePool, user_id: i64) -> AppResult<Capabilities> {
    let roles = get_user_roles(db_pool, user_id).await?;
    Ok(Capabilities::from_roles(&roles))
}

/// Lista os utilizadores com as suas roles; `search` filtra por nome ou email.
pub async fn find_all_users(db_pool: &SqlitePool, search: Option<&str>) -> AppResult<Vec<UserWithRoles>> {
    let search = SearchText::parse(search);
    tracing::debug!("Buscando utilizadores (filtro: {:?})...", search);

    let sql = format!("SELECT {} FROM users ORDER BY username ASC", USER_COLUMNS);
    let users = sqlx::query_as::<_, User>(&sql).fetch_all(db_pool).await?;
    let users = filter_by(users, search.as_ref(), |search, u| {
        search.matches([Some(u.username.as_str()), u.email.as_deref()])
    });

    let mut result = Vec::with_capacity(users.len());
    for user in users {
        let roles = get_user_roles(db_pool, user.id).await?;
        result.push(UserWithRoles { user, roles });
    }
    tracing::debug!("Encontrados {} utilizadores.", result.len());
    Ok(result)
}

pub async fn find_user_by_id(db_pool: &SqlitePool, user_id: i64) -> AppResult<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
    let user = sqlx::query_as::<_, User>(&sql)
        .bind(user_id)
        .fetch_optional(db_pool)
        .await?;
    Ok(user)
}

/// A coluna `username` é COLLATE NOCASE: a comparação ignora maiúsculas.
pub async fn find_user_by_username(db_pool: &SqlitePool, username: &str) -> AppResult<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS);
    let user = sqlx::query_as::<_, User>(&sql)
        .bind(username.trim())
        .fetch_optional(db_pool)
        .await?;
    Ok(user)
}

async fn username_taken(db_pool: &SqlitePool, username: &str, ignore_id: Option<i64>) -> AppResult<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM users WHERE username = ?1 AND (?2 IS NULL OR id <> ?2)",
    )
    .bind(username)
    .bind(ignore_id)
    .fetch_one(db_pool)
    .await?;
    Ok(count > 0)
}

fn normalized_roles(roles: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for role in roles.iter().map(|r| r.trim()).filter(|r| !r.is_empty()) {
        if !out.iter().any(|r| r.eq_ignore_ascii_case(role)) {
            out.push(role.to_string());
        }
    }
    out
}

async fn validate(db_pool: &SqlitePool, input: &UserInput, ignore_id: Option<i64>) -> AppResult<()> {
    let username = input.username.trim();
    if username.is_empty() {
        return Err(AppError::Validation("El usuario es obligatorio.".to_string()));
    }
    if ignore_id.is_none() && input.password.is_empty() {
        return Err(AppError::Validation("La contraseña es obligatoria.".to_string()));
    }
    if normalized_roles(&input.roles).is_empty() {
        return Err(AppError::Validation("Selecciona al menos un rol.".to_string()));
    }
    if username_taken(db_pool, username, ignore_id).await? {
        return Err(AppError::Validation(format!("El usuario '{}' ya existe.", username)));
    }
    Ok(())
}

fn clean_email(email: &Option<String>) -> Option<String> {
    email.as_deref().map(str::trim).filter(|e| !e.is_empty()).map(str::to_string)
}

pub async fn create_user(db_pool: &SqlitePool, input: &UserInput) -> AppResult<i64> {
    tracing::info!("Tentando criar utilizador: {}", input.username);
    validate(db_pool, input, None).await?;

    let password_hash = crate::services::auth_service::hash_password(&input.password).await?;

    let mut tx = db_pool.begin().await?;

    let user_id = sqlx::query(
        r#"
        INSERT INTO users (username, email, password_hash, registration_date, is_active)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(input.username.trim())
    .bind(clean_email(&input.email))
    .bind(&password_hash)
    .bind(Local::now().naive_local())
    .bind(input.is_active)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    set_user_roles(&mut tx, user_id, &input.roles).await?;

    tx.commit().await?;
    tracing::info!("✅ Utilizador '{}' criado com sucesso (id {}).", input.username, user_id);
    Ok(user_id)
}

/// Atualiza dados e roles. Password vazia mantém o hash guardado.
pub async fn update_user(db_pool: &SqlitePool, user_id: i64, input: &UserInput) -> AppResult<()> {
    tracing::info!("Atualizando dados para user: {}", user_id);
    if find_user_by_id(db_pool, user_id).await?.is_none() {
        return Err(AppError::NotFound("Usuario no encontrado.".to_string()));
    }
    validate(db_pool, input, Some(user_id)).await?;

    let new_hash = if input.password.is_empty() {
        None
    } else {
        Some(crate::services::auth_service::hash_password(&input.password).await?)
    };

    let mut tx = db_pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE users
        SET username = ?1,
            email = ?2,
            is_active = ?3,
            password_hash = COALESCE(?4, password_hash)
        WHERE id = ?5
        "#,
    )
    .bind(input.username.trim())
    .bind(clean_email(&input.email))
    .bind(input.is_active)
    .bind(new_hash)
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    set_user_roles(&mut tx, user_id, &input.roles).await?;

    tx.commit().await?;
    tracing::info!("✅ Dados atualizados com sucesso para user: {}", user_id);
    Ok(())
}

pub async fn delete_user(db_pool: &SqlitePool, user_id: i64) -> AppResult<()> {
    let rows_affected = sqlx::query("DELETE FROM users WHERE id = ?1")
        .bind(user_id)
        .execute(db_pool)
        .await?
        .rows_affected();

    if rows_affected == 0 {
        tracing::warn!("Falha ao apagar: utilizador '{}' não encontrado.", user_id);
        return Err(AppError::NotFound("Usuario no encontrado.".to_string()));
    }
    tracing::info!("🗑️ Utilizador {} apagado.", user_id);
    Ok(())
}

// Substitui as roles do utilizador; roles desconhecidas são criadas
async fn set_user_roles(conn: &mut SqliteConnection, user_id: i64, roles: &[String]) -> AppResult<()> {
    sqlx::query("DELETE FROM user_roles WHERE user_id = ?1")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    for role in normalized_roles(roles) {
        sqlx::query("INSERT OR IGNORE INTO roles (role_name) VALUES (?1)")
            .bind(&role)
            .execute(&mut *conn)
            .await?;
        // role_name é NOCASE: 'checador' encontra 'Checador'
        sqlx::query(
            "INSERT OR IGNORE INTO user_roles (user_id, role_id) SELECT ?1, id FROM roles WHERE role_name = ?2",
        )
        .bind(user_id)
        .bind(&role)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::test_pool, services::auth_service};

    fn input(username: &str, roles: &[&str]) -> UserInput {
        UserInput {
            username: username.to_string(),
            email: Some("  ".to_string()),
            password: "clave123".to_string(),
            is_active: true,
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn create_validates_required_fields() {
        let pool = test_pool().await;

        let mut no_name = input(" ", &["Checador"]);
        no_name.username = " ".into();
        assert!(matches!(create_user(&pool, &no_name).await, Err(AppError::Validation(_))));

        let mut no_password = input("ana", &["Checador"]);
        no_password.password.clear();
        assert!(matches!(create_user(&pool, &no_password).await, Err(AppError::Validation(_))));

        let no_roles = input("ana", &["  "]);
        let err = create_user(&pool, &no_roles).await.unwrap_err();
        assert_eq!(err.to_string(), "Selecciona al menos un rol.");

        assert!(find_all_users(&pool, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn usernames_are_unique_ignoring_case() {
        let pool = test_pool().await;
        create_user(&pool, &input("Ana", &["Checador"])).await.unwrap();
        let err = create_user(&pool, &input("ana", &["Reportes"])).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(find_all_users(&pool, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn roles_are_deduplicated_and_created_on_demand() {
        let pool = test_pool().await;
        let id = create_user(&pool, &input("ana", &["checador", "Checador", "Supervisor"]))
            .await
            .unwrap();

        let roles = get_user_roles(&pool, id).await.unwrap();
        assert_eq!(roles, vec!["Checador".to_string(), "Supervisor".to_string()]);
        assert!(get_roles(&pool).await.unwrap().contains(&"Supervisor".to_string()));
        assert_eq!(get_user_capabilities(&pool, id).await.unwrap(), Capabilities::CHECADOR);
    }

    #[tokio::test]
    async fn blank_password_on_edit_keeps_the_hash() {
        let pool = test_pool().await;
        let id = create_user(&pool, &input("ana", &["Checador"])).await.unwrap();
        let before = find_user_by_id(&pool, id).await.unwrap().unwrap();

        let mut edit = input("ana.maria", &["Reportes"]);
        edit.password.clear();
        edit.email = Some("ana@escuela.mx".into());
        update_user(&pool, id, &edit).await.unwrap();

        let after = find_user_by_id(&pool, id).await.unwrap().unwrap();
        assert_eq!(after.username, "ana.maria");
        assert_eq!(after.email.as_deref(), Some("ana@escuela.mx"));
        assert_eq!(after.password_hash, before.password_hash);
        assert_eq!(get_user_roles(&pool, id).await.unwrap(), vec!["Reportes".to_string()]);

        edit.password = "nueva".into();
        update_user(&pool, id, &edit).await.unwrap();
        let changed = find_user_by_id(&pool, id).await.unwrap().unwrap();
        assert!(auth_service::verify_password("nueva", &changed.password_hash).await.unwrap());
    }

    #[tokio::test]
    async fn editing_keeps_own_username_but_rejects_anothers() {
        let pool = test_pool().await;
        let ana = create_user(&pool, &input("ana", &["Checador"])).await.unwrap();
        create_user(&pool, &input("beto", &["Checador"])).await.unwrap();

        assert!(update_user(&pool, ana, &input("ANA", &["Checador"])).await.is_ok());
        assert!(matches!(
            update_user(&pool, ana, &input("Beto", &["Checador"])).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn search_and_delete() {
        let pool = test_pool().await;
        let id = create_user(&pool, &input("ana", &["Checador"])).await.unwrap();
        create_user(&pool, &input("beto", &["Checador"])).await.unwrap();

        let found = find_all_users(&pool, Some("AN")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].user.email, None);

        delete_user(&pool, id).await.unwrap();
        assert!(find_user_by_id(&pool, id).await.unwrap().is_none());
        assert!(get_user_roles(&pool, id).await.unwrap().is_empty());
        assert!(matches!(delete_user(&pool, id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn update_replaces_the_role_set() {
        let pool = test_pool().await;
        let id = create_user(&pool, &input("ana", &["Checador"])).await.unwrap();
        let mut edited = input("ana", &["Alumnos", "Reportes"]);
        edited.password = String::new();
        update_user(&pool, id, &edited).await.unwrap();
        let caps = get_user_capabilities(&pool, id).await.unwrap();
        assert_eq!(caps, Capabilities::ALUMNOS | Capabilities::REPORTES);
    }
}
