// src/models/user.rs
use chrono::NaiveDateTime;
use serde::Deserialize;
use sqlx::FromRow;

// Representa um utilizador lido da tabela 'users'
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub registration_date: NaiveDateTime,
    pub is_active: bool,
}

/// Utilizador com as suas roles, para listagens e exportação.
#[derive(Debug, Clone)]
pub struct UserWithRoles {
    pub user: User,
    pub roles: Vec<String>,
}

impl UserWithRoles {
    pub fn roles_label(&self) -> String {
        self.roles.join(", ")
    }
}

// Struct para dados do formulário de login
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Dados de criação/edição de um utilizador.
/// Na edição, uma password vazia mantém o hash guardado.
#[derive(Debug, Clone, Default)]
pub struct UserInput {
    pub username: String,
    pub email: Option<String>,
    pub password: String,
    pub is_active: bool,
    pub roles: Vec<String>,
}
