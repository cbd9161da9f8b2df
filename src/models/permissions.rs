// src/models/permissions.rs
//! Capacidades derivadas das roles de um utilizador.
//!
//! A visibilidade das secções do menu e o acesso às rotas dependem só deste
//! conjunto; o mapeamento role → capacidades vive numa única tabela.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        /// Gestão de utilizadores
        const USUARIOS = 1 << 0;
        /// Gestão de alunos e registo de huellas
        const ALUMNOS  = 1 << 1;
        /// Estação de registo de assistência
        const CHECADOR = 1 << 2;
        /// Relatórios e exportação
        const REPORTES = 1 << 3;
    }
}

/// Roles semeadas na base de dados, pela ordem em que aparecem nos formulários.
pub const DEFINED_ROLES: &[&str] = &["Usuarios", "Alumnos", "Checador", "Reportes"];

const ROLE_TABLE: &[(&str, Capabilities)] = &[
    ("Usuarios", Capabilities::USUARIOS),
    ("Alumnos", Capabilities::ALUMNOS),
    ("Checador", Capabilities::CHECADOR),
    ("Reportes", Capabilities::REPORTES),
    // Nome antigo da secção de alunos
    ("Empleados", Capabilities::ALUMNOS),
    ("Admin", Capabilities::all()),
];

impl Capabilities {
    pub fn for_role(role: &str) -> Capabilities {
        let role = role.trim();
        ROLE_TABLE
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(role))
            .map(|(_, caps)| *caps)
            .unwrap_or_else(Capabilities::empty)
    }

    pub fn from_roles<I, S>(roles: I) -> Capabilities
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        roles
            .into_iter()
            .fold(Capabilities::empty(), |acc, role| acc | Capabilities::for_role(role.as_ref()))
    }

    pub fn label(self) -> &'static str {
        if self == Capabilities::USUARIOS {
            "Usuarios"
        } else if self == Capabilities::ALUMNOS {
            "Alumnos"
        } else if self == Capabilities::CHECADOR {
            "Checador"
        } else if self == Capabilities::REPORTES {
            "Reportes"
        } else {
            "Varios"
        }
    }
}
