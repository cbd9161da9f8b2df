// src/models/mod.rs
pub mod alumno;
pub mod attendance;
pub mod permissions;
pub mod user;
