// src/services/mod.rs
pub mod alumno_service;
pub mod attendance_service;
pub mod auth_service;
pub mod export_service;
pub mod search;
pub mod user_service;
