// src/state.rs
use crate::{
    checkin::{CheckInStation, StationSettings},
    config::AppConfig,
    fingerprint::{build_device, simulated::SimulatedReader, FingerprintDevice},
};
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub config: Arc<AppConfig>,
    // Único dono do leitor; todas as operações passam por aqui
    pub device: Arc<FingerprintDevice>,
    pub station: Arc<CheckInStation>,
    // Só existe com FINGERPRINT_DEVICE=simulado
    pub simulator: Option<SimulatedReader>,
}

// Permite extrair o pool da DB diretamente
impl axum::extract::FromRef<AppState> for SqlitePool {
    fn from_ref(state: &AppState) -> SqlitePool {
        state.db_pool.clone()
    }
}

impl axum::extract::FromRef<AppState> for Arc<CheckInStation> {
    fn from_ref(state: &AppState) -> Arc<CheckInStation> {
        state.station.clone()
    }
}

impl AppState {
    /// Monta o leitor e a estação do checador a partir da configuração.
    pub fn new(db_pool: SqlitePool, config: AppConfig) -> Self {
        let (device, simulator) = build_device(&config.fingerprint);
        let device = Arc::new(device);
        let station = CheckInStation::new(
            db_pool.clone(),
            device.clone(),
            StationSettings::from_config(&config),
        );
        AppState {
            db_pool,
            config: Arc::new(config),
            device,
            station,
            simulator,
        }
    }
}

/// Estado com base em memória e leitor simulado.
#[cfg(test)]
pub(crate) async fn test_state() -> AppState {
    let config = AppConfig::from_lookup(|key| match key {
        "DATABASE_URL" => Some("sqlite::memory:".to_string()),
        "FINGERPRINT_TIMEOUT_MS" => Some("300".to_string()),
        "FINGERPRINT_POLL_MS" => Some("20".to_string()),
        _ => None,
    })
    .expect("configuração de teste");
    AppState::new(crate::db::test_pool().await, config)
}
