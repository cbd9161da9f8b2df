// src/config.rs
use crate::error::{AppError, AppResult};
use std::{env, net::SocketAddr, str::FromStr, time::Duration};

/// Que leitor de impressões digitais usar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// Leitor em processo, alimentado pela página do checador (desenvolvimento e testes)
    Simulated,
    /// Nenhum leitor ligado: as operações biométricas falham com "sem dispositivo"
    None,
}

impl FromStr for DeviceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulado" | "simulated" => Ok(DeviceKind::Simulated),
            "ninguno" | "none" => Ok(DeviceKind::None),
            other => Err(format!("dispositivo desconhecido '{}'", other)),
        }
    }
}

/// Estratégia de identificação 1:N.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    /// Compara a amostra com cada plantilla, uma a uma, e fica com o melhor score
    Pairwise,
    /// Carrega as plantillas no índice interno do SDK e pede-lhe a identificação
    BulkIndex,
}

impl FromStr for MatchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pareado" | "pairwise" => Ok(MatchStrategy::Pairwise),
            "indice" | "índice" | "bulk" => Ok(MatchStrategy::BulkIndex),
            other => Err(format!("estratégia desconhecida '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FingerprintSettings {
    pub device: DeviceKind,
    pub capture_timeout: Duration,
    pub poll_interval: Duration,
    pub min_score: i32,
    pub strategy: MatchStrategy,
}

#[derive(Debug, Clone)]
pub struct CheckInSettings {
    pub reset_delay: Duration,
    pub type_label: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub fingerprint: FingerprintSettings,
    pub checkin: CheckInSettings,
    pub admin_initial_password: String,
}

impl AppConfig {
    /// Lê a configuração das variáveis de ambiente (o `.env` já deve ter sido carregado).
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Variante testável: recebe a função de leitura de variáveis.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| AppError::Config("DATABASE_URL não definida".to_string()))?;

        let fingerprint = FingerprintSettings {
            device: parse_or(&lookup, "FINGERPRINT_DEVICE", DeviceKind::Simulated)?,
            capture_timeout: Duration::from_millis(parse_or(&lookup, "FINGERPRINT_TIMEOUT_MS", 15_000u64)?),
            poll_interval: Duration::from_millis(parse_or(&lookup, "FINGERPRINT_POLL_MS", 120u64)?),
            min_score: parse_or(&lookup, "FINGERPRINT_MIN_SCORE", 60i32)?,
            strategy: parse_or(&lookup, "FINGERPRINT_STRATEGY", MatchStrategy::Pairwise)?,
        };
        if fingerprint.poll_interval.is_zero() {
            return Err(AppError::Config("FINGERPRINT_POLL_MS deve ser maior que zero".to_string()));
        }

        let checkin = CheckInSettings {
            reset_delay: Duration::from_secs(parse_or(&lookup, "CHECKIN_RESET_SECS", 5u64)?),
            type_label: lookup("CHECKIN_TYPE_LABEL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| "Checador".to_string()),
        };

        Ok(AppConfig {
            database_url,
            bind_addr: parse_or(&lookup, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?,
            fingerprint,
            checkin,
            admin_initial_password: lookup("ADMIN_INITIAL_PASSWORD")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "admin123".to_string()),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> AppResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| AppError::Config(format!("{}='{}': {}", key, raw, e))),
        _ => Ok(default),
    }
}
