// src/checkin/station.rs
use crate::{
    config::{AppConfig, MatchStrategy},
    error::{AppError, AppResult},
    fingerprint::{BulkIdentifyOutcome, CaptureOutcome, DeviceError, FingerprintDevice, IdentifyOutcome},
    models::{
        alumno::{parse_matricula, Alumno},
        attendance::CheckInResult,
    },
    services::{alumno_service, attendance_service},
};
use parking_lot::Mutex;
use serde::Serialize;
use sqlx::SqlitePool;
use std::{sync::Arc, time::Duration};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

const EVENT_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
pub struct StationSettings {
    pub reset_delay: Duration,
    pub record_type: String,
    pub capture_timeout: Duration,
    pub min_score: i32,
    pub strategy: MatchStrategy,
}

impl StationSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        StationSettings {
            reset_delay: config.checkin.reset_delay,
            record_type: config.checkin.type_label.clone(),
            capture_timeout: config.fingerprint.capture_timeout,
            min_score: config.fingerprint.min_score,
            strategy: config.fingerprint.strategy,
        }
    }
}

/// Estado visível da estação; cada mudança é enviada a todas as páginas abertas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StationState {
    Idle,
    Capturing,
    Resolved { result: CheckInResult },
}

struct StationInner {
    state: StationState,
    // Incrementa a cada resultado; o auto-reset só limpa o seu próprio resultado
    generation: u64,
    // O ciclo está à espera de um dedo
    armed: bool,
    viewers: usize,
    listener: Option<CancellationToken>,
}

// O que uma volta do ciclo obteve do leitor
enum Heard {
    Matched { matricula: i64, score: i32 },
    Rejected(String),
    Quiet,
    Cancelled,
}

/// Estação de registo de assistência partilhada por todas as páginas do checador.
///
/// Enquanto houver pelo menos uma página aberta, um ciclo em segundo plano
/// relê o roster, espera por um dedo, identifica-o e regista a assistência.
/// A entrada manual converge no mesmo passo de registo.
pub struct CheckInStation {
    pool: SqlitePool,
    device: Arc<FingerprintDevice>,
    settings: StationSettings,
    events: broadcast::Sender<StationState>,
    inner: Mutex<StationInner>,
}

/// Mantém o ciclo de escuta ativo enquanto existir.
pub struct ViewerGuard {
    station: Arc<CheckInStation>,
}

impl Drop for ViewerGuard {
    fn drop(&mut self) {
        self.station.detach();
    }
}

impl CheckInStation {
    pub fn new(pool: SqlitePool, device: Arc<FingerprintDevice>, settings: StationSettings) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(CheckInStation {
            pool,
            device,
            settings,
            events,
            inner: Mutex::new(StationInner {
                state: StationState::Idle,
                generation: 0,
                armed: false,
                viewers: 0,
                listener: None,
            }),
        })
    }

    pub fn settings(&self) -> &StationSettings {
        &self.settings
    }

    pub fn current_state(&self) -> StationState {
        self.inner.lock().state.clone()
    }

    pub fn is_listening(&self) -> bool {
        self.inner.lock().listener.is_some()
    }

    /// Regista uma página aberta. A primeira arranca o ciclo de escuta.
    pub fn attach(self: &Arc<Self>) -> (ViewerGuard, broadcast::Receiver<StationState>) {
        let receiver = self.events.subscribe();

        let mut inner = self.inner.lock();
        inner.viewers += 1;
        if inner.listener.is_none() {
            let token = CancellationToken::new();
            inner.listener = Some(token.clone());
            tokio::spawn(self.clone().listen(token));
        }
        tracing::debug!("Checador: {} página(s) aberta(s).", inner.viewers);
        drop(inner);

        (ViewerGuard { station: self.clone() }, receiver)
    }

    fn detach(&self) {
        let mut inner = self.inner.lock();
        inner.viewers = inner.viewers.saturating_sub(1);
        if inner.viewers == 0 {
            if let Some(token) = inner.listener.take() {
                token.cancel();
            }
        }
    }

    /// Entrada manual da matrícula. Uma matrícula malformada é um erro de
    /// validação e não altera o estado da estação.
    pub async fn submit_manual(self: &Arc<Self>, raw_matricula: &str) -> AppResult<CheckInResult> {
        let matricula = parse_matricula(raw_matricula)?;
        let result =
            attendance_service::record_check_in(&self.pool, matricula, &self.settings.record_type, None).await?;
        self.resolve(result.clone());
        Ok(result)
    }

    fn publish(&self, inner: &mut StationInner, state: StationState) {
        inner.state = state.clone();
        // Sem páginas abertas o envio falha, o que não é um problema
        let _ = self.events.send(state);
    }

    fn resolve(self: &Arc<Self>, result: CheckInResult) {
        let generation = {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            self.publish(&mut inner, StationState::Resolved { result });
            inner.generation
        };

        let station = self.clone();
        let delay = self.settings.reset_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            station.clear_if_current(generation);
        });
    }

    fn clear_if_current(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.generation == generation && matches!(inner.state, StationState::Resolved { .. }) {
            let next = if inner.armed { StationState::Capturing } else { StationState::Idle };
            self.publish(&mut inner, next);
        }
    }

    // "Coloca el dedo" só substitui o ecrã vazio, nunca um resultado por limpar
    fn mark_capturing(&self) {
        let mut inner = self.inner.lock();
        inner.armed = true;
        if inner.state == StationState::Idle {
            self.publish(&mut inner, StationState::Capturing);
        }
    }

    fn disarm(&self) {
        self.inner.lock().armed = false;
    }

    fn mark_idle_if_capturing(&self) {
        let mut inner = self.inner.lock();
        inner.armed = false;
        if inner.state == StationState::Capturing {
            self.publish(&mut inner, StationState::Idle);
        }
    }

    async fn pause(&self, cancel: &CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(self.settings.reset_delay) => {}
        }
    }

    async fn listen(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!("👂 Checador: ciclo de escuta iniciado.");

        while !cancel.is_cancelled() {
            // Sem pausa depois de um resultado: o dedo seguinte substitui-o
            match self.listen_once(&cancel).await {
                Ok(Heard::Matched { matricula, score }) => {
                    let recorded = attendance_service::record_check_in(
                        &self.pool,
                        matricula,
                        &self.settings.record_type,
                        Some(score),
                    )
                    .await;
                    let result = recorded.unwrap_or_else(|e| {
                        tracing::error!("Checador: falha ao registar matrícula {}: {:?}", matricula, e);
                        CheckInResult::failure(e.user_message())
                    });
                    self.resolve(result);
                }
                Ok(Heard::Rejected(message)) => self.resolve(CheckInResult::failure(message)),
                // Tempo esgotado: volta a armar sem publicar nada
                Ok(Heard::Quiet) => {}
                Ok(Heard::Cancelled) => break,
                // Leitor indisponível: espera antes de voltar a tentar
                Err(e) => {
                    tracing::error!("Checador: erro no ciclo de escuta: {:?}", e);
                    self.resolve(CheckInResult::failure(e.user_message()));
                    self.pause(&cancel).await;
                }
            }
        }

        self.mark_idle_if_capturing();
        tracing::info!("👂 Checador: ciclo de escuta terminado.");
    }

    async fn listen_once(&self, cancel: &CancellationToken) -> AppResult<Heard> {
        // Roster relido a cada volta: novos registos de huella contam logo
        let roster = alumno_service::roster_snapshot(&self.pool).await?;
        self.mark_capturing();

        let device = self.device.clone();
        let settings = self.settings.clone();
        let cancel = cancel.clone();
        let heard = tokio::task::spawn_blocking(move || identify(&device, roster, &settings, &cancel)).await;
        self.disarm();
        let heard = heard.map_err(|e| {
            tracing::error!("Erro na task spawn_blocking (identificação): {:?}", e);
            AppError::InternalServerError
        })??;
        Ok(heard)
    }
}

fn identify(
    device: &FingerprintDevice,
    roster: Vec<Alumno>,
    settings: &StationSettings,
    cancel: &CancellationToken,
) -> Result<Heard, DeviceError> {
    match settings.strategy {
        MatchStrategy::Pairwise => {
            let outcome =
                device.identify_against_roster(&roster, settings.capture_timeout, cancel, settings.min_score)?;
            Ok(match outcome {
                IdentifyOutcome::Matched { candidate, score } => Heard::Matched { matricula: candidate.matricula, score },
                IdentifyOutcome::TimedOut => Heard::Quiet,
                IdentifyOutcome::Cancelled => Heard::Cancelled,
                other => Heard::Rejected(other.message()),
            })
        }
        MatchStrategy::BulkIndex => {
            let live = match device.capture_blocking(settings.capture_timeout, cancel)? {
                CaptureOutcome::Captured(template) => template,
                CaptureOutcome::TimedOut => return Ok(Heard::Quiet),
                CaptureOutcome::Cancelled => return Ok(Heard::Cancelled),
            };

            let templates: Vec<(i64, Vec<u8>)> = roster
                .iter()
                .filter(|a| a.is_active)
                .filter_map(|a| a.fingerprint.clone().map(|t| (a.id, t)))
                .collect();

            Ok(match device.identify_via_bulk_index(&live, &templates)? {
                BulkIdentifyOutcome::Matched { id, score } if score >= settings.min_score => {
                    match roster.iter().find(|a| a.id == id) {
                        Some(alumno) => Heard::Matched { matricula: alumno.matricula, score },
                        None => Heard::Rejected("Sin coincidencias en huella.".to_string()),
                    }
                }
                BulkIdentifyOutcome::Matched { .. } => Heard::Rejected("Sin coincidencias en huella.".to_string()),
                other => Heard::Rejected(other.message()),
            })
        }
    }
}
