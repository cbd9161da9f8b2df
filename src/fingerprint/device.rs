// src/fingerprint/device.rs
use super::sdk::{DbHandle, DeviceHandle, DeviceParam, FingerprintSdk, SdkCode};
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Leituras necessárias para registar um dedo.
pub const ENROLL_SAMPLES: usize = 3;

const DEFAULT_IMAGE_WIDTH: u32 = 256;
const DEFAULT_IMAGE_HEIGHT: u32 = 288;

/// Falhas do leitor que impedem a operação de continuar.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Error al inicializar el SDK ({0}).")]
    SdkInit(SdkCode),

    #[error("No se detecta ningún lector conectado.")]
    NoDevice,

    #[error("No se pudo abrir el lector.")]
    OpenFailed,

    #[error("No se pudo inicializar la base interna de huellas.")]
    DbInitFailed,

    #[error("El identificador {0} no cabe en el índice del lector.")]
    InvalidFid(i64),
}

/// Resultado de uma única tentativa de leitura.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureAttempt {
    Captured(Vec<u8>),
    NoFinger(SdkCode),
}

impl CaptureAttempt {
    pub fn message(&self) -> String {
        match self {
            CaptureAttempt::Captured(_) => "Huella leída.".to_string(),
            CaptureAttempt::NoFinger(code) => {
                format!("Lectura no exitosa ({}). Coloca el dedo y vuelve a intentar.", code)
            }
        }
    }
}

/// Resultado de uma captura com espera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Captured(Vec<u8>),
    TimedOut,
    Cancelled,
}

impl CaptureOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            CaptureOutcome::Captured(_) => "Huella capturada.",
            CaptureOutcome::TimedOut => "Tiempo de espera agotado. No se capturó huella.",
            CaptureOutcome::Cancelled => "Captura cancelada.",
        }
    }
}

/// Resultado do registo (enrolamento) de um dedo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollOutcome {
    /// As três leituras foram fundidas numa plantilla de registo
    Merged(Vec<u8>),
    /// A fusão falhou; fica só a última leitura (resultado degradado mas válido)
    LastSampleOnly { template: Vec<u8>, code: SdkCode },
    /// A leitura `step` não coincide com a anterior
    DifferentFinger { step: usize },
    TimedOut { step: usize },
    Cancelled { step: usize },
}

impl EnrollOutcome {
    pub fn template(&self) -> Option<&[u8]> {
        match self {
            EnrollOutcome::Merged(t) => Some(t),
            EnrollOutcome::LastSampleOnly { template, .. } => Some(template),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.template().is_some()
    }

    pub fn message(&self) -> String {
        match self {
            EnrollOutcome::Merged(_) => "Huella registrada (plantilla final generada).".to_string(),
            EnrollOutcome::LastSampleOnly { code, .. } => {
                format!("No se pudo fusionar ({}). Se guardó la última lectura.", code)
            }
            EnrollOutcome::DifferentFinger { .. } => {
                "No coincide con la captura anterior. Usa el MISMO dedo para enrolar.".to_string()
            }
            EnrollOutcome::TimedOut { .. } => CaptureOutcome::TimedOut.message().to_string(),
            EnrollOutcome::Cancelled { .. } => CaptureOutcome::Cancelled.message().to_string(),
        }
    }
}

/// Algo que pode ser candidato numa identificação 1:N.
pub trait FingerprintCandidate {
    fn fingerprint(&self) -> Option<&[u8]>;
    fn is_active(&self) -> bool;
}

/// Resultado da identificação contra o roster.
#[derive(Debug, PartialEq, Eq)]
pub enum IdentifyOutcome<'a, T> {
    Matched { candidate: &'a T, score: i32 },
    /// Houve candidatos mas nenhum chegou ao score mínimo
    NoMatch { best_score: Option<i32> },
    /// Nenhum candidato ativo com plantilla
    NoCandidates,
    TimedOut,
    Cancelled,
}

impl<T> IdentifyOutcome<'_, T> {
    pub fn timed_out(&self) -> bool {
        matches!(self, IdentifyOutcome::TimedOut)
    }

    pub fn message(&self) -> String {
        match self {
            IdentifyOutcome::Matched { score, .. } => format!("Coincidencia OK (score={}).", score),
            IdentifyOutcome::NoMatch { .. } => "Sin coincidencias en huella.".to_string(),
            IdentifyOutcome::NoCandidates => {
                "No hay coincidencia con huella registrada para comparar.".to_string()
            }
            IdentifyOutcome::TimedOut => String::new(),
            IdentifyOutcome::Cancelled => CaptureOutcome::Cancelled.message().to_string(),
        }
    }
}

/// Resultado da identificação pelo índice interno do SDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkIdentifyOutcome {
    Matched { id: i64, score: i32 },
    NoMatch(SdkCode),
    NoTemplates,
    /// O SDK recusou carregar uma plantilla no índice
    LoadFailed { id: i64, code: SdkCode },
}

impl BulkIdentifyOutcome {
    pub fn message(&self) -> String {
        match self {
            BulkIdentifyOutcome::Matched { score, .. } => format!("Coincidencia encontrada (score {}).", score),
            BulkIdentifyOutcome::NoMatch(code) => format!("No se encontró coincidencia ({}).", code),
            BulkIdentifyOutcome::NoTemplates => "No hay plantillas para comparar.".to_string(),
            BulkIdentifyOutcome::LoadFailed { id, code } => {
                format!("No se pudo cargar plantilla en DB (ID {}, {}).", id, code)
            }
        }
    }
}

struct DeviceInner {
    sdk: Box<dyn FingerprintSdk>,
    // Sessão do SDK aberta (init aceite), mesmo que o resto tenha falhado
    session_open: bool,
    initialized: bool,
    device: Option<DeviceHandle>,
    db: Option<DbHandle>,
}

impl DeviceInner {
    fn ensure_ready(&mut self) -> Result<String, DeviceError> {
        if self.initialized {
            return Ok("SDK listo.".to_string());
        }

        match self.sdk.init() {
            Ok(()) | Err(SdkCode::ALREADY_INIT) => self.session_open = true,
            Err(code) => return Err(DeviceError::SdkInit(code)),
        }

        if self.sdk.device_count() == 0 {
            return Err(DeviceError::NoDevice);
        }

        let device = self.sdk.open_device(0).ok_or(DeviceError::OpenFailed)?;
        // Sem base interna o handle aberto não serve: fecha-o antes de falhar
        let Some(db) = self.sdk.db_init() else {
            self.sdk.close_device(device);
            return Err(DeviceError::DbInitFailed);
        };
        self.device = Some(device);
        self.db = Some(db);

        let width = self.read_param(device, DeviceParam::ImageWidth, DEFAULT_IMAGE_WIDTH);
        let height = self.read_param(device, DeviceParam::ImageHeight, DEFAULT_IMAGE_HEIGHT);

        self.initialized = true;
        tracing::info!("🖐️ Leitor inicializado (imagem {}x{}).", width, height);
        Ok(format!("SDK inicializado. Imagen: {}x{}.", width, height))
    }

    fn read_param(&mut self, device: DeviceHandle, param: DeviceParam, fallback: u32) -> u32 {
        match self.sdk.read_param(device, param) {
            Ok(v) if v > 0 => v,
            _ => fallback,
        }
    }

    // Só chamado depois de ensure_ready
    fn handles(&self) -> Result<(DeviceHandle, DbHandle), DeviceError> {
        match (self.device, self.db) {
            (Some(dev), Some(db)) => Ok((dev, db)),
            (None, _) => Err(DeviceError::OpenFailed),
            (_, None) => Err(DeviceError::DbInitFailed),
        }
    }

    fn capture_blocking(
        &mut self,
        timeout: Duration,
        poll: Duration,
        cancel: &CancellationToken,
    ) -> Result<CaptureOutcome, DeviceError> {
        let (device, _) = self.handles()?;
        let start = Instant::now();

        while start.elapsed() < timeout {
            if cancel.is_cancelled() {
                return Ok(CaptureOutcome::Cancelled);
            }

            match self.sdk.acquire(device) {
                Ok(template) if !template.is_empty() => return Ok(CaptureOutcome::Captured(template)),
                Ok(_) => {}
                Err(code) => tracing::trace!("À espera de dedo ({})", code),
            }

            // Não saturar o CPU; o cancelamento é verificado no início da volta seguinte
            std::thread::sleep(poll.min(timeout.saturating_sub(start.elapsed())));
        }

        if cancel.is_cancelled() {
            return Ok(CaptureOutcome::Cancelled);
        }
        Ok(CaptureOutcome::TimedOut)
    }
}

/// Adaptador do leitor de impressões digitais.
///
/// Dono exclusivo do handle do dispositivo e da base de comparação do SDK.
/// Todas as operações públicas seguram o mesmo lock durante toda a sua duração:
/// no máximo uma captura, registo ou identificação corre contra o leitor de cada
/// vez, e quem chega depois bloqueia. As operações bloqueiam a thread; código
/// assíncrono deve chamá-las através de `spawn_blocking`.
pub struct FingerprintDevice {
    inner: Mutex<DeviceInner>,
    poll_interval: Duration,
}

impl FingerprintDevice {
    pub fn new(sdk: Box<dyn FingerprintSdk>, poll_interval: Duration) -> Self {
        FingerprintDevice {
            inner: Mutex::new(DeviceInner {
                sdk,
                session_open: false,
                initialized: false,
                device: None,
                db: None,
            }),
            poll_interval,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.inner.lock().initialized
    }

    /// Abre o leitor e a base interna na primeira chamada; depois disso é um no-op.
    pub fn ensure_ready(&self) -> Result<String, DeviceError> {
        self.inner.lock().ensure_ready()
    }

    /// Uma única tentativa de leitura, sem espera.
    pub fn capture_once(&self) -> Result<CaptureAttempt, DeviceError> {
        let mut inner = self.inner.lock();
        inner.ensure_ready()?;
        let (device, _) = inner.handles()?;

        Ok(match inner.sdk.acquire(device) {
            Ok(template) if !template.is_empty() => CaptureAttempt::Captured(template),
            Ok(_) => CaptureAttempt::NoFinger(SdkCode::CAPTURE),
            Err(code) => CaptureAttempt::NoFinger(code),
        })
    }

    /// Tenta ler até haver dedo, esgotar `timeout` ou `cancel` ser acionado.
    pub fn capture_blocking(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<CaptureOutcome, DeviceError> {
        let mut inner = self.inner.lock();
        inner.ensure_ready()?;
        inner.capture_blocking(timeout, self.poll_interval, cancel)
    }

    /// Regista um dedo a partir de três leituras consecutivas do mesmo dedo.
    ///
    /// Cada leitura (exceto a primeira) tem de coincidir com a anterior com
    /// score positivo. `on_progress(step, total, message)` é chamado antes e
    /// depois de cada leitura.
    pub fn enroll_template<F>(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<EnrollOutcome, DeviceError>
    where
        F: FnMut(usize, usize, &str),
    {
        let mut inner = self.inner.lock();
        inner.ensure_ready()?;
        let (_, db) = inner.handles()?;

        let mut samples: Vec<Vec<u8>> = Vec::with_capacity(ENROLL_SAMPLES);

        for i in 0..ENROLL_SAMPLES {
            let step = i + 1;
            on_progress(step, ENROLL_SAMPLES, &format!("Lectura {}/{}: coloca el dedo.", step, ENROLL_SAMPLES));

            let sample = match inner.capture_blocking(timeout, self.poll_interval, cancel)? {
                CaptureOutcome::Captured(t) => t,
                CaptureOutcome::TimedOut => {
                    let outcome = EnrollOutcome::TimedOut { step };
                    on_progress(step, ENROLL_SAMPLES, &outcome.message());
                    return Ok(outcome);
                }
                CaptureOutcome::Cancelled => {
                    let outcome = EnrollOutcome::Cancelled { step };
                    on_progress(step, ENROLL_SAMPLES, &outcome.message());
                    return Ok(outcome);
                }
            };

            if let Some(previous) = samples.last() {
                let score = inner.sdk.db_match(db, &sample, previous);
                if score <= 0 {
                    tracing::warn!("Registo de huella abortado na leitura {} (score {}).", step, score);
                    let outcome = EnrollOutcome::DifferentFinger { step };
                    on_progress(step, ENROLL_SAMPLES, &outcome.message());
                    return Ok(outcome);
                }
            }

            samples.push(sample);
            on_progress(
                step,
                ENROLL_SAMPLES,
                &format!("Lectura {}/{} OK. Retira y vuelve a colocar el mismo dedo.", step, ENROLL_SAMPLES),
            );
        }

        let merged = inner
            .sdk
            .db_merge(db, [samples[0].as_slice(), samples[1].as_slice(), samples[2].as_slice()]);
        let outcome = match merged {
            Ok(merged) if !merged.is_empty() => EnrollOutcome::Merged(merged),
            Ok(_) => EnrollOutcome::LastSampleOnly { template: samples.swap_remove(2), code: SdkCode::MERGE },
            Err(code) => {
                tracing::warn!("Fusão de plantillas falhou ({}); a usar a última leitura.", code);
                EnrollOutcome::LastSampleOnly { template: samples.swap_remove(2), code }
            }
        };
        on_progress(ENROLL_SAMPLES, ENROLL_SAMPLES, &outcome.message());
        Ok(outcome)
    }

    /// Captura uma amostra e compara-a, uma a uma, com cada candidato ativo que
    /// tenha plantilla, ficando com o score máximo. Só devolve o candidato se o
    /// score for pelo menos `min_score`.
    pub fn identify_against_roster<'a, T: FingerprintCandidate>(
        &self,
        candidates: &'a [T],
        timeout: Duration,
        cancel: &CancellationToken,
        min_score: i32,
    ) -> Result<IdentifyOutcome<'a, T>, DeviceError> {
        let mut inner = self.inner.lock();
        inner.ensure_ready()?;
        let (_, db) = inner.handles()?;

        let live = match inner.capture_blocking(timeout, self.poll_interval, cancel)? {
            CaptureOutcome::Captured(t) => t,
            CaptureOutcome::TimedOut => return Ok(IdentifyOutcome::TimedOut),
            CaptureOutcome::Cancelled => return Ok(IdentifyOutcome::Cancelled),
        };

        let mut best: Option<(&'a T, i32)> = None;
        for candidate in candidates.iter().filter(|c| c.is_active()) {
            let Some(stored) = candidate.fingerprint().filter(|t| !t.is_empty()) else {
                continue;
            };
            let score = inner.sdk.db_match(db, &live, stored);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((candidate, score));
            }
        }

        Ok(match best {
            None => IdentifyOutcome::NoCandidates,
            Some((candidate, score)) if score >= min_score => IdentifyOutcome::Matched { candidate, score },
            Some((_, score)) => IdentifyOutcome::NoMatch { best_score: Some(score) },
        })
    }

    /// Carrega `templates` no índice interno do SDK e pede-lhe a identificação
    /// de `live`. Os ids têm de caber num `i32` (limitação do SDK).
    pub fn identify_via_bulk_index(
        &self,
        live: &[u8],
        templates: &[(i64, Vec<u8>)],
    ) -> Result<BulkIdentifyOutcome, DeviceError> {
        let usable: Vec<&(i64, Vec<u8>)> = templates.iter().filter(|(_, t)| !t.is_empty()).collect();
        if usable.is_empty() {
            return Ok(BulkIdentifyOutcome::NoTemplates);
        }

        let mut inner = self.inner.lock();
        inner.ensure_ready()?;
        let (_, db) = inner.handles()?;

        inner.sdk.db_clear(db);
        for (id, template) in usable {
            let fid = i32::try_from(*id).map_err(|_| DeviceError::InvalidFid(*id))?;
            if let Err(code) = inner.sdk.db_add(db, fid, template) {
                return Ok(BulkIdentifyOutcome::LoadFailed { id: *id, code });
            }
        }

        Ok(match inner.sdk.db_identify(db, live) {
            Ok((fid, score)) if fid >= 0 => BulkIdentifyOutcome::Matched { id: i64::from(fid), score },
            Ok(_) => BulkIdentifyOutcome::NoMatch(SdkCode::NOT_FOUND),
            Err(code) => BulkIdentifyOutcome::NoMatch(code),
        })
    }

    /// Liberta a base interna, fecha o leitor e termina a sessão do SDK.
    /// Pode ser chamado várias vezes.
    pub fn dispose(&self) {
        let mut inner = self.inner.lock();
        if let Some(db) = inner.db.take() {
            inner.sdk.db_clear(db);
        }
        if let Some(device) = inner.device.take() {
            inner.sdk.close_device(device);
        }
        inner.initialized = false;
        if inner.session_open {
            inner.sdk.terminate();
            inner.session_open = false;
            tracing::info!("🖐️ Leitor libertado.");
        }
    }
}

impl Drop for FingerprintDevice {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{
        sdk::SdkResult,
        simulated::{SimulatedReader, SimulatedSdk},
    };
    use std::sync::Arc;

    const POLL: Duration = Duration::from_millis(120);

    #[derive(Debug, PartialEq)]
    struct Candidate {
        id: i64,
        template: Option<Vec<u8>>,
        active: bool,
    }

    impl FingerprintCandidate for Candidate {
        fn fingerprint(&self) -> Option<&[u8]> {
            self.template.as_deref()
        }
        fn is_active(&self) -> bool {
            self.active
        }
    }

    fn candidate(id: i64, template: &[u8], active: bool) -> Candidate {
        Candidate { id, template: Some(template.to_vec()), active }
    }

    fn simulated_device() -> (FingerprintDevice, SimulatedReader) {
        let reader = SimulatedReader::default();
        let device = FingerprintDevice::new(Box::new(SimulatedSdk::new(reader.clone())), POLL);
        (device, reader)
    }

    #[test]
    fn ensure_ready_is_idempotent() {
        let (device, _) = simulated_device();
        assert!(device.ensure_ready().unwrap().starts_with("SDK inicializado"));
        assert_eq!(device.ensure_ready().unwrap(), "SDK listo.");
        assert!(device.is_ready());
    }

    #[test]
    fn ensure_ready_fails_without_devices() {
        let device = FingerprintDevice::new(Box::new(SimulatedSdk::without_devices()), POLL);
        assert_eq!(device.ensure_ready(), Err(DeviceError::NoDevice));
        assert!(!device.is_ready());
    }

    #[test]
    fn capture_once_reports_missing_finger() {
        let (device, reader) = simulated_device();
        let attempt = device.capture_once().unwrap();
        assert!(matches!(attempt, CaptureAttempt::NoFinger(_)));
        assert!(attempt.message().contains("Coloca el dedo"));

        reader.place_finger(vec![4, 2]);
        assert_eq!(device.capture_once().unwrap(), CaptureAttempt::Captured(vec![4, 2]));
    }

    #[test]
    fn capture_blocking_times_out_without_finger() {
        let (device, _) = simulated_device();
        let outcome = device
            .capture_blocking(Duration::from_millis(300), &CancellationToken::new())
            .unwrap();
        assert_eq!(outcome, CaptureOutcome::TimedOut);
    }

    #[test]
    fn cancellation_ends_capture_within_one_poll_interval() {
        let (device, _) = simulated_device();
        let device = Arc::new(device);
        device.ensure_ready().unwrap();

        let cancel = CancellationToken::new();
        let worker = {
            let device = device.clone();
            let cancel = cancel.clone();
            std::thread::spawn(move || device.capture_blocking(Duration::from_secs(10), &cancel))
        };

        std::thread::sleep(Duration::from_millis(200));
        let cancelled_at = Instant::now();
        cancel.cancel();

        let outcome = worker.join().unwrap().unwrap();
        assert_eq!(outcome, CaptureOutcome::Cancelled);
        // Uma volta de polling, com folga para o escalonador
        assert!(cancelled_at.elapsed() < POLL + Duration::from_millis(500));
    }

    #[test]
    fn enroll_merges_three_matching_samples() {
        let (device, reader) = simulated_device();
        reader.place_finger(vec![1, 2, 3, 4]);
        reader.place_finger(vec![1, 2, 3, 5]);
        reader.place_finger(vec![1, 2, 3, 5]);

        let mut progress = Vec::new();
        let outcome = device
            .enroll_template(Duration::from_secs(1), &CancellationToken::new(), |step, total, msg| {
                progress.push((step, total, msg.to_string()))
            })
            .unwrap();

        assert_eq!(outcome, EnrollOutcome::Merged(vec![1, 2, 3, 5]));
        assert_eq!(reader.merge_calls(), 1);
        assert_eq!(progress.first().map(|p| p.0), Some(1));
        assert_eq!(progress.last().map(|p| (p.0, p.1)), Some((3, 3)));
    }

    #[test]
    fn enroll_rejects_a_different_finger_without_merging() {
        let (device, reader) = simulated_device();
        reader.place_finger(vec![1, 1, 1, 1]);
        reader.place_finger(vec![9, 9, 9, 9]);
        reader.place_finger(vec![1, 1, 1, 1]);

        let outcome = device
            .enroll_template(Duration::from_secs(1), &CancellationToken::new(), |_, _, _| {})
            .unwrap();

        assert_eq!(outcome, EnrollOutcome::DifferentFinger { step: 2 });
        assert!(outcome.template().is_none());
        assert!(outcome.message().contains("MISMO dedo"));
        assert_eq!(reader.merge_calls(), 0);
    }

    #[test]
    fn enroll_rejects_a_third_sample_from_another_finger() {
        let (device, reader) = simulated_device();
        reader.place_finger(vec![1, 1, 1, 1]);
        reader.place_finger(vec![1, 1, 1, 1]);
        reader.place_finger(vec![9, 9, 9, 9]);

        let outcome = device
            .enroll_template(Duration::from_secs(1), &CancellationToken::new(), |_, _, _| {})
            .unwrap();

        assert_eq!(outcome, EnrollOutcome::DifferentFinger { step: 3 });
        assert_eq!(reader.merge_calls(), 0);
    }

    #[test]
    fn enroll_falls_back_to_last_sample_when_merge_fails() {
        let (device, reader) = simulated_device();
        reader.place_finger(vec![1, 2, 3, 4]);
        reader.place_finger(vec![1, 2, 3, 5]);
        reader.place_finger(vec![1, 2, 3, 5, 9]);

        let outcome = device
            .enroll_template(Duration::from_secs(1), &CancellationToken::new(), |_, _, _| {})
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.template(), Some(&[1u8, 2, 3, 5, 9][..]));
        assert!(matches!(outcome, EnrollOutcome::LastSampleOnly { .. }));
        assert!(outcome.message().contains("última lectura"));
    }

    #[test]
    fn enroll_reports_timeout_step() {
        let (device, reader) = simulated_device();
        reader.place_finger(vec![1, 2, 3]);
        let outcome = device
            .enroll_template(Duration::from_millis(200), &CancellationToken::new(), |_, _, _| {})
            .unwrap();
        assert_eq!(outcome, EnrollOutcome::TimedOut { step: 2 });
    }

    #[test]
    fn identify_picks_the_best_candidate_above_threshold() {
        let (device, reader) = simulated_device();
        let roster = vec![
            candidate(1, &[1, 1, 1, 1], true),
            candidate(2, &[1, 2, 2, 2], true),
            candidate(3, &[9, 9, 9, 9], true),
        ];
        reader.place_finger(vec![1, 2, 2, 2]);

        let outcome = device
            .identify_against_roster(&roster, Duration::from_secs(1), &CancellationToken::new(), 60)
            .unwrap();
        match outcome {
            IdentifyOutcome::Matched { candidate, score } => {
                assert_eq!(candidate.id, 2);
                assert_eq!(score, 100);
            }
            other => panic!("esperava coincidência, obtive {:?}", other.message()),
        }
    }

    #[test]
    fn identify_rejects_best_candidate_below_threshold() {
        let (device, reader) = simulated_device();
        let roster = vec![candidate(1, &[1, 1, 1, 1], true), candidate(2, &[1, 2, 2, 2], true)];
        // Melhor score: 50 (candidato 2), abaixo de 60
        reader.place_finger(vec![1, 2, 3, 3]);

        let outcome = device
            .identify_against_roster(&roster, Duration::from_secs(1), &CancellationToken::new(), 60)
            .unwrap();
        assert_eq!(outcome, IdentifyOutcome::NoMatch { best_score: Some(50) });
        assert!(!outcome.timed_out());
    }

    #[test]
    fn identify_never_selects_inactive_or_templateless_students() {
        let (device, reader) = simulated_device();
        let roster = vec![
            candidate(1, &[5, 5, 5, 5], false),
            Candidate { id: 2, template: None, active: true },
            Candidate { id: 3, template: Some(Vec::new()), active: true },
            candidate(4, &[7, 0, 0, 0], true),
        ];
        reader.place_finger(vec![5, 5, 5, 5]);

        let outcome = device
            .identify_against_roster(&roster, Duration::from_secs(1), &CancellationToken::new(), 1)
            .unwrap();
        assert_eq!(outcome, IdentifyOutcome::NoMatch { best_score: Some(0) });
        // Só o candidato 4 foi pontuado
        assert_eq!(reader.match_calls(), 1);
    }

    #[test]
    fn identify_without_candidates_reports_it() {
        let (device, reader) = simulated_device();
        let roster = vec![candidate(1, &[5, 5], false)];
        reader.place_finger(vec![5, 5]);
        let outcome = device
            .identify_against_roster(&roster, Duration::from_secs(1), &CancellationToken::new(), 60)
            .unwrap();
        assert_eq!(outcome, IdentifyOutcome::NoCandidates);
    }

    #[test]
    fn identify_flags_timeout() {
        let (device, _) = simulated_device();
        let roster = vec![candidate(1, &[5, 5], true)];
        let outcome = device
            .identify_against_roster(&roster, Duration::from_millis(150), &CancellationToken::new(), 60)
            .unwrap();
        assert!(outcome.timed_out());
        assert!(outcome.message().is_empty());
    }

    #[test]
    fn bulk_index_returns_external_id() {
        let (device, _) = simulated_device();
        let templates = vec![(1000, vec![1, 1, 1, 1]), (1001, vec![2, 2, 2, 2]), (1002, Vec::new())];
        let outcome = device.identify_via_bulk_index(&[2, 2, 2, 2], &templates).unwrap();
        assert_eq!(outcome, BulkIdentifyOutcome::Matched { id: 1001, score: 100 });

        assert_eq!(
            device.identify_via_bulk_index(&[1], &[(5, Vec::new())]).unwrap(),
            BulkIdentifyOutcome::NoTemplates
        );
        assert_eq!(
            device.identify_via_bulk_index(&[1], &[(i64::MAX, vec![1])]),
            Err(DeviceError::InvalidFid(i64::MAX))
        );
    }

    #[derive(Debug, Default)]
    struct Calls {
        opens: usize,
        closes: usize,
        terminates: usize,
    }

    // Leitor presente cuja base interna nunca abre
    struct NoDbSdk {
        devices: usize,
        calls: Arc<parking_lot::Mutex<Calls>>,
    }

    impl FingerprintSdk for NoDbSdk {
        fn init(&mut self) -> SdkResult<()> {
            Ok(())
        }
        fn device_count(&mut self) -> usize {
            self.devices
        }
        fn open_device(&mut self, _index: usize) -> Option<DeviceHandle> {
            let mut calls = self.calls.lock();
            calls.opens += 1;
            Some(DeviceHandle(calls.opens as u64))
        }
        fn close_device(&mut self, _device: DeviceHandle) {
            self.calls.lock().closes += 1;
        }
        fn read_param(&mut self, _device: DeviceHandle, _param: DeviceParam) -> SdkResult<u32> {
            Ok(0)
        }
        fn acquire(&mut self, _device: DeviceHandle) -> SdkResult<Vec<u8>> {
            Err(SdkCode::CAPTURE)
        }
        fn db_init(&mut self) -> Option<DbHandle> {
            None
        }
        fn db_clear(&mut self, _db: DbHandle) {}
        fn db_match(&mut self, _db: DbHandle, _a: &[u8], _b: &[u8]) -> i32 {
            0
        }
        fn db_merge(&mut self, _db: DbHandle, _samples: [&[u8]; 3]) -> SdkResult<Vec<u8>> {
            Err(SdkCode::MERGE)
        }
        fn db_add(&mut self, _db: DbHandle, _fid: i32, _template: &[u8]) -> SdkResult<()> {
            Err(SdkCode::FAIL)
        }
        fn db_identify(&mut self, _db: DbHandle, _template: &[u8]) -> SdkResult<(i32, i32)> {
            Err(SdkCode::NOT_FOUND)
        }
        fn terminate(&mut self) {
            self.calls.lock().terminates += 1;
        }
    }

    fn no_db_device(devices: usize) -> (FingerprintDevice, Arc<parking_lot::Mutex<Calls>>) {
        let calls = Arc::new(parking_lot::Mutex::new(Calls::default()));
        let sdk = NoDbSdk { devices, calls: calls.clone() };
        (FingerprintDevice::new(Box::new(sdk), POLL), calls)
    }

    #[test]
    fn failed_db_init_closes_the_device_on_every_retry() {
        let (device, calls) = no_db_device(1);
        for _ in 0..3 {
            assert_eq!(device.ensure_ready(), Err(DeviceError::DbInitFailed));
        }
        assert!(!device.is_ready());
        {
            let calls = calls.lock();
            assert_eq!(calls.opens, 3);
            assert_eq!(calls.closes, 3);
        }

        device.dispose();
        assert_eq!(calls.lock().terminates, 1);
    }

    #[test]
    fn dispose_terminates_a_session_without_devices() {
        let (device, calls) = no_db_device(0);
        assert_eq!(device.ensure_ready(), Err(DeviceError::NoDevice));
        device.dispose();
        device.dispose();
        let calls = calls.lock();
        assert_eq!(calls.opens, 0);
        assert_eq!(calls.terminates, 1);
    }

    #[test]
    fn dispose_is_safe_to_repeat() {
        let (device, _) = simulated_device();
        device.ensure_ready().unwrap();
        device.dispose();
        device.dispose();
        assert!(!device.is_ready());
        // Reabre quando volta a ser usado
        assert!(device.ensure_ready().is_ok());
    }
}
