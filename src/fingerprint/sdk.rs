// src/fingerprint/sdk.rs
//! Fronteira com o SDK do fabricante do leitor.
//!
//! O SDK é tratado como uma caixa preta: devolve códigos inteiros e plantillas
//! opacas. Nada neste crate interpreta o conteúdo de uma plantilla.

use std::fmt;

/// Tamanho máximo de uma plantilla devolvida pelo SDK.
pub const MAX_TEMPLATE_SIZE: usize = 2048;

/// Código de erro devolvido pelo SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdkCode(pub i32);

impl SdkCode {
    pub const OK: SdkCode = SdkCode(0);
    pub const ALREADY_INIT: SdkCode = SdkCode(1);
    pub const FAIL: SdkCode = SdkCode(-1);
    pub const NO_DEVICE: SdkCode = SdkCode(-3);
    pub const INVALID_PARAM: SdkCode = SdkCode(-5);
    pub const CAPTURE: SdkCode = SdkCode(-8);
    pub const MERGE: SdkCode = SdkCode(-22);
    pub const NOT_FOUND: SdkCode = SdkCode(-17);
}

impl fmt::Display for SdkCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "código {}", self.0)
    }
}

pub type SdkResult<T> = Result<T, SdkCode>;

/// Handle opaco do dispositivo físico.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceHandle(pub u64);

/// Handle opaco da base de comparação em memória do SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbHandle(pub u64);

/// Parâmetros legíveis do dispositivo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceParam {
    ImageWidth,
    ImageHeight,
}

/// Operações expostas pelo SDK. Todas bloqueiam.
///
/// O adaptador garante exclusão mútua; as implementações não precisam de ser
/// thread-safe para além de `Send`.
pub trait FingerprintSdk: Send {
    /// Inicializa a sessão do SDK. `ALREADY_INIT` não é uma falha.
    fn init(&mut self) -> SdkResult<()>;

    fn device_count(&mut self) -> usize;

    fn open_device(&mut self, index: usize) -> Option<DeviceHandle>;

    fn close_device(&mut self, device: DeviceHandle);

    fn read_param(&mut self, device: DeviceHandle, param: DeviceParam) -> SdkResult<u32>;

    /// Uma tentativa de aquisição. `Err` quando não há dedo ou a leitura falha.
    fn acquire(&mut self, device: DeviceHandle) -> SdkResult<Vec<u8>>;

    fn db_init(&mut self) -> Option<DbHandle>;

    fn db_clear(&mut self, db: DbHandle);

    /// Score de semelhança entre duas plantillas; `<= 0` significa "não coincide".
    fn db_match(&mut self, db: DbHandle, a: &[u8], b: &[u8]) -> i32;

    /// Funde três leituras do mesmo dedo numa plantilla de registo.
    fn db_merge(&mut self, db: DbHandle, samples: [&[u8]; 3]) -> SdkResult<Vec<u8>>;

    fn db_add(&mut self, db: DbHandle, fid: i32, template: &[u8]) -> SdkResult<()>;

    /// Identificação 1:N contra o índice interno. Devolve `(fid, score)`.
    fn db_identify(&mut self, db: DbHandle, template: &[u8]) -> SdkResult<(i32, i32)>;

    fn terminate(&mut self);
}
