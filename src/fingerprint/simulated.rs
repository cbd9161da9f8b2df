// src/fingerprint/simulated.rs
//! Leitor simulado em processo.
//!
//! Serve para desenvolvimento sem hardware e para os testes: as "colocações de
//! dedo" são enfileiradas através de um [`SimulatedReader`] e consumidas uma a
//! uma pelas aquisições do SDK.

use super::sdk::{DbHandle, DeviceHandle, DeviceParam, FingerprintSdk, SdkCode, SdkResult, MAX_TEMPLATE_SIZE};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

#[derive(Debug, Default)]
struct ReaderState {
    placements: VecDeque<Vec<u8>>,
    merge_calls: usize,
    match_calls: usize,
}

/// Handle partilhado para alimentar o leitor simulado.
#[derive(Debug, Clone, Default)]
pub struct SimulatedReader {
    state: Arc<Mutex<ReaderState>>,
}

impl SimulatedReader {
    /// Enfileira uma colocação de dedo; a próxima aquisição devolve-a.
    pub fn place_finger(&self, sample: impl Into<Vec<u8>>) {
        self.state.lock().placements.push_back(sample.into());
    }

    pub fn pending(&self) -> usize {
        self.state.lock().placements.len()
    }

    pub fn merge_calls(&self) -> usize {
        self.state.lock().merge_calls
    }

    pub fn match_calls(&self) -> usize {
        self.state.lock().match_calls
    }
}

/// Implementação de [`FingerprintSdk`] sem hardware.
pub struct SimulatedSdk {
    reader: SimulatedReader,
    devices: usize,
    initialized: bool,
    next_handle: u64,
    open_device: Option<DeviceHandle>,
    index: BTreeMap<i32, Vec<u8>>,
}

impl SimulatedSdk {
    /// SDK com um leitor ligado, alimentado por `reader`.
    pub fn new(reader: SimulatedReader) -> Self {
        SimulatedSdk {
            reader,
            devices: 1,
            initialized: false,
            next_handle: 1,
            open_device: None,
            index: BTreeMap::new(),
        }
    }

    /// SDK sem nenhum leitor ligado.
    pub fn without_devices() -> Self {
        SimulatedSdk {
            devices: 0,
            ..SimulatedSdk::new(SimulatedReader::default())
        }
    }

    fn handle(&mut self) -> u64 {
        let h = self.next_handle;
        self.next_handle += 1;
        h
    }
}

/// Percentagem de bytes iguais, posição a posição, sobre o comprimento maior.
pub fn similarity(a: &[u8], b: &[u8]) -> i32 {
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 0;
    }
    let equal = a.iter().zip(b).filter(|(x, y)| x == y).count();
    ((equal * 100) / longest) as i32
}

/// Amostra determinística associada a uma chave (p. ex. a matrícula), para
/// simular sempre "o mesmo dedo" da mesma pessoa.
pub fn sample_for(key: i64) -> Vec<u8> {
    // xorshift64; a semente nunca é zero para chaves positivas
    let mut x = (key as u64) ^ 0x9E37_79B9_7F4A_7C15;
    (0..32)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            (x >> 24) as u8
        })
        .collect()
}

impl FingerprintSdk for SimulatedSdk {
    fn init(&mut self) -> SdkResult<()> {
        if self.initialized {
            return Err(SdkCode::ALREADY_INIT);
        }
        self.initialized = true;
        Ok(())
    }

    fn device_count(&mut self) -> usize {
        self.devices
    }

    fn open_device(&mut self, index: usize) -> Option<DeviceHandle> {
        if !self.initialized || index >= self.devices {
            return None;
        }
        let handle = DeviceHandle(self.handle());
        self.open_device = Some(handle);
        Some(handle)
    }

    fn close_device(&mut self, device: DeviceHandle) {
        if self.open_device == Some(device) {
            self.open_device = None;
        }
    }

    fn read_param(&mut self, _device: DeviceHandle, param: DeviceParam) -> SdkResult<u32> {
        match param {
            DeviceParam::ImageWidth => Ok(256),
            DeviceParam::ImageHeight => Ok(288),
        }
    }

    fn acquire(&mut self, device: DeviceHandle) -> SdkResult<Vec<u8>> {
        if self.open_device != Some(device) {
            return Err(SdkCode::NO_DEVICE);
        }
        match self.reader.state.lock().placements.pop_front() {
            Some(sample) if !sample.is_empty() => {
                let mut sample = sample;
                sample.truncate(MAX_TEMPLATE_SIZE);
                Ok(sample)
            }
            _ => Err(SdkCode::CAPTURE),
        }
    }

    fn db_init(&mut self) -> Option<DbHandle> {
        if !self.initialized {
            return None;
        }
        Some(DbHandle(self.handle()))
    }

    fn db_clear(&mut self, _db: DbHandle) {
        self.index.clear();
    }

    fn db_match(&mut self, _db: DbHandle, a: &[u8], b: &[u8]) -> i32 {
        self.reader.state.lock().match_calls += 1;
        similarity(a, b)
    }

    fn db_merge(&mut self, _db: DbHandle, samples: [&[u8]; 3]) -> SdkResult<Vec<u8>> {
        self.reader.state.lock().merge_calls += 1;
        let [a, b, c] = samples;
        if a.is_empty() || a.len() != b.len() || a.len() != c.len() {
            return Err(SdkCode::MERGE);
        }
        // Maioria byte a byte; sem maioria fica o byte da primeira leitura
        Ok(a
            .iter()
            .zip(b)
            .zip(c)
            .map(|((&x, &y), &z)| if y == z { y } else { x })
            .collect())
    }

    fn db_add(&mut self, _db: DbHandle, fid: i32, template: &[u8]) -> SdkResult<()> {
        if template.is_empty() {
            return Err(SdkCode::INVALID_PARAM);
        }
        self.index.insert(fid, template.to_vec());
        Ok(())
    }

    fn db_identify(&mut self, _db: DbHandle, template: &[u8]) -> SdkResult<(i32, i32)> {
        self.index
            .iter()
            .map(|(fid, stored)| (*fid, similarity(template, stored)))
            .filter(|(_, score)| *score > 0)
            .max_by_key(|(_, score)| *score)
            .ok_or(SdkCode::NOT_FOUND)
    }

    fn terminate(&mut self) {
        self.initialized = false;
        self.open_device = None;
        self.index.clear();
    }
}
