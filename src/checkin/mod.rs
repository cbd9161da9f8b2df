// src/checkin/mod.rs
pub mod station;

pub use station::{CheckInStation, StationSettings};
