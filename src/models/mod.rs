//! Data models for the statistics subsystem.
//!
//! This module contains the data structures moving through the sync
//! pipeline:
//!
//! - `PetRecord`, `Vaccination`: raw records as fetched from the remote API
//! - `SpeciesCount`, `TreatmentCount`, `VaccineRank`: cached aggregate rows
//! - `StatsSnapshot`: the composite read shape exposed to observers

pub mod record;
pub mod stats;

pub use record::{PetRecord, Vaccination};
pub use stats::{SpeciesCount, StatsSnapshot, TreatmentCount, VaccineRank};
