//! Persistence of run results.

pub mod export;
