//! Personalized adaptive learning decision engine: perception, modeling,
//! learning and decision feed a control layer that serialises per-user
//! state under a FIFO lock, persists decisions, and schedules delayed
//! reward ingestion (`spec.md` §2). [`wme`] answers "is this word learned"
//! as a peripheral-but-core companion. Transport, auth, and content storage
//! are external collaborators this crate never speaks to directly
//! (`spec.md` §1).

#![allow(dead_code)]

pub mod actr_math;
pub mod config;
pub mod control;
pub mod decision;
pub mod error;
pub mod learning;
pub mod logging;
pub mod modeling;
pub mod perception;
pub mod persistence;
pub mod types;
pub mod wme;

pub use control::engine::Engine;
pub use error::EngineError;
