//! Data models for BreachWatch

mod alert;
mod sample;

pub use alert::*;
pub use sample::*;
