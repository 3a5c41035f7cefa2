pub mod engine;
pub mod models;
pub mod services;
pub mod stores;

pub use engine::SchedulingEngine;
pub use models::*;
