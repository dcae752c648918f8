//! Whole-bake failures.
//!
//! Per-mesh problems (missing lightmap UVs, an unpackable rectangle, an
//! unreadable mask texture) are logged and never reach this type.

use thiserror::Error;

use crate::scene_baker::LightMode;

#[derive(Error, Debug)]
pub enum BakeError {
    #[error("Ray intersector device error: {0}")]
    Device(String),

    #[error("Model '{model}' geometry {geometry} has no position stream")]
    NoPositions { model: String, geometry: usize },

    #[error("Operation not valid in light mode {mode:?}: {reason}")]
    InvalidState { mode: LightMode, reason: &'static str },

    #[error("{pending} work items still outstanding")]
    WorkPending { pending: usize },

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Bake data serialization error: {0}")]
    Serialize(#[from] bincode::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] glint_core::ConfigError),
}

/// Result type for bake operations.
pub type BakeResult<T> = Result<T, BakeError>;
