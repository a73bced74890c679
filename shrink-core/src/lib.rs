#![forbid(unsafe_code)]

pub mod error;

pub mod util {
    pub mod atomic;
}

pub mod classify;
pub mod config;
pub mod domain;
pub mod stats;

pub mod checkpoint;
pub mod enumerate;
pub mod log;

pub mod transform;

pub mod driver;
pub mod report;

// Re-exports: stable API surface
pub use config::RunConfig;
pub use driver::BatchDriver;
pub use report::{RunReport, format_size};
pub use transform::{TransformFailure, Transformer, TransformerConfig};
