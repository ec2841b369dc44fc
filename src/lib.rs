pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod render;
pub mod utils;

pub use adapters::LocalStorage;
pub use config::FileConfig;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use core::{DiffEngine, Workspace};
pub use domain::model::{BackendKind, DiffPreview, DiffReport, LayerId, Palette, RenderSettings};
pub use utils::error::{DiffError, Result};
