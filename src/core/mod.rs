pub mod assemble;
pub mod engine;
pub mod extract;
pub mod matcher;
pub mod workspace;

pub use crate::domain::ports::{ConfigProvider, OverlayRenderer, Storage};
pub use crate::utils::error::Result;
pub use engine::DiffEngine;
pub use workspace::Workspace;
