pub mod file_config;

pub use file_config::FileConfig;

use std::path::PathBuf;

#[cfg(feature = "cli")]
use crate::domain::model::{BackendKind, LayerFilter, LayerId, RenderOptions};
#[cfg(feature = "cli")]
use crate::domain::ports::ConfigProvider;
#[cfg(feature = "cli")]
use crate::utils::error::Result;
#[cfg(feature = "cli")]
use crate::utils::validation::{self, Validate};
#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use std::path::Path;
#[cfg(feature = "cli")]
use std::time::Duration;

pub const DEFAULT_OUTPUT: &str = "diff.pdf";
pub const MAX_DPI: u32 = 2400;
pub const MAX_TIMEOUT_SECONDS: u64 = 3600;

/// `diff` -> `diff.pdf`; names already ending in `.pdf` (any case) are kept.
pub fn pdf_file_name(name: &str) -> PathBuf {
    let name = name.trim();
    if name.to_ascii_lowercase().ends_with(".pdf") {
        PathBuf::from(name)
    } else {
        PathBuf::from(format!("{}.pdf", name))
    }
}

/// 預設工作目錄：系統暫存目錄下的 `gerber-diff`
pub fn default_workspace_dir() -> PathBuf {
    std::env::temp_dir().join("gerber-diff")
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "gerber-diff")]
#[command(about = "Overlay two gerber fab packages layer by layer into one PDF")]
#[command(version)]
pub struct CliConfig {
    /// Zip of the previous revision
    pub old_archive: PathBuf,

    /// Zip of the new revision
    pub new_archive: PathBuf,

    /// Output PDF file (".pdf" is appended when missing)
    #[arg(long, default_value = DEFAULT_OUTPUT)]
    pub name: String,

    /// Layer extensions to compare, in page order (space- or comma-separated)
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub list: Vec<String>,

    #[arg(long, value_enum, default_value = "library")]
    pub backend: BackendKind,

    /// Directory inside the archives holding the layer files
    #[arg(long, default_value = "Gerber")]
    pub layer_dir: String,

    /// Glob for layer file names inside the layer directory
    #[arg(long, default_value = "*.G*")]
    pub pattern: String,

    /// Scratch directory, wiped at start and removed at the end
    #[arg(long)]
    pub workspace: Option<PathBuf>,

    #[arg(long, default_value_t = 300)]
    pub dpi: u32,

    /// gerbv executable
    #[arg(long, default_value = "gerbv")]
    pub gerbv: PathBuf,

    /// Per-layer gerbv timeout in seconds
    #[arg(long, default_value_t = 120)]
    pub timeout: u64,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log memory and CPU usage per phase")]
    pub monitor: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    fn listed_layers(&self) -> Vec<LayerId> {
        self.list
            .iter()
            .map(|token| LayerId::from_extension(token))
            .filter(|layer| !layer.as_str().is_empty())
            .collect()
    }
}

#[cfg(feature = "cli")]
impl ConfigProvider for CliConfig {
    fn old_archive(&self) -> &Path {
        &self.old_archive
    }

    fn new_archive(&self) -> &Path {
        &self.new_archive
    }

    fn output_file(&self) -> PathBuf {
        pdf_file_name(&self.name)
    }

    fn backend(&self) -> BackendKind {
        self.backend
    }

    fn layer_filter(&self) -> LayerFilter {
        LayerFilter {
            layer_dir: self.layer_dir.clone(),
            file_pattern: self.pattern.clone(),
        }
    }

    fn configured_layers(&self) -> Vec<LayerId> {
        self.listed_layers()
    }

    fn layer_order(&self) -> Option<Vec<LayerId>> {
        let listed = self.listed_layers();
        (!listed.is_empty()).then_some(listed)
    }

    fn layer_label(&self, layer: &LayerId) -> String {
        layer.to_string()
    }

    fn workspace_dir(&self) -> PathBuf {
        self.workspace.clone().unwrap_or_else(default_workspace_dir)
    }

    fn render_options(&self) -> RenderOptions {
        RenderOptions {
            dpi: self.dpi,
            timeout: Duration::from_secs(self.timeout),
            gerbv_path: self.gerbv.clone(),
            ..RenderOptions::default()
        }
    }
}

#[cfg(feature = "cli")]
impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_required_path("old_archive", &self.old_archive)?;
        validation::validate_required_path("new_archive", &self.new_archive)?;
        validation::validate_non_empty_string("name", &self.name)?;
        validation::validate_non_empty_string("layer_dir", &self.layer_dir)?;
        validation::validate_glob("pattern", &self.pattern)?;
        validation::validate_range("dpi", self.dpi, 1, MAX_DPI)?;
        validation::validate_range("timeout", self.timeout, 1, MAX_TIMEOUT_SECONDS)?;
        validation::validate_layer_list("list", &self.listed_layers())?;
        if let Some(workspace) = &self.workspace {
            validation::validate_path("workspace", workspace)?;
        }

        let workspace = self.workspace_dir();
        let output = self.output_file();
        for (field, path) in [
            ("old_archive", self.old_archive.as_path()),
            ("new_archive", self.new_archive.as_path()),
            ("name", output.as_path()),
        ] {
            validation::validate_outside_workspace(&workspace, field, path)?;
        }

        validation::validate_archive("old_archive", &self.old_archive)?;
        validation::validate_archive("new_archive", &self.new_archive)?;
        Ok(())
    }
}
