use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiffError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing configuration field: {field}")]
    MissingConfig { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Archive {archive} is unusable: {message}")]
    ArchiveFormat { archive: PathBuf, message: String },

    #[error("Zip operation failed: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Layer {layer} not found in {location}")]
    LayerNotFound { layer: String, location: String },

    #[error("Layer {layer} is ambiguous, {} files match: {matches:?}", .matches.len())]
    DuplicateLayer { layer: String, matches: Vec<PathBuf> },

    #[error("No layers in common between the two packages")]
    NoCommonLayers,

    #[error("Rendering layer {layer} failed: {message}")]
    Render { layer: String, message: String },

    #[error("Project descriptor error: {message}")]
    Descriptor { message: String },

    #[error("Rendering layer {layer} timed out after {seconds}s")]
    Timeout { layer: String, seconds: u64 },

    #[error("Run cancelled after {completed} layer(s)")]
    Cancelled { completed: usize },

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Workspace error at {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Archive,
    Layer,
    Render,
    Io,
}

impl DiffError {
    pub fn render(layer: impl ToString, message: impl ToString) -> Self {
        DiffError::Render {
            layer: layer.to_string(),
            message: message.to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            DiffError::Config { .. }
            | DiffError::MissingConfig { .. }
            | DiffError::InvalidConfigValue { .. } => ErrorCategory::Configuration,
            DiffError::ArchiveFormat { .. } | DiffError::Zip(_) => ErrorCategory::Archive,
            DiffError::LayerNotFound { .. }
            | DiffError::DuplicateLayer { .. }
            | DiffError::NoCommonLayers => ErrorCategory::Layer,
            DiffError::Render { .. }
            | DiffError::Descriptor { .. }
            | DiffError::Timeout { .. }
            | DiffError::Cancelled { .. }
            | DiffError::Image(_) => ErrorCategory::Render,
            DiffError::Workspace { .. } | DiffError::Io(_) => ErrorCategory::Io,
        }
    }

    /// 0 成功、1 設定錯誤、2 壓縮檔/圖層錯誤、3 繪製/後端/輸出錯誤
    pub fn exit_code(&self) -> i32 {
        match self.category() {
            ErrorCategory::Configuration => 1,
            ErrorCategory::Archive | ErrorCategory::Layer => 2,
            ErrorCategory::Render | ErrorCategory::Io => 3,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            DiffError::Zip(e) => format!("Could not read the fab package: {}", e),
            DiffError::NoCommonLayers => {
                "The two fab packages share no layer files, nothing to compare".to_string()
            }
            DiffError::Timeout { layer, seconds } => format!(
                "The external viewer did not finish layer {} within {} seconds",
                layer, seconds
            ),
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            DiffError::Config { .. }
            | DiffError::MissingConfig { .. }
            | DiffError::InvalidConfigValue { .. } => {
                "Check the configuration file or command line arguments"
            }
            DiffError::ArchiveFormat { .. } | DiffError::Zip(_) => {
                "Make sure both archives are valid zip files with a layer directory (default Gerber/)"
            }
            DiffError::LayerNotFound { .. } | DiffError::NoCommonLayers => {
                "Compare the layer list with the extensions present in both archives"
            }
            DiffError::DuplicateLayer { .. } => {
                "Remove the extra file or configure a more specific extension"
            }
            DiffError::Render { .. } | DiffError::Image(_) | DiffError::Descriptor { .. } => {
                "Check that the layer files are valid gerber data, or try the other backend"
            }
            DiffError::Timeout { .. } => "Raise the timeout or verify that gerbv runs headless",
            DiffError::Cancelled { .. } => "Run the diff again when ready",
            DiffError::Workspace { .. } | DiffError::Io(_) => {
                "Check permissions and free space for the workspace and output paths"
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, DiffError>;
