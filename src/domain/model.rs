use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 圖層識別碼，例如 `GTL`、`GBL`。大小寫敏感，兩個封裝之間以此配對。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(String);

impl LayerId {
    /// Builds an identifier from a configured extension, dropping a leading `.`.
    pub fn from_extension(extension: &str) -> Self {
        Self(extension.trim().trim_start_matches('.').to_string())
    }

    /// `board.GTL` -> `GTL`. Only the file name is considered, not parent directories.
    pub fn from_file_name(path: &str) -> Option<Self> {
        let file_name = path.rsplit('/').next().unwrap_or(path);
        file_name
            .split('.')
            .nth(1)
            .filter(|token| !token.is_empty())
            .map(|token| Self(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Safe for use as a file stem inside the workspace.
    pub fn file_stem(&self) -> String {
        self.0
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect()
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LayerId {
    fn from(value: &str) -> Self {
        Self::from_extension(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerContent {
    Bytes(Vec<u8>),
    File(PathBuf),
}

/// 後端偏好的圖層內容形式，決定解壓策略（記憶體或磁碟）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Bytes,
    File,
}

/// One archive's layers. Built once by the extractor, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSet {
    source: PathBuf,
    layers: BTreeMap<LayerId, LayerContent>,
}

impl LayerSet {
    pub fn new(source: impl Into<PathBuf>, layers: BTreeMap<LayerId, LayerContent>) -> Self {
        Self {
            source: source.into(),
            layers,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn get(&self, layer: &LayerId) -> Option<&LayerContent> {
        self.layers.get(layer)
    }

    pub fn ids(&self) -> BTreeSet<LayerId> {
        self.layers.keys().cloned().collect()
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerMatch {
    pub unique_to_old: BTreeSet<LayerId>,
    pub unique_to_new: BTreeSet<LayerId>,
    pub common: Vec<LayerId>,
}

/// Identifier plus the human-readable label printed on the page.
#[derive(Debug, Clone, Copy)]
pub struct LayerRef<'a> {
    pub id: &'a LayerId,
    pub label: &'a str,
    /// 1-based page number in the output document.
    pub page: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// PNG bytes held in memory.
    Memory(Vec<u8>),
    /// PNG file inside the workspace.
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayImage {
    pub layer: LayerId,
    pub label: String,
    pub source: ImageSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderSettings {
    pub color: [u8; 3],
    pub alpha: f32,
}

impl RenderSettings {
    pub const fn new(color: [u8; 3], alpha: f32) -> Self {
        Self { color, alpha }
    }

    pub fn alpha_u8(&self) -> u8 {
        (self.alpha.clamp(0.0, 1.0) * 255.0).round() as u8
    }
}

/// 舊版藍色、新版紅色、白色透明背景。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Palette {
    pub old: RenderSettings,
    pub new: RenderSettings,
    pub background: RenderSettings,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            old: RenderSettings::new([0, 0, 255], 0.5),
            new: RenderSettings::new([255, 0, 0], 0.5),
            background: RenderSettings::new([255, 255, 255], 0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process rasterizer
    #[default]
    Library,
    /// External gerbv process
    Gerbv,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerFilter {
    pub layer_dir: String,
    pub file_pattern: String,
}

impl Default for LayerFilter {
    fn default() -> Self {
        Self {
            layer_dir: "Gerber".to_string(),
            file_pattern: "*.G*".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub dpi: u32,
    pub timeout: Duration,
    pub gerbv_path: PathBuf,
    pub palette: Palette,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            dpi: 300,
            timeout: Duration::from_secs(120),
            gerbv_path: PathBuf::from("gerbv"),
            palette: Palette::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Extracted,
    Matched,
    Rendering,
    Assembled,
    Failed,
    Cleaned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub bytes: Vec<u8>,
    pub page_size: (u32, u32),
    pub pages: Vec<LayerId>,
}

#[derive(Debug, Clone)]
pub struct DiffReport {
    pub output_path: PathBuf,
    pub pages: Vec<LayerId>,
    pub page_size: (u32, u32),
    pub unique_to_old: BTreeSet<LayerId>,
    pub unique_to_new: BTreeSet<LayerId>,
    /// Set when the run succeeded but the workspace could not be removed.
    pub cleanup_error: Option<String>,
}

/// Dry-run outcome: what a full run would render, nothing drawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffPreview {
    pub old_layers: usize,
    pub new_layers: usize,
    pub pages: Vec<LayerId>,
    pub unique_to_old: BTreeSet<LayerId>,
    pub unique_to_new: BTreeSet<LayerId>,
}
