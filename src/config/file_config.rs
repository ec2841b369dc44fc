use crate::config::{
    default_workspace_dir, pdf_file_name, DEFAULT_OUTPUT, MAX_DPI, MAX_TIMEOUT_SECONDS,
};
use crate::domain::model::{BackendKind, LayerFilter, LayerId, Palette, RenderOptions};
use crate::domain::ports::ConfigProvider;
use crate::utils::error::{DiffError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 設定檔內容。副檔名為 `.json` 時以 JSON 解析，其餘一律視為 TOML。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub old_archive: PathBuf,
    #[serde(default)]
    pub new_archive: PathBuf,
    #[serde(default = "default_output")]
    pub output_file: String,
    #[serde(default)]
    pub layers: Vec<LayerEntry>,
    #[serde(default)]
    pub layer_order: Option<Vec<String>>,
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default)]
    pub workspace_dir: Option<PathBuf>,
    #[serde(default)]
    pub filter: LayerFilter,
    #[serde(default)]
    pub render: RenderSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerEntry {
    pub extension: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSection {
    pub dpi: u32,
    pub timeout_seconds: u64,
    pub gerbv_path: PathBuf,
    pub palette: Palette,
}

impl Default for RenderSection {
    fn default() -> Self {
        let options = RenderOptions::default();
        Self {
            dpi: options.dpi,
            timeout_seconds: options.timeout.as_secs(),
            gerbv_path: options.gerbv_path,
            palette: options.palette,
        }
    }
}

fn default_output() -> String {
    DEFAULT_OUTPUT.to_string()
}

impl FileConfig {
    /// 從檔案載入設定
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| DiffError::Config {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = substitute_env_vars(content)?;
        toml::from_str(&processed_content).map_err(|e| DiffError::Config {
            message: format!("TOML parsing error: {}", e),
        })
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let processed_content = substitute_env_vars(content)?;
        serde_json::from_str(&processed_content).map_err(|e| DiffError::Config {
            message: format!("JSON parsing error: {}", e),
        })
    }

    fn layer_ids(&self) -> Vec<LayerId> {
        self.layers
            .iter()
            .map(|entry| LayerId::from_extension(&entry.extension))
            .collect()
    }

    fn ordered_ids(&self) -> Option<Vec<LayerId>> {
        self.layer_order
            .as_ref()
            .map(|order| order.iter().map(|ext| LayerId::from_extension(ext)).collect())
    }
}

/// 替換環境變數 (例如 ${BOARD_DIR})，未設定的變數保持原樣
fn substitute_env_vars(content: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| DiffError::Config {
        message: format!("invalid substitution pattern: {}", e),
    })?;

    let result = re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
    });

    Ok(result.into_owned())
}

impl ConfigProvider for FileConfig {
    fn old_archive(&self) -> &Path {
        &self.old_archive
    }

    fn new_archive(&self) -> &Path {
        &self.new_archive
    }

    fn output_file(&self) -> PathBuf {
        pdf_file_name(&self.output_file)
    }

    fn backend(&self) -> BackendKind {
        self.backend
    }

    fn layer_filter(&self) -> LayerFilter {
        self.filter.clone()
    }

    fn configured_layers(&self) -> Vec<LayerId> {
        self.layer_ids()
    }

    fn layer_order(&self) -> Option<Vec<LayerId>> {
        self.ordered_ids()
    }

    fn layer_label(&self, layer: &LayerId) -> String {
        self.layers
            .iter()
            .find(|entry| LayerId::from_extension(&entry.extension) == *layer)
            .and_then(|entry| entry.label.clone())
            .filter(|label| !label.trim().is_empty())
            .unwrap_or_else(|| layer.to_string())
    }

    fn workspace_dir(&self) -> PathBuf {
        self.workspace_dir
            .clone()
            .unwrap_or_else(default_workspace_dir)
    }

    fn render_options(&self) -> RenderOptions {
        RenderOptions {
            dpi: self.render.dpi,
            timeout: Duration::from_secs(self.render.timeout_seconds),
            gerbv_path: self.render.gerbv_path.clone(),
            palette: self.render.palette,
        }
    }
}

impl Validate for FileConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_required_path("old_archive", &self.old_archive)?;
        validation::validate_required_path("new_archive", &self.new_archive)?;
        validation::validate_non_empty_string("output_file", &self.output_file)?;
        validation::validate_non_empty_string("filter.layer_dir", &self.filter.layer_dir)?;
        validation::validate_glob("filter.file_pattern", &self.filter.file_pattern)?;
        validation::validate_layer_list("layers", &self.layer_ids())?;
        if let Some(order) = self.ordered_ids() {
            validation::validate_layer_list("layer_order", &order)?;
        }
        if let Some(workspace) = &self.workspace_dir {
            validation::validate_path("workspace_dir", workspace)?;
        }
        validation::validate_range("render.dpi", self.render.dpi, 1, MAX_DPI)?;
        validation::validate_range(
            "render.timeout_seconds",
            self.render.timeout_seconds,
            1,
            MAX_TIMEOUT_SECONDS,
        )?;
        validation::validate_path("render.gerbv_path", &self.render.gerbv_path)?;

        let palette = &self.render.palette;
        for (field, settings) in [
            ("render.palette.old", palette.old),
            ("render.palette.new", palette.new),
            ("render.palette.background", palette.background),
        ] {
            validation::validate_range(field, settings.alpha, 0.0, 1.0)?;
        }

        let workspace = self.workspace_dir();
        let output = self.output_file();
        for (field, path) in [
            ("old_archive", self.old_archive.as_path()),
            ("new_archive", self.new_archive.as_path()),
            ("output_file", output.as_path()),
        ] {
            validation::validate_outside_workspace(&workspace, field, path)?;
        }

        validation::validate_archive("old_archive", &self.old_archive)?;
        validation::validate_archive("new_archive", &self.new_archive)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::RenderSettings;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FULL: &str = r#"
old_archive = "rev_a.zip"
new_archive = "rev_b.zip"
output_file = "diff"
layer_order = ["GTL", "GBL"]
backend = "gerbv"
workspace_dir = "/tmp/gd"

[[layers]]
extension = "GTL"
label = "Top Copper"

[[layers]]
extension = ".GBL"

[filter]
layer_dir = "fab"

[render]
dpi = 600
timeout_seconds = 30

[render.palette.old]
color = [0, 128, 0]
alpha = 0.25
"#;

    #[test]
    fn test_parse_full_toml_config() {
        let config = FileConfig::from_toml_str(FULL).unwrap();

        assert_eq!(config.old_archive(), Path::new("rev_a.zip"));
        assert_eq!(config.output_file(), PathBuf::from("diff.pdf"));
        assert_eq!(config.backend(), BackendKind::Gerbv);
        assert_eq!(config.workspace_dir(), PathBuf::from("/tmp/gd"));
        assert_eq!(
            config.configured_layers(),
            vec![LayerId::from("GTL"), LayerId::from("GBL")]
        );
        assert_eq!(
            config.layer_order(),
            Some(vec![LayerId::from("GTL"), LayerId::from("GBL")])
        );
        assert_eq!(config.layer_label(&LayerId::from("GTL")), "Top Copper");
        assert_eq!(config.layer_label(&LayerId::from("GBL")), "GBL");

        let filter = config.layer_filter();
        assert_eq!(filter.layer_dir, "fab");
        assert_eq!(filter.file_pattern, "*.G*");

        let options = config.render_options();
        assert_eq!(options.dpi, 600);
        assert_eq!(options.timeout, Duration::from_secs(30));
        assert_eq!(options.gerbv_path, PathBuf::from("gerbv"));
        assert_eq!(options.palette.old, RenderSettings::new([0, 128, 0], 0.25));
        assert_eq!(options.palette.new, Palette::default().new);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = FileConfig::from_toml_str(
            r#"
old_archive = "a.zip"
new_archive = "b.zip"
"#,
        )
        .unwrap();

        assert_eq!(config.output_file(), PathBuf::from("diff.pdf"));
        assert_eq!(config.backend(), BackendKind::Library);
        assert!(config.layer_order().is_none());
        assert!(config.configured_layers().is_empty());
        assert_eq!(config.render_options(), RenderOptions::default());
    }

    #[test]
    fn test_unset_archive_is_missing_config() {
        let config = FileConfig::from_toml_str(r#"new_archive = "b.zip""#).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, DiffError::MissingConfig { ref field } if field == "old_archive"));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_archive_that_does_not_exist_is_archive_error() {
        let new = NamedTempFile::new().unwrap();
        let config = FileConfig::from_toml_str(&format!(
            "old_archive = \"/nope/a.zip\"\nnew_archive = {:?}\n",
            new.path().to_str().unwrap()
        ))
        .unwrap();

        let err = config.validate().unwrap_err();
        assert!(matches!(err, DiffError::ArchiveFormat { ref archive, .. } if archive == Path::new("/nope/a.zip")));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_workspace_must_not_contain_inputs_or_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let old = dir.path().join("boards").join("a.zip");
        let new = dir.path().join("b.zip");
        std::fs::create_dir_all(old.parent().unwrap()).unwrap();
        std::fs::write(&old, b"zip").unwrap();
        std::fs::write(&new, b"zip").unwrap();
        let config = |workspace: &Path, output: &Path| {
            FileConfig::from_toml_str(&format!(
                "old_archive = {:?}\nnew_archive = {:?}\noutput_file = {:?}\nworkspace_dir = {:?}\n",
                old.to_str().unwrap(),
                new.to_str().unwrap(),
                output.to_str().unwrap(),
                workspace.to_str().unwrap()
            ))
            .unwrap()
        };
        let outside = dir.path().join("out").join("diff");

        assert!(config(&dir.path().join("ws"), &outside).validate().is_ok());

        // output inside the workspace
        let ws = dir.path().join("ws");
        let err = config(&ws, &ws.join("diff")).validate().unwrap_err();
        assert!(matches!(err, DiffError::InvalidConfigValue { ref reason, .. } if reason.contains("output_file")));
        assert_eq!(err.exit_code(), 1);

        // an archive inside the workspace
        let err = config(&dir.path().join("boards"), &outside).validate().unwrap_err();
        assert!(matches!(err, DiffError::InvalidConfigValue { ref reason, .. } if reason.contains("old_archive")));

        // the workspace is the archive itself
        let err = config(&new, &outside).validate().unwrap_err();
        assert!(matches!(err, DiffError::InvalidConfigValue { ref reason, .. } if reason.contains("new_archive")));

        // the workspace is a parent of everything
        let err = config(dir.path(), &outside).validate().unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("GERBER_DIFF_TEST_BOARD_DIR", "/boards");

        let config = FileConfig::from_toml_str(
            r#"
old_archive = "${GERBER_DIFF_TEST_BOARD_DIR}/a.zip"
new_archive = "${GERBER_DIFF_TEST_UNSET_VAR}/b.zip"
"#,
        )
        .unwrap();

        assert_eq!(config.old_archive, PathBuf::from("/boards/a.zip"));
        assert_eq!(
            config.new_archive,
            PathBuf::from("${GERBER_DIFF_TEST_UNSET_VAR}/b.zip")
        );

        std::env::remove_var("GERBER_DIFF_TEST_BOARD_DIR");
    }

    #[test]
    fn test_json_config_from_file() {
        let mut temp_file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        temp_file
            .write_all(
                br#"{
  "old_archive": "a.zip",
  "new_archive": "b.zip",
  "layers": [{"extension": "GTO", "label": "Top Silk"}],
  "render": {"dpi": 150}
}"#,
            )
            .unwrap();

        let config = FileConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.layer_label(&LayerId::from("GTO")), "Top Silk");
        assert_eq!(config.render_options().dpi, 150);
        assert_eq!(config.render_options().timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_toml_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(FULL.as_bytes()).unwrap();

        let config = FileConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.backend(), BackendKind::Gerbv);
    }

    #[test]
    fn test_validation() {
        let old = NamedTempFile::new().unwrap();
        let new = NamedTempFile::new().unwrap();
        let base = format!(
            "old_archive = {:?}\nnew_archive = {:?}\n",
            old.path().to_str().unwrap(),
            new.path().to_str().unwrap()
        );

        let config = FileConfig::from_toml_str(&base).unwrap();
        assert!(config.validate().is_ok());

        let config = FileConfig::from_toml_str(&format!("{}[render]\ndpi = 0\n", base)).unwrap();
        assert!(config.validate().is_err());

        let config =
            FileConfig::from_toml_str(&format!("{}[render]\ntimeout_seconds = 0\n", base)).unwrap();
        assert!(config.validate().is_err());

        let config = FileConfig::from_toml_str(&format!(
            "{}layer_order = [\"GTL\", \"GTL\"]\n",
            base
        ))
        .unwrap();
        assert!(config.validate().is_err());

        let config = FileConfig::from_toml_str(
            "old_archive = \"\"\nnew_archive = \"b.zip\"\n",
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(DiffError::MissingConfig { .. })
        ));
    }
}
