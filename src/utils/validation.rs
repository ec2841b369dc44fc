use crate::domain::model::LayerId;
use crate::utils::error::{DiffError, Result};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_path(field_name: &str, path: &Path) -> Result<()> {
    let as_text = path.to_string_lossy();
    if as_text.trim().is_empty() {
        return Err(DiffError::InvalidConfigValue {
            field: field_name.to_string(),
            value: as_text.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if as_text.contains('\0') {
        return Err(DiffError::InvalidConfigValue {
            field: field_name.to_string(),
            value: as_text.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

/// 必填的路徑欄位；空字串視為未設定。
pub fn validate_required_path(field_name: &str, path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(DiffError::MissingConfig {
            field: field_name.to_string(),
        });
    }
    validate_path(field_name, path)
}

/// 輸入壓縮檔必須存在；不存在屬於壓縮檔錯誤，而非設定錯誤。
pub fn validate_archive(field_name: &str, path: &Path) -> Result<()> {
    validate_required_path(field_name, path)?;
    if !path.is_file() {
        return Err(DiffError::ArchiveFormat {
            archive: path.to_path_buf(),
            message: "file does not exist".to_string(),
        });
    }
    Ok(())
}

/// The workspace root is deleted when a run starts and again when it ends,
/// so nothing the run reads or writes may live at or below it.
pub fn validate_outside_workspace(
    workspace: &Path,
    field_name: &str,
    path: &Path,
) -> Result<()> {
    if resolved(path).starts_with(resolved(workspace)) {
        return Err(DiffError::InvalidConfigValue {
            field: "workspace_dir".to_string(),
            value: workspace.display().to_string(),
            reason: format!(
                "Workspace contains {} ({}), which would be deleted",
                field_name,
                path.display()
            ),
        });
    }
    Ok(())
}

/// Absolute form of `path`: `.` and `..` folded, and the deepest existing
/// ancestor canonicalized so symlinked prefixes compare equal.
fn resolved(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut absolute = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                absolute.pop();
            }
            other => absolute.push(other.as_os_str()),
        }
    }

    for ancestor in absolute.ancestors() {
        if let Ok(real) = ancestor.canonicalize() {
            return match absolute.strip_prefix(ancestor) {
                Ok(rest) if !rest.as_os_str().is_empty() => real.join(rest),
                _ => real,
            };
        }
    }
    absolute
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DiffError::InvalidConfigValue {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(DiffError::InvalidConfigValue {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

pub fn validate_glob(field_name: &str, pattern: &str) -> Result<()> {
    glob::Pattern::new(pattern).map_err(|e| DiffError::InvalidConfigValue {
        field: field_name.to_string(),
        value: pattern.to_string(),
        reason: format!("Invalid glob pattern: {}", e),
    })?;
    Ok(())
}

/// Layer lists must be non-empty tokens and must not repeat.
pub fn validate_layer_list(field_name: &str, layers: &[LayerId]) -> Result<()> {
    let mut seen = HashSet::new();
    for layer in layers {
        validate_non_empty_string(field_name, layer.as_str())?;
        if !seen.insert(layer) {
            return Err(DiffError::InvalidConfigValue {
                field: field_name.to_string(),
                value: layer.to_string(),
                reason: "Layer listed more than once".to_string(),
            });
        }
    }
    Ok(())
}
