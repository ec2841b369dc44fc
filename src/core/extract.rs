use crate::domain::model::{LayerContent, LayerFilter, LayerId, LayerSet};
use crate::utils::error::{DiffError, Result};
use glob::{MatchOptions, Pattern};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Pulls layer files out of a fab package, either into memory or onto disk.
#[derive(Debug, Clone)]
pub struct ArchiveExtractor {
    filter: LayerFilter,
    entry_pattern: Pattern,
}

impl ArchiveExtractor {
    pub fn new(filter: LayerFilter) -> Result<Self> {
        let raw = format!("{}/{}", Pattern::escape(&filter.layer_dir), filter.file_pattern);
        let entry_pattern = Pattern::new(&raw).map_err(|e| DiffError::InvalidConfigValue {
            field: "filter.file_pattern".to_string(),
            value: filter.file_pattern.clone(),
            reason: format!("Invalid glob pattern: {}", e),
        })?;

        Ok(Self {
            filter,
            entry_pattern,
        })
    }

    /// 記憶體模式：符合樣式的項目直接讀成位元組，以檔名第二段為 key。
    pub fn read_layers(&self, archive_path: &Path) -> Result<LayerSet> {
        let mut archive = open_archive(archive_path)?;
        let mut layers = BTreeMap::new();

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.is_dir() || !self.entry_pattern.matches(entry.name()) {
                continue;
            }

            let name = entry.name().to_string();
            let Some(layer) = LayerId::from_file_name(&name) else {
                tracing::debug!("Skipping {} (no layer token in file name)", name);
                continue;
            };

            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;

            if layers.contains_key(&layer) {
                return Err(DiffError::DuplicateLayer {
                    layer: layer.to_string(),
                    matches: duplicate_entries(&layers, &layer, &name),
                });
            }
            tracing::debug!("Read {} ({} bytes) as layer {}", name, data.len(), layer);
            layers.insert(layer, (name, data));
        }

        if layers.is_empty() {
            return Err(self.no_layers(archive_path));
        }

        let layers = layers
            .into_iter()
            .map(|(layer, (_, data))| (layer, LayerContent::Bytes(data)))
            .collect();
        Ok(LayerSet::new(archive_path, layers))
    }

    /// 磁碟模式：整個壓縮檔解到 `dest`，圖層稍後再以副檔名解析。
    pub fn unpack(&self, archive_path: &Path, dest: &Path) -> Result<ExtractedTree> {
        let mut archive = open_archive(archive_path)?;
        archive.extract(dest)?;
        tracing::debug!(
            "Unpacked {} ({} entries) into {}",
            archive_path.display(),
            archive.len(),
            dest.display()
        );

        Ok(ExtractedTree {
            archive: archive_path.to_path_buf(),
            root: dest.to_path_buf(),
            extractor: self.clone(),
        })
    }

    fn no_layers(&self, archive_path: &Path) -> DiffError {
        DiffError::ArchiveFormat {
            archive: archive_path.to_path_buf(),
            message: format!(
                "no entries match {}/{}",
                self.filter.layer_dir, self.filter.file_pattern
            ),
        }
    }
}

/// An archive fully unpacked inside the workspace.
#[derive(Debug, Clone)]
pub struct ExtractedTree {
    archive: PathBuf,
    root: PathBuf,
    extractor: ArchiveExtractor,
}

impl ExtractedTree {
    fn layer_root(&self) -> PathBuf {
        self.root.join(&self.extractor.filter.layer_dir)
    }

    /// Finds the single file under the layer directory ending in `.<extension>`.
    pub fn resolve(&self, extension: &LayerId) -> Result<PathBuf> {
        let pattern = format!(
            "{}/**/*.{}",
            Pattern::escape(&self.layer_root().to_string_lossy()),
            Pattern::escape(extension.as_str())
        );
        let mut matches = glob_files(&pattern)?;
        matches.sort();

        match matches.len() {
            0 => Err(DiffError::LayerNotFound {
                layer: extension.to_string(),
                location: self.archive.display().to_string(),
            }),
            1 => Ok(matches.remove(0)),
            _ => Err(DiffError::DuplicateLayer {
                layer: extension.to_string(),
                matches,
            }),
        }
    }

    /// `wanted` 非空時逐一解析；否則掃描整棵樹，與記憶體模式相同方式取 key。
    pub fn layer_set(&self, wanted: &[LayerId]) -> Result<LayerSet> {
        let mut layers = BTreeMap::new();

        if !wanted.is_empty() {
            for extension in wanted {
                let path = self.resolve(extension)?;
                layers.insert(extension.clone(), LayerContent::File(path));
            }
            return Ok(LayerSet::new(&self.archive, layers));
        }

        let everything = format!("{}/**/*", Pattern::escape(&self.root.to_string_lossy()));
        let mut files = glob_files(&everything)?;
        files.sort();

        for path in files {
            let Ok(relative) = path.strip_prefix(&self.root) else {
                continue;
            };
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if !self.extractor.entry_pattern.matches(&relative) {
                continue;
            }
            let Some(layer) = LayerId::from_file_name(&relative) else {
                continue;
            };

            if let Some(LayerContent::File(existing)) = layers.get(&layer) {
                return Err(DiffError::DuplicateLayer {
                    layer: layer.to_string(),
                    matches: vec![existing.clone(), path],
                });
            }
            layers.insert(layer, LayerContent::File(path));
        }

        if layers.is_empty() {
            return Err(self.extractor.no_layers(&self.archive));
        }
        Ok(LayerSet::new(&self.archive, layers))
    }
}

fn open_archive(path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(path).map_err(|e| DiffError::ArchiveFormat {
        archive: path.to_path_buf(),
        message: format!("cannot open: {}", e),
    })?;
    ZipArchive::new(file).map_err(|e| DiffError::ArchiveFormat {
        archive: path.to_path_buf(),
        message: format!("not a readable zip archive: {}", e),
    })
}

fn glob_files(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob::glob_with(pattern, MatchOptions::new()).map_err(|e| DiffError::Config {
        message: format!("bad layer search pattern {}: {}", pattern, e),
    })?;

    Ok(paths
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!("Skipping unreadable path: {}", e);
                None
            }
        })
        .filter(|path| path.is_file())
        .collect())
}

fn duplicate_entries(
    layers: &BTreeMap<LayerId, (String, Vec<u8>)>,
    layer: &LayerId,
    name: &str,
) -> Vec<PathBuf> {
    let mut matches: Vec<PathBuf> = layers
        .get(layer)
        .map(|(existing, _)| vec![PathBuf::from(existing)])
        .unwrap_or_default();
    matches.push(PathBuf::from(name));
    matches
}
