#![allow(dead_code)]

use async_trait::async_trait;
use gerber_diff::core::Workspace;
use gerber_diff::domain::model::{ContentKind, LayerContent, LayerRef, OverlayImage};
use gerber_diff::domain::ports::OverlayRenderer;
use gerber_diff::utils::error::{DiffError, Result};
use gerber_diff::FileConfig;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use zip::write::FileOptions;
use zip::ZipWriter;

/// A 10 mm trace on a 0.25 mm round aperture, ending at `end_y`.
pub fn trace(end_y: u32) -> String {
    format!(
        "G04 test layer*\n%FSLAX24Y24*%\n%MOMM*%\n%ADD10C,0.25*%\nD10*\nX0Y0D02*\nX100000Y{}D01*\nX0Y0D03*\nM02*\n",
        end_y * 10000
    )
}

pub fn write_zip(path: &Path, entries: &[(String, String)]) {
    let mut writer = ZipWriter::new(std::fs::File::create(path).unwrap());
    for (name, content) in entries {
        writer
            .start_file::<_, ()>(name.as_str(), FileOptions::default())
            .unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}

/// Zip with one `Gerber/board.<ext>` entry per layer.
pub fn board_zip(path: &Path, layers: &[&str], end_y: u32) {
    let entries: Vec<(String, String)> = layers
        .iter()
        .map(|ext| (format!("Gerber/board.{}", ext), trace(end_y)))
        .collect();
    write_zip(path, &entries);
}

pub struct Fixture {
    pub temp: TempDir,
    pub old: PathBuf,
    pub new: PathBuf,
}

impl Fixture {
    pub fn new(old_layers: &[&str], new_layers: &[&str]) -> Self {
        let temp = TempDir::new().unwrap();
        let old = temp.path().join("rev_a.zip");
        let new = temp.path().join("rev_b.zip");
        board_zip(&old, old_layers, 0);
        board_zip(&new, new_layers, 5);
        Self { temp, old, new }
    }

    pub fn workspace(&self) -> PathBuf {
        self.temp.path().join("ws")
    }

    pub fn output(&self) -> PathBuf {
        self.temp.path().join("out").join("diff.pdf")
    }

    /// Config file contents pointing at this fixture; `extra` is appended verbatim.
    pub fn config(&self, extra: &str) -> FileConfig {
        let toml = format!(
            "old_archive = {:?}\nnew_archive = {:?}\noutput_file = {:?}\nworkspace_dir = {:?}\n{}",
            self.old.to_str().unwrap(),
            self.new.to_str().unwrap(),
            self.temp.path().join("out").join("diff").to_str().unwrap(),
            self.workspace().to_str().unwrap(),
            extra
        );
        FileConfig::from_toml_str(&toml).unwrap()
    }
}

pub fn count(haystack: &[u8], needle: &[u8]) -> usize {
    haystack.windows(needle.len()).filter(|w| *w == needle).count()
}

pub fn page_count(pdf: &[u8]) -> usize {
    count(pdf, b"/Type /Page") - count(pdf, b"/Type /Pages")
}

/// Wraps a renderer, records every call and can fail on the n-th one.
pub struct Recording<R> {
    pub inner: R,
    pub calls: Arc<Mutex<Vec<String>>>,
    pub fail_on_call: Option<usize>,
}

impl<R> Recording<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_on_call: None,
        }
    }

    pub fn failing_on(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }
}

#[async_trait]
impl<R: OverlayRenderer> OverlayRenderer for Recording<R> {
    fn preferred_content(&self) -> ContentKind {
        self.inner.preferred_content()
    }

    async fn render(
        &self,
        old: &LayerContent,
        new: &LayerContent,
        layer: LayerRef<'_>,
        workspace: &Workspace,
    ) -> Result<OverlayImage> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(layer.id.to_string());
            calls.len()
        };
        if self.fail_on_call == Some(call) {
            return Err(DiffError::render(layer.id, "forced failure"));
        }
        self.inner.render(old, new, layer, workspace).await
    }
}
