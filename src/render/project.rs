use crate::domain::model::{Palette, RenderSettings};
use crate::utils::error::{DiffError, Result};
use std::path::{Path, PathBuf};

/// Fill-once builder for a two-layer gerbv project.
#[derive(Debug, Default)]
pub struct ProjectBuilder {
    old_layer: Option<PathBuf>,
    new_layer: Option<PathBuf>,
}

impl ProjectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn old_layer(mut self, path: impl Into<PathBuf>) -> Result<Self> {
        Self::fill(&mut self.old_layer, "old", path.into())?;
        Ok(self)
    }

    pub fn new_layer(mut self, path: impl Into<PathBuf>) -> Result<Self> {
        Self::fill(&mut self.new_layer, "new", path.into())?;
        Ok(self)
    }

    fn fill(slot: &mut Option<PathBuf>, name: &str, path: PathBuf) -> Result<()> {
        if slot.is_some() {
            return Err(DiffError::Descriptor {
                message: format!("{} layer assigned twice", name),
            });
        }
        *slot = Some(path);
        Ok(())
    }

    pub fn build(self, palette: Palette) -> Result<Project> {
        let missing = |name: &str| DiffError::Descriptor {
            message: format!("{} layer was never assigned", name),
        };
        Ok(Project {
            old_layer: self.old_layer.ok_or_else(|| missing("old"))?,
            new_layer: self.new_layer.ok_or_else(|| missing("new"))?,
            palette,
        })
    }
}

/// 完成後不可變的 gerbv 專案描述。
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    old_layer: PathBuf,
    new_layer: PathBuf,
    palette: Palette,
}

impl Project {
    /// gerbv scheme project text. Layer 0 is drawn on top, so the new layer
    /// takes index 0 and the old one index 1.
    pub fn to_scheme(&self) -> String {
        let mut out = String::from("(gerbv-file-version! \"2.0A\")\n");
        push_layer(&mut out, 1, &self.old_layer, &self.palette.old);
        push_layer(&mut out, 0, &self.new_layer, &self.palette.new);

        let [r, g, b] = self.palette.background.color.map(channel16);
        out.push_str(&format!(
            "(define-layer! -1 (cons 'filename \"{}\")(cons 'visible #f)(cons 'color #({} {} {})))\n",
            escape(&self.old_layer),
            r,
            g,
            b
        ));
        // 1 = XOR 疊圖
        out.push_str("(set-render-type! 1)\n");
        out
    }
}

fn push_layer(out: &mut String, index: i32, path: &Path, settings: &RenderSettings) {
    let [r, g, b] = settings.color.map(channel16);
    let alpha = (f64::from(settings.alpha.clamp(0.0, 1.0)) * 65535.0).round() as u32;
    out.push_str(&format!(
        "(define-layer! {} (cons 'filename \"{}\")(cons 'visible #t)(cons 'color #({} {} {}))(cons 'alpha #({})))\n",
        index,
        escape(path),
        r,
        g,
        b,
        alpha
    ));
}

fn channel16(value: u8) -> u32 {
    u32::from(value) * 257
}

fn escape(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
}
