use crate::domain::model::RenderSettings;
use crate::render::scene::{Bounds, Point, Primitive, Scene, Shape};
use crate::render::{RasterContext, RenderError};
use tiny_skia::{
    Color, FillRule, LineCap, Paint, Path, PathBuilder, Pixmap, PixmapPaint, Rect, Stroke,
    Transform,
};

const MM_PER_INCH: f64 = 25.4;
const MAX_SIDE_PX: u32 = 16_384;

/// `tiny-skia` canvas. Each layer is drawn opaque into its own pixmap and
/// then composited with the layer alpha, so overlapping features inside one
/// layer do not stack up darker.
pub struct SkiaContext {
    canvas: Pixmap,
    origin: Point,
    height_mm: f64,
    scale: f64,
    background_painted: bool,
}

impl SkiaContext {
    fn to_px(&self, point: Point) -> (f32, f32) {
        let x = (point.x - self.origin.x) * self.scale;
        // gerber 的 Y 軸向上，點陣圖向下
        let y = (self.height_mm - (point.y - self.origin.y)) * self.scale;
        (x as f32, y as f32)
    }

    fn shape_path(&self, at: Point, shape: Shape) -> Option<Path> {
        let (cx, cy) = self.to_px(at);
        match shape {
            Shape::Circle { diameter } => {
                PathBuilder::from_circle(cx, cy, (diameter * self.scale / 2.0) as f32)
            }
            Shape::Rectangle { width, height } => {
                let (w, h) = ((width * self.scale) as f32, (height * self.scale) as f32);
                Rect::from_xywh(cx - w / 2.0, cy - h / 2.0, w, h).map(PathBuilder::from_rect)
            }
            Shape::Obround { width, height } => {
                let (w, h) = ((width * self.scale) as f32, (height * self.scale) as f32);
                let r = w.min(h) / 2.0;
                let mut pb = PathBuilder::new();
                if w >= h {
                    pb.move_to(cx - w / 2.0 + r, cy);
                    pb.line_to(cx + w / 2.0 - r, cy);
                } else {
                    pb.move_to(cx, cy - h / 2.0 + r);
                    pb.line_to(cx, cy + h / 2.0 - r);
                }
                let spine = pb.finish()?;
                let stroke = Stroke {
                    width: r * 2.0,
                    line_cap: LineCap::Round,
                    ..Stroke::default()
                };
                spine
                    .stroke(&stroke, 1.0)
                    .or_else(|| PathBuilder::from_circle(cx, cy, r))
            }
        }
    }

    fn draw(&self, layer: &mut Pixmap, primitive: &Primitive, paint: &Paint<'_>) {
        match primitive {
            Primitive::Flash { at, shape } => {
                if let Some(path) = self.shape_path(*at, *shape) {
                    layer.fill_path(&path, paint, FillRule::Winding, Transform::identity(), None);
                }
            }
            Primitive::Stroke { from, to, shape } => {
                let (x0, y0) = self.to_px(*from);
                let (x1, y1) = self.to_px(*to);
                let (width, cap) = match *shape {
                    Shape::Circle { diameter } => (diameter, LineCap::Round),
                    Shape::Obround { width, height } => (width.min(height), LineCap::Round),
                    Shape::Rectangle { width, height } => (width.min(height), LineCap::Square),
                };
                let width = (width * self.scale) as f32;

                if (x0 - x1).abs() < f32::EPSILON && (y0 - y1).abs() < f32::EPSILON {
                    // 零長度線段等同閃光
                    if let Some(path) = self.shape_path(*from, *shape) {
                        layer.fill_path(&path, paint, FillRule::Winding, Transform::identity(), None);
                    }
                    return;
                }

                let mut pb = PathBuilder::new();
                pb.move_to(x0, y0);
                pb.line_to(x1, y1);
                if let Some(path) = pb.finish() {
                    let stroke = Stroke {
                        width: width.max(1.0),
                        line_cap: cap,
                        ..Stroke::default()
                    };
                    layer.stroke_path(&path, paint, &stroke, Transform::identity(), None);
                }
            }
            Primitive::Region { points } => {
                let mut pb = PathBuilder::new();
                for (index, point) in points.iter().enumerate() {
                    let (x, y) = self.to_px(*point);
                    if index == 0 {
                        pb.move_to(x, y);
                    } else {
                        pb.line_to(x, y);
                    }
                }
                pb.close();
                if let Some(path) = pb.finish() {
                    layer.fill_path(&path, paint, FillRule::EvenOdd, Transform::identity(), None);
                }
            }
        }
    }
}

impl RasterContext for SkiaContext {
    fn new(bounds: Bounds, dpi: u32) -> Result<Self, RenderError> {
        if dpi == 0 {
            return Err(RenderError::new("dpi must be positive"));
        }
        let scale = f64::from(dpi) / MM_PER_INCH;
        let width = (bounds.width() * scale).ceil().max(1.0);
        let height = (bounds.height() * scale).ceil().max(1.0);
        if width > f64::from(MAX_SIDE_PX) || height > f64::from(MAX_SIDE_PX) {
            return Err(RenderError::new(format!(
                "canvas of {}x{} px exceeds the {} px limit, lower the dpi",
                width, height, MAX_SIDE_PX
            )));
        }

        let canvas = Pixmap::new(width as u32, height as u32)
            .ok_or_else(|| RenderError::new("cannot allocate canvas"))?;
        Ok(Self {
            canvas,
            origin: bounds.min,
            height_mm: bounds.height(),
            scale,
            background_painted: false,
        })
    }

    fn render_layer(
        &mut self,
        scene: &Scene,
        settings: &RenderSettings,
        background: &RenderSettings,
    ) -> Result<(), RenderError> {
        if !self.background_painted {
            let [r, g, b] = background.color;
            self.canvas
                .fill(Color::from_rgba8(r, g, b, background.alpha_u8()));
            self.background_painted = true;
        }

        let mut layer = Pixmap::new(self.canvas.width(), self.canvas.height())
            .ok_or_else(|| RenderError::new("cannot allocate layer surface"))?;
        let mut paint = Paint::default();
        let [r, g, b] = settings.color;
        paint.set_color_rgba8(r, g, b, 255);
        paint.anti_alias = true;

        for primitive in &scene.primitives {
            self.draw(&mut layer, primitive, &paint);
        }

        self.canvas.draw_pixmap(
            0,
            0,
            layer.as_ref(),
            &PixmapPaint {
                opacity: settings.alpha.clamp(0.0, 1.0),
                ..PixmapPaint::default()
            },
            Transform::identity(),
            None,
        );
        Ok(())
    }

    fn dump(self) -> Result<Vec<u8>, RenderError> {
        self.canvas
            .encode_png()
            .map_err(|e| RenderError::new(format!("png encoding failed: {}", e)))
    }
}
