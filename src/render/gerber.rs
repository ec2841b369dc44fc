use crate::render::scene::{Point, Primitive, Scene, Shape};
use crate::render::{RenderError, SceneLoader};
use regex::Regex;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::LazyLock;

static FORMAT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^FS([LT])?[AI]?.*?X(\d)(\d)Y(\d)(\d)").unwrap());
static APERTURE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ADD(\d+)([A-Za-z_$][A-Za-z0-9_.$]*)(?:,(.*))?$").unwrap());
static OPERATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:G0?([123]))?(?:X([+-]?[\d.]+))?(?:Y([+-]?[\d.]+))?(?:I([+-]?[\d.]+))?(?:J([+-]?[\d.]+))?(?:D0?([123]))?$",
    )
    .unwrap()
});
static SELECT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?:G54)?D(\d+)$").unwrap());

/// 圓弧以折線近似，每段弦長約 0.1 mm
const ARC_STEP_MM: f64 = 0.1;
const MAX_ARC_SEGMENTS: usize = 720;

/// Loads the RS-274X subset needed to preview copper, mask and silkscreen.
///
/// Standard apertures (C, R, O, P), linear and circular interpolation,
/// flashes and G36/G37 regions are supported. Aperture macros,
/// step-and-repeat and clear polarity are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct GerberLoader;

impl SceneLoader for GerberLoader {
    fn load(&self, source: &str) -> Result<Scene, RenderError> {
        let mut parser = Parser::default();
        let compact: String = source.chars().filter(|c| !c.is_whitespace()).collect();

        for raw in compact.split('*') {
            let word = raw.trim_matches('%');
            if word.is_empty() {
                continue;
            }
            if !parser.word(word)? {
                break;
            }
        }

        if !parser.recognized && !compact.is_empty() {
            return Err(RenderError::new("no gerber commands found"));
        }
        parser.close_contour();
        Ok(Scene {
            primitives: parser.primitives,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Interpolation {
    Linear,
    Clockwise,
    CounterClockwise,
}

#[derive(Debug, Clone, Copy)]
struct CoordinateFormat {
    decimals: u32,
    digits: usize,
    omit_trailing: bool,
}

struct Parser {
    format: CoordinateFormat,
    /// 每單位對應的毫米數
    unit_mm: f64,
    apertures: HashMap<u32, Shape>,
    aperture: Option<u32>,
    position: Point,
    interpolation: Interpolation,
    multi_quadrant: bool,
    last_operation: Option<u8>,
    region: bool,
    contour: Vec<Point>,
    primitives: Vec<Primitive>,
    recognized: bool,
}

impl Default for Parser {
    fn default() -> Self {
        Self {
            format: CoordinateFormat {
                decimals: 4,
                digits: 6,
                omit_trailing: false,
            },
            unit_mm: 25.4,
            apertures: HashMap::new(),
            aperture: None,
            position: Point::new(0.0, 0.0),
            interpolation: Interpolation::Linear,
            multi_quadrant: false,
            last_operation: None,
            region: false,
            contour: Vec::new(),
            primitives: Vec::new(),
            recognized: false,
        }
    }
}

impl Parser {
    /// Returns `false` once the end-of-file code is reached.
    fn word(&mut self, word: &str) -> Result<bool, RenderError> {
        if word.starts_with("G04") {
            return Ok(true);
        }

        match word {
            "M02" | "M00" | "M2" | "M0" => return Ok(false),
            "MOMM" | "G71" => return Ok(self.units(1.0)),
            "MOIN" | "G70" => return Ok(self.units(25.4)),
            "G36" => {
                self.recognized = true;
                self.region = true;
                self.contour.clear();
                return Ok(true);
            }
            "G37" => {
                self.close_contour();
                self.region = false;
                return Ok(true);
            }
            "G74" => {
                self.multi_quadrant = false;
                return Ok(true);
            }
            "G75" => {
                self.multi_quadrant = true;
                return Ok(true);
            }
            _ => {}
        }

        if word.starts_with("FS") {
            return self.format(word).map(|_| true);
        }
        if word.starts_with("ADD") {
            self.aperture_definition(word)?;
            return Ok(true);
        }
        if word.starts_with("LPC") || word.starts_with("SR") || word.starts_with("AM") {
            tracing::debug!("Ignoring unsupported gerber command {}", word);
            return Ok(true);
        }
        if let Some(caps) = SELECT_RE.captures(word) {
            let code: u32 = caps[1].parse().map_err(|_| RenderError::new(format!("bad D code {}", word)))?;
            if code >= 10 {
                self.recognized = true;
                self.aperture = Some(code);
                return Ok(true);
            }
        }
        if let Some(caps) = OPERATION_RE.captures(word) {
            self.operation(&caps)?;
            return Ok(true);
        }

        tracing::trace!("Skipping gerber word {}", word);
        Ok(true)
    }

    fn units(&mut self, unit_mm: f64) -> bool {
        self.recognized = true;
        self.unit_mm = unit_mm;
        true
    }

    fn format(&mut self, word: &str) -> Result<(), RenderError> {
        let caps = FORMAT_RE
            .captures(word)
            .ok_or_else(|| RenderError::new(format!("unreadable format statement {}", word)))?;
        let integer: usize = caps[2].parse().unwrap_or(2);
        let decimals: u32 = caps[3].parse().unwrap_or(4);
        self.format = CoordinateFormat {
            decimals,
            digits: integer + decimals as usize,
            omit_trailing: caps.get(1).is_some_and(|m| m.as_str() == "T"),
        };
        self.recognized = true;
        Ok(())
    }

    fn aperture_definition(&mut self, word: &str) -> Result<(), RenderError> {
        let Some(caps) = APERTURE_RE.captures(word) else {
            return Err(RenderError::new(format!("unreadable aperture {}", word)));
        };
        self.recognized = true;

        let code: u32 = caps[1]
            .parse()
            .map_err(|_| RenderError::new(format!("bad aperture number in {}", word)))?;
        let template = &caps[2];
        if !matches!(template, "C" | "R" | "O" | "P") {
            tracing::debug!("Aperture D{} uses macro {}, drawn as a point", code, template);
            self.apertures.insert(code, Shape::Circle { diameter: 0.0 });
            return Ok(());
        }

        let params = caps
            .get(3)
            .map(|m| {
                m.as_str()
                    .split('X')
                    .map(|p| p.parse::<f64>().map(|v| v * self.unit_mm))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()
            .map_err(|_| RenderError::new(format!("bad aperture parameters in {}", word)))?
            .unwrap_or_default();
        let first = params.first().copied().unwrap_or(0.0);
        let second = params.get(1).copied().unwrap_or(first);

        let shape = match template {
            "R" => Shape::Rectangle {
                width: first,
                height: second,
            },
            "O" => Shape::Obround {
                width: first,
                height: second,
            },
            // 圓形；多邊形以外接圓近似
            _ => Shape::Circle { diameter: first },
        };
        self.apertures.insert(code, shape);
        Ok(())
    }

    fn operation(&mut self, caps: &regex::Captures<'_>) -> Result<(), RenderError> {
        self.recognized = true;

        if let Some(g) = caps.get(1) {
            self.interpolation = match g.as_str() {
                "2" => Interpolation::Clockwise,
                "3" => Interpolation::CounterClockwise,
                _ => Interpolation::Linear,
            };
        }

        let x = caps.get(2).map(|m| self.coordinate(m.as_str())).transpose()?;
        let y = caps.get(3).map(|m| self.coordinate(m.as_str())).transpose()?;
        let i = caps.get(4).map(|m| self.coordinate(m.as_str())).transpose()?;
        let j = caps.get(5).map(|m| self.coordinate(m.as_str())).transpose()?;
        let explicit = caps.get(6).map(|m| m.as_str().parse::<u8>().unwrap_or(1));

        let has_coordinates = x.is_some() || y.is_some();
        let Some(op) = explicit.or(if has_coordinates { self.last_operation } else { None })
        else {
            return Ok(());
        };
        self.last_operation = Some(op);

        let target = Point::new(x.unwrap_or(self.position.x), y.unwrap_or(self.position.y));
        let offset = Point::new(i.unwrap_or(0.0), j.unwrap_or(0.0));

        match op {
            1 => self.interpolate(target, offset),
            2 => {
                if self.region {
                    self.close_contour();
                }
            }
            3 => match self.current_shape() {
                Some(shape) => self.primitives.push(Primitive::Flash { at: target, shape }),
                None => tracing::debug!("Flash without aperture ignored"),
            },
            _ => {}
        }
        self.position = target;
        Ok(())
    }

    fn interpolate(&mut self, target: Point, offset: Point) {
        let start = self.position;
        let path = match self.interpolation {
            Interpolation::Linear => vec![target],
            direction => self.arc(start, target, offset, direction == Interpolation::Clockwise),
        };

        if self.region {
            if self.contour.is_empty() {
                self.contour.push(start);
            }
            self.contour.extend(path);
            return;
        }

        let Some(shape) = self.current_shape() else {
            tracing::debug!("Draw without aperture ignored");
            return;
        };
        let mut from = start;
        for to in path {
            self.primitives.push(Primitive::Stroke { from, to, shape });
            from = to;
        }
    }

    fn arc(&self, start: Point, end: Point, offset: Point, clockwise: bool) -> Vec<Point> {
        let center = if self.multi_quadrant {
            Point::new(start.x + offset.x, start.y + offset.y)
        } else {
            single_quadrant_center(start, end, offset, clockwise)
        };

        let radius = distance(center, start);
        let a0 = (start.y - center.y).atan2(start.x - center.x);
        let a1 = (end.y - center.y).atan2(end.x - center.x);
        let mut sweep = a1 - a0;
        if clockwise {
            if sweep >= 0.0 {
                sweep -= 2.0 * PI;
            }
        } else if sweep <= 0.0 {
            sweep += 2.0 * PI;
        }
        if !self.multi_quadrant && sweep.abs() > PI / 2.0 + 1e-6 {
            // 單象限模式下起終點相同代表零長度
            return vec![end];
        }

        let segments = ((sweep.abs() * radius / ARC_STEP_MM).ceil() as usize).clamp(2, MAX_ARC_SEGMENTS);
        let mut points: Vec<Point> = (1..segments)
            .map(|k| {
                let angle = a0 + sweep * k as f64 / segments as f64;
                Point::new(center.x + radius * angle.cos(), center.y + radius * angle.sin())
            })
            .collect();
        points.push(end);
        points
    }

    fn current_shape(&self) -> Option<Shape> {
        self.aperture.and_then(|code| self.apertures.get(&code).copied())
    }

    fn close_contour(&mut self) {
        if self.contour.len() > 2 {
            self.primitives.push(Primitive::Region {
                points: std::mem::take(&mut self.contour),
            });
        } else {
            self.contour.clear();
        }
    }

    /// Converts one coordinate token to millimetres.
    fn coordinate(&self, raw: &str) -> Result<f64, RenderError> {
        let bad = || RenderError::new(format!("bad coordinate {}", raw));
        let value = if raw.contains('.') {
            raw.parse::<f64>().map_err(|_| bad())?
        } else {
            let (negative, digits) = match raw.as_bytes().first() {
                Some(b'-') => (true, &raw[1..]),
                Some(b'+') => (false, &raw[1..]),
                _ => (false, raw),
            };
            let padded = if self.format.omit_trailing && digits.len() < self.format.digits {
                format!("{:0<width$}", digits, width = self.format.digits)
            } else {
                digits.to_string()
            };
            let magnitude = padded.parse::<i64>().map_err(|_| bad())? as f64
                / 10f64.powi(self.format.decimals as i32);
            if negative {
                -magnitude
            } else {
                magnitude
            }
        };
        Ok(value * self.unit_mm)
    }
}

fn distance(a: Point, b: Point) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// G74: I/J are unsigned, pick the sign combination that puts the center
/// equidistant from both ends with a sweep of at most 90 degrees.
fn single_quadrant_center(start: Point, end: Point, offset: Point, clockwise: bool) -> Point {
    let candidates = [(1.0, 1.0), (1.0, -1.0), (-1.0, 1.0), (-1.0, -1.0)].map(|(sx, sy)| {
        Point::new(start.x + sx * offset.x.abs(), start.y + sy * offset.y.abs())
    });

    candidates
        .into_iter()
        .filter(|center| {
            let a0 = (start.y - center.y).atan2(start.x - center.x);
            let a1 = (end.y - center.y).atan2(end.x - center.x);
            let mut sweep = a1 - a0;
            if clockwise && sweep > 0.0 {
                sweep -= 2.0 * PI;
            } else if !clockwise && sweep < 0.0 {
                sweep += 2.0 * PI;
            }
            sweep.abs() <= PI / 2.0 + 1e-6
        })
        .min_by(|a, b| {
            let da = (distance(*a, start) - distance(*a, end)).abs();
            let db = (distance(*b, start) - distance(*b, end)).abs();
            da.total_cmp(&db)
        })
        .unwrap_or(candidates[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(source: &str) -> Scene {
        GerberLoader.load(source).unwrap()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_linear_draw_and_flash_in_inches() {
        let scene = load(
            "G04 test*\n%FSLAX24Y24*%\n%MOIN*%\n%ADD10C,0.0100*%\n%ADD11R,0.0500X0.0250*%\n\
             D10*\nX0Y0D02*\nX10000Y0D01*\nD11*\nX5000Y5000D03*\nM02*\n",
        );

        assert_eq!(scene.primitives.len(), 2);
        match &scene.primitives[0] {
            Primitive::Stroke { from, to, shape } => {
                assert_eq!(*from, Point::new(0.0, 0.0));
                assert!(close(to.x, 25.4));
                assert_eq!(*shape, Shape::Circle { diameter: 0.01 * 25.4 });
            }
            other => panic!("expected stroke, got {other:?}"),
        }
        match &scene.primitives[1] {
            Primitive::Flash { at, shape } => {
                assert!(close(at.x, 12.7) && close(at.y, 12.7));
                match shape {
                    Shape::Rectangle { width, height } => {
                        assert!(close(*width, 1.27));
                        assert!(close(*height, 0.635));
                    }
                    other => panic!("expected rectangle, got {other:?}"),
                }
            }
            other => panic!("expected flash, got {other:?}"),
        }
    }

    #[test]
    fn test_metric_units_and_modal_coordinates() {
        let scene = load(
            "%FSLAX46Y46*%%MOMM*%%ADD10C,0.2*%G54D10*X0Y0D02*X1000000D01*Y2000000*X-500000Y-500000D02*",
        );

        assert_eq!(scene.primitives.len(), 2);
        match &scene.primitives[1] {
            Primitive::Stroke { from, to, .. } => {
                assert!(close(from.x, 1.0) && close(from.y, 0.0));
                assert!(close(to.x, 1.0) && close(to.y, 2.0));
            }
            other => panic!("expected stroke, got {other:?}"),
        }
    }

    #[test]
    fn test_trailing_zero_omission() {
        let scene = load("%FSTAX24Y24*%%MOIN*%%ADD10C,0.01*%D10*X0Y0D02*X1Y0D01*");
        match &scene.primitives[0] {
            Primitive::Stroke { to, .. } => assert!(close(to.x, 10.0 * 25.4)),
            other => panic!("expected stroke, got {other:?}"),
        }
    }

    #[test]
    fn test_region_becomes_polygon() {
        let scene = load(
            "%FSLAX24Y24*%%MOMM*%G36*X0Y0D02*G01X100000Y0D01*X100000Y100000D01*X0Y100000D01*X0Y0D01*G37*M02*",
        );

        assert_eq!(scene.primitives.len(), 1);
        match &scene.primitives[0] {
            Primitive::Region { points } => {
                assert_eq!(points.len(), 5);
                assert!(close(points[2].x, 10.0) && close(points[2].y, 10.0));
            }
            other => panic!("expected region, got {other:?}"),
        }
    }

    #[test]
    fn test_multi_quadrant_arc_ends_on_target() {
        let scene = load(
            "%FSLAX24Y24*%%MOMM*%%ADD10C,0.1*%D10*G75*X100000Y0D02*G03X0Y100000I-100000J0D01*",
        );

        assert!(scene.primitives.len() > 2);
        let radius_ok = scene.primitives.iter().all(|p| match p {
            Primitive::Stroke { to, .. } => close(to.x.hypot(to.y), 10.0),
            _ => false,
        });
        assert!(radius_ok);
        match scene.primitives.last() {
            Some(Primitive::Stroke { to, .. }) => assert!(close(to.x, 0.0) && close(to.y, 10.0)),
            other => panic!("expected stroke, got {other:?}"),
        }
    }

    #[test]
    fn test_macro_apertures_do_not_fail() {
        let scene = load("%FSLAX24Y24*%%MOMM*%%AMOC8*5,1,8,0,0,1.08239X$1,22.5*%%ADD12OC8,1.6*%D12*X0Y0D03*");
        assert_eq!(scene.primitives.len(), 1);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(GerberLoader.load("hello world, this is not a layer").is_err());
        assert!(GerberLoader.load("").unwrap().is_empty());
    }
}
