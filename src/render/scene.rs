//! Vector description of one layer, in millimetres, Y pointing up.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Point,
    pub max: Point,
}

impl Bounds {
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min: Point::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Point::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }

    fn include(&mut self, point: Point, margin: f64) {
        self.min.x = self.min.x.min(point.x - margin);
        self.min.y = self.min.y.min(point.y - margin);
        self.max.x = self.max.x.max(point.x + margin);
        self.max.y = self.max.y.max(point.y + margin);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Circle { diameter: f64 },
    Rectangle { width: f64, height: f64 },
    Obround { width: f64, height: f64 },
}

impl Shape {
    /// Half of the largest extent, used for bounds.
    pub fn radius(&self) -> f64 {
        match *self {
            Shape::Circle { diameter } => diameter / 2.0,
            Shape::Rectangle { width, height } | Shape::Obround { width, height } => {
                width.max(height) / 2.0
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    /// A linear draw with the current aperture.
    Stroke { from: Point, to: Point, shape: Shape },
    Flash { at: Point, shape: Shape },
    /// Filled contour (G36/G37).
    Region { points: Vec<Point> },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scene {
    pub primitives: Vec<Primitive>,
}

impl Scene {
    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    pub fn bounds(&self) -> Option<Bounds> {
        let mut bounds: Option<Bounds> = None;
        let mut include = |point: Point, margin: f64| match bounds.as_mut() {
            Some(b) => b.include(point, margin),
            None => {
                bounds = Some(Bounds {
                    min: Point::new(point.x - margin, point.y - margin),
                    max: Point::new(point.x + margin, point.y + margin),
                })
            }
        };

        for primitive in &self.primitives {
            match primitive {
                Primitive::Stroke { from, to, shape } => {
                    include(*from, shape.radius());
                    include(*to, shape.radius());
                }
                Primitive::Flash { at, shape } => include(*at, shape.radius()),
                Primitive::Region { points } => {
                    for point in points {
                        include(*point, 0.0);
                    }
                }
            }
        }
        bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_include_aperture_extent() {
        let scene = Scene {
            primitives: vec![
                Primitive::Stroke {
                    from: Point::new(0.0, 0.0),
                    to: Point::new(10.0, 0.0),
                    shape: Shape::Circle { diameter: 2.0 },
                },
                Primitive::Region {
                    points: vec![Point::new(0.0, 5.0), Point::new(4.0, 20.0), Point::new(2.0, 5.0)],
                },
            ],
        };

        let bounds = scene.bounds().unwrap();
        assert_eq!(bounds.min, Point::new(-1.0, -1.0));
        assert_eq!(bounds.max, Point::new(11.0, 20.0));
        assert_eq!(bounds.width(), 12.0);
    }

    #[test]
    fn test_empty_scene_has_no_bounds() {
        assert!(Scene::default().bounds().is_none());
    }
}
