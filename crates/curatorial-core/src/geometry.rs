use serde::{Deserialize, Serialize};

/// A planar `[x, y]` position; any extra ordinates are dropped on decode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "Vec<f64>", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl TryFrom<Vec<f64>> for Point {
    type Error = String;

    fn try_from(value: Vec<f64>) -> Result<Self, Self::Error> {
        match value.as_slice() {
            [x, y, ..] => Ok(Self::new(*x, *y)),
            _ => Err(format!("position MUST have at least 2 ordinates (got {})", value.len())),
        }
    }
}

impl From<Point> for [f64; 2] {
    fn from(value: Point) -> Self {
        [value.x, value.y]
    }
}

/// The GeoJSON geometry types found on catalog features.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Point),
    MultiPoint(Vec<Point>),
    Polygon(Vec<Vec<Point>>),
    MultiPolygon(Vec<Vec<Vec<Point>>>),
}

impl Geometry {
    /// Whether a GeoJSON `type` is one this enum decodes.
    #[must_use]
    pub fn is_supported_type(kind: &str) -> bool {
        matches!(kind, "Point" | "MultiPoint" | "Polygon" | "MultiPolygon")
    }

    /// A single representative point: the point itself, the mean of a
    /// multipoint, or the area centroid of a (multi)polygon.
    #[must_use]
    pub fn centroid(&self) -> Option<Point> {
        match self {
            Self::Point(point) => Some(*point),
            Self::MultiPoint(points) => mean(points),
            Self::Polygon(rings) => polygon_centroid(rings).map(|(point, _)| point),
            Self::MultiPolygon(polygons) => {
                let mut weighted_x = 0.0;
                let mut weighted_y = 0.0;
                let mut total_area = 0.0;
                for rings in polygons {
                    if let Some((point, area)) = polygon_centroid(rings) {
                        weighted_x += point.x * area;
                        weighted_y += point.y * area;
                        total_area += area;
                    }
                }
                if total_area > 0.0 {
                    Some(Point::new(weighted_x / total_area, weighted_y / total_area))
                } else {
                    let exteriors =
                        polygons.iter().filter_map(|rings| rings.first()).flatten().copied();
                    mean(&exteriors.collect::<Vec<_>>())
                }
            }
        }
    }
}

fn mean(points: &[Point]) -> Option<Point> {
    if points.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let count = points.len() as f64;
    let (sum_x, sum_y) = points.iter().fold((0.0, 0.0), |(x, y), p| (x + p.x, y + p.y));
    Some(Point::new(sum_x / count, sum_y / count))
}

fn ring_moments(ring: &[Point]) -> (f64, f64, f64) {
    let mut area = 0.0;
    let mut cx = 0.0;
    let mut cy = 0.0;
    for pair in ring.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let cross = a.x * b.y - b.x * a.y;
        area += cross;
        cx += (a.x + b.x) * cross;
        cy += (a.y + b.y) * cross;
    }
    (area / 2.0, cx, cy)
}

/// Area centroid with holes subtracted; returns the centroid and the
/// (absolute) area. Degenerate polygons fall back to the exterior mean.
fn polygon_centroid(rings: &[Vec<Point>]) -> Option<(Point, f64)> {
    let exterior = rings.first()?;
    let mut area = 0.0;
    let mut cx = 0.0;
    let mut cy = 0.0;
    for (index, ring) in rings.iter().enumerate() {
        let (ring_area, ring_cx, ring_cy) = ring_moments(ring);
        // Normalise winding, then subtract holes from the exterior.
        let orientation = if ring_area < 0.0 { -1.0 } else { 1.0 };
        let sign = if index == 0 { orientation } else { -orientation };
        area += ring_area * sign;
        cx += ring_cx * sign;
        cy += ring_cy * sign;
    }

    if area.abs() < f64::EPSILON {
        return mean(exterior).map(|point| (point, 0.0));
    }

    Some((Point::new(cx / (6.0 * area), cy / (6.0 * area)), area.abs()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, size: f64) -> Vec<Point> {
        vec![
            Point::new(x0, y0),
            Point::new(x0 + size, y0),
            Point::new(x0 + size, y0 + size),
            Point::new(x0, y0 + size),
            Point::new(x0, y0),
        ]
    }

    fn assert_close(actual: Option<Point>, x: f64, y: f64) {
        let Some(point) = actual else {
            panic!("expected a centroid near ({x}, {y})");
        };
        assert!((point.x - x).abs() < 1e-9 && (point.y - y).abs() < 1e-9, "got {point:?}");
    }

    #[test]
    fn point_centroid_is_itself() {
        assert_close(Geometry::Point(Point::new(1.5, -2.0)).centroid(), 1.5, -2.0);
    }

    #[test]
    fn polygon_centroid_is_area_weighted() {
        assert_close(Geometry::Polygon(vec![square(0.0, 0.0, 2.0)]).centroid(), 1.0, 1.0);
    }

    #[test]
    fn multipolygon_centroid_weights_by_area() {
        let geometry = Geometry::MultiPolygon(vec![
            vec![square(0.0, 0.0, 2.0)],
            vec![square(10.0, 0.0, 2.0)],
        ]);
        assert_close(geometry.centroid(), 6.0, 1.0);
    }

    #[test]
    fn multipoint_centroid_is_the_mean() {
        let geometry = Geometry::MultiPoint(vec![Point::new(0.0, 0.0), Point::new(4.0, 2.0)]);
        assert_close(geometry.centroid(), 2.0, 1.0);
        assert_eq!(Geometry::MultiPoint(Vec::new()).centroid(), None);
    }

    #[test]
    fn decodes_geojson_with_extra_ordinates() {
        let geometry: Result<Geometry, _> =
            serde_json::from_str(r#"{"type":"Point","coordinates":[-122.38,37.61,12.0]}"#);
        assert_eq!(geometry.ok(), Some(Geometry::Point(Point::new(-122.38, 37.61))));
    }
}
