//! Vector geometry values and the GeoJSON/OGR conversions around them.
//!
//! [`Geometry`] is a closed set of variants; every conversion matches on it
//! exhaustively. Coordinates are always stored in traditional GIS order
//! (`x`/easting/longitude first), whatever the authority of the CRS says.

pub mod builder;
pub mod geojson;
pub mod ogr;
pub mod repair;
pub mod resolution;

pub use builder::GeometryBuilder;
pub use geojson::{to_geojson, GeometryGeoJson, DEFAULT_PRECISION};
pub use repair::{make_valid, make_valid_geojson};
pub use resolution::{calc_best_resolution, calc_best_resolution_bbox};

/// A single 2D or 3D coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

impl Coord {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }

    pub fn new_3d(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z: Some(z) }
    }

    pub fn flatten_2d(self) -> Self {
        Self { z: None, ..self }
    }

    fn same_position(&self, other: &Coord) -> bool {
        self.x == other.x && self.y == other.y && self.z == other.z
    }
}

impl From<(f64, f64)> for Coord {
    fn from((x, y): (f64, f64)) -> Self {
        Coord::new(x, y)
    }
}

impl From<(f64, f64, f64)> for Coord {
    fn from((x, y, z): (f64, f64, f64)) -> Self {
        Coord::new_3d(x, y, z)
    }
}

/// Ordered point sequence of a line or ring.
pub type CoordSeq = Vec<Coord>;

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Coord),
    MultiPoint(CoordSeq),
    LineString(CoordSeq),
    LinearRing(CoordSeq),
    /// Outer ring followed by zero or more inner rings.
    Polygon(Vec<CoordSeq>),
    MultiLineString(Vec<CoordSeq>),
    MultiPolygon(Vec<Vec<CoordSeq>>),
    GeometryCollection(Vec<Geometry>),
}

impl Geometry {
    /// GeoJSON type name of the variant.
    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::MultiPoint(_) => "MultiPoint",
            Geometry::LineString(_) => "LineString",
            Geometry::LinearRing(_) => "LinearRing",
            Geometry::Polygon(_) => "Polygon",
            Geometry::MultiLineString(_) => "MultiLineString",
            Geometry::MultiPolygon(_) => "MultiPolygon",
            Geometry::GeometryCollection(_) => "GeometryCollection",
        }
    }

    pub fn is_polygonal(&self) -> bool {
        matches!(self, Geometry::Polygon(_) | Geometry::MultiPolygon(_))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Geometry::Point(_) => false,
            Geometry::MultiPoint(c) | Geometry::LineString(c) | Geometry::LinearRing(c) => {
                c.is_empty()
            }
            Geometry::Polygon(rings) | Geometry::MultiLineString(rings) => {
                rings.iter().all(|r| r.is_empty())
            }
            Geometry::MultiPolygon(polygons) => polygons.iter().flatten().all(|r| r.is_empty()),
            Geometry::GeometryCollection(geometries) => geometries.iter().all(|g| g.is_empty()),
        }
    }

    /// Visits every coordinate in storage order.
    pub fn coords(&self) -> Vec<&Coord> {
        let mut out = Vec::new();
        self.collect_coords(&mut out);
        out
    }

    fn collect_coords<'a>(&'a self, out: &mut Vec<&'a Coord>) {
        match self {
            Geometry::Point(c) => out.push(c),
            Geometry::MultiPoint(c) | Geometry::LineString(c) | Geometry::LinearRing(c) => {
                out.extend(c.iter())
            }
            Geometry::Polygon(rings) | Geometry::MultiLineString(rings) => {
                out.extend(rings.iter().flatten())
            }
            Geometry::MultiPolygon(polygons) => out.extend(polygons.iter().flatten().flatten()),
            Geometry::GeometryCollection(geometries) => {
                for g in geometries {
                    g.collect_coords(out);
                }
            }
        }
    }

    /// Applies `f` to every coordinate in place.
    pub fn map_coords_in_place<F: FnMut(&mut Coord)>(&mut self, f: &mut F) {
        match self {
            Geometry::Point(c) => f(c),
            Geometry::MultiPoint(c) | Geometry::LineString(c) | Geometry::LinearRing(c) => {
                c.iter_mut().for_each(f)
            }
            Geometry::Polygon(rings) | Geometry::MultiLineString(rings) => {
                rings.iter_mut().flatten().for_each(f)
            }
            Geometry::MultiPolygon(polygons) => {
                polygons.iter_mut().flatten().flatten().for_each(f)
            }
            Geometry::GeometryCollection(geometries) => {
                for g in geometries {
                    g.map_coords_in_place(f);
                }
            }
        }
    }

    /// Drops the z component of every coordinate.
    pub fn flatten_2d(&mut self) {
        self.map_coords_in_place(&mut |c| c.z = None);
    }

    pub fn has_z(&self) -> bool {
        self.coords().iter().any(|c| c.z.is_some())
    }

    /// Appends the first point to every ring whose last point differs from it.
    pub fn close_rings(&mut self) {
        fn close(ring: &mut CoordSeq) {
            if let (Some(first), Some(last)) = (ring.first().copied(), ring.last()) {
                if !first.same_position(last) {
                    ring.push(first);
                }
            }
        }

        match self {
            Geometry::LinearRing(ring) => close(ring),
            Geometry::Polygon(rings) => rings.iter_mut().for_each(close),
            Geometry::MultiPolygon(polygons) => polygons.iter_mut().flatten().for_each(close),
            Geometry::GeometryCollection(geometries) => {
                geometries.iter_mut().for_each(Geometry::close_rings)
            }
            _ => {}
        }
    }

    /// Axis-aligned bounding box as `(x_min, x_max, y_min, y_max)`, or `None`
    /// for empty geometries.
    pub fn envelope(&self) -> Option<(f64, f64, f64, f64)> {
        let coords = self.coords();
        if coords.is_empty() {
            return None;
        }
        Some(coords.iter().fold(
            (
                f64::INFINITY,
                f64::NEG_INFINITY,
                f64::INFINITY,
                f64::NEG_INFINITY,
            ),
            |(x_min, x_max, y_min, y_max), c| {
                (x_min.min(c.x), x_max.max(c.x), y_min.min(c.y), y_max.max(c.y))
            },
        ))
    }

    /// Planar area; inner rings are subtracted, non-polygonal parts count as zero.
    pub fn area(&self) -> f64 {
        match self {
            Geometry::Polygon(rings) => polygon_area(rings),
            Geometry::MultiPolygon(polygons) => polygons.iter().map(|p| polygon_area(p)).sum(),
            Geometry::GeometryCollection(geometries) => geometries.iter().map(Geometry::area).sum(),
            _ => 0.0,
        }
    }

    /// Polygon rings of this geometry (outer and inner), for point-in-polygon tests.
    pub fn polygon_rings(&self) -> Vec<&CoordSeq> {
        match self {
            Geometry::Polygon(rings) => rings.iter().collect(),
            Geometry::MultiPolygon(polygons) => polygons.iter().flatten().collect(),
            Geometry::GeometryCollection(geometries) => {
                geometries.iter().flat_map(Geometry::polygon_rings).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Ring lists of each polygon part, so parts can be filled independently.
    pub fn polygons(&self) -> Vec<&[CoordSeq]> {
        match self {
            Geometry::Polygon(rings) => vec![rings.as_slice()],
            Geometry::MultiPolygon(polygons) => polygons.iter().map(Vec::as_slice).collect(),
            Geometry::GeometryCollection(geometries) => {
                geometries.iter().flat_map(Geometry::polygons).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Footprint polygon of an `(x_min, y_min, x_max, y_max)` box.
    pub fn from_bbox(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Self {
        Geometry::Polygon(vec![vec![
            Coord::new(x_min, y_min),
            Coord::new(x_max, y_min),
            Coord::new(x_max, y_max),
            Coord::new(x_min, y_max),
            Coord::new(x_min, y_min),
        ]])
    }
}

fn ring_signed_area(ring: &[Coord]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for (i, a) in ring.iter().enumerate() {
        let b = &ring[(i + 1) % ring.len()];
        sum += a.x * b.y - b.x * a.y;
    }
    sum / 2.0
}

fn polygon_area(rings: &[CoordSeq]) -> f64 {
    let mut rings = rings.iter();
    let Some(outer) = rings.next() else {
        return 0.0;
    };
    let holes: f64 = rings.map(|r| ring_signed_area(r).abs()).sum();
    (ring_signed_area(outer).abs() - holes).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, size: f64) -> CoordSeq {
        vec![
            Coord::new(x0, y0),
            Coord::new(x0 + size, y0),
            Coord::new(x0 + size, y0 + size),
            Coord::new(x0, y0 + size),
            Coord::new(x0, y0),
        ]
    }

    #[test]
    fn test_envelope_of_collection() {
        let geometry = Geometry::GeometryCollection(vec![
            Geometry::Point(Coord::new(-3.0, 4.0)),
            Geometry::Polygon(vec![square(0.0, 0.0, 2.0)]),
        ]);
        assert_eq!(geometry.envelope(), Some((-3.0, 2.0, 0.0, 4.0)));
        assert_eq!(Geometry::LineString(vec![]).envelope(), None);
    }

    #[test]
    fn test_area_subtracts_holes() {
        let polygon = Geometry::Polygon(vec![square(0.0, 0.0, 10.0), square(2.0, 2.0, 2.0)]);
        assert!((polygon.area() - 96.0).abs() < 1e-12);

        let multi = Geometry::MultiPolygon(vec![
            vec![square(0.0, 0.0, 1.0)],
            vec![square(5.0, 5.0, 2.0)],
        ]);
        assert!((multi.area() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_close_rings() {
        let mut polygon = Geometry::Polygon(vec![vec![
            Coord::new(0.0, 0.0),
            Coord::new(1.0, 0.0),
            Coord::new(1.0, 1.0),
        ]]);
        polygon.close_rings();
        let Geometry::Polygon(rings) = &polygon else {
            unreachable!()
        };
        assert_eq!(rings[0].len(), 4);
        assert_eq!(rings[0][0], rings[0][3]);

        // already closed rings are left alone
        let mut closed = Geometry::Polygon(vec![square(0.0, 0.0, 1.0)]);
        closed.close_rings();
        assert_eq!(closed, Geometry::Polygon(vec![square(0.0, 0.0, 1.0)]));
    }

    #[test]
    fn test_flatten_2d() {
        let mut line = Geometry::LineString(vec![
            Coord::new_3d(1.0, 2.0, 3.0),
            Coord::new_3d(4.0, 5.0, 6.0),
        ]);
        assert!(line.has_z());
        line.flatten_2d();
        assert!(!line.has_z());
        assert_eq!(line.coords()[1], &Coord::new(4.0, 5.0));
    }
}
