use super::Geometry;
use crate::error::{Error, Result};

/// Nudge added before rounding so that exact half cells round up (8.5 -> 9).
const HALF_CELL_EPSILON: f64 = 1e-8;

/// Number of whole cells of size `resolution` that best fit into `span`; at least 1.
pub fn cell_count(span: f64, resolution: f64) -> usize {
    let cells = (span / resolution + HALF_CELL_EPSILON).round();
    if cells.is_finite() && cells >= 1.0 {
        cells as usize
    } else {
        1
    }
}

/// Resolution close to `orig_resolution` that divides the box into a whole
/// number of cells along each axis.
pub fn calc_best_resolution_bbox(
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
    orig_resolution: (f64, f64),
) -> (f64, f64) {
    let dx = x_max - x_min;
    let dy = y_max - y_min;
    let cells_x = cell_count(dx, orig_resolution.0);
    let cells_y = cell_count(dy, orig_resolution.1);
    (dx / cells_x as f64, dy / cells_y as f64)
}

/// [`calc_best_resolution_bbox`] over the envelope of `geometry`.
pub fn calc_best_resolution(geometry: &Geometry, orig_resolution: (f64, f64)) -> Result<(f64, f64)> {
    let (x_min, x_max, y_min, y_max) = geometry
        .envelope()
        .ok_or_else(|| Error::InvalidArgument("empty geometry has no envelope".to_string()))?;
    Ok(calc_best_resolution_bbox(
        x_min,
        x_max,
        y_min,
        y_max,
        orig_resolution,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_cell_rounds_up() {
        assert_eq!(cell_count(85.0, 10.0), 9);
        assert_eq!(cell_count(84.9, 10.0), 8);
        assert_eq!(cell_count(3.0, 10.0), 1);
        assert_eq!(cell_count(0.0, 10.0), 1);
    }

    #[test]
    fn test_best_resolution() {
        let (rx, ry) = calc_best_resolution_bbox(0.0, 85.0, 0.0, 100.0, (10.0, 10.0));
        assert!((rx - 85.0 / 9.0).abs() < 1e-12);
        assert_eq!(ry, 10.0);
    }

    #[test]
    fn test_best_resolution_is_a_fixed_point() {
        let bbox = (554_680.0, 566_020.0, 6_223_060.0, 6_234_400.0);
        let first = calc_best_resolution_bbox(bbox.0, bbox.1, bbox.2, bbox.3, (10.000000005946216, 10.0));
        let second = calc_best_resolution_bbox(bbox.0, bbox.1, bbox.2, bbox.3, first);
        assert_eq!(first, second);
    }

    #[test]
    fn test_best_resolution_of_geometry() {
        let geometry = Geometry::from_bbox(0.0, 0.0, 25.0, 5.0);
        assert_eq!(calc_best_resolution(&geometry, (10.0, 10.0)).unwrap(), (25.0 / 3.0, 5.0));
        assert!(calc_best_resolution(&Geometry::LineString(vec![]), (1.0, 1.0)).is_err());
    }
}
