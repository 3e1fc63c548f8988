use crate::error::{Error, Result};

/// Pixel to CRS mapping:
///   x = a * col + b * row + c
///   y = d * col + e * row + f
///
/// GDAL stores the same six numbers as `[c, a, b, f, d, e]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Affine {
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// North-up transform with the top-left corner at `(x0, y0)`.
    pub fn north_up(x0: f64, y0: f64, res_x: f64, res_y: f64) -> Self {
        Self::new(res_x, 0.0, x0, 0.0, -res_y.abs(), y0)
    }

    pub fn from_gdal(gt: &[f64; 6]) -> Self {
        Self {
            a: gt[1],
            b: gt[2],
            c: gt[0],
            d: gt[4],
            e: gt[5],
            f: gt[3],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [self.c, self.a, self.b, self.f, self.d, self.e]
    }

    /// (col, row) -> (x, y)
    pub fn forward(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.a * col + self.b * row + self.c,
            self.d * col + self.e * row + self.f,
        )
    }

    pub fn inverse(&self) -> Result<Affine> {
        let det = self.a * self.e - self.b * self.d;
        if det.abs() < f64::EPSILON * f64::EPSILON {
            return Err(Error::InvalidArgument(format!(
                "singular affine transform {:?}",
                self.to_gdal()
            )));
        }
        let inv_det = 1.0 / det;
        Ok(Affine {
            a: self.e * inv_det,
            b: -self.b * inv_det,
            c: (self.b * self.f - self.e * self.c) * inv_det,
            d: -self.d * inv_det,
            e: self.a * inv_det,
            f: (self.d * self.c - self.a * self.f) * inv_det,
        })
    }

    /// (x, y) -> fractional (col, row); NaN when the transform is singular.
    pub fn to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        if self.is_rectilinear() {
            return ((x - self.c) / self.a, (y - self.f) / self.e);
        }
        match self.inverse() {
            Ok(inv) => inv.forward(x, y),
            Err(_) => (f64::NAN, f64::NAN),
        }
    }

    /// Pixel size as positive `(x, y)` lengths.
    pub fn resolution(&self) -> (f64, f64) {
        (
            (self.a * self.a + self.d * self.d).sqrt(),
            (self.b * self.b + self.e * self.e).sqrt(),
        )
    }

    pub fn is_rectilinear(&self) -> bool {
        self.b == 0.0 && self.d == 0.0
    }

    /// `[x_min, y_min, x_max, y_max]` of a `rows` x `cols` grid.
    pub fn bounds(&self, rows: usize, cols: usize) -> [f64; 4] {
        let corners = [
            self.forward(0.0, 0.0),
            self.forward(cols as f64, 0.0),
            self.forward(0.0, rows as f64),
            self.forward(cols as f64, rows as f64),
        ];
        let mut bounds = [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY];
        for (x, y) in corners {
            bounds[0] = bounds[0].min(x);
            bounds[1] = bounds[1].min(y);
            bounds[2] = bounds[2].max(x);
            bounds[3] = bounds[3].max(y);
        }
        bounds
    }

    /// Same transform with its origin moved to pixel `(col, row)`.
    pub fn shifted(&self, col: f64, row: f64) -> Affine {
        let (c, f) = self.forward(col, row);
        Affine { c, f, ..*self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_and_inverse() {
        let aff = Affine::north_up(500_000.0, 6_000_000.0, 10.0, 10.0);
        assert_eq!(aff.forward(100.0, 100.0), (501_000.0, 5_999_000.0));

        let (col, row) = aff.inverse().unwrap().forward(501_000.0, 5_999_000.0);
        assert!((col - 100.0).abs() < 1e-10);
        assert!((row - 100.0).abs() < 1e-10);
        assert_eq!(aff.to_pixel(501_000.0, 5_999_000.0), (100.0, 100.0));
    }

    #[test]
    fn test_singular() {
        assert!(Affine::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0).inverse().is_err());
    }

    #[test]
    fn test_gdal_order() {
        let gt = [500_000.0, 10.0, 0.0, 6_000_000.0, 0.0, -10.0];
        assert_eq!(Affine::from_gdal(&gt).to_gdal(), gt);
    }

    #[test]
    fn test_bounds_and_shift() {
        let aff = Affine::north_up(0.0, 100.0, 10.0, 5.0);
        assert_eq!(aff.bounds(20, 10), [0.0, 0.0, 100.0, 100.0]);
        assert_eq!(aff.resolution(), (10.0, 5.0));
        let shifted = aff.shifted(2.0, 4.0);
        assert_eq!((shifted.c, shifted.f), (20.0, 80.0));
    }
}
