//! Affine geotransformation for raster layers

use super::Bounds;
use serde::{Deserialize, Serialize};

/// Affine transformation coefficients for georeferencing layers.
///
/// Converts between pixel coordinates (col, row) and geographic coordinates (x, y):
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// Environmental layers are north-up: both rotations are 0 and
/// `pixel_height` is negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate (longitude) of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate (latitude) of the upper-left corner
    pub origin_y: f64,
    /// Pixel width (cell size in X direction)
    pub pixel_width: f64,
    /// Pixel height (cell size in Y direction, usually negative)
    pub pixel_height: f64,
    /// Rotation about X axis
    pub row_rotation: f64,
    /// Rotation about Y axis
    pub col_rotation: f64,
}

impl GeoTransform {
    /// Create a new GeoTransform with no rotation (north-up image)
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    /// Geographic coordinates of the pixel center
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        self.corner(col as f64 + 0.5, row as f64 + 0.5)
    }

    fn corner(&self, col: f64, row: f64) -> (f64, f64) {
        let x = self.origin_x + col * self.pixel_width + row * self.row_rotation;
        let y = self.origin_y + col * self.col_rotation + row * self.pixel_height;
        (x, y)
    }

    /// Convert geographic coordinates to fractional pixel coordinates (col, row)
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let det = self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation;

        if det.abs() < 1e-15 {
            return (f64::NAN, f64::NAN);
        }

        let dx = x - self.origin_x;
        let dy = y - self.origin_y;

        let col = (self.pixel_height * dx - self.row_rotation * dy) / det;
        let row = (-self.col_rotation * dx + self.pixel_width * dy) / det;

        (col, row)
    }

    /// Pixel (row, col) covering a geographic coordinate.
    ///
    /// Fractional pixel coordinates are floored. Returns `None` when the
    /// resulting index falls outside `[0, rows) x [0, cols)`.
    pub fn geo_to_index(&self, x: f64, y: f64, rows: usize, cols: usize) -> Option<(usize, usize)> {
        let (col, row) = self.geo_to_pixel(x, y);
        if !col.is_finite() || !row.is_finite() {
            return None;
        }
        let (col, row) = (col.floor(), row.floor());
        if col < 0.0 || row < 0.0 || col >= cols as f64 || row >= rows as f64 {
            return None;
        }
        Some((row as usize, col as usize))
    }

    /// Pixel size as positive (x, y) resolution
    pub fn resolution(&self) -> (f64, f64) {
        (self.pixel_width.abs(), self.pixel_height.abs())
    }

    /// Bounding box for a raster of given dimensions
    pub fn bounds(&self, width: usize, height: usize) -> Bounds {
        let corners = [
            self.corner(0.0, 0.0),
            self.corner(width as f64, 0.0),
            self.corner(0.0, height as f64),
            self.corner(width as f64, height as f64),
        ];

        corners.iter().fold(Bounds::empty(), |acc, &(x, y)| {
            acc.union(&Bounds::new(x, x, y, y))
        })
    }

    /// Coefficient-wise comparison with a relative tolerance
    pub fn approx_eq(&self, other: &GeoTransform, rel_tol: f64) -> bool {
        let close = |a: f64, b: f64| (a - b).abs() <= rel_tol * a.abs().max(b.abs()).max(1.0);
        close(self.origin_x, other.origin_x)
            && close(self.origin_y, other.origin_y)
            && close(self.pixel_width, other.pixel_width)
            && close(self.pixel_height, other.pixel_height)
            && close(self.row_rotation, other.row_rotation)
            && close(self.col_rotation, other.col_rotation)
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pixel_to_geo_roundtrip() {
        let gt = GeoTransform::new(100.0, 200.0, 10.0, -10.0);

        let (x, y) = gt.pixel_to_geo(5, 10);
        let (col, row) = gt.geo_to_pixel(x, y);

        assert_relative_eq!(col, 5.5, epsilon = 1e-10);
        assert_relative_eq!(row, 10.5, epsilon = 1e-10);
    }

    #[test]
    fn test_geo_to_index() {
        let gt = GeoTransform::new(-50.0, 10.0, 0.5, -0.5);

        assert_eq!(gt.geo_to_index(-50.0, 10.0, 4, 4), Some((0, 0)));
        assert_eq!(gt.geo_to_index(-49.26, 9.4, 4, 4), Some((1, 1)));
        assert_eq!(gt.geo_to_index(-48.01, 8.01, 4, 4), Some((3, 3)));
        // Right and bottom edges belong to the next (missing) pixel
        assert_eq!(gt.geo_to_index(-48.0, 9.0, 4, 4), None);
        assert_eq!(gt.geo_to_index(-49.0, 8.0, 4, 4), None);
        assert_eq!(gt.geo_to_index(-50.1, 9.0, 4, 4), None);
    }

    #[test]
    fn test_bounds() {
        let gt = GeoTransform::new(0.0, 100.0, 1.0, -1.0);
        let b = gt.bounds(100, 50);

        assert_relative_eq!(b.min_x, 0.0, epsilon = 1e-10);
        assert_relative_eq!(b.max_x, 100.0, epsilon = 1e-10);
        assert_relative_eq!(b.min_y, 50.0, epsilon = 1e-10);
        assert_relative_eq!(b.max_y, 100.0, epsilon = 1e-10);
        assert_eq!(gt.resolution(), (1.0, 1.0));
    }
}
