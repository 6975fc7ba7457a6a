use serde::Serialize;

/// Pixel width of one horizontal wrap of the rendered world.
pub const WORLD_PIXEL_WIDTH: f64 = 2050.0;

/// Geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Same position with the longitude folded into `[0, 360)`.
    pub fn normalized(self) -> Self {
        Self {
            lat: self.lat,
            lng: normalize_lng(self.lng),
        }
    }
}

/// Screen position in pixels, `(0, 0)` at the top-left corner of the map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

impl PixelPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Pixel dimensions of the visible map area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Visible geographic window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl Bounds {
    pub const fn new(south_west: LatLng, north_east: LatLng) -> Self {
        Self {
            south_west,
            north_east,
        }
    }
}

pub fn normalize_lng(lng: f64) -> f64 {
    let folded = lng.rem_euclid(360.0);
    // rem_euclid can round up to the modulus for tiny negative inputs.
    if folded >= 360.0 { 0.0 } else { folded }
}

pub fn normalize_pixel_x(x: f64, world_width: f64) -> f64 {
    if world_width <= 0.0 {
        return x;
    }
    let folded = x.rem_euclid(world_width);
    if folded >= world_width { 0.0 } else { folded }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longitude_folds_into_positive_range() {
        assert_eq!(normalize_lng(-60.0), 300.0);
        assert_eq!(normalize_lng(120.0), 120.0);
        assert_eq!(normalize_lng(360.0), 0.0);
        assert_eq!(normalize_lng(-720.0), 0.0);
        assert!(normalize_lng(-1e-20) < 360.0);
    }

    #[test]
    fn pixel_x_wraps_by_world_width() {
        assert_eq!(normalize_pixel_x(-50.0, WORLD_PIXEL_WIDTH), 2000.0);
        assert_eq!(normalize_pixel_x(2100.0, WORLD_PIXEL_WIDTH), 50.0);
        assert_eq!(normalize_pixel_x(10.0, WORLD_PIXEL_WIDTH), 10.0);
    }
}
