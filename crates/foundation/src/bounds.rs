/// Geographic bounding box in degrees (WGS84 lon/lat).
///
/// Edges follow the map-engine convention: `west <= east`, `south <= north`.
/// Antimeridian-crossing boxes are not modeled; callers split them before
/// querying.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LonLatBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl LonLatBounds {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// The whole world in lon/lat degrees.
    pub fn world() -> Self {
        Self::new(-180.0, -90.0, 180.0, 90.0)
    }

    pub fn contains(&self, lon_deg: f64, lat_deg: f64) -> bool {
        lon_deg >= self.west && lon_deg <= self.east && lat_deg >= self.south && lat_deg <= self.north
    }

    pub fn intersects(&self, other: &LonLatBounds) -> bool {
        !(other.west > self.east
            || other.east < self.west
            || other.south > self.north
            || other.north < self.south)
    }

    pub fn width_deg(&self) -> f64 {
        (self.east - self.west).max(0.0)
    }

    pub fn height_deg(&self) -> f64 {
        (self.north - self.south).max(0.0)
    }
}
