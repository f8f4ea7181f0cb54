//! Geographic bounding box for the crop domain.

use serde::{Deserialize, Serialize};

/// A geographic bounding box in degrees.
///
/// Latitude bounds are given south-to-north and longitude bounds
/// west-to-east, regardless of the orientation of any grid the box is
/// applied to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl BoundingBox {
    /// Create a new bounding box from its four scalar bounds.
    pub fn new(lat_min: f64, lat_max: f64, lon_min: f64, lon_max: f64) -> Self {
        Self {
            lat_min,
            lat_max,
            lon_min,
            lon_max,
        }
    }

    /// Parse a bbox string: "lat_min,lat_max,lon_min,lon_max"
    pub fn from_bounds_string(s: &str) -> Result<Self, BboxParseError> {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() != 4 {
            return Err(BboxParseError::InvalidFormat(s.to_string()));
        }

        let mut values = [0.0f64; 4];
        for (i, part) in parts.iter().enumerate() {
            values[i] = part
                .parse()
                .map_err(|_| BboxParseError::InvalidNumber(part.to_string()))?;
        }

        let bbox = Self::new(values[0], values[1], values[2], values[3]);
        bbox.validate()?;
        Ok(bbox)
    }

    /// Check that min bounds do not exceed max bounds.
    pub fn validate(&self) -> Result<(), BboxParseError> {
        if self.lat_min > self.lat_max || self.lon_min > self.lon_max {
            return Err(BboxParseError::InvertedBounds(format!(
                "{},{},{},{}",
                self.lat_min, self.lat_max, self.lon_min, self.lon_max
            )));
        }
        Ok(())
    }

    /// Latitudinal extent in degrees.
    pub fn lat_span(&self) -> f64 {
        self.lat_max - self.lat_min
    }

    /// Longitudinal extent in degrees.
    pub fn lon_span(&self) -> f64 {
        self.lon_max - self.lon_min
    }

    /// Check if a coordinate pair falls within this box (edges included).
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.lat_min && lat <= self.lat_max && lon >= self.lon_min && lon <= self.lon_max
    }

    /// Check if this box overlaps another.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.lat_min < other.lat_max
            && self.lat_max > other.lat_min
            && self.lon_min < other.lon_max
            && self.lon_max > other.lon_min
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BboxParseError {
    #[error("Invalid bbox format: {0}. Expected 'lat_min,lat_max,lon_min,lon_max'")]
    InvalidFormat(String),

    #[error("Invalid number in bbox: {0}")]
    InvalidNumber(String),

    #[error("Inverted bbox bounds: {0}")]
    InvertedBounds(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bounds_string() {
        let bbox = BoundingBox::from_bounds_string("-30.0,-20.0,-70.0,-60.0").unwrap();
        assert_eq!(bbox.lat_min, -30.0);
        assert_eq!(bbox.lat_max, -20.0);
        assert_eq!(bbox.lon_min, -70.0);
        assert_eq!(bbox.lon_max, -60.0);
    }

    #[test]
    fn test_contains() {
        let bbox = BoundingBox::new(-30.0, -20.0, -70.0, -60.0);
        assert!(bbox.contains(-25.0, -65.0));
        assert!(bbox.contains(-30.0, -70.0));
        assert!(!bbox.contains(-19.0, -65.0));
    }
}
