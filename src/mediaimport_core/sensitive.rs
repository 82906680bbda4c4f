use crate::mediaimport_core::error::Result;
use crate::mediaimport_core::media::Location;
use geo::{Distance, Geodesic, Point};
use std::fs;
use std::path::{Path, PathBuf};

/// Points closer than this to a stored location are sensitive.
pub const SENSITIVE_DISTANCE_METERS: f64 = 50.0;

/// Answers whether a GPS position is one the user wants kept private.
pub trait SensitiveLocationOracle: Send + Sync {
    fn is_sensitive(&self, location: &Location) -> bool;
}

/// Sensitive locations stored as a JSON list of `{latitude, longitude}` objects.
#[derive(Debug, Default)]
pub struct SensitiveLocations {
    locations: Vec<Location>,
    path: Option<PathBuf>,
}

impl SensitiveLocations {
    /// In-memory list with nothing flagged and nowhere to save.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_locations(locations: Vec<Location>) -> Self {
        Self {
            locations,
            path: None,
        }
    }

    /// Load the list from `path`. A missing file is created empty so it can be edited by hand.
    pub fn load(path: &Path) -> Result<Self> {
        let mut list = Self {
            locations: Vec::new(),
            path: Some(path.to_path_buf()),
        };

        if path.exists() {
            let data = fs::read_to_string(path)?;
            if !data.trim().is_empty() {
                list.locations = serde_json::from_str(&data)?;
            }
            log::debug!(
                "Loaded {} sensitive locations from {}",
                list.locations.len(),
                path.display()
            );
        } else {
            list.save()?;
        }
        Ok(list)
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    /// Add a location unless one is already within range. Returns true if it was added.
    pub fn add(&mut self, location: Location) -> Result<bool> {
        if self
            .locations
            .iter()
            .any(|loc| meters_between(loc, &location) <= SENSITIVE_DISTANCE_METERS)
        {
            return Ok(false);
        }

        self.locations.push(location);
        self.save()?;
        Ok(true)
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(&self.locations)?)?;
        Ok(())
    }
}

impl SensitiveLocationOracle for SensitiveLocations {
    fn is_sensitive(&self, location: &Location) -> bool {
        self.locations
            .iter()
            .any(|loc| meters_between(loc, location) < SENSITIVE_DISTANCE_METERS)
    }
}

pub fn meters_between(a: &Location, b: &Location) -> f64 {
    let start = Point::new(a.longitude, a.latitude);
    let end = Point::new(b.longitude, b.latitude);
    Geodesic.distance(start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_meters_between() {
        // 0.001 degrees of latitude is about 111 meters
        let d = meters_between(&Location::new(47.0, -122.0), &Location::new(47.001, -122.0));
        assert!((d - 111.0).abs() < 1.0);
    }

    #[test]
    fn test_any_stored_location_matches() {
        let list = SensitiveLocations::from_locations(vec![
            Location::new(10.0, 10.0),
            Location::new(47.6062, -122.3321),
        ]);
        assert!(list.is_sensitive(&Location::new(47.6063, -122.3321)));
        assert!(!list.is_sensitive(&Location::new(47.6100, -122.3321)));
        assert!(!SensitiveLocations::empty().is_sensitive(&Location::new(10.0, 10.0)));
    }

    #[test]
    fn test_load_creates_empty_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("prefs").child("sensitive.json");
        let list = SensitiveLocations::load(file.path()).unwrap();
        assert!(list.locations().is_empty());
        file.assert("[]");
    }

    #[test]
    fn test_add_dedupes_and_persists() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("sensitive.json");
        let mut list = SensitiveLocations::load(file.path()).unwrap();

        assert!(list.add(Location::new(47.6062, -122.3321)).unwrap());
        assert!(!list.add(Location::new(47.60621, -122.3321)).unwrap());

        let reloaded = SensitiveLocations::load(file.path()).unwrap();
        assert_eq!(reloaded.locations().len(), 1);
        assert_eq!(reloaded.locations()[0].latitude, 47.6062);
    }

    #[test]
    fn test_load_hand_edited_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("sensitive.json");
        file.write_str(r#"[{"latitude": 1.5, "longitude": -2.5}]"#).unwrap();
        let list = SensitiveLocations::load(file.path()).unwrap();
        assert_eq!(list.locations(), &[Location::new(1.5, -2.5)]);
    }
}
