//! JSON snapshots of nest inputs and results.
//!
//! Anything serializable can be written, typically a [`NestResult`](crate::NestResult),
//! an [`NfpCandidateList`](crate::NfpCandidateList) or a
//! [`SheetPlacement`](crate::SheetPlacement), and loaded back for
//! inspection or regression tests.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sheetnest_core::{Error, Result};
use std::fs;
use std::path::Path;

pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::Serialization(e.to_string()))
}

pub fn to_json_pretty<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| Error::Serialization(e.to_string()))
}

pub fn from_json<T: DeserializeOwned>(json: &str) -> Result<T> {
    serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
}

/// Writes `value` to `path` as pretty-printed JSON.
pub fn save<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<()> {
    let json = to_json_pretty(value)?;
    fs::write(path.as_ref(), json)?;
    log::debug!("Snapshot written to {}", path.as_ref().display());
    Ok(())
}

pub fn load<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let json = fs::read_to_string(path)?;
    from_json(&json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Polygon, Sheet};
    use crate::result::{PartPlacement, SheetPlacement};
    use approx::assert_relative_eq;
    use sheetnest_core::PlacementType;

    fn sheet_placement() -> SheetPlacement {
        let part = Polygon::rectangle(30.0, 20.0).with_id(3).with_source(1);
        SheetPlacement::new(
            Sheet::rectangle(100.0, 50.0).with_id(9),
            PlacementType::BoundingBox,
            vec![PartPlacement::new(part, 10.0, 5.0)],
            0.0,
            3.0,
        )
    }

    #[test]
    fn test_json_round_trip() {
        let placement = sheet_placement();
        let json = to_json(&placement).unwrap();
        let back: SheetPlacement = from_json(&json).unwrap();
        assert_eq!(back.sheet_id(), 9);
        assert_eq!(back.placements[0].id, 3);
        assert_relative_eq!(back.fitness().total(), placement.fitness().total());
    }

    #[test]
    fn test_malformed_json() {
        let err = from_json::<SheetPlacement>("{ \"sheet\": ").unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("sheetnest-snapshot-{}.json", std::process::id()));
        save(&sheet_placement(), &path).unwrap();
        let back: SheetPlacement = load(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(back.placements.len(), 1);
    }

    #[test]
    fn test_missing_file() {
        let err = load::<SheetPlacement>("/nonexistent/sheetnest/snapshot.json").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
