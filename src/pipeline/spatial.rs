use h3o::{CellIndex, LatLng, Resolution};

use crate::error::RecordError;

/// Maps a WGS84 position to its H3 cell at `resolution`.
///
/// Rejects non-finite values and values outside [-90,90] / [-180,180].
pub fn index(
    latitude: f64,
    longitude: f64,
    resolution: Resolution,
) -> Result<CellIndex, RecordError> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(RecordError::InvalidCoordinate(format!("latitude {latitude}")));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(RecordError::InvalidCoordinate(format!("longitude {longitude}")));
    }

    let ll = LatLng::new(latitude, longitude)
        .map_err(|e| RecordError::InvalidCoordinate(format!("{latitude},{longitude}: {e}")))?;
    Ok(ll.to_cell(resolution))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_is_deterministic() {
        let a = index(37.7749, -122.4194, Resolution::Six).unwrap();
        let b = index(37.7749, -122.4194, Resolution::Six).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.resolution(), Resolution::Six);
    }

    #[test]
    fn test_nearby_points_share_cell() {
        let a = index(37.77490, -122.41940, Resolution::Six).unwrap();
        let b = index(37.77495, -122.41945, Resolution::Six).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_boundaries_are_valid() {
        assert!(index(90.0, 180.0, Resolution::Six).is_ok());
        assert!(index(-90.0, -180.0, Resolution::Six).is_ok());
    }

    #[test]
    fn test_out_of_range() {
        assert!(matches!(
            index(90.5, 0.0, Resolution::Six),
            Err(RecordError::InvalidCoordinate(_))
        ));
        assert!(matches!(
            index(0.0, -180.1, Resolution::Six),
            Err(RecordError::InvalidCoordinate(_))
        ));
    }

    #[test]
    fn test_non_finite() {
        assert!(index(f64::NAN, 0.0, Resolution::Six).is_err());
        assert!(index(0.0, f64::INFINITY, Resolution::Six).is_err());
    }
}
