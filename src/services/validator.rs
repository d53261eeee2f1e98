//! Latitude/longitude range validation

use crate::domain::types::Candidate;

pub const MAX_ABS_LAT: f64 = 90.0;
pub const MAX_ABS_LNG: f64 = 180.0;

#[inline]
pub fn in_range(lat: f64, lng: f64) -> bool {
    lat.abs() <= MAX_ABS_LAT && lng.abs() <= MAX_ABS_LNG
}

/// Keep the candidate only if `|lat| <= 90` and `|lng| <= 180`
pub fn validate(candidate: Candidate) -> Option<Candidate> {
    in_range(candidate.lat, candidate.lng).then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(lat: f64, lng: f64) -> Candidate {
        Candidate { lat, lng, raw_key: format!("{:.3},{:.3}", lat, lng) }
    }

    #[test]
    fn test_accepts_bounds() {
        assert!(validate(candidate(90.0, 180.0)).is_some());
        assert!(validate(candidate(-90.0, -180.0)).is_some());
        assert!(validate(candidate(0.0, 0.0)).is_some());
    }

    #[test]
    fn test_rejects_latitude_out_of_range() {
        assert!(validate(candidate(95.0, 151.2093)).is_none());
        assert!(validate(candidate(-90.0001, 10.0)).is_none());
    }

    #[test]
    fn test_rejects_longitude_out_of_range() {
        assert!(validate(candidate(-33.8688, 180.5)).is_none());
    }

    #[test]
    fn test_rejects_nan() {
        assert!(!in_range(f64::NAN, 0.0));
    }
}
