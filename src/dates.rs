use serde::{Deserialize, Serialize};

pub const DEFAULT_MIN_YEAR: i32 = 2000;
pub const DEFAULT_MAX_YEAR: i32 = 2025;

/// Inclusive window of accepted years.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub min: i32,
    pub max: i32,
}

impl Default for YearRange {
    fn default() -> Self {
        YearRange { min: DEFAULT_MIN_YEAR, max: DEFAULT_MAX_YEAR }
    }
}

impl YearRange {
    pub fn is_plausible(&self, year: i32) -> bool {
        self.min <= year && year <= self.max
    }

    pub fn accepts(&self, date: &str) -> bool {
        extract_year(date).is_some_and(|y| self.is_plausible(y))
    }
}

/// Year of a `dd/mm/yyyy` (last segment) or `yyyy-mm-dd` (first segment) date.
pub fn extract_year(date: &str) -> Option<i32> {
    let date = date.trim();
    let segment = if date.contains('/') {
        date.rsplit('/').next()?
    } else if date.contains('-') {
        date.split('-').next()?
    } else {
        return None;
    };
    segment.trim().parse::<i32>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_year_from_both_formats() {
        assert_eq!(extract_year("01/02/2024"), Some(2024));
        assert_eq!(extract_year("2024-02-01"), Some(2024));
        assert_eq!(extract_year("31/12/2099"), Some(2099));
    }

    #[test]
    fn unparseable_dates_have_no_year() {
        assert_eq!(extract_year(""), None);
        assert_eq!(extract_year("not-a-date"), None);
        assert_eq!(extract_year("01.02.2024"), None);
        assert_eq!(extract_year("01/02/"), None);
        assert_eq!(extract_year("yesterday"), None);
    }

    #[test]
    fn default_window_is_inclusive() {
        let r = YearRange::default();
        assert!(r.is_plausible(2000));
        assert!(r.is_plausible(2025));
        assert!(!r.is_plausible(1999));
        assert!(!r.is_plausible(2026));
        assert!(r.accepts("01/02/2024"));
        assert!(r.accepts("2024-02-01"));
        assert!(!r.accepts("31/12/2099"));
        assert!(!r.accepts(""));
        assert!(!r.accepts("not-a-date"));
    }

    #[test]
    fn custom_window() {
        let r = YearRange { min: 2020, max: 2030 };
        assert!(r.accepts("2029-01-01"));
        assert!(!r.accepts("2019-12-31"));
    }
}
