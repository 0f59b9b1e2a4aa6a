use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;

use super::policy::TriggerSource;
use crate::config::DEFAULT_FILTER_SECONDS;

/// Time-window de-duplication of repeated "on" transitions.
///
/// The window is keyed per trigger source: each source carries the
/// timestamp of its most recent accepted event, so an alarm from one device
/// never masks a genuine alarm from another.
#[derive(Debug, Clone)]
pub struct DuplicateFilter {
    window: Duration,
}

impl DuplicateFilter {
    pub fn new(window_seconds: u64) -> Self {
        Self {
            window: Duration::seconds(window_seconds as i64),
        }
    }

    pub fn window_seconds(&self) -> u64 {
        self.window.num_seconds() as u64
    }

    /// Check whether an "on" transition for `source` repeats one already
    /// accepted within the window.
    ///
    /// The stored timestamp is refreshed only when the event is accepted;
    /// rapid-fire duplicates inside the window do not keep extending it.
    pub fn is_duplicate(&self, source: &mut TriggerSource, now: DateTime<Utc>) -> bool {
        let duplicate = source
            .last_on
            .is_some_and(|prev| now - prev < self.window);
        if !duplicate {
            source.last_on = Some(now);
        }
        duplicate
    }
}

impl Default for DuplicateFilter {
    fn default() -> Self {
        Self::new(DEFAULT_FILTER_SECONDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::DeviceId;

    fn source() -> TriggerSource {
        TriggerSource::new(DeviceId(3))
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(seconds, 0).unwrap()
    }

    #[test]
    fn test_first_event_is_not_a_duplicate() {
        let filter = DuplicateFilter::new(5);
        let mut source = source();

        assert!(!filter.is_duplicate(&mut source, at(0)));
        assert_eq!(source.last_on, Some(at(0)));
    }

    #[test]
    fn test_event_within_window_is_a_duplicate() {
        let filter = DuplicateFilter::new(5);
        let mut source = source();

        assert!(!filter.is_duplicate(&mut source, at(0)));
        assert!(filter.is_duplicate(&mut source, at(2)));
        // A filtered duplicate must not reset the window.
        assert_eq!(source.last_on, Some(at(0)));
    }

    #[test]
    fn test_event_after_window_is_accepted_again() {
        let filter = DuplicateFilter::new(5);
        let mut source = source();

        assert!(!filter.is_duplicate(&mut source, at(0)));
        assert!(filter.is_duplicate(&mut source, at(2)));
        assert!(!filter.is_duplicate(&mut source, at(6)));
        assert_eq!(source.last_on, Some(at(6)));
    }

    #[test]
    fn test_window_boundary_is_exclusive() {
        let filter = DuplicateFilter::new(5);
        let mut source = source();

        assert!(!filter.is_duplicate(&mut source, at(0)));
        assert!(!filter.is_duplicate(&mut source, at(5)));
    }
}
