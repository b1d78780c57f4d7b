//! Refresh timing and the "last updated" label.

use std::time::Duration;

/// Delay until the next automatic refresh.
///
/// The refresh is due `period` after the last completed load. A load that
/// never completed, or a due time already in the past, gives zero.
pub fn auto_refresh_delay(since_last_load: Option<Duration>, period: Duration) -> Duration {
    match since_last_load {
        Some(elapsed) => period.saturating_sub(elapsed),
        None => Duration::ZERO,
    }
}

/// Human-readable age of the displayed data.
pub fn last_updated_label(since_last_load: Option<Duration>) -> String {
    let text = match since_last_load {
        None => "never".to_string(),
        Some(elapsed) => {
            let mins = elapsed.as_secs() / 60;
            match mins {
                0 => "less than one minute ago".to_string(),
                1 => "1 min ago".to_string(),
                2..=59 => format!("{mins} mins ago"),
                _ => "more than an hour ago".to_string(),
            }
        }
    };
    format!("Last updated: {text}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERIOD: Duration = Duration::from_secs(60);

    #[test]
    fn refresh_due_after_period() {
        assert_eq!(
            auto_refresh_delay(Some(Duration::from_secs(15)), PERIOD),
            Duration::from_secs(45)
        );
    }

    #[test]
    fn overdue_refresh_fires_now() {
        assert_eq!(
            auto_refresh_delay(Some(Duration::from_secs(300)), PERIOD),
            Duration::ZERO
        );
        assert_eq!(auto_refresh_delay(Some(PERIOD), PERIOD), Duration::ZERO);
    }

    #[test]
    fn never_loaded_fires_now() {
        assert_eq!(auto_refresh_delay(None, PERIOD), Duration::ZERO);
    }

    #[test]
    fn labels() {
        assert_eq!(last_updated_label(None), "Last updated: never");
        assert_eq!(
            last_updated_label(Some(Duration::from_secs(59))),
            "Last updated: less than one minute ago"
        );
        assert_eq!(
            last_updated_label(Some(Duration::from_secs(61))),
            "Last updated: 1 min ago"
        );
        assert_eq!(
            last_updated_label(Some(Duration::from_secs(14 * 60 + 5))),
            "Last updated: 14 mins ago"
        );
        assert_eq!(
            last_updated_label(Some(Duration::from_secs(3600))),
            "Last updated: more than an hour ago"
        );
    }
}
