use chrono::NaiveDate;

const HOURS_PER_DAY: u64 = 8;
const DAYS_PER_WEEK: u64 = 5;

/// Parse a Jira duration such as `1w 2d 3h 30m` into seconds.
///
/// Days and weeks follow Jira's default working time (8h days, 5d weeks).
/// A bare number is read as hours.
pub fn duration_seconds(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(hours) = raw.parse::<f64>() {
        return seconds(hours, 3600);
    }

    let mut total = 0u64;
    for part in raw.split_whitespace() {
        let unit = part.chars().last()?;
        let amount: f64 = part[..part.len() - unit.len_utf8()].parse().ok()?;
        let unit_seconds = match unit.to_ascii_lowercase() {
            'w' => DAYS_PER_WEEK * HOURS_PER_DAY * 3600,
            'd' => HOURS_PER_DAY * 3600,
            'h' => 3600,
            'm' => 60,
            _ => return None,
        };
        total = total.checked_add(seconds(amount, unit_seconds)?)?;
    }
    Some(total)
}

/// `None` for negative, non-finite or out-of-range amounts.
fn seconds(amount: f64, unit_seconds: u64) -> Option<u64> {
    let value = (amount * unit_seconds as f64).round();
    (value.is_finite() && value >= 0.0 && value < u64::MAX as f64).then(|| value as u64)
}

/// Normalize a start date to `YYYY-MM-DD`. Accepts ISO dates and `DD/MM/YYYY` or `DD/MM/YY`.
pub fn normalize_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let parsed = if raw.len() == 10 && raw.as_bytes()[4] == b'-' {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?
    } else {
        // %Y accepts any digit count, so pick the format from the year's width
        let format = match raw.rsplit('/').next()?.len() {
            4 => "%d/%m/%Y",
            2 => "%d/%m/%y",
            _ => return None,
        };
        NaiveDate::parse_from_str(raw, format).ok()?
    };
    Some(parsed.format("%Y-%m-%d").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_jira_durations() {
        assert_eq!(duration_seconds("1h"), Some(3600));
        assert_eq!(duration_seconds("30m"), Some(1800));
        assert_eq!(duration_seconds("1d 2h"), Some(10 * 3600));
        assert_eq!(duration_seconds("1w"), Some(40 * 3600));
        assert_eq!(duration_seconds("1.5h"), Some(5400));
        assert_eq!(duration_seconds("2"), Some(7200));
    }

    #[test]
    fn rejects_garbage_durations() {
        assert_eq!(duration_seconds(""), None);
        assert_eq!(duration_seconds("soon"), None);
        assert_eq!(duration_seconds("3x"), None);
        assert_eq!(duration_seconds("-1h"), None);
        assert_eq!(duration_seconds("NaNh"), None);
        assert_eq!(duration_seconds("inf"), None);
    }

    #[test]
    fn huge_durations_are_rejected_not_wrapped() {
        assert_eq!(duration_seconds("1e30h 1e30h"), None);
        assert_eq!(duration_seconds("1e30"), None);
        assert_eq!(duration_seconds("3000000000000000w 3000000000000000w"), None);
    }

    #[test]
    fn normalizes_dates() {
        assert_eq!(normalize_date("2025-10-06").as_deref(), Some("2025-10-06"));
        assert_eq!(normalize_date("06/10/2025").as_deref(), Some("2025-10-06"));
        assert_eq!(normalize_date("06/10/25").as_deref(), Some("2025-10-06"));
        assert_eq!(normalize_date("October 6th"), None);
        assert_eq!(normalize_date("2025-13-01"), None);
    }
}
