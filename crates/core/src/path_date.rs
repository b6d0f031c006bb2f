//! Calendar dates embedded in folder and file names.
//!
//! Four pattern families are tried in a fixed order, each as a substring
//! search. A pattern whose captured date fails validation does not stop
//! the search; the next family is tried on the same string.

use std::path::Path;
use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldOrder {
    YearMonthDay,
    MonthDayYear,
}

struct DatePattern {
    regex: Regex,
    order: FieldOrder,
}

static DATE_PATTERNS: LazyLock<Vec<DatePattern>> = LazyLock::new(|| {
    [
        // 2024-12-25, 2024.12.25, 2024_12_25
        (r"([0-9]{4})[-._]([0-9]{1,2})[-._]([0-9]{1,2})", FieldOrder::YearMonthDay),
        // 20241225
        (r"([0-9]{4})([0-9]{2})([0-9]{2})", FieldOrder::YearMonthDay),
        // 2024年12月25日
        (r"([0-9]{4})年([0-9]{1,2})月([0-9]{1,2})日?", FieldOrder::YearMonthDay),
        // 12-25-2024, 12.25.2024
        (r"([0-9]{1,2})[-._]([0-9]{1,2})[-._]([0-9]{4})", FieldOrder::MonthDayYear),
    ]
    .into_iter()
    .map(|(pattern, order)| DatePattern {
        regex: Regex::new(pattern).expect("date pattern is valid"),
        order,
    })
    .collect()
});

/// Extract a date from a name string, returned at 12:00:00 so that a
/// timezone shift cannot move it onto a neighbouring day.
pub fn extract_date(name: &str) -> Option<NaiveDateTime> {
    DATE_PATTERNS
        .iter()
        .find_map(|pattern| parse_match(pattern, name))
}

/// Extract a date from the last component of `path` (folder or file name).
pub fn extract_date_from_path(path: &Path) -> Option<NaiveDateTime> {
    let name = path.file_name()?.to_string_lossy();
    extract_date(&name)
}

fn parse_match(pattern: &DatePattern, name: &str) -> Option<NaiveDateTime> {
    let caps = pattern.regex.captures(name)?;
    let field = |i: usize| -> Option<u32> { caps.get(i)?.as_str().parse().ok() };
    let (year, month, day) = match pattern.order {
        FieldOrder::YearMonthDay => (field(1)?, field(2)?, field(3)?),
        FieldOrder::MonthDayYear => (field(3)?, field(1)?, field(2)?),
    };

    if !(1900..=2100).contains(&year) || !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }

    NaiveDate::from_ymd_opt(year as i32, month, day)?.and_hms_opt(12, 0, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn noon(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_separated_year_month_day() {
        assert_eq!(extract_date("photo_2024-12-25_001.jpg"), Some(noon(2024, 12, 25)));
        assert_eq!(extract_date("trip 2024.12.25 beach"), Some(noon(2024, 12, 25)));
        assert_eq!(extract_date("2024_12_25"), Some(noon(2024, 12, 25)));
        assert_eq!(extract_date("2024-1-5 party"), Some(noon(2024, 1, 5)));
    }

    #[test]
    fn test_compact_year_month_day() {
        assert_eq!(extract_date("IMG20241225.jpg"), Some(noon(2024, 12, 25)));
    }

    #[test]
    fn test_chinese_calendar_form() {
        assert_eq!(extract_date("假期2024年12月25日.jpg"), Some(noon(2024, 12, 25)));
        assert_eq!(extract_date("2024年3月8"), Some(noon(2024, 3, 8)));
    }

    #[test]
    fn test_month_day_year() {
        assert_eq!(extract_date("12-25-2024.jpg"), Some(noon(2024, 12, 25)));
        assert_eq!(extract_date("scan 7.4.1999"), Some(noon(1999, 7, 4)));
    }

    #[test]
    fn test_invalid_month_and_day_yields_none() {
        assert_eq!(extract_date("2024-13-40.jpg"), None);
    }

    #[test]
    fn test_validation_failure_falls_through_to_next_pattern() {
        // The separated pattern captures year 0000 and fails; the compact
        // pattern then finds a valid date further along the string.
        assert_eq!(
            extract_date("0000-01-01 copy of 20230704"),
            Some(noon(2023, 7, 4))
        );
    }

    #[test]
    fn test_year_out_of_range() {
        assert_eq!(extract_date("1850-06-01"), None);
        assert_eq!(extract_date("2101-06-01"), None);
    }

    #[test]
    fn test_impossible_calendar_day() {
        assert_eq!(extract_date("2023-02-30"), None);
    }

    #[test]
    fn test_no_date() {
        assert_eq!(extract_date("IMG_1234.jpg"), None);
        assert_eq!(extract_date(""), None);
    }

    #[test]
    fn test_from_path_uses_last_component() {
        let path = PathBuf::from("/photos/2019-08-10 lake/IMG_0001.jpg");
        assert_eq!(extract_date_from_path(&path), None);
        assert_eq!(
            extract_date_from_path(path.parent().unwrap()),
            Some(noon(2019, 8, 10))
        );
    }
}
