// src/holidays.rs

use chrono::NaiveDate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Holiday {
    pub date: &'static str,
    pub name: &'static str,
}

const fn h(date: &'static str, name: &'static str) -> Holiday {
    Holiday { date, name }
}

/// Taiwan national holidays (observed dates).
pub const TAIWAN_HOLIDAYS: &[Holiday] = &[
    h("2025-01-01", "中華民國開國紀念日"),
    h("2025-01-27", "農曆除夕前一日"),
    h("2025-01-28", "農曆除夕"),
    h("2025-01-29", "春節初一"),
    h("2025-01-30", "春節初二"),
    h("2025-01-31", "春節初三"),
    h("2025-02-28", "和平紀念日"),
    h("2025-04-03", "兒童節前一日"),
    h("2025-04-04", "兒童節、清明節"),
    h("2025-05-01", "勞動節"),
    h("2025-05-31", "端午節"),
    h("2025-09-28", "教師節"),
    h("2025-10-06", "中秋節"),
    h("2025-10-10", "國慶日"),
    h("2025-10-25", "光復節"),
    h("2025-12-25", "行憲紀念日"),
    h("2026-01-01", "中華民國開國紀念日"),
    h("2026-02-16", "農曆除夕前一日"),
    h("2026-02-17", "農曆除夕"),
    h("2026-02-18", "春節初一"),
    h("2026-02-19", "春節初二"),
    h("2026-02-20", "春節初三"),
    h("2026-02-28", "和平紀念日"),
    h("2026-04-03", "兒童節"),
    h("2026-04-04", "清明節"),
    h("2026-05-01", "勞動節"),
    h("2026-06-19", "端午節"),
    h("2026-09-28", "教師節"),
    h("2026-09-25", "中秋節"),
    h("2026-10-10", "國慶日"),
    h("2026-10-25", "光復節"),
    h("2026-12-25", "行憲紀念日"),
];

/// Looks a date up by its `YYYY-MM-DD` key.
pub fn national_holiday_by_key(date_key: &str) -> Option<&'static Holiday> {
    TAIWAN_HOLIDAYS.iter().find(|holiday| holiday.date == date_key)
}

pub fn national_holiday(date: NaiveDate) -> Option<&'static Holiday> {
    national_holiday_by_key(&date.format("%Y-%m-%d").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_holidays() {
        let lunar_new_year = NaiveDate::from_ymd_opt(2025, 1, 29).unwrap();
        assert_eq!(national_holiday(lunar_new_year).unwrap().name, "春節初一");

        let national_day = national_holiday_by_key("2026-10-10").unwrap();
        assert_eq!(national_day.name, "國慶日");
    }

    #[test]
    fn test_ordinary_days_and_unlisted_years() {
        assert!(national_holiday(NaiveDate::from_ymd_opt(2025, 3, 12).unwrap()).is_none());
        assert!(national_holiday_by_key("2027-01-01").is_none());
    }

    #[test]
    fn test_table_dates_are_valid() {
        for holiday in TAIWAN_HOLIDAYS {
            assert!(
                NaiveDate::parse_from_str(holiday.date, "%Y-%m-%d").is_ok(),
                "bad date {}",
                holiday.date
            );
        }
    }
}
