use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::models::{
    normalize_birth_date, AnalysisRecord, BirthdayNotice, Period, RevenueStats, StatusCounts,
    StatusTab,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodBounds {
    pub week_start: NaiveDateTime,
    pub month_start: NaiveDateTime,
    pub year_start: NaiveDateTime,
}

impl PeriodBounds {
    /// Week starts on Sunday at local midnight.
    pub fn at(now: NaiveDateTime) -> Self {
        let today = now.date();
        let week_start = today - Duration::days(i64::from(today.weekday().num_days_from_sunday()));
        let month_start = today.with_day(1).unwrap_or(today);
        let year_start = NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today);
        Self {
            week_start: week_start.and_time(NaiveTime::MIN),
            month_start: month_start.and_time(NaiveTime::MIN),
            year_start: year_start.and_time(NaiveTime::MIN),
        }
    }

    fn lower_bound(&self, period: Period) -> Option<NaiveDateTime> {
        match period {
            Period::Week => Some(self.week_start),
            Period::Month => Some(self.month_start),
            Period::Year => Some(self.year_start),
            Period::Total => None,
        }
    }
}

pub fn filter_by_tab(records: &[AnalysisRecord], tab: StatusTab) -> Vec<AnalysisRecord> {
    records.iter().filter(|r| tab.admits(r)).cloned().collect()
}

pub fn filter_by_search(records: Vec<AnalysisRecord>, term: &str) -> Vec<AnalysisRecord> {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return records;
    }
    records
        .into_iter()
        .filter(|r| r.display_name().to_lowercase().contains(&needle))
        .collect()
}

fn sum_since(records: &[AnalysisRecord], since: Option<NaiveDateTime>) -> f64 {
    records
        .iter()
        .filter(|r| match since {
            None => true,
            Some(bound) => r.attended_at().is_some_and(|at| at >= bound),
        })
        .map(AnalysisRecord::amount)
        .sum()
}

/// `records` must already be filtered by the active tab.
pub fn revenue_stats(records: &[AnalysisRecord], period: Period, now: NaiveDateTime) -> RevenueStats {
    let bounds = PeriodBounds::at(now);
    RevenueStats {
        total: sum_since(records, bounds.lower_bound(period)),
        week: sum_since(records, Some(bounds.week_start)),
        month: sum_since(records, Some(bounds.month_start)),
        year: sum_since(records, Some(bounds.year_start)),
    }
}

pub fn status_counts(records: &[AnalysisRecord]) -> StatusCounts {
    let finished = records.iter().filter(|r| r.finished).count();
    StatusCounts {
        finished,
        in_progress: records.len() - finished,
        attention: 0,
    }
}

/// First record, in list order, whose normalized birth date satisfies
/// `is_birthday`. Only one client is ever reported.
pub fn find_birthday<F>(records: &[AnalysisRecord], mut is_birthday: F) -> Option<BirthdayNotice>
where
    F: FnMut(&str) -> bool,
{
    records.iter().find_map(|r| {
        let raw = r.birth_date.as_deref().map(str::trim).unwrap_or("");
        if raw.is_empty() {
            return None;
        }
        let normalized = normalize_birth_date(raw)?.format("%Y-%m-%d").to_string();
        if is_birthday(&normalized) {
            Some(BirthdayNotice {
                name: r.display_name().to_string(),
                birth_date: raw.to_string(),
            })
        } else {
            None
        }
    })
}

pub fn is_birthday_on(birth: NaiveDate, today: NaiveDate) -> bool {
    if birth.month() == today.month() && birth.day() == today.day() {
        return true;
    }
    // Feb 29 birthdays are celebrated on Feb 28 outside leap years.
    birth.month() == 2
        && birth.day() == 29
        && today.month() == 2
        && today.day() == 28
        && NaiveDate::from_ymd_opt(today.year(), 2, 29).is_none()
}

pub fn is_birthday_text_on(raw: &str, today: NaiveDate) -> bool {
    normalize_birth_date(raw).is_some_and(|birth| is_birthday_on(birth, today))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(id: &str, date: &str, value: serde_json::Value, finished: bool) -> AnalysisRecord {
        AnalysisRecord {
            id: id.to_string(),
            nome_cliente: Some(format!("client {id}")),
            attendance_date: date.to_string(),
            value,
            finished,
            ..Default::default()
        }
    }

    // Wednesday 2026-10-14 15:30 local.
    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 14)
            .unwrap()
            .and_hms_opt(15, 30, 0)
            .unwrap()
    }

    fn fixture() -> Vec<AnalysisRecord> {
        vec![
            rec("a", "2026-10-11", json!(100), true),   // Sunday, week start
            rec("b", "2026-10-10", json!("50"), false), // Saturday before
            rec("c", "2026-10-01", json!(30), true),
            rec("d", "2026-01-01", json!(20), false),
            rec("e", "2025-12-31", json!(7), true),
            rec("f", "garbage", json!(1000), true),
            rec("g", "2026-10-12", json!("n/a"), false),
        ]
    }

    #[test]
    fn bounds_are_midnight_and_nested() {
        let b = PeriodBounds::at(now());
        assert_eq!(b.week_start.to_string(), "2026-10-11 00:00:00");
        assert_eq!(b.month_start.to_string(), "2026-10-01 00:00:00");
        assert_eq!(b.year_start.to_string(), "2026-01-01 00:00:00");

        let sunday = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap().and_hms_opt(8, 0, 0).unwrap();
        assert_eq!(PeriodBounds::at(sunday).week_start.date(), sunday.date());
    }

    #[test]
    fn revenue_windows_are_inclusive_and_skip_bad_dates() {
        let records = fixture();
        let stats = revenue_stats(&records, Period::Month, now());
        assert_eq!(stats.week, 100.0);
        assert_eq!(stats.month, 180.0);
        assert_eq!(stats.year, 200.0);
        assert_eq!(stats.total, stats.month);
        assert!(stats.week <= stats.month && stats.month <= stats.year);

        let total = revenue_stats(&records, Period::Total, now());
        assert_eq!(total.total, 1207.0);
        let plain_sum: f64 = records.iter().map(AnalysisRecord::amount).sum();
        assert_eq!(total.total, plain_sum);
    }

    #[test]
    fn revenue_uses_tab_filtered_input() {
        let finished = filter_by_tab(&fixture(), StatusTab::Finished);
        let stats = revenue_stats(&finished, Period::Year, now());
        assert_eq!(stats.total, 130.0);
        assert_eq!(stats.week, 100.0);
    }

    #[test]
    fn tab_filter_partitions_records() {
        let records = fixture();
        let finished = filter_by_tab(&records, StatusTab::Finished);
        let open = filter_by_tab(&records, StatusTab::InProgress);
        assert!(finished.iter().all(|r| r.finished));
        assert!(open.iter().all(|r| !r.finished));
        assert_eq!(finished.len() + open.len(), records.len());
        assert_eq!(filter_by_tab(&records, StatusTab::All), records);
    }

    #[test]
    fn search_matches_display_name_case_insensitively() {
        let mut records = fixture();
        records[2].nome_cliente = Some("Ana Clara".to_string());
        let hits = filter_by_search(records.clone(), "  clara ");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "c");
        assert_eq!(filter_by_search(records.clone(), "").len(), records.len());
    }

    #[test]
    fn status_counts_cover_every_record() {
        let records = fixture();
        let counts = status_counts(&records);
        assert_eq!(counts.finished, 4);
        assert_eq!(counts.in_progress, 3);
        assert_eq!(counts.attention, 0);
        assert_eq!(counts.finished + counts.in_progress, records.len());
        assert_eq!(status_counts(&[]), StatusCounts::default());
    }

    #[test]
    fn birthday_scan_takes_first_match() {
        let mut records = fixture();
        records[0].birth_date = Some("1990-05-05".to_string());
        records[1].birth_date = Some("1985-07-10".to_string());
        records[3].birth_date = Some("1990-05-05T12:00:00Z".to_string());

        let notice = find_birthday(&records, |d| d == "1990-05-05").expect("notice");
        assert_eq!(notice.name, "client a");
        assert_eq!(notice.birth_date, "1990-05-05");

        assert_eq!(find_birthday(&records, |_| false), None);
    }

    #[test]
    fn birthday_scan_skips_empty_and_unparsable_dates() {
        let mut records = fixture();
        records[0].birth_date = Some("   ".to_string());
        records[1].birth_date = Some("someday".to_string());
        let mut seen = Vec::new();
        let notice = find_birthday(&records, |d| {
            seen.push(d.to_string());
            true
        });
        assert_eq!(notice, None);
        assert!(seen.is_empty());
    }

    #[test]
    fn birthday_scan_pads_dates_before_asking() {
        let mut records = fixture();
        records[0].birth_date = Some("1990-5-5".to_string());
        let mut seen = Vec::new();
        let notice = find_birthday(&records[..1], |d| {
            seen.push(d.to_string());
            d == "1990-05-05"
        })
        .expect("unpadded birth date matches");
        assert_eq!(seen, vec!["1990-05-05"]);
        assert_eq!(notice.birth_date, "1990-5-5");
    }

    #[test]
    fn leap_day_birthdays_fall_back_to_feb_28() {
        let leap_birth = NaiveDate::from_ymd_opt(2000, 2, 29).unwrap();
        assert!(is_birthday_on(leap_birth, NaiveDate::from_ymd_opt(2026, 2, 28).unwrap()));
        assert!(!is_birthday_on(leap_birth, NaiveDate::from_ymd_opt(2028, 2, 28).unwrap()));
        assert!(is_birthday_on(leap_birth, NaiveDate::from_ymd_opt(2028, 2, 29).unwrap()));
        assert!(is_birthday_text_on("1990-10-19", NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()));
        assert!(!is_birthday_text_on("1990-10-20", NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()));
    }
}
