//! Partial ISO 8601 dates: parsing, imputation, and study day.
//!
//! Source dates may be truncated (`2014`, `2014-06`, `2014-06-10T08`). A
//! value is imputed only when every missing component is at or below the
//! configured highest imputation level; otherwise the result is missing.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};

/// Date/time component, ordered from finest to coarsest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DatePart {
    /// Nothing may be imputed.
    None,
    Second,
    Minute,
    Hour,
    Day,
    Month,
    Year,
}

/// Whether missing components take their earliest or latest value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Imputation {
    First,
    Last,
}

/// Imputation policy for one analysis date variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImputationRule {
    pub highest: DatePart,
    pub date: Imputation,
    pub time: Imputation,
}

impl ImputationRule {
    pub const fn new(highest: DatePart, date: Imputation, time: Imputation) -> Self {
        Self {
            highest,
            date,
            time,
        }
    }

    /// Day-level imputation to the first of the month.
    pub const fn first_day() -> Self {
        Self::new(DatePart::Day, Imputation::First, Imputation::First)
    }
}

/// Components present in a source date string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialDateTime {
    pub year: i32,
    pub month: Option<u32>,
    pub day: Option<u32>,
    pub hour: Option<u32>,
    pub minute: Option<u32>,
    pub second: Option<u32>,
}

impl PartialDateTime {
    /// Parses `YYYY[-MM[-DD[Thh[:mm[:ss[.f]]]]]]`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let (date, time) = match value.split_once('T') {
            Some((date, time)) => (date, Some(time)),
            None => (value, None),
        };

        let mut date_parts = date.split('-');
        let year_text = date_parts.next()?;
        if year_text.len() != 4 {
            return None;
        }
        let year = year_text.parse::<i32>().ok()?;
        let month = parse_component(date_parts.next(), 1, 12)?;
        let day = parse_component(date_parts.next(), 1, 31)?;
        if date_parts.next().is_some() {
            return None;
        }

        let (mut hour, mut minute, mut second) = (None, None, None);
        if let Some(time) = time {
            day?;
            let time = time.split('.').next().unwrap_or(time);
            let mut time_parts = time.split(':');
            hour = parse_component(time_parts.next(), 0, 23)?;
            minute = parse_component(time_parts.next(), 0, 59)?;
            second = parse_component(time_parts.next(), 0, 59)?;
        }

        let parsed = Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        };
        if let (Some(month), Some(day)) = (parsed.month, parsed.day) {
            NaiveDate::from_ymd_opt(year, month, day)?;
        }
        Some(parsed)
    }

    /// Coarsest missing date component, if any.
    fn missing_date_part(&self) -> Option<DatePart> {
        if self.month.is_none() {
            Some(DatePart::Month)
        } else if self.day.is_none() {
            Some(DatePart::Day)
        } else {
            None
        }
    }

    /// Coarsest missing time component, if any.
    fn missing_time_part(&self) -> Option<DatePart> {
        if self.hour.is_none() {
            Some(DatePart::Hour)
        } else if self.minute.is_none() {
            Some(DatePart::Minute)
        } else if self.second.is_none() {
            Some(DatePart::Second)
        } else {
            None
        }
    }

    fn fill_date(&self, imputation: Imputation) -> Option<NaiveDate> {
        let month = self.month.unwrap_or(match imputation {
            Imputation::First => 1,
            Imputation::Last => 12,
        });
        let day = match (self.day, imputation) {
            (Some(day), _) => day,
            (None, Imputation::First) => 1,
            (None, Imputation::Last) => last_day_of_month(self.year, month)?,
        };
        NaiveDate::from_ymd_opt(self.year, month, day)
    }

    fn fill_time(&self, imputation: Imputation) -> Option<NaiveTime> {
        let (hour, minute, second) = match imputation {
            Imputation::First => (0, 0, 0),
            Imputation::Last => (23, 59, 59),
        };
        NaiveTime::from_hms_opt(
            self.hour.unwrap_or(hour),
            self.minute.unwrap_or(minute),
            self.second.unwrap_or(second),
        )
    }
}

fn parse_component(text: Option<&str>, min: u32, max: u32) -> Option<Option<u32>> {
    match text {
        None => Some(None),
        Some(text) if text.len() == 2 => {
            let value = text.parse::<u32>().ok()?;
            (min..=max).contains(&value).then_some(Some(value))
        }
        Some(_) => None,
    }
}

fn last_day_of_month(year: i32, month: u32) -> Option<u32> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?
        .pred_opt()
        .map(|date| date.day())
}

/// An imputed date with its imputation flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImputedDate {
    pub date: NaiveDate,
    /// `"M"` when month and day were imputed, `"D"` when only the day was.
    pub flag: Option<&'static str>,
}

/// An imputed date-time with date and time imputation flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImputedDateTime {
    pub datetime: NaiveDateTime,
    pub date_flag: Option<&'static str>,
    /// `"H"`, `"M"` or `"S"` for the coarsest imputed time component.
    pub time_flag: Option<&'static str>,
}

fn date_flag(missing: Option<DatePart>) -> Option<&'static str> {
    match missing {
        Some(DatePart::Month) => Some("M"),
        Some(DatePart::Day) => Some("D"),
        _ => None,
    }
}

fn time_flag(missing: Option<DatePart>) -> Option<&'static str> {
    match missing {
        Some(DatePart::Hour) => Some("H"),
        Some(DatePart::Minute) => Some("M"),
        Some(DatePart::Second) => Some("S"),
        _ => None,
    }
}

/// Imputes a date from a partial source string.
///
/// `min_dates` raise and `max_dates` lower the imputed value, but only when
/// imputation happened and the bound lies within the dates the partial value
/// could denote.
pub fn impute_date(
    value: &str,
    rule: ImputationRule,
    min_dates: &[Option<NaiveDate>],
    max_dates: &[Option<NaiveDate>],
) -> Option<ImputedDate> {
    let partial = PartialDateTime::parse(value)?;
    let missing = partial.missing_date_part();
    if missing.is_some_and(|part| part > rule.highest) {
        return None;
    }
    let mut date = partial.fill_date(rule.date)?;
    if missing.is_some() {
        let earliest = partial.fill_date(Imputation::First)?;
        let latest = partial.fill_date(Imputation::Last)?;
        let in_range = |bound: &NaiveDate| (earliest..=latest).contains(bound);
        if let Some(bound) = min_dates.iter().flatten().filter(|b| in_range(*b)).max() {
            date = date.max(*bound);
        }
        if let Some(bound) = max_dates.iter().flatten().filter(|b| in_range(*b)).min() {
            date = date.min(*bound);
        }
    }
    Some(ImputedDate {
        date,
        flag: date_flag(missing),
    })
}

/// Imputes a date-time from a partial source string.
///
/// Date bounds apply as the start of day for `min_dates` and the end of day
/// for `max_dates`.
pub fn impute_datetime(
    value: &str,
    rule: ImputationRule,
    min_dates: &[Option<NaiveDate>],
    max_dates: &[Option<NaiveDate>],
) -> Option<ImputedDateTime> {
    let partial = PartialDateTime::parse(value)?;
    let missing_date = partial.missing_date_part();
    let missing_time = partial.missing_time_part();
    let coarsest = missing_date.or(missing_time);
    if coarsest.is_some_and(|part| part > rule.highest) {
        return None;
    }

    let mut datetime = partial
        .fill_date(rule.date)?
        .and_time(partial.fill_time(rule.time)?);
    if coarsest.is_some() {
        let earliest = partial
            .fill_date(Imputation::First)?
            .and_time(partial.fill_time(Imputation::First)?);
        let latest = partial
            .fill_date(Imputation::Last)?
            .and_time(partial.fill_time(Imputation::Last)?);
        let range = earliest..=latest;
        let lower = min_dates
            .iter()
            .flatten()
            .map(|date| date.and_time(NaiveTime::MIN))
            .filter(|bound| range.contains(bound))
            .max();
        if let Some(bound) = lower {
            datetime = datetime.max(bound);
        }
        let upper = max_dates
            .iter()
            .flatten()
            .filter_map(|date| date.and_hms_opt(23, 59, 59))
            .filter(|bound| range.contains(bound))
            .min();
        if let Some(bound) = upper {
            datetime = datetime.min(bound);
        }
    }
    Some(ImputedDateTime {
        datetime,
        date_flag: date_flag(missing_date),
        time_flag: time_flag(missing_time),
    })
}

/// Day-level imputation to the first of the month, without bounds.
pub fn first_day_date(value: Option<&str>) -> Option<NaiveDate> {
    impute_date(value?, ImputationRule::first_day(), &[], &[]).map(|imputed| imputed.date)
}

/// Complete date only; partial values are missing.
pub fn complete_date(value: &str) -> Option<NaiveDate> {
    impute_date(
        value,
        ImputationRule::new(DatePart::None, Imputation::First, Imputation::First),
        &[],
        &[],
    )
    .map(|imputed| imputed.date)
}

/// Study day relative to `reference`: day 1 is the reference date and
/// there is no day 0.
pub fn study_day(date: NaiveDate, reference: NaiveDate) -> i64 {
    let days = (date - reference).num_days();
    if days >= 0 { days + 1 } else { days }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_truncated_values() {
        let partial = PartialDateTime::parse("2014-06").unwrap();
        assert_eq!((partial.year, partial.month, partial.day), (2014, Some(6), None));

        let partial = PartialDateTime::parse("2014-06-10T08:30").unwrap();
        assert_eq!((partial.hour, partial.minute, partial.second), (Some(8), Some(30), None));

        assert!(PartialDateTime::parse("2014-02-30").is_none());
        assert!(PartialDateTime::parse("2014-06T08").is_none());
        assert!(PartialDateTime::parse("14-06-10").is_none());
        assert!(PartialDateTime::parse("").is_none());
    }

    #[test]
    fn month_precision_imputes_first_day() {
        let imputed = impute_date("2014-06", ImputationRule::first_day(), &[], &[]).unwrap();
        assert_eq!(imputed.date, date(2014, 6, 1));
        assert_eq!(imputed.flag, Some("D"));
    }

    #[test]
    fn year_precision_is_not_imputed_at_day_level() {
        assert_eq!(impute_date("2014", ImputationRule::first_day(), &[], &[]), None);
    }

    #[test]
    fn complete_dates_carry_no_flag() {
        let imputed = impute_date("2014-06-10", ImputationRule::first_day(), &[], &[]).unwrap();
        assert_eq!(imputed.date, date(2014, 6, 10));
        assert_eq!(imputed.flag, None);
    }

    #[test]
    fn last_imputation_uses_month_end() {
        let rule = ImputationRule::new(DatePart::Month, Imputation::Last, Imputation::Last);
        assert_eq!(impute_date("2012-02", rule, &[], &[]).unwrap().date, date(2012, 2, 29));
        let imputed = impute_date("2013", rule, &[], &[]).unwrap();
        assert_eq!(imputed.date, date(2013, 12, 31));
        assert_eq!(imputed.flag, Some("M"));
    }

    #[test]
    fn min_date_applies_only_inside_possible_range() {
        let rule = ImputationRule::first_day();
        let trtsdt = Some(date(2014, 6, 15));
        let imputed = impute_date("2014-06", rule, &[trtsdt], &[]).unwrap();
        assert_eq!(imputed.date, date(2014, 6, 15));

        let imputed = impute_date("2014-07", rule, &[trtsdt], &[]).unwrap();
        assert_eq!(imputed.date, date(2014, 7, 1));

        let imputed = impute_date("2014-06-03", rule, &[trtsdt], &[]).unwrap();
        assert_eq!(imputed.date, date(2014, 6, 3));
    }

    #[test]
    fn datetime_start_imputation() {
        let rule = ImputationRule::new(DatePart::Day, Imputation::First, Imputation::First);
        let imputed = impute_datetime("2014-06-10", rule, &[], &[]).unwrap();
        assert_eq!(imputed.datetime, date(2014, 6, 10).and_hms_opt(0, 0, 0).unwrap());
        assert_eq!(imputed.date_flag, None);
        assert_eq!(imputed.time_flag, Some("H"));

        let imputed = impute_datetime("2014-06", rule, &[Some(date(2014, 6, 20))], &[]).unwrap();
        assert_eq!(imputed.datetime, date(2014, 6, 20).and_hms_opt(0, 0, 0).unwrap());
        assert_eq!(imputed.date_flag, Some("D"));
    }

    #[test]
    fn datetime_end_imputation_is_capped() {
        let rule = ImputationRule::new(DatePart::Hour, Imputation::Last, Imputation::Last);
        let imputed = impute_datetime("2014-06-10T08", rule, &[], &[]).unwrap();
        assert_eq!(imputed.datetime, date(2014, 6, 10).and_hms_opt(8, 59, 59).unwrap());
        assert_eq!(imputed.time_flag, Some("M"));

        assert_eq!(impute_datetime("2014-06", rule, &[], &[]), None);

        let capped = impute_datetime("2014-06-10", rule, &[], &[Some(date(2014, 6, 10))]).unwrap();
        assert_eq!(capped.datetime, date(2014, 6, 10).and_hms_opt(23, 59, 59).unwrap());
    }

    #[test]
    fn study_day_skips_zero() {
        let reference = date(2014, 1, 2);
        assert_eq!(study_day(reference, reference), 1);
        assert_eq!(study_day(date(2014, 1, 1), reference), -1);
        assert_eq!(study_day(date(2014, 1, 9), reference), 8);
    }

    #[test]
    fn complete_date_rejects_partials() {
        assert_eq!(complete_date("2014-01-02T10:00"), Some(date(2014, 1, 2)));
        assert_eq!(complete_date("2014-01"), None);
    }

    proptest! {
        #[test]
        fn imputed_dates_stay_within_the_month(year in 1990i32..2030, month in 1u32..=12) {
            let text = format!("{year:04}-{month:02}");
            let rule = ImputationRule::new(DatePart::Day, Imputation::Last, Imputation::Last);
            let imputed = impute_date(&text, rule, &[], &[]).unwrap();
            prop_assert_eq!(imputed.date.month(), month);
            prop_assert!(imputed.date.succ_opt().unwrap().month() != month);
        }

        #[test]
        fn study_day_is_never_zero(offset in -1000i64..1000) {
            let reference = NaiveDate::from_ymd_opt(2014, 1, 2).unwrap();
            let day = reference + chrono::Duration::days(offset);
            prop_assert_ne!(study_day(day, reference), 0);
        }
    }
}
