use chrono::{Duration, Local, NaiveDate};

use crate::error::{ReportError, Result};
use crate::models::{DateWindow, ReportWindows, WindowSpan};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Report date for a run: the override when one is given, otherwise
/// yesterday in the process's local time.
pub fn compute_report_date(date_override: Option<&str>) -> Result<NaiveDate> {
    report_date_from(date_override, Local::now().date_naive())
}

pub fn report_date_from(date_override: Option<&str>, today: NaiveDate) -> Result<NaiveDate> {
    match date_override.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => {
            NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|source| {
                ReportError::InvalidDate {
                    input: value.to_string(),
                    source,
                }
            })
        }
        None => Ok(today - Duration::days(1)),
    }
}

pub fn compute_window(report_date: NaiveDate, span: WindowSpan) -> DateWindow {
    DateWindow {
        from: report_date - Duration::days(span.days() - 1),
        to: report_date,
        span,
    }
}

pub fn report_windows(report_date: NaiveDate) -> ReportWindows {
    ReportWindows {
        day1: compute_window(report_date, WindowSpan::Day1),
        day7: compute_window(report_date, WindowSpan::Day7),
        day30: compute_window(report_date, WindowSpan::Day30),
    }
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}
