use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Provider-assigned funnel identifier. Sheets files may carry it as a
/// JSON number or a string; both normalize to the same opaque text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "RawFunnelId")]
pub struct FunnelId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFunnelId {
    Number(u64),
    Text(String),
}

impl From<RawFunnelId> for FunnelId {
    fn from(raw: RawFunnelId) -> Self {
        match raw {
            RawFunnelId::Number(id) => FunnelId::new(id.to_string()),
            RawFunnelId::Text(id) => FunnelId::new(id.trim()),
        }
    }
}

impl FunnelId {
    pub fn new(id: impl Into<String>) -> Self {
        FunnelId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FunnelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SheetDefinition {
    #[serde(alias = "sheetName")]
    pub name: String,
    #[serde(default, alias = "funnelIds")]
    pub funnel_ids: Vec<FunnelId>,
    #[serde(default, alias = "segmentationEvents")]
    pub events: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSpan {
    Day1,
    Day7,
    Day30,
}

impl WindowSpan {
    pub fn days(self) -> i64 {
        match self {
            WindowSpan::Day1 => 1,
            WindowSpan::Day7 => 7,
            WindowSpan::Day30 => 30,
        }
    }
}

impl fmt::Display for WindowSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-day window", self.days())
    }
}

/// Closed date range `[from, to]` ending on the report date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub span: WindowSpan,
}

impl DateWindow {
    pub fn label(&self) -> String {
        format!("{} ({} to {})", self.span, self.from, self.to)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportWindows {
    pub day1: DateWindow,
    pub day7: DateWindow,
    pub day30: DateWindow,
}

impl ReportWindows {
    pub fn iter(&self) -> impl Iterator<Item = &DateWindow> {
        [&self.day1, &self.day7, &self.day30].into_iter()
    }
}

/// Step conversion ratios of one funnel, queried over each of the three windows.
#[derive(Debug, Clone, PartialEq)]
pub struct FunnelWindows {
    pub funnel: FunnelId,
    pub day1: Vec<f64>,
    pub day7: Vec<f64>,
    pub day30: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Date(NaiveDate),
    Ratio(f64),
    Count(u64),
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            CellValue::Ratio(ratio) => write!(f, "{ratio}"),
            CellValue::Count(count) => write!(f, "{count}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ReportRow {
    pub cells: Vec<CellValue>,
}

impl ReportRow {
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn report_date(&self) -> Option<NaiveDate> {
        match self.cells.first() {
            Some(CellValue::Date(date)) => Some(*date),
            _ => None,
        }
    }

    pub fn to_record(&self) -> Vec<String> {
        self.cells.iter().map(ToString::to_string).collect()
    }
}
