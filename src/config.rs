use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use serde::Deserialize;

use crate::client::DEFAULT_API_URL;
use crate::driver::FailurePolicy;
use crate::error::{ReportError, Result};
use crate::models::SheetDefinition;
use crate::sink::is_reserved_sheet_name;

const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
struct SheetsFile {
    sheets: Vec<SheetDefinition>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_secret: String,
    pub api_url: String,
    pub timeout: Duration,
    pub sheets: Vec<SheetDefinition>,
    pub report_date: Option<String>,
    pub failure_policy: FailurePolicy,
}

impl Config {
    /// Sheets come from the JSON file; the API secret from `MIXPANEL_API_SECRET`.
    pub fn load(sheets_path: &Path) -> anyhow::Result<Self> {
        let sheets = load_sheets(sheets_path)?;
        let api_secret = std::env::var("MIXPANEL_API_SECRET")
            .context("MIXPANEL_API_SECRET must be set to the project's API secret")?;
        if api_secret.trim().is_empty() {
            bail!("MIXPANEL_API_SECRET is empty");
        }

        Ok(Self {
            api_secret,
            api_url: std::env::var("MIXPANEL_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            timeout: parse_timeout(std::env::var("MIXPANEL_TIMEOUT_SECS").ok().as_deref())?,
            sheets,
            report_date: std::env::var("REPORT_DATE").ok(),
            failure_policy: FailurePolicy::HaltOnFirst,
        })
    }
}

fn parse_timeout(raw: Option<&str>) -> anyhow::Result<Duration> {
    let Some(raw) = raw else {
        return Ok(Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    };
    let secs: u64 = raw.trim().parse().with_context(|| {
        format!("MIXPANEL_TIMEOUT_SECS must be a whole number of seconds, got {raw:?}")
    })?;
    if secs == 0 {
        bail!("MIXPANEL_TIMEOUT_SECS must be greater than zero");
    }
    Ok(Duration::from_secs(secs))
}

pub fn load_sheets(path: &Path) -> anyhow::Result<Vec<SheetDefinition>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read sheets file {}", path.display()))?;
    parse_sheets(&raw).with_context(|| format!("invalid sheets file {}", path.display()))
}

pub fn parse_sheets(raw: &str) -> anyhow::Result<Vec<SheetDefinition>> {
    let file: SheetsFile = serde_json::from_str(raw)?;
    validate_sheets(&file.sheets)?;
    Ok(file.sheets)
}

fn validate_sheets(sheets: &[SheetDefinition]) -> Result<()> {
    let invalid = |message: String| -> Result<()> { Err(ReportError::InvalidConfig(message)) };
    if sheets.is_empty() {
        return invalid("no sheets defined".to_string());
    }

    let mut seen = HashSet::new();
    for sheet in sheets {
        if sheet.name.trim().is_empty() {
            return invalid("sheet names must not be empty".to_string());
        }
        if is_reserved_sheet_name(&sheet.name) {
            return invalid(format!("sheet name {} is reserved", sheet.name));
        }
        if !seen.insert(sheet.name.as_str()) {
            return invalid(format!("sheet {} is defined more than once", sheet.name));
        }
        if sheet.funnel_ids.iter().any(|id| id.as_str().is_empty()) {
            return Err(ReportError::InvalidMetric(format!(
                "sheet {} has an empty funnel id",
                sheet.name
            )));
        }
        if sheet.events.iter().any(|event| event.trim().is_empty()) {
            return Err(ReportError::InvalidMetric(format!(
                "sheet {} has an empty event name",
                sheet.name
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn funnel_ids_accept_numbers_and_strings() {
        let sheets = parse_sheets(
            r#"{"sheets": [
                {"name": "SUMMARY", "funnel_ids": [1897269, "1897273"]},
                {"name": "SIGNUP", "funnel_ids": [], "events": ["Sign Up"]}
            ]}"#,
        )
        .unwrap();

        assert_eq!(sheets.len(), 2);
        assert_eq!(sheets[0].funnel_ids[0].as_str(), "1897269");
        assert_eq!(sheets[0].funnel_ids[1].as_str(), "1897273");
        assert!(sheets[0].events.is_empty());
        assert_eq!(sheets[1].events, vec!["Sign Up"]);
    }

    #[test]
    fn camel_case_keys_are_accepted() {
        let sheets = parse_sheets(
            r#"{"sheets": [{"sheetName": "VISITORS", "funnelIds": [2104254],
                "segmentationEvents": ["$custom_event:422472"]}]}"#,
        )
        .unwrap();

        assert_eq!(sheets[0].name, "VISITORS");
        assert_eq!(sheets[0].events, vec!["$custom_event:422472"]);
    }

    #[test]
    fn duplicate_sheets_are_rejected() {
        let err = parse_sheets(r#"{"sheets": [{"name": "MISC"}, {"name": "MISC"}]}"#).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    fn config_error(raw: &str) -> ReportError {
        parse_sheets(raw)
            .unwrap_err()
            .downcast::<ReportError>()
            .unwrap()
    }

    #[test]
    fn empty_metrics_are_invalid_metrics() {
        let funnel = config_error(r#"{"sheets": [{"name": "A", "funnel_ids": [""]}]}"#);
        assert!(matches!(funnel, ReportError::InvalidMetric(_)));

        let event = config_error(r#"{"sheets": [{"name": "A", "events": [" "]}]}"#);
        assert!(matches!(event, ReportError::InvalidMetric(_)));

        let empty = config_error(r#"{"sheets": []}"#);
        assert!(matches!(empty, ReportError::InvalidConfig(_)));
    }

    #[test]
    fn index_sheet_name_is_reserved() {
        let err = config_error(r#"{"sheets": [{"name": "_sheets", "events": ["Sign Up"]}]}"#);
        assert!(matches!(err, ReportError::InvalidConfig(_)));
    }

    #[test]
    fn timeout_defaults_and_parses() {
        assert_eq!(parse_timeout(None).unwrap(), Duration::from_secs(60));
        assert_eq!(parse_timeout(Some(" 15 ")).unwrap(), Duration::from_secs(15));
    }

    #[test]
    fn bad_timeout_is_an_error() {
        let err = parse_timeout(Some("soon")).unwrap_err();
        assert!(err.to_string().contains("MIXPANEL_TIMEOUT_SECS"), "{err}");
        assert!(parse_timeout(Some("0")).is_err());
    }

    #[test]
    fn bundled_sheets_file_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/sheets.json");
        let sheets = load_sheets(&path).unwrap();
        assert_eq!(sheets[0].name, "SUMMARY");
        assert!(sheets.iter().any(|s| s.funnel_ids.is_empty() && !s.events.is_empty()));
    }
}
