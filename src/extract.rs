use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{ReportError, Result};
use crate::query::QueryKind;

#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    Conversions(Vec<f64>),
    Count(u64),
}

/// Reads the value a query of `kind` answers with.
pub fn extract(kind: QueryKind, response: &Value) -> Result<Extracted> {
    match kind {
        QueryKind::Funnel => extract_funnel_conversions(response).map(Extracted::Conversions),
        QueryKind::Event => extract_event_count(response).map(Extracted::Count),
    }
}

/// Conversion ratio of every funnel step after the first.
///
/// Step data is nested under interval keys in `data`. Only the first
/// interval in provider key order is read; the first step is dropped since
/// it is always 1.0.
pub fn extract_funnel_conversions(response: &Value) -> Result<Vec<f64>> {
    let intervals = object_at(response, "data")?;
    let (interval, bucket) = first_entry(intervals, "funnel interval")?;

    let steps = bucket
        .get("steps")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed(format!("interval {interval} has no steps array")))?;

    if steps.is_empty() {
        return Err(malformed(format!("interval {interval} has an empty steps array")));
    }

    steps
        .iter()
        .enumerate()
        .skip(1)
        .map(|(index, step)| {
            step.get("step_conv_ratio")
                .and_then(Value::as_f64)
                .ok_or_else(|| malformed(format!("step {index} has no numeric step_conv_ratio")))
        })
        .collect()
}

/// Unique count from a segmentation response: `data.values.<event>.<series>`.
pub fn extract_event_count(response: &Value) -> Result<u64> {
    let data = object_at(response, "data")?;
    let values = data
        .get("values")
        .and_then(Value::as_object)
        .ok_or_else(|| malformed("data has no values map"))?;

    let (event, series) = first_entry(values, "event")?;
    let series = series
        .as_object()
        .ok_or_else(|| malformed(format!("event {event} does not map to series")))?;
    let (series_key, count) = first_entry(series, "series")?;

    count
        .as_u64()
        .ok_or_else(|| malformed(format!("series {series_key} of {event} is not a count: {count}")))
}

fn object_at<'a>(value: &'a Value, key: &str) -> Result<&'a Map<String, Value>> {
    value
        .get(key)
        .and_then(Value::as_object)
        .ok_or_else(|| malformed(format!("missing {key} object")))
}

fn first_entry<'a>(map: &'a Map<String, Value>, what: &str) -> Result<(&'a String, &'a Value)> {
    if map.len() > 1 {
        warn!(
            kind = what,
            keys = map.len(),
            "response has more than one key, using the first"
        );
    }
    map.iter()
        .next()
        .ok_or_else(|| malformed(format!("no {what} key present")))
}

fn malformed(message: impl Into<String>) -> ReportError {
    ReportError::MalformedResponse(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extraction_follows_query_kind() {
        let funnel = json!({"data": {"2024-01-01": {"steps": [
            {"step_conv_ratio": 1.0}, {"step_conv_ratio": 0.5}
        ]}}});
        let event = json!({"data": {"values": {"Sign Up": {"2024-01-01": 9}}}});

        assert_eq!(
            extract(QueryKind::Funnel, &funnel).unwrap(),
            Extracted::Conversions(vec![0.5])
        );
        assert_eq!(extract(QueryKind::Event, &event).unwrap(), Extracted::Count(9));
        assert!(matches!(
            extract(QueryKind::Event, &funnel),
            Err(ReportError::MalformedResponse(_))
        ));
    }

    #[test]
    fn first_step_is_dropped() {
        let response = json!({
            "meta": {"dates": ["2024-01-01"]},
            "data": {
                "2024-01-01": {
                    "steps": [
                        {"count": 1000, "step_conv_ratio": 1.0},
                        {"count": 420, "step_conv_ratio": 0.42},
                        {"count": 100, "step_conv_ratio": 0.10}
                    ]
                }
            }
        });
        assert_eq!(extract_funnel_conversions(&response).unwrap(), vec![0.42, 0.10]);
    }

    #[test]
    fn only_first_interval_is_used() {
        let response = json!({
            "data": {
                "2024-01-07": {"steps": [{"step_conv_ratio": 1.0}, {"step_conv_ratio": 0.3}]},
                "2024-01-01": {"steps": [{"step_conv_ratio": 1.0}, {"step_conv_ratio": 0.9}]}
            }
        });
        assert_eq!(extract_funnel_conversions(&response).unwrap(), vec![0.3]);
    }

    #[test]
    fn empty_steps_are_malformed() {
        let response = json!({"data": {"2024-01-01": {"steps": []}}});
        assert!(matches!(
            extract_funnel_conversions(&response),
            Err(ReportError::MalformedResponse(_))
        ));
    }

    #[test]
    fn missing_ratio_is_malformed() {
        let response = json!({
            "data": {"2024-01-01": {"steps": [{"step_conv_ratio": 1.0}, {"count": 3}]}}
        });
        assert!(matches!(
            extract_funnel_conversions(&response),
            Err(ReportError::MalformedResponse(_))
        ));
    }

    #[test]
    fn funnel_without_intervals_is_malformed() {
        assert!(extract_funnel_conversions(&json!({"data": {}})).is_err());
        assert!(extract_funnel_conversions(&json!({"error": "bad funnel"})).is_err());
    }

    #[test]
    fn event_count_reads_single_series() {
        let response = json!({
            "data": {
                "series": ["2024-01-01"],
                "values": {"Sign Up": {"Sign Up": 1563}}
            },
            "legend_size": 1
        });
        assert_eq!(extract_event_count(&response).unwrap(), 1563);
    }

    #[test]
    fn missing_values_map_is_malformed() {
        let response = json!({"data": {"series": []}});
        assert!(matches!(
            extract_event_count(&response),
            Err(ReportError::MalformedResponse(_))
        ));
    }

    #[test]
    fn non_numeric_count_is_malformed() {
        let response = json!({"data": {"values": {"Sign Up": {"2024-01-01": "n/a"}}}});
        assert!(extract_event_count(&response).is_err());
    }
}
