use crate::error::{ReportError, Result};
use crate::models::{DateWindow, FunnelId};
use crate::window::format_date;

pub const FUNNELS_ENDPOINT: &str = "funnels/";
pub const SEGMENTATION_ENDPOINT: &str = "segmentation/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Funnel,
    Event,
}

/// Fully specified export API request. Building one never touches the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub kind: QueryKind,
    pub endpoint: &'static str,
    pub params: Vec<(&'static str, String)>,
}

impl QueryRequest {
    #[cfg(test)]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }
}

pub fn build_funnel_query(funnel_id: &FunnelId, window: &DateWindow) -> Result<QueryRequest> {
    if funnel_id.as_str().trim().is_empty() {
        return Err(ReportError::InvalidMetric("funnel id is empty".to_string()));
    }

    Ok(QueryRequest {
        kind: QueryKind::Funnel,
        endpoint: FUNNELS_ENDPOINT,
        params: vec![
            ("funnel_id", funnel_id.to_string()),
            ("from_date", format_date(window.from)),
            ("to_date", format_date(window.to)),
            ("interval", window.span.days().to_string()),
        ],
    })
}

pub fn build_event_query(event: &str, window: &DateWindow) -> Result<QueryRequest> {
    if event.trim().is_empty() {
        return Err(ReportError::InvalidMetric("event name is empty".to_string()));
    }

    Ok(QueryRequest {
        kind: QueryKind::Event,
        endpoint: SEGMENTATION_ENDPOINT,
        params: vec![
            ("event", event.to_string()),
            ("from_date", format_date(window.from)),
            ("to_date", format_date(window.to)),
            ("type", "unique".to_string()),
        ],
    })
}
