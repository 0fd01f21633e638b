use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("invalid report date {input:?}: {source}")]
    InvalidDate {
        input: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("invalid sheet configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid metric definition: {0}")]
    InvalidMetric(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("funnel {funnel} returned different step counts per window (1d={day1}, 7d={day7}, 30d={day30})")]
    InconsistentShape {
        funnel: String,
        day1: usize,
        day7: usize,
        day30: usize,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("sheet {sheet}: destination failed: {message}")]
    Sink { sheet: String, message: String },

    /// Wraps a failure with the sheet, metric and window it came from.
    #[error("sheet {sheet}, {metric}, {window}: {source}")]
    Metric {
        sheet: String,
        metric: String,
        window: String,
        #[source]
        source: Box<ReportError>,
    },
}

impl ReportError {
    pub fn in_metric(
        self,
        sheet: &str,
        metric: impl Into<String>,
        window: impl Into<String>,
    ) -> Self {
        ReportError::Metric {
            sheet: sheet.to_string(),
            metric: metric.into(),
            window: window.into(),
            source: Box::new(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReportError>;
