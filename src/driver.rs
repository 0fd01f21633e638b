use chrono::NaiveDate;
use tracing::{error, info};
use uuid::Uuid;

use crate::client::Fetch;
use crate::error::{ReportError, Result};
use crate::extract::{extract, Extracted};
use crate::models::{DateWindow, FunnelId, FunnelWindows, ReportRow, ReportWindows, SheetDefinition};
use crate::query::{build_event_query, build_funnel_query, QueryRequest};
use crate::row::assemble_row;
use crate::sink::RowSink;
use crate::window::report_windows;

/// What happens to the remaining sheets after one fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    #[default]
    HaltOnFirst,
    IsolateSheets,
}

#[derive(Debug)]
pub struct SheetFailure {
    pub sheet: String,
    pub error: ReportError,
}

#[derive(Debug)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub report_date: NaiveDate,
    pub appended: Vec<String>,
    pub failures: Vec<SheetFailure>,
}

pub struct ReportDriver<F, S> {
    sheets: Vec<SheetDefinition>,
    policy: FailurePolicy,
    fetcher: F,
    sink: S,
    run_id: Uuid,
}

impl<F: Fetch, S: RowSink> ReportDriver<F, S> {
    pub fn new(
        sheets: Vec<SheetDefinition>,
        policy: FailurePolicy,
        fetcher: F,
        sink: S,
        run_id: Uuid,
    ) -> Self {
        Self {
            sheets,
            policy,
            fetcher,
            sink,
            run_id,
        }
    }

    /// Builds and appends one row per sheet, in configured order.
    pub async fn run(&mut self, report_date: NaiveDate) -> Result<RunSummary> {
        let Self {
            sheets,
            policy,
            fetcher,
            sink,
            run_id,
        } = self;
        let windows = report_windows(report_date);
        info!(
            run_id = %run_id,
            %report_date,
            sheets = sheets.len(),
            "starting report run"
        );

        let mut summary = RunSummary {
            run_id: *run_id,
            report_date,
            appended: Vec::new(),
            failures: Vec::new(),
        };

        for sheet in sheets.iter() {
            let outcome = match build_sheet_row(&*fetcher, sheet, report_date, &windows).await {
                Ok(row) => write_row(sink, sheet, &row).await,
                Err(err) => Err(err),
            };

            match outcome {
                Ok(()) => summary.appended.push(sheet.name.clone()),
                Err(err) if *policy == FailurePolicy::IsolateSheets => {
                    error!(run_id = %run_id, sheet = %sheet.name, error = %err, "sheet failed, continuing");
                    summary.failures.push(SheetFailure {
                        sheet: sheet.name.clone(),
                        error: err,
                    });
                }
                Err(err) => return Err(err),
            }
        }

        info!(
            run_id = %run_id,
            appended = summary.appended.len(),
            failed = summary.failures.len(),
            "report run finished"
        );
        Ok(summary)
    }
}

/// Queries every metric of a sheet and assembles its row. Nothing is
/// written here, so a failure leaves no partial row behind.
pub async fn build_sheet_row<F: Fetch + ?Sized>(
    fetcher: &F,
    sheet: &SheetDefinition,
    report_date: NaiveDate,
    windows: &ReportWindows,
) -> Result<ReportRow> {
    let mut funnels = Vec::with_capacity(sheet.funnel_ids.len());
    for funnel in &sheet.funnel_ids {
        let mut per_window = Vec::with_capacity(3);
        for window in windows.iter() {
            let conversions = query_funnel(fetcher, funnel, window)
                .await
                .map_err(|e| e.in_metric(&sheet.name, format!("funnel {funnel}"), window.label()))?;
            per_window.push(conversions);
        }

        let mut per_window = per_window.into_iter();
        funnels.push(FunnelWindows {
            funnel: funnel.clone(),
            day1: per_window.next().unwrap_or_default(),
            day7: per_window.next().unwrap_or_default(),
            day30: per_window.next().unwrap_or_default(),
        });
    }

    let mut event_counts = Vec::with_capacity(sheet.events.len());
    for event in &sheet.events {
        let count = query_event(fetcher, event, &windows.day1)
            .await
            .map_err(|e| e.in_metric(&sheet.name, format!("event {event:?}"), windows.day1.label()))?;
        event_counts.push(count);
    }

    assemble_row(report_date, &funnels, &event_counts).map_err(|e| ReportError::Metric {
        sheet: sheet.name.clone(),
        metric: "row".to_string(),
        window: "all windows".to_string(),
        source: Box::new(e),
    })
}

async fn run_query<F: Fetch + ?Sized>(fetcher: &F, request: &QueryRequest) -> Result<Extracted> {
    let response = fetcher.fetch(request).await?;
    extract(request.kind, &response)
}

async fn query_funnel<F: Fetch + ?Sized>(
    fetcher: &F,
    funnel: &FunnelId,
    window: &DateWindow,
) -> Result<Vec<f64>> {
    let request = build_funnel_query(funnel, window)?;
    match run_query(fetcher, &request).await? {
        Extracted::Conversions(conversions) => Ok(conversions),
        Extracted::Count(_) => Err(ReportError::MalformedResponse(
            "funnel query answered with an event count".to_string(),
        )),
    }
}

async fn query_event<F: Fetch + ?Sized>(fetcher: &F, event: &str, window: &DateWindow) -> Result<u64> {
    let request = build_event_query(event, window)?;
    match run_query(fetcher, &request).await? {
        Extracted::Count(count) => Ok(count),
        Extracted::Conversions(_) => Err(ReportError::MalformedResponse(
            "event query answered with funnel conversions".to_string(),
        )),
    }
}

async fn write_row<S: RowSink>(sink: &mut S, sheet: &SheetDefinition, row: &ReportRow) -> Result<()> {
    let sink_error = |err: anyhow::Error| ReportError::Sink {
        sheet: sheet.name.clone(),
        message: format!("{err:#}"),
    };

    let table = sink.ensure_table(&sheet.name).await.map_err(sink_error)?;
    sink.append_row(&table, row).await.map_err(sink_error)?;
    info!(sheet = %sheet.name, columns = row.len(), "row appended");
    Ok(())
}
