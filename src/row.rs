use chrono::NaiveDate;

use crate::error::{ReportError, Result};
use crate::models::{CellValue, FunnelWindows, ReportRow};

/// Lays out one sheet row: the report date, then each funnel's steps as
/// `(1d, 7d, 30d)` triples grouped by step, then one 1-day count per event.
pub fn assemble_row(
    report_date: NaiveDate,
    funnels: &[FunnelWindows],
    event_counts: &[u64],
) -> Result<ReportRow> {
    let steps: usize = funnels.iter().map(|f| f.day1.len()).sum();
    let mut cells = Vec::with_capacity(1 + 3 * steps + event_counts.len());
    cells.push(CellValue::Date(report_date));

    for funnel in funnels {
        let step_count = funnel.day1.len();
        if funnel.day7.len() != step_count || funnel.day30.len() != step_count {
            return Err(ReportError::InconsistentShape {
                funnel: funnel.funnel.to_string(),
                day1: step_count,
                day7: funnel.day7.len(),
                day30: funnel.day30.len(),
            });
        }

        for step in 0..step_count {
            cells.push(CellValue::Ratio(funnel.day1[step]));
            cells.push(CellValue::Ratio(funnel.day7[step]));
            cells.push(CellValue::Ratio(funnel.day30[step]));
        }
    }

    cells.extend(event_counts.iter().copied().map(CellValue::Count));

    Ok(ReportRow { cells })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FunnelId;

    fn new_year() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn funnel(id: &str, day1: Vec<f64>, day7: Vec<f64>, day30: Vec<f64>) -> FunnelWindows {
        FunnelWindows {
            funnel: FunnelId::new(id),
            day1,
            day7,
            day30,
        }
    }

    #[test]
    fn steps_are_grouped_across_windows() {
        let funnels = vec![funnel("1", vec![0.1, 0.2], vec![0.3, 0.4], vec![0.5, 0.6])];
        let row = assemble_row(new_year(), &funnels, &[]).unwrap();

        assert_eq!(
            row.cells,
            vec![
                CellValue::Date(new_year()),
                CellValue::Ratio(0.1),
                CellValue::Ratio(0.3),
                CellValue::Ratio(0.5),
                CellValue::Ratio(0.2),
                CellValue::Ratio(0.4),
                CellValue::Ratio(0.6),
            ]
        );
        assert_eq!(row.to_record()[0], "2024-01-01");
    }

    #[test]
    fn column_count_follows_definition() {
        let funnels = vec![
            funnel("1", vec![0.1, 0.2], vec![0.3, 0.4], vec![0.5, 0.6]),
            funnel("2", vec![0.7], vec![0.8], vec![0.9]),
        ];
        let row = assemble_row(new_year(), &funnels, &[12, 40]).unwrap();

        assert_eq!(row.len(), 1 + 3 * 3 + 2);
        assert_eq!(row.cells[7], CellValue::Ratio(0.7));
        assert_eq!(row.cells[10], CellValue::Count(12));
        assert_eq!(row.cells[11], CellValue::Count(40));
    }

    #[test]
    fn events_only_sheet_has_two_cells() {
        let row = assemble_row(new_year(), &[], &[1563]).unwrap();
        assert_eq!(row.to_record(), vec!["2024-01-01", "1563"]);
    }

    #[test]
    fn mismatched_windows_are_rejected() {
        let funnels = vec![funnel("99", vec![0.1, 0.2], vec![0.3, 0.4, 0.5], vec![0.5, 0.6])];
        let err = assemble_row(new_year(), &funnels, &[]).unwrap_err();

        match err {
            ReportError::InconsistentShape { funnel, day1, day7, day30 } => {
                assert_eq!(funnel, "99");
                assert_eq!((day1, day7, day30), (2, 3, 2));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
