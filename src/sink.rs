use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::ReportRow;

/// Sheet name whose file would collide with the CSV sheet index.
pub const INDEX_SHEET_NAME: &str = "_sheets";
const SHEET_INDEX: &str = "_sheets.csv";

pub fn is_reserved_sheet_name(name: &str) -> bool {
    name.eq_ignore_ascii_case(INDEX_SHEET_NAME)
}

/// Append-only destination for finished rows, one table per sheet.
#[async_trait]
pub trait RowSink: Send {
    type Table: Send + Sync;

    /// Returns the sheet's table, creating it when absent.
    async fn ensure_table(&mut self, name: &str) -> anyhow::Result<Self::Table>;

    async fn append_row(&mut self, table: &Self::Table, row: &ReportRow) -> anyhow::Result<()>;
}

/// Writes each sheet to `<dir>/<sheet>.csv`.
///
/// `_sheets.csv` in the same directory lists the sheets, newest first.
pub struct CsvSink {
    dir: PathBuf,
}

pub struct CsvTable {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn register_sheet(&self, name: &str) -> anyhow::Result<()> {
        let index_path = self.dir.join(SHEET_INDEX);
        let mut names = vec![name.to_string()];

        if index_path.exists() {
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(false)
                .from_path(&index_path)?;
            for record in reader.records() {
                let record = record?;
                if let Some(existing) = record.get(0) {
                    if existing != name {
                        names.push(existing.to_string());
                    }
                }
            }
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&index_path)?;
        for sheet in &names {
            writer.write_record([sheet])?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[async_trait]
impl RowSink for CsvSink {
    type Table = CsvTable;

    async fn ensure_table(&mut self, name: &str) -> anyhow::Result<CsvTable> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            bail!("sheet name {name:?} cannot be used as a file name");
        }
        if is_reserved_sheet_name(name) {
            bail!("sheet name {name:?} is reserved for the sheet index");
        }

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.dir.join(format!("{name}.csv"));

        if !path.exists() {
            fs::File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            self.register_sheet(name)?;
        }

        Ok(CsvTable { path })
    }

    async fn append_row(&mut self, table: &CsvTable, row: &ReportRow) -> anyhow::Result<()> {
        append_record(&table.path, &row.to_record())
    }
}

fn append_record(path: &Path, record: &[String]) -> anyhow::Result<()> {
    let file = OpenOptions::new()
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_writer(file);
    writer.write_record(record)?;
    writer.flush()?;
    Ok(())
}

/// Postgres destination; see `migrations/` for the schema.
pub struct PgSink {
    pool: PgPool,
    run_id: Uuid,
}

pub struct PgTable {
    name: String,
}

impl PgSink {
    pub fn new(pool: PgPool, run_id: Uuid) -> Self {
        Self { pool, run_id }
    }
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[async_trait]
impl RowSink for PgSink {
    type Table = PgTable;

    async fn ensure_table(&mut self, name: &str) -> anyhow::Result<PgTable> {
        let mut tx = self.pool.begin().await?;

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM funnel_report.report_sheets WHERE name = $1)",
        )
        .bind(name)
        .fetch_one(&mut *tx)
        .await?;

        if !exists {
            sqlx::query("UPDATE funnel_report.report_sheets SET position = position + 1")
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                r#"
                INSERT INTO funnel_report.report_sheets (name, position)
                VALUES ($1, 0)
                ON CONFLICT (name) DO NOTHING
                "#,
            )
            .bind(name)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(PgTable {
            name: name.to_string(),
        })
    }

    async fn append_row(&mut self, table: &PgTable, row: &ReportRow) -> anyhow::Result<()> {
        let report_date = row
            .report_date()
            .context("row does not start with its report date")?;

        sqlx::query(
            r#"
            INSERT INTO funnel_report.report_rows
            (id, sheet_name, run_id, report_date, cells)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&table.name)
        .bind(self.run_id)
        .bind(report_date)
        .bind(Json(row))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
