//! The APC import pipeline.
//!
//! Streams a vendor CSV, detects its format once from the header, resolves
//! each line through the format's adapter, validates the resulting rows and
//! appends them to the store in bounded batches. Lines that cannot be
//! resolved become Issues; schema violations and store failures abort.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::time::Instant;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::error::ImportError;
use crate::formats::{ApcFormat, RawRecord, detect_format};
use crate::issues::{Issue, IssueSink};
use crate::merge::{MergeOutcome, merge_duplicates};
use crate::model::{BOARD_ALIGHT, BoardAlight, RIDE_FEED_INFO, RideFeedInfo};
use crate::schedule::ScheduleQuery;
use crate::store::{BoardAlightStore, RowFilter};
use crate::validate::{Draft, into_row};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Rows per insert: the store's bound-parameter budget over the column count.
pub fn default_batch_size() -> usize {
    (800 / BOARD_ALIGHT.schema.len()).max(1)
}

/// The collaborators an import run reads from and writes to.
#[derive(Clone, Copy)]
pub struct ImportContext<'a> {
    pub schedule: &'a dyn ScheduleQuery,
    pub store: &'a dyn BoardAlightStore,
    pub issues: &'a dyn IssueSink,
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Skips detection when set.
    pub format: Option<ApcFormat>,
    pub batch_size: usize,
    /// Overrides the format's own merge flag when set.
    pub merge_duplicates: Option<bool>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            format: None,
            batch_size: default_batch_size(),
            merge_duplicates: None,
        }
    }
}

/// What one import run did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    pub source: String,
    pub format: Option<ApcFormat>,
    /// Raw data lines read, header excluded.
    pub lines: u64,
    pub rows_imported: usize,
    pub rows_after_merge: usize,
    pub issues: usize,
    pub merged_groups: usize,
    pub ride_feed_info: Option<RideFeedInfo>,
    pub elapsed_seconds: f64,
}

/// Bounded accumulator in front of the store. Rows are handed to the store
/// and the buffer cleared in one step.
struct BatchBuffer {
    rows: Vec<BoardAlight>,
    capacity: usize,
    first_line: Option<u64>,
    last_line: u64,
}

impl BatchBuffer {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            rows: Vec::with_capacity(capacity),
            capacity,
            first_line: None,
            last_line: 0,
        }
    }

    /// Adds a row; returns true once the buffer is full.
    fn push(&mut self, row: BoardAlight, line: u64) -> bool {
        self.first_line.get_or_insert(line);
        self.last_line = line;
        self.rows.push(row);
        self.rows.len() >= self.capacity
    }

    async fn flush(&mut self, store: &dyn BoardAlightStore) -> Result<usize, ImportError> {
        if self.rows.is_empty() {
            return Ok(0);
        }
        let rows = std::mem::replace(&mut self.rows, Vec::with_capacity(self.capacity));
        let count = rows.len();
        let first_line = self.first_line.take().unwrap_or(self.last_line);

        if let Err(err) = store.insert_batch(rows).await {
            warn!(
                "Check APC data for invalid data between lines {} and {}",
                first_line, self.last_line
            );
            return Err(err.into());
        }
        debug!(rows = count, first_line, last_line = self.last_line, "Flushed batch");
        Ok(count)
    }
}

/// Wraps `reader` so a leading UTF-8 byte order mark is skipped.
fn strip_bom<R: Read>(reader: R) -> std::io::Result<BufReader<R>> {
    let mut reader = BufReader::new(reader);
    if reader.fill_buf()?.starts_with(UTF8_BOM) {
        reader.consume(UTF8_BOM.len());
    }
    Ok(reader)
}

/// Imports one APC file.
///
/// A missing file is recorded as an Issue and aborts the run.
#[tracing::instrument(skip(ctx, options), fields(path = %path.display()))]
pub async fn import_file(
    path: &Path,
    ctx: ImportContext<'_>,
    options: &ImportOptions,
) -> Result<ImportSummary, ImportError> {
    if !path.exists() {
        let err = ImportError::MissingFile(path.display().to_string());
        ctx.issues.record_issue(Issue::new(err.to_string()));
        error!("{err}");
        return Err(err);
    }

    let file = File::open(path)?;
    import_reader(file, &path.display().to_string(), ctx, options).await
}

/// Imports APC data from any reader. `source` names it in logs and the summary.
pub async fn import_reader<R: Read>(
    reader: R,
    source: &str,
    ctx: ImportContext<'_>,
    options: &ImportOptions,
) -> Result<ImportSummary, ImportError> {
    let started = Instant::now();
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(strip_bom(reader)?);

    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    let format = match options.format {
        Some(format) => format,
        None => detect_format(&headers).inspect_err(|err| error!("{err}"))?,
    };
    let adapter = format.adapter();
    info!(%format, source, "Importing APC data");

    let mut summary = ImportSummary {
        source: source.to_string(),
        format: Some(format),
        ..Default::default()
    };
    let mut buffer = BatchBuffer::new(options.batch_size);
    let mut record = csv::StringRecord::new();

    while rdr.read_record(&mut record)? {
        summary.lines += 1;
        let line = record
            .position()
            .map(|position| position.line())
            .unwrap_or(summary.lines + 1);

        let fields: HashMap<String, String> = headers
            .iter()
            .cloned()
            .zip(record.iter().map(str::to_string))
            .collect();
        let raw = RawRecord::new(line, fields);

        let drafts: Vec<Draft> = match adapter.adapt(&raw, ctx.schedule) {
            Ok(drafts) => drafts,
            Err(failure) => {
                ctx.issues.record_issue(Issue::from_failure(failure, line));
                summary.issues += 1;
                continue;
            }
        };

        for draft in drafts {
            let row: BoardAlight = into_row(draft, &BOARD_ALIGHT, line).inspect_err(|err| error!("{err}"))?;
            if buffer.push(row, line) {
                summary.rows_imported += buffer.flush(ctx.store).await?;
            }
        }
    }
    summary.rows_imported += buffer.flush(ctx.store).await?;
    summary.rows_after_merge = summary.rows_imported;

    if options.merge_duplicates.unwrap_or(adapter.merges_duplicates()) {
        let MergeOutcome {
            groups_merged,
            rows_removed,
        } = merge_duplicates(ctx.store).await?;
        summary.merged_groups = groups_merged;
        summary.rows_after_merge = summary.rows_imported.saturating_sub(rows_removed);
    }

    summary.ride_feed_info = Some(ride_feed_info(ctx.store).await?);
    summary.elapsed_seconds = started.elapsed().as_secs_f64();

    info!(
        lines = summary.lines,
        rows = summary.rows_after_merge,
        issues = summary.issues,
        elapsed = summary.elapsed_seconds,
        "APC import complete"
    );
    Ok(summary)
}

/// Describes the stored rows: board_alight only, spanning their service dates.
pub async fn ride_feed_info(store: &dyn BoardAlightStore) -> Result<RideFeedInfo, ImportError> {
    let rows = store.query(&RowFilter::all(), &[]).await?;
    let start = rows.iter().map(|row| row.service_date).min();
    let end = rows.iter().map(|row| row.service_date).max();

    let draft = json!({
        "ride_files": 0,
        "ride_start_date": start,
        "ride_end_date": end,
    });
    let draft = match draft {
        serde_json::Value::Object(map) => map,
        _ => Draft::new(),
    };
    Ok(into_row(draft, &RIDE_FEED_INFO, 1)?)
}
