//! Writing GTFS-Ride files and the run report.
//!
//! `board_alight.txt` and `ride_feed_info.txt` are written with a header row,
//! optionally gzipped. The issue list goes to `issues.csv` and the run report
//! to `summary.json`.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use tracing::{debug, info};

use crate::import::ImportSummary;
use crate::issues::{Issue, IssueGroup, summarize};
use crate::model::{BOARD_ALIGHT, BoardAlight, Model, RIDE_FEED_INFO, RideFeedInfo};

/// The import summary plus the grouped issues, as written to `summary.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub agency_key: String,
    #[serde(flatten)]
    pub import: ImportSummary,
    pub service_date_range: Option<(i64, i64)>,
    pub issue_groups: Vec<IssueGroup>,
}

impl RunReport {
    pub fn new(agency_key: &str, import: ImportSummary, issues: &[Issue]) -> Self {
        let service_date_range = import
            .ride_feed_info
            .as_ref()
            .and_then(|info| info.ride_start_date.zip(info.ride_end_date));
        Self {
            agency_key: agency_key.to_string(),
            import,
            service_date_range,
            issue_groups: summarize(issues),
        }
    }
}

/// Logs the run report as pretty-printed JSON.
pub fn print_json(report: &RunReport) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

fn model_path(dir: &Path, model: &Model, gzip: bool) -> PathBuf {
    let name = if gzip {
        format!("{}.txt.gz", model.filename_base)
    } else {
        format!("{}.txt", model.filename_base)
    };
    dir.join(name)
}

/// Serializes `rows` as CSV with a header and hands back the flushed sink.
fn serialize_rows<W: Write, T: Serialize>(sink: W, rows: &[T]) -> Result<W> {
    let mut writer = csv::WriterBuilder::new().has_headers(true).from_writer(sink);
    for row in rows {
        writer.serialize(row)?;
    }
    Ok(writer.into_inner().map_err(|err| err.into_error())?)
}

/// Gzips the CSV and writes the trailer, surfacing any error on the way.
fn serialize_rows_gzip<W: Write, T: Serialize>(sink: W, rows: &[T]) -> Result<W> {
    let encoder = serialize_rows(GzEncoder::new(sink, Compression::default()), rows)?;
    Ok(encoder.finish()?)
}

fn write_csv<T: Serialize>(path: &Path, rows: &[T], gzip: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let file = if gzip {
        serialize_rows_gzip(file, rows)?
    } else {
        serialize_rows(file, rows)?
    };
    file.sync_all()?;
    debug!(path = %path.display(), rows = rows.len(), "Wrote CSV");
    Ok(())
}

/// Writes `board_alight.txt` (or `.txt.gz`) into `dir` and returns its path.
pub fn write_board_alight(dir: &Path, rows: &[BoardAlight], gzip: bool) -> Result<PathBuf> {
    let path = model_path(dir, &BOARD_ALIGHT, gzip);
    write_csv(&path, rows, gzip)?;
    Ok(path)
}

/// Writes the single-row `ride_feed_info.txt` (or `.txt.gz`) into `dir`.
pub fn write_ride_feed_info(dir: &Path, info: &RideFeedInfo, gzip: bool) -> Result<PathBuf> {
    let path = model_path(dir, &RIDE_FEED_INFO, gzip);
    write_csv(&path, std::slice::from_ref(info), gzip)?;
    Ok(path)
}

pub fn write_issues(dir: &Path, issues: &[Issue]) -> Result<PathBuf> {
    let path = dir.join("issues.csv");
    write_csv(&path, issues, false)?;
    Ok(path)
}

pub fn write_summary(dir: &Path, report: &RunReport) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join("summary.json");
    fs::write(&path, serde_json::to_vec_pretty(report)?)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::env;
    use std::io::Read;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn row(trip_id: &str, boardings: Option<i64>) -> BoardAlight {
        BoardAlight {
            trip_id: trip_id.into(),
            stop_id: "00101".into(),
            stop_sequence: 1,
            boardings,
            service_date: 20240305,
            service_departure_time: Some("08:00:00".into()),
            service_departure_timestamp: Some(28800),
            source: Some(1),
            ..Default::default()
        }
    }

    #[test]
    fn test_write_board_alight_header_and_rows() {
        let dir = temp_dir("gtfs_ride_test_board_alight");
        let path = write_board_alight(&dir, &[row("T800", Some(3)), row("T900", None)], false).unwrap();

        assert!(path.ends_with("board_alight.txt"));
        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("trip_id,stop_id,stop_sequence,record_use"));
        assert!(lines[1].starts_with("T800,00101,1,0,,3,"));
        assert!(lines[2].starts_with("T900,00101,1,0,,,"));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_write_board_alight_gzip() {
        let dir = temp_dir("gtfs_ride_test_gzip");
        let path = write_board_alight(&dir, &[row("T800", Some(3))], true).unwrap();
        assert!(path.ends_with("board_alight.txt.gz"));

        let mut content = String::new();
        GzDecoder::new(File::open(&path).unwrap())
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("T800"));

        fs::remove_dir_all(&dir).unwrap();
    }

    /// Accepts `budget` bytes, then fails every write and flush.
    struct ShortSink {
        budget: usize,
        written: Vec<u8>,
    }

    impl Write for ShortSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.written.len() + buf.len() > self.budget {
                return Err(std::io::Error::other("no space left"));
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if self.written.len() >= self.budget {
                return Err(std::io::Error::other("no space left"));
            }
            Ok(())
        }
    }

    #[test]
    fn test_serialize_rows_reports_write_failure() {
        let sink = ShortSink { budget: 0, written: Vec::new() };
        assert!(serialize_rows(sink, &[row("T800", Some(3))]).is_err());
    }

    #[test]
    fn test_serialize_rows_gzip_reports_trailer_failure() {
        let rows = [row("T800", Some(3))];
        let complete = serialize_rows_gzip(Vec::new(), &rows).unwrap();

        // Room for everything except the last byte of the trailer.
        let sink = ShortSink {
            budget: complete.len() - 1,
            written: Vec::new(),
        };
        assert!(serialize_rows_gzip(sink, &rows).is_err());

        let mut content = String::new();
        GzDecoder::new(complete.as_slice())
            .read_to_string(&mut content)
            .unwrap();
        assert!(content.contains("T800"));
    }

    #[test]
    fn test_write_ride_feed_info_single_row() {
        let dir = temp_dir("gtfs_ride_test_feed_info");
        let info = RideFeedInfo {
            ride_files: 0,
            ride_start_date: Some(20240304),
            ride_end_date: Some(20240308),
            ..Default::default()
        };
        let path = write_ride_feed_info(&dir, &info, false).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("ride_files,ride_start_date,ride_end_date"));
        assert!(lines[1].starts_with("0,20240304,20240308"));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_write_issues_and_summary() {
        let dir = temp_dir("gtfs_ride_test_report");
        let issues = vec![
            Issue::new("Invalid RouteStop `A` found").at_line(2),
            Issue::new("Invalid RouteStop `B` found").at_line(5),
        ];
        write_issues(&dir, &issues).unwrap();
        let csv = fs::read_to_string(dir.join("issues.csv")).unwrap();
        assert_eq!(csv.lines().count(), 3);
        assert!(csv.lines().next().unwrap().starts_with("message,line_number"));

        let summary = ImportSummary {
            lines: 4,
            rows_imported: 2,
            rows_after_merge: 2,
            issues: 2,
            ride_feed_info: Some(RideFeedInfo {
                ride_start_date: Some(20240305),
                ride_end_date: Some(20240306),
                ..Default::default()
            }),
            ..Default::default()
        };
        let report = RunReport::new("demo", summary, &issues);
        assert_eq!(report.service_date_range, Some((20240305, 20240306)));
        assert_eq!(report.issue_groups.len(), 1);
        assert_eq!(report.issue_groups[0].count, 2);

        let path = write_summary(&dir, &report).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(json["agency_key"], "demo");
        assert_eq!(json["rows_imported"], 2);
        assert_eq!(json["issue_groups"][0]["kind"], "Invalid RouteStop `*` found");
        print_json(&report).unwrap();

        fs::remove_dir_all(&dir).unwrap();
    }
}
