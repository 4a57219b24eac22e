//! Error types for the reconciliation pipeline.
//!
//! [`RecordError`] failures are recoverable: they drop one raw line and become
//! an [`Issue`](crate::issues::Issue). Everything in [`ImportError`] aborts the
//! run.

use thiserror::Error;

/// A recoverable failure while turning one raw APC line into board-alight rows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("Missing field `{0}`")]
    MissingField(String),
    #[error("Empty {0} found")]
    EmptyField(String),
    #[error("Invalid {field} `{value}` found")]
    InvalidStop { field: String, value: String },
    #[error("Invalid {field} `{value}` found")]
    InvalidRoute { field: String, value: String },
    #[error("Invalid {field} `{value}` found")]
    InvalidTrip { field: String, value: String },
    #[error("Invalid RunSegment `{0}` found")]
    InvalidRunSegment(String),
    #[error("Unable to parse {field} `{value}`")]
    InvalidDateTime { field: String, value: String },
    #[error("No service_ids found for {field} `{value}`")]
    NoServiceIds { field: String, value: String },
    #[error("No trips found for route `{route_id}` at stops `{stops}`")]
    NoTrips { route_id: String, stops: String },
    #[error("No trips found for route/stop/service combination")]
    NoCandidates,
    #[error("Multiple trips ({count}) match {description}")]
    AmbiguousTrip { count: usize, description: String },
    #[error("Unable to find trip for {0}")]
    TripNotFound(String),
    #[error("Count overflow adding {field}")]
    CountOverflow { field: String },
    #[error("No stoptime found for {0}")]
    NoStopTime(String),
    #[error("Trip `{trip_id}` has no {side} timepoint for stop_sequence `{stop_sequence}`")]
    MissingTimepoint {
        trip_id: String,
        stop_sequence: u32,
        side: &'static str,
    },
}

/// Named context attached to a failed record so missed ridership can be tallied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueContext {
    pub date: Option<String>,
    pub boardings: Option<i64>,
    pub alightings: Option<i64>,
}

/// A [`RecordError`] plus whatever context the adapter knew when it failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{error}")]
pub struct RecordFailure {
    pub error: RecordError,
    pub context: IssueContext,
}

/// A schema violation found by the validator. Aborts the run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Missing required value in {file}.txt for {field} on line {line}.")]
    MissingRequired {
        file: &'static str,
        field: &'static str,
        line: u64,
    },
    #[error("Invalid value in {file}.txt for {field} on line {line}: below minimum value of {min}.")]
    BelowMinimum {
        file: &'static str,
        field: &'static str,
        line: u64,
        min: f64,
    },
    #[error("Invalid value in {file}.txt for {field} on line {line}: above maximum value of {max}.")]
    AboveMaximum {
        file: &'static str,
        field: &'static str,
        line: u64,
        max: f64,
    },
    #[error("Invalid row shape in {file}.txt on line {line}: {message}")]
    Shape {
        file: &'static str,
        line: u64,
        message: String,
    },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Board-alight store write failed: {0}")]
    Write(String),
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("IO error reading {file}: {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error in {file}: {source}")]
    Csv {
        file: String,
        #[source]
        source: csv::Error,
    },
    #[error("Invalid date `{value}` in {file}")]
    InvalidDate { file: &'static str, value: String },
    #[error("Invalid exception_type `{value}` in calendar_dates.txt")]
    InvalidExceptionType { value: u8 },
    #[error("Stop `{stop_id}` has parent_station `{parent}` which {problem}")]
    InvalidParentStation {
        stop_id: String,
        parent: String,
        problem: &'static str,
    },
}

/// A failure that stops the whole import.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Unable to detect APC type from field names: {0}")]
    UndetectedFormat(String),
    #[error("Importing - {0} - No file found")]
    MissingFile(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
