pub mod calendar;
pub mod config;
pub mod error;
pub mod estimator;
pub mod formats;
pub mod import;
pub mod issues;
pub mod matcher;
pub mod merge;
pub mod model;
pub mod output;
pub mod schedule;
pub mod store;
pub mod time;
pub mod validate;
