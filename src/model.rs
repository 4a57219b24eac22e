//! GTFS-Ride table schemas and the typed rows written to them.
//!
//! Column names are the GTFS-Ride wire contract and must not be renamed.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

/// One column of a table schema.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnType,
    pub required: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Column {
    const fn new(name: &'static str, kind: ColumnType) -> Self {
        Self {
            name,
            kind,
            required: false,
            min: None,
            max: None,
        }
    }

    const fn integer(name: &'static str) -> Self {
        Self::new(name, ColumnType::Integer)
    }

    const fn text(name: &'static str) -> Self {
        Self::new(name, ColumnType::Text)
    }

    const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    const fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    const fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }
}

/// A table schema: the file it is written to and its columns in order.
#[derive(Debug)]
pub struct Model {
    pub filename_base: &'static str,
    pub schema: &'static [Column],
}

impl Model {
    pub fn column(&self, name: &str) -> Option<&'static Column> {
        self.schema.iter().find(|column| column.name == name)
    }
}

pub static BOARD_ALIGHT: Model = Model {
    filename_base: "board_alight",
    schema: &[
        Column::text("trip_id").required(),
        Column::text("stop_id").required(),
        Column::integer("stop_sequence").required().min(0.0),
        Column::integer("record_use").required().min(0.0).max(1.0),
        Column::integer("schedule_relationship").min(0.0).max(7.0),
        Column::integer("boardings").min(0.0),
        Column::integer("alightings").min(0.0),
        Column::integer("current_load").min(0.0),
        Column::integer("load_count").min(0.0),
        Column::integer("load_type").min(0.0).max(1.0),
        Column::integer("rack_down").min(0.0).max(1.0),
        Column::integer("bike_boardings").min(0.0),
        Column::integer("bike_alightings").min(0.0),
        Column::integer("ramp_used").min(0.0).max(1.0),
        Column::integer("ramp_boardings").min(0.0),
        Column::integer("ramp_alightings").min(0.0),
        Column::integer("service_date").required(),
        Column::text("service_arrival_time"),
        Column::integer("service_arrival_timestamp"),
        Column::text("service_departure_time"),
        Column::integer("service_departure_timestamp"),
        Column::integer("source").min(0.0).max(4.0),
    ],
};

pub static RIDE_FEED_INFO: Model = Model {
    filename_base: "ride_feed_info",
    schema: &[
        Column::integer("ride_files").required().min(0.0).max(6.0),
        Column::integer("ride_start_date"),
        Column::integer("ride_end_date"),
        Column::integer("gtfs_feed_date"),
        Column::text("default_currency_type"),
        Column::text("ride_feed_version"),
    ],
};

/// One normalized board_alight row. Field order is the file's column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardAlight {
    pub trip_id: String,
    pub stop_id: String,
    pub stop_sequence: i64,
    pub record_use: i64,
    pub schedule_relationship: Option<i64>,
    pub boardings: Option<i64>,
    pub alightings: Option<i64>,
    pub current_load: Option<i64>,
    pub load_count: Option<i64>,
    pub load_type: Option<i64>,
    pub rack_down: Option<i64>,
    pub bike_boardings: Option<i64>,
    pub bike_alightings: Option<i64>,
    pub ramp_used: Option<i64>,
    pub ramp_boardings: Option<i64>,
    pub ramp_alightings: Option<i64>,
    pub service_date: i64,
    pub service_arrival_time: Option<String>,
    pub service_arrival_timestamp: Option<i64>,
    pub service_departure_time: Option<String>,
    pub service_departure_timestamp: Option<i64>,
    pub source: Option<i64>,
}

/// Fields identifying one logical observation; rows sharing it are duplicates.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MergeKey {
    pub service_date: i64,
    pub trip_id: String,
    pub stop_id: String,
    pub stop_sequence: i64,
    pub record_use: i64,
    pub schedule_relationship: Option<i64>,
    pub load_type: Option<i64>,
    pub source: Option<i64>,
}

impl BoardAlight {
    pub fn merge_key(&self) -> MergeKey {
        MergeKey {
            service_date: self.service_date,
            trip_id: self.trip_id.clone(),
            stop_id: self.stop_id.clone(),
            stop_sequence: self.stop_sequence,
            record_use: self.record_use,
            schedule_relationship: self.schedule_relationship,
            load_type: self.load_type,
            source: self.source,
        }
    }
}

/// The single ride_feed_info row describing what was produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RideFeedInfo {
    pub ride_files: i64,
    pub ride_start_date: Option<i64>,
    pub ride_end_date: Option<i64>,
    pub gtfs_feed_date: Option<i64>,
    pub default_currency_type: Option<String>,
    pub ride_feed_version: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_of<T: Serialize + Default>() -> Vec<String> {
        let mut writer = csv::Writer::from_writer(vec![]);
        writer.serialize(T::default()).unwrap();
        let data = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        data.lines()
            .next()
            .unwrap()
            .split(',')
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_board_alight_columns_match_schema() {
        let schema: Vec<&str> = BOARD_ALIGHT.schema.iter().map(|c| c.name).collect();
        assert_eq!(header_of::<BoardAlight>(), schema);
    }

    #[test]
    fn test_ride_feed_info_columns_match_schema() {
        let schema: Vec<&str> = RIDE_FEED_INFO.schema.iter().map(|c| c.name).collect();
        assert_eq!(header_of::<RideFeedInfo>(), schema);
    }

    #[test]
    fn test_column_lookup() {
        let column = BOARD_ALIGHT.column("record_use").unwrap();
        assert!(column.required);
        assert_eq!(column.max, Some(1.0));
        assert!(BOARD_ALIGHT.column("unknown").is_none());
    }

    #[test]
    fn test_merge_key_ignores_counts() {
        let a = BoardAlight {
            trip_id: "T".into(),
            stop_id: "S".into(),
            boardings: Some(5),
            ..Default::default()
        };
        let b = BoardAlight {
            boardings: Some(7),
            ..a.clone()
        };
        assert_eq!(a.merge_key(), b.merge_key());
    }
}
