//! Trip records as served by the API.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One taxi ride.
///
/// Timestamps are the wall-clock values stored in the partition file; the
/// published files carry no time zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    /// When the meter was engaged.
    pub tpep_pickup_datetime: NaiveDateTime,
    /// When the meter was disengaged.
    pub tpep_dropoff_datetime: NaiveDateTime,
    /// Trip distance in miles.
    pub trip_distance: f64,
    /// Time-and-distance fare in dollars.
    pub fare_amount: f64,
}

impl Trip {
    /// Pickup time as milliseconds since the epoch, used for page cursors.
    pub fn pickup_ms(&self) -> i64 {
        self.tpep_pickup_datetime.and_utc().timestamp_millis()
    }
}
