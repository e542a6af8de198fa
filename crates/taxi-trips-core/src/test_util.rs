use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use arrow::array::{
    ArrayRef, Float64Array, Int32Array, Int64Array, RecordBatch, StringArray,
    TimestampMicrosecondArray, TimestampMillisecondArray, TimestampNanosecondArray,
    TimestampSecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;

use crate::fetch::{FetchError, FetchOutcome, PartitionFetcher};

pub(crate) type TestResult = Result<(), Box<dyn std::error::Error>>;

/// 2023-01-24T12:03:20Z
pub(crate) const JAN_24_PLUS_100S: i64 = 1_674_561_800_000;
/// 2023-01-24T12:05:00Z
pub(crate) const JAN_24_PLUS_200S: i64 = 1_674_561_900_000;
/// 2023-01-24T12:06:40Z
pub(crate) const JAN_24_PLUS_300S: i64 = 1_674_562_000_000;
/// 2022-12-31T23:59:59Z
pub(crate) const DEC_31_2022_LATE: i64 = 1_672_531_199_000;
/// 2023-02-01T00:00:00Z
pub(crate) const FEB_01_2023_START: i64 = 1_675_209_600_000;

#[derive(Clone, Debug)]
pub(crate) struct TripRow {
    pub(crate) pickup_ms: Option<i64>,
    pub(crate) dropoff_ms: Option<i64>,
    pub(crate) distance: Option<f64>,
    pub(crate) fare: Option<f64>,
}

impl TripRow {
    /// A ten-minute, two-mile, ten-dollar ride picked up at `pickup_ms`.
    pub(crate) fn at(pickup_ms: i64) -> Self {
        Self {
            pickup_ms: Some(pickup_ms),
            dropoff_ms: Some(pickup_ms + 600_000),
            distance: Some(2.0),
            fare: Some(10.0),
        }
    }
}

fn ts_array(unit: TimeUnit, values: impl Iterator<Item = Option<i64>>) -> ArrayRef {
    match unit {
        TimeUnit::Second => Arc::new(TimestampSecondArray::from_iter(
            values.map(|v| v.map(|ms| ms / 1_000)),
        )),
        TimeUnit::Millisecond => Arc::new(TimestampMillisecondArray::from_iter(values)),
        TimeUnit::Microsecond => Arc::new(TimestampMicrosecondArray::from_iter(
            values.map(|v| v.map(|ms| ms * 1_000)),
        )),
        TimeUnit::Nanosecond => Arc::new(TimestampNanosecondArray::from_iter(
            values.map(|v| v.map(|ms| ms * 1_000_000)),
        )),
    }
}

fn measure_array(int_measures: bool, values: impl Iterator<Item = Option<f64>>) -> ArrayRef {
    if int_measures {
        Arc::new(Int64Array::from_iter(values.map(|v| v.map(|f| f as i64))))
    } else {
        Arc::new(Float64Array::from_iter(values))
    }
}

fn write_batch(path: &Path, batch: &RecordBatch) -> TestResult {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, encode_batch(batch)?)?;
    Ok(())
}

fn encode_batch(batch: &RecordBatch) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut buf = Vec::new();
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;
    Ok(buf)
}

/// Encode rows with the published column layout: extra columns around the
/// four served ones, `unit` timestamps, and optionally integer measures.
pub(crate) fn encode_trips(
    unit: TimeUnit,
    int_measures: bool,
    rows: &[TripRow],
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let measure_type = if int_measures {
        DataType::Int64
    } else {
        DataType::Float64
    };
    let schema = Schema::new(vec![
        Field::new("VendorID", DataType::Int32, true),
        Field::new("tpep_pickup_datetime", DataType::Timestamp(unit, None), true),
        Field::new("tpep_dropoff_datetime", DataType::Timestamp(unit, None), true),
        Field::new("passenger_count", DataType::Float64, true),
        Field::new("trip_distance", measure_type.clone(), true),
        Field::new("fare_amount", measure_type, true),
    ]);

    let vendor: ArrayRef = Arc::new(Int32Array::from_iter_values(rows.iter().map(|_| 2)));
    let passengers: ArrayRef = Arc::new(Float64Array::from_iter_values(rows.iter().map(|_| 1.0)));

    let batch = RecordBatch::try_new(
        Arc::new(schema),
        vec![
            vendor,
            ts_array(unit, rows.iter().map(|r| r.pickup_ms)),
            ts_array(unit, rows.iter().map(|r| r.dropoff_ms)),
            passengers,
            measure_array(int_measures, rows.iter().map(|r| r.distance)),
            measure_array(int_measures, rows.iter().map(|r| r.fare)),
        ],
    )?;
    encode_batch(&batch)
}

pub(crate) fn write_trips_parquet(path: &Path, rows: &[TripRow]) -> TestResult {
    write_trips_parquet_with(path, TimeUnit::Microsecond, false, rows)
}

pub(crate) fn write_trips_parquet_with(
    path: &Path,
    unit: TimeUnit,
    int_measures: bool,
    rows: &[TripRow],
) -> TestResult {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, encode_trips(unit, int_measures, rows)?)?;
    Ok(())
}

pub(crate) fn write_parquet_without_fare(path: &Path) -> TestResult {
    let schema = Schema::new(vec![
        Field::new(
            "tpep_pickup_datetime",
            DataType::Timestamp(TimeUnit::Microsecond, None),
            false,
        ),
        Field::new(
            "tpep_dropoff_datetime",
            DataType::Timestamp(TimeUnit::Microsecond, None),
            false,
        ),
        Field::new("trip_distance", DataType::Float64, false),
    ]);
    let batch = RecordBatch::try_new(
        Arc::new(schema),
        vec![
            ts_array(TimeUnit::Microsecond, [Some(JAN_24_PLUS_100S)].into_iter()),
            ts_array(TimeUnit::Microsecond, [Some(JAN_24_PLUS_200S)].into_iter()),
            Arc::new(Float64Array::from(vec![1.0])),
        ],
    )?;
    write_batch(path, &batch)
}

pub(crate) fn write_parquet_with_string_pickup(path: &Path) -> TestResult {
    let schema = Schema::new(vec![
        Field::new("tpep_pickup_datetime", DataType::Utf8, false),
        Field::new(
            "tpep_dropoff_datetime",
            DataType::Timestamp(TimeUnit::Microsecond, None),
            false,
        ),
        Field::new("trip_distance", DataType::Float64, false),
        Field::new("fare_amount", DataType::Float64, false),
    ]);
    let batch = RecordBatch::try_new(
        Arc::new(schema),
        vec![
            Arc::new(StringArray::from(vec!["2023-01-24 12:03:20"])),
            ts_array(TimeUnit::Microsecond, [Some(JAN_24_PLUS_200S)].into_iter()),
            Arc::new(Float64Array::from(vec![1.0])),
            Arc::new(Float64Array::from(vec![7.5])),
        ],
    )?;
    write_batch(path, &batch)
}

/// In-memory [`PartitionFetcher`] that counts requests.
///
/// Unknown URLs answer 403, which is what the public bucket returns for
/// months that are not published.
#[derive(Default)]
pub(crate) struct FakeFetcher {
    bodies: HashMap<String, Bytes>,
    delay: Option<Duration>,
    fail: bool,
    calls: AtomicUsize,
}

impl FakeFetcher {
    pub(crate) fn with_body(mut self, url: &str, body: impl Into<Bytes>) -> Self {
        self.bodies.insert(url.to_string(), body.into());
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PartitionFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchOutcome, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail {
            // A URL without a host fails inside reqwest before any I/O.
            let source = match reqwest::Client::new().get("http://").send().await {
                Err(e) => e,
                Ok(_) => unreachable!("request without a host cannot succeed"),
            };
            return Err(FetchError::Request {
                url: url.to_string(),
                source,
            });
        }

        Ok(match self.bodies.get(url) {
            Some(body) => FetchOutcome::Body(body.clone()),
            None => FetchOutcome::Missing { status: 403 },
        })
    }
}
