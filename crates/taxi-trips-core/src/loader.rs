//! Loading a cached partition file into trips.
//!
//! [`load_partition`] reads a Parquet partition and returns its trips in
//! pickup order:
//!
//! 1. Read the file into memory and project to the four served columns
//!    ([`TRIP_COLUMNS`]); every other column is skipped at decode time.
//! 2. Coerce types: timestamp columns of any unit become microsecond
//!    timestamps, numeric columns become `f64`.
//! 3. Keep only rows whose pickup lies in the partition's own month. The
//!    published files occasionally carry stray rows from neighbouring months
//!    (or years), and those must not leak into another month's pages.
//! 4. Drop rows with a null in any served column, then stable-sort by pickup.
//!
//! The month filter runs on Arrow arrays with scalar bounds, so no
//! full-length bound arrays are allocated.

use std::path::Path;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, RecordBatch, Scalar, TimestampMicrosecondArray,
};
use arrow::compute::kernels::{boolean as boolean_kernels, cmp as cmp_kernels};
use arrow::compute::{cast, filter};
use arrow::datatypes::{DataType, TimeUnit};
use arrow::error::ArrowError;
use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime};
use log::info;
use parquet::arrow::ProjectionMask;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::errors::ParquetError;
use snafu::prelude::*;

use crate::{
    partition::PartitionKey,
    storage::{self, StorageError},
    trip::Trip,
};

/// Pickup timestamp column.
pub const PICKUP_COLUMN: &str = "tpep_pickup_datetime";
/// Dropoff timestamp column.
pub const DROPOFF_COLUMN: &str = "tpep_dropoff_datetime";
/// Trip distance column.
pub const DISTANCE_COLUMN: &str = "trip_distance";
/// Fare amount column.
pub const FARE_COLUMN: &str = "fare_amount";

/// The columns a partition must provide, in output order.
pub const TRIP_COLUMNS: [&str; 4] = [PICKUP_COLUMN, DROPOFF_COLUMN, DISTANCE_COLUMN, FARE_COLUMN];

const MICROS_TS: DataType = DataType::Timestamp(TimeUnit::Microsecond, None);

/// Reasons a partition file could not be turned into trips.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LoadError {
    /// The file is absent or unreadable.
    #[snafu(display("Failed to read partition file: {source}"))]
    Read {
        /// Underlying storage error.
        source: StorageError,
    },

    /// The bytes are not a valid Parquet file.
    #[snafu(display("Parquet read error in {path}: {source}"))]
    ParquetRead {
        /// File being read.
        path: String,
        /// Underlying Parquet error.
        source: ParquetError,
    },

    /// Decoding, casting or filtering a batch failed.
    #[snafu(display("Arrow error while loading {path}: {source}"))]
    Arrow {
        /// File being read.
        path: String,
        /// Underlying Arrow error.
        source: ArrowError,
    },

    /// A required column is absent from the file schema.
    #[snafu(display("Missing column {column} in {path}"))]
    MissingColumn {
        /// File being read.
        path: String,
        /// Name of the missing column.
        column: String,
    },

    /// A required column exists but cannot be coerced to the served type.
    #[snafu(display("Unsupported type {datatype:?} for column {column} in {path}"))]
    UnsupportedColumnType {
        /// File being read.
        path: String,
        /// Column name.
        column: String,
        /// Arrow type found in the file.
        datatype: DataType,
    },

    /// The partition's month cannot be represented as a date range.
    #[snafu(display("Partition {key} has no representable month range"))]
    UnrepresentableMonth {
        /// Offending key.
        key: PartitionKey,
    },
}

/// Load, filter and sort the trips of partition `key` stored at `path`.
pub async fn load_partition(key: PartitionKey, path: &Path) -> Result<Vec<Trip>, LoadError> {
    let bytes = storage::read_all_bytes(path).await.context(ReadSnafu)?;
    let trips = decode_partition(key, path, Bytes::from(bytes))?;
    info!(
        "Loaded {} trips for partition {key} from {}",
        trips.len(),
        path.display()
    );
    Ok(trips)
}

fn decode_partition(
    key: PartitionKey,
    path: &Path,
    bytes: Bytes,
) -> Result<Vec<Trip>, LoadError> {
    let path_str = path.display().to_string();

    let (month_start, month_end) = key
        .month_bounds()
        .context(UnrepresentableMonthSnafu { key })?;
    let start_bound = month_start.and_utc().timestamp_micros();
    let end_bound = month_end.and_utc().timestamp_micros();

    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes).context(ParquetReadSnafu {
        path: path_str.clone(),
    })?;

    // Validate column presence and types up front so a bad file fails even
    // when it has zero rows.
    let schema = builder.schema().clone();
    let mut roots = Vec::with_capacity(TRIP_COLUMNS.len());
    for column in TRIP_COLUMNS {
        let idx = schema.index_of(column).map_err(|_| LoadError::MissingColumn {
            path: path_str.clone(),
            column: column.to_string(),
        })?;
        check_coercible(&path_str, column, schema.field(idx).data_type())?;
        roots.push(idx);
    }

    let mask = ProjectionMask::roots(builder.parquet_schema(), roots);
    let reader = builder
        .with_projection(mask)
        .build()
        .context(ParquetReadSnafu {
            path: path_str.clone(),
        })?;

    let mut trips = Vec::new();
    for batch_res in reader {
        let batch = batch_res.context(ArrowSnafu {
            path: path_str.clone(),
        })?;
        collect_month_rows(&path_str, &batch, start_bound, end_bound, &mut trips)?;
    }

    // Stable: equal pickups keep file order.
    trips.sort_by_key(|t| t.tpep_pickup_datetime);
    Ok(trips)
}

fn check_coercible(path: &str, column: &str, datatype: &DataType) -> Result<(), LoadError> {
    let ok = match column {
        PICKUP_COLUMN | DROPOFF_COLUMN => matches!(datatype, DataType::Timestamp(_, _)),
        _ => datatype.is_numeric(),
    };
    ensure!(
        ok,
        UnsupportedColumnTypeSnafu {
            path,
            column,
            datatype: datatype.clone(),
        }
    );
    Ok(())
}

fn column_as(
    path: &str,
    batch: &RecordBatch,
    column: &str,
    target: &DataType,
) -> Result<ArrayRef, LoadError> {
    let array = batch
        .column_by_name(column)
        .context(MissingColumnSnafu { path, column })?;
    cast(array.as_ref(), target).context(ArrowSnafu { path })
}

/// `start <= pickup < end`, with null pickups mapped to "drop".
fn month_mask(
    path: &str,
    pickup: &TimestampMicrosecondArray,
    start_bound: i64,
    end_bound: i64,
) -> Result<BooleanArray, LoadError> {
    let start = Scalar::new(TimestampMicrosecondArray::from(vec![start_bound]));
    let end = Scalar::new(TimestampMicrosecondArray::from(vec![end_bound]));

    let ge = cmp_kernels::gt_eq(pickup, &start).context(ArrowSnafu { path })?;
    let lt = cmp_kernels::lt(pickup, &end).context(ArrowSnafu { path })?;
    boolean_kernels::and(&ge, &lt).context(ArrowSnafu { path })
}

fn downcast<'a, T: 'static>(
    path: &str,
    column: &str,
    array: &'a ArrayRef,
) -> Result<&'a T, LoadError> {
    array
        .as_any()
        .downcast_ref::<T>()
        .with_context(|| UnsupportedColumnTypeSnafu {
            path,
            column,
            datatype: array.data_type().clone(),
        })
}

fn micros_to_naive(value: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_micros(value).map(|dt| dt.naive_utc())
}

fn collect_month_rows(
    path: &str,
    batch: &RecordBatch,
    start_bound: i64,
    end_bound: i64,
    out: &mut Vec<Trip>,
) -> Result<(), LoadError> {
    let pickup = column_as(path, batch, PICKUP_COLUMN, &MICROS_TS)?;
    let pickup_arr = downcast::<TimestampMicrosecondArray>(path, PICKUP_COLUMN, &pickup)?;

    let mask = month_mask(path, pickup_arr, start_bound, end_bound)?;
    if mask.true_count() == 0 {
        return Ok(());
    }

    let keep = |array: &ArrayRef| filter(array.as_ref(), &mask).context(ArrowSnafu { path });

    let pickup = keep(&pickup)?;
    let dropoff = keep(&column_as(path, batch, DROPOFF_COLUMN, &MICROS_TS)?)?;
    let distance = keep(&column_as(path, batch, DISTANCE_COLUMN, &DataType::Float64)?)?;
    let fare = keep(&column_as(path, batch, FARE_COLUMN, &DataType::Float64)?)?;

    let pickup = downcast::<TimestampMicrosecondArray>(path, PICKUP_COLUMN, &pickup)?;
    let dropoff = downcast::<TimestampMicrosecondArray>(path, DROPOFF_COLUMN, &dropoff)?;
    let distance = downcast::<Float64Array>(path, DISTANCE_COLUMN, &distance)?;
    let fare = downcast::<Float64Array>(path, FARE_COLUMN, &fare)?;

    out.reserve(pickup.len());
    for i in 0..pickup.len() {
        if pickup.is_null(i) || dropoff.is_null(i) || distance.is_null(i) || fare.is_null(i) {
            continue;
        }
        let (Some(pickup_ts), Some(dropoff_ts)) =
            (micros_to_naive(pickup.value(i)), micros_to_naive(dropoff.value(i)))
        else {
            continue;
        };
        out.push(Trip {
            tpep_pickup_datetime: pickup_ts,
            tpep_dropoff_datetime: dropoff_ts,
            trip_distance: distance.value(i),
            fare_amount: fare.value(i),
        });
    }
    Ok(())
}
