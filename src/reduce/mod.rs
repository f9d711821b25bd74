//! Latitude-weighted global mean of a gridded monthly variable, coarsened to
//! yearly values.
//!
//! The reduction, per store:
//!
//! 1. Read the descriptive metadata into a one-row table
//! 2. Resolve the latitude coordinate (`lat` before `latitude`)
//! 3. Weight each cell by `cos(lat)`, normalized so the weights average to 1
//! 4. Average `value * weight` over every non-time dimension, month by month
//! 5. Average consecutive twelve-month windows into yearly values
//! 6. Label each year from the mean timestamp of its window
//!
//! The variable is read one window at a time, so a store never has to fit in
//! memory.

pub mod coarsen;
pub mod weights;

use log::debug;
use thiserror::Error;

use crate::cftime::{CalendarDateTime, TimeEncoding, TimeError};
use crate::readers::{DatasetHeader, GriddedSource, ReadError, TIME_DIM};
use crate::table::{Table, TableError, Value, combine, selstr};

pub use coarsen::{MONTHS_PER_YEAR, check_calendar_alignment, coarsen_mean};
pub use weights::{
    LATITUDE_NAMES, broadcast_weights, latitude_name, latitude_weights, weighted_mean,
};

pub const AREA_GLOBAL: &str = "global";

/// Columns of the metadata record, in output order.
pub const METADATA_COLUMNS: [&str; 5] = ["variable", "experiment", "units", "ensemble", "model"];

#[derive(Error, Debug)]
pub enum ReduceError {
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error("missing attribute '{0}'")]
    MissingAttribute(String),
    #[error("couldn't find a latitude coordinate (tried {:?})", LATITUDE_NAMES)]
    MissingLatitude,
    #[error("couldn't find a 1-d '{}' coordinate", TIME_DIM)]
    MissingTime,
    #[error("latitude weights have no finite values")]
    NoValidWeights,
    #[error("latitude weights do not fit the grid: {0}")]
    WeightDims(String),
    #[error("time decoding failed: {0}")]
    Time(#[from] TimeError),
    #[error("year {window} is not a calendar year at {date}: {reason}")]
    CalendarMisaligned {
        window: usize,
        date: CalendarDateTime,
        reason: String,
    },
    #[error(transparent)]
    Table(#[from] TableError),
}

#[derive(Debug, Clone, Copy)]
pub struct ReduceOptions {
    /// Reject series whose twelve-record windows are not calendar years.
    pub strict_calendar: bool,
}

impl Default for ReduceOptions {
    fn default() -> Self {
        Self {
            strict_calendar: true,
        }
    }
}

/// One-row table of the identifying metadata of a dataset.
pub fn metadata_table(header: &DatasetHeader) -> Result<Table, ReduceError> {
    let global = |name: &str| {
        header
            .attribute(name)
            .map(Value::from)
            .ok_or_else(|| ReduceError::MissingAttribute(name.to_string()))
    };

    let mut table = Table::new(METADATA_COLUMNS);
    table.push_row(vec![
        global("variable_id")?,
        global("experiment_id")?,
        header
            .variable_attribute("units")
            .map(Value::from)
            .ok_or_else(|| ReduceError::MissingAttribute(format!("{}:units", header.variable)))?,
        global("variant_label")?,
        global("source_id")?,
    ])?;

    Ok(table)
}

pub fn global_mean(
    source: &dyn GriddedSource,
    options: &ReduceOptions,
) -> Result<Table, ReduceError> {
    let header = source.header();
    let meta = metadata_table(header)?;

    let lat_name = latitude_name(header)?;
    let lat = header
        .coordinate(lat_name)
        .ok_or(ReduceError::MissingLatitude)?;
    let weights = broadcast_weights(
        &latitude_weights(&lat.values)?,
        &lat.dims,
        &header.dims[1..],
        &header.shape[1..],
    )?;

    let time = header
        .coordinate(TIME_DIM)
        .filter(|t| t.dims.len() == 1)
        .ok_or(ReduceError::MissingTime)?;
    let units = time
        .attr("units")
        .ok_or_else(|| ReduceError::MissingAttribute(format!("{}:units", TIME_DIM)))?;
    let encoding = TimeEncoding::parse(units, time.attr("calendar"))?;

    let years = header.time_len() / MONTHS_PER_YEAR;
    let used = years * MONTHS_PER_YEAR;
    let times: Vec<f64> = time.values.iter().take(used).copied().collect();

    if options.strict_calendar {
        let dates = times
            .iter()
            .map(|&t| encoding.decode(t))
            .collect::<Result<Vec<_>, _>>()?;
        check_calendar_alignment(&dates)?;
    }

    debug!("Reducing {} over {} years with latitude '{}'", header, years, lat_name);

    let weights = weights.view();
    let mut monthly = Vec::with_capacity(used);
    for year in 0..years {
        let slab = source.read_times(year * MONTHS_PER_YEAR..(year + 1) * MONTHS_PER_YEAR)?;
        monthly.extend(slab.outer_iter().map(|step| weighted_mean(&step, &weights)));
    }

    let values = coarsen_mean(&monthly, MONTHS_PER_YEAR);
    let year_times = coarsen_mean(&times, MONTHS_PER_YEAR);

    let mut series = Table::new(["year", "value"]);
    for (t, value) in year_times.into_iter().zip(values) {
        let stamp = Value::Text(encoding.decode(t)?.format_ymd());
        series.push_row(vec![selstr(&stamp, 0, 4)?.into(), value.into()])?;
    }

    Ok(combine(&meta, &series)?.with_constant("area", AREA_GLOBAL.into())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readers::{Coordinate, InMemoryDataset};
    use approx::assert_relative_eq;
    use ndarray::{Array1, ArrayD, IxDyn};

    const NLAT: usize = 6;
    const NLON: usize = 4;

    fn days_since_1850(months: usize) -> ArrayD<f64> {
        // Mid-month timestamps in a 365-day calendar
        let lengths = [31.0, 28.0, 31.0, 30.0, 31.0, 30.0, 31.0, 31.0, 30.0, 31.0, 30.0, 31.0];
        let mut start = 0.0;
        let mut out = Vec::with_capacity(months);
        for m in 0..months {
            let len = lengths[m % 12];
            out.push(start + len / 2.0);
            start += len;
        }
        Array1::from(out).into_dyn()
    }

    fn synthetic(
        months: usize,
        lat_name: &str,
        value: impl Fn(usize, usize) -> f64,
    ) -> InMemoryDataset {
        let lat = Array1::linspace(-75.0, 75.0, NLAT).into_dyn();
        let lon = Array1::linspace(0.0, 270.0, NLON).into_dyn();
        let data = ArrayD::from_shape_fn(IxDyn(&[months, NLAT, NLON]), |idx| value(idx[0], idx[1]));

        InMemoryDataset::new("tos", &["time", lat_name, "lon"], data)
            .unwrap()
            .with_coordinate(
                "time",
                Coordinate::new(vec!["time".into()], days_since_1850(months))
                    .with_attr("units", "days since 1850-01-01")
                    .with_attr("calendar", "noleap"),
            )
            .unwrap()
            .with_coordinate(lat_name, Coordinate::new(vec![lat_name.into()], lat))
            .unwrap()
            .with_coordinate("lon", Coordinate::new(vec!["lon".into()], lon))
            .unwrap()
            .with_attribute("variable_id", "tos")
            .with_attribute("experiment_id", "historical")
            .with_attribute("variant_label", "r1i1p1f1")
            .with_attribute("source_id", "GFDL-CM4")
            .with_variable_attribute("units", "degC")
    }

    #[test]
    fn test_uniform_field_gives_uniform_mean() {
        let ds = synthetic(24, "lat", |_, _| 1.0);
        let table = global_mean(&ds, &ReduceOptions::default()).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(
            table.columns(),
            &["variable", "experiment", "units", "ensemble", "model", "year", "value", "area"]
        );
        for row in table.rows() {
            assert_relative_eq!(row[6].as_number().unwrap(), 1.0, epsilon = 1e-12);
            assert_eq!(row[7], Value::from("global"));
            assert_eq!(row[0], Value::from("tos"));
            assert_eq!(row[2], Value::from("degC"));
            assert_eq!(row[3], Value::from("r1i1p1f1"));
        }
        assert_eq!(table.rows()[0][5], Value::from("1850"));
        assert_eq!(table.rows()[1][5], Value::from("1851"));
    }

    #[test]
    fn test_partial_year_dropped() {
        let ds = synthetic(25, "latitude", |_, _| 1.0);
        let table = global_mean(&ds, &ReduceOptions::default()).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_yearly_value_is_mean_of_months() {
        // Month t holds the value t everywhere
        let ds = synthetic(24, "lat", |t, _| t as f64);
        let table = global_mean(&ds, &ReduceOptions::default()).unwrap();

        let values: Vec<f64> = table
            .column("value")
            .unwrap()
            .iter()
            .map(|v| v.as_number().unwrap())
            .collect();
        assert_relative_eq!(values[0], 5.5, epsilon = 1e-9);
        assert_relative_eq!(values[1], 17.5, epsilon = 1e-9);
    }

    #[test]
    fn test_equator_weighted_more_than_high_latitudes() {
        // 1.0 at the two rows closest to the equator, 0.0 elsewhere
        let ds = synthetic(12, "lat", |_, j| if j == 2 || j == 3 { 1.0 } else { 0.0 });
        let table = global_mean(&ds, &ReduceOptions::default()).unwrap();
        let value = table.rows()[0][6].as_number().unwrap();

        // Unweighted this would be 2/6
        assert!(value > 2.0 / 6.0);
    }

    #[test]
    fn test_missing_latitude_is_an_error() {
        let ds = synthetic(12, "y", |_, _| 1.0);
        let err = global_mean(&ds, &ReduceOptions::default()).unwrap_err();
        assert!(matches!(err, ReduceError::MissingLatitude));
    }

    #[test]
    fn test_missing_metadata_is_an_error() {
        let data = ArrayD::zeros(IxDyn(&[12, 1, 1]));
        let ds = InMemoryDataset::new("tos", &["time", "lat", "lon"], data).unwrap();
        let err = global_mean(&ds, &ReduceOptions::default()).unwrap_err();
        assert!(matches!(err, ReduceError::MissingAttribute(a) if a == "variable_id"));
    }

    #[test]
    fn test_misaligned_series_fails_loudly() {
        let mut ds = synthetic(24, "lat", |_, _| 1.0);
        // Shift the time axis by six months
        let shifted: Vec<f64> = days_since_1850(30).iter().skip(6).copied().collect();
        ds = ds
            .with_coordinate(
                "time",
                Coordinate::new(vec!["time".into()], Array1::from(shifted).into_dyn())
                    .with_attr("units", "days since 1850-01-01")
                    .with_attr("calendar", "noleap"),
            )
            .unwrap();

        let err = global_mean(&ds, &ReduceOptions::default()).unwrap_err();
        assert!(matches!(err, ReduceError::CalendarMisaligned { window: 0, .. }));

        // Without the check the windows are labelled by their mean timestamp
        let lenient = ReduceOptions {
            strict_calendar: false,
        };
        let table = global_mean(&ds, &lenient).unwrap();
        // July 1850 to June 1851 averages out to the last day of 1850
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0][5], Value::from("1850"));
        assert_eq!(table.rows()[1][5], Value::from("1851"));
    }
}
