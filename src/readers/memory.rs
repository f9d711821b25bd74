use std::ops::Range;

use ndarray::{ArrayD, Axis, Slice};

use super::{Coordinate, DatasetHeader, GriddedSource, ReadError};

/// A fully materialized dataset, used for synthetic input and in tests.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    header: DatasetHeader,
    data: ArrayD<f64>,
}

impl InMemoryDataset {
    pub fn new(variable: &str, dims: &[&str], data: ArrayD<f64>) -> Result<Self, ReadError> {
        let header = DatasetHeader::new(
            variable,
            dims.iter().map(|d| d.to_string()).collect(),
            data.shape().to_vec(),
        )?;
        Ok(Self { header, data })
    }

    pub fn with_coordinate(mut self, name: &str, coord: Coordinate) -> Result<Self, ReadError> {
        self.header.insert_coordinate(name, coord)?;
        Ok(self)
    }

    pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.header.attrs.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_variable_attribute(mut self, key: &str, value: &str) -> Self {
        self.header
            .variable_attrs
            .insert(key.to_string(), value.to_string());
        self
    }
}

impl GriddedSource for InMemoryDataset {
    fn header(&self) -> &DatasetHeader {
        &self.header
    }

    fn read_times(&self, range: Range<usize>) -> Result<ArrayD<f64>, ReadError> {
        let len = self.header.time_len();
        if range.start > range.end || range.end > len {
            return Err(ReadError::TimeRange {
                start: range.start,
                end: range.end,
                len,
            });
        }
        Ok(self
            .data
            .slice_axis(Axis(0), Slice::from(range))
            .to_owned())
    }
}
