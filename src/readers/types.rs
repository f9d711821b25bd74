use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

use ndarray::ArrayD;
use thiserror::Error;

pub const TIME_DIM: &str = "time";

/// A lazily readable gridded variable with its coordinates and attributes.
pub trait GriddedSource {
    fn header(&self) -> &DatasetHeader;

    /// Reads the data variable for the time steps in `range`. The returned
    /// array keeps every dimension of the variable, time first. Fill values
    /// are already replaced by NaN.
    fn read_times(&self, range: Range<usize>) -> Result<ArrayD<f64>, ReadError>;
}

pub trait DataReader {
    fn read_data(&self) -> Result<Box<dyn GriddedSource>, ReadError>;
}

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("Zarr: {0}")]
    Zarr(String),
    #[error("NetCDF: {0}")]
    NetCDF(String),
    #[error("GDAL: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
    #[error("variable '{0}' not found")]
    MissingVariable(String),
    #[error("variable '{variable}' has dimensions {dims:?}, expected 'time' first")]
    TimeNotLeading { variable: String, dims: Vec<String> },
    #[error("shape mismatch: {0}")]
    Shape(String),
    #[error("time steps {start}..{end} out of bounds for {len} steps")]
    TimeRange { start: usize, end: usize, len: usize },
    #[error(transparent)]
    Location(#[from] FileError),
}

#[derive(Error, Debug)]
pub enum FileError {
    #[error("cannot infer a store type for '{0}'")]
    UnknownFileType(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    NetCDF,
    Zarr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Coordinate {
    pub dims: Vec<String>,
    pub values: ArrayD<f64>,
    pub attrs: BTreeMap<String, String>,
}

impl Coordinate {
    pub fn new(dims: Vec<String>, values: ArrayD<f64>) -> Self {
        Self {
            dims,
            values,
            attrs: BTreeMap::new(),
        }
    }

    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.attrs.insert(key.to_string(), value.to_string());
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }
}

/// Everything known about a dataset without touching its data values.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetHeader {
    pub variable: String,
    pub dims: Vec<String>,
    pub shape: Vec<usize>,
    pub coords: BTreeMap<String, Coordinate>,
    pub attrs: BTreeMap<String, String>,
    pub variable_attrs: BTreeMap<String, String>,
}

impl DatasetHeader {
    pub fn new(variable: &str, dims: Vec<String>, shape: Vec<usize>) -> Result<Self, ReadError> {
        if dims.len() != shape.len() {
            return Err(ReadError::Shape(format!(
                "{} dimension names for a {}-d variable",
                dims.len(),
                shape.len()
            )));
        }
        if dims.first().map(String::as_str) != Some(TIME_DIM) {
            return Err(ReadError::TimeNotLeading {
                variable: variable.to_string(),
                dims,
            });
        }

        Ok(Self {
            variable: variable.to_string(),
            dims,
            shape,
            coords: BTreeMap::new(),
            attrs: BTreeMap::new(),
            variable_attrs: BTreeMap::new(),
        })
    }

    pub fn time_len(&self) -> usize {
        self.shape[0]
    }

    pub fn coordinate(&self, name: &str) -> Option<&Coordinate> {
        self.coords.get(name)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn variable_attribute(&self, name: &str) -> Option<&str> {
        self.variable_attrs.get(name).map(String::as_str)
    }

    pub fn size_of(&self, dim: &str) -> Option<usize> {
        self.dims
            .iter()
            .position(|d| d == dim)
            .map(|idx| self.shape[idx])
    }

    /// Registers a coordinate after checking its dims against the variable.
    pub fn insert_coordinate(&mut self, name: &str, coord: Coordinate) -> Result<(), ReadError> {
        if coord.dims.len() != coord.values.ndim() {
            return Err(ReadError::Shape(format!(
                "coordinate '{}' has {} dimension names for a {}-d array",
                name,
                coord.dims.len(),
                coord.values.ndim()
            )));
        }
        for (dim, &len) in coord.dims.iter().zip(coord.values.shape()) {
            match self.size_of(dim) {
                Some(expected) if expected == len => {}
                Some(expected) => {
                    return Err(ReadError::Shape(format!(
                        "coordinate '{}' has {} values along '{}', variable has {}",
                        name, len, dim, expected
                    )));
                }
                None => {
                    return Err(ReadError::Shape(format!(
                        "coordinate '{}' uses dimension '{}' unknown to '{}'",
                        name, dim, self.variable
                    )));
                }
            }
        }
        self.coords.insert(name.to_string(), coord);
        Ok(())
    }
}

impl fmt::Display for DatasetHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self
            .dims
            .iter()
            .zip(&self.shape)
            .map(|(d, n)| format!("{}={}", d, n))
            .collect();
        write!(
            f,
            "{}({}) coords=[{}]",
            self.variable,
            dims.join(", "),
            self.coords.keys().cloned().collect::<Vec<_>>().join(", ")
        )
    }
}
