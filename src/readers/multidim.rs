//! Gridded data through GDAL's multidimensional API.
//!
//! Both Zarr stores and NetCDF files are opened this way. Only the header and
//! coordinate arrays are read on open; the data variable is read on demand,
//! one time range at a time.

use std::collections::BTreeMap;
use std::ops::Range;

use gdal::cpl::CslStringList;
use gdal::raster::{Group, MDArray};
use gdal::{Dataset, DatasetOptions, GdalOpenFlags};
use log::debug;
use ndarray::{ArrayD, IxDyn};

use super::{Coordinate, DatasetHeader, FileType, GriddedSource, ReadError};

/// Global attributes copied into the header.
const GLOBAL_ATTRIBUTES: [&str; 8] = [
    "variable_id",
    "experiment_id",
    "variant_label",
    "source_id",
    "table_id",
    "grid_label",
    "institution_id",
    "frequency",
];

/// Attributes copied from the data variable and from coordinates.
const VARIABLE_ATTRIBUTES: [&str; 4] = ["units", "long_name", "standard_name", "calendar"];

pub struct MultiDimSource {
    dataset: Dataset,
    header: DatasetHeader,
    fill_value: Option<f64>,
}

impl MultiDimSource {
    /// Opens `gdal_path` and loads the header of `variable`. When the store
    /// carries a `variable_id` global attribute it takes precedence.
    pub fn open(gdal_path: &str, file_type: FileType, variable: &str) -> Result<Self, ReadError> {
        let drivers: &[&str] = match file_type {
            FileType::Zarr => &["Zarr"],
            FileType::NetCDF => &["netCDF"],
        };
        let options = DatasetOptions {
            open_flags: GdalOpenFlags::GDAL_OF_MULTIDIM_RASTER,
            allowed_drivers: Some(drivers),
            open_options: None,
            sibling_files: None,
        };

        debug!("Opening {} with GDAL", gdal_path);
        let dataset = Dataset::open_ex(gdal_path, options).map_err(|e| match file_type {
            FileType::Zarr => ReadError::Zarr(format!("failed to open {}: {}", gdal_path, e)),
            FileType::NetCDF => ReadError::NetCDF(format!("failed to open {}: {}", gdal_path, e)),
        })?;

        // Group and MDArray borrow the dataset, so they must be gone before it moves.
        let (header, fill_value) = {
            let root = dataset.root_group()?;
            let attrs = read_group_attributes(&root);
            let variable = attrs
                .get("variable_id")
                .cloned()
                .unwrap_or_else(|| variable.to_string());

            let array_names = root.array_names(CslStringList::new());
            if !array_names.contains(&variable) {
                return Err(ReadError::MissingVariable(variable));
            }

            let data = root.open_md_array(&variable, CslStringList::new())?;
            let (dims, shape) = dimensions_of(&data)?;
            let fill_value = data.no_data_value_as_double();

            let mut header = DatasetHeader::new(&variable, dims, shape)?;
            header.attrs = attrs;
            header.variable_attrs = read_array_attributes(&data);

            for name in array_names.iter().filter(|n| **n != variable) {
                let array = root.open_md_array(name, CslStringList::new())?;
                let (coord_dims, coord_shape) = dimensions_of(&array)?;

                // Bounds and auxiliary arrays live on dimensions the variable lacks
                if coord_dims.is_empty() || !coord_dims.iter().all(|d| header.dims.contains(d)) {
                    continue;
                }

                let values =
                    array.read_as::<f64>(vec![0; coord_shape.len()], coord_shape.clone())?;
                let values = ArrayD::from_shape_vec(IxDyn(&coord_shape), values)
                    .map_err(|e| ReadError::Shape(format!("coordinate '{}': {}", name, e)))?;

                let mut coord = Coordinate::new(coord_dims, values);
                coord.attrs = read_array_attributes(&array);
                header.insert_coordinate(name, coord)?;
            }

            (header, fill_value)
        };

        debug!("Loaded header {}", header);

        Ok(Self {
            dataset,
            header,
            fill_value,
        })
    }
}

impl GriddedSource for MultiDimSource {
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

        let root = self.dataset.root_group()?;
        let array = root.open_md_array(&self.header.variable, CslStringList::new())?;

        let mut start = vec![0u64; self.header.shape.len()];
        start[0] = range.start as u64;
        let mut count = self.header.shape.clone();
        count[0] = range.len();

        let values = array.read_as::<f64>(start, count.clone())?;
        let mut values = ArrayD::from_shape_vec(IxDyn(&count), values)
            .map_err(|e| ReadError::Shape(e.to_string()))?;

        if let Some(fill) = self.fill_value {
            values.mapv_inplace(|v| if is_fill(v, fill) { f64::NAN } else { v });
        }

        Ok(values)
    }
}

// Fill values are often stored as float32 and widened, so compare relatively.
fn is_fill(value: f64, fill: f64) -> bool {
    value == fill || (fill != 0.0 && ((value - fill) / fill).abs() < 1e-6)
}

fn dimensions_of(array: &MDArray) -> Result<(Vec<String>, Vec<usize>), ReadError> {
    let dims = array.dimensions()?;
    Ok((
        dims.iter().map(|d| d.name()).collect(),
        dims.iter().map(|d| d.size()).collect(),
    ))
}

fn read_group_attributes(group: &Group) -> BTreeMap<String, String> {
    GLOBAL_ATTRIBUTES
        .iter()
        .filter_map(|key| {
            group
                .attribute(key)
                .ok()
                .map(|a| (key.to_string(), a.read_as_string()))
        })
        .collect()
}

fn read_array_attributes(array: &MDArray) -> BTreeMap<String, String> {
    let mut attrs: BTreeMap<String, String> = VARIABLE_ATTRIBUTES
        .iter()
        .filter_map(|key| {
            array
                .attribute(key)
                .ok()
                .map(|a| (key.to_string(), a.read_as_string()))
        })
        .collect();

    // The Zarr driver moves `units` onto the array itself
    let unit = array.unit();
    if !unit.is_empty() {
        attrs.entry("units".to_string()).or_insert(unit);
    }

    attrs
}
