pub mod memory;
pub mod multidim;
pub mod nc;
pub mod types;
pub mod utils;
pub mod zarr;

pub use memory::InMemoryDataset;
pub use nc::NcReader;
pub use types::{
    Coordinate, DataReader, DatasetHeader, FileError, FileType, GriddedSource, ReadError, TIME_DIM,
};
pub use utils::{DEFAULT_GCS_ENDPOINT, gdal_path, reader_from_filetype};
pub use zarr::ZarrReader;

/// Picks a reader for `file_name` from its scheme or extension. `variable`
/// is used when the store does not name its own variable.
pub fn create_reader(
    file_name: String,
    variable: &str,
    gcs_endpoint: &str,
) -> Result<Box<dyn DataReader>, FileError> {
    let file_type = reader_from_filetype(&file_name)?;
    let gdal_path = gdal_path(&file_name, file_type, gcs_endpoint);
    let variable = variable.to_string();

    match file_type {
        FileType::NetCDF => Ok(Box::new(NcReader {
            file_name,
            gdal_path,
            variable,
        })),
        FileType::Zarr => Ok(Box::new(ZarrReader {
            file_name,
            gdal_path,
            variable,
        })),
    }
}
