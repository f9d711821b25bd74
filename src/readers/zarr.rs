use log::debug;

use super::multidim::MultiDimSource;
use super::{DataReader, FileType, GriddedSource, ReadError};

pub struct ZarrReader {
    pub file_name: String,
    pub gdal_path: String,
    pub variable: String,
}

impl DataReader for ZarrReader {
    fn read_data(&self) -> Result<Box<dyn GriddedSource>, ReadError> {
        debug!("Reading {} as {}", self.file_name, self.gdal_path);
        let source = MultiDimSource::open(&self.gdal_path, FileType::Zarr, &self.variable)?;
        Ok(Box::new(source))
    }
}
