use super::types::{FileError, FileType};
use std::path::Path;

pub const DEFAULT_GCS_ENDPOINT: &str = "https://storage.googleapis.com";

pub fn reader_from_filetype(location: &str) -> Result<FileType, FileError> {
    let trimmed = location.trim_end_matches('/');
    let path = Path::new(trimmed);

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("nc") => Ok(FileType::NetCDF),
        Some("zarr") => Ok(FileType::Zarr),
        // Cloud stores in the CMIP6 archive are version directories without an extension
        _ if location.starts_with("gs://")
            || location.starts_with("s3://")
            || location.starts_with("http://")
            || location.starts_with("https://") =>
        {
            Ok(FileType::Zarr)
        }
        _ if path.join(".zgroup").exists() || path.join(".zmetadata").exists() => {
            Ok(FileType::Zarr)
        }
        _ => Err(FileError::UnknownFileType(location.to_string())),
    }
}

/// Maps a storage location onto a path GDAL can open.
///
/// `gs://` buckets are read anonymously over HTTPS, `s3://` goes through
/// GDAL's S3 handler and local paths are used as they are.
pub fn gdal_path(location: &str, file_type: FileType, gcs_endpoint: &str) -> String {
    let trimmed = location.trim_end_matches('/');

    let vsi = if let Some(rest) = trimmed.strip_prefix("gs://") {
        format!("/vsicurl/{}/{}", gcs_endpoint.trim_end_matches('/'), rest)
    } else if let Some(rest) = trimmed.strip_prefix("s3://") {
        format!("/vsis3/{}", rest)
    } else if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        format!("/vsicurl/{}", trimmed)
    } else {
        trimmed.to_string()
    };

    match file_type {
        FileType::Zarr => format!("ZARR:\"{}\"", vsi),
        FileType::NetCDF => vsi,
    }
}
