use std::fmt;
use std::path::{Path, PathBuf};

use log::{info, warn};
use thiserror::Error;

use crate::catalog::{Catalog, CatalogEntry, CatalogError};
use crate::config::RunConfig;
use crate::readers::{self, GriddedSource, ReadError};
use crate::reduce::{self, ReduceError};

/// Removed from output file names once slashes became underscores.
pub const STRIPPED_PREFIX: &str = "gs:__cmip6_";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("catalog unavailable: {0}")]
    Catalog(#[from] CatalogError),
    #[error("GDAL configuration failed: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
    #[error("cannot create output directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Opens the dataset behind a catalog entry.
pub trait StoreOpener {
    fn open(&self, entry: &CatalogEntry) -> Result<Box<dyn GriddedSource>, ReadError>;
}

/// Opens stores through GDAL, picking the driver from the location.
pub struct GdalOpener {
    variable: String,
    gcs_endpoint: String,
}

impl GdalOpener {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            variable: config.variable().to_string(),
            gcs_endpoint: config.gcs_endpoint().to_string(),
        }
    }
}

impl StoreOpener for GdalOpener {
    fn open(&self, entry: &CatalogEntry) -> Result<Box<dyn GriddedSource>, ReadError> {
        let variable = match entry.variable_id() {
            "" => self.variable.as_str(),
            v => v,
        };
        let reader =
            readers::create_reader(entry.location().to_string(), variable, &self.gcs_endpoint)?;
        reader.read_data()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FailureKind {
    Read,
    Metadata,
    Coordinate,
    Calendar,
    Table,
    Write,
}

impl From<&ReduceError> for FailureKind {
    fn from(err: &ReduceError) -> Self {
        match err {
            ReduceError::Read(_) => FailureKind::Read,
            ReduceError::MissingAttribute(_) => FailureKind::Metadata,
            ReduceError::MissingLatitude
            | ReduceError::MissingTime
            | ReduceError::NoValidWeights
            | ReduceError::WeightDims(_) => FailureKind::Coordinate,
            ReduceError::Time(_) | ReduceError::CalendarMisaligned { .. } => FailureKind::Calendar,
            ReduceError::Table(_) => FailureKind::Table,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Read => "read",
            FailureKind::Metadata => "metadata",
            FailureKind::Coordinate => "coordinate",
            FailureKind::Calendar => "calendar",
            FailureKind::Table => "table",
            FailureKind::Write => "write",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Written {
        location: String,
        path: PathBuf,
        rows: usize,
    },
    Failed {
        location: String,
        kind: FailureKind,
        message: String,
    },
}

impl FileOutcome {
    pub fn location(&self) -> &str {
        match self {
            FileOutcome::Written { location, .. } | FileOutcome::Failed { location, .. } => {
                location
            }
        }
    }

    pub fn is_written(&self) -> bool {
        matches!(self, FileOutcome::Written { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    outcomes: Vec<FileOutcome>,
}

impl RunSummary {
    pub fn outcomes(&self) -> &[FileOutcome] {
        &self.outcomes
    }

    pub fn written(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_written()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.written()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Processed {} stores: {} written, {} failed",
            self.outcomes.len(),
            self.written(),
            self.failed()
        )?;
        for outcome in &self.outcomes {
            if let FileOutcome::Failed { kind, message, .. } = outcome {
                write!(f, "\n  ✗ [{}] {}: {}", kind, outcome.location(), message)?;
            }
        }
        Ok(())
    }
}

/// Output CSV for a store location: slashes become underscores, the bucket
/// prefix is dropped and `.csv` is appended.
pub fn output_path(output_dir: &Path, location: &str) -> PathBuf {
    let name = format!("{}.csv", location.replace('/', "_")).replace(STRIPPED_PREFIX, "");
    output_dir.join(name)
}

pub struct Pipeline<O: StoreOpener> {
    config: RunConfig,
    catalog: Catalog,
    opener: O,
}

impl Pipeline<GdalOpener> {
    /// Applies the GDAL options, fetches the catalog and prepares the output
    /// directory. Any failure here aborts the run.
    pub fn init(config: RunConfig) -> Result<Self, PipelineError> {
        for (key, value) in config.gdal_options() {
            gdal::config::set_config_option(key, value)?;
        }

        info!("Fetching catalog {}", config.catalog_url());
        let catalog = Catalog::fetch(config.catalog_url())?;
        info!("Catalog lists {} datasets", catalog.len());

        let opener = GdalOpener::new(&config);
        Self::with_catalog(config, catalog, opener)
    }
}

impl<O: StoreOpener> Pipeline<O> {
    pub fn with_catalog(
        config: RunConfig,
        catalog: Catalog,
        opener: O,
    ) -> Result<Self, PipelineError> {
        let catalog = catalog
            .search(config.query())
            .select_members(config.member_policy());
        info!("Selected {} datasets", catalog.len());

        std::fs::create_dir_all(config.output_dir())?;

        Ok(Self {
            config,
            catalog,
            opener,
        })
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        self.catalog.entries()
    }

    /// Processes every selected store in catalog order. A failing store is
    /// logged and recorded; it never stops the run.
    pub fn run(&self) -> RunSummary {
        let total = self.catalog.len();
        let mut outcomes = Vec::with_capacity(total);

        for (index, entry) in self.catalog.entries().iter().enumerate() {
            info!("[{}/{}] {}", index + 1, total, entry.location());
            let outcome = self.process(entry);

            match &outcome {
                FileOutcome::Written { path, rows, .. } => {
                    info!("✓ Saved {} years to: {}", rows, path.display());
                }
                FileOutcome::Failed { message, .. } => {
                    warn!("problem with {}: {}", outcome.location(), message);
                }
            }
            outcomes.push(outcome);
        }

        RunSummary { outcomes }
    }

    fn process(&self, entry: &CatalogEntry) -> FileOutcome {
        let location = entry.location().to_string();
        let path = output_path(self.config.output_dir(), &location);

        let failed = |kind: FailureKind, message: String| FileOutcome::Failed {
            location: location.clone(),
            kind,
            message,
        };

        let table = match self
            .opener
            .open(entry)
            .map_err(ReduceError::from)
            .and_then(|source| reduce::global_mean(source.as_ref(), &self.config.reduce_options()))
        {
            Ok(table) => table,
            Err(e) => return failed(FailureKind::from(&e), e.to_string()),
        };

        if let Err(e) = table.to_csv_file(&path) {
            return failed(FailureKind::Write, e.to_string());
        }

        FileOutcome::Written {
            location: location.clone(),
            path,
            rows: table.len(),
        }
    }
}
