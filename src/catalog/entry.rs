use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One row of the catalog table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    fields: BTreeMap<String, String>,
    location: String,
}

impl CatalogEntry {
    pub fn new(fields: BTreeMap<String, String>, location: String) -> Self {
        Self { fields, location }
    }

    /// Value of an arbitrary catalog column.
    pub fn field(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    fn field_or_empty(&self, column: &str) -> &str {
        self.field(column).unwrap_or("")
    }

    pub fn source_id(&self) -> &str {
        self.field_or_empty("source_id")
    }

    pub fn experiment_id(&self) -> &str {
        self.field_or_empty("experiment_id")
    }

    pub fn variable_id(&self) -> &str {
        self.field_or_empty("variable_id")
    }

    pub fn grid_label(&self) -> &str {
        self.field_or_empty("grid_label")
    }

    pub fn member_id(&self) -> &str {
        self.field_or_empty("member_id")
    }

    pub fn table_id(&self) -> &str {
        self.field_or_empty("table_id")
    }

    pub fn version(&self) -> &str {
        self.field_or_empty("version")
    }

    /// Storage location of the dataset (the collection's asset column).
    pub fn location(&self) -> &str {
        &self.location
    }
}

/// A CMIP6 member identifier `r<k>i<l>p<m>f<n>`, optionally prefixed by a
/// sub-experiment such as `s1960-`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VariantLabel {
    pub realization: u32,
    pub initialization: u32,
    pub physics: u32,
    pub forcing: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantLabelParseError(pub String);

impl fmt::Display for VariantLabelParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid variant label '{}'", self.0)
    }
}

impl std::error::Error for VariantLabelParseError {}

impl FromStr for VariantLabel {
    type Err = VariantLabelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || VariantLabelParseError(s.to_string());
        let label = s.rsplit('-').next().ok_or_else(err)?;

        let mut indices = [0u32; 4];
        let mut rest = label;
        for (slot, prefix) in indices.iter_mut().zip(['r', 'i', 'p', 'f']) {
            rest = rest.strip_prefix(prefix).ok_or_else(err)?;
            let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
            *slot = rest[..digits].parse().map_err(|_| err())?;
            rest = &rest[digits..];
        }
        if !rest.is_empty() {
            return Err(err());
        }

        Ok(VariantLabel {
            realization: indices[0],
            initialization: indices[1],
            physics: indices[2],
            forcing: indices[3],
        })
    }
}

impl fmt::Display for VariantLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "r{}i{}p{}f{}",
            self.realization, self.initialization, self.physics, self.forcing
        )
    }
}
