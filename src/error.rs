use thiserror::Error;

/// Why a pair of sources could not be turned into a joined dataset.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Source not found: {0}")]
    MissingInput(String),

    #[error("Failed to read {location}: {message}")]
    Unreadable { location: String, message: String },

    #[error("Column '{column}' not found in {input}. Available columns: {available}")]
    MissingKeyColumn {
        input: &'static str,
        column: &'static str,
        available: String,
    },

    #[error("Malformed {input}: {message}")]
    Malformed { input: &'static str, message: String },

    #[error(
        "No matching postcodes between table ({table_rows} rows) and boundaries ({boundary_rows} features). \
         Table keys: {table_sample:?}, boundary keys: {boundary_sample:?}"
    )]
    EmptyJoin {
        table_rows: usize,
        boundary_rows: usize,
        table_sample: Vec<String>,
        boundary_sample: Vec<String>,
    },
}

impl LoadError {
    /// Missing or unreadable files, as opposed to problems with their content.
    pub fn is_missing_input(&self) -> bool {
        matches!(self, LoadError::MissingInput(_) | LoadError::Unreadable { .. })
    }

    pub fn is_schema(&self) -> bool {
        matches!(
            self,
            LoadError::MissingKeyColumn { .. } | LoadError::Malformed { .. }
        )
    }

    /// A short hint for the user on what to check next.
    pub fn guidance(&self) -> &'static str {
        match self {
            LoadError::MissingInput(_) | LoadError::Unreadable { .. } => {
                "Provide both the PC4 table and the PC4 boundary file."
            }
            LoadError::MissingKeyColumn { .. } | LoadError::Malformed { .. } => {
                "Check that both files carry a PC4 column."
            }
            LoadError::EmptyJoin { .. } => {
                "The postcode values in both files do not overlap; compare their formats."
            }
        }
    }
}

/// Geometry failures inside the municipality dissolve. Never fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("Malformed geometry for postcode {pc4}: {reason}")]
    Malformed { pc4: String, reason: String },

    #[error("Polygon union failed for group {group}")]
    UnionFailed { group: String },

    #[error("No geometry could be produced for any group")]
    Exhausted,
}

#[derive(Error, Debug, PartialEq)]
pub enum AggregateError {
    #[error("Column '{0}' not found, cannot aggregate")]
    MissingGroupColumn(&'static str),
}
