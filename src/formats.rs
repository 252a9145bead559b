//! Supported-format catalog.
//!
//! The backend publishes which formats it accepts as input and which it can
//! produce (`GET /api/formats`). The target format of a batch must come from
//! the output set; labels are compared case-insensitively and stored
//! lowercase.

use serde::{Deserialize, Serialize};

use crate::error::BatchError;

/// Input and output format labels offered by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatCatalog {
    pub input: Vec<String>,
    pub output: Vec<String>,
}

impl Default for FormatCatalog {
    fn default() -> Self {
        Self::new(
            ["pdf", "docx", "doc", "txt", "rtf", "odt"],
            ["pdf", "docx", "doc", "txt", "rtf", "odt", "html"],
        )
    }
}

impl FormatCatalog {
    pub fn new<I, O>(input: I, output: O) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        O: IntoIterator,
        O::Item: AsRef<str>,
    {
        Self {
            input: normalise(input),
            output: normalise(output),
        }
    }

    /// Validate a target format against the output set.
    ///
    /// Returns the lowercase label to send to the backend.
    pub fn select_output(&self, format: &str) -> Result<String, BatchError> {
        let wanted = format.trim().to_ascii_lowercase();
        if !wanted.is_empty() && self.output.iter().any(|f| *f == wanted) {
            Ok(wanted)
        } else {
            Err(BatchError::UnsupportedFormat {
                format: format.to_string(),
                supported: self.output.join(", "),
            })
        }
    }

    /// Whether a file extension is in the input set.
    pub fn accepts_input(&self, extension: &str) -> bool {
        let ext = extension.to_ascii_lowercase();
        self.input.iter().any(|f| *f == ext)
    }
}

fn normalise<I>(labels: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for label in labels {
        let label = label.as_ref().trim().to_ascii_lowercase();
        if !label.is_empty() && !out.contains(&label) {
            out.push(label);
        }
    }
    out
}
