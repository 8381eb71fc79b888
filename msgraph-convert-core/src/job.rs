//! One conversion call's worth of state: the resolved document kind and the
//! temporary drive item name it will be uploaded under.

use std::path::Path;
use uuid::Uuid;

use crate::error::ConversionError;

/// Assumed when neither the caller nor a file name supplies an extension.
pub const DEFAULT_EXTENSION: &str = ".docx";

/// Office formats the drive service can render to PDF, with their upload media type.
const KNOWN_FORMATS: &[(&str, &str)] = &[
    (
        ".docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    (".docm", "application/vnd.ms-word.document.macroEnabled.12"),
    (
        ".dotx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.template",
    ),
    (".dotm", "application/vnd.ms-word.template.macroEnabled.12"),
    (".doc", "application/msword"),
    (".dot", "application/msword"),
    (
        ".xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    (".xlsm", "application/vnd.ms-excel.sheet.macroEnabled.12"),
    (".xls", "application/vnd.ms-excel"),
    (
        ".pptx",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    ),
    (
        ".ppsx",
        "application/vnd.openxmlformats-officedocument.presentationml.slideshow",
    ),
    (".pptm", "application/vnd.ms-powerpoint.presentation.macroEnabled.12"),
    (".ppt", "application/vnd.ms-powerpoint"),
    (".pps", "application/vnd.ms-powerpoint"),
    (".odt", "application/vnd.oasis.opendocument.text"),
    (".ods", "application/vnd.oasis.opendocument.spreadsheet"),
    (".odp", "application/vnd.oasis.opendocument.presentation"),
    (".rtf", "application/rtf"),
];

/// Media type for a normalised extension, if the service can render it.
pub fn media_type_for(extension: &str) -> Option<&'static str> {
    KNOWN_FORMATS
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, media_type)| *media_type)
}

/// Lowercase and dot-prefix an extension: `DOCX`, `docx` and `.docx` all become `.docx`.
pub fn normalise_extension(raw: &str) -> String {
    let trimmed = raw.trim().trim_start_matches('.');
    format!(".{}", trimmed.to_ascii_lowercase())
}

/// Explicit extension first, then the file name suffix, then [`DEFAULT_EXTENSION`].
pub fn resolve_extension(explicit: Option<&str>, file_name: Option<&Path>) -> String {
    if let Some(ext) = explicit.filter(|e| !e.trim().trim_start_matches('.').is_empty()) {
        return normalise_extension(ext);
    }
    file_name
        .and_then(|p| p.extension())
        .and_then(|e| e.to_str())
        .map(normalise_extension)
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    pub extension: String,
    pub media_type: &'static str,
    /// `{uuid}{extension}`; the service needs the extension to pick a renderer.
    pub temp_name: String,
    pub size: u64,
}

impl ConversionJob {
    /// Fails with [`ConversionError::UnsupportedExtension`] before anything touches the network.
    pub fn new(extension: &str, size: u64) -> Result<Self, ConversionError> {
        let extension = normalise_extension(extension);
        let media_type = media_type_for(&extension)
            .ok_or_else(|| ConversionError::UnsupportedExtension(extension.clone()))?;
        let temp_name = format!("{}{}", Uuid::new_v4(), extension);
        Ok(Self {
            extension,
            media_type,
            temp_name,
            size,
        })
    }
}
