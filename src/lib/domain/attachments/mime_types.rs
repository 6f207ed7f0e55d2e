//! File name and MIME type resolution

use std::path::Path;

use mime_guess::mime::Mime;

use super::AttachmentError;

/// MIME type used when none is declared and none can be guessed from the file name
pub const DEFAULT_ATTACHMENT_MIME_TYPE: &str = "application/octet-stream";

/// Maximum length of a declared file name
pub const MAX_FILENAME_LENGTH: usize = 100;

/// Maximum length of a declared MIME type
pub const MAX_MIME_TYPE_LENGTH: usize = 100;

/// The display name of an attachment: the declared name if any, else the storage basename
pub fn resolve_file_name(declared: &str, storage_reference: &str) -> String {
    let declared = declared.trim();

    if !declared.is_empty() {
        return declared.to_string();
    }

    Path::new(storage_reference)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// The MIME type of an attachment.
///
/// A declared type always wins. Otherwise the type is guessed from the extension of
/// `file_name`, falling back to [`DEFAULT_ATTACHMENT_MIME_TYPE`]. Never returns an empty string.
pub fn resolve_mime_type(declared: &str, file_name: &str) -> String {
    let declared = declared.trim();

    if !declared.is_empty() {
        return declared.to_string();
    }

    mime_guess::from_path(file_name)
        .first_raw()
        .unwrap_or(DEFAULT_ATTACHMENT_MIME_TYPE)
        .to_string()
}

/// Check a MIME type override entered by an operator. Blank means "guess it".
pub fn validate_mime_type(value: &str) -> Result<(), AttachmentError> {
    let value = value.trim();

    if value.is_empty() {
        return Ok(());
    }

    if value.chars().count() > MAX_MIME_TYPE_LENGTH {
        return Err(AttachmentError::FieldTooLong {
            field: "mime_type",
            max: MAX_MIME_TYPE_LENGTH,
        });
    }

    value
        .parse::<Mime>()
        .map(|_| ())
        .map_err(|_| AttachmentError::InvalidMimeType(value.to_string()))
}

/// Check a file name override entered by an operator
pub fn validate_file_name(value: &str) -> Result<(), AttachmentError> {
    if value.trim().chars().count() > MAX_FILENAME_LENGTH {
        return Err(AttachmentError::FieldTooLong {
            field: "filename",
            max: MAX_FILENAME_LENGTH,
        });
    }

    Ok(())
}
