//! Where uploaded attachments are stored

use std::{
    fmt::{self, Write as _},
    sync::Arc,
};

use chrono::{
    format::{Item, StrftimeItems},
    DateTime, Utc,
};
use lazy_static::lazy_static;
use regex::Regex;

use super::AttachmentError;

/// Default directory template for uploaded attachments, formatted with the upload date
pub const DEFAULT_UPLOAD_TEMPLATE: &str = "mailing/attachments/%Y/%m/%d";

lazy_static! {
    static ref UNSAFE_CHARS: Regex = Regex::new(r"[^-\w.]").unwrap();
}

type PlacementFn = dyn Fn(i64, &str) -> String + Send + Sync;

/// Computes the storage name of an uploaded attachment
#[derive(Clone)]
pub enum UploadPlacement {
    /// A strftime directory template; the file keeps its (sanitized) name inside it
    DateTemplate(String),

    /// A caller-supplied function of the mail ID and the sanitized file name
    Custom(Arc<PlacementFn>),
}

impl UploadPlacement {
    /// A date-based placement. Fails if `template` is not a valid strftime format.
    pub fn date_template(template: impl Into<String>) -> Result<Self, AttachmentError> {
        let template = template.into();

        if StrftimeItems::new(&template).any(|item| matches!(item, Item::Error)) {
            return Err(AttachmentError::InvalidPath(template));
        }

        Ok(Self::DateTemplate(template))
    }

    /// A placement computed by `place`
    pub fn custom<F>(place: F) -> Self
    where
        F: Fn(i64, &str) -> String + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(place))
    }

    /// The storage name for `filename` uploaded for `mail_id` at `now`
    pub fn place(&self, mail_id: i64, filename: &str, now: DateTime<Utc>) -> String {
        let filename = sanitize_file_name(filename);

        match self {
            Self::DateTemplate(template) => {
                let mut directory = String::new();
                if write!(directory, "{}", now.format(template)).is_err() {
                    // Only reachable for templates built without `date_template`.
                    directory = template.clone();
                }
                let directory = directory.trim_matches('/');

                if directory.is_empty() {
                    filename
                } else {
                    format!("{directory}/{filename}")
                }
            }
            Self::Custom(place) => place(mail_id, &filename),
        }
    }
}

impl Default for UploadPlacement {
    fn default() -> Self {
        Self::DateTemplate(DEFAULT_UPLOAD_TEMPLATE.to_string())
    }
}

impl fmt::Debug for UploadPlacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DateTemplate(template) => f.debug_tuple("DateTemplate").field(template).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Reduce an uploaded file name to a safe basename: spaces become underscores and anything
/// other than word characters, `-` and `.` is dropped.
pub fn sanitize_file_name(filename: &str) -> String {
    let basename = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .replace(' ', "_");

    let cleaned = UNSAFE_CHARS.replace_all(&basename, "");
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "attachment".to_string()
    } else {
        cleaned.to_string()
    }
}
