//! Attachments module.
//!
//! Mails carry two kinds of attachments: [`StaticAttachment`]s picked from a shared library of
//! files on disk, and [`DynamicAttachment`]s uploaded for a single mail into managed storage.
//! Both implement [`AttachmentSource`], which resolves their file name and MIME type and reads
//! their content through the shared text-or-binary resolver in [`content`].

pub mod content;
mod dynamic_attachment;
mod errors;
mod mime_types;
mod placement;
mod source;
mod static_attachment;

pub use content::{read_content, AttachmentContent, AttachmentReader, OpenableFile};
pub use dynamic_attachment::{DynamicAttachment, NewDynamicAttachment, UploadStore};
pub use errors::AttachmentError;
pub use mime_types::{
    resolve_file_name, resolve_mime_type, validate_file_name, validate_mime_type,
    DEFAULT_ATTACHMENT_MIME_TYPE, MAX_FILENAME_LENGTH, MAX_MIME_TYPE_LENGTH,
};
pub use placement::{sanitize_file_name, UploadPlacement, DEFAULT_UPLOAD_TEMPLATE};
pub use source::AttachmentSource;
pub use static_attachment::{StaticAttachment, StaticLibrary};
