//! `multipart/form-data` bodies and uploaded files.

use anyhow::{bail, Context};
use bytes::Bytes;
use futures::executor::block_on;
use futures::stream;
use multer::Multipart;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::request::ParamVec;

/// One uploaded file part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartFile {
    name: String,
    original_filename: Option<String>,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

impl MultipartFile {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        original_filename: Option<String>,
        content_type: Option<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            original_filename,
            content_type,
            bytes,
        }
    }

    /// Form field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn original_filename(&self) -> Option<&str> {
        self.original_filename.as_deref()
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Write the content to `dest`, creating missing parent directories.
    ///
    /// # Errors
    ///
    /// Any I/O failure, with the destination path in the context chain.
    pub fn transfer_to(&self, dest: impl AsRef<Path>) -> anyhow::Result<()> {
        let dest = dest.as_ref();
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
        fs::write(dest, &self.bytes)
            .with_context(|| format!("failed to transfer '{}' to {}", self.name, dest.display()))?;
        debug!(field = %self.name, dest = %dest.display(), size = self.size(), "Multipart file transferred");
        Ok(())
    }

    /// JSON summary used when a file is echoed into a model or response.
    #[must_use]
    pub fn describe(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "original_filename": self.original_filename,
            "content_type": self.content_type,
            "size": self.size(),
        })
    }
}

/// Split a multipart body into plain form fields and file parts.
///
/// Parts with a `filename` in their `Content-Disposition` become files, all
/// others become form fields (decoded as UTF-8, lossily). The body is already
/// in memory, so the `multer` stream is driven to completion in place.
///
/// # Errors
///
/// Fails when the opening boundary is missing, a part has no name, or the
/// body is malformed.
pub fn parse_multipart(body: &[u8], boundary: &str) -> anyhow::Result<(ParamVec, Vec<MultipartFile>)> {
    let delimiter = format!("--{boundary}");
    if !body.windows(delimiter.len()).any(|w| w == delimiter.as_bytes()) {
        bail!("multipart body does not contain boundary '{boundary}'");
    }

    let chunk = Bytes::copy_from_slice(body);
    let stream = stream::once(async move { Ok::<Bytes, std::io::Error>(chunk) });
    let mut multipart = Multipart::new(stream, boundary);

    block_on(async move {
        let mut fields = ParamVec::new();
        let mut files = Vec::new();
        let mut index = 0usize;
        while let Some(field) = multipart
            .next_field()
            .await
            .with_context(|| format!("malformed multipart part {index}"))?
        {
            let name = field
                .name()
                .map(str::to_string)
                .with_context(|| format!("multipart part {index} without a name"))?;
            let filename = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(ToString::to_string);
            let content = field
                .bytes()
                .await
                .with_context(|| format!("failed to read multipart part '{name}'"))?;
            match filename {
                Some(filename) => files.push(MultipartFile::new(
                    name,
                    Some(filename).filter(|f| !f.is_empty()),
                    content_type,
                    content.to_vec(),
                )),
                None => fields.push((Arc::from(name.as_str()), String::from_utf8_lossy(&content).into_owned())),
            }
            index += 1;
        }
        debug!(fields = fields.len(), files = files.len(), "Multipart body parsed");
        Ok::<_, anyhow::Error>((fields, files))
    })
}
