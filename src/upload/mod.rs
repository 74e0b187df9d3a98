//! Multipart uploads with progress reporting.

use anyhow::Result;
use futures_util::stream;
use log::{debug, info};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Method};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::http::{
    ErrorCode, HttpClient, HttpError, Payload, ProgressCallback, RequestOptions, progress_percent,
    with_retry,
};
use crate::runtime::Runtime;

/// Size of the chunks a file part is streamed in when progress is tracked.
const CHUNK_SIZE: usize = 64 * 1024;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Form key for a lone file.
pub const FILE_FIELD: &str = "file";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub contents: Vec<u8>,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            contents: contents.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Reads a file from disk, naming the part after the file.
    pub fn from_path<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        let contents = runtime.read(path)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| FILE_FIELD.to_string());
        debug!("Read {} bytes from {:?}", contents.len(), path);
        Ok(Self::new(file_name, contents))
    }
}

/// One file or a list of files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadFiles {
    Single(UploadFile),
    Many(Vec<UploadFile>),
}

impl From<UploadFile> for UploadFiles {
    fn from(file: UploadFile) -> Self {
        UploadFiles::Single(file)
    }
}

impl From<Vec<UploadFile>> for UploadFiles {
    fn from(files: Vec<UploadFile>) -> Self {
        UploadFiles::Many(files)
    }
}

/// The multipart form: a single file goes under `file`, a list under
/// `file0`, `file1`, ... followed by the extra text fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadForm {
    files: UploadFiles,
    fields: Vec<(String, String)>,
}

impl UploadForm {
    pub fn new(files: impl Into<UploadFiles>) -> Self {
        Self {
            files: files.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Files paired with the form key each one is sent under.
    pub fn file_parts(&self) -> Vec<(String, &UploadFile)> {
        match &self.files {
            UploadFiles::Single(file) => vec![(FILE_FIELD.to_string(), file)],
            UploadFiles::Many(files) => files
                .iter()
                .enumerate()
                .map(|(index, file)| (format!("{}{}", FILE_FIELD, index), file))
                .collect(),
        }
    }

    /// Every key in the order it is appended to the body.
    pub fn keys(&self) -> Vec<String> {
        self.file_parts()
            .into_iter()
            .map(|(key, _)| key)
            .chain(self.fields.iter().map(|(name, _)| name.clone()))
            .collect()
    }

    pub fn total_bytes(&self) -> u64 {
        self.file_parts()
            .iter()
            .map(|(_, file)| file.contents.len() as u64)
            .sum()
    }

    /// Builds a fresh multipart body; reqwest consumes it on send, so each
    /// attempt gets its own.
    fn to_multipart(&self, options: &RequestOptions) -> Result<Form, HttpError> {
        let tracker = options.on_progress.as_ref().map(|callback| {
            Arc::new(Progress {
                loaded: AtomicU64::new(0),
                total: self.total_bytes(),
                callback: Arc::clone(callback),
            })
        });

        let mut form = Form::new();
        for (key, file) in self.file_parts() {
            let part = match &tracker {
                Some(tracker) => tracked_part(file, Arc::clone(tracker)),
                None => Part::bytes(file.contents.clone()),
            };
            let part = part
                .file_name(file.file_name.clone())
                .mime_str(file.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE))
                .map_err(|_| {
                    HttpError::new(
                        format!("Invalid content type for {}", file.file_name),
                        ErrorCode::Io,
                    )
                })?;
            form = form.part(key, part);
        }

        for (name, value) in &self.fields {
            form = form.text(name.clone(), value.clone());
        }
        Ok(form)
    }
}

/// Shared byte counter across all file parts of one attempt.
struct Progress {
    loaded: AtomicU64,
    total: u64,
    callback: ProgressCallback,
}

impl Progress {
    fn advance(&self, bytes: usize) {
        let loaded = self.loaded.fetch_add(bytes as u64, Ordering::SeqCst) + bytes as u64;
        (self.callback)(progress_percent(loaded, Some(self.total)));
    }
}

fn tracked_part(file: &UploadFile, tracker: Arc<Progress>) -> Part {
    let length = file.contents.len() as u64;
    let chunks: Vec<Vec<u8>> = file
        .contents
        .chunks(CHUNK_SIZE)
        .map(<[u8]>::to_vec)
        .collect();

    let body = Body::wrap_stream(stream::iter(chunks.into_iter().map(move |chunk| {
        tracker.advance(chunk.len());
        Ok::<_, std::io::Error>(chunk)
    })));
    Part::stream_with_length(body, length)
}

/// POSTs `form` to `url` and returns the envelope's `data`.
///
/// Uses the client's upload timeout unless the call sets its own.
#[tracing::instrument(skip(http, form, options))]
pub async fn upload<T: DeserializeOwned>(
    http: &HttpClient,
    url: &str,
    form: &UploadForm,
    options: RequestOptions,
) -> Result<T, HttpError> {
    let mut options = options;
    if options.timeout.is_none() {
        options.timeout = Some(http.config().upload_timeout);
    }

    info!(
        "Uploading [{}] ({} bytes) to {}...",
        form.keys().join(", "),
        form.total_bytes(),
        url
    );

    let policy = http.retry_policy(&options);
    let options = &options;
    let result = with_retry("Upload", policy, move || async move {
        let body = form.to_multipart(options)?;
        let response = http
            .execute(Method::POST, url, &[], Payload::Multipart(body), options)
            .await?;
        http.read_envelope(response, options).await
    })
    .await;

    http.finish(result, options)
}
