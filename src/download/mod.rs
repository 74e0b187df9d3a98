//! Binary downloads saved to disk.

mod filename;

use log::{debug, info};
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use reqwest::{Method, Response};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::http::{HttpClient, HttpError, Payload, RequestOptions, with_retry};
use crate::runtime::Runtime;

pub use filename::{default_file_name, parse_content_disposition, resolve_file_name};

/// Where a finished download ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloaded {
    pub path: PathBuf,
    pub file_name: String,
    pub bytes: u64,
}

/// Downloads `url` into `dir`.
///
/// A JSON response is the server reporting a failure instead of sending the
/// file; it is raised as an [`HttpError`] and nothing is written. The body is
/// streamed into `<name>.part` and renamed once complete.
#[tracing::instrument(skip(http, runtime, params, options))]
pub async fn download<R: Runtime>(
    http: &HttpClient,
    runtime: &R,
    url: &str,
    params: &[(&str, &str)],
    options: RequestOptions,
    dir: &Path,
) -> Result<Downloaded, HttpError> {
    info!("Downloading {}...", url);

    let policy = http.retry_policy(&options);
    let options = &options;
    let result = with_retry("Download", policy, move || async move {
        let response = http
            .execute(Method::GET, url, params, Payload::Empty, options)
            .await?;
        save_response(http, runtime, response, options, dir).await
    })
    .await;

    if let Ok(downloaded) = &result {
        info!(
            "Saved {} ({:.2} MB)",
            downloaded.path.display(),
            downloaded.bytes as f64 / (1024.0 * 1024.0)
        );
    }
    http.finish(result, options)
}

async fn save_response<R: Runtime>(
    http: &HttpClient,
    runtime: &R,
    response: Response,
    options: &RequestOptions,
    dir: &Path,
) -> Result<Downloaded, HttpError> {
    if is_json(response.headers()) {
        let body = response.text().await.map_err(|e| http.transport_error(e))?;
        debug!("Download answered with JSON instead of a file");
        return Err(http.envelope_error(&body));
    }

    let file_name = resolve_file_name(options.file_name.as_deref(), response.headers());
    let final_path = dir.join(&file_name);
    let part_path = dir.join(format!("{}.part", file_name));

    runtime.create_dir_all(dir).map_err(HttpError::io)?;
    let writer = runtime.create_file(&part_path).map_err(HttpError::io)?;

    match stream_to(http, response, writer, options).await {
        Ok(bytes) => {
            runtime
                .rename(&part_path, &final_path)
                .map_err(HttpError::io)?;
            Ok(Downloaded {
                path: final_path,
                file_name,
                bytes,
            })
        }
        Err(e) => {
            if let Err(cleanup) = runtime.remove_file(&part_path) {
                debug!("Failed to remove {:?}: {}", part_path, cleanup);
            }
            Err(e)
        }
    }
}

/// Copies the body into `writer`, reporting progress per chunk. The writer is
/// dropped before returning so the file is closed ahead of the rename.
async fn stream_to(
    http: &HttpClient,
    mut response: Response,
    mut writer: Box<dyn Write + Send>,
    options: &RequestOptions,
) -> Result<u64, HttpError> {
    let total = response.content_length();
    let mut loaded: u64 = 0;

    while let Some(chunk) = response.chunk().await.map_err(|e| http.transport_error(e))? {
        writer
            .write_all(&chunk)
            .map_err(|e| HttpError::io(anyhow::Error::from(e).context("Failed to write chunk to file")))?;
        loaded += chunk.len() as u64;
        options.report_progress(loaded, total);
    }

    writer
        .flush()
        .map_err(|e| HttpError::io(anyhow::Error::from(e).context("Failed to flush file")))?;
    Ok(loaded)
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case("application/json"))
}
