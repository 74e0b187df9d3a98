use anyhow::{Context, Result};
use log::debug;
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;

use crate::{
    download::download as download_file,
    http::RequestOptions,
    runtime::Runtime,
    upload::{UploadFile, UploadFiles, UploadForm, upload as upload_form},
};

pub mod config;

pub use config::{Config, Settings};

/// The JSON verbs the command line exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// Sends one JSON request and prints the envelope's `data` as pretty JSON.
#[tracing::instrument(skip(config, params, body))]
pub async fn request<R: Runtime>(
    config: &Config<R>,
    verb: Verb,
    url: &str,
    params: &[(String, String)],
    body: Option<&str>,
) -> Result<()> {
    let params = borrow_pairs(params);
    let body = body
        .map(|raw| serde_json::from_str::<Value>(raw).context("Request body is not valid JSON"))
        .transpose()?;
    let options = command_options();

    debug!("{:?} {} params={:?}", verb, url, params);

    let data: Value = match verb {
        Verb::Get => config.http.get(url, &params, options).await?,
        Verb::Delete => config.http.delete(url, &params, options).await?,
        Verb::Post => config.http.post(url, body.as_ref(), options).await?,
        Verb::Put => config.http.put(url, body.as_ref(), options).await?,
        Verb::Patch => config.http.patch(url, body.as_ref(), options).await?,
    };

    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}

/// Downloads `url` into the configured directory and prints the saved path.
#[tracing::instrument(skip(config, params))]
pub async fn download<R: Runtime>(
    config: &Config<R>,
    url: &str,
    params: &[(String, String)],
    output: Option<String>,
) -> Result<()> {
    let params = borrow_pairs(params);
    let mut options = progress_options(config.quiet);
    if let Some(name) = output {
        options = options.file_name(name);
    }

    let downloaded = download_file(
        &config.http,
        &config.runtime,
        url,
        &params,
        options,
        &config.download_dir,
    )
    .await;
    finish_progress(config.quiet);

    println!("{}", downloaded?.path.display());
    Ok(())
}

/// Uploads the given files plus text fields and prints the response data.
#[tracing::instrument(skip(config, fields))]
pub async fn upload<R: Runtime>(
    config: &Config<R>,
    url: &str,
    files: &[PathBuf],
    fields: &[(String, String)],
) -> Result<()> {
    check_files(&config.runtime, files)?;
    let form = build_form(&config.runtime, files, fields)?;

    let data: Result<Value, _> =
        upload_form(&config.http, url, &form, progress_options(config.quiet)).await;
    finish_progress(config.quiet);

    println!("{}", serde_json::to_string_pretty(&data?)?);
    Ok(())
}

/// One path is sent as `file`; several are sent as `file0`, `file1`, ...
fn build_form<R: Runtime>(
    runtime: &R,
    files: &[PathBuf],
    fields: &[(String, String)],
) -> Result<UploadForm> {
    let mut loaded = files
        .iter()
        .map(|path| UploadFile::from_path(runtime, path))
        .collect::<Result<Vec<_>>>()?;

    let files: UploadFiles = match loaded.len() {
        0 => anyhow::bail!("At least one file is required"),
        1 => loaded.remove(0).into(),
        _ => loaded.into(),
    };

    Ok(fields
        .iter()
        .fold(UploadForm::new(files), |form, (name, value)| {
            form.field(name.as_str(), value.as_str())
        }))
}

fn borrow_pairs(pairs: &[(String, String)]) -> Vec<(&str, &str)> {
    pairs
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect()
}

/// The command's returned error is what the user sees, so the per-call
/// error notification is turned off.
fn command_options() -> RequestOptions {
    RequestOptions::new().quiet()
}

fn progress_options(quiet: bool) -> RequestOptions {
    let options = command_options();
    if quiet {
        return options;
    }
    options.on_progress(|pct| {
        eprint!("\r{:>3}%", pct);
        let _ = std::io::stderr().flush();
    })
}

fn finish_progress(quiet: bool) {
    if !quiet {
        eprintln!();
    }
}

/// Parses `key=value` command-line pairs.
pub fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {:?}", raw)),
    }
}

/// Fails on the first path that does not exist.
pub fn check_files<R: Runtime>(runtime: &R, files: &[PathBuf]) -> Result<()> {
    match files.iter().find(|path| !runtime.exists(path)) {
        Some(missing) => anyhow::bail!("File not found: {}", missing.display()),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("page=2").unwrap(),
            ("page".to_string(), "2".to_string())
        );
        assert_eq!(
            parse_key_value("q=a=b").unwrap(),
            ("q".to_string(), "a=b".to_string())
        );
        assert_eq!(
            parse_key_value("empty=").unwrap(),
            ("empty".to_string(), String::new())
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn test_command_options_leave_error_reporting_to_caller() {
        let options = command_options();
        assert!(!options.show_error_message);
        assert!(!options.show_success_message);
        assert!(!progress_options(false).show_error_message);
        assert!(progress_options(false).on_progress.is_some());
        assert!(progress_options(true).on_progress.is_none());
    }

    #[test]
    fn test_build_form_single_file() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_read()
            .with(eq(PathBuf::from("/tmp/a.txt")))
            .returning(|_| Ok(b"alpha".to_vec()));

        let form = build_form(
            &runtime,
            &[PathBuf::from("/tmp/a.txt")],
            &[("folder".to_string(), "inbox".to_string())],
        )
        .unwrap();

        assert_eq!(form.keys(), vec!["file", "folder"]);
    }

    #[test]
    fn test_build_form_many_files() {
        let mut runtime = MockRuntime::new();
        runtime.expect_read().returning(|_| Ok(b"data".to_vec()));

        let form = build_form(
            &runtime,
            &[PathBuf::from("/tmp/a.txt"), PathBuf::from("/tmp/b.txt")],
            &[],
        )
        .unwrap();

        assert_eq!(form.keys(), vec!["file0", "file1"]);
    }

    #[test]
    fn test_build_form_requires_a_file() {
        let runtime = MockRuntime::new();
        assert!(build_form(&runtime, &[], &[]).is_err());
    }

    #[test]
    fn test_check_files() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_exists()
            .with(eq(PathBuf::from("/tmp/a.txt")))
            .returning(|_| true);
        runtime
            .expect_exists()
            .with(eq(PathBuf::from("/tmp/missing.txt")))
            .returning(|_| false);

        assert!(check_files(&runtime, &[PathBuf::from("/tmp/a.txt")]).is_ok());

        let err = check_files(
            &runtime,
            &[PathBuf::from("/tmp/a.txt"), PathBuf::from("/tmp/missing.txt")],
        )
        .unwrap_err();
        assert!(err.to_string().contains("missing.txt"));
    }
}
