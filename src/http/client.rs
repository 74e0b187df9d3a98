//! HTTP client with request/response interceptors and built-in retry.

use anyhow::{Context, Result};
use log::{debug, warn};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::multipart::Form;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use super::envelope::{Envelope, Outcome};
use super::error::{ErrorCode, HttpError};
use super::options::RequestOptions;
use super::retry::{RetryPolicy, with_retry};
use crate::config::ClientConfig;
use crate::i18n::{Localizer, MessageKey};
use crate::notify::Notifier;
use crate::session::{Session, SessionGuard};

/// Request body handed to the transport.
pub(crate) enum Payload<'a> {
    Empty,
    Json(&'a Value),
    Multipart(Form),
}

/// Envelope-aware HTTP client.
///
/// Every request gets the session's bearer token and a JSON content type;
/// every JSON response is unwrapped from its `{code, msg, data}` envelope.
/// Unauthorized responses, whether signalled by status or by envelope code,
/// go through the shared [`SessionGuard`].
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    config: ClientConfig,
    session: Arc<dyn Session>,
    notifier: Arc<dyn Notifier>,
    localizer: Arc<dyn Localizer>,
    guard: Arc<SessionGuard>,
}

impl HttpClient {
    /// Builds the underlying reqwest client from `config`.
    pub fn new(
        config: ClientConfig,
        session: Arc<dyn Session>,
        notifier: Arc<dyn Notifier>,
        localizer: Arc<dyn Localizer>,
        guard: Arc<SessionGuard>,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .cookie_store(config.with_credentials)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            config,
            session,
            notifier,
            localizer,
            guard,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn guard(&self) -> &Arc<SessionGuard> {
        &self.guard
    }

    /// GET `url` with query `params` and return the envelope's `data`.
    #[tracing::instrument(skip(self, params, options))]
    pub async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, &str)],
        options: RequestOptions,
    ) -> Result<T, HttpError> {
        self.request(Method::GET, url, params, None, options).await
    }

    #[tracing::instrument(skip(self, data, options))]
    pub async fn post<T: DeserializeOwned>(
        &self,
        url: &str,
        data: Option<&Value>,
        options: RequestOptions,
    ) -> Result<T, HttpError> {
        self.request(Method::POST, url, &[], data, options).await
    }

    #[tracing::instrument(skip(self, data, options))]
    pub async fn put<T: DeserializeOwned>(
        &self,
        url: &str,
        data: Option<&Value>,
        options: RequestOptions,
    ) -> Result<T, HttpError> {
        self.request(Method::PUT, url, &[], data, options).await
    }

    #[tracing::instrument(skip(self, data, options))]
    pub async fn patch<T: DeserializeOwned>(
        &self,
        url: &str,
        data: Option<&Value>,
        options: RequestOptions,
    ) -> Result<T, HttpError> {
        self.request(Method::PATCH, url, &[], data, options).await
    }

    #[tracing::instrument(skip(self, params, options))]
    pub async fn delete<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, &str)],
        options: RequestOptions,
    ) -> Result<T, HttpError> {
        self.request(Method::DELETE, url, params, None, options).await
    }

    pub fn retry_policy(&self, options: &RequestOptions) -> RetryPolicy {
        RetryPolicy::resolve(options, &self.config)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        params: &[(&str, &str)],
        data: Option<&Value>,
        options: RequestOptions,
    ) -> Result<T, HttpError> {
        let operation = format!("{} {}", method, url);
        let policy = self.retry_policy(&options);
        let options = &options;

        let result = with_retry(&operation, policy, move || {
            let method = method.clone();
            async move {
                let payload = data.map_or(Payload::Empty, Payload::Json);
                let response = self.execute(method, url, params, payload, options).await?;
                self.read_envelope(response, options).await
            }
        })
        .await;

        self.finish(result, options)
    }

    /// Single attempt: sends the request and maps transport failures and
    /// non-2xx statuses. The response body is left unread.
    pub(crate) async fn execute(
        &self,
        method: Method,
        url: &str,
        params: &[(&str, &str)],
        payload: Payload<'_>,
        options: &RequestOptions,
    ) -> Result<Response, HttpError> {
        debug!("{} {}...", method, url);

        let response = self
            .prepare(method, url, params, payload, options)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(self.status_error(status, &body))
    }

    fn prepare(
        &self,
        method: Method,
        url: &str,
        params: &[(&str, &str)],
        payload: Payload<'_>,
        options: &RequestOptions,
    ) -> RequestBuilder {
        let mut headers = self.default_headers(matches!(payload, Payload::Multipart(_)));
        for (name, value) in options.headers.iter() {
            headers.insert(name.clone(), value.clone());
        }

        let mut builder = self
            .client
            .request(method, self.config.resolve_url(url))
            .headers(headers)
            .query(params);

        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }

        match payload {
            Payload::Empty => builder,
            Payload::Json(body) => builder.json(body),
            Payload::Multipart(form) => builder.multipart(form),
        }
    }

    fn default_headers(&self, multipart: bool) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Some(token) = self.session.access_token() {
            match HeaderValue::from_str(&format!("Bearer {}", token)) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => warn!("Access token is not a valid header value, sending request without it"),
            }
        }

        // reqwest sets the multipart boundary itself
        if !multipart {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        headers
    }

    /// Reads a JSON response body and unwraps its envelope.
    pub(crate) async fn read_envelope<T: DeserializeOwned>(
        &self,
        response: Response,
        options: &RequestOptions,
    ) -> Result<T, HttpError> {
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        self.interpret(&body, options)
    }

    fn interpret<T: DeserializeOwned>(
        &self,
        body: &str,
        options: &RequestOptions,
    ) -> Result<T, HttpError> {
        if body.trim().is_empty() {
            return self.decode(Value::Null);
        }

        let envelope = Envelope::parse(body).map_err(|e| self.decode_error(e))?;
        match envelope.outcome() {
            Outcome::Success => {
                let message = envelope.message().map(str::to_string);
                let data = self.decode(envelope.data)?;
                if options.show_success_message {
                    let message =
                        message.unwrap_or_else(|| self.localizer.text(MessageKey::OperationSucceeded));
                    self.notifier.success(&message);
                }
                Ok(data)
            }
            Outcome::Unauthorized => Err(self.unauthorized()),
            Outcome::Failure(code) => Err(self.application_error(&envelope, code)),
        }
    }

    /// Turns a JSON body that arrived where binary content was expected into
    /// the error it describes.
    pub(crate) fn envelope_error(&self, body: &str) -> HttpError {
        let envelope = match Envelope::parse(body) {
            Ok(envelope) => envelope,
            Err(e) => return self.decode_error(e),
        };

        match envelope.outcome() {
            Outcome::Unauthorized => self.unauthorized(),
            Outcome::Failure(code) => self.application_error(&envelope, code),
            Outcome::Success => {
                let code = ErrorCode::Application(envelope.code.clone());
                self.application_error(&envelope, code)
            }
        }
    }

    /// Shows the error notification for a failed call unless the caller opted
    /// out. Unauthorized errors were already announced by the guard.
    pub(crate) fn finish<T>(
        &self,
        result: Result<T, HttpError>,
        options: &RequestOptions,
    ) -> Result<T, HttpError> {
        if let Err(e) = &result {
            if options.show_error_message && !e.is_unauthorized() {
                self.notifier.error(&e.message);
            }
        }
        result
    }

    fn unauthorized(&self) -> HttpError {
        self.guard.handle_unauthorized(
            Arc::clone(&self.session),
            self.notifier.as_ref(),
            self.localizer.as_ref(),
        )
    }

    fn status_error(&self, status: StatusCode, body: &str) -> HttpError {
        if status == StatusCode::UNAUTHORIZED {
            return self.unauthorized();
        }

        let message = Envelope::parse(body)
            .ok()
            .and_then(|envelope| envelope.message().map(str::to_string))
            .or_else(|| status.canonical_reason().map(str::to_string))
            .unwrap_or_else(|| self.localizer.text(MessageKey::RequestFailed));

        debug!("HTTP {} error: {}", status.as_u16(), message);
        HttpError::new(message, ErrorCode::from_status(status))
    }

    pub(crate) fn transport_error(&self, error: reqwest::Error) -> HttpError {
        debug!("Transport failure: {}", error);

        if error.is_timeout() {
            HttpError::new(
                self.localizer.text(MessageKey::RequestTimeout),
                ErrorCode::RequestTimeout,
            )
        } else if error.is_decode() {
            HttpError::new(
                self.localizer.text(MessageKey::UnexpectedResponse),
                ErrorCode::Decode,
            )
        } else {
            HttpError::new(
                self.localizer.text(MessageKey::NetworkError),
                ErrorCode::Network,
            )
        }
    }

    fn application_error(&self, envelope: &Envelope, code: ErrorCode) -> HttpError {
        let message = envelope
            .message()
            .map(str::to_string)
            .unwrap_or_else(|| self.localizer.text(MessageKey::RequestFailed));
        HttpError::new(message, code)
    }

    fn decode<T: DeserializeOwned>(&self, data: Value) -> Result<T, HttpError> {
        serde_json::from_value(data).map_err(|e| self.decode_error(e))
    }

    fn decode_error(&self, error: serde_json::Error) -> HttpError {
        debug!("Failed to parse response body: {}", error);
        HttpError::new(
            self.localizer.text(MessageKey::UnexpectedResponse),
            ErrorCode::Decode,
        )
    }
}
