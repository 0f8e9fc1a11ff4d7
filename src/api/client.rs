use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{
    ApiError, Application, Backend, CheckRequest, Collection, ConflictCheckResult,
    CreateJobRequest, Device, Job, RetryPolicy, Service,
};

/// `reqwest` implementation of [`Backend`].
///
/// Reads go through the retry policy. Writes are sent once.
pub struct HttpBackend {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpBackend {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        retry: RetryPolicy,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("floto/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ApiError::Client)?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
            client,
            retry,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header(CONTENT_TYPE, "application/json");
        match &self.token {
            Some(token) => builder.header(AUTHORIZATION, format!("Token {token}")),
            None => builder,
        }
    }

    /// Send a request and return the raw body of a 2xx response.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> Result<(String, String), ApiError> {
        let url = self.url(path);
        let method_name = method_name(&method);
        let mut builder = self.request(method, &url);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        debug!(method = method_name, url = %url, "Sending request");
        let response = builder.send().await.map_err(|source| ApiError::Transport {
            method: method_name,
            url: url.clone(),
            source,
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|source| ApiError::Transport {
            method: method_name,
            url: url.clone(),
            source,
        })?;

        if !status.is_success() {
            return Err(ApiError::Status {
                method: method_name,
                url,
                status: status.as_u16(),
                body: text,
            });
        }
        Ok((url, text))
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let (url, text) = self.send(Method::GET, path, None).await?;
        decode(&url, &text)
    }

    async fn fetch_with_retry<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.retry.run(path, || self.fetch(path)).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_string(body).map_err(ApiError::Encode)?;
        let (url, text) = self.send(Method::POST, path, Some(body)).await?;
        decode(&url, &text)
    }
}

fn decode<T: DeserializeOwned>(url: &str, text: &str) -> Result<T, ApiError> {
    serde_json::from_str(text).map_err(|source| ApiError::Decode {
        url: url.to_string(),
        source,
    })
}

fn method_name(method: &Method) -> &'static str {
    [Method::GET, Method::POST, Method::DELETE]
        .iter()
        .zip(["GET", "POST", "DELETE"])
        .find(|(m, _)| *m == method)
        .map(|(_, name)| name)
        .unwrap_or("REQUEST")
}

#[async_trait]
impl Backend for HttpBackend {
    async fn list_applications(&self) -> Result<Vec<Application>, ApiError> {
        self.fetch_with_retry("api/applications/").await
    }

    async fn list_services(&self) -> Result<Vec<Service>, ApiError> {
        self.fetch_with_retry("api/services/").await
    }

    async fn list_devices(&self) -> Result<Vec<Device>, ApiError> {
        self.fetch_with_retry("api/devices/").await
    }

    async fn list_collections(&self) -> Result<Vec<Collection>, ApiError> {
        self.fetch_with_retry("api/collections/").await
    }

    async fn list_jobs(&self) -> Result<Vec<Job>, ApiError> {
        self.fetch_with_retry("api/jobs/").await
    }

    async fn get_job(&self, uuid: &str) -> Result<Job, ApiError> {
        self.fetch_with_retry(&format!("api/jobs/{uuid}")).await
    }

    async fn check_job(&self, request: &CheckRequest) -> Result<ConflictCheckResult, ApiError> {
        self.post("api/jobs/check/", request).await
    }

    async fn create_job(&self, request: &CreateJobRequest) -> Result<Job, ApiError> {
        self.post("api/jobs/", request).await
    }

    async fn delete_job(&self, uuid: &str) -> Result<(), ApiError> {
        match self
            .send(Method::DELETE, &format!("api/jobs/{uuid}"), None)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.status() == Some(404) => {
                debug!(job = uuid, "Job already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
