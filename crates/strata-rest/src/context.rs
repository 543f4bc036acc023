use crate::http::{HttpClient, HttpRequest, HttpResponse};
use crate::wire::Document;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use http::Method;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use strata_core::{DataContext, Datasource, Error, GenericDataContext, Result};
use tracing::{debug, warn};

/// Connection settings for one remote API.
#[derive(Debug, Clone, Deserialize)]
pub struct RestConfig {
    pub base_uri: String,
    pub api_name: String,
    pub api_version: String,
    pub api_key: String,
    pub api_secret: String,
}

impl RestConfig {
    /// Panics when the api name or version is empty; a transport that does
    /// not know where it points is a wiring mistake.
    pub fn new(
        base_uri: impl Into<String>,
        api_name: impl Into<String>,
        api_version: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        let config = Self {
            base_uri: base_uri.into(),
            api_name: api_name.into(),
            api_version: api_version.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        };
        assert!(
            !config.api_name.is_empty() && !config.api_version.is_empty(),
            "Programmer: a REST config requires a non-empty api name and version"
        );
        config
    }
}

/// Shared request machinery for one remote API: URI composition, the
/// basic-auth header, and translation of HTTP statuses into the core
/// error taxonomy.
pub struct RestTransport {
    config: RestConfig,
    client: Arc<dyn HttpClient>,
}

impl RestTransport {
    pub fn new(config: RestConfig, client: Arc<dyn HttpClient>) -> Self {
        Self { config, client }
    }

    /// `{base}/{api}/v{version}{endpoint}`; the endpoint must start with
    /// `/`.
    pub fn compose_uri(&self, endpoint: &str) -> String {
        format!(
            "{}/{}/v{}{endpoint}",
            self.config.base_uri.trim_end_matches('/'),
            self.config.api_name,
            self.config.api_version
        )
    }

    fn auth_header(&self) -> String {
        let token = BASE64.encode(format!(
            "{}:{}",
            self.config.api_key, self.config.api_secret
        ));
        format!("Basic {token}")
    }

    /// Send a JSON:API request and translate the response into a parsed
    /// document or a taxonomy error.
    pub fn send(&self, method: Method, endpoint: &str, body: Option<Value>) -> Result<Document> {
        let url = self.compose_uri(endpoint);
        debug!(method = %method, url = %url, "Sending API request");
        let mut request = HttpRequest::new(method, url)
            .header("Authorization", self.auth_header())
            .header("Accept", "application/vnd.api+json");
        if let Some(body) = body {
            request = request
                .header("Content-Type", "application/vnd.api+json")
                .with_body(body);
        }
        let response = self.client.send(request)?;
        self.process_response(response)
    }

    fn process_response(&self, response: HttpResponse) -> Result<Document> {
        let status = response.status;
        debug!(status = status.as_u16(), "Received API response");
        let doc = Document::parse(&response.body);

        if status.is_success() {
            return doc.ok_or_else(|| {
                Error::Server(format!(
                    "API answered {status} with a body that is not a JSON:API document"
                ))
            });
        }

        let detail = doc
            .as_ref()
            .and_then(|d| d.first_error_message())
            .unwrap_or("(no detail provided)")
            .to_string();
        warn!(status = status.as_u16(), detail = %detail, "API request failed");

        match status.as_u16() {
            404 => Err(Error::not_found(detail)),
            409 => Err(Error::duplicate(
                detail,
                doc.and_then(|d| d.duplicate_resource()),
            )),
            400..=499 => Err(Error::User(format!("API rejected the request ({status}): {detail}"))),
            500..=599 => Err(Error::Server(format!("API failed ({status}): {detail}"))),
            _ => Err(Error::Server(format!(
                "Don't know how to handle `{status}` API responses"
            ))),
        }
    }
}

/// A data context over one remote API: every registered datasource shares
/// the transport, and unregistered types can fall back to a generic
/// datasource so any endpoint of the API is reachable.
pub struct RestDataContext {
    transport: Arc<RestTransport>,
    inner: GenericDataContext,
}

impl RestDataContext {
    pub fn new(config: RestConfig, client: Arc<dyn HttpClient>) -> Self {
        Self {
            transport: Arc::new(RestTransport::new(config, client)),
            inner: GenericDataContext::new(),
        }
    }

    pub fn transport(&self) -> Arc<RestTransport> {
        Arc::clone(&self.transport)
    }

    pub fn register<F>(mut self, json_api_type: &str, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Datasource>> + Send + Sync + 'static,
    {
        self.inner = self.inner.register(json_api_type, factory);
        self
    }

    /// Register a generic datasource for a type: id-only query spec,
    /// generic resources, no duplicate detection.
    pub fn register_generic(self, json_api_type: &str) -> Self {
        let transport = Arc::clone(&self.transport);
        let resource_type = json_api_type.to_string();
        self.register(json_api_type, move || {
            Ok(Arc::new(crate::datasource::RestDatasource::new(
                resource_type.clone(),
                Arc::clone(&transport),
                strata_core::QuerySpec::generic(),
            )) as Arc<dyn Datasource>)
        })
    }
}

impl DataContext for RestDataContext {
    fn datasource_for_type(&self, json_api_type: &str) -> Result<Arc<dyn Datasource>> {
        self.inner.datasource_for_type(json_api_type)
    }
}
