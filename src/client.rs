use crate::config::Server;
use fhir_model::r4b::resources::{Bundle, ResourceType};
use log::debug;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, ClientBuilder, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_derive::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use urlencoding::encode;

const FHIR_JSON: &str = "application/fhir+json";
const SEARCH_BODY_LIMIT: usize = 1000;
const TRANSACTION_BODY_LIMIT: usize = 1500;

#[derive(Error, Debug)]
pub(crate) enum ClientError {
    #[error("FHIR server base url is not configured")]
    MissingBaseUrl,
    #[error("FHIR request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("FHIR server responded {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("invalid FHIR response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("no {resource_type} found for {query}")]
    NotFound {
        resource_type: ResourceType,
        query: String,
    },
    #[error("expected exactly one {resource_type} for {query}, found {count}")]
    Ambiguous {
        resource_type: ResourceType,
        query: String,
        count: usize,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Software {
    pub(crate) name: Option<String>,
    pub(crate) version: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CapabilityStatement {
    pub(crate) fhir_version: Option<String>,
    pub(crate) software: Option<Software>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SearchEntry {
    pub(crate) resource: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SearchBundle {
    pub(crate) total: Option<u64>,
    #[serde(default)]
    pub(crate) entry: Vec<SearchEntry>,
}

/// `identifier=<system>%7C<value>` style search parameter.
pub(crate) fn token_query(param: &str, system: &str, value: &str) -> String {
    format!("{param}={}%7C{}", encode(system), encode(value))
}

pub(crate) struct FhirClient {
    base_url: String,
    client: Client,
}

impl FhirClient {
    pub(crate) fn new(config: &Server) -> Result<Self, ClientError> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            return Err(ClientError::MissingBaseUrl);
        }

        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;

        Ok(FhirClient { base_url, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub(crate) async fn capability_statement(&self) -> Result<CapabilityStatement, ClientError> {
        self.send(self.client.get(self.url("metadata")), SEARCH_BODY_LIMIT)
            .await
    }

    pub(crate) async fn search(
        &self,
        resource_type: ResourceType,
        query: &str,
    ) -> Result<SearchBundle, ClientError> {
        let url = format!("{}?{query}", self.url(&resource_type.to_string()));
        debug!("Searching {url}");

        self.send(self.client.get(url), SEARCH_BODY_LIMIT).await
    }

    /// Exactly one matching resource, anything else is an error.
    pub(crate) async fn expect_single(
        &self,
        resource_type: ResourceType,
        query: &str,
    ) -> Result<Value, ClientError> {
        let bundle = self.search(resource_type, query).await?;
        match single(bundle, resource_type, query)? {
            Some(resource) => Ok(resource),
            None => Err(ClientError::NotFound {
                resource_type,
                query: query.to_owned(),
            }),
        }
    }

    /// Zero or one matching resource.
    pub(crate) async fn find_by_identifier(
        &self,
        resource_type: ResourceType,
        system: &str,
        value: &str,
    ) -> Result<Option<Value>, ClientError> {
        let query = token_query("identifier", system, value);
        let bundle = self.search(resource_type, &query).await?;
        single(bundle, resource_type, &query)
    }

    pub(crate) async fn post_transaction(&self, bundle: &Bundle) -> Result<Value, ClientError> {
        let body = serde_json::to_vec(bundle)?;
        debug!("Posting transaction bundle with {} entries", bundle.entry.len());

        let request = self
            .client
            .post(format!("{}/", self.base_url))
            .header(CONTENT_TYPE, FHIR_JSON)
            .body(body);
        self.send(request, TRANSACTION_BODY_LIMIT).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        body_limit: usize,
    ) -> Result<T, ClientError> {
        let response = request.header(ACCEPT, FHIR_JSON).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ClientError::Status {
                status,
                body: body.chars().take(body_limit).collect(),
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

fn single(
    bundle: SearchBundle,
    resource_type: ResourceType,
    query: &str,
) -> Result<Option<Value>, ClientError> {
    let count = bundle.entry.len();
    if count > 1 {
        return Err(ClientError::Ambiguous {
            resource_type,
            query: query.to_owned(),
            count,
        });
    }

    Ok(bundle.entry.into_iter().next().and_then(|e| e.resource))
}
