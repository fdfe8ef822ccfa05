//! HTTP client for the platform's account API.
//!
//! Every endpoint lives under `{api_url}/accounts/{account_id}` and answers
//! with an envelope `{ success, errors, result }`, except successful KV reads
//! which return the raw stored bytes.

use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio_util::io::ReaderStream;

use super::{
    ApiError, KEY_NOT_FOUND, Namespace, ScriptDeployer, StoreClient, StoreError, ValueBody,
};
use crate::bundle::LookupScript;
use crate::config::{Credentials, Settings};
use crate::types::KV_BINDING;

/// Characters left unescaped in a KV key path segment.
const KEY_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const NAMESPACES_PER_PAGE: u32 = 100;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    errors: Vec<ApiError>,
    result: Option<T>,
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    page: u32,
    #[serde(default)]
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct Subdomain {
    subdomain: String,
}

/// Client for the KV storage and script hosting endpoints.
#[derive(Debug, Clone)]
pub struct CloudflareClient {
    client: Client,
    account_url: String,
    email: String,
    api_key: String,
}

impl CloudflareClient {
    /// Create a client for the account named in `credentials`.
    pub fn new(settings: &Settings, credentials: &Credentials) -> Result<Self, StoreError> {
        let client = Client::builder()
            .user_agent(crate::USER_AGENT)
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self::with_client(client, settings, credentials))
    }

    /// Create a client around an existing `reqwest::Client`.
    pub fn with_client(client: Client, settings: &Settings, credentials: &Credentials) -> Self {
        Self {
            client,
            account_url: format!(
                "{}/accounts/{}",
                settings.api_url.trim_end_matches('/'),
                credentials.account_id
            ),
            email: credentials.email.clone(),
            api_key: credentials.api_key.clone(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        tracing::debug!(%method, path, "platform request");
        self.client
            .request(method, format!("{}{path}", self.account_url))
            .header("X-Auth-Email", &self.email)
            .header("X-Auth-Key", &self.api_key)
    }

    fn value_path(namespace_id: &str, key: &str) -> String {
        format!(
            "/storage/kv/namespaces/{namespace_id}/values/{}",
            utf8_percent_encode(key, KEY_SEGMENT)
        )
    }
}

/// Decode an envelope and return its `result`.
async fn decode<T: DeserializeOwned>(
    operation: &'static str,
    response: Response,
) -> Result<(T, Option<ResultInfo>), StoreError> {
    let status = response.status();
    let body = response.bytes().await?;

    let envelope: Envelope<T> = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(_) if !status.is_success() => {
            return Err(StoreError::Status {
                operation,
                status: status.as_u16(),
            });
        }
        Err(source) => return Err(StoreError::Decode { operation, source }),
    };

    if !envelope.errors.is_empty() {
        return Err(StoreError::Api {
            operation,
            errors: envelope.errors,
        });
    }
    match envelope.result {
        Some(result) if status.is_success() => Ok((result, envelope.result_info)),
        _ => Err(StoreError::Status {
            operation,
            status: status.as_u16(),
        }),
    }
}

/// Check an envelope for errors, ignoring its `result`.
async fn check(operation: &'static str, response: Response) -> Result<(), StoreError> {
    let status = response.status();
    let body = response.bytes().await?;

    let errors = serde_json::from_slice::<Envelope<serde_json::Value>>(&body)
        .map(|envelope| envelope.errors)
        .unwrap_or_default();

    if !errors.is_empty() {
        return Err(StoreError::Api { operation, errors });
    }
    if !status.is_success() {
        return Err(StoreError::Status {
            operation,
            status: status.as_u16(),
        });
    }
    Ok(())
}

#[async_trait]
impl StoreClient for CloudflareClient {
    async fn list_namespaces(&self) -> Result<Vec<Namespace>, StoreError> {
        let mut namespaces = Vec::new();
        let mut page = 1;

        loop {
            let response = self
                .request(Method::GET, "/storage/kv/namespaces")
                .query(&[("page", page), ("per_page", NAMESPACES_PER_PAGE)])
                .send()
                .await?;
            let (batch, info): (Vec<Namespace>, _) =
                decode("Fetching KV namespaces", response).await?;

            let exhausted = batch.is_empty()
                || info.is_none_or(|info| info.page >= info.total_pages);
            namespaces.extend(batch);
            if exhausted {
                break;
            }
            page += 1;
        }

        Ok(namespaces)
    }

    async fn create_namespace(&self, title: &str) -> Result<Namespace, StoreError> {
        let response = self
            .request(Method::POST, "/storage/kv/namespaces")
            .json(&serde_json::json!({ "title": title }))
            .send()
            .await?;
        let (namespace, _) = decode("Creating KV namespace", response).await?;
        Ok(namespace)
    }

    async fn get_value(&self, namespace_id: &str, key: &str) -> Result<Option<Bytes>, StoreError> {
        let operation = "Reading value";
        let response = self
            .request(Method::GET, &Self::value_path(namespace_id, key))
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if status.is_success() {
            return Ok(Some(body));
        }

        let errors = serde_json::from_slice::<Envelope<serde_json::Value>>(&body)
            .map(|envelope| envelope.errors)
            .unwrap_or_default();

        match errors.first() {
            Some(first) if first.code == KEY_NOT_FOUND => Ok(None),
            Some(_) => Err(StoreError::Api { operation, errors }),
            None if status == StatusCode::NOT_FOUND => Ok(None),
            None => Err(StoreError::Status {
                operation,
                status: status.as_u16(),
            }),
        }
    }

    async fn put_value(
        &self,
        namespace_id: &str,
        key: &str,
        body: ValueBody,
        content_type: &str,
    ) -> Result<(), StoreError> {
        let request = self
            .request(Method::PUT, &Self::value_path(namespace_id, key))
            .header(reqwest::header::CONTENT_TYPE, content_type);

        let request = match body {
            ValueBody::Bytes(bytes) => request.body(bytes),
            ValueBody::File(path) => {
                let file = tokio::fs::File::open(&path).await?;
                let len = file.metadata().await?.len();
                request
                    .header(reqwest::header::CONTENT_LENGTH, len)
                    .body(reqwest::Body::wrap_stream(ReaderStream::new(file)))
            }
        };

        check("Writing value", request.send().await?).await
    }
}

#[async_trait]
impl ScriptDeployer for CloudflareClient {
    async fn upload_script(
        &self,
        script: &LookupScript,
        namespace: &Namespace,
    ) -> Result<(), StoreError> {
        let metadata = serde_json::json!({
            "body_part": "script",
            "bindings": [{
                "type": "kv_namespace",
                "name": KV_BINDING,
                "namespace_id": namespace.id,
            }],
        });

        let form = Form::new()
            .part(
                "metadata",
                Part::text(metadata.to_string()).mime_str("application/json")?,
            )
            .part(
                "script",
                Part::text(script.source.clone())
                    .file_name("script.js")
                    .mime_str("application/javascript")?,
            );

        let response = self
            .request(Method::PUT, &format!("/workers/scripts/{}", script.name))
            .multipart(form)
            .send()
            .await?;
        check("Deploying lookup script", response).await
    }

    async fn subdomain(&self) -> Result<String, StoreError> {
        let response = self
            .request(Method::GET, "/workers/subdomain")
            .send()
            .await?;
        let (result, _): (Subdomain, _) = decode("Retrieving subdomain", response).await?;
        Ok(result.subdomain)
    }

    async fn enable_subdomain(&self, script_name: &str) -> Result<(), StoreError> {
        let response = self
            .request(
                Method::POST,
                &format!("/workers/scripts/{script_name}/subdomain"),
            )
            .json(&serde_json::json!({ "enabled": true }))
            .send()
            .await?;
        check("Enabling subdomain route", response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{KeyLayout, PackageName};
    use mockito::{Matcher, Server};

    fn client_for(server: &Server) -> CloudflareClient {
        let settings = Settings::new(&server.url(), "dpm");
        let credentials = Credentials {
            account_id: "acc".to_string(),
            email: "dev@example.com".to_string(),
            api_key: "secret".to_string(),
        };
        CloudflareClient::new(&settings, &credentials).unwrap()
    }

    #[tokio::test]
    async fn test_list_namespaces_follows_pages() {
        let mut server = Server::new_async().await;
        let page_one = server
            .mock("GET", "/accounts/acc/storage/kv/namespaces")
            .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
            .match_header("x-auth-email", "dev@example.com")
            .match_header("x-auth-key", "secret")
            .with_body(
                r#"{"success":true,"errors":[],"result":[{"id":"n1","title":"other"}],
                    "result_info":{"page":1,"total_pages":2}}"#,
            )
            .create_async()
            .await;
        let page_two = server
            .mock("GET", "/accounts/acc/storage/kv/namespaces")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_body(
                r#"{"success":true,"errors":[],"result":[{"id":"n2","title":"dpm"}],
                    "result_info":{"page":2,"total_pages":2}}"#,
            )
            .create_async()
            .await;

        let namespaces = client_for(&server).list_namespaces().await.unwrap();

        page_one.assert_async().await;
        page_two.assert_async().await;
        let titles: Vec<&str> = namespaces.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, ["other", "dpm"]);
    }

    #[tokio::test]
    async fn test_error_records_become_api_errors() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/accounts/acc/storage/kv/namespaces")
            .with_status(400)
            .with_body(r#"{"success":false,"errors":[{"code":10014,"message":"namespace exists"}],"result":null}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .create_namespace("dpm")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Api { ref errors, .. } if errors.len() == 1 && errors[0].code == 10014
        ));
    }

    #[tokio::test]
    async fn test_get_value_maps_key_not_found_to_none() {
        let mut server = Server::new_async().await;
        let _missing = server
            .mock("GET", "/accounts/acc/storage/kv/namespaces/n1/values/dpm-ui-versions")
            .with_status(404)
            .with_body(r#"{"success":false,"errors":[{"code":10009,"message":"get: 'key not found'"}]}"#)
            .create_async()
            .await;
        let _present = server
            .mock("GET", "/accounts/acc/storage/kv/namespaces/n1/values/dpm-ui-1.0.0")
            .with_body("tarball-bytes")
            .create_async()
            .await;

        let client = client_for(&server);
        assert_eq!(client.get_value("n1", "dpm-ui-versions").await.unwrap(), None);
        assert_eq!(
            client.get_value("n1", "dpm-ui-1.0.0").await.unwrap().as_deref(),
            Some(&b"tarball-bytes"[..])
        );
    }

    #[tokio::test]
    async fn test_get_value_other_errors_are_fatal() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/accounts/acc/storage/kv/namespaces/n1/values/dpm-ui-versions")
            .with_status(403)
            .with_body(r#"{"success":false,"errors":[{"code":10000,"message":"Authentication error"}]}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .get_value("n1", "dpm-ui-versions")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Api { .. }));
    }

    #[tokio::test]
    async fn test_put_value_escapes_key_and_sends_body() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("PUT", "/accounts/acc/storage/kv/namespaces/n1/values/dpm-ui-1.0.0%2Bbuild")
            .match_header("content-type", "application/json")
            .match_body("[\"1.0.0\"]")
            .with_body(r#"{"success":true,"errors":[],"result":null}"#)
            .create_async()
            .await;

        client_for(&server)
            .put_value(
                "n1",
                "dpm-ui-1.0.0+build",
                ValueBody::from(b"[\"1.0.0\"]".to_vec()),
                "application/json",
            )
            .await
            .unwrap();
        m.assert_async().await;
    }

    #[tokio::test]
    async fn test_upload_script_sends_binding_metadata() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("PUT", "/accounts/acc/workers/scripts/ui")
            .match_header(
                "content-type",
                Matcher::Regex("^multipart/form-data; boundary=".to_string()),
            )
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#""body_part":"script""#.to_string()),
                Matcher::Regex(r#""namespace_id":"n1""#.to_string()),
                Matcher::Regex(r#"const PACKAGE_NAME = "ui";"#.to_string()),
            ]))
            .with_body(r#"{"success":true,"errors":[],"result":{"id":"ui"}}"#)
            .create_async()
            .await;

        let script = LookupScript::render(&PackageName::new("ui"), &KeyLayout::default());
        let namespace = Namespace {
            id: "n1".to_string(),
            title: "dpm".to_string(),
        };
        client_for(&server)
            .upload_script(&script, &namespace)
            .await
            .unwrap();
        m.assert_async().await;
    }

    #[tokio::test]
    async fn test_subdomain_round_trip() {
        let mut server = Server::new_async().await;
        let _get = server
            .mock("GET", "/accounts/acc/workers/subdomain")
            .with_body(r#"{"success":true,"errors":[],"result":{"subdomain":"acme"}}"#)
            .create_async()
            .await;
        let enable = server
            .mock("POST", "/accounts/acc/workers/scripts/ui/subdomain")
            .match_body(Matcher::Json(serde_json::json!({ "enabled": true })))
            .with_body(r#"{"success":true,"errors":[],"result":null}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        assert_eq!(client.subdomain().await.unwrap(), "acme");
        client.enable_subdomain("ui").await.unwrap();
        enable.assert_async().await;
    }
}
