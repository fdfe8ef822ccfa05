//! Serve command: a local preview of the edge lookup surface.

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use dpm_core::{Reporter, error_chain};
use dpm_core::config::Settings;
use dpm_core::lookup::{LookupHandler, LookupResponse};
use dpm_core::platform::{Namespace, StoreClient};
use dpm_schema::PackageName;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::ui::Output;

/// Every path is handled by the lookup handler.
pub fn router(handler: LookupHandler) -> Router {
    Router::new().fallback(lookup).with_state(Arc::new(handler))
}

async fn lookup(State(handler): State<Arc<LookupHandler>>, uri: Uri) -> Response {
    match handler.handle(uri.path()).await {
        Ok(response) => into_response(response),
        Err(e) => {
            let message = error_chain(&e);
            tracing::error!(error = %message, path = uri.path(), "lookup failed");
            (StatusCode::BAD_GATEWAY, message).into_response()
        }
    }
}

fn into_response(response: LookupResponse) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(response.content_type()),
    );
    if let Some(value) = response
        .content_disposition()
        .and_then(|d| HeaderValue::from_str(&d).ok())
    {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    (StatusCode::OK, headers, response.into_body()).into_response()
}

/// The namespace titled `title`; it must already exist.
pub async fn find_namespace(store: &dyn StoreClient, title: &str) -> Result<Namespace> {
    store
        .list_namespaces()
        .await
        .context("Failed to list KV namespaces")?
        .into_iter()
        .find(|ns| ns.title == title)
        .with_context(|| format!("Namespace {title} does not exist; publish a package first"))
}

pub async fn serve(package: &str, addr: SocketAddr, settings: &Settings) -> Result<()> {
    let package = PackageName::parse(package)?;
    let client = Arc::new(super::connect(settings)?);
    let namespace = find_namespace(client.as_ref(), &settings.layout.namespace).await?;

    let handler = LookupHandler::new(client, namespace.id, package, settings.layout.clone());
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to listen on {addr}"))?;

    Output::new().info(&format!(
        "Serving {} from namespace {} on http://{}",
        handler.package(),
        namespace.title,
        listener.local_addr()?
    ));
    axum::serve(listener, router(handler))
        .await
        .context("Preview server failed")
}
