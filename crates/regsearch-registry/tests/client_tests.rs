//! Registry client tests against a mock v2 registry
//!
//! Tests cover:
//! - Catalog and tag pagination through Link headers
//! - Manifest and config blob resolution
//! - Authentication and error reporting
//! - A full crawl through the client

mod common;

use common::mock_server::*;
use regsearch_core::source::RegistrySource;
use regsearch_core::store::{IndexStore, MemoryIndex};
use regsearch_core::{Crawler, Error};
use regsearch_registry::RegistryClient;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> RegistryClient {
    RegistryClient::new(&server.uri()).unwrap()
}

#[tokio::test]
async fn test_catalog_pages() {
    let server = MockServer::start().await;
    mock_catalog_page(&server, None, &["a", "b"], Some("b")).await;
    mock_catalog_page(&server, Some("b"), &["c"], None).await;

    let client = client(&server).with_page_size(2);

    let first = client.list_repositories(None).await.unwrap();
    assert_eq!(first.repositories, vec!["a", "b"]);
    assert!(first.has_more);

    let second = client.list_repositories(Some("b")).await.unwrap();
    assert_eq!(second.repositories, vec!["c"]);
    assert!(!second.has_more);
}

#[tokio::test]
async fn test_tags_follow_link_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/library/mysql/tags/list"))
        .and(wiremock::matchers::query_param("last", "8.0"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"name": "library/mysql", "tags": ["latest"]})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/library/mysql/tags/list"))
        .and(wiremock::matchers::query_param_is_missing("last"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"name": "library/mysql", "tags": ["5.7", "8.0"]}))
                .insert_header(
                    "Link",
                    "</v2/library/mysql/tags/list?n=2&last=8.0>; rel=\"next\"",
                ),
        )
        .mount(&server)
        .await;

    let tags = RegistrySource::list_tags(&client(&server), "library/mysql")
        .await
        .unwrap();
    assert_eq!(tags, vec!["5.7", "8.0", "latest"]);
}

#[tokio::test]
async fn test_null_tags_are_empty() {
    let server = MockServer::start().await;
    mock_tags(&server, "emptied", serde_json::Value::Null).await;

    let tags = client(&server).list_tags("emptied").await.unwrap();
    assert!(tags.is_empty());
}

#[tokio::test]
async fn test_resolve_by_tag() {
    let server = MockServer::start().await;
    mock_manifest(&server, "mysql", "5.7", "sha256:man", "sha256:cfg").await;
    mock_config_blob(
        &server,
        "mysql",
        "sha256:cfg",
        json!({"family": "debian", "experimental": ""}),
    )
    .await;

    let meta = client(&server)
        .resolve_image("mysql", "5.7", None)
        .await
        .unwrap();

    assert_eq!(meta.digest, "sha256:cfg");
    assert_eq!(meta.manifest_digest.as_deref(), Some("sha256:man"));
    assert_eq!(meta.labels, vec!["experimental", "family=debian"]);
    assert_eq!(meta.volumes, vec!["/var/lib/mysql"]);
    assert_eq!(meta.exposed_ports, vec!["3306/tcp"]);
    assert_eq!(meta.comment.as_deref(), Some("buildkit.dockerfile.v0"));
    assert_eq!(meta.size, 51000);
    assert!(meta.created.is_some());
}

#[tokio::test]
async fn test_resolve_by_digest() {
    let server = MockServer::start().await;
    mock_manifest(&server, "mysql", "sha256:man", "sha256:man", "sha256:cfg").await;
    mock_config_blob(&server, "mysql", "sha256:cfg", json!({})).await;

    let meta = client(&server)
        .resolve_image("mysql", "5.7", Some("sha256:man"))
        .await
        .unwrap();
    assert_eq!(meta.digest, "sha256:cfg");
    assert_eq!(meta.manifest_digest.as_deref(), Some("sha256:man"));
}

#[tokio::test]
async fn test_bearer_token_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/private/tags/list"))
        .and(header("Authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"tags": ["1"]})))
        .mount(&server)
        .await;
    mock_status(&server, "/v2/private/tags/list", 401).await;

    let anonymous = client(&server).list_tags("private").await;
    assert!(anonymous.is_err());

    let tags = client(&server)
        .with_token("s3cret")
        .list_tags("private")
        .await
        .unwrap();
    assert_eq!(tags, vec!["1"]);
}

#[tokio::test]
async fn test_token_not_forwarded_to_foreign_next_link() {
    let server = MockServer::start().await;
    let mirror = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/private/tags/list"))
        .and(header("Authorization", "Bearer s3cret"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"tags": ["1"]}))
                .insert_header(
                    "Link",
                    format!("<{}/v2/private/tags/list?last=1>; rel=\"next\"", mirror.uri()),
                ),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/private/tags/list"))
        .and(|req: &wiremock::Request| !req.headers.contains_key("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"tags": ["2"]})))
        .mount(&mirror)
        .await;
    mock_status(&mirror, "/v2/private/tags/list", 403).await;

    let tags = client(&server)
        .with_token("s3cret")
        .list_tags("private")
        .await
        .unwrap();
    assert_eq!(tags, vec!["1", "2"]);
}

#[tokio::test]
async fn test_missing_manifest_is_registry_error() {
    let server = MockServer::start().await;
    mock_status(&server, "/v2/mysql/manifests/9.9", 404).await;

    let err = client(&server)
        .resolve_image("mysql", "9.9", None)
        .await
        .unwrap_err();
    assert!(matches!(&err, Error::Registry { message } if message.contains("404")));
}

#[tokio::test]
async fn test_manifest_list_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/multi/manifests/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "schemaVersion": 2,
            "mediaType": MANIFEST_LIST,
            "config": {"size": 0, "digest": "sha256:none"},
            "manifests": []
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .resolve_image("multi", "latest", None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Unsupported manifest type"));
}

#[tokio::test]
async fn test_crawl_through_client() {
    let server = MockServer::start().await;
    mock_catalog_page(&server, None, &["httpd", "mysql"], None).await;
    mock_tags(&server, "httpd", json!(["2.4"])).await;
    mock_tags(&server, "mysql", json!(["5.7", "8.0"])).await;
    mock_image(&server, "httpd", "2.4", "sha256:httpd24").await;
    mock_image(&server, "mysql", "5.7", "sha256:mysql57").await;
    mock_status(&server, "/v2/mysql/manifests/8.0", 500).await;

    let store = Arc::new(MemoryIndex::new());
    let report = Crawler::new(Arc::new(client(&server)), store.clone())
        .build()
        .await
        .unwrap();

    assert_eq!(report.repositories, 2);
    assert_eq!(report.indexed.len(), 2);
    assert_eq!(report.failed_tags.len(), 1);

    let doc = store.get("sha256:mysql57").await.unwrap().unwrap();
    assert_eq!(doc.full_name, "mysql:5.7");
    assert_eq!(doc.label.get("family").map(String::as_str), Some("debian"));
    assert_eq!(
        doc.manifest_digest.as_deref(),
        Some("sha256:mysql57-manifest")
    );
    assert!(doc.exposed_ports.contains(&3306));
}
