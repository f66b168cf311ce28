//! Mock server helpers for registry API testing
//!
//! Provides utilities for setting up wiremock mock servers that answer
//! the catalog, tag, manifest and blob endpoints of a v2 registry.

use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const DOCKER_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";

/// Serve one catalog page; `last` is the cursor the page answers
pub async fn mock_catalog_page(
    server: &MockServer,
    last: Option<&str>,
    repositories: &[&str],
    next: Option<&str>,
) {
    let mut template =
        ResponseTemplate::new(200).set_body_json(json!({ "repositories": repositories }));
    if let Some(next) = next {
        template = template.insert_header(
            "Link",
            format!("</v2/_catalog?last={}&n={}>; rel=\"next\"", next, repositories.len()),
        );
    }

    let builder = Mock::given(method("GET")).and(path("/v2/_catalog"));
    let mock = match last {
        Some(last) => builder.and(query_param("last", last)).respond_with(template),
        None => builder.and(query_param_is_missing("last")).respond_with(template),
    };
    mock.mount(server).await;
}

/// Serve a single page of tags
pub async fn mock_tags(server: &MockServer, repository: &str, tags: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/v2/{}/tags/list", repository)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "name": repository, "tags": tags })),
        )
        .mount(server)
        .await;
}

/// Serve a manifest under `reference` that points at config blob `config_digest`
pub async fn mock_manifest(
    server: &MockServer,
    repository: &str,
    reference: &str,
    manifest_digest: &str,
    config_digest: &str,
) {
    let manifest = json!({
        "schemaVersion": 2,
        "mediaType": DOCKER_V2,
        "config": {
            "mediaType": "application/vnd.docker.container.image.v1+json",
            "size": 1000,
            "digest": config_digest
        },
        "layers": [
            {"mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip", "size": 20000, "digest": "sha256:layer1"},
            {"mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip", "size": 30000, "digest": "sha256:layer2"}
        ]
    });
    Mock::given(method("GET"))
        .and(path(format!("/v2/{}/manifests/{}", repository, reference)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(manifest)
                .insert_header("Docker-Content-Digest", manifest_digest),
        )
        .mount(server)
        .await;
}

/// Serve a config blob with the given labels
pub async fn mock_config_blob(server: &MockServer, repository: &str, digest: &str, labels: Value) {
    let blob = json!({
        "architecture": "amd64",
        "os": "linux",
        "created": "2024-05-01T10:00:00Z",
        "author": "Docker Library",
        "comment": "buildkit.dockerfile.v0",
        "config": {
            "Labels": labels,
            "Env": ["PATH=/usr/local/sbin:/usr/local/bin", "MYSQL_VERSION=5.7.44"],
            "Volumes": {"/var/lib/mysql": {}},
            "ExposedPorts": {"3306/tcp": {}}
        }
    });
    Mock::given(method("GET"))
        .and(path(format!("/v2/{}/blobs/{}", repository, digest)))
        .respond_with(ResponseTemplate::new(200).set_body_json(blob))
        .mount(server)
        .await;
}

/// Serve a full image: manifest under its tag and its config blob
pub async fn mock_image(server: &MockServer, repository: &str, tag: &str, config_digest: &str) {
    let manifest_digest = format!("{}-manifest", config_digest);
    mock_manifest(server, repository, tag, &manifest_digest, config_digest).await;
    mock_config_blob(server, repository, config_digest, json!({"family": "debian"})).await;
}

/// Answer a path with a bare status code
pub async fn mock_status(server: &MockServer, url_path: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}
