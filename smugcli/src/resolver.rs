use std::collections::HashMap;
use std::sync::Arc;

use smugmug_core::{NodeType, RemoteNode, SmugClient, SmugError};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Api(#[from] SmugError),
    #[error("\"{segment}\" not found in \"{parent}\"")]
    NotFound { segment: String, parent: String },
}

/// Walks remote paths (`"A/B/C"`) down from a user's root node.
///
/// Children listings are cached per `(user, path-prefix)` for the lifetime
/// of the resolver (one command invocation), so resolving `A/B/C` and
/// then `A/B/D` lists `A/B` only once.
pub struct PathResolver {
    client: Arc<SmugClient>,
    cache: Mutex<HashMap<String, RemoteNode>>,
}

impl PathResolver {
    pub fn new(client: Arc<SmugClient>) -> Self {
        Self {
            client,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Splits a remote path on `/`, regardless of the host OS separator.
    pub fn split_segments(path: &str) -> Vec<String> {
        path.split('/')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub async fn root(&self, user: &str) -> Result<RemoteNode, SmugError> {
        let key = cache_key(user, "");
        if let Some(node) = self.cache.lock().await.get(&key) {
            return Ok(node.clone());
        }
        let root = self.client.get_root(user).await?;
        self.cache.lock().await.insert(key, root.clone());
        Ok(root)
    }

    /// Resolves a full path, failing on the first missing segment.
    pub async fn resolve(&self, user: &str, path: &str) -> Result<RemoteNode, ResolveError> {
        let segments = Self::split_segments(path);
        let (node, remaining) = self.descend(user, &segments).await?;
        match remaining.first() {
            None => Ok(node),
            Some(missing) => {
                let matched = segments.len() - remaining.len();
                let parent = if matched == 0 {
                    "/".to_string()
                } else {
                    format!("/{}", segments[..matched].join("/"))
                };
                Err(ResolveError::NotFound {
                    segment: missing.clone(),
                    parent,
                })
            }
        }
    }

    /// Resolves as deep as the tree allows and returns the unmatched tail,
    /// for `mkdir`-style verbs that create the rest.
    pub async fn resolve_or_parent(
        &self,
        user: &str,
        path: &str,
    ) -> Result<(RemoteNode, Vec<String>), SmugError> {
        let segments = Self::split_segments(path);
        self.descend(user, &segments).await
    }

    /// Makes a node visible to later lookups, e.g. right after `mkdir`.
    pub async fn cache_node(&self, user: &str, path: &str, node: RemoteNode) {
        let prefix = format!("/{}", Self::split_segments(path).join("/"));
        self.cache.lock().await.insert(cache_key(user, &prefix), node);
    }

    async fn descend(
        &self,
        user: &str,
        segments: &[String],
    ) -> Result<(RemoteNode, Vec<String>), SmugError> {
        let mut node = self.root(user).await?;
        let mut prefix = String::new();
        for (index, segment) in segments.iter().enumerate() {
            let child_prefix = format!("{prefix}/{segment}");
            let key = cache_key(user, &child_prefix);
            if let Some(hit) = self.cache.lock().await.get(&key) {
                node = hit.clone();
                prefix = child_prefix;
                continue;
            }

            // Only folders have child nodes to descend into.
            if node.node_type != NodeType::Folder {
                return Ok((node, segments[index..].to_vec()));
            }

            let children = self.client.list_children(&node, None).await?;
            let mut found = None;
            {
                let mut cache = self.cache.lock().await;
                for child in children {
                    let child_key = cache_key(user, &format!("{prefix}/{}", child.name));
                    if child.name == *segment {
                        found = Some(child.clone());
                    }
                    cache.entry(child_key).or_insert(child);
                }
            }
            match found {
                Some(child) => {
                    node = child;
                    prefix = child_prefix;
                }
                None => return Ok((node, segments[index..].to_vec())),
            }
        }
        Ok((node, Vec::new()))
    }
}

fn cache_key(user: &str, prefix: &str) -> String {
    format!("{user}\u{1}{prefix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn node_json(name: &str, node_type: &str, uri: &str) -> serde_json::Value {
        json!({
            "NodeID": uri.rsplit('/').next().unwrap(),
            "Type": node_type,
            "Name": name,
            "UrlName": name,
            "Uri": uri,
            "HasChildren": true,
            "Uris": { "ChildNodes": { "Uri": format!("{uri}!children") } }
        })
    }

    async fn make_resolver(server: &MockServer) -> PathResolver {
        let signer = smugmug_core::OAuth1Signer::new("k", "s").with_token("t", "ts");
        let client = SmugClient::with_base_urls(
            &server.uri(),
            &format!("{}/upload", server.uri()),
            signer,
        )
        .unwrap();
        PathResolver::new(Arc::new(client))
    }

    async fn mount_tree(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/api/v2/user/tester"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Response": {
                    "User": {
                        "NickName": "tester",
                        "Uris": { "Node": { "Uri": "/api/v2/node/root" } }
                    }
                }
            })))
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/node/root"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Response": { "Node": node_json("tester", "Folder", "/api/v2/node/root") }
            })))
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/node/root!children"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Response": {
                    "Node": [
                        node_json("Travel", "Folder", "/api/v2/node/travel"),
                        node_json("Pets", "Album", "/api/v2/node/pets"),
                    ],
                    "Pages": { "Total": 2, "Start": 1, "Count": 2 }
                }
            })))
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/node/travel!children"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Response": {
                    "Node": [node_json("2015", "Album", "/api/v2/node/t2015")],
                    "Pages": { "Total": 1, "Start": 1, "Count": 1 }
                }
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn resolves_nested_paths() {
        let server = MockServer::start().await;
        mount_tree(&server).await;

        let resolver = make_resolver(&server).await;
        let node = resolver.resolve("tester", "Travel/2015").await.unwrap();
        assert_eq!(node.name, "2015");
        assert_eq!(node.node_type, NodeType::Album);
    }

    #[tokio::test]
    async fn sibling_lookups_reuse_listings() {
        let server = MockServer::start().await;
        mount_tree(&server).await;

        let resolver = make_resolver(&server).await;
        resolver.resolve("tester", "Travel/2015").await.unwrap();
        // Both hit the cache; the expect(1) mocks fail the test otherwise.
        let pets = resolver.resolve("tester", "Pets").await.unwrap();
        assert_eq!(pets.node_type, NodeType::Album);
        let again = resolver.resolve("tester", "Travel/2015").await.unwrap();
        assert_eq!(again.uri, "/api/v2/node/t2015");
    }

    #[tokio::test]
    async fn missing_segment_reports_parent() {
        let server = MockServer::start().await;
        mount_tree(&server).await;

        let resolver = make_resolver(&server).await;
        let err = resolver
            .resolve("tester", "Travel/2099")
            .await
            .unwrap_err();
        match err {
            ResolveError::NotFound { segment, parent } => {
                assert_eq!(segment, "2099");
                assert_eq!(parent, "/Travel");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn resolve_or_parent_returns_unmatched_tail() {
        let server = MockServer::start().await;
        mount_tree(&server).await;

        let resolver = make_resolver(&server).await;
        let (node, remaining) = resolver
            .resolve_or_parent("tester", "Travel/2099/Summer")
            .await
            .unwrap();
        assert_eq!(node.name, "Travel");
        assert_eq!(remaining, vec!["2099".to_string(), "Summer".to_string()]);
    }

    #[test]
    fn segments_split_on_forward_slash_only() {
        assert_eq!(
            PathResolver::split_segments("/A/B and C//D/"),
            vec!["A".to_string(), "B and C".to_string(), "D".to_string()]
        );
        assert!(PathResolver::split_segments("/").is_empty());
    }
}
