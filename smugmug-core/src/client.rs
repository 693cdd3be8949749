use std::path::Path;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::io::ReaderStream;
use url::Url;

use crate::backoff::Backoff;
use crate::oauth::OAuth1Signer;

const DEFAULT_API_URL: &str = "https://api.smugmug.com";
const DEFAULT_UPLOAD_URL: &str = "https://upload.smugmug.com/";
const PAGE_SIZE: u32 = 100;
const MAX_ATTEMPTS: u32 = 6;

#[derive(Debug, Error)]
pub enum SmugError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("malformed api response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("node \"{0}\" exposes no album uri")]
    MissingAlbumUri(String),
    #[error("user \"{0}\" exposes no root node")]
    MissingRootNode(String),
    #[error("upload rejected: {0}")]
    UploadRejected(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid md5 hex digest: {0}")]
    InvalidMd5(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

impl SmugError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            SmugError::Api { status, .. } => Some(classify_api_status(*status)),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            SmugError::Request(err) => err.is_timeout() || err.is_connect(),
            _ => matches!(
                self.classification(),
                Some(ApiErrorClass::RateLimit | ApiErrorClass::Transient)
            ),
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            SmugError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

/// Typed client for the SmugMug API v2 node tree and image upload host.
///
/// Every request is OAuth1-signed and transparently retried on transport
/// errors, 5xx and 429 with exponential backoff.
#[derive(Clone)]
pub struct SmugClient {
    http: Client,
    api_url: Url,
    upload_url: Url,
    signer: OAuth1Signer,
    backoff: Backoff,
    verbose: bool,
}

impl SmugClient {
    pub fn new(signer: OAuth1Signer) -> Result<Self, SmugError> {
        Self::with_base_urls(DEFAULT_API_URL, DEFAULT_UPLOAD_URL, signer)
    }

    pub fn with_base_urls(
        api_url: &str,
        upload_url: &str,
        signer: OAuth1Signer,
    ) -> Result<Self, SmugError> {
        Ok(Self {
            http: Client::new(),
            api_url: Url::parse(api_url)?,
            upload_url: Url::parse(upload_url)?,
            signer,
            backoff: Backoff::new(Duration::from_secs(1), Duration::from_secs(60), true),
            verbose: false,
        })
    }

    pub fn verbose(mut self, on: bool) -> Self {
        self.verbose = on;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub async fn authuser(&self) -> Result<AuthUser, SmugError> {
        let url = self.endpoint("/api/v2!authuser")?;
        let envelope: Envelope<UserResponse> = self.request_json(Method::GET, url, None).await?;
        Ok(envelope.response.user)
    }

    pub async fn get_root(&self, user: &str) -> Result<RemoteNode, SmugError> {
        let url = self.endpoint(&format!("/api/v2/user/{user}"))?;
        let envelope: Envelope<UserResponse> = self.request_json(Method::GET, url, None).await?;
        let node_uri = envelope
            .response
            .user
            .uris
            .node
            .map(|r| r.uri)
            .ok_or_else(|| SmugError::MissingRootNode(user.to_string()))?;
        self.get_node(&node_uri).await
    }

    pub async fn get_node(&self, node_uri: &str) -> Result<RemoteNode, SmugError> {
        let url = self.endpoint(node_uri)?;
        let envelope: Envelope<NodeResponse> = self.request_json(Method::GET, url, None).await?;
        Ok(envelope.response.node)
    }

    /// Lists every child of a node, walking `start`/`count` pages until the
    /// reported total is consumed.
    pub async fn list_children(
        &self,
        node: &RemoteNode,
        filter: Option<&[NodeType]>,
    ) -> Result<Vec<RemoteNode>, SmugError> {
        let children_uri = node.children_uri();
        let mut nodes: Vec<RemoteNode> = Vec::new();
        loop {
            let mut url = self.endpoint(&children_uri)?;
            url.query_pairs_mut()
                .append_pair("start", &(nodes.len() as u32 + 1).to_string())
                .append_pair("count", &PAGE_SIZE.to_string());
            let page: Envelope<ChildrenResponse> =
                self.request_json(Method::GET, url, None).await?;
            let fetched = page.response.nodes.len();
            nodes.extend(page.response.nodes);
            let total = page
                .response
                .pages
                .map(|p| p.total as usize)
                .unwrap_or(nodes.len());
            if fetched == 0 || nodes.len() >= total {
                break;
            }
        }
        if let Some(filter) = filter {
            nodes.retain(|node| filter.contains(&node.node_type));
        }
        Ok(nodes)
    }

    pub async fn create_node(
        &self,
        parent: &RemoteNode,
        name: &str,
        node_type: NodeType,
    ) -> Result<RemoteNode, SmugError> {
        let url = self.endpoint(&parent.children_uri())?;
        let body = serde_json::json!({
            "Name": name,
            "UrlName": url_name_for(name),
            "Type": node_type.as_str(),
        });
        let envelope: Envelope<NodeResponse> =
            self.request_json(Method::POST, url, Some(&body)).await?;
        Ok(envelope.response.node)
    }

    pub async fn delete_node(&self, node_uri: &str) -> Result<(), SmugError> {
        let url = self.endpoint(node_uri)?;
        self.request_raw(Method::DELETE, url, None).await?;
        Ok(())
    }

    /// Lists every image of an album, including `ArchivedMD5` and
    /// `ArchivedSize`, walking pagination like [`Self::list_children`].
    pub async fn list_album_images(&self, album_uri: &str) -> Result<Vec<RemoteImage>, SmugError> {
        let images_uri = format!("{}!images", album_uri.trim_end_matches('/'));
        let mut images: Vec<RemoteImage> = Vec::new();
        loop {
            let mut url = self.endpoint(&images_uri)?;
            url.query_pairs_mut()
                .append_pair("start", &(images.len() as u32 + 1).to_string())
                .append_pair("count", &PAGE_SIZE.to_string());
            let page: Envelope<AlbumImagesResponse> =
                self.request_json(Method::GET, url, None).await?;
            let fetched = page.response.images.len();
            images.extend(page.response.images);
            let total = page
                .response
                .pages
                .map(|p| p.total as usize)
                .unwrap_or(images.len());
            if fetched == 0 || images.len() >= total {
                break;
            }
        }
        Ok(images)
    }

    /// Uploads image bytes into an album, streaming the file from disk.
    ///
    /// With `replace_uri` set, the server keeps that image URI and replaces
    /// the bytes behind it. Payload-too-large responses are never retried.
    pub async fn upload_image(
        &self,
        request: UploadRequest<'_>,
    ) -> Result<UploadedImage, SmugError> {
        let md5_bytes = hex_to_bytes(request.md5_hex)
            .ok_or_else(|| SmugError::InvalidMd5(request.md5_hex.to_string()))?;
        let content_md5 = BASE64.encode(md5_bytes);

        let mut attempt = 0u32;
        loop {
            let auth =
                self.signer
                    .authorization_header(Method::POST.as_str(), &self.upload_url, &[]);
            let file = tokio::fs::File::open(request.file_path).await?;
            let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
            let mut req = self
                .http
                .post(self.upload_url.clone())
                .header("Authorization", auth)
                .header("Content-Length", request.size.to_string())
                .header("Content-MD5", &content_md5)
                .header("X-Smug-AlbumUri", request.album_uri)
                .header("X-Smug-FileName", request.file_name)
                .header("X-Smug-ResponseType", "JSON")
                .header("X-Smug-Version", "v2")
                .body(body);
            if let Some(keywords) = request.keywords {
                req = req.header("X-Smug-Keywords", keywords);
            }
            if let Some(replace_uri) = request.replace_uri {
                req = req.header("X-Smug-ImageUri", replace_uri);
            }

            let outcome: Result<UploadedImage, SmugError> = match req.send().await {
                Ok(response) => {
                    let status = response.status();
                    self.log(Method::POST.as_str(), self.upload_url.as_str(), &format!("{status}"));
                    if status.is_success() {
                        let parsed: UploadResponse = response.json().await?;
                        if parsed.stat != "ok" {
                            return Err(SmugError::UploadRejected(
                                parsed.message.unwrap_or_else(|| parsed.stat.clone()),
                            ));
                        }
                        return parsed.image.ok_or(SmugError::UploadRejected(
                            "response carried no image record".to_string(),
                        ));
                    }
                    let body = response.text().await.unwrap_or_default();
                    Err(SmugError::Api { status, body })
                }
                Err(err) => Err(SmugError::Request(err)),
            };

            match outcome {
                Err(err) if err.is_retryable() && attempt + 1 < MAX_ATTEMPTS => {
                    tokio::time::sleep(self.backoff.delay(attempt)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
                Ok(_) => unreachable!("success returns above"),
            }
        }
    }

    pub async fn change_image_album(
        &self,
        image_uri: &str,
        new_album_uri: &str,
    ) -> Result<(), SmugError> {
        let url = self.endpoint(&format!("{}!moveimages", new_album_uri.trim_end_matches('/')))?;
        let body = serde_json::json!({ "MoveUris": image_uri });
        self.request_raw(Method::POST, url, Some(&body)).await?;
        Ok(())
    }

    pub async fn set_image_keywords(
        &self,
        image_uri: &str,
        keywords: &[String],
    ) -> Result<(), SmugError> {
        let url = self.endpoint(image_uri)?;
        let body = serde_json::json!({ "KeywordArray": keywords });
        self.request_raw(Method::PATCH, url, Some(&body)).await?;
        Ok(())
    }

    pub async fn delete_image(&self, image_uri: &str) -> Result<(), SmugError> {
        let url = self.endpoint(image_uri)?;
        self.request_raw(Method::DELETE, url, None).await?;
        Ok(())
    }

    /// Raw GET used by `ls` detail and query output.
    pub async fn get_json(&self, path: &str) -> Result<serde_json::Value, SmugError> {
        let url = self.endpoint(path)?;
        self.request_json(Method::GET, url, None).await
    }

    fn endpoint(&self, path: &str) -> Result<Url, SmugError> {
        Ok(self.api_url.join(path)?)
    }

    fn log(&self, method: &str, url: &str, outcome: &str) {
        if self.verbose {
            eprintln!("[smugcli] {method} {url} -> {outcome}");
        }
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
    ) -> Result<T, SmugError> {
        let text = self.request_raw(method, url, body).await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn request_raw(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
    ) -> Result<String, SmugError> {
        let mut attempt = 0u32;
        loop {
            let auth = self.signer.authorization_header(method.as_str(), &url, &[]);
            let mut req = self
                .http
                .request(method.clone(), url.clone())
                .header("Authorization", auth)
                .header("Accept", "application/json");
            if let Some(body) = body {
                req = req.json(body);
            }

            let outcome: Result<String, SmugError> = match req.send().await {
                Ok(response) => {
                    let status = response.status();
                    self.log(method.as_str(), url.as_str(), &format!("{status}"));
                    if status.is_success() {
                        return Ok(response.text().await?);
                    }
                    let body = response.text().await.unwrap_or_default();
                    Err(SmugError::Api { status, body })
                }
                Err(err) => {
                    self.log(method.as_str(), url.as_str(), &format!("{err}"));
                    Err(SmugError::Request(err))
                }
            };

            match outcome {
                Err(err) if err.is_retryable() && attempt + 1 < MAX_ATTEMPTS => {
                    tokio::time::sleep(self.backoff.delay(attempt)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
                Ok(_) => unreachable!("success returns above"),
            }
        }
    }
}

/// Upload parameters; the body is streamed from `file_path` on every
/// attempt so retries never replay a half-consumed stream.
#[derive(Debug, Clone, Copy)]
pub struct UploadRequest<'a> {
    pub album_uri: &'a str,
    pub file_path: &'a Path,
    pub file_name: &'a str,
    pub size: u64,
    pub md5_hex: &'a str,
    pub keywords: Option<&'a str>,
    pub replace_uri: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
    Folder,
    Album,
    Page,
    #[serde(rename = "System Album", alias = "SystemAlbum")]
    SystemAlbum,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Folder => "Folder",
            NodeType::Album => "Album",
            NodeType::Page => "Page",
            NodeType::SystemAlbum => "System Album",
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UriRef {
    #[serde(rename = "Uri")]
    pub uri: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NodeUris {
    #[serde(rename = "Album")]
    pub album: Option<UriRef>,
    #[serde(rename = "ChildNodes")]
    pub child_nodes: Option<UriRef>,
    #[serde(rename = "ParentNode")]
    pub parent_node: Option<UriRef>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteNode {
    #[serde(rename = "NodeID", default)]
    pub node_id: String,
    #[serde(rename = "Type")]
    pub node_type: NodeType,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "UrlName", default)]
    pub url_name: String,
    #[serde(rename = "Uri")]
    pub uri: String,
    #[serde(rename = "HasChildren", default)]
    pub has_children: bool,
    #[serde(rename = "Uris", default)]
    pub uris: NodeUris,
}

impl RemoteNode {
    pub fn album_uri(&self) -> Option<&str> {
        self.uris.album.as_ref().map(|r| r.uri.as_str())
    }

    pub fn children_uri(&self) -> String {
        self.uris
            .child_nodes
            .as_ref()
            .map(|r| r.uri.clone())
            .unwrap_or_else(|| format!("{}!children", self.uri))
    }

    pub fn parent_uri(&self) -> Option<&str> {
        self.uris.parent_node.as_ref().map(|r| r.uri.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ImageUris {
    #[serde(rename = "Image")]
    pub image: Option<UriRef>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteImage {
    #[serde(rename = "FileName")]
    pub file_name: String,
    #[serde(rename = "ArchivedMD5", default)]
    pub archived_md5: String,
    #[serde(rename = "ArchivedSize", default)]
    pub archived_size: u64,
    #[serde(rename = "Caption", default)]
    pub caption: Option<String>,
    #[serde(rename = "Keywords", default)]
    pub keywords: Option<String>,
    #[serde(rename = "Uri")]
    pub uri: String,
    #[serde(rename = "Uris", default)]
    pub uris: ImageUris,
}

impl RemoteImage {
    /// Stable image URI, preserved across replacements; the record-level
    /// `Uri` is the album-image URI and changes when the image moves.
    pub fn image_uri(&self) -> &str {
        self.uris
            .image
            .as_ref()
            .map(|r| r.uri.as_str())
            .unwrap_or(&self.uri)
    }

    pub fn md5(&self) -> String {
        self.archived_md5.to_ascii_lowercase()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthUser {
    #[serde(rename = "NickName")]
    pub nick_name: String,
    #[serde(rename = "Uris", default)]
    pub uris: UserUris,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UserUris {
    #[serde(rename = "Node")]
    pub node: Option<UriRef>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Pages {
    #[serde(rename = "Total", default)]
    pub total: u32,
    #[serde(rename = "Start", default)]
    pub start: u32,
    #[serde(rename = "Count", default)]
    pub count: u32,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(rename = "Response")]
    response: T,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    #[serde(rename = "User")]
    user: AuthUser,
}

#[derive(Debug, Deserialize)]
struct NodeResponse {
    #[serde(rename = "Node")]
    node: RemoteNode,
}

#[derive(Debug, Deserialize)]
struct ChildrenResponse {
    #[serde(rename = "Node", default)]
    nodes: Vec<RemoteNode>,
    #[serde(rename = "Pages")]
    pages: Option<Pages>,
}

#[derive(Debug, Deserialize)]
struct AlbumImagesResponse {
    #[serde(rename = "AlbumImage", default)]
    images: Vec<RemoteImage>,
    #[serde(rename = "Pages")]
    pages: Option<Pages>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    stat: String,
    message: Option<String>,
    #[serde(rename = "Image")]
    image: Option<UploadedImage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadedImage {
    #[serde(rename = "ImageUri")]
    pub image_uri: String,
    #[serde(rename = "AlbumImageUri", default)]
    pub album_image_uri: Option<String>,
    #[serde(rename = "URL", default)]
    pub url: Option<String>,
}

fn url_name_for(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_dash = true;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    let trimmed = out.trim_end_matches('-');
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

fn hex_to_bytes(hex: &str) -> Option<[u8; 16]> {
    if hex.len() != 32 {
        return None;
    }
    let mut out = [0u8; 16];
    for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
        let pair = std::str::from_utf8(chunk).ok()?;
        out[i] = u8::from_str_radix(pair, 16).ok()?;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_name_capitalizes_and_dashes() {
        assert_eq!(url_name_for("2015 summer trip"), "2015-summer-trip");
        assert_eq!(url_name_for("photos"), "Photos");
        assert_eq!(url_name_for("a  b!"), "A-b");
    }

    #[test]
    fn hex_digest_round_trips_to_bytes() {
        let digest = hex_to_bytes("d41d8cd98f00b204e9800998ecf8427e").unwrap();
        assert_eq!(digest[0], 0xd4);
        assert_eq!(digest[15], 0x7e);
        assert!(hex_to_bytes("abc").is_none());
        assert!(hex_to_bytes("zz1d8cd98f00b204e9800998ecf8427e").is_none());
    }

    #[test]
    fn node_type_parses_api_strings() {
        let folder: NodeType = serde_json::from_str("\"Folder\"").unwrap();
        assert_eq!(folder, NodeType::Folder);
        let system: NodeType = serde_json::from_str("\"System Album\"").unwrap();
        assert_eq!(system, NodeType::SystemAlbum);
    }

    #[test]
    fn image_uri_prefers_stable_uri() {
        let image = RemoteImage {
            file_name: "a.jpg".into(),
            archived_md5: "ABCD".into(),
            archived_size: 1,
            caption: None,
            keywords: None,
            uri: "/api/v2/album/k/image/XYZ-0".into(),
            uris: ImageUris {
                image: Some(UriRef {
                    uri: "/api/v2/image/XYZ-0".into(),
                }),
            },
        };
        assert_eq!(image.image_uri(), "/api/v2/image/XYZ-0");
        assert_eq!(image.md5(), "abcd");
    }
}
