use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use thiserror::Error;
use url::Url;

const DEFAULT_OAUTH_ORIGIN: &str = "https://secure.smugmug.com";
const REQUEST_TOKEN_PATH: &str = "/services/oauth/1.0a/getRequestToken";
const ACCESS_TOKEN_PATH: &str = "/services/oauth/1.0a/getAccessToken";
const AUTHORIZE_PATH: &str = "/services/oauth/1.0a/authorize";

// RFC 3986 unreserved characters; everything else is percent-encoded.
const OAUTH_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

type HmacSha1 = Hmac<Sha1>;

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("oauth endpoint returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("oauth response is missing the {0} field")]
    MissingField(&'static str),
}

/// Signs individual requests with an OAuth1 HMAC-SHA1 signature (RFC 5849).
#[derive(Debug, Clone)]
pub struct OAuth1Signer {
    consumer_key: String,
    consumer_secret: String,
    token: Option<String>,
    token_secret: Option<String>,
}

impl OAuth1Signer {
    pub fn new(consumer_key: impl Into<String>, consumer_secret: impl Into<String>) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            token: None,
            token_secret: None,
        }
    }

    pub fn with_token(
        mut self,
        token: impl Into<String>,
        token_secret: impl Into<String>,
    ) -> Self {
        self.token = Some(token.into());
        self.token_secret = Some(token_secret.into());
        self
    }

    /// Builds the `Authorization` header value for a request.
    ///
    /// Only the URL query participates in the signature; request bodies are
    /// either JSON or raw image bytes, neither of which RFC 5849 signs.
    pub fn authorization_header(&self, method: &str, url: &Url, extra: &[(&str, &str)]) -> String {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let nonce = nonce();
        self.authorization_header_at(method, url, extra, timestamp, &nonce)
    }

    /// Deterministic variant used by tests; `extra` carries protocol
    /// parameters such as `oauth_callback` or `oauth_verifier`.
    pub fn authorization_header_at(
        &self,
        method: &str,
        url: &Url,
        extra: &[(&str, &str)],
        timestamp: u64,
        nonce: &str,
    ) -> String {
        let timestamp = timestamp.to_string();
        let mut oauth_params: Vec<(String, String)> = vec![
            ("oauth_consumer_key".into(), self.consumer_key.clone()),
            ("oauth_nonce".into(), nonce.to_string()),
            ("oauth_signature_method".into(), "HMAC-SHA1".into()),
            ("oauth_timestamp".into(), timestamp),
        ];
        if let Some(token) = &self.token {
            oauth_params.push(("oauth_token".into(), token.clone()));
        }
        for (key, value) in extra {
            oauth_params.push((key.to_string(), value.to_string()));
        }

        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (enc(&k), enc(&v)))
            .collect();
        pairs.extend(oauth_params.iter().map(|(k, v)| (enc(k), enc(v))));
        pairs.sort();
        let normalized = pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        let base = format!(
            "{}&{}&{}",
            method.to_ascii_uppercase(),
            enc(&base_url(url)),
            enc(&normalized)
        );
        let key = format!(
            "{}&{}",
            enc(&self.consumer_secret),
            enc(self.token_secret.as_deref().unwrap_or(""))
        );
        let mut mac =
            HmacSha1::new_from_slice(key.as_bytes()).expect("hmac accepts keys of any length");
        mac.update(base.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());

        oauth_params.push(("oauth_signature".into(), signature));
        oauth_params.sort();
        let fields = oauth_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", enc(k), enc(v)))
            .collect::<Vec<_>>()
            .join(", ");
        format!("OAuth {fields}")
    }
}

/// Three-legged OAuth1 flow against the SmugMug secure origin, using the
/// out-of-band callback: the user opens the authorize URL in a browser and
/// pastes the verifier code back into the CLI.
#[derive(Clone)]
pub struct OAuth1Flow {
    http: Client,
    origin: Url,
    consumer_key: String,
    consumer_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestToken {
    pub token: String,
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub token: String,
    pub secret: String,
}

impl OAuth1Flow {
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
    ) -> Result<Self, OAuthError> {
        Self::with_origin(DEFAULT_OAUTH_ORIGIN, consumer_key, consumer_secret)
    }

    pub fn with_origin(
        origin: &str,
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
    ) -> Result<Self, OAuthError> {
        Ok(Self {
            http: Client::new(),
            origin: Url::parse(origin)?,
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
        })
    }

    pub async fn request_token(&self) -> Result<RequestToken, OAuthError> {
        let url = self.origin.join(REQUEST_TOKEN_PATH)?;
        let signer = OAuth1Signer::new(&self.consumer_key, &self.consumer_secret);
        let auth = signer.authorization_header("POST", &url, &[("oauth_callback", "oob")]);
        let body = self.send(url, auth).await?;
        Ok(RequestToken {
            token: form_field(&body, "oauth_token")
                .ok_or(OAuthError::MissingField("oauth_token"))?,
            secret: form_field(&body, "oauth_token_secret")
                .ok_or(OAuthError::MissingField("oauth_token_secret"))?,
        })
    }

    pub fn authorize_url(&self, request: &RequestToken) -> Result<Url, OAuthError> {
        let mut url = self.origin.join(AUTHORIZE_PATH)?;
        url.query_pairs_mut()
            .append_pair("oauth_token", &request.token)
            .append_pair("Access", "Full")
            .append_pair("Permissions", "Modify");
        Ok(url)
    }

    pub async fn access_token(
        &self,
        request: &RequestToken,
        verifier: &str,
    ) -> Result<AccessToken, OAuthError> {
        let url = self.origin.join(ACCESS_TOKEN_PATH)?;
        let signer = OAuth1Signer::new(&self.consumer_key, &self.consumer_secret)
            .with_token(&request.token, &request.secret);
        let auth = signer.authorization_header("POST", &url, &[("oauth_verifier", verifier)]);
        let body = self.send(url, auth).await?;
        Ok(AccessToken {
            token: form_field(&body, "oauth_token")
                .ok_or(OAuthError::MissingField("oauth_token"))?,
            secret: form_field(&body, "oauth_token_secret")
                .ok_or(OAuthError::MissingField("oauth_token_secret"))?,
        })
    }

    async fn send(&self, url: Url, auth: String) -> Result<String, OAuthError> {
        let response = self
            .http
            .post(url)
            .header("Authorization", auth)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(response.text().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(OAuthError::Api { status, body })
        }
    }
}

fn enc(value: &str) -> String {
    utf8_percent_encode(value, OAUTH_ENCODE).to_string()
}

fn base_url(url: &Url) -> String {
    let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();
    format!(
        "{}://{}{}{}",
        url.scheme(),
        url.host_str().unwrap_or_default(),
        port,
        url.path()
    )
}

fn nonce() -> String {
    let mut rng = rand::thread_rng();
    (0..16)
        .map(|_| {
            let chars = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
            chars[rng.gen_range(0..chars.len())] as char
        })
        .collect()
}

fn form_field(body: &str, name: &str) -> Option<String> {
    url::form_urlencoded::parse(body.as_bytes())
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}
