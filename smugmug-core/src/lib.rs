mod backoff;
mod client;
mod oauth;

pub use backoff::Backoff;
pub use client::{
    ApiErrorClass, AuthUser, NodeType, Pages, RemoteImage, RemoteNode, SmugClient, SmugError,
    UploadRequest, UploadedImage,
};
pub use oauth::{AccessToken, OAuth1Flow, OAuth1Signer, OAuthError, RequestToken};
