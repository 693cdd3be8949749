use std::time::Duration;

use serde_json::json;
use smugmug_core::{Backoff, NodeType, OAuth1Signer, SmugClient, UploadRequest};
use wiremock::matchers::{body_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn make_client(server: &MockServer) -> SmugClient {
    let signer = OAuth1Signer::new("key", "secret").with_token("tok", "toksec");
    SmugClient::with_base_urls(&server.uri(), &format!("{}/upload", server.uri()), signer)
        .unwrap()
        .with_backoff(Backoff::new(
            Duration::from_millis(1),
            Duration::from_millis(5),
            false,
        ))
}

fn node_json(name: &str, node_type: &str, uri: &str) -> serde_json::Value {
    json!({
        "NodeID": uri.rsplit('/').next().unwrap(),
        "Type": node_type,
        "Name": name,
        "UrlName": name,
        "Uri": uri,
        "HasChildren": node_type != "Album",
        "Uris": {
            "ChildNodes": { "Uri": format!("{uri}!children") },
        }
    })
}

#[tokio::test]
async fn authuser_sends_oauth_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2!authuser"))
        .and(header_exists("authorization"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Response": { "User": { "NickName": "tester" } }
        })))
        .mount(&server)
        .await;

    let client = make_client(&server);
    let user = client.authuser().await.unwrap();
    assert_eq!(user.nick_name, "tester");
}

#[tokio::test]
async fn get_root_follows_user_node_uri() {
    let server = MockServer::start().await;
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
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/node/root"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Response": { "Node": node_json("tester", "Folder", "/api/v2/node/root") }
        })))
        .mount(&server)
        .await;

    let client = make_client(&server);
    let root = client.get_root("tester").await.unwrap();
    assert_eq!(root.node_type, NodeType::Folder);
    assert_eq!(root.uri, "/api/v2/node/root");
}

#[tokio::test]
async fn list_children_walks_every_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/node/root!children"))
        .and(query_param("start", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Response": {
                "Node": [
                    node_json("A", "Folder", "/api/v2/node/a"),
                    node_json("B", "Album", "/api/v2/node/b"),
                ],
                "Pages": { "Total": 3, "Start": 1, "Count": 2 }
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/node/root!children"))
        .and(query_param("start", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Response": {
                "Node": [node_json("C", "Folder", "/api/v2/node/c")],
                "Pages": { "Total": 3, "Start": 3, "Count": 2 }
            }
        })))
        .mount(&server)
        .await;

    let client = make_client(&server);
    let root: smugmug_core::RemoteNode = serde_json::from_value(node_json(
        "tester",
        "Folder",
        "/api/v2/node/root",
    ))
    .unwrap();
    let children = client.list_children(&root, None).await.unwrap();
    assert_eq!(children.len(), 3);
    assert_eq!(children[2].name, "C");

    let albums = client
        .list_children(&root, Some(&[NodeType::Album]))
        .await
        .unwrap();
    assert_eq!(albums.len(), 1);
    assert_eq!(albums[0].name, "B");
}

#[tokio::test]
async fn transient_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2!authuser"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2!authuser"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Response": { "User": { "NickName": "tester" } }
        })))
        .mount(&server)
        .await;

    let client = make_client(&server);
    let user = client.authuser().await.unwrap();
    assert_eq!(user.nick_name, "tester");
}

#[tokio::test]
async fn not_found_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/node/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = make_client(&server);
    let err = client.get_node("/api/v2/node/gone").await.unwrap_err();
    assert_eq!(err.status(), Some(reqwest::StatusCode::NOT_FOUND));
}

#[tokio::test]
async fn create_node_posts_name_and_type() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/node/root!children"))
        .and(body_json(json!({
            "Name": "2015",
            "UrlName": "2015",
            "Type": "Album",
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "Response": { "Node": node_json("2015", "Album", "/api/v2/node/n2015") }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = make_client(&server);
    let root: smugmug_core::RemoteNode =
        serde_json::from_value(node_json("tester", "Folder", "/api/v2/node/root")).unwrap();
    let created = client
        .create_node(&root, "2015", NodeType::Album)
        .await
        .unwrap();
    assert_eq!(created.node_type, NodeType::Album);
}

#[tokio::test]
async fn list_album_images_reads_archived_fields() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/album/k1!images"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Response": {
                "AlbumImage": [{
                    "FileName": "a.jpg",
                    "ArchivedMD5": "5D41402ABC4B2A76B9719D911017C592",
                    "ArchivedSize": 5,
                    "Uri": "/api/v2/album/k1/image/i1-0",
                    "Uris": { "Image": { "Uri": "/api/v2/image/i1-0" } }
                }],
                "Pages": { "Total": 1, "Start": 1, "Count": 1 }
            }
        })))
        .mount(&server)
        .await;

    let client = make_client(&server);
    let images = client
        .list_album_images("/api/v2/album/k1")
        .await
        .unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].md5(), "5d41402abc4b2a76b9719d911017c592");
    assert_eq!(images[0].archived_size, 5);
    assert_eq!(images[0].image_uri(), "/api/v2/image/i1-0");
}

#[tokio::test]
async fn upload_streams_bytes_with_smug_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .and(header("X-Smug-AlbumUri", "/api/v2/album/k1"))
        .and(header("X-Smug-FileName", "a.jpg"))
        .and(header("Content-MD5", "XUFAKrxLKna5cZ2REBfFkg=="))
        .and(header("X-Smug-Version", "v2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "stat": "ok",
            "Image": {
                "ImageUri": "/api/v2/image/new-0",
                "AlbumImageUri": "/api/v2/album/k1/image/new-0"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("a.jpg");
    std::fs::write(&source, b"hello").unwrap();

    let client = make_client(&server);
    let uploaded = client
        .upload_image(UploadRequest {
            album_uri: "/api/v2/album/k1",
            file_path: &source,
            file_name: "a.jpg",
            size: 5,
            md5_hex: "5d41402abc4b2a76b9719d911017c592",
            keywords: None,
            replace_uri: None,
        })
        .await
        .unwrap();
    assert_eq!(uploaded.image_uri, "/api/v2/image/new-0");
}

#[tokio::test]
async fn replace_upload_pins_the_image_uri() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .and(header("X-Smug-ImageUri", "/api/v2/image/old-0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "stat": "ok",
            "Image": { "ImageUri": "/api/v2/image/old-0" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("a.jpg");
    std::fs::write(&source, b"hello").unwrap();

    let client = make_client(&server);
    let uploaded = client
        .upload_image(UploadRequest {
            album_uri: "/api/v2/album/k1",
            file_path: &source,
            file_name: "a.jpg",
            size: 5,
            md5_hex: "5d41402abc4b2a76b9719d911017c592",
            keywords: None,
            replace_uri: Some("/api/v2/image/old-0"),
        })
        .await
        .unwrap();
    assert_eq!(uploaded.image_uri, "/api/v2/image/old-0");
}

#[tokio::test]
async fn upload_surfaces_stat_fail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "stat": "fail",
            "message": "invalid album"
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("a.jpg");
    std::fs::write(&source, b"hello").unwrap();

    let client = make_client(&server);
    let err = client
        .upload_image(UploadRequest {
            album_uri: "/api/v2/album/k1",
            file_path: &source,
            file_name: "a.jpg",
            size: 5,
            md5_hex: "5d41402abc4b2a76b9719d911017c592",
            keywords: None,
            replace_uri: None,
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("invalid album"));
}

#[tokio::test]
async fn change_image_album_posts_move() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/album/k2!moveimages"))
        .and(body_json(json!({ "MoveUris": "/api/v2/image/i1-0" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Response": {} })))
        .expect(1)
        .mount(&server)
        .await;

    let client = make_client(&server);
    client
        .change_image_album("/api/v2/image/i1-0", "/api/v2/album/k2")
        .await
        .unwrap();
}

#[tokio::test]
async fn set_image_keywords_patches_keyword_array() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/api/v2/image/i1-0"))
        .and(body_json(json!({ "KeywordArray": ["summer", "beach"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Response": {} })))
        .expect(1)
        .mount(&server)
        .await;

    let client = make_client(&server);
    client
        .set_image_keywords(
            "/api/v2/image/i1-0",
            &["summer".to_string(), "beach".to_string()],
        )
        .await
        .unwrap();
}
