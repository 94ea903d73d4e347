//! Cloud mirror against a mock backend.

mod common;

use common::{analysis_json, pdf_bytes};
use paperlens::persist::SESSION_KEY;
use paperlens::{
    CloudClient, CloudConfig, Document, DocumentStatus, KvStore, Library, LibraryState, PaperError,
};
use futures::future::join_all;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, headers, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn cloud_config(server: &MockServer) -> CloudConfig {
    CloudConfig {
        url: server.uri(),
        anon_key: "anon-key".into(),
        enabled: true,
        last_sync: None,
    }
}

fn token(expires_in: i64) -> Value {
    json!({
        "access_token": "access-1",
        "token_type": "bearer",
        "expires_in": expires_in,
        "refresh_token": "refresh-1",
        "user": { "id": "0b7f1f6e-user", "email": "reader@example.org" }
    })
}

async fn mount_sign_in(server: &MockServer, expires_in: i64) {
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .and(header("apikey", "anon-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token(expires_in)))
        .mount(server)
        .await;
}

async fn signed_in_library(server: &MockServer) -> Library {
    mount_sign_in(server, 3600).await;
    let mut state = LibraryState::default();
    state.cloud_config = cloud_config(server);
    let library = Library::in_memory(state);
    library
        .cloud()
        .unwrap()
        .sign_in("reader@example.org", "secret")
        .await
        .unwrap();
    library
}

#[tokio::test]
async fn session_is_stored_and_resumed() {
    let server = MockServer::start().await;
    mount_sign_in(&server, 3600).await;

    let dir = tempfile::tempdir().unwrap();
    let kv = Arc::new(KvStore::open(&dir.path().join("library.db")).unwrap());
    let client = CloudClient::new(&cloud_config(&server))
        .unwrap()
        .with_session_store(kv.clone());
    let session = client.sign_in("reader@example.org", "secret").await.unwrap();
    assert_eq!(session.user.id, "0b7f1f6e-user");
    assert!(kv.get(SESSION_KEY).unwrap().is_some());

    let resumed = CloudClient::new(&cloud_config(&server))
        .unwrap()
        .with_session_store(kv.clone());
    assert_eq!(resumed.session().unwrap().access_token, "access-1");

    resumed.sign_out().await.unwrap();
    assert!(resumed.session().is_none());
    assert!(kv.get(SESSION_KEY).unwrap().is_none());
}

#[tokio::test]
async fn edits_are_mirrored_as_upserts() {
    let server = MockServer::start().await;
    let library = signed_in_library(&server).await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/papers"))
        .and(header("authorization", "Bearer access-1"))
        .and(headers("Prefer", vec!["resolution=merge-duplicates", "return=minimal"]))
        .respond_with(ResponseTemplate::new(201))
        .expect(2)
        .mount(&server)
        .await;

    let doc = Document::new("attention.pdf");
    let id = doc.id.clone();
    library.add_document(doc).await.unwrap();
    library.add_tag(&id, "to-read").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let upserts: Vec<Value> = requests
        .iter()
        .filter(|r| r.url.path() == "/rest/v1/papers")
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect();
    assert_eq!(upserts.len(), 2);
    assert_eq!(upserts[1]["id"], id.as_str());
    assert_eq!(upserts[1]["user_id"], "0b7f1f6e-user");
    assert_eq!(upserts[1]["tags"], json!(["to-read"]));
    assert_eq!(upserts[1]["status"], "IDLE");
    assert!(upserts[1].get("extracted_text").is_none());
    assert!(library.last_cloud_error().is_none());
}

#[tokio::test]
async fn mirror_failure_keeps_local_change() {
    let server = MockServer::start().await;
    let library = signed_in_library(&server).await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/papers"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "code": "42P01",
            "message": "relation \"public.papers\" does not exist"
        })))
        .mount(&server)
        .await;

    let doc = Document::new("attention.pdf");
    let id = doc.id.clone();
    library.add_document(doc).await.unwrap();
    library.set_notes(&id, "read section 3").await.unwrap();

    assert_eq!(library.document(&id).unwrap().user_notes, "read section 3");
    let shown = library.last_cloud_error().unwrap();
    assert_eq!(shown, PaperError::CloudSchemaMissing.to_string());
}

#[tokio::test]
async fn expired_session_is_refreshed_before_use() {
    let server = MockServer::start().await;
    mount_sign_in(&server, 0).await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .and(body_partial_json(json!({ "refresh_token": "refresh-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-2",
            "refresh_token": "refresh-2",
            "expires_in": 3600,
            "user": { "id": "0b7f1f6e-user" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/papers"))
        .and(header("authorization", "Bearer access-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let client = CloudClient::new(&cloud_config(&server)).unwrap();
    client.sign_in("reader@example.org", "secret").await.unwrap();
    assert!(client.fetch_documents().await.unwrap().is_empty());
    assert_eq!(client.session().unwrap().refresh_token, "refresh-2");
}

#[tokio::test]
async fn concurrent_callers_share_one_refresh() {
    let server = MockServer::start().await;
    mount_sign_in(&server, 0).await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "access_token": "access-2",
                    "refresh_token": "refresh-2",
                    "expires_in": 3600,
                    "user": { "id": "0b7f1f6e-user" }
                }))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/papers"))
        .and(header("authorization", "Bearer access-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(4)
        .mount(&server)
        .await;

    let client = CloudClient::new(&cloud_config(&server)).unwrap();
    client.sign_in("reader@example.org", "secret").await.unwrap();
    let results = join_all((0..4).map(|_| client.fetch_documents())).await;
    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(client.session().unwrap().access_token, "access-2");
}

#[tokio::test]
async fn signed_out_requests_are_rejected_locally() {
    let server = MockServer::start().await;
    let client = CloudClient::new(&cloud_config(&server)).unwrap();
    let err = client.fetch_documents().await.unwrap_err();
    assert!(matches!(err, PaperError::CloudNotAuthenticated));
    assert!(err.is_cloud());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn refresh_merges_cloud_rows() {
    let server = MockServer::start().await;
    let library = signed_in_library(&server).await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/papers"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let mut local = Document::from_file("attention.pdf", pdf_bytes());
    local.extracted_text = Some("We propose the Transformer.".into());
    let id = local.id.clone();
    library.add_document(local).await.unwrap();
    let collection = library.update(|s| s.create_collection("Reading group")).unwrap();
    library
        .update(|s| s.add_to_collection(&id, &collection.id))
        .unwrap()
        .unwrap();

    Mock::given(method("GET"))
        .and(path("/rest/v1/papers"))
        .and(query_param("order", "created_at.desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": "remote-only",
                "user_id": "0b7f1f6e-user",
                "title": "BERT",
                "original_title": "bert.pdf",
                "status": "COMPLETED",
                "tags": ["NLP"],
                "is_favorite": false,
                "user_notes": "",
                "created_at": "2024-01-02T03:04:05Z"
            },
            {
                "id": id,
                "user_id": "0b7f1f6e-user",
                "title": "Attention Is All You Need",
                "original_title": "attention.pdf",
                "analysis": analysis_json(),
                "status": "COMPLETED",
                "tags": ["NLP", "Transformer"],
                "is_favorite": true,
                "user_notes": "seminal",
                "created_at": "2024-01-01T00:00:00Z"
            }
        ])))
        .mount(&server)
        .await;

    assert_eq!(library.refresh_from_cloud().await.unwrap(), 2);

    let docs = library.read(|s| s.documents.clone());
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].id, "remote-only");
    let merged = &docs[1];
    assert_eq!(merged.status, DocumentStatus::Complete);
    assert!(merged.is_favorite);
    assert_eq!(merged.user_notes, "seminal");
    assert_eq!(merged.extracted_text.as_deref(), Some("We propose the Transformer."));
    assert!(merged.file_data.is_some());
    assert!(merged.in_collection(&collection.id));
    assert!(library.read(|s| s.cloud_config.last_sync.is_some()));
}

#[tokio::test]
async fn delete_removes_row_and_stored_pdf() {
    let server = MockServer::start().await;
    let library = signed_in_library(&server).await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/papers"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/papers"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/storage/v1/object/papers"))
        .and(body_partial_json(json!({ "prefixes": ["0b7f1f6e-user/1_abc.pdf"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let mut doc = Document::new("attention.pdf");
    doc.storage_path = Some("0b7f1f6e-user/1_abc.pdf".into());
    let id = doc.id.clone();
    library.add_document(doc).await.unwrap();
    library.delete_document(&id).await.unwrap();

    assert!(library.document(&id).is_none());
    let requests = server.received_requests().await.unwrap();
    let delete = requests
        .iter()
        .find(|r| r.method.as_str() == "DELETE" && r.url.path() == "/rest/v1/papers")
        .unwrap();
    assert_eq!(delete.url.query(), Some(format!("id=eq.{id}").as_str()));
}

#[tokio::test]
async fn upload_uses_user_folder() {
    let server = MockServer::start().await;
    let library = signed_in_library(&server).await;
    Mock::given(method("POST"))
        .and(header("content-type", "application/pdf"))
        .and(header("x-upsert", "false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Key": "papers/x" })))
        .expect(1)
        .mount(&server)
        .await;

    let stored = library.upload_pdf("attention.pdf", pdf_bytes()).await.unwrap().unwrap();
    assert!(stored.starts_with("0b7f1f6e-user/"));
    assert!(stored.ends_with(".pdf"));

    let requests = server.received_requests().await.unwrap();
    let upload = requests.iter().find(|r| r.body == pdf_bytes()).unwrap();
    assert_eq!(upload.url.path(), format!("/storage/v1/object/papers/{stored}"));
}
