//! Integration tests for the document upload + job polling API.
//!
//! Each test spins up the Axum server on a random port with a started
//! `JobService`, uploads real PDFs over HTTP with reqwest, and polls the
//! job endpoint until the worker reaches a terminal state.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lopdf::{Document, Object, Stream, dictionary};
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::time::timeout;

use orgscan::config::{DirectoryConfig, ServiceConfig};
use orgscan::directory::{Directory, GitHubDirectory};
use orgscan::error::LookupError;
use orgscan::extract::{PatternExtractor, PdfTextExtractor};
use orgscan::jobs::{JobService, Pipeline, job_routes};
use orgscan::store::LibSqlJobStore;
use orgscan::uploads::UploadStore;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Stub directory: records lookups in order.
///
/// `offline` fails like a network error, `boom` panics, `acme-corp` has two
/// members, everything else is unknown.
#[derive(Default)]
struct StubDirectory {
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl Directory for StubDirectory {
    async fn list_members(&self, identifier: &str) -> Result<Vec<String>, LookupError> {
        self.calls.lock().unwrap().push(identifier.to_string());
        match identifier {
            "acme-corp" => Ok(vec!["alice".into(), "bob".into()]),
            "offline" => Err(LookupError::Request {
                identifier: identifier.into(),
                reason: "connection refused".into(),
            }),
            "boom" => panic!("directory exploded"),
            _ => Ok(vec![]),
        }
    }
}

struct TestServer {
    base: String,
    service: Arc<JobService>,
    uploads: UploadStore,
    client: reqwest::Client,
    _tmp: tempfile::TempDir,
}

/// Start an Axum server on a random port backed by the given directory.
async fn start_server(directory: Arc<dyn Directory>) -> TestServer {
    let tmp = tempfile::tempdir().unwrap();
    let config = ServiceConfig {
        poll_interval: Duration::from_millis(20),
        max_upload_bytes: 1024 * 1024,
        ..ServiceConfig::default()
    };
    let store = Arc::new(LibSqlJobStore::new_local(&tmp.path().join("jobs.db")).await.unwrap());
    let uploads = UploadStore::new(tmp.path().join("uploads")).unwrap();
    let pipeline = Pipeline {
        text: Arc::new(PdfTextExtractor::new()),
        patterns: Arc::new(PatternExtractor::github().unwrap()),
        directory,
    };
    let service = Arc::new(JobService::new(&config, store, uploads.clone(), pipeline));
    service.start().await.unwrap();

    let app = job_routes(Arc::clone(&service), config.max_upload_bytes);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base: format!("http://127.0.0.1:{port}"),
        service,
        uploads,
        client: reqwest::Client::new(),
        _tmp: tmp,
    }
}

/// Build a one-page PDF showing each line of text.
fn make_pdf(lines: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut content = String::from("BT /F1 10 Tf 50 742 Td 12 TL");
    for line in lines {
        content.push_str(&format!(" ({line}) Tj T*"));
    }
    content.push_str(" ET");
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Resources" => resources_id,
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

impl TestServer {
    async fn upload(&self, filename: &str, bytes: Vec<u8>) -> reqwest::Response {
        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("application/pdf")
            .unwrap();
        self.client
            .post(format!("{}/api/documents/upload", self.base))
            .multipart(Form::new().part("file", part))
            .send()
            .await
            .unwrap()
    }

    /// Upload a PDF and return its job id.
    async fn submit(&self, lines: &[&str]) -> String {
        let resp = self.upload("document.pdf", make_pdf(lines)).await;
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "queued");
        body["job_id"].as_str().unwrap().to_string()
    }

    async fn job(&self, job_id: &str) -> reqwest::Response {
        self.client
            .get(format!("{}/api/jobs/{job_id}", self.base))
            .send()
            .await
            .unwrap()
    }

    /// Poll until the job is completed or failed.
    async fn wait_terminal(&self, job_id: &str) -> Value {
        loop {
            let view: Value = self.job(job_id).await.json().await.unwrap();
            if view["status"] == "completed" || view["status"] == "failed" {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    async fn queue_status(&self) -> Value {
        self.client
            .get(format!("{}/api/queue/status", self.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    fn stored_uploads(&self) -> usize {
        std::fs::read_dir(self.uploads.dir()).unwrap().count()
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn pdf_upload_resolves_organization_members() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(Arc::new(StubDirectory::default())).await;
        let job_id = server
            .submit(&["Acme Corp pitch deck", "Code: github.com/acme-corp/platform"])
            .await;

        let view = server.wait_terminal(&job_id).await;
        assert_eq!(view["status"], "completed");
        assert_eq!(view["job_id"], job_id.as_str());
        assert_eq!(view["original_filename"], "document.pdf");
        assert_eq!(view["extracted_company_username"], "acme-corp");
        assert_eq!(view["github_members"], serde_json::json!(["alice", "bob"]));
        assert!(view["error"].is_null());
        assert_eq!(view["message"], "Job completed successfully");
        assert_eq!(server.stored_uploads(), 0);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn non_pdf_upload_is_rejected_without_record() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(Arc::new(StubDirectory::default())).await;
        let resp = server.upload("notes.txt", b"github.com/acme-corp/".to_vec()).await;
        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert!(body["detail"].as_str().unwrap().contains(".pdf"));

        let stats = server.queue_status().await;
        assert_eq!(stats["total_jobs"], 0);
        assert_eq!(server.stored_uploads(), 0);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn uppercase_extension_is_accepted() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(Arc::new(StubDirectory::default())).await;
        let resp = server
            .upload("REPORT.PDF", make_pdf(&["github.com/acme-corp/"]))
            .await;
        assert_eq!(resp.status(), 200);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn document_without_identifier_completes_empty() {
    timeout(TEST_TIMEOUT, async {
        let directory = Arc::new(StubDirectory::default());
        let server = start_server(directory.clone()).await;
        let job_id = server.submit(&["visit https://github.com"]).await;

        let view = server.wait_terminal(&job_id).await;
        assert_eq!(view["status"], "completed");
        assert!(view["extracted_company_username"].is_null());
        assert!(view["github_members"].is_null());
        assert!(directory.calls.lock().unwrap().is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unknown_organization_completes_with_no_members() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(Arc::new(StubDirectory::default())).await;
        let job_id = server.submit(&["GitHub organization: ghost-org"]).await;

        let view = server.wait_terminal(&job_id).await;
        assert_eq!(view["status"], "completed");
        assert_eq!(view["extracted_company_username"], "ghost-org");
        assert_eq!(view["github_members"], serde_json::json!([]));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn lookup_failure_marks_job_failed() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(Arc::new(StubDirectory::default())).await;
        let job_id = server.submit(&["Find us at github.com/offline/"]).await;

        let view = server.wait_terminal(&job_id).await;
        assert_eq!(view["status"], "failed");
        assert_eq!(view["extracted_company_username"], "offline");
        assert!(view["github_members"].is_null());
        assert!(view["error"].as_str().unwrap().contains("connection refused"));
        assert_eq!(view["message"], "Job processing failed");
        assert_eq!(server.stored_uploads(), 0);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unreadable_pdf_marks_job_failed() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(Arc::new(StubDirectory::default())).await;
        let resp = server.upload("broken.pdf", b"%PDF-1.5 garbage".to_vec()).await;
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();

        let view = server.wait_terminal(body["job_id"].as_str().unwrap()).await;
        assert_eq!(view["status"], "failed");
        assert!(view["extracted_company_username"].is_null());
        assert_eq!(server.stored_uploads(), 0);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn jobs_are_processed_in_submission_order() {
    timeout(TEST_TIMEOUT, async {
        let directory = Arc::new(StubDirectory::default());
        let server = start_server(directory.clone()).await;

        let mut ids = Vec::new();
        for org in ["first-org", "second-org", "third-org"] {
            let line = format!("github.com/{org}/");
            ids.push(server.submit(&[line.as_str()]).await);
        }
        for id in &ids {
            server.wait_terminal(id).await;
        }

        assert_eq!(
            *directory.calls.lock().unwrap(),
            vec!["first-org", "second-org", "third-org"]
        );
        let stats = server.queue_status().await;
        assert_eq!(stats["worker_running"], true);
        assert_eq!(stats["queue_size"], 0);
        assert_eq!(stats["job_statistics"]["completed"], 3);
        assert_eq!(stats["total_jobs"], 3);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn panicking_lookup_fails_only_its_job() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(Arc::new(StubDirectory::default())).await;
        let bad = server.submit(&["github.com/boom/"]).await;
        let good = server.submit(&["github.com/acme-corp/"]).await;

        let bad_view = server.wait_terminal(&bad).await;
        assert_eq!(bad_view["status"], "failed");
        assert!(bad_view["error"].as_str().unwrap().contains("directory exploded"));

        let good_view = server.wait_terminal(&good).await;
        assert_eq!(good_view["status"], "completed");
        assert_eq!(good_view["github_members"], serde_json::json!(["alice", "bob"]));
        assert_eq!(server.stored_uploads(), 0);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(Arc::new(StubDirectory::default())).await;
        server.submit(&["github.com/acme-corp/"]).await;

        let resp = server.job(&uuid::Uuid::new_v4().to_string()).await;
        assert_eq!(resp.status(), 404);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["detail"], "Job not found");

        assert_eq!(server.job("not-a-job").await.status(), 404);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn github_client_end_to_end() {
    use axum::extract::Path;
    use axum::routing::get;

    timeout(TEST_TIMEOUT, async {
        // Local stand-in for the GitHub REST API.
        let github = axum::Router::new().route(
            "/orgs/{org}/public_members",
            get(|Path(org): Path<String>| async move {
                if org == "tokio-rs" {
                    Ok(axum::Json(serde_json::json!([
                        { "login": "carllerche" },
                        { "login": "Darksonn" },
                    ])))
                } else {
                    Err(axum::http::StatusCode::NOT_FOUND)
                }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let github_addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, github).await.unwrap();
        });

        let directory = GitHubDirectory::new(&DirectoryConfig {
            base_url: format!("http://{github_addr}"),
            timeout: Duration::from_secs(2),
            ..DirectoryConfig::default()
        })
        .unwrap();
        let server = start_server(Arc::new(directory)).await;

        let found = server.submit(&["Runtime: https://github.com/tokio-rs"]).await;
        let missing = server.submit(&["@nobody-at-all on GitHub"]).await;

        let view = server.wait_terminal(&found).await;
        assert_eq!(view["status"], "completed");
        assert_eq!(
            view["github_members"],
            serde_json::json!(["carllerche", "Darksonn"])
        );

        let view = server.wait_terminal(&missing).await;
        assert_eq!(view["status"], "completed");
        assert_eq!(view["extracted_company_username"], "nobody-at-all");
        assert_eq!(view["github_members"], serde_json::json!([]));

        server.service.shutdown(Duration::from_secs(5)).await;
        let stats = server.queue_status().await;
        assert_eq!(stats["worker_running"], false);
    })
    .await
    .expect("test timed out");
}
