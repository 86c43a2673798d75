//! End-to-end crawl tests against a mocked HTTP server, grounded in the
//! wiremock + tempfile integration-test stack used for `AharonR-downloader`'s
//! engine tests.

use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use git_dump::http::{build_client, fetch_with_403_retry, ClientConfig};
use git_dump::orchestrator::{self, Options};

fn deflate(bytes: &[u8]) -> Vec<u8> {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

fn hex_to_raw(hex: &str) -> Vec<u8> {
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).unwrap())
        .collect()
}

fn loose_object(kind: &str, content: &[u8]) -> Vec<u8> {
    let mut framed = format!("{kind} {}\0", content.len()).into_bytes();
    framed.extend_from_slice(content);
    deflate(&framed)
}

fn object_url(oid: &str) -> String {
    format!("/.git/objects/{}/{}", &oid[..2], &oid[2..])
}

fn default_options(url: String, dir: &TempDir) -> Options {
    Options {
        url,
        out_dir: dir.path().to_path_buf(),
        jobs: 4,
        retries: 1,
        timeout: Duration::from_secs(5),
        proxy: None,
    }
}

/// S3: loose objects only. A commit with no parents points at a tree with a
/// single blob entry; the crawler must fetch exactly those three objects.
#[tokio::test]
async fn loose_object_chain_is_fully_fetched() {
    let blob_oid = "b".repeat(40);
    let tree_oid = "7".repeat(40);
    let commit_oid = "c".repeat(40);

    let blob_body = loose_object("blob", b"hello world");

    let mut tree_content = b"100644 file.txt\0".to_vec();
    tree_content.extend_from_slice(&hex_to_raw(&blob_oid));
    let tree_body = loose_object("tree", &tree_content);

    let commit_text = format!(
        "tree {tree_oid}\nauthor Test User <test@example.com> 1700000000 +0000\ncommitter Test User <test@example.com> 1700000000 +0000\n\ntest commit\n"
    );
    let commit_body = loose_object("commit", commit_text.as_bytes());

    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/.git/HEAD"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ref: refs/heads/master\n"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/.git/refs/heads/master"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!("{commit_oid}\n")))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(object_url(&commit_oid)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(commit_body))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(object_url(&tree_oid)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(tree_body))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(object_url(&blob_oid)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(blob_body))
        .mount(&server)
        .await;

    let out_dir = TempDir::new().unwrap();
    let opts = default_options(server.uri(), &out_dir);

    orchestrator::run(opts).await.expect("crawl should succeed");

    for oid in [&commit_oid, &tree_oid, &blob_oid] {
        let path = out_dir.path().join(format!(".git/objects/{}/{}", &oid[..2], &oid[2..]));
        assert!(path.exists(), "expected object {oid} to be fetched to {path:?}");
    }

    // The ref file itself must also have been mirrored by FindRefsWorker.
    assert!(out_dir.path().join(".git/refs/heads/master").exists());
}

/// S6: `.git/HEAD` does not look like a ref file. The crawl must abort
/// without attempting any further requests.
#[tokio::test]
async fn non_ref_head_aborts_the_crawl() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/.git/HEAD"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not a ref file"))
        .mount(&server)
        .await;

    let out_dir = TempDir::new().unwrap();
    let opts = default_options(server.uri(), &out_dir);

    let result = orchestrator::run(opts).await;
    assert!(result.is_err(), "expected a fatal error for a non-ref HEAD body");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1, "only the HEAD probe should have fired");
}

/// A probe that never returns 200 is also fatal.
#[tokio::test]
async fn missing_head_aborts_the_crawl() {
    let server = MockServer::start().await;
    // No mocks mounted: wiremock answers every request with 404.

    let out_dir = TempDir::new().unwrap();
    let opts = default_options(server.uri(), &out_dir);

    let result = orchestrator::run(opts).await;
    assert!(result.is_err());
}

fn run_git(dir: &std::path::Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "Test User")
        .env("GIT_AUTHOR_EMAIL", "test@example.com")
        .env("GIT_COMMITTER_NAME", "Test User")
        .env("GIT_COMMITTER_EMAIL", "test@example.com")
        .status()
        .expect("git must be on PATH to build test fixtures");
    assert!(status.success(), "git {args:?} failed in {dir:?}");
}

/// Builds a tiny repository with one commit, repacks it into a single pack,
/// and runs `git update-server-info` so `.git/objects/info/packs` exists —
/// the same on-disk shape a real exposed `.git/` directory would have after
/// `git gc`. Returns the repo directory and the commit's OID.
fn build_packed_fixture_repo() -> (TempDir, String) {
    let repo = TempDir::new().unwrap();
    run_git(repo.path(), &["init", "-q", "-b", "master"]);
    std::fs::write(repo.path().join("file.txt"), b"hello world").unwrap();
    run_git(repo.path(), &["add", "-A"]);
    run_git(repo.path(), &["commit", "-q", "-m", "initial commit"]);
    run_git(repo.path(), &["repack", "-ad", "-q"]);
    run_git(repo.path(), &["update-server-info"]);

    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(repo.path())
        .output()
        .unwrap();
    let commit_oid = String::from_utf8(output.stdout).unwrap().trim().to_string();

    (repo, commit_oid)
}

/// S2: the remote repository is already packed (no loose objects at all).
/// The crawler must fetch the pack and idx, recognize every object they
/// contain as already resolvable, and never issue a single loose-object
/// HTTP request.
#[tokio::test]
async fn packed_repo_objects_are_never_fetched_loose() {
    let (repo, commit_oid) = build_packed_fixture_repo();
    let objects_dir = repo.path().join(".git/objects");

    let info_packs = std::fs::read_to_string(objects_dir.join("info/packs")).unwrap();
    let pack_dir = objects_dir.join("pack");
    let mut pack_path = None;
    let mut idx_path = None;
    for entry in std::fs::read_dir(&pack_dir).unwrap() {
        let path = entry.unwrap().path();
        match path.extension().and_then(|e| e.to_str()) {
            Some("pack") => pack_path = Some(path),
            Some("idx") => idx_path = Some(path),
            _ => {}
        }
    }
    let pack_bytes = std::fs::read(pack_path.expect("repack must produce a .pack file")).unwrap();
    let idx_bytes = std::fs::read(idx_path.expect("repack must produce a .idx file")).unwrap();

    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/.git/HEAD"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ref: refs/heads/master\n"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/.git/refs/heads/master"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!("{commit_oid}\n")))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/.git/objects/info/packs"))
        .respond_with(ResponseTemplate::new(200).set_body_string(info_packs))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/\.git/objects/pack/pack-[0-9a-f]{40}\.idx$"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(idx_bytes))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/\.git/objects/pack/pack-[0-9a-f]{40}\.pack$"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(pack_bytes))
        .mount(&server)
        .await;

    let out_dir = TempDir::new().unwrap();
    let opts = default_options(server.uri(), &out_dir);

    orchestrator::run(opts).await.expect("crawl should succeed");

    assert!(out_dir
        .path()
        .join(".git/objects/pack")
        .read_dir()
        .map(|mut it| it.next().is_some())
        .unwrap_or(false));

    let requests = server.received_requests().await.unwrap();
    let loose_object_re = regex::Regex::new(r"^/\.git/objects/[0-9a-f]{2}/[0-9a-f]{38}$").unwrap();
    for req in &requests {
        assert!(
            !loose_object_re.is_match(req.url.path()),
            "unexpected loose-object request for an already-packed object: {}",
            req.url.path()
        );
    }
}

struct ForbiddenThenOk {
    attempts: AtomicUsize,
}

impl Respond for ForbiddenThenOk {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < 4 {
            ResponseTemplate::new(403)
        } else {
            ResponseTemplate::new(200).set_body_string("ok")
        }
    }
}

/// Property 7 / S5: four consecutive 403s force four session rebuilds and
/// four 10-second cooldowns before the fifth attempt succeeds. Paused tokio
/// time lets this run instantly instead of taking 40 real seconds.
#[tokio::test(start_paused = true)]
async fn session_rebuilds_and_backs_off_through_a_403_storm() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ForbiddenThenOk {
            attempts: AtomicUsize::new(0),
        })
        .expect(5)
        .mount(&server)
        .await;

    let cfg = ClientConfig {
        proxy: None,
        timeout: Duration::from_secs(5),
    };
    let client = build_client(&cfg).unwrap();
    let url = format!("{}/probe", server.uri());

    let start = tokio::time::Instant::now();
    let (_client, response) = fetch_with_403_retry(client, &cfg, &url, 1)
        .await
        .expect("building a client with no proxy never fails");

    let response = response.expect("the fifth attempt should have returned 200");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert!(
        start.elapsed() >= Duration::from_secs(40),
        "expected four 10s cooldowns to have elapsed, got {:?}",
        start.elapsed()
    );
}
