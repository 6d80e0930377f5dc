use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn forumctl_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("forumctl");
    path
}

fn write_page(dir: &Path, name: &str, body: serde_json::Value) {
    fs::write(dir.join(name), serde_json::to_string_pretty(&body).unwrap()).unwrap();
}

fn post(id: i64, title: &str, status: &str, closed: bool) -> serde_json::Value {
    json!({
        "id": id,
        "url": format!("https://support.example.com/api/v2/community/posts/{}.json", id),
        "title": title,
        "details": "<p>details</p>",
        "author_id": 7,
        "vote_sum": 0,
        "vote_count": 0,
        "comment_count": 1,
        "follower_count": 1,
        "topic_id": 10,
        "html_url": format!("https://support.example.com/hc/community/posts/{}", id),
        "created_at": "2018-02-01T10:00:00Z",
        "updated_at": "2018-02-02T10:00:00Z",
        "featured": false,
        "pinned": false,
        "closed": closed,
        "status": status
    })
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let pages_dir = root.join("pages");
    fs::create_dir_all(&pages_dir).unwrap();

    write_page(
        &pages_dir,
        "topics_1.json",
        json!({"topics": [{
            "id": 10,
            "url": "https://support.example.com/api/v2/community/topics/10.json",
            "html_url": "https://support.example.com/hc/community/topics/10",
            "name": "Java SDK",
            "description": "",
            "position": 0,
            "follower_count": 4,
            "community_id": 1,
            "user_segment_id": null,
            "created_at": "2017-01-01T00:00:00Z",
            "updated_at": "2017-06-01T00:00:00Z"
        }], "next_page": null}),
    );
    write_page(
        &pages_dir,
        "posts_1.json",
        json!({"posts": [
            post(101, "Printer offline", "open", false),
            post(102, "Scan to email", "answered", true)
        ], "next_page": null}),
    );
    write_page(
        &pages_dir,
        "comments_101.json",
        json!({"comments": [{
            "id": 9001,
            "url": "https://support.example.com/api/v2/community/posts/101/comments/9001.json",
            "body": "Try a restart.",
            "author_id": 7,
            "post_id": 101,
            "official": true,
            "html_url": "https://support.example.com/hc/community/posts/101/comments/9001",
            "vote_sum": 0,
            "vote_count": 0,
            "created_at": "2018-02-03T08:00:00Z",
            "updated_at": "2018-02-03T08:00:00Z"
        }]}),
    );

    let config_content = format!(
        r#"[db]
path = "{root}/data/forum.sqlite"

[pages]
dir = "{root}/pages"

[output]
dir = "{root}/reports"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("forum.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_forumctl(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = forumctl_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run forumctl binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_forumctl(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_forumctl(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_forumctl(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_sync_all() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_forumctl(&config_path, &["sync", "all"]);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("sync posts"));
    assert!(stdout.contains("raw documents: 2 inserted, 0 updated"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_sync_twice_updates_instead_of_duplicating() {
    let (_tmp, config_path) = setup_test_env();

    run_forumctl(&config_path, &["sync", "posts"]);
    let (stdout, stderr, success) = run_forumctl(&config_path, &["sync", "posts"]);
    assert!(success, "second sync failed: {}", stderr);
    assert!(stdout.contains("raw documents: 0 inserted, 2 updated"));
    assert!(stdout.contains("typed rows: 0 inserted, 2 updated"));
}

#[test]
fn test_sync_unknown_kind_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_forumctl(&config_path, &["sync", "articles"]);
    assert!(!success);
    assert!(stderr.contains("Unknown entity kind"));
}

#[test]
fn test_sync_bad_page_fails() {
    let (tmp, config_path) = setup_test_env();
    fs::write(tmp.path().join("pages/posts_2.json"), "{ not json").unwrap();

    let (_, stderr, success) = run_forumctl(&config_path, &["sync", "posts"]);
    assert!(!success);
    assert!(stderr.contains("posts_2.json"));
}

#[test]
fn test_stats_after_sync() {
    let (_tmp, config_path) = setup_test_env();
    run_forumctl(&config_path, &["sync", "all"]);

    let (stdout, stderr, success) = run_forumctl(&config_path, &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("posts"));
    assert!(!stdout.contains("Last sync:   never"));
}

#[test]
fn test_get_shows_raw_and_typed() {
    let (_tmp, config_path) = setup_test_env();
    run_forumctl(&config_path, &["sync", "all"]);

    let (stdout, stderr, success) = run_forumctl(&config_path, &["get", "comments", "9001"]);
    assert!(success, "get failed: {}", stderr);
    assert!(stdout.contains("Try a restart."));
    assert!(stdout.contains("parent:       101"));
    assert!(stdout.contains("--- Typed row ---"));
}

#[test]
fn test_get_missing_entity_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_forumctl(&config_path, &["init"]);

    let (_, stderr, success) = run_forumctl(&config_path, &["get", "posts", "404"]);
    assert!(!success);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_export_csv() {
    let (tmp, config_path) = setup_test_env();
    run_forumctl(&config_path, &["sync", "posts"]);

    let out = tmp.path().join("posts.csv");
    let (stdout, stderr, success) = run_forumctl(
        &config_path,
        &["export", "posts", "--output", out.to_str().unwrap()],
    );
    assert!(success, "export failed: {}", stderr);
    assert!(stdout.contains("Exported 2 posts"));

    let csv = fs::read_to_string(&out).unwrap();
    let mut lines = csv.lines();
    assert!(lines.next().unwrap().starts_with("id,url,title"));
    assert!(lines.next().unwrap().starts_with("#101,"));
}

#[test]
fn test_export_json_default_path() {
    let (tmp, config_path) = setup_test_env();
    run_forumctl(&config_path, &["sync", "topics"]);

    let (_, stderr, success) =
        run_forumctl(&config_path, &["export", "topics", "--format", "json"]);
    assert!(success, "export failed: {}", stderr);

    let reports: Vec<_> = fs::read_dir(tmp.path().join("reports"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].starts_with("topics_") && reports[0].ends_with(".json"));
}

#[test]
fn test_report_writes_both_formats() {
    let (tmp, config_path) = setup_test_env();
    run_forumctl(&config_path, &["sync", "all"]);

    let (stdout, stderr, success) = run_forumctl(&config_path, &["report"]);
    assert!(success, "report failed: {}", stderr);
    assert!(stdout.contains("status_report_"));

    let mut names: Vec<_> = fs::read_dir(tmp.path().join("reports"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names.len(), 2);
    assert!(names[0].ends_with(".html"));
    assert!(names[1].ends_with(".md"));

    let md = fs::read_to_string(tmp.path().join("reports").join(&names[1])).unwrap();
    // Only the open post is followed up on.
    assert!(md.contains("#101"));
    assert!(!md.contains("#102"));
}

#[test]
fn test_reset_empties_kind() {
    let (_tmp, config_path) = setup_test_env();
    run_forumctl(&config_path, &["sync", "all"]);

    let (_, stderr, success) = run_forumctl(&config_path, &["reset", "posts"]);
    assert!(success, "reset failed: {}", stderr);

    let (_, _, found) = run_forumctl(&config_path, &["get", "posts", "101"]);
    assert!(!found);
}

#[test]
fn test_fetch_without_api_section_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_forumctl(&config_path, &["fetch", "posts"]);
    assert!(!success);
    assert!(stderr.contains("[api]"));
}
