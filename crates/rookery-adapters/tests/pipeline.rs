//! End-to-end runs over a temporary data directory with the real collaborators.

use rookery_adapters::{GitCommitter, build_stages, parse_post, record_source};
use rookery_core::{BatchRunner, RecordSelection, RookeryConfig, RunStatus};
use rookery_proto::{CommitOutcome, Committer, PublishedArtifact, ReasonCode, Stage};
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn config_for(root: &Path) -> RookeryConfig {
    let yaml = format!(
        r###"
batch:
  concurrency: 2
research:
  data_dir: {data}
publisher:
  output_dir: {posts}
gates:
  research:
    min_score: 1.0
    min_length: 100
    required_fields: [summary]
    required_markers: ["##"]
  content:
    min_score: 0.8
    min_length: 200
    required_fields: [headline, introduction, body, conclusion]
"###,
        data = root.join("data").display(),
        posts = root.join("posts").display(),
    );
    RookeryConfig::parse_yaml(&yaml).unwrap()
}

fn seed_data(root: &Path) {
    let data = root.join("data");
    std::fs::create_dir_all(&data).unwrap();
    std::fs::write(
        data.join("2026-02-01.json"),
        r#"{
  "date": "2026-02-01",
  "detections": [
    {"species": "House Finch"},
    {"species": "House Finch"},
    {"species": "Dark-eyed Junco"}
  ],
  "notable_events": ["Cooper's hawk flyover at 09:12"],
  "environmental_conditions": {"temperature": "4C", "weather": "overcast"}
}"#,
    )
    .unwrap();
    std::fs::write(
        data.join("2026-02-02.csv"),
        "timestamp,species,confidence,date\n\
         07:01,Black-capped Chickadee,0.91,2026-02-02\n\
         07:15,Black-capped Chickadee,0.88,2026-02-02\n\
         08:40,Northern Cardinal,0.95,2026-02-02\n",
    )
    .unwrap();
    std::fs::write(data.join("2026-02-03.json"), r#"{"detections": []}"#).unwrap();
    std::fs::write(data.join("notes.txt"), "not a data file").unwrap();
}

#[tokio::test]
async fn test_discovered_batch_publishes_posts_and_isolates_empty_record() {
    let root = TempDir::new().unwrap();
    seed_data(root.path());
    let config = config_for(root.path());
    config.validate().unwrap();

    let runner = BatchRunner::from_config(&config, build_stages(&config).unwrap()).unwrap();
    let source = record_source(&config);
    let result = runner
        .run_selection(RecordSelection::DiscoverAll, source.as_ref())
        .await
        .unwrap();

    assert_eq!((result.total, result.succeeded, result.failed), (3, 2, 1));
    assert_eq!(result.exit_code(), 1);

    let records: Vec<String> = result.outcomes.iter().map(|o| o.record.id()).collect();
    assert_eq!(
        records,
        vec!["2026-02-01.json", "2026-02-02.csv", "2026-02-03.json"]
    );

    for outcome in &result.outcomes[..2] {
        assert_eq!(outcome.status, RunStatus::Completed);
        let path = outcome.output_path.as_ref().unwrap();
        assert!(path.starts_with(root.path().join("posts")));
        let (fields, body) = parse_post(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert!(!fields["title"].is_empty());
        assert!(body.contains("## Species Detected"));
    }
    let first = std::fs::read_to_string(result.outcomes[0].output_path.as_ref().unwrap()).unwrap();
    assert!(first.contains("House Finch Takes the Spotlight on 2026-02-01"));
    assert!(first.contains("Cooper's hawk flyover"));

    let empty = &result.outcomes[2];
    assert_eq!(empty.status, RunStatus::Failed);
    assert_eq!(empty.reason, Some(ReasonCode::DataUnavailable));
    assert_eq!(empty.failed_stage, Some(Stage::Research));
    assert!(empty.output_path.is_none());
}

#[tokio::test]
async fn test_date_record_without_data_is_data_unavailable() {
    let root = TempDir::new().unwrap();
    seed_data(root.path());
    let config = config_for(root.path());
    let runner = BatchRunner::from_config(&config, build_stages(&config).unwrap()).unwrap();

    let result = runner
        .run(vec![
            rookery_proto::InputRecord::parse("2026-02-02"),
            rookery_proto::InputRecord::parse("2026-03-09"),
        ])
        .await;

    assert_eq!(result.outcomes[0].status, RunStatus::Completed);
    assert_eq!(
        result.outcomes[1].reason,
        Some(ReasonCode::DataUnavailable)
    );
}

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .is_ok_and(|o| o.status.success())
}

fn git(repo: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(repo)
        .output()
        .unwrap();
    assert!(out.status.success(), "git {args:?} failed");
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

#[tokio::test]
async fn test_git_committer_commits_then_reports_no_changes() {
    if !git_available() {
        return;
    }
    let repo = TempDir::new().unwrap();
    git(repo.path(), &["init", "--quiet"]);

    let out = TempDir::new().unwrap();
    let post = out.path().join("2026-02-01-finches.md");
    std::fs::write(&post, "---\ntitle: Finches\ndate: 2026-02-01\n---\n\nBody\n").unwrap();
    let artifact = PublishedArtifact {
        path: post,
        ..Default::default()
    };

    let mut committer = GitCommitter::from_config(&rookery_core::CommitterConfig {
        enabled: true,
        repo_dir: Some(repo.path().display().to_string()),
        push: false,
        author_name: Some("Rookery Test".to_string()),
        author_email: Some("rookery@example.com".to_string()),
        ..Default::default()
    })
    .unwrap();
    committer = committer.with_timeout(std::time::Duration::from_secs(30));

    let CommitOutcome::Committed(reference) = committer.commit(&artifact).await.unwrap() else {
        panic!("expected a commit");
    };
    assert!(!reference.pushed);
    assert_eq!(
        reference.target_path,
        Path::new("content/posts/2026-02-01-finches.md")
    );
    assert_eq!(reference.sha.as_deref(), Some(git(repo.path(), &["rev-parse", "HEAD"]).as_str()));
    assert!(repo.path().join("content/posts/2026-02-01-finches.md").exists());

    assert_eq!(
        committer.commit(&artifact).await.unwrap(),
        CommitOutcome::NoChanges
    );
}
