//! Integration tests for qwe
//!
//! Multi-step workflows over single files and groups, driven through the
//! public [`Repository`] API against a real working directory.

use ::qwe::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tracing::info;

/// Working directory plus an initialized repository
pub struct QweTestHarness {
    pub temp_dir: TempDir,
    pub repo: Repository,
}

impl QweTestHarness {
    /// Create a new test harness
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let repo = RepositoryBuilder::new()
            .compression_strategy(CompressionStrategy::Fast)
            .init(temp_dir.path().to_path_buf())
            .unwrap();
        Self { temp_dir, repo }
    }

    pub fn path(&self, name: &str) -> std::path::PathBuf {
        self.temp_dir.path().join(name)
    }

    pub fn write(&self, name: &str, content: impl AsRef<[u8]>) {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    pub fn read(&self, name: &str) -> Vec<u8> {
        fs::read(self.path(name)).unwrap()
    }

    /// Write `content`, commit it and return the new index
    pub fn commit_content(&self, name: &str, content: impl AsRef<[u8]>, message: &str) -> usize {
        self.write(name, content);
        self.repo
            .commit(name, message)
            .unwrap()
            .index()
            .expect("commit produced no index")
    }
}

/// Random text with `lines` lines drawn from a small vocabulary
pub fn random_text(rng: &mut StdRng, lines: usize) -> String {
    const WORDS: &[&str] = &["alpha", "beta", "gamma", "delta", "", "  indented", "x @@@ y"];
    let mut out = String::new();
    for _ in 0..lines {
        out.push_str(WORDS[rng.random_range(0..WORDS.len())]);
        out.push('\n');
    }
    out
}

fn object_count(root: &Path) -> usize {
    fs::read_dir(root.join(storage::OBJECTS_DIR)).unwrap().count()
}

#[test]
fn test_documented_scenario() {
    let h = QweTestHarness::new();
    h.write("a.txt", "x\ny\nz\n");
    h.repo.track("a.txt").unwrap();

    assert_eq!(h.commit_content("a.txt", "x\nY\nz\n", "m1"), 0);
    assert_eq!(h.commit_content("a.txt", "x\nY\n", "m2"), 1);

    assert_eq!(h.repo.content_at("a.txt", Target::Commit(1)).unwrap(), b"x\nY\n");

    h.repo.revert("a.txt", RevertTarget::Commit(0)).unwrap();
    assert_eq!(h.read("a.txt"), b"x\nY\nz\n");

    let tracker = h.repo.tracker("a.txt").unwrap();
    assert_eq!(tracker.current, tracker.versions[0].uid);
    assert_eq!(tracker.versions.len(), 2);
}

#[test]
fn test_truncation_is_a_real_commit() {
    let h = QweTestHarness::new();
    h.write("t.txt", "a\nb\nc\n");
    h.repo.track("t.txt").unwrap();

    // Only the header changes; no line is rewritten
    assert_eq!(h.commit_content("t.txt", "a\nb\n", "drop c"), 0);
    assert_eq!(h.repo.content_at("t.txt", Target::Latest).unwrap(), b"a\nb\n");

    // Growing back is a separate commit and the history stays replayable
    assert_eq!(h.commit_content("t.txt", "a\nb\nc\n", "restore c"), 1);
    assert_eq!(h.repo.content_at("t.txt", Target::Commit(0)).unwrap(), b"a\nb\n");
    assert_eq!(h.repo.content_at("t.txt", Target::Commit(1)).unwrap(), b"a\nb\nc\n");
}

#[test]
fn test_unchanged_commit_returns_previous_id() {
    let h = QweTestHarness::new();
    h.write("n.txt", "one\n");
    let base = h.repo.track("n.txt").unwrap();

    match h.repo.commit("n.txt", "noop").unwrap() {
        CommitOutcome::Unchanged { index, uid } => {
            assert_eq!(index, None);
            assert_eq!(uid, base);
        }
        other => panic!("expected Unchanged, got {:?}", other),
    }

    h.commit_content("n.txt", "two\n", "two");
    let before = h.repo.commits("n.txt").unwrap();
    let outcome = h.repo.commit("n.txt", "again").unwrap();
    assert!(outcome.is_unchanged());
    assert_eq!(outcome.index(), Some(0));
    assert_eq!(outcome.uid(), &before[0].uid);
    assert_eq!(h.repo.commits("n.txt").unwrap(), before);
}

#[test]
fn test_revert_is_idempotent() {
    let h = QweTestHarness::new();
    h.write("r.txt", "1\n2\n3\n");
    h.repo.track("r.txt").unwrap();
    h.commit_content("r.txt", "1\n22\n3\n", "c0");
    h.commit_content("r.txt", "1\n22\n3\n4\n", "c1");

    let first = h.repo.revert("r.txt", RevertTarget::Commit(0)).unwrap();
    let content = h.read("r.txt");
    let tracker = h.repo.tracker("r.txt").unwrap();

    let second = h.repo.revert("r.txt", RevertTarget::Commit(0)).unwrap();
    assert_eq!(first, second);
    assert_eq!(h.read("r.txt"), content);
    assert_eq!(h.repo.tracker("r.txt").unwrap(), tracker);
}

#[test]
fn test_revert_latest_after_older_commit() {
    let h = QweTestHarness::new();
    h.write("l.txt", "a\n");
    h.repo.track("l.txt").unwrap();
    h.commit_content("l.txt", "b\n", "b");
    h.commit_content("l.txt", "c\n", "c");

    h.repo.revert("l.txt", RevertTarget::Commit(0)).unwrap();
    assert_eq!(h.read("l.txt"), b"b\n");

    let uid = h.repo.revert("l.txt", RevertTarget::Latest).unwrap();
    assert_eq!(h.read("l.txt"), b"c\n");
    assert_eq!(h.repo.current("l.txt").unwrap(), CurrentVersion::Commit {
        index: 1,
        details: h.repo.commits("l.txt").unwrap()[1].clone(),
    });
    assert_eq!(uid, h.repo.commits("l.txt").unwrap()[1].uid);
}

#[test]
fn test_rebase_keeps_history() {
    let h = QweTestHarness::new();
    h.write("b.txt", "orig\n");
    let base = h.repo.track("b.txt").unwrap();
    h.commit_content("b.txt", "new\n", "new");

    h.repo.rebase("b.txt").unwrap();
    assert_eq!(h.read("b.txt"), b"orig\n");
    assert_eq!(h.repo.commits("b.txt").unwrap().len(), 1);
    assert_eq!(h.repo.current("b.txt").unwrap(), CurrentVersion::Base { uid: base });

    // Next commit still diffs against the latest commit, not the base
    let outcome = h.repo.commit("b.txt", "back to orig").unwrap();
    assert_eq!(outcome.index(), Some(1));
}

#[test]
fn test_rebase_restores_missing_file() {
    let h = QweTestHarness::new();
    h.write("gone.txt", "keep me\n");
    h.repo.track("gone.txt").unwrap();
    fs::remove_file(h.path("gone.txt")).unwrap();

    h.repo.rebase("gone.txt").unwrap();
    assert_eq!(h.read("gone.txt"), b"keep me\n");
}

#[test]
fn test_recover_then_commit() {
    let h = QweTestHarness::new();
    h.write("rec.txt", "1\n");
    h.repo.track("rec.txt").unwrap();
    h.commit_content("rec.txt", "1\n2\n", "two");
    h.repo.revert("rec.txt", RevertTarget::Commit(0)).unwrap();

    fs::remove_file(h.path("rec.txt")).unwrap();
    assert!(matches!(
        h.repo.revert("rec.txt", RevertTarget::Latest),
        Err(QweError::FileNotFound(_))
    ));

    h.repo.recover("rec.txt").unwrap();
    assert_eq!(h.read("rec.txt"), b"1\n2\n");
    assert!(matches!(h.repo.recover("rec.txt"), Err(QweError::FileAlreadyExists(_))));
    assert!(h.repo.commit("rec.txt", "same").unwrap().is_unchanged());
}

#[test]
fn test_binary_history() {
    let h = QweTestHarness::new();
    let v0 = vec![0u8, 1, 2, 3, 0, 255];
    let v1: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
    h.write("blob.bin", &v0);

    let base = h.repo.track("blob.bin").unwrap();
    assert_eq!(base.kind(), ObjectKind::BinarySnapshot);
    assert!(h.repo.commit("blob.bin", "same").unwrap().is_unchanged());

    h.write("blob.bin", &v1);
    let outcome = h.repo.commit("blob.bin", "grow").unwrap();
    assert_eq!(outcome.uid().kind(), ObjectKind::BinarySnapshot);
    assert_eq!(h.repo.content_at("blob.bin", Target::Latest).unwrap(), v1);

    assert!(!h.repo.diff("blob.bin", DiffTarget::WorkingVsLatest).unwrap().has_changes());
    h.repo.rebase("blob.bin").unwrap();
    assert_eq!(h.read("blob.bin"), v0);
    assert!(h.repo.diff("blob.bin", DiffTarget::WorkingVsLatest).unwrap().has_changes());

    // Recover brings back the snapshot that is checked out
    fs::remove_file(h.path("blob.bin")).unwrap();
    h.repo.recover("blob.bin").unwrap();
    assert_eq!(h.read("blob.bin"), v0);
}

#[test]
fn test_binary_classification_is_fixed() {
    let h = QweTestHarness::new();
    h.write("mixed", "plain text\n");
    h.repo.track("mixed").unwrap();

    // A NUL byte later on does not reclassify the file
    h.write("mixed", b"plain\0text\n");
    h.repo.commit("mixed", "nul").unwrap();
    assert!(!h.repo.tracker("mixed").unwrap().is_binary());
    assert_eq!(h.repo.content_at("mixed", Target::Latest).unwrap(), b"plain\0text\n");
}

#[test]
fn test_diff_modes() {
    let h = QweTestHarness::new();
    h.write("d.txt", "a\nb\nc\n");
    h.repo.track("d.txt").unwrap();
    h.commit_content("d.txt", "a\nB\nc\n", "B");
    h.commit_content("d.txt", "a\nB\n", "drop c");
    h.write("d.txt", "a\nB\nnew\n");

    let report = h.repo.diff("d.txt", DiffTarget::WorkingVsLatest).unwrap();
    let DiffReport::Text(changes) = report else { panic!("expected text report") };
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].line, 3);
    assert_eq!(changes[0].old, None);
    assert_eq!(changes[0].new.as_deref(), Some(&b"new"[..]));

    let report = h.repo.diff("d.txt", DiffTarget::Commits(0, 1)).unwrap();
    let DiffReport::Text(changes) = report else { panic!("expected text report") };
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].old_text().as_deref(), Some("c"));
    assert_eq!(changes[0].new, None);

    let report = h.repo.diff("d.txt", DiffTarget::WorkingVsCommit(0)).unwrap();
    let DiffReport::Text(changes) = report else { panic!("expected text report") };
    assert_eq!(changes[0].line, 3);
    assert_eq!(changes[0].old_text().as_deref(), Some("c"));
    assert_eq!(changes[0].new_text().as_deref(), Some("new"));

    // Diff never writes anything
    assert_eq!(h.read("d.txt"), b"a\nB\nnew\n");
    assert!(matches!(
        h.repo.diff("d.txt", DiffTarget::Commits(0, 9)),
        Err(QweError::InvalidCommitIndex { index: 9, available: 2 })
    ));
}

#[test]
fn test_long_random_history() {
    let h = QweTestHarness::new();
    let mut rng = StdRng::seed_from_u64(42);
    let mut versions = Vec::new();

    let initial = random_text(&mut rng, 30);
    h.write("long.txt", &initial);
    h.repo.track("long.txt").unwrap();

    for i in 0..40 {
        let lines = rng.random_range(0..60);
        let content = random_text(&mut rng, lines);
        h.write("long.txt", &content);
        let outcome = h.repo.commit("long.txt", &format!("step {}", i)).unwrap();
        if !outcome.is_unchanged() {
            versions.push(content);
        }
    }
    info!("Recorded {} versions", versions.len());

    assert_eq!(h.repo.commits("long.txt").unwrap().len(), versions.len());
    for (k, expected) in versions.iter().enumerate() {
        assert_eq!(
            h.repo.content_at("long.txt", Target::Commit(k)).unwrap(),
            expected.as_bytes(),
            "commit {} does not replay",
            k
        );
    }
    assert_eq!(h.repo.content_at("long.txt", Target::BaseOnly).unwrap(), initial.as_bytes());
}

#[test]
fn test_group_workflow() {
    let h = QweTestHarness::new();
    h.write("docs/a.md", "a0\n");
    h.write("docs/b.md", "b0\n");
    h.write("docs/nested/ignored.md", "deep\n");

    h.repo.group_init("docs").unwrap();
    let added = h.repo.group_track("docs", "docs").unwrap();
    assert_eq!(added.len(), 2);
    assert!(h.repo.tracker("docs/nested/ignored.md").is_err());

    h.write("docs/a.md", "a1\n");
    let first = h.repo.group_commit("docs", "edit a").unwrap();
    assert_eq!(first.index, 1);
    assert_eq!((first.committed, first.unchanged), (1, 1));

    h.write("docs/a.md", "a2\n");
    h.write("docs/b.md", "b1\n");
    let second = h.repo.group_commit("docs", "edit both").unwrap();
    assert_eq!(second.committed, 2);

    // Index 1 has a.md at commit 0 and b.md still at its base
    h.repo.group_revert("docs", 1).unwrap();
    assert_eq!(h.read("docs/a.md"), b"a1\n");
    assert_eq!(h.read("docs/b.md"), b"b0\n");
    assert_eq!(h.repo.group_current("docs").unwrap().index, 1);

    h.repo.group_revert("docs", 2).unwrap();
    assert_eq!(h.read("docs/a.md"), b"a2\n");
    assert_eq!(h.read("docs/b.md"), b"b1\n");

    let history = h.repo.group_commits("docs").unwrap();
    let messages: Vec<_> = history.iter().map(|c| c.message.as_str()).collect();
    assert_eq!(messages, vec!["Initial Tracking", "edit a", "edit both"]);
}

#[test]
fn test_group_initial_snapshot_reverts_to_base() {
    let h = QweTestHarness::new();
    h.write("g/one.txt", "base\n");
    h.repo.group_init("g").unwrap();
    h.repo.group_track("g", "g/one.txt").unwrap();

    h.write("g/one.txt", "changed\n");
    h.repo.group_commit("g", "change").unwrap();

    h.repo.group_revert("g", 0).unwrap();
    assert_eq!(h.read("g/one.txt"), b"base\n");
    assert!(matches!(
        h.repo.current("g/one.txt").unwrap(),
        CurrentVersion::Base { .. }
    ));
}

#[test]
fn test_failed_group_commit_leaves_no_trace() {
    let h = QweTestHarness::new();
    h.write("m/a.txt", "a\n");
    h.write("m/b.txt", "b\n");
    h.repo.group_init("m").unwrap();
    h.repo.group_track("m", "m").unwrap();

    let objects = object_count(h.repo.root());
    h.write("m/a.txt", "a changed\n");
    fs::remove_file(h.path("m/b.txt")).unwrap();

    assert!(h.repo.group_commit("m", "partial").is_err());
    assert!(h.repo.commits("m/a.txt").unwrap().is_empty());
    assert_eq!(h.repo.group_commits("m").unwrap().len(), 1);
    assert_eq!(object_count(h.repo.root()), objects);
}
