//! Property-based testing for qwe
//!
//! Uses proptest to verify history invariants across randomly generated
//! commit sequences and line edits.

use ::qwe::diff::{self, DiffRecord};
use ::qwe::utils::{join_lines, split_lines};
use ::qwe::*;
use proptest::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Single line without terminators; may contain the row separator
fn line_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        "[a-z ]{0,12}".prop_map(|s| s.into_bytes()),
        Just(b" @@@ ".to_vec()),
        "[0-9]{1,3} @@@ [A-Z]{0,4}".prop_map(|s| s.into_bytes()),
        prop::collection::vec(any::<u8>().prop_filter("no terminators", |b| *b != b'\n' && *b != b'\r'), 0..16),
    ]
}

fn lines_strategy() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(line_strategy(), 0..40)
}

/// Sequence of file contents to commit one after another
fn history_strategy() -> impl Strategy<Value = (Vec<Vec<u8>>, Vec<Vec<Vec<u8>>>)> {
    (lines_strategy(), prop::collection::vec(lines_strategy(), 1..12))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Applying a computed diff to its source yields the target
    #[test]
    fn prop_apply_inverts_compute(old in lines_strategy(), new in lines_strategy()) {
        let record = diff::compute(&old, &new);
        prop_assert_eq!(record.apply(&old, "prop").unwrap(), new.clone());

        // The serialized form carries the same record
        let parsed = DiffRecord::parse(&record.to_bytes(), "prop").unwrap();
        prop_assert_eq!(parsed.apply(&old, "prop").unwrap(), new);
    }

    /// A diff is a no-op exactly when both sides are equal
    #[test]
    fn prop_noop_iff_equal(old in lines_strategy(), new in lines_strategy()) {
        let record = diff::compute(&old, &new);
        prop_assert_eq!(record.is_noop(old.len()), old == new);
    }

    /// Rows only name positions that differ, in increasing order
    #[test]
    fn prop_rows_are_sparse(old in lines_strategy(), new in lines_strategy()) {
        let record = diff::compute(&old, &new);
        prop_assert_eq!(record.total_lines, new.len());
        let mut previous = 0;
        for row in &record.rows {
            prop_assert!(row.line > previous);
            prop_assert!(old.get(row.line - 1) != Some(&new[row.line - 1]));
            previous = row.line;
        }
    }

    /// Every recorded commit replays to exactly what was committed
    #[test]
    fn prop_commit_history_replays((initial, edits) in history_strategy()) {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path().to_path_buf()).unwrap();
        let path = temp_dir.path().join("f.txt");

        let base = join_lines(&initial);
        fs::write(&path, &base).unwrap();
        repo.track("f.txt").unwrap();

        let mut last = initial.clone();
        let mut committed = Vec::new();
        for (i, lines) in edits.iter().enumerate() {
            fs::write(&path, join_lines(lines)).unwrap();
            let outcome = repo.commit("f.txt", &format!("edit {}", i)).unwrap();
            prop_assert_eq!(outcome.is_unchanged(), *lines == last);
            if !outcome.is_unchanged() {
                committed.push(join_lines(lines));
                last = lines.clone();
            }
        }

        prop_assert_eq!(repo.commits("f.txt").unwrap().len(), committed.len());
        for (k, expected) in committed.iter().enumerate() {
            prop_assert_eq!(&repo.content_at("f.txt", Target::Commit(k)).unwrap(), expected);
        }
        prop_assert_eq!(repo.content_at("f.txt", Target::BaseOnly).unwrap(), base);
    }

    /// Reverting to any commit restores it and keeps the history length
    #[test]
    fn prop_revert_restores((initial, edits) in history_strategy(), pick in any::<prop::sample::Index>()) {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path().to_path_buf()).unwrap();
        let path = temp_dir.path().join("f.txt");
        fs::write(&path, join_lines(&initial)).unwrap();
        repo.track("f.txt").unwrap();

        for lines in &edits {
            fs::write(&path, join_lines(lines)).unwrap();
            repo.commit("f.txt", "edit").unwrap();
        }

        let commits = repo.commits("f.txt").unwrap();
        prop_assume!(!commits.is_empty());
        let k = pick.index(commits.len());

        let uid = repo.revert("f.txt", RevertTarget::Commit(k)).unwrap();
        prop_assert_eq!(&uid, &commits[k].uid);
        prop_assert_eq!(repo.commits("f.txt").unwrap().len(), commits.len());
        prop_assert_eq!(
            split_lines(&fs::read(&path).unwrap()),
            split_lines(&repo.content_at("f.txt", Target::Commit(k)).unwrap())
        );
    }
}
