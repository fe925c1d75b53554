// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::path::{Path, PathBuf};

#[test]
fn marked_writes_both_indexes() {
    let mut state = MaterializedState::default();
    state.apply_event(&marked_event("/watch/a/x.mp3", "fp-1", "job-1", 1_000));

    let by_path = &state.processed_paths[Path::new("/watch/a/x.mp3")];
    assert_eq!(by_path.job_id, "job-1");
    assert_eq!(by_path.fingerprint, "fp-1");
    assert_eq!(by_path.processed_at_ms, 1_000);

    let by_fp = &state.processed_fingerprints["fp-1"];
    assert_eq!(by_fp.job_id, "job-1");
}

#[test]
fn remark_overwrites() {
    let mut state = MaterializedState::default();
    state.apply_event(&marked_event("/watch/a/x.mp3", "fp-1", "job-1", 1_000));
    state.apply_event(&marked_event("/watch/a/x.mp3", "fp-2", "job-2", 2_000));

    assert_eq!(state.processed_paths[Path::new("/watch/a/x.mp3")].job_id, "job-2");
    // Old fingerprint entry survives (content identity is permanent)
    assert!(state.processed_fingerprints.contains_key("fp-1"));
    assert!(state.processed_fingerprints.contains_key("fp-2"));
}

#[test]
fn unmarked_deletes_both_indexes() {
    let mut state = MaterializedState::default();
    state.apply_event(&marked_event("/watch/a/x.mp3", "fp-1", "job-1", 1_000));
    state.apply_event(&unmarked_event("/watch/a/x.mp3", "fp-1"));

    assert!(state.processed_paths.is_empty());
    assert!(state.processed_fingerprints.is_empty());
}

#[test]
fn unmark_of_unknown_path_is_noop() {
    let mut state = MaterializedState::default();
    state.apply_event(&unmarked_event("/watch/a/never.mp3", "fp-x"));
    assert!(state.processed_paths.is_empty());
}

#[test]
fn state_with_tracker_entries_roundtrips_serde() {
    let mut state = MaterializedState::default();
    state.apply_event(&marked_event("/watch/a/x.mp3", "fp-1", "job-1", 1_000));

    let json = serde_json::to_string(&state).unwrap();
    let back: MaterializedState = serde_json::from_str(&json).unwrap();
    assert_eq!(back.processed_paths.len(), 1);
    assert!(back.processed_paths.contains_key(&PathBuf::from("/watch/a/x.mp3")));
}