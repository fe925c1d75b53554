// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File tracker event handlers.

use tp_core::Event;

use super::{MaterializedState, TrackedFingerprint, TrackedPath};

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::TrackerMarked { path, fingerprint, job_id, at_ms } => {
            state.processed_paths.insert(
                path.clone(),
                TrackedPath {
                    job_id: *job_id,
                    fingerprint: fingerprint.clone(),
                    processed_at_ms: *at_ms,
                },
            );
            state.processed_fingerprints.insert(
                fingerprint.clone(),
                TrackedFingerprint { job_id: *job_id, processed_at_ms: *at_ms },
            );
        }

        Event::TrackerUnmarked { path, fingerprint } => {
            state.processed_paths.remove(path);
            state.processed_fingerprints.remove(fingerprint);
        }

        _ => {}
    }
}
