// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn store() -> (tempfile::TempDir, ArtifactStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    (dir, store)
}

#[test]
fn write_creates_parent_dirs() {
    let (_dir, store) = store();
    store.write("p1", "deploy/dev/rendered.yaml", "kind: X").unwrap();
    assert!(store.exists("p1", "deploy/dev/rendered.yaml"));
    assert_eq!(
        store.read("p1", "deploy/dev/rendered.yaml").unwrap().as_deref(),
        Some("kind: X")
    );
}

#[test]
fn read_missing_maps_to_none() {
    let (_dir, store) = store();
    assert_eq!(store.read("p1", "build/image.txt").unwrap(), None);
}

#[test]
fn project_dirs_are_isolated() {
    let (_dir, store) = store();
    store.write("p1", "build/image.txt", "sha256:a").unwrap();
    store.write("p2", "build/image.txt", "sha256:b").unwrap();
    assert_eq!(
        store.read("p1", "build/image.txt").unwrap().as_deref(),
        Some("sha256:a")
    );
    assert_eq!(
        store.read("p2", "build/image.txt").unwrap().as_deref(),
        Some("sha256:b")
    );
}

#[test]
fn remove_project_clears_tree_and_tolerates_missing() {
    let (_dir, store) = store();
    store.write("p1", "build/image.txt", "x").unwrap();
    store.remove_project("p1").unwrap();
    assert!(!store.exists("p1", "build/image.txt"));
    // Second removal is fine
    store.remove_project("p1").unwrap();
}

#[test]
fn write_atomic_replaces_contents() {
    let (_dir, store) = store();
    store
        .write_atomic("p1", CI_STATE_FILE, r#"{"a":1}"#)
        .unwrap();
    store
        .write_atomic("p1", CI_STATE_FILE, r#"{"a":2}"#)
        .unwrap();
    assert_eq!(
        store.read("p1", CI_STATE_FILE).unwrap().as_deref(),
        Some(r#"{"a":2}"#)
    );
    assert!(!store.exists("p1", "repos/source/.berth/ci-commit-state.tmp"));
}

#[test]
fn ensure_dir_creates_nested_path() {
    let (_dir, store) = store();
    store.ensure_dir("p1", REPO_SOURCE_DIR).unwrap();
    assert!(store.path("p1", REPO_SOURCE_DIR).is_dir());
}
