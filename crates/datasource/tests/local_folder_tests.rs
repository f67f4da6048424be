//! Folder sources over a real temporary directory.

mod common;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use assert_fs::prelude::*;
use assert_fs::TempDir;
use serial_test::serial;

use common::Recorder;
use datasource::config::Bindings;
use datasource::folder::factory::{FILTER_NAME, ROOT_PATH};
use datasource::folder::{DigestState, FileEntry, FolderDataSource, FolderDataSourceFactory};
use datasource::identity::{ComparisonResults, FilePath, UniquelyIdentifiable};
use datasource::source::{ChangeKind, DataSource, DataSourceFactory};

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(25));
    }
    condition()
}

#[test]
fn test_enumerates_files_and_directories() {
    let temp = TempDir::new().unwrap();
    temp.child("one.txt").write_str("one").unwrap();
    temp.child("two.txt").write_str("two").unwrap();
    temp.child("three.pdf").write_binary(b"%PDF-1.4").unwrap();
    for dir in ["Directory One", "Directory Two", "Directory Three"] {
        temp.child(dir).create_dir_all().unwrap();
    }
    temp.child("Directory Two/inner.txt").write_str("inner").unwrap();

    let source = FolderDataSource::open(temp.path()).unwrap();
    assert_eq!(source.count(), 3);

    let mut names: Vec<String> = source
        .sub_sources()
        .unwrap()
        .iter()
        .map(|s| FilePath::from(s.name()).file_name())
        .collect();
    names.sort();
    assert_eq!(names, vec!["Directory One", "Directory Three", "Directory Two"]);
}

#[test]
fn test_entries_compare_by_content() {
    let temp = TempDir::new().unwrap();
    temp.child("a.txt").write_str("same").unwrap();
    temp.child("b.txt").write_str("same").unwrap();
    temp.child("c.txt").write_str("other").unwrap();

    let a = FileEntry::from_path(&FilePath::from(temp.child("a.txt").path()));
    let b = FileEntry::from_path(&FilePath::from(temp.child("b.txt").path()));
    let c = FileEntry::from_path(&FilePath::from(temp.child("c.txt").path()));

    assert_eq!(a.compare(None), ComparisonResults::DIFFERENT);
    assert_eq!(a.compare(Some(&a)), ComparisonResults::MATCH);
    assert_eq!(a.compare(Some(&b)), ComparisonResults::DIFFERENT_BUT_EQUIVALENT);
    assert_eq!(a.compare(Some(&c)), ComparisonResults::DIFFERENT);
    assert!(matches!(a.digest_state(), DigestState::Ready(_)));
}

#[test]
fn test_rewritten_file_invalidates_previous_entry() {
    let temp = TempDir::new().unwrap();
    let file = temp.child("a.txt");
    file.write_str("before").unwrap();
    let path = FilePath::from(file.path());

    let before = FileEntry::from_path(&path);
    before.digest().unwrap();
    file.write_str("after").unwrap();
    let after = FileEntry::from_path(&path);

    assert_eq!(
        after.compare(Some(&before)),
        ComparisonResults::DIFFERENT | ComparisonResults::INVALIDATING
    );
}

#[test]
fn test_deleted_file_reports_read_failure() {
    let temp = TempDir::new().unwrap();
    let file = temp.child("gone.txt");
    file.write_str("soon gone").unwrap();
    let entry = FileEntry::from_path(&FilePath::from(file.path()));

    std::fs::remove_file(file.path()).unwrap();

    assert!(entry.try_open().is_err());
    assert!(entry.digest().is_err());
    assert!(matches!(entry.digest_state(), DigestState::Failed(_)));
    assert_eq!(entry.compare(Some(&entry)), ComparisonResults::INVALIDATING);
}

#[test]
#[serial]
fn test_watcher_reports_created_and_removed_files() {
    let temp = TempDir::new().unwrap();
    temp.child("existing.txt").write_str("x").unwrap();

    let bindings = Bindings::new().bind(&ROOT_PATH, PathBuf::from(temp.path()));
    let source = FolderDataSourceFactory::new().create(&bindings).unwrap();
    assert_eq!(source.count(), 1);

    let recorder = Recorder::new();
    let _subscription = source.subscribe(recorder.observer());

    temp.child("fresh.txt").write_str("fresh").unwrap();
    assert!(wait_for(|| source.count() == 2), "created file never indexed");
    assert!(recorder.count(ChangeKind::Added) >= 1);

    std::fs::remove_file(temp.child("existing.txt").path()).unwrap();
    assert!(wait_for(|| source.count() == 1), "removed file never dropped");
    assert!(recorder.count(ChangeKind::Removed) >= 1);

    source.dispose().unwrap();
    let seen = recorder.len();
    temp.child("late.txt").write_str("late").unwrap();
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(recorder.len(), seen);
}

#[test]
#[serial]
fn test_filter_limits_watched_files() {
    let temp = TempDir::new().unwrap();

    let bindings = Bindings::new()
        .bind(&ROOT_PATH, PathBuf::from(temp.path()))
        .bind(&FILTER_NAME, "*.pdf".to_string());
    let source = FolderDataSourceFactory::new().create(&bindings).unwrap();

    temp.child("ignored.txt").write_str("t").unwrap();
    temp.child("kept.pdf").write_str("p").unwrap();

    assert!(wait_for(|| source.count() == 1));
    std::thread::sleep(Duration::from_millis(200));
    let names: Vec<String> = source.items().iter().map(|e| e.name().to_string()).collect();
    assert_eq!(names, vec!["kept.pdf"]);
}

#[test]
#[serial]
fn test_renamed_directory_stays_out_of_the_index() {
    let temp = TempDir::new().unwrap();
    temp.child("d1").create_dir_all().unwrap();

    let source = FolderDataSource::open(temp.path()).unwrap();
    assert_eq!(source.count(), 0);
    let recorder = Recorder::new();
    let _subscription = source.subscribe(recorder.observer());

    std::fs::rename(temp.child("d1").path(), temp.child("d2").path()).unwrap();
    wait_for(|| recorder.len() > 0);
    std::thread::sleep(Duration::from_millis(200));

    assert_eq!(source.count(), 0);
    assert_eq!(recorder.count(ChangeKind::Added), 0);
    assert_eq!(recorder.count(ChangeKind::Moved), 0);
    let subs = source.sub_sources().unwrap();
    assert_eq!(subs.len(), 1);
    assert_eq!(FilePath::from(subs[0].name()).file_name(), "d2");
}

#[test]
#[serial]
fn test_file_rename_is_reported_once() {
    let temp = TempDir::new().unwrap();
    temp.child("a.txt").write_str("a").unwrap();

    let source = FolderDataSource::open(temp.path()).unwrap();
    let recorder = Recorder::new();
    let _subscription = source.subscribe(recorder.observer());

    std::fs::rename(temp.child("a.txt").path(), temp.child("b.txt").path()).unwrap();
    let renamed = FilePath::from(temp.child("b.txt").path());
    assert!(wait_for(|| source.contains(&renamed) && source.count() == 1));
    std::thread::sleep(Duration::from_millis(200));

    // Either one move, or a removal plus an add, but never both.
    let arrivals = recorder.count(ChangeKind::Added) + recorder.count(ChangeKind::Moved);
    assert_eq!(arrivals, 1, "events: {:?}", recorder.events());
    assert!(recorder.count(ChangeKind::Removed) <= 1);
    assert_eq!(source.count(), 1);
}
