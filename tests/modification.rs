//! Editing tests: delete, rename, replace, revert and discard.

mod common;

use tempfile::TempDir;
use zipkit::{
    Archive, CommitOptions, CompressionMethod, Error, LocateFlags, MemorySource, OpenFlags,
    StringDecoding, Timestamp, Version,
};

use common::{create_archive, create_archive_file, read_archive_contents, reopen, text_bytes};

fn three_entries() -> MemorySource {
    create_archive(&[
        ("a.txt", b"alpha"),
        ("b.txt", b"bravo"),
        ("c.txt", b"charlie"),
    ])
    .unwrap()
}

fn names(archive: &Archive) -> Vec<String> {
    archive
        .entries()
        .map(|e| e.name(StringDecoding::Guess))
        .collect()
}

// ============================================================================
// Delete
// ============================================================================

#[test]
fn test_delete_middle_entry() {
    let storage = three_entries();
    let mut archive = reopen(&storage);
    archive.delete(1).unwrap();
    assert_eq!(archive.len(Version::Current), 2);
    assert_eq!(archive.len(Version::Unchanged), 3);

    let result = archive.commit().unwrap();
    assert_eq!(result.entries_deleted, 1);
    assert_eq!(result.entries_copied, 2);

    let archive = reopen(&storage);
    assert_eq!(names(&archive), ["a.txt", "c.txt"]);
    assert_eq!(archive.read_entry(1).unwrap(), b"charlie");
}

#[test]
fn test_deleted_entry_is_not_found() {
    let storage = three_entries();
    let mut archive = reopen(&storage);
    archive.delete(0).unwrap();

    match archive.entry(0) {
        Err(Error::EntryNotFound { .. }) => {}
        other => panic!("expected EntryNotFound, got {:?}", other.map(|e| e.index())),
    }
    match archive.delete(0) {
        Err(Error::EntryNotFound { .. }) => {}
        other => panic!("expected EntryNotFound, got {:?}", other),
    }
    // The stored view is unaffected.
    assert_eq!(
        archive
            .entry_with_version(0, Version::Unchanged)
            .unwrap()
            .name_raw(),
        b"a.txt"
    );
}

#[test]
fn test_out_of_range_index() {
    let storage = three_entries();
    let mut archive = reopen(&storage);
    match archive.delete(17) {
        Err(Error::InvalidIndex { index, count }) => {
            assert_eq!(index, 17);
            assert_eq!(count, 3);
        }
        other => panic!("expected InvalidIndex, got {:?}", other),
    }
}

#[test]
fn test_delete_all_removes_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_archive_file(temp_dir.path(), "doomed.zip", &[("x", b"x"), ("y", b"y")]);

    let mut archive = Archive::open(&path, OpenFlags::empty()).unwrap();
    archive.delete(0).unwrap();
    archive.delete(1).unwrap();
    let result = archive.commit().unwrap();
    assert!(result.archive_removed);
    assert_eq!(result.entries_deleted, 2);
    assert!(!path.exists());
}

#[test]
fn test_indices_stay_stable() {
    let storage = three_entries();
    let mut archive = reopen(&storage);
    archive.delete(0).unwrap();
    let added = archive.add_bytes("d.txt", b"delta".to_vec()).unwrap();
    assert_eq!(added, 3);
    assert_eq!(archive.index_count(), 4);
    assert_eq!(archive.entry(2).unwrap().name_raw(), b"c.txt");
    assert_eq!(archive.read_entry(3).unwrap(), b"delta");

    let stored: Vec<_> = archive.unchanged_entries().map(|e| e.name_raw().to_vec()).collect();
    assert_eq!(stored, [b"a.txt".to_vec(), b"b.txt".to_vec(), b"c.txt".to_vec()]);
    let _ = archive.commit().unwrap();

    let archive = reopen(&storage);
    assert_eq!(archive.entry_by_name("d.txt").unwrap().index(), 2);
    // Indices are reassigned densely after commit.
    assert_eq!(names(&archive), ["b.txt", "c.txt", "d.txt"]);
}

// ============================================================================
// Rename
// ============================================================================

#[test]
fn test_rename_keeps_data() {
    let storage = three_entries();
    let mut archive = reopen(&storage);
    archive.rename(0, "renamed/alpha.txt").unwrap();
    assert_eq!(archive.entry(0).unwrap().name_raw(), b"renamed/alpha.txt");
    match archive.locate("a.txt", LocateFlags::empty()) {
        Err(Error::EntryNotFound { name }) => assert_eq!(name, "a.txt"),
        other => panic!("expected EntryNotFound, got {:?}", other),
    }

    let result = archive.commit().unwrap();
    assert_eq!(result.entries_reencoded, 0);

    let archive = reopen(&storage);
    let index = archive
        .locate("renamed/alpha.txt", LocateFlags::empty())
        .unwrap();
    assert_eq!(archive.read_entry(index).unwrap(), b"alpha");
}

#[test]
fn test_rename_to_existing_name_creates_duplicate() {
    let storage = three_entries();
    let mut archive = reopen(&storage);
    archive.rename(2, "a.txt").unwrap();
    assert_eq!(archive.locate("a.txt", LocateFlags::empty()).unwrap(), 0);
    let _ = archive.commit().unwrap();

    let archive = reopen(&storage);
    assert_eq!(names(&archive), ["a.txt", "b.txt", "a.txt"]);
    assert_eq!(archive.locate("a.txt", LocateFlags::empty()).unwrap(), 0);
    assert_eq!(archive.read_entry(2).unwrap(), b"charlie");
}

#[test]
fn test_locate_nocase_and_nodir() {
    let storage = create_archive(&[("Docs/ReadMe.TXT", b"read me")]).unwrap();
    let archive = reopen(&storage);
    assert_eq!(archive.locate("docs/readme.txt", LocateFlags::NOCASE).unwrap(), 0);
    assert_eq!(archive.locate("ReadMe.TXT", LocateFlags::NODIR).unwrap(), 0);
    assert!(archive.locate("readme.txt", LocateFlags::NODIR).is_err());
}

// ============================================================================
// Replace and re-encode
// ============================================================================

#[test]
fn test_replace_content() {
    let storage = three_entries();
    let mut archive = reopen(&storage);
    let new_data = text_bytes(4096);
    archive
        .replace(1, Box::new(MemorySource::new(new_data.clone())))
        .unwrap();
    assert!(archive.entry(1).unwrap().is_replaced());
    assert_eq!(archive.entry(1).unwrap().size(), Some(4096));
    assert_eq!(archive.read_entry(1).unwrap(), new_data);

    let result = archive.commit().unwrap();
    assert_eq!(result.entries_reencoded, 1);

    let archive = reopen(&storage);
    assert_eq!(archive.read_entry(1).unwrap(), new_data);
    assert_eq!(archive.read_entry(0).unwrap(), b"alpha");
}

#[test]
fn test_set_compression_reencodes() {
    let text = text_bytes(20_000);
    let storage = common::create_archive_with_result(
        zipkit::AddOptions::new().compression(CompressionMethod::Stored),
        &[("text.txt", &text)],
    )
    .unwrap()
    .0;

    let mut archive = reopen(&storage);
    assert_eq!(
        archive.entry(0).unwrap().compression_method(),
        CompressionMethod::Stored
    );
    let target = if CompressionMethod::Deflate.is_encode_supported() {
        CompressionMethod::Deflate
    } else {
        CompressionMethod::Stored
    };
    archive.set_compression(0, target, Some(9)).unwrap();
    let result = archive.commit().unwrap();
    assert_eq!(result.entries_reencoded, 1);

    let archive = reopen(&storage);
    let entry = archive.entry(0).unwrap();
    assert_eq!(entry.compression_method(), target);
    assert_eq!(entry.open(None).unwrap().read_all().unwrap(), text);
}

#[test]
fn test_commit_options_apply_to_new_entries() {
    let storage = MemorySource::empty();
    let mut archive = Archive::open_source(Box::new(storage.clone()), OpenFlags::CREATE).unwrap();
    archive.add_bytes("plain.txt", text_bytes(1000)).unwrap();
    let options = CommitOptions::default().compression(CompressionMethod::Stored);
    let _ = archive.commit_with(&options).unwrap();

    let archive = reopen(&storage);
    let entry = archive.entry(0).unwrap();
    assert_eq!(entry.compression_method(), CompressionMethod::Stored);
    assert_eq!(entry.compressed_size(), Some(1000));
}

#[test]
fn test_set_modified_rewrites_header_only() {
    let storage = three_entries();
    let mtime = Timestamp::from_unix_secs(1_234_567_890);
    let mut archive = reopen(&storage);
    archive.set_modified(2, mtime).unwrap();
    archive.set_entry_comment(2, "touched").unwrap();
    let result = archive.commit().unwrap();
    assert_eq!(result.entries_reencoded, 0);

    let archive = reopen(&storage);
    let entry = archive.entry(2).unwrap();
    assert_eq!(entry.modified(), mtime);
    assert_eq!(entry.comment(StringDecoding::Guess), "touched");
    assert_eq!(entry.open(None).unwrap().read_all().unwrap(), b"charlie");
}

// ============================================================================
// Revert and discard
// ============================================================================

#[test]
fn test_unchange_reverts_single_entry() {
    let storage = three_entries();
    let mut archive = reopen(&storage);
    archive.rename(0, "zzz.txt").unwrap();
    archive.delete(1).unwrap();
    archive.unchange(0).unwrap();
    archive.unchange(1).unwrap();

    assert_eq!(names(&archive), ["a.txt", "b.txt", "c.txt"]);
    assert!(!archive.has_changes());
    let result = archive.commit().unwrap();
    assert!(result.no_op);
}

#[test]
fn test_unchange_all_drops_additions() {
    let storage = three_entries();
    let mut archive = reopen(&storage);
    archive.add_bytes("new.txt", b"new".to_vec()).unwrap();
    archive.delete(2).unwrap();
    archive.set_comment("note").unwrap();
    archive.unchange_all().unwrap();

    assert_eq!(archive.index_count(), 3);
    assert_eq!(archive.len(Version::Current), 3);
    assert_eq!(archive.comment(StringDecoding::Guess, Version::Current), "note");

    archive.unchange_globals().unwrap();
    assert_eq!(archive.comment_raw(Version::Current), b"");
    assert!(!archive.has_changes());
}

#[test]
fn test_unchange_added_entry_drops_it() {
    let storage = three_entries();
    let mut archive = reopen(&storage);
    let index = archive.add_bytes("tmp.txt", b"tmp".to_vec()).unwrap();
    archive.unchange(index).unwrap();
    assert_eq!(archive.len(Version::Current), 3);
    let _ = archive.commit().unwrap();

    assert_eq!(names(&reopen(&storage)), ["a.txt", "b.txt", "c.txt"]);
}

#[test]
fn test_discard_leaves_bytes_identical() {
    let storage = three_entries();
    let before = storage.contents().unwrap();

    let mut archive = reopen(&storage);
    archive.delete(0).unwrap();
    archive.rename(1, "other.txt").unwrap();
    archive.add_bytes("new.txt", b"new".to_vec()).unwrap();
    archive.discard();

    assert_eq!(storage.contents().unwrap(), before);
}

#[test]
fn test_drop_without_commit_leaves_bytes_identical() {
    let storage = three_entries();
    let before = storage.contents().unwrap();
    {
        let mut archive = reopen(&storage);
        archive.delete(0).unwrap();
    }
    assert_eq!(storage.contents().unwrap(), before);
}

#[test]
fn test_entry_mut_chain() {
    let storage = three_entries();
    let mut archive = reopen(&storage);
    archive
        .entry_mut(0)
        .unwrap()
        .rename("first.txt")
        .unwrap()
        .set_comment("the first")
        .unwrap();
    let _ = archive.commit().unwrap();

    let archive = reopen(&storage);
    let entry = archive.entry(0).unwrap();
    assert_eq!(entry.name_raw(), b"first.txt");
    assert_eq!(entry.comment(StringDecoding::Guess), "the first");
}

// ============================================================================
// Files on disk
// ============================================================================

#[test]
fn test_edit_file_archive_in_place() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_archive_file(
        temp_dir.path(),
        "edit.zip",
        &[("keep.txt", b"keep"), ("drop.txt", b"drop")],
    );

    let mut archive = Archive::open(&path, OpenFlags::CHECK_CONSISTENCY).unwrap();
    archive.delete(1).unwrap();
    archive.add_bytes("added.txt", b"added".to_vec()).unwrap();
    let _ = archive.commit().unwrap();

    let archive = Archive::open_read_only(&path).unwrap();
    let contents = read_archive_contents(&archive).unwrap();
    assert_eq!(
        contents,
        vec![
            ("keep.txt".to_string(), b"keep".to_vec()),
            ("added.txt".to_string(), b"added".to_vec()),
        ]
    );
}

#[test]
fn test_read_only_archive_rejects_edits() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_archive_file(temp_dir.path(), "ro.zip", &[("a", b"a")]);
    let mut archive = Archive::open_read_only(&path).unwrap();
    match archive.delete(0) {
        Err(Error::ReadOnly) => {}
        other => panic!("expected ReadOnly, got {:?}", other),
    }
    assert!(archive.commit().unwrap().no_op);
}
