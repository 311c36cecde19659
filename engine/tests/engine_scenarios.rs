// End-to-end scenarios against a freshly formatted image
// Each test formats a temp image with the default admin/admin123 seed, then
// drives the engine the way a client session would.

use omnifs_core::{Config, OmniError, Role};
use omnifs_engine::{DirEntryInfo, ImageFormatter, OmniFs};
use tempfile::NamedTempFile;

fn fresh_image() -> (NamedTempFile, OmniFs) {
    let temp = NamedTempFile::new().expect("failed to create temp file");
    let mut config = Config::default();
    config.filesystem.total_size = 4 * 1024 * 1024;
    config.filesystem.block_size = 1024;
    config.filesystem.max_entries = 64;
    config.security.max_users = 8;
    ImageFormatter::format(temp.path(), &config).expect("format failed");
    let fs = OmniFs::init(temp.path()).expect("init failed");
    (temp, fs)
}

#[test]
fn test_scenario_create_and_list_under_directory() {
    let (_temp, mut fs) = fresh_image();
    let session = fs.user_login("admin", "admin123").unwrap();

    fs.dir_create(&session, "/docs").unwrap();
    fs.file_create(&session, "/docs/hello.txt", b"Hi").unwrap();
    assert_eq!(fs.file_read(&session, "/docs/hello.txt").unwrap(), b"Hi");

    let listing = fs.dir_list(&session, "/docs").unwrap();
    assert_eq!(
        listing,
        vec![DirEntryInfo {
            name: "hello.txt".to_string(),
            is_directory: false,
            size: 2,
        }]
    );
}

#[test]
fn test_scenario_normal_user_is_read_only() {
    let (_temp, mut fs) = fresh_image();
    let session = fs.user_login("admin", "admin123").unwrap();
    fs.user_create(&session, "bob", "bobpw", Role::Normal).unwrap();
    fs.user_logout(&session).unwrap();

    let bob = fs.user_login("bob", "bobpw").unwrap();
    assert!(matches!(
        fs.dir_create(&bob, "/x"),
        Err(OmniError::PermissionDenied(_))
    ));
}

#[test]
fn test_scenario_edit_in_place_without_extension() {
    let (_temp, mut fs) = fresh_image();
    let session = fs.user_login("admin", "admin123").unwrap();

    fs.file_create(&session, "/a", b"123").unwrap();
    fs.file_edit(&session, "/a", b"X", 1).unwrap();
    assert_eq!(fs.file_read(&session, "/a").unwrap(), b"1X3");

    assert!(matches!(
        fs.file_edit(&session, "/a", b"YY", 4),
        Err(OmniError::InvalidArgument(_))
    ));
}

#[test]
fn test_scenario_delete_restores_free_space() {
    let (_temp, mut fs) = fresh_image();
    let session = fs.user_login("admin", "admin123").unwrap();

    let before = fs.get_stats(&session).unwrap().free_space;
    fs.file_create(&session, "/b", b"x").unwrap();
    assert!(fs.get_stats(&session).unwrap().free_space < before);
    fs.file_delete(&session, "/b").unwrap();
    assert_eq!(fs.get_stats(&session).unwrap().free_space, before);
}

#[test]
fn test_scenario_rename_preserves_content() {
    let (_temp, mut fs) = fresh_image();
    let session = fs.user_login("admin", "admin123").unwrap();

    fs.file_create(&session, "/c", b"abc").unwrap();
    fs.file_rename(&session, "/c", "/d").unwrap();
    assert!(!fs.file_exists(&session, "/c").unwrap());
    assert!(fs.file_exists(&session, "/d").unwrap());
    assert_eq!(fs.file_read(&session, "/d").unwrap(), b"abc");
}

#[test]
fn test_scenario_dir_delete_requires_empty() {
    let (_temp, mut fs) = fresh_image();
    let session = fs.user_login("admin", "admin123").unwrap();

    fs.dir_create(&session, "/e").unwrap();
    fs.file_create(&session, "/e/f", b"z").unwrap();
    assert!(matches!(
        fs.dir_delete(&session, "/e"),
        Err(OmniError::DirectoryNotEmpty(_))
    ));
    fs.file_delete(&session, "/e/f").unwrap();
    fs.dir_delete(&session, "/e").unwrap();
    assert!(!fs.dir_exists(&session, "/e").unwrap());
}

#[test]
fn test_rename_back_and_forth_restores_paths() {
    let (_temp, mut fs) = fresh_image();
    let session = fs.user_login("admin", "admin123").unwrap();

    fs.dir_create(&session, "/dir").unwrap();
    fs.file_create(&session, "/dir/file", b"data").unwrap();
    fs.file_rename(&session, "/dir/file", "/moved").unwrap();
    fs.file_rename(&session, "/moved", "/dir/file").unwrap();
    assert!(fs.file_exists(&session, "/dir/file").unwrap());
    assert!(!fs.file_exists(&session, "/moved").unwrap());
    assert_eq!(fs.file_read(&session, "/dir/file").unwrap(), b"data");
}

#[test]
fn test_structural_invariants_hold_through_churn() {
    let (_temp, mut fs) = fresh_image();
    let session = fs.user_login("admin", "admin123").unwrap();

    fs.dir_create(&session, "/a").unwrap();
    fs.dir_create(&session, "/a/b").unwrap();
    for i in 0..10 {
        fs.file_create(&session, &format!("/a/b/f{}", i), format!("data{}", i).as_bytes())
            .unwrap();
    }
    for i in (0..10).step_by(2) {
        fs.file_delete(&session, &format!("/a/b/f{}", i)).unwrap();
    }
    fs.file_truncate(&session, "/a/b/f1").unwrap();
    fs.file_rename(&session, "/a/b/f3", "/a/g").unwrap();

    assert!(fs.root_is_sound());
    assert!(fs.block_accounting_balances());

    let listing = fs.dir_list(&session, "/a/b").unwrap();
    let names: Vec<&str> = listing.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["f1", "f5", "f7", "f9"]);
}

#[test]
fn test_duplicate_names_rejected_per_parent() {
    let (_temp, mut fs) = fresh_image();
    let session = fs.user_login("admin", "admin123").unwrap();

    fs.dir_create(&session, "/a").unwrap();
    fs.file_create(&session, "/a/same", b"1").unwrap();
    assert!(matches!(
        fs.file_create(&session, "/a/same", b"2"),
        Err(OmniError::AlreadyExists(_))
    ));
    assert!(matches!(
        fs.dir_create(&session, "/a/same"),
        Err(OmniError::AlreadyExists(_))
    ));
    // The same leaf name under a different parent is fine
    fs.file_create(&session, "/same", b"3").unwrap();
}

#[test]
fn test_missing_parent_reported() {
    let (_temp, mut fs) = fresh_image();
    let session = fs.user_login("admin", "admin123").unwrap();
    assert!(matches!(
        fs.file_create(&session, "/nope/file", b"x"),
        Err(OmniError::NotFound(_))
    ));
    assert!(matches!(
        fs.dir_create(&session, "/nope/dir"),
        Err(OmniError::NotFound(_))
    ));
}

#[test]
fn test_file_as_parent_rejected() {
    let (_temp, mut fs) = fresh_image();
    let session = fs.user_login("admin", "admin123").unwrap();
    fs.file_create(&session, "/plain", b"x").unwrap();
    assert!(matches!(
        fs.file_create(&session, "/plain/child", b"y"),
        Err(OmniError::NotADirectory(_))
    ));
    assert!(matches!(
        fs.dir_list(&session, "/plain"),
        Err(OmniError::NotADirectory(_))
    ));
}

#[test]
fn test_metadata_table_exhaustion() {
    let temp = NamedTempFile::new().unwrap();
    let mut config = Config::default();
    config.filesystem.total_size = 2 * 1024 * 1024;
    config.filesystem.block_size = 1024;
    config.filesystem.max_entries = 4; // root + 3
    config.security.max_users = 4;
    ImageFormatter::format(temp.path(), &config).unwrap();
    let mut fs = OmniFs::init(temp.path()).unwrap();
    let session = fs.user_login("admin", "admin123").unwrap();

    fs.dir_create(&session, "/a").unwrap();
    fs.dir_create(&session, "/b").unwrap();
    fs.dir_create(&session, "/c").unwrap();
    assert!(matches!(
        fs.dir_create(&session, "/d"),
        Err(OmniError::NoSpace(_))
    ));
    // Freeing a slot makes room again
    fs.dir_delete(&session, "/b").unwrap();
    fs.dir_create(&session, "/d").unwrap();
}
