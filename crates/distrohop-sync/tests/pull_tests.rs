use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use httpmock::prelude::*;

use distrohop_index::{Error, Store};
use distrohop_sync::{importer_by_name, pull, PullOptions, Pulled, SyncError};

const CONTENTS: &str = "\
usr/bin/vim editors/vim\n\
usr/share/man/man1/vim.1.gz editors/vim\n\
usr/bin/nano editors/nano\n\
usr/lib/x86_64-linux-gnu/libssl.so.3 libs/libssl3\n";

fn gzip(data: &str) -> Vec<u8> {
    let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(data.as_bytes()).unwrap();
    enc.finish().unwrap()
}

fn apt_options(server: &MockServer) -> PullOptions {
    PullOptions {
        base_url: server.base_url(),
        version: "stable".to_owned(),
        repo: "main".to_owned(),
        architecture: "amd64".to_owned(),
        progress: None,
    }
}

#[test]
fn pull_roundtrip_makes_every_record_queryable() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/dists/stable/main/Contents-amd64.gz");
        then.status(200)
            .header("ETag", "\"v1\"")
            .body(gzip(CONTENTS));
    });

    let dir = tempfile::tempdir().unwrap();
    let live = Store::open(dir.path().join("db")).unwrap();
    let importer = importer_by_name("apt").unwrap();

    let outcome = pull(&apt_options(&server), &live, importer).unwrap();
    assert_eq!(outcome, Pulled::Updated);

    let vim = live.get_pkg("vim").unwrap();
    assert!(vim.tags.contains(&"bin=vim".to_owned()));
    assert!(vim.tags.contains(&"man=vim.1".to_owned()));
    assert_eq!(live.get_pkg("nano").unwrap().tags, vec!["bin=nano"]);
    let libssl = live.get_pkg("libssl3").unwrap();
    assert!(libssl.tags.contains(&"lib=ssl".to_owned()));

    // The shard records the upstream freshness data.
    assert_eq!(live.get_meta().unwrap().etag, "\"v1\"");

    // And the search path sees the new contents through the filters.
    let (results, _) = live.search(&["bin=vim".to_owned()]).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].package.name, "vim");
}

#[test]
fn unchanged_etag_short_circuits_as_up_to_date() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/dists/stable/main/Contents-amd64.gz");
        then.status(200)
            .header("ETag", "\"same\"")
            .body(gzip(CONTENTS));
    });

    let dir = tempfile::tempdir().unwrap();
    let live = Store::open(dir.path().join("db")).unwrap();
    let importer = importer_by_name("apt").unwrap();

    assert_eq!(
        pull(&apt_options(&server), &live, importer).unwrap(),
        Pulled::Updated
    );
    assert_eq!(
        pull(&apt_options(&server), &live, importer).unwrap(),
        Pulled::UpToDate
    );
    mock.assert_hits(2);

    // The up-to-date path must not leave a shadow directory behind.
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("distrohop-pull."))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn unchanged_last_modified_short_circuits_as_up_to_date() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/dists/stable/main/Contents-amd64.gz");
        then.status(200)
            .header("Last-Modified", "Sun, 06 Nov 1994 08:49:37 GMT")
            .body(gzip(CONTENTS));
    });

    let dir = tempfile::tempdir().unwrap();
    let live = Store::open(dir.path().join("db")).unwrap();
    let importer = importer_by_name("apt").unwrap();

    assert_eq!(
        pull(&apt_options(&server), &live, importer).unwrap(),
        Pulled::Updated
    );
    assert_eq!(
        pull(&apt_options(&server), &live, importer).unwrap(),
        Pulled::UpToDate
    );
}

#[test]
fn all_urls_failing_surfaces_joined_errors() {
    // No mocks: both the canonical and the pre-Wheezy URL 404.
    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let live = Store::open(dir.path().join("db")).unwrap();
    let importer = importer_by_name("apt").unwrap();

    match pull(&apt_options(&server), &live, importer) {
        Err(SyncError::Http { errors }) => assert_eq!(errors.len(), 2),
        other => panic!("expected Http error, got {other:?}"),
    }
    // Nothing was ever written.
    assert!(matches!(live.get_meta(), Err(Error::NotFound)));
}

#[test]
fn broken_index_leaves_live_shard_untouched() {
    let server = MockServer::start();
    let mut good = server.mock(|when, then| {
        when.method(GET).path("/dists/stable/main/Contents-amd64.gz");
        then.status(200)
            .header("ETag", "\"v1\"")
            .body(gzip(CONTENTS));
    });

    let dir = tempfile::tempdir().unwrap();
    let live = Store::open(dir.path().join("db")).unwrap();
    let importer = importer_by_name("apt").unwrap();
    pull(&apt_options(&server), &live, importer).unwrap();

    good.delete();
    server.mock(|when, then| {
        when.method(GET).path("/dists/stable/main/Contents-amd64.gz");
        then.status(200)
            .header("ETag", "\"v2\"")
            .body(b"this is not a gzip stream".to_vec());
    });

    match pull(&apt_options(&server), &live, importer) {
        Err(SyncError::InvalidIndex) => {}
        other => panic!("expected InvalidIndex, got {other:?}"),
    }

    // Old contents and metadata still live.
    assert_eq!(live.get_meta().unwrap().etag, "\"v1\"");
    assert!(live.get_pkg("vim").is_ok());

    // The failed shadow shard was cleaned up.
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("distrohop-pull."))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn progress_callback_observes_the_download() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/dists/stable/main/Contents-amd64.gz");
        then.status(200).body(gzip(CONTENTS));
    });

    let dir = tempfile::tempdir().unwrap();
    let live = Store::open(dir.path().join("db")).unwrap();
    let importer = importer_by_name("apt").unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let mut opts = apt_options(&server);
    opts.progress = Some(Arc::new(move |title: &str, _received, _total| {
        assert_eq!(title, "stable/main/amd64");
        seen.fetch_add(1, Ordering::SeqCst);
    }));

    pull(&opts, &live, importer).unwrap();
    assert!(calls.load(Ordering::SeqCst) > 0);
}

#[test]
fn pacman_pull_roundtrip() {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, contents) in [
        ("ripgrep-14.1.0-1/desc", "%NAME%\nripgrep\n"),
        (
            "ripgrep-14.1.0-1/files",
            "%FILES%\nusr/\nusr/bin/\nusr/bin/rg\n",
        ),
    ] {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, contents.as_bytes())
            .unwrap();
    }
    let tarball = builder.into_inner().unwrap();
    let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(&tarball).unwrap();
    let files_db = enc.finish().unwrap();

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/core/os/x86_64/core.files");
        then.status(200).body(files_db);
    });

    let dir = tempfile::tempdir().unwrap();
    let live = Store::open(dir.path().join("db")).unwrap();
    let importer = importer_by_name("pacman").unwrap();

    let opts = PullOptions {
        base_url: format!("{}/$repo/os/$arch", server.base_url()),
        version: String::new(),
        repo: "core".to_owned(),
        architecture: "x86_64".to_owned(),
        progress: None,
    };
    assert_eq!(pull(&opts, &live, importer).unwrap(), Pulled::Updated);
    assert_eq!(live.get_pkg("ripgrep").unwrap().tags, vec!["bin=rg"]);
}
