//! End-to-end tests of the mirror against a mock API
//!
//! Every test runs a real [`ApiClient`](thingmirror::ApiClient) against a
//! `wiremock` server and inspects the resulting tree on disk.

mod common;

use common::{
    TEST_API_KEY, assert_snapshot, download_requests, entries, file_body, mirror_for,
    mount_listing, mount_thing, test_config,
};
use tempfile::TempDir;
use thingmirror::{Event, Grouping, GroupingReport, SyncOutcome};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_thing_mirrored_through_pool() {
    let server = MockServer::start().await;
    mount_thing(
        &server,
        101,
        "Gear Box",
        &[("gear.stl", "2021-04-01 10:00:00"), ("box.stl", "2021-04-02 11:00:00")],
    )
    .await;
    let temp_dir = TempDir::new().unwrap();
    let mirror = mirror_for(test_config(temp_dir.path(), &server));
    let mut events = mirror.subscribe();

    let pool = mirror.start_pool();
    pool.enqueue(thingmirror::ArtifactId::from("101")).unwrap();
    pool.shutdown().await;

    let dir = temp_dir.path().join("101 - gear box");
    assert_snapshot(&dir, "2021-04-02 11:00:00");
    assert_eq!(
        std::fs::read_to_string(dir.join("gear.stl")).unwrap(),
        file_body(101, "gear.stl")
    );
    assert!(dir.join("images").join("main.jpg").is_file());
    assert!(dir.join("license.txt").is_file());
    assert!(dir.join("readme.txt").is_file());

    let manifest = std::fs::read_to_string(dir.join("filelist.txt")).unwrap();
    assert!(!manifest.contains(TEST_API_KEY));

    assert!(matches!(events.recv().await.unwrap(), Event::Queued { .. }));
}

#[tokio::test]
async fn test_incremental_update_fetches_only_changed_files() {
    let server = MockServer::start().await;
    mount_thing(&server, 7, "Cube", &[("a.stl", "2020-01-01 00:00:00")]).await;
    let temp_dir = TempDir::new().unwrap();
    let mirror = mirror_for(test_config(temp_dir.path(), &server));

    assert_eq!(mirror.sync_thing("7").await, SyncOutcome::Ok);
    assert_eq!(mirror.sync_thing("7").await, SyncOutcome::AlreadyDownloaded);

    server.reset().await;
    mount_thing(
        &server,
        7,
        "Cube",
        &[("a.stl", "2020-01-01 00:00:00"), ("b.stl", "2020-05-05 05:05:05")],
    )
    .await;

    assert_eq!(mirror.sync_thing("7").await, SyncOutcome::Ok);
    assert_eq!(download_requests(&server).await, vec!["/download/7/b.stl"]);

    assert_snapshot(&temp_dir.path().join("7 - cube"), "2020-05-05 05:05:05");
    assert_eq!(
        entries(temp_dir.path()),
        vec!["7 - cube", "7 - cube - 2020-01-01 00.00.00"]
    );
}

#[tokio::test]
async fn test_designs_grouping_walks_all_pages() {
    let server = MockServer::start().await;
    mount_listing(
        &server,
        "/users/alice/things/",
        &[vec![(1, "Clip")], vec![(2, "Hook")]],
    )
    .await;
    mount_thing(&server, 1, "Clip", &[("clip.stl", "2022-01-01 00:00:00")]).await;
    mount_thing(&server, 2, "Hook", &[("hook.stl", "2022-02-02 00:00:00")]).await;
    let temp_dir = TempDir::new().unwrap();
    let mirror = mirror_for(test_config(temp_dir.path(), &server));

    let grouping = Grouping::designs("alice", temp_dir.path());
    let report = mirror.sync_grouping(&grouping).await.unwrap();

    assert_eq!(
        report,
        GroupingReport {
            total: 2,
            ok: 2,
            already_downloaded: 0,
            failed: 0,
            stopped_early: false,
        }
    );
    let root = temp_dir.path().join("alice designs");
    assert_snapshot(&root.join("1 - clip"), "2022-01-01 00:00:00");
    assert_snapshot(&root.join("2 - hook"), "2022-02-02 00:00:00");
}

#[tokio::test]
async fn test_forbidden_thing_fails_without_touching_disk() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/things/666/"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    let temp_dir = TempDir::new().unwrap();
    let mirror = mirror_for(test_config(temp_dir.path(), &server));

    assert_eq!(mirror.sync_thing("666").await, SyncOutcome::Failed);
    assert!(entries(temp_dir.path()).is_empty());
}

#[tokio::test]
async fn test_failed_file_download_is_quarantined() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/download/5/bad.stl"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    mount_thing(
        &server,
        5,
        "Bracket",
        &[("good.stl", "2020-01-01 00:00:00"), ("bad.stl", "2020-01-01 00:00:00")],
    )
    .await;
    let temp_dir = TempDir::new().unwrap();
    let mirror = mirror_for(test_config(temp_dir.path(), &server));

    assert_eq!(mirror.sync_thing("5").await, SyncOutcome::Failed);
    assert_eq!(entries(temp_dir.path()), vec!["5 - bracket_failed"]);
}

#[tokio::test]
async fn test_compressed_mirror_round_trip() {
    let server = MockServer::start().await;
    mount_thing(&server, 9, "Vase", &[("vase.stl", "2023-03-03 03:03:03")]).await;
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(temp_dir.path(), &server);
    config.mirror.compress = true;
    let mirror = mirror_for(config);

    assert_eq!(mirror.sync_thing("9").await, SyncOutcome::Ok);
    assert_eq!(
        entries(temp_dir.path()),
        vec!["9 - vase - 2023-03-03 03.03.03.zip"]
    );
    assert_eq!(mirror.sync_thing("9").await, SyncOutcome::AlreadyDownloaded);
}

#[tokio::test]
async fn test_batch_file_drives_mirror() {
    let server = MockServer::start().await;
    mount_listing(&server, "/users/bob/likes/", &[vec![(3, "Knob")]]).await;
    mount_thing(&server, 3, "Knob", &[("knob.stl", "2021-01-01 00:00:00")]).await;
    mount_thing(&server, 4, "Lever", &[("lever.stl", "2021-01-01 00:00:00")]).await;
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("mirror");
    let mirror = mirror_for(test_config(&target, &server));

    let batch = temp_dir.path().join("batch.txt");
    std::fs::write(&batch, "likes bob\nnonsense here\n\nthing 4\n").unwrap();
    mirror.run_batch(&batch).await.unwrap();

    assert_snapshot(&target.join("bob likes").join("3 - knob"), "2021-01-01 00:00:00");
    assert_snapshot(&target.join("4 - lever"), "2021-01-01 00:00:00");
}
