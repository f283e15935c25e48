use super::*;

#[tokio::test]
async fn test_one_failure_does_not_disturb_siblings() {
    let temp = tempfile::tempdir().unwrap();
    let remote = FakeRemote::new();
    let mut children = Vec::new();
    for i in 0..6 {
        let id = format!("f{i}");
        remote.with_bytes(&id, vec![i as u8; 4096], 512);
        children.push(RemoteItem::file(id.as_str(), format!("file{i}.bin"), "application/octet-stream", 4096));
    }
    // Primary and fallback both fail for this one
    remote.with_content("f3", FakeContent::Fail);
    let root = root_with(children);

    let mirror = mirror(&remote, &temp);
    let mut rx = mirror.subscribe();
    let run = mirror.run(root).await.unwrap();
    let root_dir = run.root_dir().to_path_buf();
    let report = run.wait().await.unwrap();

    assert_eq!(report.succeeded, 5);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].filename, "file3.bin");
    assert!(
        report.failures[0].message.contains("no binary fallback URL"),
        "message was {}",
        report.failures[0].message
    );
    assert!(!report.is_success());

    let failed_events = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, Event::FileFailed(_)))
        .count();
    assert_eq!(failed_events, 1, "a failure is reported exactly once");

    let files = files_under(&root_dir);
    assert_eq!(files.len(), 5);
    assert!(!files.contains(&"file3.bin".to_string()), "no partial output");
    for i in [0u8, 1, 2, 4, 5] {
        let bytes = std::fs::read(root_dir.join(format!("file{i}.bin"))).unwrap();
        assert_eq!(bytes, vec![i; 4096]);
    }
}

#[tokio::test]
async fn test_failed_export_with_partial_bytes_is_removed() {
    let temp = tempfile::tempdir().unwrap();
    let remote = FakeRemote::new();
    remote.with_content("doc", FakeContent::FailAfter { partial: 2048 });
    let doc = RemoteItem::file("doc", "Report", NativeKind::Document.content_type(), 0);

    let run = mirror(&remote, &temp).run(root_with(vec![doc])).await.unwrap();
    let root_dir = run.root_dir().to_path_buf();
    let report = run.wait().await.unwrap();

    assert_eq!(report.failed, 1);
    assert!(report.failures[0].message.contains("fallback failed"));
    assert!(files_under(&root_dir).is_empty());
}

#[tokio::test]
async fn test_fork_failure_is_an_item_failure() {
    let temp = tempfile::tempdir().unwrap();
    let remote = FakeRemote::new();
    remote.fail_fork();
    let root = root_with(vec![RemoteItem::file("f", "f.txt", TEXT, 1)]);

    let run = mirror(&remote, &temp).run(root).await.unwrap();
    let report = run.wait().await.unwrap();

    assert_eq!(report.succeeded, 0);
    assert_eq!(report.failed, 1);
    assert!(report.failures[0].message.contains("fork refused"));
}

#[tokio::test]
async fn test_failures_visible_while_running() {
    let temp = tempfile::tempdir().unwrap();
    let remote = FakeRemote::new();
    remote.with_content("bad", FakeContent::Fail);
    let root = root_with(vec![RemoteItem::file("bad", "bad.bin", "application/octet-stream", 1)]);

    let run = mirror(&remote, &temp).run(root).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while run.failures().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(run.failures()[0].filename, "bad.bin");
    run.wait().await.unwrap();
}
