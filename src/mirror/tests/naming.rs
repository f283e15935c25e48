use super::*;

#[tokio::test]
async fn test_colliding_children_get_distinct_names() {
    let temp = tempfile::tempdir().unwrap();
    let remote = FakeRemote::new();
    let root = root_with(vec![
        RemoteItem::file("a1", "A.txt", TEXT, 2),
        RemoteItem::file("a2", "A.txt", TEXT, 2),
        RemoteItem::file("a3", "a.TXT", TEXT, 2),
    ]);

    let run = mirror(&remote, &temp).run(root).await.unwrap();
    let root_dir = run.root_dir().to_path_buf();
    let report = run.wait().await.unwrap();

    assert_eq!(report.succeeded, 3);
    assert_eq!(files_under(&root_dir), vec!["A.txt", "A_1.txt", "a_2.TXT"]);
}

#[tokio::test]
async fn test_reports_folder_keeps_both_files() {
    let temp = tempfile::tempdir().unwrap();
    let remote = FakeRemote::new();
    remote.with_bytes("first", b"one".to_vec(), 8);
    remote.with_bytes("second", b"two".to_vec(), 8);
    let reports = RemoteItem::folder("reports", "Reports").with_children(vec![
        Arc::new(RemoteItem::file("first", "A.txt", TEXT, 3)),
        Arc::new(RemoteItem::file("second", "A.txt", TEXT, 3)),
    ]);
    let root = root_with(vec![reports]);

    let run = mirror(&remote, &temp).run(root).await.unwrap();
    let root_dir = run.root_dir().to_path_buf();
    run.wait().await.unwrap();

    assert_eq!(
        files_under(&root_dir),
        vec!["Reports/A.txt", "Reports/A_1.txt"]
    );
    let mut contents = vec![
        std::fs::read(root_dir.join("Reports/A.txt")).unwrap(),
        std::fs::read(root_dir.join("Reports/A_1.txt")).unwrap(),
    ];
    contents.sort();
    assert_eq!(contents, vec![b"one".to_vec(), b"two".to_vec()]);
}

#[tokio::test]
async fn test_folder_and_file_with_same_name() {
    let temp = tempfile::tempdir().unwrap();
    let remote = FakeRemote::new();
    let root = root_with(vec![
        RemoteItem::folder("d", "Notes").with_children(vec![Arc::new(RemoteItem::file(
            "inner", "inside.txt", TEXT, 1,
        ))]),
        RemoteItem::file("f", "Notes", "application/octet-stream", 1),
    ]);

    let run = mirror(&remote, &temp).run(root).await.unwrap();
    let root_dir = run.root_dir().to_path_buf();
    run.wait().await.unwrap();

    // The folder claims "Notes" first; the file moves aside
    assert_eq!(files_under(&root_dir), vec!["Notes/inside.txt", "Notes_1"]);
}

#[tokio::test]
async fn test_illegal_characters_are_stripped() {
    let temp = tempfile::tempdir().unwrap();
    let remote = FakeRemote::new();
    let root = root_with(vec![RemoteItem::file("q", "Q1: plan?", TEXT, 1)]);

    let run = mirror(&remote, &temp).run(root).await.unwrap();
    let root_dir = run.root_dir().to_path_buf();
    run.wait().await.unwrap();

    assert_eq!(files_under(&root_dir), vec!["Q1 plan.txt"]);
}

#[tokio::test]
async fn test_docs_get_export_extension() {
    let temp = tempfile::tempdir().unwrap();
    let remote = FakeRemote::new();
    let root = root_with(vec![RemoteItem::file(
        "doc",
        "Minutes",
        NativeKind::Document.content_type(),
        0,
    )]);

    let run = mirror(&remote, &temp).run(root).await.unwrap();
    let root_dir = run.root_dir().to_path_buf();
    run.wait().await.unwrap();

    assert_eq!(files_under(&root_dir), vec!["Minutes.docx"]);
    assert_eq!(remote.export_calls(), 1);
}
