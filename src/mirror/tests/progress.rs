use super::*;

const MB: usize = 1024 * 1024;

#[tokio::test]
async fn test_progress_rises_monotonically_to_one() {
    let temp = tempfile::tempdir().unwrap();
    let remote = FakeRemote::new();
    remote.with_bytes("big", vec![0xAB; 10 * MB], MB);
    let root = root_with(vec![RemoteItem::file(
        "big",
        "big.bin",
        "application/octet-stream",
        (10 * MB) as u64,
    )]);

    let mirror = mirror(&remote, &temp);
    let mut rx = mirror.subscribe();
    let run = mirror.run(root).await.unwrap();
    let report = run.wait().await.unwrap();

    let fractions: Vec<f64> = drain(&mut rx)
        .into_iter()
        .filter_map(|event| match event {
            Event::Progress { fraction, .. } => Some(fraction),
            _ => None,
        })
        .collect();

    assert!(fractions.len() >= 11, "one update per chunk, got {fractions:?}");
    assert_eq!(fractions.first().copied(), Some(0.0));
    assert_eq!(fractions.last().copied(), Some(1.0));
    assert!(
        fractions.windows(2).all(|w| w[0] <= w[1]),
        "progress went backwards: {fractions:?}"
    );
    assert_eq!(report.bytes_processed, (10 * MB) as u64);
}

#[tokio::test]
async fn test_unit_bytes_match_reported_size() {
    let temp = tempfile::tempdir().unwrap();
    let remote = FakeRemote::new();
    remote.with_bytes("a", vec![1; 5000], 1000);
    remote.with_bytes("b", vec![2; 123], 50);
    let root = root_with(vec![
        RemoteItem::file("a", "a.bin", "application/octet-stream", 5000),
        RemoteItem::file("b", "b.bin", "application/octet-stream", 123),
    ]);

    let mirror = mirror(&remote, &temp);
    let run = mirror.run(root).await.unwrap();
    let root_dir = run.root_dir().to_path_buf();

    // Poll handles until both units settle
    let transfers = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let transfers = run.transfers();
            if transfers.len() == 2 && transfers.iter().all(|t| t.state.is_terminal()) {
                return transfers;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    run.wait().await.unwrap();

    for transfer in transfers {
        assert_eq!(transfer.state, TransferState::Succeeded);
        assert_eq!(transfer.bytes_done, transfer.bytes_total, "{}", transfer.name);
        assert_eq!(transfer.fraction, 1.0);
    }
    assert_eq!(std::fs::metadata(root_dir.join("a.bin")).unwrap().len(), 5000);
    assert_eq!(std::fs::metadata(root_dir.join("b.bin")).unwrap().len(), 123);
}

#[tokio::test]
async fn test_event_stream_frames_the_run() {
    let temp = tempfile::tempdir().unwrap();
    let remote = FakeRemote::new();
    let root = root_with(vec![RemoteItem::file("f", "f.txt", TEXT, 1)]);

    let mirror = mirror(&remote, &temp);
    let mut rx = mirror.subscribe();
    mirror.run(root).await.unwrap().wait().await.unwrap();

    let events = drain(&mut rx);
    assert!(matches!(events.first(), Some(Event::RunStarted { .. })));
    assert!(matches!(
        events.last(),
        Some(Event::RunFinished {
            succeeded: 1,
            failed: 0,
            cancelled: 0
        })
    ));
    assert!(events.iter().any(|e| matches!(e, Event::TransferQueued { name, .. } if name == "f.txt")));
    assert!(events.iter().any(|e| matches!(e, Event::Status { message } if message == "Completed: f.txt")));
}
