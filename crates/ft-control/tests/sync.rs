//! Push and pull against in-process agents

#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use ft_control::sync::{SyncReport, TaskProgress, TaskStatus, TransferSummary};
use ft_core::config::SyncConfig;
use ft_core::{FtError, MachineId};

use common::{control_state, register, InProcessBootstrapper, SlowAgent};

fn sync_config(window: Duration, chunk_size: usize) -> SyncConfig {
    SyncConfig {
        foreground_window: window,
        chunk_size,
    }
}

fn completed(report: SyncReport) -> TransferSummary {
    match report {
        SyncReport::Completed(summary) => summary,
        other => panic!("expected a completed transfer, got {:?}", other),
    }
}

#[tokio::test]
async fn test_file_round_trip_in_chunks() {
    let local = tempfile::tempdir().unwrap();
    let remote = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let state = control_state(
        local.path(),
        sync_config(Duration::from_secs(10), 1024),
        Arc::new(InProcessBootstrapper::new(remote.path(), cancel.clone())),
    )
    .await;
    let agent = register(&state, "box").await;

    let data: Vec<u8> = (0..5000u32).map(|i| (i * 7 % 251) as u8).collect();
    let source = local.path().join("data.bin");
    std::fs::write(&source, &data).unwrap();
    let remote_path = remote.path().join("incoming/data.bin");
    let remote_str = remote_path.to_str().unwrap();

    let pushed = completed(state.sync.push(&agent, &source, remote_str).await.unwrap());
    assert_eq!(pushed.bytes, 5000);
    assert!(!pushed.is_dir);
    assert_eq!(std::fs::read(&remote_path).unwrap(), data);

    let back = local.path().join("back/data.bin");
    let pulled = completed(state.sync.pull(&agent, remote_str, &back).await.unwrap());
    assert_eq!(pulled.bytes, 5000);
    assert_eq!(std::fs::read(&back).unwrap(), data);

    assert!(state.sync.tasks().is_empty());
    cancel.cancel();
}

#[tokio::test]
async fn test_empty_file_push() {
    let local = tempfile::tempdir().unwrap();
    let remote = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let state = control_state(
        local.path(),
        sync_config(Duration::from_secs(10), 1024),
        Arc::new(InProcessBootstrapper::new(remote.path(), cancel.clone())),
    )
    .await;
    let agent = register(&state, "box").await;

    let source = local.path().join("empty");
    std::fs::write(&source, b"").unwrap();
    let remote_path = remote.path().join("empty");

    completed(
        state
            .sync
            .push(&agent, &source, remote_path.to_str().unwrap())
            .await
            .unwrap(),
    );
    assert_eq!(std::fs::read(&remote_path).unwrap(), b"");
    cancel.cancel();
}

#[tokio::test]
async fn test_directory_round_trip() {
    let local = tempfile::tempdir().unwrap();
    let remote = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let state = control_state(
        local.path(),
        sync_config(Duration::from_secs(10), 1024),
        Arc::new(InProcessBootstrapper::new(remote.path(), cancel.clone())),
    )
    .await;
    let agent = register(&state, "box").await;

    let tree = local.path().join("project");
    std::fs::create_dir_all(tree.join("src/nested")).unwrap();
    std::fs::write(tree.join("README"), "hello").unwrap();
    std::fs::write(tree.join("src/main.rs"), "fn main() {}\n").unwrap();
    std::fs::write(tree.join("src/nested/data"), vec![9u8; 3000]).unwrap();

    let remote_tree = remote.path().join("deploy");
    let remote_str = remote_tree.to_str().unwrap();
    let pushed = completed(state.sync.push(&agent, &tree, remote_str).await.unwrap());
    assert!(pushed.is_dir);
    assert_eq!(
        std::fs::read_to_string(remote_tree.join("src/main.rs")).unwrap(),
        "fn main() {}\n"
    );

    let back = local.path().join("copy");
    let pulled = completed(state.sync.pull(&agent, remote_str, &back).await.unwrap());
    assert!(pulled.is_dir);
    assert_eq!(std::fs::read_to_string(back.join("README")).unwrap(), "hello");
    assert_eq!(std::fs::read(back.join("src/nested/data")).unwrap(), vec![9u8; 3000]);
    cancel.cancel();
}

#[tokio::test]
async fn test_sync_target_must_be_agent() {
    let local = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let state = control_state(
        local.path(),
        SyncConfig::default(),
        Arc::new(InProcessBootstrapper::new(local.path(), cancel.clone())),
    )
    .await;

    let source = local.path().join("f");
    std::fs::write(&source, "x").unwrap();

    let err = state
        .sync
        .push(&MachineId::local(), &source, "/tmp/f")
        .await
        .unwrap_err();
    assert!(matches!(err, FtError::Validation(_)));

    let err = state
        .sync
        .push(&MachineId::new("ghost"), &source, "/tmp/f")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

/// Poll a backgrounded task until it finishes, checking progress never
/// goes backwards, then check the outcome is only reported once
async fn finish_in_background(
    state: &ft_control::ControlState,
    progress: TaskProgress,
) -> TransferSummary {
    let mut last = progress.transferred;
    let summary = loop {
        tokio::time::sleep(Duration::from_millis(50)).await;
        match state.sync.status(&progress.id).unwrap() {
            TaskStatus::Running(p) => {
                assert!(p.transferred >= last);
                if let Some(total) = p.total_size {
                    assert!(p.transferred <= total);
                }
                last = p.transferred;
            }
            TaskStatus::Completed(summary) => break summary,
            TaskStatus::Failed { error, .. } => panic!("transfer failed: {}", error),
        }
    };
    assert!(state.sync.status(&progress.id).unwrap_err().is_not_found());
    summary
}

fn backgrounded(report: SyncReport) -> TaskProgress {
    match report {
        SyncReport::Background(progress) => progress,
        other => panic!("expected background hand-off, got {:?}", other),
    }
}

async fn slow_state(
    dir: &std::path::Path,
    agent: SlowAgent,
) -> (Arc<ft_control::ControlState>, MachineId) {
    let state = control_state(
        dir,
        sync_config(Duration::from_millis(100), 4),
        Arc::new(InProcessBootstrapper::slow(dir, CancellationToken::new(), agent)),
    )
    .await;
    let id = register(&state, "slow").await;
    (state, id)
}

#[tokio::test]
async fn test_slow_push_moves_to_background() {
    let local = tempfile::tempdir().unwrap();
    let (state, agent) = slow_state(
        local.path(),
        SlowAgent {
            delay: Duration::from_millis(150),
            ..SlowAgent::default()
        },
    )
    .await;

    let source = local.path().join("payload");
    std::fs::write(&source, b"0123456789abcdefghij").unwrap();

    let progress = backgrounded(state.sync.push(&agent, &source, "/srv/payload").await.unwrap());
    assert_eq!(progress.id.as_str().len(), 8);
    assert!(progress.transferred < 20);

    let summary = finish_in_background(&state, progress).await;
    assert_eq!(summary.bytes, 20);
}

#[tokio::test]
async fn test_slow_pull_moves_to_background() {
    let local = tempfile::tempdir().unwrap();
    let payload = b"the quick brown fox!".to_vec();
    let (state, agent) = slow_state(
        local.path(),
        SlowAgent {
            delay: Duration::from_millis(150),
            file: payload.clone(),
            ..SlowAgent::default()
        },
    )
    .await;

    let dest = local.path().join("pulled/fox.txt");
    let progress = backgrounded(state.sync.pull(&agent, "/srv/fox.txt", &dest).await.unwrap());
    assert!(progress.transferred < payload.len() as u64);

    let summary = finish_in_background(&state, progress).await;
    assert_eq!(summary.bytes, payload.len() as u64);
    assert!(!summary.is_dir);
    assert_eq!(std::fs::read(&dest).unwrap(), payload);
}

#[tokio::test]
async fn test_slow_directory_push_moves_to_background() {
    let local = tempfile::tempdir().unwrap();
    let (state, agent) = slow_state(
        local.path(),
        SlowAgent {
            delay: Duration::from_millis(300),
            ..SlowAgent::default()
        },
    )
    .await;

    let tree = local.path().join("site");
    std::fs::create_dir_all(tree.join("css")).unwrap();
    std::fs::write(tree.join("index.html"), "<html></html>").unwrap();
    std::fs::write(tree.join("css/main.css"), "body {}").unwrap();

    let progress = backgrounded(state.sync.push(&agent, &tree, "/srv/site").await.unwrap());
    let summary = finish_in_background(&state, progress).await;
    assert!(summary.is_dir);
    assert!(summary.bytes > 0);
}

#[tokio::test]
async fn test_slow_directory_pull_moves_to_background() {
    let local = tempfile::tempdir().unwrap();
    let source = local.path().join("source");
    std::fs::create_dir_all(source.join("docs")).unwrap();
    std::fs::write(source.join("docs/guide.md"), "# guide").unwrap();
    let archive = ft_core::archive::pack_dir(&source).unwrap();

    let (state, agent) = slow_state(
        local.path(),
        SlowAgent {
            delay: Duration::from_millis(300),
            dirs: vec!["/srv/docs-tree".to_string()],
            archive: archive.clone(),
            ..SlowAgent::default()
        },
    )
    .await;

    let dest = local.path().join("restored");
    let progress = backgrounded(state.sync.pull(&agent, "/srv/docs-tree", &dest).await.unwrap());
    assert_eq!(progress.transferred, 0);

    let summary = finish_in_background(&state, progress).await;
    assert!(summary.is_dir);
    assert_eq!(summary.bytes, archive.len() as u64);
    assert_eq!(
        std::fs::read_to_string(dest.join("docs/guide.md")).unwrap(),
        "# guide"
    );
}
