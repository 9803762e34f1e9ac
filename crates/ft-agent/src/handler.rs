//! Action handlers for agent requests

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use ft_core::archive;
use ft_core::{FtError, Result};
use ft_protocol::{
    content, ActionKind, AgentRequest, AgentResponse, DownloadData, DownloadResult, ExecuteData,
    ExecuteResult, TarDownloadData, TarDownloadResult, TarUploadData, TarUploadResult, UploadData,
    UploadResult,
};

use crate::state::AgentState;

/// Largest chunk a single download call will return
const MAX_DOWNLOAD_CHUNK: u64 = 64 * 1024 * 1024;

/// Serve one request, turning every failure into a `success=false` reply
pub async fn handle_request(state: &AgentState, request: AgentRequest) -> AgentResponse {
    if !state.authorize(&request.api_key) {
        tracing::warn!("Rejected {} request with bad api_key", request.action);
        return AgentResponse::err("unauthorized");
    }

    tracing::debug!("Handling {} request", request.action);

    let result = match request.action {
        ActionKind::Execute => match request.parse_data() {
            Ok(data) => respond(execute(state, data).await),
            Err(e) => Err(FtError::from(e)),
        },
        ActionKind::Upload => match request.parse_data() {
            Ok(data) => respond(upload(data).await),
            Err(e) => Err(FtError::from(e)),
        },
        ActionKind::Download => match request.parse_data() {
            Ok(data) => respond(download(data).await),
            Err(e) => Err(FtError::from(e)),
        },
        ActionKind::TarUpload => match request.parse_data() {
            Ok(data) => respond(tar_upload(data).await),
            Err(e) => Err(FtError::from(e)),
        },
        ActionKind::TarDownload => match request.parse_data() {
            Ok(data) => respond(tar_download(data).await),
            Err(e) => Err(FtError::from(e)),
        },
    };

    result.unwrap_or_else(|e| {
        tracing::warn!("{} failed: {}", request.action, e);
        AgentResponse::err(e.to_string())
    })
}

fn respond<T: serde::Serialize>(result: Result<T>) -> Result<AgentResponse> {
    Ok(AgentResponse::ok(&result?)?)
}

async fn execute(state: &AgentState, data: ExecuteData) -> Result<ExecuteResult> {
    let result = state.shell.run_in_persistent_shell(&data.command).await?;
    let cwd = if result.timed_out {
        // The shell is still busy with the command
        String::new()
    } else {
        state.shell.current_dir().await?
    };

    Ok(ExecuteResult {
        output: result.output,
        cwd,
        timed_out: result.timed_out,
    })
}

async fn upload(data: UploadData) -> Result<UploadResult> {
    let path = PathBuf::from(&data.path);
    let bytes = content::decode(&data.content)?;

    ensure_parent(&path).await?;

    let mut file = if data.offset == 0 {
        tokio::fs::File::create(&path)
            .await
            .map_err(|e| FtError::io(&path, e))?
    } else {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .await
            .map_err(|e| FtError::io(&path, e))?;
        file.seek(SeekFrom::Start(data.offset))
            .await
            .map_err(|e| FtError::io(&path, e))?;
        file
    };

    file.write_all(&bytes)
        .await
        .map_err(|e| FtError::io(&path, e))?;
    file.flush().await.map_err(|e| FtError::io(&path, e))?;

    let uploaded = data.offset + bytes.len() as u64;
    tracing::trace!("Wrote {}/{} bytes of {:?}", uploaded, data.total_size, path);
    Ok(UploadResult { uploaded })
}

async fn download(data: DownloadData) -> Result<DownloadResult> {
    let path = PathBuf::from(&data.path);
    let mut file = tokio::fs::File::open(&path)
        .await
        .map_err(|e| FtError::io(&path, e))?;
    let total_size = file
        .metadata()
        .await
        .map_err(|e| FtError::io(&path, e))?
        .len();

    let chunk_size = data.chunk_size.clamp(1, MAX_DOWNLOAD_CHUNK);
    let want = chunk_size.min(total_size.saturating_sub(data.offset));

    let mut buf = Vec::with_capacity(want as usize);
    if want > 0 {
        file.seek(SeekFrom::Start(data.offset))
            .await
            .map_err(|e| FtError::io(&path, e))?;
        (&mut file)
            .take(want)
            .read_to_end(&mut buf)
            .await
            .map_err(|e| FtError::io(&path, e))?;
    }

    let eof = data.offset + buf.len() as u64 >= total_size;
    Ok(DownloadResult {
        content: content::encode(&buf),
        eof,
        total_size,
    })
}

async fn tar_upload(data: TarUploadData) -> Result<TarUploadResult> {
    let bytes = content::decode(&data.content)?;
    let size = bytes.len() as u64;
    let dest = PathBuf::from(data.path);

    tokio::task::spawn_blocking(move || archive::unpack_into(&bytes, &dest))
        .await
        .map_err(|e| FtError::Protocol(format!("extraction task failed: {}", e)))??;

    Ok(TarUploadResult { size })
}

async fn tar_download(data: TarDownloadData) -> Result<TarDownloadResult> {
    let dir = PathBuf::from(data.path);
    let bytes = tokio::task::spawn_blocking(move || archive::pack_dir(&dir))
        .await
        .map_err(|e| FtError::Protocol(format!("archive task failed: {}", e)))??;

    Ok(TarDownloadResult {
        size: bytes.len() as u64,
        content: content::encode(&bytes),
    })
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| FtError::io(parent, e))?;
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use ft_core::config::{AgentConfig, ShellConfig};
    use tempfile::tempdir;

    use crate::shell::ShellEngine;

    async fn test_state(dir: &Path) -> AgentState {
        let shell = ShellConfig {
            working_dir: Some(dir.to_path_buf()),
            poll_interval: Duration::from_millis(20),
            settle: Duration::from_millis(20),
            ..ShellConfig::default()
        };
        let engine = ShellEngine::start(shell.clone()).await.unwrap();
        AgentState::new(
            AgentConfig {
                shell,
                ..AgentConfig::default()
            },
            "topsecret".into(),
            Arc::new(engine),
        )
    }

    fn request<T: serde::Serialize>(action: ActionKind, key: &str, data: &T) -> AgentRequest {
        AgentRequest::new(action, key, data).unwrap()
    }

    #[tokio::test]
    async fn test_rejects_bad_key() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path()).await;

        let resp = handle_request(
            &state,
            request(ActionKind::Execute, "nope", &ExecuteData { command: "ls".into() }),
        )
        .await;
        assert_eq!(resp.failure(), Some("unauthorized"));
    }

    #[tokio::test]
    async fn test_execute_reports_cwd() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path()).await;

        let resp = handle_request(
            &state,
            request(
                ActionKind::Execute,
                "topsecret",
                &ExecuteData {
                    command: "mkdir -p work && cd work && echo ready".into(),
                },
            ),
        )
        .await;
        let result: ExecuteResult = resp.decode_fields().unwrap();
        assert_eq!(result.output, "ready");
        assert!(result.cwd.ends_with("/work"));
    }

    #[tokio::test]
    async fn test_chunked_upload_then_download() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path()).await;
        let target = dir.path().join("deep/dir/file.bin");
        let path = target.to_string_lossy().to_string();

        for (offset, chunk) in [(0u64, &b"hello "[..]), (6, &b"world"[..])] {
            let resp = handle_request(
                &state,
                request(
                    ActionKind::Upload,
                    "topsecret",
                    &UploadData {
                        path: path.clone(),
                        content: content::encode(chunk),
                        offset,
                        total_size: 11,
                    },
                ),
            )
            .await;
            let result: UploadResult = resp.decode_fields().unwrap();
            assert_eq!(result.uploaded, offset + chunk.len() as u64);
        }
        assert_eq!(std::fs::read(&target).unwrap(), b"hello world");

        let resp = handle_request(
            &state,
            request(
                ActionKind::Download,
                "topsecret",
                &DownloadData {
                    path: path.clone(),
                    offset: 0,
                    chunk_size: 8,
                },
            ),
        )
        .await;
        let first: DownloadResult = resp.decode_fields().unwrap();
        assert!(!first.eof);
        assert_eq!(first.total_size, 11);
        assert_eq!(content::decode(&first.content).unwrap(), b"hello wo");

        let resp = handle_request(
            &state,
            request(
                ActionKind::Download,
                "topsecret",
                &DownloadData {
                    path,
                    offset: 8,
                    chunk_size: 8,
                },
            ),
        )
        .await;
        let second: DownloadResult = resp.decode_fields().unwrap();
        assert!(second.eof);
        assert_eq!(content::decode(&second.content).unwrap(), b"rld");
    }

    #[tokio::test]
    async fn test_download_missing_file_fails() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path()).await;

        let resp = handle_request(
            &state,
            request(
                ActionKind::Download,
                "topsecret",
                &DownloadData {
                    path: dir.path().join("absent").to_string_lossy().to_string(),
                    offset: 0,
                    chunk_size: 8,
                },
            ),
        )
        .await;
        assert!(resp.failure().unwrap().contains("absent"));
    }

    #[tokio::test]
    async fn test_malformed_data_fails() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path()).await;

        let req = AgentRequest {
            action: ActionKind::Upload,
            api_key: "topsecret".into(),
            data: serde_json::json!({ "path": 5 }),
        };
        let resp = handle_request(&state, req).await;
        assert!(!resp.success);
    }
}
