//! Playback of the featured video through an external mpv process.
//!
//! The gallery decides *what* is playing; this module only owns the process,
//! its status line and the IPC socket used for pause.

use anyhow::{Context, Result, anyhow};
use std::process::Stdio;
use tokio::{
  io::{AsyncBufReadExt, BufReader as TokioBufReader},
  process::{Child as TokioChild, Command},
  sync::mpsc,
  task::JoinHandle,
};
use tracing::{debug, info};

/// What is loaded into mpv.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlaying {
  pub video_id: String,
  pub title: String,
  pub source: String,
}

pub struct VideoPlayer {
  binary: String,
  current_process: Option<TokioChild>,
  pub now_playing: Option<NowPlaying>,
  monitor_handle: Option<JoinHandle<()>>,
  status_rx: Option<mpsc::Receiver<String>>,
  last_status: Option<String>,
  ipc_socket_path: Option<String>,
  pub paused: bool,
}

impl Default for VideoPlayer {
  fn default() -> Self {
    Self::new("mpv")
  }
}

impl VideoPlayer {
  pub fn new(binary: impl Into<String>) -> Self {
    Self {
      binary: binary.into(),
      current_process: None,
      now_playing: None,
      monitor_handle: None,
      status_rx: None,
      last_status: None,
      ipc_socket_path: None,
      paused: false,
    }
  }

  pub fn is_running(&self) -> bool {
    self.current_process.is_some()
  }

  /// Id of the video currently loaded, if any.
  pub fn playing_id(&self) -> Option<&str> {
    self.now_playing.as_ref().map(|n| n.video_id.as_str())
  }

  /// Drain status lines from mpv; also notices when mpv has exited on its own.
  pub fn poll(&mut self) -> bool {
    if let Some(rx) = &mut self.status_rx {
      while let Ok(status) = rx.try_recv() {
        self.last_status = Some(status);
      }
    }
    let exited = match self.current_process.as_mut().map(|child| child.try_wait()) {
      Some(Ok(Some(status))) => {
        debug!(code = ?status.code(), "player: mpv exited");
        true
      }
      _ => false,
    };
    if exited {
      self.current_process = None;
      self.paused = false;
    }
    exited
  }

  pub fn last_status(&self) -> Option<&str> {
    self.last_status.as_deref()
  }

  pub async fn play(&mut self, now_playing: NowPlaying) -> Result<()> {
    self.stop().await.context("Failed to stop previous playback")?;
    self.paused = false;

    let socket_path = std::env::temp_dir().join(format!("clipgrid-mpv-{}.sock", std::process::id()));
    let socket_path_str = socket_path.to_str().context("Temp dir path is not valid UTF-8")?.to_string();
    let _ = std::fs::remove_file(&socket_path);

    info!(video = %now_playing.video_id, source = %now_playing.source, "player: starting mpv");
    let mut cmd = Command::new(&self.binary);
    cmd.args([
      "--force-window=yes",
      &format!("--title={}", now_playing.title),
      "--term-status-msg=${time-pos/full} / ${duration/full} ${?pause==yes:(paused)}",
      &format!("--input-ipc-server={}", socket_path_str),
      "--",
      &now_playing.source,
    ]);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    // Undrained stderr would eventually block mpv.
    cmd.stderr(Stdio::null());
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| {
      if e.kind() == std::io::ErrorKind::NotFound {
        anyhow!("mpv not found. Install it with: brew install mpv (macOS) or apt install mpv (Linux)")
      } else {
        anyhow!(e).context("Failed to spawn mpv process")
      }
    })?;

    let stdout = child.stdout.take().context("Failed to get mpv stdout")?;
    let (tx, rx) = mpsc::channel::<String>(10);
    self.status_rx = Some(rx);

    let monitor_handle = tokio::spawn(async move {
      let mut lines = TokioBufReader::new(stdout).lines();
      while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(line).await.is_err() {
          break;
        }
      }
    });

    self.current_process = Some(child);
    self.monitor_handle = Some(monitor_handle);
    self.ipc_socket_path = Some(socket_path_str);
    self.now_playing = Some(now_playing);
    Ok(())
  }

  pub async fn toggle_pause(&mut self) -> Result<()> {
    let Some(ref socket_path) = self.ipc_socket_path else {
      return Ok(());
    };
    if !self.is_running() {
      return Ok(());
    }
    let stream = tokio::net::UnixStream::connect(socket_path).await.context("Failed to connect to mpv IPC socket")?;
    stream.writable().await.context("mpv IPC socket not writable")?;
    let cmd = b"{\"command\":[\"cycle\",\"pause\"]}\n";
    let written = stream.try_write(cmd).context("Failed to send pause command to mpv")?;
    if written < cmd.len() {
      return Err(anyhow!("Partial write to mpv IPC socket: wrote {} of {} bytes", written, cmd.len()));
    }
    self.paused = !self.paused;
    Ok(())
  }

  pub async fn stop(&mut self) -> Result<()> {
    if let Some(handle) = self.monitor_handle.take() {
      handle.abort();
      let _ = handle.await;
    }
    self.status_rx = None;
    self.last_status = None;

    self.now_playing = None;
    self.paused = false;
    if let Some(path) = self.ipc_socket_path.take() {
      let _ = std::fs::remove_file(&path);
    }

    let Some(mut child) = self.current_process.take() else {
      return Ok(());
    };
    // Closing the mpv window exits the process before we get here.
    if let Ok(Some(status)) = child.try_wait() {
      debug!(status = %status, "player: mpv already exited");
      return Ok(());
    }
    child.kill().await.context("Failed to kill mpv process")?;
    let _ = child.wait().await;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn clip() -> NowPlaying {
    NowPlaying { video_id: "1".into(), title: "Clip".into(), source: "/tmp/clip.mp4".into() }
  }

  #[tokio::test]
  async fn missing_binary_reports_install_hint() {
    let mut player = VideoPlayer::new("clipgrid-no-such-mpv");
    let err = player.play(clip()).await.unwrap_err();
    assert!(err.to_string().contains("mpv not found"));
    assert!(!player.is_running());
    assert_eq!(player.playing_id(), None);
  }

  #[tokio::test]
  async fn stop_and_pause_are_noops_when_idle() {
    let mut player = VideoPlayer::default();
    player.toggle_pause().await.unwrap();
    player.stop().await.unwrap();
    assert!(!player.paused);
    assert!(!player.poll());
  }

  #[tokio::test]
  async fn stop_after_mpv_exited_on_its_own_succeeds() {
    let mut player = VideoPlayer::default();
    let mut child = tokio::process::Command::new("true").spawn().unwrap();
    child.wait().await.unwrap();
    player.current_process = Some(child);
    player.now_playing = Some(clip());

    player.stop().await.unwrap();
    assert!(!player.is_running());
    assert_eq!(player.playing_id(), None);
  }

  #[tokio::test]
  async fn stop_kills_a_running_player() {
    let mut player = VideoPlayer::default();
    player.current_process = Some(tokio::process::Command::new("sleep").arg("30").kill_on_drop(true).spawn().unwrap());

    player.stop().await.unwrap();
    assert!(!player.is_running());
  }
}
