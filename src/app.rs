use anyhow::Result;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::catalog::{Video, resolve_asset};
use crate::config::Config;
use crate::constants::constants;
use crate::display::DisplayMode;
use crate::extract::{ExtractEvent, Extractor, FrameGrabber, spawn_extraction};
use crate::gallery::Gallery;
use crate::graphics::{GraphicsCache, ThumbCache};
use crate::player::{NowPlaying, VideoPlayer};
use crate::theme::{self, THEMES};

/// Grid cursor movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Move {
  Left,
  Right,
  Up,
  Down,
}

/// Background thumbnail pass: receiver, handle, and last reported progress.
#[derive(Default)]
pub(crate) struct ExtractionTask {
  pub(crate) started: bool,
  pub(crate) rx: Option<mpsc::UnboundedReceiver<ExtractEvent>>,
  pub(crate) handle: Option<JoinHandle<()>>,
  pub(crate) progress: Option<(usize, usize)>,
}

pub struct App {
  pub gallery: Gallery,
  pub player: VideoPlayer,
  pub theme_index: usize,
  pub display_mode: DisplayMode,
  /// Index into the visible page.
  pub cursor: usize,
  pub grid_columns: usize,
  pub last_error: Option<String>,
  pub should_quit: bool,
  pub gfx: GraphicsCache,
  pub thumb_cache: ThumbCache,
  pub(crate) extraction: ExtractionTask,
  assets_root: PathBuf,
  config: Config,
  /// When the last error was set, for auto-dismiss.
  error_time: Option<Instant>,
}

impl App {
  pub fn new(
    gallery: Gallery,
    player: VideoPlayer,
    display_mode: DisplayMode,
    assets_root: PathBuf,
    config: Config,
  ) -> Self {
    let theme_index = theme::index_of(config.theme_name.as_deref());
    Self {
      gallery,
      player,
      theme_index,
      display_mode,
      cursor: 0,
      grid_columns: constants().grid_columns.max(1),
      last_error: None,
      should_quit: false,
      gfx: GraphicsCache::default(),
      thumb_cache: ThumbCache::default(),
      extraction: ExtractionTask::default(),
      assets_root,
      config,
      error_time: None,
    }
  }

  pub fn theme(&self) -> &'static crate::theme::Theme {
    // theme_index comes from theme::index_of or modular arithmetic in next_theme()
    &THEMES[self.theme_index]
  }

  /// Set an error message with auto-dismiss tracking.
  pub fn set_error(&mut self, msg: String) {
    self.last_error = Some(msg);
    self.error_time = Some(Instant::now());
  }

  pub fn clear_error(&mut self) {
    self.last_error = None;
    self.error_time = None;
  }

  /// Clear stale error messages.
  pub fn expire_error(&mut self) {
    if let Some(t) = self.error_time
      && t.elapsed() >= Duration::from_secs(constants().error_dismiss_secs)
    {
      self.clear_error();
    }
  }

  pub fn next_theme(&mut self) {
    self.theme_index = (self.theme_index + 1) % THEMES.len();
    self.config.theme_name = Some(self.theme().name.to_string());
    self.config.save();
  }

  // --- Thumbnail extraction ---

  /// Start the one background pass for this session. Later calls are ignored.
  pub fn start_extraction<G: FrameGrabber + 'static>(&mut self, extractor: Extractor<G>) {
    if self.extraction.started {
      debug!("app: extraction already started, ignoring");
      return;
    }
    let (tx, rx) = mpsc::unbounded_channel();
    self.extraction = ExtractionTask {
      started: true,
      rx: Some(rx),
      handle: Some(spawn_extraction(extractor, tx)),
      progress: Some((0, self.gallery.catalog().len())),
    };
  }

  /// Status line text while the pass is running.
  pub fn extraction_status(&self) -> Option<String> {
    self.extraction.progress.map(|(done, total)| format!("Extracting thumbnails {}/{}…", done, total))
  }

  fn drain_extraction(&mut self) {
    let Some(mut rx) = self.extraction.rx.take() else { return };
    loop {
      match rx.try_recv() {
        Ok(ExtractEvent::Progress { done, total }) => {
          self.extraction.progress = Some((done, total));
        }
        Ok(ExtractEvent::Finished(map)) => {
          if map.is_empty() {
            warn!("app: no thumbnails could be extracted, every video uses the fallback");
          }
          info!(thumbnails = map.len(), total = self.gallery.catalog().len(), "app: thumbnails installed");
          self.gallery.install_thumbnails(map);
          debug!(entries = self.thumb_cache.len(), "app: dropping resized thumbnails");
          self.thumb_cache.clear();
          self.gfx.invalidate();
          self.extraction.progress = None;
          self.extraction.handle = None;
          return;
        }
        Err(TryRecvError::Empty) => {
          self.extraction.rx = Some(rx);
          return;
        }
        Err(TryRecvError::Disconnected) => {
          warn!("app: extraction task ended without a result");
          self.extraction.progress = None;
          self.extraction.handle = None;
          self.set_error("Thumbnail extraction stopped unexpectedly.".to_string());
          return;
        }
      }
    }
  }

  pub async fn check_pending(&mut self) -> Result<()> {
    self.expire_error();
    self.drain_extraction();

    if self.player.poll() {
      // mpv closed by the user; keep the video featured as a poster.
      let _ = self.player.stop().await;
      if self.gallery.stop() {
        debug!("app: player exited, showing poster");
      }
    }
    Ok(())
  }

  // --- Categories / pages / cursor ---

  pub fn select_category_at(&mut self, index: usize) {
    let Some(name) = self.gallery.categories().get(index).cloned() else { return };
    if self.gallery.select_category(&name) {
      self.cursor = 0;
    }
  }

  /// Cycle through the category buttons.
  pub fn next_category(&mut self, forward: bool) {
    let categories = self.gallery.categories();
    let len = categories.len();
    if len == 0 {
      return;
    }
    let current = categories.iter().position(|c| c == self.gallery.category()).unwrap_or(0);
    let next = if forward { (current + 1) % len } else { (current + len - 1) % len };
    self.select_category_at(next);
  }

  pub fn next_page(&mut self) {
    if self.gallery.next_page() {
      self.clamp_cursor();
    }
  }

  pub fn previous_page(&mut self) {
    if self.gallery.previous_page() {
      self.clamp_cursor();
    }
  }

  fn clamp_cursor(&mut self) {
    let visible = self.gallery.visible().len();
    self.cursor = self.cursor.min(visible.saturating_sub(1));
  }

  pub fn move_cursor(&mut self, dir: Move) {
    let visible = self.gallery.visible().len();
    if visible == 0 {
      self.cursor = 0;
      return;
    }
    let cols = self.grid_columns;
    let col = self.cursor % cols;
    self.cursor = match dir {
      Move::Left if col > 0 => self.cursor - 1,
      Move::Right if col + 1 < cols => self.cursor + 1,
      Move::Up if self.cursor >= cols => self.cursor - cols,
      Move::Down => self.cursor + cols,
      _ => self.cursor,
    };
    self.clamp_cursor();
  }

  /// The video under the grid cursor.
  pub fn cursor_video(&self) -> Option<&Video> {
    self.gallery.visible().get(self.cursor).copied()
  }

  // --- Playback ---

  /// Select the video under the cursor and start playing it.
  pub async fn play_cursor(&mut self) {
    let Some(id) = self.cursor_video().map(|v| v.id.clone()) else { return };
    if self.gallery.select_video(&id) {
      self.start_player().await;
    }
  }

  /// Play whatever the featured panel shows.
  pub async fn activate_featured(&mut self) {
    self.gallery.activate_featured();
    self.start_player().await;
  }

  async fn start_player(&mut self) {
    let Some(video) = self.gallery.featured() else { return };
    if self.player.is_running() && self.player.playing_id() == Some(video.id.as_str()) {
      return;
    }
    let now_playing = NowPlaying {
      video_id: video.id.clone(),
      title: video.title.clone(),
      source: resolve_asset(&video.video_url, &self.assets_root),
    };
    self.clear_error();
    if let Err(e) = self.player.play(now_playing).await {
      self.set_error(format!("Playback error: {:#}", e));
      let _ = self.player.stop().await;
      self.gallery.stop();
    }
  }

  pub async fn toggle_pause(&mut self) {
    if !self.gallery.is_playing() {
      return;
    }
    if let Err(e) = self.player.toggle_pause().await {
      self.set_error(format!("Pause failed: {:#}", e));
    }
  }

  pub async fn stop(&mut self) {
    if self.gallery.stop()
      && let Err(e) = self.player.stop().await
    {
      self.set_error(format!("Stop failed: {:#}", e));
    }
  }

  /// Cancel background work and close mpv.
  pub async fn shutdown(&mut self) {
    if let Some(handle) = self.extraction.handle.take() {
      debug!("app: aborting extraction pass");
      handle.abort();
    }
    self.extraction.rx = None;
    let _ = self.player.stop().await;
  }
}

#[cfg(test)]
pub(crate) mod testing {
  use super::*;
  use crate::catalog::Catalog;
  use crate::extract::Thumbnail;
  use std::sync::Arc;

  /// App over the embedded catalog with an mpv binary that does not exist.
  pub(crate) fn app() -> App {
    let catalog = Arc::new(Catalog::embedded().unwrap());
    let gallery = Gallery::new(catalog, 6, Thumbnail::placeholder(4, 4));
    App::new(
      gallery,
      VideoPlayer::new("clipgrid-no-such-mpv"),
      DisplayMode::Ascii,
      PathBuf::from("public"),
      Config::default(),
    )
  }
}
