//! Thumbnail extraction pipeline.
//!
//! For every video in the catalog: open the clip off-screen (ffmpeg), seek to a
//! fixed timestamp, grab one frame at native size and encode it as a JPEG data
//! URI. Videos are processed in catalog order with a bounded concurrency
//! (default 1) and a per-video timeout. A failure only drops that video's entry;
//! the consolidated `ThumbnailMap` is published once, after every video has
//! been attempted.

use anyhow::{Context, Result, anyhow};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use futures::stream::{self, StreamExt};
use image::{DynamicImage, ImageError, Rgb, RgbImage, codecs::jpeg::JpegEncoder};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, Video, resolve_asset};
use crate::constants::constants;

// --- Errors ---

/// Why a single video produced no thumbnail.
#[derive(Debug, Error)]
pub enum FailureCause {
  #[error("timed out after {0:?}")]
  TimedOut(Duration),
  #[error("{0:#}")]
  Media(anyhow::Error),
  #[error("frame encode failed: {0}")]
  Encode(#[from] ImageError),
}

/// The only error kind of the pipeline. Caught per video, logged, never surfaced.
#[derive(Debug, Error)]
#[error("thumbnail extraction failed for video {video_id}: {cause}")]
pub struct ExtractionFailure {
  pub video_id: String,
  pub cause: FailureCause,
}

// --- Thumbnails ---

/// A single extracted still: the lossy-encoded bytes plus the decoded frame
/// used for terminal rendering.
#[derive(Clone)]
pub struct Thumbnail {
  jpeg: Arc<[u8]>,
  image: Arc<DynamicImage>,
}

impl std::fmt::Debug for Thumbnail {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Thumbnail")
      .field("width", &self.width())
      .field("height", &self.height())
      .field("jpeg_bytes", &self.jpeg.len())
      .finish()
  }
}

impl Thumbnail {
  /// Encode a captured frame as JPEG at `quality` (1-100).
  pub fn encode(frame: DynamicImage, quality: u8) -> Result<Self, ImageError> {
    let rgb = frame.to_rgb8();
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100)).encode_image(&rgb)?;
    Ok(Self { jpeg: jpeg.into(), image: Arc::new(DynamicImage::ImageRgb8(rgb)) })
  }

  /// Neutral placeholder used when no fallback image could be loaded.
  pub fn placeholder(width: u32, height: u32) -> Self {
    let (w, h) = (width.max(1), height.max(1));
    let img = RgbImage::from_fn(w, h, |_, y| {
      let shade = 72u32 + (y * 64 / h);
      let s = shade.min(u8::MAX as u32) as u8;
      Rgb([s, s, s.saturating_add(8)])
    });
    let jpeg = {
      let mut buf = Vec::new();
      // Encoding an in-memory RGB buffer cannot fail short of OOM; an empty
      // payload still renders through `image`.
      let _ = JpegEncoder::new_with_quality(&mut buf, constants().jpeg_quality).encode_image(&img);
      buf
    };
    Self { jpeg: jpeg.into(), image: Arc::new(DynamicImage::ImageRgb8(img)) }
  }

  /// Encode a loaded image, or the generated placeholder if encoding fails.
  pub fn from_image(image: DynamicImage) -> Self {
    let c = constants();
    Self::encode(image, c.jpeg_quality).unwrap_or_else(|e| {
      warn!(err = %e, "thumbnail: fallback image could not be encoded, using generated placeholder");
      Self::placeholder(c.placeholder_width, c.placeholder_height)
    })
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn image(&self) -> &DynamicImage {
    &self.image
  }

  pub fn jpeg_bytes(&self) -> &[u8] {
    &self.jpeg
  }

  /// `data:image/jpeg;base64,...` reference for the still.
  pub fn data_uri(&self) -> String {
    format!("data:image/jpeg;base64,{}", BASE64.encode(self.jpeg_bytes()))
  }
}

/// Immutable id → thumbnail snapshot, published once per extraction pass.
#[derive(Clone, Default, Debug)]
pub struct ThumbnailMap(Arc<HashMap<String, Thumbnail>>);

impl ThumbnailMap {
  pub fn new(entries: HashMap<String, Thumbnail>) -> Self {
    Self(Arc::new(entries))
  }

  pub fn get(&self, id: &str) -> Option<&Thumbnail> {
    self.0.get(id)
  }

  #[cfg(test)]
  pub fn contains(&self, id: &str) -> bool {
    self.0.contains_key(id)
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Sorted id → data URI pairs, for the headless dump.
  pub fn to_data_uris(&self) -> BTreeMap<String, String> {
    self.0.iter().map(|(id, thumb)| (id.clone(), thumb.data_uri())).collect()
  }
}

// --- Frame grabbing ---

/// Off-screen frame capture: open `source`, seek to `at`, return the frame.
pub trait FrameGrabber: Send + Sync {
  fn grab(&self, source: &str, at: Duration) -> impl Future<Output = Result<DynamicImage>> + Send;
}

/// Captures frames by piping a single PNG out of ffmpeg.
pub struct FfmpegGrabber {
  binary: PathBuf,
}

impl FfmpegGrabber {
  pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
    Self { binary: binary.into() }
  }

  async fn capture(&self, source: &str, at: Duration) -> Result<Vec<u8>> {
    let seek = format!("{:.3}", at.as_secs_f64());
    let output = Command::new(&self.binary)
      .args([
        "-hide_banner",
        "-loglevel",
        "error",
        "-ss",
        &seek,
        "-i",
        source,
        "-frames:v",
        "1",
        "-f",
        "image2pipe",
        "-c:v",
        "png",
        "pipe:1",
      ])
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      // A timed-out capture drops this future; take ffmpeg down with it.
      .kill_on_drop(true)
      .output()
      .await
      .map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
          anyhow!("ffmpeg not found. Install it with: brew install ffmpeg (macOS) or apt install ffmpeg (Linux)")
        } else {
          anyhow!(e).context("Failed to execute ffmpeg")
        }
      })?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      return Err(anyhow!("ffmpeg failed to load {}: {}", source, stderr.lines().last().unwrap_or("unknown error")));
    }
    Ok(output.stdout)
  }
}

impl FrameGrabber for FfmpegGrabber {
  async fn grab(&self, source: &str, at: Duration) -> Result<DynamicImage> {
    let mut png = self.capture(source, at).await?;
    if png.is_empty() && !at.is_zero() {
      // Seek target is past the end of a short clip: use the first frame.
      debug!(source = %source, at = ?at, "thumbnail: no frame at seek target, retrying at 0s");
      png = self.capture(source, Duration::ZERO).await?;
    }
    if png.is_empty() {
      return Err(anyhow!("ffmpeg produced no frame for {}", source));
    }
    image::load_from_memory(&png).with_context(|| format!("Failed to decode frame from {}", source))
  }
}

// --- Extraction pass ---

#[derive(Debug, Clone)]
pub struct ExtractOptions {
  pub seek: Duration,
  pub quality: u8,
  pub concurrency: usize,
  pub timeout: Duration,
  pub assets_root: PathBuf,
}

impl Default for ExtractOptions {
  fn default() -> Self {
    let c = constants();
    Self {
      seek: c.seek_target(),
      quality: c.jpeg_quality,
      concurrency: c.extract_concurrency,
      timeout: c.extract_timeout(),
      assets_root: PathBuf::from(&c.assets_root),
    }
  }
}

/// Progress and completion of a spawned extraction pass.
#[derive(Debug)]
pub enum ExtractEvent {
  /// `done` of `total` videos attempted (success or failure).
  Progress { done: usize, total: usize },
  /// The consolidated map; sent exactly once, after the last attempt.
  Finished(ThumbnailMap),
}

pub struct Extractor<G> {
  catalog: Arc<Catalog>,
  grabber: Arc<G>,
  options: ExtractOptions,
}

impl<G: FrameGrabber + 'static> Extractor<G> {
  pub fn new(catalog: Arc<Catalog>, grabber: Arc<G>, options: ExtractOptions) -> Self {
    Self { catalog, grabber, options }
  }

  /// Extract one video's thumbnail, bounded by the per-video timeout.
  pub async fn extract_one(&self, video: &Video) -> Result<Thumbnail, ExtractionFailure> {
    let fail = |cause| ExtractionFailure { video_id: video.id.clone(), cause };
    let source = resolve_asset(&video.video_url, &self.options.assets_root);

    let frame = match tokio::time::timeout(self.options.timeout, self.grabber.grab(&source, self.options.seek)).await {
      Ok(Ok(frame)) => frame,
      Ok(Err(e)) => return Err(fail(FailureCause::Media(e))),
      Err(_) => return Err(fail(FailureCause::TimedOut(self.options.timeout))),
    };
    Thumbnail::encode(frame, self.options.quality).map_err(|e| fail(FailureCause::Encode(e)))
  }

  /// Attempt every video once and return the consolidated map.
  ///
  /// `on_progress(done, total)` fires after each attempt. Results are consumed
  /// in catalog order; with `concurrency == 1` the next video is not opened
  /// until the previous one has settled.
  pub async fn run(&self, mut on_progress: impl FnMut(usize, usize)) -> ThumbnailMap {
    let total = self.catalog.len();
    let concurrency = self.options.concurrency.max(1);
    info!(total, concurrency, timeout = ?self.options.timeout, "thumbnail: extraction pass started");

    let mut attempts = stream::iter(self.catalog.videos.clone())
      .map(|video| async move {
        let result = self.extract_one(&video).await;
        (video, result)
      })
      .buffered(concurrency);

    let mut entries = HashMap::with_capacity(total);
    let mut done = 0;
    while let Some((video, result)) = attempts.next().await {
      done += 1;
      match result {
        Ok(thumb) => {
          debug!(video = %video.id, width = thumb.width(), height = thumb.height(), "thumbnail: extracted");
          entries.insert(video.id, thumb);
        }
        Err(e) => {
          warn!(video = %video.id, title = %video.title, err = %e, "thumbnail: extraction failed, using fallback");
        }
      }
      on_progress(done, total);
    }

    info!(extracted = entries.len(), total, "thumbnail: extraction pass finished");
    ThumbnailMap::new(entries)
  }
}

/// Run one pass in the background. Progress is streamed through `tx`, followed
/// by a single `Finished`. Abort the handle to cancel.
pub fn spawn_extraction<G: FrameGrabber + 'static>(
  extractor: Extractor<G>,
  tx: mpsc::UnboundedSender<ExtractEvent>,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    let progress_tx = tx.clone();
    let map = extractor
      .run(move |done, total| {
        let _ = progress_tx.send(ExtractEvent::Progress { done, total });
      })
      .await;
    let _ = tx.send(ExtractEvent::Finished(map));
  })
}

// --- Fallback placeholder ---

/// Load the fallback image shown for videos without a thumbnail.
///
/// `reference` may be an http(s) URL or a site-relative path under
/// `assets_root`. Anything that fails to load within `timeout` degrades to a
/// generated placeholder.
pub async fn load_fallback(
  reference: &str,
  assets_root: &Path,
  client: &reqwest::Client,
  timeout: Duration,
) -> Thumbnail {
  let c = constants();
  let fetched = tokio::time::timeout(timeout, fetch_fallback(reference, assets_root, client))
    .await
    .unwrap_or_else(|_| Err(anyhow!("Timed out after {:?} loading {}", timeout, reference)));
  match fetched {
    Ok(image) => {
      debug!(reference = %reference, "thumbnail: fallback image loaded");
      Thumbnail::from_image(image)
    }
    Err(e) => {
      let err = format!("{:#}", e);
      warn!(reference = %reference, err = %err, "thumbnail: fallback unavailable, using generated placeholder");
      Thumbnail::placeholder(c.placeholder_width, c.placeholder_height)
    }
  }
}

async fn fetch_fallback(reference: &str, assets_root: &Path, client: &reqwest::Client) -> Result<DynamicImage> {
  if reference.starts_with("http://") || reference.starts_with("https://") {
    let response = client.get(reference).send().await.with_context(|| format!("Failed to fetch {}", reference))?;
    if !response.status().is_success() {
      return Err(anyhow!("Fallback fetch returned {} for {}", response.status(), reference));
    }
    let bytes = response.bytes().await.with_context(|| format!("Failed to read image bytes from {}", reference))?;
    return image::load_from_memory(&bytes).with_context(|| format!("Failed to decode image from {}", reference));
  }
  let path = resolve_asset(reference, assets_root);
  let path = path.strip_prefix("file://").unwrap_or(&path).to_string();
  tokio::task::spawn_blocking(move || image::open(&path).with_context(|| format!("Failed to open {}", path)))
    .await
    .context("Fallback loader task failed")?
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::catalog::testing::catalog_with;
  use std::collections::HashSet;
  use std::sync::Mutex as StdMutex;
  use std::sync::atomic::{AtomicUsize, Ordering};

  /// Fake capture keyed by the clip's file stem (the video id in fixtures).
  #[derive(Default)]
  struct FakeGrabber {
    failing: HashSet<String>,
    stalling: HashSet<String>,
    delay: Duration,
    opened: StdMutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
  }

  impl FakeGrabber {
    fn failing(ids: &[&str]) -> Self {
      Self { failing: ids.iter().map(|s| s.to_string()).collect(), ..Default::default() }
    }

    fn opened(&self) -> Vec<String> {
      self.opened.lock().unwrap().clone()
    }
  }

  impl FrameGrabber for FakeGrabber {
    async fn grab(&self, source: &str, _at: Duration) -> Result<DynamicImage> {
      let id = Path::new(source).file_stem().and_then(|s| s.to_str()).unwrap_or_default().to_string();
      self.opened.lock().unwrap().push(id.clone());
      let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
      self.max_active.fetch_max(now, Ordering::SeqCst);

      if !self.delay.is_zero() {
        tokio::time::sleep(self.delay).await;
      }
      if self.stalling.contains(&id) {
        std::future::pending::<()>().await;
      }
      self.active.fetch_sub(1, Ordering::SeqCst);

      if self.failing.contains(&id) {
        return Err(anyhow!("Failed to load video: /videos/{}.mp4", id));
      }
      Ok(DynamicImage::new_rgb8(16, 9))
    }
  }

  fn options(concurrency: usize, timeout: Duration) -> ExtractOptions {
    ExtractOptions {
      seek: Duration::from_secs(1),
      quality: 70,
      concurrency,
      timeout,
      assets_root: PathBuf::from("assets"),
    }
  }

  fn extractor(grabber: Arc<FakeGrabber>, counts: &[usize], concurrency: usize) -> Extractor<FakeGrabber> {
    Extractor::new(Arc::new(catalog_with(counts)), grabber, options(concurrency, Duration::from_secs(5)))
  }

  // --- run ---

  #[tokio::test]
  async fn failed_video_is_omitted_others_unaffected() {
    let grabber = Arc::new(FakeGrabber::failing(&["9"]));
    let map = extractor(grabber, &[7, 7], 1).run(|_, _| {}).await;

    assert_eq!(map.len(), 13);
    assert!(!map.contains("9"));
    for id in (1..=14).filter(|i| *i != 9) {
      assert!(map.contains(&id.to_string()), "missing thumbnail for {}", id);
    }
  }

  #[tokio::test]
  async fn sequential_pass_opens_videos_in_catalog_order_one_at_a_time() {
    let grabber = Arc::new(FakeGrabber { delay: Duration::from_millis(5), ..FakeGrabber::failing(&["2"]) });
    extractor(Arc::clone(&grabber), &[3, 2], 1).run(|_, _| {}).await;

    assert_eq!(grabber.opened(), vec!["1", "2", "3", "4", "5"]);
    assert_eq!(grabber.max_active.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn bounded_concurrency_is_respected() {
    let grabber = Arc::new(FakeGrabber { delay: Duration::from_millis(20), ..FakeGrabber::failing(&["4"]) });
    let map = extractor(Arc::clone(&grabber), &[10], 3).run(|_, _| {}).await;

    assert_eq!(map.len(), 9);
    assert!(!map.contains("4"));
    for id in (1..=10).filter(|i| *i != 4) {
      assert!(map.contains(&id.to_string()), "missing thumbnail for {}", id);
    }
    let max = grabber.max_active.load(Ordering::SeqCst);
    assert!(max <= 3, "max active {} exceeded bound", max);
    assert!(max > 1, "expected overlap with concurrency 3");
  }

  #[tokio::test]
  async fn stalled_video_times_out_and_pass_continues() {
    let grabber = Arc::new(FakeGrabber { stalling: HashSet::from(["2".to_string()]), ..Default::default() });
    let extractor =
      Extractor::new(Arc::new(catalog_with(&[4])), Arc::clone(&grabber), options(1, Duration::from_millis(50)));
    let map = extractor.run(|_, _| {}).await;

    assert!(!map.contains("2"));
    assert!(map.contains("1") && map.contains("3") && map.contains("4"));
    assert_eq!(grabber.opened(), vec!["1", "2", "3", "4"]);
  }

  #[tokio::test]
  async fn progress_reports_every_attempt() {
    let grabber = Arc::new(FakeGrabber::failing(&["1", "3"]));
    let mut seen = Vec::new();
    extractor(grabber, &[4], 1).run(|done, total| seen.push((done, total))).await;
    assert_eq!(seen, vec![(1, 4), (2, 4), (3, 4), (4, 4)]);
  }

  // --- extract_one ---

  #[tokio::test]
  async fn extract_one_reports_video_id_on_failure() {
    let grabber = Arc::new(FakeGrabber::failing(&["1"]));
    let ex = extractor(grabber, &[1], 1);
    let video = ex.catalog.videos[0].clone();
    let err = ex.extract_one(&video).await.unwrap_err();
    assert_eq!(err.video_id, "1");
    assert!(matches!(err.cause, FailureCause::Media(_)));
    assert!(err.to_string().contains("video 1"));
  }

  // --- spawn_extraction ---

  #[tokio::test]
  async fn spawned_pass_publishes_single_finished_after_progress() {
    let grabber = Arc::new(FakeGrabber::failing(&["2"]));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = spawn_extraction(extractor(grabber, &[3], 1), tx);
    handle.await.unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
      events.push(event);
    }
    assert_eq!(events.len(), 4);
    assert!(matches!(events[2], ExtractEvent::Progress { done: 3, total: 3 }));
    match &events[3] {
      ExtractEvent::Finished(map) => {
        assert_eq!(map.len(), 2);
        assert!(!map.contains("2"));
      }
      other => panic!("expected Finished, got {:?}", other),
    }
  }

  // --- Thumbnail ---

  #[test]
  fn thumbnail_keeps_native_dimensions_and_encodes_jpeg() {
    let thumb = Thumbnail::encode(DynamicImage::new_rgb8(64, 36), 70).unwrap();
    assert_eq!((thumb.width(), thumb.height()), (64, 36));
    let uri = thumb.data_uri();
    assert!(uri.starts_with("data:image/jpeg;base64,"));

    let decoded = image::load_from_memory(thumb.jpeg_bytes()).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (64, 36));
  }

  #[test]
  fn placeholder_is_renderable() {
    let thumb = Thumbnail::placeholder(32, 18);
    assert_eq!((thumb.width(), thumb.height()), (32, 18));
    assert!(!thumb.jpeg_bytes().is_empty());
  }

  #[test]
  fn map_dump_is_sorted_by_id() {
    let mut entries = HashMap::new();
    entries.insert("b".to_string(), Thumbnail::placeholder(2, 2));
    entries.insert("a".to_string(), Thumbnail::placeholder(2, 2));
    let dump = ThumbnailMap::new(entries).to_data_uris();
    assert_eq!(dump.keys().collect::<Vec<_>>(), vec!["a", "b"]);
  }

  // --- fallback ---

  #[tokio::test]
  async fn missing_fallback_degrades_to_placeholder() {
    let client = reqwest::Client::new();
    let thumb =
      load_fallback("/does-not-exist.png", Path::new("/nonexistent-root"), &client, Duration::from_secs(5)).await;
    assert_eq!(thumb.width(), constants().placeholder_width);
  }

  #[tokio::test]
  async fn fallback_loads_from_assets_root() {
    let dir = std::env::temp_dir().join(format!("clipgrid-fallback-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    DynamicImage::new_rgb8(12, 8).save(dir.join("fallback.png")).unwrap();

    let thumb = load_fallback("/fallback.png", &dir, &reqwest::Client::new(), Duration::from_secs(5)).await;
    assert_eq!((thumb.width(), thumb.height()), (12, 8));
    let _ = std::fs::remove_dir_all(&dir);
  }

  #[tokio::test]
  async fn stalled_fallback_server_degrades_to_placeholder() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
      let mut held = Vec::new();
      while let Ok((socket, _)) = listener.accept().await {
        held.push(socket);
      }
    });

    let url = format!("http://{}/fallback.png", addr);
    let client = reqwest::Client::new();
    let load = load_fallback(&url, Path::new("public"), &client, Duration::from_millis(200));
    let thumb = tokio::time::timeout(Duration::from_secs(3), load).await.expect("fallback load hung");
    assert_eq!((thumb.width(), thumb.height()), (constants().placeholder_width, constants().placeholder_height));
    server.abort();
  }

  #[test]
  fn from_image_always_yields_an_encoded_still() {
    let thumb = Thumbnail::from_image(DynamicImage::new_rgb8(20, 10));
    assert_eq!((thumb.width(), thumb.height()), (20, 10));
    assert!(thumb.data_uri().len() > "data:image/jpeg;base64,".len());
  }
}
