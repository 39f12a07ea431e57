mod app;
mod catalog;
mod config;
mod constants;
mod display;
mod extract;
mod gallery;
mod graphics;
mod input;
mod logging;
mod player;
mod theme;
mod ui;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::Shell;
use ratatui::{
  DefaultTerminal,
  crossterm::event::{self, Event, KeyEventKind},
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use app::App;
use catalog::Catalog;
use config::Config;
use constants::constants;
use display::{CliDisplayMode, DisplayMode};
use extract::{ExtractOptions, Extractor, FfmpegGrabber, load_fallback};
use gallery::Gallery;
use graphics::kitty_delete_all;
use input::handle_key_event;
use player::VideoPlayer;

// --- CLI ---

#[derive(Parser, Debug)]
#[command(
  author,
  version = env!("CARGO_PKG_VERSION"),
  about = "Browse a video catalog as a thumbnail grid in the terminal",
  long_about = None
)]
struct Args {
  /// Display mode: 'auto', 'kitty', 'sixel', 'direct', or 'ascii' (default: auto-detect)
  #[arg(short, long, default_value = "auto")]
  display_mode: CliDisplayMode,

  /// Catalog file (.ron or .toml) to use instead of the built-in one
  #[arg(long)]
  catalog: Option<PathBuf>,

  /// Directory site-relative video URLs are resolved against
  #[arg(long)]
  assets: Option<PathBuf>,

  /// Placeholder image (path or http(s) URL) for videos without a thumbnail
  #[arg(long)]
  fallback: Option<String>,

  /// Videos opened at once during thumbnail extraction
  #[arg(long)]
  concurrency: Option<usize>,

  /// Per-video extraction timeout in seconds
  #[arg(long)]
  timeout_secs: Option<u64>,

  /// ffmpeg binary used to grab frames
  #[arg(long, default_value = "ffmpeg")]
  ffmpeg: PathBuf,

  /// mpv binary used for playback
  #[arg(long, default_value = "mpv")]
  mpv: String,

  /// Extract thumbnails, print them as JSON data URIs and exit
  #[arg(long)]
  dump: bool,

  /// Print shell completions and exit
  #[arg(long, value_name = "SHELL")]
  completions: Option<Shell>,
}

/// CLI flags over `prefs.toml` over `constants.ron`.
#[derive(Debug, Clone, PartialEq)]
struct Settings {
  assets_root: PathBuf,
  fallback: String,
  concurrency: usize,
  timeout: Duration,
}

impl Settings {
  fn resolve(args: &Args, config: &Config) -> Self {
    let c = constants();
    Self {
      assets_root: args
        .assets
        .clone()
        .or_else(|| config.assets_root.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(&c.assets_root)),
      fallback: args
        .fallback
        .clone()
        .or_else(|| config.fallback_thumbnail.clone())
        .unwrap_or_else(|| c.fallback_thumbnail.clone()),
      concurrency: args.concurrency.or(config.extract_concurrency).unwrap_or(c.extract_concurrency).max(1),
      timeout: Duration::from_secs(
        args.timeout_secs.or(config.extract_timeout_secs).unwrap_or(c.extract_timeout_secs).max(1),
      ),
    }
  }

  fn extract_options(&self) -> ExtractOptions {
    ExtractOptions {
      concurrency: self.concurrency,
      timeout: self.timeout,
      assets_root: self.assets_root.clone(),
      ..ExtractOptions::default()
    }
  }
}

fn load_catalog(path: Option<&PathBuf>) -> Result<Arc<Catalog>> {
  let catalog = match path {
    Some(path) => Catalog::load(path)?,
    None => Catalog::embedded().context("Built-in catalog is invalid")?,
  };
  Ok(Arc::new(catalog))
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  if let Some(shell) = args.completions {
    let mut cmd = Args::command();
    clap_complete::generate(shell, &mut cmd, "clipgrid", &mut std::io::stdout());
    return Ok(());
  }

  let config = Config::load();
  let settings = Settings::resolve(&args, &config);
  let catalog = load_catalog(args.catalog.as_ref())?;

  if args.dump {
    logging::init_stderr();
    return dump(catalog, &args, &settings).await;
  }

  let _log_guard = logging::init();
  info!(version = env!("CARGO_PKG_VERSION"), videos = catalog.len(), settings = ?settings, "clipgrid starting");

  let client = reqwest::Client::new();
  let fallback = load_fallback(&settings.fallback, &settings.assets_root, &client, settings.timeout).await;
  let gallery = Gallery::new(Arc::clone(&catalog), constants().page_size, fallback);
  let display_mode = display::resolve_display_mode(args.display_mode);
  let mut app = App::new(gallery, VideoPlayer::new(&args.mpv), display_mode, settings.assets_root.clone(), config);
  app.start_extraction(Extractor::new(
    catalog,
    Arc::new(FfmpegGrabber::with_binary(&args.ffmpeg)),
    settings.extract_options(),
  ));

  let default_hook = std::panic::take_hook();
  std::panic::set_hook(Box::new(move |info| {
    ratatui::restore();
    default_hook(info);
  }));

  let mut terminal = ratatui::init();
  let result = run(&mut terminal, &mut app).await;
  app.shutdown().await;
  ratatui::restore();
  result
}

/// Headless pass: one extraction, JSON map of id to data URI on stdout.
async fn dump(catalog: Arc<Catalog>, args: &Args, settings: &Settings) -> Result<()> {
  let extractor =
    Extractor::new(catalog, Arc::new(FfmpegGrabber::with_binary(&args.ffmpeg)), settings.extract_options());
  let map = extractor.run(|done, total| debug!(done, total, "dump: progress")).await;
  let json = serde_json::to_string_pretty(&map.to_data_uris()).context("Failed to serialize thumbnails")?;
  println!("{}", json);
  Ok(())
}

async fn run(terminal: &mut DefaultTerminal, app: &mut App) -> Result<()> {
  let display_mode = app.display_mode;

  loop {
    app.check_pending().await?;

    terminal.draw(|frame| ui::ui(frame, app))?;

    if display_mode.uses_graphics_protocol() {
      app.gfx.flush(display_mode).context("Failed to draw thumbnails")?;
    }

    if event::poll(Duration::from_millis(100))? {
      match event::read()? {
        Event::Key(key) if key.kind == KeyEventKind::Press => {
          handle_key_event(app, key).await?;
        }
        Event::Resize(..) => app.gfx.invalidate(),
        _ => {}
      }
    }

    if app.should_quit {
      break;
    }
  }

  if display_mode == DisplayMode::Kitty {
    kitty_delete_all()?;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cli_flags_override_prefs_and_constants() {
    let args = Args::parse_from(["clipgrid", "--concurrency", "4", "--assets", "/srv/site"]);
    let config = Config {
      assets_root: Some("/home/me/site".into()),
      extract_concurrency: Some(2),
      extract_timeout_secs: Some(30),
      ..Config::default()
    };
    let settings = Settings::resolve(&args, &config);
    assert_eq!(settings.concurrency, 4);
    assert_eq!(settings.assets_root, PathBuf::from("/srv/site"));
    assert_eq!(settings.timeout, Duration::from_secs(30));
    assert_eq!(settings.fallback, "/energetic-home-workout.png");
  }

  #[test]
  fn defaults_come_from_constants() {
    let args = Args::parse_from(["clipgrid"]);
    let settings = Settings::resolve(&args, &Config::default());
    assert_eq!(settings.concurrency, 1);
    assert_eq!(settings.timeout, Duration::from_secs(15));
    assert_eq!(settings.assets_root, PathBuf::from("public"));
    assert_eq!(settings.extract_options().quality, 70);
  }

  #[test]
  fn zero_concurrency_is_raised_to_one() {
    let args = Args::parse_from(["clipgrid", "--concurrency", "0"]);
    assert_eq!(Settings::resolve(&args, &Config::default()).concurrency, 1);
  }

  #[test]
  fn cli_definition_is_consistent() {
    Args::command().debug_assert();
  }
}
