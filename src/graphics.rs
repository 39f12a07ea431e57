use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use color_quant::NeuQuant;
use image::{DynamicImage, ImageFormat, imageops::FilterType};
use ratatui::{
  buffer::Buffer,
  layout::Rect,
  style::{Color, Style},
  widgets::Widget,
};
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::Arc;

use crate::display::DisplayMode;
use crate::extract::Thumbnail;

// --- Resize cache ---

/// How a thumbnail is fitted into its cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fit {
  /// Crop to fill the whole area (grid cells).
  Cover,
  /// Letterbox inside the area (featured poster).
  Contain,
}

/// Pixel size an image should be resized to for `area` in `mode`.
pub fn target_pixels(area: Rect, mode: DisplayMode) -> (u32, u32) {
  let (w, h) = (area.width as u32, area.height as u32);
  match mode {
    DisplayMode::Direct => (w, h * mode.rows_per_cell()),
    DisplayMode::Ascii => (w, h),
    // Approximate cell size in pixels; the terminal scales to c/r anyway.
    DisplayMode::Kitty | DisplayMode::Sixel => (w * 8, h * 16),
  }
}

type CacheKey = (String, u16, u16, Fit);

/// Resized thumbnails, keyed by video id and cell size. Cleared whenever a new
/// thumbnail map is installed.
#[derive(Default)]
pub struct ThumbCache {
  entries: HashMap<CacheKey, Arc<DynamicImage>>,
}

impl ThumbCache {
  pub fn clear(&mut self) {
    self.entries.clear();
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn get_or_resize(
    &mut self,
    id: &str,
    thumb: &Thumbnail,
    area: Rect,
    mode: DisplayMode,
    fit: Fit,
  ) -> Arc<DynamicImage> {
    let key = (id.to_string(), area.width, area.height, fit);
    Arc::clone(self.entries.entry(key).or_insert_with(|| {
      let (w, h) = target_pixels(area, mode);
      let (w, h) = (w.max(1), h.max(1));
      let resized = match fit {
        Fit::Cover => thumb.image().resize_to_fill(w, h, FilterType::Triangle),
        Fit::Contain => thumb.image().resize(w, h, FilterType::Triangle),
      };
      Arc::new(resized)
    }))
  }
}

// --- Thumbnail Widget ---

/// Draws an already-resized image with terminal characters. Kitty and Sixel
/// images are written after the frame instead (see `GraphicsPlacement`).
pub struct ThumbnailWidget<'a> {
  pub image: &'a DynamicImage,
  pub display_mode: DisplayMode,
}

const ASCII_CHARS: [&str; 10] = [" ", ".", ":", "-", "=", "+", "*", "#", "%", "@"];

impl Widget for ThumbnailWidget<'_> {
  fn render(self, area: Rect, buf: &mut Buffer) {
    if area.is_empty() {
      return;
    }
    match self.display_mode {
      DisplayMode::Direct => render_direct(self.image, area, buf),
      DisplayMode::Ascii => render_ascii(self.image, area, buf),
      DisplayMode::Kitty | DisplayMode::Sixel => {}
    }
  }
}

/// Top-left cell that centres a `cols` x `rows` block inside `area`.
fn centred_origin(area: Rect, cols: u32, rows: u32) -> (u16, u16) {
  let clamp = |v: u32| v.min(u16::MAX as u32) as u16;
  let dx = clamp((area.width as u32).saturating_sub(cols) / 2);
  let dy = clamp((area.height as u32).saturating_sub(rows) / 2);
  (area.x.saturating_add(dx), area.y.saturating_add(dy))
}

fn render_direct(image: &DynamicImage, area: Rect, buf: &mut Buffer) {
  let rgb = image.to_rgb8();
  let cols = rgb.width().min(area.width as u32);
  let rows = rgb.height().div_ceil(2).min(area.height as u32);
  let (ox, oy) = centred_origin(area, cols, rows);

  for row in 0..rows {
    for col in 0..cols {
      let upper = rgb.get_pixel(col, row * 2);
      let fg = Color::Rgb(upper[0], upper[1], upper[2]);
      let bg = match rgb.get_pixel_checked(col, row * 2 + 1) {
        Some(lower) => Color::Rgb(lower[0], lower[1], lower[2]),
        None => Color::Reset,
      };
      buf.set_string(ox + col as u16, oy + row as u16, "▀", Style::default().fg(fg).bg(bg));
    }
  }
}

fn render_ascii(image: &DynamicImage, area: Rect, buf: &mut Buffer) {
  let luma = image.to_luma8();
  let cols = luma.width().min(area.width as u32);
  let rows = luma.height().min(area.height as u32);
  let (ox, oy) = centred_origin(area, cols, rows);
  let steps = (ASCII_CHARS.len() - 1) as f32;

  for row in 0..rows {
    for col in 0..cols {
      let level = luma.get_pixel(col, row)[0] as f32 / 255.0;
      let idx = ((level * steps).round() as usize).min(ASCII_CHARS.len() - 1);
      buf.set_string(ox + col as u16, oy + row as u16, ASCII_CHARS[idx], Style::default());
    }
  }
}

// --- Pixel graphics placements ---

/// An image to be written with Kitty/Sixel once the frame is on screen.
#[derive(Clone)]
pub struct GraphicsPlacement {
  pub key: String,
  pub area: Rect,
  pub image: Arc<DynamicImage>,
}

/// Terminal graphics protocol rendering state (Kitty/Sixel).
#[derive(Default)]
pub struct GraphicsCache {
  /// Placements requested by the last `ui()` call.
  pub pending: Vec<GraphicsPlacement>,
  /// What is currently on screen, by key and area.
  pub last_sent: Vec<(String, Rect)>,
}

impl GraphicsCache {
  /// Whether the pending placements differ from what was last written.
  pub fn is_dirty(&self) -> bool {
    self.pending.len() != self.last_sent.len()
      || self.pending.iter().zip(&self.last_sent).any(|(p, (key, area))| &p.key != key || p.area != *area)
  }

  /// Write pending placements if they changed since the last flush.
  pub fn flush(&mut self, mode: DisplayMode) -> Result<()> {
    if !self.is_dirty() {
      return Ok(());
    }
    if mode == DisplayMode::Kitty {
      kitty_delete_all()?;
    }
    for (i, placement) in self.pending.iter().enumerate() {
      match mode {
        DisplayMode::Kitty => kitty_render_image(&placement.image, placement.area, i as u32 + 1)?,
        DisplayMode::Sixel => sixel_render_image(&placement.image, placement.area)?,
        DisplayMode::Direct | DisplayMode::Ascii => {}
      }
    }
    self.last_sent = self.pending.iter().map(|p| (p.key.clone(), p.area)).collect();
    Ok(())
  }

  /// Forget what is on screen so the next flush redraws everything.
  pub fn invalidate(&mut self) {
    self.last_sent.clear();
  }
}

// --- Kitty Graphics Protocol ---
//
//   Transmit:  \x1B_G a=T,f=100,t=d,i=<id>,p=<id>,c=<cols>,r=<rows>,q=2,m=1;<base64 chunk>\x1B\\
//   Continue:  \x1B_G m=1;<base64 chunk>\x1B\\
//   Last:      \x1B_G m=0;<base64 chunk>\x1B\\
//   Delete all:       \x1B_G a=d,d=a,q=2\x1B\\
//
// Every grid cell gets its own image id so several thumbnails can be visible
// at once. PNG payloads are base64'd and sent in <=4096-byte chunks.

const KITTY_CHUNK_SIZE: usize = 4096;

/// Delete all Kitty images currently displayed.
pub fn kitty_delete_all() -> Result<()> {
  let mut stdout = std::io::stdout();
  write!(stdout, "\x1B_Ga=d,d=a,q=2\x1B\\").context("Failed to write kitty delete all")?;
  stdout.flush().context("Failed to flush kitty delete")?;
  Ok(())
}

/// Render an image at `area` using the Kitty graphics protocol.
pub fn kitty_render_image(image: &DynamicImage, area: Rect, id: u32) -> Result<()> {
  if area.is_empty() {
    return Ok(());
  }

  let mut png_buf = Vec::new();
  image
    .write_to(&mut Cursor::new(&mut png_buf), ImageFormat::Png)
    .context("Failed to encode thumbnail as PNG for kitty")?;

  let b64 = BASE64.encode(&png_buf);
  let chunks: Vec<&[u8]> = b64.as_bytes().chunks(KITTY_CHUNK_SIZE).collect();
  let last = chunks.len().saturating_sub(1);

  let mut stdout = std::io::stdout();
  write!(stdout, "\x1B[{};{}H", area.y.saturating_add(1), area.x.saturating_add(1))
    .context("Failed to position cursor for kitty image")?;

  for (i, chunk) in chunks.iter().enumerate() {
    let data = std::str::from_utf8(chunk).context("base64 chunk was not valid UTF-8")?;
    let more = u8::from(i < last);
    if i == 0 {
      write!(
        stdout,
        "\x1B_Ga=T,f=100,t=d,i={id},p={id},c={},r={},q=2,m={};{}\x1B\\",
        area.width, area.height, more, data
      )
      .context("Failed to write kitty image header chunk")?;
    } else {
      write!(stdout, "\x1B_Gm={};{}\x1B\\", more, data).context("Failed to write kitty image continuation chunk")?;
    }
  }

  stdout.flush().context("Failed to flush kitty image")?;
  Ok(())
}

// --- Sixel Graphics Protocol ---
//
//   DCS q <data> ST,  DCS = \x1BP,  ST = \x1B\\
//   Color register:  #<n>;2;<r%>;<g%>;<b%>
//   Sixel data char: 0x3F + 6-bit column bitmap, `$` rewinds, `-` advances a row
//
// Palette quantised with NeuQuant (`color_quant`).

const SIXEL_MAX_COLORS: usize = 256;

/// Encode an RGB image as a sixel string.
pub fn sixel_encode(image: &DynamicImage) -> String {
  let rgb = image.to_rgb8();
  let (w, h) = (rgb.width() as usize, rgb.height() as usize);

  let rgba: Vec<u8> = rgb.pixels().flat_map(|p| [p[0], p[1], p[2], 255]).collect();
  let nq = NeuQuant::new(10, SIXEL_MAX_COLORS, &rgba);
  let palette: Vec<[u8; 3]> = nq.color_map_rgb().chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();
  let indices: Vec<usize> = rgb.pixels().map(|p| nq.index_of(&[p[0], p[1], p[2], 255])).collect();

  let mut out = String::with_capacity(w * h);
  out.push_str("\x1BPq");
  out.push_str(&format!("\"1;1;{};{}", w, h));
  for (i, c) in palette.iter().enumerate() {
    let pct = |v: u8| (v as u32 * 100) / 255;
    out.push_str(&format!("#{};2;{};{};{}", i, pct(c[0]), pct(c[1]), pct(c[2])));
  }

  for band in 0..h.div_ceil(6) {
    let y0 = band * 6;
    for color in 0..palette.len() {
      let row: Vec<u8> = (0..w)
        .map(|x| {
          (0..6).filter(|bit| y0 + bit < h && indices[(y0 + bit) * w + x] == color).fold(0u8, |acc, bit| acc | 1 << bit)
        })
        .collect();
      if row.iter().all(|&v| v == 0) {
        continue;
      }

      out.push_str(&format!("#{}", color));
      let mut i = 0;
      while i < row.len() {
        let val = row[i];
        let run = row[i..].iter().take_while(|&&v| v == val).count();
        let ch = (val + 0x3F) as char;
        if run > 3 {
          out.push_str(&format!("!{}{}", run, ch));
        } else {
          out.extend(std::iter::repeat_n(ch, run));
        }
        i += run;
      }
      out.push('$');
    }
    out.push('-');
  }

  out.push_str("\x1B\\");
  out
}

/// Render an image at `area` using the Sixel graphics protocol.
pub fn sixel_render_image(image: &DynamicImage, area: Rect) -> Result<()> {
  if area.is_empty() {
    return Ok(());
  }
  let encoded = sixel_encode(image);
  let mut stdout = std::io::stdout();
  write!(stdout, "\x1B[{};{}H{}", area.y.saturating_add(1), area.x.saturating_add(1), encoded)
    .context("Failed to write sixel image")?;
  stdout.flush().context("Failed to flush sixel image")?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  fn solid(w: u32, h: u32, c: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb(c)))
  }

  // --- target_pixels ---

  #[test]
  fn half_block_doubles_rows() {
    let area = Rect::new(0, 0, 20, 5);
    assert_eq!(target_pixels(area, DisplayMode::Direct), (20, 10));
    assert_eq!(target_pixels(area, DisplayMode::Ascii), (20, 5));
    assert_eq!(target_pixels(area, DisplayMode::Kitty), (160, 80));
  }

  // --- ThumbCache ---

  #[test]
  fn cache_resizes_once_per_cell_size() {
    let thumb = Thumbnail::placeholder(64, 36);
    let mut cache = ThumbCache::default();
    let area = Rect::new(0, 0, 16, 4);
    let a = cache.get_or_resize("1", &thumb, area, DisplayMode::Direct, Fit::Cover);
    let b = cache.get_or_resize("1", &thumb, area, DisplayMode::Direct, Fit::Cover);
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!((a.width(), a.height()), (16, 8));

    cache.get_or_resize("1", &thumb, Rect::new(0, 0, 8, 4), DisplayMode::Direct, Fit::Cover);
    assert_eq!(cache.len(), 2);
    cache.clear();
    assert_eq!(cache.len(), 0);
  }

  #[test]
  fn contain_keeps_aspect_ratio() {
    let thumb = Thumbnail::placeholder(90, 160);
    let mut cache = ThumbCache::default();
    let img = cache.get_or_resize("v", &thumb, Rect::new(0, 0, 40, 20), DisplayMode::Direct, Fit::Contain);
    assert!(img.width() < 40);
    assert_eq!(img.height(), 40);
  }

  // --- widget ---

  #[test]
  fn direct_render_uses_half_blocks() {
    let area = Rect::new(0, 0, 4, 2);
    let mut buf = Buffer::empty(area);
    let img = solid(4, 4, [255, 0, 0]);
    ThumbnailWidget { image: &img, display_mode: DisplayMode::Direct }.render(area, &mut buf);
    assert_eq!(buf[(0, 0)].symbol(), "▀");
    assert_eq!(buf[(3, 1)].fg, Color::Rgb(255, 0, 0));
  }

  #[test]
  fn ascii_render_maps_brightness() {
    let area = Rect::new(0, 0, 2, 1);
    let mut buf = Buffer::empty(area);
    let img = solid(2, 1, [255, 255, 255]);
    ThumbnailWidget { image: &img, display_mode: DisplayMode::Ascii }.render(area, &mut buf);
    assert_eq!(buf[(0, 0)].symbol(), "@");
  }

  // --- placements ---

  #[test]
  fn graphics_cache_tracks_changes() {
    let image = Arc::new(solid(2, 2, [0, 0, 0]));
    let mut gfx = GraphicsCache::default();
    assert!(!gfx.is_dirty());

    gfx.pending = vec![GraphicsPlacement { key: "1".into(), area: Rect::new(0, 0, 4, 2), image }];
    assert!(gfx.is_dirty());
    // Direct mode writes nothing but still records the placement.
    gfx.flush(DisplayMode::Direct).unwrap();
    assert!(!gfx.is_dirty());

    gfx.invalidate();
    assert!(gfx.is_dirty());
  }

  #[test]
  fn sixel_encoding_is_framed() {
    let out = sixel_encode(&solid(120, 13, [10, 200, 30]));
    assert!(out.starts_with("\x1BPq\"1;1;120;13"));
    assert!(out.ends_with("\x1B\\"));
    assert_eq!(out.matches('-').count(), 3);
  }
}
