use image::DynamicImage;
use ratatui::{
  Frame,
  layout::{Alignment, Constraint, Layout, Rect},
  style::{Modifier, Style},
  text::{Line, Span},
  widgets::{Block, BorderType, Padding, Paragraph, Wrap},
};
use std::sync::Arc;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::app::App;
use crate::constants::constants;
use crate::display::DisplayMode;
use crate::graphics::{Fit, GraphicsPlacement, ThumbnailWidget, target_pixels};
use crate::theme::Theme;

// --- Helpers ---

/// Truncate a string to `max_width` display columns, appending "…" if truncated.
fn truncate_str(s: &str, max_width: usize) -> String {
  if s.width() <= max_width {
    return s.to_string();
  }
  let mut out = String::new();
  let mut used = 0;
  for c in s.chars() {
    let w = c.width().unwrap_or(0);
    if used + w + 1 > max_width {
      break;
    }
    used += w;
    out.push(c);
  }
  format!("{}…", out)
}

/// Cells actually covered by a resized image drawn with a pixel protocol,
/// centred in `area`.
fn pixel_area(area: Rect, image: &DynamicImage, mode: DisplayMode) -> Rect {
  let (full_w, full_h) = target_pixels(area, mode);
  let cols = ((image.width() as u64 * area.width as u64) / full_w.max(1) as u64).clamp(1, area.width as u64) as u16;
  let rows = ((image.height() as u64 * area.height as u64) / full_h.max(1) as u64).clamp(1, area.height as u64) as u16;
  Rect {
    x: area.x + (area.width - cols) / 2,
    y: area.y + (area.height - rows) / 2,
    width: cols,
    height: rows,
  }
}

fn rounded(theme: &Theme) -> Block<'static> {
  Block::bordered().border_type(BorderType::Rounded).border_style(Style::default().fg(theme.border))
}

// --- UI Rendering ---

pub fn ui(frame: &mut Frame, app: &mut App) {
  let theme = app.theme();
  app.gfx.pending.clear();

  frame.render_widget(Block::default().style(Style::default().bg(theme.bg)), frame.area());

  let [header_area, categories_area, main_area, pages_area, status_area, footer_area] = Layout::vertical([
    Constraint::Length(1),
    Constraint::Length(1),
    Constraint::Min(6),
    Constraint::Length(1),
    Constraint::Length(1),
    Constraint::Length(1),
  ])
  .areas(frame.area());

  let [featured_area, grid_area] =
    Layout::horizontal([Constraint::Percentage(40), Constraint::Percentage(60)]).areas(main_area);

  render_header(frame, app, header_area);
  render_categories(frame, app, categories_area);
  render_featured(frame, app, featured_area);
  render_grid(frame, app, grid_area);
  render_pagination(frame, app, pages_area);
  render_status(frame, app, status_area);
  render_footer(frame, app, footer_area);
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let left = Line::from(vec![
    Span::styled(" ▶ clipgrid ", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)),
    Span::styled(format!("{} videos", app.gallery.catalog().len()), Style::default().fg(theme.muted)),
  ]);
  frame.render_widget(left, area);

  let version = format!("v{} ", env!("CARGO_PKG_VERSION"));
  let right = Line::from(Span::styled(&version, Style::default().fg(theme.muted)));
  let right_area =
    Rect { x: area.x + area.width.saturating_sub(version.len() as u16), width: version.len() as u16, ..area };
  frame.render_widget(right, right_area);
}

fn render_categories(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let mut spans = vec![Span::raw(" ")];
  for (i, name) in app.gallery.categories().iter().enumerate() {
    let label = format!(" {} {} ", i + 1, name);
    if name == app.gallery.category() {
      spans.push(Span::styled(
        format!("[{}]", label),
        Style::default().fg(theme.highlight_fg).bg(theme.highlight_bg).add_modifier(Modifier::BOLD),
      ));
    } else {
      spans.push(Span::styled("[", Style::default().fg(theme.border)));
      spans.push(Span::styled(label, Style::default().fg(theme.fg)));
      spans.push(Span::styled("]", Style::default().fg(theme.border)));
    }
    spans.push(Span::raw(" "));
  }
  frame.render_widget(Line::from(spans), area);
}

fn render_featured(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();
  let Some(video) = app.gallery.featured() else {
    frame.render_widget(rounded(theme).title(" Featured "), area);
    return;
  };
  let playing = app.gallery.is_playing();
  let ring = if playing { theme.ring } else { theme.border };
  let block = rounded(theme)
    .title(Span::styled(" Featured ", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)))
    .border_style(Style::default().fg(ring))
    .padding(Padding::horizontal(1));
  let inner = block.inner(area);
  frame.render_widget(block, area);

  let [media_area, title_area, hint_area] =
    Layout::vertical([Constraint::Min(1), Constraint::Length(1), Constraint::Length(1)]).areas(inner);
  let inner_w = title_area.width as usize;

  frame.render_widget(
    Paragraph::new(truncate_str(&video.title, inner_w))
      .style(Style::default().fg(theme.fg).add_modifier(Modifier::BOLD))
      .alignment(Alignment::Center),
    title_area,
  );

  if playing {
    let status = match (app.player.is_running(), app.player.last_status()) {
      (true, Some(status)) => status.to_string(),
      (true, None) => "Starting mpv…".to_string(),
      (false, _) => String::new(),
    };
    let label = if app.player.paused { "⏸ Paused" } else { "▶ Playing" };
    let lines = vec![
      Line::from(""),
      Line::from(Span::styled(label, Style::default().fg(theme.ring).add_modifier(Modifier::BOLD))),
      Line::from(""),
      Line::from(Span::styled(truncate_str(&status, inner_w), Style::default().fg(theme.status))),
    ];
    let top = media_area.height.saturating_sub(lines.len() as u16) / 2;
    let text_area = Rect { y: media_area.y + top, height: media_area.height - top, ..media_area };
    frame.render_widget(Paragraph::new(lines).alignment(Alignment::Center), text_area);
    frame.render_widget(
      Paragraph::new("Space pause · ^s stop").style(Style::default().fg(theme.muted)).alignment(Alignment::Center),
      hint_area,
    );
    return;
  }

  let id = video.id.clone();
  let thumb = app.gallery.thumbnail_for(&id);
  let image = app.thumb_cache.get_or_resize(&id, thumb, media_area, app.display_mode, Fit::Contain);
  draw_image(frame, app, &format!("featured:{}", id), media_area, image);
  frame.render_widget(
    Paragraph::new("▶ p to play").style(Style::default().fg(theme.accent)).alignment(Alignment::Center),
    hint_area,
  );
}

/// Draw with characters, or queue a pixel placement for after the frame.
fn draw_image(frame: &mut Frame, app: &mut App, key: &str, area: Rect, image: Arc<DynamicImage>) {
  if area.is_empty() {
    return;
  }
  if app.display_mode.uses_graphics_protocol() {
    let area = pixel_area(area, &image, app.display_mode);
    app.gfx.pending.push(GraphicsPlacement { key: key.to_string(), area, image });
  } else {
    frame.render_widget(ThumbnailWidget { image: &image, display_mode: app.display_mode }, area);
  }
}

fn render_grid(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();
  if app.gallery.is_empty_category() {
    let message = Paragraph::new(constants().empty_category_message.as_str())
      .style(Style::default().fg(theme.muted))
      .alignment(Alignment::Center)
      .wrap(Wrap { trim: true })
      .block(rounded(theme).padding(Padding::uniform(1)));
    frame.render_widget(message, area);
    return;
  }

  let cols = app.grid_columns;
  let rows = app.gallery.page_size().div_ceil(cols);
  let row_areas = Layout::vertical(vec![Constraint::Ratio(1, rows as u32); rows]).split(area);

  let visible: Vec<(String, String)> =
    app.gallery.visible().iter().map(|v| (v.id.clone(), v.title.clone())).collect();
  for (i, (id, title)) in visible.iter().enumerate() {
    let Some(row_area) = row_areas.get(i / cols) else { break };
    let cells = Layout::horizontal(vec![Constraint::Ratio(1, cols as u32); cols]).split(*row_area);
    let cell = cells[i % cols];

    let selected = app.gallery.is_selected(id);
    let under_cursor = i == app.cursor;
    let (border_type, border_color) = match (selected, under_cursor) {
      (_, true) => (BorderType::Thick, theme.accent),
      (true, false) => (BorderType::Double, theme.ring),
      (false, false) => (BorderType::Rounded, theme.border),
    };
    let block = Block::bordered().border_type(border_type).border_style(Style::default().fg(border_color));
    let inner = block.inner(cell);
    frame.render_widget(block, cell);

    let [media_area, title_area] = Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).areas(inner);
    let title_style = if selected {
      Style::default().fg(theme.ring).add_modifier(Modifier::BOLD)
    } else {
      Style::default().fg(theme.fg)
    };
    frame.render_widget(
      Paragraph::new(truncate_str(title, title_area.width as usize)).style(title_style).alignment(Alignment::Center),
      title_area,
    );

    let thumb = app.gallery.thumbnail_for(id);
    let image = app.thumb_cache.get_or_resize(id, thumb, media_area, app.display_mode, Fit::Cover);
    draw_image(frame, app, id, media_area, image);
  }
}

fn render_pagination(frame: &mut Frame, app: &App, area: Rect) {
  if !app.gallery.shows_pagination() {
    return;
  }
  let theme = app.theme();
  let arrow = |enabled: bool| {
    if enabled {
      Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)
    } else {
      Style::default().fg(theme.muted).add_modifier(Modifier::DIM)
    }
  };
  let line = Line::from(vec![
    Span::styled("‹", arrow(app.gallery.has_previous_page())),
    Span::styled(
      format!("  Page {} of {}  ", app.gallery.current_page(), app.gallery.total_pages()),
      Style::default().fg(theme.fg),
    ),
    Span::styled("›", arrow(app.gallery.has_next_page())),
  ]);
  frame.render_widget(Paragraph::new(line).alignment(Alignment::Center), area);
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let (text, style) = if let Some(err) = &app.last_error {
    (format!(" ⚠  {}", err), Style::default().fg(theme.error))
  } else if let Some(progress) = app.extraction_status() {
    (format!(" ⏳ {}", progress), Style::default().fg(theme.status))
  } else if app.gallery.is_playing()
    && let Some(status) = app.player.last_status()
  {
    (format!(" ▶ {}", status), Style::default().fg(theme.status))
  } else {
    let count = app.gallery.filtered().len();
    let ready = format!(
      " {} · {} videos · {}/{} thumbnails",
      app.gallery.category(),
      count,
      app.gallery.thumbnails().len(),
      app.gallery.catalog().len()
    );
    (ready, Style::default().fg(theme.muted))
  };
  frame.render_widget(Paragraph::new(text).style(style), area);
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let mut keys: Vec<(&str, &str)> = vec![("Tab", "Category"), ("hjkl", "Move"), ("Enter", "Play")];
  if app.gallery.shows_pagination() {
    keys.push(("[ ]", "Page"));
  }
  if app.gallery.is_playing() {
    keys.push(("Space", if app.player.paused { "Resume" } else { "Pause" }));
    keys.push(("^s", "Stop"));
  } else {
    keys.push(("p", "Play featured"));
  }
  keys.push(("^t", "Theme"));
  keys.push(("q", "Quit"));

  let spans: Vec<Span> = keys
    .iter()
    .enumerate()
    .flat_map(|(i, (key, action))| {
      let mut s = vec![
        Span::styled(format!(" {} ", key), Style::default().fg(theme.key_fg).bg(theme.key_bg)),
        Span::styled(format!(" {} ", action), Style::default().fg(theme.muted)),
      ];
      if i < keys.len() - 1 {
        s.push(Span::raw("  "));
      }
      s
    })
    .collect();

  frame.render_widget(Line::from(spans), area);

  let right_label = format!("{} · {} ", app.display_mode.label(), theme.name);
  let right = Line::from(Span::styled(&right_label, Style::default().fg(theme.muted)));
  let width = right_label.width() as u16;
  let right_area = Rect { x: area.x + area.width.saturating_sub(width), width: width.min(area.width), ..area };
  frame.render_widget(right, right_area);
}
