use ratatui::style::Color;

pub struct Theme {
  pub name: &'static str,
  pub bg: Color,
  pub fg: Color,
  pub accent: Color,
  pub muted: Color,
  pub border: Color,
  pub highlight_fg: Color,
  pub highlight_bg: Color,
  pub ring: Color,
  pub status: Color,
  pub error: Color,
  pub key_fg: Color,
  pub key_bg: Color,
}

pub static THEMES: [Theme; 3] = [
  Theme {
    name: "Studio",
    bg: Color::Rgb(249, 250, 251),
    fg: Color::Rgb(17, 24, 39),
    accent: Color::Rgb(0, 0, 0),
    muted: Color::Rgb(107, 114, 128),
    border: Color::Rgb(209, 213, 219),
    highlight_fg: Color::Rgb(255, 255, 255),
    highlight_bg: Color::Rgb(0, 0, 0),
    ring: Color::Rgb(0, 0, 0),
    status: Color::Rgb(37, 99, 235),
    error: Color::Rgb(220, 38, 38),
    key_fg: Color::Rgb(255, 255, 255),
    key_bg: Color::Rgb(55, 65, 81),
  },
  Theme {
    name: "Midnight",
    bg: Color::Rgb(17, 17, 27),
    fg: Color::Rgb(205, 214, 244),
    accent: Color::Rgb(203, 166, 247),
    muted: Color::Rgb(127, 132, 156),
    border: Color::Rgb(69, 71, 90),
    highlight_fg: Color::Rgb(17, 17, 27),
    highlight_bg: Color::Rgb(203, 166, 247),
    ring: Color::Rgb(245, 194, 231),
    status: Color::Rgb(137, 180, 250),
    error: Color::Rgb(243, 139, 168),
    key_fg: Color::Rgb(17, 17, 27),
    key_bg: Color::Rgb(127, 132, 156),
  },
  Theme {
    name: "Terminal",
    bg: Color::Reset,
    fg: Color::Reset,
    accent: Color::Yellow,
    muted: Color::DarkGray,
    border: Color::Gray,
    highlight_fg: Color::Black,
    highlight_bg: Color::Yellow,
    ring: Color::Yellow,
    status: Color::Cyan,
    error: Color::Red,
    key_fg: Color::Black,
    key_bg: Color::Gray,
  },
];

/// Index of the theme called `name`, or the default theme.
pub fn index_of(name: Option<&str>) -> usize {
  name.and_then(|n| THEMES.iter().position(|t| t.name == n)).unwrap_or(0)
}
