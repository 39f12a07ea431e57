use clap::ValueEnum;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliDisplayMode {
  Auto,
  Kitty,
  Sixel,
  Direct,
  Ascii,
}

/// How thumbnails are drawn into the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
  Ascii,
  Direct,
  Sixel,
  Kitty,
}

impl DisplayMode {
  pub fn label(self) -> &'static str {
    match self {
      DisplayMode::Ascii => "ASCII",
      DisplayMode::Direct => "Half-block",
      DisplayMode::Sixel => "Sixel",
      DisplayMode::Kitty => "Kitty",
    }
  }

  /// Pixel images are written straight to the terminal after the frame is drawn.
  pub fn uses_graphics_protocol(self) -> bool {
    matches!(self, DisplayMode::Kitty | DisplayMode::Sixel)
  }

  /// Image pixel rows that fit in one terminal row.
  pub fn rows_per_cell(self) -> u32 {
    match self {
      DisplayMode::Direct => 2,
      _ => 1,
    }
  }
}

/// Detect the best display mode the terminal supports.
///
/// Probe order: Kitty graphics > Sixel > true-color half-block > ASCII
pub fn detect_display_mode() -> DisplayMode {
  let var = |name: &str| std::env::var(name).unwrap_or_default();
  detect_from(&var("TERM"), &var("TERM_PROGRAM"), &var("COLORTERM"))
}

fn detect_from(term: &str, term_program: &str, colorterm: &str) -> DisplayMode {
  let term_program = term_program.to_lowercase();
  if term == "xterm-kitty" || matches!(term_program.as_str(), "kitty" | "wezterm" | "ghostty") {
    return DisplayMode::Kitty;
  }

  if matches!(term_program.as_str(), "foot" | "mlterm" | "contour") || term.contains("sixel") {
    return DisplayMode::Sixel;
  }

  let colorterm = colorterm.to_lowercase();
  if colorterm == "truecolor" || colorterm == "24bit" {
    return DisplayMode::Direct;
  }

  DisplayMode::Ascii
}

pub fn resolve_display_mode(cli: CliDisplayMode) -> DisplayMode {
  match cli {
    CliDisplayMode::Auto => detect_display_mode(),
    CliDisplayMode::Kitty => DisplayMode::Kitty,
    CliDisplayMode::Sixel => DisplayMode::Sixel,
    CliDisplayMode::Direct => DisplayMode::Direct,
    CliDisplayMode::Ascii => DisplayMode::Ascii,
  }
}
