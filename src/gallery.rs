//! Filter, pagination and selection state for the gallery.
//!
//! `Gallery` owns everything the view needs to draw one frame: the category
//! filter, the current page, which video is featured and whether it is playing,
//! and the thumbnail snapshot with its fallback.

use std::sync::Arc;
use tracing::debug;

use crate::catalog::{ALL_CATEGORY, Catalog, Video};
use crate::extract::{Thumbnail, ThumbnailMap};

/// Featured-player state.
///
/// `Idle` features the first catalog entry. Once a video has been chosen the
/// gallery never goes back to `Idle` for the rest of the session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
  #[default]
  Idle,
  /// A video is featured but its playback is stopped (poster shown).
  Poster(String),
  /// The featured video is playing.
  Playing(String),
}

impl Selection {
  pub fn selected_id(&self) -> Option<&str> {
    match self {
      Selection::Idle => None,
      Selection::Poster(id) | Selection::Playing(id) => Some(id),
    }
  }

  pub fn is_playing(&self) -> bool {
    matches!(self, Selection::Playing(_))
  }
}

pub struct Gallery {
  catalog: Arc<Catalog>,
  page_size: usize,
  category: String,
  page: usize,
  selection: Selection,
  thumbnails: ThumbnailMap,
  fallback: Thumbnail,
}

impl Gallery {
  pub fn new(catalog: Arc<Catalog>, page_size: usize, fallback: Thumbnail) -> Self {
    Self {
      catalog,
      page_size: page_size.max(1),
      category: ALL_CATEGORY.to_string(),
      page: 1,
      selection: Selection::Idle,
      thumbnails: ThumbnailMap::default(),
      fallback,
    }
  }

  pub fn catalog(&self) -> &Catalog {
    &self.catalog
  }

  pub fn categories(&self) -> &[String] {
    &self.catalog.categories
  }

  pub fn category(&self) -> &str {
    &self.category
  }

  pub fn page_size(&self) -> usize {
    self.page_size
  }

  pub fn current_page(&self) -> usize {
    self.page
  }

  #[cfg(test)]
  pub fn selection(&self) -> &Selection {
    &self.selection
  }

  // --- Filter / pagination ---

  /// Videos in the selected category, in catalog order.
  pub fn filtered(&self) -> Vec<&Video> {
    self.catalog.filter(&self.category)
  }

  /// Number of pages for the current filter; 0 when the category is empty.
  pub fn total_pages(&self) -> usize {
    self.filtered().len().div_ceil(self.page_size)
  }

  /// The slice of the filtered list shown on the current page.
  pub fn visible(&self) -> Vec<&Video> {
    let start = (self.page - 1) * self.page_size;
    self.filtered().into_iter().skip(start).take(self.page_size).collect()
  }

  pub fn is_empty_category(&self) -> bool {
    self.filtered().is_empty()
  }

  /// Whether pagination controls should be drawn at all.
  pub fn shows_pagination(&self) -> bool {
    self.total_pages() > 1
  }

  pub fn has_next_page(&self) -> bool {
    self.page < self.total_pages()
  }

  pub fn has_previous_page(&self) -> bool {
    self.page > 1
  }

  /// Switch category. Always resets to page 1, even when re-selecting the
  /// current category. Unknown names are ignored.
  pub fn select_category(&mut self, name: &str) -> bool {
    if !self.catalog.has_category(name) {
      debug!(category = %name, "gallery: ignoring unknown category");
      return false;
    }
    self.category = name.to_string();
    self.page = 1;
    debug!(category = %name, videos = self.filtered().len(), "gallery: category selected");
    true
  }

  pub fn next_page(&mut self) -> bool {
    if self.has_next_page() {
      self.page += 1;
      true
    } else {
      false
    }
  }

  pub fn previous_page(&mut self) -> bool {
    if self.has_previous_page() {
      self.page -= 1;
      true
    } else {
      false
    }
  }

  // --- Selection / playback ---

  /// The video in the large player: the selection, or the first catalog entry.
  /// Only `None` for an empty catalog, which validation rejects.
  pub fn featured(&self) -> Option<&Video> {
    self.selection.selected_id().and_then(|id| self.catalog.get(id)).or_else(|| self.catalog.first())
  }

  /// Select a video and start playing it in one step. Unknown ids are ignored.
  pub fn select_video(&mut self, id: &str) -> bool {
    if self.catalog.get(id).is_none() {
      debug!(video = %id, "gallery: ignoring unknown video");
      return false;
    }
    self.selection = Selection::Playing(id.to_string());
    true
  }

  /// Clicking the featured poster: play whatever is featured.
  pub fn activate_featured(&mut self) {
    if let Some(id) = self.featured().map(|v| v.id.clone()) {
      self.selection = Selection::Playing(id);
    }
  }

  /// Stop playback but keep the featured video.
  pub fn stop(&mut self) -> bool {
    match std::mem::take(&mut self.selection) {
      Selection::Playing(id) => {
        self.selection = Selection::Poster(id);
        true
      }
      other => {
        self.selection = other;
        false
      }
    }
  }

  pub fn is_playing(&self) -> bool {
    self.selection.is_playing()
  }

  pub fn is_selected(&self, id: &str) -> bool {
    self.selection.selected_id() == Some(id)
  }

  // --- Thumbnails ---

  /// Replace the thumbnail snapshot wholesale.
  pub fn install_thumbnails(&mut self, map: ThumbnailMap) {
    self.thumbnails = map;
  }

  pub fn thumbnails(&self) -> &ThumbnailMap {
    &self.thumbnails
  }

  /// The extracted still for `id`, or the fallback placeholder.
  pub fn thumbnail_for(&self, id: &str) -> &Thumbnail {
    self.thumbnails.get(id).unwrap_or(&self.fallback)
  }
}
