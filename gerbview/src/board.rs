//! Board sessions: the set of files that make up one board, and the
//! substrate/mask geometry derived from them.
//!
//! Deriving the substrate and mask is slow, so a session caches both.
//! The cache is one value (`GeometryCache`) behind a mutex shared by every
//! clone of the session. Changing the files or the viewed side gives the
//! session a new cache value. `invalidate` clears the shared one in place
//! and bumps its generation, so a worker that started against an older
//! generation finds its result refused when it tries to store it.

use indexmap::IndexMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::cancel::{no_progress, CancelToken, Progress};
use crate::error::Result;
use crate::geometry::Rect;
use crate::mask::build_mask;
use crate::outline::{build_outline, Outline, OutlineOptions, DEFAULT_MIN_REGION_WIDTH_MM};
use crate::region::PlanarRegion;
use crate::stream::{GerberFile, Units, FILE_FUNCTION};

/// Which face of the board is being looked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    #[default]
    Front,
    Back,
}

impl Side {
    /// Side code used in `.FileFunction` values.
    pub fn gerber_code(self) -> &'static str {
        match self {
            Side::Front => "Top",
            Side::Back => "Bot",
        }
    }

    pub fn parse(s: &str) -> Option<Side> {
        match s.to_ascii_lowercase().as_str() {
            "front" | "top" => Some(Side::Front),
            "back" | "bot" | "bottom" => Some(Side::Back),
            _ => None,
        }
    }
}

/// The files of one board, in load order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardFileSet {
    files: Vec<GerberFile>,
}

impl BoardFileSet {
    pub fn single(file: GerberFile) -> Self {
        Self { files: vec![file] }
    }

    /// Wrap files as-is, without grouping or de-duplication.
    pub fn from_files(files: Vec<GerberFile>) -> Self {
        Self { files }
    }

    /// Gather the files that belong with `selected`.
    ///
    /// Keeps files whose `.SameCoordinates` matches the selected
    /// file's. When two carry the same `.FileFunction`, the one whose
    /// `.CreationDate` string sorts later wins. That comparison is on the
    /// raw strings, not parsed dates. With no grouping key on the selected
    /// file, only the selected file is loaded.
    pub fn assemble(files: impl IntoIterator<Item = GerberFile>, selected: GerberFile) -> Self {
        let Some(key) = selected.same_coordinates() else {
            warn!("{} has no .SameCoordinates attribute, loading it alone", selected.name);
            return Self::single(selected);
        };

        let mut by_function: IndexMap<String, GerberFile> = IndexMap::new();
        for file in std::iter::once(selected).chain(files) {
            if file.same_coordinates().as_deref() != Some(key.as_str()) {
                continue;
            }
            let Some(function) = file.attributes.get(FILE_FUNCTION).map(|a| a.to_string()) else {
                continue;
            };
            match by_function.get(&function) {
                Some(existing) if existing.creation_date() >= file.creation_date() => {
                    debug!("skipping {}: {} is newer for {}", file.name, existing.name, function);
                }
                _ => {
                    by_function.insert(function, file);
                }
            }
        }

        Self { files: by_function.into_values().collect() }
    }

    pub fn files(&self) -> &[GerberFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Cached derived geometry, replaced as a unit.
#[derive(Debug, Clone, Default)]
pub struct GeometryCache {
    pub generation: u64,
    pub substrate: Option<PlanarRegion>,
    pub mask: Option<PlanarRegion>,
}

/// A loaded board plus the side being viewed and its geometry cache.
///
/// Cloning is cheap and clones share the cache, so the foreground can
/// hand one to a render worker.
#[derive(Debug, Clone)]
pub struct BoardSession {
    files: Arc<BoardFileSet>,
    side: Side,
    min_region_width_mm: f64,
    cache: Arc<Mutex<GeometryCache>>,
}

impl BoardSession {
    pub fn new(files: BoardFileSet) -> Self {
        Self {
            files: Arc::new(files),
            side: Side::Front,
            min_region_width_mm: DEFAULT_MIN_REGION_WIDTH_MM,
            cache: Arc::new(Mutex::new(GeometryCache::default())),
        }
    }

    pub fn with_min_region_width_mm(mut self, width: f64) -> Self {
        self.min_region_width_mm = width;
        self.invalidate();
        self
    }

    pub fn files(&self) -> &[GerberFile] {
        self.files.files()
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// The board's native unit: that of its first file.
    pub fn units(&self) -> Units {
        self.files().first().map(|f| f.units).unwrap_or_default()
    }

    /// Union of every stream's bounding box.
    pub fn bounds(&self) -> Option<Rect> {
        self.files()
            .iter()
            .filter_map(|f| f.stream.bounds())
            .reduce(|acc, r| acc.union(&r))
    }

    /// Switch sides. This session gets a fresh cache; clones still on the
    /// old side keep theirs.
    pub fn set_side(&mut self, side: Side) {
        if side != self.side {
            self.side = side;
            self.detach_cache();
        }
    }

    pub fn replace_files(&mut self, files: BoardFileSet) {
        self.files = Arc::new(files);
        self.detach_cache();
    }

    fn detach_cache(&mut self) {
        let generation = self.lock().generation + 1;
        self.cache = Arc::new(Mutex::new(GeometryCache { generation, ..GeometryCache::default() }));
        debug!("geometry cache replaced (generation {})", generation);
    }

    /// Drop cached geometry and start a new generation.
    pub fn invalidate(&self) {
        let mut cache = self.lock();
        let generation = cache.generation + 1;
        *cache = GeometryCache { generation, ..GeometryCache::default() };
        debug!("geometry cache invalidated (generation {})", generation);
    }

    /// Snapshot of the cache.
    pub fn cache(&self) -> GeometryCache {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, GeometryCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// First file of the given function kind, optionally on a side.
    ///
    /// `side_index` is where that kind keeps its side in `.FileFunction`.
    pub fn find_file(&self, kind: &str, side_index: Option<usize>) -> Option<&GerberFile> {
        self.files().iter().find(|file| {
            let Some(function) = file.file_function() else { return false };
            if function.kind() != Some(kind) {
                return false;
            }
            match side_index {
                Some(i) => function.value(i) == Some(self.side.gerber_code()),
                None => true,
            }
        })
    }

    pub fn profile_file(&self) -> Option<&GerberFile> {
        self.find_file("Profile", None)
    }

    pub fn soldermask_file(&self) -> Option<&GerberFile> {
        self.find_file("Soldermask", Some(1))
    }

    fn outline_options(&self) -> OutlineOptions {
        OutlineOptions::with_units(self.units()).with_min_region_width_mm(self.min_region_width_mm)
    }

    /// Build the outline without touching the cache.
    pub fn build_outline(&self, cancel: &CancelToken, progress: Progress) -> Result<Option<Outline>> {
        match self.profile_file() {
            Some(file) => build_outline(&file.stream, &self.outline_options(), cancel, progress).map(Some),
            None => Ok(None),
        }
    }

    /// The board substrate, from cache or freshly built and stored.
    ///
    /// A board with no profile layer has an empty substrate.
    pub fn compute_outline(&self, cancel: &CancelToken, progress: Progress) -> Result<PlanarRegion> {
        let generation = {
            let cache = self.lock();
            if let Some(substrate) = &cache.substrate {
                debug!("substrate cache hit");
                return Ok(substrate.clone());
            }
            cache.generation
        };

        let substrate = self
            .build_outline(cancel, progress)?
            .map(|outline| outline.region)
            .unwrap_or_default();
        self.store(generation, |cache| cache.substrate = Some(substrate.clone()));
        Ok(substrate)
    }

    /// Substrate minus mask material, `None` without a mask layer for the
    /// current side.
    pub fn compute_mask(&self, cancel: &CancelToken, progress: Progress) -> Result<Option<PlanarRegion>> {
        let Some(file) = self.soldermask_file() else {
            return Ok(None);
        };

        let generation = {
            let cache = self.lock();
            if let Some(mask) = &cache.mask {
                debug!("mask cache hit");
                return Ok(Some(mask.clone()));
            }
            cache.generation
        };

        let substrate = self.compute_outline(cancel, &no_progress)?;
        let mask = build_mask(&substrate, &file.stream, cancel, progress)?;
        self.store(generation, |cache| cache.mask = Some(mask.clone()));
        Ok(Some(mask))
    }

    /// Apply `update` only if nobody invalidated the cache meanwhile.
    fn store(&self, generation: u64, update: impl FnOnce(&mut GeometryCache)) {
        let mut cache = self.lock();
        if cache.generation == generation {
            update(&mut cache);
        } else {
            debug!("discarding geometry from stale generation {}", generation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{Attribute, GraphicalObject, GraphicsStream, Polarity, CREATION_DATE, SAME_COORDINATES};

    fn file(name: &str, function: &[&str], group: Option<&str>, date: Option<&str>) -> GerberFile {
        let mut f = GerberFile::new(name, Units::Millimeters, GraphicsStream::default())
            .with_attribute(Attribute::new(FILE_FUNCTION, function));
        if let Some(g) = group {
            f = f.with_attribute(Attribute::new(SAME_COORDINATES, &[g]));
        }
        if let Some(d) = date {
            f = f.with_attribute(Attribute::new(CREATION_DATE, &[d]));
        }
        f
    }

    fn profile(rect: Rect) -> GerberFile {
        GerberFile::new(
            "board.gko",
            Units::Millimeters,
            GraphicsStream::new(vec![GraphicalObject::new(PlanarRegion::from_rect(rect), Polarity::Dark)]),
        )
        .with_attribute(Attribute::new(FILE_FUNCTION, &["Profile", "NP"]))
    }

    #[test]
    fn assemble_groups_and_dedupes() {
        let selected = file("a-F_Cu.gtl", &["Copper", "L1", "Top"], Some("Original"), Some("2024-01-01"));
        let set = BoardFileSet::assemble(
            vec![
                file("a-B_Cu.gbl", &["Copper", "L2", "Bot"], Some("Original"), Some("2024-01-01")),
                file("other.gtl", &["Copper", "L1", "Top"], Some("Other"), Some("2025-01-01")),
                file("a-F_Cu-new.gtl", &["Copper", "L1", "Top"], Some("Original"), Some("2024-02-01")),
                file("a-F_Cu-old.gtl", &["Copper", "L1", "Top"], Some("Original"), Some("2023-12-31")),
                file("nofunc.gbr", &[], Some("Original"), None),
            ],
            selected,
        );

        let names: Vec<&str> = set.files().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a-F_Cu-new.gtl", "a-B_Cu.gbl", "nofunc.gbr"]);
    }

    #[test]
    fn assemble_without_group_key_loads_alone() {
        let selected = file("lonely.gbr", &["Legend", "Top"], None, None);
        let set = BoardFileSet::assemble(vec![file("x.gbr", &["Copper", "L1", "Top"], Some("Original"), None)], selected);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn find_file_respects_side() {
        let mut session = BoardSession::new(BoardFileSet::from_files(vec![
            file("top.gts", &["Soldermask", "Top"], None, None),
            file("bot.gbs", &["Soldermask", "Bot"], None, None),
        ]));
        assert_eq!(session.soldermask_file().map(|f| f.name.as_str()), Some("top.gts"));
        session.set_side(Side::Back);
        assert_eq!(session.soldermask_file().map(|f| f.name.as_str()), Some("bot.gbs"));
    }

    #[test]
    fn outline_is_cached_until_side_changes() {
        let mut session = BoardSession::new(BoardFileSet::single(profile(Rect::new(0.0, 0.0, 20.0, 10.0))));
        let cancel = CancelToken::new();

        let substrate = session.compute_outline(&cancel, &no_progress).unwrap();
        assert!((substrate.area() - 200.0).abs() < 1e-6);
        assert!(session.cache().substrate.is_some());

        let before = session.cache().generation;
        session.set_side(Side::Back);
        let cache = session.cache();
        assert!(cache.substrate.is_none(), "side change should drop the substrate");
        assert!(cache.generation > before);
    }

    #[test]
    fn stale_generation_is_not_stored() {
        let session = BoardSession::new(BoardFileSet::single(profile(Rect::new(0.0, 0.0, 5.0, 5.0))));
        let generation = session.cache().generation;
        session.invalidate();
        session.store(generation, |cache| cache.substrate = Some(PlanarRegion::empty()));
        assert!(session.cache().substrate.is_none());
    }

    #[test]
    fn cancelled_outline_leaves_cache_empty() {
        let session = BoardSession::new(BoardFileSet::single(profile(Rect::new(0.0, 0.0, 5.0, 5.0))));
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(session.compute_outline(&cancel, &no_progress).is_err());
        assert!(session.cache().substrate.is_none());
    }

    #[test]
    fn no_mask_layer_means_no_mask() {
        let session = BoardSession::new(BoardFileSet::single(profile(Rect::new(0.0, 0.0, 5.0, 5.0))));
        assert_eq!(session.compute_mask(&CancelToken::new(), &no_progress), Ok(None));
    }
}
