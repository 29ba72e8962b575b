//! The Keyframe Store - precomputed whisker shapes per frame
//!
//! Holds, for each side of the head, a table mapping whisker key → F frames
//! → P head-space sample points. Tables are total: every whisker that appears
//! in the data owns exactly F frames of exactly P points, and anything the
//! data does not provide stays a zero vector. Downstream interpolation can
//! therefore index any `(frame, point)` in range without checking.
//!
//! # Data format
//!
//! One CSV file per side and frame (`right_whiskers_frame_{i}.csv`,
//! `left_whiskers_frame_{i}.csv`), rows of
//! `frame,whisker,point,x,y,z`. The y/z columns are swapped on load.

use csv::{ReaderBuilder, StringRecord, Trim};
use nalgebra::Point3;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use whisker_env::{Side, WhiskerId};

/// Sample points per whisker shape.
pub const POINTS_PER_WHISKER: usize = 100;

/// Frames per whisking cycle in the full dataset.
pub const DEFAULT_FRAME_COUNT: usize = 51;

/// Name-list index of the first left whisker.
pub const LEFT_INDEX_OFFSET: usize = 30;

/// First field of a header row.
const HEADER_MARKER: &str = "Frame";

/// Errors from reading keyframe or name files.
#[derive(Debug, Error)]
pub enum KeyframeError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Row counts from one ingest pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub rows_loaded: usize,
    pub rows_skipped: usize,
}

/// Keyframe shapes for the whiskers of one side.
#[derive(Debug, Clone)]
pub struct KeyframeTable {
    frame_count: usize,

    /// whisker key -> frames -> points
    whiskers: BTreeMap<usize, Vec<Vec<Point3<f64>>>>,

    /// Returned for whiskers or frames the table does not hold
    zero_shape: Vec<Point3<f64>>,
}

impl KeyframeTable {
    /// Creates an empty table for `frame_count` frames.
    pub fn new(frame_count: usize) -> Self {
        Self {
            frame_count,
            whiskers: BTreeMap::new(),
            zero_shape: vec![Point3::origin(); POINTS_PER_WHISKER],
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Number of whiskers with data.
    pub fn len(&self) -> usize {
        self.whiskers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.whiskers.is_empty()
    }

    pub fn contains(&self, whisker: usize) -> bool {
        self.whiskers.contains_key(&whisker)
    }

    /// Whisker keys in ascending order.
    pub fn whisker_keys(&self) -> impl Iterator<Item = usize> + '_ {
        self.whiskers.keys().copied()
    }

    /// Shape of `whisker` at `frame`, or the zero shape if absent.
    pub fn frame(&self, whisker: usize, frame: usize) -> &[Point3<f64>] {
        self.whiskers
            .get(&whisker)
            .and_then(|frames| frames.get(frame))
            .map(|points| points.as_slice())
            .unwrap_or(&self.zero_shape)
    }

    /// Sets one sample point. Returns false (and stores nothing) when the
    /// frame or point index is out of range.
    pub fn set_point(
        &mut self,
        whisker: usize,
        frame: usize,
        point: usize,
        position: Point3<f64>,
    ) -> bool {
        if frame >= self.frame_count || point >= POINTS_PER_WHISKER {
            return false;
        }
        self.whisker_mut(whisker)[frame][point] = position;
        true
    }

    /// Sets a whole frame. Missing trailing points are left at zero, extra
    /// points are ignored.
    pub fn set_frame(&mut self, whisker: usize, frame: usize, points: &[Point3<f64>]) -> bool {
        if frame >= self.frame_count {
            return false;
        }
        let target = &mut self.whisker_mut(whisker)[frame];
        for (slot, p) in target.iter_mut().zip(points) {
            *slot = *p;
        }
        true
    }

    /// Zero-filled F x P storage for a whisker, created on first use.
    fn whisker_mut(&mut self, whisker: usize) -> &mut Vec<Vec<Point3<f64>>> {
        let frame_count = self.frame_count;
        self.whiskers.entry(whisker).or_insert_with(|| {
            vec![vec![Point3::origin(); POINTS_PER_WHISKER]; frame_count]
        })
    }

    /// Reads keyframe rows from CSV text into the table.
    ///
    /// Header rows, rows without exactly six fields, rows that fail to parse
    /// and rows with out-of-range indices are skipped. Only I/O failures of
    /// the underlying reader are returned as errors.
    pub fn ingest_csv<R: Read>(&mut self, reader: R) -> Result<IngestStats, KeyframeError> {
        let mut csv_reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader);

        let mut stats = IngestStats::default();

        for record in csv_reader.records() {
            let record = match record {
                Ok(r) => r,
                Err(e) if e.is_io_error() => return Err(KeyframeError::Csv(e)),
                Err(_) => {
                    stats.rows_skipped += 1;
                    continue;
                }
            };

            if is_header(&record) {
                continue;
            }

            match parse_row(&record) {
                Some((frame, whisker, point, position))
                    if self.set_point(whisker, frame, point, position) =>
                {
                    stats.rows_loaded += 1;
                }
                _ => stats.rows_skipped += 1,
            }
        }

        Ok(stats)
    }

    /// Ingests one CSV file.
    pub fn ingest_file(&mut self, path: &Path) -> Result<IngestStats, KeyframeError> {
        let file = File::open(path).map_err(|source| KeyframeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.ingest_csv(file)
    }

    /// Loads `{prefix}_frame_{i}.csv` for every frame of the cycle.
    ///
    /// Missing or unreadable files are logged and skipped; the table keeps
    /// whatever the other files provided.
    pub fn load_dir(dir: &Path, prefix: &str, frame_count: usize) -> Self {
        let mut table = Self::new(frame_count);
        let mut totals = IngestStats::default();

        for frame in 0..frame_count {
            let path = dir.join(format!("{}_frame_{}.csv", prefix, frame));
            match table.ingest_file(&path) {
                Ok(stats) => {
                    totals.rows_loaded += stats.rows_loaded;
                    totals.rows_skipped += stats.rows_skipped;
                }
                Err(e) => error!("Failed to load {}: {}", path.display(), e),
            }
        }

        if totals.rows_skipped > 0 {
            debug!("{}: skipped {} malformed rows", prefix, totals.rows_skipped);
        }
        table
    }
}

fn is_header(record: &StringRecord) -> bool {
    record
        .get(0)
        .map(|first| first.starts_with(HEADER_MARKER))
        .unwrap_or(false)
}

/// Parses `frame,whisker,point,x,y,z`, swapping y and z.
fn parse_row(record: &StringRecord) -> Option<(usize, usize, usize, Point3<f64>)> {
    if record.len() != 6 {
        return None;
    }
    let frame = record.get(0)?.parse::<usize>().ok()?;
    let whisker = record.get(1)?.parse::<usize>().ok()?;
    let point = record.get(2)?.parse::<usize>().ok()?;
    let x = record.get(3)?.parse::<f64>().ok()?;
    let y = record.get(4)?.parse::<f64>().ok()?;
    let z = record.get(5)?.parse::<f64>().ok()?;

    if !(x.is_finite() && y.is_finite() && z.is_finite()) {
        return None;
    }

    Some((frame, whisker, point, Point3::new(x, z, y)))
}

/// Parses a whisker-name list: one name per non-blank line.
pub fn parse_whisker_names(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reads a whisker-name list from disk.
pub fn load_whisker_names(path: &Path) -> Result<Vec<String>, KeyframeError> {
    let text = std::fs::read_to_string(path).map_err(|source| KeyframeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_whisker_names(&text))
}

/// Owner of both sides' keyframe tables and the whisker-name list.
///
/// Constructed once at startup and shared (read-only) with every animator.
#[derive(Debug, Clone)]
pub struct KeyframeStore {
    frame_count: usize,
    right: KeyframeTable,
    left: KeyframeTable,
    names: Vec<String>,
}

impl KeyframeStore {
    /// Creates an empty store.
    pub fn new(frame_count: usize, names: Vec<String>) -> Self {
        Self {
            frame_count,
            right: KeyframeTable::new(frame_count),
            left: KeyframeTable::new(frame_count),
            names,
        }
    }

    /// Creates a store from prebuilt tables.
    ///
    /// Both tables must share the same frame count; the store takes the
    /// right table's.
    pub fn from_tables(right: KeyframeTable, left: KeyframeTable, names: Vec<String>) -> Self {
        if right.frame_count() != left.frame_count() {
            warn!(
                "Keyframe tables disagree on frame count (right={}, left={})",
                right.frame_count(),
                left.frame_count()
            );
        }
        Self {
            frame_count: right.frame_count(),
            right,
            left,
            names,
        }
    }

    /// Loads names and both sides' tables.
    ///
    /// Never fails: a missing name list yields no names, missing frame
    /// files yield zero-filled or empty tables. Each problem is logged.
    pub fn load(data_dir: &Path, names_path: &Path, frame_count: usize) -> Self {
        let names = match load_whisker_names(names_path) {
            Ok(names) => names,
            Err(e) => {
                error!("Failed to load whisker names: {}", e);
                Vec::new()
            }
        };

        let right = KeyframeTable::load_dir(data_dir, "right_whiskers", frame_count);
        let left = KeyframeTable::load_dir(data_dir, "left_whiskers", frame_count);

        info!(
            "Loaded {} right and {} left whiskers ({} frames, {} names)",
            right.len(),
            left.len(),
            frame_count,
            names.len()
        );

        Self {
            frame_count,
            right,
            left,
            names,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn table(&self, side: Side) -> &KeyframeTable {
        match side {
            Side::Right => &self.right,
            Side::Left => &self.left,
        }
    }

    pub fn table_mut(&mut self, side: Side) -> &mut KeyframeTable {
        match side {
            Side::Right => &mut self.right,
            Side::Left => &mut self.left,
        }
    }

    /// Head-space shape of one whisker at one frame (zero shape if absent).
    pub fn frame(&self, side: Side, local_index: usize, frame: usize) -> &[Point3<f64>] {
        self.table(side).frame(local_index, frame)
    }

    /// Identities for every whisker with keyframe data.
    ///
    /// Right key `k` is named by `names[k]`, left key `k` by
    /// `names[k + left_offset]`. Keys without a name are skipped with a
    /// warning.
    pub fn whisker_ids(&self, left_offset: usize) -> Vec<WhiskerId> {
        let mut ids = Vec::new();

        for (side, offset) in [(Side::Right, 0), (Side::Left, left_offset)] {
            for key in self.table(side).whisker_keys() {
                let index = key + offset;
                match self.names.get(index) {
                    Some(name) => {
                        let mut id = WhiskerId::new(name.clone(), index, key);
                        if id.side != side {
                            debug!("{} is stored in the {} table", id.name, side);
                            id.side = side;
                        }
                        ids.push(id);
                    }
                    None => warn!("{} whisker {} has no name (index {}), skipping", side, key, index),
                }
            }
        }

        ids
    }
}
