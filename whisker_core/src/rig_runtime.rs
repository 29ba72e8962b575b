//! Rig Runtime - owns every whisker and sequences the per-tick phases.
//!
//! Contact events and the recorder's sampling step both touch the
//! per-whisker reading, so their order matters. The rig makes the order a
//! type-level fact: a tick is a [`ContactPhase`] (animate, reposition,
//! accept 0..N overlap events) that can only be turned into a
//! [`SamplePhase`] (read-only snapshots), which resets every reading when
//! it is dropped.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        WhiskerRig                            │
//! │   Arc<KeyframeStore> ──► CurveAnimator (per whisker)         │
//! │                              │ world shape                   │
//! │                              ▼                               │
//! │                          ProxySet ──► overlap events         │
//! │                                            │                 │
//! │                          ContactMapper ◄───┘                 │
//! │                              │ max-intensity                 │
//! │                              ▼                               │
//! │                        SensorReading ──► SamplePhase          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let mut phase = rig.begin_tick(frame, blend);
//! for (key, proxy) in phase.proxies() { /* broad phase */ }
//! phase.on_overlap(key, &obstacle, OverlapPhase::Enter);
//! let sample = phase.finish();
//! recorder.on_tick(&sample);
//! // readings reset when `sample` drops
//! ```

use crate::whisker_contact::{ContactMapper, ContactRejection, ContactSample};
use crate::whisker_curve::CurveAnimator;
use crate::whisker_keyframes::{KeyframeStore, LEFT_INDEX_OFFSET};
use crate::whisker_proxy::{CollisionProxy, ProxyConfig, ProxySet};
use crate::whisker_sensor::SensorReading;

use nalgebra::Isometry3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, trace};
use whisker_env::{Obstacle, OverlapPhase, WhiskerId};

/// Configuration shared by every whisker of a rig.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    /// Collision proxy layout
    pub proxy: ProxyConfig,

    /// Proximity gate as a multiple of the proxy radius (default: 2.0)
    pub proximity_multiplier: f64,

    /// Zero-angle frame; `None` uses the middle of the cycle
    pub center_frame: Option<f64>,

    /// Name-list index of the first left whisker (default: 30)
    pub left_index_offset: usize,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            proxy: ProxyConfig::default(),
            proximity_multiplier: 2.0,
            center_frame: None,
            left_index_offset: LEFT_INDEX_OFFSET,
        }
    }
}

/// One simulated whisker: animation, collision proxies and reading.
#[derive(Debug, Clone)]
pub struct Whisker {
    id: WhiskerId,
    animator: CurveAnimator,
    proxies: ProxySet,
    mapper: ContactMapper,
    reading: SensorReading,
}

impl Whisker {
    /// Creates a whisker at frame 0 with its proxies already placed.
    pub fn new(store: Arc<KeyframeStore>, id: WhiskerId, config: &RigConfig) -> Self {
        let mut animator = CurveAnimator::new(store, &id);
        if let Some(center) = config.center_frame {
            animator = animator.with_center_frame(center);
        }

        let mut whisker = Self {
            id,
            animator,
            proxies: ProxySet::new(&config.proxy),
            mapper: ContactMapper::new(config.proximity_multiplier),
            reading: SensorReading::default(),
        };
        whisker.update(0, 0.0);
        whisker
    }

    pub fn id(&self) -> &WhiskerId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn animator(&self) -> &CurveAnimator {
        &self.animator
    }

    pub fn proxies(&self) -> &ProxySet {
        &self.proxies
    }

    /// Immutable copy of the current reading.
    pub fn snapshot(&self) -> SensorReading {
        self.reading.clone()
    }

    /// Animates to `(frame, blend)` and repositions the proxies.
    pub fn update(&mut self, frame_index: i64, blend: f64) {
        let world_shape = self.animator.update(frame_index, blend);
        self.proxies.reposition_all(world_shape);
        self.reading.theta = self.animator.whisking_angle();
    }

    /// Moves the head and repositions the proxies.
    pub fn set_head_pose(&mut self, pose: Isometry3<f64>) {
        self.animator.set_head_pose(pose);
        self.proxies.reposition_all(self.animator.world_shape());
    }

    /// Handles one overlap of proxy `proxy_index` with `obstacle`.
    ///
    /// Accepted contacts are folded into the reading (strongest wins);
    /// rejected ones leave it untouched.
    fn on_overlap(
        &mut self,
        proxy_index: usize,
        obstacle: &dyn Obstacle,
    ) -> Option<Result<ContactSample, ContactRejection>> {
        let proxy = self.proxies.get(proxy_index)?;
        let outcome = self.mapper.map(proxy, obstacle, &self.animator);

        if let Ok(sample) = &outcome {
            self.reading.register(sample.s, sample.intensity, &sample.object);
        }
        Some(outcome)
    }

    fn reset_reading(&mut self) {
        self.reading.reset();
    }
}

/// Addresses one proxy of one whisker within a rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProxyKey {
    pub whisker: usize,
    pub proxy: usize,
}

/// Per-tick contact statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub tick: u64,
    pub contacts_accepted: usize,
    pub contacts_rejected: usize,

    /// Accepted contacts whose overlap began this tick
    pub contacts_entered: usize,
    pub whiskers_in_contact: usize,
}

/// All whiskers of one head, sharing one keyframe store.
#[derive(Debug)]
pub struct WhiskerRig {
    store: Arc<KeyframeStore>,
    config: RigConfig,
    whiskers: Vec<Whisker>,
    by_name: HashMap<String, usize>,
    head_pose: Isometry3<f64>,
    tick_count: u64,
}

impl WhiskerRig {
    /// Builds one whisker per named table entry of the store.
    pub fn new(store: Arc<KeyframeStore>, config: RigConfig) -> Self {
        let ids = store.whisker_ids(config.left_index_offset);
        let mut whiskers = Vec::with_capacity(ids.len());
        let mut by_name = HashMap::new();

        for id in ids {
            if by_name.contains_key(&id.name) {
                debug!("Duplicate whisker name {}, keeping the first", id.name);
                continue;
            }
            by_name.insert(id.name.clone(), whiskers.len());
            whiskers.push(Whisker::new(store.clone(), id, &config));
        }

        info!("Rig built with {} whiskers", whiskers.len());

        Self {
            store,
            config,
            whiskers,
            by_name,
            head_pose: Isometry3::identity(),
            tick_count: 0,
        }
    }

    pub fn store(&self) -> &Arc<KeyframeStore> {
        &self.store
    }

    pub fn config(&self) -> &RigConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.whiskers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.whiskers.is_empty()
    }

    pub fn whiskers(&self) -> &[Whisker] {
        &self.whiskers
    }

    pub fn whisker(&self, name: &str) -> Option<&Whisker> {
        self.by_name.get(name).map(|&i| &self.whiskers[i])
    }

    pub fn head_pose(&self) -> &Isometry3<f64> {
        &self.head_pose
    }

    /// Number of completed ticks.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Moves the head (all whiskers share its anatomical origin).
    pub fn set_head_pose(&mut self, pose: Isometry3<f64>) {
        self.head_pose = pose;
        for whisker in &mut self.whiskers {
            whisker.set_head_pose(pose);
        }
    }

    /// Holds every whisker at one keyframe (no blending).
    pub fn set_all_to_frame(&mut self, frame_index: i64) {
        for whisker in &mut self.whiskers {
            whisker.update(frame_index, 0.0);
        }
    }

    /// Starts a tick: clears readings, animates every whisker to
    /// `(frame, blend)` and repositions its proxies.
    pub fn begin_tick(&mut self, frame_index: i64, blend: f64) -> ContactPhase<'_> {
        for whisker in &mut self.whiskers {
            whisker.reset_reading();
            whisker.update(frame_index, blend);
        }
        trace!("tick {} animated to frame {} blend {:.3}", self.tick_count, frame_index, blend);

        ContactPhase {
            rig: self,
            accepted: 0,
            rejected: 0,
            entered: 0,
        }
    }

    fn reset_all(&mut self) {
        for whisker in &mut self.whiskers {
            whisker.reset_reading();
        }
    }
}

/// First half of a tick: overlap events may be delivered.
pub struct ContactPhase<'a> {
    rig: &'a mut WhiskerRig,
    accepted: usize,
    rejected: usize,
    entered: usize,
}

impl<'a> ContactPhase<'a> {
    /// Every proxy of every whisker, for the broad phase.
    pub fn proxies(&self) -> impl Iterator<Item = (ProxyKey, &CollisionProxy)> + '_ {
        self.rig
            .whiskers
            .iter()
            .enumerate()
            .flat_map(|(w, whisker)| {
                whisker
                    .proxies
                    .iter()
                    .enumerate()
                    .map(move |(p, proxy)| (ProxyKey { whisker: w, proxy: p }, proxy))
            })
    }

    /// Whisker owning `key`.
    pub fn whisker(&self, key: ProxyKey) -> Option<&Whisker> {
        self.rig.whiskers.get(key.whisker)
    }

    /// Delivers one "proxy begins/continues overlapping obstacle" event.
    ///
    /// `Enter` and `Stay` are mapped identically. May be called any number
    /// of times per proxy per tick; the reading keeps the strongest
    /// accepted contact.
    pub fn on_overlap(
        &mut self,
        key: ProxyKey,
        obstacle: &dyn Obstacle,
        overlap: OverlapPhase,
    ) -> Option<ContactSample> {
        let whisker = self.rig.whiskers.get_mut(key.whisker)?;
        match whisker.on_overlap(key.proxy, obstacle)? {
            Ok(sample) => {
                trace!("{} proxy {} {:?} {} at s={:.3}", whisker.name(), key.proxy, overlap, obstacle.name(), sample.s);
                self.accepted += 1;
                if overlap == OverlapPhase::Enter {
                    self.entered += 1;
                }
                Some(sample)
            }
            Err(reason) => {
                trace!(
                    "{} proxy {} {:?} rejected {}: {:?}",
                    whisker.name(),
                    key.proxy,
                    overlap,
                    obstacle.name(),
                    reason
                );
                self.rejected += 1;
                None
            }
        }
    }

    /// Ends contact dispatch for this tick.
    pub fn finish(self) -> SamplePhase<'a> {
        let ContactPhase {
            rig,
            accepted,
            rejected,
            entered,
        } = self;

        let summary = TickSummary {
            tick: rig.tick_count,
            contacts_accepted: accepted,
            contacts_rejected: rejected,
            contacts_entered: entered,
            whiskers_in_contact: rig.whiskers.iter().filter(|w| w.reading.has_contact).count(),
        };

        if summary.whiskers_in_contact > 0 {
            debug!(
                "tick {}: {} whiskers in contact ({} accepted, {} rejected)",
                summary.tick, summary.whiskers_in_contact, accepted, rejected
            );
        }

        SamplePhase { rig, summary }
    }
}

/// Second half of a tick: readings are frozen and may be sampled.
///
/// Dropping the phase resets every reading and completes the tick.
pub struct SamplePhase<'a> {
    rig: &'a mut WhiskerRig,
    summary: TickSummary,
}

impl SamplePhase<'_> {
    /// Index of the tick being sampled.
    pub fn tick(&self) -> u64 {
        self.summary.tick
    }

    pub fn summary(&self) -> TickSummary {
        self.summary
    }

    /// Snapshot of one whisker's reading.
    pub fn reading(&self, name: &str) -> Option<SensorReading> {
        self.rig.whisker(name).map(Whisker::snapshot)
    }

    /// Snapshots of every whisker's reading.
    pub fn readings(&self) -> impl Iterator<Item = (&WhiskerId, SensorReading)> + '_ {
        self.rig.whiskers.iter().map(|w| (w.id(), w.snapshot()))
    }

    /// Read access to the rig (shapes, poses) for the sampling step.
    pub fn rig(&self) -> &WhiskerRig {
        &*self.rig
    }
}

impl Drop for SamplePhase<'_> {
    fn drop(&mut self) {
        self.rig.reset_all();
        self.rig.tick_count += 1;
    }
}
