//! Trial Recorder - Idle/Recording state machine.
//!
//! ```text
//!          start()                    on_tick() at frame cap
//!   Idle ───────────► Recording ────────────────────────────► Idle
//!     ▲                   │            (flushes like stop)
//!     └───────────────────┘
//!            stop()
//! ```
//!
//! While recording, every sampled tick appends one `s,theta` line per known
//! whisker name. Tick 0 additionally captures the stereo pair before
//! sampling. Files are only written on stop, one headerless two-column
//! CSV per name plus `summary.json`.

use crate::renderer::CaptureConfig;
use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use whisker_core::{SamplePhase, SensorReading};
use whisker_env::{FrameRenderer, ImageSink, Side, Viewpoint};

/// Errors raised while flushing a trial.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("Summary serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl RecorderError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Recorder state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
}

/// What a tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Not recording; nothing sampled
    Idle,

    /// One line appended per name for this frame
    Sampled { frame: u32 },

    /// Frame cap reached; files were flushed
    AutoStopped(TrialOutput),
}

/// Per-whisker statistics written to `summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhiskerSummary {
    pub name: String,
    pub side: Side,

    /// Frames with a contact
    pub contact_frames: u32,

    /// Mean contact position over contact frames (0 if none)
    pub mean_s: f64,
}

/// Contents of `summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialSummary {
    pub frames_recorded: u32,
    pub images_captured: u32,
    pub whiskers: Vec<WhiskerSummary>,
}

impl TrialSummary {
    /// Whiskers that touched anything during the trial.
    pub fn whiskers_in_contact(&self) -> usize {
        self.whiskers.iter().filter(|w| w.contact_frames > 0).count()
    }
}

/// Result of a flushed trial.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialOutput {
    pub directory: PathBuf,
    pub files_written: Vec<PathBuf>,

    /// Files that could not be written (already logged)
    pub files_failed: Vec<PathBuf>,

    pub summary: TrialSummary,
}

impl TrialOutput {
    /// True when every series and the summary reached the disk.
    pub fn is_complete(&self) -> bool {
        self.files_failed.is_empty()
    }
}

/// One whisker's accumulated series.
#[derive(Debug, Clone)]
struct Series {
    name: String,
    side: Side,
    /// (s, theta) per sampled frame
    samples: Vec<(f64, f64)>,
    contact_frames: u32,
    s_sum: f64,
}

impl Series {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            side: Side::from_name(name),
            samples: Vec::new(),
            contact_frames: 0,
            s_sum: 0.0,
        }
    }

    fn push(&mut self, reading: &SensorReading) {
        self.samples.push((reading.s_or_zero(), reading.theta));
        if reading.has_contact {
            self.contact_frames += 1;
            self.s_sum += reading.s;
        }
    }

    fn summary(&self) -> WhiskerSummary {
        WhiskerSummary {
            name: self.name.clone(),
            side: self.side,
            contact_frames: self.contact_frames,
            mean_s: if self.contact_frames > 0 {
                self.s_sum / self.contact_frames as f64
            } else {
                0.0
            },
        }
    }
}

/// Formats one output field: four decimals, `.` as the decimal separator.
pub fn format_field(value: f64) -> String {
    format!("{:.4}", value)
}

/// Formats one output line: contact position and whisking angle.
pub fn format_line(reading: &SensorReading) -> String {
    format_sample(reading.s_or_zero(), reading.theta)
}

fn format_sample(s: f64, theta: f64) -> String {
    format!("{},{}", format_field(s), format_field(theta))
}

/// Left and right eye viewpoints for a head pose.
pub fn stereo_viewpoints(head_pose: &Isometry3<f64>, config: &CaptureConfig) -> [Viewpoint; 2] {
    let eye = |side: Side, sign: f64| {
        let local = Isometry3::from_parts(
            Translation3::new(sign * config.eye_separation, 0.0, 0.0),
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), sign * config.eye_yaw_deg.to_radians()),
        );
        Viewpoint::new(side, head_pose * local, config.horizontal_fov_deg)
    };
    [eye(Side::Left, -1.0), eye(Side::Right, 1.0)]
}

/// Records one trial at a time.
pub struct TrialRecorder<R: FrameRenderer, S: ImageSink> {
    state: RecorderState,
    frame_cap: u32,
    frame: u32,
    capture: CaptureConfig,
    renderer: R,
    sink: S,
    names: Vec<String>,
    series: Vec<Series>,
    viewpoints: Option<[Viewpoint; 2]>,
    output_dir: Option<PathBuf>,
    images_captured: u32,
}

impl<R: FrameRenderer, S: ImageSink> TrialRecorder<R, S> {
    /// Creates an idle recorder for the given whisker names.
    pub fn new(names: Vec<String>, frame_cap: u32, capture: CaptureConfig, renderer: R, sink: S) -> Self {
        Self {
            state: RecorderState::Idle,
            frame_cap,
            frame: 0,
            capture,
            renderer,
            sink,
            names,
            series: Vec::new(),
            viewpoints: None,
            output_dir: None,
            images_captured: 0,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecorderState::Recording
    }

    /// Frames sampled so far in the current trial.
    pub fn frame(&self) -> u32 {
        self.frame
    }

    pub fn frame_cap(&self) -> u32 {
        self.frame_cap
    }

    pub fn images_captured(&self) -> u32 {
        self.images_captured
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    fn series(&self, name: &str) -> Option<&Series> {
        self.series.iter().find(|s| s.name == name)
    }

    /// Viewpoint side bound to a whisker for the current trial.
    pub fn binding(&self, name: &str) -> Option<Side> {
        self.series(name).map(|s| s.side)
    }

    /// `(s, theta)` pairs accumulated so far for one whisker.
    pub fn samples(&self, name: &str) -> Option<&[(f64, f64)]> {
        self.series(name).map(|s| s.samples.as_slice())
    }

    /// Accumulated samples formatted as they will be written.
    pub fn lines(&self, name: &str) -> Option<Vec<String>> {
        self.samples(name).map(|samples| {
            samples
                .iter()
                .map(|&(s, theta)| format_sample(s, theta))
                .collect()
        })
    }

    /// Begins a trial writing into `output_dir`.
    ///
    /// Returns false (and changes nothing) if a trial is already running.
    pub fn start(&mut self, output_dir: &Path, head_pose: &Isometry3<f64>) -> Result<bool, RecorderError> {
        if self.is_recording() {
            debug!("start() while recording, ignored");
            return Ok(false);
        }

        fs::create_dir_all(output_dir).map_err(|e| RecorderError::io(output_dir, e))?;

        self.series = self.names.iter().map(|n| Series::new(n)).collect();
        self.viewpoints = Some(stereo_viewpoints(head_pose, &self.capture));
        self.output_dir = Some(output_dir.to_path_buf());
        self.images_captured = 0;
        self.frame = 0;
        self.state = RecorderState::Recording;

        info!(
            "Recording trial into {} ({} whiskers, cap {} frames)",
            output_dir.display(),
            self.names.len(),
            self.frame_cap
        );
        Ok(true)
    }

    /// Sample step of a tick. Must be called after all contacts of the
    /// tick were delivered, which `SamplePhase` guarantees.
    pub fn on_tick(&mut self, sample: &SamplePhase<'_>) -> TickOutcome {
        if !self.is_recording() {
            return TickOutcome::Idle;
        }

        if self.frame >= self.frame_cap {
            info!("Frame cap {} reached, stopping", self.frame_cap);
            return match self.stop() {
                Some(output) => TickOutcome::AutoStopped(output),
                None => TickOutcome::Idle,
            };
        }

        if self.frame == 0 {
            self.capture_images();
        }

        for series in &mut self.series {
            let reading = sample.reading(&series.name).unwrap_or_default();
            series.push(&reading);
        }

        let frame = self.frame;
        self.frame += 1;
        debug!("Sampled frame {} (tick {})", frame, sample.tick());
        TickOutcome::Sampled { frame }
    }

    /// Renders and writes the stereo pair. Failures are logged and the
    /// trial continues without the image.
    fn capture_images(&mut self) {
        let (Some(viewpoints), Some(dir)) = (self.viewpoints.as_ref(), self.output_dir.as_ref()) else {
            return;
        };

        for viewpoint in viewpoints {
            let path = dir.join(format!(
                "frame_{}_{:04}.{}",
                viewpoint.side.label(),
                self.frame,
                self.sink.extension()
            ));

            let result = self
                .renderer
                .render(viewpoint, self.capture.output_width, self.capture.output_height)
                .and_then(|image| self.sink.write_image(&path, &image));

            match result {
                Ok(()) => {
                    self.images_captured += 1;
                    debug!("Captured {}", path.display());
                }
                Err(e) => error!("Failed to capture {}: {}", path.display(), e),
            }
        }
    }

    /// Ends the trial and writes every series plus `summary.json`.
    ///
    /// A no-op returning `None` when idle. Every file is attempted even if
    /// earlier ones fail; failures are logged and listed in
    /// [`TrialOutput::files_failed`]. The recorder is idle afterwards.
    pub fn stop(&mut self) -> Option<TrialOutput> {
        if !self.is_recording() {
            return None;
        }
        self.state = RecorderState::Idle;

        let dir = self.output_dir.take()?;

        let mut files_written = Vec::with_capacity(self.series.len() + 1);
        let mut files_failed = Vec::new();
        let mut record = |path: PathBuf, result: Result<(), RecorderError>| match result {
            Ok(()) => files_written.push(path),
            Err(e) => {
                error!("Failed to write {}: {}", path.display(), e);
                files_failed.push(path);
            }
        };

        for series in &self.series {
            let path = dir.join(format!("{}.csv", series.name));
            let result = write_series(&path, &series.samples);
            record(path, result);
        }

        let summary = TrialSummary {
            frames_recorded: self.frame,
            images_captured: self.images_captured,
            whiskers: self.series.iter().map(Series::summary).collect(),
        };
        let summary_path = dir.join("summary.json");
        let result = write_atomic(&summary_path, |w| {
            serde_json::to_writer_pretty(w, &summary)?;
            Ok(())
        });
        record(summary_path, result);

        info!(
            "Trial stopped: {} frames, {} images, {} files in {}",
            summary.frames_recorded,
            summary.images_captured,
            files_written.len(),
            dir.display()
        );
        if !files_failed.is_empty() {
            warn!("{} files could not be written", files_failed.len());
        }
        if summary.whiskers.is_empty() {
            warn!("Trial recorded no whiskers");
        }

        self.series.clear();

        Some(TrialOutput {
            directory: dir,
            files_written,
            files_failed,
            summary,
        })
    }
}

/// Writes one whisker's series as headerless `s,theta` records.
fn write_series(path: &Path, samples: &[(f64, f64)]) -> Result<(), RecorderError> {
    write_atomic(path, |w| {
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(w);
        for &(s, theta) in samples {
            writer.write_record([format_field(s), format_field(theta)])?;
        }
        writer.flush().map_err(|e| RecorderError::io(path, e))
    })
}

/// Writes through a temporary sibling file, then renames it into place.
fn write_atomic<F>(path: &Path, fill: F) -> Result<(), RecorderError>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<(), RecorderError>,
{
    let tmp = path.with_extension("tmp");
    let file = File::create(&tmp).map_err(|e| RecorderError::io(&tmp, e))?;
    let mut writer = BufWriter::new(file);
    let result = fill(&mut writer).and_then(|_| writer.flush().map_err(|e| RecorderError::io(&tmp, e)));
    drop(writer);

    match result {
        Ok(()) => fs::rename(&tmp, path).map_err(|e| RecorderError::io(path, e)),
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::sync::Arc;
    use whisker_core::{KeyframeStore, KeyframeTable, RigConfig, WhiskerRig};
    use whisker_env::{CapturedImage, EnvError};

    /// Renderer that returns a flat image and counts calls.
    #[derive(Default)]
    struct FlatRenderer {
        calls: u32,
    }

    impl FrameRenderer for FlatRenderer {
        fn render(&mut self, _: &Viewpoint, width: u32, height: u32) -> Result<CapturedImage, EnvError> {
            self.calls += 1;
            Ok(CapturedImage::new(width, height))
        }
    }

    /// Sink that remembers paths instead of touching the disk.
    #[derive(Default)]
    struct MemorySink {
        written: Vec<PathBuf>,
    }

    impl ImageSink for MemorySink {
        fn write_image(&mut self, path: &Path, _: &CapturedImage) -> Result<(), EnvError> {
            self.written.push(path.to_path_buf());
            Ok(())
        }

        fn extension(&self) -> &'static str {
            "png"
        }
    }

    struct FailingSink;

    impl ImageSink for FailingSink {
        fn write_image(&mut self, path: &Path, _: &CapturedImage) -> Result<(), EnvError> {
            Err(EnvError::io(path, std::io::Error::new(std::io::ErrorKind::Other, "disk full")))
        }

        fn extension(&self) -> &'static str {
            "png"
        }
    }

    fn empty_rig(names: &[&str]) -> WhiskerRig {
        let names = names.iter().map(|n| n.to_string()).collect();
        let store = KeyframeStore::from_tables(KeyframeTable::new(3), KeyframeTable::new(3), names);
        WhiskerRig::new(Arc::new(store), RigConfig::default())
    }

    fn recorder<S: ImageSink>(names: &[&str], cap: u32, sink: S) -> TrialRecorder<FlatRenderer, S> {
        let names = names.iter().map(|n| n.to_string()).collect();
        TrialRecorder::new(names, cap, CaptureConfig::default(), FlatRenderer::default(), sink)
    }

    #[test]
    fn test_format_line() {
        let mut reading = SensorReading::default();
        reading.theta = -25.0;
        assert_eq!(format_line(&reading), "0.0000,-25.0000");

        reading.register(0.123456, 0.123456, "pole");
        assert_eq!(format_line(&reading), "0.1235,-25.0000");
    }

    #[test]
    fn test_idle_tick_and_stop_are_noops() {
        let mut rig = empty_rig(&["RA0"]);
        let mut rec = recorder(&["RA0"], 5, MemorySink::default());

        let sample = rig.begin_tick(0, 0.0).finish();
        assert_eq!(rec.on_tick(&sample), TickOutcome::Idle);
        drop(sample);

        assert!(rec.stop().is_none());
        assert_eq!(rec.state(), RecorderState::Idle);
    }

    #[test]
    fn test_start_twice_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = recorder(&["RA0", "LA0"], 5, MemorySink::default());

        assert!(rec.start(dir.path(), &Isometry3::identity()).unwrap());
        assert!(!rec.start(dir.path(), &Isometry3::identity()).unwrap());
        assert_eq!(rec.binding("LA0"), Some(Side::Left));
        assert_eq!(rec.binding("RA0"), Some(Side::Right));
        assert_eq!(rec.binding("RB9"), None);
    }

    #[test]
    fn test_capture_once_and_names_without_whisker() {
        let dir = tempfile::tempdir().unwrap();
        let mut rig = empty_rig(&["RA0"]);
        let mut rec = recorder(&["RA0", "RB1"], 3, MemorySink::default());
        rec.start(dir.path(), &Isometry3::identity()).unwrap();

        for _ in 0..3 {
            let sample = rig.begin_tick(0, 0.0).finish();
            rec.on_tick(&sample);
        }

        assert_eq!(rec.sink.written.len(), 2);
        assert!(rec.sink.written[0].ends_with("frame_left_0000.png"));
        assert!(rec.sink.written[1].ends_with("frame_right_0000.png"));
        assert_eq!(rec.renderer.calls, 2);

        // RB1 has no keyframes but still gets a zero line per frame
        assert_eq!(rec.lines("RB1").unwrap(), ["0.0000,0.0000"; 3]);
        assert_eq!(rec.lines("RA0").unwrap().len(), 3);
    }

    #[test]
    fn test_image_failure_does_not_stop_sampling() {
        let dir = tempfile::tempdir().unwrap();
        let mut rig = empty_rig(&["RA0"]);
        let mut rec = recorder(&["RA0"], 2, FailingSink);
        rec.start(dir.path(), &Isometry3::identity()).unwrap();

        let sample = rig.begin_tick(0, 0.0).finish();
        assert_eq!(rec.on_tick(&sample), TickOutcome::Sampled { frame: 0 });
        drop(sample);

        assert_eq!(rec.images_captured(), 0);
        assert_eq!(rec.lines("RA0").unwrap().len(), 1);
    }

    #[test]
    fn test_auto_stop_flushes_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut rig = empty_rig(&["RA0"]);
        let mut rec = recorder(&["RA0"], 2, MemorySink::default());
        rec.start(dir.path(), &Isometry3::identity()).unwrap();

        let mut outcomes = Vec::new();
        for _ in 0..3 {
            let sample = rig.begin_tick(0, 0.0).finish();
            outcomes.push(rec.on_tick(&sample));
        }

        let TickOutcome::AutoStopped(output) = &outcomes[2] else {
            panic!("expected auto-stop, got {:?}", outcomes[2]);
        };
        assert_eq!(output.summary.frames_recorded, 2);
        assert_eq!(output.files_written.len(), 2);
        assert!(output.is_complete());
        assert_eq!(rec.state(), RecorderState::Idle);

        let text = fs::read_to_string(dir.path().join("RA0.csv")).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(dir.path().join("summary.json").exists());
        assert!(!dir.path().join("RA0.tmp").exists());
    }

    #[test]
    fn test_series_written_as_two_column_csv() {
        let dir = tempfile::tempdir().unwrap();
        let mut rig = empty_rig(&["RA0"]);
        let mut rec = recorder(&["RA0"], 2, MemorySink::default());
        rec.start(dir.path(), &Isometry3::identity()).unwrap();

        for frame in 0..2 {
            let sample = rig.begin_tick(frame, 0.0).finish();
            rec.on_tick(&sample);
        }
        assert_eq!(rec.samples("RA0").unwrap().len(), 2);
        let expected = rec.lines("RA0").unwrap();
        rec.stop().unwrap();

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(dir.path().join("RA0.csv"))
            .unwrap();
        let rows: Vec<String> = reader
            .records()
            .map(|r| {
                let r = r.unwrap();
                assert_eq!(r.len(), 2);
                format!("{},{}", &r[0], &r[1])
            })
            .collect();
        assert_eq!(rows, expected);
    }

    #[test]
    fn test_failed_file_does_not_lose_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let mut rig = empty_rig(&["RA0"]);
        let mut rec = recorder(&["RA0", "missing_dir/RA1", "RB0"], 2, MemorySink::default());
        rec.start(dir.path(), &Isometry3::identity()).unwrap();

        for _ in 0..2 {
            let sample = rig.begin_tick(0, 0.0).finish();
            rec.on_tick(&sample);
        }

        let output = rec.stop().unwrap();
        assert_eq!(rec.state(), RecorderState::Idle);
        assert!(!output.is_complete());
        assert_eq!(output.files_failed, [dir.path().join("missing_dir/RA1.csv")]);
        assert_eq!(output.files_written.len(), 3);
        assert_eq!(output.summary.whiskers.len(), 3);

        assert!(dir.path().join("RA0.csv").exists());
        assert!(dir.path().join("RB0.csv").exists());
        assert!(dir.path().join("summary.json").exists());
        assert_eq!(fs::read_to_string(dir.path().join("RB0.csv")).unwrap().lines().count(), 2);
    }

    #[test]
    fn test_stereo_viewpoints_face_outward() {
        let [left, right] = stereo_viewpoints(&Isometry3::identity(), &CaptureConfig::default());
        assert_eq!(left.side, Side::Left);
        assert!(left.origin().x < 0.0);
        assert!(right.origin().x > 0.0);

        let forward_right = right.ray_direction(0.0, 0.0, 1.0);
        assert!(forward_right.x > 0.0);
        assert_relative_eq!(forward_right.norm(), 1.0, epsilon = 1e-9);
    }
}
