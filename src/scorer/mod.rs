//! Live scoring: per-performer sessions comparing incoming frames with the
//! active reference track.

pub mod direct;
pub mod majority;
pub mod proximity;

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

pub use direct::{DirectInput, DirectScorer, ScoreVerdict};
pub use majority::{majority, MajorityScorer, MajorityVerdict};
pub use proximity::{hand_valid, mirror, ProximityScorer, ProximityVerdict};

use crate::error::{Result, SyncError};
use crate::motion::{AngleCalculator, TrackedJoints};
use crate::reference::{LevelLoader, ReferenceTrack};
use crate::skeleton::{AxisMode, Frame, Normalize, PlaneAxes, Topology};

/// Comparison policy, fixed for the lifetime of a scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    Direct,
    Proximity,
    Majority,
}

/// How a live frame is matched to a reference frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameClock {
    /// Seconds since the choreography started.
    Timestamp,
    /// Explicit frame number.
    FrameCounter,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameMarker {
    Timestamp(f64),
    Counter(u64),
}

/// A decoded live frame plus its time marker.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveFrame {
    pub frame: Frame,
    pub marker: FrameMarker,
}

impl LiveFrame {
    pub fn new(frame: Frame, marker: FrameMarker) -> Self {
        Self { frame, marker }
    }

    /// Packed `x, y, z` triplets in `topology` order.
    pub fn from_flat(topology: Topology, coords: &[f32], marker: FrameMarker) -> Result<Self> {
        Ok(Self::new(Frame::from_flat(topology, coords, 3)?, marker))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoReference,
    Duplicate,
    Rejected,
}

/// Outcome of one live frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Verdict {
    Skipped { reason: SkipReason },
    /// Accepted, but the smoothing interval is still running.
    Pending { reference_index: usize },
    Score(ScoreVerdict),
    Proximity(ProximityVerdict),
    Majority(MajorityVerdict),
}

impl Verdict {
    /// Whether the verdict carries a judgment worth sending out.
    pub fn is_reportable(&self) -> bool {
        matches!(self, Self::Score(_) | Self::Proximity(_) | Self::Majority(_))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Receiver of reportable verdicts (network reply, replay log, test probe).
pub trait VerdictSink {
    fn send(&mut self, verdict: &Verdict) -> Result<()>;
}

impl<F> VerdictSink for F
where
    F: FnMut(&Verdict) -> Result<()>,
{
    fn send(&mut self, verdict: &Verdict) -> Result<()> {
        self(verdict)
    }
}

/// Scoring knobs resolved against the scoring topology.
#[derive(Debug, Clone)]
pub struct ScorerSettings {
    pub policy: Policy,
    pub clock: FrameClock,
    pub live_axes: AxisMode,
    /// Degrees within which two angles count as matching.
    pub angle_tolerance: f32,
    /// Distortion below which a frame counts as in sync.
    pub sync_threshold: f32,
    pub history_len: usize,
    /// Joints compared against the previous frame to drop repeats.
    pub duplicate_joints: Vec<usize>,
    pub window_frames: usize,
    pub mirror: bool,
    pub majority_interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScorerState {
    NoLevelLoaded,
    LevelLoaded { level: String },
}

/// Shared entry point: owns level selection and hands out sessions.
#[derive(Clone)]
pub struct SyncScorer {
    settings: Arc<ScorerSettings>,
    loader: Arc<LevelLoader>,
}

impl SyncScorer {
    pub fn new(settings: ScorerSettings, loader: LevelLoader) -> Self {
        Self { settings: Arc::new(settings), loader: Arc::new(loader) }
    }

    pub fn settings(&self) -> &ScorerSettings {
        &self.settings
    }

    pub fn loader(&self) -> &LevelLoader {
        &self.loader
    }

    pub fn load(&self, level: &str) -> Result<Arc<ReferenceTrack>> {
        self.loader.load(level)
    }

    pub fn state(&self) -> ScorerState {
        match self.loader.current() {
            None => ScorerState::NoLevelLoaded,
            Some(track) => ScorerState::LevelLoaded { level: track.level_id().to_string() },
        }
    }

    pub fn session(&self) -> Session {
        Session::new(Arc::clone(&self.settings), Arc::clone(&self.loader))
    }
}

enum PolicyState {
    Direct(DirectScorer),
    Proximity(ProximityScorer),
    Majority(MajorityScorer),
}

impl PolicyState {
    fn new(settings: &ScorerSettings) -> Self {
        match settings.policy {
            Policy::Direct => Self::Direct(DirectScorer::new(settings.sync_threshold, settings.angle_tolerance)),
            Policy::Proximity => Self::Proximity(ProximityScorer::new(settings.window_frames, settings.mirror)),
            Policy::Majority => {
                Self::Majority(MajorityScorer::new(settings.majority_interval, settings.angle_tolerance))
            }
        }
    }

    fn reset(&mut self) {
        match self {
            Self::Direct(s) => s.reset(),
            Self::Proximity(_) => {}
            Self::Majority(s) => s.reset(),
        }
    }
}

/// Everything derived from one live frame before any state changes.
struct Observation {
    reference_index: usize,
    axes: PlaneAxes,
    /// Marker position in reference frames, unwrapped.
    clock: f32,
    tracked: Vec<Vector3<f32>>,
    energy_positions: Vec<Vector3<f32>>,
    dims: usize,
    angles: Vec<f32>,
    hands: [Vector2<f32>; 2],
}

/// One performer's scoring state. Not shared; each connection owns one.
pub struct Session {
    settings: Arc<ScorerSettings>,
    loader: Arc<LevelLoader>,
    track: Option<Arc<ReferenceTrack>>,
    live_axes: Option<PlaneAxes>,
    last_tracked: Option<Vec<Vector3<f32>>>,
    energy: TrackedJoints,
    policy: PolicyState,
}

impl Session {
    fn new(settings: Arc<ScorerSettings>, loader: Arc<LevelLoader>) -> Self {
        let energy = TrackedJoints::new(loader.recipe().energy_joints.clone(), settings.history_len);
        let policy = PolicyState::new(&settings);
        Self {
            settings,
            loader,
            track: None,
            live_axes: None,
            last_tracked: None,
            energy,
            policy,
        }
    }

    /// Level the session last scored against.
    pub fn level(&self) -> Option<&str> {
        self.track.as_deref().map(ReferenceTrack::level_id)
    }

    pub fn energy(&self) -> &TrackedJoints {
        &self.energy
    }

    /// Running in-sync percentage under the direct policy.
    pub fn sync_percentage(&self) -> Option<f32> {
        match &self.policy {
            PolicyState::Direct(s) => Some(s.sync_percentage()),
            _ => None,
        }
    }

    /// Frames waiting for the next majority flush.
    pub fn pending_samples(&self) -> Option<usize> {
        match &self.policy {
            PolicyState::Majority(s) => Some(s.pending()),
            _ => None,
        }
    }

    pub fn ingest(&mut self, frame: &LiveFrame) -> Verdict {
        self.ingest_at(frame, Instant::now())
    }

    /// Scores `frame` as received at `now`. Failures leave the session as it
    /// was and come back as a skipped verdict.
    pub fn ingest_at(&mut self, frame: &LiveFrame, now: Instant) -> Verdict {
        let Some(track) = self.loader.current() else {
            return Verdict::Skipped { reason: SkipReason::NoReference };
        };
        if !self.track.as_ref().is_some_and(|t| Arc::ptr_eq(t, &track)) {
            self.reset(Arc::clone(&track));
        }

        match self.observe(&track, frame) {
            Ok(Some(obs)) => self.commit(&track, obs, now),
            Ok(None) => Verdict::Skipped { reason: SkipReason::Duplicate },
            Err(e) => {
                warn!("Dropping frame: {e}");
                Verdict::Skipped { reason: SkipReason::Rejected }
            }
        }
    }

    /// Ingests and forwards reportable verdicts to `sink`.
    pub fn process(&mut self, frame: &LiveFrame, sink: &mut dyn VerdictSink) -> Result<Verdict> {
        let verdict = self.ingest(frame);
        if verdict.is_reportable() {
            sink.send(&verdict)?;
        }
        Ok(verdict)
    }

    fn reset(&mut self, track: Arc<ReferenceTrack>) {
        if let Some(old) = &self.track {
            info!("Level changed {} -> {}, resetting session", old.level_id(), track.level_id());
        } else {
            debug!("Session bound to level {}", track.level_id());
        }
        self.track = Some(track);
        self.live_axes = None;
        self.last_tracked = None;
        self.energy.clear();
        self.policy.reset();
    }

    fn reference_index(&self, track: &ReferenceTrack, marker: FrameMarker) -> Result<usize> {
        match (self.settings.clock, marker) {
            (FrameClock::Timestamp, FrameMarker::Timestamp(t)) => track.index_at_time(t),
            (FrameClock::FrameCounter, FrameMarker::Counter(c)) => Ok(track.index_at_counter(c)),
            (clock, marker) => Err(SyncError::MalformedFrame(format!(
                "{marker:?} does not match clock {clock:?}"
            ))),
        }
    }

    /// Where `marker` falls on the reference frame grid, without wrapping.
    /// Live motion is differenced on this clock so its energy shares the
    /// per-frame scale of the reference.
    fn frame_clock(track: &ReferenceTrack, marker: FrameMarker) -> f32 {
        match marker {
            FrameMarker::Timestamp(t) => (t / f64::from(track.frame_time())) as f32,
            FrameMarker::Counter(c) => c as f32,
        }
    }

    /// Fallible part of ingestion. `None` means the frame repeats the
    /// previous one.
    fn observe(&self, track: &ReferenceTrack, live: &LiveFrame) -> Result<Option<Observation>> {
        let recipe = self.loader.recipe();
        let reference_index = self.reference_index(track, live.marker)?;
        let frame = live.frame.remap(recipe.scoring)?;

        let tracked = self
            .settings
            .duplicate_joints
            .iter()
            .map(|&j| frame.joint(j))
            .collect::<Result<Vec<_>>>()?;
        if !tracked.is_empty() && self.last_tracked.as_ref() == Some(&tracked) {
            return Ok(None);
        }

        let frame = frame.normalized()?;
        let axes = match self.live_axes {
            Some(axes) => axes,
            None => self.settings.live_axes.resolve(&frame)?,
        };
        let lm = recipe.scoring.landmarks();
        let hands = [frame.joint_2d(lm.left_hand, axes)?, frame.joint_2d(lm.right_hand, axes)?];

        Ok(Some(Observation {
            reference_index,
            axes,
            clock: Self::frame_clock(track, live.marker),
            tracked,
            energy_positions: self.energy.positions(&frame)?,
            dims: frame.dims(),
            angles: recipe.angles.frame_angles(&frame, axes),
            hands,
        }))
    }

    fn commit(&mut self, track: &ReferenceTrack, obs: Observation, now: Instant) -> Verdict {
        self.live_axes = Some(obs.axes);
        self.last_tracked = Some(obs.tracked);
        self.energy.push(&obs.energy_positions, obs.dims, obs.clock);

        let calc: &AngleCalculator = &self.loader.recipe().angles;
        let index = obs.reference_index;
        match &mut self.policy {
            PolicyState::Direct(scorer) => Verdict::Score(scorer.observe(
                calc,
                DirectInput {
                    reference_index: index,
                    live_angles: obs.angles,
                    reference_angles: track.angles_at(index).to_vec(),
                    live_energy: self.energy.energy(),
                    reference_energy: track.energy_at(index),
                },
            )),
            PolicyState::Proximity(scorer) => Verdict::Proximity(scorer.observe(track, index, obs.hands)),
            PolicyState::Majority(scorer) => match scorer.observe(calc, track, index, obs.angles, now) {
                Some(verdict) => Verdict::Majority(verdict),
                None => Verdict::Pending { reference_index: index },
            },
        }
    }
}
