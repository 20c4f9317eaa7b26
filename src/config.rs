use anyhow::{bail, Context, Result};
use log::info;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::animation::AnimationSource;
use crate::motion::{AngleCalculator, AngleSpec, DEFAULT_HISTORY_LEN};
use crate::reference::{LevelEntry, LevelLibrary, LevelLoader, TrackRecipe};
use crate::scorer::{FrameClock, Policy, ScorerSettings, SyncScorer};
use crate::skeleton::{AxisMode, PlaneAxes, Topology};

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub skeleton: SkeletonConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub levels: Vec<LevelEntry>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Inbound OSC address.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Where verdicts are sent.
    #[serde(default = "default_reply_addr")]
    pub reply_addr: String,
    /// Minimum seconds between sent verdicts; 0 sends every one.
    #[serde(default)]
    pub send_interval_secs: f32,
    /// Performers silent for this long lose their session.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: f32,
}

fn default_listen_addr() -> String { "127.0.0.1:8080".to_string() }
fn default_reply_addr() -> String { "127.0.0.1:9000".to_string() }
fn default_idle_timeout_secs() -> f32 { 30.0 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            reply_addr: default_reply_addr(),
            send_interval_secs: 0.0,
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl ServerConfig {
    pub fn send_interval(&self) -> Result<Duration> {
        Duration::try_from_secs_f32(self.send_interval_secs).context("server.send_interval_secs")
    }

    pub fn idle_timeout(&self) -> Result<Duration> {
        let timeout = Duration::try_from_secs_f32(self.idle_timeout_secs).context("server.idle_timeout_secs")?;
        if timeout.is_zero() {
            bail!("server.idle_timeout_secs must be positive");
        }
        Ok(timeout)
    }
}

/// `"auto"` or a fixed `[horizontal, vertical]` axis pair.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(untagged)]
pub enum AxesConfig {
    Keyword(AxesKeyword),
    Fixed([usize; 2]),
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AxesKeyword {
    Auto,
}

impl AxesConfig {
    pub fn to_mode(self) -> Result<AxisMode> {
        match self {
            Self::Keyword(AxesKeyword::Auto) => Ok(AxisMode::Auto),
            Self::Fixed([h, v]) if h < 3 && v < 3 && h != v => Ok(AxisMode::Fixed(PlaneAxes::new(h, v))),
            Self::Fixed(axes) => bail!("invalid axis pair {axes:?}"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SkeletonConfig {
    /// Topology of incoming frames and animation files.
    #[serde(default = "default_source_topology")]
    pub source: Topology,
    /// Topology frames are compared in.
    #[serde(default = "default_scoring_topology")]
    pub scoring: Topology,
    #[serde(default = "default_live_axes")]
    pub live_axes: AxesConfig,
    #[serde(default = "default_reference_axes")]
    pub reference_axes: AxesConfig,
}

fn default_source_topology() -> Topology { Topology::Bvh33 }
fn default_scoring_topology() -> Topology { Topology::Body38 }
fn default_live_axes() -> AxesConfig { AxesConfig::Keyword(AxesKeyword::Auto) }
fn default_reference_axes() -> AxesConfig { AxesConfig::Fixed([0, 1]) }

impl Default for SkeletonConfig {
    fn default() -> Self {
        Self {
            source: default_source_topology(),
            scoring: default_scoring_topology(),
            live_axes: default_live_axes(),
            reference_axes: default_reference_axes(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScoringConfig {
    #[serde(default = "default_policy")]
    pub policy: Policy,
    #[serde(default = "default_clock")]
    pub clock: FrameClock,
    /// Degrees.
    #[serde(default = "default_angle_tolerance")]
    pub angle_tolerance: f32,
    #[serde(default = "default_sync_threshold")]
    pub sync_threshold: f32,
    #[serde(default = "default_history_len")]
    pub history_len: usize,
    /// Two joint names for a limb angle, three for a joint angle.
    #[serde(default)]
    pub angles: Vec<Vec<String>>,
    #[serde(default)]
    pub energy_joints: Vec<String>,
    #[serde(default)]
    pub duplicate_joints: Vec<String>,
    #[serde(default)]
    pub proximity: ProximityConfig,
    #[serde(default)]
    pub majority: MajorityConfig,
}

fn default_policy() -> Policy { Policy::Direct }
fn default_clock() -> FrameClock { FrameClock::Timestamp }
fn default_angle_tolerance() -> f32 { 20.0 }
fn default_sync_threshold() -> f32 { 0.15 }
fn default_history_len() -> usize { DEFAULT_HISTORY_LEN }

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            policy: default_policy(),
            clock: default_clock(),
            angle_tolerance: default_angle_tolerance(),
            sync_threshold: default_sync_threshold(),
            history_len: default_history_len(),
            angles: Vec::new(),
            energy_joints: Vec::new(),
            duplicate_joints: Vec::new(),
            proximity: ProximityConfig::default(),
            majority: MajorityConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProximityConfig {
    /// Reference frames.
    #[serde(default = "default_window_frames")]
    pub window_frames: usize,
    /// Used outside every configured phase.
    #[serde(default = "default_proximity_threshold")]
    pub threshold: f32,
    #[serde(default = "default_mirror")]
    pub mirror: bool,
}

fn default_window_frames() -> usize { 30 }
fn default_proximity_threshold() -> f32 { 0.1 }
fn default_mirror() -> bool { true }

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            window_frames: default_window_frames(),
            threshold: default_proximity_threshold(),
            mirror: default_mirror(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MajorityConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: f32,
}

fn default_interval_secs() -> f32 { 1.0 }

impl Default for MajorityConfig {
    fn default() -> Self {
        Self { interval_secs: default_interval_secs() }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            info!("{} not found, using default configuration", path.display());
            Ok(Self::default())
        }
    }

    /// Resolves every joint name against the scoring topology.
    pub fn recipe(&self) -> Result<TrackRecipe> {
        let scoring = self.skeleton.scoring;
        let angles = if self.scoring.angles.is_empty() {
            AngleCalculator::default_for(scoring)
        } else {
            let specs = self
                .scoring
                .angles
                .iter()
                .map(|names| AngleSpec::from_names(scoring, names.as_slice()))
                .collect::<crate::error::Result<Vec<_>>>()
                .context("scoring.angles")?;
            AngleCalculator::new(specs)
        };
        let energy_joints = resolve_joints(scoring, &self.scoring.energy_joints).context("scoring.energy_joints")?;

        Ok(TrackRecipe {
            source: self.skeleton.source,
            scoring,
            angles,
            energy_joints,
            axes: self.skeleton.reference_axes.to_mode().context("skeleton.reference_axes")?,
        })
    }

    pub fn scorer_settings(&self) -> Result<ScorerSettings> {
        let s = &self.scoring;
        let majority_interval =
            Duration::try_from_secs_f32(s.majority.interval_secs).context("scoring.majority.interval_secs")?;
        if majority_interval.is_zero() {
            bail!("scoring.majority.interval_secs must be positive");
        }
        Ok(ScorerSettings {
            policy: s.policy,
            clock: s.clock,
            live_axes: self.skeleton.live_axes.to_mode().context("skeleton.live_axes")?,
            angle_tolerance: s.angle_tolerance,
            sync_threshold: s.sync_threshold,
            history_len: s.history_len,
            duplicate_joints: resolve_joints(self.skeleton.scoring, &s.duplicate_joints)
                .context("scoring.duplicate_joints")?,
            window_frames: s.proximity.window_frames,
            mirror: s.proximity.mirror,
            majority_interval,
        })
    }

    pub fn build_scorer(&self, source: Box<dyn AnimationSource>) -> Result<SyncScorer> {
        let loader = LevelLoader::new(
            LevelLibrary::new(self.levels.clone()),
            source,
            self.recipe()?,
            self.scoring.proximity.threshold,
        );
        Ok(SyncScorer::new(self.scorer_settings()?, loader))
    }
}

/// Joint names to indices; an empty list means both hands.
fn resolve_joints(topology: Topology, names: &[String]) -> crate::error::Result<Vec<usize>> {
    if names.is_empty() {
        let lm = topology.landmarks();
        return Ok(vec![lm.left_hand, lm.right_hand]);
    }
    names.iter().map(|n| topology.resolve(n)).collect()
}
