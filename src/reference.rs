//! Reference choreographies: the precomputed track performers are scored
//! against, and the level registry that builds and swaps it.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use log::{debug, info};
use nalgebra::Vector2;
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::animation::{AnimationClip, AnimationSource};
use crate::error::{Result, SyncError};
use crate::motion::{frame_energy, AngleCalculator};
use crate::skeleton::{AxisMode, Frame, Normalize, PlaneAxes, Topology};

/// A movement phase `[start, end)` of a choreography with its own proximity
/// tolerance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub start: usize,
    pub end: usize,
    pub threshold: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhaseTable {
    phases: Vec<Phase>,
    default: f32,
}

impl PhaseTable {
    pub fn new(phases: Vec<Phase>, default: f32) -> Self {
        Self { phases, default }
    }

    /// Same tolerance for the whole choreography.
    pub fn uniform(threshold: f32) -> Self {
        Self::new(Vec::new(), threshold)
    }

    /// Threshold of the first phase containing `index`, else the default.
    pub fn threshold_at(&self, index: usize) -> f32 {
        self.phases
            .iter()
            .find(|p| (p.start..p.end).contains(&index))
            .map_or(self.default, |p| p.threshold)
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }
}

/// One selectable level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub phases: Vec<Phase>,
}

#[derive(Debug, Clone, Default)]
pub struct LevelLibrary {
    levels: Vec<LevelEntry>,
}

impl LevelLibrary {
    pub fn new(levels: Vec<LevelEntry>) -> Self {
        Self { levels }
    }

    pub fn levels(&self) -> &[LevelEntry] {
        &self.levels
    }

    /// Looks a level up by id, then by name, then by position in the list.
    pub fn resolve(&self, key: &str) -> Result<&LevelEntry> {
        self.levels
            .iter()
            .find(|l| l.id == key)
            .or_else(|| self.levels.iter().find(|l| !l.name.is_empty() && l.name == key))
            .or_else(|| key.parse::<usize>().ok().and_then(|i| self.levels.get(i)))
            .ok_or_else(|| SyncError::UnknownLevel(key.to_string()))
    }
}

/// What a reference track is derived with. Shared with the live side so
/// both are measured the same way.
#[derive(Debug, Clone)]
pub struct TrackRecipe {
    /// Topology animation clips are exported in.
    pub source: Topology,
    /// Topology frames are compared in.
    pub scoring: Topology,
    pub angles: AngleCalculator,
    pub energy_joints: Vec<usize>,
    pub axes: AxisMode,
}

/// Immutable, precomputed choreography. Replaced wholesale on level change.
#[derive(Debug)]
pub struct ReferenceTrack {
    level_id: String,
    level_name: String,
    frame_time: f32,
    frames: Vec<Frame>,
    angles: Array2<f32>,
    energy: Vec<f32>,
    /// Left and right hand projected on `axes`, per frame.
    hands: Vec<[Vector2<f32>; 2]>,
    axes: PlaneAxes,
    phases: PhaseTable,
}

impl ReferenceTrack {
    pub fn build(
        entry: &LevelEntry,
        clip: &AnimationClip,
        recipe: &TrackRecipe,
        phases: PhaseTable,
    ) -> Result<Self> {
        let frames = clip
            .to_frames(recipe.source)?
            .iter()
            .map(|f| f.remap(recipe.scoring))
            .collect::<Result<Vec<_>>>()?
            .normalized()?;
        let axes = recipe.axes.resolve(&frames[0])?;
        let angles = recipe.angles.batch(&frames, axes);
        let energy = frame_energy(&frames, &recipe.energy_joints)?;
        let lm = recipe.scoring.landmarks();
        let hands = frames
            .iter()
            .map(|f| -> Result<[Vector2<f32>; 2]> {
                Ok([f.joint_2d(lm.left_hand, axes)?, f.joint_2d(lm.right_hand, axes)?])
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            level_id: entry.id.clone(),
            level_name: entry.name.clone(),
            frame_time: clip.frame_time,
            frames,
            angles,
            energy,
            hands,
            axes,
            phases,
        })
    }

    pub fn level_id(&self) -> &str {
        &self.level_id
    }

    pub fn level_name(&self) -> &str {
        &self.level_name
    }

    pub fn frame_time(&self) -> f32 {
        self.frame_time
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Normalized frames in the scoring topology.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    /// `len() x angle count`.
    pub fn angles(&self) -> &Array2<f32> {
        &self.angles
    }

    pub fn angles_at(&self, index: usize) -> ArrayView1<'_, f32> {
        self.angles.row(index)
    }

    pub fn energy(&self) -> &[f32] {
        &self.energy
    }

    pub fn energy_at(&self, index: usize) -> f32 {
        self.energy.get(index).copied().unwrap_or(0.0)
    }

    pub fn hands_at(&self, index: usize) -> Option<[Vector2<f32>; 2]> {
        self.hands.get(index).copied()
    }

    pub fn axes(&self) -> PlaneAxes {
        self.axes
    }

    pub fn phases(&self) -> &PhaseTable {
        &self.phases
    }

    /// Frame playing at `seconds`, looping over the track.
    pub fn index_at_time(&self, seconds: f64) -> Result<usize> {
        if !seconds.is_finite() {
            return Err(SyncError::MalformedFrame(format!("timestamp {seconds}")));
        }
        // timestamps sent on frame boundaries must not round down a frame
        let frame = (seconds / f64::from(self.frame_time) + 1e-6).floor() as i64;
        Ok(frame.rem_euclid(self.frames.len() as i64) as usize)
    }

    /// Frame for an explicit counter, looping over the track.
    pub fn index_at_counter(&self, counter: u64) -> usize {
        (counter % self.frames.len() as u64) as usize
    }
}

/// Owns the active track. Loads are serialized; readers only ever see a
/// complete track, old or new.
pub struct LevelLoader {
    library: LevelLibrary,
    source: Box<dyn AnimationSource>,
    recipe: TrackRecipe,
    default_threshold: f32,
    current: RwLock<Option<Arc<ReferenceTrack>>>,
    loading: Mutex<()>,
}

impl LevelLoader {
    pub fn new(
        library: LevelLibrary,
        source: Box<dyn AnimationSource>,
        recipe: TrackRecipe,
        default_threshold: f32,
    ) -> Self {
        Self {
            library,
            source,
            recipe,
            default_threshold,
            current: RwLock::new(None),
            loading: Mutex::new(()),
        }
    }

    pub fn library(&self) -> &LevelLibrary {
        &self.library
    }

    pub fn recipe(&self) -> &TrackRecipe {
        &self.recipe
    }

    pub fn current(&self) -> Option<Arc<ReferenceTrack>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Makes `key` the active level. Loading the level that is already
    /// active returns the existing track untouched.
    pub fn load(&self, key: &str) -> Result<Arc<ReferenceTrack>> {
        let _guard = self.loading.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = self.library.resolve(key)?;

        if let Some(track) = self.current() {
            if track.level_id() == entry.id {
                debug!("level {} already loaded", entry.id);
                return Ok(track);
            }
        }

        let clip = self.source.open(&entry.path)?;
        let phases = PhaseTable::new(entry.phases.clone(), self.default_threshold);
        let track = Arc::new(ReferenceTrack::build(entry, &clip, &self.recipe, phases)?);
        info!(
            "Loaded level {} ({}): {} frames, frame time {:.4}s",
            track.level_id(),
            entry.path.display(),
            track.len(),
            track.frame_time()
        );

        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&track));
        Ok(track)
    }
}
