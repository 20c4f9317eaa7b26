use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use nalgebra::Vector2;

use choreo_sync::animation::{AnimationClip, AnimationSource};
use choreo_sync::config::Config;
use choreo_sync::motion::angles::{limb_vertical_angle, three_point_angle};
use choreo_sync::motion::{AngleCalculator, AngleSpec};
use choreo_sync::reference::{LevelEntry, LevelLibrary, LevelLoader, Phase, TrackRecipe};
use choreo_sync::scorer::{
    hand_valid, majority, mirror, FrameClock, FrameMarker, LiveFrame, Policy, ScorerSettings, ScorerState,
    SkipReason, SyncScorer, Verdict,
};
use choreo_sync::skeleton::{AxisMode, BvhJoint, Frame, PlaneAxes, Topology};
use choreo_sync::{Result, SyncError};

const FRAME_TIME: f32 = 0.125;
const FRAMES: usize = 20;

fn approx_eq_f32(a: f32, b: f32, eps: f32) -> bool {
    (a - b).abs() < eps
}

/// Upright skeleton whose arms rise and bend with `t`.
fn pose(t: f32) -> Vec<[f32; 3]> {
    use BvhJoint::*;
    let mut joints: Vec<[f32; 3]> = (0..BvhJoint::COUNT).map(|j| [0.0, 1.0 + 0.01 * j as f32, 0.0]).collect();
    let fixed = [
        (Hips, [0.0, 1.0, 0.0]),
        (Neck, [0.0, 1.5, 0.0]),
        (Head, [0.0, 1.7, 0.0]),
        (LeftUpLeg, [0.1, 1.0, 0.0]),
        (LeftLeg, [0.1, 0.5, 0.0]),
        (LeftFoot, [0.1, 0.0, 0.0]),
        (RightUpLeg, [-0.1, 1.0, 0.0]),
        (RightLeg, [-0.1, 0.5, 0.0]),
        (RightFoot, [-0.1, 0.0, 0.0]),
    ];
    for (j, p) in fixed {
        joints[j as usize] = p;
    }

    let a = 0.3 + t;
    for side in [1.0f32, -1.0] {
        let shoulder = [0.1 * side, 1.45, 0.0];
        let arm = [0.2 * side, 1.45, 0.0];
        let elbow = [arm[0] + 0.25 * a.cos() * side, arm[1] + 0.25 * a.sin(), 0.0];
        let hand = [elbow[0] + 0.25 * (2.0 * a).cos() * side, elbow[1] + 0.25 * (2.0 * a).sin(), 0.0];
        let (clavicle, upper, fore, wrist) = if side > 0.0 {
            (LeftShoulder, LeftArm, LeftForeArm, LeftHand)
        } else {
            (RightShoulder, RightArm, RightForeArm, RightHand)
        };
        joints[clavicle as usize] = shoulder;
        joints[upper as usize] = arm;
        joints[fore as usize] = elbow;
        // finger joints collapse onto the wrist
        for f in wrist as usize..wrist as usize + 5 {
            joints[f] = hand;
        }
    }
    joints
}

fn clip(speed: f32) -> AnimationClip {
    AnimationClip {
        frame_time: FRAME_TIME,
        joint_names: Topology::Bvh33.joint_names().iter().map(|n| n.to_string()).collect(),
        frames: (0..FRAMES).map(|i| pose(i as f32 * speed)).collect(),
    }
}

struct MemorySource {
    clips: HashMap<PathBuf, AnimationClip>,
    opened: Arc<AtomicUsize>,
}

impl AnimationSource for MemorySource {
    fn open(&self, path: &Path) -> Result<AnimationClip> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.clips
            .get(path)
            .cloned()
            .ok_or_else(|| SyncError::Animation(format!("no clip at {}", path.display())))
    }
}

fn memory_source() -> (MemorySource, Arc<AtomicUsize>) {
    let opened = Arc::new(AtomicUsize::new(0));
    let mut clips = HashMap::new();
    clips.insert(PathBuf::from("slow.json"), clip(0.05));
    clips.insert(PathBuf::from("fast.json"), clip(0.2));
    (MemorySource { clips, opened: Arc::clone(&opened) }, opened)
}

fn levels() -> Vec<LevelEntry> {
    vec![
        LevelEntry { id: "0".into(), name: "slow".into(), path: "slow.json".into(), phases: Vec::new() },
        LevelEntry { id: "1".into(), name: "fast".into(), path: "fast.json".into(), phases: Vec::new() },
    ]
}

fn settings(policy: Policy) -> ScorerSettings {
    ScorerSettings {
        policy,
        clock: FrameClock::Timestamp,
        live_axes: AxisMode::Fixed(PlaneAxes::XY),
        angle_tolerance: 20.0,
        sync_threshold: 0.15,
        history_len: 5,
        duplicate_joints: vec![BvhJoint::LeftHand as usize, BvhJoint::RightHand as usize],
        window_frames: 8,
        mirror: true,
        majority_interval: Duration::from_secs(1),
    }
}

fn scorer(policy: Policy) -> (SyncScorer, Arc<AtomicUsize>) {
    scorer_with_levels(policy, levels())
}

fn scorer_with_levels(policy: Policy, levels: Vec<LevelEntry>) -> (SyncScorer, Arc<AtomicUsize>) {
    let recipe = TrackRecipe {
        source: Topology::Bvh33,
        scoring: Topology::Bvh33,
        angles: AngleCalculator::default_for(Topology::Bvh33),
        energy_joints: vec![BvhJoint::LeftHand as usize, BvhJoint::RightHand as usize],
        axes: AxisMode::Fixed(PlaneAxes::XY),
    };
    let (source, opened) = memory_source();
    let loader = LevelLoader::new(LevelLibrary::new(levels), Box::new(source), recipe, 0.1);
    (SyncScorer::new(settings(policy), loader), opened)
}

/// Frame `i` of a level clip, as a performer would send it.
fn live(clip: &AnimationClip, i: usize) -> LiveFrame {
    let frame = clip.to_frames(Topology::Bvh33).unwrap().swap_remove(i);
    LiveFrame::new(frame, FrameMarker::Timestamp(f64::from(FRAME_TIME) * i as f64))
}

fn at(start: Instant, seconds: f32) -> Instant {
    start + Duration::from_secs_f32(seconds)
}

#[test]
fn three_point_angle_of_right_triangle() {
    let angle = three_point_angle(Vector2::new(0.0, 1.0), Vector2::new(0.0, 0.0), Vector2::new(1.0, 0.0));
    assert!(approx_eq_f32(angle, 90.0, 1e-4), "got {angle}");
}

#[test]
fn limb_vertical_angles() {
    let origin = Vector2::new(0.0, 0.0);
    assert!(approx_eq_f32(limb_vertical_angle(origin, Vector2::new(1.0, 0.0)), 90.0, 1e-4));
    assert!(approx_eq_f32(limb_vertical_angle(origin, Vector2::new(0.0, 1.0)), 0.0, 1e-4));
}

#[test]
fn proximity_window_with_single_position() {
    let window = [Vector2::new(0.0, 0.0)];
    assert!(hand_valid(Vector2::new(0.05, 0.0), window, 0.1, true));

    let far = Vector2::new(1.0, 1.0);
    assert!(!hand_valid(far, window, 0.1, true));
    assert_eq!(mirror(far), Vector2::new(-1.0, 1.0));
    assert!(!hand_valid(mirror(far), window, 0.1, false));
}

#[test]
fn majority_vote_three_of_four() {
    let calc = AngleCalculator::new((0..4).map(|i| AngleSpec::limb(format!("limb{i}"), i, i + 1)).collect());
    let averaged = [30.0, 60.0, 90.0, 10.0];
    let reference = [35.0, 50.0, 80.0, 120.0];
    let close = calc.within_tolerance(&averaged, &reference, 20.0);
    assert_eq!(close.iter().filter(|&&c| c).count(), 3);
    assert!(majority(&close));
}

#[test]
fn frames_before_any_level_are_skipped() {
    let (scorer, _) = scorer(Policy::Direct);
    assert_eq!(scorer.state(), ScorerState::NoLevelLoaded);
    let mut session = scorer.session();
    let verdict = session.ingest(&live(&clip(0.05), 0));
    assert_eq!(verdict, Verdict::Skipped { reason: SkipReason::NoReference });
    assert!(session.level().is_none());

    scorer.load("slow").unwrap();
    assert_eq!(scorer.state(), ScorerState::LevelLoaded { level: "0".into() });
}

#[test]
fn loading_current_level_is_a_no_op() {
    let (scorer, opened) = scorer(Policy::Direct);
    let first = scorer.load("0").unwrap();
    let again = scorer.load("0").unwrap();
    let by_name = scorer.load("slow").unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    assert!(Arc::ptr_eq(&first, &by_name));
    assert_eq!(opened.load(Ordering::SeqCst), 1);

    let other = scorer.load("fast").unwrap();
    assert!(!Arc::ptr_eq(&first, &other));
    assert_eq!(opened.load(Ordering::SeqCst), 2);
}

#[test]
fn unknown_level_keeps_state() {
    let (scorer, _) = scorer(Policy::Direct);
    assert!(matches!(scorer.load("nope"), Err(SyncError::UnknownLevel(_))));
    assert_eq!(scorer.state(), ScorerState::NoLevelLoaded);
}

#[test]
fn perfect_imitation_is_fully_in_sync() {
    let (scorer, _) = scorer(Policy::Direct);
    scorer.load("slow").unwrap();
    let reference = clip(0.05);
    let mut session = scorer.session();
    let start = Instant::now();

    for i in 0..FRAMES {
        let verdict = session.ingest_at(&live(&reference, i), at(start, FRAME_TIME * i as f32));
        let Verdict::Score(score) = verdict else {
            panic!("frame {i}: unexpected {verdict:?}");
        };
        assert_eq!(score.reference_index, i);
        assert!(score.distortion < 1e-4, "frame {i}: {}", score.distortion);
        assert!(score.in_sync);
        assert!(score.angles_close.iter().all(|&c| c));
        assert_eq!(score.live_angles.len(), 4);
    }
    assert_eq!(session.sync_percentage(), Some(100.0));
}

#[test]
fn mismatched_dance_loses_sync() {
    let (scorer, _) = scorer(Policy::Direct);
    scorer.load("slow").unwrap();
    let mut session = scorer.session();
    // frozen far from the reference arm positions
    let mut frozen = pose(2.5);
    let start = Instant::now();
    let mut last = None;
    for i in 0..FRAMES {
        // move the hand off-plane so no frame repeats the previous one
        frozen[BvhJoint::LeftHand as usize][2] = 0.001 * i as f32;
        let frame = Frame::new(Topology::Bvh33, frozen.iter().map(|p| (*p).into()).collect()).unwrap();
        let marker = FrameMarker::Timestamp(f64::from(FRAME_TIME) * i as f64);
        last = Some(session.ingest_at(&LiveFrame::new(frame, marker), at(start, FRAME_TIME * i as f32)));
    }
    let percentage = session.sync_percentage().unwrap();
    assert!(percentage < 100.0, "got {percentage}");
    assert!(matches!(last, Some(Verdict::Score(ref s)) if s.frames_seen == FRAMES as u64));
}

#[test]
fn duplicate_frames_leave_state_untouched() {
    let (scorer, _) = scorer(Policy::Direct);
    scorer.load("slow").unwrap();
    let reference = clip(0.05);
    let mut session = scorer.session();
    let start = Instant::now();

    let first = session.ingest_at(&live(&reference, 0), start);
    assert!(matches!(first, Verdict::Score(ref s) if s.frames_seen == 1));
    let lengths: Vec<usize> = session.energy().histories().iter().map(|h| h.len()).collect();

    let repeat = session.ingest_at(&live(&reference, 0), at(start, 0.5));
    assert_eq!(repeat, Verdict::Skipped { reason: SkipReason::Duplicate });
    let after: Vec<usize> = session.energy().histories().iter().map(|h| h.len()).collect();
    assert_eq!(lengths, after);
    assert_eq!(session.sync_percentage(), Some(100.0));

    let next = session.ingest_at(&live(&reference, 1), at(start, 0.6));
    assert!(matches!(next, Verdict::Score(ref s) if s.frames_seen == 2));
}

#[test]
fn duplicate_frames_skip_majority_accumulator() {
    let (scorer, _) = scorer(Policy::Majority);
    scorer.load("slow").unwrap();
    let reference = clip(0.05);
    let mut session = scorer.session();
    let start = Instant::now();

    session.ingest_at(&live(&reference, 0), start);
    assert_eq!(session.pending_samples(), Some(1));

    let repeat = session.ingest_at(&live(&reference, 0), at(start, 0.1));
    assert_eq!(repeat, Verdict::Skipped { reason: SkipReason::Duplicate });
    assert_eq!(session.pending_samples(), Some(1));

    session.ingest_at(&live(&reference, 1), at(start, 0.2));
    assert_eq!(session.pending_samples(), Some(2));
}

#[test]
fn duplicate_frames_skip_proximity_scoring() {
    let (scorer, _) = scorer(Policy::Proximity);
    scorer.load("slow").unwrap();
    let reference = clip(0.05);
    let mut session = scorer.session();

    assert!(matches!(session.ingest(&live(&reference, 2)), Verdict::Proximity(_)));
    let lengths: Vec<usize> = session.energy().histories().iter().map(|h| h.len()).collect();

    let repeat = session.ingest(&live(&reference, 2));
    assert_eq!(repeat, Verdict::Skipped { reason: SkipReason::Duplicate });
    let after: Vec<usize> = session.energy().histories().iter().map(|h| h.len()).collect();
    assert_eq!(lengths, after);
    assert_eq!(session.pending_samples(), None);
}

#[test]
fn live_energy_matches_reference_on_replay() {
    let (scorer, _) = scorer(Policy::Direct);
    let track = scorer.load("fast").unwrap();
    let reference = clip(0.2);
    let mut session = scorer.session();
    let start = Instant::now();

    for i in 0..FRAMES {
        let verdict = session.ingest_at(&live(&reference, i), at(start, FRAME_TIME * i as f32));
        let Verdict::Score(score) = verdict else {
            panic!("frame {i}: unexpected {verdict:?}");
        };
        if i < 2 {
            assert_eq!(score.live_energy, 0.0);
            continue;
        }
        // live differences trail by one frame: the newest sample closes the
        // second difference centred on the previous frame
        let expected = track.energy_at(i - 1);
        assert!(expected > 0.0);
        assert!(
            approx_eq_f32(score.live_energy, expected, 1e-6),
            "frame {i}: live {} vs reference {expected}",
            score.live_energy
        );
    }
}

#[test]
fn proximity_threshold_follows_phases() {
    let mut phased = levels();
    phased[0].phases = vec![Phase { start: 0, end: 10, threshold: 100.0 }];
    let (scorer, _) = scorer_with_levels(Policy::Proximity, phased);
    scorer.load("slow").unwrap();
    let mut session = scorer.session();

    let far_frame = |y: f32, seconds: f64| {
        let mut far = pose(0.25);
        for hand in &mut far[BvhJoint::LeftHand as usize..=BvhJoint::LeftHandIndex3End as usize] {
            *hand = [-3.0, y, 0.0];
        }
        let frame = Frame::new(Topology::Bvh33, far.iter().map(|p| (*p).into()).collect()).unwrap();
        LiveFrame::new(frame, FrameMarker::Timestamp(seconds))
    };

    // index 5: inside the lenient phase
    let verdict = session.ingest(&far_frame(-3.0, 0.625));
    let Verdict::Proximity(v) = verdict else { panic!("unexpected {verdict:?}") };
    assert_eq!(v.reference_index, 5);
    assert!(approx_eq_f32(v.threshold, 100.0, 1e-6));
    assert!(v.left_valid && v.choreography_valid);

    // index 15: past the phase, default threshold
    let verdict = session.ingest(&far_frame(-3.1, 1.875));
    let Verdict::Proximity(v) = verdict else { panic!("unexpected {verdict:?}") };
    assert_eq!(v.reference_index, 15);
    assert!(approx_eq_f32(v.threshold, 0.1, 1e-6));
    assert!(!v.left_valid);
    assert!(!v.choreography_valid);
}

#[test]
fn malformed_frames_are_rejected_without_side_effects() {
    let (scorer, _) = scorer(Policy::Direct);
    scorer.load("slow").unwrap();
    let reference = clip(0.05);
    let mut session = scorer.session();

    // counter marker while the clock expects timestamps
    let mut wrong = live(&reference, 0);
    wrong.marker = FrameMarker::Counter(0);
    assert_eq!(session.ingest(&wrong), Verdict::Skipped { reason: SkipReason::Rejected });

    let mut nan = live(&reference, 0);
    nan.marker = FrameMarker::Timestamp(f64::NAN);
    assert_eq!(session.ingest(&nan), Verdict::Skipped { reason: SkipReason::Rejected });

    assert!(session.energy().histories().iter().all(|h| h.is_empty()));
    let verdict = session.ingest(&live(&reference, 0));
    assert!(matches!(verdict, Verdict::Score(ref s) if s.frames_seen == 1));

    assert!(LiveFrame::from_flat(Topology::Bvh33, &[0.0; 10], FrameMarker::Counter(0)).is_err());
}

#[test]
fn level_change_resets_session() {
    let (scorer, _) = scorer(Policy::Direct);
    scorer.load("slow").unwrap();
    let reference = clip(0.05);
    let mut session = scorer.session();
    session.ingest(&live(&reference, 0));
    session.ingest(&live(&reference, 1));
    assert_eq!(session.level(), Some("0"));

    scorer.load("fast").unwrap();
    let verdict = session.ingest(&live(&reference, 2));
    assert!(matches!(verdict, Verdict::Score(ref s) if s.frames_seen == 1));
    assert_eq!(session.level(), Some("1"));
}

#[test]
fn sessions_are_independent() {
    let (scorer, _) = scorer(Policy::Direct);
    scorer.load("slow").unwrap();
    let reference = clip(0.05);
    let mut a = scorer.session();
    let mut b = scorer.session();
    a.ingest(&live(&reference, 0));
    a.ingest(&live(&reference, 1));
    let verdict = b.ingest(&live(&reference, 0));
    assert!(matches!(verdict, Verdict::Score(ref s) if s.frames_seen == 1));
}

#[test]
fn proximity_accepts_imitation_and_rejects_far_hands() {
    let (scorer, _) = scorer(Policy::Proximity);
    scorer.load("slow").unwrap();
    let reference = clip(0.05);
    let mut session = scorer.session();

    let verdict = session.ingest(&live(&reference, 5));
    let Verdict::Proximity(v) = verdict else { panic!("unexpected {verdict:?}") };
    assert_eq!(v.reference_index, 5);
    assert!(v.left_valid && v.right_valid && v.choreography_valid);
    assert!(approx_eq_f32(v.threshold, 0.1, 1e-6));

    let mut far = pose(0.25);
    for hand in &mut far[BvhJoint::LeftHand as usize..=BvhJoint::LeftHandIndex3End as usize] {
        *hand = [-3.0, -3.0, 0.0];
    }
    let frame = Frame::new(Topology::Bvh33, far.iter().map(|p| (*p).into()).collect()).unwrap();
    let verdict = session.ingest(&LiveFrame::new(frame, FrameMarker::Timestamp(0.75)));
    let Verdict::Proximity(v) = verdict else { panic!("unexpected {verdict:?}") };
    assert!(!v.left_valid);
    assert!(!v.choreography_valid);
}

#[test]
fn majority_reports_once_per_interval() {
    let (scorer, _) = scorer(Policy::Majority);
    scorer.load("slow").unwrap();
    let reference = clip(0.05);
    let mut session = scorer.session();
    let start = Instant::now();

    let mut verdicts = Vec::new();
    for i in 0..10 {
        verdicts.push(session.ingest_at(&live(&reference, i), at(start, FRAME_TIME * i as f32)));
    }
    // 8 frames span 0..=0.875s, the 9th lands on the 1s boundary
    assert!(verdicts[..8].iter().all(|v| matches!(v, Verdict::Pending { .. })));
    let Verdict::Majority(m) = &verdicts[8] else { panic!("unexpected {:?}", verdicts[8]) };
    assert_eq!(m.samples, 9);
    assert_eq!(m.reference_index, 8);
    assert!(m.choreography_valid);
    assert_eq!(m.frames_valid, 9);
    assert_eq!(m.averaged_angles.len(), 4);
    // the next interval starts at the flush
    assert!(matches!(verdicts[9], Verdict::Pending { reference_index: 9 }));
}

#[test]
fn verdicts_serialize_with_kind_tag() {
    let (scorer, _) = scorer(Policy::Direct);
    scorer.load("slow").unwrap();
    let mut session = scorer.session();
    let verdict = session.ingest(&live(&clip(0.05), 3));
    let value: serde_json::Value = serde_json::from_str(&verdict.to_json().unwrap()).unwrap();
    assert_eq!(value["kind"], "score");
    assert_eq!(value["reference_index"], 3);
    assert!(value["sync_percentage"].is_number());
}

#[test]
fn config_built_scorer_maps_topologies() {
    let text = r#"
        [skeleton]
        source = "bvh33"
        scoring = "body38"
        live_axes = [0, 1]
        reference_axes = [0, 1]

        [scoring]
        policy = "direct"

        [[levels]]
        id = "0"
        name = "slow"
        path = "slow.json"
    "#;
    let config: Config = toml::from_str(text).unwrap();
    let (source, _) = memory_source();
    let scorer = config.build_scorer(Box::new(source)).unwrap();
    let track = scorer.load("slow").unwrap();
    assert_eq!(track.frames()[0].topology(), Topology::Body38);

    let reference = clip(0.05);
    let mut session = scorer.session();
    let start = Instant::now();
    for i in 0..4 {
        let verdict = session.ingest_at(&live(&reference, i), at(start, FRAME_TIME * i as f32));
        assert!(matches!(verdict, Verdict::Score(ref s) if s.in_sync), "frame {i}: {verdict:?}");
    }
}
