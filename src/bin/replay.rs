//! Scores a recorded performance against a level offline.

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use choreo_sync::animation::{AnimationSource, JsonAnimationSource};
use choreo_sync::config::Config;
use choreo_sync::scorer::{FrameClock, FrameMarker, LiveFrame, Verdict};

#[derive(Parser, Debug)]
#[command(name = "replay", version, about = "Replay a recorded performance through the scorer")]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Level id, name or index
    #[arg(short, long)]
    level: String,

    /// Recorded performance (same JSON format as level animations)
    #[arg(short, long)]
    performer: PathBuf,

    /// Print every verdict as JSON
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

#[derive(Debug, Default)]
struct Tally {
    frames: usize,
    skipped: usize,
    pending: usize,
    judged: usize,
    valid: usize,
    last_percentage: Option<f32>,
}

impl Tally {
    fn record(&mut self, verdict: &Verdict) {
        self.frames += 1;
        match verdict {
            Verdict::Skipped { .. } => self.skipped += 1,
            Verdict::Pending { .. } => self.pending += 1,
            Verdict::Score(v) => {
                self.judged += 1;
                self.valid += usize::from(v.in_sync);
                self.last_percentage = Some(v.sync_percentage);
            }
            Verdict::Proximity(v) => {
                self.judged += 1;
                self.valid += usize::from(v.choreography_valid);
            }
            Verdict::Majority(v) => {
                self.judged += 1;
                self.valid += usize::from(v.choreography_valid);
            }
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = Config::load_or_default(&args.config)?;
    let scorer = config.build_scorer(Box::new(JsonAnimationSource))?;
    let track = scorer
        .load(&args.level)
        .with_context(|| format!("loading level {}", args.level))?;

    let clip = JsonAnimationSource
        .open(&args.performer)
        .with_context(|| format!("reading {}", args.performer.display()))?;
    let frames = clip.to_frames(config.skeleton.source)?;
    if frames.is_empty() {
        bail!("performance has no frames");
    }
    info!(
        "Replaying {} frames ({:.1}s) against level {} ({} frames)",
        frames.len(),
        clip.duration(),
        track.level_id(),
        track.len()
    );

    let mut session = scorer.session();
    let mut tally = Tally::default();
    let start = Instant::now();
    for (i, frame) in frames.into_iter().enumerate() {
        let seconds = f64::from(clip.frame_time) * i as f64;
        let marker = match scorer.settings().clock {
            FrameClock::Timestamp => FrameMarker::Timestamp(seconds),
            FrameClock::FrameCounter => FrameMarker::Counter(i as u64),
        };
        let verdict = session.ingest_at(&LiveFrame::new(frame, marker), start + Duration::from_secs_f64(seconds));
        if args.verbose && verdict.is_reportable() {
            println!("{}", verdict.to_json()?);
        }
        tally.record(&verdict);
    }

    println!("frames:  {}", tally.frames);
    println!("skipped: {}", tally.skipped);
    if tally.pending > 0 {
        println!("pending: {}", tally.pending);
    }
    println!("valid:   {}/{}", tally.valid, tally.judged);
    if let Some(p) = tally.last_percentage {
        println!("sync:    {p:.1}%");
    } else if tally.judged > 0 {
        println!("sync:    {:.1}%", tally.valid as f32 / tally.judged as f32 * 100.0);
    }
    Ok(())
}
