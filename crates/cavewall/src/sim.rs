use std::collections::BTreeMap;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use caveconfig::CaveConfig;
use cluster::{run_peer, FrameContext, MasterService, PeerId, PeerNode, RenderBackend};
use crossbeam_channel::{unbounded, Sender};
use projection::{OutputSurface, SolverOptions, Viewport, WallCamera};
use tracking::{TrackingIngest, ViewerPose};

use crate::bindings;
use crate::cli::SimulateArgs;

pub fn run(config: &CaveConfig, args: &SimulateArgs) -> Result<()> {
    let walls = resolve_walls(config, args)?;
    if args.standalone {
        run_standalone(config, args, &walls)
    } else {
        run_clustered(config, args, &walls)
    }
}

fn resolve_walls(config: &CaveConfig, args: &SimulateArgs) -> Result<Vec<(String, Viewport)>> {
    let names: Vec<String> = if args.walls.is_empty() {
        config.viewports.keys().cloned().collect()
    } else {
        args.walls.clone()
    };
    names
        .iter()
        .map(|name| {
            let entry = config
                .viewport(name)
                .with_context(|| format!("unknown wall '{name}'"))?;
            Ok((name.clone(), bindings::viewport_from_entry(name, entry)?))
        })
        .collect()
}

struct Presented {
    wall: String,
    frame: u64,
    visible: bool,
}

/// Render backend stand-in: the "offscreen target" is the solved camera for
/// the wall, presenting records it. A stall delay can be injected to
/// exercise the master's eviction path.
struct SolverBackend {
    wall_name: String,
    wall: Viewport,
    options: SolverOptions,
    stall: Option<Duration>,
    presented: Sender<Presented>,
    offscreen: Option<WallCamera>,
}

impl RenderBackend for SolverBackend {
    fn render(&mut self, context: &FrameContext) -> Result<()> {
        if let Some(delay) = self.stall {
            thread::sleep(delay);
        }
        let pose = context
            .tracking
            .bodies
            .iter()
            .find(|body| body.is_tracked)
            .map(ViewerPose::from_body)
            .unwrap_or_default();
        // None means the viewer is on or behind this wall; the wall stays
        // black for the frame but the peer still acks and presents.
        self.offscreen =
            projection::solve(&self.wall, pose.position, OutputSurface::Display, &self.options);
        Ok(())
    }

    fn present(&mut self, frame: u64) -> Result<()> {
        let visible = self.offscreen.take().is_some();
        self.presented
            .send(Presented {
                wall: self.wall_name.clone(),
                frame,
                visible,
            })
            .context("present sink closed")?;
        Ok(())
    }
}

/// Fixed-interval pacer for real-time runs.
struct FramePacer {
    interval: Duration,
    next: Instant,
}

impl FramePacer {
    fn new(rate: f32) -> Self {
        let interval = Duration::from_secs_f32(1.0 / rate);
        Self {
            interval,
            next: Instant::now() + interval,
        }
    }

    fn pace(&mut self) {
        if let Some(wait) = self.next.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }
        self.next += self.interval;
    }
}

/// Synthetic head path: a slow orbit at standing height, emitted in the raw
/// tracker wire format (millimeters) so a run exercises the full ingest
/// boundary.
fn synthetic_sample(tick: u64, delta: f64) -> String {
    let time = tick as f64 * delta;
    let angle = time * 0.4;
    let radius_mm = 1200.0;
    serde_json::json!({
        "frame": tick,
        "time": time,
        "bodies": [{
            "id": "head",
            "loc": [
                (angle.cos() * radius_mm) as f32,
                1700.0,
                (angle.sin() * radius_mm) as f32,
            ],
            "rot": [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        }],
    })
    .to_string()
}

fn run_clustered(
    config: &CaveConfig,
    args: &SimulateArgs,
    walls: &[(String, Viewport)],
) -> Result<()> {
    let mut service = MasterService::new(bindings::master_config(config));
    let options = bindings::solver_options(config);
    let (presented_tx, presented_rx) = unbounded();

    let mut handles: Vec<(String, JoinHandle<Result<()>>)> = Vec::new();
    for (name, wall) in walls {
        let link = service.connect_peer(PeerId::new(name.clone()));
        let node = PeerNode::new(PeerId::new(name.clone()));
        let stall = (args.stall_peer.as_deref() == Some(name.as_str()))
            .then(|| config.cluster.ack_timeout * 4);
        let mut backend = SolverBackend {
            wall_name: name.clone(),
            wall: *wall,
            options,
            stall,
            presented: presented_tx.clone(),
            offscreen: None,
        };
        let handle = thread::Builder::new()
            .name(format!("cavewall-{name}"))
            .spawn(move || run_peer(link, node, &mut backend))
            .with_context(|| format!("failed to spawn render peer for '{name}'"))?;
        handles.push((name.clone(), handle));
    }
    drop(presented_tx);

    let mut ingest = TrackingIngest::new(bindings::ingest_options(config));
    let delta = 1.0 / f64::from(config.defaults.frame_rate);
    let mut pacer = args
        .realtime
        .then(|| FramePacer::new(config.defaults.frame_rate));
    let mut evictions = 0_usize;

    for tick in 0..args.frames {
        if let Err(error) = ingest.ingest(&synthetic_sample(tick, delta), Instant::now()) {
            tracing::warn!(%error, "dropping malformed tracking sample");
        }
        let report = service
            .run_frame(delta, ingest.tracking_data().clone())
            .context("cluster tick failed")?;
        for peer in &report.evicted {
            tracing::warn!(%peer, frame = report.frame, "peer evicted after ack timeout");
            evictions += 1;
        }
        for peer in &report.departed {
            tracing::warn!(%peer, frame = report.frame, "peer departed mid-frame");
        }
        tracing::debug!(
            frame = report.frame,
            round_trip_us = report.round_trip.as_micros() as u64,
            "barrier complete"
        );
        if let Some(pacer) = pacer.as_mut() {
            pacer.pace();
        }
    }

    drop(service);
    for (name, handle) in handles {
        match handle.join() {
            Ok(result) => result.with_context(|| format!("render peer '{name}' failed"))?,
            Err(_) => anyhow::bail!("render peer '{name}' panicked"),
        }
    }

    let mut presented = BTreeMap::<String, (u64, u64)>::new();
    let mut hidden = BTreeMap::<String, u64>::new();
    for record in presented_rx.iter() {
        let entry = presented.entry(record.wall.clone()).or_default();
        entry.0 += 1;
        entry.1 = record.frame;
        if !record.visible {
            *hidden.entry(record.wall).or_default() += 1;
        }
    }

    println!(
        "simulated {} frame(s) across {} wall(s), {} eviction(s)",
        args.frames,
        walls.len(),
        evictions
    );
    for (name, _) in walls {
        let (count, last) = presented.get(name).copied().unwrap_or((0, 0));
        let hidden_count = hidden.get(name).copied().unwrap_or(0);
        println!(
            "  {name:<8} presented {count} frame(s) up to frame {last}, \
             {hidden_count} with the viewer behind the wall"
        );
    }
    Ok(())
}

fn run_standalone(
    config: &CaveConfig,
    args: &SimulateArgs,
    walls: &[(String, Viewport)],
) -> Result<()> {
    // Non-clustered mode: a fixed local tick, rendering and presenting
    // directly with no barrier.
    let options = bindings::solver_options(config);
    let mut ingest = TrackingIngest::new(bindings::ingest_options(config));
    let delta = 1.0 / f64::from(config.defaults.frame_rate);
    let mut pacer = args
        .realtime
        .then(|| FramePacer::new(config.defaults.frame_rate));
    let mut rendered = vec![0_u64; walls.len()];
    let mut skipped = vec![0_u64; walls.len()];

    for tick in 0..args.frames {
        if let Err(error) = ingest.ingest(&synthetic_sample(tick, delta), Instant::now()) {
            tracing::warn!(%error, "dropping malformed tracking sample");
        }
        let viewer = ingest.pose().position;
        for (index, (_, wall)) in walls.iter().enumerate() {
            match projection::solve(wall, viewer, OutputSurface::Display, &options) {
                Some(_) => rendered[index] += 1,
                None => skipped[index] += 1,
            }
        }
        if let Some(pacer) = pacer.as_mut() {
            pacer.pace();
        }
    }

    println!("standalone run: {} frame(s)", args.frames);
    for (index, (name, _)) in walls.iter().enumerate() {
        println!(
            "  {name:<8} rendered {} frame(s), skipped {} (viewer behind the wall)",
            rendered[index], skipped[index]
        );
    }
    Ok(())
}
