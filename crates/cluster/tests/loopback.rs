use std::thread;
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::{unbounded, Sender};

use cluster::{
    run_peer, FrameContext, MasterConfig, MasterService, PeerId, PeerNode, RenderBackend,
    StallPolicy, TrackingData,
};

/// Backend that records activity over a channel and optionally stalls or
/// fails to exercise the failure paths.
struct ProbeBackend {
    name: String,
    presented: Sender<(String, u64)>,
    render_delay: Option<Duration>,
    fail_on_frame: Option<u64>,
    last_rendered: Option<u64>,
}

impl ProbeBackend {
    fn new(name: &str, presented: Sender<(String, u64)>) -> Self {
        Self {
            name: name.to_string(),
            presented,
            render_delay: None,
            fail_on_frame: None,
            last_rendered: None,
        }
    }
}

impl RenderBackend for ProbeBackend {
    fn render(&mut self, context: &FrameContext) -> Result<()> {
        if let Some(delay) = self.render_delay {
            thread::sleep(delay);
        }
        if self.fail_on_frame == Some(context.frame) {
            anyhow::bail!("injected render failure");
        }
        self.last_rendered = Some(context.frame);
        Ok(())
    }

    fn present(&mut self, frame: u64) -> Result<()> {
        // A presented frame must have been rendered offscreen first.
        assert_eq!(self.last_rendered, Some(frame));
        let _ = self.presented.send((self.name.clone(), frame));
        Ok(())
    }
}

fn spawn_peer(
    service: &mut MasterService,
    name: &str,
    configure: impl FnOnce(&mut ProbeBackend),
    presented: Sender<(String, u64)>,
) -> thread::JoinHandle<Result<()>> {
    let link = service.connect_peer(PeerId::new(name));
    let node = PeerNode::new(PeerId::new(name));
    let mut backend = ProbeBackend::new(name, presented);
    configure(&mut backend);
    thread::Builder::new()
        .name(format!("peer-{name}"))
        .spawn(move || run_peer(link, node, &mut backend))
        .expect("spawn peer thread")
}

#[test]
fn all_peers_present_the_same_frame_sequence() {
    let mut service = MasterService::new(MasterConfig::default());
    let (presented_tx, presented_rx) = unbounded();

    let walls = ["front", "left", "right"];
    let handles: Vec<_> = walls
        .iter()
        .map(|name| spawn_peer(&mut service, name, |_| {}, presented_tx.clone()))
        .collect();

    let frames = 5;
    for _ in 0..frames {
        let report = service
            .run_frame(1.0 / 60.0, TrackingData::default())
            .unwrap();
        assert!(report.evicted.is_empty());
        assert!(report.departed.is_empty());
    }

    drop(service);
    for handle in handles {
        handle.join().unwrap().unwrap();
    }
    drop(presented_tx);

    let mut per_wall = std::collections::BTreeMap::<String, Vec<u64>>::new();
    for (wall, frame) in presented_rx.iter() {
        per_wall.entry(wall).or_default().push(frame);
    }
    let expected: Vec<u64> = (0..frames).collect();
    for wall in walls {
        assert_eq!(per_wall[wall], expected, "wall {wall}");
    }
}

#[test]
fn stalled_peer_is_evicted_and_the_rest_keep_running() {
    let mut service = MasterService::new(MasterConfig {
        ack_timeout: Duration::from_millis(40),
        stall_policy: StallPolicy::PresentStale,
    });
    let (presented_tx, presented_rx) = unbounded();

    let fast = spawn_peer(&mut service, "front", |_| {}, presented_tx.clone());
    let slow = spawn_peer(
        &mut service,
        "slow",
        |backend| backend.render_delay = Some(Duration::from_millis(400)),
        presented_tx.clone(),
    );

    let report = service
        .run_frame(1.0 / 60.0, TrackingData::default())
        .unwrap();
    assert_eq!(report.evicted, vec![PeerId::new("slow")]);

    // The barrier keeps completing with the remaining peer.
    for _ in 1..4 {
        let report = service
            .run_frame(1.0 / 60.0, TrackingData::default())
            .unwrap();
        assert!(report.evicted.is_empty());
    }

    drop(service);
    fast.join().unwrap().unwrap();
    slow.join().unwrap().unwrap();
    drop(presented_tx);

    let front_frames: Vec<u64> = presented_rx
        .iter()
        .filter(|(wall, _)| wall == "front")
        .map(|(_, frame)| frame)
        .collect();
    assert_eq!(front_frames, vec![0, 1, 2, 3]);
}

#[test]
fn failing_peer_departs_without_hanging_the_barrier() {
    let mut service = MasterService::new(MasterConfig {
        ack_timeout: Duration::from_millis(500),
        stall_policy: StallPolicy::PresentStale,
    });
    let (presented_tx, presented_rx) = unbounded();

    let healthy = spawn_peer(&mut service, "front", |_| {}, presented_tx.clone());
    let failing = spawn_peer(
        &mut service,
        "flaky",
        |backend| backend.fail_on_frame = Some(1),
        presented_tx.clone(),
    );

    let first = service
        .run_frame(1.0 / 60.0, TrackingData::default())
        .unwrap();
    assert!(first.departed.is_empty());

    // Frame 1 kills the flaky peer's render; its link drop must complete
    // the barrier as a departure, well before the 500ms deadline.
    let second = service
        .run_frame(1.0 / 60.0, TrackingData::default())
        .unwrap();
    assert_eq!(second.departed, vec![PeerId::new("flaky")]);
    assert!(second.round_trip < Duration::from_millis(400));

    drop(service);
    healthy.join().unwrap().unwrap();
    assert!(failing.join().unwrap().is_err());
    drop(presented_tx);

    let front_frames: Vec<u64> = presented_rx
        .iter()
        .filter(|(wall, _)| wall == "front")
        .map(|(_, frame)| frame)
        .collect();
    assert_eq!(front_frames, vec![0, 1]);
}
