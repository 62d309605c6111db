//! Tracking ingest boundary for cavewall.
//!
//! The raw tracker feed arrives as one JSON object per sample, positions in
//! millimeters and rotations as nine floats. Everything downstream works in
//! room-space meters, so the conversion happens exactly once, here:
//! positions are divided by 1000 and the rotation is loaded transposed. The
//! converted sample is retained both as the viewer's [`ViewerPose`] and as
//! the wire [`TrackingData`] the master attaches to its `StartFrame`
//! broadcasts. A malformed sample is dropped whole; the last-known pose
//! survives and the render loop is never interrupted.

use std::time::{Duration, Instant};

use glam::{Mat3, Vec3};
use serde::Deserialize;

use cluster::protocol::{TrackingBody, TrackingData};

const MILLIMETERS_PER_METER: f32 = 1000.0;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("malformed tracking sample: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// One sample of the raw tracker feed.
#[derive(Debug, Clone, Deserialize)]
pub struct RawFrame {
    pub frame: u64,
    pub time: f64,
    #[serde(default)]
    pub bodies: Vec<RawBody>,
}

/// A tracked body in the raw feed. `loc` is in millimeters; `rot` is the
/// vendor's nine-float rotation. Either may be absent when the body lost
/// tracking.
#[derive(Debug, Clone, Deserialize)]
pub struct RawBody {
    pub id: String,
    #[serde(default)]
    pub loc: Option<[f32; 3]>,
    #[serde(default)]
    pub rot: Option<[f32; 9]>,
}

/// Room-space viewer pose, meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewerPose {
    pub position: Vec3,
    pub orientation: Option<Mat3>,
}

impl Default for ViewerPose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: None,
        }
    }
}

impl ViewerPose {
    /// Recovers a pose from a broadcast tracking body (already
    /// boundary-converted).
    pub fn from_body(body: &TrackingBody) -> Self {
        Self {
            position: Vec3::from(body.position),
            orientation: Some(Mat3::from_cols_array(&body.orientation)),
        }
    }

    /// Left and right eye positions for stereo rendering: `±ipd/2` along
    /// the head's oriented X axis (room X when orientation is unknown).
    pub fn eye_positions(&self, ipd: f32) -> (Vec3, Vec3) {
        let axis = self.orientation.map_or(Vec3::X, |m| m * Vec3::X);
        let offset = axis * (0.5 * ipd);
        (self.position - offset, self.position + offset)
    }
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Body id to follow; the feed's first body when unset.
    pub body: Option<String>,
    /// Sampling window for the update-rate meter.
    pub rate_window: Duration,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            body: None,
            rate_window: Duration::from_millis(250),
        }
    }
}

/// Consumes the raw tracker feed and retains the latest converted state.
pub struct TrackingIngest {
    options: IngestOptions,
    pose: ViewerPose,
    data: TrackingData,
    meter: RateMeter,
}

impl TrackingIngest {
    pub fn new(options: IngestOptions) -> Self {
        let meter = RateMeter::new(options.rate_window);
        Self {
            options,
            pose: ViewerPose::default(),
            data: TrackingData::default(),
            meter,
        }
    }

    /// Ingests one raw JSON sample. On a parse error the sample is dropped
    /// and every retained value stays as it was.
    pub fn ingest(&mut self, payload: &str, now: Instant) -> Result<(), IngestError> {
        let raw: RawFrame = serde_json::from_str(payload)?;
        self.meter.record(now);
        self.data = TrackingData {
            bodies: raw.bodies.iter().map(convert_body).collect(),
        };
        if let Some(body) = self.select_body(&raw) {
            // Per-field retention: a body that lost position or rotation
            // keeps the last-known value for that field.
            if let Some(loc) = body.loc {
                self.pose.position = Vec3::from(loc) / MILLIMETERS_PER_METER;
            }
            if let Some(rot) = body.rot {
                self.pose.orientation = Some(load_rotation(&rot));
            }
        }
        Ok(())
    }

    fn select_body<'a>(&self, frame: &'a RawFrame) -> Option<&'a RawBody> {
        match &self.options.body {
            Some(id) => frame.bodies.iter().find(|body| &body.id == id),
            None => frame.bodies.first(),
        }
    }

    /// Latest viewer pose (last-known values when tracking drops out).
    pub fn pose(&self) -> &ViewerPose {
        &self.pose
    }

    /// Latest converted sample in the shape `StartFrame` broadcasts.
    pub fn tracking_data(&self) -> &TrackingData {
        &self.data
    }

    /// Samples per second over the last completed meter window.
    pub fn update_rate(&self) -> Option<f32> {
        self.meter.rate()
    }
}

/// The tracker sends its rotation row-major; loading the nine floats as
/// columns applies the required transpose in one step. The vendor's actual
/// majority convention has not been asserted against a captured sample; if
/// it ever turns out column-major, this is the only place to flip.
fn load_rotation(rot: &[f32; 9]) -> Mat3 {
    Mat3::from_cols_array(rot)
}

fn convert_body(raw: &RawBody) -> TrackingBody {
    TrackingBody {
        id: raw.id.clone(),
        is_tracked: raw.loc.is_some(),
        position: raw
            .loc
            .map_or([0.0; 3], |mm| mm.map(|value| value / MILLIMETERS_PER_METER)),
        orientation: raw
            .rot
            .map_or(Mat3::IDENTITY.to_cols_array(), |rot| {
                load_rotation(&rot).to_cols_array()
            }),
    }
}

/// Counts events over a fixed window and reports the rate of the last
/// completed window.
pub struct RateMeter {
    window: Duration,
    started: Option<Instant>,
    count: u32,
    rate: Option<f32>,
}

impl RateMeter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            started: None,
            count: 0,
            rate: None,
        }
    }

    pub fn record(&mut self, now: Instant) {
        match self.started {
            None => {
                self.started = Some(now);
                self.count = 1;
            }
            Some(started) if now.duration_since(started) >= self.window => {
                let elapsed = now.duration_since(started).as_secs_f32();
                self.rate = Some(self.count as f32 / elapsed.max(f32::EPSILON));
                self.started = Some(now);
                self.count = 1;
            }
            Some(_) => self.count += 1,
        }
    }

    pub fn rate(&self) -> Option<f32> {
        self.rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(loc: [f32; 3]) -> String {
        format!(
            "{{\"frame\":1,\"time\":0.5,\"bodies\":[{{\"id\":\"head\",\"loc\":[{},{},{}]}}]}}",
            loc[0], loc[1], loc[2]
        )
    }

    #[test]
    fn positions_convert_from_millimeters_to_meters() {
        let mut ingest = TrackingIngest::new(IngestOptions::default());
        ingest
            .ingest(&sample([1000.0, 1700.0, -250.0]), Instant::now())
            .unwrap();
        let pose = ingest.pose();
        assert!((pose.position - Vec3::new(1.0, 1.7, -0.25)).length() < 1e-6);
    }

    #[test]
    fn rotation_is_loaded_transposed() {
        // Row-major quarter turn about z: rows (0,1,0), (-1,0,0), (0,0,1).
        let payload = "{\"frame\":1,\"time\":0.0,\"bodies\":[{\"id\":\"head\",\
                       \"loc\":[0,0,0],\"rot\":[0,1,0,-1,0,0,0,0,1]}]}";
        let mut ingest = TrackingIngest::new(IngestOptions::default());
        ingest.ingest(payload, Instant::now()).unwrap();
        let orientation = ingest.pose().orientation.expect("rotation sample");
        // The transpose maps X to the first wire row.
        assert!((orientation * Vec3::X - Vec3::new(0.0, 1.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn malformed_sample_is_dropped_and_state_retained() {
        let mut ingest = TrackingIngest::new(IngestOptions::default());
        ingest
            .ingest(&sample([500.0, 0.0, 0.0]), Instant::now())
            .unwrap();
        let before = *ingest.pose();

        assert!(ingest.ingest("{\"frame\":2", Instant::now()).is_err());
        assert!(ingest
            .ingest("{\"frame\":2,\"time\":\"nope\"}", Instant::now())
            .is_err());
        assert_eq!(*ingest.pose(), before);
    }

    #[test]
    fn body_filter_selects_by_id() {
        let payload = "{\"frame\":1,\"time\":0.0,\"bodies\":[\
                       {\"id\":\"wand\",\"loc\":[9000,0,0]},\
                       {\"id\":\"head\",\"loc\":[1000,0,0]}]}";
        let mut ingest = TrackingIngest::new(IngestOptions {
            body: Some("head".into()),
            ..IngestOptions::default()
        });
        ingest.ingest(payload, Instant::now()).unwrap();
        assert!((ingest.pose().position.x - 1.0).abs() < 1e-6);

        // Without a filter, the first body wins.
        let mut unfiltered = TrackingIngest::new(IngestOptions::default());
        unfiltered.ingest(payload, Instant::now()).unwrap();
        assert!((unfiltered.pose().position.x - 9.0).abs() < 1e-6);
    }

    #[test]
    fn lost_position_keeps_the_last_known_value() {
        let mut ingest = TrackingIngest::new(IngestOptions::default());
        ingest
            .ingest(&sample([2000.0, 0.0, 0.0]), Instant::now())
            .unwrap();
        let untracked = "{\"frame\":2,\"time\":0.1,\"bodies\":[{\"id\":\"head\"}]}";
        ingest.ingest(untracked, Instant::now()).unwrap();

        assert!((ingest.pose().position.x - 2.0).abs() < 1e-6);
        let body = &ingest.tracking_data().bodies[0];
        assert!(!body.is_tracked);
    }

    #[test]
    fn tracking_data_carries_converted_values() {
        let mut ingest = TrackingIngest::new(IngestOptions::default());
        ingest
            .ingest(&sample([1000.0, 2000.0, 3000.0]), Instant::now())
            .unwrap();
        let body = &ingest.tracking_data().bodies[0];
        assert!(body.is_tracked);
        assert_eq!(body.position, [1.0, 2.0, 3.0]);

        // Round trip through the broadcast shape.
        let pose = ViewerPose::from_body(body);
        assert!((pose.position - Vec3::new(1.0, 2.0, 3.0)).length() < 1e-6);
    }

    #[test]
    fn eye_positions_follow_the_head_orientation() {
        let forward = ViewerPose {
            position: Vec3::new(0.0, 1.7, 0.0),
            orientation: None,
        };
        let (left, right) = forward.eye_positions(0.06);
        assert!((left - Vec3::new(-0.03, 1.7, 0.0)).length() < 1e-6);
        assert!((right - Vec3::new(0.03, 1.7, 0.0)).length() < 1e-6);

        // A quarter turn about z moves the eye axis onto y.
        let turned = ViewerPose {
            position: Vec3::ZERO,
            orientation: Some(Mat3::from_rotation_z(std::f32::consts::FRAC_PI_2)),
        };
        let (left, right) = turned.eye_positions(0.06);
        assert!((left - Vec3::new(0.0, -0.03, 0.0)).length() < 1e-6);
        assert!((right - Vec3::new(0.0, 0.03, 0.0)).length() < 1e-6);
    }

    #[test]
    fn rate_meter_reports_after_a_completed_window() {
        let mut meter = RateMeter::new(Duration::from_millis(250));
        let start = Instant::now();
        for i in 0..5 {
            meter.record(start + Duration::from_millis(i * 50));
        }
        assert!(meter.rate().is_none());
        // Crossing the window closes it: 5 samples landed in the 300 ms
        // window; the crossing sample opens the next one.
        meter.record(start + Duration::from_millis(300));
        let rate = meter.rate().expect("window completed");
        assert!((rate - 5.0 / 0.3).abs() < 0.5, "rate {rate}");
    }
}
