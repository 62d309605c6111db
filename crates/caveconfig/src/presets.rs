use std::collections::BTreeMap;
use std::f32::consts::{FRAC_PI_2, PI};

use crate::{CaveConfig, ClusterSettings, Defaults, TrackingSettings, ViewportEntry};

const SIDE_LENGTH: f32 = 5.25;
const HEIGHT: f32 = 3.3;
const PROJECTOR_WINDOW_WIDTH: f32 = 3.14285;
const PROJECTOR_WINDOW_HEIGHT: f32 = 1.964285;

/// Built-in configuration of the aixCAVE installation: five full walls plus
/// three single-projector windows.
pub fn aixcave() -> CaveConfig {
    let half = SIDE_LENGTH * 0.5;
    let mut viewports = BTreeMap::new();

    viewports.insert(
        "front".to_string(),
        ViewportEntry {
            loc: [0.0, 0.0, half],
            rot: [0.0, PI, 0.0],
            left: -half,
            right: half,
            bottom: 0.0,
            top: HEIGHT,
        },
    );
    viewports.insert(
        "back".to_string(),
        ViewportEntry {
            loc: [0.0, 0.0, -half],
            rot: [0.0, 0.0, 0.0],
            left: -half,
            right: half,
            bottom: 0.0,
            top: HEIGHT,
        },
    );
    viewports.insert(
        "left".to_string(),
        ViewportEntry {
            loc: [-half, 0.0, 0.0],
            rot: [0.0, FRAC_PI_2, 0.0],
            left: -half,
            right: half,
            bottom: 0.0,
            top: HEIGHT,
        },
    );
    viewports.insert(
        "right".to_string(),
        ViewportEntry {
            loc: [half, 0.0, 0.0],
            rot: [0.0, -FRAC_PI_2, 0.0],
            left: -half,
            right: half,
            bottom: 0.0,
            top: HEIGHT,
        },
    );
    // The floor plane faces up; its rectangle spans the full footprint.
    viewports.insert(
        "floor".to_string(),
        ViewportEntry {
            loc: [0.0, 0.0, 0.0],
            rot: [-FRAC_PI_2, 0.0, 0.0],
            left: -half,
            right: half,
            bottom: -half,
            top: half,
        },
    );

    // Individual projector windows on the front and back walls, for driving
    // a single output without the full wall.
    viewports.insert(
        "ngs01".to_string(),
        ViewportEntry {
            loc: [0.0, 0.0, -half],
            rot: [0.0, FRAC_PI_2, 0.0],
            left: -half,
            right: half,
            bottom: 0.0,
            top: HEIGHT,
        },
    );
    viewports.insert(
        "ngs13".to_string(),
        ViewportEntry {
            loc: [0.0, 0.0, half],
            rot: [0.0, PI, 0.0],
            left: -half,
            right: -half + PROJECTOR_WINDOW_WIDTH,
            bottom: HEIGHT - PROJECTOR_WINDOW_HEIGHT,
            top: HEIGHT,
        },
    );
    viewports.insert(
        "ngs15".to_string(),
        ViewportEntry {
            loc: [0.0, 0.0, half],
            rot: [0.0, PI, 0.0],
            left: -half,
            right: -half + PROJECTOR_WINDOW_WIDTH,
            bottom: 0.0,
            top: PROJECTOR_WINDOW_HEIGHT,
        },
    );

    CaveConfig {
        version: 1,
        defaults: Defaults::default(),
        cluster: ClusterSettings::default(),
        tracking: TrackingSettings::default(),
        viewports,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_passes_validation() {
        aixcave().validate().unwrap();
    }

    #[test]
    fn preset_has_the_five_walls_and_projector_windows() {
        let config = aixcave();
        for name in ["front", "back", "left", "right", "floor", "ngs01", "ngs13", "ngs15"] {
            assert!(config.viewport(name).is_some(), "missing {name}");
        }
    }

    #[test]
    fn front_wall_matches_the_installation_geometry() {
        let config = aixcave();
        let front = config.viewport("front").unwrap();
        assert_eq!(front.loc, [0.0, 0.0, 2.625]);
        assert_eq!(front.left, -2.625);
        assert_eq!(front.right, 2.625);
        assert_eq!(front.bottom, 0.0);
        assert_eq!(front.top, 3.3);
    }

    #[test]
    fn projector_windows_overlap_for_edge_blending() {
        let config = aixcave();
        let upper = config.viewport("ngs13").unwrap();
        let lower = config.viewport("ngs15").unwrap();
        assert_eq!(upper.loc, lower.loc);
        assert!((upper.right - lower.right).abs() < 1e-6);
        // The two projector rows share a blend band in the wall's middle.
        assert!(upper.top > lower.top);
        assert!(upper.bottom < lower.top);
        assert!(upper.bottom > lower.bottom);
    }
}
