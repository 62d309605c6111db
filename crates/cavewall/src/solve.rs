use anyhow::{Context, Result};
use caveconfig::CaveConfig;
use glam::Mat4;
use projection::OutputSurface;
use tracking::ViewerPose;

use crate::bindings;
use crate::cli::SolveArgs;

pub fn run(config: &CaveConfig, args: &SolveArgs) -> Result<()> {
    let entry = config
        .viewport(&args.wall)
        .with_context(|| format!("unknown wall '{}'", args.wall))?;
    let wall = bindings::viewport_from_entry(&args.wall, entry)?;
    let options = bindings::solver_options(config);
    let output = if args.flipped {
        OutputSurface::FlippedTexture
    } else {
        OutputSurface::Display
    };

    let camera = projection::solve(&wall, args.viewer, output, &options).with_context(|| {
        format!(
            "wall '{}' is not visible from {}: the viewer is on or behind its plane",
            args.wall, args.viewer
        )
    })?;

    if args.json {
        let value = serde_json::json!({
            "wall": args.wall,
            "viewer": args.viewer.to_array(),
            "projection": camera.projection.to_cols_array(),
            "view": camera.view.to_cols_array(),
        });
        println!("{value}");
        return Ok(());
    }

    println!("wall '{}', viewer at {}", args.wall, args.viewer);
    let pose = ViewerPose {
        position: args.viewer,
        orientation: None,
    };
    let (left_eye, right_eye) = pose.eye_positions(config.defaults.ipd);
    println!(
        "stereo eyes (ipd {:.3} m): left {left_eye}, right {right_eye}",
        config.defaults.ipd
    );
    print_matrix("projection", &camera.projection);
    print_matrix("view", &camera.view);

    let clip = camera.clip_from_room();
    println!("wall corners (room) -> NDC:");
    for corner in wall.corners_room() {
        let ndc = clip.project_point3(corner);
        println!(
            "  [{:+7.3} {:+7.3} {:+7.3}] -> [{:+7.4} {:+7.4}]",
            corner.x, corner.y, corner.z, ndc.x, ndc.y
        );
    }

    println!("frustum corners (room):");
    for corner in camera.frustum_corners() {
        println!("  [{:+8.3} {:+8.3} {:+8.3}]", corner.x, corner.y, corner.z);
    }
    Ok(())
}

fn print_matrix(label: &str, matrix: &Mat4) {
    println!("{label}:");
    for index in 0..4 {
        let row = matrix.row(index);
        println!(
            "  [{:+9.4} {:+9.4} {:+9.4} {:+9.4}]",
            row.x, row.y, row.z, row.w
        );
    }
}
