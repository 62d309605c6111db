use std::path::PathBuf;

use clap::{Parser, Subcommand};
use glam::Vec3;

#[derive(Parser, Debug)]
#[command(
    name = "cavewall",
    author,
    version,
    about = "CAVE off-axis projection and frame-lock driver",
    arg_required_else_help = true
)]
pub struct Cli {
    /// Installation configuration (TOML file).
    #[arg(long, value_name = "PATH", global = true, conflicts_with = "preset")]
    pub config: Option<PathBuf>,

    /// Built-in installation preset (currently `aixcave`).
    #[arg(long, value_name = "NAME", global = true)]
    pub preset: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Solve the off-axis projection for one wall and print the result.
    Solve(SolveArgs),
    /// Run a loopback cluster: one master plus one render peer per wall.
    Simulate(SimulateArgs),
    /// Validate the configuration and print the wall table.
    Validate,
}

#[derive(Parser, Debug)]
pub struct SolveArgs {
    /// Wall name from the viewport table.
    #[arg(long, value_name = "NAME")]
    pub wall: String,

    /// Viewer position in room space, `X,Y,Z` in meters.
    #[arg(
        long,
        value_name = "X,Y,Z",
        value_parser = parse_vec3,
        default_value = "0,1.7,0"
    )]
    pub viewer: Vec3,

    /// Solve for an intermediate flipped render target instead of a display.
    #[arg(long)]
    pub flipped: bool,

    /// Emit the matrices as JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct SimulateArgs {
    /// Walls to drive, comma separated (defaults to every configured wall).
    #[arg(long, value_name = "NAMES", value_delimiter = ',')]
    pub walls: Vec<String>,

    /// Number of frames to run.
    #[arg(long, value_name = "COUNT", default_value_t = 300)]
    pub frames: u64,

    /// Drive the walls on a fixed local tick without the cluster barrier.
    #[arg(long)]
    pub standalone: bool,

    /// Artificially stall this wall's peer to exercise eviction.
    #[arg(long, value_name = "NAME")]
    pub stall_peer: Option<String>,

    /// Pace frames in real time instead of running as fast as possible.
    #[arg(long)]
    pub realtime: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_vec3(value: &str) -> Result<Vec3, String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(format!("expected X,Y,Z but got '{value}'"));
    }
    let mut components = [0.0_f32; 3];
    for (slot, part) in components.iter_mut().zip(&parts) {
        *slot = part
            .parse()
            .map_err(|_| format!("invalid coordinate '{part}'"))?;
    }
    Ok(Vec3::from(components))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_viewer_positions() {
        assert_eq!(parse_vec3("1,1,0").unwrap(), Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(
            parse_vec3(" -0.5, 1.7 , 2.625 ").unwrap(),
            Vec3::new(-0.5, 1.7, 2.625)
        );
        assert!(parse_vec3("1,2").is_err());
        assert!(parse_vec3("a,b,c").is_err());
    }

    #[test]
    fn solve_subcommand_parses() {
        let cli = Cli::try_parse_from([
            "cavewall", "solve", "--wall", "front", "--viewer", "1,1,0", "--flipped",
        ])
        .unwrap();
        match cli.command {
            Command::Solve(args) => {
                assert_eq!(args.wall, "front");
                assert_eq!(args.viewer, Vec3::new(1.0, 1.0, 0.0));
                assert!(args.flipped);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn simulate_subcommand_splits_wall_list() {
        let cli = Cli::try_parse_from([
            "cavewall",
            "simulate",
            "--walls",
            "front,left,right",
            "--frames",
            "10",
        ])
        .unwrap();
        match cli.command {
            Command::Simulate(args) => {
                assert_eq!(args.walls, ["front", "left", "right"]);
                assert_eq!(args.frames, 10);
                assert!(!args.standalone);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
