//! Projection crate for cavewall.
//!
//! A CAVE wall is a fixed physical rectangle that has to behave like a
//! window into a shared scene for a viewer who is rarely centered in front
//! of it. The flow per wall and per frame is:
//!
//! ```text
//!   tracked viewer position (room space)
//!          │
//!          ▼
//!   Viewport::wall_transform()⁻¹ ──▶ viewer in wall-local space
//!          │
//!          ▼
//!   solve() ──▶ WallCamera { projection, view } ──▶ render backend
//! ```
//!
//! `solve` places the near plane exactly on the wall plane, which is what
//! makes the physical rectangle fill the rendered viewport for any viewer
//! position. A viewer on or behind the wall plane yields `None` instead of
//! a degenerate matrix; the caller skips that wall for the frame.

mod solver;
mod viewport;

pub use solver::{solve, OutputSurface, SolverOptions, WallCamera};
pub use viewport::{Viewport, ViewportError};
