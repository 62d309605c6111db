use glam::{Mat4, Vec3, Vec4};

use crate::viewport::Viewport;

/// Vertical sense of the destination the solved matrices feed.
///
/// Intermediate render targets that are later sampled as textures use a
/// vertically flipped convention relative to a physical display surface
/// (e.g. the composited multi-wall preview). The caller states the
/// destination explicitly; it is never inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputSurface {
    /// Presenting straight to a display surface.
    #[default]
    Display,
    /// Rendering into an intermediate texture with flipped sampling.
    FlippedTexture,
}

/// Fixed solver parameters shared by every wall of an installation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverOptions {
    /// Far plane distance in meters, independent of the viewer distance.
    pub far: f32,
    /// Minimum perpendicular viewer distance from the wall plane; at or
    /// below this the wall is reported not visible.
    pub near_epsilon: f32,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            far: 100.0,
            near_epsilon: 1e-4,
        }
    }
}

/// Projection/view pair for one wall and one viewer position.
///
/// `projection * view` maps room space to clip space. The view matrix only
/// carries the camera translation; the wall orientation is folded into the
/// projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallCamera {
    pub projection: Mat4,
    pub view: Mat4,
}

impl WallCamera {
    /// Combined room → clip transform.
    pub fn clip_from_room(&self) -> Mat4 {
        self.projection * self.view
    }

    /// Room-space positions of the eight NDC cube corners: near face first,
    /// counter-clockwise from bottom-left, then the far face in the same
    /// order. The near face lies exactly on the wall rectangle.
    pub fn frustum_corners(&self) -> [Vec3; 8] {
        let room_from_clip = self.clip_from_room().inverse();
        [
            Vec3::new(-1.0, -1.0, -1.0),
            Vec3::new(1.0, -1.0, -1.0),
            Vec3::new(1.0, 1.0, -1.0),
            Vec3::new(-1.0, 1.0, -1.0),
            Vec3::new(-1.0, -1.0, 1.0),
            Vec3::new(1.0, -1.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(-1.0, 1.0, 1.0),
        ]
        .map(|ndc| room_from_clip.project_point3(ndc))
    }
}

/// Solves the off-axis projection for one wall and one viewer position.
///
/// The viewer is transformed into wall-local coordinates; its perpendicular
/// distance to the wall plane becomes the near plane distance, so the
/// physical rectangle exactly fills the rendered viewport however far
/// off-center the viewer stands. Returns `None` when the viewer is on or
/// behind the wall plane (or past the far plane); such a wall must be
/// skipped for the frame, never rendered through a degenerate matrix.
pub fn solve(
    wall: &Viewport,
    viewer_position_room: Vec3,
    output: OutputSurface,
    options: &SolverOptions,
) -> Option<WallCamera> {
    let wall_from_local = wall.wall_transform();
    let local_from_room = wall_from_local.inverse();
    let eye = local_from_room.transform_point3(viewer_position_room);

    if eye.z <= options.near_epsilon || eye.z >= options.far {
        return None;
    }

    // Frustum edges relative to the viewer's projection onto the wall plane.
    let left = wall.left() - eye.x;
    let right = wall.right() - eye.x;
    let bottom = wall.bottom() - eye.y;
    let top = wall.top() - eye.y;

    // The trailing translation cancels the wall's origin offset, leaving
    // only the inverse wall rotation in the product.
    let origin_room = wall_from_local.transform_point3(Vec3::ZERO);
    let mut projection = frustum(left, right, bottom, top, eye.z, options.far)
        * local_from_room
        * Mat4::from_translation(origin_room);

    if output == OutputSurface::FlippedTexture {
        projection = Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0)) * projection;
    }

    Some(WallCamera {
        projection,
        view: Mat4::from_translation(-viewer_position_room),
    })
}

/// Standard off-axis perspective frustum, OpenGL depth convention.
fn frustum(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
    let width = right - left;
    let height = top - bottom;
    let depth = far - near;
    Mat4::from_cols(
        Vec4::new(2.0 * near / width, 0.0, 0.0, 0.0),
        Vec4::new(0.0, 2.0 * near / height, 0.0, 0.0),
        Vec4::new(
            (right + left) / width,
            (top + bottom) / height,
            -(far + near) / depth,
            -1.0,
        ),
        Vec4::new(0.0, 0.0, -2.0 * far * near / depth, 0.0),
    )
}
