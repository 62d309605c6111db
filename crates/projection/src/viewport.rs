use glam::{EulerRot, Mat4, Vec3};

#[derive(Debug, thiserror::Error)]
pub enum ViewportError {
    #[error("viewport width is empty or inverted: left {left} >= right {right}")]
    EmptyWidth { left: f32, right: f32 },
    #[error("viewport height is empty or inverted: bottom {bottom} >= top {top}")]
    EmptyHeight { bottom: f32, top: f32 },
    #[error("viewport placement or bounds contain a non-finite value")]
    NonFinite,
}

/// Placement of one physical wall in room space plus its local clip rectangle.
///
/// `loc` is the room-space position of the wall's local origin and `rot` the
/// Euler angles (XYZ order, radians) of the wall-local → room rotation. The
/// rectangle lies in the wall-local z = 0 plane; the wall normal is local +z,
/// pointing at the viewer side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    loc: Vec3,
    rot: Vec3,
    left: f32,
    right: f32,
    bottom: f32,
    top: f32,
}

impl Viewport {
    /// Validates and builds a wall description.
    ///
    /// The rectangle must satisfy `right > left` and `top > bottom`; every
    /// value must be finite.
    pub fn new(
        loc: Vec3,
        rot: Vec3,
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
    ) -> Result<Self, ViewportError> {
        let finite = loc.is_finite()
            && rot.is_finite()
            && [left, right, bottom, top].iter().all(|v| v.is_finite());
        if !finite {
            return Err(ViewportError::NonFinite);
        }
        if right <= left {
            return Err(ViewportError::EmptyWidth { left, right });
        }
        if top <= bottom {
            return Err(ViewportError::EmptyHeight { bottom, top });
        }
        Ok(Self {
            loc,
            rot,
            left,
            right,
            bottom,
            top,
        })
    }

    pub fn loc(&self) -> Vec3 {
        self.loc
    }

    pub fn rot(&self) -> Vec3 {
        self.rot
    }

    pub fn left(&self) -> f32 {
        self.left
    }

    pub fn right(&self) -> f32 {
        self.right
    }

    pub fn bottom(&self) -> f32 {
        self.bottom
    }

    pub fn top(&self) -> f32 {
        self.top
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.top - self.bottom
    }

    /// Wall-local → room transform: rotation applied first in wall-local
    /// space, then translated to `loc`. Recomputed on every call; nothing is
    /// cached across a configuration edit.
    pub fn wall_transform(&self) -> Mat4 {
        Mat4::from_translation(self.loc)
            * Mat4::from_euler(EulerRot::XYZ, self.rot.x, self.rot.y, self.rot.z)
    }

    /// Room-space corners of the wall rectangle, counter-clockwise from
    /// bottom-left: `(l,b), (r,b), (r,t), (l,t)`.
    pub fn corners_room(&self) -> [Vec3; 4] {
        let transform = self.wall_transform();
        [
            Vec3::new(self.left, self.bottom, 0.0),
            Vec3::new(self.right, self.bottom, 0.0),
            Vec3::new(self.right, self.top, 0.0),
            Vec3::new(self.left, self.top, 0.0),
        ]
        .map(|corner| transform.transform_point3(corner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn rejects_inverted_rectangle() {
        let err = Viewport::new(Vec3::ZERO, Vec3::ZERO, 1.0, -1.0, 0.0, 1.0);
        assert!(matches!(err, Err(ViewportError::EmptyWidth { .. })));
        let err = Viewport::new(Vec3::ZERO, Vec3::ZERO, -1.0, 1.0, 2.0, 1.0);
        assert!(matches!(err, Err(ViewportError::EmptyHeight { .. })));
    }

    #[test]
    fn rejects_non_finite_placement() {
        let err = Viewport::new(Vec3::new(f32::NAN, 0.0, 0.0), Vec3::ZERO, -1.0, 1.0, 0.0, 1.0);
        assert!(matches!(err, Err(ViewportError::NonFinite)));
    }

    #[test]
    fn wall_transform_rotates_then_translates() {
        let wall = Viewport::new(
            Vec3::new(0.0, 0.0, 2.0),
            Vec3::new(0.0, PI, 0.0),
            -1.0,
            1.0,
            0.0,
            2.0,
        )
        .unwrap();
        let transform = wall.wall_transform();
        // Local origin lands on loc.
        let origin = transform.transform_point3(Vec3::ZERO);
        assert!((origin - Vec3::new(0.0, 0.0, 2.0)).length() < 1e-6);
        // Local +x is reversed by the half-turn about y.
        let x = transform.transform_point3(Vec3::X);
        assert!((x - Vec3::new(-1.0, 0.0, 2.0)).length() < 1e-6);
    }

    #[test]
    fn corners_room_follow_the_transform() {
        let wall = Viewport::new(
            Vec3::new(-2.0, 0.0, 0.0),
            Vec3::new(0.0, PI * 0.5, 0.0),
            -2.0,
            2.0,
            0.0,
            3.0,
        )
        .unwrap();
        let corners = wall.corners_room();
        let transform = wall.wall_transform();
        let expected = transform.transform_point3(Vec3::new(-2.0, 0.0, 0.0));
        assert!((corners[0] - expected).length() < 1e-6);
        // All corners sit on the wall plane: constant distance from loc
        // along the wall normal (zero).
        let normal = transform.transform_vector3(Vec3::Z);
        for corner in corners {
            assert!((corner - wall.loc()).dot(normal).abs() < 1e-5);
        }
    }
}
