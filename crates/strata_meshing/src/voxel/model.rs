//! Custom block models with neighbor-dependent faces.
//!
//! A face can require a set of horizontal connections (fence rails only
//! exist towards other fences) or be hidden by them (the part of a post a
//! rail runs into). Connection bits are [`Face::bit`] of the four horizontal
//! faces.

use super::face::{Face, FaceSet};

/// One face of a custom model, in units inside its voxel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelFace {
    /// First vertex.
    pub origin: [i32; 3],
    /// First edge.
    pub edge_u: [i32; 3],
    /// Second edge.
    pub edge_v: [i32; 3],
    /// Face normal, `None` for slanted faces.
    pub normal: Option<Face>,
    /// Which face texture of the block to sample.
    pub tile: Face,
    /// Texture sub-rectangle `[u, v, w, h]` in 1/16 tile units.
    pub tex: [i32; 4],
    /// Dropped when the neighbor on this side hides it.
    pub cull: Option<Face>,
    /// Connection bits that must all be present.
    pub requires: u8,
    /// Connection bits of which any hides the face.
    pub hidden_by: u8,
}

/// Origin and edges of one side of the box `min..max`.
///
/// Edges follow [`Face::plane_axes`] so the quad winds the same way as a
/// full cube face.
#[must_use]
pub fn box_face(face: Face, min: [i32; 3], max: [i32; 3]) -> ([i32; 3], [i32; 3], [i32; 3]) {
    let (u_axis, v_axis) = face.plane_axes();
    let n_axis = face.normal_axis();

    let mut origin = min;
    if face.is_positive() {
        origin[n_axis] = max[n_axis];
    }
    let mut edge_u = [0; 3];
    edge_u[u_axis] = max[u_axis] - min[u_axis];
    let mut edge_v = [0; 3];
    edge_v[v_axis] = max[v_axis] - min[v_axis];
    (origin, edge_u, edge_v)
}

/// A block model made of [`ModelFace`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomModel {
    faces: Vec<ModelFace>,
}

impl CustomModel {
    /// Wraps a face list.
    #[must_use]
    pub fn new(faces: Vec<ModelFace>) -> Self {
        Self { faces }
    }

    /// All faces, in emission order.
    #[inline]
    #[must_use]
    pub fn faces(&self) -> &[ModelFace] {
        &self.faces
    }

    /// Faces visible for the given connection bits.
    pub fn visible(&self, connections: u8) -> impl Iterator<Item = &ModelFace> {
        self.faces.iter().filter(move |face| {
            connections & face.requires == face.requires && connections & face.hidden_by == 0
        })
    }

    /// Adds the listed sides of the box `min..max`.
    fn push_box(
        &mut self,
        min: [i32; 3],
        max: [i32; 3],
        sides: FaceSet,
        requires: u8,
        hidden_by: u8,
    ) {
        for face in sides.iter() {
            let (origin, edge_u, edge_v) = box_face(face, min, max);
            let (u_axis, v_axis) = face.plane_axes();
            let cull = (origin[face.normal_axis()] % 16 == 0).then_some(face);
            self.faces.push(ModelFace {
                origin,
                edge_u,
                edge_v,
                normal: Some(face),
                tile: face,
                tex: [
                    min[u_axis],
                    min[v_axis],
                    max[u_axis] - min[u_axis],
                    max[v_axis] - min[v_axis],
                ],
                cull,
                requires,
                hidden_by,
            });
        }
    }

    /// Fence: a 4x16x4 post plus two rails towards each connected side.
    ///
    /// Post faces at rail height are hidden on connected sides, so a
    /// connected fence has no faces buried inside its rails.
    #[must_use]
    pub fn fence() -> Self {
        const POST_MIN: i32 = 6;
        const POST_MAX: i32 = 10;
        const RAILS: [(i32, i32); 2] = [(6, 9), (12, 15)];
        const SEGMENTS: [(i32, i32, bool); 5] =
            [(0, 6, false), (6, 9, true), (9, 12, false), (12, 15, true), (15, 16, false)];

        let mut model = Self::default();
        let caps: FaceSet = [Face::Top, Face::Bottom].into_iter().collect();
        model.push_box([POST_MIN, 0, POST_MIN], [POST_MAX, 16, POST_MAX], caps, 0, 0);

        for side in Face::HORIZONTAL {
            for (y0, y1, under_rail) in SEGMENTS {
                let hidden_by = if under_rail { side.bit() } else { 0 };
                model.push_box(
                    [POST_MIN, y0, POST_MIN],
                    [POST_MAX, y1, POST_MAX],
                    [side].into_iter().collect(),
                    0,
                    hidden_by,
                );
            }
        }

        for side in Face::HORIZONTAL {
            let (lo, hi) = if side.is_positive() { (POST_MAX, 16) } else { (0, POST_MIN) };
            let along = side.normal_axis();
            let across = Face::from_index((side as u8 + 1) % 4).unwrap_or(Face::East);
            let faces: FaceSet = [Face::Top, Face::Bottom, across, across.opposite()]
                .into_iter()
                .collect();
            for (y0, y1) in RAILS {
                let mut min = [POST_MIN, y0, POST_MIN];
                let mut max = [POST_MAX, y1, POST_MAX];
                min[along] = lo;
                max[along] = hi;
                model.push_box(min, max, faces, side.bit(), 0);
            }
        }
        model
    }

    /// Wire: a flat 4x4 pad plus an arm towards each connected side.
    #[must_use]
    pub fn wire() -> Self {
        const PAD_MIN: i32 = 6;
        const PAD_MAX: i32 = 10;
        const HEIGHT: i32 = 1;

        let top: FaceSet = [Face::Top].into_iter().collect();
        let mut model = Self::default();
        model.push_box([PAD_MIN, 0, PAD_MIN], [PAD_MAX, HEIGHT, PAD_MAX], top, 0, 0);

        for side in Face::HORIZONTAL {
            let (lo, hi) = if side.is_positive() { (PAD_MAX, 16) } else { (0, PAD_MIN) };
            let along = side.normal_axis();
            let mut min = [PAD_MIN, 0, PAD_MIN];
            let mut max = [PAD_MAX, HEIGHT, PAD_MAX];
            min[along] = lo;
            max[along] = hi;
            model.push_box(min, max, top, side.bit(), 0);
        }
        model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_face_matches_unit_cube() {
        let (origin, u, v) = box_face(Face::Top, [0, 0, 0], [16, 16, 16]);
        assert_eq!(origin, [0, 16, 0]);
        assert_eq!(u, [16, 0, 0]);
        assert_eq!(v, [0, 0, 16]);

        let (origin, u, v) = box_face(Face::East, [0, 0, 0], [16, 16, 16]);
        assert_eq!(origin, [16, 0, 0]);
        assert_eq!(u, [0, 0, 16]);
        assert_eq!(v, [0, 16, 0]);
    }

    #[test]
    fn test_isolated_fence_is_a_post() {
        let fence = CustomModel::fence();
        assert_eq!(fence.visible(0).count(), 22);
        assert!(fence.visible(0).all(|face| face.requires == 0));
    }

    #[test]
    fn test_connected_fence_hides_post_under_rails() {
        let fence = CustomModel::fence();
        let south = Face::South.bit();
        // 2 post segments hidden, 2 rails of 4 faces added
        assert_eq!(fence.visible(south).count(), 22 - 2 + 8);
        let all = Face::HORIZONTAL.iter().fold(0, |acc, face| acc | face.bit());
        assert_eq!(fence.visible(all).count(), 22 - 8 + 32);
    }

    #[test]
    fn test_wire_arms_follow_connections() {
        let wire = CustomModel::wire();
        assert_eq!(wire.visible(0).count(), 1);
        assert_eq!(wire.visible(Face::East.bit() | Face::West.bit()).count(), 3);
        assert!(wire.faces().iter().all(|face| face.normal == Some(Face::Top)));
    }
}
