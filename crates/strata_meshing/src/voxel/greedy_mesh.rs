//! Greedy merging of coplanar unit quads.
//!
//! ## Algorithm
//!
//! 1. Walk the merge table in insertion order (Y, Z, X voxel order)
//! 2. Skip quads already absorbed into an earlier one
//! 3. Extend along U while the neighbor is congruent
//! 4. Extend row by row along V while the whole row is congruent
//! 5. Widen the head quad and switch its texture to repeat mode
//!
//! Heads only ever grow towards later voxels, so a head is never absorbed
//! by a quad processed after it.
//!
//! A direction is only open when occlusion and light are constant along
//! it; otherwise the interpolated shading of the merged quad would differ
//! from the unit quads it replaces.

use super::chunk::SUB_CHUNK_SIZE;
use super::face::Face;
use super::merge::{EntryHandle, QuadKey, QuadMergeTable};
use super::quad::{PackedQuad, UNITS_PER_BLOCK};

#[allow(clippy::cast_possible_wrap)]
const EXTENT: i32 = SUB_CHUNK_SIZE as i32;

/// In-plane block position of a mergeable unit quad.
struct UnitFace {
    u_axis: usize,
    v_axis: usize,
    cu: i32,
    cv: i32,
    along_u: bool,
    along_v: bool,
}

impl UnitFace {
    fn of(quad: &PackedQuad) -> Option<Self> {
        let face: Face = quad.normal()?;
        if quad.has_flag(PackedQuad::FLAG_REPEAT) {
            return None;
        }
        let (u_axis, v_axis) = face.plane_axes();
        let mut unit_u = [0; 3];
        unit_u[u_axis] = UNITS_PER_BLOCK;
        let mut unit_v = [0; 3];
        unit_v[v_axis] = UNITS_PER_BLOCK;
        if quad.edge_u() != unit_u || quad.edge_v() != unit_v {
            return None;
        }

        let origin = quad.origin();
        if origin[u_axis] % UNITS_PER_BLOCK != 0 || origin[v_axis] % UNITS_PER_BLOCK != 0 {
            return None;
        }
        let (cu, cv) = (origin[u_axis] / UNITS_PER_BLOCK, origin[v_axis] / UNITS_PER_BLOCK);
        if !(0..EXTENT).contains(&cu) || !(0..EXTENT).contains(&cv) {
            return None;
        }

        let o = quad.occlusion();
        let l = quad.words[6].to_le_bytes();
        Some(Self {
            u_axis,
            v_axis,
            cu,
            cv,
            along_u: o[0] == o[1] && o[3] == o[2] && l[0] == l[1] && l[3] == l[2],
            along_v: o[0] == o[3] && o[1] == o[2] && l[0] == l[3] && l[1] == l[2],
        })
    }
}

/// Same everything except position.
#[inline]
fn congruent(a: &PackedQuad, b: &PackedQuad) -> bool {
    a.words[2..] == b.words[2..] && a.words[1] >> 16 == b.words[1] >> 16
}

/// Free, congruent entry at `key`, if any.
fn candidate(table: &QuadMergeTable, head: &PackedQuad, key: Option<QuadKey>) -> Option<EntryHandle> {
    let handle = table.find(&key?)?;
    (!table.is_absorbed(handle) && congruent(head, table.get(handle))).then_some(handle)
}

/// Merges every run of congruent unit quads in `table`.
///
/// Absorbed entries stay in the table marked as such; read the result with
/// [`QuadMergeTable::survivors`]. Returns the number of absorbed quads.
#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
pub fn merge_coplanar(table: &mut QuadMergeTable) -> usize {
    let mut absorbed = 0;
    let mut row: Vec<EntryHandle> = Vec::with_capacity(SUB_CHUNK_SIZE);

    for index in 0..table.len() {
        let head = EntryHandle::at(index);
        if table.is_absorbed(head) {
            continue;
        }
        let quad = *table.get(head);
        let Some(unit) = UnitFace::of(&quad) else {
            continue;
        };
        let key = QuadKey::of(&quad);

        let mut width = 1;
        if unit.along_u {
            while unit.cu + width < EXTENT {
                let Some(next) = candidate(table, &quad, key.shifted(unit.u_axis, width)) else {
                    break;
                };
                table.absorb(next);
                width += 1;
            }
        }

        let mut height = 1;
        if unit.along_v {
            'rows: while unit.cv + height < EXTENT {
                row.clear();
                let Some(row_key) = key.shifted(unit.v_axis, height) else {
                    break;
                };
                for i in 0..width {
                    match candidate(table, &quad, row_key.shifted(unit.u_axis, i)) {
                        Some(next) => row.push(next),
                        None => break 'rows,
                    }
                }
                for next in &row {
                    table.absorb(*next);
                }
                height += 1;
            }
        }

        if width > 1 || height > 1 {
            absorbed += (width * height - 1) as usize;
            table.get_mut(head).widen(width as u8, height as u8);
        }
    }
    absorbed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::chunk::Light;
    use crate::voxel::quad::QuadBuilder;

    fn top(x: i32, z: i32, occlusion: [u8; 4]) -> PackedQuad {
        QuadBuilder::new([x * 16, 16, z * 16], [16, 0, 0], [0, 0, 16])
            .normal(Face::Top)
            .occlusion(occlusion)
            .build()
    }

    #[test]
    fn test_full_layer_becomes_one_quad() {
        let mut table = QuadMergeTable::new();
        for z in 0..16 {
            for x in 0..16 {
                table.add(top(x, z, [0; 4]));
            }
        }
        assert_eq!(merge_coplanar(&mut table), 255);

        let survivors: Vec<_> = table.survivors().collect();
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].edge_u(), [256, 0, 0]);
        assert_eq!(survivors[0].edge_v(), [0, 0, 256]);
        assert_eq!(survivors[0].repeat(), Some((16, 16)));
    }

    #[test]
    fn test_occlusion_gradient_blocks_one_axis() {
        // Darker towards +X: constant along Z only.
        let mut table = QuadMergeTable::new();
        for z in 0..4 {
            for x in 0..2 {
                table.add(top(x, z, [0, 1, 1, 0]));
            }
        }
        merge_coplanar(&mut table);

        let survivors: Vec<_> = table.survivors().collect();
        assert_eq!(survivors.len(), 2);
        for quad in survivors {
            assert_eq!(quad.edge_u(), [16, 0, 0]);
            assert_eq!(quad.edge_v(), [0, 0, 64]);
        }
    }

    #[test]
    fn test_different_light_does_not_merge() {
        let mut table = QuadMergeTable::new();
        table.add(top(0, 0, [0; 4]));
        table.add(
            QuadBuilder::new([16, 16, 0], [16, 0, 0], [0, 0, 16])
                .normal(Face::Top)
                .light([Light::new(3, 0); 4])
                .build(),
        );
        assert_eq!(merge_coplanar(&mut table), 0);
        assert_eq!(table.survivors().count(), 2);
    }

    #[test]
    fn test_l_shape_keeps_area() {
        let cells = [(0, 0), (1, 0), (2, 0), (0, 1), (0, 2)];
        let mut table = QuadMergeTable::new();
        for (x, z) in cells {
            table.add(top(x, z, [0; 4]));
        }
        merge_coplanar(&mut table);

        let area: i64 = table.survivors().map(PackedQuad::area_units).sum();
        assert_eq!(area, 5 * 256);
        assert_eq!(table.survivors().count(), 2);
    }
}
