//! The six axis-aligned faces of a voxel.

/// Face of a voxel, named after the direction its normal points.
///
/// The discriminant is the face index used in packed quads and cave
/// connectivity bits.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Face {
    /// +Z
    South = 0,
    /// +X
    East = 1,
    /// -Z
    North = 2,
    /// -X
    West = 3,
    /// +Y
    Top = 4,
    /// -Y
    Bottom = 5,
}

impl Face {
    /// All faces in index order.
    pub const ALL: [Face; 6] = [
        Face::South,
        Face::East,
        Face::North,
        Face::West,
        Face::Top,
        Face::Bottom,
    ];

    /// The four horizontal faces, in connection-bit order.
    pub const HORIZONTAL: [Face; 4] = [Face::South, Face::East, Face::North, Face::West];

    /// Face for an index in `0..6`.
    #[inline]
    #[must_use]
    pub const fn from_index(index: u8) -> Option<Face> {
        match index {
            0 => Some(Face::South),
            1 => Some(Face::East),
            2 => Some(Face::North),
            3 => Some(Face::West),
            4 => Some(Face::Top),
            5 => Some(Face::Bottom),
            _ => None,
        }
    }

    /// Index in `0..6`.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Bit of this face in a [`FaceSet`].
    #[inline]
    #[must_use]
    pub const fn bit(self) -> u8 {
        1 << self as u8
    }

    /// Unit step towards the neighbor across this face.
    #[inline]
    #[must_use]
    pub const fn offset(self) -> [i32; 3] {
        match self {
            Face::South => [0, 0, 1],
            Face::East => [1, 0, 0],
            Face::North => [0, 0, -1],
            Face::West => [-1, 0, 0],
            Face::Top => [0, 1, 0],
            Face::Bottom => [0, -1, 0],
        }
    }

    /// The face pointing the other way.
    #[inline]
    #[must_use]
    pub const fn opposite(self) -> Face {
        match self {
            Face::South => Face::North,
            Face::East => Face::West,
            Face::North => Face::South,
            Face::West => Face::East,
            Face::Top => Face::Bottom,
            Face::Bottom => Face::Top,
        }
    }

    /// Axis of the normal: 0 = X, 1 = Y, 2 = Z.
    #[inline]
    #[must_use]
    pub const fn normal_axis(self) -> usize {
        match self {
            Face::East | Face::West => 0,
            Face::Top | Face::Bottom => 1,
            Face::South | Face::North => 2,
        }
    }

    /// True if the normal points along the positive axis.
    #[inline]
    #[must_use]
    pub const fn is_positive(self) -> bool {
        matches!(self, Face::South | Face::East | Face::Top)
    }

    /// In-plane axes `(u, v)` a quad on this face spans.
    ///
    /// Vertical faces run `v` along Y; top and bottom run `v` along Z.
    #[inline]
    #[must_use]
    pub const fn plane_axes(self) -> (usize, usize) {
        match self {
            Face::South | Face::North => (0, 1),
            Face::East | Face::West => (2, 1),
            Face::Top | Face::Bottom => (0, 2),
        }
    }

    /// True for the four side faces.
    #[inline]
    #[must_use]
    pub const fn is_horizontal(self) -> bool {
        (self as u8) < 4
    }
}

/// Set of faces packed in the low 6 bits of a byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FaceSet(u8);

impl FaceSet {
    /// No face.
    pub const EMPTY: FaceSet = FaceSet(0);
    /// Every face.
    pub const ALL: FaceSet = FaceSet(0x3f);

    /// Set from raw bits; bits above 5 are dropped.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0x3f)
    }

    /// Raw bits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// True if `face` is in the set.
    #[inline]
    #[must_use]
    pub const fn contains(self, face: Face) -> bool {
        self.0 & face.bit() != 0
    }

    /// Adds `face`.
    #[inline]
    pub fn insert(&mut self, face: Face) {
        self.0 |= face.bit();
    }

    /// Union of two sets.
    #[inline]
    #[must_use]
    pub const fn union(self, other: FaceSet) -> FaceSet {
        FaceSet(self.0 | other.0)
    }

    /// Number of faces in the set.
    #[inline]
    #[must_use]
    pub const fn len(self) -> u32 {
        self.0.count_ones()
    }

    /// True if the set holds no face.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Faces in index order.
    pub fn iter(self) -> impl Iterator<Item = Face> {
        Face::ALL.into_iter().filter(move |face| self.contains(*face))
    }
}

impl FromIterator<Face> for FaceSet {
    fn from_iter<I: IntoIterator<Item = Face>>(iter: I) -> Self {
        let mut set = FaceSet::EMPTY;
        for face in iter {
            set.insert(face);
        }
        set
    }
}
