//! Per-block region ownership, boundary flags and lattice coverage.

/// Number of neighborhood directions, center included.
pub const DIRECTION_COUNT: usize = 27;

/// Index of the block itself in the 3×3×3 neighborhood.
pub const CENTER: usize = 13;

/// Map a direction with components in `-1..=1` to its neighborhood index.
#[inline]
pub const fn direction_index(d: [i64; 3]) -> usize {
    ((d[0] + 1) + 3 * (d[1] + 1) + 9 * (d[2] + 1)) as usize
}

/// Inverse of [`direction_index`].
#[inline]
pub const fn direction_of(index: usize) -> [i64; 3] {
    [
        (index % 3) as i64 - 1,
        ((index / 3) % 3) as i64 - 1,
        (index / 9) as i64 - 1,
    ]
}

/// Classification of a dual cell or dual point along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisClass {
    /// Touches the low ghost layer.
    Low = 0,
    /// Entirely inside the block.
    Interior = 1,
    /// Touches the high ghost layer.
    High = 2,
}

impl AxisClass {
    /// Directions a region of this class shares along the axis.
    #[inline]
    pub fn directions(self) -> &'static [i64] {
        match self {
            AxisClass::Low => &[-1, 0],
            AxisClass::Interior => &[0],
            AxisClass::High => &[0, 1],
        }
    }

    /// Direction of a dual point of this class.
    #[inline]
    pub fn offset(self) -> i64 {
        self as i64 - 1
    }
}

/// Region index from per-axis classes.
#[inline]
pub fn region_index(classes: [AxisClass; 3]) -> usize {
    classes[0] as usize + 3 * classes[1] as usize + 9 * classes[2] as usize
}

/// Ownership flag and degenerate level difference for each of the 27
/// regions of a block.
///
/// The same index addresses both the region of dual cells with a given
/// classification and the neighbor in that direction; the level difference
/// is the one of the neighbor block, the ownership flag is the one of the
/// region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionBits([u8; DIRECTION_COUNT]);

impl RegionBits {
    const OWNED: u8 = 0x80;
    const LEVEL_DIFF_MASK: u8 = 0x7f;

    /// All regions unowned, no degenerate neighbors.
    pub fn empty() -> Self {
        Self([0; DIRECTION_COUNT])
    }

    /// True if this block generates geometry for the region.
    #[inline]
    pub fn is_owned(&self, region: usize) -> bool {
        self.0[region] & Self::OWNED != 0
    }

    /// Levels between this block and the neighbor in `direction`
    /// (0 when the neighbor is on the same level, finer or absent).
    #[inline]
    pub fn level_diff(&self, direction: usize) -> u32 {
        (self.0[direction] & Self::LEVEL_DIFF_MASK) as u32
    }

    pub fn set_owned(&mut self, region: usize, owned: bool) {
        if owned {
            self.0[region] |= Self::OWNED;
        } else {
            self.0[region] &= !Self::OWNED;
        }
    }

    pub fn set_level_diff(&mut self, direction: usize, diff: u32) {
        let diff = (diff as u8).min(Self::LEVEL_DIFF_MASK);
        self.0[direction] = (self.0[direction] & Self::OWNED) | diff;
    }

    /// Number of owned regions.
    pub fn owned_count(&self) -> usize {
        self.0.iter().filter(|&&b| b & Self::OWNED != 0).count()
    }

    /// True if any neighbor is coarser than this block.
    pub fn has_degenerate_neighbors(&self) -> bool {
        self.0.iter().any(|&b| b & Self::LEVEL_DIFF_MASK != 0)
    }
}

impl Default for RegionBits {
    fn default() -> Self {
        Self::empty()
    }
}

/// Faces of a block (and of a dual cell), in bit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Face {
    NegX = 0,
    PosX = 1,
    NegY = 2,
    PosY = 3,
    NegZ = 4,
    PosZ = 5,
}

impl Face {
    pub const ALL: [Face; 6] = [
        Face::NegX,
        Face::PosX,
        Face::NegY,
        Face::PosY,
        Face::NegZ,
        Face::PosZ,
    ];

    #[inline]
    pub fn axis(self) -> usize {
        self as usize / 2
    }

    #[inline]
    pub fn is_high(self) -> bool {
        self as usize % 2 == 1
    }

    /// Neighborhood direction through this face.
    pub fn direction(self) -> usize {
        let mut d = [0i64; 3];
        d[self.axis()] = if self.is_high() { 1 } else { -1 };
        direction_index(d)
    }
}

/// Faces with no neighbor at any level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BoundaryBits(u8);

impl BoundaryBits {
    pub const ALL: BoundaryBits = BoundaryBits(0b11_1111);

    pub fn empty() -> Self {
        Self(0)
    }

    #[inline]
    pub fn contains(self, face: Face) -> bool {
        self.0 & (1 << face as u8) != 0
    }

    #[inline]
    pub fn insert(&mut self, face: Face) {
        self.0 |= 1 << face as u8;
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }
}

/// Block lattice positions within two steps of a block that hold data at
/// some level.
///
/// Two steps are needed for blocks one cell thick, where the dual cell across
/// a face reaches past the nearest neighbor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Coverage(u128);

impl Coverage {
    /// Largest offset along an axis.
    pub const REACH: i64 = 2;

    pub fn empty() -> Self {
        Self(0)
    }

    #[inline]
    fn bit(d: [i64; 3]) -> Option<u32> {
        if d.iter().any(|c| c.abs() > Self::REACH) {
            return None;
        }
        Some(((d[0] + 2) + 5 * (d[1] + 2) + 25 * (d[2] + 2)) as u32)
    }

    /// True if the position at offset `d` holds data. Offsets beyond
    /// [`REACH`](Self::REACH) are reported as uncovered.
    #[inline]
    pub fn contains(self, d: [i64; 3]) -> bool {
        Self::bit(d).is_some_and(|b| (self.0 >> b) & 1 == 1)
    }

    pub fn insert(&mut self, d: [i64; 3]) {
        if let Some(b) = Self::bit(d) {
            self.0 |= 1u128 << b;
        }
    }
}
