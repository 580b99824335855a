//! Corner, edge and face numbering of a dual cell, the face capping table and
//! the marching-cubes triangle table derived from it.
//!
//! Corner `c` sits at offset `(c & 1, (c >> 1) & 1, (c >> 2) & 1)`. Edges run
//! from their lower corner to their upper corner:
//!
//! | edges   | axis | corners                        |
//! |---------|------|--------------------------------|
//! | 0..=3   | x    | (0,1) (2,3) (4,5) (6,7)        |
//! | 4..=7   | y    | (0,2) (1,3) (4,6) (5,7)        |
//! | 8..=11  | z    | (0,4) (1,5) (2,6) (3,7)        |
//!
//! Faces are numbered −X, +X, −Y, +Y, −Z, +Z. Each face lists its corners as a
//! cycle that is counter-clockwise seen from outside the cell; face-local edge
//! `i` joins face corners `i` and `(i + 1) % 4`.

use std::sync::OnceLock;

/// Lattice offset of each corner.
pub const CORNER_OFFSETS: [[usize; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [0, 1, 0],
    [1, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [0, 1, 1],
    [1, 1, 1],
];

/// Lower and upper corner of each edge.
pub const EDGE_CORNERS: [[usize; 2]; 12] = [
    [0, 1],
    [2, 3],
    [4, 5],
    [6, 7],
    [0, 2],
    [1, 3],
    [4, 6],
    [5, 7],
    [0, 4],
    [1, 5],
    [2, 6],
    [3, 7],
];

/// Axis an edge runs along.
#[inline]
pub const fn edge_axis(edge: usize) -> usize {
    edge / 4
}

/// Number of faces of a dual cell.
pub const FACE_COUNT: usize = 6;

/// Cube corners of each face, outward counter-clockwise.
pub const FACE_CORNERS: [[usize; 4]; FACE_COUNT] = [
    [0, 4, 6, 2],
    [1, 3, 7, 5],
    [0, 1, 5, 4],
    [2, 6, 7, 3],
    [0, 2, 3, 1],
    [4, 5, 7, 6],
];

/// Cube edges of each face; entry `i` joins face corners `i` and `i + 1`.
pub const FACE_EDGES: [[usize; 4]; FACE_COUNT] = [
    [8, 6, 10, 4],
    [5, 11, 7, 9],
    [0, 9, 2, 8],
    [10, 3, 11, 1],
    [4, 1, 5, 0],
    [2, 7, 3, 6],
];

/// Face capping table indexed by the 4-bit face case (bit `i` = face corner
/// `i` inside).
///
/// Polygon vertices are face-local: 0..=3 are face corners, 4..=7 the points
/// on face edges 0..=3. Polygons are wound like the face itself. In the two
/// ambiguous cases the inside corners are kept apart.
pub const CAP_TABLE: [&[&[u8]]; 16] = [
    &[],
    &[&[0, 4, 7]],
    &[&[4, 1, 5]],
    &[&[0, 1, 5, 7]],
    &[&[5, 2, 6]],
    &[&[0, 4, 7], &[5, 2, 6]],
    &[&[4, 1, 2, 6]],
    &[&[0, 1, 2, 6, 7]],
    &[&[6, 3, 7]],
    &[&[0, 4, 6, 3]],
    &[&[4, 1, 5], &[6, 3, 7]],
    &[&[0, 1, 5, 6, 3]],
    &[&[5, 2, 3, 7]],
    &[&[0, 4, 5, 2, 3]],
    &[&[4, 1, 2, 3, 7]],
    &[&[0, 1, 2, 3]],
];

/// Project a cube case onto one face.
#[inline]
pub fn face_case(case_index: u8, face: usize) -> usize {
    FACE_CORNERS[face]
        .iter()
        .enumerate()
        .fold(0, |acc, (i, &corner)| {
            acc | ((((case_index >> corner) & 1) as usize) << i)
        })
}

/// Triangles of every cube case, as triples of cube edges.
pub fn triangle_table() -> &'static [Vec<[u8; 3]>; 256] {
    static TABLE: OnceLock<[Vec<[u8; 3]>; 256]> = OnceLock::new();
    TABLE.get_or_init(|| std::array::from_fn(|case| case_triangles(case as u8)))
}

/// Build the isosurface of one case from the face caps.
///
/// Every edge-to-edge step of a cap is a segment the isosurface shares with
/// that cap; walking those segments backwards yields the surface loops,
/// oriented away from the inside corners.
fn case_triangles(case_index: u8) -> Vec<[u8; 3]> {
    let mut next: [Option<usize>; 12] = [None; 12];

    for face in 0..FACE_COUNT {
        for polygon in CAP_TABLE[face_case(case_index, face)] {
            let n = polygon.len();
            for i in 0..n {
                let a = polygon[i] as usize;
                let b = polygon[(i + 1) % n] as usize;
                if a >= 4 && b >= 4 {
                    next[FACE_EDGES[face][b - 4]] = Some(FACE_EDGES[face][a - 4]);
                }
            }
        }
    }

    let mut visited = [false; 12];
    let mut triangles = Vec::new();
    for start in 0..12 {
        if visited[start] || next[start].is_none() {
            continue;
        }

        let mut ring = Vec::with_capacity(8);
        let mut edge = start;
        while !visited[edge] {
            visited[edge] = true;
            ring.push(edge as u8);
            match next[edge] {
                Some(following) => edge = following,
                None => break,
            }
        }

        for i in 1..ring.len().saturating_sub(1) {
            triangles.push([ring[0], ring[i], ring[i + 1]]);
        }
    }
    triangles
}

/// Cube edges crossed by the isosurface for a case.
pub fn crossed_edges(case_index: u8) -> impl Iterator<Item = usize> {
    (0..12).filter(move |&edge| {
        let [lo, hi] = EDGE_CORNERS[edge];
        ((case_index >> lo) & 1) != ((case_index >> hi) & 1)
    })
}
