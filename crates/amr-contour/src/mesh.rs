//! Output mesh and the builder that accumulates it during a pass.

use hashbrown::HashMap;
use nalgebra::Point3;

/// A named array with one value per output point.
#[derive(Debug, Clone, PartialEq)]
pub struct PointArray {
    pub name: String,
    pub values: Vec<f64>,
}

/// Polygon mesh extracted at one iso-value.
///
/// Polygons are stored as offsets into a flat connectivity list: polygon `i`
/// uses `connectivity[offsets[i]..offsets[i + 1]]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ContourMesh {
    /// Iso-value the mesh was extracted at.
    pub iso_value: f64,

    /// Point positions.
    pub points: Vec<Point3<f64>>,

    /// Polygon start offsets, one more than the polygon count.
    pub offsets: Vec<u32>,

    /// Point indices of all polygons.
    pub connectivity: Vec<u32>,

    /// Id of the block that generated each polygon.
    pub block_ids: Vec<usize>,

    /// Connected-component id of each polygon, when labeling ran.
    pub fragment_ids: Option<Vec<u32>>,

    /// Arrays interpolated onto the points.
    pub point_data: Vec<PointArray>,
}

impl ContourMesh {
    /// An empty mesh.
    pub fn empty(iso_value: f64) -> Self {
        Self {
            iso_value,
            points: Vec::new(),
            offsets: vec![0],
            connectivity: Vec::new(),
            block_ids: Vec::new(),
            fragment_ids: None,
            point_data: Vec::new(),
        }
    }

    #[inline]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn polygon_count(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.polygon_count() == 0
    }

    /// Point indices of polygon `i`.
    #[inline]
    pub fn polygon(&self, i: usize) -> &[u32] {
        &self.connectivity[self.offsets[i] as usize..self.offsets[i + 1] as usize]
    }

    /// Iterate over all polygons.
    pub fn polygons(&self) -> impl Iterator<Item = &[u32]> + '_ {
        self.offsets
            .windows(2)
            .map(move |w| &self.connectivity[w[0] as usize..w[1] as usize])
    }

    /// Number of polygons with three points.
    pub fn triangle_count(&self) -> usize {
        self.polygons().filter(|p| p.len() == 3).count()
    }

    /// Look up an interpolated point array.
    pub fn point_array(&self, name: &str) -> Option<&PointArray> {
        self.point_data.iter().find(|a| a.name == name)
    }

    /// Number of distinct fragments, when labeling ran.
    pub fn fragment_count(&self) -> Option<usize> {
        self.fragment_ids
            .as_ref()
            .map(|ids| ids.iter().copied().max().map_or(0, |m| m as usize + 1))
    }

    /// Use count of every undirected polygon edge.
    pub fn edge_use_counts(&self) -> HashMap<(u32, u32), usize> {
        let mut counts: HashMap<(u32, u32), usize> = HashMap::new();
        for polygon in self.polygons() {
            let n = polygon.len();
            for i in 0..n {
                let a = polygon[i];
                let b = polygon[(i + 1) % n];
                if a == b {
                    continue;
                }
                let key = if a < b { (a, b) } else { (b, a) };
                *counts.entry(key).or_default() += 1;
            }
        }
        counts
    }

    /// Edges used by exactly one polygon.
    pub fn boundary_edge_count(&self) -> usize {
        self.edge_use_counts().values().filter(|&&c| c == 1).count()
    }

    /// True when every edge is shared by at least two polygons.
    pub fn is_watertight(&self) -> bool {
        self.boundary_edge_count() == 0
    }

    /// Enclosed volume, positive when polygons face away from the inside.
    ///
    /// Only meaningful for a closed mesh.
    pub fn signed_volume(&self) -> f64 {
        let mut volume = 0.0;
        for polygon in self.polygons() {
            if polygon.len() < 3 {
                continue;
            }
            let p0 = self.points[polygon[0] as usize].coords;
            for i in 1..polygon.len() - 1 {
                let p1 = self.points[polygon[i] as usize].coords;
                let p2 = self.points[polygon[i + 1] as usize].coords;
                volume += p0.dot(&p1.cross(&p2));
            }
        }
        volume / 6.0
    }

    /// Axis-aligned bounds of the points.
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let first = self.points.first()?;
        let mut min = *first;
        let mut max = *first;
        for p in &self.points[1..] {
            min = min.inf(p);
            max = max.sup(p);
        }
        Some((min, max))
    }

    /// Summary of the mesh topology.
    pub fn report(&self) -> MeshReport {
        let counts = self.edge_use_counts();
        let boundary_edge_count = counts.values().filter(|&&c| c == 1).count();
        let non_manifold_edge_count = counts.values().filter(|&&c| c > 2).count();
        MeshReport {
            iso_value: self.iso_value,
            point_count: self.point_count(),
            polygon_count: self.polygon_count(),
            triangle_count: self.triangle_count(),
            boundary_edge_count,
            non_manifold_edge_count,
            is_watertight: boundary_edge_count == 0,
            fragment_count: self.fragment_count(),
            bounds: self.bounds(),
        }
    }
}

/// Topology summary of a [`ContourMesh`].
#[derive(Debug, Clone)]
pub struct MeshReport {
    pub iso_value: f64,
    pub point_count: usize,
    pub polygon_count: usize,
    pub triangle_count: usize,
    /// Edges with one adjacent polygon.
    pub boundary_edge_count: usize,
    /// Edges with more than two adjacent polygons.
    pub non_manifold_edge_count: usize,
    pub is_watertight: bool,
    pub fragment_count: Option<usize>,
    pub bounds: Option<(Point3<f64>, Point3<f64>)>,
}

impl std::fmt::Display for MeshReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Contour Report (iso = {}):", self.iso_value)?;
        writeln!(f, "  Points: {}", self.point_count)?;
        writeln!(
            f,
            "  Polygons: {} ({} triangles)",
            self.polygon_count, self.triangle_count
        )?;
        if let Some(count) = self.fragment_count {
            writeln!(f, "  Fragments: {}", count)?;
        }
        if let Some((min, max)) = &self.bounds {
            writeln!(
                f,
                "  Bounds: [{:.3}, {:.3}, {:.3}] to [{:.3}, {:.3}, {:.3}]",
                min.x, min.y, min.z, max.x, max.y, max.z
            )?;
        }
        writeln!(
            f,
            "  Watertight: {} (boundary edges: {})",
            if self.is_watertight { "yes" } else { "NO" },
            self.boundary_edge_count
        )?;
        write!(
            f,
            "  Non-manifold edges: {}",
            self.non_manifold_edge_count
        )
    }
}

/// Accumulates points and polygons for one block or one pass.
///
/// Nothing added is ever removed; per-block builders are concatenated with
/// [`append`](Self::append) in block order.
#[derive(Debug, Clone, Default)]
pub struct MeshBuilder {
    points: Vec<Point3<f64>>,
    attributes: Vec<Vec<f64>>,
    offsets: Vec<u32>,
    connectivity: Vec<u32>,
    block_ids: Vec<usize>,
}

impl MeshBuilder {
    /// A builder for points carrying `attribute_count` interpolated values.
    pub fn new(attribute_count: usize) -> Self {
        Self {
            points: Vec::new(),
            attributes: vec![Vec::new(); attribute_count],
            offsets: vec![0],
            connectivity: Vec::new(),
            block_ids: Vec::new(),
        }
    }

    /// Add a point and return its index.
    ///
    /// `attributes` holds one value per interpolated array; missing trailing
    /// values are stored as NaN.
    pub fn add_point(&mut self, position: Point3<f64>, attributes: &[f64]) -> u32 {
        let id = self.points.len() as u32;
        self.points.push(position);
        for (i, values) in self.attributes.iter_mut().enumerate() {
            values.push(attributes.get(i).copied().unwrap_or(f64::NAN));
        }
        id
    }

    /// Add a triangle generated by `block_id`.
    #[inline]
    pub fn add_triangle(&mut self, points: [u32; 3], block_id: usize) {
        self.add_polygon(&points, block_id);
    }

    /// Add a polygon generated by `block_id`.
    pub fn add_polygon(&mut self, points: &[u32], block_id: usize) {
        self.connectivity.extend_from_slice(points);
        self.offsets.push(self.connectivity.len() as u32);
        self.block_ids.push(block_id);
    }

    /// Move everything from `other` to the end of this builder.
    pub fn append(&mut self, other: MeshBuilder) {
        let shift = self.points.len() as u32;
        let base = self.connectivity.len() as u32;
        self.points.extend(other.points);
        for (mine, theirs) in self.attributes.iter_mut().zip(other.attributes) {
            mine.extend(theirs);
        }
        self.connectivity
            .extend(other.connectivity.into_iter().map(|p| p + shift));
        self.offsets
            .extend(other.offsets.into_iter().skip(1).map(|o| o + base));
        self.block_ids.extend(other.block_ids);
    }

    #[inline]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn polygon_count(&self) -> usize {
        self.block_ids.len()
    }

    /// Position of point `id`.
    #[inline]
    pub fn point(&self, id: u32) -> Point3<f64> {
        self.points[id as usize]
    }

    /// Turn the accumulated geometry into a mesh, naming the attribute arrays.
    pub fn finish(self, iso_value: f64, attribute_names: &[String]) -> ContourMesh {
        let point_data = attribute_names
            .iter()
            .cloned()
            .zip(self.attributes)
            .map(|(name, values)| PointArray { name, values })
            .collect();
        ContourMesh {
            iso_value,
            points: self.points,
            offsets: self.offsets,
            connectivity: self.connectivity,
            block_ids: self.block_ids,
            fragment_ids: None,
            point_data,
        }
    }
}
