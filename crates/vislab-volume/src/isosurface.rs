//! Isosurface extraction.
//!
//! Each grid cell is split into six tetrahedra around its main diagonal,
//! which gives a crack-free surface without the ambiguous cases of the
//! 256-entry cube table. Vertices on shared grid edges are welded, and
//! vertex normals come from the scalar gradient.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{io_err, Result};
use crate::grid::ScalarVolume;

/// Cube corner offsets `(di, dj, dk)`.
const CORNERS: [[usize; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [1, 1, 0],
    [0, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [1, 1, 1],
    [0, 1, 1],
];

/// Six tetrahedra sharing the 0-6 diagonal.
const TETRAHEDRA: [[usize; 4]; 6] = [
    [0, 5, 1, 6],
    [0, 1, 2, 6],
    [0, 2, 3, 6],
    [0, 3, 7, 6],
    [0, 7, 4, 6],
    [0, 4, 5, 6],
];

/// Indexed triangle mesh in world coordinates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<[f64; 3]>,
    /// Unit normals, one per vertex.
    pub normals: Vec<[f64; 3]>,
    /// Counter-clockwise when seen from the side the normals point to.
    pub triangles: Vec<[usize; 3]>,
}

impl Mesh {
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Axis-aligned bounding box `(min, max)`, `None` when empty.
    pub fn bounds(&self) -> Option<([f64; 3], [f64; 3])> {
        let first = *self.vertices.first()?;
        Some(self.vertices.iter().fold((first, first), |(mut lo, mut hi), v| {
            for a in 0..3 {
                lo[a] = lo[a].min(v[a]);
                hi[a] = hi[a].max(v[a]);
            }
            (lo, hi)
        }))
    }

    pub fn area(&self) -> f64 {
        self.triangles
            .iter()
            .map(|t| 0.5 * norm(face_normal(&self.vertices, t)))
            .sum()
    }

    /// Wavefront OBJ text (1-based indices, `f v//vn`).
    pub fn to_obj(&self) -> String {
        let mut out = String::with_capacity(64 * (self.vertices.len() + self.triangles.len()));
        let _ = writeln!(out, "# vislab isosurface: {} vertices, {} triangles", self.vertices.len(), self.triangles.len());
        for v in &self.vertices {
            let _ = writeln!(out, "v {:.6} {:.6} {:.6}", v[0], v[1], v[2]);
        }
        for n in &self.normals {
            let _ = writeln!(out, "vn {:.6} {:.6} {:.6}", n[0], n[1], n[2]);
        }
        for t in &self.triangles {
            let (a, b, c) = (t[0] + 1, t[1] + 1, t[2] + 1);
            let _ = writeln!(out, "f {a}//{a} {b}//{b} {c}//{c}");
        }
        out
    }

    pub fn write_obj(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_obj()).map_err(io_err(path))?;
        info!("Wrote mesh with {} triangles to {}", self.triangles.len(), path.display());
        Ok(())
    }
}

pub(crate) fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub(crate) fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub(crate) fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

pub(crate) fn norm(a: [f64; 3]) -> f64 {
    dot(a, a).sqrt()
}

pub(crate) fn normalize(a: [f64; 3]) -> [f64; 3] {
    let n = norm(a);
    if n > 1e-12 {
        [a[0] / n, a[1] / n, a[2] / n]
    } else {
        [0.0; 3]
    }
}

fn face_normal(vertices: &[[f64; 3]], t: &[usize; 3]) -> [f64; 3] {
    let (a, b, c) = (vertices[t[0]], vertices[t[1]], vertices[t[2]]);
    cross(sub(b, a), sub(c, a))
}

struct Builder<'a> {
    volume: &'a ScalarVolume,
    isovalue: f64,
    mesh: Mesh,
    /// Grid-point pair → vertex index.
    welded: HashMap<(usize, usize), usize>,
}

impl Builder<'_> {
    /// Vertex where the surface crosses the edge between grid points `a`
    /// and `b` (each `[i, j, k]`).
    fn edge_vertex(&mut self, a: [usize; 3], b: [usize; 3]) -> usize {
        let v = self.volume;
        let (ia, ib) = (v.index(a[0], a[1], a[2]), v.index(b[0], b[1], b[2]));
        let key = (ia.min(ib), ia.max(ib));
        if let Some(&idx) = self.welded.get(&key) {
            return idx;
        }

        let (va, vb) = (v.values[ia], v.values[ib]);
        let t = ((self.isovalue - va) / (vb - va)).clamp(0.0, 1.0);
        let (pa, pb) = (v.position(a[0], a[1], a[2]), v.position(b[0], b[1], b[2]));
        let (ga, gb) = (v.gradient(a[0], a[1], a[2]), v.gradient(b[0], b[1], b[2]));
        let lerp = |x: [f64; 3], y: [f64; 3]| {
            [
                x[0] + (y[0] - x[0]) * t,
                x[1] + (y[1] - x[1]) * t,
                x[2] + (y[2] - x[2]) * t,
            ]
        };
        let g = lerp(ga, gb);

        let idx = self.mesh.vertices.len();
        self.mesh.vertices.push(lerp(pa, pb));
        self.mesh.normals.push(normalize([-g[0], -g[1], -g[2]]));
        self.welded.insert(key, idx);
        idx
    }

    /// Add triangles facing from `inside` towards `outside`, flipping them
    /// together; degenerate triangles are dropped.
    fn polygon(&mut self, tris: &[[usize; 3]], inside: [f64; 3], outside: [f64; 3]) {
        let tris: Vec<[usize; 3]> = tris
            .iter()
            .copied()
            .filter(|t| t[0] != t[1] && t[1] != t[2] && t[0] != t[2])
            .filter(|t| norm(face_normal(&self.mesh.vertices, t)) > 1e-12)
            .collect();
        let mut area = [0.0; 3];
        for t in &tris {
            let n = face_normal(&self.mesh.vertices, t);
            for a in 0..3 {
                area[a] += n[a];
            }
        }
        let flip = dot(area, sub(outside, inside)) < 0.0;
        for mut t in tris {
            if flip {
                t.swap(1, 2);
            }
            self.mesh.triangles.push(t);
        }
    }

    fn tetrahedron(&mut self, corners: [[usize; 3]; 4]) {
        let v = self.volume;
        let mut inside = Vec::with_capacity(4);
        let mut outside = Vec::with_capacity(4);
        for c in corners {
            if v.value(c[0], c[1], c[2]) >= self.isovalue {
                inside.push(c);
            } else {
                outside.push(c);
            }
        }
        let centroid = |points: &[[usize; 3]]| {
            let mut sum = [0.0; 3];
            for p in points {
                let w = v.position(p[0], p[1], p[2]);
                for a in 0..3 {
                    sum[a] += w[a];
                }
            }
            sum.map(|s| s / points.len() as f64)
        };

        match (inside.len(), outside.len()) {
            (1, 3) | (3, 1) => {
                let (lone, rest) = if inside.len() == 1 {
                    (inside[0], &outside)
                } else {
                    (outside[0], &inside)
                };
                let tri = [
                    self.edge_vertex(lone, rest[0]),
                    self.edge_vertex(lone, rest[1]),
                    self.edge_vertex(lone, rest[2]),
                ];
                self.polygon(&[tri], centroid(&inside), centroid(&outside));
            }
            (2, 2) => {
                let (a, b) = (inside[0], inside[1]);
                let (c, d) = (outside[0], outside[1]);
                let ac = self.edge_vertex(a, c);
                let ad = self.edge_vertex(a, d);
                let bd = self.edge_vertex(b, d);
                let bc = self.edge_vertex(b, c);
                let (cin, cout) = (centroid(&inside), centroid(&outside));
                self.polygon(&[[ac, ad, bd], [ac, bd, bc]], cin, cout);
            }
            _ => {}
        }
    }
}

/// Extract the surface where `volume` crosses `isovalue`.
///
/// Grid points with values `>= isovalue` count as inside; normals point
/// towards decreasing values. Output order depends only on the input.
pub fn extract_isosurface(volume: &ScalarVolume, isovalue: f64) -> Mesh {
    let [nx, ny, nz] = volume.dims;
    let mut builder = Builder {
        volume,
        isovalue,
        mesh: Mesh::default(),
        welded: HashMap::new(),
    };
    if nx < 2 || ny < 2 || nz < 2 {
        return builder.mesh;
    }

    for k in 0..nz - 1 {
        for j in 0..ny - 1 {
            for i in 0..nx - 1 {
                let cube = CORNERS.map(|[di, dj, dk]| [i + di, j + dj, k + dk]);
                let values = cube.map(|c| volume.value(c[0], c[1], c[2]));
                let above = values.iter().filter(|&&v| v >= isovalue).count();
                if above == 0 || above == 8 {
                    continue;
                }
                for tet in TETRAHEDRA {
                    builder.tetrahedron(tet.map(|c| cube[c]));
                }
            }
        }
    }

    let mut mesh = builder.mesh;
    fill_missing_normals(&mut mesh);
    debug!(
        "Isosurface {} has {} vertices and {} triangles",
        isovalue,
        mesh.vertices.len(),
        mesh.triangles.len()
    );
    mesh
}

/// Vertices in flat regions get the average normal of their faces.
fn fill_missing_normals(mesh: &mut Mesh) {
    if mesh.normals.iter().all(|n| norm(*n) > 0.0) {
        return;
    }
    let mut acc = vec![[0.0; 3]; mesh.vertices.len()];
    for t in &mesh.triangles {
        let n = face_normal(&mesh.vertices, t);
        for &v in t {
            for a in 0..3 {
                acc[v][a] += n[a];
            }
        }
    }
    for (normal, sum) in mesh.normals.iter_mut().zip(acc) {
        if norm(*normal) == 0.0 {
            *normal = normalize(sum);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn field(n: usize, f: impl Fn(f64, f64, f64) -> f64) -> ScalarVolume {
        let mut values = Vec::with_capacity(n * n * n);
        for k in 0..n {
            for j in 0..n {
                for i in 0..n {
                    values.push(f(i as f64, j as f64, k as f64));
                }
            }
        }
        ScalarVolume::new([n; 3], [1.0; 3], [0.0; 3], values).unwrap()
    }

    /// High inside a ball of radius 3.5 around (4, 4, 4).
    fn ball() -> ScalarVolume {
        field(9, |x, y, z| 12.25 - ((x - 4.0).powi(2) + (y - 4.0).powi(2) + (z - 4.0).powi(2)))
    }

    #[test]
    fn test_plane() {
        let volume = field(2, |x, _, _| x);
        let mesh = extract_isosurface(&volume, 0.5);
        assert!(!mesh.is_empty());
        assert_relative_eq!(mesh.area(), 1.0, epsilon = 1e-9);
        for v in &mesh.vertices {
            assert_relative_eq!(v[0], 0.5, epsilon = 1e-12);
        }
        for n in &mesh.normals {
            assert_relative_eq!(n[0], -1.0, epsilon = 1e-9);
        }
        for t in &mesh.triangles {
            assert!(face_normal(&mesh.vertices, t)[0] < 0.0);
        }
    }

    #[test]
    fn test_ball_is_closed_and_oriented() {
        let mesh = extract_isosurface(&ball(), 0.0);
        let mut directed = HashSet::new();
        for t in &mesh.triangles {
            for e in [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])] {
                // Each directed edge used once, its reverse by the neighbour.
                assert!(directed.insert(e), "edge {e:?} repeated");
            }
        }
        for &(a, b) in &directed {
            assert!(directed.contains(&(b, a)), "boundary edge ({a}, {b})");
        }

        for (v, n) in mesh.vertices.iter().zip(&mesh.normals) {
            let r = norm(sub(*v, [4.0; 3]));
            assert!((r - 3.5).abs() < 0.3, "vertex at radius {r}");
            assert!(dot(*n, sub(*v, [4.0; 3])) > 0.0);
        }
        let (lo, hi) = mesh.bounds().unwrap();
        assert!(lo.iter().all(|&c| c > 0.0) && hi.iter().all(|&c| c < 8.0));
        let area = mesh.area();
        assert!((area - 4.0 * std::f64::consts::PI * 12.25).abs() < 15.0, "area {area}");
    }

    #[test]
    fn test_deterministic() {
        let volume = ball();
        assert_eq!(extract_isosurface(&volume, 1.0), extract_isosurface(&volume, 1.0));
    }

    #[test]
    fn test_no_crossing() {
        let volume = ball();
        assert!(extract_isosurface(&volume, 100.0).is_empty());
        assert!(extract_isosurface(&volume, -1000.0).is_empty());
        assert_eq!(Mesh::default().bounds(), None);
    }

    #[test]
    fn test_write_obj() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plane.obj");
        let mesh = extract_isosurface(&field(2, |x, _, _| x), 0.5);
        mesh.write_obj(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().filter(|l| l.starts_with("v ")).count(), mesh.vertices.len());
        assert_eq!(text.lines().filter(|l| l.starts_with("vn ")).count(), mesh.normals.len());
        assert_eq!(text.lines().filter(|l| l.starts_with("f ")).count(), mesh.triangles.len());
        assert!(text.contains("f 1//1"));
    }
}
