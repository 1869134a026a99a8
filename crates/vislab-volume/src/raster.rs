//! Orthographic z-buffer rasteriser for isosurface meshes.

use tracing::debug;
use vislab_core::colors::Rgb;

use crate::error::{Result, VolumeError};
use crate::image::RgbImage;
use crate::isosurface::Mesh;
use crate::raycast::BACKGROUND;
use crate::shading::{Lighting, ViewAxis};

/// Fraction of the image left empty around the mesh.
const MARGIN: f64 = 0.05;

#[derive(Debug, Clone, PartialEq)]
pub struct MeshRenderSettings {
    pub width: usize,
    pub height: usize,
    pub color: Rgb,
    /// Surface opacity in 0..=1, blended over the background.
    pub opacity: f64,
    pub lighting: Lighting,
    pub axis: ViewAxis,
    pub background: Rgb,
}

impl Default for MeshRenderSettings {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            color: Rgb::new(250, 128, 114),
            opacity: 0.5,
            lighting: Lighting::default(),
            axis: ViewAxis::default(),
            background: BACKGROUND,
        }
    }
}

/// Screen-space vertex: pixel coordinates plus depth along the view axis.
#[derive(Debug, Clone, Copy)]
struct Projected {
    x: f64,
    y: f64,
    depth: f64,
}

fn edge(a: Projected, b: Projected, px: f64, py: f64) -> f64 {
    (b.x - a.x) * (py - a.y) - (b.y - a.y) * (px - a.x)
}

/// Render `mesh` scaled to fit the image, viewed along `settings.axis`.
///
/// Each pixel shows the nearest fragment, Phong-shaded from the
/// interpolated vertex normal and blended over the background with the
/// surface opacity.
pub fn render_mesh(mesh: &Mesh, settings: &MeshRenderSettings) -> Result<RgbImage> {
    if settings.width == 0 || settings.height == 0 {
        return Err(VolumeError::InvalidParameter("image size must be positive".into()));
    }
    if !(0.0..=1.0).contains(&settings.opacity) {
        return Err(VolumeError::InvalidParameter(format!(
            "opacity must be within 0..=1, got {}",
            settings.opacity
        )));
    }
    let (w, h) = (settings.width, settings.height);
    let mut image = RgbImage::new(w, h, settings.background);
    let Some((lo, hi)) = mesh.bounds() else {
        return Ok(image);
    };

    let (u, v) = settings.axis.plane();
    let d = settings.axis.index();
    let extent_u = (hi[u] - lo[u]).max(1e-9);
    let extent_v = (hi[v] - lo[v]).max(1e-9);
    let scale = (1.0 - 2.0 * MARGIN) * ((w - 1).max(1) as f64 / extent_u).min((h - 1).max(1) as f64 / extent_v);
    let (cu, cv) = ((lo[u] + hi[u]) / 2.0, (lo[v] + hi[v]) / 2.0);
    let projected: Vec<Projected> = mesh
        .vertices
        .iter()
        .map(|p| Projected {
            x: (w - 1) as f64 / 2.0 + (p[u] - cu) * scale,
            // Image rows grow downwards, world `v` upwards.
            y: (h - 1) as f64 / 2.0 - (p[v] - cv) * scale,
            depth: p[d],
        })
        .collect();

    let mut depth = vec![f64::INFINITY; w * h];
    let mut normals = vec![[0.0; 3]; w * h];
    for tri in &mesh.triangles {
        let [a, b, c] = tri.map(|i| projected[i]);
        let area = edge(a, b, c.x, c.y);
        if area.abs() < 1e-12 {
            continue;
        }
        let x0 = a.x.min(b.x).min(c.x).floor().max(0.0) as usize;
        let x1 = (a.x.max(b.x).max(c.x).ceil() as usize).min(w - 1);
        let y0 = a.y.min(b.y).min(c.y).floor().max(0.0) as usize;
        let y1 = (a.y.max(b.y).max(c.y).ceil() as usize).min(h - 1);
        for py in y0..=y1 {
            for px in x0..=x1 {
                let (fx, fy) = (px as f64, py as f64);
                // Barycentric weights, valid for either winding.
                let wa = edge(b, c, fx, fy) / area;
                let wb = edge(c, a, fx, fy) / area;
                let wc = edge(a, b, fx, fy) / area;
                if wa < -1e-9 || wb < -1e-9 || wc < -1e-9 {
                    continue;
                }
                let z = wa * a.depth + wb * b.depth + wc * c.depth;
                let idx = py * w + px;
                if z < depth[idx] {
                    depth[idx] = z;
                    let (na, nb, nc) = (mesh.normals[tri[0]], mesh.normals[tri[1]], mesh.normals[tri[2]]);
                    normals[idx] = [
                        wa * na[0] + wb * nb[0] + wc * nc[0],
                        wa * na[1] + wb * nb[1] + wc * nc[1],
                        wa * na[2] + wb * nb[2] + wc * nc[2],
                    ];
                }
            }
        }
    }

    let to_eye = settings.axis.to_eye();
    let base = settings.color.to_unit();
    let bg = settings.background.to_unit();
    let mut covered = 0usize;
    for py in 0..h {
        for px in 0..w {
            let idx = py * w + px;
            if depth[idx].is_infinite() {
                continue;
            }
            covered += 1;
            let lit = settings.lighting.shade_unit(base, normals[idx], to_eye);
            let a = settings.opacity;
            image.set(
                px,
                py,
                Rgb::from_unit([
                    a * lit[0] + (1.0 - a) * bg[0],
                    a * lit[1] + (1.0 - a) * bg[1],
                    a * lit[2] + (1.0 - a) * bg[2],
                ]),
            );
        }
    }
    debug!(
        "Rasterised {} triangles, {} of {} pixels covered",
        mesh.triangles.len(),
        covered,
        w * h
    );
    Ok(image)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Unit square in the x/z plane facing -y, split into two triangles.
    fn square() -> Mesh {
        Mesh {
            vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 0.0, 1.0], [0.0, 0.0, 1.0]],
            normals: vec![[0.0, -1.0, 0.0]; 4],
            triangles: vec![[0, 1, 2], [0, 2, 3]],
        }
    }

    fn settings(lighting: Lighting, opacity: f64) -> MeshRenderSettings {
        MeshRenderSettings {
            width: 20,
            height: 20,
            color: Rgb::new(200, 100, 50),
            opacity,
            lighting,
            ..Default::default()
        }
    }

    #[test]
    fn test_opaque_diffuse_head_on() {
        let img = render_mesh(&square(), &settings(Lighting::new(0.0, 1.0, 0.0), 1.0)).unwrap();
        assert_eq!(img.get(10, 10), Rgb::new(200, 100, 50));
        // Margin stays background.
        assert_eq!(img.get(0, 0), BACKGROUND);
    }

    #[test]
    fn test_half_opacity_blends_background() {
        let img = render_mesh(&square(), &settings(Lighting::new(1.0, 0.0, 0.0), 0.5)).unwrap();
        let c = img.get(10, 10);
        assert_eq!(c.r, ((200.0 / 255.0 * 0.5 + 76.0 / 255.0 * 0.5) * 255.0_f64).round() as u8);
    }

    #[test]
    fn test_nearest_fragment_wins() {
        // A small triangle in front of (smaller y than) the square.
        let mut mesh = square();
        mesh.vertices.extend([[0.4, -1.0, 0.4], [0.6, -1.0, 0.4], [0.6, -1.0, 0.6]]);
        mesh.normals.extend([[1.0, 0.0, 0.0]; 3]);
        mesh.triangles.push([4, 5, 6]);
        let img = render_mesh(&mesh, &settings(Lighting::new(0.0, 1.0, 0.0), 1.0)).unwrap();
        // The front triangle's normal is edge-on to the light: black.
        assert_eq!(img.get(11, 10), Rgb::new(0, 0, 0));
        assert_eq!(img.get(2, 17), Rgb::new(200, 100, 50));
    }

    #[test]
    fn test_empty_mesh_and_bad_settings() {
        let img = render_mesh(&Mesh::default(), &MeshRenderSettings::default()).unwrap();
        assert!(img.pixels.iter().all(|&p| p == BACKGROUND));
        assert!(render_mesh(&square(), &settings(Lighting::default(), 1.5)).is_err());
    }
}
