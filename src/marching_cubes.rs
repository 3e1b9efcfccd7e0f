use crate::enums::ExtractionMode;
use crate::tables::{CORNER_OFFSETS, EDGE_CORNERS, TRI_TABLE};

use ndarray::Array3;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("volume must be at least 2x2x2, got {0}x{1}x{2}")]
    DegenerateVolume(usize, usize, usize),

    #[error("no surface crosses the iso-level")]
    EmptyMesh,

    #[error("extraction cancelled")]
    Cancelled,
}

/// An indexed triangle mesh.
///
/// Vertex positions are continuous index-space coordinates along
/// (axis 0, axis 1, axis 2), scaled per axis by the voxel spacing. Every
/// triangle index lies in `[0, vertices.len())`; crossing vertices are shared
/// between the triangles of neighboring cubes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<[f32; 3]>,
    pub triangles: Vec<[u32; 3]>,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }
}

/// Cooperative cancellation flag for long extractions.
///
/// Clone the token and hand it to the extraction call; `cancel()` from any
/// thread makes the extractor return [`ExtractError::Cancelled`] at its next
/// per-slab check without exposing a partial mesh.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Extract the iso-surface of `volume` above `threshold` as a triangle mesh.
///
/// In [`ExtractionMode::Binary`] the field is the {0, 1} binarization at
/// `value > threshold` marched at level 0, which pins crossing vertices to
/// outside sample positions: a blocky surface at voxel resolution, but exact
/// and deterministic. [`ExtractionMode::Raw`] marches the intensities at
/// `level = threshold`, interpolating crossings along cube edges.
///
/// The scan runs one cube layer beyond every face of the volume with
/// out-of-range samples treated as outside, so surfaces that touch the
/// volume boundary come out closed. Cubes are processed in row-major order
/// and vertices are deduplicated per grid edge, making the output fully
/// deterministic: identical inputs yield identical vertex and triangle
/// sequences.
///
/// # Errors
///
/// Returns [`ExtractError::DegenerateVolume`] when any dimension is below 2,
/// [`ExtractError::EmptyMesh`] when no cube edge crosses the level, and
/// [`ExtractError::Cancelled`] when the token fires.
pub fn extract_surface(
    volume: &Array3<f32>,
    threshold: f32,
    mode: ExtractionMode,
    spacing: (f32, f32, f32),
    cancel: Option<&CancelToken>,
) -> Result<Mesh, ExtractError> {
    let (d0, d1, d2) = volume.dim();
    if d0 < 2 || d1 < 2 || d2 < 2 {
        return Err(ExtractError::DegenerateVolume(d0, d1, d2));
    }

    let level = match mode {
        ExtractionMode::Binary => 0.0,
        ExtractionMode::Raw => threshold,
    };
    // Out-of-range samples read as the level itself, which classifies as
    // outside and anchors boundary crossings at the padding corner.
    let sample = |i0: i32, i1: i32, i2: i32| -> f32 {
        if i0 < 0 || i1 < 0 || i2 < 0 || i0 >= d0 as i32 || i1 >= d1 as i32 || i2 >= d2 as i32 {
            return level;
        }
        let raw = volume[[i0 as usize, i1 as usize, i2 as usize]];
        match mode {
            ExtractionMode::Binary => {
                if raw > threshold {
                    1.0
                } else {
                    0.0
                }
            }
            ExtractionMode::Raw => raw,
        }
    };

    let mut mesh = Mesh::default();
    // One shared vertex per crossing grid edge, keyed by the edge's lower
    // corner and axis.
    let mut edge_vertices: HashMap<(i32, i32, i32, u8), u32> = HashMap::new();
    let mut corner_values = [0.0f32; 8];

    for i0 in -1..d0 as i32 {
        if let Some(token) = cancel {
            if token.is_cancelled() {
                return Err(ExtractError::Cancelled);
            }
        }
        for i1 in -1..d1 as i32 {
            for i2 in -1..d2 as i32 {
                let mut config = 0usize;
                for (corner, offset) in CORNER_OFFSETS.iter().enumerate() {
                    let value = sample(i0 + offset[0], i1 + offset[1], i2 + offset[2]);
                    corner_values[corner] = value;
                    if value <= level {
                        config |= 1 << corner;
                    }
                }

                let row = &TRI_TABLE[config];
                let mut t = 0;
                while row[t] >= 0 {
                    // Table winding is reversed so facet normals point away
                    // from the region above the level.
                    let a = crossing_vertex(
                        row[t] as usize,
                        (i0, i1, i2),
                        &corner_values,
                        level,
                        spacing,
                        &mut edge_vertices,
                        &mut mesh.vertices,
                    );
                    let b = crossing_vertex(
                        row[t + 2] as usize,
                        (i0, i1, i2),
                        &corner_values,
                        level,
                        spacing,
                        &mut edge_vertices,
                        &mut mesh.vertices,
                    );
                    let c = crossing_vertex(
                        row[t + 1] as usize,
                        (i0, i1, i2),
                        &corner_values,
                        level,
                        spacing,
                        &mut edge_vertices,
                        &mut mesh.vertices,
                    );
                    mesh.triangles.push([a, b, c]);
                    t += 3;
                }
            }
        }
    }

    if mesh.is_empty() {
        return Err(ExtractError::EmptyMesh);
    }
    Ok(mesh)
}

/// Vertex index for the surface crossing on one cube edge, interpolating and
/// appending a new vertex on first encounter.
fn crossing_vertex(
    edge: usize,
    cube: (i32, i32, i32),
    corner_values: &[f32; 8],
    level: f32,
    spacing: (f32, f32, f32),
    edge_vertices: &mut HashMap<(i32, i32, i32, u8), u32>,
    vertices: &mut Vec<[f32; 3]>,
) -> u32 {
    let (corner_a, corner_b) = EDGE_CORNERS[edge];
    let offset_a = CORNER_OFFSETS[corner_a];
    let offset_b = CORNER_OFFSETS[corner_b];
    let ga = [
        cube.0 + offset_a[0],
        cube.1 + offset_a[1],
        cube.2 + offset_a[2],
    ];
    let gb = [
        cube.0 + offset_b[0],
        cube.1 + offset_b[1],
        cube.2 + offset_b[2],
    ];

    let (low, axis) = if ga <= gb {
        (ga, differing_axis(offset_a, offset_b))
    } else {
        (gb, differing_axis(offset_a, offset_b))
    };
    let key = (low[0], low[1], low[2], axis);

    if let Some(&index) = edge_vertices.get(&key) {
        return index;
    }

    let va = corner_values[corner_a];
    let vb = corner_values[corner_b];
    let t = if (vb - va).abs() < 1e-12 {
        0.5
    } else {
        (level - va) / (vb - va)
    };

    let position = [
        (ga[0] as f32 + t * (gb[0] - ga[0]) as f32) * spacing.0,
        (ga[1] as f32 + t * (gb[1] - ga[1]) as f32) * spacing.1,
        (ga[2] as f32 + t * (gb[2] - ga[2]) as f32) * spacing.2,
    ];

    let index = vertices.len() as u32;
    vertices.push(position);
    edge_vertices.insert(key, index);
    index
}

fn differing_axis(a: [i32; 3], b: [i32; 3]) -> u8 {
    if a[0] != b[0] {
        0
    } else if a[1] != b[1] {
        1
    } else {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const UNIT: (f32, f32, f32) = (1.0, 1.0, 1.0);

    /// 4x4x4 volume, zero except a solid 2x2x2 block of 10s at one corner.
    fn corner_block() -> Array3<f32> {
        Array3::from_shape_fn((4, 4, 4), |(i, j, k)| {
            if i < 2 && j < 2 && k < 2 { 10.0 } else { 0.0 }
        })
    }

    /// Counts of triangles incident to each undirected index edge.
    fn undirected_edge_counts(mesh: &Mesh) -> HashMap<(u32, u32), usize> {
        let mut counts = HashMap::new();
        for &[a, b, c] in &mesh.triangles {
            for (u, v) in [(a, b), (b, c), (c, a)] {
                let key = (u.min(v), u.max(v));
                *counts.entry(key).or_insert(0) += 1;
            }
        }
        counts
    }

    #[test]
    fn corner_block_extracts_closed_surface() {
        let volume = corner_block();

        let mesh =
            extract_surface(&volume, 5.0, ExtractionMode::Binary, UNIT, None).unwrap();

        // 8 inside samples expose 24 boundary grid edges; the shell around
        // them triangulates into 8 corner + 24 edge + 12 face triangles.
        assert_eq!(mesh.vertex_count(), 24);
        assert_eq!(mesh.triangle_count(), 44);

        // Watertight: every undirected edge is shared by exactly two
        // triangles, so the surface has no boundary holes.
        for (_, count) in undirected_edge_counts(&mesh) {
            assert_eq!(count, 2);
        }
    }

    #[test]
    fn winding_is_consistent() {
        let volume = corner_block();

        let mesh =
            extract_surface(&volume, 5.0, ExtractionMode::Binary, UNIT, None).unwrap();

        // Each directed edge appears exactly once: neighboring triangles
        // traverse their shared edge in opposite directions.
        let mut directed = HashMap::new();
        for &[a, b, c] in &mesh.triangles {
            for pair in [(a, b), (b, c), (c, a)] {
                *directed.entry(pair).or_insert(0) += 1;
            }
        }
        assert!(directed.values().all(|&count| count == 1));
    }

    #[test]
    fn triangle_indices_are_in_range() {
        let volume = corner_block();

        let mesh =
            extract_surface(&volume, 5.0, ExtractionMode::Binary, UNIT, None).unwrap();

        let len = mesh.vertex_count() as u32;
        assert!(
            mesh.triangles
                .iter()
                .all(|tri| tri.iter().all(|&index| index < len))
        );
    }

    #[test]
    fn binary_mode_pins_vertices_to_sample_positions() {
        let volume = corner_block();

        let mesh =
            extract_surface(&volume, 5.0, ExtractionMode::Binary, UNIT, None).unwrap();

        for vertex in &mesh.vertices {
            for coord in vertex {
                assert_eq!(coord.fract(), 0.0, "blocky vertex at {vertex:?}");
            }
        }
    }

    #[test]
    fn raw_mode_interpolates_crossings() {
        // Two layers, 0 then 10: the level-5 surface crosses axis 0 halfway.
        let volume = Array3::from_shape_fn((2, 2, 2), |(i, _, _)| i as f32 * 10.0);

        let mesh = extract_surface(&volume, 5.0, ExtractionMode::Raw, UNIT, None).unwrap();

        assert!(
            mesh.vertices
                .iter()
                .any(|vertex| (vertex[0] - 0.5).abs() < 1e-6)
        );
    }

    #[test]
    fn spacing_scales_vertex_positions() {
        let volume = corner_block();

        let unit = extract_surface(&volume, 5.0, ExtractionMode::Binary, UNIT, None).unwrap();
        let scaled =
            extract_surface(&volume, 5.0, ExtractionMode::Binary, (2.0, 1.0, 0.5), None).unwrap();

        assert_eq!(unit.triangles, scaled.triangles);
        for (a, b) in unit.vertices.iter().zip(&scaled.vertices) {
            assert_eq!(a[0] * 2.0, b[0]);
            assert_eq!(a[1], b[1]);
            assert_eq!(a[2] * 0.5, b[2]);
        }
    }

    #[test]
    fn all_zero_volume_yields_empty_mesh() {
        let volume = Array3::<f32>::zeros((4, 4, 4));

        let result = extract_surface(&volume, 5.0, ExtractionMode::Binary, UNIT, None);

        assert!(matches!(result, Err(ExtractError::EmptyMesh)));
    }

    #[test]
    fn thin_volume_is_degenerate() {
        let volume = Array3::<f32>::zeros((1, 4, 4));

        let result = extract_surface(&volume, 0.0, ExtractionMode::Binary, UNIT, None);

        assert!(matches!(
            result,
            Err(ExtractError::DegenerateVolume(1, 4, 4))
        ));
    }

    #[test]
    fn extraction_is_deterministic() {
        let volume = Array3::from_shape_fn((5, 4, 6), |(i, j, k)| {
            ((i * 31 + j * 17 + k * 7) % 13) as f32
        });

        let first = extract_surface(&volume, 6.0, ExtractionMode::Binary, UNIT, None).unwrap();
        let second = extract_surface(&volume, 6.0, ExtractionMode::Binary, UNIT, None).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn cancelled_token_aborts_extraction() {
        let volume = corner_block();
        let token = CancelToken::new();
        token.cancel();

        let result = extract_surface(&volume, 5.0, ExtractionMode::Binary, UNIT, Some(&token));

        assert!(matches!(result, Err(ExtractError::Cancelled)));
    }
}
