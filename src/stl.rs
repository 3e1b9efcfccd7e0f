//! STL (stereolithography) serialization of extracted meshes.
//!
//! Both ASCII and binary flavors are supported, along with readers for each
//! so exported surfaces can be verified to round-trip. ASCII output follows
//! the interchange grammar exactly: a `solid`/`endsolid` wrapper and one
//! `facet normal` / `outer loop` / three `vertex` lines / `endloop` /
//! `endfacet` block per triangle.
//!
//! Facet normals are recomputed from the triangle's vertices (normalized
//! cross product of two edges, in the triangle's index order); degenerate
//! triangles emit a zero normal instead of dividing by zero.

use crate::marching_cubes::Mesh;

use std::io::{BufRead, Read, Write};
use thiserror::Error;

/// Fixed filename convention for exported surfaces.
pub const EXPORT_FILENAME: &str = "segmentation.stl";

/// Content type offered alongside the exported byte stream.
pub const EXPORT_CONTENT_TYPE: &str = "application/octet-stream";

/// STL binary header size in bytes.
const HEADER_SIZE: usize = 80;

/// Size of one triangle record in binary STL (normal + 3 vertices + attribute).
const TRIANGLE_SIZE: usize = 50;

#[derive(Debug, Error)]
pub enum StlError {
    #[error("mesh has no triangles")]
    EmptyMesh,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse float: {0}")]
    ParseFloat(#[from] std::num::ParseFloatError),

    #[error("malformed STL: {0}")]
    Malformed(String),
}

/// Serialize the mesh as ASCII STL.
///
/// # Errors
///
/// Returns [`StlError::EmptyMesh`] for a mesh without triangles, otherwise
/// propagates writer errors.
pub fn write_ascii<W: Write>(mesh: &Mesh, writer: &mut W) -> Result<(), StlError> {
    if mesh.is_empty() {
        return Err(StlError::EmptyMesh);
    }

    writeln!(writer, "solid segmentation")?;
    for &[i0, i1, i2] in &mesh.triangles {
        let v0 = mesh.vertices[i0 as usize];
        let v1 = mesh.vertices[i1 as usize];
        let v2 = mesh.vertices[i2 as usize];
        let [nx, ny, nz] = facet_normal(v0, v1, v2);

        writeln!(writer, "  facet normal {nx:.6e} {ny:.6e} {nz:.6e}")?;
        writeln!(writer, "    outer loop")?;
        for v in [v0, v1, v2] {
            writeln!(writer, "      vertex {:.6e} {:.6e} {:.6e}", v[0], v[1], v[2])?;
        }
        writeln!(writer, "    endloop")?;
        writeln!(writer, "  endfacet")?;
    }
    writeln!(writer, "endsolid segmentation")?;

    Ok(())
}

/// Serialize the mesh as ASCII STL into an owned byte buffer, ready to be
/// offered for download as [`EXPORT_FILENAME`].
pub fn to_ascii_bytes(mesh: &Mesh) -> Result<Vec<u8>, StlError> {
    let mut buffer = Vec::new();
    write_ascii(mesh, &mut buffer)?;
    Ok(buffer)
}

/// Serialize the mesh as binary STL.
///
/// # Errors
///
/// Returns [`StlError::EmptyMesh`] for a mesh without triangles, otherwise
/// propagates writer errors.
pub fn write_binary<W: Write>(mesh: &Mesh, writer: &mut W) -> Result<(), StlError> {
    if mesh.is_empty() {
        return Err(StlError::EmptyMesh);
    }

    let mut header = [b' '; HEADER_SIZE];
    let text = b"Binary STL generated by ct-volume";
    header[..text.len()].copy_from_slice(text);
    writer.write_all(&header)?;
    writer.write_all(&(mesh.triangles.len() as u32).to_le_bytes())?;

    for &[i0, i1, i2] in &mesh.triangles {
        let v0 = mesh.vertices[i0 as usize];
        let v1 = mesh.vertices[i1 as usize];
        let v2 = mesh.vertices[i2 as usize];

        for value in facet_normal(v0, v1, v2) {
            writer.write_all(&value.to_le_bytes())?;
        }
        for v in [v0, v1, v2] {
            for value in v {
                writer.write_all(&value.to_le_bytes())?;
            }
        }
        writer.write_all(&0u16.to_le_bytes())?;
    }

    Ok(())
}

/// Parse an ASCII STL stream.
///
/// Each facet becomes an independent vertex triple; STL carries no shared
/// topology, so the reader does not try to reconstruct any.
pub fn read_ascii<R: BufRead>(reader: R) -> Result<Mesh, StlError> {
    let mut mesh = Mesh::default();
    let mut in_loop = false;
    let mut loop_vertices: Vec<[f32; 3]> = Vec::with_capacity(3);

    for line in reader.lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("outer") => {
                in_loop = true;
                loop_vertices.clear();
            }
            Some("vertex") if in_loop => {
                let mut coords = [0.0f32; 3];
                for coord in &mut coords {
                    let token = parts
                        .next()
                        .ok_or_else(|| StlError::Malformed("vertex with fewer than 3 coordinates".into()))?;
                    *coord = token.parse()?;
                }
                loop_vertices.push(coords);
            }
            Some("endloop") => {
                in_loop = false;
            }
            Some("endfacet") => {
                if loop_vertices.len() != 3 {
                    return Err(StlError::Malformed(format!(
                        "facet with {} vertices",
                        loop_vertices.len()
                    )));
                }
                let base = mesh.vertices.len() as u32;
                mesh.vertices.append(&mut loop_vertices);
                mesh.triangles.push([base, base + 1, base + 2]);
            }
            Some("endsolid") => break,
            _ => {}
        }
    }

    Ok(mesh)
}

/// Parse a binary STL stream.
pub fn read_binary<R: Read>(mut reader: R) -> Result<Mesh, StlError> {
    let mut header = [0u8; HEADER_SIZE + 4];
    reader.read_exact(&mut header)?;
    let count = u32::from_le_bytes([
        header[HEADER_SIZE],
        header[HEADER_SIZE + 1],
        header[HEADER_SIZE + 2],
        header[HEADER_SIZE + 3],
    ]);

    let mut mesh = Mesh::default();
    let mut record = [0u8; TRIANGLE_SIZE];
    for _ in 0..count {
        reader.read_exact(&mut record)?;
        let base = mesh.vertices.len() as u32;
        // Skip the stored normal; it is derived data.
        for v in 0..3 {
            let at = 12 + v * 12;
            mesh.vertices.push([
                f32::from_le_bytes(record[at..at + 4].try_into().unwrap_or_default()),
                f32::from_le_bytes(record[at + 4..at + 8].try_into().unwrap_or_default()),
                f32::from_le_bytes(record[at + 8..at + 12].try_into().unwrap_or_default()),
            ]);
        }
        mesh.triangles.push([base, base + 1, base + 2]);
    }

    Ok(mesh)
}

/// Unit facet normal from the triangle's vertex order, zero for degenerate
/// triangles.
fn facet_normal(v0: [f32; 3], v1: [f32; 3], v2: [f32; 3]) -> [f32; 3] {
    let e1 = [v1[0] - v0[0], v1[1] - v0[1], v1[2] - v0[2]];
    let e2 = [v2[0] - v0[0], v2[1] - v0[1], v2[2] - v0[2]];
    let normal = [
        e1[1] * e2[2] - e1[2] * e2[1],
        e1[2] * e2[0] - e1[0] * e2[2],
        e1[0] * e2[1] - e1[1] * e2[0],
    ];
    let length = (normal[0] * normal[0] + normal[1] * normal[1] + normal[2] * normal[2]).sqrt();
    if length > f32::EPSILON {
        [normal[0] / length, normal[1] / length, normal[2] / length]
    } else {
        [0.0, 0.0, 0.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    fn unit_triangle() -> Mesh {
        Mesh {
            vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            triangles: vec![[0, 1, 2]],
        }
    }

    #[test]
    fn ascii_grammar_is_exact() {
        let output = String::from_utf8(to_ascii_bytes(&unit_triangle()).unwrap()).unwrap();

        let expected = "\
solid segmentation
  facet normal 0.000000e0 0.000000e0 1.000000e0
    outer loop
      vertex 0.000000e0 0.000000e0 0.000000e0
      vertex 1.000000e0 0.000000e0 0.000000e0
      vertex 0.000000e0 1.000000e0 0.000000e0
    endloop
  endfacet
endsolid segmentation
";
        assert_eq!(output, expected);
    }

    #[test]
    fn ascii_round_trip_preserves_triangles() {
        let original = Mesh {
            vertices: vec![
                [0.0, 0.0, 0.0],
                [2.5, 0.0, 0.0],
                [0.0, 1.25, 0.0],
                [0.0, 0.0, -3.5],
            ],
            triangles: vec![[0, 1, 2], [0, 2, 3]],
        };

        let bytes = to_ascii_bytes(&original).unwrap();
        let parsed = read_ascii(BufReader::new(&bytes[..])).unwrap();

        assert_eq!(parsed.triangle_count(), original.triangle_count());
        for (t, &[i0, i1, i2]) in original.triangles.iter().enumerate() {
            let expected = [
                original.vertices[i0 as usize],
                original.vertices[i1 as usize],
                original.vertices[i2 as usize],
            ];
            let &[p0, p1, p2] = &parsed.triangles[t];
            let got = [
                parsed.vertices[p0 as usize],
                parsed.vertices[p1 as usize],
                parsed.vertices[p2 as usize],
            ];
            for (e, g) in expected.iter().zip(&got) {
                for axis in 0..3 {
                    assert!((e[axis] - g[axis]).abs() < 1e-5);
                }
            }
        }
    }

    #[test]
    fn binary_round_trip_is_exact() {
        let original = unit_triangle();

        let mut bytes = Vec::new();
        write_binary(&original, &mut bytes).unwrap();
        let parsed = read_binary(&bytes[..]).unwrap();

        assert_eq!(parsed.triangle_count(), 1);
        assert_eq!(parsed.vertices[0], [0.0, 0.0, 0.0]);
        assert_eq!(parsed.vertices[1], [1.0, 0.0, 0.0]);
        assert_eq!(parsed.vertices[2], [0.0, 1.0, 0.0]);
    }

    #[test]
    fn empty_mesh_is_rejected() {
        let mesh = Mesh::default();

        assert!(matches!(to_ascii_bytes(&mesh), Err(StlError::EmptyMesh)));

        let mut sink = Vec::new();
        assert!(matches!(
            write_binary(&mesh, &mut sink),
            Err(StlError::EmptyMesh)
        ));
    }

    #[test]
    fn degenerate_facet_emits_zero_normal() {
        let mesh = Mesh {
            vertices: vec![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [2.0, 2.0, 2.0]],
            triangles: vec![[0, 1, 2]],
        };

        let output = String::from_utf8(to_ascii_bytes(&mesh).unwrap()).unwrap();

        assert!(output.contains("facet normal 0.000000e0 0.000000e0 0.000000e0"));
    }

    #[test]
    fn ascii_reader_accepts_foreign_output() {
        let input = "solid test\n\
                     facet normal 0 0 1\n\
                     outer loop\n\
                     vertex 0 0 0\n\
                     vertex 1 0 0\n\
                     vertex 0 1 0\n\
                     endloop\n\
                     endfacet\n\
                     endsolid test\n";

        let mesh = read_ascii(BufReader::new(input.as_bytes())).unwrap();

        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.vertices[1], [1.0, 0.0, 0.0]);
    }

    #[test]
    fn truncated_facet_is_malformed() {
        let input = "solid test\n\
                     outer loop\n\
                     vertex 0 0 0\n\
                     endloop\n\
                     endfacet\n\
                     endsolid test\n";

        let result = read_ascii(BufReader::new(input.as_bytes()));

        assert!(matches!(result, Err(StlError::Malformed(_))));
    }
}
