use std::borrow::Cow;

use crate::{backend::ModelVertex, data_structures::scene_graph::Aabb};

/// CPU-side geometry of one glTF primitive.
#[derive(Clone, Debug)]
pub struct PrimitiveGeometry {
    pub vertices: Vec<ModelVertex>,
    pub indices: Vec<u32>,
    /// Index into the document's materials; `None` means the default material.
    pub material: Option<usize>,
    pub bounds: Aabb,
}

/// Read every drawable primitive of `mesh`.
///
/// Primitives that are not triangle lists or have no positions are skipped
/// with a warning rather than failing the whole load.
pub fn read_mesh(mesh: &gltf::Mesh<'_>, buffers: &[Cow<'_, [u8]>]) -> Vec<PrimitiveGeometry> {
    let label = mesh.name().unwrap_or("unknown_mesh");
    mesh.primitives()
        .filter_map(|primitive| {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                log::warn!(
                    "Primitive {} of mesh {} uses {:?}; only triangle lists are drawn.",
                    primitive.index(),
                    label,
                    primitive.mode()
                );
                return None;
            }
            let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|b| b.as_ref()));

            let mut vertices: Vec<ModelVertex> = match reader.read_positions() {
                Some(positions) => positions
                    .map(|position| ModelVertex {
                        position,
                        ..Default::default()
                    })
                    .collect(),
                None => {
                    log::warn!(
                        "Primitive {} of mesh {} has no positions and is skipped.",
                        primitive.index(),
                        label
                    );
                    return None;
                }
            };
            if let Some(normals) = reader.read_normals() {
                vertices
                    .iter_mut()
                    .zip(normals)
                    .for_each(|(vertex, normal)| vertex.normal = normal);
            }
            if let Some(tex_coords) = reader.read_tex_coords(0).map(|v| v.into_f32()) {
                vertices
                    .iter_mut()
                    .zip(tex_coords)
                    .for_each(|(vertex, uv)| vertex.tex_coords = uv);
            }

            let indices: Vec<u32> = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect(),
                None => (0..vertices.len() as u32).collect(),
            };
            if let Some(&bad) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
                log::warn!(
                    "Primitive {} of mesh {} indexes vertex {} of {}; skipped.",
                    primitive.index(),
                    label,
                    bad,
                    vertices.len()
                );
                return None;
            }

            let bounds = bounds_of(&vertices)?;
            Some(PrimitiveGeometry {
                vertices,
                indices,
                material: primitive.material().index(),
                bounds,
            })
        })
        .collect()
}

fn bounds_of(vertices: &[ModelVertex]) -> Option<Aabb> {
    let first = vertices.first()?.position;
    Some(vertices.iter().fold(Aabb::new(first, first), |acc, v| {
        acc.union(&Aabb::new(v.position, v.position))
    }))
}
