mod animation;
mod scene_graph;
mod skinning;
mod weld;

use crate::dae::Document;
use crate::diagnostics::{self, Diagnostics};
use crate::error::ConversionResult;
use crate::internal::{InternalData, MaterialRecord, compute_frame_bounds, compute_static_bounds};
use crate::settings::BindPose;

pub use animation::{compose_absolute, export_joints};
pub use scene_graph::{NodeKind, SceneGraph, SceneNode};
pub use skinning::{ResolvedInstance, ResolvedSkin, resolve_instance};
pub use weld::{VertexRecord, Welder, weld_instance};

// ─── Public API ───────────────────────────────────────────────────────────────

/// Internal data of one document plus the issues met on the way.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub data: InternalData,
    pub diagnostics: Diagnostics,
}

/// Convert a parsed document into engine-facing meshes, joints and materials.
///
/// Every skin is resolved before transforms are composed, so inverse binds are
/// in place when joint poses are exported. Submeshes carry positions in the
/// exported world space with static boxes; animated files also get one box per
/// frame.
pub fn convert(document: &Document, bind_pose: BindPose) -> ConversionResult<Conversion> {
    let mut diagnostics = Diagnostics::new();
    let frame_count = document.animations.max_frame_count;
    let mut graph = SceneGraph::build(document, frame_count, &mut diagnostics)?;

    let mesh_nodes: Vec<usize> = graph.meshes().map(|(i, _)| i).collect();
    let mut instances = Vec::new();
    for &node_index in &mesh_nodes {
        let source = graph.nodes[node_index].source;
        for instance in &source.instances {
            let resolved =
                resolve_instance(document, &mut graph, instance, bind_pose, &mut diagnostics)?;
            instances.push((node_index, instance, resolved));
        }
    }
    compose_absolute(&mut graph)?;

    let mut meshes = Vec::new();
    let mut used_materials = Vec::new();
    for (node_index, instance, resolved) in &instances {
        let node = &graph.nodes[*node_index];
        let transform = match &resolved.skin {
            Some(skin) => node.absolute * skin.bind_shape(),
            None => node.absolute,
        };
        meshes.extend(weld_instance(
            document,
            instance,
            resolved,
            &transform,
            node.source.display_name(),
            &mut used_materials,
            &mut diagnostics,
        )?);
    }

    let joints = export_joints(&graph)?;
    let (frame_count, frame_rate) = if joints.is_empty() {
        (0, 0.0)
    } else {
        (frame_count, document.animations.frame_rate())
    };
    let materials = used_materials
        .iter()
        .filter_map(|id| material_record(document, id, &mut diagnostics))
        .collect();

    let mut data = InternalData {
        meshes,
        joints,
        materials,
        frame_count,
        frame_rate,
        frame_bboxes: Vec::new(),
    };
    for mesh in &data.meshes {
        mesh.validate()?;
    }
    compute_static_bounds(&mut data.meshes);
    data.frame_bboxes = compute_frame_bounds(&data);

    if data.meshes.is_empty() {
        diagnostics.info(diagnostics::NO_GEOMETRY, "document produced no geometry");
    }
    log::info!(
        "converted {} submeshes ({} vertices, {} triangles), {} joints, {} frames",
        data.meshes.len(),
        data.vertex_count(),
        data.triangle_count(),
        data.joints.len(),
        data.frame_count
    );
    Ok(Conversion { data, diagnostics })
}

/// Shading values of material `id`, following its effect and texture image.
fn material_record(
    document: &Document,
    id: &str,
    diagnostics: &mut Diagnostics,
) -> Option<MaterialRecord> {
    let material = document.material(id)?;
    let Some(effect) = material.effect.as_deref().and_then(|e| document.effect(e)) else {
        diagnostics.warn(
            diagnostics::MISSING_EFFECT,
            format!("material '{}' has no usable effect", material.name),
        );
        return Some(MaterialRecord {
            name: material.name.clone(),
            diffuse: [1.0, 1.0, 1.0, 1.0],
            specular: [0.0, 0.0, 0.0, 1.0],
            shininess: 0.5,
            texture: None,
        });
    };

    let texture = effect.diffuse_texture.as_deref().and_then(|image| {
        match document.image(image) {
            Some(found) => Some(found.file.clone()),
            None => {
                diagnostics.warn(
                    diagnostics::MISSING_IMAGE,
                    format!("effect '{}' references unknown image '{image}'", effect.id),
                );
                None
            }
        }
    });
    Some(MaterialRecord {
        name: material.name.clone(),
        diffuse: effect.diffuse,
        specular: effect.specular,
        shininess: effect.shininess,
        texture,
    })
}
