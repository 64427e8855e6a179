use nalgebra::Matrix4;

use super::scene_graph::{NodeKind, SceneGraph};
use crate::error::{ConversionError, ConversionResult};
use crate::internal::{JointPose, JointRecord};
use crate::math::decompose;

/// Fill `frames_absolute` of every graph node from its relative frames.
///
/// Parents precede children in the arena, so one forward pass suffices. A
/// root's parent term is the identity; the up-axis basis is already part of
/// its relative frames. A mesh node hanging below a joint is rejected.
pub fn compose_absolute(graph: &mut SceneGraph<'_>) -> ConversionResult<()> {
    for i in 0..graph.nodes.len() {
        let parent = graph.nodes[i].parent;
        if let Some(p) = parent {
            if graph.nodes[p].is_joint() && !graph.nodes[i].is_joint() {
                return Err(ConversionError::structural(format!(
                    "node '{}' below joint '{}' is not a joint (mixed armature)",
                    graph.nodes[i].source.display_name(),
                    graph.nodes[p].source.display_name()
                )));
            }
        }

        let frames: Vec<Matrix4<f32>> = match parent {
            Some(p) => graph.nodes[p]
                .frames_absolute
                .iter()
                .zip(&graph.nodes[i].frames_relative)
                .map(|(parent, relative)| parent * relative)
                .collect(),
            None => graph.nodes[i].frames_relative.clone(),
        };
        graph.nodes[i].frames_absolute = frames;
    }
    Ok(())
}

/// One record per joint, in joint index order.
///
/// The parent of a joint is its nearest scene-graph parent when that is a
/// joint, else 0. More than one skeleton root is a structural error. Each
/// frame stores the decomposed local transform and the skinning transform
/// `absolute * inverse_bind`.
pub fn export_joints(graph: &SceneGraph<'_>) -> ConversionResult<Vec<JointRecord>> {
    let mut records = Vec::new();
    let mut root: Option<&str> = None;

    for (_, node) in graph.joints() {
        let NodeKind::Joint { index, inverse_bind } = node.kind else {
            continue;
        };
        let parent = node
            .parent
            .and_then(|p| graph.nodes[p].joint_index())
            .unwrap_or(0);
        if parent == 0 {
            if let Some(first) = root {
                return Err(ConversionError::structural(format!(
                    "skeleton has more than one root joint ('{first}' and '{}')",
                    node.source.display_name()
                )));
            }
            root = Some(node.source.display_name());
        }

        let relative_poses = node.frames_relative.iter().map(pose).collect();
        let absolute_poses = node
            .frames_absolute
            .iter()
            .map(|m| pose(&(m * inverse_bind)))
            .collect();

        records.push(JointRecord {
            index,
            parent,
            name: node.source.display_name().to_string(),
            inverse_bind,
            relative_poses,
            absolute_poses,
        });
    }
    records.sort_by_key(|r| r.index);
    Ok(records)
}

fn pose(matrix: &Matrix4<f32>) -> JointPose {
    let (rotation, translation) = decompose(matrix);
    JointPose {
        rotation,
        translation,
    }
}
