use nalgebra::Matrix4;

use super::scene_graph::{NodeKind, SceneGraph};
use crate::dae::{Document, Instance, Mesh, Node, Skin};
use crate::diagnostics::{self, Diagnostics};
use crate::error::{ConversionError, ConversionResult};
use crate::math::{matrix_from_row_major, up_axis_matrix};
use crate::settings::BindPose;

/// What a mesh instance draws, after following its url.
#[derive(Debug, Clone)]
pub struct ResolvedInstance<'d> {
    pub mesh: &'d Mesh,
    pub skin: Option<ResolvedSkin<'d>>,
}

/// A complete skin whose joint slots have been matched against the graph.
#[derive(Debug, Clone)]
pub struct ResolvedSkin<'d> {
    pub skin: &'d Skin,
    /// 1-based joint index per joint slot of the skin, `None` when unmatched.
    pub joint_map: Vec<Option<usize>>,
}

impl ResolvedSkin<'_> {
    pub fn bind_shape(&self) -> &Matrix4<f32> {
        &self.skin.bind_shape
    }
}

/// Follow an instance url to its controller or geometry.
///
/// `instance_controller` urls name a skin, `instance_geometry` urls a mesh. A
/// skin missing any of its joint, inverse bind or weight arrays degrades the
/// instance to a static mesh. Matched joints receive their inverse bind
/// matrix according to `bind_pose`.
pub fn resolve_instance<'d>(
    document: &'d Document,
    graph: &mut SceneGraph<'d>,
    instance: &Instance,
    bind_pose: BindPose,
    diagnostics: &mut Diagnostics,
) -> ConversionResult<ResolvedInstance<'d>> {
    if !instance.controller {
        let mesh = document.geometry(&instance.url).ok_or_else(|| {
            ConversionError::Reference(format!(
                "instance_geometry url '#{}' matches no geometry",
                instance.url
            ))
        })?;
        return Ok(ResolvedInstance { mesh, skin: None });
    }

    let skin = document.controller(&instance.url).ok_or_else(|| {
        ConversionError::Reference(format!(
            "instance_controller url '#{}' matches no controller",
            instance.url
        ))
    })?;
    let mesh = document.geometry(&skin.geometry).ok_or_else(|| {
        ConversionError::Reference(format!(
            "controller '{}' skins unknown geometry '{}'",
            skin.id, skin.geometry
        ))
    })?;
    if !skin.is_complete() {
        diagnostics.warn(
            diagnostics::INCOMPLETE_SKIN,
            format!("skin '{}' lacks joints, inverse binds or weights; exported static", skin.id),
        );
        return Ok(ResolvedInstance { mesh, skin: None });
    }
    let scope = skeleton_root(document, instance, diagnostics);
    let joint_map = match_joints(document, graph, skin, scope, bind_pose, diagnostics)?;
    Ok(ResolvedInstance {
        mesh,
        skin: Some(ResolvedSkin { skin, joint_map }),
    })
}

/// Node named by the instance's `<skeleton>` element.
fn skeleton_root<'d>(
    document: &'d Document,
    instance: &Instance,
    diagnostics: &mut Diagnostics,
) -> Option<&'d Node> {
    let id = instance.skeleton.as_deref()?;
    let root = document.scenes.iter().find_map(|s| s.find_node(id));
    if root.is_none() {
        diagnostics.warn(
            diagnostics::UNRESOLVED_SKELETON,
            format!("skeleton '#{id}' matches no node; matching joints scene-wide"),
        );
    }
    root
}

fn encloses(root: &Node, node: &Node) -> bool {
    std::ptr::eq(root, node) || root.children.iter().any(|c| encloses(c, node))
}

/// Map each joint slot of `skin` to a graph joint and store its inverse bind.
///
/// `Name_array` entries match a joint's sid, `IDREF_array` entries its id.
/// With a skeleton root only joints in its subtree are candidates.
fn match_joints(
    document: &Document,
    graph: &mut SceneGraph<'_>,
    skin: &Skin,
    scope: Option<&Node>,
    bind_pose: BindPose,
    diagnostics: &mut Diagnostics,
) -> ConversionResult<Vec<Option<usize>>> {
    let Some(joints) = skin.joints.as_ref() else {
        return Ok(Vec::new());
    };
    let by_id = joints.is_idref();
    let basis_inverse = up_axis_matrix(document.up_axis).transpose();

    let mut joint_map = Vec::with_capacity(joints.names().len());
    for (slot, name) in joints.names().iter().enumerate() {
        let found = graph.nodes.iter().position(|n| {
            n.is_joint()
                && if by_id {
                    n.source.id == *name
                } else {
                    n.source.sid.as_deref() == Some(name.as_str())
                }
                && scope.is_none_or(|root| encloses(root, n.source))
        });
        let Some(node_index) = found else {
            diagnostics.warn(
                diagnostics::UNMATCHED_SKIN_JOINT,
                format!("skin '{}' joint '{name}' matches no scene joint", skin.id),
            );
            joint_map.push(None);
            continue;
        };

        let node = &mut graph.nodes[node_index];
        let inverse = match bind_pose {
            BindPose::Computed => node.absolute.try_inverse().ok_or_else(|| {
                ConversionError::NonInvertible {
                    joint: node.source.display_name().to_string(),
                }
            })?,
            BindPose::Document => {
                let matrix = skin
                    .inverse_bind
                    .as_ref()
                    .and_then(|s| s.item(slot))
                    .and_then(matrix_from_row_major)
                    .ok_or_else(|| {
                        ConversionError::MissingData(format!(
                            "skin '{}' has no inverse bind matrix for joint '{name}'",
                            skin.id
                        ))
                    })?;
                // Undo the up-axis basis that emitted vertices carry.
                matrix * basis_inverse
            }
        };
        let NodeKind::Joint { index, inverse_bind } = &mut node.kind else {
            continue;
        };
        *inverse_bind = inverse;
        joint_map.push(Some(*index));
    }
    Ok(joint_map)
}
