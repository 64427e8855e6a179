use std::collections::HashSet;

use nalgebra::Matrix4;

use crate::dae::{AnimationLibrary, Document, Node, VisualScene, evaluate_stack};
use crate::diagnostics::{self, Diagnostics};
use crate::error::{ConversionError, ConversionResult};
use crate::math::up_axis_matrix;

/// Classified scene node payload.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Joint {
        /// 1-based, assigned in traversal order.
        index: usize,
        inverse_bind: Matrix4<f32>,
    },
    Mesh,
}

/// Arena entry for a joint or mesh-instance node.
#[derive(Debug, Clone)]
pub struct SceneNode<'d> {
    pub source: &'d Node,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Bind transform relative to the parent scene node, including any
    /// unclassified nodes in between.
    pub relative: Matrix4<f32>,
    pub absolute: Matrix4<f32>,
    pub frames_relative: Vec<Matrix4<f32>>,
    pub frames_absolute: Vec<Matrix4<f32>>,
    pub kind: NodeKind,
}

impl SceneNode<'_> {
    pub fn is_joint(&self) -> bool {
        matches!(self.kind, NodeKind::Joint { .. })
    }

    pub fn joint_index(&self) -> Option<usize> {
        match self.kind {
            NodeKind::Joint { index, .. } => Some(index),
            NodeKind::Mesh => None,
        }
    }
}

/// Joints and mesh instances of all visual scenes, stored in pre-order so a
/// parent always precedes its children.
#[derive(Debug, Clone, Default)]
pub struct SceneGraph<'d> {
    pub nodes: Vec<SceneNode<'d>>,
    pub roots: Vec<usize>,
    pub frame_count: usize,
}

impl<'d> SceneGraph<'d> {
    pub fn joints(&self) -> impl Iterator<Item = (usize, &SceneNode<'d>)> {
        self.nodes.iter().enumerate().filter(|(_, n)| n.is_joint())
    }

    pub fn meshes(&self) -> impl Iterator<Item = (usize, &SceneNode<'d>)> {
        self.nodes.iter().enumerate().filter(|(_, n)| !n.is_joint())
    }

    pub fn joint_count(&self) -> usize {
        self.joints().count()
    }

    /// Build the graph for every visual scene of `document`.
    ///
    /// Unclassified nodes fold their transforms into the next joint or mesh
    /// below them. The up-axis basis change is the parent term of root nodes.
    pub fn build(
        document: &'d Document,
        frame_count: usize,
        diagnostics: &mut Diagnostics,
    ) -> ConversionResult<Self> {
        if document.scenes.iter().all(|s| s.nodes.is_empty()) {
            return Err(ConversionError::Integrity(
                "document has no visual scene nodes".to_string(),
            ));
        }

        let mut builder = Builder {
            graph: SceneGraph {
                frame_count,
                ..SceneGraph::default()
            },
            animations: &document.animations,
            basis: up_axis_matrix(document.up_axis),
            next_joint: 1,
            expanding: HashSet::new(),
            diagnostics,
        };
        for scene in &document.scenes {
            for node in &scene.nodes {
                let pending_frames = vec![Matrix4::identity(); frame_count];
                builder.visit(scene, node, None, Matrix4::identity(), pending_frames)?;
            }
        }
        let graph = builder.graph;
        log::debug!(
            "scene graph: {} joints, {} mesh nodes",
            graph.joint_count(),
            graph.nodes.len() - graph.joint_count()
        );
        Ok(graph)
    }
}

struct Builder<'d, 'a> {
    graph: SceneGraph<'d>,
    animations: &'d AnimationLibrary,
    basis: Matrix4<f32>,
    next_joint: usize,
    /// Reference urls currently being expanded, to stop `instance_node` cycles.
    expanding: HashSet<&'d str>,
    diagnostics: &'a mut Diagnostics,
}

impl<'d> Builder<'d, '_> {
    fn visit(
        &mut self,
        scene: &'d VisualScene,
        node: &'d Node,
        parent: Option<usize>,
        pending: Matrix4<f32>,
        pending_frames: Vec<Matrix4<f32>>,
    ) -> ConversionResult<()> {
        if let Some(url) = node.reference.as_deref() {
            let Some(target) = scene.find_node(url) else {
                self.diagnostics.warn(
                    diagnostics::UNRESOLVED_INSTANCE_NODE,
                    format!("instance_node '#{url}' not found in scene '{}'", scene.id),
                );
                return Ok(());
            };
            if !self.expanding.insert(url) {
                return Err(ConversionError::structural(format!(
                    "instance_node '#{url}' references itself"
                )));
            }
            let result = self.visit(scene, target, parent, pending, pending_frames);
            self.expanding.remove(url);
            return result;
        }

        let local = evaluate_stack(&node.transforms);
        let local_frames = self.local_frames(node, &local)?;

        let kind = if node.joint {
            if !node.instances.is_empty() {
                self.diagnostics.warn(
                    diagnostics::IGNORED_INSTANCE,
                    format!("instances on joint '{}' are ignored", node.display_name()),
                );
            }
            let index = self.next_joint;
            self.next_joint += 1;
            Some(NodeKind::Joint {
                index,
                inverse_bind: Matrix4::identity(),
            })
        } else if !node.instances.is_empty() {
            Some(NodeKind::Mesh)
        } else {
            None
        };

        let Some(kind) = kind else {
            let frames: Vec<Matrix4<f32>> = pending_frames
                .iter()
                .zip(&local_frames)
                .map(|(p, l)| p * l)
                .collect();
            for child in &node.children {
                self.visit(scene, child, parent, pending * local, frames.clone())?;
            }
            return Ok(());
        };

        let relative = pending * local;
        let parent_absolute = parent.map_or(self.basis, |p| self.graph.nodes[p].absolute);
        let frames_relative = pending_frames
            .iter()
            .zip(&local_frames)
            .map(|(p, l)| match parent {
                Some(_) => p * l,
                None => self.basis * p * l,
            })
            .collect();

        let id = self.graph.nodes.len();
        self.graph.nodes.push(SceneNode {
            source: node,
            parent,
            children: Vec::new(),
            relative,
            absolute: parent_absolute * relative,
            frames_relative,
            frames_absolute: Vec::new(),
            kind,
        });
        match parent {
            Some(p) => self.graph.nodes[p].children.push(id),
            None => self.graph.roots.push(id),
        }

        let frame_count = self.graph.frame_count;
        for child in &node.children {
            self.visit(
                scene,
                child,
                Some(id),
                Matrix4::identity(),
                vec![Matrix4::identity(); frame_count],
            )?;
        }
        Ok(())
    }

    /// Local transform per frame: the static stack with every sampled channel
    /// targeting this node applied.
    fn local_frames(
        &mut self,
        node: &Node,
        local: &Matrix4<f32>,
    ) -> ConversionResult<Vec<Matrix4<f32>>> {
        let frame_count = self.graph.frame_count;
        let animations = self.animations;
        let channels = if node.id.is_empty() {
            Vec::new()
        } else {
            animations.channels_for(&node.id)
        };
        if frame_count == 0 || channels.is_empty() {
            return Ok(vec![*local; frame_count]);
        }

        let mut active = Vec::with_capacity(channels.len());
        for (channel, sampler) in channels {
            let Some(slot) = node
                .transforms
                .iter()
                .position(|t| t.sid.as_deref() == Some(channel.transform_sid.as_str()))
            else {
                self.diagnostics.warn(
                    diagnostics::UNRESOLVED_CHANNEL_TARGET,
                    format!(
                        "node '{}' has no transformation '{}'",
                        node.id, channel.transform_sid
                    ),
                );
                continue;
            };
            let width = match channel.component {
                Some(_) => 1,
                None => node.transforms[slot].kind.value_count(),
            };
            if sampler.key_count() != frame_count
                || sampler.output_stride != width
                || sampler.output.len() < frame_count * width
            {
                return Err(ConversionError::structural(format!(
                    "animation data not sampled: node '{}' channel '{}' has {} keys of {} \
                     values, expected {frame_count} keys of {width}",
                    node.id,
                    channel.transform_sid,
                    sampler.key_count(),
                    sampler.output_stride
                )));
            }
            active.push((slot, channel.component, sampler));
        }

        let mut frames = Vec::with_capacity(frame_count);
        for frame in 0..frame_count {
            let mut stack = node.transforms.clone();
            for &(slot, component, sampler) in &active {
                let Some(value) = sampler.value(frame) else {
                    continue;
                };
                let target = &mut stack[slot].values;
                match component {
                    Some(c) if c < target.len() => target[c] = value[0],
                    Some(_) => {}
                    None => *target = value.to_vec(),
                }
            }
            frames.push(evaluate_stack(&stack));
        }
        Ok(frames)
    }
}
