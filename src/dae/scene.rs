use std::collections::HashMap;

use nalgebra::Matrix4;
use xmltree::Element;

use super::{attr, elements, elements_named, parse_floats, required_attr, strip_ref, text};
use crate::diagnostics::{self, Diagnostics};
use crate::error::ConversionResult;
use crate::math::{matrix_from_row_major, rotation_matrix, scale_matrix, translation_matrix};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    /// 16 floats, row-major.
    Matrix,
    Translate,
    /// Axis followed by an angle in degrees.
    Rotate,
    Scale,
}

impl TransformKind {
    /// Number of floats the element carries.
    pub fn value_count(self) -> usize {
        match self {
            Self::Matrix => 16,
            Self::Translate | Self::Scale => 3,
            Self::Rotate => 4,
        }
    }
}

/// One entry of a node's transformation stack.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    pub sid: Option<String>,
    pub kind: TransformKind,
    pub values: Vec<f32>,
}

/// Evaluate a transformation stack.
///
/// Entries are grouped by kind: the last `matrix` is followed by all
/// translations, then all rotations, then all scales, each group composed in
/// document order.
pub fn evaluate_stack(transforms: &[Transform]) -> Matrix4<f32> {
    let mut matrix = Matrix4::identity();
    let mut translate = Matrix4::identity();
    let mut rotate = Matrix4::identity();
    let mut scale = Matrix4::identity();
    for transform in transforms {
        match transform.kind {
            TransformKind::Matrix => {
                if let Some(m) = matrix_from_row_major(&transform.values) {
                    matrix = m;
                }
            }
            TransformKind::Translate => translate *= translation_matrix(&transform.values),
            TransformKind::Rotate => rotate *= rotation_matrix(&transform.values),
            TransformKind::Scale => scale *= scale_matrix(&transform.values),
        }
    }
    matrix * translate * rotate * scale
}

/// A geometry or controller instantiated by a node.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub url: String,
    pub controller: bool,
    /// Material symbol to material id.
    pub material_bindings: HashMap<String, String>,
    pub skeleton: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Node {
    pub id: String,
    pub sid: Option<String>,
    pub name: Option<String>,
    pub joint: bool,
    /// Set on placeholder children created from `<instance_node>`.
    pub reference: Option<String>,
    pub transforms: Vec<Transform>,
    pub instances: Vec<Instance>,
    pub children: Vec<Node>,
}

impl Node {
    fn parse(element: &Element, diagnostics: &mut Diagnostics) -> ConversionResult<Self> {
        let mut node = Node {
            id: attr(element, "id").unwrap_or_default().to_string(),
            sid: attr(element, "sid").map(str::to_string),
            name: attr(element, "name").map(str::to_string),
            joint: attr(element, "type") == Some("JOINT"),
            ..Node::default()
        };

        for child in elements(element) {
            let kind = match child.name.as_str() {
                "matrix" => TransformKind::Matrix,
                "translate" => TransformKind::Translate,
                "rotate" => TransformKind::Rotate,
                "scale" => TransformKind::Scale,
                "skew" | "lookat" => {
                    diagnostics.warn(
                        diagnostics::UNSUPPORTED_TRANSFORM,
                        format!("<{}> on node '{}' is ignored", child.name, node.id),
                    );
                    continue;
                }
                "instance_geometry" | "instance_controller" => {
                    node.instances.push(parse_instance(child)?);
                    continue;
                }
                _ => continue,
            };
            node.transforms.push(Transform {
                sid: attr(child, "sid").map(str::to_string),
                kind,
                values: parse_floats(child)?,
            });
        }

        // Referenced nodes come before regular children.
        for reference in elements_named(element, "instance_node") {
            node.children.push(Node {
                id: String::new(),
                reference: Some(strip_ref(required_attr(reference, "url")?).to_string()),
                ..Node::default()
            });
        }
        for child in elements_named(element, "node") {
            node.children.push(Node::parse(child, diagnostics)?);
        }
        Ok(node)
    }

    pub fn transform_matrix(&self) -> Matrix4<f32> {
        evaluate_stack(&self.transforms)
    }

    /// Display name: `name`, then `sid`, then `id`.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.sid.as_deref())
            .unwrap_or(&self.id)
    }

    fn find(&self, id: &str) -> Option<&Node> {
        if self.reference.is_none() && self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }
}

fn parse_instance(element: &Element) -> ConversionResult<Instance> {
    let mut material_bindings = HashMap::new();
    if let Some(technique) = element
        .get_child("bind_material")
        .and_then(|b| b.get_child("technique_common"))
    {
        for binding in elements_named(technique, "instance_material") {
            material_bindings.insert(
                required_attr(binding, "symbol")?.to_string(),
                strip_ref(required_attr(binding, "target")?).to_string(),
            );
        }
    }
    let skeleton = element
        .get_child("skeleton")
        .map(|s| strip_ref(text(s).trim()).to_string());

    Ok(Instance {
        url: strip_ref(required_attr(element, "url")?).to_string(),
        controller: element.name == "instance_controller",
        material_bindings,
        skeleton,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisualScene {
    pub id: String,
    pub nodes: Vec<Node>,
}

impl VisualScene {
    pub(crate) fn parse(element: &Element, diagnostics: &mut Diagnostics) -> ConversionResult<Self> {
        let mut nodes = Vec::new();
        for node in elements_named(element, "node") {
            nodes.push(Node::parse(node, diagnostics)?);
        }
        Ok(Self {
            id: attr(element, "id").unwrap_or_default().to_string(),
            nodes,
        })
    }

    /// Depth-first lookup of a node by id, skipping reference placeholders.
    pub fn find_node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find_map(|n| n.find(id))
    }
}
