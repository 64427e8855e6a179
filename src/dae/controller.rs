use std::collections::HashMap;

use nalgebra::Matrix4;
use xmltree::Element;

use super::{
    Source, attr, elements_named, parse_floats, parse_ints, parse_usize_attr, required_attr, strip_ref,
};
use crate::diagnostics::{self, Diagnostics};
use crate::error::{ConversionError, ConversionResult};
use crate::math::matrix_from_row_major;

/// One joint influence of a vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Influence {
    /// Slot in the skin's joint array.
    pub joint: usize,
    /// Index into the skin's weight array.
    pub weight: usize,
}

/// A `<skin>` controller.
#[derive(Debug, Clone, PartialEq)]
pub struct Skin {
    /// Controller id.
    pub id: String,
    /// Skinned geometry id.
    pub geometry: String,
    pub bind_shape: Matrix4<f32>,
    pub joints: Option<Source>,
    pub inverse_bind: Option<Source>,
    pub weights: Option<Source>,
    /// Influences per geometry position index.
    pub influences: Vec<Vec<Influence>>,
}

impl Skin {
    pub(crate) fn parse(
        controller: &Element,
        skin: &Element,
        diagnostics: &mut Diagnostics,
    ) -> ConversionResult<Self> {
        let id = required_attr(controller, "id")?.to_string();
        let geometry = strip_ref(required_attr(skin, "source")?).to_string();

        let bind_shape = match skin.get_child("bind_shape_matrix") {
            Some(element) => matrix_from_row_major(&parse_floats(element)?).ok_or_else(|| {
                ConversionError::parse(format!("bind shape matrix of '{id}' is incomplete"))
            })?,
            None => Matrix4::identity(),
        };

        let mut sources: HashMap<String, Source> = HashMap::new();
        for source in elements_named(skin, "source") {
            let source = Source::parse(source)?;
            sources.insert(source.id.clone(), source);
        }
        let lookup = |element: Option<&Element>, semantic: &str| -> Option<String> {
            element.and_then(|parent| {
                elements_named(parent, "input")
                    .find(|i| attr(i, "semantic") == Some(semantic))
                    .and_then(|i| attr(i, "source"))
                    .map(|s| strip_ref(s).to_string())
            })
        };

        let joints_element = skin.get_child("joints");
        let weights_element = skin.get_child("vertex_weights");
        let joint_source_id = lookup(joints_element, "JOINT");
        let weight_joint_source_id = lookup(weights_element, "JOINT");
        if weight_joint_source_id.is_some() && weight_joint_source_id != joint_source_id {
            diagnostics.warn(
                diagnostics::JOINT_ARRAY_MISMATCH,
                format!("skin '{id}' uses different joint arrays for joints and weights"),
            );
        }

        let joints = joint_source_id.and_then(|s| sources.get(&s).cloned());
        let inverse_bind = lookup(joints_element, "INV_BIND_MATRIX")
            .and_then(|s| sources.get(&s).cloned());
        let weights = lookup(weights_element, "WEIGHT").and_then(|s| sources.get(&s).cloned());

        let influences = match weights_element {
            Some(element) => parse_influences(element)?,
            None => Vec::new(),
        };

        Ok(Self {
            id,
            geometry,
            bind_shape,
            joints,
            inverse_bind,
            weights,
            influences,
        })
    }

    /// All three arrays needed for skinning are present.
    pub fn is_complete(&self) -> bool {
        self.joints.is_some() && self.inverse_bind.is_some() && self.weights.is_some()
    }

    pub fn weight(&self, index: usize) -> Option<f32> {
        self.weights
            .as_ref()
            .and_then(|w| w.floats().get(index).copied())
    }
}

/// Read `<vcount>`/`<v>` pairs. Negative joint indices reference the bind
/// shape and are dropped.
fn parse_influences(element: &Element) -> ConversionResult<Vec<Vec<Influence>>> {
    let mut joint_offset = 0;
    let mut weight_offset = 0;
    let mut width = 0;
    for input in elements_named(element, "input") {
        let offset = parse_usize_attr(input, "offset")?.unwrap_or(0);
        match required_attr(input, "semantic")? {
            "JOINT" => joint_offset = offset,
            "WEIGHT" => weight_offset = offset,
            _ => {}
        }
        width = width.max(offset + 1);
    }
    let width = width.max(1);

    let vcount: Vec<usize> = match element.get_child("vcount") {
        Some(v) => parse_ints(v)?,
        None => Vec::new(),
    };
    let v: Vec<i64> = match element.get_child("v") {
        Some(v) => parse_ints(v)?,
        None => Vec::new(),
    };

    let mut influences = Vec::with_capacity(vcount.len());
    let mut cursor = 0;
    for count in vcount {
        let mut list = Vec::with_capacity(count);
        for _ in 0..count {
            let tuple = v.get(cursor..cursor + width).ok_or_else(|| {
                ConversionError::parse("vertex weight index list is truncated")
            })?;
            cursor += width;
            let (joint, weight) = (tuple[joint_offset], tuple[weight_offset]);
            if joint < 0 || weight < 0 {
                continue;
            }
            list.push(Influence {
                joint: joint as usize,
                weight: weight as usize,
            });
        }
        influences.push(list);
    }
    Ok(influences)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dae::{Document, fixtures};

    #[test]
    fn given_fixture_skin_when_parsing_then_influences_follow_vcount() {
        let mut diagnostics = Diagnostics::new();
        let document = Document::parse(fixtures::SKINNED_TRIANGLE, &mut diagnostics).expect("parse");
        let skin = document.controller("tri_skin").expect("skin");
        assert_eq!(skin.geometry, "tri_geo");
        assert!(skin.is_complete());
        assert_eq!(skin.influences.len(), 3);
        assert_eq!(skin.influences[1].len(), 2);
        assert_eq!(skin.influences[1][1], Influence { joint: 1, weight: 2 });
        assert!((skin.weight(2).expect("weight") - 0.5).abs() < 1e-6);
    }

    #[test]
    fn given_negative_joint_index_when_parsing_then_influence_is_dropped() {
        let xml = r##"<controller id="c"><skin source="#g">
            <vertex_weights count="1">
              <input semantic="JOINT" source="#j" offset="0"/>
              <input semantic="WEIGHT" source="#w" offset="1"/>
              <vcount>2</vcount><v>-1 0 0 1</v>
            </vertex_weights></skin></controller>"##;
        let controller = Element::parse(xml.as_bytes()).expect("xml");
        let skin_element = controller.get_child("skin").expect("skin").clone();
        let mut diagnostics = Diagnostics::new();
        let skin = Skin::parse(&controller, &skin_element, &mut diagnostics).expect("skin");
        assert_eq!(skin.influences, vec![vec![Influence { joint: 0, weight: 1 }]]);
        assert!(!skin.is_complete());
        assert!(diagnostics.has(diagnostics::JOINT_ARRAY_MISMATCH));
    }
}
