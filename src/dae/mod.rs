//! In-memory tables for the COLLADA 1.4 subset the converter understands.
//!
//! Parsing only fills per-library tables keyed by element id. References
//! between libraries are resolved later by the converter.

mod animation;
mod controller;
mod geometry;
mod material;
mod scene;
mod source;

use std::{collections::HashMap, fs, io::Read, path::Path};

use xmltree::{Element, XMLNode};

use crate::diagnostics::{self, Diagnostics};
use crate::error::{ConversionError, ConversionResult};
use crate::math::UpAxis;

pub use animation::{Animation, AnimationLibrary, Channel, Sampler};
pub use controller::{Influence, Skin};
pub use geometry::{Input, Mesh, Primitive, Semantic};
pub use material::{Effect, Image, Material};
pub use scene::{Instance, Node, Transform, TransformKind, VisualScene, evaluate_stack};
pub use source::{Source, SourceData};

const SUPPORTED_VERSIONS: [&str; 2] = ["1.4.0", "1.4.1"];

/// Parsed document tables.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub up_axis: UpAxis,
    pub images: HashMap<String, Image>,
    pub effects: HashMap<String, Effect>,
    pub materials: HashMap<String, Material>,
    pub geometries: HashMap<String, Mesh>,
    pub controllers: HashMap<String, Skin>,
    pub scenes: Vec<VisualScene>,
    pub animations: AnimationLibrary,
}

impl Document {
    /// Read and parse a document from disk.
    pub fn open(path: &Path, diagnostics: &mut Diagnostics) -> ConversionResult<Self> {
        let file = fs::File::open(path).map_err(|source| ConversionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file, diagnostics)
    }

    pub fn from_reader<R: Read>(reader: R, diagnostics: &mut Diagnostics) -> ConversionResult<Self> {
        let root = Element::parse(reader).map_err(|e| ConversionError::Xml(e.to_string()))?;
        Self::from_element(&root, diagnostics)
    }

    pub fn parse(xml: &str, diagnostics: &mut Diagnostics) -> ConversionResult<Self> {
        Self::from_reader(xml.as_bytes(), diagnostics)
    }

    fn from_element(root: &Element, diagnostics: &mut Diagnostics) -> ConversionResult<Self> {
        if root.name != "COLLADA" {
            return Err(ConversionError::parse(format!(
                "root element is <{}>, expected <COLLADA>",
                root.name
            )));
        }
        let version = attr(root, "version").unwrap_or_default();
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(ConversionError::parse(format!(
                "unsupported COLLADA version '{version}'"
            )));
        }

        let mut document = Document {
            up_axis: parse_up_axis(root, diagnostics),
            ..Document::default()
        };

        for image in library_items(root, "library_images", "image") {
            let image = Image::parse(image)?;
            document.images.insert(image.id.clone(), image);
        }
        for effect in library_items(root, "library_effects", "effect") {
            let effect = Effect::parse(effect)?;
            document.effects.insert(effect.id.clone(), effect);
        }
        for material in library_items(root, "library_materials", "material") {
            let material = Material::parse(material)?;
            document.materials.insert(material.id.clone(), material);
        }

        if root.get_child("library_geometries").is_none() {
            return Err(ConversionError::parse("document has no <library_geometries>"));
        }
        for geometry in library_items(root, "library_geometries", "geometry") {
            // Splines and other non-mesh geometry are not converted.
            if let Some(mesh) = geometry.get_child("mesh") {
                let mesh = Mesh::parse(geometry, mesh)?;
                document.geometries.insert(mesh.id.clone(), mesh);
            }
        }
        for controller in library_items(root, "library_controllers", "controller") {
            if let Some(skin) = controller.get_child("skin") {
                let skin = Skin::parse(controller, skin, diagnostics)?;
                document.controllers.insert(skin.id.clone(), skin);
            }
        }
        for scene in library_items(root, "library_visual_scenes", "visual_scene") {
            document.scenes.push(VisualScene::parse(scene, diagnostics)?);
        }
        if let Some(library) = root.get_child("library_animations") {
            document.animations = AnimationLibrary::parse(library, diagnostics)?;
        }

        log::debug!(
            "parsed document: {} geometries, {} controllers, {} scenes, {} frames",
            document.geometries.len(),
            document.controllers.len(),
            document.scenes.len(),
            document.animations.max_frame_count
        );
        Ok(document)
    }

    pub fn geometry(&self, id: &str) -> Option<&Mesh> {
        self.geometries.get(id)
    }

    pub fn controller(&self, id: &str) -> Option<&Skin> {
        self.controllers.get(id)
    }

    pub fn material(&self, id: &str) -> Option<&Material> {
        self.materials.get(id)
    }

    pub fn effect(&self, id: &str) -> Option<&Effect> {
        self.effects.get(id)
    }

    pub fn image(&self, id: &str) -> Option<&Image> {
        self.images.get(id)
    }
}

fn parse_up_axis(root: &Element, diagnostics: &mut Diagnostics) -> UpAxis {
    let Some(value) = root
        .get_child("asset")
        .and_then(|asset| asset.get_child("up_axis"))
        .map(text)
    else {
        return UpAxis::Y;
    };
    match value.trim() {
        "X_UP" => UpAxis::X,
        "Y_UP" => UpAxis::Y,
        "Z_UP" => UpAxis::Z,
        other => {
            diagnostics.warn(
                diagnostics::UNSUPPORTED_UP_AXIS,
                format!("up axis '{other}' is not supported, no basis change applied"),
            );
            UpAxis::Unknown
        }
    }
}

// ─── XML helpers ──────────────────────────────────────────────────────────────

pub(crate) fn elements(parent: &Element) -> impl Iterator<Item = &Element> {
    parent.children.iter().filter_map(|node| match node {
        XMLNode::Element(e) => Some(e),
        _ => None,
    })
}

pub(crate) fn elements_named<'a>(
    parent: &'a Element,
    name: &'a str,
) -> impl Iterator<Item = &'a Element> + 'a {
    elements(parent).filter(move |e| e.name == name)
}

fn library_items<'a>(
    root: &'a Element,
    library: &'a str,
    item: &'a str,
) -> impl Iterator<Item = &'a Element> + 'a {
    elements_named(root, library).flat_map(move |lib| elements_named(lib, item))
}

pub(crate) fn attr<'a>(element: &'a Element, name: &str) -> Option<&'a str> {
    element.attributes.get(name).map(String::as_str)
}

pub(crate) fn required_attr<'a>(element: &'a Element, name: &str) -> ConversionResult<&'a str> {
    attr(element, name).ok_or_else(|| {
        ConversionError::parse(format!("<{}> is missing attribute '{name}'", element.name))
    })
}

pub(crate) fn text(element: &Element) -> String {
    element
        .get_text()
        .map(|t| t.into_owned())
        .unwrap_or_default()
}

pub(crate) fn parse_floats(element: &Element) -> ConversionResult<Vec<f32>> {
    text(element)
        .split_whitespace()
        .map(|token| {
            token.parse::<f32>().map_err(|_| {
                ConversionError::parse(format!("invalid float '{token}' in <{}>", element.name))
            })
        })
        .collect()
}

pub(crate) fn parse_ints<T: std::str::FromStr>(element: &Element) -> ConversionResult<Vec<T>> {
    text(element)
        .split_whitespace()
        .map(|token| {
            token.parse::<T>().map_err(|_| {
                ConversionError::parse(format!("invalid integer '{token}' in <{}>", element.name))
            })
        })
        .collect()
}

pub(crate) fn parse_usize_attr(element: &Element, name: &str) -> ConversionResult<Option<usize>> {
    attr(element, name)
        .map(|v| {
            v.trim().parse::<usize>().map_err(|_| {
                ConversionError::parse(format!(
                    "attribute '{name}' of <{}> is not a number: '{v}'",
                    element.name
                ))
            })
        })
        .transpose()
}

/// Drop the leading `#` of a URI fragment reference.
pub fn strip_ref(url: &str) -> &str {
    url.strip_prefix('#').unwrap_or(url)
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// A Z-up document with a two-joint skeleton skinning one triangle,
    /// animated over two frames, plus a phong material.
    pub const SKINNED_TRIANGLE: &str = r##"<?xml version="1.0" encoding="utf-8"?>
<COLLADA xmlns="http://www.collada.org/2005/11/COLLADASchema" version="1.4.1">
  <asset><up_axis>Z_UP</up_axis></asset>
  <library_images>
    <image id="skin_png"><init_from>textures/skin.png</init_from></image>
  </library_images>
  <library_effects>
    <effect id="skin_fx">
      <profile_COMMON>
        <newparam sid="skin_surface"><surface type="2D"><init_from>skin_png</init_from></surface></newparam>
        <newparam sid="skin_sampler"><sampler2D><source>skin_surface</source></sampler2D></newparam>
        <technique sid="common">
          <phong>
            <diffuse><texture texture="skin_sampler" texcoord="UVMap"/></diffuse>
            <specular><color>0.5 0.5 0.5 1</color></specular>
            <shininess><float>64</float></shininess>
          </phong>
        </technique>
      </profile_COMMON>
    </effect>
  </library_effects>
  <library_materials>
    <material id="skin_mat" name="Skin"><instance_effect url="#skin_fx"/></material>
  </library_materials>
  <library_geometries>
    <geometry id="tri_geo" name="Tri">
      <mesh>
        <source id="tri_pos">
          <float_array id="tri_pos_arr" count="9">0 0 0 1 0 0 0 1 0</float_array>
          <technique_common><accessor source="#tri_pos_arr" count="3" stride="3"/></technique_common>
        </source>
        <source id="tri_uv">
          <float_array id="tri_uv_arr" count="6">0 0 1 0 0 1</float_array>
          <technique_common><accessor source="#tri_uv_arr" count="3" stride="2"/></technique_common>
        </source>
        <vertices id="tri_vtx"><input semantic="POSITION" source="#tri_pos"/></vertices>
        <triangles material="skin_sym" count="1">
          <input semantic="VERTEX" source="#tri_vtx" offset="0"/>
          <input semantic="TEXCOORD" source="#tri_uv" offset="1" set="1"/>
          <p>0 0 1 1 2 2</p>
        </triangles>
      </mesh>
    </geometry>
  </library_geometries>
  <library_controllers>
    <controller id="tri_skin">
      <skin source="#tri_geo">
        <bind_shape_matrix>1 0 0 0 0 1 0 0 0 0 1 0 0 0 0 1</bind_shape_matrix>
        <source id="tri_joints">
          <Name_array id="tri_joints_arr" count="2">Root Tip</Name_array>
          <technique_common><accessor source="#tri_joints_arr" count="2" stride="1"/></technique_common>
        </source>
        <source id="tri_ibm">
          <float_array id="tri_ibm_arr" count="32">1 0 0 0 0 1 0 0 0 0 1 0 0 0 0 1 1 0 0 0 0 1 0 0 0 0 1 -1 0 0 0 1</float_array>
          <technique_common><accessor source="#tri_ibm_arr" count="2" stride="16"/></technique_common>
        </source>
        <source id="tri_weights">
          <float_array id="tri_weights_arr" count="3">1 0.5 0.5</float_array>
          <technique_common><accessor source="#tri_weights_arr" count="3" stride="1"/></technique_common>
        </source>
        <joints>
          <input semantic="JOINT" source="#tri_joints"/>
          <input semantic="INV_BIND_MATRIX" source="#tri_ibm"/>
        </joints>
        <vertex_weights count="3">
          <input semantic="JOINT" source="#tri_joints" offset="0"/>
          <input semantic="WEIGHT" source="#tri_weights" offset="1"/>
          <vcount>1 2 1</vcount>
          <v>0 0 0 1 1 2 1 0</v>
        </vertex_weights>
      </skin>
    </controller>
  </library_controllers>
  <library_animations>
    <animation id="tip_anim">
      <source id="tip_time">
        <float_array id="tip_time_arr" count="2">0 1</float_array>
        <technique_common><accessor source="#tip_time_arr" count="2" stride="1"/></technique_common>
      </source>
      <source id="tip_out">
        <float_array id="tip_out_arr" count="32">1 0 0 0 0 1 0 0 0 0 1 1 0 0 0 1 1 0 0 0 0 1 0 0 0 0 1 2 0 0 0 1</float_array>
        <technique_common><accessor source="#tip_out_arr" count="2" stride="16"/></technique_common>
      </source>
      <sampler id="tip_sampler">
        <input semantic="INPUT" source="#tip_time"/>
        <input semantic="OUTPUT" source="#tip_out"/>
      </sampler>
      <channel source="#tip_sampler" target="tip/transform"/>
    </animation>
  </library_animations>
  <library_visual_scenes>
    <visual_scene id="scene">
      <node id="armature" name="Armature">
        <node id="root" sid="Root" name="Root" type="JOINT">
          <matrix sid="transform">1 0 0 0 0 1 0 0 0 0 1 0 0 0 0 1</matrix>
          <node id="tip" sid="Tip" name="Tip" type="JOINT">
            <matrix sid="transform">1 0 0 0 0 1 0 0 0 0 1 1 0 0 0 1</matrix>
          </node>
        </node>
      </node>
      <node id="tri_node" name="Tri">
        <instance_controller url="#tri_skin">
          <skeleton>#root</skeleton>
          <bind_material><technique_common>
            <instance_material symbol="skin_sym" target="#skin_mat"/>
          </technique_common></bind_material>
        </instance_controller>
      </node>
    </visual_scene>
  </library_visual_scenes>
  <scene><instance_visual_scene url="#scene"/></scene>
</COLLADA>
"##;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_wrong_version_when_parsing_then_parse_error_is_returned() {
        let xml = r#"<COLLADA version="1.5.0"><library_geometries/></COLLADA>"#;
        let mut diagnostics = Diagnostics::new();
        let result = Document::parse(xml, &mut diagnostics);
        assert!(matches!(result, Err(ConversionError::Parse(_))));
    }

    #[test]
    fn given_missing_geometry_library_when_parsing_then_parse_error_is_returned() {
        let xml = r#"<COLLADA version="1.4.1"></COLLADA>"#;
        let mut diagnostics = Diagnostics::new();
        let result = Document::parse(xml, &mut diagnostics);
        assert!(matches!(result, Err(ConversionError::Parse(_))));
    }

    #[test]
    fn given_truncated_xml_when_parsing_then_xml_error_is_returned() {
        let mut diagnostics = Diagnostics::new();
        let result = Document::parse("<COLLADA version=\"1.4.1\">", &mut diagnostics);
        assert!(matches!(result, Err(ConversionError::Xml(_))));
    }

    #[test]
    fn given_unknown_up_axis_when_parsing_then_warning_and_unknown_axis() {
        let xml = r#"<COLLADA version="1.4.0"><asset><up_axis>W_UP</up_axis></asset><library_geometries/></COLLADA>"#;
        let mut diagnostics = Diagnostics::new();
        let document = Document::parse(xml, &mut diagnostics).expect("parse");
        assert_eq!(document.up_axis, UpAxis::Unknown);
        assert!(diagnostics.has(diagnostics::UNSUPPORTED_UP_AXIS));
    }

    #[test]
    fn given_fixture_when_parsing_then_all_libraries_are_filled() {
        let mut diagnostics = Diagnostics::new();
        let document = Document::parse(fixtures::SKINNED_TRIANGLE, &mut diagnostics).expect("parse");
        assert_eq!(document.up_axis, UpAxis::Z);
        assert!(document.image("skin_png").is_some());
        assert!(document.effect("skin_fx").is_some());
        assert_eq!(document.material("skin_mat").map(|m| m.name.as_str()), Some("Skin"));
        assert!(document.geometry("tri_geo").is_some());
        assert!(document.controller("tri_skin").is_some());
        assert_eq!(document.scenes.len(), 1);
        assert_eq!(document.animations.max_frame_count, 2);
        assert!(diagnostics.issues().is_empty());
    }

    #[test]
    fn given_reference_with_hash_when_stripping_then_prefix_is_removed() {
        assert_eq!(strip_ref("#node"), "node");
        assert_eq!(strip_ref("node"), "node");
    }
}
