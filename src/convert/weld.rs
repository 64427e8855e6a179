use nalgebra::{Matrix4, Vector2, Vector3};

use super::skinning::{ResolvedInstance, ResolvedSkin};
use crate::dae::{Document, Instance, Primitive, Semantic, Source};
use crate::diagnostics::{self, Diagnostics};
use crate::error::{ConversionError, ConversionResult};
use crate::internal::{Aabb, SubMesh, Weight};
use crate::math::{slice_near, transform_direction, transform_point_w};

/// Attribute values gathered for one face corner.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexRecord {
    pub position: Vector3<f32>,
    pub normal: Option<Vector3<f32>>,
    pub tangent: Option<Vector3<f32>>,
    pub bitangent: Option<Vector3<f32>>,
    pub color: Option<Vector3<f32>>,
    /// One coordinate pair per texture channel.
    pub tex_coords: Vec<Vector2<f32>>,
}

impl VertexRecord {
    /// Every populated attribute equal within `EPSILON`.
    fn matches(&self, other: &Self) -> bool {
        fn near(a: &Option<Vector3<f32>>, b: &Option<Vector3<f32>>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => slice_near(a.as_slice(), b.as_slice()),
                (None, None) => true,
                _ => false,
            }
        }
        slice_near(self.position.as_slice(), other.position.as_slice())
            && near(&self.normal, &other.normal)
            && near(&self.tangent, &other.tangent)
            && near(&self.bitangent, &other.bitangent)
            && near(&self.color, &other.color)
            && self.tex_coords.len() == other.tex_coords.len()
            && self
                .tex_coords
                .iter()
                .zip(&other.tex_coords)
                .all(|(a, b)| slice_near(a.as_slice(), b.as_slice()))
    }
}

/// Accumulates unique vertices and the triangle list of one submesh.
#[derive(Debug)]
pub struct Welder {
    name: String,
    material: String,
    skinned: bool,
    vertices: Vec<VertexRecord>,
    weights: Vec<Vec<Weight>>,
    indices: Vec<u32>,
}

impl Welder {
    pub fn new(name: impl Into<String>, material: impl Into<String>, skinned: bool) -> Self {
        Self {
            name: name.into(),
            material: material.into(),
            skinned,
            vertices: Vec::new(),
            weights: Vec::new(),
            indices: Vec::new(),
        }
    }

    /// Append one corner. An equal vertex already emitted is reused; otherwise
    /// the record is added with the weights produced by `weights`.
    pub fn push(&mut self, vertex: VertexRecord, weights: impl FnOnce() -> Vec<Weight>) -> u32 {
        let index = match self.vertices.iter().position(|v| v.matches(&vertex)) {
            Some(found) => found,
            None => {
                self.vertices.push(vertex);
                if self.skinned {
                    self.weights.push(weights());
                }
                self.vertices.len() - 1
            }
        };
        let index = index as u32;
        self.indices.push(index);
        index
    }

    pub fn finish(self) -> SubMesh {
        fn column(
            vertices: &[VertexRecord],
            pick: impl Fn(&VertexRecord) -> Option<Vector3<f32>>,
        ) -> Vec<Vector3<f32>> {
            vertices.iter().map(&pick).collect::<Option<Vec<_>>>().unwrap_or_default()
        }

        let positions: Vec<Vector3<f32>> = self.vertices.iter().map(|v| v.position).collect();
        let channels = self.vertices.first().map_or(0, |v| v.tex_coords.len());
        let tex_coords = (0..channels)
            .map(|c| {
                self.vertices
                    .iter()
                    .map(|v| v.tex_coords.get(c).copied().unwrap_or_else(Vector2::zeros))
                    .collect()
            })
            .collect();

        SubMesh {
            name: self.name,
            material: self.material,
            bbox: Aabb::from_points(&positions),
            normals: column(&self.vertices, |v| v.normal),
            tangents: column(&self.vertices, |v| v.tangent),
            bitangents: column(&self.vertices, |v| v.bitangent),
            colors: column(&self.vertices, |v| v.color),
            positions,
            tex_coords,
            weights: self.weights,
            indices: self.indices,
        }
    }
}

// ─── Instance welding ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attribute {
    Position,
    Normal,
    Tangent,
    Bitangent,
    Color,
    TexCoord,
}

/// One attribute stream of a primitive: where its index sits in a corner
/// tuple and which source it reads.
#[derive(Debug, Clone, Copy)]
struct Stream<'d> {
    attribute: Attribute,
    source: &'d Source,
    slot: usize,
    set: u32,
}

fn attribute_of(semantic: Semantic) -> Option<Attribute> {
    Some(match semantic {
        Semantic::Position => Attribute::Position,
        Semantic::Normal => Attribute::Normal,
        Semantic::Tangent | Semantic::TexTangent => Attribute::Tangent,
        Semantic::Binormal | Semantic::TexBinormal => Attribute::Bitangent,
        Semantic::Color => Attribute::Color,
        Semantic::TexCoord => Attribute::TexCoord,
        Semantic::Vertex => return None,
    })
}

/// Streams of `primitive` with `VERTEX` expanded to the `<vertices>` inputs.
/// Only the first stream of each single-valued attribute is kept; texture
/// streams are ordered by set.
fn streams<'d>(
    resolved: &ResolvedInstance<'d>,
    primitive: &'d Primitive,
) -> ConversionResult<Vec<Stream<'d>>> {
    let mesh = resolved.mesh;
    let lookup = move |id: &str| {
        mesh.source(id).ok_or_else(|| {
            ConversionError::Reference(format!("mesh '{}' has no source '{id}'", mesh.id))
        })
    };

    let mut streams: Vec<Stream<'d>> = Vec::new();
    let mut add = |stream: Stream<'d>| {
        let single = stream.attribute != Attribute::TexCoord;
        if !(single && streams.iter().any(|s| s.attribute == stream.attribute)) {
            streams.push(stream);
        }
    };
    for (slot, input) in primitive.inputs.iter().enumerate() {
        if input.semantic == Semantic::Vertex {
            for vertex_input in &mesh.vertex_inputs {
                if let Some(attribute) = attribute_of(vertex_input.semantic) {
                    add(Stream {
                        attribute,
                        source: lookup(&vertex_input.source)?,
                        slot,
                        set: vertex_input.set,
                    });
                }
            }
        } else if let Some(attribute) = attribute_of(input.semantic) {
            add(Stream {
                attribute,
                source: lookup(&input.source)?,
                slot,
                set: input.set,
            });
        }
    }
    streams.sort_by_key(|s| (s.attribute == Attribute::TexCoord, s.set));

    if !streams.iter().any(|s| s.attribute == Attribute::Position) {
        return Err(ConversionError::MissingData(format!(
            "primitive of mesh '{}' has no position stream",
            mesh.id
        )));
    }
    Ok(streams)
}

/// Read `width` floats of item `index` from `source`.
fn read<'s>(source: &'s Source, index: u32, width: usize) -> ConversionResult<&'s [f32]> {
    source
        .item(index as usize)
        .filter(|item| item.len() >= width)
        .map(|item| &item[..width])
        .ok_or_else(|| {
            ConversionError::parse(format!(
                "index {index} out of range for source '{}' ({} items)",
                source.id,
                source.len()
            ))
        })
}

/// Material name for a primitive's symbol: instance binding first, then a
/// material id, else the symbol itself.
fn material_name(
    document: &Document,
    instance: &Instance,
    symbol: Option<&str>,
    used_materials: &mut Vec<String>,
    diagnostics: &mut Diagnostics,
) -> String {
    let Some(symbol) = symbol else {
        return String::new();
    };
    let id = instance
        .material_bindings
        .get(symbol)
        .map(String::as_str)
        .unwrap_or(symbol);
    match document.material(id) {
        Some(material) => {
            if !used_materials.iter().any(|m| m == &material.id) {
                used_materials.push(material.id.clone());
            }
            material.name.clone()
        }
        None => {
            diagnostics.warn(
                diagnostics::MISSING_MATERIAL,
                format!("material '{symbol}' is not defined; name kept verbatim"),
            );
            symbol.to_string()
        }
    }
}

fn influences(skin: &ResolvedSkin<'_>, position_index: u32) -> Vec<Weight> {
    let Some(list) = skin.skin.influences.get(position_index as usize) else {
        return Vec::new();
    };
    list.iter()
        .filter_map(|influence| {
            let joint = (*skin.joint_map.get(influence.joint)?)?;
            let weight = skin.skin.weight(influence.weight)?;
            Some(Weight { joint, weight })
        })
        .collect()
}

/// Weld every primitive of an instance into its own submesh.
///
/// `transform` maps geometry space to the exported world space. Positions
/// are transformed as points, the other vector attributes as directions.
/// Materials referenced by the result are appended to `used_materials`.
pub fn weld_instance(
    document: &Document,
    instance: &Instance,
    resolved: &ResolvedInstance<'_>,
    transform: &Matrix4<f32>,
    name: &str,
    used_materials: &mut Vec<String>,
    diagnostics: &mut Diagnostics,
) -> ConversionResult<Vec<SubMesh>> {
    let mut submeshes = Vec::with_capacity(resolved.mesh.primitives.len());
    for primitive in &resolved.mesh.primitives {
        let streams = streams(resolved, primitive)?;
        let material = material_name(
            document,
            instance,
            primitive.material.as_deref(),
            used_materials,
            diagnostics,
        );
        let mut welder = Welder::new(name, material, resolved.skin.is_some());
        let mut non_affine = false;

        for corner in &primitive.corners {
            let mut vertex = VertexRecord::default();
            let mut position_index = 0;
            for stream in &streams {
                let index = *corner.get(stream.slot).ok_or_else(|| {
                    ConversionError::parse(format!(
                        "corner of mesh '{}' lacks index slot {}",
                        resolved.mesh.id, stream.slot
                    ))
                })?;
                match stream.attribute {
                    Attribute::Position => {
                        let v = read(stream.source, index, 3)?;
                        let (p, w) = transform_point_w(transform, &Vector3::new(v[0], v[1], v[2]));
                        non_affine |= (w - 1.0).abs() > f32::EPSILON;
                        vertex.position = p;
                        position_index = index;
                    }
                    Attribute::Normal | Attribute::Tangent | Attribute::Bitangent => {
                        let v = read(stream.source, index, 3)?;
                        let d = Some(transform_direction(transform, &Vector3::new(v[0], v[1], v[2])));
                        match stream.attribute {
                            Attribute::Normal => vertex.normal = d,
                            Attribute::Tangent => vertex.tangent = d,
                            _ => vertex.bitangent = d,
                        }
                    }
                    Attribute::Color => {
                        let v = read(stream.source, index, 3)?;
                        vertex.color = Some(Vector3::new(v[0], v[1], v[2]));
                    }
                    Attribute::TexCoord => {
                        let v = read(stream.source, index, 2)?;
                        vertex.tex_coords.push(Vector2::new(v[0], v[1]));
                    }
                }
            }
            welder.push(vertex, || {
                resolved
                    .skin
                    .as_ref()
                    .map(|skin| influences(skin, position_index))
                    .unwrap_or_default()
            });
        }

        if non_affine {
            diagnostics.warn(
                diagnostics::NON_AFFINE_TRANSFORM,
                format!("transform of '{name}' is not affine; w component dropped"),
            );
        }
        let submesh = welder.finish();
        log::debug!(
            "welded '{}': {} corners -> {} vertices",
            submesh.name,
            primitive.corners.len(),
            submesh.vertex_count()
        );
        submeshes.push(submesh);
    }
    Ok(submeshes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::scene_graph::SceneGraph;
    use crate::convert::skinning::resolve_instance;
    use crate::dae::fixtures;
    use crate::settings::BindPose;

    fn record(p: [f32; 3], uv: [f32; 2]) -> VertexRecord {
        VertexRecord {
            position: Vector3::new(p[0], p[1], p[2]),
            tex_coords: vec![Vector2::new(uv[0], uv[1])],
            ..VertexRecord::default()
        }
    }

    #[test]
    fn given_quad_split_into_two_triangles_when_welding_then_four_vertices_remain() {
        let mut welder = Welder::new("quad", "m", false);
        let corners = [
            ([0.0, 0.0, 0.0], [0.0, 0.0]),
            ([1.0, 0.0, 0.0], [1.0, 0.0]),
            ([1.0, 1.0, 0.0], [1.0, 1.0]),
            ([0.0, 0.0, 0.0], [0.0, 0.0]),
            ([1.0, 1.0, 0.0], [1.0, 1.0]),
            ([0.0, 1.0, 0.0], [0.0, 1.0]),
        ];
        for (p, uv) in corners {
            welder.push(record(p, uv), Vec::new);
        }
        let mesh = welder.finish();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(mesh.tex_coords.len(), 1);
        assert!(mesh.weights.is_empty());
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn given_same_position_with_different_uv_when_welding_then_vertices_stay_apart() {
        let mut welder = Welder::new("seam", "m", false);
        welder.push(record([0.0, 0.0, 0.0], [0.0, 0.0]), Vec::new);
        welder.push(record([0.0, 0.0, 0.0], [0.5, 0.0]), Vec::new);
        welder.push(record([0.00001, 0.0, 0.0], [0.0, 0.00001]), Vec::new);
        let mesh = welder.finish();
        assert_eq!(mesh.vertex_count(), 2);
        assert_eq!(mesh.indices, vec![0, 1, 0]);
    }

    #[test]
    fn given_skinned_welder_when_vertex_is_reused_then_first_weights_are_kept() {
        let mut welder = Welder::new("s", "m", true);
        welder.push(record([0.0, 0.0, 0.0], [0.0, 0.0]), || vec![Weight { joint: 1, weight: 1.0 }]);
        welder.push(record([0.0, 0.0, 0.0], [0.0, 0.0]), || vec![Weight { joint: 2, weight: 1.0 }]);
        welder.push(record([1.0, 0.0, 0.0], [0.0, 0.0]), Vec::new);
        let mesh = welder.finish();
        assert_eq!(mesh.weights.len(), 2);
        assert_eq!(mesh.weights[0], vec![Weight { joint: 1, weight: 1.0 }]);
        assert!(mesh.weights[1].is_empty());
    }

    #[test]
    fn given_skinned_fixture_when_welding_then_world_positions_and_weights_are_attached() {
        let mut diagnostics = Diagnostics::new();
        let document = Document::parse(fixtures::SKINNED_TRIANGLE, &mut diagnostics).expect("parse");
        let mut graph = SceneGraph::build(&document, 0, &mut diagnostics).expect("graph");
        let (_, node) = graph.meshes().next().expect("mesh");
        let (instance, absolute) = (node.source.instances[0].clone(), node.absolute);
        let resolved =
            resolve_instance(&document, &mut graph, &instance, BindPose::Computed, &mut diagnostics)
                .expect("resolve");
        let transform = absolute * resolved.skin.as_ref().expect("skin").bind_shape();
        let mut used = Vec::new();
        let meshes = weld_instance(
            &document,
            &instance,
            &resolved,
            &transform,
            "Tri",
            &mut used,
            &mut diagnostics,
        )
        .expect("weld");

        assert_eq!(meshes.len(), 1);
        let mesh = &meshes[0];
        assert_eq!(mesh.material, "Skin");
        assert_eq!(used, vec!["skin_mat".to_string()]);
        assert_eq!(mesh.vertex_count(), 3);
        // (0, 1, 0) authored Z-up lands on (0, 0, -1).
        assert!((mesh.positions[2] - Vector3::new(0.0, 0.0, -1.0)).norm() < 1e-5);
        assert_eq!(mesh.tex_coords[0][1], Vector2::new(1.0, 0.0));
        assert_eq!(mesh.weights[0], vec![Weight { joint: 1, weight: 1.0 }]);
        assert_eq!(
            mesh.weights[1],
            vec![Weight { joint: 1, weight: 0.5 }, Weight { joint: 2, weight: 0.5 }]
        );
        assert!(!diagnostics.has(diagnostics::MISSING_MATERIAL));
    }

    #[test]
    fn given_unbound_material_symbol_when_welding_then_symbol_is_used_verbatim() {
        let xml = fixtures::SKINNED_TRIANGLE.replace(r##"target="#skin_mat""##, r##"target="#gone""##);
        let mut diagnostics = Diagnostics::new();
        let document = Document::parse(&xml, &mut diagnostics).expect("parse");
        let instance = Instance {
            url: "tri_geo".to_string(),
            controller: false,
            material_bindings: Default::default(),
            skeleton: None,
        };
        let resolved = ResolvedInstance {
            mesh: document.geometry("tri_geo").expect("geometry"),
            skin: None,
        };
        let mut used = Vec::new();
        let meshes = weld_instance(
            &document,
            &instance,
            &resolved,
            &Matrix4::identity(),
            "Tri",
            &mut used,
            &mut diagnostics,
        )
        .expect("weld");
        assert_eq!(meshes[0].material, "skin_sym");
        assert!(used.is_empty());
        assert!(diagnostics.has(diagnostics::MISSING_MATERIAL));
        assert!(meshes[0].weights.is_empty());
    }

    #[test]
    fn given_index_past_source_end_when_welding_then_parse_error() {
        let xml = fixtures::SKINNED_TRIANGLE.replace("<p>0 0 1 1 2 2</p>", "<p>0 0 1 1 7 2</p>");
        let mut diagnostics = Diagnostics::new();
        let document = Document::parse(&xml, &mut diagnostics).expect("parse");
        let instance = Instance {
            url: "tri_geo".to_string(),
            controller: false,
            material_bindings: Default::default(),
            skeleton: None,
        };
        let resolved = ResolvedInstance {
            mesh: document.geometry("tri_geo").expect("geometry"),
            skin: None,
        };
        let result = weld_instance(
            &document,
            &instance,
            &resolved,
            &Matrix4::identity(),
            "Tri",
            &mut Vec::new(),
            &mut diagnostics,
        );
        assert!(matches!(result, Err(ConversionError::Parse(_))));
    }
}
