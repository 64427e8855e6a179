use std::collections::HashMap;

use xmltree::Element;

use super::{
    Source, attr, elements, elements_named, parse_ints, parse_usize_attr, required_attr, strip_ref,
};
use crate::error::{ConversionError, ConversionResult};

/// Per-corner attribute semantics understood by the welder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Semantic {
    Vertex,
    Position,
    Normal,
    Tangent,
    Binormal,
    TexTangent,
    TexBinormal,
    Color,
    TexCoord,
}

impl Semantic {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "VERTEX" => Self::Vertex,
            "POSITION" => Self::Position,
            "NORMAL" => Self::Normal,
            "TANGENT" => Self::Tangent,
            "BINORMAL" => Self::Binormal,
            "TEXTANGENT" => Self::TexTangent,
            "TEXBINORMAL" => Self::TexBinormal,
            "COLOR" => Self::Color,
            "TEXCOORD" => Self::TexCoord,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Input {
    pub semantic: Semantic,
    /// Source id, without the `#` prefix.
    pub source: String,
    pub offset: usize,
    pub set: u32,
}

/// One primitive group, already triangulated.
#[derive(Debug, Clone, PartialEq)]
pub struct Primitive {
    /// Material symbol as written on the primitive.
    pub material: Option<String>,
    pub inputs: Vec<Input>,
    /// Triangle corners in winding order. Each corner carries one index per
    /// entry of `inputs`, in the same order.
    pub corners: Vec<Vec<u32>>,
}

impl Primitive {
    pub fn triangle_count(&self) -> usize {
        self.corners.len() / 3
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub id: String,
    pub name: Option<String>,
    pub sources: HashMap<String, Source>,
    /// Inputs of the `<vertices>` element. Always contains `Position`.
    pub vertex_inputs: Vec<Input>,
    pub primitives: Vec<Primitive>,
}

impl Mesh {
    pub(crate) fn parse(geometry: &Element, mesh: &Element) -> ConversionResult<Self> {
        let id = required_attr(geometry, "id")?.to_string();

        let mut sources = HashMap::new();
        for source in elements_named(mesh, "source") {
            let source = Source::parse(source)?;
            sources.insert(source.id.clone(), source);
        }

        let vertices = mesh
            .get_child("vertices")
            .ok_or_else(|| ConversionError::parse(format!("mesh '{id}' has no <vertices>")))?;
        let vertex_inputs = parse_inputs(vertices)?;
        if !vertex_inputs.iter().any(|i| i.semantic == Semantic::Position) {
            return Err(ConversionError::parse(format!(
                "vertices of mesh '{id}' have no POSITION input"
            )));
        }

        let mut primitives = Vec::new();
        for element in elements(mesh) {
            let primitive = match element.name.as_str() {
                "triangles" => parse_triangles(element)?,
                "polylist" => parse_polylist(element)?,
                "polygons" => parse_polygons(element)?,
                _ => continue,
            };
            primitives.push(primitive);
        }

        Ok(Self {
            id,
            name: attr(geometry, "name").map(str::to_string),
            sources,
            vertex_inputs,
            primitives,
        })
    }

    pub fn source(&self, id: &str) -> Option<&Source> {
        self.sources.get(id)
    }
}

fn parse_inputs(parent: &Element) -> ConversionResult<Vec<Input>> {
    let mut inputs = Vec::new();
    for input in elements_named(parent, "input") {
        let Some(semantic) = Semantic::parse(required_attr(input, "semantic")?) else {
            continue;
        };
        inputs.push(Input {
            semantic,
            source: strip_ref(required_attr(input, "source")?).to_string(),
            offset: parse_usize_attr(input, "offset")?.unwrap_or(0),
            set: parse_usize_attr(input, "set")?.unwrap_or(0) as u32,
        });
    }
    Ok(inputs)
}

/// Width of one index tuple in `<p>`: the largest offset of any input,
/// including inputs whose semantic is ignored.
fn tuple_width(parent: &Element) -> ConversionResult<usize> {
    let mut width = 0;
    for input in elements_named(parent, "input") {
        width = width.max(parse_usize_attr(input, "offset")?.unwrap_or(0) + 1);
    }
    Ok(width.max(1))
}

struct PrimitiveReader {
    material: Option<String>,
    inputs: Vec<Input>,
    width: usize,
    corners: Vec<Vec<u32>>,
}

impl PrimitiveReader {
    fn new(element: &Element) -> ConversionResult<Self> {
        let inputs = parse_inputs(element)?;
        if !inputs.iter().any(|i| i.semantic == Semantic::Vertex) {
            return Err(ConversionError::parse(format!(
                "<{}> has no VERTEX input",
                element.name
            )));
        }
        Ok(Self {
            material: attr(element, "material").map(str::to_string),
            inputs,
            width: tuple_width(element)?,
            corners: Vec::new(),
        })
    }

    fn corner(&self, indices: &[u32], corner: usize) -> ConversionResult<Vec<u32>> {
        let base = corner * self.width;
        let tuple = indices
            .get(base..base + self.width)
            .ok_or_else(|| ConversionError::parse("primitive index list is truncated"))?;
        Ok(self.inputs.iter().map(|i| tuple[i.offset]).collect())
    }

    /// Fan-triangulate one polygon of `vertex_count` corners starting at
    /// corner `first`. Polygons are assumed convex.
    fn push_polygon(
        &mut self,
        indices: &[u32],
        first: usize,
        vertex_count: usize,
    ) -> ConversionResult<()> {
        if vertex_count < 3 {
            return Ok(());
        }
        let anchor = self.corner(indices, first)?;
        for k in 1..vertex_count - 1 {
            let b = self.corner(indices, first + k)?;
            let c = self.corner(indices, first + k + 1)?;
            self.corners.push(anchor.clone());
            self.corners.push(b);
            self.corners.push(c);
        }
        Ok(())
    }

    fn finish(self) -> Primitive {
        Primitive {
            material: self.material,
            inputs: self.inputs,
            corners: self.corners,
        }
    }
}

fn parse_triangles(element: &Element) -> ConversionResult<Primitive> {
    let mut reader = PrimitiveReader::new(element)?;
    if let Some(p) = element.get_child("p") {
        let indices: Vec<u32> = parse_ints(p)?;
        let triangles = indices.len() / (reader.width * 3);
        for t in 0..triangles {
            reader.push_polygon(&indices, t * 3, 3)?;
        }
    }
    Ok(reader.finish())
}

fn parse_polylist(element: &Element) -> ConversionResult<Primitive> {
    let mut reader = PrimitiveReader::new(element)?;
    let vcount: Vec<usize> = element
        .get_child("vcount")
        .map(parse_ints::<usize>)
        .transpose()?
        .ok_or_else(|| ConversionError::parse("<polylist> has no <vcount>"))?;
    if let Some(p) = element.get_child("p") {
        let indices: Vec<u32> = parse_ints(p)?;
        let mut first = 0;
        for count in vcount {
            reader.push_polygon(&indices, first, count)?;
            first += count;
        }
    }
    Ok(reader.finish())
}

fn parse_polygons(element: &Element) -> ConversionResult<Primitive> {
    let mut reader = PrimitiveReader::new(element)?;
    for p in elements_named(element, "p") {
        let indices: Vec<u32> = parse_ints(p)?;
        let count = indices.len() / reader.width;
        reader.push_polygon(&indices, 0, count)?;
    }
    Ok(reader.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(xml: &str) -> ConversionResult<Mesh> {
        let geometry = Element::parse(xml.as_bytes()).expect("xml");
        let mesh = geometry.get_child("mesh").expect("mesh").clone();
        Mesh::parse(&geometry, &mesh)
    }

    const QUAD_SOURCES: &str = r##"
        <source id="p"><float_array count="12">0 0 0 1 0 0 1 1 0 0 1 0</float_array>
          <technique_common><accessor count="4" stride="3"/></technique_common></source>
        <vertices id="v"><input semantic="POSITION" source="#p"/></vertices>"##;

    #[test]
    fn given_polylist_quad_when_parsing_then_fan_produces_two_triangles() {
        let mesh = parse(&format!(
            r##"<geometry id="g"><mesh>{QUAD_SOURCES}
                <polylist count="1" material="m">
                  <input semantic="VERTEX" source="#v" offset="0"/>
                  <vcount>4</vcount><p>0 1 2 3</p>
                </polylist></mesh></geometry>"##
        ))
        .expect("mesh");
        let primitive = &mesh.primitives[0];
        assert_eq!(primitive.triangle_count(), 2);
        let flat: Vec<u32> = primitive.corners.iter().map(|c| c[0]).collect();
        assert_eq!(flat, vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(primitive.material.as_deref(), Some("m"));
    }

    #[test]
    fn given_interleaved_offsets_when_parsing_then_each_input_reads_its_offset() {
        let mesh = parse(&format!(
            r##"<geometry id="g"><mesh>{QUAD_SOURCES}
                <triangles count="1">
                  <input semantic="VERTEX" source="#v" offset="0"/>
                  <input semantic="NORMAL" source="#n" offset="1"/>
                  <p>0 5 1 6 2 7</p>
                </triangles></mesh></geometry>"##
        ))
        .expect("mesh");
        let corners = &mesh.primitives[0].corners;
        assert_eq!(corners[1], vec![1, 6]);
        assert_eq!(mesh.primitives[0].inputs[1].source, "n");
    }

    #[test]
    fn given_polygons_with_multiple_p_when_parsing_then_each_polygon_is_triangulated() {
        let mesh = parse(&format!(
            r##"<geometry id="g"><mesh>{QUAD_SOURCES}
                <polygons count="2">
                  <input semantic="VERTEX" source="#v" offset="0"/>
                  <p>0 1 2</p><p>0 2 3</p>
                </polygons></mesh></geometry>"##
        ))
        .expect("mesh");
        assert_eq!(mesh.primitives[0].triangle_count(), 2);
    }

    #[test]
    fn given_polylist_without_vcount_when_parsing_then_parse_error() {
        let result = parse(&format!(
            r##"<geometry id="g"><mesh>{QUAD_SOURCES}
                <polylist count="1"><input semantic="VERTEX" source="#v" offset="0"/>
                <p>0 1 2</p></polylist></mesh></geometry>"##
        ));
        assert!(matches!(result, Err(ConversionError::Parse(_))));
    }

    #[test]
    fn given_vertices_without_position_when_parsing_then_parse_error() {
        let result = parse(
            r##"<geometry id="g"><mesh>
                <vertices id="v"><input semantic="NORMAL" source="#n"/></vertices>
                </mesh></geometry>"##,
        );
        assert!(matches!(result, Err(ConversionError::Parse(_))));
    }
}
