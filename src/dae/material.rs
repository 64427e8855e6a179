use std::collections::HashMap;

use xmltree::Element;

use super::{attr, elements, elements_named, parse_floats, required_attr, strip_ref, text};
use crate::error::ConversionResult;

/// An `<image>` entry. Only the file reference is kept.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub id: String,
    pub file: String,
}

impl Image {
    pub(crate) fn parse(element: &Element) -> ConversionResult<Self> {
        let file = element
            .get_child("init_from")
            .map(|e| text(e).trim().to_string())
            .unwrap_or_default();
        Ok(Self {
            id: required_attr(element, "id")?.to_string(),
            file,
        })
    }
}

/// Shading parameters of a `profile_COMMON` effect.
#[derive(Debug, Clone, PartialEq)]
pub struct Effect {
    pub id: String,
    pub diffuse: [f32; 4],
    /// Image id of the diffuse texture, when the diffuse slot is textured.
    pub diffuse_texture: Option<String>,
    pub specular: [f32; 4],
    /// Normalized to `[0, 1]`.
    pub shininess: f32,
}

const DEFAULT_SHININESS: f32 = 0.5;
const SHADING_MODELS: [&str; 4] = ["phong", "blinn", "lambert", "constant"];

impl Effect {
    pub(crate) fn parse(element: &Element) -> ConversionResult<Self> {
        let mut effect = Self {
            id: required_attr(element, "id")?.to_string(),
            diffuse: [1.0, 1.0, 1.0, 1.0],
            diffuse_texture: None,
            specular: [0.0, 0.0, 0.0, 1.0],
            shininess: DEFAULT_SHININESS,
        };
        let Some(profile) = element.get_child("profile_COMMON") else {
            return Ok(effect);
        };

        // newparam sid -> referenced surface sid or image id.
        let mut params: HashMap<String, String> = HashMap::new();
        for param in elements_named(profile, "newparam") {
            let Some(sid) = attr(param, "sid") else {
                continue;
            };
            let target = param
                .get_child("surface")
                .and_then(|s| s.get_child("init_from"))
                .or_else(|| param.get_child("sampler2D").and_then(|s| s.get_child("source")))
                .map(|e| text(e).trim().to_string());
            if let Some(target) = target {
                params.insert(sid.to_string(), target);
            }
        }

        let Some(model) = profile
            .get_child("technique")
            .and_then(|t| elements(t).find(|e| SHADING_MODELS.contains(&e.name.as_str())))
        else {
            return Ok(effect);
        };

        if let Some(diffuse) = model.get_child("diffuse") {
            if let Some(color) = diffuse.get_child("color") {
                effect.diffuse = read_color(color)?;
            } else if let Some(texture) = diffuse.get_child("texture") {
                effect.diffuse_texture = attr(texture, "texture").map(|t| resolve(&params, t));
            }
        }
        if let Some(color) = model.get_child("specular").and_then(|s| s.get_child("color")) {
            effect.specular = read_color(color)?;
        }
        if let Some(value) = model
            .get_child("shininess")
            .and_then(|s| s.get_child("float"))
        {
            if let Some(&shininess) = parse_floats(value)?.first() {
                effect.shininess = if shininess > 1.0 {
                    shininess / 128.0
                } else {
                    shininess
                };
            }
        }
        Ok(effect)
    }
}

/// Follow sampler -> surface -> image. A name that is not a parameter is
/// taken as an image id.
fn resolve(params: &HashMap<String, String>, name: &str) -> String {
    let mut current = name;
    // sampler2D -> surface -> image is at most two hops.
    for _ in 0..2 {
        match params.get(current) {
            Some(next) => current = next,
            None => break,
        }
    }
    current.to_string()
}

fn read_color(element: &Element) -> ConversionResult<[f32; 4]> {
    let values = parse_floats(element)?;
    let at = |i: usize, fallback: f32| values.get(i).copied().unwrap_or(fallback);
    Ok([at(0, 0.0), at(1, 0.0), at(2, 0.0), at(3, 1.0)])
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub id: String,
    /// Falls back to the id when the element has no name.
    pub name: String,
    pub effect: Option<String>,
}

impl Material {
    pub(crate) fn parse(element: &Element) -> ConversionResult<Self> {
        let id = required_attr(element, "id")?.to_string();
        Ok(Self {
            name: attr(element, "name").unwrap_or(&id).to_string(),
            effect: element
                .get_child("instance_effect")
                .and_then(|e| attr(e, "url"))
                .map(|u| strip_ref(u).to_string()),
            id,
        })
    }
}
