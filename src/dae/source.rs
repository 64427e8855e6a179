use xmltree::Element;

use super::{elements, parse_floats, parse_usize_attr, required_attr, text};
use crate::error::{ConversionError, ConversionResult};
use crate::math::round_eps;

/// Payload of a `<source>` element.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceData {
    Floats(Vec<f32>),
    /// `Name_array` entries, matched against joint sids.
    Names(Vec<String>),
    /// `IDREF_array` entries, matched against node ids.
    IdRefs(Vec<String>),
}

/// A flat array with a stride ("params per item").
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub id: String,
    pub data: SourceData,
    pub stride: usize,
}

impl Source {
    pub(crate) fn parse(element: &Element) -> ConversionResult<Self> {
        let id = required_attr(element, "id")?.to_string();
        let array = elements(element)
            .find(|e| matches!(e.name.as_str(), "float_array" | "Name_array" | "IDREF_array"))
            .ok_or_else(|| ConversionError::parse(format!("source '{id}' has no supported array")))?;

        let data = match array.name.as_str() {
            "float_array" => {
                SourceData::Floats(parse_floats(array)?.into_iter().map(round_eps).collect())
            }
            "Name_array" => SourceData::Names(split_names(array)),
            _ => SourceData::IdRefs(split_names(array)),
        };
        let len = match &data {
            SourceData::Floats(v) => v.len(),
            SourceData::Names(v) | SourceData::IdRefs(v) => v.len(),
        };
        let count = parse_usize_attr(array, "count")?.unwrap_or(len);
        if count > len {
            return Err(ConversionError::parse(format!(
                "source '{id}' declares {count} values but holds {len}"
            )));
        }

        let accessor = element
            .get_child("technique_common")
            .and_then(|t| t.get_child("accessor"));
        let stride = match accessor {
            Some(accessor) => match parse_usize_attr(accessor, "stride")? {
                Some(stride) => stride,
                None => match parse_usize_attr(accessor, "count")? {
                    Some(items) if items > 0 => count / items,
                    _ => 1,
                },
            },
            None => 1,
        }
        .max(1);

        Ok(Self { id, data, stride })
    }

    pub fn floats(&self) -> &[f32] {
        match &self.data {
            SourceData::Floats(v) => v,
            _ => &[],
        }
    }

    pub fn names(&self) -> &[String] {
        match &self.data {
            SourceData::Names(v) | SourceData::IdRefs(v) => v,
            SourceData::Floats(_) => &[],
        }
    }

    pub fn is_idref(&self) -> bool {
        matches!(self.data, SourceData::IdRefs(_))
    }

    /// Number of items, i.e. values divided by stride.
    pub fn len(&self) -> usize {
        match &self.data {
            SourceData::Floats(v) => v.len() / self.stride,
            SourceData::Names(v) | SourceData::IdRefs(v) => v.len() / self.stride,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `index`-th float item, `stride` values long.
    pub fn item(&self, index: usize) -> Option<&[f32]> {
        let start = index.checked_mul(self.stride)?;
        self.floats().get(start..start + self.stride)
    }
}

fn split_names(array: &Element) -> Vec<String> {
    text(array).split_whitespace().map(str::to_string).collect()
}
