use std::collections::HashMap;

use xmltree::Element;

use super::{Source, attr, elements_named, required_attr, strip_ref};
use crate::diagnostics::{self, Diagnostics};
use crate::error::ConversionResult;

/// Time keys and their sampled values.
#[derive(Debug, Clone, PartialEq)]
pub struct Sampler {
    pub id: String,
    pub input: Vec<f32>,
    pub output: Vec<f32>,
    /// Floats per output key.
    pub output_stride: usize,
}

impl Sampler {
    pub fn key_count(&self) -> usize {
        self.input.len()
    }

    /// Output values of key `index`.
    pub fn value(&self, index: usize) -> Option<&[f32]> {
        let start = index.checked_mul(self.output_stride)?;
        self.output.get(start..start + self.output_stride)
    }
}

/// Binding of a sampler to one transformation of one node.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub sampler: String,
    pub node_id: String,
    pub transform_sid: String,
    /// Single float addressed inside the transformation, if any.
    pub component: Option<usize>,
}

impl Channel {
    /// Parse `node/sid`, `node/sid.X`, `node/sid(i)` or `node/sid(i)(j)`.
    fn parse_target(sampler: String, target: &str) -> Option<Self> {
        let (node_id, rest) = target.split_once('/')?;
        if node_id.is_empty() || rest.is_empty() {
            return None;
        }
        let (transform_sid, component) = if let Some((sid, member)) = rest.split_once('.') {
            let component = match member {
                "X" => 0,
                "Y" => 1,
                "Z" => 2,
                "ANGLE" => 3,
                _ => return None,
            };
            (sid, Some(component))
        } else if let Some(open) = rest.find('(') {
            let indices: Option<Vec<usize>> = rest[open..]
                .split(')')
                .filter(|s| !s.is_empty())
                .map(|s| s.strip_prefix('(').and_then(|n| n.trim().parse().ok()))
                .collect();
            let component = match indices?.as_slice() {
                [i] => *i,
                [column, row] => row * 4 + column,
                _ => return None,
            };
            (&rest[..open], Some(component))
        } else {
            (rest, None)
        };
        Some(Self {
            sampler,
            node_id: node_id.to_string(),
            transform_sid: transform_sid.to_string(),
            component,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Animation {
    pub id: String,
    pub samplers: HashMap<String, Sampler>,
    pub channels: Vec<Channel>,
    pub children: Vec<Animation>,
}

impl Animation {
    fn parse(element: &Element, diagnostics: &mut Diagnostics) -> ConversionResult<Self> {
        let id = attr(element, "id").unwrap_or_default().to_string();

        let mut sources = HashMap::new();
        for source in elements_named(element, "source") {
            let source = Source::parse(source)?;
            sources.insert(source.id.clone(), source);
        }

        let mut samplers = HashMap::new();
        for sampler in elements_named(element, "sampler") {
            let sampler_id = required_attr(sampler, "id")?.to_string();
            let mut input = None;
            let mut output = None;
            for i in elements_named(sampler, "input") {
                let source = sources.get(strip_ref(required_attr(i, "source")?));
                match required_attr(i, "semantic")? {
                    "INPUT" => input = source,
                    "OUTPUT" => output = source,
                    _ => {}
                }
            }
            let (Some(input), Some(output)) = (input, output) else {
                diagnostics.warn(
                    diagnostics::INVALID_CHANNEL,
                    format!("sampler '{sampler_id}' lacks INPUT or OUTPUT data"),
                );
                continue;
            };
            samplers.insert(
                sampler_id.clone(),
                Sampler {
                    id: sampler_id,
                    input: input.floats().to_vec(),
                    output: output.floats().to_vec(),
                    output_stride: output.stride,
                },
            );
        }

        let mut channels = Vec::new();
        for channel in elements_named(element, "channel") {
            let sampler = strip_ref(required_attr(channel, "source")?).to_string();
            let target = required_attr(channel, "target")?;
            if !samplers.contains_key(&sampler) {
                diagnostics.warn(
                    diagnostics::INVALID_CHANNEL,
                    format!("channel '{target}' references missing sampler '{sampler}'"),
                );
                continue;
            }
            match Channel::parse_target(sampler, target) {
                Some(channel) => channels.push(channel),
                None => diagnostics.warn(
                    diagnostics::INVALID_CHANNEL,
                    format!("channel target '{target}' is not understood"),
                ),
            }
        }

        let mut children = Vec::new();
        for child in elements_named(element, "animation") {
            children.push(Animation::parse(child, diagnostics)?);
        }

        Ok(Self {
            id,
            samplers,
            channels,
            children,
        })
    }

    fn visit<'a>(&'a self, f: &mut dyn FnMut(&'a Animation)) {
        f(self);
        for child in &self.children {
            child.visit(f);
        }
    }
}

/// All animations of a document plus frame statistics.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnimationLibrary {
    pub animations: Vec<Animation>,
    /// Longest sampler input.
    pub max_frame_count: usize,
    /// Largest key time across all samplers.
    pub max_time: f32,
}

impl AnimationLibrary {
    pub(crate) fn parse(element: &Element, diagnostics: &mut Diagnostics) -> ConversionResult<Self> {
        let mut library = Self::default();
        for animation in elements_named(element, "animation") {
            library
                .animations
                .push(Animation::parse(animation, diagnostics)?);
        }

        let mut max_frame_count = 0;
        let mut max_time = 0.0f32;
        library.for_each(|animation| {
            for sampler in animation.samplers.values() {
                max_frame_count = max_frame_count.max(sampler.key_count());
                for &t in &sampler.input {
                    max_time = max_time.max(t);
                }
            }
        });
        library.max_frame_count = max_frame_count;
        library.max_time = max_time;
        Ok(library)
    }

    fn for_each<'a>(&'a self, mut f: impl FnMut(&'a Animation)) {
        for animation in &self.animations {
            animation.visit(&mut f);
        }
    }

    /// Channels targeting `node_id`, paired with their sampler.
    pub fn channels_for(&self, node_id: &str) -> Vec<(&Channel, &Sampler)> {
        let mut found = Vec::new();
        self.for_each(|animation| {
            for channel in &animation.channels {
                if channel.node_id == node_id {
                    if let Some(sampler) = animation.samplers.get(&channel.sampler) {
                        found.push((channel, sampler));
                    }
                }
            }
        });
        found
    }

    /// Frames per second over the longest animation, or 0 without animation.
    pub fn frame_rate(&self) -> f32 {
        if self.max_time > 0.0 {
            self.max_frame_count as f32 / self.max_time
        } else {
            0.0
        }
    }
}
