use std::{fs, path::Path};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Output container written by the exporter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    Txt,
    Bin,
}

impl Container {
    /// Parse a container name. Exactly three characters are required.
    pub fn parse(value: &str) -> Result<Self> {
        if value.len() != 3 {
            bail!("convert type must be exactly 3 characters, got '{value}'");
        }
        match value {
            "txt" => Ok(Self::Txt),
            "bin" => Ok(Self::Bin),
            other => bail!("unknown convert type '{other}' (expected 'txt' or 'bin')"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Txt => "txt",
            Self::Bin => "bin",
        }
    }
}

/// Which files the exporter writes for each input.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportContent {
    pub geometry: bool,
    pub animation: bool,
}

impl ExportContent {
    /// Substring match: `"geo+anim"`, `"anim"`, `"geometry"` are all accepted.
    pub fn parse(value: &str) -> Result<Self> {
        let content = Self {
            geometry: value.contains("geo"),
            animation: value.contains("anim"),
        };
        if !content.geometry && !content.animation {
            bail!("export type '{value}' selects neither 'geo' nor 'anim'");
        }
        Ok(content)
    }
}

impl Default for ExportContent {
    fn default() -> Self {
        Self {
            geometry: true,
            animation: false,
        }
    }
}

/// Source of the inverse-bind matrices attached to joints.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BindPose {
    /// Inverse of each joint's absolute transform in the authored scene.
    #[default]
    Computed,
    /// The skin controller's `INV_BIND_MATRIX` entries.
    Document,
}

/// Conversion options shared by the CLI and persisted settings files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    /// Reorder triangle indices for post-transform cache reuse.
    pub cache_optimize: bool,
    pub export: ExportContent,
    pub container: Container,
    /// Write joint poses relative to the parent instead of absolute.
    pub relative_matrices: bool,
    pub export_materials: bool,
    /// Texture-coordinate channel used for tangent synthesis.
    pub tex_channel: usize,
    pub bind_pose: BindPose,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            cache_optimize: true,
            export: ExportContent::default(),
            container: Container::Txt,
            relative_matrices: false,
            export_materials: false,
            tex_channel: 0,
            bind_pose: BindPose::Computed,
        }
    }
}

/// Save conversion options to a JSON file.
pub fn save_settings(path: &Path, options: &ConvertOptions) -> Result<()> {
    let content =
        serde_json::to_string_pretty(options).context("failed to serialize settings as JSON")?;
    fs::write(path, content)
        .with_context(|| format!("failed to save settings: {}", path.display()))?;
    Ok(())
}

/// Load conversion options from a JSON file. Missing fields take defaults.
pub fn load_settings(path: &Path) -> Result<ConvertOptions> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to load settings: {}", path.display()))?;
    let options: ConvertOptions =
        serde_json::from_str(&content).context("failed to parse settings JSON")?;
    Ok(options)
}
