use std::path::PathBuf;

use anyhow::Result;
use clap::ValueHint;

use crate::settings::{
    BindPose, Container, ConvertOptions, ExportContent, load_settings, save_settings,
};

fn parse_flag(value: &str) -> Result<bool, String> {
    match value {
        "0" | "false" => Ok(false),
        "1" | "true" => Ok(true),
        other => Err(format!("expected 0 or 1, got '{other}'")),
    }
}

fn parse_export(value: &str) -> Result<ExportContent, String> {
    ExportContent::parse(value).map_err(|e| e.to_string())
}

fn parse_container(value: &str) -> Result<Container, String> {
    Container::parse(value).map_err(|e| e.to_string())
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, clap::ValueEnum)]
pub enum BindPoseArg {
    Computed,
    Document,
}

impl From<BindPoseArg> for BindPose {
    fn from(value: BindPoseArg) -> Self {
        match value {
            BindPoseArg::Computed => BindPose::Computed,
            BindPoseArg::Document => BindPose::Document,
        }
    }
}

/// Convert COLLADA scenes into text mesh, animation and material files.
#[derive(Debug, clap::Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Vertex cache optimization
    #[arg(long, value_name = "0|1", value_parser = parse_flag)]
    pub cache_optimize: Option<bool>,
    /// Data to export
    #[arg(short = 'E', long, value_name = "geo+anim", value_parser = parse_export)]
    pub export_type: Option<ExportContent>,
    /// Output container
    #[arg(short = 'C', long, value_name = "bin|txt", value_parser = parse_container)]
    pub convert_type: Option<Container>,
    /// Write relative joint matrices for animation
    #[arg(short = 'M', long, value_name = "0|1", value_parser = parse_flag)]
    pub matrix_type: Option<bool>,
    /// Write a material file
    #[arg(long, value_name = "0|1", value_parser = parse_flag)]
    pub material_export: Option<bool>,
    /// Texture channel used for the tangent basis
    #[arg(long, value_name = "N")]
    pub tex_channel: Option<usize>,
    /// Source of joint inverse bind matrices
    #[arg(long, value_enum)]
    pub bind_pose: Option<BindPoseArg>,
    /// JSON settings file; command line values take precedence
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub settings: Option<PathBuf>,
    /// Save the effective options as JSON before converting
    #[arg(long, value_name = "JSON", value_hint = ValueHint::FilePath)]
    pub write_settings: Option<PathBuf>,
    /// Write `<input>.report.json` for every converted file
    #[arg(long)]
    pub report: bool,
    /// COLLADA files to convert
    #[arg(num_args = 1.., required = true, value_hint = ValueHint::FilePath)]
    pub files: Vec<PathBuf>,
}

impl Cli {
    /// Settings file values (or defaults) overridden by explicit arguments.
    pub fn options(&self) -> Result<ConvertOptions> {
        let mut options = match &self.settings {
            Some(path) => load_settings(path)?,
            None => ConvertOptions::default(),
        };
        if let Some(value) = self.cache_optimize {
            options.cache_optimize = value;
        }
        if let Some(value) = self.export_type {
            options.export = value;
        }
        if let Some(value) = self.convert_type {
            options.container = value;
        }
        if let Some(value) = self.matrix_type {
            options.relative_matrices = value;
        }
        if let Some(value) = self.material_export {
            options.export_materials = value;
        }
        if let Some(value) = self.tex_channel {
            options.tex_channel = value;
        }
        if let Some(value) = self.bind_pose {
            options.bind_pose = value.into();
        }
        Ok(options)
    }

    /// Write `options` to the `--write-settings` path, if one was given.
    pub fn save_effective_settings(&self, options: &ConvertOptions) -> Result<()> {
        if let Some(path) = &self.write_settings {
            save_settings(path, options)?;
            log::info!("settings written to {}", path.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn given_short_flags_when_parsing_then_options_are_overridden() {
        let cli = Cli::try_parse_from([
            "dae2mesh", "-E", "geo+anim", "-C", "txt", "-M", "1", "--cache-optimize", "0",
            "--tex-channel", "1", "--bind-pose", "document", "a.dae", "b.dae",
        ])
        .expect("parse");
        let options = cli.options().expect("options");
        assert!(options.export.geometry && options.export.animation);
        assert!(options.relative_matrices);
        assert!(!options.cache_optimize);
        assert_eq!(options.tex_channel, 1);
        assert_eq!(options.bind_pose, BindPose::Document);
        assert_eq!(cli.files.len(), 2);
    }

    #[test]
    fn given_no_flags_when_parsing_then_defaults_apply() {
        let cli = Cli::try_parse_from(["dae2mesh", "a.dae"]).expect("parse");
        let options = cli.options().expect("options");
        assert!(options.cache_optimize);
        assert!(options.export.geometry && !options.export.animation);
        assert_eq!(options.container, Container::Txt);
        assert!(!cli.report);
    }

    #[test]
    fn given_bad_convert_type_when_parsing_then_error() {
        assert!(Cli::try_parse_from(["dae2mesh", "-C", "text", "a.dae"]).is_err());
        assert!(Cli::try_parse_from(["dae2mesh", "-E", "mesh", "a.dae"]).is_err());
        assert!(Cli::try_parse_from(["dae2mesh"]).is_err());
    }

    #[test]
    fn given_write_settings_when_saving_then_file_reloads_with_overrides() {
        let path = std::env::temp_dir()
            .join(format!("dae2mesh-cli-settings-{}.json", std::process::id()));
        let path_arg = path.to_str().expect("utf-8 temp path");
        let cli = Cli::try_parse_from(["dae2mesh", "-M", "1", "--write-settings", path_arg, "a.dae"])
            .expect("parse");
        let options = cli.options().expect("options");
        cli.save_effective_settings(&options).expect("save");

        let reloaded = load_settings(&path).expect("reload");
        assert_eq!(reloaded, options);
        assert!(reloaded.relative_matrices);
        std::fs::remove_file(&path).expect("cleanup");
    }
}
