use std::{
    fs,
    path::{Path, PathBuf},
};

use nalgebra::{UnitQuaternion, Vector3};

use crate::error::{ConversionError, ConversionResult};
use crate::internal::{Aabb, InternalData, JointRecord};
use crate::math::{decompose, round_eps};
use crate::settings::{Container, ConvertOptions};

/// Plain-text writer for meshes, animation and materials.
#[derive(Debug, Clone, Copy)]
pub struct TxtExporter {
    geometry: bool,
    animation: bool,
    materials: bool,
    relative: bool,
}

impl TxtExporter {
    /// Exporter for `options`. Only the text container is implemented.
    pub fn new(options: &ConvertOptions) -> ConversionResult<Self> {
        if options.container != Container::Txt {
            return Err(ConversionError::Unsupported(format!(
                "'{}' export container",
                options.container.as_str()
            )));
        }
        Ok(Self {
            geometry: options.export.geometry,
            animation: options.export.animation,
            materials: options.export_materials,
            relative: options.relative_matrices,
        })
    }

    /// Write the enabled files next to `input`. Returns the paths written.
    pub fn write(&self, input: &Path, data: &InternalData) -> ConversionResult<Vec<PathBuf>> {
        let mut written = Vec::new();
        let mut emit = |extension: &str, content: String| -> ConversionResult<()> {
            let path = output_path(input, extension);
            fs::write(&path, content).map_err(|source| ConversionError::Io {
                path: path.clone(),
                source,
            })?;
            log::info!("wrote {}", path.display());
            written.push(path);
            Ok(())
        };

        if self.geometry {
            emit("txt.msh", mesh_text(data))?;
        }
        if self.materials && !data.materials.is_empty() {
            emit("txt.mtl", material_text(data))?;
        }
        if self.animation && data.frame_count > 0 {
            emit("txt.anm", animation_text(data, self.relative))?;
        }
        Ok(written)
    }
}

/// `<dir>/<file name up to its first '.'>.<extension>`.
pub fn output_path(input: &Path, extension: &str) -> PathBuf {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = name.split('.').next().unwrap_or_default();
    input.with_file_name(format!("{stem}.{extension}"))
}

// ─── Formatting ───────────────────────────────────────────────────────────────

fn floats(values: &[f32]) -> String {
    values
        .iter()
        .map(|v| round_eps(*v).to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn vec3(v: &Vector3<f32>) -> String {
    floats(v.as_slice())
}

fn bbox_line(aabb: &Aabb) -> String {
    format!("bbox {} {}\n", vec3(&aabb.mins), vec3(&aabb.maxs))
}

fn pose_values(rotation: &UnitQuaternion<f32>, translation: &Vector3<f32>) -> String {
    let q = rotation.quaternion();
    floats(&[q.i, q.j, q.k, q.w, translation.x, translation.y, translation.z])
}

/// Joint name as a single whitespace-free field.
fn name_field(name: &str) -> String {
    let field: String = name
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    if field.is_empty() { "_".to_string() } else { field }
}

fn bones_block(joints: &[JointRecord]) -> String {
    let mut content = format!("bones {}\n", joints.len());
    for joint in joints {
        let (rotation, translation) = decompose(&joint.inverse_bind);
        content.push_str(&format!(
            "jnt {} {} {} {}\n",
            joint.index,
            joint.parent,
            name_field(&joint.name),
            pose_values(&rotation, &translation)
        ));
    }
    content.push('\n');
    content
}

pub(crate) fn mesh_text(data: &InternalData) -> String {
    let mut content = format!("meshes {}\n\n", data.meshes.len());
    for (i, mesh) in data.meshes.iter().enumerate() {
        let weight_count: usize = mesh.weights.iter().map(Vec::len).sum();
        content.push_str(&format!("mesh {i}\n"));
        content.push_str(&format!("vertices {}\n", mesh.vertex_count()));
        content.push_str(&format!("weights {weight_count}\n"));
        content.push_str(&bbox_line(&mesh.bbox));
        content.push_str(&format!("material {}\n", mesh.material));

        for (tag, values) in [
            ("vps", &mesh.positions),
            ("vnr", &mesh.normals),
            ("vtg", &mesh.tangents),
            ("vbt", &mesh.bitangents),
        ] {
            for v in values {
                content.push_str(&format!("{tag} {}\n", vec3(v)));
            }
        }

        content.push_str(&format!("tex_channels {}\n", mesh.tex_coords.len()));
        for (channel, coords) in mesh.tex_coords.iter().enumerate() {
            for uv in coords {
                content.push_str(&format!("tx{channel} {}\n", floats(uv.as_slice())));
            }
        }

        content.push_str(&format!("triangles {}\n", mesh.triangle_count()));
        for t in mesh.indices.chunks_exact(3) {
            content.push_str(&format!("fcx {} {} {}\n", t[0], t[1], t[2]));
        }

        if mesh.is_skinned() {
            let mut end = 0;
            for list in &mesh.weights {
                end += list.len();
                content.push_str(&format!("wgi {end}\n"));
            }
            for w in mesh.weights.iter().flatten() {
                content.push_str(&format!("wgh {} {}\n", w.joint, round_eps(w.weight)));
            }
            content.push('\n');
        }
    }
    if !data.joints.is_empty() {
        content.push_str(&bones_block(&data.joints));
    }
    content
}

pub(crate) fn animation_text(data: &InternalData, relative: bool) -> String {
    let mut content = bones_block(&data.joints);
    content.push_str(&format!("frames {}\n", data.frame_count));
    content.push_str(&format!("framerate {}\n\n", data.frame_rate));
    for frame in 0..data.frame_count {
        content.push_str(&format!("frame {frame}\n"));
        if let Some(aabb) = data.frame_bboxes.get(frame) {
            content.push_str(&bbox_line(aabb));
        }
        for joint in &data.joints {
            let poses = if relative {
                &joint.relative_poses
            } else {
                &joint.absolute_poses
            };
            if let Some(pose) = poses.get(frame) {
                content.push_str(&format!(
                    "jtr {}\n",
                    pose_values(&pose.rotation, &pose.translation)
                ));
            }
        }
        content.push('\n');
    }
    content
}

pub(crate) fn material_text(data: &InternalData) -> String {
    let mut content = String::new();
    for material in &data.materials {
        content.push_str(&format!("Material name: {}\n", material.name));
        match &material.texture {
            Some(texture) => content.push_str(&format!("Texture: {texture}\n")),
            None => content.push_str(&format!("Diffuse: {}\n", floats(&material.diffuse))),
        }
        content.push_str(&format!("Specular: {}\n", floats(&material.specular)));
        content.push_str(&format!("Shininess: {}\n", round_eps(material.shininess)));
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::test_meshes::mesh;
    use crate::internal::{JointPose, MaterialRecord, Weight};
    use crate::settings::ExportContent;
    use nalgebra::Matrix4;

    fn skinned_data() -> InternalData {
        let mut m = mesh(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], &[0, 1, 2]);
        m.weights = vec![
            vec![Weight { joint: 1, weight: 1.0 }],
            vec![Weight { joint: 1, weight: 0.5 }, Weight { joint: 2, weight: 0.5 }],
            vec![],
        ];
        let pose = |z: f32| JointPose {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::new(0.0, 0.0, z),
        };
        let joint = |index: usize, parent: usize| JointRecord {
            index,
            parent,
            name: format!("bone{index}"),
            inverse_bind: Matrix4::new_translation(&Vector3::new(0.0, -1.0, 0.0)),
            relative_poses: vec![pose(1.0)],
            absolute_poses: vec![pose(2.0)],
        };
        InternalData {
            meshes: vec![m],
            joints: vec![joint(1, 0), joint(2, 1)],
            frame_count: 1,
            frame_rate: 24.0,
            frame_bboxes: vec![Aabb::new(Vector3::zeros(), Vector3::new(1.0, 1.0, 0.0))],
            ..InternalData::default()
        }
    }

    #[test]
    fn given_nested_input_path_when_naming_outputs_then_stem_stops_at_first_dot() {
        let path = output_path(Path::new("assets/v1.2/hero.rig.dae"), "txt.msh");
        assert_eq!(path, PathBuf::from("assets/v1.2/hero.txt.msh"));
    }

    #[test]
    fn given_skinned_mesh_when_formatting_then_weights_use_cumulative_offsets() {
        let text = mesh_text(&skinned_data());
        assert!(text.starts_with("meshes 1\n\nmesh 0\nvertices 3\nweights 3\n"));
        assert!(text.contains("vps 1 0 0\n"));
        assert!(text.contains("triangles 1\nfcx 0 1 2\n"));
        assert!(text.contains("wgi 1\nwgi 3\nwgi 3\n"));
        assert!(text.contains("wgh 2 0.5\n"));
        assert!(text.contains("bones 2\njnt 1 0 bone1 0 0 0 1 0 -1 0\n"));
    }

    #[test]
    fn given_joint_name_with_spaces_when_formatting_bones_then_name_stays_one_field() {
        let mut data = skinned_data();
        data.joints[0].name = "Left Upper\tArm".to_string();
        data.joints[1].name = String::new();
        let text = mesh_text(&data);
        let jnt_lines: Vec<&str> = text.lines().filter(|l| l.starts_with("jnt ")).collect();
        assert_eq!(jnt_lines.len(), 2);
        for line in &jnt_lines {
            assert_eq!(line.split_whitespace().count(), 11, "{line}");
        }
        assert!(jnt_lines[0].starts_with("jnt 1 0 Left_Upper_Arm "));
        assert!(jnt_lines[1].starts_with("jnt 2 1 _ "));
    }

    #[test]
    fn given_relative_option_when_formatting_animation_then_relative_poses_are_written() {
        let data = skinned_data();
        let absolute = animation_text(&data, false);
        let relative = animation_text(&data, true);
        assert!(absolute.contains("frames 1\nframerate 24\n\nframe 0\nbbox 0 0 0 1 1 0\n"));
        assert!(absolute.contains("jtr 0 0 0 1 0 0 2\n"));
        assert!(relative.contains("jtr 0 0 0 1 0 0 1\n"));
    }

    #[test]
    fn given_textured_and_plain_materials_when_formatting_then_texture_replaces_diffuse() {
        let data = InternalData {
            materials: vec![
                MaterialRecord {
                    name: "Skin".to_string(),
                    diffuse: [1.0, 1.0, 1.0, 1.0],
                    specular: [0.5, 0.5, 0.5, 1.0],
                    shininess: 0.5,
                    texture: Some("skin.png".to_string()),
                },
                MaterialRecord {
                    name: "Red".to_string(),
                    diffuse: [1.0, 0.0, 0.0, 1.0],
                    specular: [0.0, 0.0, 0.0, 1.0],
                    shininess: 0.25,
                    texture: None,
                },
            ],
            ..InternalData::default()
        };
        let text = material_text(&data);
        assert_eq!(
            text,
            "Material name: Skin\nTexture: skin.png\nSpecular: 0.5 0.5 0.5 1\nShininess: 0.5\n\
             Material name: Red\nDiffuse: 1 0 0 1\nSpecular: 0 0 0 1\nShininess: 0.25\n"
        );
    }

    #[test]
    fn given_binary_container_when_creating_exporter_then_unsupported() {
        let options = ConvertOptions {
            container: Container::Bin,
            ..ConvertOptions::default()
        };
        assert!(matches!(TxtExporter::new(&options), Err(ConversionError::Unsupported(_))));
    }

    #[test]
    fn given_all_outputs_enabled_when_writing_then_three_files_exist() {
        let dir = std::env::temp_dir().join(format!("dae2mesh-export-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("temp dir");
        let input = dir.join("model.dae");
        let mut data = skinned_data();
        data.materials.push(MaterialRecord {
            name: "m".to_string(),
            diffuse: [1.0; 4],
            specular: [0.0, 0.0, 0.0, 1.0],
            shininess: 0.5,
            texture: None,
        });
        let options = ConvertOptions {
            export: ExportContent {
                geometry: true,
                animation: true,
            },
            export_materials: true,
            ..ConvertOptions::default()
        };
        let written = TxtExporter::new(&options)
            .expect("exporter")
            .write(&input, &data)
            .expect("write");
        assert_eq!(written.len(), 3);
        for path in &written {
            assert!(path.exists(), "{}", path.display());
        }
        assert!(dir.join("model.txt.anm").exists());
        fs::remove_dir_all(&dir).expect("cleanup");
    }
}
