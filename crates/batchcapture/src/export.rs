//! OBJ/MTL writer for the assembled capture.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use capture::{GroupId, Scene};

#[derive(Debug, Clone)]
pub struct ExportedFiles {
    pub obj: PathBuf,
    pub mtl: PathBuf,
    pub objects: usize,
}

/// Write `<output_dir>/<project>_Capture.obj` and its `.mtl`. Vertices are
/// written in world space.
pub fn write_capture(
    scene: &Scene,
    capture: GroupId,
    output_dir: &Path,
    project_name: &str,
) -> Result<ExportedFiles> {
    let group = scene
        .group(capture)
        .with_context(|| format!("{capture} is not in the scene"))?;

    fs::create_dir_all(output_dir)
        .with_context(|| format!("Creating {}", output_dir.display()))?;

    let base = format!("{}_{}", project_name, group.name());
    let obj_path = output_dir.join(format!("{base}.obj"));
    let mtl_path = output_dir.join(format!("{base}.mtl"));
    let mtl_name = format!("{base}.mtl");

    let mut out = BufWriter::new(
        File::create(&obj_path).with_context(|| format!("Creating {}", obj_path.display()))?,
    );
    let mut materials: BTreeMap<String, Option<PathBuf>> = BTreeMap::new();

    writeln!(out, "mtllib {mtl_name}")?;

    // OBJ indices are global and 1-based.
    let mut v_base = 1usize;
    let mut vt_base = 1usize;

    for &id in group.objects() {
        let Some(object) = scene.object(id) else { continue };
        let mesh = object.mesh.read();

        writeln!(out, "o {}", object.name)?;
        if let Some(material) = &object.material {
            materials
                .entry(material.name.clone())
                .or_insert_with(|| material.texture.clone());
            writeln!(out, "usemtl {}", material.name)?;
        }

        for p in &mesh.positions {
            let w = object.transform.transform_point3(*p);
            writeln!(out, "v {:.6} {:.6} {:.6}", w.x, w.y, w.z)?;
        }
        if let Some(uvs) = &mesh.uvs {
            for uv in uvs {
                writeln!(out, "vt {:.6} {:.6}", uv[0], uv[1])?;
            }
        }

        for face in &mesh.faces {
            write!(out, "f")?;
            for &v in face {
                let v = v as usize;
                if mesh.uvs.is_some() {
                    write!(out, " {}/{}", v_base + v, vt_base + v)?;
                } else {
                    write!(out, " {}", v_base + v)?;
                }
            }
            writeln!(out)?;
        }
        for &[a, b] in &mesh.edges {
            writeln!(out, "l {} {}", v_base + a as usize, v_base + b as usize)?;
        }

        v_base += mesh.positions.len();
        vt_base += mesh.uvs.as_ref().map_or(0, Vec::len);
    }
    out.flush()?;

    let mut mtl = BufWriter::new(
        File::create(&mtl_path).with_context(|| format!("Creating {}", mtl_path.display()))?,
    );
    for (name, texture) in &materials {
        writeln!(mtl, "newmtl {name}")?;
        writeln!(mtl, "Kd 1.000000 1.000000 1.000000")?;
        if let Some(texture) = texture {
            writeln!(mtl, "map_Kd {}", texture.display())?;
        }
        writeln!(mtl)?;
    }
    mtl.flush()?;

    Ok(ExportedFiles {
        obj: obj_path,
        mtl: mtl_path,
        objects: group.len(),
    })
}
