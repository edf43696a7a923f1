//! Wavefront OBJ tile importer (plain `.obj` or a `.zip` holding one).

use anyhow::{bail, Context, Result};
use glam::DVec3;
use log::{debug, warn};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use capture::{GeometryObject, Material, Mesh, ObjectKind, ServiceError, TileImporter};

/// Imports every `o`/`g` block of a tile as its own object.
///
/// Textures named by `map_Kd` are resolved against the directory holding the
/// tile file (for archives: the directory holding the archive).
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjTileImporter;

impl TileImporter for ObjTileImporter {
    fn import(&self, path: &Path) -> Result<Vec<GeometryObject>, ServiceError> {
        load_tile(path).map_err(ServiceError::from)
    }
}

/// One object as written in the file, before materials are resolved.
#[derive(Debug, Default)]
struct ObjBlock {
    name: String,
    mesh: Mesh,
    material: Option<String>,
    /// `(v, vt)` pair -> local vertex index.
    remap: HashMap<(usize, Option<usize>), u32>,
    any_uv: bool,
}

impl ObjBlock {
    fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    fn has_geometry(&self) -> bool {
        !self.mesh.positions.is_empty()
    }

    fn vertex(&mut self, positions: &[DVec3], uvs: &[[f32; 2]], v: usize, vt: Option<usize>) -> u32 {
        if let Some(&local) = self.remap.get(&(v, vt)) {
            return local;
        }

        let local = self.mesh.positions.len() as u32;
        self.mesh.positions.push(positions[v]);
        let uv = vt.map(|t| uvs[t]);
        self.any_uv |= uv.is_some();
        self.mesh
            .uvs
            .get_or_insert_with(Vec::new)
            .push(uv.unwrap_or([0.0, 0.0]));
        self.remap.insert((v, vt), local);
        local
    }

    fn finish(mut self) -> Self {
        if !self.any_uv {
            self.mesh.uvs = None;
        }
        self
    }
}

#[derive(Debug, Default)]
struct ParsedObj {
    blocks: Vec<ObjBlock>,
    mtllibs: Vec<String>,
}

/// Resolve a 1-based (or negative, relative) OBJ index.
fn resolve_index(token: &str, len: usize) -> Result<usize> {
    let raw: i64 = token
        .parse()
        .with_context(|| format!("Bad index {token:?}"))?;
    let index = if raw < 0 { len as i64 + raw } else { raw - 1 };
    if index < 0 || index as usize >= len {
        bail!("Index {raw} out of range ({len} entries)");
    }
    Ok(index as usize)
}

fn parse_floats<const N: usize>(parts: &mut std::str::SplitWhitespace<'_>) -> Result<[f64; N]> {
    let mut out = [0.0; N];
    for slot in out.iter_mut() {
        *slot = parts
            .next()
            .context("Missing coordinate")?
            .parse()
            .context("Bad coordinate")?;
    }
    Ok(out)
}

fn parse_obj<R: Read>(reader: R, default_name: &str) -> Result<ParsedObj> {
    let mut positions: Vec<DVec3> = Vec::new();
    let mut uvs: Vec<[f32; 2]> = Vec::new();
    let mut parsed = ParsedObj::default();
    let mut current = ObjBlock::named(default_name);
    let mut active_material: Option<String> = None;

    for (line_no, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else { continue };
        let at = || format!("line {}", line_no + 1);

        match tag {
            "v" => {
                let [x, y, z] = parse_floats::<3>(&mut parts).with_context(at)?;
                positions.push(DVec3::new(x, y, z));
            }
            "vt" => {
                let [u, v] = parse_floats::<2>(&mut parts).with_context(at)?;
                uvs.push([u as f32, v as f32]);
            }
            "o" | "g" => {
                let name = parts.collect::<Vec<_>>().join(" ");
                let next = ObjBlock {
                    material: active_material.clone(),
                    ..ObjBlock::named(if name.is_empty() { default_name.to_owned() } else { name })
                };
                let done = std::mem::replace(&mut current, next);
                if done.has_geometry() {
                    parsed.blocks.push(done.finish());
                }
            }
            "usemtl" => {
                let name = parts.collect::<Vec<_>>().join(" ");
                active_material = Some(name.clone());
                if !current.has_geometry() || current.material.is_none() {
                    current.material = Some(name);
                }
            }
            "mtllib" => parsed.mtllibs.extend(parts.map(str::to_owned)),
            "f" | "l" | "p" => {
                let mut ring = Vec::new();
                for corner in parts {
                    let mut fields = corner.split('/');
                    let v = resolve_index(fields.next().unwrap_or_default(), positions.len())
                        .with_context(at)?;
                    let vt = match fields.next() {
                        Some(t) if !t.is_empty() && tag == "f" => {
                            Some(resolve_index(t, uvs.len()).with_context(at)?)
                        }
                        _ => None,
                    };
                    ring.push(current.vertex(&positions, &uvs, v, vt));
                }

                match tag {
                    "f" if ring.len() >= 3 => current.mesh.faces.push(ring),
                    "l" => current
                        .mesh
                        .edges
                        .extend(ring.windows(2).map(|w| [w[0], w[1]])),
                    "p" => {}
                    _ => warn!("Skipping degenerate face at {}", at()),
                }
            }
            _ => {}
        }
    }

    if current.has_geometry() {
        parsed.blocks.push(current.finish());
    }

    Ok(parsed)
}

/// `newmtl` name -> `map_Kd` value, if any.
fn parse_mtl(text: &str) -> HashMap<String, Option<String>> {
    let mut materials = HashMap::new();
    let mut current: Option<String> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(name) = trimmed.strip_prefix("newmtl ") {
            let name = name.trim().to_owned();
            materials.insert(name.clone(), None);
            current = Some(name);
        } else if let Some(map) = trimmed.strip_prefix("map_Kd ") {
            if let Some(name) = &current {
                // Options such as `-s 1 1 1` come first; the file is last.
                let file = map.split_whitespace().last().map(str::to_owned);
                materials.insert(name.clone(), file);
            }
        }
    }

    materials
}

fn load_tile(path: &Path) -> Result<Vec<GeometryObject>> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let is_zip = path
        .extension()
        .and_then(|s| s.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("zip"));

    let (parsed, mtl_texts) = if is_zip {
        debug!("Opening ZIP archive {}", path.display());
        let file = File::open(path).with_context(|| format!("Opening {}", path.display()))?;
        let mut archive = zip::ZipArchive::new(file)?;

        let obj_name = archive
            .file_names()
            .find(|n| n.to_ascii_lowercase().ends_with(".obj"))
            .context("No .obj file found in zip archive")?
            .to_owned();
        let prefix = obj_name
            .rfind('/')
            .map(|i| obj_name[..=i].to_owned())
            .unwrap_or_default();

        let parsed = parse_obj(archive.by_name(&obj_name)?, &stem)?;

        let mut texts = Vec::new();
        for lib in &parsed.mtllibs {
            match archive.by_name(&format!("{prefix}{lib}")) {
                Ok(mut entry) => {
                    let mut text = String::new();
                    entry.read_to_string(&mut text)?;
                    texts.push(text);
                }
                Err(_) => warn!("{}: material library {} not in archive", path.display(), lib),
            }
        }
        (parsed, texts)
    } else {
        let file = File::open(path).with_context(|| format!("Opening {}", path.display()))?;
        let parsed = parse_obj(file, &stem)?;

        let mut texts = Vec::new();
        for lib in &parsed.mtllibs {
            match fs::read_to_string(base_dir.join(lib)) {
                Ok(text) => texts.push(text),
                Err(err) => warn!("{}: material library {}: {}", path.display(), lib, err),
            }
        }
        (parsed, texts)
    };

    if parsed.blocks.is_empty() {
        bail!("{} holds no geometry", path.display());
    }

    let mut library: HashMap<String, Option<String>> = HashMap::new();
    for text in &mtl_texts {
        library.extend(parse_mtl(text));
    }

    let mut materials: HashMap<String, Arc<Material>> = HashMap::new();
    let objects = parsed
        .blocks
        .into_iter()
        .map(|block| {
            let kind = if block.mesh.faces.is_empty() && block.mesh.edges.is_empty() {
                ObjectKind::PointCloud
            } else {
                ObjectKind::Mesh
            };
            let material = block.material.as_ref().map(|name| {
                materials
                    .entry(name.clone())
                    .or_insert_with(|| {
                        let texture: Option<PathBuf> = library
                            .get(name)
                            .cloned()
                            .flatten()
                            .map(|file| base_dir.join(file));
                        Arc::new(Material {
                            name: name.clone(),
                            texture,
                        })
                    })
                    .clone()
            });

            let mut object = GeometryObject::new(block.name, kind, block.mesh.into_shared());
            object.material = material;
            object
        })
        .collect::<Vec<_>>();

    debug!("{}: {} objects", path.display(), objects.len());
    Ok(objects)
}
