// fluid-cursor - GPU fluid simulation cursor effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

pub mod preprocess;
pub mod reflect;

use std::collections::{BTreeSet, HashMap};

use crate::gpu::{
    Backend, BlendMode, DrawCall, ProgramId, ShaderId, ShaderModule, ShaderStage, TextureBinding, TextureId,
};
use reflect::{ProgramLayout, UniformLocation};

pub const MANUAL_FILTERING: &str = "MANUAL_FILTERING";
pub const SHADING: &str = "SHADING";

/// Exact keyword-set key for material variants.
pub type KeywordSet = BTreeSet<String>;

const COMMON: &str = include_str!("common.wgsl");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderSource {
    pub label: &'static str,
    pub stage: ShaderStage,
    pub entry_point: &'static str,
    pub source: &'static str,
}

macro_rules! fragment_source {
    ($name:ident, $label:literal, $entry:literal, $file:literal) => {
        pub const $name: ShaderSource = ShaderSource {
            label: $label,
            stage: ShaderStage::Fragment,
            entry_point: $entry,
            source: include_str!($file),
        };
    };
}

pub const BASE_VERTEX: ShaderSource = ShaderSource {
    label: "Base Vertex",
    stage: ShaderStage::Vertex,
    entry_point: "base_vs",
    source: include_str!("base.vert.wgsl"),
};

fragment_source!(COPY, "Copy", "copy_fs", "copy.wgsl");
fragment_source!(CLEAR, "Clear", "clear_fs", "clear.wgsl");
fragment_source!(COLOR, "Color", "color_fs", "color.wgsl");
fragment_source!(SPLAT, "Splat", "splat_fs", "splat.wgsl");
fragment_source!(ADVECTION, "Advection", "advection_fs", "advection.wgsl");
fragment_source!(DIVERGENCE, "Divergence", "divergence_fs", "divergence.wgsl");
fragment_source!(CURL, "Curl", "curl_fs", "curl.wgsl");
fragment_source!(VORTICITY, "Vorticity", "vorticity_fs", "vorticity.wgsl");
fragment_source!(PRESSURE, "Pressure", "pressure_fs", "pressure.wgsl");
fragment_source!(GRADIENT_SUBTRACT, "Gradient Subtract", "gradient_subtract_fs", "gradient_subtract.wgsl");
fragment_source!(DISPLAY, "Display", "display_fs", "display.wgsl");

/// Every fragment source with the keyword sets it is ever compiled with.
pub fn variants() -> Vec<(ShaderSource, KeywordSet)> {
    let none = KeywordSet::new();
    let mut out: Vec<_> = [
        COPY, CLEAR, COLOR, SPLAT, ADVECTION, DIVERGENCE, CURL, VORTICITY, PRESSURE, GRADIENT_SUBTRACT, DISPLAY,
    ]
    .into_iter()
    .map(|source| (source, none.clone()))
    .collect();
    out.push((ADVECTION, keyword_set(&[MANUAL_FILTERING])));
    out.push((DISPLAY, keyword_set(&[SHADING])));
    out
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShaderError {
    #[error("program '{program}' does not expose uniform '{uniform}'")]
    MissingUniform { program: String, uniform: String },
}

pub fn keyword_set<S: AsRef<str>>(keywords: &[S]) -> KeywordSet {
    keywords.iter().map(|k| k.as_ref().to_string()).collect()
}

/// A compiled stage. `id == None` when compilation failed.
#[derive(Debug, Clone)]
pub struct Shader {
    pub label: String,
    pub id: Option<ShaderId>,
}

impl Shader {
    pub fn is_compiled(&self) -> bool {
        self.id.is_some()
    }
}

/// The WGSL handed to the backend: one `#define` per keyword, the shared
/// declarations and the stage source, preprocessed.
pub fn assemble(source: &ShaderSource, keywords: &KeywordSet) -> Result<String, preprocess::PreprocessError> {
    let mut text = String::new();
    for keyword in keywords {
        text.push_str("#define ");
        text.push_str(keyword);
        text.push('\n');
    }
    text.push_str(COMMON);
    text.push_str(source.source);
    preprocess::preprocess(&text)
}

/// Prepends one `#define` per keyword, preprocesses and compiles.
///
/// Failures are logged and produce a shader that will refuse to link.
pub fn compile_shader<B: Backend + ?Sized>(backend: &mut B, source: &ShaderSource, keywords: &KeywordSet) -> Shader {
    let label = if keywords.is_empty() {
        source.label.to_string()
    } else {
        format!("{} [{}]", source.label, keywords.iter().cloned().collect::<Vec<_>>().join(" "))
    };

    let processed = match assemble(source, keywords) {
        Ok(processed) => processed,
        Err(err) => {
            log::trace!("Shader '{}' failed to preprocess: {}", label, err);
            return Shader { label, id: None };
        }
    };

    let module = ShaderModule {
        label: &label,
        stage: source.stage,
        entry_point: source.entry_point,
        source: &processed,
        keywords,
    };
    let id = match backend.compile_shader(&module) {
        Ok(id) => Some(id),
        Err(err) => {
            log::trace!("Shader '{}' failed to compile: {}", label, err);
            None
        }
    };
    Shader { label, id }
}

/// A linked program with reflected uniform locations.
///
/// Uniform values are staged into a CPU-side block and flushed by [`Program::draw`].
#[derive(Debug, Clone)]
pub struct Program {
    label: String,
    id: Option<ProgramId>,
    layout: ProgramLayout,
    block: Vec<u8>,
    textures: HashMap<u32, TextureId>,
}

impl Program {
    pub fn new<B: Backend + ?Sized>(backend: &mut B, vertex: &Shader, fragment: &Shader) -> Self {
        let label = fragment.label.clone();
        let linked = match (vertex.id, fragment.id) {
            (Some(vs), Some(fs)) => match backend.link_program(vs, fs) {
                Ok(linked) => Some(linked),
                Err(err) => {
                    log::trace!("Program '{}' failed to link: {}", label, err);
                    None
                }
            },
            _ => {
                log::trace!("Program '{}' not linked: a stage failed to compile", label);
                None
            }
        };

        match linked {
            Some((id, layout)) => Self {
                label,
                id: Some(id),
                block: vec![0; layout.block_size],
                layout,
                textures: HashMap::new(),
            },
            None => Self {
                label,
                id: None,
                layout: ProgramLayout::default(),
                block: Vec::new(),
                textures: HashMap::new(),
            },
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_linked(&self) -> bool {
        self.id.is_some()
    }

    pub fn layout(&self) -> &ProgramLayout {
        &self.layout
    }

    /// Fails when a linked program lacks any of `names`. Inert programs pass;
    /// they never draw.
    pub fn verify(&self, names: &[&str]) -> Result<(), ShaderError> {
        if !self.is_linked() {
            return Ok(());
        }
        for name in names {
            if !self.layout.uniforms.contains_key(*name) {
                return Err(ShaderError::MissingUniform {
                    program: self.label.clone(),
                    uniform: name.to_string(),
                });
            }
        }
        Ok(())
    }

    fn write(&mut self, name: &str, values: &[f32]) {
        match self.layout.uniforms.get(name) {
            Some(UniformLocation::Block { offset, kind }) => {
                let count = kind.components().min(values.len());
                let bytes: &[u8] = bytemuck::cast_slice(&values[..count]);
                self.block[*offset..*offset + bytes.len()].copy_from_slice(bytes);
            }
            Some(UniformLocation::Texture { .. }) => {
                log::trace!("'{}' in '{}' is a texture, not a value", name, self.label);
            }
            None => {}
        }
    }

    pub fn set_f32(&mut self, name: &str, value: f32) {
        self.write(name, &[value]);
    }

    pub fn set_vec2(&mut self, name: &str, value: [f32; 2]) {
        self.write(name, &value);
    }

    pub fn set_vec3(&mut self, name: &str, value: [f32; 3]) {
        self.write(name, &value);
    }

    pub fn set_vec4(&mut self, name: &str, value: [f32; 4]) {
        self.write(name, &value);
    }

    pub fn set_texture(&mut self, name: &str, texture: TextureId) {
        if let Some(UniformLocation::Texture { binding }) = self.layout.uniforms.get(name) {
            self.textures.insert(*binding, texture);
        }
    }

    /// Draws a full-screen quad into `target` (`None` = visible surface).
    /// No-op for an inert program.
    pub fn draw<B: Backend + ?Sized>(&self, backend: &mut B, target: Option<TextureId>, blend: Option<BlendMode>) {
        let Some(id) = self.id else {
            return;
        };
        let mut textures: Vec<TextureBinding> = self
            .textures
            .iter()
            .map(|(&binding, &texture)| TextureBinding { binding, texture })
            .collect();
        textures.sort_by_key(|t| t.binding);
        backend.draw(&DrawCall {
            program: id,
            uniforms: &self.block,
            textures: &textures,
            target,
            blend,
        });
    }
}

/// A fragment source whose keyword variants are compiled on first use.
pub struct Material {
    vertex: Shader,
    source: ShaderSource,
    programs: HashMap<KeywordSet, Program>,
    active: Option<KeywordSet>,
}

impl Material {
    pub fn new(vertex: Shader, source: ShaderSource) -> Self {
        Self {
            vertex,
            source,
            programs: HashMap::new(),
            active: None,
        }
    }

    pub fn set_keywords<B: Backend + ?Sized>(&mut self, backend: &mut B, keywords: &KeywordSet) {
        if self.active.as_ref() == Some(keywords) {
            return;
        }
        if !self.programs.contains_key(keywords) {
            let fragment = compile_shader(backend, &self.source, keywords);
            let program = Program::new(backend, &self.vertex, &fragment);
            self.programs.insert(keywords.clone(), program);
        }
        log::debug!("Material '{}' switched to {:?}", self.source.label, keywords);
        self.active = Some(keywords.clone());
    }

    pub fn active_keywords(&self) -> Option<&KeywordSet> {
        self.active.as_ref()
    }

    pub fn variant_count(&self) -> usize {
        self.programs.len()
    }

    pub fn program(&self) -> Option<&Program> {
        self.programs.get(self.active.as_ref()?)
    }

    pub fn program_mut(&mut self) -> Option<&mut Program> {
        let key = self.active.as_ref()?;
        self.programs.get_mut(key)
    }
}
