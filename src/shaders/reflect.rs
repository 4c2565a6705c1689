// fluid-cursor - GPU fluid simulation cursor effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

//! Uniform introspection for the WGSL programs.
//!
//! Both stages are parsed with naga. Each declares one `var<uniform>` at
//! `@binding(0)`; the vertex block must be a prefix of the fragment block
//! since both stages read one buffer. Every `texture_2d<f32>` is reported
//! with its binding, its sampler follows at the next slot.

use std::collections::BTreeMap;

use naga::{AddressSpace, ImageClass, Module, Scalar, TypeInner, VectorSize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    F32,
    Vec2,
    Vec3,
    Vec4,
}

impl UniformKind {
    fn from_inner(inner: &TypeInner) -> Option<Self> {
        match *inner {
            TypeInner::Scalar(scalar) if scalar == Scalar::F32 => Some(UniformKind::F32),
            TypeInner::Vector { size, scalar } if scalar == Scalar::F32 => Some(match size {
                VectorSize::Bi => UniformKind::Vec2,
                VectorSize::Tri => UniformKind::Vec3,
                VectorSize::Quad => UniformKind::Vec4,
            }),
            _ => None,
        }
    }

    pub fn size(self) -> usize {
        match self {
            UniformKind::F32 => 4,
            UniformKind::Vec2 => 8,
            UniformKind::Vec3 => 12,
            UniformKind::Vec4 => 16,
        }
    }

    pub fn components(self) -> usize {
        self.size() / 4
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformLocation {
    Block { offset: usize, kind: UniformKind },
    Texture { binding: u32 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramLayout {
    pub uniforms: BTreeMap<String, UniformLocation>,
    /// Size of the uniform buffer in bytes, a multiple of 16.
    pub block_size: usize,
}

impl ProgramLayout {
    pub fn texture_bindings(&self) -> impl Iterator<Item = (&str, u32)> {
        self.uniforms.iter().filter_map(|(name, loc)| match loc {
            UniformLocation::Texture { binding } => Some((name.as_str(), *binding)),
            UniformLocation::Block { .. } => None,
        })
    }

    /// Reads a block uniform back out of uniform bytes laid out by this program.
    pub fn read(&self, block: &[u8], name: &str) -> Option<[f32; 4]> {
        let UniformLocation::Block { offset, kind } = *self.uniforms.get(name)? else {
            return None;
        };
        let bytes = block.get(offset..offset + kind.size())?;
        let mut out = [0.0; 4];
        for (i, chunk) in bytes.chunks_exact(4).enumerate() {
            out[i] = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Some(out)
    }
}

fn parse(source: &str) -> Result<Module, String> {
    naga::front::wgsl::parse_str(source).map_err(|err| err.emit_to_string(source))
}

fn round_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

/// Members of the `@binding(0)` uniform block with their byte offsets, and
/// the block size rounded up to 16.
fn uniform_block(module: &Module) -> Result<Option<(Vec<(String, UniformLocation)>, usize)>, String> {
    let Some(global) = module.global_variables.iter().map(|(_, g)| g).find(|g| {
        g.space == AddressSpace::Uniform && g.binding.as_ref().map(|b| b.binding) == Some(0)
    }) else {
        return Ok(None);
    };
    let block_name = global.name.as_deref().unwrap_or("<unnamed>");
    let TypeInner::Struct { ref members, .. } = module.types[global.ty].inner else {
        return Err(format!("uniform block '{block_name}' is not a struct"));
    };

    let mut layouter = naga::proc::Layouter::default();
    layouter.update(module.to_ctx()).map_err(|err| err.to_string())?;

    let mut fields = Vec::with_capacity(members.len());
    for member in members {
        let name = member
            .name
            .clone()
            .ok_or_else(|| format!("unnamed member in uniform block '{block_name}'"))?;
        let kind = UniformKind::from_inner(&module.types[member.ty].inner)
            .ok_or_else(|| format!("unsupported uniform type for {block_name}.{name}"))?;
        fields.push((
            name,
            UniformLocation::Block {
                offset: member.offset as usize,
                kind,
            },
        ));
    }

    let size = round_up(layouter[global.ty].size as usize, 16);
    Ok(Some((fields, size)))
}

/// Sampled 2D textures with their binding index.
fn texture_bindings(module: &Module) -> Result<Vec<(String, UniformLocation)>, String> {
    let mut out = Vec::new();
    for (_, global) in module.global_variables.iter() {
        let TypeInner::Image {
            class: ImageClass::Sampled { .. },
            ..
        } = module.types[global.ty].inner
        else {
            continue;
        };
        let name = global.name.clone().ok_or("texture declaration without name")?;
        let binding = global
            .binding
            .as_ref()
            .map(|b| b.binding)
            .ok_or_else(|| format!("texture '{name}' has no binding"))?;
        out.push((name, UniformLocation::Texture { binding }));
    }
    Ok(out)
}

/// Merges the vertex and fragment interfaces of a linked program.
pub fn reflect_program(vertex_source: &str, fragment_source: &str) -> Result<ProgramLayout, String> {
    let vertex = parse(vertex_source)?;
    let fragment = parse(fragment_source)?;

    let mut layout = ProgramLayout::default();

    if let Some((fields, size)) = uniform_block(&fragment)? {
        layout.block_size = size;
        layout.uniforms.extend(fields);
    }

    if let Some((fields, size)) = uniform_block(&vertex)? {
        for (name, location) in fields {
            match layout.uniforms.get(&name) {
                Some(existing) if *existing == location => {}
                Some(_) => {
                    return Err(format!("vertex uniform '{name}' does not match the fragment block layout"));
                }
                None => {
                    return Err(format!("fragment block does not declare vertex uniform '{name}'"));
                }
            }
        }
        layout.block_size = layout.block_size.max(size);
    }

    for (name, location) in texture_bindings(&fragment)? {
        if layout.uniforms.insert(name.clone(), location).is_some() {
            return Err(format!("'{name}' is declared twice"));
        }
    }

    Ok(layout)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERTEX: &str = "struct VertexUniforms {\n    texelSize: vec2<f32>,\n};\n\
        @group(0) @binding(0) var<uniform> vertexUniforms: VertexUniforms;\n";

    fn fragment(fields: &str) -> String {
        format!("struct Uniforms {{ {fields} }}\n@group(0) @binding(0) var<uniform> uniforms: Uniforms;\n")
    }

    fn offset(layout: &ProgramLayout, name: &str) -> usize {
        match layout.uniforms[name] {
            UniformLocation::Block { offset, .. } => offset,
            UniformLocation::Texture { .. } => panic!("{name} is a texture"),
        }
    }

    #[test]
    fn uniform_buffer_offsets() {
        let source = fragment(concat!(
            "texelSize: vec2<f32>, point: vec2<f32>, ",
            "color: vec3<f32>, aspectRatio: f32, radius: f32,",
        ));
        let layout = reflect_program(VERTEX, &source).unwrap();
        assert_eq!(offset(&layout, "texelSize"), 0);
        assert_eq!(offset(&layout, "point"), 8);
        assert_eq!(offset(&layout, "color"), 16);
        assert_eq!(offset(&layout, "aspectRatio"), 28);
        assert_eq!(offset(&layout, "radius"), 32);
        assert_eq!(layout.block_size, 48);
    }

    #[test]
    fn vec4_after_vec2_is_padded() {
        let layout = reflect_program(VERTEX, &fragment("texelSize: vec2<f32>, color: vec4<f32>,")).unwrap();
        assert_eq!(
            layout.uniforms["color"],
            UniformLocation::Block { offset: 16, kind: UniformKind::Vec4 }
        );
        assert_eq!(layout.block_size, 32);
    }

    #[test]
    fn explicit_align_and_size_attributes_are_honoured() {
        let source = fragment("texelSize: vec2<f32>, @align(16) dt: f32, @size(16) curl: f32, radius: f32,");
        let layout = reflect_program(VERTEX, &source).unwrap();
        assert_eq!(offset(&layout, "dt"), 16);
        assert_eq!(offset(&layout, "curl"), 20);
        assert_eq!(offset(&layout, "radius"), 36);
        assert_eq!(layout.block_size, 48);
    }

    #[test]
    fn small_blocks_round_up_to_sixteen() {
        let layout = reflect_program(VERTEX, &fragment("texelSize: vec2<f32>,")).unwrap();
        assert_eq!(layout.block_size, 16);
    }

    #[test]
    fn textures_are_reflected_with_bindings() {
        let source = fragment("texelSize: vec2<f32>,")
            + "@group(0) @binding(1) var uVelocity: texture_2d<f32>;\n\
               @group(0) @binding(2) var uVelocity_sampler: sampler;\n\
               @group(0) @binding(3) var uSource: texture_2d<f32>; // dye\n";
        let layout = reflect_program(VERTEX, &source).unwrap();
        let textures: Vec<_> = layout.texture_bindings().collect();
        assert_eq!(textures, vec![("uSource", 3), ("uVelocity", 1)]);
        assert!(!layout.uniforms.contains_key("uVelocity_sampler"));
    }

    #[test]
    fn vertex_uniform_must_exist_in_fragment_block() {
        assert!(reflect_program(VERTEX, &fragment("dt: f32,")).is_err());
    }

    #[test]
    fn unsupported_member_types_are_rejected() {
        let err = reflect_program(VERTEX, &fragment("texelSize: vec2<f32>, weights: array<vec4<f32>, 2>,"))
            .unwrap_err();
        assert!(err.contains("weights"), "{err}");
    }

    #[test]
    fn syntax_errors_are_reported() {
        assert!(reflect_program(VERTEX, "struct Uniforms { texelSize: vec2<f32> ").is_err());
    }

    #[test]
    fn read_back_block_values() {
        let layout = reflect_program(VERTEX, &fragment("texelSize: vec2<f32>, dt: f32,")).unwrap();
        let mut block = vec![0u8; layout.block_size];
        block[8..12].copy_from_slice(&0.5f32.to_le_bytes());
        assert_eq!(layout.read(&block, "dt"), Some([0.5, 0.0, 0.0, 0.0]));
        assert_eq!(layout.read(&block, "missing"), None);
    }
}
