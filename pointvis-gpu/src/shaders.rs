//! WGSL sources for point rendering
//!
//! Samples are pulled from storage buffers by vertex index, so channels of
//! any [`pointvis_core::PrimitiveFormat`] can be drawn without a vertex layout.

/// Colour channel layouts understood by [`POINT_SHADER`]
pub const COLOR_NONE: u32 = 0;
pub const COLOR_FLOAT32X3: u32 = 1;
pub const COLOR_UINT16X3: u32 = 2;

/// Point list shader reading `f32x3` positions and optional colours
pub const POINT_SHADER: &str = r#"
struct Uniforms {
    view_proj: mat4x4<f32>,
    color_format: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
};

@group(0) @binding(0) var<uniform> uniforms: Uniforms;
@group(0) @binding(1) var<storage, read> positions: array<f32>;
@group(0) @binding(2) var<storage, read> colors: array<u32>;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec3<f32>,
};

fn unorm16(index: u32) -> f32 {
    let word = colors[index / 2u];
    let half = select(word & 0xffffu, word >> 16u, (index & 1u) == 1u);
    return f32(half) / 65535.0;
}

@vertex
fn vs_main(@builtin(vertex_index) i: u32) -> VertexOutput {
    let base = 3u * i;
    let p = vec3<f32>(positions[base], positions[base + 1u], positions[base + 2u]);

    var c = vec3<f32>(1.0, 1.0, 1.0);
    if (uniforms.color_format == 1u) {
        c = vec3<f32>(
            bitcast<f32>(colors[base]),
            bitcast<f32>(colors[base + 1u]),
            bitcast<f32>(colors[base + 2u]),
        );
    } else if (uniforms.color_format == 2u) {
        c = vec3<f32>(unorm16(base), unorm16(base + 1u), unorm16(base + 2u));
    }

    var out: VertexOutput;
    out.clip_position = uniforms.view_proj * vec4<f32>(p, 1.0);
    out.color = c;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(in.color, 1.0);
}
"#;
