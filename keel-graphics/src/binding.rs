//! Shader modules, bind groups, layouts and pipelines.
//!
//! Layout and pipeline descriptors own their contents and compare
//! structurally, so they double as keys of the device object cache.

use crate::{
    format, BindGroupKey, BindGroupLayoutKey, Buffer, CompareFunction, ComputePipelineKey,
    ConfigError, PipelineLayoutKey, PixelFormat, RenderPipelineKey, SampleCount, Sampler,
    ShaderFormat, ShaderModuleKey, Texture, TextureUsage,
};

const SPIRV_MAGIC: u32 = 0x0723_0203;

//=============================================================================
// Shader Modules
//=============================================================================

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
    pub struct ShaderStages: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE = 1 << 2;
    }
}

/// Compiled bytecode for one stage, produced by an external shader compiler.
#[derive(Clone, Copy, Debug)]
pub struct ShaderModuleDesc<'a> {
    pub name: &'a str,
    pub stage: ShaderStage,
    pub bytecode: &'a [u8],
    pub entry_point: &'a str,
}

impl ShaderModuleDesc<'_> {
    pub(crate) fn validate(&self, format: ShaderFormat) -> Result<(), ConfigError> {
        if self.bytecode.is_empty() {
            return Err(ConfigError::Shader("bytecode is empty"));
        }
        if self.entry_point.is_empty() {
            return Err(ConfigError::Shader("entry point is empty"));
        }
        match format {
            ShaderFormat::Spirv => {
                if self.bytecode.len() % 4 != 0 {
                    return Err(ConfigError::Shader("SPIR-V length is not a multiple of 4"));
                }
                let magic = u32::from_le_bytes([
                    self.bytecode[0],
                    self.bytecode[1],
                    self.bytecode[2],
                    self.bytecode[3],
                ]);
                if magic != SPIRV_MAGIC {
                    return Err(ConfigError::Shader("missing SPIR-V magic number"));
                }
            }
            ShaderFormat::Dxbc | ShaderFormat::Dxil => {
                if !self.bytecode.starts_with(b"DXBC") {
                    return Err(ConfigError::Shader("missing DXBC container header"));
                }
            }
            ShaderFormat::MetalLib => {
                if !self.bytecode.starts_with(b"MTLB") {
                    return Err(ConfigError::Shader("missing metallib header"));
                }
            }
            ShaderFormat::Opaque => {}
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct ShaderModule {
    pub(crate) raw: ShaderModuleKey,
    pub(crate) stage: ShaderStage,
}

impl ShaderModule {
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }
}

//=============================================================================
// Bind Group Layouts
//=============================================================================

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum BindingType {
    ConstantBuffer,
    StorageBuffer { read_only: bool },
    SampledTexture,
    StorageTexture { format: PixelFormat },
    Sampler { comparison: bool },
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct BindGroupLayoutEntry {
    pub binding: u32,
    pub visibility: ShaderStages,
    pub ty: BindingType,
}

#[derive(Clone, Debug, Default, Hash, PartialEq, Eq)]
pub struct BindGroupLayoutDesc {
    pub name: String,
    pub entries: Vec<BindGroupLayoutEntry>,
}

impl BindGroupLayoutDesc {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.visibility.is_empty() {
                return Err(ConfigError::BindGroup("binding is visible to no stage"));
            }
            if self.entries[..index]
                .iter()
                .any(|other| other.binding == entry.binding)
            {
                return Err(ConfigError::BindGroup("duplicate binding index"));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct BindGroupLayout {
    pub(crate) raw: BindGroupLayoutKey,
}

//=============================================================================
// Bind Groups
//=============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingResource {
    Buffer {
        buffer: Buffer,
        offset: u64,
        /// `None` binds the rest of the buffer.
        size: Option<u64>,
    },
    Texture(Texture),
    Sampler(Sampler),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BindGroupEntry {
    pub binding: u32,
    pub resource: BindingResource,
}

#[derive(Clone, Copy, Debug)]
pub struct BindGroupDesc<'a> {
    pub name: &'a str,
    pub layout: BindGroupLayout,
    pub entries: &'a [BindGroupEntry],
}

/// Checks bind group entries against the layout they are created from.
pub(crate) fn validate_bind_group(
    layout: &[BindGroupLayoutEntry],
    entries: &[BindGroupEntry],
) -> Result<(), ConfigError> {
    if layout.len() != entries.len() {
        return Err(ConfigError::BindGroup("entry count differs from the layout"));
    }
    for entry in entries {
        let slot = layout
            .iter()
            .find(|slot| slot.binding == entry.binding)
            .ok_or(ConfigError::BindGroup("binding is not part of the layout"))?;
        match (slot.ty, entry.resource) {
            (
                BindingType::ConstantBuffer,
                BindingResource::Buffer {
                    buffer,
                    offset,
                    size,
                },
            ) => {
                if !buffer.usage.contains(crate::BufferUsage::CONSTANT) {
                    return Err(ConfigError::MissingUsage {
                        what: "constant buffer binding",
                        usage: "CONSTANT",
                    });
                }
                buffer.check_range(
                    "constant buffer binding",
                    offset,
                    size.unwrap_or(buffer.size.saturating_sub(offset)),
                )?;
            }
            (
                BindingType::StorageBuffer { read_only },
                BindingResource::Buffer {
                    buffer,
                    offset,
                    size,
                },
            ) => {
                let needed = if read_only {
                    crate::BufferUsage::SHADER_READ
                } else {
                    crate::BufferUsage::SHADER_WRITE
                };
                if !buffer.usage.intersects(needed) {
                    return Err(ConfigError::MissingUsage {
                        what: "storage buffer binding",
                        usage: if read_only { "SHADER_READ" } else { "SHADER_WRITE" },
                    });
                }
                buffer.check_range(
                    "storage buffer binding",
                    offset,
                    size.unwrap_or(buffer.size.saturating_sub(offset)),
                )?;
            }
            (BindingType::SampledTexture, BindingResource::Texture(texture)) => {
                if !texture.usage.contains(TextureUsage::SHADER_READ) {
                    return Err(ConfigError::MissingUsage {
                        what: "sampled texture binding",
                        usage: "SHADER_READ",
                    });
                }
            }
            (BindingType::StorageTexture { format }, BindingResource::Texture(texture)) => {
                if !texture.usage.contains(TextureUsage::SHADER_WRITE) {
                    return Err(ConfigError::MissingUsage {
                        what: "storage texture binding",
                        usage: "SHADER_WRITE",
                    });
                }
                if texture.format != format {
                    return Err(ConfigError::BindGroup("storage texture format differs"));
                }
            }
            (BindingType::Sampler { .. }, BindingResource::Sampler(_)) => {}
            _ => return Err(ConfigError::BindGroup("resource kind differs from the layout")),
        }
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct BindGroup {
    pub(crate) raw: BindGroupKey,
}

//=============================================================================
// Pipeline Layouts
//=============================================================================

#[derive(Clone, Debug, Default, Hash, PartialEq, Eq)]
pub struct PipelineLayoutDesc {
    pub name: String,
    pub bind_group_layouts: Vec<BindGroupLayout>,
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct PipelineLayout {
    pub(crate) raw: PipelineLayoutKey,
    pub(crate) bind_group_count: u32,
}

impl PipelineLayout {
    pub fn bind_group_count(&self) -> u32 {
        self.bind_group_count
    }
}

//=============================================================================
// Render Pipeline State
//=============================================================================

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum VertexFormat {
    F32,
    F32Vec2,
    F32Vec3,
    F32Vec4,
    U32,
    U32Vec2,
    U32Vec3,
    U32Vec4,
    I32,
    I32Vec2,
    I32Vec3,
    I32Vec4,
    Unorm8x4,
}

impl VertexFormat {
    pub fn size(self) -> u32 {
        match self {
            Self::F32 | Self::U32 | Self::I32 | Self::Unorm8x4 => 4,
            Self::F32Vec2 | Self::U32Vec2 | Self::I32Vec2 => 8,
            Self::F32Vec3 | Self::U32Vec3 | Self::I32Vec3 => 12,
            Self::F32Vec4 | Self::U32Vec4 | Self::I32Vec4 => 16,
        }
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct VertexAttribute {
    pub format: VertexFormat,
    pub offset: u32,
    pub location: u32,
}

#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
pub enum VertexStepMode {
    #[default]
    Vertex,
    Instance,
}

#[derive(Clone, Debug, Default, Hash, PartialEq, Eq)]
pub struct VertexBufferLayout {
    pub stride: u32,
    pub step_mode: VertexStepMode,
    pub attributes: Vec<VertexAttribute>,
}

#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
}

#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
pub enum FrontFace {
    #[default]
    Ccw,
    Cw,
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Face {
    Front,
    Back,
}

#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
pub struct PrimitiveState {
    pub topology: PrimitiveTopology,
    pub front_face: FrontFace,
    pub cull_mode: Option<Face>,
    pub wireframe: bool,
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    Src,
    OneMinusSrc,
    SrcAlpha,
    OneMinusSrcAlpha,
    Dst,
    OneMinusDst,
    DstAlpha,
    OneMinusDstAlpha,
    SrcAlphaSaturated,
    Constant,
    OneMinusConstant,
}

#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
pub enum BlendOperation {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct BlendComponent {
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
    pub operation: BlendOperation,
}

impl BlendComponent {
    pub const REPLACE: Self = Self {
        src_factor: BlendFactor::One,
        dst_factor: BlendFactor::Zero,
        operation: BlendOperation::Add,
    };
    pub const OVER: Self = Self {
        src_factor: BlendFactor::One,
        dst_factor: BlendFactor::OneMinusSrcAlpha,
        operation: BlendOperation::Add,
    };
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct BlendState {
    pub color: BlendComponent,
    pub alpha: BlendComponent,
}

impl BlendState {
    pub const ALPHA_BLENDING: Self = Self {
        color: BlendComponent {
            src_factor: BlendFactor::SrcAlpha,
            dst_factor: BlendFactor::OneMinusSrcAlpha,
            operation: BlendOperation::Add,
        },
        alpha: BlendComponent::OVER,
    };
    pub const PREMULTIPLIED_ALPHA_BLENDING: Self = Self {
        color: BlendComponent::OVER,
        alpha: BlendComponent::OVER,
    };
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
    pub struct ColorWrites: u32 {
        const RED = 1 << 0;
        const GREEN = 1 << 1;
        const BLUE = 1 << 2;
        const ALPHA = 1 << 3;
        const COLOR = Self::RED.bits() | Self::GREEN.bits() | Self::BLUE.bits();
        const ALL = Self::COLOR.bits() | Self::ALPHA.bits();
    }
}

impl Default for ColorWrites {
    fn default() -> Self {
        Self::ALL
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct ColorTargetState {
    pub format: PixelFormat,
    pub blend: Option<BlendState>,
    pub write_mask: ColorWrites,
}

impl From<PixelFormat> for ColorTargetState {
    fn from(format: PixelFormat) -> Self {
        Self {
            format,
            blend: None,
            write_mask: ColorWrites::ALL,
        }
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum StencilOperation {
    Keep,
    Zero,
    Replace,
    Invert,
    IncrementClamp,
    DecrementClamp,
    IncrementWrap,
    DecrementWrap,
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct StencilFaceState {
    pub compare: CompareFunction,
    pub fail_op: StencilOperation,
    pub depth_fail_op: StencilOperation,
    pub pass_op: StencilOperation,
}

impl StencilFaceState {
    pub const IGNORE: Self = Self {
        compare: CompareFunction::Always,
        fail_op: StencilOperation::Keep,
        depth_fail_op: StencilOperation::Keep,
        pass_op: StencilOperation::Keep,
    };
}

impl Default for StencilFaceState {
    fn default() -> Self {
        Self::IGNORE
    }
}

#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
pub struct StencilState {
    pub front: StencilFaceState,
    pub back: StencilFaceState,
    pub read_mask: u32,
    pub write_mask: u32,
}

/// Depth bias parameters, compared bit-wise so they can key the cache.
#[derive(Clone, Copy, Debug, Default)]
pub struct DepthBiasState {
    pub constant: i32,
    pub slope_scale: f32,
    pub clamp: f32,
}

impl PartialEq for DepthBiasState {
    fn eq(&self, other: &Self) -> bool {
        self.constant == other.constant
            && self.slope_scale.to_bits() == other.slope_scale.to_bits()
            && self.clamp.to_bits() == other.clamp.to_bits()
    }
}

impl Eq for DepthBiasState {}

impl std::hash::Hash for DepthBiasState {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.constant.hash(state);
        self.slope_scale.to_bits().hash(state);
        self.clamp.to_bits().hash(state);
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct DepthStencilState {
    pub format: PixelFormat,
    pub depth_write_enabled: bool,
    pub depth_compare: CompareFunction,
    pub stencil: StencilState,
    pub bias: DepthBiasState,
}

//=============================================================================
// Pipelines
//=============================================================================

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct RenderPipelineDesc {
    pub name: String,
    pub layout: PipelineLayout,
    pub vertex: ShaderModule,
    pub fragment: Option<ShaderModule>,
    pub vertex_buffers: Vec<VertexBufferLayout>,
    pub primitive: PrimitiveState,
    pub color_targets: Vec<ColorTargetState>,
    pub depth_stencil: Option<DepthStencilState>,
    pub sample_count: SampleCount,
}

impl RenderPipelineDesc {
    pub(crate) fn validate(&self, max_color_attachments: u32) -> Result<(), ConfigError> {
        if self.vertex.stage != ShaderStage::Vertex {
            return Err(ConfigError::Pipeline("vertex module is not a vertex shader"));
        }
        if let Some(fragment) = self.fragment {
            if fragment.stage != ShaderStage::Fragment {
                return Err(ConfigError::Pipeline(
                    "fragment module is not a fragment shader",
                ));
            }
        }
        if self.color_targets.is_empty() && self.depth_stencil.is_none() {
            return Err(ConfigError::Pipeline("pipeline has no render targets"));
        }
        if self.color_targets.len() > max_color_attachments as usize {
            return Err(ConfigError::ExceedsLimit {
                what: "color target count",
                value: self.color_targets.len() as u64,
                limit: max_color_attachments as u64,
            });
        }
        for target in self.color_targets.iter() {
            if !format::is_color_renderable_format(target.format) {
                return Err(ConfigError::FormatUsage {
                    format: target.format,
                    reason: "color target format is not renderable",
                });
            }
        }
        if let Some(ref ds) = self.depth_stencil {
            if !format::is_depth_stencil_format(ds.format) {
                return Err(ConfigError::FormatUsage {
                    format: ds.format,
                    reason: "depth-stencil state needs a depth or stencil format",
                });
            }
        }
        for buffer in self.vertex_buffers.iter() {
            for attribute in buffer.attributes.iter() {
                if attribute.offset + attribute.format.size() > buffer.stride {
                    return Err(ConfigError::Pipeline("vertex attribute exceeds the stride"));
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct RenderPipeline {
    pub(crate) raw: RenderPipelineKey,
    pub(crate) topology: PrimitiveTopology,
    pub(crate) bind_group_count: u32,
}

impl RenderPipeline {
    pub fn topology(&self) -> PrimitiveTopology {
        self.topology
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ComputePipelineDesc {
    pub name: String,
    pub layout: PipelineLayout,
    pub compute: ShaderModule,
}

impl ComputePipelineDesc {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.compute.stage != ShaderStage::Compute {
            return Err(ConfigError::Pipeline("compute module is not a compute shader"));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct ComputePipeline {
    pub(crate) raw: ComputePipelineKey,
    pub(crate) bind_group_count: u32,
}
