//! Textures, buffers and samplers: descriptors, handles and validation.

use crate::{
    format, Backend, BufferKey, ConfigError, DeviceCaps, Extent, GraphicsError, NotSupportedError,
    PixelFormat, SamplerKey, TextureKey,
};

//=============================================================================
// Textures
//=============================================================================

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum TextureDimension {
    D1,
    D2,
    D3,
}

#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
pub enum SampleCount {
    #[default]
    X1 = 1,
    X2 = 2,
    X4 = 4,
    X8 = 8,
    X16 = 16,
    X32 = 32,
}

impl SampleCount {
    pub fn count(self) -> u32 {
        self as u32
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
    pub struct TextureUsage: u32 {
        const SHADER_READ = 1 << 0;
        const SHADER_WRITE = 1 << 1;
        const RENDER_TARGET = 1 << 2;
        /// Contents never outlive a render pass.
        const TRANSIENT = 1 << 3;
        const SHADING_RATE = 1 << 4;
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct TextureDesc<'a> {
    pub name: &'a str,
    pub dimension: TextureDimension,
    pub format: PixelFormat,
    pub size: Extent,
    /// Zero requests the full mip chain.
    pub mip_level_count: u32,
    pub sample_count: SampleCount,
    pub usage: TextureUsage,
    /// Array layers may be viewed as cube faces.
    pub cube_compatible: bool,
}

impl TextureDesc<'static> {
    pub fn tex_1d(format: PixelFormat, width: u32, mip_level_count: u32, array_layers: u32) -> Self {
        Self {
            name: "",
            dimension: TextureDimension::D1,
            format,
            size: Extent::new(width, 1, array_layers),
            mip_level_count,
            sample_count: SampleCount::X1,
            usage: TextureUsage::SHADER_READ,
            cube_compatible: false,
        }
    }

    pub fn tex_2d(
        format: PixelFormat,
        width: u32,
        height: u32,
        mip_level_count: u32,
        array_layers: u32,
    ) -> Self {
        Self {
            dimension: TextureDimension::D2,
            size: Extent::new(width, height, array_layers),
            ..Self::tex_1d(format, width, mip_level_count, array_layers)
        }
    }

    pub fn tex_3d(format: PixelFormat, width: u32, height: u32, depth: u32, mip_level_count: u32) -> Self {
        Self {
            dimension: TextureDimension::D3,
            size: Extent::new(width, height, depth),
            ..Self::tex_1d(format, width, mip_level_count, 1)
        }
    }

    /// A cube map with six layers per cube.
    pub fn cube(format: PixelFormat, size: u32, mip_level_count: u32, cube_count: u32) -> Self {
        Self {
            cube_compatible: true,
            ..Self::tex_2d(format, size, size, mip_level_count, cube_count * 6)
        }
    }
}

impl<'a> TextureDesc<'a> {
    pub fn with_name(self, name: &'a str) -> Self {
        Self { name, ..self }
    }

    pub fn with_usage(self, usage: TextureUsage) -> Self {
        Self { usage, ..self }
    }

    pub fn with_sample_count(self, sample_count: SampleCount) -> Self {
        Self {
            sample_count,
            ..self
        }
    }

    /// Number of levels in a complete chain down to 1x1(x1).
    pub fn full_mip_chain(&self) -> u32 {
        let depth = match self.dimension {
            TextureDimension::D3 => self.size.depth_or_array_layers,
            _ => 1,
        };
        let largest = self.size.width.max(self.size.height).max(depth);
        u32::BITS - largest.max(1).leading_zeros()
    }

    pub fn resolved_mip_level_count(&self) -> u32 {
        match self.mip_level_count {
            0 => self.full_mip_chain(),
            count => count,
        }
    }

    pub fn array_layer_count(&self) -> u32 {
        match self.dimension {
            TextureDimension::D3 => 1,
            _ => self.size.depth_or_array_layers,
        }
    }

    /// Total bytes across all mips, layers and samples.
    pub fn memory_size(&self) -> u64 {
        let is_3d = self.dimension == TextureDimension::D3;
        let per_layer: u64 = (0..self.resolved_mip_level_count())
            .map(|level| {
                let extent = self.size.at_mip_level(level, is_3d);
                let slice = format::surface_info(self.format, extent.width, extent.height);
                let depth = if is_3d { extent.depth_or_array_layers } else { 1 };
                slice.slice_pitch * depth as u64
            })
            .sum();
        per_layer * self.array_layer_count() as u64 * self.sample_count.count() as u64
    }

    pub(crate) fn validate(&self, caps: &DeviceCaps) -> Result<(), GraphicsError> {
        if self.size.is_empty() {
            return Err(ConfigError::ZeroExtent(self.size).into());
        }
        let limits = &caps.limits;
        let (max_dimension, what) = match self.dimension {
            TextureDimension::D1 => (limits.max_texture_dimension_1d, "1D texture size"),
            TextureDimension::D2 => (limits.max_texture_dimension_2d, "2D texture size"),
            TextureDimension::D3 => (limits.max_texture_dimension_3d, "3D texture size"),
        };
        let largest = self.size.width.max(self.size.height);
        check_limit(what, largest as u64, max_dimension as u64)?;
        match self.dimension {
            TextureDimension::D1 => check_limit("1D texture height", self.size.height as u64, 1)?,
            TextureDimension::D2 => check_limit(
                "array layer count",
                self.size.depth_or_array_layers as u64,
                limits.max_texture_array_layers as u64,
            )?,
            TextureDimension::D3 => check_limit(
                "3D texture depth",
                self.size.depth_or_array_layers as u64,
                limits.max_texture_dimension_3d as u64,
            )?,
        }

        let max_mips = self.full_mip_chain();
        if self.mip_level_count > max_mips {
            return Err(ConfigError::MipLevelCount {
                requested: self.mip_level_count,
                max: max_mips,
            }
            .into());
        }

        if self.sample_count != SampleCount::X1 {
            if self.dimension != TextureDimension::D2 {
                return Err(ConfigError::SampleCount("multisampled textures must be 2D").into());
            }
            if self.resolved_mip_level_count() != 1 {
                return Err(ConfigError::SampleCount("multisampled textures have one mip").into());
            }
            if !self.usage.contains(TextureUsage::RENDER_TARGET) {
                return Err(
                    ConfigError::SampleCount("multisampled textures must be render targets").into(),
                );
            }
            if self.usage.contains(TextureUsage::SHADER_WRITE) {
                return Err(
                    ConfigError::SampleCount("multisampled textures cannot be written by shaders")
                        .into(),
                );
            }
            if !caps.supports_sample_count(self.sample_count.count()) {
                return Err(ConfigError::SampleCount("not supported by the device").into());
            }
        }

        if self.cube_compatible
            && (self.dimension != TextureDimension::D2
                || self.size.width != self.size.height
                || self.size.depth_or_array_layers % 6 != 0)
        {
            return Err(ConfigError::FormatUsage {
                format: self.format,
                reason: "cube textures must be square 2D arrays with six layers per cube",
            }
            .into());
        }

        self.validate_format_usage()?;

        let missing = self.format.required_features() - caps.features;
        if !missing.is_empty() {
            return Err(NotSupportedError::Features(missing).into());
        }
        Ok(())
    }

    fn validate_format_usage(&self) -> Result<(), ConfigError> {
        let format = self.format;
        let fail = |reason| Err(ConfigError::FormatUsage { format, reason });
        if format::is_compressed_format(format) {
            if self
                .usage
                .intersects(TextureUsage::RENDER_TARGET | TextureUsage::SHADER_WRITE)
            {
                return fail("compressed formats cannot be rendered to or written by shaders");
            }
            if self.size.width % 4 != 0 || self.size.height % 4 != 0 {
                return fail("compressed textures must be a multiple of 4 texels wide and high");
            }
        } else if format::is_depth_stencil_format(format) {
            if self.dimension == TextureDimension::D3 {
                return fail("depth formats cannot be used by 3D textures");
            }
            if self.usage.contains(TextureUsage::SHADER_WRITE) {
                return fail("depth formats cannot be written by shaders");
            }
        } else if self.usage.contains(TextureUsage::RENDER_TARGET)
            && !format::is_color_renderable_format(format)
        {
            return fail("format is not color renderable");
        }
        Ok(())
    }
}

/// Format handed to the native API for a texture's storage.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum NativeFormat {
    Dxgi(u32),
    Vulkan(u32),
    /// The backend consumes `PixelFormat` directly.
    Portable(PixelFormat),
}

impl NativeFormat {
    /// Storage format for a texture of the given description.
    ///
    /// Depth textures that are both rendered to and sampled are stored in the
    /// typeless family on D3D backends and viewed through a format cast.
    pub fn for_texture(backend: Backend, desc: &TextureDesc) -> (Self, bool) {
        match backend {
            Backend::D3D11 | Backend::D3D12 => {
                let typeless = format::is_depth_stencil_format(desc.format)
                    && desc
                        .usage
                        .contains(TextureUsage::RENDER_TARGET | TextureUsage::SHADER_READ);
                if typeless {
                    (
                        Self::Dxgi(format::dxgi_typeless_depth_format(desc.format)),
                        true,
                    )
                } else {
                    (Self::Dxgi(format::dxgi_format(desc.format)), false)
                }
            }
            Backend::Vulkan => (Self::Vulkan(format::vk_format(desc.format)), false),
            Backend::Metal | Backend::Null => (Self::Portable(desc.format), false),
        }
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct Texture {
    pub(crate) raw: TextureKey,
    pub(crate) format: PixelFormat,
    pub(crate) native_format: NativeFormat,
    pub(crate) typeless: bool,
    pub(crate) dimension: TextureDimension,
    pub(crate) size: Extent,
    pub(crate) mip_level_count: u32,
    pub(crate) sample_count: SampleCount,
    pub(crate) usage: TextureUsage,
}

impl Texture {
    pub fn key(&self) -> TextureKey {
        self.raw
    }
    pub fn format(&self) -> PixelFormat {
        self.format
    }
    pub fn native_format(&self) -> NativeFormat {
        self.native_format
    }
    /// Storage uses a typeless format distinct from [`Texture::format`].
    pub fn is_typeless_storage(&self) -> bool {
        self.typeless
    }
    pub fn dimension(&self) -> TextureDimension {
        self.dimension
    }
    pub fn size(&self) -> Extent {
        self.size
    }
    pub fn mip_level_count(&self) -> u32 {
        self.mip_level_count
    }
    pub fn sample_count(&self) -> SampleCount {
        self.sample_count
    }
    pub fn usage(&self) -> TextureUsage {
        self.usage
    }

    pub fn mip_level_size(&self, level: u32) -> Extent {
        self.size
            .at_mip_level(level, self.dimension == TextureDimension::D3)
    }
}

//=============================================================================
// Buffers
//=============================================================================

#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
pub enum Memory {
    /// GPU-only memory.
    #[default]
    Private,
    /// CPU-writable staging memory.
    Upload,
    /// CPU-readable memory for copying results back.
    Readback,
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const CONSTANT = 1 << 2;
        const SHADER_READ = 1 << 3;
        const SHADER_WRITE = 1 << 4;
        const INDIRECT = 1 << 5;
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct BufferDesc<'a> {
    pub name: &'a str,
    pub size: u64,
    pub usage: BufferUsage,
    pub memory: Memory,
}

impl BufferDesc<'_> {
    pub(crate) fn validate(&self, caps: &DeviceCaps) -> Result<(), ConfigError> {
        if self.size < 4 {
            return Err(ConfigError::BufferTooSmall(self.size));
        }
        check_limit("buffer size", self.size, caps.limits.max_buffer_size)?;
        if self.memory == Memory::Readback && !self.usage.is_empty() {
            return Err(ConfigError::Memory {
                what: "binding a buffer to the pipeline",
                expected: Memory::Private,
            });
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct Buffer {
    pub(crate) raw: BufferKey,
    pub(crate) size: u64,
    pub(crate) usage: BufferUsage,
    pub(crate) memory: Memory,
}

impl Buffer {
    pub fn key(&self) -> BufferKey {
        self.raw
    }
    pub fn size(&self) -> u64 {
        self.size
    }
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
    pub fn memory(&self) -> Memory {
        self.memory
    }

    pub(crate) fn check_range(&self, what: &'static str, offset: u64, len: u64) -> Result<(), ConfigError> {
        let end = offset.saturating_add(len);
        if end > self.size {
            return Err(ConfigError::OutOfBounds {
                what,
                end,
                size: self.size,
            });
        }
        Ok(())
    }
}

//=============================================================================
// Samplers
//=============================================================================

#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
pub enum AddressMode {
    #[default]
    ClampToEdge,
    Repeat,
    MirrorRepeat,
    ClampToBorder,
}

#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
pub enum FilterMode {
    #[default]
    Nearest,
    Linear,
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum BorderColor {
    TransparentBlack,
    OpaqueBlack,
    OpaqueWhite,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplerDesc<'a> {
    pub name: &'a str,
    pub address_modes: [AddressMode; 3],
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub mipmap_filter: FilterMode,
    pub lod_min_clamp: f32,
    pub lod_max_clamp: Option<f32>,
    pub compare: Option<CompareFunction>,
    pub max_anisotropy: u16,
    pub border_color: Option<BorderColor>,
}

impl Default for SamplerDesc<'_> {
    fn default() -> Self {
        Self {
            name: "",
            address_modes: [AddressMode::ClampToEdge; 3],
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            mipmap_filter: FilterMode::Nearest,
            lod_min_clamp: 0.0,
            lod_max_clamp: None,
            compare: None,
            max_anisotropy: 1,
            border_color: None,
        }
    }
}

impl SamplerDesc<'_> {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=16).contains(&self.max_anisotropy) {
            return Err(ConfigError::Anisotropy(self.max_anisotropy));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct Sampler {
    pub(crate) raw: SamplerKey,
}

impl Sampler {
    pub fn key(&self) -> SamplerKey {
        self.raw
    }
}

fn check_limit(what: &'static str, value: u64, limit: u64) -> Result<(), ConfigError> {
    if value > limit {
        return Err(ConfigError::ExceedsLimit { what, value, limit });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Features;

    fn caps() -> DeviceCaps {
        DeviceCaps {
            features: Features::TEXTURE_COMPRESSION_BC,
            ..DeviceCaps::default()
        }
    }

    #[test]
    fn full_mip_chain_counts() {
        let desc = TextureDesc::tex_2d(PixelFormat::Rgba8Unorm, 1024, 512, 0, 1);
        assert_eq!(desc.resolved_mip_level_count(), 11);
        let desc = TextureDesc::tex_2d(PixelFormat::Rgba8Unorm, 1, 1, 0, 1);
        assert_eq!(desc.resolved_mip_level_count(), 1);
        // depth only counts for volumes
        let desc = TextureDesc::tex_2d(PixelFormat::Rgba8Unorm, 4, 4, 0, 64);
        assert_eq!(desc.resolved_mip_level_count(), 3);
        let desc = TextureDesc::tex_3d(PixelFormat::Rgba8Unorm, 4, 4, 64, 0);
        assert_eq!(desc.resolved_mip_level_count(), 7);
    }

    #[test]
    fn odd_sizes_round_the_chain_down() {
        // 5 -> 2 -> 1
        let desc = TextureDesc::tex_2d(PixelFormat::Rgba8Unorm, 5, 3, 0, 1);
        assert_eq!(desc.resolved_mip_level_count(), 3);
        let explicit = TextureDesc {
            mip_level_count: 3,
            ..desc
        };
        assert_eq!(explicit.validate(&caps()), Ok(()));
        let too_many = TextureDesc {
            mip_level_count: 4,
            ..desc
        };
        assert_eq!(
            too_many.validate(&caps()),
            Err(GraphicsError::Config(ConfigError::MipLevelCount {
                requested: 4,
                max: 3
            }))
        );
    }

    #[test]
    fn zero_extent_is_rejected() {
        let desc = TextureDesc::tex_2d(PixelFormat::Rgba8Unorm, 0, 16, 1, 1);
        assert_eq!(
            desc.validate(&caps()),
            Err(GraphicsError::Config(ConfigError::ZeroExtent(Extent::new(0, 16, 1))))
        );
        let desc = TextureDesc::tex_3d(PixelFormat::Rgba8Unorm, 1, 1, 1, 1);
        assert_eq!(desc.validate(&caps()), Ok(()));
    }

    #[test]
    fn compressed_render_target_is_rejected() {
        let desc = TextureDesc::tex_2d(PixelFormat::Bc1RgbaUnorm, 64, 64, 1, 1)
            .with_usage(TextureUsage::RENDER_TARGET);
        assert!(matches!(
            desc.validate(&caps()),
            Err(GraphicsError::Config(ConfigError::FormatUsage { .. }))
        ));
    }

    #[test]
    fn missing_compression_feature() {
        let desc = TextureDesc::tex_2d(PixelFormat::Astc4x4Unorm, 64, 64, 1, 1);
        assert_eq!(
            desc.validate(&caps()),
            Err(GraphicsError::NotSupported(NotSupportedError::Features(
                Features::TEXTURE_COMPRESSION_ASTC
            )))
        );
    }

    #[test]
    fn multisample_rules() {
        let desc = TextureDesc::tex_2d(PixelFormat::Rgba8Unorm, 64, 64, 1, 1)
            .with_sample_count(SampleCount::X4);
        assert!(desc.validate(&caps()).is_err());
        let desc = desc.with_usage(TextureUsage::RENDER_TARGET);
        assert_eq!(desc.validate(&caps()), Ok(()));
        let desc = desc.with_sample_count(SampleCount::X32);
        assert!(desc.validate(&caps()).is_err());
    }

    #[test]
    fn memory_size_of_mip_chain() {
        let desc = TextureDesc::tex_2d(PixelFormat::Rgba8Unorm, 4, 4, 0, 2);
        // 4x4 + 2x2 + 1x1 texels, two layers
        assert_eq!(desc.memory_size(), (16 + 4 + 1) * 4 * 2);
        let desc = TextureDesc::tex_2d(PixelFormat::Bc1RgbaUnorm, 8, 8, 0, 1);
        // 2x2 blocks, then 1 block for each smaller level
        assert_eq!(desc.memory_size(), 4 * 8 + 8 + 8 + 8);
    }

    #[test]
    fn typeless_depth_only_on_d3d() {
        let desc = TextureDesc::tex_2d(PixelFormat::Depth32Float, 64, 64, 1, 1)
            .with_usage(TextureUsage::RENDER_TARGET | TextureUsage::SHADER_READ);
        assert_eq!(
            NativeFormat::for_texture(Backend::D3D12, &desc),
            (NativeFormat::Dxgi(39), true)
        );
        assert_eq!(
            NativeFormat::for_texture(Backend::Vulkan, &desc),
            (NativeFormat::Vulkan(126), false)
        );
        let target_only = desc.with_usage(TextureUsage::RENDER_TARGET);
        assert_eq!(
            NativeFormat::for_texture(Backend::D3D11, &target_only),
            (NativeFormat::Dxgi(40), false)
        );
    }

    #[test]
    fn buffer_limits() {
        let desc = BufferDesc {
            name: "tiny",
            size: 3,
            usage: BufferUsage::VERTEX,
            memory: Memory::Private,
        };
        assert_eq!(desc.validate(&caps()), Err(ConfigError::BufferTooSmall(3)));
        let desc = BufferDesc { size: 4, ..desc };
        assert_eq!(desc.validate(&caps()), Ok(()));
    }

    #[test]
    fn sampler_anisotropy_range() {
        let desc = SamplerDesc {
            max_anisotropy: 0,
            ..Default::default()
        };
        assert_eq!(desc.validate(), Err(ConfigError::Anisotropy(0)));
        let desc = SamplerDesc {
            max_anisotropy: 16,
            ..Default::default()
        };
        assert_eq!(desc.validate(), Ok(()));
    }

    #[test]
    fn sampled_depth_is_typeless_on_d3d() {
        let sampled = TextureDesc::tex_2d(PixelFormat::Depth32Float, 64, 64, 1, 1)
            .with_usage(TextureUsage::RENDER_TARGET | TextureUsage::SHADER_READ);
        for backend in [Backend::D3D11, Backend::D3D12] {
            assert_eq!(
                NativeFormat::for_texture(backend, &sampled),
                (NativeFormat::Dxgi(39), true)
            );
        }
        let stencil = TextureDesc {
            format: PixelFormat::Depth24UnormStencil8,
            ..sampled
        };
        assert_eq!(
            NativeFormat::for_texture(Backend::D3D12, &stencil),
            (NativeFormat::Dxgi(44), true)
        );

        let target_only = sampled.with_usage(TextureUsage::RENDER_TARGET);
        assert_eq!(
            NativeFormat::for_texture(Backend::D3D12, &target_only),
            (NativeFormat::Dxgi(40), false)
        );
        let color = TextureDesc::tex_2d(PixelFormat::Rgba8Unorm, 64, 64, 1, 1)
            .with_usage(TextureUsage::RENDER_TARGET | TextureUsage::SHADER_READ);
        assert_eq!(
            NativeFormat::for_texture(Backend::D3D12, &color),
            (NativeFormat::Dxgi(28), false)
        );
    }

    #[test]
    fn depth_is_never_typeless_elsewhere() {
        let sampled = TextureDesc::tex_2d(PixelFormat::Depth32Float, 64, 64, 1, 1)
            .with_usage(TextureUsage::RENDER_TARGET | TextureUsage::SHADER_READ);
        assert_eq!(
            NativeFormat::for_texture(Backend::Vulkan, &sampled),
            (NativeFormat::Vulkan(126), false)
        );
        for backend in [Backend::Metal, Backend::Null] {
            assert_eq!(
                NativeFormat::for_texture(backend, &sampled),
                (NativeFormat::Portable(PixelFormat::Depth32Float), false)
            );
        }
    }
}
