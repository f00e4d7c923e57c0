//! Pixel format metadata.
//!
//! Every supported format has a static [`FormatInfo`] entry describing its
//! block layout and numeric kind, plus the native format codes used by the
//! DXGI (D3D11/D3D12) and Vulkan backends. All functions here are pure.

use crate::Features;

/// Numeric interpretation of the texel data.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum FormatKind {
    Unorm,
    Snorm,
    Uint,
    Sint,
    Float,
    UnormSrgb,
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum PixelFormat {
    // 8-bit
    R8Unorm,
    R8Snorm,
    R8Uint,
    R8Sint,
    // 16-bit
    R16Unorm,
    R16Snorm,
    R16Uint,
    R16Sint,
    R16Float,
    Rg8Unorm,
    Rg8Snorm,
    Rg8Uint,
    Rg8Sint,
    // packed 16-bit
    Bgra4Unorm,
    B5g6r5Unorm,
    Bgr5a1Unorm,
    // 32-bit
    R32Uint,
    R32Sint,
    R32Float,
    Rg16Unorm,
    Rg16Snorm,
    Rg16Uint,
    Rg16Sint,
    Rg16Float,
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Rgba8Snorm,
    Rgba8Uint,
    Rgba8Sint,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    // packed 32-bit
    Rgb9e5Ufloat,
    Rgb10a2Unorm,
    Rgb10a2Uint,
    Rg11b10Float,
    // 64-bit
    Rg32Uint,
    Rg32Sint,
    Rg32Float,
    Rgba16Unorm,
    Rgba16Snorm,
    Rgba16Uint,
    Rgba16Sint,
    Rgba16Float,
    // 128-bit
    Rgba32Uint,
    Rgba32Sint,
    Rgba32Float,
    // depth / stencil
    Stencil8,
    Depth16Unorm,
    Depth24UnormStencil8,
    Depth32Float,
    Depth32FloatStencil8,
    // BC
    Bc1RgbaUnorm,
    Bc1RgbaUnormSrgb,
    Bc2RgbaUnorm,
    Bc2RgbaUnormSrgb,
    Bc3RgbaUnorm,
    Bc3RgbaUnormSrgb,
    Bc4RUnorm,
    Bc4RSnorm,
    Bc5RgUnorm,
    Bc5RgSnorm,
    Bc6hRgbUfloat,
    Bc6hRgbFloat,
    Bc7RgbaUnorm,
    Bc7RgbaUnormSrgb,
    // ETC2 / EAC
    Etc2Rgb8Unorm,
    Etc2Rgb8UnormSrgb,
    Etc2Rgb8A1Unorm,
    Etc2Rgb8A1UnormSrgb,
    Etc2Rgba8Unorm,
    Etc2Rgba8UnormSrgb,
    EacR11Unorm,
    EacR11Snorm,
    EacRg11Unorm,
    EacRg11Snorm,
    // ASTC
    Astc4x4Unorm,
    Astc4x4UnormSrgb,
}

/// Static description of a pixel format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormatInfo {
    pub format: PixelFormat,
    pub bytes_per_block: u32,
    pub block_width: u32,
    pub block_height: u32,
    pub kind: FormatKind,
}

/// Memory layout of one 2D slice of a texture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SurfaceInfo {
    pub row_pitch: u64,
    pub slice_pitch: u64,
    pub width_count: u32,
    pub height_count: u32,
}

const fn linear(format: PixelFormat, bytes_per_block: u32, kind: FormatKind) -> FormatInfo {
    FormatInfo {
        format,
        bytes_per_block,
        block_width: 1,
        block_height: 1,
        kind,
    }
}

const fn block(format: PixelFormat, bytes_per_block: u32, kind: FormatKind) -> FormatInfo {
    FormatInfo {
        format,
        bytes_per_block,
        block_width: 4,
        block_height: 4,
        kind,
    }
}

use FormatKind as K;
use PixelFormat as F;

/// Indexed by the `PixelFormat` discriminant.
static FORMAT_INFOS: [FormatInfo; 77] = [
    linear(F::R8Unorm, 1, K::Unorm),
    linear(F::R8Snorm, 1, K::Snorm),
    linear(F::R8Uint, 1, K::Uint),
    linear(F::R8Sint, 1, K::Sint),
    linear(F::R16Unorm, 2, K::Unorm),
    linear(F::R16Snorm, 2, K::Snorm),
    linear(F::R16Uint, 2, K::Uint),
    linear(F::R16Sint, 2, K::Sint),
    linear(F::R16Float, 2, K::Float),
    linear(F::Rg8Unorm, 2, K::Unorm),
    linear(F::Rg8Snorm, 2, K::Snorm),
    linear(F::Rg8Uint, 2, K::Uint),
    linear(F::Rg8Sint, 2, K::Sint),
    linear(F::Bgra4Unorm, 2, K::Unorm),
    linear(F::B5g6r5Unorm, 2, K::Unorm),
    linear(F::Bgr5a1Unorm, 2, K::Unorm),
    linear(F::R32Uint, 4, K::Uint),
    linear(F::R32Sint, 4, K::Sint),
    linear(F::R32Float, 4, K::Float),
    linear(F::Rg16Unorm, 4, K::Unorm),
    linear(F::Rg16Snorm, 4, K::Snorm),
    linear(F::Rg16Uint, 4, K::Uint),
    linear(F::Rg16Sint, 4, K::Sint),
    linear(F::Rg16Float, 4, K::Float),
    linear(F::Rgba8Unorm, 4, K::Unorm),
    linear(F::Rgba8UnormSrgb, 4, K::UnormSrgb),
    linear(F::Rgba8Snorm, 4, K::Snorm),
    linear(F::Rgba8Uint, 4, K::Uint),
    linear(F::Rgba8Sint, 4, K::Sint),
    linear(F::Bgra8Unorm, 4, K::Unorm),
    linear(F::Bgra8UnormSrgb, 4, K::UnormSrgb),
    linear(F::Rgb9e5Ufloat, 4, K::Float),
    linear(F::Rgb10a2Unorm, 4, K::Unorm),
    linear(F::Rgb10a2Uint, 4, K::Uint),
    linear(F::Rg11b10Float, 4, K::Float),
    linear(F::Rg32Uint, 8, K::Uint),
    linear(F::Rg32Sint, 8, K::Sint),
    linear(F::Rg32Float, 8, K::Float),
    linear(F::Rgba16Unorm, 8, K::Unorm),
    linear(F::Rgba16Snorm, 8, K::Snorm),
    linear(F::Rgba16Uint, 8, K::Uint),
    linear(F::Rgba16Sint, 8, K::Sint),
    linear(F::Rgba16Float, 8, K::Float),
    linear(F::Rgba32Uint, 16, K::Uint),
    linear(F::Rgba32Sint, 16, K::Sint),
    linear(F::Rgba32Float, 16, K::Float),
    linear(F::Stencil8, 1, K::Uint),
    linear(F::Depth16Unorm, 2, K::Unorm),
    linear(F::Depth24UnormStencil8, 4, K::Unorm),
    linear(F::Depth32Float, 4, K::Float),
    linear(F::Depth32FloatStencil8, 8, K::Float),
    block(F::Bc1RgbaUnorm, 8, K::Unorm),
    block(F::Bc1RgbaUnormSrgb, 8, K::UnormSrgb),
    block(F::Bc2RgbaUnorm, 16, K::Unorm),
    block(F::Bc2RgbaUnormSrgb, 16, K::UnormSrgb),
    block(F::Bc3RgbaUnorm, 16, K::Unorm),
    block(F::Bc3RgbaUnormSrgb, 16, K::UnormSrgb),
    block(F::Bc4RUnorm, 8, K::Unorm),
    block(F::Bc4RSnorm, 8, K::Snorm),
    block(F::Bc5RgUnorm, 16, K::Unorm),
    block(F::Bc5RgSnorm, 16, K::Snorm),
    block(F::Bc6hRgbUfloat, 16, K::Float),
    block(F::Bc6hRgbFloat, 16, K::Float),
    block(F::Bc7RgbaUnorm, 16, K::Unorm),
    block(F::Bc7RgbaUnormSrgb, 16, K::UnormSrgb),
    block(F::Etc2Rgb8Unorm, 8, K::Unorm),
    block(F::Etc2Rgb8UnormSrgb, 8, K::UnormSrgb),
    block(F::Etc2Rgb8A1Unorm, 8, K::Unorm),
    block(F::Etc2Rgb8A1UnormSrgb, 8, K::UnormSrgb),
    block(F::Etc2Rgba8Unorm, 16, K::Unorm),
    block(F::Etc2Rgba8UnormSrgb, 16, K::UnormSrgb),
    block(F::EacR11Unorm, 8, K::Unorm),
    block(F::EacR11Snorm, 8, K::Snorm),
    block(F::EacRg11Unorm, 16, K::Unorm),
    block(F::EacRg11Snorm, 16, K::Snorm),
    block(F::Astc4x4Unorm, 16, K::Unorm),
    block(F::Astc4x4UnormSrgb, 16, K::UnormSrgb),
];

impl PixelFormat {
    /// Every format, in declaration order.
    pub const ALL: [PixelFormat; 77] = [
        F::R8Unorm,
        F::R8Snorm,
        F::R8Uint,
        F::R8Sint,
        F::R16Unorm,
        F::R16Snorm,
        F::R16Uint,
        F::R16Sint,
        F::R16Float,
        F::Rg8Unorm,
        F::Rg8Snorm,
        F::Rg8Uint,
        F::Rg8Sint,
        F::Bgra4Unorm,
        F::B5g6r5Unorm,
        F::Bgr5a1Unorm,
        F::R32Uint,
        F::R32Sint,
        F::R32Float,
        F::Rg16Unorm,
        F::Rg16Snorm,
        F::Rg16Uint,
        F::Rg16Sint,
        F::Rg16Float,
        F::Rgba8Unorm,
        F::Rgba8UnormSrgb,
        F::Rgba8Snorm,
        F::Rgba8Uint,
        F::Rgba8Sint,
        F::Bgra8Unorm,
        F::Bgra8UnormSrgb,
        F::Rgb9e5Ufloat,
        F::Rgb10a2Unorm,
        F::Rgb10a2Uint,
        F::Rg11b10Float,
        F::Rg32Uint,
        F::Rg32Sint,
        F::Rg32Float,
        F::Rgba16Unorm,
        F::Rgba16Snorm,
        F::Rgba16Uint,
        F::Rgba16Sint,
        F::Rgba16Float,
        F::Rgba32Uint,
        F::Rgba32Sint,
        F::Rgba32Float,
        F::Stencil8,
        F::Depth16Unorm,
        F::Depth24UnormStencil8,
        F::Depth32Float,
        F::Depth32FloatStencil8,
        F::Bc1RgbaUnorm,
        F::Bc1RgbaUnormSrgb,
        F::Bc2RgbaUnorm,
        F::Bc2RgbaUnormSrgb,
        F::Bc3RgbaUnorm,
        F::Bc3RgbaUnormSrgb,
        F::Bc4RUnorm,
        F::Bc4RSnorm,
        F::Bc5RgUnorm,
        F::Bc5RgSnorm,
        F::Bc6hRgbUfloat,
        F::Bc6hRgbFloat,
        F::Bc7RgbaUnorm,
        F::Bc7RgbaUnormSrgb,
        F::Etc2Rgb8Unorm,
        F::Etc2Rgb8UnormSrgb,
        F::Etc2Rgb8A1Unorm,
        F::Etc2Rgb8A1UnormSrgb,
        F::Etc2Rgba8Unorm,
        F::Etc2Rgba8UnormSrgb,
        F::EacR11Unorm,
        F::EacR11Snorm,
        F::EacRg11Unorm,
        F::EacRg11Snorm,
        F::Astc4x4Unorm,
        F::Astc4x4UnormSrgb,
    ];

    pub fn info(self) -> FormatInfo {
        format_info(self)
    }

    /// Device features needed to create textures of this format.
    pub fn required_features(self) -> Features {
        if is_bc_compressed_format(self) {
            Features::TEXTURE_COMPRESSION_BC
        } else if is_etc_compressed_format(self) {
            Features::TEXTURE_COMPRESSION_ETC2
        } else if is_astc_compressed_format(self) {
            Features::TEXTURE_COMPRESSION_ASTC
        } else if self == F::Depth32FloatStencil8 {
            Features::DEPTH32FLOAT_STENCIL8
        } else {
            Features::empty()
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

//=============================================================================
// Queries
//=============================================================================

pub fn format_info(format: PixelFormat) -> FormatInfo {
    let info = FORMAT_INFOS[format as usize];
    debug_assert_eq!(info.format, format);
    info
}

/// Average number of bits per texel, rounded down for block formats.
pub fn bits_per_pixel(format: PixelFormat) -> u32 {
    let info = format_info(format);
    info.bytes_per_block * 8 / (info.block_width * info.block_height)
}

pub fn is_compressed_format(format: PixelFormat) -> bool {
    format_info(format).block_width > 1
}

pub fn is_bc_compressed_format(format: PixelFormat) -> bool {
    (F::Bc1RgbaUnorm..=F::Bc7RgbaUnormSrgb).contains(&format)
}

pub fn is_etc_compressed_format(format: PixelFormat) -> bool {
    (F::Etc2Rgb8Unorm..=F::EacRg11Snorm).contains(&format)
}

pub fn is_astc_compressed_format(format: PixelFormat) -> bool {
    matches!(format, F::Astc4x4Unorm | F::Astc4x4UnormSrgb)
}

/// Formats with a depth aspect.
pub fn is_depth_format(format: PixelFormat) -> bool {
    matches!(
        format,
        F::Depth16Unorm | F::Depth24UnormStencil8 | F::Depth32Float | F::Depth32FloatStencil8
    )
}

/// Formats with a stencil aspect.
pub fn is_stencil_format(format: PixelFormat) -> bool {
    matches!(
        format,
        F::Stencil8 | F::Depth24UnormStencil8 | F::Depth32FloatStencil8
    )
}

/// Formats with a depth aspect, a stencil aspect, or both.
pub fn is_depth_stencil_format(format: PixelFormat) -> bool {
    is_depth_format(format) || is_stencil_format(format)
}

pub fn is_depth_only_format(format: PixelFormat) -> bool {
    matches!(format, F::Depth16Unorm | F::Depth32Float)
}

pub fn is_srgb_format(format: PixelFormat) -> bool {
    format_info(format).kind == FormatKind::UnormSrgb
}

pub fn is_integer_format(format: PixelFormat) -> bool {
    !is_depth_stencil_format(format)
        && matches!(format_info(format).kind, FormatKind::Uint | FormatKind::Sint)
}

pub fn is_signed_format(format: PixelFormat) -> bool {
    matches!(
        format_info(format).kind,
        FormatKind::Snorm | FormatKind::Sint | FormatKind::Float
    ) && format != F::Rgb9e5Ufloat
        && format != F::Rg11b10Float
        && format != F::Bc6hRgbUfloat
}

/// Formats that can be bound as a color attachment.
pub fn is_color_renderable_format(format: PixelFormat) -> bool {
    !is_compressed_format(format)
        && !is_depth_stencil_format(format)
        && !matches!(format, F::Rgb9e5Ufloat | F::R16Snorm | F::Rg16Snorm | F::Rgba16Snorm)
}

//=============================================================================
// sRGB pairing
//=============================================================================

/// Returns the linear counterpart of an sRGB format, or the format itself.
pub fn srgb_to_linear(format: PixelFormat) -> PixelFormat {
    match format {
        F::Rgba8UnormSrgb => F::Rgba8Unorm,
        F::Bgra8UnormSrgb => F::Bgra8Unorm,
        F::Bc1RgbaUnormSrgb => F::Bc1RgbaUnorm,
        F::Bc2RgbaUnormSrgb => F::Bc2RgbaUnorm,
        F::Bc3RgbaUnormSrgb => F::Bc3RgbaUnorm,
        F::Bc7RgbaUnormSrgb => F::Bc7RgbaUnorm,
        F::Etc2Rgb8UnormSrgb => F::Etc2Rgb8Unorm,
        F::Etc2Rgb8A1UnormSrgb => F::Etc2Rgb8A1Unorm,
        F::Etc2Rgba8UnormSrgb => F::Etc2Rgba8Unorm,
        F::Astc4x4UnormSrgb => F::Astc4x4Unorm,
        other => other,
    }
}

/// Returns the sRGB counterpart of a linear format, or the format itself.
pub fn linear_to_srgb(format: PixelFormat) -> PixelFormat {
    match format {
        F::Rgba8Unorm => F::Rgba8UnormSrgb,
        F::Bgra8Unorm => F::Bgra8UnormSrgb,
        F::Bc1RgbaUnorm => F::Bc1RgbaUnormSrgb,
        F::Bc2RgbaUnorm => F::Bc2RgbaUnormSrgb,
        F::Bc3RgbaUnorm => F::Bc3RgbaUnormSrgb,
        F::Bc7RgbaUnorm => F::Bc7RgbaUnormSrgb,
        F::Etc2Rgb8Unorm => F::Etc2Rgb8UnormSrgb,
        F::Etc2Rgb8A1Unorm => F::Etc2Rgb8A1UnormSrgb,
        F::Etc2Rgba8Unorm => F::Etc2Rgba8UnormSrgb,
        F::Astc4x4Unorm => F::Astc4x4UnormSrgb,
        other => other,
    }
}

//=============================================================================
// Surface layout
//=============================================================================

/// Computes the row and slice pitch of one mip slice.
///
/// Block-compressed formats round each dimension up to whole 4x4 blocks and
/// never report fewer than one block.
pub fn surface_info(format: PixelFormat, width: u32, height: u32) -> SurfaceInfo {
    let info = format_info(format);
    let (width_count, height_count) = if info.block_width > 1 {
        (
            width.div_ceil(info.block_width).max(1),
            height.div_ceil(info.block_height).max(1),
        )
    } else {
        (width, height)
    };
    let row_pitch = width_count as u64 * info.bytes_per_block as u64;
    SurfaceInfo {
        row_pitch,
        slice_pitch: row_pitch * height_count as u64,
        width_count,
        height_count,
    }
}

pub fn texture_memory_size(desc: &crate::TextureDesc) -> u64 {
    desc.memory_size()
}

//=============================================================================
// Native format mapping
//=============================================================================

/// DXGI_FORMAT value used by the D3D11 and D3D12 backends, 0 when unavailable.
pub fn dxgi_format(format: PixelFormat) -> u32 {
    match format {
        F::R8Unorm => 61,
        F::R8Snorm => 63,
        F::R8Uint => 62,
        F::R8Sint => 64,
        F::R16Unorm => 56,
        F::R16Snorm => 58,
        F::R16Uint => 57,
        F::R16Sint => 59,
        F::R16Float => 54,
        F::Rg8Unorm => 49,
        F::Rg8Snorm => 51,
        F::Rg8Uint => 50,
        F::Rg8Sint => 52,
        F::Bgra4Unorm => 115,
        F::B5g6r5Unorm => 85,
        F::Bgr5a1Unorm => 86,
        F::R32Uint => 42,
        F::R32Sint => 43,
        F::R32Float => 41,
        F::Rg16Unorm => 35,
        F::Rg16Snorm => 37,
        F::Rg16Uint => 36,
        F::Rg16Sint => 38,
        F::Rg16Float => 34,
        F::Rgba8Unorm => 28,
        F::Rgba8UnormSrgb => 29,
        F::Rgba8Snorm => 31,
        F::Rgba8Uint => 30,
        F::Rgba8Sint => 32,
        F::Bgra8Unorm => 87,
        F::Bgra8UnormSrgb => 91,
        F::Rgb9e5Ufloat => 67,
        F::Rgb10a2Unorm => 24,
        F::Rgb10a2Uint => 25,
        F::Rg11b10Float => 26,
        F::Rg32Uint => 17,
        F::Rg32Sint => 18,
        F::Rg32Float => 16,
        F::Rgba16Unorm => 11,
        F::Rgba16Snorm => 13,
        F::Rgba16Uint => 12,
        F::Rgba16Sint => 14,
        F::Rgba16Float => 10,
        F::Rgba32Uint => 3,
        F::Rgba32Sint => 4,
        F::Rgba32Float => 2,
        // DXGI has no stencil-only format
        F::Stencil8 => 45,
        F::Depth16Unorm => 55,
        F::Depth24UnormStencil8 => 45,
        F::Depth32Float => 40,
        F::Depth32FloatStencil8 => 20,
        F::Bc1RgbaUnorm => 71,
        F::Bc1RgbaUnormSrgb => 72,
        F::Bc2RgbaUnorm => 74,
        F::Bc2RgbaUnormSrgb => 75,
        F::Bc3RgbaUnorm => 77,
        F::Bc3RgbaUnormSrgb => 78,
        F::Bc4RUnorm => 80,
        F::Bc4RSnorm => 81,
        F::Bc5RgUnorm => 83,
        F::Bc5RgSnorm => 84,
        F::Bc6hRgbUfloat => 95,
        F::Bc6hRgbFloat => 96,
        F::Bc7RgbaUnorm => 98,
        F::Bc7RgbaUnormSrgb => 99,
        F::Etc2Rgb8Unorm
        | F::Etc2Rgb8UnormSrgb
        | F::Etc2Rgb8A1Unorm
        | F::Etc2Rgb8A1UnormSrgb
        | F::Etc2Rgba8Unorm
        | F::Etc2Rgba8UnormSrgb
        | F::EacR11Unorm
        | F::EacR11Snorm
        | F::EacRg11Unorm
        | F::EacRg11Snorm
        | F::Astc4x4Unorm
        | F::Astc4x4UnormSrgb => 0,
    }
}

/// DXGI format for the storage of a depth texture that is also sampled.
///
/// Depth formats map to their typeless family so that both a depth-stencil
/// view and a shader resource view can be created on the same memory.
pub fn dxgi_typeless_depth_format(format: PixelFormat) -> u32 {
    match format {
        F::Depth16Unorm => 53,
        F::Depth32Float => 39,
        F::Depth24UnormStencil8 | F::Stencil8 => 44,
        F::Depth32FloatStencil8 => 19,
        other => dxgi_format(other),
    }
}

/// VkFormat value used by the Vulkan backend, 0 when unavailable.
pub fn vk_format(format: PixelFormat) -> u32 {
    match format {
        F::R8Unorm => 9,
        F::R8Snorm => 10,
        F::R8Uint => 13,
        F::R8Sint => 14,
        F::R16Unorm => 70,
        F::R16Snorm => 71,
        F::R16Uint => 74,
        F::R16Sint => 75,
        F::R16Float => 76,
        F::Rg8Unorm => 16,
        F::Rg8Snorm => 17,
        F::Rg8Uint => 20,
        F::Rg8Sint => 21,
        F::Bgra4Unorm => 3,
        F::B5g6r5Unorm => 5,
        F::Bgr5a1Unorm => 8,
        F::R32Uint => 98,
        F::R32Sint => 99,
        F::R32Float => 100,
        F::Rg16Unorm => 77,
        F::Rg16Snorm => 78,
        F::Rg16Uint => 81,
        F::Rg16Sint => 82,
        F::Rg16Float => 83,
        F::Rgba8Unorm => 37,
        F::Rgba8UnormSrgb => 43,
        F::Rgba8Snorm => 38,
        F::Rgba8Uint => 41,
        F::Rgba8Sint => 42,
        F::Bgra8Unorm => 44,
        F::Bgra8UnormSrgb => 50,
        F::Rgb9e5Ufloat => 123,
        F::Rgb10a2Unorm => 64,
        F::Rgb10a2Uint => 68,
        F::Rg11b10Float => 122,
        F::Rg32Uint => 101,
        F::Rg32Sint => 102,
        F::Rg32Float => 103,
        F::Rgba16Unorm => 91,
        F::Rgba16Snorm => 92,
        F::Rgba16Uint => 95,
        F::Rgba16Sint => 96,
        F::Rgba16Float => 97,
        F::Rgba32Uint => 107,
        F::Rgba32Sint => 108,
        F::Rgba32Float => 109,
        F::Stencil8 => 127,
        F::Depth16Unorm => 124,
        F::Depth24UnormStencil8 => 129,
        F::Depth32Float => 126,
        F::Depth32FloatStencil8 => 130,
        F::Bc1RgbaUnorm => 133,
        F::Bc1RgbaUnormSrgb => 134,
        F::Bc2RgbaUnorm => 135,
        F::Bc2RgbaUnormSrgb => 136,
        F::Bc3RgbaUnorm => 137,
        F::Bc3RgbaUnormSrgb => 138,
        F::Bc4RUnorm => 139,
        F::Bc4RSnorm => 140,
        F::Bc5RgUnorm => 141,
        F::Bc5RgSnorm => 142,
        F::Bc6hRgbUfloat => 143,
        F::Bc6hRgbFloat => 144,
        F::Bc7RgbaUnorm => 145,
        F::Bc7RgbaUnormSrgb => 146,
        F::Etc2Rgb8Unorm => 147,
        F::Etc2Rgb8UnormSrgb => 148,
        F::Etc2Rgb8A1Unorm => 149,
        F::Etc2Rgb8A1UnormSrgb => 150,
        F::Etc2Rgba8Unorm => 151,
        F::Etc2Rgba8UnormSrgb => 152,
        F::EacR11Unorm => 153,
        F::EacR11Snorm => 154,
        F::EacRg11Unorm => 155,
        F::EacRg11Snorm => 156,
        F::Astc4x4Unorm => 157,
        F::Astc4x4UnormSrgb => 158,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_indexed_by_discriminant() {
        for (index, &format) in PixelFormat::ALL.iter().enumerate() {
            assert_eq!(format as usize, index);
            assert_eq!(FORMAT_INFOS[index].format, format);
        }
    }

    #[test]
    fn srgb_pairs_round_trip() {
        for &format in PixelFormat::ALL.iter() {
            assert_eq!(srgb_to_linear(linear_to_srgb(format)), srgb_to_linear(format));
            assert_eq!(linear_to_srgb(srgb_to_linear(format)), linear_to_srgb(format));
            if is_srgb_format(format) {
                let linear = srgb_to_linear(format);
                assert_ne!(linear, format, "{format} has no linear pair");
                assert_eq!(linear_to_srgb(linear), format);
            }
        }
        assert_eq!(srgb_to_linear(F::R32Float), F::R32Float);
        assert_eq!(linear_to_srgb(F::Depth32Float), F::Depth32Float);
    }

    #[test]
    fn bits_per_pixel_matches_block_layout() {
        for &format in PixelFormat::ALL.iter() {
            let info = format_info(format);
            assert_eq!(
                bits_per_pixel(format),
                info.bytes_per_block * 8 / (info.block_width * info.block_height)
            );
        }
        assert_eq!(bits_per_pixel(F::Rgba8Unorm), 32);
        assert_eq!(bits_per_pixel(F::Bc1RgbaUnorm), 4);
        assert_eq!(bits_per_pixel(F::Bc7RgbaUnorm), 8);
        assert_eq!(bits_per_pixel(F::Rgba32Float), 128);
    }

    #[test]
    fn surface_info_linear() {
        let info = surface_info(F::Rgba8Unorm, 1024, 512);
        assert_eq!(
            info,
            SurfaceInfo {
                row_pitch: 4096,
                slice_pitch: 2_097_152,
                width_count: 1024,
                height_count: 512,
            }
        );
    }

    #[test]
    fn surface_info_block_compressed() {
        let info = surface_info(F::Bc1RgbaUnorm, 1024, 512);
        assert_eq!(
            info,
            SurfaceInfo {
                row_pitch: 2048,
                slice_pitch: 262_144,
                width_count: 256,
                height_count: 128,
            }
        );
        // partial and tiny blocks round up
        let tiny = surface_info(F::Bc3RgbaUnorm, 1, 1);
        assert_eq!((tiny.width_count, tiny.height_count), (1, 1));
        assert_eq!(tiny.slice_pitch, 16);
        let odd = surface_info(F::Bc7RgbaUnorm, 5, 9);
        assert_eq!((odd.width_count, odd.height_count), (2, 3));
    }

    #[test]
    fn depth_stencil_categories() {
        assert!(is_depth_format(F::Depth32Float));
        assert!(!is_stencil_format(F::Depth32Float));
        assert!(is_depth_only_format(F::Depth16Unorm));
        assert!(!is_depth_only_format(F::Depth24UnormStencil8));
        assert!(is_stencil_format(F::Stencil8));
        assert!(!is_depth_format(F::Stencil8));
        assert!(is_depth_stencil_format(F::Stencil8));
        assert!(is_depth_stencil_format(F::Depth32FloatStencil8));
        assert!(!is_depth_stencil_format(F::R32Float));
        // unsigned integer formats are never depth
        assert!(!is_depth_format(F::R16Uint));
    }

    #[test]
    fn integer_kinds_follow_the_name() {
        assert_eq!(format_info(F::Rgba8Sint).kind, FormatKind::Sint);
        assert_eq!(format_info(F::Rgba8Uint).kind, FormatKind::Uint);
        assert!(is_integer_format(F::Rg32Uint));
        assert!(!is_integer_format(F::Stencil8));
        assert!(is_signed_format(F::R16Float));
        assert!(!is_signed_format(F::Rg11b10Float));
    }

    #[test]
    fn typeless_depth_mapping() {
        assert_eq!(dxgi_typeless_depth_format(F::Depth16Unorm), 53);
        assert_eq!(dxgi_typeless_depth_format(F::Depth32Float), 39);
        assert_eq!(dxgi_typeless_depth_format(F::Depth24UnormStencil8), 44);
        assert_eq!(dxgi_typeless_depth_format(F::Depth32FloatStencil8), 19);
        assert_eq!(dxgi_typeless_depth_format(F::Rgba8Unorm), dxgi_format(F::Rgba8Unorm));
    }

    #[test]
    fn native_formats_cover_uncompressed() {
        for &format in PixelFormat::ALL.iter() {
            assert_ne!(vk_format(format), 0, "{format}");
            if !is_etc_compressed_format(format) && !is_astc_compressed_format(format) {
                assert_ne!(dxgi_format(format), 0, "{format}");
            }
        }
    }

    #[test]
    fn compression_requires_features() {
        assert_eq!(
            F::Bc5RgUnorm.required_features(),
            Features::TEXTURE_COMPRESSION_BC
        );
        assert_eq!(
            F::EacR11Snorm.required_features(),
            Features::TEXTURE_COMPRESSION_ETC2
        );
        assert_eq!(
            F::Astc4x4UnormSrgb.required_features(),
            Features::TEXTURE_COMPRESSION_ASTC
        );
        assert!(F::Rgba8Unorm.required_features().is_empty());
    }
}
