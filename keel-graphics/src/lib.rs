//! GPU device abstraction layer.
//!
//! One object model (adapters, devices, swap chains, resources, pipelines,
//! bind groups and command recording) over several native graphics APIs.
//! The `Null` backend is always available and simulates a GPU timeline on
//! the CPU; the `wgpu` feature adds hosted D3D12, Vulkan and Metal backends.

#![allow(clippy::new_without_default)]

pub mod adapter;
mod backend;
pub mod binding;
mod cache;
mod caps;
pub mod command;
mod context;
mod device;
pub mod format;
mod instance;
pub mod null;
mod queue;
pub mod resource;
pub mod surface;
pub mod traits;
#[cfg(feature = "wgpu")]
pub mod webgpu;

pub use adapter::{AdapterKind, GpuVendor, GraphicsAdapter};
pub use backend::BackendDevice;
pub use binding::*;
pub use cache::CacheStats;
pub use caps::{DeviceCaps, Features, Limits};
pub use command::{
    ColorAttachment, Command, DepthStencilAttachment, IndexFormat, LoadAction, RenderPassDesc,
    ScissorRect, StoreAction, Viewport,
};
pub use context::{DebugGroupScope, RenderContext, RenderPassScope};
pub use device::{DeviceDesc, GraphicsDevice, ObjectKind};
pub use format::{FormatInfo, FormatKind, PixelFormat, SurfaceInfo};
pub use instance::{platform_backend_priority, BackendProvider, GraphicsInstance, InstanceDesc};
pub use queue::{Queue, QueueType};
pub use resource::*;
pub use surface::{
    PresentFlags, PresentMode, SurfaceHandle, SurfaceKind, SurfaceSource, SwapChain,
    SwapChainDesc, WindowSurface,
};

use slotmap::new_key_type;

//=============================================================================
// Handle Keys
//=============================================================================

new_key_type! {
    pub struct BufferKey;
    pub struct TextureKey;
    pub struct SamplerKey;
    pub struct ShaderModuleKey;
    pub struct BindGroupLayoutKey;
    pub struct BindGroupKey;
    pub struct PipelineLayoutKey;
    pub struct RenderPipelineKey;
    pub struct ComputePipelineKey;
    pub struct SurfaceKey;
}

//=============================================================================
// Common Enums
//=============================================================================

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Backend {
    D3D11,
    D3D12,
    Vulkan,
    Metal,
    Null,
}

/// Bytecode flavor a backend consumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderFormat {
    Dxbc,
    Dxil,
    Spirv,
    MetalLib,
    /// Accepts any non-empty blob.
    Opaque,
}

impl Backend {
    pub fn name(self) -> &'static str {
        match self {
            Self::D3D11 => "D3D11",
            Self::D3D12 => "D3D12",
            Self::Vulkan => "Vulkan",
            Self::Metal => "Metal",
            Self::Null => "Null",
        }
    }

    /// D3D-style backends store sampled depth textures in a typeless format.
    pub fn is_d3d(self) -> bool {
        matches!(self, Self::D3D11 | Self::D3D12)
    }

    pub fn native_shader_format(self) -> ShaderFormat {
        match self {
            Self::D3D11 => ShaderFormat::Dxbc,
            Self::D3D12 => ShaderFormat::Dxil,
            Self::Vulkan => ShaderFormat::Spirv,
            Self::Metal => ShaderFormat::MetalLib,
            Self::Null => ShaderFormat::Opaque,
        }
    }

    pub fn supports_surface(self, kind: SurfaceKind) -> bool {
        use SurfaceKind as Sk;
        match self {
            Self::D3D11 | Self::D3D12 => matches!(kind, Sk::Win32 | Sk::CoreWindow),
            Self::Vulkan => matches!(
                kind,
                Sk::Win32 | Sk::Xlib | Sk::Wayland | Sk::Android | Sk::MetalLayer
            ),
            Self::Metal => kind == Sk::MetalLayer,
            Self::Null => true,
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
pub enum ValidationMode {
    #[default]
    Disabled,
    Enabled,
    /// Validation layer plus GPU-assisted validation.
    Gpu,
}

#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
pub enum PowerPreference {
    #[default]
    HighPerformance,
    LowPower,
}

/// What happens when the caller violates the API contract.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum UsageErrorPolicy {
    /// Panic at the call site.
    Assert,
    /// Log and return [`GraphicsError::Config`].
    Report,
}

impl Default for UsageErrorPolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Assert
        } else {
            Self::Report
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
    pub depth_or_array_layers: u32,
}

impl Extent {
    pub const fn new(width: u32, height: u32, depth_or_array_layers: u32) -> Self {
        Self {
            width,
            height,
            depth_or_array_layers,
        }
    }

    pub const fn new_2d(width: u32, height: u32) -> Self {
        Self::new(width, height, 1)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.depth_or_array_layers == 0
    }

    /// Size of the given mip level, never below one texel.
    pub fn at_mip_level(&self, level: u32, is_3d: bool) -> Self {
        Self {
            width: (self.width >> level).max(1),
            height: (self.height >> level).max(1),
            depth_or_array_layers: if is_3d {
                (self.depth_or_array_layers >> level).max(1)
            } else {
                self.depth_or_array_layers
            },
        }
    }
}

impl std::fmt::Display for Extent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{}x{}",
            self.width, self.height, self.depth_or_array_layers
        )
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Color {
    pub const TRANSPARENT: Self = Self::new(0.0, 0.0, 0.0, 0.0);
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);

    pub const fn new(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { r, g, b, a }
    }
}

//=============================================================================
// Errors
//=============================================================================

/// The machine or backend lacks something the caller asked for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NotSupportedError {
    Backend(Backend),
    NoAdapter(Backend),
    Features(Features),
    Format(PixelFormat),
    SurfaceFormat(PixelFormat),
    WindowHandle,
    PlatformNotSupported,
}

impl std::fmt::Display for NotSupportedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Backend(backend) => write!(f, "{backend} is not supported"),
            Self::NoAdapter(backend) => write!(f, "no {backend} adapter found"),
            Self::Features(features) => write!(f, "device features {features:?} are missing"),
            Self::Format(format) => write!(f, "format {format} has no native equivalent"),
            Self::SurfaceFormat(format) => {
                write!(f, "surface does not support format {format}")
            }
            Self::WindowHandle => f.write_str("window handle kind is not supported"),
            Self::PlatformNotSupported => f.write_str("platform is not supported"),
        }
    }
}

impl std::error::Error for NotSupportedError {}

/// A descriptor or call sequence violates the API contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    ZeroExtent(Extent),
    BufferTooSmall(u64),
    ExceedsLimit {
        what: &'static str,
        value: u64,
        limit: u64,
    },
    MipLevelCount {
        requested: u32,
        max: u32,
    },
    SampleCount(&'static str),
    FormatUsage {
        format: PixelFormat,
        reason: &'static str,
    },
    Anisotropy(u16),
    InitialData {
        expected: u64,
        provided: u64,
    },
    Memory {
        what: &'static str,
        expected: Memory,
    },
    Shader(&'static str),
    Pipeline(&'static str),
    BindGroup(&'static str),
    SurfaceKind {
        backend: Backend,
        kind: SurfaceKind,
    },
    Attachments(&'static str),
    MissingUsage {
        what: &'static str,
        usage: &'static str,
    },
    Misaligned {
        what: &'static str,
        value: u64,
        alignment: u64,
    },
    OutOfBounds {
        what: &'static str,
        end: u64,
        size: u64,
    },
    CopyOverlap,
    PassActive,
    NoActivePass,
    NoPipeline,
    NoIndexBuffer,
    DebugGroupUnderflow,
    WrongQueue {
        queue: QueueType,
        operation: &'static str,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::ZeroExtent(extent) => write!(f, "extent {extent} must be at least 1x1x1"),
            Self::BufferTooSmall(size) => write!(f, "buffer size {size} is below 4 bytes"),
            Self::ExceedsLimit { what, value, limit } => {
                write!(f, "{what} {value} exceeds the device limit {limit}")
            }
            Self::MipLevelCount { requested, max } => {
                write!(f, "{requested} mip levels requested, at most {max} possible")
            }
            Self::SampleCount(reason) => write!(f, "invalid sample count: {reason}"),
            Self::FormatUsage { format, reason } => write!(f, "format {format}: {reason}"),
            Self::Anisotropy(value) => write!(f, "anisotropy {value} is outside 1..=16"),
            Self::InitialData { expected, provided } => write!(
                f,
                "initial data holds {provided} bytes, {expected} required"
            ),
            Self::Memory { what, expected } => {
                write!(f, "{what} requires {expected:?} memory")
            }
            Self::Shader(reason) => write!(f, "invalid shader module: {reason}"),
            Self::Pipeline(reason) => write!(f, "invalid pipeline: {reason}"),
            Self::BindGroup(reason) => write!(f, "invalid bind group: {reason}"),
            Self::SurfaceKind { backend, kind } => {
                write!(f, "{backend} cannot present to a {kind:?} surface")
            }
            Self::Attachments(reason) => write!(f, "invalid render pass attachments: {reason}"),
            Self::MissingUsage { what, usage } => write!(f, "{what} lacks {usage} usage"),
            Self::Misaligned {
                what,
                value,
                alignment,
            } => write!(f, "{what} {value} is not a multiple of {alignment}"),
            Self::OutOfBounds { what, end, size } => {
                write!(f, "{what} range ends at {end}, past the size {size}")
            }
            Self::CopyOverlap => f.write_str("copy source and destination ranges overlap"),
            Self::PassActive => f.write_str("a render pass is already active"),
            Self::NoActivePass => f.write_str("no render pass is active"),
            Self::NoPipeline => f.write_str("no pipeline is bound"),
            Self::NoIndexBuffer => f.write_str("no index buffer is bound"),
            Self::DebugGroupUnderflow => f.write_str("no debug group to pop"),
            Self::WrongQueue { queue, operation } => {
                write!(f, "{operation} is not allowed on the {queue:?} queue")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GraphicsError {
    Config(ConfigError),
    NotSupported(NotSupportedError),
    /// A native API call failed.
    Native {
        backend: Backend,
        code: i64,
        message: String,
    },
}

impl GraphicsError {
    pub fn native(backend: Backend, code: i64, message: impl Into<String>) -> Self {
        Self::Native {
            backend,
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(e) => write!(f, "configuration error: {e}"),
            Self::NotSupported(e) => write!(f, "not supported: {e}"),
            Self::Native {
                backend,
                code,
                message,
            } => write!(f, "{backend} error {code:#x}: {message}"),
        }
    }
}

impl std::error::Error for GraphicsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::NotSupported(e) => Some(e),
            Self::Native { .. } => None,
        }
    }
}

impl From<ConfigError> for GraphicsError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<NotSupportedError> for GraphicsError {
    fn from(e: NotSupportedError) -> Self {
        Self::NotSupported(e)
    }
}
