//! wgpu-hosted backend for keel-graphics
//!
//! Drives D3D12, Vulkan or Metal through wgpu. Objects live in a slotmap hub
//! keyed by the crate handles, and recorded commands are replayed into a
//! wgpu command encoder at submit time.

mod command;
mod pipeline;
mod platform;
mod resource;
mod surface;

use crate::{
    BindGroupKey, BindGroupLayoutKey, BufferKey, ComputePipelineKey, DeviceCaps, Memory,
    ObjectKind, PipelineLayoutKey, QueueType, RenderPipelineKey, SamplerKey, ShaderModuleKey,
    SurfaceKey, TextureKey,
};
use slotmap::SlotMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

pub use platform::{PlatformError, WgpuProvider};

//=============================================================================
// Internal Storage Entry Types
//=============================================================================

struct BufferEntry {
    gpu: wgpu::Buffer,
    memory: Memory,
    /// CPU copy of `Upload` buffers, padded to the copy alignment.
    shadow: Option<Box<[u8]>>,
}

struct TextureEntry {
    /// `None` for swap chain images, which are fetched from the surface.
    gpu: Option<wgpu::Texture>,
    view: Option<wgpu::TextureView>,
    format: crate::PixelFormat,
    owner: Option<SurfaceKey>,
}

struct ShaderModuleEntry {
    raw: wgpu::ShaderModule,
    entry_point: String,
}

struct BindGroupLayoutEntry {
    raw: wgpu::BindGroupLayout,
    entries: Vec<crate::BindGroupLayoutEntry>,
}

struct SurfaceEntry {
    raw: wgpu::Surface<'static>,
    config: Option<wgpu::SurfaceConfiguration>,
    textures: Vec<TextureKey>,
    next_index: u32,
    current: Option<(u32, wgpu::SurfaceTexture)>,
}

//=============================================================================
// The Hub: Central Resource Storage (RwLock for Concurrency)
//=============================================================================

struct Hub {
    buffers: SlotMap<BufferKey, BufferEntry>,
    textures: SlotMap<TextureKey, TextureEntry>,
    samplers: SlotMap<SamplerKey, wgpu::Sampler>,
    shader_modules: SlotMap<ShaderModuleKey, ShaderModuleEntry>,
    bind_group_layouts: SlotMap<BindGroupLayoutKey, BindGroupLayoutEntry>,
    bind_groups: SlotMap<BindGroupKey, wgpu::BindGroup>,
    pipeline_layouts: SlotMap<PipelineLayoutKey, wgpu::PipelineLayout>,
    render_pipelines: SlotMap<RenderPipelineKey, wgpu::RenderPipeline>,
    compute_pipelines: SlotMap<ComputePipelineKey, wgpu::ComputePipeline>,
    surfaces: SlotMap<SurfaceKey, SurfaceEntry>,
}

impl Hub {
    fn new() -> Self {
        Self {
            buffers: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            samplers: SlotMap::with_key(),
            shader_modules: SlotMap::with_key(),
            bind_group_layouts: SlotMap::with_key(),
            bind_groups: SlotMap::with_key(),
            pipeline_layouts: SlotMap::with_key(),
            render_pipelines: SlotMap::with_key(),
            compute_pipelines: SlotMap::with_key(),
            surfaces: SlotMap::with_key(),
        }
    }
}

//=============================================================================
// Context
//=============================================================================

pub struct Context {
    backend: crate::Backend,
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    hub: RwLock<Hub>,
    caps: DeviceCaps,
    /// Completed fence value per queue type; all of them share `queue`.
    completed: [Arc<AtomicU64>; 3],
    signaled: [AtomicU64; 3],
}

impl Context {
    pub fn capabilities(&self) -> DeviceCaps {
        self.caps.clone()
    }

    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    fn error(&self, message: impl Into<String>) -> crate::GraphicsError {
        crate::GraphicsError::native(self.backend, -1, message)
    }

    fn stale(&self, what: &str) -> crate::GraphicsError {
        self.error(format!("stale {what} handle"))
    }

    fn completed(&self, queue: QueueType) -> u64 {
        self.completed[queue as usize].load(Ordering::Acquire)
    }
}

//=============================================================================
// LifetimeDevice Implementation
//=============================================================================

#[hidden_trait::expose]
impl crate::traits::LifetimeDevice for Context {
    fn live_objects(&self, kind: ObjectKind) -> usize {
        let hub = self.hub.read().unwrap();
        match kind {
            ObjectKind::Queue => self
                .completed
                .iter()
                .zip(self.signaled.iter())
                .filter(|(completed, signaled)| {
                    completed.load(Ordering::Acquire) < signaled.load(Ordering::Acquire)
                })
                .count(),
            ObjectKind::RenderPipeline => hub.render_pipelines.len(),
            ObjectKind::ComputePipeline => hub.compute_pipelines.len(),
            ObjectKind::BindGroup => hub.bind_groups.len(),
            ObjectKind::PipelineLayout => hub.pipeline_layouts.len(),
            ObjectKind::BindGroupLayout => hub.bind_group_layouts.len(),
            ObjectKind::ShaderModule => hub.shader_modules.len(),
            ObjectKind::Sampler => hub.samplers.len(),
            ObjectKind::Texture => hub
                .textures
                .values()
                .filter(|entry| entry.owner.is_none())
                .count(),
            ObjectKind::Buffer => hub.buffers.len(),
            ObjectKind::SwapChain => hub.surfaces.len(),
        }
    }

    fn release_all(&self, kind: ObjectKind) {
        let mut hub = self.hub.write().unwrap();
        match kind {
            ObjectKind::Queue => {
                if let Err(e) = self.device.poll(wgpu::PollType::wait_indefinitely()) {
                    log::error!("Draining {} queue: {}", self.backend, e);
                }
            }
            ObjectKind::RenderPipeline => hub.render_pipelines.clear(),
            ObjectKind::ComputePipeline => hub.compute_pipelines.clear(),
            ObjectKind::BindGroup => hub.bind_groups.clear(),
            ObjectKind::PipelineLayout => hub.pipeline_layouts.clear(),
            ObjectKind::BindGroupLayout => hub.bind_group_layouts.clear(),
            ObjectKind::ShaderModule => hub.shader_modules.clear(),
            ObjectKind::Sampler => hub.samplers.clear(),
            ObjectKind::Texture => {
                hub.textures.retain(|_, entry| entry.owner.is_some());
            }
            ObjectKind::Buffer => {
                for (_, entry) in hub.buffers.drain() {
                    entry.gpu.destroy();
                }
            }
            ObjectKind::SwapChain => {
                hub.surfaces.clear();
                hub.textures.clear();
            }
        }
    }
}
