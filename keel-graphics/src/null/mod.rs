//! Null backend for keel-graphics
//!
//! Keeps every object in CPU memory and simulates the GPU timeline, so the
//! whole device API can run headless. Buffer copies are executed at submit
//! time; everything else is recorded into [`Stats`].

mod command;
mod pipeline;
mod platform;
mod resource;
mod surface;

use crate::{
    BindGroupKey, BindGroupLayoutKey, BufferKey, ComputePipelineKey, DeviceCaps, ObjectKind,
    PipelineLayoutKey, QueueType, RenderPipelineKey, SamplerKey, ShaderModuleKey, SurfaceKey,
    TextureKey,
};
use slotmap::SlotMap;
use std::sync::{Arc, Condvar, Mutex, RwLock};

pub use platform::NullProvider;

//=============================================================================
// Internal Storage Entry Types
//=============================================================================

struct BufferEntry {
    data: Vec<u8>,
}

struct TextureEntry {
    /// First mip level of every layer, when initial data was provided.
    data: Option<Box<[u8]>>,
    /// Back-buffers belong to their surface.
    owner: Option<SurfaceKey>,
}

struct ShaderModuleEntry {
    stage: crate::ShaderStage,
}

struct BindGroupLayoutEntry {
    entries: Vec<crate::BindGroupLayoutEntry>,
}

struct PipelineLayoutEntry {
    bind_group_layouts: Vec<BindGroupLayoutKey>,
}

struct PipelineEntry {
    name: String,
}

struct SurfaceEntry {
    kind: crate::SurfaceKind,
    config: Option<crate::traits::SurfaceConfig>,
    textures: Vec<TextureKey>,
    next_index: u32,
    acquired: Option<u32>,
}

//=============================================================================
// The Hub: Central Object Storage
//=============================================================================

struct Hub {
    buffers: SlotMap<BufferKey, BufferEntry>,
    textures: SlotMap<TextureKey, TextureEntry>,
    samplers: SlotMap<SamplerKey, ()>,
    shader_modules: SlotMap<ShaderModuleKey, ShaderModuleEntry>,
    bind_group_layouts: SlotMap<BindGroupLayoutKey, BindGroupLayoutEntry>,
    bind_groups: SlotMap<BindGroupKey, BindGroupLayoutKey>,
    pipeline_layouts: SlotMap<PipelineLayoutKey, PipelineLayoutEntry>,
    render_pipelines: SlotMap<RenderPipelineKey, PipelineEntry>,
    compute_pipelines: SlotMap<ComputePipelineKey, PipelineEntry>,
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
// Statistics
//=============================================================================

/// What the simulated GPU has been asked to do.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub submissions: u64,
    pub commands: u64,
    pub passes_begun: u64,
    pub passes_ended: u64,
    pub draws: u64,
    pub dispatches: u64,
    pub copies: u64,
    pub presents: u64,
    pub destroyed_textures: Vec<TextureKey>,
    /// Object kinds in the order `release_all` was called.
    pub release_order: Vec<ObjectKind>,
}

/// Statistics shared with the caller, readable after the device is gone.
pub type SharedStats = Arc<Mutex<Stats>>;

//=============================================================================
// Timeline
//=============================================================================

struct TimelineState {
    signaled: u64,
    completed: u64,
    paused: bool,
}

/// Simulated queue fence. Signals complete immediately unless paused.
struct Timeline {
    state: Mutex<TimelineState>,
    condvar: Condvar,
}

impl Timeline {
    fn new(base: u64) -> Self {
        Self {
            state: Mutex::new(TimelineState {
                signaled: base,
                completed: base,
                paused: false,
            }),
            condvar: Condvar::new(),
        }
    }
}

//=============================================================================
// Context
//=============================================================================

#[derive(Clone, Debug, Default)]
pub struct ContextDesc {
    pub caps: DeviceCaps,
    /// Reuse statistics from a previous context, or start fresh.
    pub stats: Option<SharedStats>,
}

pub struct Context {
    caps: DeviceCaps,
    hub: RwLock<Hub>,
    timelines: [Timeline; 3],
    stats: SharedStats,
}

impl Context {
    pub fn new(desc: &ContextDesc) -> Self {
        Self {
            caps: desc.caps.clone(),
            hub: RwLock::new(Hub::new()),
            timelines: QueueType::ALL.map(|ty| Timeline::new(ty.fence_base())),
            stats: desc.stats.clone().unwrap_or_default(),
        }
    }

    pub fn capabilities(&self) -> DeviceCaps {
        self.caps.clone()
    }

    pub fn stats(&self) -> Stats {
        self.stats.lock().unwrap().clone()
    }

    pub fn shared_stats(&self) -> SharedStats {
        Arc::clone(&self.stats)
    }

    /// Stops completing fences on `queue` until [`Context::resume_queue`].
    pub fn pause_queue(&self, queue: QueueType) {
        self.timelines[queue as usize].state.lock().unwrap().paused = true;
    }

    /// Completes every fence signaled while paused and wakes waiters.
    pub fn resume_queue(&self, queue: QueueType) {
        let timeline = &self.timelines[queue as usize];
        let mut state = timeline.state.lock().unwrap();
        state.paused = false;
        state.completed = state.completed.max(state.signaled);
        timeline.condvar.notify_all();
    }

    /// Copy of a buffer's memory, `None` for a stale key.
    pub fn buffer_contents(&self, buffer: BufferKey) -> Option<Vec<u8>> {
        let hub = self.hub.read().unwrap();
        hub.buffers.get(buffer).map(|entry| entry.data.clone())
    }

    /// Initial data a texture was created with.
    pub fn texture_contents(&self, texture: TextureKey) -> Option<Vec<u8>> {
        let hub = self.hub.read().unwrap();
        hub.textures
            .get(texture)
            .and_then(|entry| entry.data.as_ref().map(|data| data.to_vec()))
    }

    pub fn is_texture_alive(&self, texture: TextureKey) -> bool {
        self.hub.read().unwrap().textures.contains_key(texture)
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
                .timelines
                .iter()
                .filter(|timeline| {
                    let state = timeline.state.lock().unwrap();
                    state.completed < state.signaled
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
                for timeline in self.timelines.iter() {
                    let mut state = timeline.state.lock().unwrap();
                    state.paused = false;
                    state.completed = state.signaled;
                    timeline.condvar.notify_all();
                }
            }
            ObjectKind::RenderPipeline => hub.render_pipelines.clear(),
            ObjectKind::ComputePipeline => hub.compute_pipelines.clear(),
            ObjectKind::BindGroup => hub.bind_groups.clear(),
            ObjectKind::PipelineLayout => hub.pipeline_layouts.clear(),
            ObjectKind::BindGroupLayout => hub.bind_group_layouts.clear(),
            ObjectKind::ShaderModule => hub.shader_modules.clear(),
            ObjectKind::Sampler => hub.samplers.clear(),
            ObjectKind::Texture => hub.textures.retain(|_, entry| entry.owner.is_some()),
            ObjectKind::Buffer => hub.buffers.clear(),
            ObjectKind::SwapChain => {
                hub.surfaces.clear();
                hub.textures.clear();
            }
        }
        self.stats.lock().unwrap().release_order.push(kind);
    }
}
