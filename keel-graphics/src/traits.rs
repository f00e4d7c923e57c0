//! Capability traits implemented by every backend context.
//!
//! Descriptors are validated by [`crate::GraphicsDevice`] before they reach a
//! backend, so implementations only report failures of the native API.

use crate::{
    BindGroupDesc, BindGroupKey, BindGroupLayoutDesc, BindGroupLayoutKey, BufferDesc, BufferKey,
    Command, ComputePipelineDesc, ComputePipelineKey, GraphicsError, NativeFormat, ObjectKind,
    PipelineLayoutDesc, PipelineLayoutKey, PresentMode, QueueType, RenderPipelineDesc,
    RenderPipelineKey, SamplerDesc, SamplerKey, ShaderModuleDesc, ShaderModuleKey, SurfaceHandle,
    SurfaceKey, TextureDesc, TextureKey,
};

pub trait ResourceDevice {
    fn create_buffer(&self, desc: &BufferDesc, contents: Option<&[u8]>) -> Result<BufferKey, GraphicsError>;
    fn destroy_buffer(&self, buffer: BufferKey);
    /// Writes into CPU-visible buffer memory.
    fn write_buffer(&self, buffer: BufferKey, offset: u64, data: &[u8]);
    /// Reads back buffer memory once prior GPU work has completed.
    fn read_buffer(&self, buffer: BufferKey, offset: u64, data: &mut [u8]);
    fn create_texture(
        &self,
        desc: &TextureDesc,
        native_format: NativeFormat,
        mip_level_count: u32,
        contents: Option<&[u8]>,
    ) -> Result<TextureKey, GraphicsError>;
    fn destroy_texture(&self, texture: TextureKey);
    fn create_sampler(&self, desc: &SamplerDesc) -> Result<SamplerKey, GraphicsError>;
    fn destroy_sampler(&self, sampler: SamplerKey);
}

pub trait ShaderDevice {
    fn create_shader_module(&self, desc: &ShaderModuleDesc) -> Result<ShaderModuleKey, GraphicsError>;
    fn destroy_shader_module(&self, module: ShaderModuleKey);
    fn create_bind_group_layout(
        &self,
        desc: &BindGroupLayoutDesc,
    ) -> Result<BindGroupLayoutKey, GraphicsError>;
    fn destroy_bind_group_layout(&self, layout: BindGroupLayoutKey);
    fn create_bind_group(&self, desc: &BindGroupDesc) -> Result<BindGroupKey, GraphicsError>;
    fn destroy_bind_group(&self, group: BindGroupKey);
    fn create_pipeline_layout(
        &self,
        desc: &PipelineLayoutDesc,
    ) -> Result<PipelineLayoutKey, GraphicsError>;
    fn destroy_pipeline_layout(&self, layout: PipelineLayoutKey);
    fn create_render_pipeline(
        &self,
        desc: &RenderPipelineDesc,
    ) -> Result<RenderPipelineKey, GraphicsError>;
    fn destroy_render_pipeline(&self, pipeline: RenderPipelineKey);
    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDesc,
    ) -> Result<ComputePipelineKey, GraphicsError>;
    fn destroy_compute_pipeline(&self, pipeline: ComputePipelineKey);
}

pub trait CommandDevice {
    fn submit(&self, queue: QueueType, commands: &[Command]) -> Result<(), GraphicsError>;
    /// Enqueues a GPU-side signal of `value` after all submitted work.
    fn signal(&self, queue: QueueType, value: u64);
    /// Latest fence value known to have completed.
    fn completed_value(&self, queue: QueueType) -> u64;
    /// Blocks until `value` has completed.
    ///
    /// Fails when `value` was never signaled or the device can no longer
    /// make progress.
    fn wait(&self, queue: QueueType, value: u64) -> Result<(), GraphicsError>;
}

/// Configuration of a presentable surface, computed by the swap chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceConfig {
    pub format: crate::PixelFormat,
    pub size: crate::Extent,
    pub present_mode: PresentMode,
    pub buffer_count: u32,
    pub allow_tearing: bool,
}

pub trait SurfaceDevice {
    fn create_surface(&self, handle: &SurfaceHandle) -> Result<SurfaceKey, GraphicsError>;
    /// Rebuilds the back-buffer ring, releasing the previous one.
    /// A zero-area size leaves the surface without buffers.
    fn configure_surface(
        &self,
        surface: SurfaceKey,
        config: &SurfaceConfig,
    ) -> Result<Vec<TextureKey>, GraphicsError>;
    /// Index of the next back-buffer, `None` while the surface has no buffers.
    fn acquire_surface_texture(&self, surface: SurfaceKey) -> Result<Option<u32>, GraphicsError>;
    fn present_surface(&self, surface: SurfaceKey) -> Result<(), GraphicsError>;
    fn destroy_surface(&self, surface: SurfaceKey);
}

/// Bookkeeping used by the device for teardown.
pub trait LifetimeDevice {
    fn live_objects(&self, kind: ObjectKind) -> usize;
    /// Releases every remaining object of the given kind.
    fn release_all(&self, kind: ObjectKind);
}
