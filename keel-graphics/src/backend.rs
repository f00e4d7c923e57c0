//! Closed set of backend contexts behind one dispatching enum.

use crate::traits::{
    CommandDevice, LifetimeDevice, ResourceDevice, ShaderDevice, SurfaceConfig, SurfaceDevice,
};
use crate::*;

/// Backend implementation owned by a [`GraphicsDevice`].
pub enum BackendDevice {
    Null(null::Context),
    #[cfg(feature = "wgpu")]
    Wgpu(webgpu::Context),
}

macro_rules! dispatch {
    ($self:ident, $ctx:ident => $body:expr) => {
        match $self {
            BackendDevice::Null($ctx) => $body,
            #[cfg(feature = "wgpu")]
            BackendDevice::Wgpu($ctx) => $body,
        }
    };
}

impl BackendDevice {
    /// Bytecode flavor accepted by `create_shader_module`.
    pub fn shader_format(&self, backend: Backend) -> ShaderFormat {
        match self {
            BackendDevice::Null(_) => backend.native_shader_format(),
            #[cfg(feature = "wgpu")]
            BackendDevice::Wgpu(_) => ShaderFormat::Spirv,
        }
    }

    pub fn as_null(&self) -> Option<&null::Context> {
        match self {
            BackendDevice::Null(ctx) => Some(ctx),
            #[cfg(feature = "wgpu")]
            _ => None,
        }
    }
}

impl ResourceDevice for BackendDevice {
    fn create_buffer(&self, desc: &BufferDesc, contents: Option<&[u8]>) -> Result<BufferKey, GraphicsError> {
        dispatch!(self, ctx => ctx.create_buffer(desc, contents))
    }
    fn destroy_buffer(&self, buffer: BufferKey) {
        dispatch!(self, ctx => ctx.destroy_buffer(buffer))
    }
    fn write_buffer(&self, buffer: BufferKey, offset: u64, data: &[u8]) {
        dispatch!(self, ctx => ctx.write_buffer(buffer, offset, data))
    }
    fn read_buffer(&self, buffer: BufferKey, offset: u64, data: &mut [u8]) {
        dispatch!(self, ctx => ctx.read_buffer(buffer, offset, data))
    }
    fn create_texture(
        &self,
        desc: &TextureDesc,
        native_format: NativeFormat,
        mip_level_count: u32,
        contents: Option<&[u8]>,
    ) -> Result<TextureKey, GraphicsError> {
        dispatch!(self, ctx => ctx.create_texture(desc, native_format, mip_level_count, contents))
    }
    fn destroy_texture(&self, texture: TextureKey) {
        dispatch!(self, ctx => ctx.destroy_texture(texture))
    }
    fn create_sampler(&self, desc: &SamplerDesc) -> Result<SamplerKey, GraphicsError> {
        dispatch!(self, ctx => ctx.create_sampler(desc))
    }
    fn destroy_sampler(&self, sampler: SamplerKey) {
        dispatch!(self, ctx => ctx.destroy_sampler(sampler))
    }
}

impl ShaderDevice for BackendDevice {
    fn create_shader_module(&self, desc: &ShaderModuleDesc) -> Result<ShaderModuleKey, GraphicsError> {
        dispatch!(self, ctx => ctx.create_shader_module(desc))
    }
    fn destroy_shader_module(&self, module: ShaderModuleKey) {
        dispatch!(self, ctx => ctx.destroy_shader_module(module))
    }
    fn create_bind_group_layout(
        &self,
        desc: &BindGroupLayoutDesc,
    ) -> Result<BindGroupLayoutKey, GraphicsError> {
        dispatch!(self, ctx => ctx.create_bind_group_layout(desc))
    }
    fn destroy_bind_group_layout(&self, layout: BindGroupLayoutKey) {
        dispatch!(self, ctx => ctx.destroy_bind_group_layout(layout))
    }
    fn create_bind_group(&self, desc: &BindGroupDesc) -> Result<BindGroupKey, GraphicsError> {
        dispatch!(self, ctx => ctx.create_bind_group(desc))
    }
    fn destroy_bind_group(&self, group: BindGroupKey) {
        dispatch!(self, ctx => ctx.destroy_bind_group(group))
    }
    fn create_pipeline_layout(
        &self,
        desc: &PipelineLayoutDesc,
    ) -> Result<PipelineLayoutKey, GraphicsError> {
        dispatch!(self, ctx => ctx.create_pipeline_layout(desc))
    }
    fn destroy_pipeline_layout(&self, layout: PipelineLayoutKey) {
        dispatch!(self, ctx => ctx.destroy_pipeline_layout(layout))
    }
    fn create_render_pipeline(
        &self,
        desc: &RenderPipelineDesc,
    ) -> Result<RenderPipelineKey, GraphicsError> {
        dispatch!(self, ctx => ctx.create_render_pipeline(desc))
    }
    fn destroy_render_pipeline(&self, pipeline: RenderPipelineKey) {
        dispatch!(self, ctx => ctx.destroy_render_pipeline(pipeline))
    }
    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDesc,
    ) -> Result<ComputePipelineKey, GraphicsError> {
        dispatch!(self, ctx => ctx.create_compute_pipeline(desc))
    }
    fn destroy_compute_pipeline(&self, pipeline: ComputePipelineKey) {
        dispatch!(self, ctx => ctx.destroy_compute_pipeline(pipeline))
    }
}

impl CommandDevice for BackendDevice {
    fn submit(&self, queue: QueueType, commands: &[Command]) -> Result<(), GraphicsError> {
        dispatch!(self, ctx => ctx.submit(queue, commands))
    }
    fn signal(&self, queue: QueueType, value: u64) {
        dispatch!(self, ctx => ctx.signal(queue, value))
    }
    fn completed_value(&self, queue: QueueType) -> u64 {
        dispatch!(self, ctx => ctx.completed_value(queue))
    }
    fn wait(&self, queue: QueueType, value: u64) -> Result<(), GraphicsError> {
        dispatch!(self, ctx => ctx.wait(queue, value))
    }
}

impl SurfaceDevice for BackendDevice {
    fn create_surface(&self, handle: &SurfaceHandle) -> Result<SurfaceKey, GraphicsError> {
        dispatch!(self, ctx => ctx.create_surface(handle))
    }
    fn configure_surface(
        &self,
        surface: SurfaceKey,
        config: &SurfaceConfig,
    ) -> Result<Vec<TextureKey>, GraphicsError> {
        dispatch!(self, ctx => ctx.configure_surface(surface, config))
    }
    fn acquire_surface_texture(&self, surface: SurfaceKey) -> Result<Option<u32>, GraphicsError> {
        dispatch!(self, ctx => ctx.acquire_surface_texture(surface))
    }
    fn present_surface(&self, surface: SurfaceKey) -> Result<(), GraphicsError> {
        dispatch!(self, ctx => ctx.present_surface(surface))
    }
    fn destroy_surface(&self, surface: SurfaceKey) {
        dispatch!(self, ctx => ctx.destroy_surface(surface))
    }
}

impl LifetimeDevice for BackendDevice {
    fn live_objects(&self, kind: ObjectKind) -> usize {
        dispatch!(self, ctx => ctx.live_objects(kind))
    }
    fn release_all(&self, kind: ObjectKind) {
        dispatch!(self, ctx => ctx.release_all(kind))
    }
}
