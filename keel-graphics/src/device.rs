//! The logical device: capability queries and factory for every GPU object.

use crate::cache::{self, CacheStats, ObjectCache};
use crate::traits::{
    CommandDevice as _, LifetimeDevice as _, ResourceDevice as _, ShaderDevice as _,
    SurfaceConfig, SurfaceDevice as _,
};
use crate::*;
use std::sync::{Arc, Mutex};

/// Categories of device-owned objects.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum ObjectKind {
    /// Submission queues; live while they hold unfinished work.
    Queue,
    RenderPipeline,
    ComputePipeline,
    BindGroup,
    PipelineLayout,
    BindGroupLayout,
    ShaderModule,
    Sampler,
    Texture,
    Buffer,
    SwapChain,
}

impl ObjectKind {
    /// Dependents come before the objects they reference.
    pub const RELEASE_ORDER: [ObjectKind; 11] = [
        Self::Queue,
        Self::RenderPipeline,
        Self::ComputePipeline,
        Self::BindGroup,
        Self::PipelineLayout,
        Self::BindGroupLayout,
        Self::ShaderModule,
        Self::Sampler,
        Self::Texture,
        Self::Buffer,
        Self::SwapChain,
    ];
}

#[derive(Clone, Debug)]
pub struct DeviceDesc<'a> {
    pub name: &'a str,
    /// `None` picks the best available backend.
    pub preferred_backend: Option<Backend>,
    pub power_preference: PowerPreference,
    /// Validation failures to enable are logged and ignored.
    pub validation_mode: ValidationMode,
    /// Clamped to `2..=3`.
    pub max_frames_in_flight: u32,
    pub usage_errors: UsageErrorPolicy,
    /// Fall back to the Null backend when no GPU backend works.
    pub allow_null_fallback: bool,
}

impl Default for DeviceDesc<'_> {
    fn default() -> Self {
        Self {
            name: "",
            preferred_backend: None,
            power_preference: PowerPreference::HighPerformance,
            validation_mode: ValidationMode::Disabled,
            max_frames_in_flight: 2,
            usage_errors: UsageErrorPolicy::default(),
            allow_null_fallback: false,
        }
    }
}

pub struct GraphicsDevice {
    name: String,
    backend: Backend,
    adapter: GraphicsAdapter,
    caps: DeviceCaps,
    validation_mode: ValidationMode,
    usage_errors: UsageErrorPolicy,
    max_frames_in_flight: u32,
    frame_count: u64,
    frame_index: u32,
    frame_fences: Vec<u64>,
    cache: Mutex<ObjectCache>,
    queues: [Queue; 3],
    hal: Arc<BackendDevice>,
}

impl GraphicsDevice {
    /// Creates a device on the best matching backend and adapter.
    pub fn create_default(
        instance: &GraphicsInstance,
        desc: &DeviceDesc,
    ) -> Result<Self, GraphicsError> {
        instance.create_device(desc)
    }

    pub(crate) fn new(
        backend: Backend,
        adapter: GraphicsAdapter,
        validation_mode: ValidationMode,
        desc: &DeviceDesc,
        hal: BackendDevice,
    ) -> Self {
        let hal = Arc::new(hal);
        let caps = hal_capabilities(&hal);
        let max_frames_in_flight = desc.max_frames_in_flight.clamp(2, 3);
        log::info!(
            "Created {} device '{}' on {}, {} frames in flight",
            backend,
            desc.name,
            adapter,
            max_frames_in_flight
        );
        log::debug!("Device capabilities: {:?}", caps);
        Self {
            name: desc.name.to_string(),
            backend,
            adapter,
            caps,
            validation_mode,
            usage_errors: desc.usage_errors,
            max_frames_in_flight,
            frame_count: 0,
            frame_index: 0,
            frame_fences: vec![0; max_frames_in_flight as usize],
            cache: Mutex::new(ObjectCache::default()),
            queues: QueueType::ALL.map(|ty| Queue::new(ty, Arc::clone(&hal))),
            hal,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn backend(&self) -> Backend {
        self.backend
    }
    pub fn adapter(&self) -> &GraphicsAdapter {
        &self.adapter
    }
    pub fn capabilities(&self) -> &DeviceCaps {
        &self.caps
    }
    pub fn validation_mode(&self) -> ValidationMode {
        self.validation_mode
    }
    pub fn usage_error_policy(&self) -> UsageErrorPolicy {
        self.usage_errors
    }
    pub fn max_frames_in_flight(&self) -> u32 {
        self.max_frames_in_flight
    }
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }
    pub fn queue(&self, ty: QueueType) -> &Queue {
        &self.queues[ty as usize]
    }
    pub fn shader_format(&self) -> ShaderFormat {
        self.hal.shader_format(self.backend)
    }

    /// The Null backend context, for inspecting its simulated timeline.
    pub fn as_null(&self) -> Option<&null::Context> {
        self.hal.as_null()
    }

    pub(crate) fn hal(&self) -> &BackendDevice {
        &self.hal
    }

    /// Applies the usage error policy to a contract violation.
    pub(crate) fn usage_error(&self, error: ConfigError) -> GraphicsError {
        match self.usage_errors {
            UsageErrorPolicy::Assert => panic!("Graphics usage error: {error}"),
            UsageErrorPolicy::Report => {
                log::error!("Graphics usage error: {}", error);
                GraphicsError::Config(error)
            }
        }
    }

    fn check<T>(&self, result: Result<T, GraphicsError>) -> Result<T, GraphicsError> {
        result.map_err(|e| match e {
            GraphicsError::Config(config) => self.usage_error(config),
            other => other,
        })
    }

    //=========================================================================
    // Resources
    //=========================================================================

    pub fn create_buffer(&self, desc: &BufferDesc) -> Result<Buffer, GraphicsError> {
        self.create_buffer_with_data(desc, None)
    }

    /// Creates a buffer whose leading bytes are initialized from `contents`.
    pub fn create_buffer_init<T: bytemuck::Pod>(
        &self,
        desc: &BufferDesc,
        contents: &[T],
    ) -> Result<Buffer, GraphicsError> {
        self.create_buffer_with_data(desc, Some(bytemuck::cast_slice(contents)))
    }

    fn create_buffer_with_data(
        &self,
        desc: &BufferDesc,
        contents: Option<&[u8]>,
    ) -> Result<Buffer, GraphicsError> {
        self.check(desc.validate(&self.caps).map_err(Into::into))?;
        if let Some(data) = contents {
            if data.len() as u64 > desc.size {
                return Err(self.usage_error(ConfigError::InitialData {
                    expected: desc.size,
                    provided: data.len() as u64,
                }));
            }
        }
        let raw = self.hal.create_buffer(desc, contents)?;
        log::trace!("Created buffer '{}' of {} bytes", desc.name, desc.size);
        Ok(Buffer {
            raw,
            size: desc.size,
            usage: desc.usage,
            memory: desc.memory,
        })
    }

    pub fn destroy_buffer(&self, buffer: Buffer) {
        self.hal.destroy_buffer(buffer.raw);
    }

    /// Writes into an `Upload` buffer.
    pub fn write_buffer(&self, buffer: Buffer, offset: u64, data: &[u8]) -> Result<(), GraphicsError> {
        if buffer.memory != Memory::Upload {
            return Err(self.usage_error(ConfigError::Memory {
                what: "writing from the CPU",
                expected: Memory::Upload,
            }));
        }
        self.check(
            buffer
                .check_range("buffer write", offset, data.len() as u64)
                .map_err(Into::into),
        )?;
        self.hal.write_buffer(buffer.raw, offset, data);
        Ok(())
    }

    /// Reads a `Readback` buffer. The caller waits for the copying work first.
    pub fn read_buffer(&self, buffer: Buffer, offset: u64, data: &mut [u8]) -> Result<(), GraphicsError> {
        if buffer.memory != Memory::Readback {
            return Err(self.usage_error(ConfigError::Memory {
                what: "reading from the CPU",
                expected: Memory::Readback,
            }));
        }
        self.check(
            buffer
                .check_range("buffer read", offset, data.len() as u64)
                .map_err(Into::into),
        )?;
        self.hal.read_buffer(buffer.raw, offset, data);
        Ok(())
    }

    pub fn create_texture(&self, desc: &TextureDesc) -> Result<Texture, GraphicsError> {
        self.create_texture_with_data(desc, None)
    }

    /// Creates a texture with its first mip level of every layer initialized.
    ///
    /// `contents` is tightly packed as described by [`format::surface_info`].
    pub fn create_texture_with_data(
        &self,
        desc: &TextureDesc,
        contents: Option<&[u8]>,
    ) -> Result<Texture, GraphicsError> {
        self.check(desc.validate(&self.caps))?;
        if let Some(data) = contents {
            let slice = format::surface_info(desc.format, desc.size.width, desc.size.height);
            let expected = slice.slice_pitch * desc.size.depth_or_array_layers as u64;
            if (data.len() as u64) < expected {
                return Err(self.usage_error(ConfigError::InitialData {
                    expected,
                    provided: data.len() as u64,
                }));
            }
        }
        let (native_format, typeless) = NativeFormat::for_texture(self.backend, desc);
        let mip_level_count = desc.resolved_mip_level_count();
        let raw = self
            .hal
            .create_texture(desc, native_format, mip_level_count, contents)?;
        log::trace!(
            "Created texture '{}' {} {:?} with {} mips",
            desc.name,
            desc.size,
            desc.format,
            mip_level_count
        );
        Ok(Texture {
            raw,
            format: desc.format,
            native_format,
            typeless,
            dimension: desc.dimension,
            size: desc.size,
            mip_level_count,
            sample_count: desc.sample_count,
            usage: desc.usage,
        })
    }

    pub fn destroy_texture(&self, texture: Texture) {
        self.hal.destroy_texture(texture.raw);
    }

    pub fn create_sampler(&self, desc: &SamplerDesc) -> Result<Sampler, GraphicsError> {
        self.check(desc.validate().map_err(Into::into))?;
        let raw = self.hal.create_sampler(desc)?;
        Ok(Sampler { raw })
    }

    pub fn destroy_sampler(&self, sampler: Sampler) {
        self.hal.destroy_sampler(sampler.raw);
    }

    //=========================================================================
    // Shaders and Pipelines
    //=========================================================================

    pub fn create_shader_module(&self, desc: &ShaderModuleDesc) -> Result<ShaderModule, GraphicsError> {
        self.check(desc.validate(self.shader_format()).map_err(Into::into))?;
        let raw = self.hal.create_shader_module(desc)?;
        Ok(ShaderModule {
            raw,
            stage: desc.stage,
        })
    }

    pub fn destroy_shader_module(&self, module: ShaderModule) {
        self.hal.destroy_shader_module(module.raw);
    }

    pub fn create_bind_group_layout(
        &self,
        desc: &BindGroupLayoutDesc,
    ) -> Result<BindGroupLayout, GraphicsError> {
        self.check(desc.validate().map_err(Into::into))?;
        let raw = self.hal.create_bind_group_layout(desc)?;
        Ok(BindGroupLayout { raw })
    }

    pub fn destroy_bind_group_layout(&self, layout: BindGroupLayout) {
        self.hal.destroy_bind_group_layout(layout.raw);
    }

    pub fn create_bind_group(&self, desc: &BindGroupDesc) -> Result<BindGroup, GraphicsError> {
        let raw = self.check(self.hal.create_bind_group(desc))?;
        Ok(BindGroup { raw })
    }

    pub fn destroy_bind_group(&self, group: BindGroup) {
        self.hal.destroy_bind_group(group.raw);
    }

    pub fn create_pipeline_layout(
        &self,
        desc: &PipelineLayoutDesc,
    ) -> Result<PipelineLayout, GraphicsError> {
        let count = desc.bind_group_layouts.len() as u64;
        let limit = self.caps.limits.max_bind_groups as u64;
        if count > limit {
            return Err(self.usage_error(ConfigError::ExceedsLimit {
                what: "bind group count",
                value: count,
                limit,
            }));
        }
        let raw = self.hal.create_pipeline_layout(desc)?;
        Ok(PipelineLayout {
            raw,
            bind_group_count: count as u32,
        })
    }

    pub fn destroy_pipeline_layout(&self, layout: PipelineLayout) {
        self.hal.destroy_pipeline_layout(layout.raw);
    }

    pub fn create_render_pipeline(
        &self,
        desc: &RenderPipelineDesc,
    ) -> Result<RenderPipeline, GraphicsError> {
        self.check(
            desc.validate(self.caps.limits.max_color_attachments)
                .map_err(Into::into),
        )?;
        if !self.caps.supports_sample_count(desc.sample_count.count()) {
            return Err(self.usage_error(ConfigError::SampleCount("not supported by the device")));
        }
        let raw = self.hal.create_render_pipeline(desc)?;
        log::debug!("Created render pipeline '{}'", desc.name);
        Ok(RenderPipeline {
            raw,
            topology: desc.primitive.topology,
            bind_group_count: desc.layout.bind_group_count,
        })
    }

    pub fn destroy_render_pipeline(&self, pipeline: RenderPipeline) {
        self.hal.destroy_render_pipeline(pipeline.raw);
    }

    pub fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDesc,
    ) -> Result<ComputePipeline, GraphicsError> {
        self.check(desc.validate().map_err(Into::into))?;
        let raw = self.hal.create_compute_pipeline(desc)?;
        log::debug!("Created compute pipeline '{}'", desc.name);
        Ok(ComputePipeline {
            raw,
            bind_group_count: desc.layout.bind_group_count,
        })
    }

    pub fn destroy_compute_pipeline(&self, pipeline: ComputePipeline) {
        self.hal.destroy_compute_pipeline(pipeline.raw);
    }

    //=========================================================================
    // Object Cache
    //=========================================================================

    /// Returns the cached layout for `desc`, creating it on first use.
    ///
    /// Cached objects are owned by the cache: do not destroy them directly.
    pub fn get_or_create_bind_group_layout(
        &self,
        desc: &BindGroupLayoutDesc,
    ) -> Result<BindGroupLayout, GraphicsError> {
        cache::get_or_create(
            &self.cache,
            |cache| (&mut cache.stats, &mut cache.bind_group_layouts),
            desc,
            || self.create_bind_group_layout(desc),
            |duplicate| self.destroy_bind_group_layout(duplicate),
        )
    }

    pub fn get_or_create_pipeline_layout(
        &self,
        desc: &PipelineLayoutDesc,
    ) -> Result<PipelineLayout, GraphicsError> {
        cache::get_or_create(
            &self.cache,
            |cache| (&mut cache.stats, &mut cache.pipeline_layouts),
            desc,
            || self.create_pipeline_layout(desc),
            |duplicate| self.destroy_pipeline_layout(duplicate),
        )
    }

    pub fn get_or_create_render_pipeline(
        &self,
        desc: &RenderPipelineDesc,
    ) -> Result<RenderPipeline, GraphicsError> {
        cache::get_or_create(
            &self.cache,
            |cache| (&mut cache.stats, &mut cache.render_pipelines),
            desc,
            || self.create_render_pipeline(desc),
            |duplicate| self.destroy_render_pipeline(duplicate),
        )
    }

    pub fn get_or_create_compute_pipeline(
        &self,
        desc: &ComputePipelineDesc,
    ) -> Result<ComputePipeline, GraphicsError> {
        cache::get_or_create(
            &self.cache,
            |cache| (&mut cache.stats, &mut cache.compute_pipelines),
            desc,
            || self.create_compute_pipeline(desc),
            |duplicate| self.destroy_compute_pipeline(duplicate),
        )
    }

    pub fn cache_stats(&self) -> CacheStats {
        cache::lock(&self.cache).stats
    }

    pub fn cached_object_count(&self) -> usize {
        cache::lock(&self.cache).len()
    }

    /// Destroys every cached object.
    pub fn clear_object_cache(&self) {
        let evicted = cache::lock(&self.cache).drain();
        for pipeline in evicted.render_pipelines {
            self.destroy_render_pipeline(pipeline);
        }
        for pipeline in evicted.compute_pipelines {
            self.destroy_compute_pipeline(pipeline);
        }
        for layout in evicted.pipeline_layouts {
            self.destroy_pipeline_layout(layout);
        }
        for layout in evicted.bind_group_layouts {
            self.destroy_bind_group_layout(layout);
        }
    }

    //=========================================================================
    // Swap Chains
    //=========================================================================

    pub fn create_swap_chain<S: SurfaceSource + ?Sized>(
        &self,
        source: &S,
        desc: &SwapChainDesc,
    ) -> Result<SwapChain, GraphicsError> {
        let handle = source.surface_handle()?;
        if !self.backend.supports_surface(handle.kind) {
            return Err(self.usage_error(ConfigError::SurfaceKind {
                backend: self.backend,
                kind: handle.kind,
            }));
        }
        if !format::is_color_renderable_format(desc.color_format) {
            return Err(self.usage_error(ConfigError::FormatUsage {
                format: desc.color_format,
                reason: "swap chain format is not color renderable",
            }));
        }
        if let Some(format) = desc.depth_stencil_format {
            if !format::is_depth_stencil_format(format) {
                return Err(self.usage_error(ConfigError::FormatUsage {
                    format,
                    reason: "swap chain depth buffer needs a depth or stencil format",
                }));
            }
        }

        let raw = self.hal.create_surface(&handle)?;
        let mut swap_chain = SwapChain {
            raw,
            surface_kind: handle.kind,
            color_format: desc.color_format,
            present_mode: desc.present_mode,
            depth_stencil_format: desc.depth_stencil_format,
            fullscreen: desc.fullscreen,
            present_flags: PresentFlags::select(
                desc.present_mode.sync_interval(),
                desc.fullscreen,
                self.caps.supports_tearing(),
            ),
            size: Extent::default(),
            back_buffers: Vec::new(),
            depth_stencil: None,
            current_index: None,
        };
        if let Err(e) = self.rebuild_swap_chain(&mut swap_chain, source.current_size()) {
            self.hal.destroy_surface(raw);
            return Err(e);
        }
        log::info!(
            "Created swap chain '{}' on {:?} surface: {} {:?}, {} buffers",
            desc.name,
            handle.kind,
            swap_chain.size,
            desc.present_mode,
            swap_chain.buffer_count()
        );
        Ok(swap_chain)
    }

    /// Rebuilds the back-buffer ring and depth buffer at a new size.
    ///
    /// Waits for the GPU first. A zero-area size suspends the swap chain.
    pub fn resize_swap_chain(
        &self,
        swap_chain: &mut SwapChain,
        size: Extent,
    ) -> Result<(), GraphicsError> {
        self.wait_idle();
        if let Some(depth) = swap_chain.depth_stencil.take() {
            self.destroy_texture(depth);
        }
        self.rebuild_swap_chain(swap_chain, size)?;
        log::debug!("Resized swap chain to {}", swap_chain.size);
        Ok(())
    }

    fn rebuild_swap_chain(&self, swap_chain: &mut SwapChain, size: Extent) -> Result<(), GraphicsError> {
        let size = Extent::new_2d(size.width, size.height);
        let config = SurfaceConfig {
            format: swap_chain.color_format,
            size,
            present_mode: swap_chain.present_mode,
            buffer_count: swap_chain.buffer_count(),
            allow_tearing: swap_chain
                .present_flags
                .contains(PresentFlags::ALLOW_TEARING),
        };
        let keys = self.hal.configure_surface(swap_chain.raw, &config)?;
        let desc = TextureDesc::tex_2d(swap_chain.color_format, size.width, size.height, 1, 1)
            .with_usage(TextureUsage::RENDER_TARGET);
        let (native_format, typeless) = NativeFormat::for_texture(self.backend, &desc);
        swap_chain.back_buffers = keys
            .into_iter()
            .map(|raw| Texture {
                raw,
                format: swap_chain.color_format,
                native_format,
                typeless,
                dimension: TextureDimension::D2,
                size,
                mip_level_count: 1,
                sample_count: SampleCount::X1,
                usage: TextureUsage::RENDER_TARGET,
            })
            .collect();
        swap_chain.size = size;
        swap_chain.current_index = None;

        if let Some(format) = swap_chain.depth_stencil_format {
            if !size.is_empty() {
                let desc = TextureDesc::tex_2d(format, size.width, size.height, 1, 1)
                    .with_usage(TextureUsage::RENDER_TARGET)
                    .with_name("swap chain depth");
                swap_chain.depth_stencil = Some(self.create_texture(&desc)?);
            }
        }
        Ok(())
    }

    pub fn destroy_swap_chain(&self, mut swap_chain: SwapChain) {
        self.wait_idle();
        if let Some(depth) = swap_chain.depth_stencil.take() {
            self.destroy_texture(depth);
        }
        self.hal.destroy_surface(swap_chain.raw);
    }

    //=========================================================================
    // Submission
    //=========================================================================

    pub fn begin_render_context(&self, name: &str) -> RenderContext<'_> {
        RenderContext::new(self, QueueType::Graphics, name)
    }

    pub fn begin_context(&self, queue: QueueType, name: &str) -> RenderContext<'_> {
        RenderContext::new(self, queue, name)
    }

    /// Blocks until every queue has drained.
    pub fn wait_idle(&self) {
        for queue in self.queues.iter() {
            if let Err(e) = queue.wait_idle() {
                log::error!("Waiting for the {:?} queue: {}", queue.queue_type(), e);
            }
        }
    }

    /// Ends the current frame.
    ///
    /// Advances the frame counters and blocks while the GPU is still
    /// `max_frames_in_flight` frames behind.
    pub fn finish_frame(&mut self) {
        let graphics = &self.queues[QueueType::Graphics as usize];
        self.frame_fences[self.frame_index as usize] = graphics.signal();
        self.frame_count += 1;
        self.frame_index = (self.frame_count % self.max_frames_in_flight as u64) as u32;
        let pending = self.frame_fences[self.frame_index as usize];
        if pending != 0 {
            if let Err(e) = graphics.wait_for_fence(pending) {
                log::error!("Waiting for frame fence {:#x}: {}", pending, e);
            }
        }
    }

    pub fn live_object_count(&self, kind: ObjectKind) -> usize {
        self.hal.live_objects(kind)
    }

    fn report_live_objects(&self) {
        for kind in ObjectKind::RELEASE_ORDER {
            let count = self.hal.live_objects(kind);
            if count != 0 {
                log::warn!(
                    "Device '{}' destroyed with {} live {:?} object(s)",
                    self.name,
                    count,
                    kind
                );
            }
        }
    }
}

fn hal_capabilities(hal: &BackendDevice) -> DeviceCaps {
    match hal {
        BackendDevice::Null(ctx) => ctx.capabilities(),
        #[cfg(feature = "wgpu")]
        BackendDevice::Wgpu(ctx) => ctx.capabilities(),
    }
}

impl Drop for GraphicsDevice {
    fn drop(&mut self) {
        self.wait_idle();
        self.clear_object_cache();
        if cfg!(debug_assertions) {
            self.report_live_objects();
        }
        for kind in ObjectKind::RELEASE_ORDER {
            self.hal.release_all(kind);
        }
        log::info!("Destroyed {} device '{}'", self.backend, self.name);
    }
}

impl std::fmt::Debug for GraphicsDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsDevice")
            .field("name", &self.name)
            .field("backend", &self.backend)
            .field("adapter", &self.adapter)
            .field("frame_count", &self.frame_count)
            .finish()
    }
}
