//! Command recording.

use crate::traits::{CommandDevice as _, SurfaceDevice as _};
use crate::*;
use std::{mem, ops};

const INDIRECT_ALIGNMENT: u64 = 4;
const COPY_ALIGNMENT: u64 = 4;
const DRAW_INDIRECT_SIZE: u64 = 16;
const DRAW_INDEXED_INDIRECT_SIZE: u64 = 20;

struct PassState {
    size: Extent,
    pipeline: Option<RenderPipeline>,
    index_format: Option<IndexFormat>,
}

/// Records commands for one queue and submits them on [`RenderContext::flush`].
///
/// Recording is validated eagerly: misuse is reported at the offending call
/// according to the device's [`UsageErrorPolicy`].
pub struct RenderContext<'a> {
    device: &'a GraphicsDevice,
    queue: QueueType,
    name: String,
    commands: Vec<Command>,
    pass: Option<PassState>,
    compute_pipeline: Option<ComputePipeline>,
    debug_depth: u32,
    presents: Vec<SurfaceKey>,
}

impl<'a> RenderContext<'a> {
    pub(crate) fn new(device: &'a GraphicsDevice, queue: QueueType, name: &str) -> Self {
        Self {
            device,
            queue,
            name: name.to_string(),
            commands: Vec::new(),
            pass: None,
            compute_pipeline: None,
            debug_depth: 0,
            presents: Vec::new(),
        }
    }

    pub fn device(&self) -> &'a GraphicsDevice {
        self.device
    }
    pub fn queue_type(&self) -> QueueType {
        self.queue
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }
    pub fn is_in_pass(&self) -> bool {
        self.pass.is_some()
    }
    pub fn debug_group_depth(&self) -> u32 {
        self.debug_depth
    }

    fn fail(&self, error: ConfigError) -> GraphicsError {
        self.device.usage_error(error)
    }

    fn pass_state(&mut self) -> Result<&mut PassState, GraphicsError> {
        if self.pass.is_none() {
            return Err(self.fail(ConfigError::NoActivePass));
        }
        Ok(self.pass.as_mut().unwrap())
    }

    fn ensure_outside_pass(&self) -> Result<(), GraphicsError> {
        match self.pass {
            Some(_) => Err(self.fail(ConfigError::PassActive)),
            None => Ok(()),
        }
    }

    fn ensure_queue(&self, allowed: &[QueueType], operation: &'static str) -> Result<(), GraphicsError> {
        if allowed.contains(&self.queue) {
            Ok(())
        } else {
            Err(self.fail(ConfigError::WrongQueue {
                queue: self.queue,
                operation,
            }))
        }
    }

    fn ensure_buffer_usage(
        &self,
        buffer: &Buffer,
        usage: BufferUsage,
        what: &'static str,
        usage_name: &'static str,
    ) -> Result<(), GraphicsError> {
        if buffer.usage.contains(usage) {
            Ok(())
        } else {
            Err(self.fail(ConfigError::MissingUsage {
                what,
                usage: usage_name,
            }))
        }
    }

    fn ensure_aligned(&self, what: &'static str, value: u64, alignment: u64) -> Result<(), GraphicsError> {
        if value % alignment == 0 {
            Ok(())
        } else {
            Err(self.fail(ConfigError::Misaligned {
                what,
                value,
                alignment,
            }))
        }
    }

    fn check_range(&self, buffer: &Buffer, what: &'static str, offset: u64, len: u64) -> Result<(), GraphicsError> {
        buffer
            .check_range(what, offset, len)
            .map_err(|e| self.fail(e))
    }

    //=========================================================================
    // Render Passes
    //=========================================================================

    fn validate_attachments(&self, desc: &RenderPassDesc) -> Result<Extent, GraphicsError> {
        let limits = &self.device.capabilities().limits;
        let size = desc
            .attachment_size()
            .ok_or_else(|| self.fail(ConfigError::Attachments("render pass has no attachments")))?;
        let color_count = desc.color_attachments.len() as u64;
        if color_count > limits.max_color_attachments as u64 {
            return Err(self.fail(ConfigError::ExceedsLimit {
                what: "color attachment count",
                value: color_count,
                limit: limits.max_color_attachments as u64,
            }));
        }
        for attachment in desc.color_attachments.iter() {
            let texture = &attachment.texture;
            if !texture.usage.contains(TextureUsage::RENDER_TARGET) {
                return Err(self.fail(ConfigError::MissingUsage {
                    what: "color attachment",
                    usage: "RENDER_TARGET",
                }));
            }
            if !format::is_color_renderable_format(texture.format) {
                return Err(self.fail(ConfigError::FormatUsage {
                    format: texture.format,
                    reason: "color attachment needs a color renderable format",
                }));
            }
        }
        if let Some(ref attachment) = desc.depth_stencil_attachment {
            let texture = &attachment.texture;
            if !format::is_depth_stencil_format(texture.format) {
                return Err(self.fail(ConfigError::FormatUsage {
                    format: texture.format,
                    reason: "depth attachment needs a depth or stencil format",
                }));
            }
            if !texture.usage.contains(TextureUsage::RENDER_TARGET) {
                return Err(self.fail(ConfigError::MissingUsage {
                    what: "depth attachment",
                    usage: "RENDER_TARGET",
                }));
            }
        }
        let same_size = desc
            .color_attachments
            .iter()
            .map(|a| a.texture)
            .chain(desc.depth_stencil_attachment.map(|a| a.texture))
            .all(|t| t.size.width == size.width && t.size.height == size.height);
        if !same_size {
            return Err(self.fail(ConfigError::Attachments("attachment sizes differ")));
        }
        Ok(size)
    }

    /// Begins a render pass. Prefer [`RenderContext::push_scoped_pass`].
    pub fn begin_render_pass(&mut self, desc: &RenderPassDesc) -> Result<(), GraphicsError> {
        self.ensure_queue(&[QueueType::Graphics], "render pass")?;
        self.ensure_outside_pass()?;
        let size = self.validate_attachments(desc)?;
        self.commands.push(Command::BeginRenderPass(desc.clone()));
        self.pass = Some(PassState {
            size,
            pipeline: None,
            index_format: None,
        });
        Ok(())
    }

    pub fn end_render_pass(&mut self) -> Result<(), GraphicsError> {
        self.pass_state()?;
        self.commands.push(Command::EndRenderPass);
        self.pass = None;
        Ok(())
    }

    /// Begins a render pass that ends when the returned scope is dropped.
    pub fn push_scoped_pass(
        &mut self,
        desc: &RenderPassDesc,
    ) -> Result<RenderPassScope<'_, 'a>, GraphicsError> {
        self.begin_render_pass(desc)?;
        Ok(RenderPassScope { context: self })
    }

    /// Size of the attachments of the active pass.
    pub fn pass_size(&self) -> Option<Extent> {
        self.pass.as_ref().map(|pass| pass.size)
    }

    pub fn set_pipeline(&mut self, pipeline: RenderPipeline) -> Result<(), GraphicsError> {
        self.pass_state()?.pipeline = Some(pipeline);
        self.commands.push(Command::SetRenderPipeline(pipeline));
        Ok(())
    }

    pub fn set_bind_group(&mut self, index: u32, group: BindGroup) -> Result<(), GraphicsError> {
        let limit = self.device.capabilities().limits.max_bind_groups;
        if index >= limit {
            return Err(self.fail(ConfigError::ExceedsLimit {
                what: "bind group index",
                value: index as u64,
                limit: limit as u64 - 1,
            }));
        }
        self.commands.push(Command::SetBindGroup { index, group });
        Ok(())
    }

    pub fn set_vertex_buffer(&mut self, slot: u32, buffer: Buffer, offset: u64) -> Result<(), GraphicsError> {
        self.pass_state()?;
        let limit = self.device.capabilities().limits.max_vertex_buffers;
        if slot >= limit {
            return Err(self.fail(ConfigError::ExceedsLimit {
                what: "vertex buffer slot",
                value: slot as u64,
                limit: limit as u64 - 1,
            }));
        }
        self.ensure_buffer_usage(&buffer, BufferUsage::VERTEX, "vertex buffer", "VERTEX")?;
        self.check_range(&buffer, "vertex buffer", offset, 0)?;
        self.commands.push(Command::SetVertexBuffer {
            slot,
            buffer,
            offset,
        });
        Ok(())
    }

    pub fn set_index_buffer(
        &mut self,
        buffer: Buffer,
        offset: u64,
        format: IndexFormat,
    ) -> Result<(), GraphicsError> {
        self.pass_state()?;
        self.ensure_buffer_usage(&buffer, BufferUsage::INDEX, "index buffer", "INDEX")?;
        let index_size = match format {
            IndexFormat::Uint16 => 2,
            IndexFormat::Uint32 => 4,
        };
        self.ensure_aligned("index buffer offset", offset, index_size)?;
        self.check_range(&buffer, "index buffer", offset, 0)?;
        self.pass_state()?.index_format = Some(format);
        self.commands.push(Command::SetIndexBuffer {
            buffer,
            offset,
            format,
        });
        Ok(())
    }

    pub fn set_viewport(&mut self, viewport: Viewport) -> Result<(), GraphicsError> {
        self.pass_state()?;
        self.commands.push(Command::SetViewport(viewport));
        Ok(())
    }

    pub fn set_scissor_rect(&mut self, rect: ScissorRect) -> Result<(), GraphicsError> {
        self.pass_state()?;
        self.commands.push(Command::SetScissorRect(rect));
        Ok(())
    }

    pub fn set_blend_color(&mut self, color: Color) -> Result<(), GraphicsError> {
        self.pass_state()?;
        self.commands.push(Command::SetBlendConstant(color));
        Ok(())
    }

    pub fn set_stencil_reference(&mut self, reference: u32) -> Result<(), GraphicsError> {
        self.pass_state()?;
        self.commands.push(Command::SetStencilReference(reference));
        Ok(())
    }

    fn ensure_pipeline(&mut self) -> Result<(), GraphicsError> {
        if self.pass_state()?.pipeline.is_none() {
            return Err(self.fail(ConfigError::NoPipeline));
        }
        Ok(())
    }

    fn ensure_index_buffer(&mut self) -> Result<(), GraphicsError> {
        if self.pass_state()?.index_format.is_none() {
            return Err(self.fail(ConfigError::NoIndexBuffer));
        }
        Ok(())
    }

    pub fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<(), GraphicsError> {
        self.ensure_pipeline()?;
        self.commands.push(Command::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
        Ok(())
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) -> Result<(), GraphicsError> {
        self.ensure_pipeline()?;
        self.ensure_index_buffer()?;
        self.commands.push(Command::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            base_vertex,
            first_instance,
        });
        Ok(())
    }

    fn check_indirect(&self, buffer: &Buffer, offset: u64, size: u64) -> Result<(), GraphicsError> {
        self.ensure_buffer_usage(buffer, BufferUsage::INDIRECT, "indirect buffer", "INDIRECT")?;
        self.ensure_aligned("indirect offset", offset, INDIRECT_ALIGNMENT)?;
        self.check_range(buffer, "indirect arguments", offset, size)
    }

    pub fn draw_indirect(&mut self, buffer: Buffer, offset: u64) -> Result<(), GraphicsError> {
        self.ensure_pipeline()?;
        self.check_indirect(&buffer, offset, DRAW_INDIRECT_SIZE)?;
        self.commands.push(Command::DrawIndirect { buffer, offset });
        Ok(())
    }

    pub fn draw_indexed_indirect(&mut self, buffer: Buffer, offset: u64) -> Result<(), GraphicsError> {
        self.ensure_pipeline()?;
        self.ensure_index_buffer()?;
        self.check_indirect(&buffer, offset, DRAW_INDEXED_INDIRECT_SIZE)?;
        self.commands
            .push(Command::DrawIndexedIndirect { buffer, offset });
        Ok(())
    }

    //=========================================================================
    // Compute and Transfer
    //=========================================================================

    pub fn set_compute_pipeline(&mut self, pipeline: ComputePipeline) -> Result<(), GraphicsError> {
        self.ensure_queue(&[QueueType::Graphics, QueueType::Compute], "compute")?;
        self.ensure_outside_pass()?;
        self.compute_pipeline = Some(pipeline);
        self.commands.push(Command::SetComputePipeline(pipeline));
        Ok(())
    }

    pub fn dispatch(&mut self, groups: [u32; 3]) -> Result<(), GraphicsError> {
        self.ensure_queue(&[QueueType::Graphics, QueueType::Compute], "compute")?;
        self.ensure_outside_pass()?;
        if self.compute_pipeline.is_none() {
            return Err(self.fail(ConfigError::NoPipeline));
        }
        self.commands.push(Command::Dispatch { groups });
        Ok(())
    }

    pub fn copy_buffer_to_buffer(
        &mut self,
        src: Buffer,
        src_offset: u64,
        dst: Buffer,
        dst_offset: u64,
        size: u64,
    ) -> Result<(), GraphicsError> {
        self.ensure_outside_pass()?;
        self.ensure_aligned("copy size", size, COPY_ALIGNMENT)?;
        self.ensure_aligned("copy source offset", src_offset, COPY_ALIGNMENT)?;
        self.ensure_aligned("copy destination offset", dst_offset, COPY_ALIGNMENT)?;
        self.check_range(&src, "copy source", src_offset, size)?;
        self.check_range(&dst, "copy destination", dst_offset, size)?;
        if src.raw == dst.raw && src_offset < dst_offset + size && dst_offset < src_offset + size {
            return Err(self.fail(ConfigError::CopyOverlap));
        }
        self.commands.push(Command::CopyBufferToBuffer {
            src,
            src_offset,
            dst,
            dst_offset,
            size,
        });
        Ok(())
    }

    //=========================================================================
    // Debug Markers
    //=========================================================================

    pub fn push_debug_group(&mut self, name: &str) {
        self.debug_depth += 1;
        self.commands.push(Command::PushDebugGroup(name.to_string()));
    }

    pub fn pop_debug_group(&mut self) -> Result<(), GraphicsError> {
        if self.debug_depth == 0 {
            return Err(self.fail(ConfigError::DebugGroupUnderflow));
        }
        self.debug_depth -= 1;
        self.commands.push(Command::PopDebugGroup);
        Ok(())
    }

    pub fn insert_debug_marker(&mut self, name: &str) {
        self.commands
            .push(Command::InsertDebugMarker(name.to_string()));
    }

    /// Pushes a debug group that is popped when the returned scope is dropped.
    pub fn push_scoped_debug_group(&mut self, name: &str) -> DebugGroupScope<'_, 'a> {
        self.push_debug_group(name);
        DebugGroupScope { context: self }
    }

    //=========================================================================
    // Presentation and Submission
    //=========================================================================

    /// Acquires the next back-buffer of `swap_chain`.
    ///
    /// Returns `None` while the swap chain is suspended; the frame should be
    /// skipped. The swap chain is presented when the context is flushed.
    pub fn acquire_swap_chain_texture(
        &mut self,
        swap_chain: &mut SwapChain,
    ) -> Result<Option<Texture>, GraphicsError> {
        self.ensure_queue(&[QueueType::Graphics], "presentation")?;
        if swap_chain.is_suspended() {
            return Ok(None);
        }
        let index = match self.device.hal().acquire_surface_texture(swap_chain.raw)? {
            Some(index) => index,
            None => return Ok(None),
        };
        swap_chain.current_index = Some(index);
        if !self.presents.contains(&swap_chain.raw) {
            self.presents.push(swap_chain.raw);
        }
        Ok(swap_chain.current_back_buffer())
    }

    /// Submits the recorded commands, signals the queue fence and presents
    /// acquired swap chains. Returns the signaled fence value.
    pub fn flush(mut self, wait_for_completion: bool) -> Result<u64, GraphicsError> {
        self.ensure_outside_pass()?;
        if self.debug_depth != 0 {
            log::warn!(
                "Context '{}' flushed with {} open debug groups",
                self.name,
                self.debug_depth
            );
            for _ in 0..mem::take(&mut self.debug_depth) {
                self.commands.push(Command::PopDebugGroup);
            }
        }

        let commands = mem::take(&mut self.commands);
        let hal = self.device.hal();
        hal.submit(self.queue, &commands)?;
        let queue = self.device.queue(self.queue);
        let value = queue.signal();
        for surface in self.presents.drain(..) {
            hal.present_surface(surface)?;
        }
        log::trace!(
            "Flushed '{}': {} commands, fence {:#x}",
            self.name,
            commands.len(),
            value
        );
        if wait_for_completion {
            queue.wait_for_fence(value)?;
        }
        Ok(value)
    }
}

impl Drop for RenderContext<'_> {
    fn drop(&mut self) {
        if !self.commands.is_empty() {
            log::warn!(
                "Context '{}' dropped with {} unsubmitted commands",
                self.name,
                self.commands.len()
            );
        }
    }
}

/// An active render pass, ended when dropped.
pub struct RenderPassScope<'c, 'a> {
    context: &'c mut RenderContext<'a>,
}

impl<'a> ops::Deref for RenderPassScope<'_, 'a> {
    type Target = RenderContext<'a>;
    fn deref(&self) -> &Self::Target {
        self.context
    }
}

impl ops::DerefMut for RenderPassScope<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.context
    }
}

impl Drop for RenderPassScope<'_, '_> {
    fn drop(&mut self) {
        if self.context.pass.take().is_some() {
            self.context.commands.push(Command::EndRenderPass);
        }
    }
}

/// An open debug group, popped when dropped.
pub struct DebugGroupScope<'c, 'a> {
    context: &'c mut RenderContext<'a>,
}

impl<'a> ops::Deref for DebugGroupScope<'_, 'a> {
    type Target = RenderContext<'a>;
    fn deref(&self) -> &Self::Target {
        self.context
    }
}

impl ops::DerefMut for DebugGroupScope<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.context
    }
}

impl Drop for DebugGroupScope<'_, '_> {
    fn drop(&mut self) {
        if self.context.debug_depth > 0 {
            self.context.debug_depth -= 1;
            self.context.commands.push(Command::PopDebugGroup);
        }
    }
}
