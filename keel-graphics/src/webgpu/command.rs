//! Command replay and queue timelines for the wgpu backend

use super::*;
use crate::{format, Command, GraphicsError, LoadAction, StoreAction};

fn map_load<T, U: Default>(load: LoadAction<T>, clear: impl FnOnce(T) -> U) -> wgpu::LoadOp<U> {
    match load {
        LoadAction::Load => wgpu::LoadOp::Load,
        LoadAction::Clear(value) => wgpu::LoadOp::Clear(clear(value)),
        LoadAction::DontCare => wgpu::LoadOp::Clear(U::default()),
    }
}

fn map_store(store: StoreAction) -> wgpu::StoreOp {
    match store {
        StoreAction::Store => wgpu::StoreOp::Store,
        StoreAction::Discard => wgpu::StoreOp::Discard,
    }
}

fn map_color(color: crate::Color) -> wgpu::Color {
    wgpu::Color {
        r: color.r,
        g: color.g,
        b: color.b,
        a: color.a,
    }
}

fn map_index_format(format: crate::IndexFormat) -> wgpu::IndexFormat {
    match format {
        crate::IndexFormat::Uint16 => wgpu::IndexFormat::Uint16,
        crate::IndexFormat::Uint32 => wgpu::IndexFormat::Uint32,
    }
}

impl Context {
    fn texture_view<'h>(&self, hub: &'h Hub, texture: TextureKey) -> Result<&'h TextureEntry, GraphicsError> {
        hub.textures
            .get(texture)
            .filter(|entry| entry.view.is_some())
            .ok_or_else(|| self.stale("texture"))
    }

    fn buffer<'h>(&self, hub: &'h Hub, buffer: crate::Buffer) -> Result<&'h wgpu::Buffer, GraphicsError> {
        hub.buffers
            .get(buffer.raw)
            .map(|entry| &entry.gpu)
            .ok_or_else(|| self.stale("buffer"))
    }

    fn bind_group<'h>(&self, hub: &'h Hub, group: BindGroupKey) -> Result<&'h wgpu::BindGroup, GraphicsError> {
        hub.bind_groups
            .get(group)
            .ok_or_else(|| self.stale("bind group"))
    }

    /// Encodes one render pass, consuming commands up to its end marker.
    fn encode_render_pass(
        &self,
        hub: &Hub,
        encoder: &mut wgpu::CommandEncoder,
        desc: &crate::RenderPassDesc,
        commands: &mut std::slice::Iter<'_, Command>,
    ) -> Result<(), GraphicsError> {
        let color_attachments = desc
            .color_attachments
            .iter()
            .map(|attachment| {
                let entry = self.texture_view(hub, attachment.texture.raw)?;
                Ok(Some(wgpu::RenderPassColorAttachment {
                    view: entry.view.as_ref().ok_or_else(|| self.stale("texture"))?,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: map_load(attachment.load, map_color),
                        store: map_store(attachment.store),
                    },
                }))
            })
            .collect::<Result<Vec<_>, GraphicsError>>()?;

        let depth_stencil_attachment = match desc.depth_stencil_attachment {
            Some(ref attachment) => {
                let entry = self.texture_view(hub, attachment.texture.raw)?;
                Some(wgpu::RenderPassDepthStencilAttachment {
                    view: entry.view.as_ref().ok_or_else(|| self.stale("texture"))?,
                    depth_ops: format::is_depth_format(entry.format).then(|| wgpu::Operations {
                        load: map_load(attachment.depth_load, |depth| depth),
                        store: map_store(attachment.depth_store),
                    }),
                    stencil_ops: format::is_stencil_format(entry.format).then(|| {
                        wgpu::Operations {
                            load: map_load(attachment.stencil_load, |stencil| stencil),
                            store: map_store(attachment.stencil_store),
                        }
                    }),
                })
            }
            None => None,
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: if desc.name.is_empty() {
                None
            } else {
                Some(&desc.name)
            },
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        for command in commands.by_ref() {
            match *command {
                Command::EndRenderPass => return Ok(()),
                Command::SetRenderPipeline(pipeline) => {
                    let raw = hub
                        .render_pipelines
                        .get(pipeline.raw)
                        .ok_or_else(|| self.stale("render pipeline"))?;
                    pass.set_pipeline(raw);
                }
                Command::SetBindGroup { index, group } => {
                    pass.set_bind_group(index, self.bind_group(hub, group.raw)?, &[]);
                }
                Command::SetVertexBuffer {
                    slot,
                    buffer,
                    offset,
                } => {
                    pass.set_vertex_buffer(slot, self.buffer(hub, buffer)?.slice(offset..));
                }
                Command::SetIndexBuffer {
                    buffer,
                    offset,
                    format,
                } => {
                    pass.set_index_buffer(
                        self.buffer(hub, buffer)?.slice(offset..),
                        map_index_format(format),
                    );
                }
                Command::SetViewport(ref v) => {
                    pass.set_viewport(v.x, v.y, v.width, v.height, v.min_depth, v.max_depth);
                }
                Command::SetScissorRect(ref r) => {
                    pass.set_scissor_rect(r.x, r.y, r.width, r.height);
                }
                Command::SetBlendConstant(color) => pass.set_blend_constant(map_color(color)),
                Command::SetStencilReference(reference) => pass.set_stencil_reference(reference),
                Command::Draw {
                    vertex_count,
                    instance_count,
                    first_vertex,
                    first_instance,
                } => pass.draw(
                    first_vertex..first_vertex + vertex_count,
                    first_instance..first_instance + instance_count,
                ),
                Command::DrawIndexed {
                    index_count,
                    instance_count,
                    first_index,
                    base_vertex,
                    first_instance,
                } => pass.draw_indexed(
                    first_index..first_index + index_count,
                    base_vertex,
                    first_instance..first_instance + instance_count,
                ),
                Command::DrawIndirect { buffer, offset } => {
                    pass.draw_indirect(self.buffer(hub, buffer)?, offset);
                }
                Command::DrawIndexedIndirect { buffer, offset } => {
                    pass.draw_indexed_indirect(self.buffer(hub, buffer)?, offset);
                }
                Command::PushDebugGroup(ref label) => pass.push_debug_group(label),
                Command::PopDebugGroup => pass.pop_debug_group(),
                Command::InsertDebugMarker(ref label) => pass.insert_debug_marker(label),
                ref other => log::warn!("Ignoring {:?} inside render pass '{}'", other, desc.name),
            }
        }
        log::warn!("Render pass '{}' was not ended", desc.name);
        Ok(())
    }

    fn encode(
        &self,
        hub: &Hub,
        encoder: &mut wgpu::CommandEncoder,
        commands: &[Command],
    ) -> Result<(), GraphicsError> {
        let mut compute_pipeline = None;
        let mut compute_groups: Vec<(u32, BindGroupKey)> = Vec::new();
        let mut iter = commands.iter();
        while let Some(command) = iter.next() {
            match *command {
                Command::BeginRenderPass(ref desc) => {
                    self.encode_render_pass(hub, encoder, desc, &mut iter)?;
                }
                Command::SetComputePipeline(pipeline) => {
                    let raw = hub
                        .compute_pipelines
                        .get(pipeline.raw)
                        .ok_or_else(|| self.stale("compute pipeline"))?;
                    compute_pipeline = Some(raw);
                }
                Command::SetBindGroup { index, group } => {
                    compute_groups.retain(|&(i, _)| i != index);
                    compute_groups.push((index, group.raw));
                }
                Command::Dispatch { groups: [x, y, z] } => {
                    let Some(pipeline) = compute_pipeline else {
                        log::warn!("Dispatch without a compute pipeline");
                        continue;
                    };
                    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                        label: None,
                        timestamp_writes: None,
                    });
                    pass.set_pipeline(pipeline);
                    for &(index, group) in compute_groups.iter() {
                        pass.set_bind_group(index, self.bind_group(hub, group)?, &[]);
                    }
                    pass.dispatch_workgroups(x, y, z);
                }
                Command::CopyBufferToBuffer {
                    src,
                    src_offset,
                    dst,
                    dst_offset,
                    size,
                } => {
                    encoder.copy_buffer_to_buffer(
                        self.buffer(hub, src)?,
                        src_offset,
                        self.buffer(hub, dst)?,
                        dst_offset,
                        size,
                    );
                }
                Command::PushDebugGroup(ref label) => encoder.push_debug_group(label),
                Command::PopDebugGroup => encoder.pop_debug_group(),
                Command::InsertDebugMarker(ref label) => encoder.insert_debug_marker(label),
                ref other => log::warn!("Ignoring {:?} outside of a pass", other),
            }
        }
        Ok(())
    }
}

//=============================================================================
// CommandDevice Implementation
//=============================================================================

#[hidden_trait::expose]
impl crate::traits::CommandDevice for Context {
    fn submit(&self, queue: QueueType, commands: &[Command]) -> Result<(), GraphicsError> {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(&format!("{queue:?} submission")),
            });
        {
            let hub = self.hub.read().unwrap();
            self.encode(&hub, &mut encoder, commands)?;
        }
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn signal(&self, queue: QueueType, value: u64) {
        self.signaled[queue as usize].fetch_max(value, Ordering::AcqRel);
        let done = Arc::clone(&self.completed[queue as usize]);
        self.queue.on_submitted_work_done(move || {
            done.fetch_max(value, Ordering::AcqRel);
        });
    }

    fn completed_value(&self, queue: QueueType) -> u64 {
        if let Err(e) = self.device.poll(wgpu::PollType::Poll) {
            log::error!("Device poll: {}", e);
        }
        self.completed(queue)
    }

    fn wait(&self, queue: QueueType, value: u64) -> Result<(), GraphicsError> {
        if self.completed(queue) >= value {
            return Ok(());
        }
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| self.error(format!("device wait: {e}")))?;
        let completed = self.completed(queue);
        if completed < value {
            return Err(self.error(format!(
                "{:?} fence {:#x} was never signaled, completed {:#x}",
                queue, value, completed
            )));
        }
        Ok(())
    }
}
