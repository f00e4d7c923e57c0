//! Shader modules, bind groups and pipelines for the wgpu backend

use super::resource::{map_compare_function, require_texture_format};
use super::*;
use crate::{BindingType, GraphicsError, ShaderStage};
use std::num::NonZeroU64;

impl Context {
    /// Runs `f` inside a validation error scope, blocking on the result.
    fn with_error_scope<T, F: FnOnce() -> T>(&self, name: &str, f: F) -> Result<T, GraphicsError> {
        let scope = self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let result = f();
        match pollster::block_on(scope.pop()) {
            Some(e) => {
                log::error!("wgpu object '{}' validation error: {}", name, e);
                Err(self.error(format!("'{name}': {e}")))
            }
            None => Ok(result),
        }
    }

    fn shader_module<'h>(
        &self,
        hub: &'h Hub,
        module: crate::ShaderModule,
        expected: ShaderStage,
    ) -> Result<&'h ShaderModuleEntry, GraphicsError> {
        if module.stage != expected {
            return Err(crate::ConfigError::Pipeline("shader stage mismatch").into());
        }
        hub.shader_modules
            .get(module.raw)
            .ok_or_else(|| self.stale("shader module"))
    }
}

//=============================================================================
// Mapping
//=============================================================================

fn map_binding_type(ty: BindingType) -> Result<wgpu::BindingType, GraphicsError> {
    Ok(match ty {
        BindingType::ConstantBuffer => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        BindingType::StorageBuffer { read_only } => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        BindingType::SampledTexture => wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        BindingType::StorageTexture { format } => wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::ReadWrite,
            format: require_texture_format(format)?,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        BindingType::Sampler { comparison: true } => {
            wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison)
        }
        BindingType::Sampler { comparison: false } => {
            wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
        }
    })
}

fn map_shader_stages(stages: crate::ShaderStages) -> wgpu::ShaderStages {
    let mut raw = wgpu::ShaderStages::empty();
    if stages.contains(crate::ShaderStages::VERTEX) {
        raw |= wgpu::ShaderStages::VERTEX;
    }
    if stages.contains(crate::ShaderStages::FRAGMENT) {
        raw |= wgpu::ShaderStages::FRAGMENT;
    }
    if stages.contains(crate::ShaderStages::COMPUTE) {
        raw |= wgpu::ShaderStages::COMPUTE;
    }
    raw
}

fn map_primitive_topology(topology: crate::PrimitiveTopology) -> wgpu::PrimitiveTopology {
    match topology {
        crate::PrimitiveTopology::PointList => wgpu::PrimitiveTopology::PointList,
        crate::PrimitiveTopology::LineList => wgpu::PrimitiveTopology::LineList,
        crate::PrimitiveTopology::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        crate::PrimitiveTopology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
        crate::PrimitiveTopology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
    }
}

fn map_stencil_operation(op: crate::StencilOperation) -> wgpu::StencilOperation {
    match op {
        crate::StencilOperation::Keep => wgpu::StencilOperation::Keep,
        crate::StencilOperation::Zero => wgpu::StencilOperation::Zero,
        crate::StencilOperation::Replace => wgpu::StencilOperation::Replace,
        crate::StencilOperation::Invert => wgpu::StencilOperation::Invert,
        crate::StencilOperation::IncrementClamp => wgpu::StencilOperation::IncrementClamp,
        crate::StencilOperation::DecrementClamp => wgpu::StencilOperation::DecrementClamp,
        crate::StencilOperation::IncrementWrap => wgpu::StencilOperation::IncrementWrap,
        crate::StencilOperation::DecrementWrap => wgpu::StencilOperation::DecrementWrap,
    }
}

fn map_stencil_face_state(state: &crate::StencilFaceState) -> wgpu::StencilFaceState {
    wgpu::StencilFaceState {
        compare: map_compare_function(state.compare),
        fail_op: map_stencil_operation(state.fail_op),
        depth_fail_op: map_stencil_operation(state.depth_fail_op),
        pass_op: map_stencil_operation(state.pass_op),
    }
}

fn map_blend_factor(factor: crate::BlendFactor) -> wgpu::BlendFactor {
    match factor {
        crate::BlendFactor::Zero => wgpu::BlendFactor::Zero,
        crate::BlendFactor::One => wgpu::BlendFactor::One,
        crate::BlendFactor::Src => wgpu::BlendFactor::Src,
        crate::BlendFactor::OneMinusSrc => wgpu::BlendFactor::OneMinusSrc,
        crate::BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        crate::BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        crate::BlendFactor::Dst => wgpu::BlendFactor::Dst,
        crate::BlendFactor::OneMinusDst => wgpu::BlendFactor::OneMinusDst,
        crate::BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
        crate::BlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
        crate::BlendFactor::SrcAlphaSaturated => wgpu::BlendFactor::SrcAlphaSaturated,
        crate::BlendFactor::Constant => wgpu::BlendFactor::Constant,
        crate::BlendFactor::OneMinusConstant => wgpu::BlendFactor::OneMinusConstant,
    }
}

fn map_blend_operation(op: crate::BlendOperation) -> wgpu::BlendOperation {
    match op {
        crate::BlendOperation::Add => wgpu::BlendOperation::Add,
        crate::BlendOperation::Subtract => wgpu::BlendOperation::Subtract,
        crate::BlendOperation::ReverseSubtract => wgpu::BlendOperation::ReverseSubtract,
        crate::BlendOperation::Min => wgpu::BlendOperation::Min,
        crate::BlendOperation::Max => wgpu::BlendOperation::Max,
    }
}

fn map_blend_component(component: &crate::BlendComponent) -> wgpu::BlendComponent {
    wgpu::BlendComponent {
        src_factor: map_blend_factor(component.src_factor),
        dst_factor: map_blend_factor(component.dst_factor),
        operation: map_blend_operation(component.operation),
    }
}

fn map_vertex_format(format: crate::VertexFormat) -> wgpu::VertexFormat {
    match format {
        crate::VertexFormat::F32 => wgpu::VertexFormat::Float32,
        crate::VertexFormat::F32Vec2 => wgpu::VertexFormat::Float32x2,
        crate::VertexFormat::F32Vec3 => wgpu::VertexFormat::Float32x3,
        crate::VertexFormat::F32Vec4 => wgpu::VertexFormat::Float32x4,
        crate::VertexFormat::U32 => wgpu::VertexFormat::Uint32,
        crate::VertexFormat::U32Vec2 => wgpu::VertexFormat::Uint32x2,
        crate::VertexFormat::U32Vec3 => wgpu::VertexFormat::Uint32x3,
        crate::VertexFormat::U32Vec4 => wgpu::VertexFormat::Uint32x4,
        crate::VertexFormat::I32 => wgpu::VertexFormat::Sint32,
        crate::VertexFormat::I32Vec2 => wgpu::VertexFormat::Sint32x2,
        crate::VertexFormat::I32Vec3 => wgpu::VertexFormat::Sint32x3,
        crate::VertexFormat::I32Vec4 => wgpu::VertexFormat::Sint32x4,
        crate::VertexFormat::Unorm8x4 => wgpu::VertexFormat::Unorm8x4,
    }
}

fn map_depth_stencil(ds: &crate::DepthStencilState) -> Result<wgpu::DepthStencilState, GraphicsError> {
    Ok(wgpu::DepthStencilState {
        format: require_texture_format(ds.format)?,
        depth_write_enabled: ds.depth_write_enabled,
        depth_compare: map_compare_function(ds.depth_compare),
        stencil: wgpu::StencilState {
            front: map_stencil_face_state(&ds.stencil.front),
            back: map_stencil_face_state(&ds.stencil.back),
            read_mask: ds.stencil.read_mask,
            write_mask: ds.stencil.write_mask,
        },
        bias: wgpu::DepthBiasState {
            constant: ds.bias.constant,
            slope_scale: ds.bias.slope_scale,
            clamp: ds.bias.clamp,
        },
    })
}

//=============================================================================
// ShaderDevice Implementation
//=============================================================================

#[hidden_trait::expose]
impl crate::traits::ShaderDevice for Context {
    fn create_shader_module(
        &self,
        desc: &crate::ShaderModuleDesc,
    ) -> Result<ShaderModuleKey, GraphicsError> {
        let raw = self.with_error_scope(desc.name, || {
            self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: if desc.name.is_empty() {
                    None
                } else {
                    Some(desc.name)
                },
                source: wgpu::util::make_spirv(desc.bytecode),
            })
        })?;
        let mut hub = self.hub.write().unwrap();
        Ok(hub.shader_modules.insert(ShaderModuleEntry {
            raw,
            entry_point: desc.entry_point.to_string(),
        }))
    }

    fn destroy_shader_module(&self, module: ShaderModuleKey) {
        let mut hub = self.hub.write().unwrap();
        hub.shader_modules.remove(module);
    }

    fn create_bind_group_layout(
        &self,
        desc: &crate::BindGroupLayoutDesc,
    ) -> Result<BindGroupLayoutKey, GraphicsError> {
        let entries = desc
            .entries
            .iter()
            .map(|entry| {
                Ok(wgpu::BindGroupLayoutEntry {
                    binding: entry.binding,
                    visibility: map_shader_stages(entry.visibility),
                    ty: map_binding_type(entry.ty)?,
                    count: None,
                })
            })
            .collect::<Result<Vec<_>, GraphicsError>>()?;
        let raw = self.with_error_scope(&desc.name, || {
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(&desc.name),
                    entries: &entries,
                })
        })?;
        let mut hub = self.hub.write().unwrap();
        Ok(hub.bind_group_layouts.insert(BindGroupLayoutEntry {
            raw,
            entries: desc.entries.clone(),
        }))
    }

    fn destroy_bind_group_layout(&self, layout: BindGroupLayoutKey) {
        let mut hub = self.hub.write().unwrap();
        hub.bind_group_layouts.remove(layout);
    }

    fn create_bind_group(&self, desc: &crate::BindGroupDesc) -> Result<BindGroupKey, GraphicsError> {
        let raw = {
            let hub = self.hub.read().unwrap();
            let layout = hub
                .bind_group_layouts
                .get(desc.layout.raw)
                .ok_or_else(|| self.stale("bind group layout"))?;
            crate::binding::validate_bind_group(&layout.entries, desc.entries)?;

            let entries = desc
                .entries
                .iter()
                .map(|entry| {
                    let resource = match entry.resource {
                        crate::BindingResource::Buffer {
                            buffer,
                            offset,
                            size,
                        } => {
                            let gpu = &hub
                                .buffers
                                .get(buffer.raw)
                                .ok_or_else(|| self.stale("buffer"))?
                                .gpu;
                            wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                                buffer: gpu,
                                offset,
                                size: size.and_then(NonZeroU64::new),
                            })
                        }
                        crate::BindingResource::Texture(texture) => hub
                            .textures
                            .get(texture.raw)
                            .and_then(|entry| entry.view.as_ref())
                            .map(wgpu::BindingResource::TextureView)
                            .ok_or_else(|| self.stale("texture"))?,
                        crate::BindingResource::Sampler(sampler) => hub
                            .samplers
                            .get(sampler.raw)
                            .map(wgpu::BindingResource::Sampler)
                            .ok_or_else(|| self.stale("sampler"))?,
                    };
                    Ok(wgpu::BindGroupEntry {
                        binding: entry.binding,
                        resource,
                    })
                })
                .collect::<Result<Vec<_>, GraphicsError>>()?;

            self.with_error_scope(desc.name, || {
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(desc.name),
                    layout: &layout.raw,
                    entries: &entries,
                })
            })?
        };
        let mut hub = self.hub.write().unwrap();
        Ok(hub.bind_groups.insert(raw))
    }

    fn destroy_bind_group(&self, group: BindGroupKey) {
        let mut hub = self.hub.write().unwrap();
        hub.bind_groups.remove(group);
    }

    fn create_pipeline_layout(
        &self,
        desc: &crate::PipelineLayoutDesc,
    ) -> Result<PipelineLayoutKey, GraphicsError> {
        let raw = {
            let hub = self.hub.read().unwrap();
            let layouts = desc
                .bind_group_layouts
                .iter()
                .map(|layout| {
                    hub.bind_group_layouts
                        .get(layout.raw)
                        .map(|entry| &entry.raw)
                        .ok_or_else(|| self.stale("bind group layout"))
                })
                .collect::<Result<Vec<_>, _>>()?;
            self.device
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some(&desc.name),
                    bind_group_layouts: &layouts,
                    immediate_size: 0,
                })
        };
        let mut hub = self.hub.write().unwrap();
        Ok(hub.pipeline_layouts.insert(raw))
    }

    fn destroy_pipeline_layout(&self, layout: PipelineLayoutKey) {
        let mut hub = self.hub.write().unwrap();
        hub.pipeline_layouts.remove(layout);
    }

    fn create_render_pipeline(
        &self,
        desc: &crate::RenderPipelineDesc,
    ) -> Result<RenderPipelineKey, GraphicsError> {
        let attributes: Vec<Vec<wgpu::VertexAttribute>> = desc
            .vertex_buffers
            .iter()
            .map(|layout| {
                layout
                    .attributes
                    .iter()
                    .map(|attribute| wgpu::VertexAttribute {
                        format: map_vertex_format(attribute.format),
                        offset: attribute.offset as u64,
                        shader_location: attribute.location,
                    })
                    .collect()
            })
            .collect();
        let vertex_buffers: Vec<wgpu::VertexBufferLayout> = desc
            .vertex_buffers
            .iter()
            .zip(&attributes)
            .map(|(layout, attributes)| wgpu::VertexBufferLayout {
                array_stride: layout.stride as u64,
                step_mode: match layout.step_mode {
                    crate::VertexStepMode::Vertex => wgpu::VertexStepMode::Vertex,
                    crate::VertexStepMode::Instance => wgpu::VertexStepMode::Instance,
                },
                attributes,
            })
            .collect();
        let color_targets = desc
            .color_targets
            .iter()
            .map(|target| {
                Ok(Some(wgpu::ColorTargetState {
                    format: require_texture_format(target.format)?,
                    blend: target.blend.as_ref().map(|b| wgpu::BlendState {
                        color: map_blend_component(&b.color),
                        alpha: map_blend_component(&b.alpha),
                    }),
                    write_mask: wgpu::ColorWrites::from_bits_truncate(target.write_mask.bits()),
                }))
            })
            .collect::<Result<Vec<_>, GraphicsError>>()?;
        let depth_stencil = desc.depth_stencil.as_ref().map(map_depth_stencil).transpose()?;

        let raw = {
            let hub = self.hub.read().unwrap();
            let layout = hub
                .pipeline_layouts
                .get(desc.layout.raw)
                .ok_or_else(|| self.stale("pipeline layout"))?;
            let vertex = self.shader_module(&hub, desc.vertex, ShaderStage::Vertex)?;
            let fragment = desc
                .fragment
                .map(|module| self.shader_module(&hub, module, ShaderStage::Fragment))
                .transpose()?;

            self.with_error_scope(&desc.name, || {
                self.device
                    .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                        label: Some(&desc.name),
                        layout: Some(layout),
                        vertex: wgpu::VertexState {
                            module: &vertex.raw,
                            entry_point: Some(&vertex.entry_point),
                            compilation_options: Default::default(),
                            buffers: &vertex_buffers,
                        },
                        primitive: wgpu::PrimitiveState {
                            topology: map_primitive_topology(desc.primitive.topology),
                            strip_index_format: None,
                            front_face: match desc.primitive.front_face {
                                crate::FrontFace::Ccw => wgpu::FrontFace::Ccw,
                                crate::FrontFace::Cw => wgpu::FrontFace::Cw,
                            },
                            cull_mode: desc.primitive.cull_mode.map(|face| match face {
                                crate::Face::Front => wgpu::Face::Front,
                                crate::Face::Back => wgpu::Face::Back,
                            }),
                            unclipped_depth: false,
                            polygon_mode: if desc.primitive.wireframe {
                                wgpu::PolygonMode::Line
                            } else {
                                wgpu::PolygonMode::Fill
                            },
                            conservative: false,
                        },
                        depth_stencil,
                        multisample: wgpu::MultisampleState {
                            count: desc.sample_count.count(),
                            mask: !0,
                            alpha_to_coverage_enabled: false,
                        },
                        fragment: fragment.map(|fs| wgpu::FragmentState {
                            module: &fs.raw,
                            entry_point: Some(&fs.entry_point),
                            compilation_options: Default::default(),
                            targets: &color_targets,
                        }),
                        multiview_mask: None,
                        cache: None,
                    })
            })?
        };
        let mut hub = self.hub.write().unwrap();
        Ok(hub.render_pipelines.insert(raw))
    }

    fn destroy_render_pipeline(&self, pipeline: RenderPipelineKey) {
        let mut hub = self.hub.write().unwrap();
        hub.render_pipelines.remove(pipeline);
    }

    fn create_compute_pipeline(
        &self,
        desc: &crate::ComputePipelineDesc,
    ) -> Result<ComputePipelineKey, GraphicsError> {
        let raw = {
            let hub = self.hub.read().unwrap();
            let layout = hub
                .pipeline_layouts
                .get(desc.layout.raw)
                .ok_or_else(|| self.stale("pipeline layout"))?;
            let shader = self.shader_module(&hub, desc.compute, ShaderStage::Compute)?;
            self.with_error_scope(&desc.name, || {
                self.device
                    .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                        label: Some(&desc.name),
                        layout: Some(layout),
                        module: &shader.raw,
                        entry_point: Some(&shader.entry_point),
                        compilation_options: Default::default(),
                        cache: None,
                    })
            })?
        };
        let mut hub = self.hub.write().unwrap();
        Ok(hub.compute_pipelines.insert(raw))
    }

    fn destroy_compute_pipeline(&self, pipeline: ComputePipelineKey) {
        let mut hub = self.hub.write().unwrap();
        hub.compute_pipelines.remove(pipeline);
    }
}
