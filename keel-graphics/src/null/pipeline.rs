//! Shader and pipeline objects for the Null backend

use super::resource::stale_handle;
use super::*;
use crate::{GraphicsError, ShaderStage};

fn check_stage(
    hub: &Hub,
    module: crate::ShaderModule,
    expected: ShaderStage,
) -> Result<(), GraphicsError> {
    let entry = hub
        .shader_modules
        .get(module.raw)
        .ok_or_else(|| stale_handle("shader module"))?;
    if entry.stage != expected {
        return Err(crate::ConfigError::Pipeline("shader stage mismatch").into());
    }
    Ok(())
}

#[hidden_trait::expose]
impl crate::traits::ShaderDevice for Context {
    fn create_shader_module(
        &self,
        desc: &crate::ShaderModuleDesc,
    ) -> Result<ShaderModuleKey, GraphicsError> {
        let mut hub = self.hub.write().unwrap();
        Ok(hub
            .shader_modules
            .insert(ShaderModuleEntry { stage: desc.stage }))
    }

    fn destroy_shader_module(&self, module: ShaderModuleKey) {
        let mut hub = self.hub.write().unwrap();
        hub.shader_modules.remove(module);
    }

    fn create_bind_group_layout(
        &self,
        desc: &crate::BindGroupLayoutDesc,
    ) -> Result<BindGroupLayoutKey, GraphicsError> {
        let mut hub = self.hub.write().unwrap();
        Ok(hub.bind_group_layouts.insert(BindGroupLayoutEntry {
            entries: desc.entries.clone(),
        }))
    }

    fn destroy_bind_group_layout(&self, layout: BindGroupLayoutKey) {
        let mut hub = self.hub.write().unwrap();
        hub.bind_group_layouts.remove(layout);
    }

    fn create_bind_group(&self, desc: &crate::BindGroupDesc) -> Result<BindGroupKey, GraphicsError> {
        let mut hub = self.hub.write().unwrap();
        let layout = hub
            .bind_group_layouts
            .get(desc.layout.raw)
            .ok_or_else(|| stale_handle("bind group layout"))?;
        crate::binding::validate_bind_group(&layout.entries, desc.entries)?;
        Ok(hub.bind_groups.insert(desc.layout.raw))
    }

    fn destroy_bind_group(&self, group: BindGroupKey) {
        let mut hub = self.hub.write().unwrap();
        hub.bind_groups.remove(group);
    }

    fn create_pipeline_layout(
        &self,
        desc: &crate::PipelineLayoutDesc,
    ) -> Result<PipelineLayoutKey, GraphicsError> {
        let mut hub = self.hub.write().unwrap();
        let bind_group_layouts = desc
            .bind_group_layouts
            .iter()
            .map(|layout| {
                if hub.bind_group_layouts.contains_key(layout.raw) {
                    Ok(layout.raw)
                } else {
                    Err(stale_handle("bind group layout"))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(hub
            .pipeline_layouts
            .insert(PipelineLayoutEntry { bind_group_layouts }))
    }

    fn destroy_pipeline_layout(&self, layout: PipelineLayoutKey) {
        let mut hub = self.hub.write().unwrap();
        hub.pipeline_layouts.remove(layout);
    }

    fn create_render_pipeline(
        &self,
        desc: &crate::RenderPipelineDesc,
    ) -> Result<RenderPipelineKey, GraphicsError> {
        let mut hub = self.hub.write().unwrap();
        let layout = hub
            .pipeline_layouts
            .get(desc.layout.raw)
            .ok_or_else(|| stale_handle("pipeline layout"))?;
        log::trace!(
            "Null render pipeline '{}' with {} bind groups",
            desc.name,
            layout.bind_group_layouts.len()
        );
        check_stage(&hub, desc.vertex, ShaderStage::Vertex)?;
        if let Some(fragment) = desc.fragment {
            check_stage(&hub, fragment, ShaderStage::Fragment)?;
        }
        Ok(hub.render_pipelines.insert(PipelineEntry {
            name: desc.name.clone(),
        }))
    }

    fn destroy_render_pipeline(&self, pipeline: RenderPipelineKey) {
        let mut hub = self.hub.write().unwrap();
        if let Some(entry) = hub.render_pipelines.remove(pipeline) {
            log::trace!("Destroyed render pipeline '{}'", entry.name);
        }
    }

    fn create_compute_pipeline(
        &self,
        desc: &crate::ComputePipelineDesc,
    ) -> Result<ComputePipelineKey, GraphicsError> {
        let mut hub = self.hub.write().unwrap();
        if !hub.pipeline_layouts.contains_key(desc.layout.raw) {
            return Err(stale_handle("pipeline layout"));
        }
        check_stage(&hub, desc.compute, ShaderStage::Compute)?;
        Ok(hub.compute_pipelines.insert(PipelineEntry {
            name: desc.name.clone(),
        }))
    }

    fn destroy_compute_pipeline(&self, pipeline: ComputePipelineKey) {
        let mut hub = self.hub.write().unwrap();
        if let Some(entry) = hub.compute_pipelines.remove(pipeline) {
            log::trace!("Destroyed compute pipeline '{}'", entry.name);
        }
    }
}
