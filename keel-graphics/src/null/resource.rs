//! Resource storage for the Null backend

use super::*;
use crate::{Backend, GraphicsError};

pub(super) fn stale_handle(what: &str) -> GraphicsError {
    GraphicsError::native(Backend::Null, -1, format!("stale {what} handle"))
}

#[hidden_trait::expose]
impl crate::traits::ResourceDevice for Context {
    fn create_buffer(
        &self,
        desc: &crate::BufferDesc,
        contents: Option<&[u8]>,
    ) -> Result<BufferKey, GraphicsError> {
        let mut data = vec![0u8; desc.size as usize];
        if let Some(contents) = contents {
            data[..contents.len()].copy_from_slice(contents);
        }
        let mut hub = self.hub.write().unwrap();
        Ok(hub.buffers.insert(BufferEntry { data }))
    }

    fn destroy_buffer(&self, buffer: BufferKey) {
        let mut hub = self.hub.write().unwrap();
        if hub.buffers.remove(buffer).is_none() {
            log::warn!("Destroying a stale buffer handle");
        }
    }

    fn write_buffer(&self, buffer: BufferKey, offset: u64, data: &[u8]) {
        let mut hub = self.hub.write().unwrap();
        if let Some(entry) = hub.buffers.get_mut(buffer) {
            let start = offset as usize;
            entry.data[start..start + data.len()].copy_from_slice(data);
        }
    }

    fn read_buffer(&self, buffer: BufferKey, offset: u64, data: &mut [u8]) {
        let hub = self.hub.read().unwrap();
        if let Some(entry) = hub.buffers.get(buffer) {
            let start = offset as usize;
            data.copy_from_slice(&entry.data[start..start + data.len()]);
        }
    }

    fn create_texture(
        &self,
        desc: &crate::TextureDesc,
        _native_format: crate::NativeFormat,
        mip_level_count: u32,
        contents: Option<&[u8]>,
    ) -> Result<TextureKey, GraphicsError> {
        log::trace!(
            "Null texture '{}' {} with {} mips",
            desc.name,
            desc.size,
            mip_level_count
        );
        let data = contents.map(|bytes| bytes.to_vec().into_boxed_slice());
        let mut hub = self.hub.write().unwrap();
        Ok(hub.textures.insert(TextureEntry { data, owner: None }))
    }

    fn destroy_texture(&self, texture: TextureKey) {
        let mut hub = self.hub.write().unwrap();
        match hub.textures.remove(texture) {
            Some(_) => self.stats.lock().unwrap().destroyed_textures.push(texture),
            None => log::warn!("Destroying a stale texture handle"),
        }
    }

    fn create_sampler(&self, _desc: &crate::SamplerDesc) -> Result<SamplerKey, GraphicsError> {
        let mut hub = self.hub.write().unwrap();
        Ok(hub.samplers.insert(()))
    }

    fn destroy_sampler(&self, sampler: SamplerKey) {
        let mut hub = self.hub.write().unwrap();
        hub.samplers.remove(sampler);
    }
}
