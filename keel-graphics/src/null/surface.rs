//! Presentable surfaces for the Null backend

use super::resource::stale_handle;
use super::*;
use crate::traits::SurfaceConfig;
use crate::{GraphicsError, SurfaceHandle};

#[hidden_trait::expose]
impl crate::traits::SurfaceDevice for Context {
    fn create_surface(&self, handle: &SurfaceHandle) -> Result<SurfaceKey, GraphicsError> {
        let mut hub = self.hub.write().unwrap();
        Ok(hub.surfaces.insert(SurfaceEntry {
            kind: handle.kind,
            config: None,
            textures: Vec::new(),
            next_index: 0,
            acquired: None,
        }))
    }

    fn configure_surface(
        &self,
        surface: SurfaceKey,
        config: &SurfaceConfig,
    ) -> Result<Vec<TextureKey>, GraphicsError> {
        let mut guard = self.hub.write().unwrap();
        let hub = &mut *guard;
        let entry = hub
            .surfaces
            .get_mut(surface)
            .ok_or_else(|| stale_handle("surface"))?;
        for texture in entry.textures.drain(..) {
            hub.textures.remove(texture);
        }
        entry.next_index = 0;
        entry.acquired = None;
        if !config.size.is_empty() {
            entry.textures = (0..config.buffer_count)
                .map(|_| {
                    hub.textures.insert(TextureEntry {
                        data: None,
                        owner: Some(surface),
                    })
                })
                .collect();
        }
        log::debug!(
            "Configured {:?} surface: {} x{}",
            entry.kind,
            config.size,
            entry.textures.len()
        );
        entry.config = Some(*config);
        Ok(entry.textures.clone())
    }

    fn acquire_surface_texture(&self, surface: SurfaceKey) -> Result<Option<u32>, GraphicsError> {
        let mut hub = self.hub.write().unwrap();
        let entry = hub
            .surfaces
            .get_mut(surface)
            .ok_or_else(|| stale_handle("surface"))?;
        let count = match entry.config {
            Some(ref config) if !entry.textures.is_empty() => config.buffer_count,
            _ => return Ok(None),
        };
        let index = entry.next_index;
        entry.next_index = (index + 1) % count;
        entry.acquired = Some(index);
        Ok(Some(index))
    }

    fn present_surface(&self, surface: SurfaceKey) -> Result<(), GraphicsError> {
        let mut hub = self.hub.write().unwrap();
        let entry = hub
            .surfaces
            .get_mut(surface)
            .ok_or_else(|| stale_handle("surface"))?;
        if entry.acquired.take().is_none() {
            log::warn!("Presenting a {:?} surface without an acquired image", entry.kind);
        }
        self.stats.lock().unwrap().presents += 1;
        Ok(())
    }

    fn destroy_surface(&self, surface: SurfaceKey) {
        let mut hub = self.hub.write().unwrap();
        if let Some(entry) = hub.surfaces.remove(surface) {
            for texture in entry.textures {
                hub.textures.remove(texture);
            }
        }
    }
}
