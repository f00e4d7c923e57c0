//! Presentable surfaces for the wgpu backend

use super::resource::require_texture_format;
use super::*;
use crate::traits::SurfaceConfig;
use crate::{GraphicsError, NotSupportedError, PresentMode, SurfaceHandle};
use raw_window_handle as rwh;

/// Borrowed native handles in the shape wgpu consumes.
struct RawTarget {
    window: rwh::RawWindowHandle,
    display: rwh::RawDisplayHandle,
}

impl rwh::HasWindowHandle for RawTarget {
    fn window_handle(&self) -> Result<rwh::WindowHandle<'_>, rwh::HandleError> {
        // SAFETY: the caller keeps the window alive for the surface lifetime.
        Ok(unsafe { rwh::WindowHandle::borrow_raw(self.window) })
    }
}

impl rwh::HasDisplayHandle for RawTarget {
    fn display_handle(&self) -> Result<rwh::DisplayHandle<'_>, rwh::HandleError> {
        // SAFETY: as above.
        Ok(unsafe { rwh::DisplayHandle::borrow_raw(self.display) })
    }
}

fn map_present_mode(mode: PresentMode) -> wgpu::PresentMode {
    match mode {
        PresentMode::Immediate => wgpu::PresentMode::Immediate,
        PresentMode::Fifo => wgpu::PresentMode::Fifo,
        PresentMode::Mailbox => wgpu::PresentMode::Mailbox,
    }
}

impl Context {
    fn acquire_texture(&self, entry: &SurfaceEntry) -> Result<Option<wgpu::SurfaceTexture>, GraphicsError> {
        let Some(ref config) = entry.config else {
            return Ok(None);
        };
        match entry.raw.get_current_texture() {
            Ok(texture) => Ok(Some(texture)),
            Err(wgpu::SurfaceError::Timeout) => {
                log::debug!("Surface acquire timed out");
                Ok(None)
            }
            Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                log::info!("Surface outdated, reconfiguring");
                entry.raw.configure(&self.device, config);
                entry
                    .raw
                    .get_current_texture()
                    .map(Some)
                    .map_err(|e| self.error(format!("surface acquire failed: {e}")))
            }
            Err(e) => Err(self.error(format!("surface acquire failed: {e}"))),
        }
    }
}

#[hidden_trait::expose]
impl crate::traits::SurfaceDevice for Context {
    fn create_surface(&self, handle: &SurfaceHandle) -> Result<SurfaceKey, GraphicsError> {
        let (window, display) = handle.raw.ok_or(NotSupportedError::WindowHandle)?;
        let target = RawTarget { window, display };
        // SAFETY: the window outlives the swap chain built on this surface.
        let raw = unsafe {
            let target = wgpu::SurfaceTargetUnsafe::from_window(&target)
                .map_err(|_| NotSupportedError::WindowHandle)?;
            self.instance.create_surface_unsafe(target)
        }
        .map_err(|e| {
            log::error!("Failed to create {:?} surface: {}", handle.kind, e);
            self.error(format!("surface creation failed: {e}"))
        })?;

        let mut hub = self.hub.write().unwrap();
        Ok(hub.surfaces.insert(SurfaceEntry {
            raw,
            config: None,
            textures: Vec::new(),
            next_index: 0,
            current: None,
        }))
    }

    fn configure_surface(
        &self,
        surface: SurfaceKey,
        config: &SurfaceConfig,
    ) -> Result<Vec<TextureKey>, GraphicsError> {
        let format = require_texture_format(config.format)?;
        let mut guard = self.hub.write().unwrap();
        let hub = &mut *guard;
        let entry = hub
            .surfaces
            .get_mut(surface)
            .ok_or_else(|| self.stale("surface"))?;
        for texture in entry.textures.drain(..) {
            hub.textures.remove(texture);
        }
        entry.next_index = 0;
        entry.current = None;
        if config.size.is_empty() {
            entry.config = None;
            return Ok(Vec::new());
        }

        let caps = entry.raw.get_capabilities(&self.adapter);
        if !caps.formats.contains(&format) {
            return Err(NotSupportedError::Format(config.format).into());
        }
        let mut present_mode = map_present_mode(config.present_mode);
        if !caps.present_modes.contains(&present_mode) {
            log::warn!("Present mode {:?} is not supported, using Fifo", present_mode);
            present_mode = wgpu::PresentMode::Fifo;
        }
        let raw_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: config.size.width,
            height: config.size.height,
            present_mode,
            desired_maximum_frame_latency: config.buffer_count.saturating_sub(1).max(1),
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: Vec::new(),
        };
        entry.raw.configure(&self.device, &raw_config);
        entry.config = Some(raw_config);

        entry.textures = (0..config.buffer_count)
            .map(|_| {
                hub.textures.insert(TextureEntry {
                    gpu: None,
                    view: None,
                    format: config.format,
                    owner: Some(surface),
                })
            })
            .collect();
        log::debug!(
            "Configured surface {}x{} {:?} with {} images",
            config.size.width,
            config.size.height,
            present_mode,
            entry.textures.len()
        );
        Ok(entry.textures.clone())
    }

    fn acquire_surface_texture(&self, surface: SurfaceKey) -> Result<Option<u32>, GraphicsError> {
        let mut guard = self.hub.write().unwrap();
        let hub = &mut *guard;
        let entry = hub
            .surfaces
            .get_mut(surface)
            .ok_or_else(|| self.stale("surface"))?;
        if entry.textures.is_empty() {
            return Ok(None);
        }
        if let Some((index, _)) = entry.current {
            return Ok(Some(index));
        }
        let Some(texture) = self.acquire_texture(entry)? else {
            return Ok(None);
        };

        let index = entry.next_index;
        entry.next_index = (index + 1) % entry.textures.len() as u32;
        if let Some(target) = hub.textures.get_mut(entry.textures[index as usize]) {
            target.view = Some(
                texture
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default()),
            );
        }
        entry.current = Some((index, texture));
        Ok(Some(index))
    }

    fn present_surface(&self, surface: SurfaceKey) -> Result<(), GraphicsError> {
        let mut guard = self.hub.write().unwrap();
        let hub = &mut *guard;
        let entry = hub
            .surfaces
            .get_mut(surface)
            .ok_or_else(|| self.stale("surface"))?;
        match entry.current.take() {
            Some((index, texture)) => {
                if let Some(target) = hub.textures.get_mut(entry.textures[index as usize]) {
                    target.view = None;
                }
                texture.present();
            }
            None => log::warn!("Presenting a surface without an acquired image"),
        }
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
