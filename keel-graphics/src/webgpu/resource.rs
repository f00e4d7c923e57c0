use super::*;
use crate::{format, GraphicsError, NotSupportedError, PixelFormat};
use std::sync::{Condvar, Mutex};

//=============================================================================
// Format and Sampler Mapping
//=============================================================================

/// `None` for formats wgpu has no storage for.
pub(super) fn map_texture_format(format: PixelFormat) -> Option<wgpu::TextureFormat> {
    use wgpu::TextureFormat as Tf;
    let astc = |channel| Tf::Astc {
        block: wgpu::AstcBlock::B4x4,
        channel,
    };
    Some(match format {
        PixelFormat::R8Unorm => Tf::R8Unorm,
        PixelFormat::R8Snorm => Tf::R8Snorm,
        PixelFormat::R8Uint => Tf::R8Uint,
        PixelFormat::R8Sint => Tf::R8Sint,
        PixelFormat::R16Unorm => Tf::R16Unorm,
        PixelFormat::R16Snorm => Tf::R16Snorm,
        PixelFormat::R16Uint => Tf::R16Uint,
        PixelFormat::R16Sint => Tf::R16Sint,
        PixelFormat::R16Float => Tf::R16Float,
        PixelFormat::Rg8Unorm => Tf::Rg8Unorm,
        PixelFormat::Rg8Snorm => Tf::Rg8Snorm,
        PixelFormat::Rg8Uint => Tf::Rg8Uint,
        PixelFormat::Rg8Sint => Tf::Rg8Sint,
        PixelFormat::Bgra4Unorm | PixelFormat::B5g6r5Unorm | PixelFormat::Bgr5a1Unorm => {
            return None
        }
        PixelFormat::R32Uint => Tf::R32Uint,
        PixelFormat::R32Sint => Tf::R32Sint,
        PixelFormat::R32Float => Tf::R32Float,
        PixelFormat::Rg16Unorm => Tf::Rg16Unorm,
        PixelFormat::Rg16Snorm => Tf::Rg16Snorm,
        PixelFormat::Rg16Uint => Tf::Rg16Uint,
        PixelFormat::Rg16Sint => Tf::Rg16Sint,
        PixelFormat::Rg16Float => Tf::Rg16Float,
        PixelFormat::Rgba8Unorm => Tf::Rgba8Unorm,
        PixelFormat::Rgba8UnormSrgb => Tf::Rgba8UnormSrgb,
        PixelFormat::Rgba8Snorm => Tf::Rgba8Snorm,
        PixelFormat::Rgba8Uint => Tf::Rgba8Uint,
        PixelFormat::Rgba8Sint => Tf::Rgba8Sint,
        PixelFormat::Bgra8Unorm => Tf::Bgra8Unorm,
        PixelFormat::Bgra8UnormSrgb => Tf::Bgra8UnormSrgb,
        PixelFormat::Rgb9e5Ufloat => Tf::Rgb9e5Ufloat,
        PixelFormat::Rgb10a2Unorm => Tf::Rgb10a2Unorm,
        PixelFormat::Rgb10a2Uint => Tf::Rgb10a2Uint,
        PixelFormat::Rg11b10Float => Tf::Rg11b10Ufloat,
        PixelFormat::Rg32Uint => Tf::Rg32Uint,
        PixelFormat::Rg32Sint => Tf::Rg32Sint,
        PixelFormat::Rg32Float => Tf::Rg32Float,
        PixelFormat::Rgba16Unorm => Tf::Rgba16Unorm,
        PixelFormat::Rgba16Snorm => Tf::Rgba16Snorm,
        PixelFormat::Rgba16Uint => Tf::Rgba16Uint,
        PixelFormat::Rgba16Sint => Tf::Rgba16Sint,
        PixelFormat::Rgba16Float => Tf::Rgba16Float,
        PixelFormat::Rgba32Uint => Tf::Rgba32Uint,
        PixelFormat::Rgba32Sint => Tf::Rgba32Sint,
        PixelFormat::Rgba32Float => Tf::Rgba32Float,
        PixelFormat::Stencil8 => Tf::Stencil8,
        PixelFormat::Depth16Unorm => Tf::Depth16Unorm,
        PixelFormat::Depth24UnormStencil8 => Tf::Depth24PlusStencil8,
        PixelFormat::Depth32Float => Tf::Depth32Float,
        PixelFormat::Depth32FloatStencil8 => Tf::Depth32FloatStencil8,
        PixelFormat::Bc1RgbaUnorm => Tf::Bc1RgbaUnorm,
        PixelFormat::Bc1RgbaUnormSrgb => Tf::Bc1RgbaUnormSrgb,
        PixelFormat::Bc2RgbaUnorm => Tf::Bc2RgbaUnorm,
        PixelFormat::Bc2RgbaUnormSrgb => Tf::Bc2RgbaUnormSrgb,
        PixelFormat::Bc3RgbaUnorm => Tf::Bc3RgbaUnorm,
        PixelFormat::Bc3RgbaUnormSrgb => Tf::Bc3RgbaUnormSrgb,
        PixelFormat::Bc4RUnorm => Tf::Bc4RUnorm,
        PixelFormat::Bc4RSnorm => Tf::Bc4RSnorm,
        PixelFormat::Bc5RgUnorm => Tf::Bc5RgUnorm,
        PixelFormat::Bc5RgSnorm => Tf::Bc5RgSnorm,
        PixelFormat::Bc6hRgbUfloat => Tf::Bc6hRgbUfloat,
        PixelFormat::Bc6hRgbFloat => Tf::Bc6hRgbFloat,
        PixelFormat::Bc7RgbaUnorm => Tf::Bc7RgbaUnorm,
        PixelFormat::Bc7RgbaUnormSrgb => Tf::Bc7RgbaUnormSrgb,
        PixelFormat::Etc2Rgb8Unorm => Tf::Etc2Rgb8Unorm,
        PixelFormat::Etc2Rgb8UnormSrgb => Tf::Etc2Rgb8UnormSrgb,
        PixelFormat::Etc2Rgb8A1Unorm => Tf::Etc2Rgb8A1Unorm,
        PixelFormat::Etc2Rgb8A1UnormSrgb => Tf::Etc2Rgb8A1UnormSrgb,
        PixelFormat::Etc2Rgba8Unorm => Tf::Etc2Rgba8Unorm,
        PixelFormat::Etc2Rgba8UnormSrgb => Tf::Etc2Rgba8UnormSrgb,
        PixelFormat::EacR11Unorm => Tf::EacR11Unorm,
        PixelFormat::EacR11Snorm => Tf::EacR11Snorm,
        PixelFormat::EacRg11Unorm => Tf::EacRg11Unorm,
        PixelFormat::EacRg11Snorm => Tf::EacRg11Snorm,
        PixelFormat::Astc4x4Unorm => astc(wgpu::AstcChannel::Unorm),
        PixelFormat::Astc4x4UnormSrgb => astc(wgpu::AstcChannel::UnormSrgb),
    })
}

pub(super) fn require_texture_format(format: PixelFormat) -> Result<wgpu::TextureFormat, GraphicsError> {
    map_texture_format(format).ok_or_else(|| NotSupportedError::Format(format).into())
}

fn map_texture_dimension(dim: crate::TextureDimension) -> wgpu::TextureDimension {
    match dim {
        crate::TextureDimension::D1 => wgpu::TextureDimension::D1,
        crate::TextureDimension::D2 => wgpu::TextureDimension::D2,
        crate::TextureDimension::D3 => wgpu::TextureDimension::D3,
    }
}

fn map_view_dimension(desc: &crate::TextureDesc) -> wgpu::TextureViewDimension {
    let layers = desc.size.depth_or_array_layers;
    match desc.dimension {
        crate::TextureDimension::D1 => wgpu::TextureViewDimension::D1,
        crate::TextureDimension::D3 => wgpu::TextureViewDimension::D3,
        crate::TextureDimension::D2 if desc.cube_compatible && layers == 6 => {
            wgpu::TextureViewDimension::Cube
        }
        crate::TextureDimension::D2 if desc.cube_compatible && layers % 6 == 0 => {
            wgpu::TextureViewDimension::CubeArray
        }
        crate::TextureDimension::D2 if layers > 1 => wgpu::TextureViewDimension::D2Array,
        crate::TextureDimension::D2 => wgpu::TextureViewDimension::D2,
    }
}

fn map_texture_usage(usage: crate::TextureUsage) -> wgpu::TextureUsages {
    let mut raw = wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::COPY_DST;
    if usage.contains(crate::TextureUsage::SHADER_READ) {
        raw |= wgpu::TextureUsages::TEXTURE_BINDING;
    }
    if usage.contains(crate::TextureUsage::SHADER_WRITE) {
        raw |= wgpu::TextureUsages::STORAGE_BINDING;
    }
    if usage.contains(crate::TextureUsage::RENDER_TARGET) {
        raw |= wgpu::TextureUsages::RENDER_ATTACHMENT;
    }
    raw
}

fn map_buffer_usage(usage: crate::BufferUsage, memory: Memory) -> wgpu::BufferUsages {
    if memory == Memory::Readback {
        return wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST;
    }
    let mut raw = wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST;
    if usage.contains(crate::BufferUsage::VERTEX) {
        raw |= wgpu::BufferUsages::VERTEX;
    }
    if usage.contains(crate::BufferUsage::INDEX) {
        raw |= wgpu::BufferUsages::INDEX;
    }
    if usage.contains(crate::BufferUsage::CONSTANT) {
        raw |= wgpu::BufferUsages::UNIFORM;
    }
    if usage.intersects(crate::BufferUsage::SHADER_READ | crate::BufferUsage::SHADER_WRITE) {
        raw |= wgpu::BufferUsages::STORAGE;
    }
    if usage.contains(crate::BufferUsage::INDIRECT) {
        raw |= wgpu::BufferUsages::INDIRECT;
    }
    raw
}

fn map_address_mode(mode: crate::AddressMode) -> wgpu::AddressMode {
    match mode {
        crate::AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        crate::AddressMode::Repeat => wgpu::AddressMode::Repeat,
        crate::AddressMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
        crate::AddressMode::ClampToBorder => wgpu::AddressMode::ClampToBorder,
    }
}

fn map_filter_mode(mode: crate::FilterMode) -> wgpu::FilterMode {
    match mode {
        crate::FilterMode::Nearest => wgpu::FilterMode::Nearest,
        crate::FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

fn map_mipmap_filter_mode(mode: crate::FilterMode) -> wgpu::MipmapFilterMode {
    match mode {
        crate::FilterMode::Nearest => wgpu::MipmapFilterMode::Nearest,
        crate::FilterMode::Linear => wgpu::MipmapFilterMode::Linear,
    }
}

pub(super) fn map_compare_function(func: crate::CompareFunction) -> wgpu::CompareFunction {
    match func {
        crate::CompareFunction::Never => wgpu::CompareFunction::Never,
        crate::CompareFunction::Less => wgpu::CompareFunction::Less,
        crate::CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
        crate::CompareFunction::Equal => wgpu::CompareFunction::Equal,
        crate::CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        crate::CompareFunction::Greater => wgpu::CompareFunction::Greater,
        crate::CompareFunction::NotEqual => wgpu::CompareFunction::NotEqual,
        crate::CompareFunction::Always => wgpu::CompareFunction::Always,
    }
}

fn label(name: &str) -> Option<&str> {
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

//=============================================================================
// Buffer Helpers
//=============================================================================

fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

impl Context {
    /// Pushes a range of an upload buffer's shadow copy to the GPU.
    fn flush_shadow(&self, entry: &BufferEntry, offset: u64, len: u64) {
        let Some(ref shadow) = entry.shadow else {
            return;
        };
        let align = wgpu::COPY_BUFFER_ALIGNMENT;
        let start = offset / align * align;
        let end = align_up(offset + len, align).min(shadow.len() as u64);
        if end > start {
            self.queue
                .write_buffer(&entry.gpu, start, &shadow[start as usize..end as usize]);
        }
    }

    /// Maps a readback buffer and copies out `data.len()` bytes at `offset`.
    fn map_and_read(&self, gpu: &wgpu::Buffer, offset: u64, data: &mut [u8]) -> Result<(), GraphicsError> {
        let state = Arc::new((Mutex::new(None), Condvar::new()));
        let signal = Arc::clone(&state);
        let slice = gpu.slice(..);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let (lock, condvar) = &*signal;
            *lock.lock().unwrap() = Some(result);
            condvar.notify_all();
        });
        let _ = self.device.poll(wgpu::PollType::wait_indefinitely());

        let (lock, condvar) = &*state;
        let mut result = lock.lock().unwrap();
        while result.is_none() {
            result = condvar.wait(result).unwrap();
        }
        result
            .take()
            .unwrap_or(Err(wgpu::BufferAsyncError))
            .map_err(|e| self.error(format!("buffer map failed: {e}")))?;
        drop(result);

        {
            let mapped = slice.get_mapped_range();
            let start = offset as usize;
            data.copy_from_slice(&mapped[start..start + data.len()]);
        }
        gpu.unmap();
        Ok(())
    }
}

//=============================================================================
// ResourceDevice Implementation
//=============================================================================

#[hidden_trait::expose]
impl crate::traits::ResourceDevice for Context {
    fn create_buffer(
        &self,
        desc: &crate::BufferDesc,
        contents: Option<&[u8]>,
    ) -> Result<BufferKey, GraphicsError> {
        let size = align_up(desc.size, wgpu::COPY_BUFFER_ALIGNMENT);
        let gpu = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: label(desc.name),
            size,
            usage: map_buffer_usage(desc.usage, desc.memory),
            mapped_at_creation: false,
        });

        let mut shadow = match desc.memory {
            Memory::Upload => Some(vec![0u8; size as usize].into_boxed_slice()),
            Memory::Private | Memory::Readback => None,
        };
        if let Some(contents) = contents {
            match shadow {
                Some(ref mut shadow) => shadow[..contents.len()].copy_from_slice(contents),
                None if desc.memory == Memory::Readback => {
                    log::warn!("Initial contents of readback buffer '{}' are ignored", desc.name);
                }
                None => {
                    let mut padded = contents.to_vec();
                    padded.resize(align_up(contents.len() as u64, 4) as usize, 0);
                    self.queue.write_buffer(&gpu, 0, &padded);
                }
            }
        }

        let entry = BufferEntry {
            gpu,
            memory: desc.memory,
            shadow,
        };
        if contents.is_some() {
            self.flush_shadow(&entry, 0, size);
        }
        let mut hub = self.hub.write().unwrap();
        Ok(hub.buffers.insert(entry))
    }

    fn destroy_buffer(&self, buffer: BufferKey) {
        let mut hub = self.hub.write().unwrap();
        match hub.buffers.remove(buffer) {
            Some(entry) => entry.gpu.destroy(),
            None => log::warn!("Destroying a stale buffer handle"),
        }
    }

    fn write_buffer(&self, buffer: BufferKey, offset: u64, data: &[u8]) {
        let mut hub = self.hub.write().unwrap();
        let Some(entry) = hub.buffers.get_mut(buffer) else {
            return;
        };
        if let Some(ref mut shadow) = entry.shadow {
            let start = offset as usize;
            shadow[start..start + data.len()].copy_from_slice(data);
        }
        self.flush_shadow(entry, offset, data.len() as u64);
    }

    fn read_buffer(&self, buffer: BufferKey, offset: u64, data: &mut [u8]) {
        let hub = self.hub.read().unwrap();
        let Some(entry) = hub.buffers.get(buffer) else {
            return;
        };
        if entry.memory != Memory::Readback {
            log::error!("Reading back a {:?} buffer", entry.memory);
            return;
        }
        if let Err(e) = self.map_and_read(&entry.gpu, offset, data) {
            log::error!("Buffer readback: {}", e);
        }
    }

    fn create_texture(
        &self,
        desc: &crate::TextureDesc,
        _native_format: crate::NativeFormat,
        mip_level_count: u32,
        contents: Option<&[u8]>,
    ) -> Result<TextureKey, GraphicsError> {
        let format = require_texture_format(desc.format)?;
        let size = wgpu::Extent3d {
            width: desc.size.width,
            height: desc.size.height,
            depth_or_array_layers: desc.size.depth_or_array_layers,
        };
        let gpu = self.device.create_texture(&wgpu::TextureDescriptor {
            label: label(desc.name),
            size,
            mip_level_count,
            sample_count: desc.sample_count.count(),
            dimension: map_texture_dimension(desc.dimension),
            format,
            usage: map_texture_usage(desc.usage),
            view_formats: &[],
        });

        if let Some(contents) = contents {
            let info = desc.format.info();
            let surface = format::surface_info(desc.format, desc.size.width, desc.size.height);
            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &gpu,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                contents,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(surface.row_pitch as u32),
                    rows_per_image: Some(surface.height_count),
                },
                wgpu::Extent3d {
                    width: surface.width_count * info.block_width,
                    height: surface.height_count * info.block_height,
                    ..size
                },
            );
        }

        let view = gpu.create_view(&wgpu::TextureViewDescriptor {
            label: label(desc.name),
            format: Some(format),
            dimension: Some(map_view_dimension(desc)),
            usage: None,
            aspect: wgpu::TextureAspect::All,
            base_mip_level: 0,
            mip_level_count: None,
            base_array_layer: 0,
            array_layer_count: None,
        });

        let mut hub = self.hub.write().unwrap();
        Ok(hub.textures.insert(TextureEntry {
            gpu: Some(gpu),
            view: Some(view),
            format: desc.format,
            owner: None,
        }))
    }

    fn destroy_texture(&self, texture: TextureKey) {
        let mut hub = self.hub.write().unwrap();
        match hub.textures.remove(texture) {
            Some(TextureEntry { gpu: Some(gpu), .. }) => gpu.destroy(),
            Some(_) => {}
            None => log::warn!("Destroying a stale texture handle"),
        }
    }

    fn create_sampler(&self, desc: &crate::SamplerDesc) -> Result<SamplerKey, GraphicsError> {
        let border_color = desc.border_color.map(|color| match color {
            crate::BorderColor::TransparentBlack => wgpu::SamplerBorderColor::TransparentBlack,
            crate::BorderColor::OpaqueBlack => wgpu::SamplerBorderColor::OpaqueBlack,
            crate::BorderColor::OpaqueWhite => wgpu::SamplerBorderColor::OpaqueWhite,
        });

        let raw = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: label(desc.name),
            address_mode_u: map_address_mode(desc.address_modes[0]),
            address_mode_v: map_address_mode(desc.address_modes[1]),
            address_mode_w: map_address_mode(desc.address_modes[2]),
            mag_filter: map_filter_mode(desc.mag_filter),
            min_filter: map_filter_mode(desc.min_filter),
            mipmap_filter: map_mipmap_filter_mode(desc.mipmap_filter),
            lod_min_clamp: desc.lod_min_clamp,
            lod_max_clamp: desc.lod_max_clamp.unwrap_or(32.0),
            compare: desc.compare.map(map_compare_function),
            anisotropy_clamp: desc.max_anisotropy,
            border_color,
        });

        let mut hub = self.hub.write().unwrap();
        Ok(hub.samplers.insert(raw))
    }

    fn destroy_sampler(&self, sampler: SamplerKey) {
        let mut hub = self.hub.write().unwrap();
        hub.samplers.remove(sampler);
    }
}
