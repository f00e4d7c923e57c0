//! Adapter discovery and device creation for the wgpu backend
//!
//! Native only: asynchronous wgpu calls are driven with pollster.

use super::*;
use crate::{
    AdapterKind, Backend, BackendDevice, DeviceDesc, Features, GraphicsAdapter, GraphicsError,
    Limits, ValidationMode,
};
use std::sync::Mutex;

//=============================================================================
// Platform Error
//=============================================================================

#[derive(Debug)]
pub struct PlatformError(pub String);

impl std::fmt::Display for PlatformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for PlatformError {}

impl PlatformError {
    fn into_graphics(self, backend: Backend) -> GraphicsError {
        GraphicsError::native(backend, -1, self.0)
    }
}

//=============================================================================
// Mapping
//=============================================================================

fn map_backend(backend: Backend) -> wgpu::Backends {
    match backend {
        Backend::D3D12 => wgpu::Backends::DX12,
        Backend::Vulkan => wgpu::Backends::VULKAN,
        Backend::Metal => wgpu::Backends::METAL,
        Backend::D3D11 | Backend::Null => wgpu::Backends::empty(),
    }
}

fn map_adapter_info(backend: Backend, info: &wgpu::AdapterInfo) -> GraphicsAdapter {
    GraphicsAdapter {
        backend,
        vendor_id: info.vendor,
        device_id: info.device,
        name: info.name.clone(),
        kind: match info.device_type {
            wgpu::DeviceType::DiscreteGpu => AdapterKind::Discrete,
            wgpu::DeviceType::IntegratedGpu => AdapterKind::Integrated,
            wgpu::DeviceType::Cpu => AdapterKind::Cpu,
            wgpu::DeviceType::VirtualGpu | wgpu::DeviceType::Other => AdapterKind::Unknown,
        },
        driver_description: format!("{} {}", info.driver, info.driver_info)
            .trim()
            .to_string(),
    }
}

const FEATURE_MAP: [(Features, wgpu::Features); 6] = [
    (Features::TEXTURE_COMPRESSION_BC, wgpu::Features::TEXTURE_COMPRESSION_BC),
    (Features::TEXTURE_COMPRESSION_ETC2, wgpu::Features::TEXTURE_COMPRESSION_ETC2),
    (Features::TEXTURE_COMPRESSION_ASTC, wgpu::Features::TEXTURE_COMPRESSION_ASTC),
    (Features::DEPTH32FLOAT_STENCIL8, wgpu::Features::DEPTH32FLOAT_STENCIL8),
    (Features::INDIRECT_FIRST_INSTANCE, wgpu::Features::INDIRECT_FIRST_INSTANCE),
    (Features::SHADER_FLOAT16, wgpu::Features::SHADER_F16),
];

fn map_caps(backend: Backend, device: &wgpu::Device) -> DeviceCaps {
    let wgpu_features = device.features();
    let mut features = FEATURE_MAP
        .iter()
        .filter(|(_, raw)| wgpu_features.contains(*raw))
        .fold(Features::empty(), |acc, (feature, _)| acc | *feature);
    if matches!(backend, Backend::D3D12 | Backend::Vulkan) {
        features |= Features::TEARING;
    }
    let l = device.limits();
    DeviceCaps {
        features,
        limits: Limits {
            max_texture_dimension_1d: l.max_texture_dimension_1d,
            max_texture_dimension_2d: l.max_texture_dimension_2d,
            max_texture_dimension_3d: l.max_texture_dimension_3d,
            max_texture_array_layers: l.max_texture_array_layers,
            max_buffer_size: l.max_buffer_size,
            max_color_attachments: l.max_color_attachments,
            max_bind_groups: l.max_bind_groups,
            max_vertex_buffers: l.max_vertex_buffers,
            min_uniform_buffer_offset_alignment: l.min_uniform_buffer_offset_alignment,
            // wgpu guarantees 1 and 4 samples
            sample_count_mask: 0b0101,
        },
    }
}

//=============================================================================
// Provider
//=============================================================================

/// Instance and physical adapters found with the current instance flags.
struct Discovery {
    instance: wgpu::Instance,
    adapters: Vec<wgpu::Adapter>,
}

/// Provider for one wgpu-hosted backend.
pub struct WgpuProvider {
    backend: Backend,
    flags: Mutex<wgpu::InstanceFlags>,
    discovery: Mutex<Option<Discovery>>,
}

impl WgpuProvider {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            flags: Mutex::new(wgpu::InstanceFlags::empty()),
            discovery: Mutex::new(None),
        }
    }

    fn discover(&self) -> Discovery {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: map_backend(self.backend),
            flags: *self.flags.lock().unwrap(),
            ..Default::default()
        });
        let adapters = pollster::block_on(instance.enumerate_adapters(map_backend(self.backend)));
        log::debug!("{} exposes {} adapter(s)", self.backend, adapters.len());
        Discovery { instance, adapters }
    }

    fn with_discovery<R>(&self, f: impl FnOnce(&mut Discovery) -> R) -> R {
        let mut discovery = self.discovery.lock().unwrap();
        f(discovery.get_or_insert_with(|| self.discover()))
    }

    fn request_device(
        &self,
        instance: wgpu::Instance,
        adapter: wgpu::Adapter,
        desc: &DeviceDesc,
    ) -> Result<Context, PlatformError> {
        let wanted = FEATURE_MAP
            .iter()
            .fold(wgpu::Features::empty(), |acc, (_, raw)| acc | *raw);
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: if desc.name.is_empty() {
                None
            } else {
                Some(desc.name)
            },
            required_features: adapter.features() & wanted,
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| PlatformError(format!("Device request failed: {}", e)))?;

        let backend = self.backend;
        device.set_device_lost_callback(move |reason, message| {
            log::error!("{} device lost: {:?} - {}", backend, reason, message);
        });
        device.on_uncaptured_error(Arc::new(move |error| {
            log::error!("{} uncaptured error: {}", backend, error);
        }));

        let caps = map_caps(self.backend, &device);
        Ok(Context {
            backend: self.backend,
            instance,
            adapter,
            device,
            queue,
            hub: RwLock::new(Hub::new()),
            caps,
            completed: QueueType::ALL.map(|ty| Arc::new(AtomicU64::new(ty.fence_base()))),
            signaled: QueueType::ALL.map(|ty| AtomicU64::new(ty.fence_base())),
        })
    }
}

impl crate::BackendProvider for WgpuProvider {
    fn backend(&self) -> Backend {
        self.backend
    }

    fn is_supported(&self) -> bool {
        let backends = map_backend(self.backend);
        !backends.is_empty() && wgpu::Instance::enabled_backend_features().contains(backends)
    }

    fn enable_validation(&self, mode: ValidationMode) -> Result<(), GraphicsError> {
        {
            let mut flags = self.flags.lock().unwrap();
            *flags = match mode {
                ValidationMode::Disabled => wgpu::InstanceFlags::empty(),
                ValidationMode::Enabled => {
                    wgpu::InstanceFlags::VALIDATION | wgpu::InstanceFlags::DEBUG
                }
                ValidationMode::Gpu => {
                    wgpu::InstanceFlags::VALIDATION
                        | wgpu::InstanceFlags::DEBUG
                        | wgpu::InstanceFlags::GPU_BASED_VALIDATION
                }
            };
            log::debug!("{} instance flags: {:?}", self.backend, *flags);
        }
        // Adapters found before belong to an instance without these flags.
        *self.discovery.lock().unwrap() = None;
        Ok(())
    }

    fn enumerate_adapters(&self) -> Result<Vec<GraphicsAdapter>, GraphicsError> {
        let discovery = self.discover();
        let adapters = discovery
            .adapters
            .iter()
            .map(|adapter| map_adapter_info(self.backend, &adapter.get_info()))
            .collect();
        *self.discovery.lock().unwrap() = Some(discovery);
        Ok(adapters)
    }

    fn honours_power_preference(&self) -> bool {
        true
    }

    fn software_fallback_adapter(&self) -> Option<GraphicsAdapter> {
        self.with_discovery(|discovery| {
            let known = discovery
                .adapters
                .iter()
                .find(|adapter| adapter.get_info().device_type == wgpu::DeviceType::Cpu)
                .cloned();
            let adapter = match known {
                Some(adapter) => adapter,
                None => {
                    let request = discovery.instance.request_adapter(&wgpu::RequestAdapterOptions {
                        power_preference: wgpu::PowerPreference::None,
                        compatible_surface: None,
                        force_fallback_adapter: true,
                    });
                    match pollster::block_on(request) {
                        Ok(adapter) => {
                            discovery.adapters.push(adapter.clone());
                            adapter
                        }
                        Err(e) => {
                            log::debug!("{} has no fallback adapter: {}", self.backend, e);
                            return None;
                        }
                    }
                }
            };
            Some(map_adapter_info(self.backend, &adapter.get_info()))
        })
    }

    fn create_device(
        &self,
        adapter: &GraphicsAdapter,
        desc: &DeviceDesc,
    ) -> Result<BackendDevice, GraphicsError> {
        let (instance, raw) = self
            .with_discovery(|discovery| {
                let raw = discovery
                    .adapters
                    .iter()
                    .find(|raw| map_adapter_info(self.backend, &raw.get_info()) == *adapter)
                    .cloned()?;
                Some((discovery.instance.clone(), raw))
            })
            .ok_or(crate::NotSupportedError::NoAdapter(self.backend))?;
        let context = self
            .request_device(instance, raw, desc)
            .map_err(|e| e.into_graphics(self.backend))?;
        Ok(BackendDevice::Wgpu(context))
    }
}
