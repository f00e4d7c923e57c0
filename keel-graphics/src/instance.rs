//! Backend registry and adapter selection.

use crate::*;

/// Entry point of one backend: capability probe, adapter enumeration and
/// device creation.
///
/// Providers are registered on a [`GraphicsInstance`], which lets tests
/// substitute mocks for real drivers.
pub trait BackendProvider: Send + Sync {
    fn backend(&self) -> Backend;
    /// Whether the runtime and driver for this backend are present.
    fn is_supported(&self) -> bool;
    /// Turns on the validation layer for devices created afterwards.
    fn enable_validation(&self, mode: ValidationMode) -> Result<(), GraphicsError>;
    fn enumerate_adapters(&self) -> Result<Vec<GraphicsAdapter>, GraphicsError>;
    /// Whether adapter order should follow [`PowerPreference`].
    fn honours_power_preference(&self) -> bool {
        false
    }
    /// Software rasterizer to retry with when device creation fails.
    fn software_fallback_adapter(&self) -> Option<GraphicsAdapter> {
        None
    }
    fn create_device(
        &self,
        adapter: &GraphicsAdapter,
        desc: &DeviceDesc,
    ) -> Result<BackendDevice, GraphicsError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceDesc {
    /// Order in which backends are tried when no backend is requested.
    pub backend_priority: Vec<Backend>,
}

impl Default for InstanceDesc {
    fn default() -> Self {
        Self {
            backend_priority: platform_backend_priority(),
        }
    }
}

/// Backends native to the target platform, most preferred first.
pub fn platform_backend_priority() -> Vec<Backend> {
    if cfg!(windows) {
        vec![Backend::D3D12, Backend::Vulkan, Backend::D3D11]
    } else if cfg!(any(target_os = "macos", target_os = "ios")) {
        vec![Backend::Metal, Backend::Vulkan]
    } else {
        vec![Backend::Vulkan]
    }
}

pub struct GraphicsInstance {
    desc: InstanceDesc,
    providers: Vec<Box<dyn BackendProvider>>,
}

impl GraphicsInstance {
    /// Registers the Null backend and every backend compiled in.
    pub fn new(desc: InstanceDesc) -> Self {
        #[allow(unused_mut)]
        let mut providers: Vec<Box<dyn BackendProvider>> =
            vec![Box::new(null::NullProvider::default())];
        #[cfg(feature = "wgpu")]
        for backend in [Backend::D3D12, Backend::Vulkan, Backend::Metal] {
            providers.push(Box::new(webgpu::WgpuProvider::new(backend)));
        }
        Self::with_providers(desc, providers)
    }

    pub fn with_providers(desc: InstanceDesc, providers: Vec<Box<dyn BackendProvider>>) -> Self {
        Self { desc, providers }
    }

    /// Adds a provider, replacing any previous one for the same backend.
    pub fn register(&mut self, provider: Box<dyn BackendProvider>) {
        let backend = provider.backend();
        self.providers.retain(|p| p.backend() != backend);
        self.providers.push(provider);
    }

    pub fn backend_priority(&self) -> &[Backend] {
        &self.desc.backend_priority
    }

    fn provider(&self, backend: Backend) -> Option<&dyn BackendProvider> {
        self.providers
            .iter()
            .find(|p| p.backend() == backend)
            .map(|p| p.as_ref())
    }

    pub fn is_backend_supported(&self, backend: Backend) -> bool {
        self.provider(backend).is_some_and(|p| p.is_supported())
    }

    pub fn enumerate_adapters(&self, backend: Backend) -> Result<Vec<GraphicsAdapter>, GraphicsError> {
        match self.provider(backend) {
            Some(provider) if provider.is_supported() => provider.enumerate_adapters(),
            _ => Err(NotSupportedError::Backend(backend).into()),
        }
    }

    /// Creates a device on the requested backend, or on the first backend of
    /// the priority list that works when none is requested.
    pub fn create_device(&self, desc: &DeviceDesc) -> Result<GraphicsDevice, GraphicsError> {
        if let Some(backend) = desc.preferred_backend {
            return self.create_device_on(backend, desc);
        }

        let mut candidates = self.desc.backend_priority.clone();
        if desc.allow_null_fallback && !candidates.contains(&Backend::Null) {
            candidates.push(Backend::Null);
        }
        let mut last_error = None;
        for backend in candidates {
            match self.create_device_on(backend, desc) {
                Ok(device) => return Ok(device),
                Err(e) => {
                    log::info!("Skipping {}: {}", backend, e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| NotSupportedError::PlatformNotSupported.into()))
    }

    fn create_device_on(&self, backend: Backend, desc: &DeviceDesc) -> Result<GraphicsDevice, GraphicsError> {
        let provider = match self.provider(backend) {
            Some(provider) if provider.is_supported() => provider,
            _ => return Err(NotSupportedError::Backend(backend).into()),
        };

        let validation_mode = match desc.validation_mode {
            ValidationMode::Disabled => ValidationMode::Disabled,
            mode => match provider.enable_validation(mode) {
                Ok(()) => mode,
                Err(e) => {
                    log::warn!("Unable to enable {} validation: {}", backend, e);
                    ValidationMode::Disabled
                }
            },
        };

        let adapters = adapter::order_adapters(
            provider.enumerate_adapters()?,
            desc.power_preference,
            provider.honours_power_preference(),
        );
        for adapter in adapters.iter() {
            log::debug!("Candidate adapter: {}", adapter);
        }
        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(NotSupportedError::NoAdapter(backend))?;

        let (adapter, hal) = match provider.create_device(&adapter, desc) {
            Ok(hal) => (adapter, hal),
            Err(e) => match provider.software_fallback_adapter() {
                Some(fallback) if cfg!(debug_assertions) => {
                    log::warn!(
                        "Device creation on {} failed ({}), retrying with {}",
                        adapter,
                        e,
                        fallback
                    );
                    let hal = provider.create_device(&fallback, desc)?;
                    (fallback, hal)
                }
                _ => return Err(e),
            },
        };

        log::info!("Selected {} adapter {}", backend, adapter);
        Ok(GraphicsDevice::new(
            backend,
            adapter,
            validation_mode,
            desc,
            hal,
        ))
    }
}

impl std::fmt::Debug for GraphicsInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backends: Vec<_> = self.providers.iter().map(|p| p.backend()).collect();
        f.debug_struct("GraphicsInstance")
            .field("backend_priority", &self.desc.backend_priority)
            .field("providers", &backends)
            .finish()
    }
}
