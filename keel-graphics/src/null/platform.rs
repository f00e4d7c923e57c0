//! Provider registration for the Null backend

use super::*;
use crate::{
    AdapterKind, Backend, BackendDevice, BackendProvider, DeviceDesc, Features, GraphicsAdapter,
    GraphicsError, ValidationMode,
};

/// Always-available provider exposing one CPU adapter.
#[derive(Clone, Debug)]
pub struct NullProvider {
    pub caps: DeviceCaps,
    pub stats: Option<SharedStats>,
}

impl Default for NullProvider {
    fn default() -> Self {
        Self {
            caps: DeviceCaps {
                features: Features::all(),
                ..Default::default()
            },
            stats: None,
        }
    }
}

impl NullProvider {
    pub fn adapter() -> GraphicsAdapter {
        GraphicsAdapter {
            backend: Backend::Null,
            vendor_id: 0,
            device_id: 0,
            name: "Null Device".to_string(),
            kind: AdapterKind::Cpu,
            driver_description: concat!("keel-graphics ", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl BackendProvider for NullProvider {
    fn backend(&self) -> Backend {
        Backend::Null
    }

    fn is_supported(&self) -> bool {
        true
    }

    fn enable_validation(&self, mode: ValidationMode) -> Result<(), GraphicsError> {
        log::debug!("Null backend validation {:?} is a no-op", mode);
        Ok(())
    }

    fn enumerate_adapters(&self) -> Result<Vec<GraphicsAdapter>, GraphicsError> {
        Ok(vec![Self::adapter()])
    }

    fn create_device(
        &self,
        _adapter: &GraphicsAdapter,
        _desc: &DeviceDesc,
    ) -> Result<BackendDevice, GraphicsError> {
        Ok(BackendDevice::Null(Context::new(&ContextDesc {
            caps: self.caps.clone(),
            stats: self.stats.clone(),
        })))
    }
}
