//! Backend and adapter selection through mock providers
//!
//! Mock providers hand out Null contexts so selection can be observed
//! without a GPU.

use keel_graphics::{
    null, AdapterKind, Backend, BackendDevice, BackendProvider, DeviceDesc, GraphicsAdapter,
    GraphicsError, GraphicsInstance, InstanceDesc, NotSupportedError, PowerPreference,
    ValidationMode,
};
use std::sync::{Arc, Mutex};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn adapter(backend: Backend, name: &str, kind: AdapterKind) -> GraphicsAdapter {
    GraphicsAdapter {
        backend,
        vendor_id: 0x10de,
        device_id: 1,
        name: name.to_string(),
        kind,
        driver_description: String::new(),
    }
}

/// Records every adapter a device was requested on.
type Attempts = Arc<Mutex<Vec<String>>>;

struct MockProvider {
    backend: Backend,
    supported: bool,
    adapters: Vec<GraphicsAdapter>,
    honours_power_preference: bool,
    /// Hardware adapters fail device creation.
    broken_hardware: bool,
    software: Option<GraphicsAdapter>,
    validation_fails: bool,
    attempts: Attempts,
}

impl MockProvider {
    fn new(backend: Backend, adapters: Vec<GraphicsAdapter>) -> Self {
        Self {
            backend,
            supported: true,
            adapters,
            honours_power_preference: true,
            broken_hardware: false,
            software: None,
            validation_fails: false,
            attempts: Attempts::default(),
        }
    }
}

impl BackendProvider for MockProvider {
    fn backend(&self) -> Backend {
        self.backend
    }

    fn is_supported(&self) -> bool {
        self.supported
    }

    fn enable_validation(&self, _mode: ValidationMode) -> Result<(), GraphicsError> {
        if self.validation_fails {
            Err(GraphicsError::native(self.backend, -1, "layer missing"))
        } else {
            Ok(())
        }
    }

    fn enumerate_adapters(&self) -> Result<Vec<GraphicsAdapter>, GraphicsError> {
        Ok(self.adapters.clone())
    }

    fn honours_power_preference(&self) -> bool {
        self.honours_power_preference
    }

    fn software_fallback_adapter(&self) -> Option<GraphicsAdapter> {
        self.software.clone()
    }

    fn create_device(
        &self,
        adapter: &GraphicsAdapter,
        _desc: &DeviceDesc,
    ) -> Result<BackendDevice, GraphicsError> {
        self.attempts.lock().unwrap().push(adapter.name.clone());
        if self.broken_hardware && !adapter.is_software() {
            return Err(GraphicsError::native(self.backend, 0x887a0005, "device removed"));
        }
        Ok(BackendDevice::Null(null::Context::new(&null::ContextDesc::default())))
    }
}

fn instance(priority: &[Backend], providers: Vec<MockProvider>) -> GraphicsInstance {
    GraphicsInstance::with_providers(
        InstanceDesc {
            backend_priority: priority.to_vec(),
        },
        providers
            .into_iter()
            .map(|p| Box::new(p) as Box<dyn BackendProvider>)
            .collect(),
    )
}

/// An explicitly requested backend is never substituted
#[test]
fn explicit_backend_is_not_substituted() {
    init_logger();
    let mut d3d12 = MockProvider::new(Backend::D3D12, Vec::new());
    d3d12.supported = false;
    let vulkan = MockProvider::new(
        Backend::Vulkan,
        vec![adapter(Backend::Vulkan, "gpu", AdapterKind::Discrete)],
    );
    let instance = instance(&[Backend::D3D12, Backend::Vulkan], vec![d3d12, vulkan]);

    let result = instance.create_device(&DeviceDesc {
        preferred_backend: Some(Backend::D3D12),
        allow_null_fallback: true,
        ..Default::default()
    });
    assert_eq!(
        result.err(),
        Some(GraphicsError::NotSupported(NotSupportedError::Backend(Backend::D3D12)))
    );
}

/// Without a preference the first working backend of the priority list wins
#[test]
fn priority_list_skips_unsupported_backends() {
    init_logger();
    let mut d3d12 = MockProvider::new(Backend::D3D12, Vec::new());
    d3d12.supported = false;
    let vulkan = MockProvider::new(
        Backend::Vulkan,
        vec![adapter(Backend::Vulkan, "gpu", AdapterKind::Discrete)],
    );
    let instance = instance(&[Backend::D3D12, Backend::Vulkan], vec![d3d12, vulkan]);

    let device = instance
        .create_device(&DeviceDesc::default())
        .expect("Vulkan device");
    assert_eq!(device.backend(), Backend::Vulkan);
    assert_eq!(device.adapter().name, "gpu");
}

/// A backend without adapters falls through to the next one
#[test]
fn backend_without_adapters_is_skipped() {
    init_logger();
    let d3d12 = MockProvider::new(Backend::D3D12, Vec::new());
    let vulkan = MockProvider::new(
        Backend::Vulkan,
        vec![adapter(Backend::Vulkan, "gpu", AdapterKind::Integrated)],
    );
    let instance = instance(&[Backend::D3D12, Backend::Vulkan], vec![d3d12, vulkan]);
    let device = instance.create_device(&DeviceDesc::default()).unwrap();
    assert_eq!(device.backend(), Backend::Vulkan);
}

/// Null is only used when the caller opts in
#[test]
fn null_fallback_is_opt_in() {
    init_logger();
    let mut vulkan = MockProvider::new(Backend::Vulkan, Vec::new());
    vulkan.supported = false;
    let mut instance = instance(&[Backend::Vulkan], vec![vulkan]);
    instance.register(Box::new(null::NullProvider::default()));

    let err = instance.create_device(&DeviceDesc::default()).unwrap_err();
    assert_eq!(
        err,
        GraphicsError::NotSupported(NotSupportedError::Backend(Backend::Vulkan))
    );

    let device = instance
        .create_device(&DeviceDesc {
            allow_null_fallback: true,
            ..Default::default()
        })
        .expect("Null fallback");
    assert_eq!(device.backend(), Backend::Null);
    assert_eq!(device.adapter().kind, AdapterKind::Cpu);
}

/// An empty priority list reports the platform as unsupported
#[test]
fn empty_priority_list() {
    init_logger();
    let instance = instance(&[], Vec::new());
    assert_eq!(
        instance.create_device(&DeviceDesc::default()).unwrap_err(),
        GraphicsError::NotSupported(NotSupportedError::PlatformNotSupported)
    );
}

/// Software adapters are skipped while hardware exists
#[test]
fn software_adapters_are_filtered() {
    init_logger();
    let provider = MockProvider::new(
        Backend::D3D12,
        vec![
            adapter(Backend::D3D12, "warp", AdapterKind::Cpu),
            adapter(Backend::D3D12, "igpu", AdapterKind::Integrated),
        ],
    );
    let attempts = Arc::clone(&provider.attempts);
    let instance = instance(&[Backend::D3D12], vec![provider]);
    let device = instance.create_device(&DeviceDesc::default()).unwrap();
    assert_eq!(device.adapter().name, "igpu");
    assert_eq!(*attempts.lock().unwrap(), vec!["igpu".to_string()]);
}

/// Power preference orders adapters only where the backend honours it
#[test]
fn power_preference_selects_adapter() {
    init_logger();
    let adapters = vec![
        adapter(Backend::Vulkan, "igpu", AdapterKind::Integrated),
        adapter(Backend::Vulkan, "dgpu", AdapterKind::Discrete),
    ];
    let instance_for = |honours| {
        let mut provider = MockProvider::new(Backend::Vulkan, adapters.clone());
        provider.honours_power_preference = honours;
        instance(&[Backend::Vulkan], vec![provider])
    };

    let high = instance_for(true)
        .create_device(&DeviceDesc {
            power_preference: PowerPreference::HighPerformance,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(high.adapter().name, "dgpu");

    let low = instance_for(true)
        .create_device(&DeviceDesc {
            power_preference: PowerPreference::LowPower,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(low.adapter().name, "igpu");

    let enumeration_order = instance_for(false)
        .create_device(&DeviceDesc::default())
        .unwrap();
    assert_eq!(enumeration_order.adapter().name, "igpu");
}

/// Debug builds retry on the software adapter when hardware creation fails
#[test]
fn software_fallback_after_failure() {
    init_logger();
    let mut provider = MockProvider::new(
        Backend::D3D12,
        vec![adapter(Backend::D3D12, "dgpu", AdapterKind::Discrete)],
    );
    provider.broken_hardware = true;
    provider.software = Some(adapter(Backend::D3D12, "warp", AdapterKind::Cpu));
    let attempts = Arc::clone(&provider.attempts);
    let instance = instance(&[Backend::D3D12], vec![provider]);

    let result = instance.create_device(&DeviceDesc::default());
    if cfg!(debug_assertions) {
        let device = result.expect("software device");
        assert!(device.adapter().is_software());
        assert_eq!(
            *attempts.lock().unwrap(),
            vec!["dgpu".to_string(), "warp".to_string()]
        );
    } else {
        assert!(matches!(result, Err(GraphicsError::Native { .. })));
    }
}

/// A validation layer that cannot be loaded leaves validation off
#[test]
fn validation_failure_is_not_fatal() {
    init_logger();
    let mut provider = MockProvider::new(
        Backend::Vulkan,
        vec![adapter(Backend::Vulkan, "gpu", AdapterKind::Discrete)],
    );
    provider.validation_fails = true;
    let instance = instance(&[Backend::Vulkan], vec![provider]);
    let device = instance
        .create_device(&DeviceDesc {
            validation_mode: ValidationMode::Enabled,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(device.validation_mode(), ValidationMode::Disabled);
}

/// Support queries go through the registered providers
#[test]
fn backend_support_and_enumeration() {
    init_logger();
    let mut metal = MockProvider::new(Backend::Metal, Vec::new());
    metal.supported = false;
    let vulkan = MockProvider::new(
        Backend::Vulkan,
        vec![adapter(Backend::Vulkan, "gpu", AdapterKind::Discrete)],
    );
    let instance = instance(&[Backend::Vulkan], vec![metal, vulkan]);

    assert!(instance.is_backend_supported(Backend::Vulkan));
    assert!(!instance.is_backend_supported(Backend::Metal));
    assert!(!instance.is_backend_supported(Backend::D3D11));
    assert_eq!(instance.enumerate_adapters(Backend::Vulkan).unwrap().len(), 1);
    assert!(instance.enumerate_adapters(Backend::Metal).is_err());
}

/// The default instance always carries the Null backend
#[test]
fn default_instance_has_null() {
    init_logger();
    let instance = GraphicsInstance::new(InstanceDesc::default());
    assert!(instance.is_backend_supported(Backend::Null));
    let device = instance
        .create_device(&DeviceDesc {
            name: "null",
            preferred_backend: Some(Backend::Null),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(device.name(), "null");
    assert!(device.as_null().is_some());
}
