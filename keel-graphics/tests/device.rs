//! Device factory, usage validation and object lifetime on the Null backend

use keel_graphics::{
    null, Backend, BindGroupDesc, BindGroupEntry, BindGroupLayoutDesc, BindGroupLayoutEntry,
    BindingResource, BindingType, BufferDesc, BufferUsage, ComputePipelineDesc, ConfigError,
    DeviceDesc, Extent, GraphicsDevice, GraphicsError, GraphicsInstance, InstanceDesc, Memory,
    NotSupportedError, ObjectKind, PipelineLayoutDesc, PixelFormat, PresentMode, QueueType,
    SamplerDesc, ShaderModuleDesc, ShaderStage, ShaderStages, SurfaceHandle, SurfaceKind,
    SwapChainDesc, TextureDesc, TextureUsage, UsageErrorPolicy,
};
use std::panic::{self, AssertUnwindSafe};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn null_device(usage_errors: UsageErrorPolicy) -> GraphicsDevice {
    init_logger();
    GraphicsInstance::new(InstanceDesc::default())
        .create_device(&DeviceDesc {
            name: "test",
            preferred_backend: Some(Backend::Null),
            usage_errors,
            ..Default::default()
        })
        .expect("Null device")
}

fn surface(width: u32, height: u32) -> (SurfaceHandle, Extent) {
    (
        SurfaceHandle::new(SurfaceKind::Xlib, 0x42, 0x1),
        Extent::new_2d(width, height),
    )
}

//=============================================================================
// Textures and Buffers
//=============================================================================

/// Zero-sized textures are a usage error
#[test]
fn zero_width_texture_is_reported() {
    let device = null_device(UsageErrorPolicy::Report);
    let desc = TextureDesc::tex_2d(PixelFormat::Rgba8Unorm, 0, 16, 1, 1);
    assert!(matches!(
        device.create_texture(&desc),
        Err(GraphicsError::Config(ConfigError::ZeroExtent(_)))
    ));
    assert_eq!(device.live_object_count(ObjectKind::Texture), 0);
}

/// The assert policy panics at the offending call
#[test]
#[should_panic(expected = "Graphics usage error")]
fn zero_width_texture_asserts() {
    let device = null_device(UsageErrorPolicy::Assert);
    let desc = TextureDesc::tex_2d(PixelFormat::Rgba8Unorm, 0, 16, 1, 1);
    let _ = device.create_texture(&desc);
}

/// The smallest texture there is
#[test]
fn one_texel_texture() {
    let device = null_device(UsageErrorPolicy::Report);
    let desc = TextureDesc::tex_2d(PixelFormat::Rgba8Unorm, 1, 1, 1, 1);
    let texture = device.create_texture(&desc).expect("1x1 texture");
    assert_eq!(texture.size(), Extent::new(1, 1, 1));
    assert_eq!(texture.mip_level_count(), 1);
    device.destroy_texture(texture);
}

/// A zero mip count requests the full chain
#[test]
fn full_mip_chain() {
    let device = null_device(UsageErrorPolicy::Report);
    let desc = TextureDesc::tex_2d(PixelFormat::Rgba8Unorm, 256, 64, 0, 1);
    let texture = device.create_texture(&desc).unwrap();
    assert_eq!(texture.mip_level_count(), 9);
    assert_eq!(texture.mip_level_size(8), Extent::new(1, 1, 1));
    assert_eq!(keel_graphics::format::texture_memory_size(&desc), 87388);

    let too_many = TextureDesc::tex_2d(PixelFormat::Rgba8Unorm, 4, 4, 4, 1);
    assert_eq!(
        device.create_texture(&too_many).unwrap_err(),
        GraphicsError::Config(ConfigError::MipLevelCount {
            requested: 4,
            max: 3
        })
    );
    device.destroy_texture(texture);
}

/// Initial data covers the first mip of every layer
#[test]
fn texture_initial_data() {
    let device = null_device(UsageErrorPolicy::Report);
    let desc = TextureDesc::tex_2d(PixelFormat::Rgba8Unorm, 2, 2, 1, 2);
    let data: Vec<u8> = (0..32).collect();
    let texture = device
        .create_texture_with_data(&desc, Some(&data))
        .unwrap();
    let null = device.as_null().unwrap();
    assert_eq!(null.texture_contents(texture.key()), Some(data.clone()));

    assert_eq!(
        device
            .create_texture_with_data(&desc, Some(&data[..16]))
            .unwrap_err(),
        GraphicsError::Config(ConfigError::InitialData {
            expected: 32,
            provided: 16
        })
    );
    device.destroy_texture(texture);
}

/// Compressed formats cannot be render targets
#[test]
fn compressed_render_target_is_rejected() {
    let device = null_device(UsageErrorPolicy::Report);
    let desc = TextureDesc::tex_2d(PixelFormat::Bc1RgbaUnorm, 16, 16, 1, 1)
        .with_usage(TextureUsage::RENDER_TARGET);
    assert!(matches!(
        device.create_texture(&desc),
        Err(GraphicsError::Config(ConfigError::FormatUsage { .. }))
    ));
}

/// Formats needing a missing feature are not supported rather than misused
#[test]
fn missing_format_feature() {
    init_logger();
    let mut instance = GraphicsInstance::new(InstanceDesc::default());
    instance.register(Box::new(null::NullProvider {
        caps: Default::default(),
        stats: None,
    }));
    let device = instance
        .create_device(&DeviceDesc {
            preferred_backend: Some(Backend::Null),
            usage_errors: UsageErrorPolicy::Report,
            ..Default::default()
        })
        .unwrap();
    let desc = TextureDesc::tex_2d(PixelFormat::Bc1RgbaUnorm, 16, 16, 1, 1);
    assert!(matches!(
        device.create_texture(&desc),
        Err(GraphicsError::NotSupported(NotSupportedError::Features(_)))
    ));
}

/// Buffers smaller than four bytes are rejected
#[test]
fn tiny_buffer() {
    let device = null_device(UsageErrorPolicy::Report);
    let desc = BufferDesc {
        name: "tiny",
        size: 2,
        usage: BufferUsage::VERTEX,
        memory: Memory::Private,
    };
    assert_eq!(
        device.create_buffer(&desc).unwrap_err(),
        GraphicsError::Config(ConfigError::BufferTooSmall(2))
    );
}

/// Only upload buffers are CPU writable
#[test]
fn buffer_memory_access() {
    let device = null_device(UsageErrorPolicy::Report);
    let upload = device
        .create_buffer(&BufferDesc {
            name: "upload",
            size: 16,
            usage: BufferUsage::empty(),
            memory: Memory::Upload,
        })
        .unwrap();
    device.write_buffer(upload, 4, &[1, 2, 3, 4]).unwrap();
    let contents = device.as_null().unwrap().buffer_contents(upload.key()).unwrap();
    assert_eq!(&contents[..8], &[0, 0, 0, 0, 1, 2, 3, 4]);

    assert!(matches!(
        device.write_buffer(upload, 14, &[0; 4]),
        Err(GraphicsError::Config(ConfigError::OutOfBounds { .. }))
    ));
    let mut out = [0u8; 4];
    assert!(matches!(
        device.read_buffer(upload, 0, &mut out),
        Err(GraphicsError::Config(ConfigError::Memory {
            expected: Memory::Readback,
            ..
        }))
    ));
    device.destroy_buffer(upload);
}

/// Readback memory cannot be bound to the pipeline
#[test]
fn readback_buffer_usage() {
    let device = null_device(UsageErrorPolicy::Report);
    let result = device.create_buffer(&BufferDesc {
        name: "readback",
        size: 64,
        usage: BufferUsage::VERTEX,
        memory: Memory::Readback,
    });
    assert!(matches!(
        result,
        Err(GraphicsError::Config(ConfigError::Memory { .. }))
    ));
}

#[test]
fn sampler_anisotropy_range() {
    let device = null_device(UsageErrorPolicy::Report);
    let sampler = device
        .create_sampler(&SamplerDesc {
            max_anisotropy: 16,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(
        device
            .create_sampler(&SamplerDesc {
                max_anisotropy: 0,
                ..Default::default()
            })
            .unwrap_err(),
        GraphicsError::Config(ConfigError::Anisotropy(0))
    );
    device.destroy_sampler(sampler);
}

//=============================================================================
// Bindings and Pipelines
//=============================================================================

fn constant_layout() -> BindGroupLayoutDesc {
    BindGroupLayoutDesc {
        name: "constants".to_string(),
        entries: vec![BindGroupLayoutEntry {
            binding: 0,
            visibility: ShaderStages::VERTEX | ShaderStages::FRAGMENT,
            ty: BindingType::ConstantBuffer,
        }],
    }
}

/// Bind group entries must match their layout
#[test]
fn bind_group_checks_layout() {
    let device = null_device(UsageErrorPolicy::Report);
    let layout = device.create_bind_group_layout(&constant_layout()).unwrap();
    let constants = device
        .create_buffer(&BufferDesc {
            name: "constants",
            size: 256,
            usage: BufferUsage::CONSTANT,
            memory: Memory::Upload,
        })
        .unwrap();
    let vertices = device
        .create_buffer(&BufferDesc {
            name: "vertices",
            size: 256,
            usage: BufferUsage::VERTEX,
            memory: Memory::Private,
        })
        .unwrap();

    let group = device
        .create_bind_group(&BindGroupDesc {
            name: "ok",
            layout,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: BindingResource::Buffer {
                    buffer: constants,
                    offset: 0,
                    size: None,
                },
            }],
        })
        .unwrap();
    assert_eq!(device.live_object_count(ObjectKind::BindGroup), 1);

    let wrong_usage = device.create_bind_group(&BindGroupDesc {
        name: "wrong",
        layout,
        entries: &[BindGroupEntry {
            binding: 0,
            resource: BindingResource::Buffer {
                buffer: vertices,
                offset: 0,
                size: None,
            },
        }],
    });
    assert!(matches!(
        wrong_usage,
        Err(GraphicsError::Config(ConfigError::MissingUsage { .. }))
    ));

    device.destroy_bind_group(group);
    device.destroy_bind_group_layout(layout);
    device.destroy_buffer(constants);
    device.destroy_buffer(vertices);
}

/// A compute module cannot serve as a vertex shader
#[test]
fn shader_stage_mismatch() {
    let device = null_device(UsageErrorPolicy::Report);
    let module = device
        .create_shader_module(&ShaderModuleDesc {
            name: "vs",
            stage: ShaderStage::Vertex,
            bytecode: b"opaque",
            entry_point: "main",
        })
        .unwrap();
    let layout = device
        .create_pipeline_layout(&PipelineLayoutDesc::default())
        .unwrap();
    let result = device.create_compute_pipeline(&ComputePipelineDesc {
        name: "bad".to_string(),
        layout,
        compute: module,
    });
    assert_eq!(
        result.unwrap_err(),
        GraphicsError::Config(ConfigError::Pipeline("compute module is not a compute shader"))
    );
    device.destroy_pipeline_layout(layout);
    device.destroy_shader_module(module);
}

/// Identical descriptors hit the object cache
#[test]
fn object_cache_hits() {
    let device = null_device(UsageErrorPolicy::Report);
    let first = device.get_or_create_bind_group_layout(&constant_layout()).unwrap();
    let second = device.get_or_create_bind_group_layout(&constant_layout()).unwrap();
    assert_eq!(first, second);
    assert_eq!(device.live_object_count(ObjectKind::BindGroupLayout), 1);

    let layout_desc = PipelineLayoutDesc {
        name: "layout".to_string(),
        bind_group_layouts: vec![first],
    };
    let module = device
        .create_shader_module(&ShaderModuleDesc {
            name: "cs",
            stage: ShaderStage::Compute,
            bytecode: b"opaque",
            entry_point: "main",
        })
        .unwrap();
    let layout = device.get_or_create_pipeline_layout(&layout_desc).unwrap();
    let desc = ComputePipelineDesc {
        name: "cs".to_string(),
        layout,
        compute: module,
    };
    let a = device.get_or_create_compute_pipeline(&desc).unwrap();
    let b = device.get_or_create_compute_pipeline(&desc).unwrap();
    assert_eq!(a, b);

    let stats = device.cache_stats();
    assert_eq!((stats.hits, stats.misses), (2, 3));
    assert_eq!(device.cached_object_count(), 3);

    device.clear_object_cache();
    assert_eq!(device.cached_object_count(), 0);
    assert_eq!(device.live_object_count(ObjectKind::ComputePipeline), 0);
    assert_eq!(device.live_object_count(ObjectKind::PipelineLayout), 0);
    assert_eq!(device.live_object_count(ObjectKind::BindGroupLayout), 0);
    device.destroy_shader_module(module);
}

/// A usage assertion while filling the cache leaves the device usable
#[test]
fn cache_survives_usage_assertion() {
    let device = null_device(UsageErrorPolicy::Assert);
    let group = device.get_or_create_bind_group_layout(&constant_layout()).unwrap();
    let too_many = PipelineLayoutDesc {
        name: "too many groups".to_string(),
        bind_group_layouts: vec![group; 5],
    };
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        device.get_or_create_pipeline_layout(&too_many)
    }));
    assert!(result.is_err());

    let stats = device.cache_stats();
    assert_eq!((stats.hits, stats.misses), (0, 1));
    let fits = PipelineLayoutDesc {
        name: "layout".to_string(),
        bind_group_layouts: vec![group; 4],
    };
    assert!(device.get_or_create_pipeline_layout(&fits).is_ok());
    assert_eq!(device.cached_object_count(), 2);
    drop(device);
}

//=============================================================================
// Swap Chains
//=============================================================================

/// Resizing recreates the depth buffer once and keeps the color format
#[test]
fn resize_swap_chain() {
    let device = null_device(UsageErrorPolicy::Report);
    let desc = SwapChainDesc {
        name: "main",
        color_format: PixelFormat::Bgra8UnormSrgb,
        present_mode: PresentMode::Mailbox,
        depth_stencil_format: Some(PixelFormat::Depth32Float),
        fullscreen: false,
    };
    let mut swap_chain = device.create_swap_chain(&surface(640, 480), &desc).unwrap();
    assert_eq!(swap_chain.back_buffers().len(), 3);
    assert_eq!(swap_chain.sync_interval(), 0);
    let old_depth = swap_chain.depth_stencil_texture().unwrap();
    let old_buffers = swap_chain.back_buffers().to_vec();

    device
        .resize_swap_chain(&mut swap_chain, Extent::new_2d(1280, 720))
        .unwrap();
    let null = device.as_null().unwrap();
    let stats = null.stats();
    assert_eq!(
        stats
            .destroyed_textures
            .iter()
            .filter(|&&key| key == old_depth.key())
            .count(),
        1
    );
    assert!(!null.is_texture_alive(old_depth.key()));
    for old in old_buffers.iter() {
        assert!(!null.is_texture_alive(old.key()));
    }

    assert_eq!(swap_chain.size(), Extent::new_2d(1280, 720));
    assert_eq!(swap_chain.back_buffers().len(), 3);
    for buffer in swap_chain.back_buffers() {
        assert_eq!(buffer.format(), PixelFormat::Bgra8UnormSrgb);
        assert_eq!(buffer.size(), Extent::new_2d(1280, 720));
    }
    let depth = swap_chain.depth_stencil_texture().unwrap();
    assert_eq!(depth.size(), Extent::new_2d(1280, 720));
    device.destroy_swap_chain(swap_chain);
    assert_eq!(device.live_object_count(ObjectKind::Texture), 0);
    assert_eq!(device.live_object_count(ObjectKind::SwapChain), 0);
}

/// A minimized window suspends the swap chain until it gets an area again
#[test]
fn zero_area_suspends() {
    let device = null_device(UsageErrorPolicy::Report);
    let desc = SwapChainDesc {
        depth_stencil_format: Some(PixelFormat::Depth24UnormStencil8),
        ..Default::default()
    };
    let mut swap_chain = device.create_swap_chain(&surface(0, 0), &desc).unwrap();
    assert!(swap_chain.is_suspended());
    assert!(swap_chain.depth_stencil_texture().is_none());

    device
        .resize_swap_chain(&mut swap_chain, Extent::new_2d(32, 32))
        .unwrap();
    assert!(!swap_chain.is_suspended());
    assert_eq!(swap_chain.back_buffers().len(), 2);
    assert!(swap_chain.depth_stencil_texture().is_some());
    device.destroy_swap_chain(swap_chain);
}

/// Depth formats cannot be presented
#[test]
fn swap_chain_format_checks() {
    let device = null_device(UsageErrorPolicy::Report);
    let desc = SwapChainDesc {
        color_format: PixelFormat::Depth32Float,
        ..Default::default()
    };
    assert!(matches!(
        device.create_swap_chain(&surface(8, 8), &desc),
        Err(GraphicsError::Config(ConfigError::FormatUsage { .. }))
    ));
    assert_eq!(device.live_object_count(ObjectKind::SwapChain), 0);
}

//=============================================================================
// Lifetime
//=============================================================================

/// Dropping the device releases dependents before their dependencies
#[test]
fn release_order_on_drop() {
    init_logger();
    let stats = null::SharedStats::default();
    let mut instance = GraphicsInstance::new(InstanceDesc::default());
    instance.register(Box::new(null::NullProvider {
        stats: Some(stats.clone()),
        ..Default::default()
    }));
    let device = instance
        .create_device(&DeviceDesc {
            preferred_backend: Some(Backend::Null),
            ..Default::default()
        })
        .unwrap();

    // leaked on purpose
    let _buffer = device
        .create_buffer(&BufferDesc {
            name: "leak",
            size: 64,
            usage: BufferUsage::VERTEX,
            memory: Memory::Private,
        })
        .unwrap();
    let _layout = device.get_or_create_bind_group_layout(&constant_layout()).unwrap();
    assert_eq!(device.live_object_count(ObjectKind::Buffer), 1);
    drop(device);

    let stats = stats.lock().unwrap();
    assert_eq!(stats.release_order, ObjectKind::RELEASE_ORDER.to_vec());
    let position = |kind| {
        stats
            .release_order
            .iter()
            .position(|&k| k == kind)
            .unwrap()
    };
    assert!(position(ObjectKind::RenderPipeline) < position(ObjectKind::PipelineLayout));
    assert!(position(ObjectKind::BindGroup) < position(ObjectKind::BindGroupLayout));
    assert!(position(ObjectKind::Texture) < position(ObjectKind::SwapChain));
    assert_eq!(position(ObjectKind::Queue), 0);
}

/// A queue counts as live while it holds unfinished work
#[test]
fn queues_with_pending_work_are_live() {
    let device = null_device(UsageErrorPolicy::Report);
    let null = device.as_null().unwrap();
    assert_eq!(device.live_object_count(ObjectKind::Queue), 0);

    null.pause_queue(QueueType::Copy);
    let value = device.queue(QueueType::Copy).signal();
    assert_eq!(device.live_object_count(ObjectKind::Queue), 1);
    null.resume_queue(QueueType::Copy);
    assert!(device.queue(QueueType::Copy).is_fence_complete(value));
    assert_eq!(device.live_object_count(ObjectKind::Queue), 0);
}
