//! Command recording, queue fences and frame pacing on the Null backend

use keel_graphics::{
    Backend, BufferDesc, BufferUsage, Color, ColorAttachment, ConfigError,
    DepthStencilAttachment, DeviceDesc, Extent, GraphicsDevice, GraphicsError, GraphicsInstance,
    InstanceDesc, Memory, PipelineLayoutDesc, PixelFormat, QueueType, RenderPassDesc,
    RenderPipelineDesc, ShaderModuleDesc, ShaderStage, SurfaceHandle, SurfaceKind, SwapChainDesc,
    TextureDesc, TextureUsage, UsageErrorPolicy,
};
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn null_device(max_frames_in_flight: u32) -> GraphicsDevice {
    init_logger();
    GraphicsInstance::new(InstanceDesc::default())
        .create_device(&DeviceDesc {
            name: "context-test",
            preferred_backend: Some(Backend::Null),
            max_frames_in_flight,
            usage_errors: UsageErrorPolicy::Report,
            ..Default::default()
        })
        .expect("Null device")
}

fn color_target(device: &GraphicsDevice, size: u32) -> keel_graphics::Texture {
    let desc = TextureDesc::tex_2d(PixelFormat::Rgba8Unorm, size, size, 1, 1)
        .with_usage(TextureUsage::RENDER_TARGET)
        .with_name("target");
    device.create_texture(&desc).unwrap()
}

fn clear_pass(target: keel_graphics::Texture) -> RenderPassDesc {
    RenderPassDesc {
        name: "clear".to_string(),
        color_attachments: vec![ColorAttachment::clear(target, Color::new(0.1, 0.2, 0.3, 1.0))],
        depth_stencil_attachment: None,
    }
}

fn triangle_pipeline(device: &GraphicsDevice, format: PixelFormat) -> keel_graphics::RenderPipeline {
    let shader = |name: &'static str, stage: ShaderStage| {
        device
            .create_shader_module(&ShaderModuleDesc {
                name,
                stage,
                bytecode: b"opaque",
                entry_point: "main",
            })
            .unwrap()
    };
    let layout = device
        .get_or_create_pipeline_layout(&PipelineLayoutDesc::default())
        .unwrap();
    device
        .get_or_create_render_pipeline(&RenderPipelineDesc {
            name: "triangle".to_string(),
            layout,
            vertex: shader("vs", ShaderStage::Vertex),
            fragment: Some(shader("fs", ShaderStage::Fragment)),
            vertex_buffers: Vec::new(),
            primitive: Default::default(),
            color_targets: vec![format.into()],
            depth_stencil: None,
            sample_count: Default::default(),
        })
        .unwrap()
}

//=============================================================================
// Render Passes
//=============================================================================

/// A scoped pass ends exactly once, on early exit and on unwinding
#[test]
fn scoped_pass_ends_once() {
    let device = null_device(2);
    let target = color_target(&device, 64);
    let pass = clear_pass(target);

    let mut context = device.begin_render_context("scoped");
    {
        let scope = context.push_scoped_pass(&pass).unwrap();
        assert!(scope.is_in_pass());
    }
    assert!(!context.is_in_pass());

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let _scope = context.push_scoped_pass(&pass).unwrap();
        panic!("recording failed");
    }));
    assert!(result.is_err());
    assert!(!context.is_in_pass());
    context.flush(true).unwrap();

    let stats = device.as_null().unwrap().stats();
    assert_eq!(stats.passes_begun, 2);
    assert_eq!(stats.passes_ended, 2);
    device.destroy_texture(target);
}

/// Beginning a pass inside another one is rejected
#[test]
fn nested_pass_is_rejected() {
    let device = null_device(2);
    let target = color_target(&device, 16);
    let pass = clear_pass(target);

    let mut context = device.begin_render_context("nested");
    context.begin_render_pass(&pass).unwrap();
    assert_eq!(
        context.begin_render_pass(&pass).unwrap_err(),
        GraphicsError::Config(ConfigError::PassActive)
    );
    assert_eq!(
        context.flush(false).unwrap_err(),
        GraphicsError::Config(ConfigError::PassActive)
    );
    device.destroy_texture(target);
}

/// Attachments must share a size and carry render target usage
#[test]
fn attachment_validation() {
    let device = null_device(2);
    let small = color_target(&device, 16);
    let large = color_target(&device, 32);
    let sampled = device
        .create_texture(&TextureDesc::tex_2d(PixelFormat::Rgba8Unorm, 16, 16, 1, 1))
        .unwrap();
    let depth = device
        .create_texture(
            &TextureDesc::tex_2d(PixelFormat::Depth32Float, 32, 32, 1, 1)
                .with_usage(TextureUsage::RENDER_TARGET),
        )
        .unwrap();

    let mut context = device.begin_render_context("attachments");
    let mismatched = RenderPassDesc {
        name: "mismatched".to_string(),
        color_attachments: vec![ColorAttachment::clear(small, Color::default())],
        depth_stencil_attachment: Some(DepthStencilAttachment::clear(depth, 1.0)),
    };
    assert_eq!(
        context.begin_render_pass(&mismatched).unwrap_err(),
        GraphicsError::Config(ConfigError::Attachments("attachment sizes differ"))
    );
    assert!(matches!(
        context.begin_render_pass(&clear_pass(sampled)),
        Err(GraphicsError::Config(ConfigError::MissingUsage { .. }))
    ));
    assert!(matches!(
        context.begin_render_pass(&RenderPassDesc::default()),
        Err(GraphicsError::Config(ConfigError::Attachments(_)))
    ));

    let matched = RenderPassDesc {
        name: "matched".to_string(),
        color_attachments: vec![ColorAttachment::clear(large, Color::default())],
        depth_stencil_attachment: Some(DepthStencilAttachment::clear(depth, 1.0)),
    };
    {
        let scope = context.push_scoped_pass(&matched).unwrap();
        assert_eq!(scope.pass_size(), Some(Extent::new_2d(32, 32)));
    }
    context.flush(true).unwrap();
    for texture in [small, large, sampled, depth] {
        device.destroy_texture(texture);
    }
}

/// Draws need a pass and a pipeline
#[test]
fn draw_requires_pipeline() {
    let device = null_device(2);
    let target = color_target(&device, 8);
    let pipeline = triangle_pipeline(&device, PixelFormat::Rgba8Unorm);

    let mut context = device.begin_render_context("draw");
    assert_eq!(
        context.draw(3, 1, 0, 0).unwrap_err(),
        GraphicsError::Config(ConfigError::NoActivePass)
    );
    {
        let mut pass = context.push_scoped_pass(&clear_pass(target)).unwrap();
        assert_eq!(
            pass.draw(3, 1, 0, 0).unwrap_err(),
            GraphicsError::Config(ConfigError::NoPipeline)
        );
        pass.set_pipeline(pipeline).unwrap();
        pass.draw(3, 1, 0, 0).unwrap();
        assert_eq!(
            pass.draw_indexed(3, 1, 0, 0, 0).unwrap_err(),
            GraphicsError::Config(ConfigError::NoIndexBuffer)
        );
    }
    context.flush(true).unwrap();
    assert_eq!(device.as_null().unwrap().stats().draws, 1);
    device.destroy_texture(target);
}

/// Render passes are graphics-queue only
#[test]
fn copy_queue_rejects_render_pass() {
    let device = null_device(2);
    let target = color_target(&device, 8);
    let mut context = device.begin_context(QueueType::Copy, "upload");
    assert!(matches!(
        context.begin_render_pass(&clear_pass(target)),
        Err(GraphicsError::Config(ConfigError::WrongQueue {
            queue: QueueType::Copy,
            ..
        }))
    ));
    assert_eq!(
        context.dispatch([1, 1, 1]).unwrap_err(),
        GraphicsError::Config(ConfigError::WrongQueue {
            queue: QueueType::Copy,
            operation: "compute",
        })
    );
    device.destroy_texture(target);
}

//=============================================================================
// Transfers
//=============================================================================

/// Data copied on the GPU timeline is visible after waiting
#[test]
fn buffer_copy_readback() {
    let device = null_device(2);
    let values: [u32; 4] = [1, 2, 3, 4];
    let upload = device
        .create_buffer_init(
            &BufferDesc {
                name: "upload",
                size: 16,
                usage: BufferUsage::empty(),
                memory: Memory::Upload,
            },
            &values,
        )
        .unwrap();
    let readback = device
        .create_buffer(&BufferDesc {
            name: "readback",
            size: 16,
            usage: BufferUsage::empty(),
            memory: Memory::Readback,
        })
        .unwrap();

    let mut context = device.begin_context(QueueType::Copy, "copy");
    context.push_debug_group("copy");
    context
        .copy_buffer_to_buffer(upload, 4, readback, 0, 12)
        .unwrap();
    context.pop_debug_group().unwrap();
    let fence = context.flush(true).unwrap();
    assert!(device.queue(QueueType::Copy).is_fence_complete(fence));

    let mut out = [0u8; 12];
    device.read_buffer(readback, 0, &mut out).unwrap();
    assert_eq!(&out[..], bytemuck::cast_slice::<u32, u8>(&values[1..]));

    device.destroy_buffer(upload);
    device.destroy_buffer(readback);
}

/// Copy ranges are checked for alignment, bounds and overlap
#[test]
fn copy_validation() {
    let device = null_device(2);
    let buffer = device
        .create_buffer(&BufferDesc {
            name: "scratch",
            size: 64,
            usage: BufferUsage::SHADER_WRITE,
            memory: Memory::Private,
        })
        .unwrap();
    let mut context = device.begin_context(QueueType::Copy, "copies");
    assert!(matches!(
        context.copy_buffer_to_buffer(buffer, 0, buffer, 32, 6),
        Err(GraphicsError::Config(ConfigError::Misaligned { .. }))
    ));
    assert!(matches!(
        context.copy_buffer_to_buffer(buffer, 0, buffer, 60, 8),
        Err(GraphicsError::Config(ConfigError::OutOfBounds { .. }))
    ));
    assert_eq!(
        context
            .copy_buffer_to_buffer(buffer, 0, buffer, 16, 32)
            .unwrap_err(),
        GraphicsError::Config(ConfigError::CopyOverlap)
    );
    context.copy_buffer_to_buffer(buffer, 0, buffer, 32, 32).unwrap();
    assert_eq!(
        context.pop_debug_group().unwrap_err(),
        GraphicsError::Config(ConfigError::DebugGroupUnderflow)
    );
    context.flush(true).unwrap();
    device.destroy_buffer(buffer);
}

//=============================================================================
// Fences
//=============================================================================

/// Fence values start at the queue tag and grow by one
#[test]
fn fence_values_are_tagged() {
    let device = null_device(2);
    for ty in QueueType::ALL {
        let queue = device.queue(ty);
        assert_eq!(queue.next_fence_value(), ty.fence_base() | 1);
        let first = queue.signal();
        let second = queue.signal();
        assert_eq!(second, first + 1);
        assert_eq!(first >> 56, ty as u64);
        assert!(queue.is_fence_complete(second));
    }
}

/// A fence signaled on a stalled queue stays pending until the queue runs
#[test]
fn fence_wait_blocks_until_complete() {
    let device = null_device(2);
    let null = device.as_null().unwrap();
    let queue = device.queue(QueueType::Compute);

    null.pause_queue(QueueType::Compute);
    let value = queue.signal();
    assert!(!queue.is_fence_complete(value));

    std::thread::scope(|scope| {
        let waiter = scope.spawn(|| {
            queue.wait_for_fence(value).unwrap();
            queue.last_completed_fence_value()
        });
        std::thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());
        null.resume_queue(QueueType::Compute);
        assert!(waiter.join().unwrap() >= value);
    });
    assert!(queue.is_fence_complete(value));
}

/// Completing a fence completes every earlier value
#[test]
fn fences_complete_in_order() {
    let device = null_device(2);
    let null = device.as_null().unwrap();
    let queue = device.queue(QueueType::Graphics);

    null.pause_queue(QueueType::Graphics);
    let values: Vec<u64> = (0..4).map(|_| queue.signal()).collect();
    assert!(values.iter().all(|&v| !queue.is_fence_complete(v)));
    null.resume_queue(QueueType::Graphics);
    queue.wait_for_fence(values[3]).unwrap();
    assert!(values.iter().all(|&v| queue.is_fence_complete(v)));
}

/// A failed wait does not mark the fence as completed
#[test]
fn failed_fence_wait_keeps_completed_value() {
    let device = null_device(2);
    let queue = device.queue(QueueType::Copy);
    let signaled = queue.signal();

    let never = queue.next_fence_value();
    match queue.wait_for_fence(never) {
        Err(GraphicsError::Native { backend, .. }) => assert_eq!(backend, Backend::Null),
        other => panic!("unexpected wait result {:?}", other),
    }
    assert!(!queue.is_fence_complete(never));
    assert_eq!(queue.last_completed_fence_value(), signaled);
    assert!(queue.is_fence_complete(signaled));
}

//=============================================================================
// Frames
//=============================================================================

/// Frame index cycles through the in-flight slots
#[test]
fn finish_frame_indices() {
    let mut device = null_device(3);
    assert_eq!(device.max_frames_in_flight(), 3);
    assert_eq!((device.frame_count(), device.frame_index()), (0, 0));

    let mut indices = Vec::new();
    for _ in 0..7 {
        device.finish_frame();
        indices.push(device.frame_index());
    }
    assert_eq!(indices, vec![1, 2, 0, 1, 2, 0, 1]);
    assert_eq!(device.frame_count(), 7);
}

/// Frames in flight are clamped to two or three
#[test]
fn frames_in_flight_clamp() {
    assert_eq!(null_device(1).max_frames_in_flight(), 2);
    assert_eq!(null_device(8).max_frames_in_flight(), 3);
}

/// A full frame: acquire, clear, draw, present
#[test]
fn present_frame() {
    let mut device = null_device(2);
    let surface = (
        SurfaceHandle::new(SurfaceKind::Wayland, 0x10, 0x20),
        Extent::new_2d(320, 240),
    );
    let mut swap_chain = device
        .create_swap_chain(&surface, &SwapChainDesc::default())
        .unwrap();
    let pipeline = triangle_pipeline(&device, swap_chain.color_format());

    for _ in 0..3 {
        let mut context = device.begin_render_context("frame");
        let back_buffer = context
            .acquire_swap_chain_texture(&mut swap_chain)
            .unwrap()
            .expect("back buffer");
        assert_eq!(swap_chain.current_back_buffer(), Some(back_buffer));
        {
            let mut pass = context.push_scoped_pass(&clear_pass(back_buffer)).unwrap();
            pass.set_pipeline(pipeline).unwrap();
            pass.draw(3, 1, 0, 0).unwrap();
        }
        context.flush(false).unwrap();
        device.finish_frame();
    }

    let stats = device.as_null().unwrap().stats();
    assert_eq!(stats.presents, 3);
    assert_eq!(stats.draws, 3);
    assert_eq!(stats.passes_begun, stats.passes_ended);
    device.destroy_swap_chain(swap_chain);
}

/// A suspended swap chain yields no back buffer and nothing is presented
#[test]
fn suspended_swap_chain_skips_frame() {
    let device = null_device(2);
    let surface = (
        SurfaceHandle::new(SurfaceKind::Win32, 0x10, 0x20),
        Extent::new_2d(0, 0),
    );
    let mut swap_chain = device
        .create_swap_chain(&surface, &SwapChainDesc::default())
        .unwrap();
    let mut context = device.begin_render_context("minimized");
    assert_eq!(context.acquire_swap_chain_texture(&mut swap_chain).unwrap(), None);
    context.flush(false).unwrap();
    assert_eq!(device.as_null().unwrap().stats().presents, 0);
    device.destroy_swap_chain(swap_chain);
}
