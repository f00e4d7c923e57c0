//! Headless frame loop for keel-graphics
//!
//! Clears an offscreen target and round-trips a buffer through the copy
//! queue for a few frames. Runs on the best available backend and falls
//! back to the Null device.
//!
//! Run with: RUST_LOG=debug cargo run --example headless-frame
//! With GPU backends: cargo run --example headless-frame --features wgpu

use keel_graphics as gpu;

const FRAME_COUNT: u32 = 5;
const TARGET_SIZE: u32 = 256;

// -----------------------------------------------------------------------------
// Example Application
// -----------------------------------------------------------------------------

struct Example {
    device: gpu::GraphicsDevice,
    target: gpu::Texture,
    depth: gpu::Texture,
    upload: gpu::Buffer,
    readback: gpu::Buffer,
}

impl Example {
    fn new() -> Result<Self, gpu::GraphicsError> {
        let instance = gpu::GraphicsInstance::new(gpu::InstanceDesc::default());
        let device = instance.create_device(&gpu::DeviceDesc {
            name: "headless",
            validation_mode: gpu::ValidationMode::Enabled,
            allow_null_fallback: true,
            ..Default::default()
        })?;
        log::info!("Running on {}", device.adapter());

        let target = device.create_texture(
            &gpu::TextureDesc::tex_2d(gpu::PixelFormat::Rgba8Unorm, TARGET_SIZE, TARGET_SIZE, 1, 1)
                .with_usage(gpu::TextureUsage::RENDER_TARGET | gpu::TextureUsage::SHADER_READ)
                .with_name("offscreen"),
        )?;
        let depth = device.create_texture(
            &gpu::TextureDesc::tex_2d(gpu::PixelFormat::Depth32Float, TARGET_SIZE, TARGET_SIZE, 1, 1)
                .with_usage(gpu::TextureUsage::RENDER_TARGET)
                .with_name("depth"),
        )?;
        let upload = device.create_buffer(&gpu::BufferDesc {
            name: "frame data",
            size: 64,
            usage: gpu::BufferUsage::empty(),
            memory: gpu::Memory::Upload,
        })?;
        let readback = device.create_buffer(&gpu::BufferDesc {
            name: "frame readback",
            size: 64,
            usage: gpu::BufferUsage::empty(),
            memory: gpu::Memory::Readback,
        })?;

        Ok(Self {
            device,
            target,
            depth,
            upload,
            readback,
        })
    }

    fn render(&mut self, frame: u32) -> Result<(), gpu::GraphicsError> {
        let t = frame as f64 / FRAME_COUNT as f64;
        let mut context = self.device.begin_render_context("frame");
        {
            let mut group = context.push_scoped_debug_group("clear");
            let _pass = group.push_scoped_pass(&gpu::RenderPassDesc {
                name: "clear".to_string(),
                color_attachments: vec![gpu::ColorAttachment::clear(
                    self.target,
                    gpu::Color::new(t, 0.2, 1.0 - t, 1.0),
                )],
                depth_stencil_attachment: Some(gpu::DepthStencilAttachment::clear(self.depth, 1.0)),
            })?;
        }
        context.flush(false)?;

        let values = [frame; 16];
        self.device
            .write_buffer(self.upload, 0, bytemuck::cast_slice(&values))?;
        let mut copy = self.device.begin_context(gpu::QueueType::Copy, "readback");
        copy.copy_buffer_to_buffer(self.upload, 0, self.readback, 0, 64)?;
        copy.flush(true)?;

        let mut bytes = [0u8; 64];
        self.device.read_buffer(self.readback, 0, &mut bytes)?;
        let read: &[u32] = bytemuck::cast_slice(&bytes);
        log::info!("Frame {} read back {:?}", frame, &read[..4]);

        self.device.finish_frame();
        Ok(())
    }

    fn deinit(self) {
        self.device.wait_idle();
        self.device.destroy_texture(self.target);
        self.device.destroy_texture(self.depth);
        self.device.destroy_buffer(self.upload);
        self.device.destroy_buffer(self.readback);
        if let Some(null) = self.device.as_null() {
            let stats = null.stats();
            println!(
                "{} submissions, {} passes, {} copies",
                stats.submissions, stats.passes_ended, stats.copies
            );
        }
    }
}

fn main() {
    env_logger::init();

    let mut example = match Example::new() {
        Ok(example) => example,
        Err(e) => {
            eprintln!("Failed to create a device: {e}");
            std::process::exit(1);
        }
    };
    for frame in 0..FRAME_COUNT {
        if let Err(e) = example.render(frame) {
            eprintln!("Frame {frame} failed: {e}");
            break;
        }
    }
    println!(
        "Rendered {} frames, frame index {}",
        example.device.frame_count(),
        example.device.frame_index()
    );
    example.deinit();
}
