//! Recorded GPU commands.
//!
//! A [`crate::RenderContext`] records into a `Vec<Command>` that the backend
//! replays at submit time.

use crate::{
    BindGroup, Buffer, Color, ComputePipeline, Extent, RenderPipeline, Texture,
};

//=============================================================================
// Render Pass Description
//=============================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LoadAction<T> {
    Load,
    Clear(T),
    /// Previous contents are undefined.
    DontCare,
}

#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
pub enum StoreAction {
    #[default]
    Store,
    Discard,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorAttachment {
    pub texture: Texture,
    pub load: LoadAction<Color>,
    pub store: StoreAction,
}

impl ColorAttachment {
    pub fn clear(texture: Texture, color: Color) -> Self {
        Self {
            texture,
            load: LoadAction::Clear(color),
            store: StoreAction::Store,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthStencilAttachment {
    pub texture: Texture,
    pub depth_load: LoadAction<f32>,
    pub depth_store: StoreAction,
    pub stencil_load: LoadAction<u32>,
    pub stencil_store: StoreAction,
}

impl DepthStencilAttachment {
    pub fn clear(texture: Texture, depth: f32) -> Self {
        Self {
            texture,
            depth_load: LoadAction::Clear(depth),
            depth_store: StoreAction::Discard,
            stencil_load: LoadAction::Clear(0),
            stencil_store: StoreAction::Discard,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderPassDesc {
    pub name: String,
    pub color_attachments: Vec<ColorAttachment>,
    pub depth_stencil_attachment: Option<DepthStencilAttachment>,
}

impl RenderPassDesc {
    /// Size shared by all attachments.
    pub fn attachment_size(&self) -> Option<Extent> {
        self.color_attachments
            .iter()
            .map(|a| a.texture)
            .chain(self.depth_stencil_attachment.map(|a| a.texture))
            .map(|texture| Extent::new_2d(texture.size.width, texture.size.height))
            .next()
    }
}

//=============================================================================
// Dynamic State
//=============================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn from_extent(extent: Extent) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

//=============================================================================
// Commands
//=============================================================================

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    BeginRenderPass(RenderPassDesc),
    EndRenderPass,
    SetRenderPipeline(RenderPipeline),
    SetComputePipeline(ComputePipeline),
    SetBindGroup {
        index: u32,
        group: BindGroup,
    },
    SetVertexBuffer {
        slot: u32,
        buffer: Buffer,
        offset: u64,
    },
    SetIndexBuffer {
        buffer: Buffer,
        offset: u64,
        format: IndexFormat,
    },
    SetViewport(Viewport),
    SetScissorRect(ScissorRect),
    SetBlendConstant(Color),
    SetStencilReference(u32),
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    },
    DrawIndirect {
        buffer: Buffer,
        offset: u64,
    },
    DrawIndexedIndirect {
        buffer: Buffer,
        offset: u64,
    },
    Dispatch {
        groups: [u32; 3],
    },
    CopyBufferToBuffer {
        src: Buffer,
        src_offset: u64,
        dst: Buffer,
        dst_offset: u64,
        size: u64,
    },
    PushDebugGroup(String),
    PopDebugGroup,
    InsertDebugMarker(String),
}
