//! Platform surfaces and swap chains.

use crate::{Extent, NotSupportedError, PixelFormat, SurfaceKey, Texture};
use raw_window_handle::{
    HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle,
};

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum SurfaceKind {
    Win32,
    Xlib,
    Wayland,
    CoreWindow,
    MetalLayer,
    Android,
}

/// Opaque platform window handle and its owning context
/// (HINSTANCE, X display, wl_display), both as plain addresses.
#[derive(Clone, Copy, Debug)]
pub struct SurfaceHandle {
    pub kind: SurfaceKind,
    pub handle: usize,
    pub context: usize,
    pub(crate) raw: Option<(RawWindowHandle, RawDisplayHandle)>,
}

impl SurfaceHandle {
    pub fn new(kind: SurfaceKind, handle: usize, context: usize) -> Self {
        Self {
            kind,
            handle,
            context,
            raw: None,
        }
    }

    pub fn from_raw(
        window: RawWindowHandle,
        display: RawDisplayHandle,
    ) -> Result<Self, NotSupportedError> {
        let (kind, handle) = match window {
            RawWindowHandle::Win32(w) => (SurfaceKind::Win32, w.hwnd.get() as usize),
            RawWindowHandle::Xlib(w) => (SurfaceKind::Xlib, w.window as usize),
            RawWindowHandle::Wayland(w) => (SurfaceKind::Wayland, w.surface.as_ptr() as usize),
            RawWindowHandle::WinRt(w) => {
                (SurfaceKind::CoreWindow, w.core_window.as_ptr() as usize)
            }
            RawWindowHandle::AppKit(w) => (SurfaceKind::MetalLayer, w.ns_view.as_ptr() as usize),
            RawWindowHandle::UiKit(w) => (SurfaceKind::MetalLayer, w.ui_view.as_ptr() as usize),
            RawWindowHandle::AndroidNdk(w) => {
                (SurfaceKind::Android, w.a_native_window.as_ptr() as usize)
            }
            _ => return Err(NotSupportedError::WindowHandle),
        };
        let context = match (window, display) {
            (RawWindowHandle::Win32(w), _) => w.hinstance.map_or(0, |h| h.get() as usize),
            (_, RawDisplayHandle::Xlib(d)) => d.display.map_or(0, |p| p.as_ptr() as usize),
            (_, RawDisplayHandle::Wayland(d)) => d.display.as_ptr() as usize,
            _ => 0,
        };
        Ok(Self {
            kind,
            handle,
            context,
            raw: Some((window, display)),
        })
    }

    pub fn from_window<W: HasWindowHandle + HasDisplayHandle + ?Sized>(
        window: &W,
    ) -> Result<Self, NotSupportedError> {
        let window_handle = window
            .window_handle()
            .map_err(|_| NotSupportedError::WindowHandle)?;
        let display_handle = window
            .display_handle()
            .map_err(|_| NotSupportedError::WindowHandle)?;
        Self::from_raw(window_handle.as_raw(), display_handle.as_raw())
    }
}

/// Supplies the surface a swap chain presents to.
pub trait SurfaceSource {
    fn surface_handle(&self) -> Result<SurfaceHandle, NotSupportedError>;
    /// Current drawable size in pixels.
    fn current_size(&self) -> Extent;
}

impl SurfaceSource for (SurfaceHandle, Extent) {
    fn surface_handle(&self) -> Result<SurfaceHandle, NotSupportedError> {
        Ok(self.0)
    }
    fn current_size(&self) -> Extent {
        self.1
    }
}

/// Any `raw-window-handle` window paired with its size.
pub struct WindowSurface<'w, W: ?Sized> {
    pub window: &'w W,
    pub size: Extent,
}

impl<W: HasWindowHandle + HasDisplayHandle + ?Sized> SurfaceSource for WindowSurface<'_, W> {
    fn surface_handle(&self) -> Result<SurfaceHandle, NotSupportedError> {
        SurfaceHandle::from_window(self.window)
    }
    fn current_size(&self) -> Extent {
        self.size
    }
}

//=============================================================================
// Presentation
//=============================================================================

#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
pub enum PresentMode {
    /// No vertical sync, may tear.
    Immediate,
    /// Vertical sync, frames queue up.
    #[default]
    Fifo,
    /// Vertical sync, the newest frame replaces queued ones.
    Mailbox,
}

impl PresentMode {
    pub fn buffer_count(self) -> u32 {
        match self {
            Self::Immediate | Self::Fifo => 2,
            Self::Mailbox => 3,
        }
    }

    pub fn sync_interval(self) -> u32 {
        match self {
            Self::Immediate | Self::Mailbox => 0,
            Self::Fifo => 1,
        }
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
    pub struct PresentFlags: u32 {
        const ALLOW_TEARING = 1 << 0;
    }
}

impl PresentFlags {
    /// Tearing is only requested for windowed, unsynchronized presentation.
    pub fn select(sync_interval: u32, fullscreen: bool, tearing_supported: bool) -> Self {
        if sync_interval == 0 && !fullscreen && tearing_supported {
            Self::ALLOW_TEARING
        } else {
            Self::empty()
        }
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct SwapChainDesc<'a> {
    pub name: &'a str,
    pub color_format: PixelFormat,
    pub present_mode: PresentMode,
    pub depth_stencil_format: Option<PixelFormat>,
    pub fullscreen: bool,
}

impl Default for SwapChainDesc<'_> {
    fn default() -> Self {
        Self {
            name: "",
            color_format: PixelFormat::Bgra8UnormSrgb,
            present_mode: PresentMode::Fifo,
            depth_stencil_format: None,
            fullscreen: false,
        }
    }
}

/// A ring of presentable back-buffers bound to one surface.
#[derive(Debug)]
pub struct SwapChain {
    pub(crate) raw: SurfaceKey,
    pub(crate) surface_kind: SurfaceKind,
    pub(crate) color_format: PixelFormat,
    pub(crate) present_mode: PresentMode,
    pub(crate) depth_stencil_format: Option<PixelFormat>,
    pub(crate) fullscreen: bool,
    pub(crate) present_flags: PresentFlags,
    pub(crate) size: Extent,
    pub(crate) back_buffers: Vec<Texture>,
    pub(crate) depth_stencil: Option<Texture>,
    pub(crate) current_index: Option<u32>,
}

impl SwapChain {
    pub fn surface_kind(&self) -> SurfaceKind {
        self.surface_kind
    }
    pub fn color_format(&self) -> PixelFormat {
        self.color_format
    }
    pub fn present_mode(&self) -> PresentMode {
        self.present_mode
    }
    pub fn buffer_count(&self) -> u32 {
        self.present_mode.buffer_count()
    }
    pub fn sync_interval(&self) -> u32 {
        self.present_mode.sync_interval()
    }
    pub fn present_flags(&self) -> PresentFlags {
        self.present_flags
    }
    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }
    pub fn size(&self) -> Extent {
        self.size
    }
    pub fn back_buffers(&self) -> &[Texture] {
        &self.back_buffers
    }
    pub fn depth_stencil_format(&self) -> Option<PixelFormat> {
        self.depth_stencil_format
    }
    pub fn depth_stencil_texture(&self) -> Option<Texture> {
        self.depth_stencil
    }
    /// Back-buffer acquired for the frame being recorded.
    pub fn current_back_buffer(&self) -> Option<Texture> {
        self.current_index
            .and_then(|index| self.back_buffers.get(index as usize).copied())
    }
    /// The surface has no buffers until resized to a non-zero area.
    pub fn is_suspended(&self) -> bool {
        self.back_buffers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn present_mode_table() {
        assert_eq!(
            (PresentMode::Mailbox.buffer_count(), PresentMode::Mailbox.sync_interval()),
            (3, 0)
        );
        assert_eq!(
            (PresentMode::Fifo.buffer_count(), PresentMode::Fifo.sync_interval()),
            (2, 1)
        );
        assert_eq!(
            (PresentMode::Immediate.buffer_count(), PresentMode::Immediate.sync_interval()),
            (2, 0)
        );
    }

    #[test]
    fn tearing_flag_selection() {
        assert_eq!(PresentFlags::select(0, false, true), PresentFlags::ALLOW_TEARING);
        assert_eq!(PresentFlags::select(0, true, true), PresentFlags::empty());
        assert_eq!(PresentFlags::select(1, false, true), PresentFlags::empty());
        assert_eq!(PresentFlags::select(0, false, false), PresentFlags::empty());
    }

    #[test]
    fn raw_xlib_handle_conversion() {
        let window = raw_window_handle::XlibWindowHandle::new(42);
        let display = raw_window_handle::XlibDisplayHandle::new(None, 0);
        let handle = SurfaceHandle::from_raw(window.into(), display.into()).unwrap();
        assert_eq!(handle.kind, SurfaceKind::Xlib);
        assert_eq!(handle.handle, 42);
        assert_eq!(handle.context, 0);
    }
}
