//! The logical cursor: position, interactive grab state and the image shown
//! under the pointer.
//!
//! Three image sources compete for the cursor, in precedence order: an image
//! forced by the mousegrabber controller, an image provided by the
//! pointer-focused client, and the theme's default.

use std::{collections::HashMap, fs::File, io::Read};

use smithay::{
    backend::{
        allocator::Fourcc,
        renderer::{
            ImportAll, ImportMem, Renderer, Texture,
            element::{
                Kind,
                memory::{MemoryRenderBuffer, MemoryRenderBufferRenderElement},
                surface::{WaylandSurfaceRenderElement, render_elements_from_surface_tree},
            },
        },
    },
    input::pointer::{CursorImageStatus, CursorImageSurfaceData},
    reexports::{
        wayland_protocols::xdg::shell::server::xdg_toplevel,
        wayland_server::protocol::wl_surface::WlSurface,
    },
    render_elements,
    utils::{Logical, Physical, Point, Rectangle, Scale, Transform},
    wayland::compositor::with_states,
    xwayland::xwm,
};
use tracing::warn;
use xcursor::{
    CursorTheme,
    parser::{Image, parse_xcursor},
};

pub const DEFAULT_CURSOR: &str = "left_ptr";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CursorMode {
    #[default]
    Passthrough,
    Move,
    Resize,
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ResizeEdge: u32 {
        const TOP = 1;
        const BOTTOM = 2;
        const LEFT = 4;
        const RIGHT = 8;
    }
}

impl From<xdg_toplevel::ResizeEdge> for ResizeEdge {
    fn from(edge: xdg_toplevel::ResizeEdge) -> Self {
        use xdg_toplevel::ResizeEdge as Xdg;
        match edge {
            Xdg::Top => Self::TOP,
            Xdg::Bottom => Self::BOTTOM,
            Xdg::Left => Self::LEFT,
            Xdg::Right => Self::RIGHT,
            Xdg::TopLeft => Self::TOP | Self::LEFT,
            Xdg::TopRight => Self::TOP | Self::RIGHT,
            Xdg::BottomLeft => Self::BOTTOM | Self::LEFT,
            Xdg::BottomRight => Self::BOTTOM | Self::RIGHT,
            _ => Self::empty(),
        }
    }
}

impl From<xwm::ResizeEdge> for ResizeEdge {
    fn from(edge: xwm::ResizeEdge) -> Self {
        use xwm::ResizeEdge as X11;
        match edge {
            X11::Top => Self::TOP,
            X11::Bottom => Self::BOTTOM,
            X11::Left => Self::LEFT,
            X11::Right => Self::RIGHT,
            X11::TopLeft => Self::TOP | Self::LEFT,
            X11::TopRight => Self::TOP | Self::RIGHT,
            X11::BottomLeft => Self::BOTTOM | Self::LEFT,
            X11::BottomRight => Self::BOTTOM | Self::RIGHT,
        }
    }
}

/// Snapshot taken when an interactive move or resize starts. Valid only
/// while the cursor mode is `Move` or `Resize`; the view is referenced by
/// its root surface and checked for liveness on every use.
pub struct GrabState {
    pub surface: WlSurface,
    /// For a move: cursor offset within the view at grab time. For a
    /// resize: absolute cursor position at grab time.
    pub original_cursor: Point<f64, Logical>,
    pub original_geo: Rectangle<i32, Logical>,
    pub edges: ResizeEdge,
}

pub struct Cursor {
    pub location: Point<f64, Logical>,
    pub mode: CursorMode,
    pub grab: Option<GrabState>,

    /// Image forced by the mousegrabber; takes precedence over everything.
    compositor_image: Option<String>,
    /// Image requested by the pointer-focused client, or the default.
    client_status: CursorImageStatus,
    /// While true, every output repaints on pointer motion so the forced
    /// image stays in sync everywhere.
    pub lock_software: bool,

    theme: CursorThemeManager,
    uploaded: Option<UploadedImage>,
}

struct UploadedImage {
    name: String,
    scale: u32,
    buffer: MemoryRenderBuffer,
    hotspot: Point<i32, Logical>,
}

enum ResolvedCursor {
    Hidden,
    Named(String),
    Surface(WlSurface),
}

impl Cursor {
    pub fn new() -> Self {
        Self {
            location: Point::default(),
            mode: CursorMode::Passthrough,
            grab: None,
            compositor_image: None,
            client_status: CursorImageStatus::default_named(),
            lock_software: false,
            theme: CursorThemeManager::load(),
            uploaded: None,
        }
    }

    pub fn begin_move(&mut self, surface: WlSurface, view_geo: Rectangle<i32, Logical>) {
        self.mode = CursorMode::Move;
        self.grab = Some(GrabState {
            surface,
            original_cursor: self.location - view_geo.loc.to_f64(),
            original_geo: view_geo,
            edges: ResizeEdge::empty(),
        });
    }

    pub fn begin_resize(
        &mut self,
        surface: WlSurface,
        view_geo: Rectangle<i32, Logical>,
        edges: ResizeEdge,
    ) {
        self.mode = CursorMode::Resize;
        self.grab = Some(GrabState {
            surface,
            original_cursor: self.location,
            original_geo: view_geo,
            edges,
        });
    }

    pub fn end_grab(&mut self) {
        self.mode = CursorMode::Passthrough;
        self.grab = None;
    }

    /// Record the image the pointer-focused client asked for.
    pub fn set_client_image(&mut self, status: CursorImageStatus) {
        self.client_status = status;
    }

    /// Drop a client-provided image, falling back to the default.
    pub fn clear_client_image(&mut self) {
        self.client_status = CursorImageStatus::default_named();
    }

    pub fn has_client_image(&self) -> bool {
        matches!(self.client_status, CursorImageStatus::Surface(_))
    }

    /// Set or clear the image forced by the mousegrabber. Software cursors
    /// stay locked for as long as a forced image is in effect.
    pub fn set_compositor_image(&mut self, name: Option<String>) {
        self.lock_software = name.is_some();
        self.compositor_image = name;
    }

    fn resolve(&self) -> ResolvedCursor {
        if let Some(name) = &self.compositor_image {
            return ResolvedCursor::Named(name.clone());
        }
        match &self.client_status {
            CursorImageStatus::Hidden => ResolvedCursor::Hidden,
            CursorImageStatus::Surface(surface) => ResolvedCursor::Surface(surface.clone()),
            CursorImageStatus::Named(icon) => ResolvedCursor::Named(icon.name().to_owned()),
        }
    }

    /// Render elements for the cursor image with the hotspot applied.
    /// `location` is the cursor position in the output's physical
    /// coordinates.
    pub fn render_elements<R>(
        &mut self,
        renderer: &mut R,
        location: Point<i32, Physical>,
        scale: Scale<f64>,
    ) -> Vec<PointerRenderElement<R>>
    where
        R: Renderer + ImportAll + ImportMem,
        R::TextureId: Texture + Clone + Send + 'static,
    {
        match self.resolve() {
            ResolvedCursor::Hidden => Vec::new(),
            ResolvedCursor::Surface(surface) => {
                let hotspot = with_states(&surface, |states| {
                    states
                        .data_map
                        .get::<CursorImageSurfaceData>()
                        .map(|data| data.lock().unwrap().hotspot)
                        .unwrap_or_default()
                });
                let origin = location - hotspot.to_physical_precise_round(scale);
                render_elements_from_surface_tree(
                    renderer,
                    &surface,
                    origin,
                    scale,
                    1.0,
                    Kind::Cursor,
                )
            }
            ResolvedCursor::Named(name) => {
                let int_scale = (scale.x.max(scale.y).ceil() as u32).max(1);
                let image = self.ensure_uploaded(&name, int_scale);
                let origin = location - image.hotspot.to_physical_precise_round(scale);
                MemoryRenderBufferRenderElement::from_buffer(
                    renderer,
                    origin.to_f64(),
                    &image.buffer,
                    None,
                    None,
                    None,
                    Kind::Cursor,
                )
                .map(|element| vec![PointerRenderElement::from(element)])
                .unwrap_or_default()
            }
        }
    }

    fn ensure_uploaded(&mut self, name: &str, scale: u32) -> &UploadedImage {
        let stale = self
            .uploaded
            .as_ref()
            .is_none_or(|up| up.name != name || up.scale != scale);
        if stale {
            let image = self.theme.image(name, scale);
            let buffer = MemoryRenderBuffer::from_slice(
                &image.pixels_rgba,
                Fourcc::Abgr8888,
                (image.width as i32, image.height as i32),
                scale as i32,
                Transform::Normal,
                None,
            );
            self.uploaded = Some(UploadedImage {
                name: name.to_owned(),
                scale,
                buffer,
                hotspot: Point::from((image.xhot as i32, image.yhot as i32)),
            });
        }
        self.uploaded.as_ref().expect("cursor image just uploaded")
    }
}

render_elements! {
    pub PointerRenderElement<R> where R: ImportAll + ImportMem;
    Surface=WaylandSurfaceRenderElement<R>,
    Memory=MemoryRenderBufferRenderElement<R>,
}

/// Compute the rectangle for an interactive resize: dragged edges follow the
/// cursor delta from the grab origin, the opposite edges stay anchored, and
/// neither dimension may drop below 1 or invert.
pub fn resize_rectangle(
    current: Rectangle<i32, Logical>,
    original: Rectangle<i32, Logical>,
    grab_origin: Point<f64, Logical>,
    cursor: Point<f64, Logical>,
    edges: ResizeEdge,
) -> Rectangle<i32, Logical> {
    let dx = (cursor.x - grab_origin.x) as i32;
    let dy = (cursor.y - grab_origin.y) as i32;

    let mut new_geo = Rectangle::new(current.loc, original.size);

    if edges.contains(ResizeEdge::TOP) {
        new_geo.loc.y = original.loc.y + dy;
        new_geo.size.h -= dy;
        if new_geo.size.h < 1 {
            new_geo.loc.y += new_geo.size.h - 1;
            new_geo.size.h = 1;
        }
    } else if edges.contains(ResizeEdge::BOTTOM) {
        new_geo.size.h += dy;
        new_geo.size.h = new_geo.size.h.max(1);
    }

    if edges.contains(ResizeEdge::LEFT) {
        new_geo.loc.x = original.loc.x + dx;
        new_geo.size.w -= dx;
        if new_geo.size.w < 1 {
            new_geo.loc.x += new_geo.size.w - 1;
            new_geo.size.w = 1;
        }
    } else if edges.contains(ResizeEdge::RIGHT) {
        new_geo.size.w += dx;
        new_geo.size.w = new_geo.size.w.max(1);
    }

    new_geo
}

pub struct CursorThemeManager {
    theme: CursorTheme,
    size: u32,
    icons: HashMap<String, Vec<Image>>,
}

impl CursorThemeManager {
    pub fn load() -> Self {
        let name = std::env::var("XCURSOR_THEME").unwrap_or_else(|_| "default".to_owned());
        let size = std::env::var("XCURSOR_SIZE")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(24);

        Self {
            theme: CursorTheme::load(&name),
            size,
            icons: HashMap::new(),
        }
    }

    /// Look up the named cursor, falling back to the default image and then
    /// to a built-in arrow when the theme is missing entirely.
    pub fn image(&mut self, name: &str, scale: u32) -> Image {
        if !self.icons.contains_key(name) {
            let icons = load_icon(&self.theme, name)
                .or_else(|| {
                    warn!(name, "cursor image not found in theme, using default");
                    load_icon(&self.theme, DEFAULT_CURSOR)
                })
                .unwrap_or_else(|| vec![fallback_cursor_image()]);
            self.icons.insert(name.to_owned(), icons);
        }

        let target = self.size.saturating_mul(scale);
        self.icons[name]
            .iter()
            .min_by_key(|image| (target as i32 - image.size as i32).abs())
            .expect("cursor icon list is never empty")
            .clone()
    }
}

fn load_icon(theme: &CursorTheme, name: &str) -> Option<Vec<Image>> {
    let path = theme.load_icon(name)?;
    let mut data = Vec::new();
    File::open(path)
        .and_then(|mut file| file.read_to_end(&mut data))
        .ok()?;
    parse_xcursor(&data)
}

/// A plain black arrow with a white outline, used when no xcursor theme can
/// be found at all.
fn fallback_cursor_image() -> Image {
    const SIZE: usize = 24;
    let mut pixels = vec![0u8; SIZE * SIZE * 4];

    for y in 0..18usize {
        // A triangular wedge widening by half a pixel per row.
        let span = y / 2 + 1;
        for x in 0..span.min(SIZE) {
            let edge = x == 0 || x == span - 1 || y == 17;
            let color: [u8; 4] = if edge {
                [255, 255, 255, 255]
            } else {
                [0, 0, 0, 255]
            };
            let offset = (y * SIZE + x) * 4;
            pixels[offset..offset + 4].copy_from_slice(&color);
        }
    }

    Image {
        size: SIZE as u32,
        width: SIZE as u32,
        height: SIZE as u32,
        xhot: 0,
        yhot: 0,
        delay: 0,
        pixels_rgba: pixels,
        pixels_argb: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: i32, y: i32, w: i32, h: i32) -> Rectangle<i32, Logical> {
        Rectangle::new(Point::from((x, y)), smithay::utils::Size::from((w, h)))
    }

    fn point(x: f64, y: f64) -> Point<f64, Logical> {
        Point::from((x, y))
    }

    #[test]
    fn top_left_resize_proposes_shrunk_rectangle() {
        let original = rect(200, 200, 400, 300);
        let edges = ResizeEdge::TOP | ResizeEdge::LEFT;
        let geo = resize_rectangle(
            original,
            original,
            point(200.0, 200.0),
            point(250.0, 230.0),
            edges,
        );
        assert_eq!(geo, rect(250, 230, 350, 270));
    }

    #[test]
    fn bottom_right_resize_only_grows() {
        let original = rect(100, 100, 400, 300);
        let edges = ResizeEdge::BOTTOM | ResizeEdge::RIGHT;
        let geo = resize_rectangle(
            original,
            original,
            point(500.0, 400.0),
            point(560.0, 450.0),
            edges,
        );
        assert_eq!(geo, rect(100, 100, 460, 350));
    }

    #[test]
    fn resize_never_inverts_the_rectangle() {
        let original = rect(100, 100, 200, 150);
        // Drag the top edge far past the bottom edge.
        let geo = resize_rectangle(
            original,
            original,
            point(150.0, 100.0),
            point(150.0, 900.0),
            ResizeEdge::TOP,
        );
        assert_eq!(geo.size.h, 1);
        // The bottom edge stays anchored at y = 250.
        assert_eq!(geo.loc.y + geo.size.h, 250);

        // Same for dragging the left edge past the right edge.
        let geo = resize_rectangle(
            original,
            original,
            point(100.0, 150.0),
            point(900.0, 150.0),
            ResizeEdge::LEFT,
        );
        assert_eq!(geo.size.w, 1);
        assert_eq!(geo.loc.x + geo.size.w, 300);
    }

    #[test]
    fn unrelated_edges_stay_untouched() {
        let original = rect(100, 100, 200, 150);
        let geo = resize_rectangle(
            original,
            original,
            point(300.0, 175.0),
            point(340.0, 500.0),
            ResizeEdge::RIGHT,
        );
        assert_eq!(geo, rect(100, 100, 240, 150));
    }
}
