//! Application views: toplevel windows regardless of which shell created
//! them.
//!
//! A view tracks two rectangles: `geo`, the committed geometry used for
//! hit-testing and rendering, and `pending_geometry`, the geometry most
//! recently proposed to the client. For shells that hand back a configure
//! serial the proposal stays pending until the client acknowledges it; the
//! X11 bridge has no serials and applies on the very next commit.

use smithay::{
    backend::renderer::utils::with_renderer_surface_state,
    desktop::{PopupManager, WindowSurfaceType, utils::under_from_surface_tree},
    reexports::{
        wayland_protocols::xdg::shell::server::xdg_toplevel,
        wayland_server::protocol::wl_surface::WlSurface,
    },
    utils::{Logical, Point, Rectangle, Serial, Size},
    wayland::{
        compositor::with_states,
        shell::xdg::{SurfaceCachedState, ToplevelSurface},
    },
    xwayland::X11Surface,
};

use crate::state::Glacier;

pub enum ViewRole {
    Xdg(ToplevelSurface),
    X11(X11Surface),
}

pub struct View {
    pub role: ViewRole,
    pub mapped: bool,

    /// Committed geometry in layout coordinates. Width and height track the
    /// client's last committed size except in the middle of an interactive
    /// move or resize.
    pub geo: Rectangle<i32, Logical>,

    /// Geometry most recently proposed to the client.
    pub pending_geometry: Rectangle<i32, Logical>,
    /// Configure serial of the pending proposal, when the shell uses serials.
    pub pending_serial: Option<Serial>,
    pub is_pending: bool,

    /// Most recent configure serial the client acknowledged.
    pub last_acked: Option<Serial>,
}

impl View {
    pub fn new(role: ViewRole) -> Self {
        Self {
            role,
            mapped: false,
            geo: Rectangle::default(),
            pending_geometry: Rectangle::default(),
            pending_serial: None,
            is_pending: false,
            last_acked: None,
        }
    }

    /// The main wl_surface backing this view. X11 windows have none until
    /// XWayland associates one.
    pub fn wl_surface(&self) -> Option<WlSurface> {
        match &self.role {
            ViewRole::Xdg(toplevel) => Some(toplevel.wl_surface().clone()),
            ViewRole::X11(surface) => surface.wl_surface(),
        }
    }

    pub fn alive(&self) -> bool {
        match &self.role {
            ViewRole::Xdg(toplevel) => toplevel.alive(),
            ViewRole::X11(surface) => surface.alive(),
        }
    }

    /// Hit-test the view's surface tree at a view-local point, returning the
    /// surface under the point and that surface's origin within the view.
    /// Popups sit above the main tree and win ties.
    pub fn surface_under(
        &self,
        location: Point<f64, Logical>,
    ) -> Option<(WlSurface, Point<f64, Logical>)> {
        let root = self.wl_surface()?;

        for (popup, offset) in PopupManager::popups_for_surface(&root) {
            let relative = location - offset.to_f64();
            if let Some((surface, origin)) =
                under_from_surface_tree(popup.wl_surface(), relative, (0, 0), WindowSurfaceType::ALL)
            {
                return Some((surface, origin.to_f64() + offset.to_f64()));
            }
        }

        under_from_surface_tree(&root, location, (0, 0), WindowSurfaceType::ALL)
            .map(|(surface, origin)| (surface, origin.to_f64()))
    }

    /// Size of the client's last commit: the xdg window geometry when the
    /// client set one, the buffer extents otherwise.
    pub fn committed_size(&self) -> Size<i32, Logical> {
        let Some(surface) = self.wl_surface() else {
            return Size::default();
        };
        let geometry = match &self.role {
            ViewRole::Xdg(_) => with_states(&surface, |states| {
                states.cached_state.get::<SurfaceCachedState>().current().geometry
            }),
            ViewRole::X11(_) => None,
        };
        geometry
            .map(|geo| geo.size)
            .unwrap_or_else(|| buffer_size(&surface))
    }

    /// Propose a new geometry to the client. The proposal lands in
    /// `pending_geometry` and takes effect once acknowledged (§ commit).
    pub fn request_geometry(&mut self, new_geo: Rectangle<i32, Logical>) {
        match &self.role {
            ViewRole::Xdg(toplevel) => {
                toplevel.with_pending_state(|state| {
                    state.size = Some(new_geo.size);
                });
                // An unchanged state needs no round trip; treat it as already
                // acknowledged so the position still applies on commit.
                self.pending_serial = toplevel.send_pending_configure().or(self.last_acked);
            }
            ViewRole::X11(surface) => {
                self.pending_serial = None;
                if let Err(err) = surface.configure(Some(new_geo)) {
                    tracing::warn!("failed to configure X11 surface: {err}");
                }
            }
        }
        self.pending_geometry = new_geo;
        self.is_pending = true;
    }

    pub fn set_activated(&self, activated: bool) {
        match &self.role {
            ViewRole::Xdg(toplevel) => {
                toplevel.with_pending_state(|state| {
                    if activated {
                        state.states.set(xdg_toplevel::State::Activated);
                    } else {
                        state.states.unset(xdg_toplevel::State::Activated);
                    }
                });
                if toplevel.is_initial_configure_sent() {
                    toplevel.send_pending_configure();
                }
            }
            ViewRole::X11(surface) => {
                if let Err(err) = surface.set_activated(activated) {
                    tracing::warn!("failed to update X11 activation: {err}");
                }
            }
        }
    }
}

fn buffer_size(surface: &WlSurface) -> Size<i32, Logical> {
    with_renderer_surface_state(surface, |state| state.surface_size())
        .flatten()
        .unwrap_or_default()
}

pub fn has_buffer(surface: &WlSurface) -> bool {
    with_renderer_surface_state(surface, |state| state.buffer().is_some()).unwrap_or(false)
}

/// Commit handling for view root surfaces. Returns false when the surface
/// does not belong to a view.
pub fn handle_commit(state: &mut Glacier, surface: &WlSurface) -> bool {
    let Some(index) = state.view_index_for_surface(surface) else {
        return false;
    };

    // xdg toplevels must receive their initial configure before the first
    // buffer can be attached.
    if let ViewRole::Xdg(toplevel) = &state.views[index].role
        && !toplevel.is_initial_configure_sent()
    {
        let _ = toplevel.send_configure();
        return true;
    }

    let buffer_attached = has_buffer(surface);

    if !state.views[index].mapped {
        if buffer_attached {
            map_view(state, index);
        }
        return true;
    }

    if !buffer_attached {
        let geo = state.views[index].geo;
        state.views[index].mapped = false;
        state.damage_rect(geo);
        return true;
    }

    // Adopt the committed size; a size change damages the whole view both
    // before and after.
    let committed = state.views[index].committed_size();
    let old_geo = state.views[index].geo;
    if committed != old_geo.size && committed.w > 0 && committed.h > 0 {
        state.damage_rect(old_geo);
        state.views[index].geo.size = committed;
        state.damage_rect(Rectangle::new(old_geo.loc, committed));
    } else {
        state.damage_rect(old_geo);
    }

    let view = &state.views[index];
    if view.is_pending {
        let acknowledged = match (&view.role, view.pending_serial) {
            // The X11 bridge has no serials; apply on the next commit.
            (ViewRole::X11(_), _) => true,
            (_, Some(pending)) => view.last_acked.is_some_and(|acked| acked >= pending),
            (_, None) => false,
        };

        if acknowledged {
            let pending = view.pending_geometry;
            let current = state.views[index].geo;
            let aligned = aligned_position(current, pending, current.size);
            if aligned != current.loc {
                state.damage_rect(current);
                state.views[index].geo.loc = aligned;
                state.damage_rect(Rectangle::new(aligned, current.size));
            }
            state.views[index].pending_serial = None;
            state.views[index].is_pending = false;
        }
    }

    true
}

fn map_view(state: &mut Glacier, index: usize) {
    let size = state.views[index].committed_size();
    state.views[index].geo.size = size;
    state.views[index].mapped = true;
    let geo = state.views[index].geo;
    state.damage_rect(geo);
    state.focus_view(index);
}

/// Align the view position after an acknowledged configure so that the edge
/// the user is dragging stays fixed under the cursor: on an axis whose
/// position is pending, the far edge of the proposed rectangle anchors the
/// freshly committed size.
fn aligned_position(
    current: Rectangle<i32, Logical>,
    pending: Rectangle<i32, Logical>,
    committed: Size<i32, Logical>,
) -> Point<i32, Logical> {
    let mut loc = current.loc;
    if pending.loc.x != current.loc.x {
        loc.x = pending.loc.x + pending.size.w - committed.w;
    }
    if pending.loc.y != current.loc.y {
        loc.y = pending.loc.y + pending.size.h - committed.h;
    }
    loc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: i32, y: i32, w: i32, h: i32) -> Rectangle<i32, Logical> {
        Rectangle::new(Point::from((x, y)), Size::from((w, h)))
    }

    #[test]
    fn top_left_resize_keeps_opposite_corner_anchored() {
        // Resize from the top-left corner: the client was asked to become
        // 350x270 at (250, 230) and committed exactly that size.
        let current = rect(200, 200, 350, 270);
        let pending = rect(250, 230, 350, 270);
        let loc = aligned_position(current, pending, Size::from((350, 270)));
        assert_eq!(loc, Point::from((250, 230)));
        // Bottom-right corner stays at (600, 500).
        assert_eq!((loc.x + 350, loc.y + 270), (600, 500));
    }

    #[test]
    fn client_committing_short_keeps_anchored_edge() {
        // The client answered a 350x270 proposal with 340x270: the right
        // edge must stay put, so x shifts by the difference.
        let current = rect(200, 200, 340, 270);
        let pending = rect(250, 230, 350, 270);
        let loc = aligned_position(current, pending, Size::from((340, 270)));
        assert_eq!(loc, Point::from((260, 230)));
        assert_eq!(loc.x + 340, 600);
    }

    #[test]
    fn unmoved_axes_are_left_alone() {
        // A bottom-right resize never proposes a new origin.
        let current = rect(100, 100, 500, 400);
        let pending = rect(100, 100, 500, 400);
        let loc = aligned_position(current, pending, Size::from((500, 400)));
        assert_eq!(loc, Point::from((100, 100)));
    }
}
