use std::process::Stdio;

use smithay::{
    delegate_xwayland_shell,
    reexports::wayland_server::protocol::wl_surface::WlSurface,
    utils::{Logical, Rectangle},
    wayland::xwayland_shell::{XWaylandShellHandler, XWaylandShellState},
    xwayland::{
        X11Surface, X11Wm, XWayland, XWaylandEvent, XwmHandler,
        xwm::{Reorder, WmWindowProperty, XwmId},
    },
};

use crate::{
    Glacier,
    view::{View, ViewRole},
};

impl Glacier {
    /// Spawn XWayland and attach the window manager once it reports ready.
    pub fn start_xwayland(&mut self) {
        let spawned = XWayland::spawn(
            &self.display_handle,
            None,
            std::iter::empty::<(String, String)>(),
            true,
            Stdio::null(),
            Stdio::null(),
            |_| {},
        );
        let (xwayland, client) = match spawned {
            Ok(spawned) => spawned,
            Err(err) => {
                tracing::warn!("failed to spawn XWayland: {err}");
                return;
            }
        };

        let wm_handle = self.loop_handle.clone();
        let result = self
            .loop_handle
            .insert_source(xwayland, move |event, _, state| match event {
                XWaylandEvent::Ready {
                    x11_socket,
                    display_number,
                    ..
                } => {
                    match X11Wm::start_wm(wm_handle.clone(), x11_socket, client.clone()) {
                        Ok(wm) => {
                            state.xwm = Some(wm);
                            state.xdisplay = Some(display_number);
                            // Safety: the event loop is single threaded.
                            unsafe {
                                std::env::set_var("DISPLAY", format!(":{display_number}"));
                            }
                            tracing::info!(display = display_number, "XWayland ready");
                        }
                        Err(err) => {
                            tracing::warn!("failed to start the X11 window manager: {err}");
                        }
                    }
                }
                XWaylandEvent::Error => {
                    tracing::warn!("XWayland failed to start");
                }
            });
        if let Err(err) = result {
            tracing::warn!("failed to insert the XWayland event source: {err}");
        }
    }

    fn x11_view_index(&self, window: &X11Surface) -> Option<usize> {
        self.views.iter().position(
            |view| matches!(&view.role, ViewRole::X11(existing) if existing == window),
        )
    }
}

impl XWaylandShellHandler for Glacier {
    fn xwayland_shell_state(&mut self) -> &mut XWaylandShellState {
        &mut self.xwayland_shell_state
    }

    fn surface_associated(&mut self, _xwm: XwmId, _surface: WlSurface, _window: X11Surface) {
        // The view starts receiving commits through the associated surface;
        // nothing to do until the first buffer arrives.
    }
}

impl XwmHandler for Glacier {
    fn xwm_state(&mut self, _xwm: XwmId) -> &mut X11Wm {
        self.xwm.as_mut().expect("xwm event without a window manager")
    }

    fn new_window(&mut self, _xwm: XwmId, _window: X11Surface) {}

    fn new_override_redirect_window(&mut self, _xwm: XwmId, _window: X11Surface) {}

    fn map_window_request(&mut self, _xwm: XwmId, window: X11Surface) {
        if let Err(err) = window.set_mapped(true) {
            tracing::warn!("failed to map X11 window: {err}");
            return;
        }
        let mut view = View::new(ViewRole::X11(window.clone()));
        view.geo = window.geometry();
        self.views.insert(0, view);
    }

    fn mapped_override_redirect_window(&mut self, _xwm: XwmId, window: X11Surface) {
        let mut view = View::new(ViewRole::X11(window.clone()));
        view.geo = window.geometry();
        self.views.insert(0, view);
    }

    fn unmapped_window(&mut self, _xwm: XwmId, window: X11Surface) {
        if let Some(index) = self.x11_view_index(&window) {
            self.remove_view(index);
        }
    }

    fn destroyed_window(&mut self, _xwm: XwmId, window: X11Surface) {
        if let Some(index) = self.x11_view_index(&window) {
            self.remove_view(index);
        }
    }

    fn configure_request(
        &mut self,
        _xwm: XwmId,
        window: X11Surface,
        x: Option<i32>,
        y: Option<i32>,
        w: Option<u32>,
        h: Option<u32>,
        _reorder: Option<Reorder>,
    ) {
        // Floating stack: grant what the client asked for.
        let mut geo = self
            .x11_view_index(&window)
            .map(|index| self.views[index].geo)
            .unwrap_or_else(|| window.geometry());
        if let Some(x) = x {
            geo.loc.x = x;
        }
        if let Some(y) = y {
            geo.loc.y = y;
        }
        if let Some(w) = w {
            geo.size.w = w as i32;
        }
        if let Some(h) = h {
            geo.size.h = h as i32;
        }

        if let Err(err) = window.configure(Some(geo)) {
            tracing::warn!("failed to configure X11 window: {err}");
            return;
        }
        self.apply_x11_geometry(&window, geo);
    }

    fn configure_notify(
        &mut self,
        _xwm: XwmId,
        window: X11Surface,
        geometry: Rectangle<i32, Logical>,
        _above: Option<smithay::xwayland::xwm::X11Window>,
    ) {
        // Override-redirect windows position themselves.
        self.apply_x11_geometry(&window, geometry);
    }

    fn property_notify(&mut self, _xwm: XwmId, _window: X11Surface, _property: WmWindowProperty) {}

    fn resize_request(
        &mut self,
        _xwm: XwmId,
        window: X11Surface,
        _button: u32,
        edges: smithay::xwayland::xwm::ResizeEdge,
    ) {
        let Some(index) = self.x11_view_index(&window) else {
            return;
        };
        if !self.view_is_pointer_focused(index) {
            return;
        }
        let Some(surface) = self.views[index].wl_surface() else {
            return;
        };
        let geo = self.views[index].geo;
        self.cursor.begin_resize(surface, geo, edges.into());
    }

    fn move_request(&mut self, _xwm: XwmId, window: X11Surface, _button: u32) {
        let Some(index) = self.x11_view_index(&window) else {
            return;
        };
        if !self.view_is_pointer_focused(index) {
            return;
        }
        let Some(surface) = self.views[index].wl_surface() else {
            return;
        };
        let geo = self.views[index].geo;
        self.cursor.begin_move(surface, geo);
    }
}

impl Glacier {
    fn apply_x11_geometry(&mut self, window: &X11Surface, geometry: Rectangle<i32, Logical>) {
        let Some(index) = self.x11_view_index(window) else {
            return;
        };
        let old_geo = self.views[index].geo;
        if old_geo == geometry {
            return;
        }
        if self.views[index].mapped {
            self.damage_rect(old_geo);
            self.damage_rect(geometry);
        }
        self.views[index].geo = geometry;
    }
}

delegate_xwayland_shell!(Glacier);
