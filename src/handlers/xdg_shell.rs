use smithay::{
    delegate_xdg_shell,
    desktop::PopupKind,
    reexports::{
        wayland_protocols::xdg::shell::server::xdg_toplevel,
        wayland_server::protocol::{wl_seat, wl_surface::WlSurface},
    },
    utils::Serial,
    wayland::shell::xdg::{
        Configure, PopupSurface, PositionerState, ToplevelSurface, XdgShellHandler, XdgShellState,
    },
};

use crate::{
    Glacier,
    view::{View, ViewRole},
};

impl XdgShellHandler for Glacier {
    fn xdg_shell_state(&mut self) -> &mut XdgShellState {
        &mut self.xdg_shell_state
    }

    fn new_toplevel(&mut self, surface: ToplevelSurface) {
        // Views enter the stack unmapped at the head; they map on the first
        // commit that carries a buffer.
        self.views.insert(0, View::new(ViewRole::Xdg(surface)));
    }

    fn new_popup(&mut self, surface: PopupSurface, _positioner: PositionerState) {
        if let Err(err) = self.popups.track_popup(PopupKind::Xdg(surface)) {
            tracing::warn!("error while tracking popup: {err:?}");
        }
    }

    fn grab(&mut self, _surface: PopupSurface, _seat: wl_seat::WlSeat, _serial: Serial) {}

    fn reposition_request(
        &mut self,
        surface: PopupSurface,
        positioner: PositionerState,
        token: u32,
    ) {
        surface.with_pending_state(|state| {
            state.geometry = positioner.get_geometry();
            state.positioner = positioner;
        });
        surface.send_repositioned(token);
    }

    fn move_request(&mut self, surface: ToplevelSurface, _seat: wl_seat::WlSeat, _serial: Serial) {
        let Some(index) = self.view_index_for_surface(surface.wl_surface()) else {
            tracing::debug!("move request from a surface with no view, ignoring");
            return;
        };
        // Only the pointer-focused view may start an interactive move.
        if !self.view_is_pointer_focused(index) {
            return;
        }
        let geo = self.views[index].geo;
        self.cursor.begin_move(surface.wl_surface().clone(), geo);
    }

    fn resize_request(
        &mut self,
        surface: ToplevelSurface,
        _seat: wl_seat::WlSeat,
        _serial: Serial,
        edges: xdg_toplevel::ResizeEdge,
    ) {
        let Some(index) = self.view_index_for_surface(surface.wl_surface()) else {
            tracing::debug!("resize request from a surface with no view, ignoring");
            return;
        };
        if !self.view_is_pointer_focused(index) {
            return;
        }
        let geo = self.views[index].geo;
        self.cursor
            .begin_resize(surface.wl_surface().clone(), geo, edges.into());
    }

    fn ack_configure(&mut self, surface: WlSurface, configure: Configure) {
        if let Configure::Toplevel(configure) = configure
            && let Some(index) = self.view_index_for_surface(&surface)
        {
            self.views[index].last_acked = Some(configure.serial);
        }
    }

    fn toplevel_destroyed(&mut self, surface: ToplevelSurface) {
        if let Some(index) = self.view_index_for_surface(surface.wl_surface()) {
            self.remove_view(index);
        }
    }
}

delegate_xdg_shell!(Glacier);
