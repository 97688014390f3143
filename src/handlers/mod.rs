mod compositor;
mod layer_shell;
mod xdg_shell;
mod xwayland;

use smithay::{
    delegate_data_device, delegate_output, delegate_seat,
    input::{Seat, SeatHandler, SeatState, pointer::CursorImageStatus},
    reexports::wayland_server::{Resource, protocol::wl_surface::WlSurface},
    wayland::{
        output::OutputHandler,
        selection::{
            SelectionHandler,
            data_device::{
                ClientDndGrabHandler, DataDeviceHandler, DataDeviceState, ServerDndGrabHandler,
                set_data_device_focus,
            },
        },
    },
};

use crate::{
    Glacier, delegate_keybindings, delegate_mousegrabber,
    protocols::{
        keybindings::{KeybindingsHandler, KeybindingsState},
        mousegrabber::{MousegrabberHandler, MousegrabberState},
    },
};

impl SeatHandler for Glacier {
    type KeyboardFocus = WlSurface;
    type PointerFocus = WlSurface;
    type TouchFocus = WlSurface;

    fn seat_state(&mut self) -> &mut SeatState<Self> {
        &mut self.seat_state
    }

    fn focus_changed(&mut self, seat: &Seat<Self>, focused: Option<&WlSurface>) {
        let dh = &self.display_handle;
        let client = focused.and_then(|surface| dh.get_client(surface.id()).ok());
        set_data_device_focus(dh, seat, client);
    }

    fn cursor_image(&mut self, _seat: &Seat<Self>, image: CursorImageStatus) {
        // smithay only forwards set_cursor requests from the client that owns
        // the pointer focus, so the request is already vetted here.
        self.cursor.set_client_image(image);
        self.queue_cursor_redraw();
    }
}

delegate_seat!(Glacier);

impl SelectionHandler for Glacier {
    type SelectionUserData = ();
}

impl DataDeviceHandler for Glacier {
    fn data_device_state(&self) -> &DataDeviceState {
        &self.data_device_state
    }
}

impl ClientDndGrabHandler for Glacier {}
impl ServerDndGrabHandler for Glacier {}

delegate_data_device!(Glacier);

impl OutputHandler for Glacier {}

delegate_output!(Glacier);

impl KeybindingsHandler for Glacier {
    fn keybindings_state(&mut self) -> &mut KeybindingsState {
        &mut self.keybindings
    }
}

delegate_keybindings!(Glacier);

impl MousegrabberHandler for Glacier {
    fn mousegrabber_state(&mut self) -> &mut MousegrabberState {
        &mut self.mousegrabber
    }

    fn mouse_grabbed(&mut self, cursor: String) {
        // Taking the grab cancels any interactive move or resize and forces
        // the named image onto every output.
        self.cursor.end_grab();
        self.cursor.set_compositor_image(Some(cursor));
        self.damage_all_outputs();
    }

    fn mouse_released(&mut self) {
        self.cursor.set_compositor_image(None);
        self.damage_all_outputs();
    }
}

delegate_mousegrabber!(Glacier);
