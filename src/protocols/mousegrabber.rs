//! The privileged mousegrabber protocol: a single controller client can take
//! over the cursor image and receive all pointer input in place of the
//! normal focus-based delivery.

use smithay::reexports::wayland_server::{
    Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource, backend::ClientId,
};

use crate::state::Glacier;

pub use generated::zglacier_mousegrabber_v1::{self, ZglacierMousegrabberV1};

mod generated {
    use smithay::reexports::wayland_server;

    pub mod __interfaces {
        use smithay::reexports::wayland_server::backend as wayland_backend;
        wayland_scanner::generate_interfaces!("protocols/glacier-mousegrabber-unstable-v1.xml");
    }
    use self::__interfaces::*;

    wayland_scanner::generate_server_code!("protocols/glacier-mousegrabber-unstable-v1.xml");
}

const VERSION: u32 = 1;

pub struct MousegrabberState {
    resource: Option<ZglacierMousegrabberV1>,
}

pub trait MousegrabberHandler {
    fn mousegrabber_state(&mut self) -> &mut MousegrabberState;

    /// A controller took the grab; `cursor` is the xcursor image it wants.
    fn mouse_grabbed(&mut self, cursor: String);

    /// The grab ended, by request or because the grabber died.
    fn mouse_released(&mut self);
}

impl MousegrabberState {
    pub fn new<D>(display: &DisplayHandle) -> Self
    where
        D: GlobalDispatch<ZglacierMousegrabberV1, ()>,
        D: Dispatch<ZglacierMousegrabberV1, ()>,
        D: 'static,
    {
        display.create_global::<D, ZglacierMousegrabberV1, _>(VERSION, ());
        Self { resource: None }
    }

    fn live_resource(&self) -> Option<&ZglacierMousegrabberV1> {
        self.resource.as_ref().filter(|resource| resource.is_alive())
    }

    pub fn is_grabbed(&self) -> bool {
        self.live_resource().is_some()
    }
}

/// Stream the current cursor position to the grabber, if any.
pub fn notify_motion(state: &Glacier) {
    let Some(resource) = state.mousegrabber.live_resource() else {
        return;
    };
    let location = state.cursor.location;
    resource.mouse_moved(location.x as i32, location.y as i32);
}

/// Stream a button event to the grabber, if any.
pub fn notify_button(state: &Glacier, pressed: bool, button: u32) {
    let Some(resource) = state.mousegrabber.live_resource() else {
        return;
    };
    let location = state.cursor.location;
    let button_state = if pressed {
        zglacier_mousegrabber_v1::ButtonState::Pressed
    } else {
        zglacier_mousegrabber_v1::ButtonState::Released
    };
    resource.mouse_button(
        location.x as i32,
        location.y as i32,
        button_state,
        button,
    );
}

impl<D> GlobalDispatch<ZglacierMousegrabberV1, (), D> for MousegrabberState
where
    D: GlobalDispatch<ZglacierMousegrabberV1, ()>,
    D: Dispatch<ZglacierMousegrabberV1, ()>,
    D: MousegrabberHandler,
{
    fn bind(
        _state: &mut D,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<ZglacierMousegrabberV1>,
        _global_data: &(),
        data_init: &mut DataInit<'_, D>,
    ) {
        data_init.init(resource, ());
    }
}

impl<D> Dispatch<ZglacierMousegrabberV1, (), D> for MousegrabberState
where
    D: Dispatch<ZglacierMousegrabberV1, ()>,
    D: MousegrabberHandler,
{
    fn request(
        state: &mut D,
        _client: &Client,
        resource: &ZglacierMousegrabberV1,
        request: <ZglacierMousegrabberV1 as Resource>::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, D>,
    ) {
        match request {
            zglacier_mousegrabber_v1::Request::GrabMouse { cursor } => {
                let mousegrabber = state.mousegrabber_state();
                if mousegrabber.live_resource().is_some() {
                    resource.post_error(
                        zglacier_mousegrabber_v1::Error::AlreadyGrabbed,
                        "mouse has already been grabbed",
                    );
                    return;
                }
                mousegrabber.resource = Some(resource.clone());
                tracing::debug!("mousegrabber: mouse grabbed");
                state.mouse_grabbed(cursor);
            }
            zglacier_mousegrabber_v1::Request::ReleaseMouse => {
                let mousegrabber = state.mousegrabber_state();
                if mousegrabber.live_resource() != Some(resource) {
                    resource.post_error(
                        zglacier_mousegrabber_v1::Error::NotGrabbed,
                        "mouse has not been grabbed by this client",
                    );
                    return;
                }
                mousegrabber.resource = None;
                tracing::debug!("mousegrabber: mouse released");
                state.mouse_released();
            }
        }
    }

    fn destroyed(
        state: &mut D,
        _client: ClientId,
        resource: &ZglacierMousegrabberV1,
        _data: &(),
    ) {
        let mousegrabber = state.mousegrabber_state();
        if mousegrabber.resource.as_ref() == Some(resource) {
            mousegrabber.resource = None;
            state.mouse_released();
        }
    }
}

#[macro_export]
macro_rules! delegate_mousegrabber {
    ($ty: ty) => {
        smithay::reexports::wayland_server::delegate_global_dispatch!($ty: [
            $crate::protocols::mousegrabber::ZglacierMousegrabberV1: ()
        ] => $crate::protocols::mousegrabber::MousegrabberState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            $crate::protocols::mousegrabber::ZglacierMousegrabberV1: ()
        ] => $crate::protocols::mousegrabber::MousegrabberState);
    };
}
