use smithay::{
    desktop::PopupManager,
    input::{Seat, SeatState, keyboard::KeyboardHandle, pointer::PointerHandle},
    output::Output,
    reexports::{
        calloop::{Interest, LoopHandle, LoopSignal, Mode, PostAction, generic::Generic},
        wayland_server::{
            Display, DisplayHandle,
            backend::{ClientData, ClientId, DisconnectReason},
            protocol::wl_surface::WlSurface,
        },
    },
    utils::{Clock, Logical, Monotonic, Point, Rectangle, SERIAL_COUNTER, Serial},
    wayland::{
        compositor::{CompositorClientState, CompositorState, get_parent},
        output::OutputManagerState,
        selection::data_device::DataDeviceState,
        shell::{wlr_layer::WlrLayerShellState, xdg::XdgShellState},
        shm::ShmState,
        socket::ListeningSocketSource,
        xwayland_shell::XWaylandShellState,
    },
    xwayland::X11Wm,
};
use std::{
    ffi::OsString,
    process::{Command, Stdio},
    sync::Arc,
    time::Instant,
};

use crate::{
    CompositorError,
    backend::winit::WinitData,
    cursor::Cursor,
    layers,
    output::OutputState,
    protocols::{keybindings::KeybindingsState, mousegrabber::MousegrabberState},
    view::View,
};

pub struct Glacier {
    pub display_handle: DisplayHandle,
    pub loop_handle: LoopHandle<'static, Glacier>,
    pub loop_signal: LoopSignal,
    pub socket_name: OsString,
    pub start_time: Instant,
    pub clock: Clock<Monotonic>,
    /// Clear damaged regions in yellow and repaint whole outputs.
    pub debug_render: bool,

    // smithay protocol state
    pub compositor_state: CompositorState,
    pub xdg_shell_state: XdgShellState,
    pub shm_state: ShmState,
    pub output_manager_state: OutputManagerState,
    pub data_device_state: DataDeviceState,
    pub seat_state: SeatState<Self>,
    pub layer_shell_state: WlrLayerShellState,
    pub xwayland_shell_state: XWaylandShellState,
    pub popups: PopupManager,

    pub seat: Seat<Self>,

    /// Application views, ordered top to bottom.
    pub views: Vec<View>,
    pub outputs: Vec<OutputState>,
    /// The output that most recently contained the cursor. Checked against
    /// the output list on every use; falls back to the newest output.
    active_output: Option<Output>,
    pub cursor: Cursor,

    pub keybindings: KeybindingsState,
    pub mousegrabber: MousegrabberState,

    pub xwm: Option<X11Wm>,
    pub xdisplay: Option<u32>,

    pub winit: Option<WinitData>,
}

impl Glacier {
    pub fn new(
        display: Display<Self>,
        loop_handle: LoopHandle<'static, Glacier>,
        loop_signal: LoopSignal,
    ) -> Result<Self, CompositorError> {
        let start_time = Instant::now();
        let display_handle = display.handle();

        let compositor_state = CompositorState::new::<Self>(&display_handle);
        let xdg_shell_state = XdgShellState::new::<Self>(&display_handle);
        let shm_state = ShmState::new::<Self>(&display_handle, vec![]);
        let output_manager_state = OutputManagerState::new_with_xdg_output::<Self>(&display_handle);
        let data_device_state = DataDeviceState::new::<Self>(&display_handle);
        let layer_shell_state = WlrLayerShellState::new::<Self>(&display_handle);
        let xwayland_shell_state = XWaylandShellState::new::<Self>(&display_handle);
        let popups = PopupManager::default();
        let keybindings = KeybindingsState::new::<Self>(&display_handle);
        let mousegrabber = MousegrabberState::new::<Self>(&display_handle);

        let mut seat_state = SeatState::new();
        let mut seat = seat_state.new_wl_seat(&display_handle, "seat0");
        seat.add_keyboard(Default::default(), 600, 25)
            .map_err(|err| CompositorError::Backend(format!("failed to add keyboard: {err}")))?;
        seat.add_pointer();

        let socket_name = init_wayland_listener(display, &loop_handle);
        // Safety: called during startup before any threads are spawned.
        unsafe { std::env::set_var("WAYLAND_DISPLAY", &socket_name) };
        tracing::info!(socket = ?socket_name, "listening for wayland clients");

        Ok(Self {
            display_handle,
            loop_handle,
            loop_signal,
            socket_name,
            start_time,
            clock: Clock::new(),
            debug_render: false,

            compositor_state,
            xdg_shell_state,
            shm_state,
            output_manager_state,
            data_device_state,
            seat_state,
            layer_shell_state,
            xwayland_shell_state,
            popups,

            seat,
            views: Vec::new(),
            outputs: Vec::new(),
            active_output: None,
            cursor: Cursor::new(),

            keybindings,
            mousegrabber,

            xwm: None,
            xdisplay: None,

            winit: None,
        })
    }

    pub fn pointer(&self) -> PointerHandle<Self> {
        self.seat.get_pointer().expect("pointer not initialized")
    }

    pub fn keyboard(&self) -> KeyboardHandle<Self> {
        self.seat.get_keyboard().expect("keyboard not initialized")
    }

    // ---- views ----------------------------------------------------------

    pub fn view_index_for_surface(&self, surface: &WlSurface) -> Option<usize> {
        self.views
            .iter()
            .position(|view| view.wl_surface().as_ref() == Some(surface))
    }

    /// Topmost view whose surface tree contains the given layout point.
    /// Returns the view index, the surface under the point, and that
    /// surface's origin in layout coordinates.
    pub fn view_under(
        &self,
        location: Point<f64, Logical>,
    ) -> Option<(usize, WlSurface, Point<f64, Logical>)> {
        self.views
            .iter()
            .enumerate()
            .filter(|(_, view)| view.mapped)
            .find_map(|(index, view)| {
                let local = location - view.geo.loc.to_f64();
                view.surface_under(local)
                    .map(|(surface, origin)| (index, surface, origin + view.geo.loc.to_f64()))
            })
    }

    /// Focus a view: deactivate the old focus, raise the view to the head of
    /// the stack, activate it and hand it keyboard focus. Focusing the view
    /// that already holds focus does nothing.
    pub fn focus_view(&mut self, index: usize) {
        let Some(surface) = self.views[index].wl_surface() else {
            return;
        };
        let keyboard = self.keyboard();
        if keyboard.current_focus().as_ref() == Some(&surface) {
            return;
        }

        if let Some(previous) = keyboard.current_focus()
            && let Some(previous_index) = self.view_index_for_surface(&previous)
            && previous_index != index
        {
            self.views[previous_index].set_activated(false);
        }

        let view = self.views.remove(index);
        self.views.insert(0, view);
        self.views[0].set_activated(true);
        let geo = self.views[0].geo;

        keyboard.set_focus(self, Some(surface), SERIAL_COUNTER.next_serial());
        // Repaint the whole view so any activation-dependent decoration
        // updates become visible.
        self.damage_rect(geo);
    }

    pub fn set_keyboard_focus(&mut self, target: Option<WlSurface>, serial: Serial) {
        let keyboard = self.keyboard();
        if keyboard.current_focus() == target {
            return;
        }
        if let Some(surface) = &target
            && let Some(index) = self.view_index_for_surface(surface)
        {
            self.focus_view(index);
            return;
        }
        keyboard.set_focus(self, target, serial);
    }

    /// Remove a view from the stack, cancelling any interactive grab bound
    /// to it and moving focus to the next view if it held focus.
    pub fn remove_view(&mut self, index: usize) {
        let view = self.views.remove(index);
        let surface = view.wl_surface();
        if view.mapped {
            self.damage_rect(view.geo);
        }

        if let Some(grab) = &self.cursor.grab
            && Some(&grab.surface) == surface.as_ref()
        {
            self.cursor.end_grab();
        }

        let keyboard = self.keyboard();
        let focus_gone = match keyboard.current_focus() {
            Some(focused) => Some(&focused) == surface.as_ref(),
            None => true,
        };
        if focus_gone && !self.views.is_empty() {
            self.focus_view(0);
        }
    }

    /// Whether the pointer focus currently sits inside the given view's
    /// surface tree. Interactive move/resize requests are only honored for
    /// pointer-focused views.
    pub fn view_is_pointer_focused(&self, index: usize) -> bool {
        let Some(root) = self.views[index].wl_surface() else {
            return false;
        };
        let Some(pointer) = self.seat.get_pointer() else {
            return false;
        };
        pointer
            .current_focus()
            .is_some_and(|focus| surface_root(&focus) == root)
    }

    // ---- outputs and damage ---------------------------------------------

    pub fn add_output(&mut self, output: Output) {
        let x = self
            .outputs
            .iter()
            .map(|record| record.location.x + record.resolution().w)
            .max()
            .unwrap_or(0);
        let mut record = OutputState::new(output.clone(), Point::from((x, 0)));
        layers::arrange_output(&mut record);
        self.outputs.push(record);
        if self.active_output.is_none() {
            self.active_output = Some(output);
        }
        self.damage_all_outputs();
    }

    pub fn remove_output(&mut self, output: &Output) {
        let Some(index) = self
            .outputs
            .iter()
            .position(|record| &record.output == output)
        else {
            return;
        };
        let record = self.outputs.remove(index);
        for list in record.layers {
            for mapped in list {
                mapped.surface.send_close();
            }
        }
        if self.active_output.as_ref() == Some(output) {
            self.active_output = self.outputs.last().map(|record| record.output.clone());
        }
    }

    /// The output currently designated active, falling back to the newest
    /// output when the remembered one is gone.
    pub fn active_output_index(&self) -> Option<usize> {
        self.active_output
            .as_ref()
            .and_then(|active| {
                self.outputs
                    .iter()
                    .position(|record| &record.output == active)
            })
            .or(self.outputs.len().checked_sub(1))
    }

    /// Re-evaluate the active output from the cursor position.
    pub fn update_active_output(&mut self) {
        let location = self.cursor.location;
        if let Some(record) = self
            .outputs
            .iter()
            .find(|record| record.geometry().to_f64().contains(location))
            && self.active_output.as_ref() != Some(&record.output)
        {
            self.active_output = Some(record.output.clone());
        }
    }

    pub fn output_index(&self, output: &Output) -> Option<usize> {
        self.outputs
            .iter()
            .position(|record| &record.output == output)
    }

    /// Queue a repaint on every output intersecting the rectangle.
    pub fn damage_rect(&mut self, rect: Rectangle<i32, Logical>) {
        for record in &mut self.outputs {
            if record.geometry().overlaps(rect) {
                record.queue_redraw();
            }
        }
    }

    pub fn damage_all_outputs(&mut self) {
        for record in &mut self.outputs {
            record.queue_redraw();
        }
    }

    /// Arrange the layers of one output, then give keyboard focus to the
    /// topmost keyboard-interactive layer surface, or back to the focused
    /// view when none claims it.
    pub fn arrange_layers(&mut self, output_index: usize) {
        layers::arrange_output(&mut self.outputs[output_index]);

        let serial = SERIAL_COUNTER.next_serial();
        match layers::topmost_interactive(&self.outputs[output_index]) {
            Some(surface) => self.set_keyboard_focus(Some(surface), serial),
            None => {
                let keyboard = self.keyboard();
                let focus_on_layer = keyboard.current_focus().is_some_and(|focused| {
                    self.outputs
                        .iter()
                        .any(|record| record.layer_for_surface(&focused).is_some())
                });
                if focus_on_layer
                    && let Some(index) = self.views.iter().position(|view| view.mapped)
                {
                    self.focus_view(index);
                }
            }
        }
    }

    // ---- misc -----------------------------------------------------------

    /// Run a shell command with the environment pointed at this compositor.
    pub fn spawn_command(&self, command: &str) {
        if command.trim().is_empty() {
            return;
        }

        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c")
            .arg(command)
            .env("WAYLAND_DISPLAY", &self.socket_name)
            .stdin(Stdio::null());
        if let Some(display) = self.xdisplay {
            cmd.env("DISPLAY", format!(":{display}"));
        }

        match cmd.spawn() {
            Ok(child) => tracing::info!(command, pid = child.id(), "spawned command"),
            Err(err) => tracing::warn!(command, "failed to spawn command: {err}"),
        }
    }
}

/// Walk up to the root of a surface tree.
pub fn surface_root(surface: &WlSurface) -> WlSurface {
    let mut root = surface.clone();
    while let Some(parent) = get_parent(&root) {
        root = parent;
    }
    root
}

pub fn init_wayland_listener(
    display: Display<Glacier>,
    loop_handle: &LoopHandle<'static, Glacier>,
) -> OsString {
    let listening_socket = ListeningSocketSource::new_auto().expect("failed to create socket");
    let socket_name = listening_socket.socket_name().to_os_string();

    loop_handle
        .insert_source(listening_socket, move |client_stream, _, state| {
            if let Err(err) = state
                .display_handle
                .insert_client(client_stream, Arc::new(ClientState::default()))
            {
                tracing::warn!("failed to insert wayland client: {err}");
            }
        })
        .expect("failed to init wayland listener");

    loop_handle
        .insert_source(
            Generic::new(display, Interest::READ, Mode::Level),
            move |_, display, state| {
                // Safety: we don't drop the display
                unsafe {
                    display.get_mut().dispatch_clients(state).unwrap();
                }
                Ok(PostAction::Continue)
            },
        )
        .expect("failed to init display event source");

    socket_name
}

#[derive(Default)]
pub struct ClientState {
    pub compositor_state: CompositorClientState,
}

impl ClientData for ClientState {
    fn initialized(&self, client_id: ClientId) {
        tracing::debug!(?client_id, "wayland client initialized");
    }

    fn disconnected(&self, client_id: ClientId, reason: DisconnectReason) {
        tracing::debug!(?client_id, ?reason, "wayland client disconnected");
    }
}
