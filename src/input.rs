//! Input routing: keyboard events run through the terminator chord and the
//! keybinding filter before reaching clients; pointer events are interpreted
//! by the cursor mode state machine.

use smithay::{
    backend::input::{
        AbsolutePositionEvent, Axis, AxisSource, ButtonState, Event, InputBackend, InputEvent,
        KeyState, KeyboardKeyEvent, PointerAxisEvent, PointerButtonEvent, PointerMotionEvent,
    },
    input::{
        keyboard::{FilterResult, Keysym},
        pointer::{AxisFrame, ButtonEvent, MotionEvent},
    },
    utils::{Rectangle, SERIAL_COUNTER},
};

use crate::{
    cursor::{CursorMode, resize_rectangle},
    protocols::{keybindings, mousegrabber},
    state::Glacier,
};

enum KeyAction {
    Quit,
    Filtered,
}

impl Glacier {
    pub fn handle_input_event<B: InputBackend>(&mut self, event: InputEvent<B>) {
        match event {
            InputEvent::Keyboard { event } => self.handle_keyboard_event::<B>(event),
            InputEvent::PointerMotion { event } => self.handle_pointer_motion::<B>(event),
            InputEvent::PointerMotionAbsolute { event } => {
                self.handle_pointer_motion_absolute::<B>(event)
            }
            InputEvent::PointerButton { event } => self.handle_pointer_button::<B>(event),
            InputEvent::PointerAxis { event } => self.handle_pointer_axis::<B>(event),
            _ => {}
        }
    }

    fn handle_keyboard_event<B: InputBackend>(&mut self, event: B::KeyboardKeyEvent) {
        let serial = SERIAL_COUNTER.next_serial();
        let time = Event::time_msec(&event);
        let key_state = event.state();

        let keyboard = self.keyboard();
        // Checked up front: querying focus from inside the filter would
        // re-enter the keyboard state.
        let controller_focused = keyboard
            .current_focus()
            .is_some_and(|surface| self.keybindings.surface_is_controller(&surface));

        let action = keyboard.input::<KeyAction, _>(
            self,
            event.key_code(),
            key_state,
            serial,
            time,
            |state, modifiers, handle| {
                let pressed = key_state == KeyState::Pressed;

                // The escape hatch works no matter what the controller
                // registered.
                if pressed
                    && modifiers.ctrl
                    && modifiers.shift
                    && handle.modified_sym() == Keysym::Escape
                {
                    return FilterResult::Intercept(KeyAction::Quit);
                }

                let keycode = handle.raw_code().raw();
                let mask = modifiers.serialized.depressed
                    | modifiers.serialized.latched
                    | modifiers.serialized.locked;
                if keybindings::filter_key(state, keycode, mask, pressed, controller_focused, time)
                {
                    return FilterResult::Intercept(KeyAction::Filtered);
                }

                FilterResult::Forward
            },
        );

        if let Some(KeyAction::Quit) = action {
            tracing::info!("terminator chord pressed, shutting down");
            self.loop_signal.stop();
        }
    }

    fn handle_pointer_motion<B: InputBackend>(&mut self, event: B::PointerMotionEvent) {
        let delta = (event.delta_x(), event.delta_y()).into();
        self.cursor.location += delta;
        self.clamp_cursor_location();
        self.process_cursor_motion(event.time_msec());
    }

    fn handle_pointer_motion_absolute<B: InputBackend>(
        &mut self,
        event: B::PointerMotionAbsoluteEvent,
    ) {
        let Some(index) = self.active_output_index() else {
            return;
        };
        let output_geo = self.outputs[index].geometry();

        self.cursor.location = output_geo.loc.to_f64()
            + smithay::utils::Point::<f64, smithay::utils::Logical>::from((
                event.x_transformed(output_geo.size.w),
                event.y_transformed(output_geo.size.h),
            ));
        self.clamp_cursor_location();
        self.process_cursor_motion(event.time_msec());
    }

    /// Interpret a new cursor position according to the cursor mode.
    pub fn process_cursor_motion(&mut self, time: u32) {
        match self.cursor.mode {
            CursorMode::Move => match self.grabbed_view_index() {
                Some(index) => {
                    let grab = self.cursor.grab.as_ref().expect("move mode without grab");
                    let new_loc = (self.cursor.location - grab.original_cursor).to_i32_round();
                    let old_geo = self.views[index].geo;
                    self.damage_rect(old_geo);
                    self.views[index].geo.loc = new_loc;
                    self.damage_rect(Rectangle::new(new_loc, old_geo.size));
                }
                None => self.cursor.end_grab(),
            },
            CursorMode::Resize => match self.grabbed_view_index() {
                Some(index) => {
                    let grab = self.cursor.grab.as_ref().expect("resize mode without grab");
                    let new_geo = resize_rectangle(
                        self.views[index].geo,
                        grab.original_geo,
                        grab.original_cursor,
                        self.cursor.location,
                        grab.edges,
                    );
                    self.views[index].request_geometry(new_geo);
                }
                None => self.cursor.end_grab(),
            },
            // A mousegrabber replaces focus-based delivery entirely; clients
            // see neither enter nor motion while the grab is held.
            CursorMode::Passthrough if !self.mousegrabber.is_grabbed() => {
                let under = self.view_under(self.cursor.location);
                if under.is_none() && self.cursor.has_client_image() {
                    self.cursor.clear_client_image();
                }

                let pointer = self.pointer();
                pointer.motion(
                    self,
                    under.map(|(_, surface, origin)| (surface, origin)),
                    &MotionEvent {
                        location: self.cursor.location,
                        serial: SERIAL_COUNTER.next_serial(),
                        time,
                    },
                );
                pointer.frame(self);
            }
            CursorMode::Passthrough => {}
        }

        self.update_active_output();
        mousegrabber::notify_motion(self);
        self.queue_cursor_redraw();
    }

    fn handle_pointer_button<B: InputBackend>(&mut self, event: B::PointerButtonEvent) {
        let serial = SERIAL_COUNTER.next_serial();
        let button = event.button_code();
        let button_state = event.state();

        // A mousegrabber consumes button events entirely.
        if self.mousegrabber.is_grabbed() {
            mousegrabber::notify_button(
                self,
                button_state == ButtonState::Pressed,
                button,
            );
            return;
        }

        let pointer = self.pointer();
        pointer.button(
            self,
            &ButtonEvent {
                button,
                state: button_state,
                serial,
                time: event.time_msec(),
            },
        );
        pointer.frame(self);

        if button_state == ButtonState::Released {
            self.cursor.end_grab();
        } else if let Some((index, _, _)) = self.view_under(self.cursor.location) {
            self.focus_view(index);
        }
    }

    fn handle_pointer_axis<B: InputBackend>(&mut self, event: B::PointerAxisEvent) {
        let horizontal = event
            .amount(Axis::Horizontal)
            .unwrap_or_else(|| event.amount_v120(Axis::Horizontal).unwrap_or(0.0) * 3.0 / 120.0);
        let vertical = event
            .amount(Axis::Vertical)
            .unwrap_or_else(|| event.amount_v120(Axis::Vertical).unwrap_or(0.0) * 3.0 / 120.0);

        let mut frame = AxisFrame::new(event.time_msec()).source(event.source());
        if horizontal != 0.0 {
            frame = frame.value(Axis::Horizontal, horizontal);
            if let Some(discrete) = event.amount_v120(Axis::Horizontal) {
                frame = frame.v120(Axis::Horizontal, discrete as i32);
            }
        }
        if vertical != 0.0 {
            frame = frame.value(Axis::Vertical, vertical);
            if let Some(discrete) = event.amount_v120(Axis::Vertical) {
                frame = frame.v120(Axis::Vertical, discrete as i32);
            }
        }
        if event.source() == AxisSource::Finger {
            if event.amount(Axis::Horizontal) == Some(0.0) {
                frame = frame.stop(Axis::Horizontal);
            }
            if event.amount(Axis::Vertical) == Some(0.0) {
                frame = frame.stop(Axis::Vertical);
            }
        }

        let pointer = self.pointer();
        pointer.axis(self, frame);
        pointer.frame(self);
    }

    fn grabbed_view_index(&self) -> Option<usize> {
        let grab = self.cursor.grab.as_ref()?;
        self.view_index_for_surface(&grab.surface)
            .filter(|&index| self.views[index].alive())
    }

    fn clamp_cursor_location(&mut self) {
        let Some(bounds) = self
            .outputs
            .iter()
            .map(|record| record.geometry())
            .reduce(|acc, geo| acc.merge(geo))
        else {
            return;
        };

        self.cursor.location.x = self.cursor.location.x.clamp(
            bounds.loc.x as f64,
            (bounds.loc.x + bounds.size.w) as f64 - 1.0,
        );
        self.cursor.location.y = self.cursor.location.y.clamp(
            bounds.loc.y as f64,
            (bounds.loc.y + bounds.size.h) as f64 - 1.0,
        );
    }

    /// The software cursor needs a repaint of whatever output it is on.
    /// With software cursors locked, every output repaints so the forced
    /// image stays in sync with motion.
    pub(crate) fn queue_cursor_redraw(&mut self) {
        if self.cursor.lock_software {
            self.damage_all_outputs();
            return;
        }

        let location = self.cursor.location;
        let index = self
            .outputs
            .iter()
            .position(|record| record.geometry().to_f64().contains(location))
            .or_else(|| self.active_output_index());
        if let Some(index) = index {
            self.outputs[index].queue_redraw();
        }
    }
}
