//! Development backend: one winit window acts as the single output.

use std::time::Duration;

use smithay::{
    backend::{
        renderer::gles::GlesRenderer,
        winit::{self, WinitEvent, WinitEventLoop, WinitGraphicsBackend},
    },
    output::{Mode, Output, PhysicalProperties, Subpixel},
    reexports::{
        calloop::{
            EventLoop,
            timer::{TimeoutAction, Timer},
        },
        winit::platform::pump_events::PumpStatus,
    },
    utils::{Physical, Size, Transform},
};

use crate::{CompositorError, Glacier, render};

pub struct WinitData {
    pub backend: WinitGraphicsBackend<GlesRenderer>,
    pub output: Output,
}

pub fn init_winit(
    event_loop: &mut EventLoop<'static, Glacier>,
    state: &mut Glacier,
) -> Result<(), CompositorError> {
    let (backend, mut winit) = winit::init::<GlesRenderer>()
        .map_err(|err| CompositorError::Backend(format!("failed to initialize winit: {err:?}")))?;

    let mode = Mode {
        size: backend.window_size(),
        refresh: 60_000,
    };
    let output = Output::new(
        "winit".to_string(),
        PhysicalProperties {
            size: (0, 0).into(),
            subpixel: Subpixel::Unknown,
            make: "Glacier".into(),
            model: "Winit".into(),
        },
    );
    let _global = output.create_global::<Glacier>(&state.display_handle);
    output.change_current_state(
        Some(mode),
        Some(Transform::Flipped180),
        None,
        Some((0, 0).into()),
    );
    output.set_preferred(mode);

    state.add_output(output.clone());
    state.winit = Some(WinitData { backend, output });

    event_loop
        .handle()
        .insert_source(Timer::immediate(), move |_, _, state| {
            winit_dispatch(&mut winit, state);
            TimeoutAction::ToDuration(Duration::from_millis(16))
        })
        .map_err(|err| {
            CompositorError::EventLoop(format!("failed to schedule winit dispatch: {err}"))
        })?;

    Ok(())
}

fn winit_dispatch(winit: &mut WinitEventLoop, state: &mut Glacier) {
    let mut events = Vec::new();
    let status = winit.dispatch_new_events(|event| events.push(event));

    if let PumpStatus::Exit(_) = status {
        state.loop_signal.stop();
        return;
    }

    for event in events {
        match event {
            WinitEvent::Resized { size, .. } => resize(state, size),
            WinitEvent::Input(event) => state.handle_input_event(event),
            WinitEvent::Redraw => {
                if let Some(output) = state.winit.as_ref().map(|data| data.output.clone())
                    && let Some(index) = state.output_index(&output)
                {
                    state.outputs[index].queue_redraw();
                }
            }
            WinitEvent::CloseRequested => state.loop_signal.stop(),
            _ => {}
        }
    }

    render(state);
}

fn resize(state: &mut Glacier, size: Size<i32, Physical>) {
    let Some(output) = state.winit.as_ref().map(|data| data.output.clone()) else {
        return;
    };

    let mode = Mode {
        size,
        refresh: 60_000,
    };
    output.change_current_state(Some(mode), None, None, None);
    output.set_preferred(mode);

    if let Some(index) = state.output_index(&output) {
        state.arrange_layers(index);
        state.outputs[index].queue_redraw();
    }
}

/// Render the winit output if a repaint is queued. Transient failures skip
/// the frame and keep the damage for the next one.
pub fn render(state: &mut Glacier) {
    let Some(mut data) = state.winit.take() else {
        return;
    };

    if let Some(index) = state.output_index(&data.output)
        && state.outputs[index].redraw_queued
    {
        let age = data.backend.buffer_age().unwrap_or(0);
        let result = match data.backend.bind() {
            Ok((renderer, mut framebuffer)) => {
                render::render_output_frame(state, index, renderer, &mut framebuffer, age)
            }
            Err(err) => Err(CompositorError::Backend(format!(
                "failed to bind the winit backend: {err:?}"
            ))),
        };

        match result {
            Ok(Some(damage)) => {
                if let Err(err) = data.backend.submit(Some(&*damage)) {
                    tracing::warn!("failed to submit frame: {err:?}");
                    state.outputs[index].queue_redraw();
                }
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!("skipping frame: {err}");
                state.outputs[index].queue_redraw();
            }
        }
    }

    state.winit = Some(data);
}
