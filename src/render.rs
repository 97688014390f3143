//! Per-output rendering. Elements are handed to the damage tracker ordered
//! top to bottom: software cursor, overlay and top layers, views, bottom and
//! background layers, over a black clear (yellow in debug mode).

use std::time::Duration;

use smithay::{
    backend::renderer::{
        ImportAll, ImportMem, Renderer, Texture,
        element::{
            Kind,
            surface::{WaylandSurfaceRenderElement, render_elements_from_surface_tree},
        },
    },
    desktop::{PopupManager, utils::send_frames_surface_tree},
    render_elements,
    utils::{Physical, Rectangle, Scale},
    wayland::shell::wlr_layer::Layer,
};

use crate::{CompositorError, cursor::PointerRenderElement, state::Glacier};

const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];
const DEBUG_CLEAR_COLOR: [f32; 4] = [1.0, 1.0, 0.0, 1.0];

render_elements! {
    pub OutputRenderElement<R> where R: ImportAll + ImportMem;
    Surface=WaylandSurfaceRenderElement<R>,
    Pointer=PointerRenderElement<R>,
}

/// Render one frame for the output at `index`. Returns the damage submitted
/// to the damage tracker, or `None` when nothing needed painting and the
/// frame can be dropped without a swap.
pub fn render_output_frame<R>(
    state: &mut Glacier,
    index: usize,
    renderer: &mut R,
    framebuffer: &mut R::Framebuffer<'_>,
    age: usize,
) -> Result<Option<Vec<Rectangle<i32, Physical>>>, CompositorError>
where
    R: Renderer + ImportAll + ImportMem,
    R::TextureId: Texture + Clone + Send + 'static,
{
    let debug = state.debug_render;
    let elements = collect_elements(state, index, renderer);

    let clear_color = if debug { DEBUG_CLEAR_COLOR } else { CLEAR_COLOR };
    // Debug mode repaints the whole output every frame.
    let age = if debug { 0 } else { age };

    let (damage, output) = {
        let record = &mut state.outputs[index];
        let result = record
            .damage_tracker
            .render_output(renderer, framebuffer, age, &elements, clear_color)
            .map_err(|err| CompositorError::Renderer(err.to_string()))?;
        record.redraw_queued = false;
        (result.damage.cloned(), record.output.clone())
    };

    if damage.is_some() {
        let time: Duration = state.clock.now().into();

        for view in state.views.iter().filter(|view| view.mapped) {
            let Some(surface) = view.wl_surface() else {
                continue;
            };
            send_frames_surface_tree(&surface, &output, time, Some(Duration::ZERO), |_, _| {
                Some(output.clone())
            });
            for (popup, _) in PopupManager::popups_for_surface(&surface) {
                send_frames_surface_tree(
                    popup.wl_surface(),
                    &output,
                    time,
                    Some(Duration::ZERO),
                    |_, _| Some(output.clone()),
                );
            }
        }

        for list in &state.outputs[index].layers {
            for mapped in list.iter().filter(|mapped| mapped.mapped) {
                send_frames_surface_tree(
                    mapped.surface.wl_surface(),
                    &output,
                    time,
                    Some(Duration::ZERO),
                    |_, _| Some(output.clone()),
                );
            }
        }
    }

    Ok(damage)
}

fn collect_elements<R>(
    state: &mut Glacier,
    index: usize,
    renderer: &mut R,
) -> Vec<OutputRenderElement<R>>
where
    R: Renderer + ImportAll + ImportMem,
    R::TextureId: Texture + Clone + Send + 'static,
{
    let output_loc = state.outputs[index].location;
    let scale = Scale::from(
        state.outputs[index]
            .output
            .current_scale()
            .fractional_scale(),
    );

    let mut elements = Vec::new();

    // The software cursor is always on top. It is painted whenever the
    // output repaints, even with no other damage on screen.
    let cursor_pos = (state.cursor.location - output_loc.to_f64())
        .to_physical(scale)
        .to_i32_round();
    elements.extend(
        state
            .cursor
            .render_elements(renderer, cursor_pos, scale)
            .into_iter()
            .map(OutputRenderElement::from),
    );

    for layer in [Layer::Overlay, Layer::Top] {
        collect_layer_elements(state, index, layer, renderer, scale, &mut elements);
    }

    for view in state.views.iter().filter(|view| view.mapped) {
        let Some(surface) = view.wl_surface() else {
            continue;
        };
        let view_loc = view.geo.loc - output_loc;

        for (popup, offset) in PopupManager::popups_for_surface(&surface) {
            let popup_loc = (view_loc + offset).to_physical_precise_round(scale);
            elements.extend(
                render_elements_from_surface_tree(
                    renderer,
                    popup.wl_surface(),
                    popup_loc,
                    scale,
                    1.0,
                    Kind::Unspecified,
                )
                .into_iter()
                .map(|element: WaylandSurfaceRenderElement<R>| OutputRenderElement::from(element)),
            );
        }

        elements.extend(
            render_elements_from_surface_tree(
                renderer,
                &surface,
                view_loc.to_physical_precise_round(scale),
                scale,
                1.0,
                Kind::Unspecified,
            )
            .into_iter()
            .map(|element: WaylandSurfaceRenderElement<R>| OutputRenderElement::from(element)),
        );
    }

    for layer in [Layer::Bottom, Layer::Background] {
        collect_layer_elements(state, index, layer, renderer, scale, &mut elements);
    }

    elements
}

fn collect_layer_elements<R>(
    state: &Glacier,
    index: usize,
    layer: Layer,
    renderer: &mut R,
    scale: Scale<f64>,
    elements: &mut Vec<OutputRenderElement<R>>,
) where
    R: Renderer + ImportAll + ImportMem,
    R::TextureId: Texture + Clone + Send + 'static,
{
    // Iterate newest first so later-mapped surfaces draw over their elders.
    for mapped in state.outputs[index]
        .layers(layer)
        .iter()
        .rev()
        .filter(|mapped| mapped.mapped)
    {
        let loc = mapped.geo.loc.to_physical_precise_round(scale);
        elements.extend(
            render_elements_from_surface_tree(
                renderer,
                mapped.surface.wl_surface(),
                loc,
                scale,
                1.0,
                Kind::Unspecified,
            )
            .into_iter()
            .map(|element: WaylandSurfaceRenderElement<R>| OutputRenderElement::from(element)),
        );
    }
}
