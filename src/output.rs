use smithay::{
    backend::renderer::damage::OutputDamageTracker,
    output::Output,
    reexports::wayland_server::protocol::wl_surface::WlSurface,
    utils::{Logical, Point, Rectangle, Size},
    wayland::shell::wlr_layer::Layer,
};

use crate::layers::MappedLayer;

pub const LAYER_COUNT: usize = 4;

/// Index into [`OutputState::layers`] for a wlr-layer-shell layer.
pub fn layer_index(layer: Layer) -> usize {
    match layer {
        Layer::Background => 0,
        Layer::Bottom => 1,
        Layer::Top => 2,
        Layer::Overlay => 3,
    }
}

/// One physical output and the compositor state attached to it.
///
/// The four layer lists are kept in insertion order; the arranger and the
/// renderer both rely on that order being stable.
pub struct OutputState {
    pub output: Output,
    pub location: Point<i32, Logical>,
    pub damage_tracker: OutputDamageTracker,
    pub layers: [Vec<MappedLayer>; LAYER_COUNT],
    /// Output-local area left over after exclusive layer surfaces claimed
    /// their zones.
    pub usable_area: Rectangle<i32, Logical>,
    pub redraw_queued: bool,
}

impl OutputState {
    pub fn new(output: Output, location: Point<i32, Logical>) -> Self {
        let damage_tracker = OutputDamageTracker::from_output(&output);
        let mut state = Self {
            output,
            location,
            damage_tracker,
            layers: Default::default(),
            usable_area: Rectangle::default(),
            redraw_queued: true,
        };
        state.usable_area = Rectangle::from_size(state.resolution());
        state
    }

    /// Effective resolution in logical pixels.
    pub fn resolution(&self) -> Size<i32, Logical> {
        let scale = self.output.current_scale().integer_scale();
        self.output
            .current_mode()
            .map(|mode| mode.size.to_logical(scale))
            .unwrap_or_default()
    }

    /// Rectangle covered by this output in layout coordinates.
    pub fn geometry(&self) -> Rectangle<i32, Logical> {
        Rectangle::new(self.location, self.resolution())
    }

    pub fn queue_redraw(&mut self) {
        self.redraw_queued = true;
    }

    pub fn layers(&self, layer: Layer) -> &[MappedLayer] {
        &self.layers[layer_index(layer)]
    }

    /// Find a layer surface on this output by its root wl_surface.
    pub fn layer_for_surface(&self, surface: &WlSurface) -> Option<(usize, usize)> {
        self.layers.iter().enumerate().find_map(|(layer_idx, list)| {
            list.iter()
                .position(|mapped| mapped.surface.wl_surface() == surface)
                .map(|pos| (layer_idx, pos))
        })
    }
}
