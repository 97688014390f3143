use smithay::{
    delegate_layer_shell,
    desktop::PopupKind,
    output::Output,
    reexports::wayland_server::protocol::{wl_output::WlOutput, wl_surface::WlSurface},
    utils::Rectangle,
    wayland::shell::{
        wlr_layer::{
            Layer, LayerSurface as WlrLayerSurface, WlrLayerShellHandler, WlrLayerShellState,
        },
        xdg::PopupSurface,
    },
};

use crate::{Glacier, layers::MappedLayer, output::layer_index, view::has_buffer};

impl WlrLayerShellHandler for Glacier {
    fn shell_state(&mut self) -> &mut WlrLayerShellState {
        &mut self.layer_shell_state
    }

    fn new_layer_surface(
        &mut self,
        surface: WlrLayerSurface,
        wl_output: Option<WlOutput>,
        layer: Layer,
        namespace: String,
    ) {
        // Clients that did not pick an output get the active one.
        let output_index = wl_output
            .as_ref()
            .and_then(Output::from_resource)
            .and_then(|output| self.output_index(&output))
            .or_else(|| self.active_output_index());

        let Some(output_index) = output_index else {
            tracing::warn!(namespace, "no output for new layer surface");
            surface.send_close();
            return;
        };

        tracing::debug!(
            namespace,
            requested_layer = ?layer,
            output = %self.outputs[output_index].output.name(),
            "new layer surface"
        );

        self.outputs[output_index].layers[layer_index(layer)].push(MappedLayer::new(surface));
        // Arrangement happens once the surface commits its initial state.
    }

    fn new_popup(&mut self, _parent: WlrLayerSurface, popup: PopupSurface) {
        if let Err(err) = self.popups.track_popup(PopupKind::Xdg(popup)) {
            tracing::warn!("error while tracking layer popup: {err:?}");
        }
    }

    fn layer_destroyed(&mut self, surface: WlrLayerSurface) {
        let position = self.outputs.iter().enumerate().find_map(|(output_idx, record)| {
            record
                .layer_for_surface(surface.wl_surface())
                .map(|(layer_idx, pos)| (output_idx, layer_idx, pos))
        });
        let Some((output_idx, layer_idx, pos)) = position else {
            return;
        };

        let mapped = self.outputs[output_idx].layers[layer_idx].remove(pos);
        if mapped.mapped {
            let layout_rect = Rectangle::new(
                self.outputs[output_idx].location + mapped.geo.loc,
                mapped.geo.size,
            );
            self.damage_rect(layout_rect);
        }
        self.arrange_layers(output_idx);
    }
}

delegate_layer_shell!(Glacier);

/// Commit handling for layer surface roots. Returns false when the surface
/// is not a layer surface.
pub fn handle_commit(state: &mut Glacier, root: &WlSurface) -> bool {
    let position = state.outputs.iter().enumerate().find_map(|(output_idx, record)| {
        record
            .layer_for_surface(root)
            .map(|(layer_idx, pos)| (output_idx, layer_idx, pos))
    });
    let Some((output_idx, layer_idx, pos)) = position else {
        return false;
    };

    let output_loc = state.outputs[output_idx].location;
    let (old_geo, was_mapped) = {
        let mapped = &mut state.outputs[output_idx].layers[layer_idx][pos];
        let old_geo = mapped.geo;
        let was_mapped = mapped.mapped;
        mapped.committed = true;
        mapped.mapped = has_buffer(root);
        (old_geo, was_mapped)
    };

    // Every commit by a member re-arranges the whole output; this also takes
    // care of the initial configure and of keyboard-interactive focus.
    state.arrange_layers(output_idx);

    let mapped = &state.outputs[output_idx].layers[layer_idx][pos];
    let new_geo = mapped.geo;
    let now_mapped = mapped.mapped;

    if (was_mapped || now_mapped) && old_geo != new_geo {
        state.damage_rect(Rectangle::new(output_loc + old_geo.loc, old_geo.size));
    }
    if was_mapped || now_mapped {
        state.damage_rect(Rectangle::new(output_loc + new_geo.loc, new_geo.size));
    }

    true
}
