//! Arrangement of wlr-layer-shell surfaces on an output.
//!
//! Surfaces are arranged in two passes (exclusive-zone claimants first) over
//! the layers in order overlay, top, bottom, background. Exclusive claimants
//! shrink the output's usable area on their anchored edge; everything else is
//! placed inside whatever area is left.

use smithay::{
    reexports::wayland_server::protocol::wl_surface::WlSurface,
    utils::{Logical, Point, Rectangle, Size},
    wayland::{
        compositor,
        shell::wlr_layer::{
            Anchor, ExclusiveZone, KeyboardInteractivity, Layer, LayerSurface,
            LayerSurfaceCachedState, Margins,
        },
    },
};

use crate::output::OutputState;

/// A layer surface bound to one of the four layers of an output.
pub struct MappedLayer {
    pub surface: LayerSurface,
    /// Arranged rectangle in output-local coordinates.
    pub geo: Rectangle<i32, Logical>,
    pub mapped: bool,
    /// Whether the client has committed its initial state yet. Surfaces are
    /// not arranged (and in particular not closed for a bad size) before
    /// they have.
    pub committed: bool,
    /// Size sent with the most recent configure, used to avoid re-configuring
    /// an already up-to-date surface on every commit.
    configured_size: Option<Size<i32, Logical>>,
}

impl MappedLayer {
    pub fn new(surface: LayerSurface) -> Self {
        Self {
            surface,
            geo: Rectangle::default(),
            mapped: false,
            committed: false,
            configured_size: None,
        }
    }
}

fn current_state(surface: &LayerSurface) -> LayerSurfaceCachedState {
    compositor::with_states(surface.wl_surface(), |states| {
        *states.cached_state.get::<LayerSurfaceCachedState>().current()
    })
}

fn exclusive_zone(zone: ExclusiveZone) -> i32 {
    match zone {
        ExclusiveZone::Exclusive(zone) => zone as i32,
        ExclusiveZone::Neutral => 0,
        ExclusiveZone::DontCare => -1,
    }
}

/// Re-arrange every layer surface on the output and recompute its usable
/// area. Surfaces that end up with a non-positive size are closed.
pub fn arrange_output(record: &mut OutputState) {
    let full_area = Rectangle::from_size(record.resolution());
    let mut usable_area = full_area;

    for exclusive in [true, false] {
        for layer in [Layer::Overlay, Layer::Top, Layer::Bottom, Layer::Background] {
            arrange_layer(record, layer, full_area, &mut usable_area, exclusive);
        }
    }

    record.usable_area = usable_area;
    record.queue_redraw();
}

fn arrange_layer(
    record: &mut OutputState,
    layer: Layer,
    full_area: Rectangle<i32, Logical>,
    usable_area: &mut Rectangle<i32, Logical>,
    exclusive: bool,
) {
    let list = &mut record.layers[crate::output::layer_index(layer)];

    for mapped in list.iter_mut() {
        if !mapped.committed {
            continue;
        }
        let state = current_state(&mapped.surface);
        let zone = exclusive_zone(state.exclusive_zone);
        if exclusive != (zone > 0) {
            continue;
        }

        // Zone -1 surfaces paint over the full output rather than the
        // remaining usable area.
        let bounds = if zone == -1 { full_area } else { *usable_area };

        let geo = arrange_surface(bounds, state.anchor, state.size, state.margin);
        if geo.size.w <= 0 || geo.size.h <= 0 {
            tracing::debug!(
                anchor = ?state.anchor,
                size = ?state.size,
                "closing layer surface arranged to a non-positive size"
            );
            mapped.surface.send_close();
            continue;
        }

        mapped.geo = geo;
        if exclusive {
            shrink_by_exclusive(usable_area, state.anchor, zone, state.margin);
        }

        if mapped.configured_size != Some(geo.size) {
            mapped.surface.with_pending_state(|pending| {
                pending.size = Some(geo.size);
            });
            mapped.surface.send_configure();
            mapped.configured_size = Some(geo.size);
        }
    }
}

/// Compute the rectangle for one surface from its anchor mask, desired size
/// and margins, within the given bounds.
fn arrange_surface(
    bounds: Rectangle<i32, Logical>,
    anchor: Anchor,
    desired: Size<i32, Logical>,
    margin: Margins,
) -> Rectangle<i32, Logical> {
    let both_horiz = Anchor::LEFT | Anchor::RIGHT;
    let both_vert = Anchor::TOP | Anchor::BOTTOM;

    let mut area = Rectangle::new(Point::default(), desired);

    if anchor.contains(both_horiz) && area.size.w == 0 {
        area.loc.x = bounds.loc.x;
        area.size.w = bounds.size.w;
    } else if anchor.contains(Anchor::LEFT) {
        area.loc.x = bounds.loc.x;
    } else if anchor.contains(Anchor::RIGHT) {
        area.loc.x = bounds.loc.x + (bounds.size.w - area.size.w);
    } else {
        area.loc.x = bounds.loc.x + (bounds.size.w / 2 - area.size.w / 2);
    }

    if anchor.contains(both_vert) && area.size.h == 0 {
        area.loc.y = bounds.loc.y;
        area.size.h = bounds.size.h;
    } else if anchor.contains(Anchor::TOP) {
        area.loc.y = bounds.loc.y;
    } else if anchor.contains(Anchor::BOTTOM) {
        area.loc.y = bounds.loc.y + (bounds.size.h - area.size.h);
    } else {
        area.loc.y = bounds.loc.y + (bounds.size.h / 2 - area.size.h / 2);
    }

    // With both anchors on an axis the margins shrink the rectangle; with a
    // single anchor only that side's margin shifts it.
    if anchor.contains(both_horiz) {
        area.loc.x += margin.left;
        area.size.w -= margin.left + margin.right;
    } else if anchor.contains(Anchor::LEFT) {
        area.loc.x += margin.left;
    } else if anchor.contains(Anchor::RIGHT) {
        area.loc.x -= margin.right;
    }

    if anchor.contains(both_vert) {
        area.loc.y += margin.top;
        area.size.h -= margin.top + margin.bottom;
    } else if anchor.contains(Anchor::TOP) {
        area.loc.y += margin.top;
    } else if anchor.contains(Anchor::BOTTOM) {
        area.loc.y -= margin.bottom;
    }

    area
}

/// Shrink the usable area by an exclusive zone claimed on the surface's
/// anchored edge. Only surfaces anchored to exactly one edge (alone or
/// together with the full perpendicular span) claim a zone.
fn shrink_by_exclusive(
    usable_area: &mut Rectangle<i32, Logical>,
    anchor: Anchor,
    zone: i32,
    margin: Margins,
) {
    if zone <= 0 {
        return;
    }

    let both_horiz = Anchor::LEFT | Anchor::RIGHT;
    let both_vert = Anchor::TOP | Anchor::BOTTOM;

    if anchor == Anchor::TOP || anchor == (both_horiz | Anchor::TOP) {
        let delta = (zone + margin.top).clamp(0, usable_area.size.h);
        usable_area.loc.y += delta;
        usable_area.size.h -= delta;
    } else if anchor == Anchor::BOTTOM || anchor == (both_horiz | Anchor::BOTTOM) {
        let delta = (zone + margin.bottom).clamp(0, usable_area.size.h);
        usable_area.size.h -= delta;
    } else if anchor == Anchor::LEFT || anchor == (both_vert | Anchor::LEFT) {
        let delta = (zone + margin.left).clamp(0, usable_area.size.w);
        usable_area.loc.x += delta;
        usable_area.size.w -= delta;
    } else if anchor == Anchor::RIGHT || anchor == (both_vert | Anchor::RIGHT) {
        let delta = (zone + margin.right).clamp(0, usable_area.size.w);
        usable_area.size.w -= delta;
    }
}

/// The surface that should hold keyboard focus after arrangement: the
/// topmost mapped keyboard-interactive surface in the overlay or top layer.
pub fn topmost_interactive(record: &OutputState) -> Option<WlSurface> {
    [Layer::Overlay, Layer::Top].into_iter().find_map(|layer| {
        record.layers(layer).iter().rev().find_map(|mapped| {
            let state = current_state(&mapped.surface);
            (mapped.mapped && state.keyboard_interactivity == KeyboardInteractivity::Exclusive)
                .then(|| mapped.surface.wl_surface().clone())
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: i32, y: i32, w: i32, h: i32) -> Rectangle<i32, Logical> {
        Rectangle::new(Point::from((x, y)), Size::from((w, h)))
    }

    fn size(w: i32, h: i32) -> Size<i32, Logical> {
        Size::from((w, h))
    }

    const NO_MARGIN: Margins = Margins {
        top: 0,
        right: 0,
        bottom: 0,
        left: 0,
    };

    #[test]
    fn bar_spans_top_edge() {
        let bounds = rect(0, 0, 800, 600);
        let anchor = Anchor::TOP | Anchor::LEFT | Anchor::RIGHT;
        let geo = arrange_surface(bounds, anchor, size(0, 30), NO_MARGIN);
        assert_eq!(geo, rect(0, 0, 800, 30));
    }

    #[test]
    fn single_anchors_align_to_their_edge() {
        let bounds = rect(0, 0, 800, 600);
        let geo = arrange_surface(bounds, Anchor::LEFT, size(100, 50), NO_MARGIN);
        assert_eq!(geo, rect(0, 275, 100, 50));

        let geo = arrange_surface(bounds, Anchor::RIGHT, size(100, 50), NO_MARGIN);
        assert_eq!(geo, rect(700, 275, 100, 50));

        let geo = arrange_surface(bounds, Anchor::BOTTOM, size(100, 50), NO_MARGIN);
        assert_eq!(geo, rect(350, 550, 100, 50));
    }

    #[test]
    fn unanchored_surface_is_centered() {
        let bounds = rect(0, 0, 800, 600);
        let geo = arrange_surface(bounds, Anchor::empty(), size(200, 100), NO_MARGIN);
        assert_eq!(geo, rect(300, 250, 200, 100));
    }

    #[test]
    fn double_anchor_margins_shrink_single_anchor_margins_shift() {
        let bounds = rect(0, 0, 800, 600);
        let margin = Margins {
            top: 10,
            right: 20,
            bottom: 0,
            left: 5,
        };

        let spanning = Anchor::TOP | Anchor::LEFT | Anchor::RIGHT;
        let geo = arrange_surface(bounds, spanning, size(0, 30), margin);
        assert_eq!(geo, rect(5, 10, 775, 30));

        let geo = arrange_surface(bounds, Anchor::RIGHT, size(100, 50), margin);
        assert_eq!(geo, rect(680, 275, 100, 50));
    }

    #[test]
    fn exclusive_zone_shrinks_anchored_edge() {
        let mut usable = rect(0, 0, 800, 600);
        let bar_anchor = Anchor::TOP | Anchor::LEFT | Anchor::RIGHT;
        shrink_by_exclusive(&mut usable, bar_anchor, 30, NO_MARGIN);
        assert_eq!(usable, rect(0, 30, 800, 570));

        shrink_by_exclusive(&mut usable, Anchor::LEFT, 48, NO_MARGIN);
        assert_eq!(usable, rect(48, 30, 752, 570));
    }

    #[test]
    fn exclusive_zone_never_goes_negative() {
        let mut usable = rect(0, 0, 800, 100);
        shrink_by_exclusive(&mut usable, Anchor::TOP, 500, NO_MARGIN);
        assert_eq!(usable, rect(0, 100, 800, 0));

        shrink_by_exclusive(&mut usable, Anchor::BOTTOM, 500, NO_MARGIN);
        assert_eq!(usable, rect(0, 100, 800, 0));
    }

    #[test]
    fn bottom_fill_after_top_bar() {
        // A top bar claims 30px, then a non-exclusive surface anchored to all
        // edges with desired size 800x0 fills what is left.
        let mut usable = rect(0, 0, 800, 600);
        let bar_anchor = Anchor::TOP | Anchor::LEFT | Anchor::RIGHT;
        let bar = arrange_surface(usable, bar_anchor, size(0, 30), NO_MARGIN);
        assert_eq!(bar, rect(0, 0, 800, 30));
        shrink_by_exclusive(&mut usable, bar_anchor, 30, NO_MARGIN);

        let fill_anchor = Anchor::TOP | Anchor::BOTTOM | Anchor::LEFT | Anchor::RIGHT;
        let fill = arrange_surface(usable, fill_anchor, size(800, 0), NO_MARGIN);
        assert_eq!(fill, rect(0, 30, 800, 570));
    }
}
