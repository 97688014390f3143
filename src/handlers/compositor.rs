use smithay::{
    backend::renderer::utils::on_commit_buffer_handler,
    delegate_compositor, delegate_shm,
    desktop::PopupKind,
    reexports::wayland_server::{
        Client,
        protocol::{wl_buffer, wl_surface::WlSurface},
    },
    wayland::{
        buffer::BufferHandler,
        compositor::{
            CompositorClientState, CompositorHandler, CompositorState, is_sync_subsurface,
        },
        shm::{ShmHandler, ShmState},
    },
    xwayland::XWaylandClientData,
};

use crate::{
    Glacier,
    handlers::layer_shell,
    state::{ClientState, surface_root},
    view,
};

impl CompositorHandler for Glacier {
    fn compositor_state(&mut self) -> &mut CompositorState {
        &mut self.compositor_state
    }

    fn client_compositor_state<'a>(&self, client: &'a Client) -> &'a CompositorClientState {
        // XWayland connects with its own client data.
        if let Some(data) = client.get_data::<XWaylandClientData>() {
            return &data.compositor_state;
        }
        &client.get_data::<ClientState>().unwrap().compositor_state
    }

    fn commit(&mut self, surface: &WlSurface) {
        on_commit_buffer_handler::<Self>(surface);

        if is_sync_subsurface(surface) {
            return;
        }

        self.popups.commit(surface);
        if let Some(popup) = self.popups.find_popup(surface) {
            match &popup {
                PopupKind::Xdg(xdg) => {
                    if !xdg.is_initial_configure_sent()
                        && let Err(err) = xdg.send_configure()
                    {
                        tracing::warn!("initial popup configure failed: {err:?}");
                    }
                }
                PopupKind::InputMethod(_) => {}
            }
            // Repaint whatever output the popup's view sits on.
            if let Ok(root) = smithay::desktop::find_popup_root_surface(&popup)
                && let Some(index) = self.view_index_for_surface(&root)
            {
                let geo = self.views[index].geo;
                self.damage_rect(geo);
            }
            return;
        }

        let root = surface_root(surface);
        if view::handle_commit(self, &root) {
            return;
        }
        layer_shell::handle_commit(self, &root);
    }
}

impl BufferHandler for Glacier {
    fn buffer_destroyed(&mut self, _buffer: &wl_buffer::WlBuffer) {}
}

impl ShmHandler for Glacier {
    fn shm_state(&self) -> &ShmState {
        &self.shm_state
    }
}

delegate_shm!(Glacier);
delegate_compositor!(Glacier);
