//! The privileged keybindings protocol: a single controller client registers
//! keycode+modifier chords, and matching key events are diverted to it
//! instead of the focused client.

use std::collections::{HashMap, HashSet};

use smithay::reexports::wayland_server::{
    Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource, backend::ClientId,
    protocol::wl_surface::WlSurface,
};

use crate::state::Glacier;

pub use generated::zglacier_keybindings_v1::{self, ZglacierKeybindingsV1};

mod generated {
    use smithay::reexports::wayland_server;

    pub mod __interfaces {
        use smithay::reexports::wayland_server::backend as wayland_backend;
        wayland_scanner::generate_interfaces!("protocols/glacier-keybindings-unstable-v1.xml");
    }
    use self::__interfaces::*;

    wayland_scanner::generate_server_code!("protocols/glacier-keybindings-unstable-v1.xml");
}

const VERSION: u32 = 1;

// xkb modifier bits that must not perturb chord matching.
const MOD_MASK_LOCK: u32 = 1 << 1;
const MOD_MASK_MOD2: u32 = 1 << 4;
const MOD_MASK_ANY: u32 = 1 << 15;

/// Registered chords: keycode to the set of modifier masks accepted for it.
/// Lock-style modifier bits are stripped both when registering and when
/// querying.
#[derive(Debug, Default)]
pub struct ChordSet {
    entries: HashMap<u32, HashSet<u32>>,
}

impl ChordSet {
    fn strip(mask: u32) -> u32 {
        mask & !(MOD_MASK_LOCK | MOD_MASK_MOD2 | MOD_MASK_ANY)
    }

    pub fn register(&mut self, key: u32, mask: u32) {
        self.entries.entry(key).or_default().insert(Self::strip(mask));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn contains(&self, key: u32, mask: u32) -> bool {
        self.entries
            .get(&key)
            .is_some_and(|masks| masks.contains(&Self::strip(mask)))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct KeybindingsState {
    resource: Option<ZglacierKeybindingsV1>,
    pub chords: ChordSet,
    /// Keycodes whose press was filtered; their release is filtered too.
    filtered_pressed: HashSet<u32>,
}

pub trait KeybindingsHandler {
    fn keybindings_state(&mut self) -> &mut KeybindingsState;
}

impl KeybindingsState {
    pub fn new<D>(display: &DisplayHandle) -> Self
    where
        D: GlobalDispatch<ZglacierKeybindingsV1, ()>,
        D: Dispatch<ZglacierKeybindingsV1, ()>,
        D: 'static,
    {
        display.create_global::<D, ZglacierKeybindingsV1, _>(VERSION, ());
        Self {
            resource: None,
            chords: ChordSet::default(),
            filtered_pressed: HashSet::new(),
        }
    }

    fn live_resource(&self) -> Option<&ZglacierKeybindingsV1> {
        self.resource.as_ref().filter(|resource| resource.is_alive())
    }

    /// Whether the surface belongs to the bound controller client.
    pub fn surface_is_controller(&self, surface: &WlSurface) -> bool {
        let Some(resource) = self.live_resource() else {
            return false;
        };
        match (resource.client(), surface.client()) {
            (Some(controller), Some(owner)) => controller.id() == owner.id(),
            _ => false,
        }
    }
}

/// Run one key event through the filter. Returns true when the event was
/// diverted to the controller and must not reach regular clients.
pub fn filter_key(
    state: &mut Glacier,
    keycode: u32,
    mask: u32,
    pressed: bool,
    controller_focused: bool,
    time: u32,
) -> bool {
    let keybindings = &mut state.keybindings;
    let Some(resource) = keybindings.live_resource().cloned() else {
        return false;
    };

    let matched = if pressed {
        let hit = controller_focused || keybindings.chords.contains(keycode, mask);
        if hit {
            keybindings.filtered_pressed.insert(keycode);
        }
        hit
    } else {
        // Filter the release of any filtered press, even if the modifiers
        // were dropped first.
        keybindings.filtered_pressed.remove(&keycode) || controller_focused
    };

    if matched {
        let key_state = if pressed {
            zglacier_keybindings_v1::KeyState::Pressed
        } else {
            zglacier_keybindings_v1::KeyState::Released
        };
        resource.key(time, keycode, key_state, ChordSet::strip(mask));
    }

    matched
}

impl<D> GlobalDispatch<ZglacierKeybindingsV1, (), D> for KeybindingsState
where
    D: GlobalDispatch<ZglacierKeybindingsV1, ()>,
    D: Dispatch<ZglacierKeybindingsV1, ()>,
    D: KeybindingsHandler,
{
    fn bind(
        state: &mut D,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<ZglacierKeybindingsV1>,
        _global_data: &(),
        data_init: &mut DataInit<'_, D>,
    ) {
        let resource = data_init.init(resource, ());
        let keybindings = state.keybindings_state();

        if keybindings.live_resource().is_some() {
            resource.post_error(
                zglacier_keybindings_v1::Error::AlreadyBound,
                "keybindings are already bound by another client",
            );
            return;
        }

        keybindings.resource = Some(resource);
    }
}

impl<D> Dispatch<ZglacierKeybindingsV1, (), D> for KeybindingsState
where
    D: Dispatch<ZglacierKeybindingsV1, ()>,
    D: KeybindingsHandler,
{
    fn request(
        state: &mut D,
        _client: &Client,
        _resource: &ZglacierKeybindingsV1,
        request: <ZglacierKeybindingsV1 as Resource>::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, D>,
    ) {
        let keybindings = state.keybindings_state();
        match request {
            zglacier_keybindings_v1::Request::RegisterKey { key, mods } => {
                keybindings.chords.register(key, mods);
            }
            zglacier_keybindings_v1::Request::ClearKeys => {
                keybindings.chords.clear();
            }
        }
    }

    fn destroyed(
        state: &mut D,
        _client: ClientId,
        resource: &ZglacierKeybindingsV1,
        _data: &(),
    ) {
        let keybindings = state.keybindings_state();
        if keybindings.resource.as_ref() == Some(resource) {
            keybindings.resource = None;
            keybindings.filtered_pressed.clear();
        }
    }
}

#[macro_export]
macro_rules! delegate_keybindings {
    ($ty: ty) => {
        smithay::reexports::wayland_server::delegate_global_dispatch!($ty: [
            $crate::protocols::keybindings::ZglacierKeybindingsV1: ()
        ] => $crate::protocols::keybindings::KeybindingsState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            $crate::protocols::keybindings::ZglacierKeybindingsV1: ()
        ] => $crate::protocols::keybindings::KeybindingsState);
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    const CTRL: u32 = 1 << 2;
    const ALT: u32 = 1 << 3;
    const CAPS: u32 = MOD_MASK_LOCK;
    const NUM: u32 = MOD_MASK_MOD2;

    #[test]
    fn lock_modifiers_do_not_perturb_matching() {
        let mut chords = ChordSet::default();
        chords.register(24, CTRL | ALT);

        assert!(chords.contains(24, CTRL | ALT));
        assert!(chords.contains(24, CTRL | ALT | CAPS));
        assert!(chords.contains(24, CTRL | ALT | NUM));
        assert!(!chords.contains(24, CTRL));
        assert!(!chords.contains(25, CTRL | ALT));
    }

    #[test]
    fn registering_with_locks_matches_without_them() {
        let mut chords = ChordSet::default();
        chords.register(38, CTRL | CAPS);
        assert!(chords.contains(38, CTRL));
    }

    #[test]
    fn clear_then_reregister_restores_the_same_state() {
        let mut chords = ChordSet::default();
        chords.register(24, CTRL | ALT);
        chords.clear();
        assert!(chords.is_empty());
        assert!(!chords.contains(24, CTRL | ALT));

        chords.register(24, CTRL | ALT);
        assert!(chords.contains(24, CTRL | ALT));
        assert!(chords.contains(24, CTRL | ALT | CAPS));
    }

    #[test]
    fn multiple_masks_per_keycode() {
        let mut chords = ChordSet::default();
        chords.register(24, CTRL);
        chords.register(24, ALT);
        assert!(chords.contains(24, CTRL));
        assert!(chords.contains(24, ALT));
        assert!(!chords.contains(24, CTRL | ALT));
    }
}
