// ── Concrete gateway schemas ──
//
// The minimal set of schema tables the engines and their tests need:
// devices (with their light entries), groups, scenes, and
// notifications. One file per resource kind.

pub mod device;
pub mod group;
pub mod notification;
pub mod scene;

use crate::schema::Instance;

// ── Shared accessors ────────────────────────────────────────────────

/// Every gateway resource carries its integer id under the same key.
pub fn instance_id(instance: &Instance) -> Option<u32> {
    instance.u32_of("instance_id")
}

/// Human-readable name, present on devices, groups, and scenes.
pub fn name(instance: &Instance) -> Option<&str> {
    instance.str_of("name")
}
