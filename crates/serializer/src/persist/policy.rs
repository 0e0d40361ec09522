use std::fmt;

use tracing::debug;

use crate::scene::{EntityId, EntityRole, HostWorld};

/// Tag names understood by capture and restore.
pub mod tags {
    /// Opts an entity into capture.
    pub const SAVE: &str = "Save";
    /// Excludes an entity, and any child actor of it, from capture.
    pub const IGNORE: &str = "Ignore";
    /// Restores fields but leaves the live transform alone.
    pub const IGNORE_TRANSFORM: &str = "IgnoreTransform";
}

pub const BLACKLISTED_ROLES: [EntityRole; 4] = [
    EntityRole::PlayerState,
    EntityRole::Controller,
    EntityRole::GameMode,
    EntityRole::GameState,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionReason {
    Unknown,
    NotPersistable,
    BlacklistedRole(EntityRole),
    Ignored,
    StaticRoot,
    IgnoredParent,
    NotTagged,
}

impl ExclusionReason {
    pub fn label(self) -> &'static str {
        match self {
            Self::Unknown => "unknown_entity",
            Self::NotPersistable => "not_persistable",
            Self::BlacklistedRole(_) => "blacklisted_role",
            Self::Ignored => "ignore_tag",
            Self::StaticRoot => "static_root",
            Self::IgnoredParent => "parent_ignored",
            Self::NotTagged => "missing_save_tag",
        }
    }
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlacklistedRole(role) => write!(f, "{} ({role:?})", self.label()),
            other => f.write_str(other.label()),
        }
    }
}

/// First rule that keeps `id` out of a capture, or `None` when it is
/// eligible.
pub fn exclusion_reason<H: HostWorld + ?Sized>(host: &H, id: EntityId) -> Option<ExclusionReason> {
    let Some(descriptor) = host.describe(id) else {
        return Some(ExclusionReason::Unknown);
    };
    if host.persistable(id).is_none() {
        return Some(ExclusionReason::NotPersistable);
    }
    if BLACKLISTED_ROLES.contains(&descriptor.role) {
        return Some(ExclusionReason::BlacklistedRole(descriptor.role));
    }
    if descriptor.has_tag(tags::IGNORE) {
        return Some(ExclusionReason::Ignored);
    }
    if descriptor.root_is_static {
        return Some(ExclusionReason::StaticRoot);
    }
    if descriptor.is_child_actor {
        let parent_ignored = descriptor
            .parent
            .and_then(|parent| host.describe(parent))
            .is_some_and(|parent| parent.has_tag(tags::IGNORE));
        if parent_ignored {
            return Some(ExclusionReason::IgnoredParent);
        }
    }
    if !descriptor.has_tag(tags::SAVE) {
        return Some(ExclusionReason::NotTagged);
    }
    None
}

pub fn is_included<H: HostWorld + ?Sized>(host: &H, id: EntityId) -> bool {
    match exclusion_reason(host, id) {
        None => true,
        Some(reason) => {
            let path = host
                .describe(id)
                .map(|descriptor| descriptor.display_path())
                .unwrap_or_default();
            debug!(entity = ?id, path = %path, reason = %reason, "entity_excluded");
            false
        }
    }
}
