//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Visitors, passes, check logs, appointments and users are all entities: two
/// records with the same id are the same thing, whatever their current fields.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
