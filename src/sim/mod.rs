//! Deterministic simulation module
//!
//! All gameplay logic lives here. Given the same layout, seed and sequence
//! of tick deltas and inputs, a field always plays out the same way:
//! - Fixed timestep only
//! - Seeded RNG only
//! - Stable iteration order (by body and element id)
//! - No rendering or platform dependencies

pub mod geometry;
pub mod elements;
pub mod field;
pub mod layout;
pub mod physics;
pub mod state;

pub use elements::{ElementId, ElementKind, ElementTag, FieldElement};
pub use field::Field;
pub use layout::{BuiltinLayouts, ElementDescriptor, FieldLayout, FlipperSide, LayoutSource};
pub use physics::{BodyId, ContactEvent, ContactPhase, World};
pub use state::{GameEvent, GamePhase, GameState};
