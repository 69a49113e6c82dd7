//! Domain entities - Core runtime objects with no I/O

pub mod addon;
pub mod command;
pub mod event;
pub mod interaction;

pub use addon::{priority_groups, sort_siblings, AddonDescriptor, AddonNode, AddonTree, PriorityGroup};
pub use command::{CommandDefinition, CommandRegistry};
pub use event::{EventKey, PlatformEvent};
pub use interaction::{Interaction, InteractionKind, MatchStrategy};
