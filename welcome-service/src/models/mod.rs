pub mod command;
pub mod group;
pub mod node;

pub use command::Command;
pub use group::{GroupRecord, GroupStats, RootSeed, WelcomeSettings};
pub use node::{
    Button, ButtonRows, ContentNode, FormatMode, count_buttons, parse_buttons, serialize_buttons,
};
