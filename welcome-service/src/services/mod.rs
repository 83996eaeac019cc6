pub mod database;
pub mod delivery;
pub mod editor;
pub mod render;
pub mod store;
pub mod telegram;
pub mod transport;
pub mod wizard;

pub use database::{MongoDb, MongoStore};
pub use delivery::Delivery;
pub use editor::{SubtreeDeletion, TreeEditor};
pub use render::{Rendered, Viewer};
pub use store::{ChatRegistry, MemoryStore, NodeStore};
pub use telegram::TelegramApi;
pub use transport::{
    ChatMetadata, Keyboard, KeyboardButton, MessageRef, MockTransport, OutgoingContent, Transport,
    TransportError,
};
pub use wizard::{WizardSessions, WizardStage};
