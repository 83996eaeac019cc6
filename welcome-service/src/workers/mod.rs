pub mod keep_alive;
pub mod poller;

pub use keep_alive::KeepAlive;
pub use poller::UpdatePoller;
