pub mod node;
pub mod user;

pub use node::NodeConfiguration;
pub use node::NodeMode;
pub use node::NodeStatus;
pub use user::UserConfiguration;
