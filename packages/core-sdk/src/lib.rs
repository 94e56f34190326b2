pub mod client;
pub mod mock;
pub mod models;
pub mod telemetry;
pub mod templates;
pub mod tutorial;

/**
 * \brief SDK 预导入集合，方便外部引用常用模块。
 */
pub mod prelude {
    pub use crate::client::{self, ApiOutcome, PlatformClient, Rejection};
    pub use crate::mock;
    pub use crate::models::{self, ChatMessageRequest, Credentials};
    pub use crate::telemetry;
    pub use crate::templates;
    pub use crate::tutorial::{self, RunOptions, RunOutcome, RunReport};
}
