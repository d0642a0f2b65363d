//! Session runtime: routing, the model loop, sessions, supervision

pub mod agent_loop;
pub mod model_loop;
pub mod router;
pub mod session;
pub mod supervisor;

pub use agent_loop::{AgentLoop, LoopResult};
pub use model_loop::{ModelRunner, ModelTurnResult, DEFAULT_MAX_STEPS, DEFAULT_MODEL_TIMEOUT};
pub use router::{CommandContext, InputRouter, UserRouteResult, COMMAND_PREFIX};
pub use session::{Session, SESSION_QUEUE_CAPACITY};
pub use supervisor::{Supervisor, DEFAULT_SHUTDOWN_GRACE};
