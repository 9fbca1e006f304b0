pub mod script;
pub mod session;

pub use script::{CallScript, CallScriptBuilder, VoiceAction};
pub use session::{CallRouting, CallSessionManager, PlaceCallRequest};
