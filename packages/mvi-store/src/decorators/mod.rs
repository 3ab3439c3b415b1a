//! Stock decorators.

mod retry;
mod timeout;
mod timing;

pub use retry::retry_intents_decorator;
pub use timeout::intent_timeout_decorator;
pub use timing::timing_decorator;
