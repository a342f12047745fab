//! Terminal output helpers
//!
//! Uses `cliclack` for styled step output and prompts in interactive
//! terminals, with plain `[OK]`/`[WARN]` lines in CI and pipes.

mod context;
mod output;
mod prompts;

pub use context::UiContext;
pub use output::{key_value, step_info, step_ok, step_ok_detail, step_warn, step_warn_hint};
pub use prompts::confirm;
