//! Script interpreter.

mod eval;
mod verify;

pub use self::eval::eval_script;
pub use self::verify::verify_script;
