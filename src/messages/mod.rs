pub mod transcript;
pub mod types;

pub use transcript::{append_or_replace_trailing, typing_invariant_holds, Transcript};
pub use types::{Message, Role, Sender};
