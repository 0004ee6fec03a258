pub mod dispatcher;
pub mod instruction;

pub use dispatcher::{Dispatcher, LOG_VERSION};
pub use instruction::{Instruction, Reply};
