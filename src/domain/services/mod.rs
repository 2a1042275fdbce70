mod chat;
mod completion;
#[cfg(test)]
pub mod fakes;
mod prompts;
mod sessions;
mod titles;
mod tools;
pub mod voice;

pub use chat::*;
pub use completion::*;
pub use prompts::*;
pub use sessions::*;
pub use titles::*;
pub use tools::*;
