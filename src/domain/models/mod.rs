mod audio;
mod backend;
mod email;
mod error;
mod event;
mod message;
mod persona;
mod session;
mod slash_commands;
mod tool;
mod voice;

pub use audio::*;
pub use backend::*;
pub use email::*;
pub use error::*;
pub use event::*;
pub use message::*;
pub use persona::*;
pub use session::*;
pub use slash_commands::*;
pub use tool::*;
pub use voice::*;
