pub mod audio;
pub mod backends;
pub mod email;
pub mod realtime;
