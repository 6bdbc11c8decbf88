//! Value types shared between the session engine and its callers

mod receiver;
mod status;
mod voice;

pub use receiver::MessageReceiver;
pub use status::StatusSnapshot;
pub use voice::VoiceChannel;
