pub mod clock;
pub mod color;
pub mod dir;
pub mod logging;
pub mod percentage;
pub mod runtime;
pub mod time;
