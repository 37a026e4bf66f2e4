pub mod emitter;
pub mod stop_button;

pub use emitter::emitter_task;
pub use stop_button::stop_button_task;
