mod source;
mod window;

pub use source::LineSource;
pub use window::Window;
