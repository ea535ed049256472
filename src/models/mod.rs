pub mod note;
pub mod session;
pub mod transcript;

pub use note::*;
pub use session::*;
pub use transcript::*;
