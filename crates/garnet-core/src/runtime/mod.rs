//! The object model and the pieces dispatch is built from.

pub mod class;
pub mod context;
pub mod environment;
pub mod error;
pub mod method;
pub mod proc;
pub mod stack;
pub mod value;

pub use class::{ClassId, Registry};
pub use context::{CallContext, Runtime};
pub use environment::Env;
pub use error::{Control, EvalResult, Exception, ExceptionKind};
pub use value::Value;
