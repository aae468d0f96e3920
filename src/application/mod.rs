//! Application services: reads, cache-aside comment branches and
//! transactional mutations.

pub mod comments;
pub mod context;
pub mod error;
pub mod mutations;
pub mod posts;
pub mod repos;
pub mod tree;

pub use comments::CommentService;
pub use context::RequestContext;
pub use error::AppError;
pub use mutations::{MutationOrchestrator, NewComment, NewPost};
pub use posts::PostService;
