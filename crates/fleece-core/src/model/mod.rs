pub mod id;
pub mod issue;

pub use id::generate_issue_id;
pub use issue::{ExecutionMode, Issue, IssueType, ParentRef, ParseEnumError, Status};
