//! Compose document rewriting and apply-tool invocation for compose-based
//! deployments: deploy/stop/remove a stack, and the pure rewrite pass that
//! injects orchestrator networking and labels into a compose document.

pub mod apply;
pub mod error;
pub mod rewriter;
pub mod sanitize;
pub mod yaml_util;

pub use apply::{
    compose_down, compose_up, discover_by_deployment_label, discover_by_project, require_nonempty, stack_deploy,
    stack_name, stack_rm,
};
pub use error::{ComposeError, Result};
pub use rewriter::{rewrite, RewriteOptions, RulesByService};
pub use sanitize::{noop_sanitizer, Sanitizer};
