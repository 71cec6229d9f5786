//! The sanitizer seam: `sanitize(yaml) -> yaml`, injected ahead of the
//! rewriter rather than hardcoded into it, so callers (tests, the deploy
//! manager) can supply policy without this crate knowing about it.

use serde_yaml::Value;

pub type Sanitizer = Box<dyn Fn(Value) -> Value + Send + Sync>;

/// Ships for standalone testing of the rewriter; the deploy manager is
/// expected to inject its own validating sanitizer in production.
pub fn noop_sanitizer() -> Sanitizer {
    Box::new(|yaml| yaml)
}
