//! Built-in step handlers.
//!
//! Content-specific tools (site generators, auditors, sitemap writers) plug
//! in through `exec`/`build`; remote services through `webhook`.

pub mod exec;
pub mod transform;
pub mod webhook;

pub use exec::ExecHandler;
pub use transform::TransformHandler;
pub use webhook::WebhookHandler;
