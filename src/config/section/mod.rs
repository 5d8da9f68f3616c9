//! Configuration section definitions.
//!
//! Each module corresponds to a section in `markview.toml`:
//!
//! | Module   | TOML Section | Purpose                                   |
//! |----------|--------------|-------------------------------------------|
//! | `source` | `[source]`   | Tree to render and accepted extensions    |
//! | `serve`  | `[serve]`    | HTTP and live reload servers, watcher     |
//! | `auth`   | `[auth]`     | Optional credentials (absent = open mode) |

mod auth;
mod serve;
mod source;

pub use auth::AuthConfig;
pub use serve::ServeConfig;
pub use source::SourceConfig;
