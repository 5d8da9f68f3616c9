//! Small helpers shared by the server and the templates.

pub mod html;
pub mod mime;
pub mod url;
