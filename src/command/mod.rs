//! The command protocol.
//!
//! One command line travels in the SSH `exec` request and one byte stream
//! comes back:
//!
//! - `encode`: structured client invocation to canonical command string
//! - `parse`: command string to typed server request
//! - `decode`: response stream to rendered output, opening sealed secrets
//! - `crypto`: hybrid sealing of secret values to the user's RSA key pair

pub mod crypto;
mod decode;
mod encode;
mod parse;

pub use decode::{Layout, ResponseDecoder};
pub use encode::{IDENTITY_FLAG, Invocation};
pub use parse::{Request, parse};
