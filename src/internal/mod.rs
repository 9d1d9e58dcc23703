//! Low-level logic used throughout this crate
//!
//! Nothing here is needed to describe or process a format; it is public
//! only under the `expose_internal` feature. The `offset` submodule holds
//! the cursor and context-window state behind
//! [`ByteParser`](crate::parse::byteparser::ByteParser).

pub mod offset;
