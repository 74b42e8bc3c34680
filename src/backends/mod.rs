//! [`HttpBackend`](crate::http::HttpBackend) implementations.
//!
//! | Feature        | Backend            |
//! |----------------|--------------------|
//! | `http-reqwest` | [`ReqwestBackend`] |

#[cfg(feature = "http-reqwest")]
pub mod reqwest_backend;

#[cfg(feature = "http-reqwest")]
pub use reqwest_backend::ReqwestBackend;
