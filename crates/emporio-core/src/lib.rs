//! # Emporio Core
//!
//! Core types shared by every Emporio crate:
//!
//! - [`RequestId`] - UUID v7 request identifier
//! - [`Claims`] - identity claims returned by the identity provider
//! - [`AppError`] - error taxonomy and the JSON error envelope
//! - [`millis`] - saturating duration to milliseconds for log fields

#![doc(html_root_url = "https://docs.rs/emporio-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod identity;
mod request_id;
mod time;

pub use error::{
    AppError, AppResult, ErrorCategory, ErrorDetail, ErrorEnvelope, GENERIC_INTERNAL_MESSAGE,
};
pub use identity::Claims;
pub use request_id::RequestId;
pub use time::millis;
