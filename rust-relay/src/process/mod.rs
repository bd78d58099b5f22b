//! Stored message processing.
//!
//! ## Processing Flow
//!
//! ```text
//! raw object → parse_raw_email() → ParsedMessage → delivery
//!                                        ↓ (failed recipient)
//!                               BounceReport → send_bounce()
//! ```

pub mod bounce;
pub mod email_parser;

pub use bounce::{send_bounce, BounceError, BounceReport};
pub use email_parser::{parse_raw_email, ParseError, ParsedMessage};
