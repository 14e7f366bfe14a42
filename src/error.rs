//! Error types used by multiple modules.
//!
//! There are three error types that are used widely within the library.
//!
//! The most important is [`Failed`]. This error indicates that an
//! operation had to be canceled for some reason and callers can assume
//! that all diagnostic information has been logged and they need not do
//! anything further.
//!
//! [`ExitError`] is used when the program should be terminated. It
//! provides enough information to determine the exit code of the program.
//!
//! Finally, [`Abandoned`] signals that the client of an HTTP request has
//! gone away and no response should be written at all.

use std::{error, fmt};


//------------ Failed --------------------------------------------------------

/// An operation has failed to complete.
///
/// This error types is used to indicate that an operation has failed,
/// diagnostic information has been printed or logged, and the caller can’t
/// really do anything to recover.
#[derive(Clone, Copy, Debug)]
pub struct Failed;


//------------ ExitError -----------------------------------------------------

/// An error happened that should lead to terminating the program.
#[derive(Clone, Copy, Debug)]
pub enum ExitError {
    /// Something has happened.
    ///
    /// This should be exit status 1.
    Generic,
}

impl From<Failed> for ExitError {
    fn from(_: Failed) -> ExitError {
        ExitError::Generic
    }
}


//------------ Abandoned -----------------------------------------------------

/// The client of a request has disconnected.
///
/// This isn’t really an error: processing simply stops and nothing is
/// written back. It is handed to hyper as the service error so the
/// connection is closed without a response.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Abandoned;

impl fmt::Display for Abandoned {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("request abandoned by client")
    }
}

impl error::Error for Abandoned { }
