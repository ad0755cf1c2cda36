use std::fmt;

/// A basic error type from this library.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Like a classic EAGAIN. The receiver should retry.
    Again,

    /// A generic error message, mostly from socket setup and I/O.
    Msg(String),

    /// A datagram could not be decoded as a DNS message.
    Decode(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Msg(s) => write!(f, "{}", s),
            Error::Decode(s) => write!(f, "decode failed: {}", s),
            Error::Again => write!(f, "try again"),
        }
    }
}

impl std::error::Error for Error {}

/// One and only `Result` type from this library crate.
pub type Result<T> = core::result::Result<T, Error>;

/// A simple macro to report all kinds of errors.
macro_rules! e_fmt {
  ($($arg:tt)+) => {
      $crate::error::Error::Msg(format!($($arg)+))
  };
}

/// Same as `e_fmt!` but for codec failures.
macro_rules! decode_err {
  ($($arg:tt)+) => {
      $crate::error::Error::Decode(format!($($arg)+))
  };
}

pub(crate) use decode_err;
pub(crate) use e_fmt;

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn test_error_display() {
        assert_eq!(Error::Again.to_string(), "try again");
        assert_eq!(Error::Msg("bind failed".to_string()).to_string(), "bind failed");
        assert_eq!(
            Error::Decode("header is too short".to_string()).to_string(),
            "decode failed: header is too short"
        );
    }
}
