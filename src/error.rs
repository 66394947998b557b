//! Error domain of the runtime.
//!
//! Failures fall into three categories: *native* platform errors (an
//! `io::Error` carrying a raw OS code, surfaced verbatim), portable
//! *system* errors (an `io::Error` identified only by its kind), and the
//! runtime's own *domain* errors. Every error carries a short static
//! context naming the operation that produced it.

use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Category of an [`Error`], see the module documentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Native,
    System,
    Domain,
}

#[derive(Debug, Error)]
pub enum Error {
    /// Operating system or portable I/O failure.
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },
    /// Orderly closure observed where more bytes were required.
    #[error("{context}: unexpected end of stream")]
    Eof { context: &'static str },
    /// The socket subsystem's reported version fails to meet the minimum.
    #[error("{context}: unsupported socket subsystem version")]
    Version { context: &'static str },
}

impl Error {
    pub(crate) fn os(context: &'static str, source: io::Error) -> Self {
        Error::Io { context, source }
    }

    pub(crate) fn eof(context: &'static str) -> Self {
        Error::Eof { context }
    }

    pub fn category(&self) -> Category {
        match self {
            Error::Io { source, .. } if source.raw_os_error().is_some() => Category::Native,
            Error::Io { .. } => Category::System,
            Error::Eof { .. } | Error::Version { .. } => Category::Domain,
        }
    }

    /// The raw OS code for native errors.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::Io { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    /// The portable kind for native and system errors.
    pub fn kind(&self) -> Option<io::ErrorKind> {
        match self {
            Error::Io { source, .. } => Some(source.kind()),
            _ => None,
        }
    }

    /// The operation that produced the error.
    pub fn context(&self) -> &'static str {
        match self {
            Error::Io { context, .. } | Error::Eof { context } | Error::Version { context } => {
                context
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_os_codes_are_native() {
        let err = Error::os("tcp recv", io::Error::from_raw_os_error(libc::ECONNRESET));
        assert_eq!(err.category(), Category::Native);
        assert_eq!(err.raw_os_error(), Some(libc::ECONNRESET));
    }

    #[test]
    fn kinds_without_codes_are_system() {
        let err = Error::os("invalid address", io::ErrorKind::InvalidInput.into());
        assert_eq!(err.category(), Category::System);
        assert_eq!(err.kind(), Some(io::ErrorKind::InvalidInput));
        assert_eq!(err.raw_os_error(), None);
    }

    #[test]
    fn runtime_codes_are_domain() {
        assert_eq!(Error::eof("tcp recv").category(), Category::Domain);
        assert_eq!(
            Error::Version {
                context: "subsystem startup"
            }
            .category(),
            Category::Domain
        );
    }

    #[test]
    fn messages_carry_the_context() {
        let err = Error::eof("tcp recv");
        assert_eq!(err.context(), "tcp recv");
        assert!(err.to_string().starts_with("tcp recv"));
    }
}
