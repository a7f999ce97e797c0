use std::error::Error;
use std::fmt;
use std::iter;

/// Displays an error followed by all of its sources, one per line.
///
/// # Example
///
/// ```
/// use discover_log::ErrorChain;
///
/// let error = std::io::Error::other("store unavailable");
/// assert_eq!(ErrorChain(&error).to_string(), "store unavailable");
/// ```
pub struct ErrorChain<'a, E: Error + ?Sized>(pub &'a E);

impl<E: Error + ?Sized> fmt::Display for ErrorChain<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        for source in iter::successors(self.0.source(), |&error| error.source()) {
            write!(f, "\n  caused by: {source}")?;
        }
        Ok(())
    }
}

/// Reports a fatal error through the logger, or on `stderr` if logging is not set up.
///
/// Use the [`error!`](crate::error) macro for errors that occur after startup.
#[allow(clippy::print_stderr)]
pub fn report_error<E: AsRef<dyn Error>>(error: E) {
    let chain = ErrorChain(error.as_ref());
    if tracing::enabled!(tracing::Level::ERROR) {
        tracing::error!("{chain}");
    } else {
        eprintln!("error: {chain}");
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[derive(Debug)]
    struct ThresholdLookup(io::Error);

    impl fmt::Display for ThresholdLookup {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("could not load project thresholds")
        }
    }

    impl Error for ThresholdLookup {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_error_chain() {
        let error = ThresholdLookup(io::Error::other("store unavailable"));
        assert_eq!(
            ErrorChain(&error).to_string(),
            "could not load project thresholds\n  caused by: store unavailable"
        );
    }
}
