//! Helpers for emitting durations, timestamps and errors as tracing fields.

use jiff::{
    SignedDuration, Timestamp,
    fmt::{
        StdFmtWrite,
        friendly::{Designator, SpanPrinter},
    },
};

/// Formats a [`std::time::Duration`] in a short human readable form (`1s 500ms`).
///
/// # Example
///
/// ```
/// use tempo_telemetry_util::display_duration;
///
/// let elapsed = std::time::Duration::from_millis(1500);
/// tracing::info!(elapsed = %display_duration(elapsed), "poll cycle finished");
/// ```
pub fn display_duration(duration: std::time::Duration) -> DisplayDuration {
    DisplayDuration(duration)
}

pub struct DisplayDuration(std::time::Duration);

impl std::fmt::Display for DisplayDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        static PRINTER: SpanPrinter = SpanPrinter::new().designator(Designator::Short);
        match SignedDuration::try_from(self.0) {
            Ok(duration) => PRINTER
                .print_duration(&duration, StdFmtWrite(f))
                .map_err(|_| std::fmt::Error),
            Err(_) => write!(f, "<duration greater than {:#}>", SignedDuration::MAX),
        }
    }
}

/// Formats a unix timestamp in seconds as RFC 3339.
///
/// `0` is the keychain's "never expires" marker and renders as `never`.
///
/// ```
/// use tempo_telemetry_util::display_unix_seconds;
///
/// assert_eq!(display_unix_seconds(0).to_string(), "never");
/// assert_eq!(display_unix_seconds(1_700_000_000).to_string(), "2023-11-14T22:13:20Z");
/// ```
pub fn display_unix_seconds(seconds: u64) -> DisplayUnixSeconds {
    DisplayUnixSeconds(seconds)
}

pub struct DisplayUnixSeconds(u64);

impl std::fmt::Display for DisplayUnixSeconds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 == 0 {
            return f.write_str("never");
        }
        match i64::try_from(self.0)
            .ok()
            .and_then(|secs| Timestamp::from_second(secs).ok())
        {
            Some(ts) => write!(f, "{ts}"),
            None => write!(f, "<unix {}>", self.0),
        }
    }
}

/// Emits an error as a tracing field with its full source chain.
///
/// Works the same for typed errors implementing [`std::error::Error`] and for
/// [`eyre::Report`], which does not implement that trait. Using `%error`
/// instead would drop the sources, and `?error` leaks `Debug` formatting.
///
/// # Examples
///
/// ```
/// use eyre::WrapErr;
/// use tempo_telemetry_util::error_field;
///
/// if let Err(error) = Err::<(), _>(std::io::Error::from(std::io::ErrorKind::NotFound))
///     .wrap_err("failed reading vault file")
/// {
///     tracing::warn!(error = error_field(&error), "vault unavailable");
/// }
/// ```
pub fn error_field<E, TMarker>(error: &E) -> Box<dyn tracing::Value + '_>
where
    E: AsTracingValue<TMarker>,
{
    error.as_tracing_value(private::Token)
}

#[doc(hidden)]
// The marker keeps the blanket impl for `E: std::error::Error` and the impl for
// `eyre::Report` from overlapping.
pub trait AsTracingValue<TMarker> {
    fn as_tracing_value(&self, _: private::Token) -> Box<dyn tracing::Value + '_>;
}

mod private {
    pub struct Token;
    pub struct Generic;
    pub struct Eyre;
}

impl<E: std::error::Error + 'static> AsTracingValue<private::Generic> for E {
    fn as_tracing_value(&self, _: private::Token) -> Box<dyn tracing::Value + '_> {
        Box::new(self as &(dyn std::error::Error + 'static))
    }
}

impl AsTracingValue<private::Eyre> for eyre::Report {
    fn as_tracing_value(&self, _: private::Token) -> Box<dyn tracing::Value + '_> {
        Box::new(AsRef::<dyn std::error::Error>::as_ref(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_are_short() {
        let formatted = display_duration(std::time::Duration::from_millis(1500)).to_string();
        assert_eq!(formatted, "1s 500ms");
    }

    #[test]
    fn out_of_range_timestamps_do_not_panic() {
        assert_eq!(display_unix_seconds(u64::MAX).to_string(), format!("<unix {}>", u64::MAX));
    }
}
