//! Log output shaped for the GitHub Actions runner.
//!
//! Workflow commands are plain lines on stdout. The runner folds everything
//! between `::group::` and `::endgroup::` and surfaces `::error::` lines as
//! annotations on the run summary.

use std::fmt::Display;

/// Folds log output until the returned guard is dropped.
#[must_use]
pub fn group(title: impl Display) -> Group {
    println!("::group::{}", escape(&title.to_string()));

    Group { _private: () }
}

/// Emits an error annotation; shows up on the workflow summary page.
pub fn error(message: impl Display) {
    println!("::error::{}", escape(&message.to_string()));
}

pub struct Group {
    _private: (),
}

impl Drop for Group {
    fn drop(&mut self) {
        println!("::endgroup::");
    }
}

// Command data must not be able to smuggle in another command.
fn escape(data: &str) -> String {
    data.replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_keeps_command_data_on_one_line() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("a\nb"), "a%0Ab");
        assert_eq!(escape("100%\r\n"), "100%25%0D%0A");
    }
}
