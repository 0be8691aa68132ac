//! Newtype identifiers.
//!
//! Wrapping raw integers keeps function signatures self-documenting and
//! prevents mixing a process id with other counters at compile time.

use std::fmt;

/// An operating-system process id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pid(pub i32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid {}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_displays_with_prefix() {
        assert_eq!(Pid(1234).to_string(), "pid 1234");
    }
}
