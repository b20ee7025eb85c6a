//! Line-oriented worker-to-master protocol.
//!
//! Workers write newline-terminated text messages to stdout: progress
//! markers for both pipeline streams, faulty shader-module reports and a
//! final `CRASH` marker from the crash handler. Messages from one worker
//! arrive in order; messages across workers are unordered.

use std::fmt;

use vpc_core::types::Hash;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMessage {
    /// Graphics pipeline index currently being replayed.
    Graphics(u32),
    /// Compute pipeline index currently being replayed.
    Compute(u32),
    /// Shader module hash implicated in a crash; to be blacklisted.
    Module(Hash),
    /// Sent from the worker's crash handler just before it dies.
    Crash,
}

impl WorkerMessage {
    /// Parse one stdout line. Unknown lines yield `None` and are ignored
    /// by the supervisor.
    pub fn parse(line: &str) -> Option<WorkerMessage> {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("GRAPHICS") {
            rest.trim().parse().ok().map(WorkerMessage::Graphics)
        } else if let Some(rest) = line.strip_prefix("COMPUTE") {
            rest.trim().parse().ok().map(WorkerMessage::Compute)
        } else if let Some(rest) = line.strip_prefix("MODULE") {
            Hash::from_str_radix(rest.trim(), 16)
                .ok()
                .map(WorkerMessage::Module)
        } else if line == "CRASH" {
            Some(WorkerMessage::Crash)
        } else {
            None
        }
    }
}

impl fmt::Display for WorkerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerMessage::Graphics(index) => write!(f, "GRAPHICS {index}"),
            WorkerMessage::Compute(index) => write!(f, "COMPUTE {index}"),
            WorkerMessage::Module(hash) => write!(f, "MODULE {hash:x}"),
            WorkerMessage::Crash => write!(f, "CRASH"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_protocol_lines() {
        assert_eq!(
            WorkerMessage::parse("GRAPHICS 42\n"),
            Some(WorkerMessage::Graphics(42))
        );
        assert_eq!(
            WorkerMessage::parse("COMPUTE 7"),
            Some(WorkerMessage::Compute(7))
        );
        assert_eq!(
            WorkerMessage::parse("MODULE deadbeefcafe"),
            Some(WorkerMessage::Module(0xdead_beef_cafe))
        );
        assert_eq!(WorkerMessage::parse("CRASH"), Some(WorkerMessage::Crash));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(WorkerMessage::parse(""), None);
        assert_eq!(WorkerMessage::parse("GRAPHICS x"), None);
        assert_eq!(WorkerMessage::parse("MODULE zz"), None);
        assert_eq!(WorkerMessage::parse("HELLO 1"), None);
    }

    #[test]
    fn round_trips_through_display() {
        for msg in [
            WorkerMessage::Graphics(0),
            WorkerMessage::Compute(123),
            WorkerMessage::Module(0xabc),
            WorkerMessage::Crash,
        ] {
            assert_eq!(WorkerMessage::parse(&msg.to_string()), Some(msg));
        }
    }
}
