//! Backend OS discovery and path encoding.
//!
//! The same three-way distinction — POSIX, Windows (`NT`), or unknown —
//! serves two roles in the design: it is what [`crate::Credentials`]-bearing
//! HTTP probes discover about a remote backend (`GET /system_stats` →
//! `system.os`), and it is the encoding a [`crate::workflow::Workflow`] path
//! write uses to normalize path separators. One enum models both.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OsType {
    Posix,
    Nt,
    Unknown,
}

impl OsType {
    /// Parse the `system.os` field returned by `GET /system_stats`.
    pub fn from_system_stats(raw: &str) -> Self {
        match raw {
            "posix" => OsType::Posix,
            "nt" => OsType::Nt,
            _ => OsType::Unknown,
        }
    }

    /// Rewrite path separators in `value`: `Nt` turns `/` into `\`,
    /// `Posix` turns `\` into `/`, `Unknown` leaves the value untouched.
    pub fn normalize_path_separators(self, value: &str) -> String {
        match self {
            OsType::Nt => value.replace('/', "\\"),
            OsType::Posix => value.replace('\\', "/"),
            OsType::Unknown => value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nt_converts_forward_to_back_slash() {
        let out = OsType::Nt.normalize_path_separators("models/sd/v1.safetensors");
        assert_eq!(out, "models\\sd\\v1.safetensors");
    }

    #[test]
    fn posix_converts_back_to_forward_slash() {
        let out = OsType::Posix.normalize_path_separators("models\\sd\\v1.safetensors");
        assert_eq!(out, "models/sd/v1.safetensors");
    }

    #[test]
    fn unknown_is_a_no_op() {
        let out = OsType::Unknown.normalize_path_separators("models/sd/v1.safetensors");
        assert_eq!(out, "models/sd/v1.safetensors");
    }

    #[test]
    fn parses_system_stats_values() {
        assert_eq!(OsType::from_system_stats("posix"), OsType::Posix);
        assert_eq!(OsType::from_system_stats("nt"), OsType::Nt);
        assert_eq!(OsType::from_system_stats("darwin"), OsType::Unknown);
    }
}
