//! Safety layer: command denylist for tools that execute local commands.
//!
//! The check is a conservative substring scan over a normalized, lower-cased
//! copy of the command, not a shell parser. A false positive costs the model
//! one refused observation; a false negative could cost the user their disk,
//! so patterns err broad (any `>` counts as redirection, any `sudo` counts as
//! elevation).

/// Fixed observation returned when a command is refused.
pub const SHELL_REFUSAL: &str = "Refused: the command matches a blocked pattern \
(deletion, disk formatting, fork bomb, privilege escalation, output redirection or shutdown) \
and was not executed. Use a read-only command instead.";

/// Substrings that block execution, grouped by what they guard against.
const DENYLIST: &[&str] = &[
    // File deletion
    "rm ",
    "rm\t",
    "rmdir",
    "unlink ",
    "shred",
    "wipe",
    "del ",
    "rd /s",
    "erase ",
    "truncate ",
    "find -delete",
    "-delete",
    // Disk formatting and raw device access
    "mkfs",
    "dd if=",
    "dd of=",
    "format",
    "fdisk",
    "parted",
    "wipefs",
    "/dev/sd",
    "/dev/nvme",
    // Fork bombs
    ":(){",
    ":() {",
    "fork while",
    // Privilege escalation
    "sudo",
    "su -",
    "su root",
    "doas ",
    "pkexec",
    "runas",
    "chmod",
    "chown",
    "chgrp",
    "setcap",
    "visudo",
    "passwd",
    // Output redirection
    ">",
    "tee ",
    // Shutdown and process control
    "shutdown",
    "reboot",
    "poweroff",
    "halt",
    "init 0",
    "init 6",
    "systemctl",
    "kill ",
    "killall",
    "pkill",
    // Word-splitting tricks that hide the patterns above
    "$ifs",
    "${ifs}",
];

/// Collapse runs of whitespace so `rm   -rf` and `rm -rf` look the same, and
/// drop the quoting `sh` removes before execution (`'rm'`, `r\m`, `s''udo`).
fn normalize(cmd: &str) -> String {
    cmd.to_lowercase()
        .replace(['\'', '"', '\\'], "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// The first denylisted pattern found in `cmd`, if any.
pub fn denied_pattern(cmd: &str) -> Option<&'static str> {
    let lower = normalize(cmd);
    if let Some(pattern) = DENYLIST.iter().find(|p| lower.contains(*p)) {
        return Some(pattern);
    }
    // Trailing `rm` with no arguments still reads as a deletion attempt.
    if lower == "rm" || lower.ends_with(" rm") || lower.ends_with(";rm") {
        return Some("rm ");
    }
    // Piped installers: curl/wget ... | sh/bash
    if (lower.contains("curl") || lower.contains("wget"))
        && (lower.contains("| sh") || lower.contains("| bash") || lower.contains("|sh"))
    {
        return Some("| sh");
    }
    None
}

/// Check if a shell command must be refused.
pub fn is_command_denied(cmd: &str) -> bool {
    denied_pattern(cmd).is_some()
}
