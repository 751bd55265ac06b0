//! Named continuation rules for common mid-output cues.

use crate::driver::Action;

/// Library rules: name, pattern, action.
pub(crate) fn rules() -> Vec<(&'static str, &'static str, Action)> {
    vec![
        ("denied", r"Permission denied", Action::ExitWith(10)),
        ("auth", r"authentication failures", Action::ExitWith(10)),
        (
            "telnet",
            r"Connection closed by foreign host",
            Action::ExitWith(50),
        ),
        ("conn", r"Connection failed", Action::ExitWith(10)),
        ("try_again", r"Please try again", Action::ExitWith(10)),
        ("command", r"Unknown command.*[\r\n].*", Action::ExitWith(40)),
        ("yesno", r"\[[yY]/[nN]\]\??: *\z", Action::Send("n".into())),
        (
            "user",
            r"(?:login|username|personal sshlogin \d+) *: *\z",
            Action::Send(String::new()),
        ),
        ("password", r"[Pp]assword *: *\z", Action::Send(String::new())),
        ("more", r"(?i)-+ ?more ?-+", Action::Send(" ".into())),
    ]
}
