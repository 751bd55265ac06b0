//! Named prompt patterns, one per device or OS family.
//!
//! Patterns match the prompt line itself: anchored at a line start (CR or
//! LF) and at the end of the buffer, so removing the match leaves the line
//! ending that closed the command output.

/// Bash and bracketed `[user@host dir]$` shells.
const SHELL: &str = r"(?mR)^(?:-bash.*|\[[^\]\r\n]+\])[$#] *\z";

/// Menu-driven session border controllers.
const ACME: &str = r"(?mR)^(?:selection:|Save Changes \[y/n\]\?|(?:(?:\x1b\[1m)?\*{1,2}(?:\x1b\[0m)?)?\w+(?:\([^()\r\n]+\))?[>#])\s*\z";

/// `host>` operational prompts.
const ANGLE: &str = r"(?mR)^[^>\r\n]*> *\z";

/// IOS-style `host>` / `host#`, optionally `(enable)`.
const CISCO: &str = r"(?mR)^[^>#\r\n]*[>#](?: *\(enable\))? *\z";

/// `host>` or `[Y/N]:` confirmations.
const HP: &str = r"(?mR)^.*(?:>|\[Y/N\]:) *\z";

pub(crate) const PROMPTS: &[(&str, &str)] = &[
    ("hpux", SHELL),
    ("unix", SHELL),
    ("bash", SHELL),
    ("linux", SHELL),
    ("oracle", ACME),
    ("acme", ACME),
    ("nortel", ANGLE),
    ("juniper", ANGLE),
    ("alteon", r">>[^#\r\n]*# *\z"),
    ("cyclades", r"Select option ==> *\z"),
    ("cisco", CISCO),
    ("parks", CISCO),
    ("vsc", r"(?mR)^.*\d< *\z"),
    ("msc", r"(?mR)^.{0,3}[<>] *\z"),
    ("apg", r"Z[^ \r\n]+\$\s*\z"),
    ("nmm", r"(?mR)^(?:.*@.*:.*[$#] *|ITL>)\z"),
    ("3com", HP),
    ("hp", HP),
    ("huawei", r"(?mR)^<[^>\r\n]+> *\z"),
    ("motorola", r"(?:#Enter Selection:|>) *\z"),
    (
        "auto",
        r"(?mR)^(?:(?:-bash.*|\[[^\]\r\n]+\])[$#]|[^$>#\r\n]*(?:[$>#]|\[Y/N\]:)(?: *\(enable\))?|>>[^#\r\n]*#|Select option ==>|#Enter Selection:) *\z",
    ),
    ("simple", r"(?mR)^.*[$#>] ?\z"),
];
