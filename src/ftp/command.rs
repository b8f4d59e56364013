//! Command parsing: the first SP-separated token, uppercased, is the verb;
//! the remainder (possibly absent) is the argument string.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub verb: String,
    pub arg: Option<String>,
}

pub fn parse_command(line: &str) -> ParsedCommand {
    let line = line.trim_end();
    match line.split_once(' ') {
        Some((verb, rest)) => {
            let rest = rest.trim_start();
            ParsedCommand {
                verb: verb.to_uppercase(),
                arg: if rest.is_empty() { None } else { Some(rest.to_string()) },
            }
        }
        None => ParsedCommand {
            verb: line.to_uppercase(),
            arg: None,
        },
    }
}

/// The verbs the dispatcher recognizes. Commands not in this set yield
/// `500 command unrecognized: X`.
pub const KNOWN_VERBS: &[&str] = &[
    "USER", "PASS", "ACCT", "CWD", "CDUP", "SMNT", "REIN", "QUIT", "PORT", "PASV", "EPRT", "EPSV", "TYPE", "STRU", "MODE", "RETR", "STOR", "STOU",
    "APPE", "ALLO", "REST", "RNFR", "RNTO", "ABOR", "DELE", "RMD", "MKD", "PWD", "LIST", "NLST", "SITE", "SYST", "STAT", "HELP", "NOOP", "AUTH",
    "PBSZ", "PROT", "CCC", "FEAT",
];

/// Commands reachable while `authenticated == false`, plus the
/// navigation/file-op commands.
pub const FILE_AND_NAV_COMMANDS: &[&str] = &[
    "CWD", "CDUP", "RETR", "STOR", "STOU", "APPE", "DELE", "RMD", "MKD", "PWD", "LIST", "NLST", "RNFR", "RNTO", "ALLO", "REST", "SITE",
];
