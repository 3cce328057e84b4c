//! Exit code classification.
//!
//! The 0-255 exit code space is partitioned into disjoint ranges, one per
//! family of failures the installer scripts can hit. [`explain`] is the only
//! place that turns a code into the text stored on a record: every code in a
//! range reads as that range's fixed string. [`describe`] adds per-code
//! detail for interactive use.

use std::fmt;

/// Text returned for codes outside every known range.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// A family of exit codes occupying one contiguous range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitCodeClass {
    /// 1-2: generic shell errors.
    Shell,
    /// 6-35: curl transfer errors.
    Curl,
    /// 100-102: APT package manager errors.
    Apt,
    /// 124-143: timeouts, exec failures and signals.
    Signal,
    /// 150-154: service manager and build failures.
    Service,
    /// 160-162: Python tooling.
    Python,
    /// 170-173: PostgreSQL client.
    Postgres,
    /// 180-183: MySQL/MariaDB client.
    MySql,
    /// 190-193: MongoDB client.
    MongoDb,
    /// 200-231: Proxmox container/VM provisioning.
    Proxmox,
    /// 243-249: Node.js and JavaScript package managers.
    NodeJs,
    /// 255: DPKG fatal error.
    Dpkg,
}

/// Inclusive bounds of each class, in ascending order.
const RANGES: &[(u8, u8, ExitCodeClass)] = &[
    (1, 2, ExitCodeClass::Shell),
    (6, 35, ExitCodeClass::Curl),
    (100, 102, ExitCodeClass::Apt),
    (124, 143, ExitCodeClass::Signal),
    (150, 154, ExitCodeClass::Service),
    (160, 162, ExitCodeClass::Python),
    (170, 173, ExitCodeClass::Postgres),
    (180, 183, ExitCodeClass::MySql),
    (190, 193, ExitCodeClass::MongoDb),
    (200, 231, ExitCodeClass::Proxmox),
    (243, 249, ExitCodeClass::NodeJs),
    (255, 255, ExitCodeClass::Dpkg),
];

impl ExitCodeClass {
    /// Inclusive range of codes belonging to this class.
    #[must_use]
    pub fn range(self) -> (u8, u8) {
        RANGES
            .iter()
            .find(|(_, _, class)| *class == self)
            .map_or((0, 0), |(lo, hi, _)| (*lo, *hi))
    }

    /// Fixed text shared by every code in this class.
    #[must_use]
    pub fn text(self) -> &'static str {
        match self {
            Self::Shell => "General shell error",
            Self::Curl => "curl: Transfer failed",
            Self::Apt => "APT: Package manager error",
            Self::Signal => "Command terminated abnormally",
            Self::Service => "Service or build failure",
            Self::Python => "Python: Environment error",
            Self::Postgres => "PostgreSQL: Client error",
            Self::MySql => "MySQL/MariaDB: Client error",
            Self::MongoDb => "MongoDB: Client error",
            Self::Proxmox => "Proxmox: Provisioning error",
            Self::NodeJs => "Node.js: Runtime error",
            Self::Dpkg => "DPKG: Fatal internal error",
        }
    }
}

impl fmt::Display for ExitCodeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Shell => "shell",
            Self::Curl => "curl",
            Self::Apt => "apt",
            Self::Signal => "signal",
            Self::Service => "service",
            Self::Python => "python",
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::MongoDb => "mongodb",
            Self::Proxmox => "proxmox",
            Self::NodeJs => "nodejs",
            Self::Dpkg => "dpkg",
        };
        f.write_str(name)
    }
}

/// Find the class a code belongs to.
///
/// Codes outside `0..=255` and codes in the gaps between ranges have no class.
#[must_use]
pub fn classify(code: i32) -> Option<ExitCodeClass> {
    let code = u8::try_from(code).ok()?;
    RANGES
        .iter()
        .find(|(lo, hi, _)| (*lo..=*hi).contains(&code))
        .map(|(_, _, class)| *class)
}

/// Explain an exit code.
///
/// Total: codes inside a range yield that range's fixed text, anything else
/// yields [`UNKNOWN_ERROR`].
#[must_use]
pub fn explain(code: i32) -> &'static str {
    classify(code).map_or(UNKNOWN_ERROR, ExitCodeClass::text)
}

/// Detailed text for a single code, falling back to [`explain`].
#[must_use]
pub fn describe(code: i32) -> &'static str {
    classify(code)
        .and_then(|_| specific(code))
        .unwrap_or_else(|| explain(code))
}

#[allow(clippy::too_many_lines)]
fn specific(code: i32) -> Option<&'static str> {
    let text = match code {
        1 => "General error / Operation not permitted",
        2 => "Misuse of shell builtins (e.g. syntax error)",

        6 => "curl: DNS resolution failed (could not resolve host)",
        7 => "curl: Failed to connect (network unreachable / host down)",
        22 => "curl: HTTP error returned (404, 429, 500+)",
        28 => "curl: Operation timeout (network slow or server not responding)",
        35 => "curl: SSL/TLS handshake failed (certificate error)",

        100 => "APT: Package manager error (broken packages / dependency problems)",
        101 => "APT: Configuration error (bad sources.list, malformed config)",
        102 => "APT: Lock held by another process (dpkg/apt still running)",

        124 => "Command timed out (timeout command)",
        126 => "Command invoked cannot execute (permission problem?)",
        127 => "Command not found",
        128 => "Invalid argument to exit",
        130 => "Terminated by Ctrl+C (SIGINT)",
        134 => "Process aborted (SIGABRT - possibly Node.js heap overflow)",
        137 => "Killed (SIGKILL / Out of memory?)",
        139 => "Segmentation fault (core dumped)",
        141 => "Broken pipe (SIGPIPE - output closed prematurely)",
        143 => "Terminated (SIGTERM)",

        150 => "Systemd: Service failed to start",
        151 => "Systemd: Service unit not found",
        152 => "Permission denied (EACCES)",
        153 => "Build/compile failed (make/gcc/cmake)",
        154 => "Node.js: Native addon build failed (node-gyp)",

        160 => "Python: Virtualenv / uv environment missing or broken",
        161 => "Python: Dependency resolution failed",
        162 => "Python: Installation aborted (permissions or EXTERNALLY-MANAGED)",

        170 => "PostgreSQL: Connection failed (server not running / wrong socket)",
        171 => "PostgreSQL: Authentication failed (bad user/password)",
        172 => "PostgreSQL: Database does not exist",
        173 => "PostgreSQL: Fatal error in query / syntax",

        180 => "MySQL/MariaDB: Connection failed (server not running / wrong socket)",
        181 => "MySQL/MariaDB: Authentication failed (bad user/password)",
        182 => "MySQL/MariaDB: Database does not exist",
        183 => "MySQL/MariaDB: Fatal error in query / syntax",

        190 => "MongoDB: Connection failed (server not running)",
        191 => "MongoDB: Authentication failed (bad user/password)",
        192 => "MongoDB: Database not found",
        193 => "MongoDB: Fatal query error",

        200 => "Proxmox: Failed to create lock file",
        203 => "Proxmox: Missing CTID variable",
        204 => "Proxmox: Missing PCT_OSTYPE variable",
        205 => "Proxmox: Invalid CTID (<100)",
        206 => "Proxmox: CTID already in use",
        207 => "Proxmox: Password contains unescaped special characters",
        208 => "Proxmox: Invalid configuration (DNS/MAC/Network format)",
        209 => "Proxmox: Container creation failed",
        210 => "Proxmox: Cluster not quorate",
        211 => "Proxmox: Timeout waiting for template lock",
        212 => "Proxmox: Storage type 'iscsidirect' does not support containers (VMs only)",
        213 => "Proxmox: Storage type does not support 'rootdir' content",
        214 => "Proxmox: Not enough storage space",
        215 => "Proxmox: Container created but not listed (ghost state)",
        216 => "Proxmox: RootFS entry missing in config",
        217 => "Proxmox: Storage not accessible",
        218 => "Proxmox: Template file corrupted or incomplete",
        219 => "Proxmox: CephFS does not support containers - use RBD",
        220 => "Proxmox: Unable to resolve template path",
        221 => "Proxmox: Template file not readable",
        222 => "Proxmox: Template download failed",
        223 => "Proxmox: Template not available after download",
        224 => "Proxmox: PBS storage is for backups only",
        225 => "Proxmox: No template available for OS/Version",
        231 => "Proxmox: LXC stack upgrade failed",

        243 => "Node.js: Out of memory (JavaScript heap out of memory)",
        245 => "Node.js: Invalid command-line option",
        246 => "Node.js: Internal JavaScript Parse Error",
        247 => "Node.js: Fatal internal error",
        248 => "Node.js: Invalid C++ addon / N-API failure",
        249 => "npm/pnpm/yarn: Unknown fatal error",

        _ => return None,
    };
    Some(text)
}
