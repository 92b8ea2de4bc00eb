//! Per-class textual descriptions
//!
//! Static metadata attached to each predicted class, used by dashboards to
//! render the verdict without hardcoding attack taxonomy on the client.

use serde::Serialize;

/// Human-readable metadata for one traffic class.
#[derive(Debug, Clone, Serialize)]
pub struct ClassDescription {
    /// Display label.
    pub label: &'static str,
    /// Suggested display color.
    pub color: &'static str,
    /// What the classification means.
    pub desc: &'static str,
    /// Recommended operator action.
    pub action: &'static str,
}

const NORMAL: ClassDescription = ClassDescription {
    label: "Normal Traffic",
    color: "green",
    desc: "The analyzed connection looks legitimate. No anomaly detected in the traffic pattern.",
    action: "No action required.",
};

const DOS: ClassDescription = ClassDescription {
    label: "DoS Attack (Denial of Service)",
    color: "red",
    desc: "Detected an attempt to saturate system resources with an abnormal volume of requests. Typical attacks: neptune, smurf, teardrop, back.",
    action: "Block the source IP immediately and notify the security team.",
};

const PROBE: ClassDescription = ClassDescription {
    label: "Probe Attack (Scanning)",
    color: "orange",
    desc: "Detected a network scan aimed at gathering information about active hosts and services. Typical attacks: nmap, ipsweep, portsweep, satan.",
    action: "Monitor the source IP and consider a preventive block. Review exposed ports.",
};

const R2L: ClassDescription = ClassDescription {
    label: "R2L Attack (Remote to Local)",
    color: "yellow",
    desc: "Detected an unauthorized access attempt from a remote host, exploiting vulnerabilities to gain local privileges. Typical attacks: guess_passwd, ftp_write, httptunnel.",
    action: "Check for compromised credentials, revoke suspicious access and update policies.",
};

const U2R: ClassDescription = ClassDescription {
    label: "U2R Attack (User to Root)",
    color: "red",
    desc: "Detected a privilege escalation attempt: a local user is trying to obtain root privileges. Typical attacks: buffer_overflow, rootkit, sqlattack.",
    action: "Isolate the system immediately, start a forensic analysis and restore from backup.",
};

const OTHER: ClassDescription = ClassDescription {
    label: "Unknown Attack",
    color: "gray",
    desc: "Detected an anomaly outside the known categories. It may be an uncataloged attack or a new variant.",
    action: "Manual analysis recommended. Report to the security team for classification.",
};

/// Look up the description for a predicted label, falling back to the
/// unknown-attack entry for labels outside the known taxonomy.
pub fn describe(label: &str) -> &'static ClassDescription {
    match label {
        "normal" => &NORMAL,
        "DoS" => &DOS,
        "Probe" => &PROBE,
        "R2L" => &R2L,
        "U2R" => &U2R,
        _ => &OTHER,
    }
}
